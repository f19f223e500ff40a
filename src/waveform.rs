use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaveformType {
    Sine,
    Square,
    Sawtooth,
    Triangle,
    Noise,
}

impl WaveformType {
    pub const ALL: [WaveformType; 5] = [
        WaveformType::Sine,
        WaveformType::Square,
        WaveformType::Sawtooth,
        WaveformType::Triangle,
        WaveformType::Noise,
    ];

    /// Phase should be in the range [0.0, 1.0). Output is in [-1.0, 1.0].
    pub fn generate_sample(&self, phase: f64) -> f64 {
        match self {
            WaveformType::Sine => (phase * std::f64::consts::TAU).sin(),
            WaveformType::Square => if phase < 0.5 { 1.0 } else { -1.0 },
            WaveformType::Sawtooth => phase * 2.0 - 1.0,
            WaveformType::Noise => fastrand::f64() * 2.0 - 1.0,
            WaveformType::Triangle => {
                if phase < 0.5 { phase * 4.0 - 1.0 } else { 3.0 - phase * 4.0 }
            }
        }
    }
}
