use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FilterType {
    LowPass,
    HighPass,
    BandPass,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterParams {
    pub filter_type: FilterType,
    pub cutoff: f32, // Cutoff frequency in Hz
    pub resonance: f32, // Q factor
}

impl Default for FilterParams {
    fn default() -> Self {
        FilterParams {
            filter_type: FilterType::LowPass,
            cutoff: 1000.0,
            resonance: 0.707,
        }
    }
}

/// Per-channel biquad. Coefficients are computed when the channel (re)starts
/// a note so the render loop only does the multiply-adds.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelFilter {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl ChannelFilter {
    pub fn configure(&mut self, params: &FilterParams, sample_rate: f32) {
        let cutoff = params.cutoff.clamp(10.0, sample_rate * 0.49);
        let omega = std::f32::consts::TAU * cutoff / sample_rate;
        let alpha = omega.sin() / (2.0 * params.resonance.max(0.1));
        let cos_omega = omega.cos();

        let (b0, b1, b2) = match params.filter_type {
            FilterType::LowPass => ((1.0 - cos_omega) / 2.0, 1.0 - cos_omega, (1.0 - cos_omega) / 2.0),
            FilterType::HighPass => ((1.0 + cos_omega) / 2.0, -(1.0 + cos_omega), (1.0 + cos_omega) / 2.0),
            FilterType::BandPass => (alpha, 0.0, -alpha),
        };
        let a0 = 1.0 + alpha;

        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = -2.0 * cos_omega / a0;
        self.a2 = (1.0 - alpha) / a0;
    }

    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }

    // y[n] = b0*x[n] + b1*x[n-1] + b2*x[n-2] - a1*y[n-1] - a2*y[n-2]
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let output = self.b0 * input + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1 - self.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;

        output
    }
}
