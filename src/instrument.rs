use serde::{Deserialize, Serialize};

use crate::filter::FilterParams;
use crate::waveform::WaveformType;

pub const NUM_INSTRUMENTS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum InstrumentSource {
    Waveform(WaveformType),
    Wavetable(usize), // index into the WaveStore
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub name: String,
    pub source: InstrumentSource,
    pub attack: f32, // ADSR envelope parameters, seconds
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
    pub volume: f32,
    pub transpose: i8, // semitones
    pub finetune: f32, // cents
    pub filter: Option<FilterParams>,
}

impl Default for Instrument {
    fn default() -> Self {
        Instrument {
            name: "Instrument".to_string(),
            source: InstrumentSource::Waveform(WaveformType::Square),
            attack: 0.005,
            decay: 0.1,
            sustain: 0.7,
            release: 0.1,
            volume: 0.5,
            transpose: 0,
            finetune: 0.0,
            filter: None,
        }
    }
}

impl Instrument {
    pub fn wavetable(name: &str, index: usize) -> Self {
        Instrument {
            name: name.to_string(),
            source: InstrumentSource::Wavetable(index),
            ..Default::default()
        }
    }

    /// Note number after transpose and finetune.
    pub fn pitch_of(&self, note: f64) -> f64 {
        note + self.transpose as f64 + self.finetune as f64 / 100.0
    }
}
