use serde::{Deserialize, Serialize};

use crate::error::SynthError;
use crate::synth::MAX_CHANNELS;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sample_rate: u32,
    pub output_channels: usize, // interleaved frame width
    pub num_channels: usize,    // voices
    pub song_rate: u16,         // ticks per second
    pub master_volume: f32,
    pub history_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            sample_rate: 44100,
            output_channels: 2,
            num_channels: 8,
            song_rate: 50,
            master_volume: 1.0,
            history_depth: 64,
        }
    }
}

impl EngineConfig {
    /// Missing fields take their defaults.
    pub fn from_json_str(s: &str) -> Result<Self, SynthError> {
        let config: EngineConfig = serde_json::from_str(s)?;
        Ok(config.validated())
    }

    pub fn validated(mut self) -> Self {
        self.sample_rate = self.sample_rate.clamp(8000, 192_000);
        self.output_channels = self.output_channels.clamp(1, 8);
        self.num_channels = self.num_channels.clamp(1, MAX_CHANNELS);
        self.song_rate = self.song_rate.clamp(1, 1000);
        self.master_volume = if self.master_volume.is_finite() { self.master_volume.clamp(0.0, 2.0) } else { 1.0 };
        self.history_depth = self.history_depth.max(1);
        self
    }
}
