// Oscillator-chain wave generator. Renders a chain of simple oscillators into
// a one-cycle (or longer) wavetable entry.

use serde::{Deserialize, Serialize};

use crate::error::SynthError;
use crate::waveform::WaveformType;
use crate::wavestore::{WavetableEntry, DEFAULT_BASE_NOTE, WAVE_LOOP};

pub const WG_CHAIN_MAX: usize = 4;
pub const DEFAULT_WAVE_LENGTH: usize = 256;
/// Frequency the lowest-multiplier stage plays at with the entry's base note.
const REFERENCE_HZ: u64 = 220;

/// Noise stages render the same buffer every time.
const NOISE_SEED: u64 = 0x5eed_5eed;

/// Fold the stage output to `|x| * 2 - 1`.
pub const STAGE_ABS: u8 = 1 << 0;
/// Invert the stage output.
pub const STAGE_NEG: u8 = 1 << 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainOp {
    Add,
    Sub,
    Mul,
    /// Feed the accumulated signal into the next stage's phase.
    PhaseMod,
}

impl ChainOp {
    pub const ALL: [ChainOp; 4] = [ChainOp::Add, ChainOp::Sub, ChainOp::Mul, ChainOp::PhaseMod];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OscStage {
    pub kind: WaveformType,
    pub mult: u8,   // 1..=15
    pub op: ChainOp,
    pub shift: u8,  // 0..=15, 1/16 cycle units
    pub exp: u8,    // 5..=95, 50 = neutral
    pub vol: u8,    // 0..=255
    pub flags: u8,
}

impl Default for OscStage {
    fn default() -> Self {
        OscStage {
            kind: WaveformType::Sine,
            mult: 1,
            op: ChainOp::Add,
            shift: 0,
            exp: 50,
            vol: 255,
            flags: 0,
        }
    }
}

impl OscStage {
    fn sanitized(&self) -> Self {
        OscStage {
            mult: self.mult.clamp(1, 15),
            shift: self.shift.min(15),
            exp: self.exp.clamp(5, 95),
            ..*self
        }
    }

    /// One stage at normalized position `pos` in the rendered buffer.
    fn render(&self, pos: f64, phase_offset: f64, noise: &mut fastrand::Rng) -> f64 {
        let mut phase = (pos * self.mult as f64 + self.shift as f64 / 16.0 + phase_offset).rem_euclid(1.0);

        if self.exp != 50 {
            let e = self.exp as f64 / (100 - self.exp) as f64;
            phase = phase.powf(e);
        }

        let mut out = match self.kind {
            WaveformType::Noise => noise.f64() * 2.0 - 1.0,
            kind => kind.generate_sample(phase),
        };

        if self.flags & STAGE_ABS != 0 {
            out = out.abs() * 2.0 - 1.0;
        }
        if self.flags & STAGE_NEG != 0 {
            out = -out;
        }

        out * self.vol as f64 / 255.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OscillatorChainSpec {
    pub stages: Vec<OscStage>,
}

impl Default for OscillatorChainSpec {
    fn default() -> Self {
        OscillatorChainSpec { stages: vec![OscStage::default()] }
    }
}

impl OscillatorChainSpec {
    fn active_stages(&self) -> impl Iterator<Item = OscStage> + '_ {
        self.stages.iter().take(WG_CHAIN_MAX).map(OscStage::sanitized)
    }

    pub fn lowest_mult(&self) -> u8 {
        self.active_stages().map(|s| s.mult).min().unwrap_or(1)
    }

    /// Pick a new random chain, biased the way the wave generator's dice are.
    pub fn randomize(rng: &mut fastrand::Rng) -> Self {
        let do_sines = rng.u32(..) & 3 == 0;
        let do_shift = rng.bool();
        let do_exp = rng.u32(..) & 3 == 0;
        let do_highfreq = rng.bool();
        let do_inharmonic = rng.bool();
        let do_chop = rng.u32(..) & 3 == 0;
        let do_vol = rng.bool();

        let num_oscs = rng.usize(1..=WG_CHAIN_MAX);
        let mut stages = Vec::with_capacity(num_oscs);

        for i in 0..num_oscs {
            let kind = if do_sines {
                if do_chop && i > 0 && rng.bool() {
                    WaveformType::Square
                } else {
                    WaveformType::Sine
                }
            } else {
                let mut kind = WaveformType::ALL[rng.usize(..WaveformType::ALL.len())];
                if kind == WaveformType::Noise {
                    kind = WaveformType::ALL[rng.usize(..WaveformType::ALL.len())];
                }
                kind
            };

            let mult = if do_inharmonic {
                rng.u8(1..=if do_highfreq { 15 } else { 5 })
            } else {
                1 << rng.u8(0..=if do_highfreq { 3 } else { 2 })
            };

            stages.push(OscStage {
                kind,
                mult,
                op: ChainOp::ALL[rng.usize(..ChainOp::ALL.len())],
                shift: if do_shift { rng.u8(0..=15) } else { 0 },
                exp: if do_exp { rng.u8(5..=95) } else { 50 },
                vol: if do_vol { rng.u8(..) } else { 255 },
                flags: rng.u8(0..=3),
            });
        }

        OscillatorChainSpec { stages }
    }

    /// Render the chain into exactly `length` samples.
    pub fn render(&self, length: usize) -> Result<Vec<i16>, SynthError> {
        let mut data: Vec<i16> = Vec::new();
        data.try_reserve_exact(length)
            .map_err(|e| SynthError::OutOfMemory(e.to_string()))?;

        let stages: Vec<OscStage> = self.active_stages().collect();
        let mut noise = fastrand::Rng::with_seed(NOISE_SEED);

        for i in 0..length {
            let pos = i as f64 / length as f64;
            let Some(first) = stages.first() else {
                data.push(0);
                continue;
            };

            let mut acc = first.render(pos, 0.0, &mut noise);

            // stage i's op decides how stage i+1 joins the accumulated signal
            for pair in stages.windows(2) {
                let (prev, next) = (pair[0], pair[1]);
                acc = match prev.op {
                    ChainOp::Add => acc + next.render(pos, 0.0, &mut noise),
                    ChainOp::Sub => acc - next.render(pos, 0.0, &mut noise),
                    ChainOp::Mul => acc * next.render(pos, 0.0, &mut noise),
                    ChainOp::PhaseMod => next.render(pos, acc * 0.5, &mut noise),
                };
            }

            data.push((acc * 32768.0).clamp(-32768.0, 32767.0) as i16);
        }

        Ok(data)
    }

    /// Render into a ready-to-play looped entry anchored at A-3. A length of
    /// zero picks `DEFAULT_WAVE_LENGTH`.
    pub fn build_entry(&self, length: usize) -> Result<WavetableEntry, SynthError> {
        let length = if length == 0 { DEFAULT_WAVE_LENGTH } else { length };
        let data = self.render(length)?;
        let lowest = self.lowest_mult().max(1) as u64;

        Ok(WavetableEntry {
            data,
            sample_rate: u32::try_from(length as u64 * REFERENCE_HZ / lowest).unwrap_or(u32::MAX),
            loop_begin: 0,
            loop_end: length,
            flags: WAVE_LOOP,
            base_note: DEFAULT_BASE_NOTE,
        })
    }
}

/// Named starting points for the generator.
pub fn preset(name: &str) -> Option<OscillatorChainSpec> {
    let stage = |kind, mult, op| OscStage { kind, mult, op, ..Default::default() };
    let stages = match name {
        "sine" => vec![stage(WaveformType::Sine, 1, ChainOp::Add)],
        "organ" => vec![
            stage(WaveformType::Sine, 1, ChainOp::Add),
            OscStage { vol: 128, ..stage(WaveformType::Sine, 2, ChainOp::Add) },
            OscStage { vol: 64, ..stage(WaveformType::Sine, 4, ChainOp::Add) },
        ],
        "bell" => vec![
            stage(WaveformType::Sine, 1, ChainOp::PhaseMod),
            stage(WaveformType::Sine, 7, ChainOp::Add),
        ],
        "buzz" => vec![
            stage(WaveformType::Sawtooth, 1, ChainOp::Mul),
            OscStage { flags: STAGE_ABS, ..stage(WaveformType::Square, 3, ChainOp::Add) },
        ],
        "hollow" => vec![OscStage { exp: 80, ..stage(WaveformType::Triangle, 1, ChainOp::Add) }],
        _ => return None,
    };
    Some(OscillatorChainSpec { stages })
}

pub const PRESET_NAMES: [&str; 5] = ["sine", "organ", "bell", "buzz", "hollow"];
