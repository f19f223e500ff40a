// Per-channel oscillator, envelope and filter state. Everything here runs on
// the audio thread: no allocation after `Synth::new`, no locking, no logging.

use crate::effects::Effect;
use crate::filter::ChannelFilter;
use crate::instrument::{Instrument, InstrumentSource};
use crate::sequencer::{ChannelCommand, ChannelSink};
use crate::song::MAX_VOLUME;
use crate::utils::{base_note_freq, note_to_freq};
use crate::waveform::WaveformType;
use crate::wavestore::{WaveStore, WavetableEntry, WAVE_PINGPONG};

pub const MAX_CHANNELS: usize = 32;
/// Highest playable note (B-9). Pitches from effects are held to 0..=MAX_NOTE.
pub const MAX_NOTE: f64 = 119.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeStage {
    Attack,
    Decay,
    Sustain,
    Release,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Source {
    Silent,
    Waveform(WaveformType),
    Wavetable(usize),
}

#[derive(Debug, Clone)]
pub struct Channel {
    instrument: Option<usize>,
    source: Source,
    note: f64,
    slide: f64, // semitones accumulated by portamento
    arp_offset: f64,
    vib_offset: f64,
    vib_phase: u8,
    phase: f64, // cycle fraction for waveforms, sample position for wavetables
    reverse: bool,
    step: f64,
    env_stage: EnvelopeStage,
    env_level: f32,
    attack_rate: f32,
    decay_rate: f32,
    sustain: f32,
    release_secs: f32,
    release_rate: f32,
    volume: u8,
    gain: f32,
    effect: Option<Effect>,
    effect_tick: u32,
    filter: ChannelFilter,
    filter_on: bool,
    enabled: bool,
}

impl Default for Channel {
    fn default() -> Self {
        Channel {
            instrument: None,
            source: Source::Silent,
            note: 0.0,
            slide: 0.0,
            arp_offset: 0.0,
            vib_offset: 0.0,
            vib_phase: 0,
            phase: 0.0,
            reverse: false,
            step: 0.0,
            env_stage: EnvelopeStage::Done,
            env_level: 0.0,
            attack_rate: 1.0,
            decay_rate: 1.0,
            sustain: 1.0,
            release_secs: 0.0,
            release_rate: 1.0,
            volume: MAX_VOLUME,
            gain: 0.0,
            effect: None,
            effect_tick: 0,
            filter: ChannelFilter::default(),
            filter_on: false,
            enabled: true,
        }
    }
}

impl Channel {
    pub fn is_active(&self) -> bool {
        self.env_stage != EnvelopeStage::Done
    }

    pub fn envelope_stage(&self) -> EnvelopeStage {
        self.env_stage
    }

    pub fn instrument(&self) -> Option<usize> {
        self.instrument
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Current pitch in semitones, effects included.
    pub fn pitch(&self) -> f64 {
        self.note + self.slide + self.arp_offset + self.vib_offset
    }

    /// Display level in 0..=1: envelope times channel and instrument volume.
    pub fn level(&self) -> f32 {
        if !self.is_active() {
            return 0.0;
        }
        (self.env_level * self.volume as f32 / MAX_VOLUME as f32 * self.gain).clamp(0.0, 1.0)
    }

    fn note_on(&mut self, note: u8) {
        self.note = note as f64;
        self.slide = 0.0;
        self.arp_offset = 0.0;
        self.vib_offset = 0.0;
        self.vib_phase = 0;
        self.phase = 0.0;
        self.reverse = false;
        self.env_stage = EnvelopeStage::Attack;
        self.env_level = 0.0;
        self.volume = MAX_VOLUME;
        self.effect = None;
        self.filter.reset();
    }

    fn note_off(&mut self, sample_rate: f32) {
        if !self.is_active() {
            return;
        }
        self.env_stage = EnvelopeStage::Release;
        self.release_rate = rate_for(self.release_secs, sample_rate) * self.env_level.max(f32::EPSILON);
    }

    fn set_effect(&mut self, effect: Option<Effect>) {
        self.arp_offset = 0.0;
        self.effect = effect;
        self.effect_tick = 0;
        if let Some(Effect::SetVolume(v)) = effect {
            self.volume = v.min(MAX_VOLUME);
        }
    }

    /// Per-tick effect processing.
    fn run_effect(&mut self) {
        let tick = self.effect_tick;
        self.effect_tick = self.effect_tick.wrapping_add(1);

        match self.effect {
            Some(Effect::Arpeggio { x, y }) => {
                self.arp_offset = [0.0, x as f64, y as f64][(tick % 3) as usize];
            }
            Some(Effect::PortaUp(p)) if tick > 0 => {
                self.slide = (self.slide + p as f64 / 16.0).min(MAX_NOTE);
            }
            Some(Effect::PortaDown(p)) if tick > 0 => {
                self.slide = (self.slide - p as f64 / 16.0).max(-MAX_NOTE);
            }
            Some(Effect::Vibrato { speed, depth }) => {
                self.vib_phase = self.vib_phase.wrapping_add(speed << 2);
                let angle = self.vib_phase as f64 / 256.0 * std::f64::consts::TAU;
                self.vib_offset = angle.sin() * depth as f64 / 16.0;
            }
            Some(Effect::VolumeFade { up, down }) if tick > 0 => {
                let v = self.volume as i32 + up as i32 - down as i32;
                self.volume = v.clamp(0, MAX_VOLUME as i32) as u8;
            }
            _ => {}
        }

        if !matches!(self.effect, Some(Effect::Vibrato { .. })) {
            self.vib_offset = 0.0;
        }
    }

    /// Recompute everything derived from the instrument and wavetable.
    fn retune(&mut self, instruments: &[Instrument], waves: &WaveStore, sample_rate: f32) {
        let Some(inst) = self.instrument.and_then(|i| instruments.get(i)) else {
            self.source = Source::Silent;
            return;
        };

        self.gain = inst.volume.max(0.0);
        self.attack_rate = rate_for(inst.attack, sample_rate);
        self.sustain = inst.sustain.clamp(0.0, 1.0);
        self.decay_rate = rate_for(inst.decay, sample_rate) * (1.0 - self.sustain).max(f32::EPSILON);
        self.release_secs = inst.release;

        let freq = note_to_freq(inst.pitch_of(self.pitch()).clamp(0.0, MAX_NOTE));
        let sr = sample_rate as f64;

        match inst.source {
            InstrumentSource::Waveform(kind) => {
                self.source = Source::Waveform(kind);
                self.step = freq / sr;
            }
            InstrumentSource::Wavetable(index) => match waves.get(index).filter(|w| !w.is_empty()) {
                Some(w) => {
                    self.source = Source::Wavetable(index);
                    self.step = freq / base_note_freq(w.base_note) * w.sample_rate as f64 / sr;
                }
                None => self.source = Source::Silent,
            },
        }

        match &inst.filter {
            Some(params) => {
                self.filter.configure(params, sample_rate);
                self.filter_on = true;
            }
            None => self.filter_on = false,
        }
    }

    #[inline]
    fn advance_envelope(&mut self) {
        match self.env_stage {
            EnvelopeStage::Attack => {
                self.env_level += self.attack_rate;
                if self.env_level >= 1.0 {
                    self.env_level = 1.0;
                    self.env_stage = EnvelopeStage::Decay;
                }
            }
            EnvelopeStage::Decay => {
                self.env_level -= self.decay_rate;
                if self.env_level <= self.sustain {
                    self.env_level = self.sustain;
                    self.env_stage = EnvelopeStage::Sustain;
                }
            }
            EnvelopeStage::Sustain => {}
            EnvelopeStage::Release => {
                self.env_level -= self.release_rate;
                if self.env_level <= 0.0 {
                    self.env_level = 0.0;
                    self.env_stage = EnvelopeStage::Done;
                }
            }
            EnvelopeStage::Done => {}
        }
    }

    #[inline]
    fn next_sample(&mut self, waves: &WaveStore) -> f32 {
        if !self.is_active() {
            return 0.0;
        }

        let raw = match self.source {
            Source::Silent => 0.0,
            Source::Waveform(kind) => {
                let s = kind.generate_sample(self.phase);
                self.phase = (self.phase + self.step).fract();
                s as f32
            }
            Source::Wavetable(index) => match waves.get(index) {
                Some(w) => match self.read_wave(w) {
                    Some(s) => s,
                    None => {
                        // one-shot sample ran out
                        self.env_stage = EnvelopeStage::Done;
                        return 0.0;
                    }
                },
                None => 0.0,
            },
        };

        self.advance_envelope();

        let mut out = raw * self.env_level * self.volume as f32 / MAX_VOLUME as f32 * self.gain;
        if self.filter_on {
            out = self.filter.process(out);
        }

        if self.enabled { out } else { 0.0 }
    }

    #[inline]
    fn read_wave(&mut self, w: &WavetableEntry) -> Option<f32> {
        let len = w.len();
        let looped = w.is_looped();
        let (begin, end) = (w.loop_begin as f64, w.loop_end as f64);

        // the entry may have shrunk since the last block
        if self.phase >= len as f64 || self.phase < 0.0 {
            if !looped {
                return None;
            }
            self.phase = begin;
            self.reverse = false;
        }

        let idx = self.phase as usize;
        let frac = (self.phase - idx as f64) as f32;
        let pingpong = looped && w.flags & WAVE_PINGPONG != 0;
        let next = if pingpong {
            (idx + 1).min(w.loop_end.max(1) - 1)
        } else if looped && idx + 1 >= w.loop_end {
            w.loop_begin
        } else {
            (idx + 1).min(len - 1)
        };
        let s0 = w.data[idx] as f32 / 32768.0;
        let s1 = w.data[next] as f32 / 32768.0;
        let out = s0 * (1.0 - frac) + s1 * frac;

        if self.reverse {
            self.phase -= self.step;
        } else {
            self.phase += self.step;
        }

        if pingpong {
            // bounce between loop_begin and the last loop sample; the intro
            // before loop_begin plays straight through
            let last = (end - 1.0).max(begin);
            let span = last - begin;
            if span <= 0.0 {
                if self.phase > last || self.reverse {
                    self.phase = begin;
                    self.reverse = false;
                }
            } else if !self.reverse && self.phase > last {
                self.phase = last - (self.phase - last) % span;
                self.reverse = true;
            } else if self.reverse && self.phase < begin {
                self.phase = begin + (begin - self.phase) % span;
                self.reverse = false;
            }
        } else if looped && self.phase >= end {
            self.phase = begin + (self.phase - end) % (end - begin);
        }

        Some(out)
    }
}

#[inline]
fn rate_for(seconds: f32, sample_rate: f32) -> f32 {
    if seconds <= 0.0 { 1.0 } else { 1.0 / (seconds * sample_rate) }
}

pub struct Synth {
    sample_rate: f32,
    channels: Vec<Channel>,
}

impl Synth {
    pub fn new(sample_rate: u32, num_channels: usize) -> Self {
        Synth {
            sample_rate: sample_rate as f32,
            channels: vec![Channel::default(); num_channels.clamp(1, MAX_CHANNELS)],
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate as u32
    }

    /// Pitch steps and envelope rates follow on the next tick.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate.max(1) as f32;
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, index: usize) -> Option<&Channel> {
        self.channels.get(index)
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Silence every voice, keeping mute settings.
    pub fn reset(&mut self) {
        for ch in &mut self.channels {
            let enabled = ch.enabled;
            *ch = Channel { enabled, ..Channel::default() };
        }
    }

    pub fn set_channel_enabled(&mut self, index: usize, enabled: bool) {
        if let Some(ch) = self.channels.get_mut(index) {
            ch.enabled = enabled;
        }
    }

    /// Run per-tick effects and refresh pitch, envelope rates and filters.
    pub fn advance_tick(&mut self, instruments: &[Instrument], waves: &WaveStore) {
        for ch in &mut self.channels {
            ch.run_effect();
            ch.retune(instruments, waves, self.sample_rate);
        }
    }

    /// Refresh one channel right away, for notes played outside the tick.
    pub fn retune_channel(&mut self, index: usize, instruments: &[Instrument], waves: &WaveStore) {
        if let Some(ch) = self.channels.get_mut(index) {
            ch.retune(instruments, waves, self.sample_rate);
        }
    }

    /// Mix all channels into one mono sample.
    #[inline]
    pub fn next_sample(&mut self, waves: &WaveStore) -> f32 {
        self.channels.iter_mut().map(|ch| ch.next_sample(waves)).sum()
    }
}

impl ChannelSink for Synth {
    fn command(&mut self, channel: usize, cmd: ChannelCommand) {
        let sample_rate = self.sample_rate;
        let Some(ch) = self.channels.get_mut(channel) else {
            return;
        };

        match cmd {
            ChannelCommand::SelectInstrument(i) => ch.instrument = Some(i),
            ChannelCommand::NoteOn { note } => {
                if ch.instrument.is_some() {
                    ch.note_on(note);
                }
            }
            ChannelCommand::NoteOff => ch.note_off(sample_rate),
            ChannelCommand::SetVolume(v) => ch.volume = v.min(MAX_VOLUME),
            ChannelCommand::Effect(effect) => ch.set_effect(effect),
        }
    }
}
