use log::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::SynthError;
use crate::gate::Gate;
use crate::history::{History, Snapshot, UndoStack};
use crate::instrument::Instrument;
use crate::persistence::SongFile;
use crate::sequencer::{ChannelCommand, ChannelSink, PlayMode, Sequencer};
use crate::song::{SequenceEntry, Song, Step};
use crate::synth::Synth;
use crate::wave_edit::{EditOutcome, WaveEdit};
use crate::wavegen::OscillatorChainSpec;
use crate::wavestore::{WaveStore, WavetableEntry};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelStatus {
    pub pattern: Option<usize>,
    pub row: usize,
    pub level: f32,
    pub enabled: bool,
}

/// What the UI draws each frame. Taken in one gate acquisition.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub playing: bool,
    pub song_tick: u64,
    pub song_row: usize,
    pub elapsed: f64, // seconds
    pub channels: Vec<ChannelStatus>,
}

/// The engine context: song, wavetables, voices and transport. Every core
/// operation is a method here; nothing lives in globals.
pub struct Tracker {
    config: EngineConfig,
    song: Song,
    waves: WaveStore,
    synth: Synth,
    sequencer: Sequencer,
    history: Box<dyn History>,
    master_volume: f32,
    samples_per_tick: u32,
    tick_countdown: u32,
    played_frames: u64,
}

impl Tracker {
    pub fn new(config: EngineConfig) -> Self {
        let config = config.validated();
        let history = Box::new(UndoStack::new(config.history_depth));
        Self::with_history(config, history)
    }

    pub fn with_history(config: EngineConfig, history: Box<dyn History>) -> Self {
        let config = config.validated();
        let mut song = Song::new(config.num_channels);
        song.song_rate = config.song_rate;

        let mut tracker = Tracker {
            synth: Synth::new(config.sample_rate, config.num_channels),
            sequencer: Sequencer::new(config.num_channels),
            master_volume: config.master_volume,
            song,
            waves: WaveStore::new(),
            history,
            samples_per_tick: 1,
            tick_countdown: 0,
            played_frames: 0,
            config,
        };
        tracker.update_tick_length();
        tracker
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn song(&self) -> &Song {
        &self.song
    }

    pub fn waves(&self) -> &WaveStore {
        &self.waves
    }

    pub fn synth(&self) -> &Synth {
        &self.synth
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn is_playing(&self) -> bool {
        self.sequencer.is_playing()
    }

    pub fn samples_per_tick(&self) -> u32 {
        self.samples_per_tick
    }

    fn update_tick_length(&mut self) {
        let rate = self.song.song_rate.clamp(1, 1000) as u32;
        self.samples_per_tick = (self.config.sample_rate / rate).max(1);
        self.tick_countdown = self.tick_countdown.min(self.samples_per_tick);
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.config.sample_rate = sample_rate.clamp(8000, 192_000);
        self.synth.set_sample_rate(self.config.sample_rate);
        self.update_tick_length();
    }

    pub fn set_song_rate(&mut self, rate: u16) {
        self.song.song_rate = rate.clamp(1, 1000);
        self.update_tick_length();
        debug!("Song rate {} Hz, {} samples per tick", self.song.song_rate, self.samples_per_tick);
    }

    pub fn set_master_volume(&mut self, volume: f32) {
        self.master_volume = volume.clamp(0.0, 2.0);
    }

    pub fn set_channel_enabled(&mut self, channel: usize, enabled: bool) {
        self.synth.set_channel_enabled(channel, enabled);
    }

    // ---- audio context ----

    fn tick(&mut self) {
        self.sequencer.tick(&self.song, &mut self.synth);
        self.synth.advance_tick(&self.song.instruments, &self.waves);
    }

    /// Fill an interleaved buffer of `frame_channels`-wide frames. Ticks run
    /// every `samples_per_tick` frames whether or not the song is playing, so
    /// previewed notes keep their effects and envelopes moving.
    pub fn render(&mut self, out: &mut [f32], frame_channels: usize) {
        for frame in out.chunks_mut(frame_channels.max(1)) {
            if self.tick_countdown == 0 {
                self.tick();
                self.tick_countdown = self.samples_per_tick;
            }
            self.tick_countdown -= 1;

            let sample = (self.synth.next_sample(&self.waves) * self.master_volume).clamp(-1.0, 1.0);
            frame.fill(sample);

            if self.sequencer.is_playing() {
                self.played_frames += 1;
            }
        }
    }

    // ---- transport ----

    pub fn play(&mut self, from_row: usize) {
        self.synth.reset();
        self.sequencer.play(&self.song, from_row);
        self.tick_countdown = 0;
        self.played_frames = 0;
        info!("Playback started at row {}", self.sequencer.cursor().song_row);
    }

    pub fn play_pattern(&mut self, pattern: usize, channel: usize) {
        self.synth.reset();
        self.sequencer.play_pattern(pattern, channel);
        self.tick_countdown = 0;
        self.played_frames = 0;
        info!("Previewing pattern {} on channel {}", pattern, channel);
    }

    pub fn stop(&mut self) {
        if self.sequencer.is_playing() {
            info!("Playback stopped at tick {}", self.sequencer.cursor().song_tick);
        }
        self.sequencer.stop(&mut self.synth);
    }

    /// Play a note outside the sequence, e.g. from the keyboard.
    pub fn note_on(&mut self, channel: usize, instrument: usize, note: u8) {
        if instrument >= self.song.instruments.len() {
            warn!("Note on with missing instrument {}", instrument);
            return;
        }
        self.synth.command(channel, ChannelCommand::SelectInstrument(instrument));
        self.synth.command(channel, ChannelCommand::NoteOn { note });
        self.synth.retune_channel(channel, &self.song.instruments, &self.waves);
    }

    pub fn note_off(&mut self, channel: usize) {
        self.synth.command(channel, ChannelCommand::NoteOff);
    }

    // ---- edits ----

    /// Swap in a finished wavetable and keep the replaced one as the undo
    /// snapshot.
    pub fn install_wave(&mut self, index: usize, entry: WavetableEntry) -> bool {
        match self.waves.replace(index, entry) {
            Some(old) => {
                self.history.record(Snapshot::Wave { index, entry: old });
                true
            }
            None => {
                warn!("Wavetable {} out of range", index);
                false
            }
        }
    }

    pub fn apply_wave_edit(&mut self, index: usize, edit: &WaveEdit) -> Result<EditOutcome, SynthError> {
        let Some(current) = self.waves.get(index) else {
            warn!("Wavetable {} out of range", index);
            return Ok(EditOutcome::Unchanged);
        };

        let mut edited = current.clone();
        let outcome = edit.apply(&mut edited)?;
        if outcome == EditOutcome::Changed {
            self.install_wave(index, edited);
        }
        Ok(outcome)
    }

    pub fn regenerate_wave(&mut self, index: usize, spec: &OscillatorChainSpec, length: usize) -> Result<bool, SynthError> {
        if self.waves.get(index).is_none() {
            warn!("Wavetable {} out of range", index);
            return Ok(false);
        }
        let entry = spec.build_entry(length)?;
        Ok(self.install_wave(index, entry))
    }

    pub fn randomize_wave(&mut self, index: usize, seed: u64, length: usize) -> Result<OscillatorChainSpec, SynthError> {
        let spec = OscillatorChainSpec::randomize(&mut fastrand::Rng::with_seed(seed));
        self.regenerate_wave(index, &spec, length)?;
        Ok(spec)
    }

    pub fn set_step(&mut self, pattern: usize, row: usize, step: Step) -> bool {
        let Some(old) = self.song.pattern(pattern).filter(|p| row < p.len()) else {
            warn!("Step {}:{} out of range", pattern, row);
            return false;
        };
        if old.steps[row] == step {
            return true;
        }
        self.history.record(Snapshot::Pattern { index: pattern, pattern: old.clone() });
        self.song.set_step(pattern, row, step)
    }

    pub fn set_instrument(&mut self, index: usize, instrument: Instrument) -> bool {
        let Some(slot) = self.song.instruments.get_mut(index) else {
            warn!("Instrument {} out of range", index);
            return false;
        };
        if *slot == instrument {
            return true;
        }
        let old = std::mem::replace(slot, instrument);
        self.history.record(Snapshot::Instrument { index, instrument: old });
        true
    }

    pub fn set_sequence(&mut self, channel: usize, entry: SequenceEntry) -> bool {
        self.song.set_sequence(channel, entry)
    }

    /// Restore the most recent snapshot. Returns false with nothing to undo.
    pub fn undo(&mut self) -> bool {
        match self.history.pop() {
            Some(Snapshot::Wave { index, entry }) => {
                self.waves.replace(index, entry);
            }
            Some(Snapshot::Pattern { index, pattern }) => {
                if let Some(slot) = self.song.patterns.get_mut(index) {
                    *slot = pattern;
                }
            }
            Some(Snapshot::Instrument { index, instrument }) => {
                if let Some(slot) = self.song.instruments.get_mut(index) {
                    *slot = instrument;
                }
            }
            None => return false,
        }
        true
    }

    // ---- whole-song state ----

    pub fn load_song_file(&mut self, file: SongFile) {
        self.stop();
        let SongFile { mut song, mut waves, .. } = file;
        song.sanitize(self.config.num_channels);
        waves.sanitize();
        self.song = song;
        self.waves = waves;
        self.history.clear();
        self.synth.reset();
        self.update_tick_length();
        info!("Loaded song \"{}\"", self.song.title);
    }

    pub fn song_file(&self) -> SongFile {
        SongFile::new(self.song.clone(), self.waves.clone())
    }

    pub fn status(&self) -> StatusSnapshot {
        let cursor = self.sequencer.cursor();
        let playing = self.sequencer.is_playing();
        let preview_only = matches!(self.sequencer.mode(), PlayMode::Pattern { .. });

        StatusSnapshot {
            playing,
            song_tick: cursor.song_tick,
            song_row: if preview_only { 0 } else { cursor.song_row },
            elapsed: self.played_frames as f64 / self.config.sample_rate as f64,
            channels: self
                .synth
                .channels()
                .iter()
                .enumerate()
                .map(|(i, ch)| {
                    let pos = cursor.channels.get(i).copied().unwrap_or_default();
                    ChannelStatus {
                        pattern: if playing { pos.pattern } else { None },
                        row: pos.row,
                        level: ch.level(),
                        enabled: ch.is_enabled(),
                    }
                })
                .collect(),
        }
    }
}

/// Thread-safe handle: the edit side and the audio callback share one
/// `Tracker` behind the gate.
#[derive(Clone)]
pub struct SynthEngine {
    gate: Gate<Tracker>,
}

impl SynthEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self::from_tracker(Tracker::new(config))
    }

    pub fn from_tracker(tracker: Tracker) -> Self {
        SynthEngine { gate: Gate::new(tracker) }
    }

    pub fn gate(&self) -> &Gate<Tracker> {
        &self.gate
    }

    /// Audio-context entry. Never blocks: while an edit holds the gate the
    /// block is silence. Returns whether the engine produced the block.
    pub fn render(&self, out: &mut [f32], frame_channels: usize) -> bool {
        match self.gate.try_lock() {
            Some(mut tracker) => {
                tracker.render(out, frame_channels);
                true
            }
            None => {
                out.fill(0.0);
                false
            }
        }
    }

    /// The edit itself runs on a copy outside the gate; only the copy-out and
    /// the swap-in hold it.
    pub fn apply_wave_edit(&self, index: usize, edit: &WaveEdit) -> Result<EditOutcome, SynthError> {
        let Some(mut entry) = self.gate.lock().waves().get(index).cloned() else {
            warn!("Wavetable {} out of range", index);
            return Ok(EditOutcome::Unchanged);
        };

        let outcome = edit.apply(&mut entry)?;
        if outcome == EditOutcome::Changed {
            self.gate.lock().install_wave(index, entry);
        }
        Ok(outcome)
    }

    pub fn regenerate_wave(&self, index: usize, spec: &OscillatorChainSpec, length: usize) -> Result<bool, SynthError> {
        let entry = spec.build_entry(length)?;
        Ok(self.gate.lock().install_wave(index, entry))
    }

    pub fn randomize_wave(&self, index: usize, length: usize) -> Result<OscillatorChainSpec, SynthError> {
        let seed = fastrand::u64(..);
        debug!("Randomizing wavetable {} with seed {:#x}", index, seed);
        let spec = OscillatorChainSpec::randomize(&mut fastrand::Rng::with_seed(seed));
        self.regenerate_wave(index, &spec, length)?;
        Ok(spec)
    }

    pub fn set_step(&self, pattern: usize, row: usize, step: Step) -> bool {
        self.gate.lock().set_step(pattern, row, step)
    }

    pub fn set_instrument(&self, index: usize, instrument: Instrument) -> bool {
        self.gate.lock().set_instrument(index, instrument)
    }

    pub fn set_sequence(&self, channel: usize, entry: SequenceEntry) -> bool {
        self.gate.lock().set_sequence(channel, entry)
    }

    pub fn set_song_rate(&self, rate: u16) {
        self.gate.lock().set_song_rate(rate);
    }

    pub fn set_master_volume(&self, volume: f32) {
        self.gate.lock().set_master_volume(volume);
    }

    pub fn set_channel_enabled(&self, channel: usize, enabled: bool) {
        self.gate.lock().set_channel_enabled(channel, enabled);
    }

    pub fn play(&self, from_row: usize) {
        self.gate.lock().play(from_row);
    }

    pub fn play_pattern(&self, pattern: usize, channel: usize) {
        self.gate.lock().play_pattern(pattern, channel);
    }

    pub fn stop(&self) {
        self.gate.lock().stop();
    }

    pub fn note_on(&self, channel: usize, instrument: usize, note: u8) {
        self.gate.lock().note_on(channel, instrument, note);
    }

    pub fn note_off(&self, channel: usize) {
        self.gate.lock().note_off(channel);
    }

    pub fn undo(&self) -> bool {
        self.gate.lock().undo()
    }

    pub fn status(&self) -> StatusSnapshot {
        self.gate.lock().status()
    }

    pub fn load_song_file(&self, file: SongFile) {
        self.gate.lock().load_song_file(file);
    }

    pub fn song_file(&self) -> SongFile {
        self.gate.lock().song_file()
    }

    /// Open the default output device and drive the engine from its callback.
    /// Dropping the returned stream stops output.
    #[cfg(feature = "playback")]
    pub fn start_output(&self) -> Result<OutputStream, SynthError> {
        use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

        let host = cpal::default_host();
        let device = host.default_output_device()
            .ok_or_else(|| SynthError::AudioError("No output device".to_string()))?;
        let config: cpal::StreamConfig = device.default_output_config()
            .map_err(|e| SynthError::AudioError(e.to_string()))?
            .config();

        let frame_channels = config.channels as usize;
        self.gate.lock().set_sample_rate(config.sample_rate.0);

        let gate = self.gate.clone();
        let stream = device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                match gate.try_lock() {
                    Some(mut tracker) => tracker.render(data, frame_channels),
                    None => data.fill(0.0),
                }
            },
            |err| log::error!("Stream error: {}", err),
            None,
        ).map_err(|e| SynthError::AudioError(e.to_string()))?;

        stream.play().map_err(|e| SynthError::AudioError(e.to_string()))?;
        info!("Output started: {} Hz, {} channels", config.sample_rate.0, frame_channels);

        Ok(OutputStream { _stream: stream })
    }
}

#[cfg(feature = "playback")]
pub struct OutputStream {
    _stream: cpal::Stream,
}
