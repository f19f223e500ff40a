use crate::effects::Effect;
use crate::song::{EndPolicy, Song, StepNote};

/// What the tick engine asks of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelCommand {
    NoteOn { note: u8 },
    NoteOff,
    SelectInstrument(usize),
    SetVolume(u8),
    Effect(Option<Effect>), // None clears the running effect
}

/// Receiver of channel commands. The synth implements this; tests record.
pub trait ChannelSink {
    fn command(&mut self, channel: usize, cmd: ChannelCommand);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Stopped,
    Playing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayMode {
    Song,
    /// Loop a single pattern on one channel.
    Pattern { pattern: usize, channel: usize },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelCursor {
    pub pattern: Option<usize>,
    pub row: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayCursor {
    pub song_tick: u64,
    pub song_row: usize,
    pub row_tick: u8,
    pub channels: Vec<ChannelCursor>,
}

pub struct Sequencer {
    transport: Transport,
    mode: PlayMode,
    cursor: PlayCursor,
    speed: Option<u8>, // set by the Fxx effect, overrides the song speeds
}

impl Sequencer {
    pub fn new(num_channels: usize) -> Self {
        Sequencer {
            transport: Transport::Stopped,
            mode: PlayMode::Song,
            cursor: PlayCursor {
                channels: vec![ChannelCursor::default(); num_channels],
                ..Default::default()
            },
            speed: None,
        }
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn mode(&self) -> PlayMode {
        self.mode
    }

    pub fn is_playing(&self) -> bool {
        self.transport == Transport::Playing
    }

    pub fn cursor(&self) -> &PlayCursor {
        &self.cursor
    }

    fn rewind(&mut self, mode: PlayMode, row: usize) {
        self.mode = mode;
        self.speed = None;
        self.cursor.song_tick = 0;
        self.cursor.song_row = row;
        self.cursor.row_tick = 0;
        self.cursor.channels.fill(ChannelCursor::default());
        self.transport = Transport::Playing;
    }

    pub fn play(&mut self, song: &Song, from_row: usize) {
        let row = if from_row < song.song_length { from_row } else { 0 };
        self.rewind(PlayMode::Song, row);
    }

    pub fn play_pattern(&mut self, pattern: usize, channel: usize) {
        self.rewind(PlayMode::Pattern { pattern, channel }, 0);
    }

    /// Stop the transport and release every voice.
    pub fn stop(&mut self, sink: &mut impl ChannelSink) {
        if self.transport == Transport::Stopped {
            return;
        }
        self.transport = Transport::Stopped;
        for ch in 0..self.cursor.channels.len() {
            sink.command(ch, ChannelCommand::NoteOff);
        }
    }

    /// Advance one tick. Rows are read on their first tick.
    pub fn tick(&mut self, song: &Song, sink: &mut impl ChannelSink) {
        if self.transport != Transport::Playing {
            return;
        }

        if self.cursor.row_tick == 0 {
            self.trigger_row(song, sink);
        }

        self.cursor.song_tick += 1;
        self.cursor.row_tick = self.cursor.row_tick.saturating_add(1);

        let speed = self.speed.unwrap_or_else(|| song.speed_for_row(self.cursor.song_row));
        if self.cursor.row_tick >= speed {
            self.cursor.row_tick = 0;
            self.advance_row(song, sink);
        }
    }

    fn advance_row(&mut self, song: &Song, sink: &mut impl ChannelSink) {
        self.cursor.song_row += 1;

        match self.mode {
            PlayMode::Pattern { pattern, .. } => {
                let len = song.pattern(pattern).map_or(1, |p| p.len());
                if self.cursor.song_row >= len {
                    self.cursor.song_row = 0;
                }
            }
            PlayMode::Song => {
                if self.cursor.song_row >= song.song_length {
                    match song.end_policy {
                        EndPolicy::Loop => {
                            self.cursor.song_row = if song.loop_point < song.song_length { song.loop_point } else { 0 };
                        }
                        EndPolicy::Stop => self.stop(sink),
                    }
                }
            }
        }
    }

    fn trigger_row(&mut self, song: &Song, sink: &mut impl ChannelSink) {
        let row = self.cursor.song_row;

        for ch in 0..self.cursor.channels.len() {
            let slot = match self.mode {
                PlayMode::Song => song.locate(ch, row).map(|s| (s.pattern, s.row, s.note_offset)),
                PlayMode::Pattern { pattern, channel } if channel == ch => {
                    song.pattern(pattern).filter(|p| row < p.len()).map(|_| (pattern, row, 0))
                }
                PlayMode::Pattern { .. } => None,
            };

            let cursor = &mut self.cursor.channels[ch];
            let Some((pattern, pattern_row, note_offset)) = slot else {
                *cursor = ChannelCursor::default();
                continue;
            };
            *cursor = ChannelCursor { pattern: Some(pattern), row: pattern_row };

            let Some(step) = song.pattern(pattern).and_then(|p| p.steps.get(pattern_row)) else {
                continue;
            };

            if let Some(inst) = step.instrument {
                if (inst as usize) < song.instruments.len() {
                    sink.command(ch, ChannelCommand::SelectInstrument(inst as usize));
                }
            }

            match step.note {
                Some(StepNote::On(note)) => {
                    let note = (note as i32 + note_offset as i32).clamp(0, 119) as u8;
                    sink.command(ch, ChannelCommand::NoteOn { note });
                    if step.volume.is_none() {
                        if let Some(&v) = song.default_volume.get(ch) {
                            sink.command(ch, ChannelCommand::SetVolume(v));
                        }
                    }
                }
                Some(StepNote::Off) => sink.command(ch, ChannelCommand::NoteOff),
                None => {}
            }

            if let Some(v) = step.volume {
                sink.command(ch, ChannelCommand::SetVolume(v));
            }

            match Effect::decode(step.command) {
                Some(Effect::SetSpeed(s)) => self.speed = Some(s),
                effect => sink.command(ch, ChannelCommand::Effect(effect)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::song::{Pattern, SequenceEntry, Step};

    #[derive(Default)]
    struct Recorder(Vec<(usize, ChannelCommand)>);

    impl ChannelSink for Recorder {
        fn command(&mut self, channel: usize, cmd: ChannelCommand) {
            self.0.push((channel, cmd));
        }
    }

    impl Recorder {
        fn note_ons(&self) -> Vec<(usize, u8)> {
            self.0
                .iter()
                .filter_map(|(ch, c)| match c {
                    ChannelCommand::NoteOn { note } => Some((*ch, *note)),
                    _ => None,
                })
                .collect()
        }
    }

    fn song_with(steps: &[(usize, Step)], channels: usize) -> Song {
        let mut song = Song::new(channels);
        song.song_length = 4;
        song.song_speed = 2;
        song.song_speed2 = 2;
        song.patterns[1] = Pattern::new(4);
        for &(row, step) in steps {
            song.set_step(1, row, step);
        }
        song.set_sequence(0, SequenceEntry { position: 0, pattern: 1, note_offset: 0 });
        song
    }

    #[test]
    fn first_tick_triggers_one_note() {
        let song = song_with(&[(0, Step::note(48, 0))], 4);
        let mut seq = Sequencer::new(4);
        let mut rec = Recorder::default();

        seq.play(&song, 0);
        seq.tick(&song, &mut rec);

        assert_eq!(rec.note_ons(), vec![(0, 48)]);
        assert!(rec.0.iter().all(|(ch, _)| *ch == 0));
        assert_eq!(seq.cursor().channels[0], ChannelCursor { pattern: Some(1), row: 0 });
        assert_eq!(seq.cursor().channels[1].pattern, None);
    }

    #[test]
    fn rows_advance_at_speed() {
        let song = song_with(&[(0, Step::note(48, 0)), (1, Step::note(50, 0))], 1);
        let mut seq = Sequencer::new(1);
        let mut rec = Recorder::default();
        seq.play(&song, 0);

        seq.tick(&song, &mut rec);
        seq.tick(&song, &mut rec);
        assert_eq!(rec.note_ons().len(), 1);
        seq.tick(&song, &mut rec);
        assert_eq!(rec.note_ons(), vec![(0, 48), (0, 50)]);
        assert_eq!(seq.cursor().song_tick, 3);
        assert_eq!(seq.cursor().song_row, 1);
    }

    #[test]
    fn loops_or_stops_at_song_end() {
        let mut song = song_with(&[(0, Step::note(48, 0))], 1);
        let mut seq = Sequencer::new(1);
        let mut rec = Recorder::default();

        seq.play(&song, 0);
        for _ in 0..8 {
            seq.tick(&song, &mut rec);
        }
        assert!(seq.is_playing());
        assert_eq!(seq.cursor().song_row, 0);
        seq.tick(&song, &mut rec);
        assert_eq!(rec.note_ons().len(), 2);

        song.end_policy = EndPolicy::Stop;
        seq.play(&song, 0);
        rec.0.clear();
        for _ in 0..8 {
            seq.tick(&song, &mut rec);
        }
        assert_eq!(seq.transport(), Transport::Stopped);
        assert!(rec.0.contains(&(0, ChannelCommand::NoteOff)));
        let before = rec.0.len();
        seq.tick(&song, &mut rec);
        assert_eq!(rec.0.len(), before);
    }

    #[test]
    fn note_offset_and_speed_effect() {
        let mut song = song_with(&[], 1);
        song.set_step(1, 0, Step { command: 0x0f01, ..Step::note(40, 0) });
        song.sequences[0][0].note_offset = 12;

        let mut seq = Sequencer::new(1);
        let mut rec = Recorder::default();
        seq.play(&song, 0);
        seq.tick(&song, &mut rec);
        assert_eq!(rec.note_ons(), vec![(0, 52)]);
        // speed 1: the next tick is already row 1
        assert_eq!(seq.cursor().song_row, 1);
    }

    #[test]
    fn missing_pattern_is_silence() {
        let mut song = Song::new(2);
        song.set_sequence(0, SequenceEntry { position: 0, pattern: 9999, note_offset: 0 });
        let mut seq = Sequencer::new(2);
        let mut rec = Recorder::default();
        seq.play(&song, 0);
        for _ in 0..20 {
            seq.tick(&song, &mut rec);
        }
        assert!(rec.0.is_empty());
        assert!(seq.is_playing());
    }

    #[test]
    fn pattern_preview_loops_one_channel() {
        let song = song_with(&[(0, Step::note(60, 0))], 3);
        let mut seq = Sequencer::new(3);
        let mut rec = Recorder::default();
        seq.play_pattern(1, 2);
        for _ in 0..9 {
            seq.tick(&song, &mut rec);
        }
        assert_eq!(rec.note_ons(), vec![(2, 60), (2, 60)]);
    }
}
