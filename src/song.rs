use log::warn;
use serde::{Deserialize, Serialize};

use crate::instrument::{Instrument, NUM_INSTRUMENTS};

pub const NUM_PATTERNS: usize = 256;
pub const MAX_PATTERN_STEPS: usize = 256;
pub const DEFAULT_PATTERN_STEPS: usize = 16;
pub const MAX_VOLUME: u8 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepNote {
    On(u8),
    Off,
}

/// One row of one channel's pattern.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub note: Option<StepNote>,
    pub instrument: Option<u8>,
    pub volume: Option<u8>, // 0..=MAX_VOLUME
    pub command: u16,
}

impl Step {
    pub fn note(note: u8, instrument: u8) -> Self {
        Step {
            note: Some(StepNote::On(note)),
            instrument: Some(instrument),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Step::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pattern {
    pub steps: Vec<Step>,
}

impl Default for Pattern {
    fn default() -> Self {
        Pattern::new(DEFAULT_PATTERN_STEPS)
    }
}

impl Pattern {
    pub fn new(num_steps: usize) -> Self {
        Pattern {
            steps: vec![Step::default(); num_steps.clamp(1, MAX_PATTERN_STEPS)],
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.iter().all(Step::is_empty)
    }
}

/// A pattern placed on a channel's timeline at `position` (in rows).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceEntry {
    pub position: usize,
    pub pattern: usize,
    pub note_offset: i8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndPolicy {
    Loop,
    Stop,
}

/// Where a channel is inside its sequence at some song row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotPosition {
    pub pattern: usize,
    pub row: usize,
    pub note_offset: i8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub title: String,
    pub patterns: Vec<Pattern>,
    pub sequences: Vec<Vec<SequenceEntry>>, // one sorted timeline per channel
    pub instruments: Vec<Instrument>,
    pub song_length: usize, // rows
    pub loop_point: usize,
    pub song_speed: u8,  // ticks per even row
    pub song_speed2: u8, // ticks per odd row
    pub song_rate: u16,  // ticks per second
    pub end_policy: EndPolicy,
    pub default_volume: Vec<u8>,
}

impl Song {
    pub fn new(num_channels: usize) -> Self {
        Song {
            title: String::new(),
            patterns: vec![Pattern::default(); NUM_PATTERNS],
            sequences: vec![Vec::new(); num_channels],
            instruments: vec![Instrument::default(); NUM_INSTRUMENTS],
            song_length: 64,
            loop_point: 0,
            song_speed: 6,
            song_speed2: 6,
            song_rate: 50,
            end_policy: EndPolicy::Loop,
            default_volume: vec![MAX_VOLUME; num_channels],
        }
    }

    pub fn num_channels(&self) -> usize {
        self.sequences.len()
    }

    pub fn pattern(&self, index: usize) -> Option<&Pattern> {
        self.patterns.get(index)
    }

    pub fn instrument(&self, index: usize) -> Option<&Instrument> {
        self.instruments.get(index)
    }

    /// Ticks the given row lasts.
    pub fn speed_for_row(&self, row: usize) -> u8 {
        let speed = if row % 2 == 0 { self.song_speed } else { self.song_speed2 };
        speed.max(1)
    }

    /// Place a pattern on a channel; an entry already at that position is replaced.
    pub fn set_sequence(&mut self, channel: usize, entry: SequenceEntry) -> bool {
        let Some(seq) = self.sequences.get_mut(channel) else {
            return false;
        };
        match seq.binary_search_by_key(&entry.position, |e| e.position) {
            Ok(i) => seq[i] = entry,
            Err(i) => seq.insert(i, entry),
        }
        true
    }

    pub fn remove_sequence(&mut self, channel: usize, position: usize) -> Option<SequenceEntry> {
        let seq = self.sequences.get_mut(channel)?;
        let i = seq.binary_search_by_key(&position, |e| e.position).ok()?;
        Some(seq.remove(i))
    }

    pub fn set_step(&mut self, pattern: usize, row: usize, step: Step) -> bool {
        match self.patterns.get_mut(pattern).and_then(|p| p.steps.get_mut(row)) {
            Some(slot) => {
                *slot = step;
                true
            }
            None => false,
        }
    }

    /// Resolve a channel's pattern and row at `song_row`. Missing or
    /// out-of-range pattern references resolve to `None` (silence).
    pub fn locate(&self, channel: usize, song_row: usize) -> Option<SlotPosition> {
        let seq = self.sequences.get(channel)?;
        let idx = seq.partition_point(|e| e.position <= song_row);
        let entry = seq.get(idx.checked_sub(1)?)?;
        let pattern = self.patterns.get(entry.pattern)?;
        let row = song_row - entry.position;

        (row < pattern.len()).then_some(SlotPosition {
            pattern: entry.pattern,
            row,
            note_offset: entry.note_offset,
        })
    }

    /// Re-establish table sizes and ordering after deserialization.
    pub fn sanitize(&mut self, num_channels: usize) {
        self.patterns.resize_with(NUM_PATTERNS, Pattern::default);
        for p in &mut self.patterns {
            if p.steps.is_empty() {
                p.steps.push(Step::default());
            }
            p.steps.truncate(MAX_PATTERN_STEPS);
        }
        self.instruments.resize_with(NUM_INSTRUMENTS, Instrument::default);
        self.sequences.resize_with(num_channels, Vec::new);
        self.default_volume.resize(num_channels, MAX_VOLUME);

        for (channel, seq) in self.sequences.iter_mut().enumerate() {
            seq.sort_by_key(|e| e.position);
            seq.dedup_by_key(|e| e.position);
            for e in seq.iter().filter(|e| e.pattern >= NUM_PATTERNS) {
                warn!("Channel {} references missing pattern {} at row {}", channel, e.pattern, e.position);
            }
        }

        self.song_rate = self.song_rate.clamp(1, 1000);
        self.song_speed = self.song_speed.max(1);
        self.song_speed2 = self.song_speed2.max(1);
        if self.loop_point >= self.song_length {
            self.loop_point = 0;
        }
    }
}
