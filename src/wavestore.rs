use serde::{Deserialize, Serialize};

use crate::utils::MIDDLE_C;

pub const MAX_WAVETABLE_ENTRIES: usize = 128;

/// Loop the region `loop_begin..loop_end` while the note is held.
pub const WAVE_LOOP: u8 = 1 << 0;
/// Play the loop region back and forth instead of wrapping.
pub const WAVE_PINGPONG: u8 = 1 << 1;

/// A-3 in 8.8 fixed point; one-cycle waves render at 220 Hz.
pub const DEFAULT_BASE_NOTE: u16 = ((MIDDLE_C + 9 - 12) as u16) << 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WavetableEntry {
    pub data: Vec<i16>,
    pub sample_rate: u32,
    pub loop_begin: usize,
    pub loop_end: usize,
    pub flags: u8,
    pub base_note: u16,
}

impl Default for WavetableEntry {
    fn default() -> Self {
        WavetableEntry {
            data: Vec::new(),
            sample_rate: 44100,
            loop_begin: 0,
            loop_end: 0,
            flags: 0,
            base_note: DEFAULT_BASE_NOTE,
        }
    }
}

impl WavetableEntry {
    pub fn from_samples(data: Vec<i16>, sample_rate: u32) -> Self {
        let loop_end = data.len();
        WavetableEntry {
            data,
            sample_rate,
            loop_begin: 0,
            loop_end,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_looped(&self) -> bool {
        self.flags & WAVE_LOOP != 0 && self.loop_end > self.loop_begin
    }

    /// Pull both loop points back into `0..=len`, keeping `loop_begin <= loop_end`.
    pub fn clamp_loop(&mut self) {
        let len = self.data.len();
        self.loop_end = self.loop_end.min(len);
        self.loop_begin = self.loop_begin.min(self.loop_end);
    }

    pub fn loop_is_valid(&self) -> bool {
        self.loop_begin <= self.loop_end && self.loop_end <= self.data.len()
    }

    /// FNV-1a over the sample data.
    pub fn checksum(&self) -> u64 {
        let mut hash: u64 = 0xcbf29ce484222325;
        for s in &self.data {
            for b in s.to_le_bytes() {
                hash ^= b as u64;
                hash = hash.wrapping_mul(0x100000001b3);
            }
        }
        hash
    }
}

/// Fixed-size table of wavetable entries, indexed by instrument and edit ops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveStore {
    entries: Vec<WavetableEntry>,
}

impl Default for WaveStore {
    fn default() -> Self {
        WaveStore {
            entries: vec![WavetableEntry::default(); MAX_WAVETABLE_ENTRIES],
        }
    }
}

impl WaveStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, index: usize) -> Option<&WavetableEntry> {
        self.entries.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut WavetableEntry> {
        self.entries.get_mut(index)
    }

    /// Install `entry` at `index` and hand back the entry it replaced, so the
    /// old buffer is released only after the new one is live.
    pub fn replace(&mut self, index: usize, mut entry: WavetableEntry) -> Option<WavetableEntry> {
        let slot = self.entries.get_mut(index)?;
        entry.clamp_loop();
        Some(std::mem::replace(slot, entry))
    }

    pub fn iter(&self) -> impl Iterator<Item = &WavetableEntry> {
        self.entries.iter()
    }

    /// Re-establish table invariants after deserialization.
    pub fn sanitize(&mut self) {
        self.entries.resize_with(MAX_WAVETABLE_ENTRIES, WavetableEntry::default);
        for entry in &mut self.entries {
            entry.clamp_loop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_keeps_order() {
        let mut w = WavetableEntry::from_samples(vec![1, 2, 3], 8000);
        w.loop_begin = 10;
        w.loop_end = 20;
        w.clamp_loop();
        assert_eq!((w.loop_begin, w.loop_end), (3, 3));
        assert!(w.loop_is_valid());
    }

    #[test]
    fn replace_returns_old_entry() {
        let mut store = WaveStore::new();
        let first = WavetableEntry::from_samples(vec![5; 4], 8000);
        assert_eq!(store.replace(0, first.clone()), Some(WavetableEntry::default()));
        let old = store.replace(0, WavetableEntry::from_samples(vec![7; 2], 8000));
        assert_eq!(old, Some(first));
        assert_eq!(store.get(0).map(|w| w.len()), Some(2));
        assert!(store.replace(MAX_WAVETABLE_ENTRIES, WavetableEntry::default()).is_none());
        assert!(store.get(MAX_WAVETABLE_ENTRIES).is_none());
    }

    #[test]
    fn checksum_tracks_data() {
        let a = WavetableEntry::from_samples(vec![1, 2, 3], 8000);
        let mut b = a.clone();
        assert_eq!(a.checksum(), b.checksum());
        b.data[1] = -2;
        assert_ne!(a.checksum(), b.checksum());
    }
}
