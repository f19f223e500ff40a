use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::SynthError;
use crate::wavestore::WavetableEntry;

/// Hard cap for operations that grow a buffer.
pub const MAX_WAVE_SAMPLES: usize = 100_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChordInterval {
    Fourth,
    Fifth,
    Octave,
}

impl ChordInterval {
    /// Menu labels 4 and 5 pick the fourth and fifth; anything else is an octave.
    pub fn from_label(label: i32) -> Self {
        match label {
            4 => ChordInterval::Fourth,
            5 => ChordInterval::Fifth,
            _ => ChordInterval::Octave,
        }
    }

    /// (nominator, denominator)
    pub fn ratio(&self) -> (usize, usize) {
        match self {
            ChordInterval::Fourth => (3, 4),
            ChordInterval::Fifth => (2, 3),
            ChordInterval::Octave => (1, 2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombKind {
    LowPass,
    HighPass,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum WaveEdit {
    DropLowestBit,
    HalveSampleRate,
    Normalize { volume: i32 },
    RemoveDc,
    CutTail,
    CutHead,
    Chord(ChordInterval),
    Amplify { amount: i32 },
    Distort,
    Filter(CombKind),
    FindZero,
    Resample { length: usize },
    Draw { x: f32, y: f32, width: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    Changed,
    Unchanged,
}

impl WaveEdit {
    /// Apply to one entry. Empty entries are never touched. Refusals leave the
    /// entry as it was.
    pub fn apply(&self, w: &mut WavetableEntry) -> Result<EditOutcome, SynthError> {
        if w.is_empty() {
            return Ok(EditOutcome::Unchanged);
        }

        let outcome = match *self {
            WaveEdit::DropLowestBit => drop_lowest_bit(w),
            WaveEdit::HalveSampleRate => halve_samplerate(w),
            WaveEdit::Normalize { volume } => normalize(w, volume),
            WaveEdit::RemoveDc => remove_dc(w),
            WaveEdit::CutTail => cut_tail(w),
            WaveEdit::CutHead => cut_head(w),
            WaveEdit::Chord(interval) => chord(w, interval)?,
            WaveEdit::Amplify { amount } => amplify(w, amount),
            WaveEdit::Distort => distort(w),
            WaveEdit::Filter(kind) => comb_filter(w, kind)?,
            WaveEdit::FindZero => find_zero(w)?,
            WaveEdit::Resample { length } => resample(w, length)?,
            WaveEdit::Draw { x, y, width } => draw(w, x, y, width),
        };

        w.clamp_loop();
        debug_assert!(w.loop_is_valid());
        Ok(outcome)
    }
}

#[inline]
fn clip(v: i64) -> i16 {
    v.clamp(-32768, 32767) as i16
}

fn scratch_copy(data: &[i16]) -> Result<Vec<i16>, SynthError> {
    let mut temp = Vec::new();
    temp.try_reserve_exact(data.len())
        .map_err(|e| SynthError::OutOfMemory(e.to_string()))?;
    temp.extend_from_slice(data);
    Ok(temp)
}

fn drop_lowest_bit(w: &mut WavetableEntry) -> EditOutcome {
    let bits = w.data.iter().fold(0u16, |acc, &s| acc | s as u16);
    if bits == 0 {
        debug!("Wave is silent");
        return EditOutcome::Unchanged;
    }

    // clear the lowest used bit and everything below it
    let mask = (0xffffu32 << (bits.trailing_zeros() + 1)) as u16 as i16;
    for s in &mut w.data {
        *s &= mask;
    }
    EditOutcome::Changed
}

fn halve_samplerate(w: &mut WavetableEntry) -> EditOutcome {
    let half = w.data.len() / 2;
    for d in 0..half {
        w.data[d] = ((w.data[d * 2] as i32 + w.data[d * 2 + 1] as i32) / 2) as i16;
    }
    w.data.truncate(half);
    w.sample_rate /= 2;
    w.loop_begin /= 2;
    w.loop_end /= 2;
    EditOutcome::Changed
}

fn normalize(w: &mut WavetableEntry, volume: i32) -> EditOutcome {
    let peak = w.data.iter().map(|&s| (s as i32).abs()).max().unwrap_or(0);
    debug!("Peak = {}", peak);

    if peak == 0 {
        return EditOutcome::Unchanged;
    }

    for s in &mut w.data {
        *s = clip(*s as i64 * volume as i64 / peak as i64);
    }
    EditOutcome::Changed
}

fn remove_dc(w: &mut WavetableEntry) -> EditOutcome {
    let avg = w.data.iter().map(|&s| s as f64).sum::<f64>() / w.data.len() as f64;

    for s in &mut w.data {
        *s = (*s as f64 - avg).clamp(-32768.0, 32767.0) as i16;
    }
    EditOutcome::Changed
}

fn cut_tail(w: &mut WavetableEntry) -> EditOutcome {
    let len = w.data.len();
    let Some(last) = (1..len).rev().find(|&s| w.data[s] != 0) else {
        return EditOutcome::Unchanged;
    };

    if last + 1 == len {
        return EditOutcome::Unchanged;
    }

    debug!("Cut {} samples", len - (last + 1));
    w.data.truncate(last + 1);
    w.loop_end = w.loop_end.min(w.data.len());
    w.loop_begin = w.loop_begin.min(w.data.len());
    EditOutcome::Changed
}

fn cut_head(w: &mut WavetableEntry) -> EditOutcome {
    let Some(first) = w.data.iter().position(|&s| s != 0) else {
        return EditOutcome::Unchanged;
    };

    if first == 0 {
        return EditOutcome::Unchanged;
    }

    debug!("Cut {} samples", first);
    w.data.drain(..first);
    w.loop_end = w.loop_end.saturating_sub(first).min(w.data.len());
    w.loop_begin = w.loop_begin.saturating_sub(first);
    EditOutcome::Changed
}

/// Length of a chord-stretched buffer, or a refusal if it would pass the cap.
pub fn chord_length(len: usize, interval: ChordInterval) -> Result<usize, SynthError> {
    let (nom, _) = interval.ratio();
    len.checked_mul(nom).filter(|&n| n < MAX_WAVE_SAMPLES).ok_or_else(|| {
        warn!("Chord of {} samples refused", len);
        SynthError::TooBig(format!("{} x {} samples", nom, len))
    })
}

fn chord(w: &mut WavetableEntry, interval: ChordInterval) -> Result<EditOutcome, SynthError> {
    let (nom, denom) = interval.ratio();
    let len = w.data.len();
    let new_length = chord_length(len, interval)?;

    let mut new_data: Vec<i16> = Vec::new();
    new_data.try_reserve_exact(new_length)
        .map_err(|e| SynthError::OutOfMemory(e.to_string()))?;

    for s in 0..new_length {
        let a = w.data[s % len] as i32;
        let b = w.data[(s * denom / nom) % len] as i32;
        new_data.push(((a + b) / 2) as i16);
    }

    w.data = new_data;
    w.loop_begin *= nom;
    w.loop_end *= nom;
    Ok(EditOutcome::Changed)
}

fn amplify(w: &mut WavetableEntry, amount: i32) -> EditOutcome {
    debug!("amp = {}", amount);
    for s in &mut w.data {
        *s = clip(*s as i64 * amount as i64 / 32768);
    }
    EditOutcome::Changed
}

fn distort(w: &mut WavetableEntry) -> EditOutcome {
    for s in w.data.iter_mut().filter(|s| **s != 0) {
        let mut v = *s as f32 / 32768.0;
        v *= v.abs().powf(-0.333);
        *s = (v * 32768.0).clamp(-32768.0, 32767.0) as i16;
    }
    EditOutcome::Changed
}

fn comb_filter(w: &mut WavetableEntry, kind: CombKind) -> Result<EditOutcome, SynthError> {
    let temp = scratch_copy(&w.data)?;
    let n = temp.len();
    let at = |i: usize| temp[i % n] as i32;

    for s in 0..n {
        // [1 2 4 2 1] / 10, wrapping at both ends
        let filtered = (at(s + 2 * n - 2) + at(s + n - 1) * 2 + at(s) * 4 + at(s + 1) * 2 + at(s + 2)) / 10;

        w.data[s] = match kind {
            CombKind::LowPass => clip(filtered as i64),
            CombKind::HighPass => clip(temp[s] as i64 - filtered as i64),
        };
    }
    Ok(EditOutcome::Changed)
}

fn find_zero(w: &mut WavetableEntry) -> Result<EditOutcome, SynthError> {
    if w.data.len() < 2 {
        return Ok(EditOutcome::Unchanged);
    }

    let crossing = (1..w.data.len()).find(|&s| {
        let (prev, cur) = (w.data[s - 1], w.data[s]);
        (cur >= 0 && prev < 0) || (cur <= 0 && prev > 0)
    });

    debug!("zero crossing at {:?}", crossing);

    match crossing {
        Some(zc) => {
            w.data.rotate_left(zc);
            Ok(EditOutcome::Changed)
        }
        None => Ok(EditOutcome::Unchanged),
    }
}

fn resample(w: &mut WavetableEntry, length: usize) -> Result<EditOutcome, SynthError> {
    let old_len = w.data.len();
    if length == old_len || length == 0 {
        return Ok(EditOutcome::Unchanged);
    }
    if length >= MAX_WAVE_SAMPLES {
        warn!("Resample to {} samples refused", length);
        return Err(SynthError::TooBig(format!("{} samples", length)));
    }

    let mut out: Vec<i16> = Vec::new();
    out.try_reserve_exact(length)
        .map_err(|e| SynthError::OutOfMemory(e.to_string()))?;

    let ratio = old_len as f64 / length as f64;
    for i in 0..length {
        let src_pos = i as f64 * ratio;
        let idx = src_pos as usize;
        let frac = src_pos - idx as f64;
        let a = w.data[idx.min(old_len - 1)] as f64;
        let b = w.data[(idx + 1).min(old_len - 1)] as f64;
        out.push((a * (1.0 - frac) + b * frac).round().clamp(-32768.0, 32767.0) as i16);
    }

    let scale = |v: usize| (v as u64 * length as u64 / old_len as u64) as usize;
    let rate = w.sample_rate as u64 * length as u64 / old_len as u64;
    w.sample_rate = u32::try_from(rate).unwrap_or(u32::MAX);
    w.loop_begin = scale(w.loop_begin);
    w.loop_end = scale(w.loop_end);
    w.data = out;
    Ok(EditOutcome::Changed)
}

fn draw(w: &mut WavetableEntry, x: f32, y: f32, width: f32) -> EditOutcome {
    let len = w.data.len();
    let start = (len as f32 * x.clamp(0.0, 1.0)) as usize;
    let end = ((len as f32 * (x + width).clamp(0.0, 1.0)) as usize).max(start + 1).min(len);
    if start >= end {
        return EditOutcome::Unchanged;
    }

    let value = (y.clamp(0.0, 1.0) * 65535.0 - 32768.0) as i16;
    w.data[start..end].fill(value);
    EditOutcome::Changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wavestore::WAVE_LOOP;
    use more_asserts::assert_le;

    fn entry(data: &[i16]) -> WavetableEntry {
        let mut w = WavetableEntry::from_samples(data.to_vec(), 8000);
        w.flags = WAVE_LOOP;
        w
    }

    fn all_edits() -> Vec<WaveEdit> {
        vec![
            WaveEdit::DropLowestBit,
            WaveEdit::HalveSampleRate,
            WaveEdit::Normalize { volume: 20000 },
            WaveEdit::RemoveDc,
            WaveEdit::CutTail,
            WaveEdit::CutHead,
            WaveEdit::Chord(ChordInterval::Fourth),
            WaveEdit::Chord(ChordInterval::Fifth),
            WaveEdit::Chord(ChordInterval::Octave),
            WaveEdit::Amplify { amount: 70000 },
            WaveEdit::Distort,
            WaveEdit::Filter(CombKind::LowPass),
            WaveEdit::Filter(CombKind::HighPass),
            WaveEdit::FindZero,
            WaveEdit::Resample { length: 37 },
            WaveEdit::Draw { x: 0.5, y: 1.0, width: 0.1 },
        ]
    }

    #[test]
    fn loop_bounds_hold_after_every_edit() {
        let shapes: Vec<Vec<i16>> = vec![
            vec![0, 0, 100, -200, 300, 0, 0, 0],
            vec![5],
            vec![-1, 1, -1, 1, -1],
            (0..101).map(|i| (i * 613 % 65536 - 32768) as i16).collect(),
        ];
        for edit in all_edits() {
            for data in &shapes {
                for (b, e) in [(0, data.len()), (1, data.len()), (data.len() - 1, data.len()), (0, 0)] {
                    let mut w = entry(data);
                    w.loop_begin = b;
                    w.loop_end = e;
                    edit.apply(&mut w).unwrap();
                    assert!(w.loop_is_valid(), "{:?} on {:?} -> {}..{} of {}", edit, data, w.loop_begin, w.loop_end, w.len());
                }
            }
        }
    }

    #[test]
    fn empty_entry_is_untouched() {
        for edit in all_edits() {
            let mut w = WavetableEntry::default();
            assert_eq!(edit.apply(&mut w).unwrap(), EditOutcome::Unchanged);
            assert!(w.is_empty());
        }
    }

    #[test]
    fn drop_lowest_bit_masks() {
        let mut w = entry(&[0b0110, 0b1100, -8]);
        assert_eq!(WaveEdit::DropLowestBit.apply(&mut w).unwrap(), EditOutcome::Changed);
        assert_eq!(w.data, vec![0b0100, 0b1100, -8]);

        let mut silent = entry(&[0, 0, 0]);
        assert_eq!(WaveEdit::DropLowestBit.apply(&mut silent).unwrap(), EditOutcome::Unchanged);
    }

    #[test]
    fn halve_samplerate_halves_everything() {
        let mut w = entry(&[10, 20, 30, 41, -5, -6, 7]);
        w.loop_begin = 3;
        w.loop_end = 7;
        WaveEdit::HalveSampleRate.apply(&mut w).unwrap();
        assert_eq!(w.data, vec![15, 35, -5]);
        assert_eq!(w.sample_rate, 4000);
        assert_eq!((w.loop_begin, w.loop_end), (1, 3));
    }

    #[test]
    fn normalize_hits_target_and_is_idempotent() {
        let mut w = entry(&[100, -400, 250, 3]);
        WaveEdit::Normalize { volume: 16000 }.apply(&mut w).unwrap();
        let peak = w.data.iter().map(|&s| (s as i32).abs()).max().unwrap();
        assert_eq!(peak, 16000);
        let once = w.clone();
        WaveEdit::Normalize { volume: 16000 }.apply(&mut w).unwrap();
        assert_eq!(w, once);

        let mut silent = entry(&[0, 0]);
        assert_eq!(WaveEdit::Normalize { volume: 16000 }.apply(&mut silent).unwrap(), EditOutcome::Unchanged);
    }

    #[test]
    fn normalize_handles_most_negative_peak() {
        let mut w = entry(&[-32768, 16384]);
        WaveEdit::Normalize { volume: 32767 }.apply(&mut w).unwrap();
        assert_eq!(w.data, vec![-32767, 16383]);
    }

    #[test]
    fn remove_dc_centers() {
        let mut w = entry(&[1000, 1200, 900, 1500, 1100]);
        WaveEdit::RemoveDc.apply(&mut w).unwrap();
        let mean = w.data.iter().map(|&s| s as f64).sum::<f64>() / w.len() as f64;
        assert_le!(mean.abs(), 1.0);
    }

    #[test]
    fn cut_tail_is_idempotent() {
        let mut w = entry(&[3, 0, 5, 0, 0, 0]);
        w.loop_begin = 5;
        w.loop_end = 6;
        assert_eq!(WaveEdit::CutTail.apply(&mut w).unwrap(), EditOutcome::Changed);
        assert_eq!(w.data, vec![3, 0, 5]);
        assert_eq!((w.loop_begin, w.loop_end), (3, 3));
        assert_eq!(WaveEdit::CutTail.apply(&mut w).unwrap(), EditOutcome::Unchanged);
    }

    #[test]
    fn cut_head_trims_leading_silence() {
        let mut w = entry(&[0, 0, 0, 7, 8, 0]);
        w.loop_begin = 1;
        w.loop_end = 5;
        assert_eq!(WaveEdit::CutHead.apply(&mut w).unwrap(), EditOutcome::Changed);
        assert_eq!(w.data, vec![7, 8, 0]);
        assert_eq!((w.loop_begin, w.loop_end), (0, 2));

        assert_eq!(WaveEdit::CutHead.apply(&mut w).unwrap(), EditOutcome::Unchanged);
    }

    #[test]
    fn chord_length_and_loop_follow_nominator() {
        let base = [0i16, 100, 200, 300, 400, 500];
        for interval in [ChordInterval::Fourth, ChordInterval::Fifth, ChordInterval::Octave] {
            let (nom, denom) = interval.ratio();
            let mut w = entry(&base);
            w.loop_begin = 1;
            w.loop_end = 5;
            WaveEdit::Chord(interval).apply(&mut w).unwrap();
            assert_eq!(w.len(), nom * base.len());
            assert_eq!((w.loop_begin, w.loop_end), (nom, 5 * nom));
            for s in 0..w.len() {
                let expect = (base[s % 6] as i32 + base[(s * denom / nom) % 6] as i32) / 2;
                assert_eq!(w.data[s] as i32, expect);
            }
        }
        assert_eq!(ChordInterval::from_label(12), ChordInterval::Octave);
        assert_eq!(ChordInterval::from_label(7), ChordInterval::Octave);
    }

    #[test]
    fn chord_refuses_oversized_result() {
        let r = chord_length(MAX_WAVE_SAMPLES / 3 + 1, ChordInterval::Fourth);
        assert!(matches!(r, Err(SynthError::TooBig(_))));
        assert!(matches!(chord_length(usize::MAX, ChordInterval::Fifth), Err(SynthError::TooBig(_))));
        assert_eq!(chord_length(MAX_WAVE_SAMPLES - 1, ChordInterval::Octave).unwrap(), MAX_WAVE_SAMPLES - 1);
    }

    #[test]
    fn amplify_and_distort_clip() {
        let mut w = entry(&[16384, -16384, 0, 30000]);
        WaveEdit::Amplify { amount: 65536 }.apply(&mut w).unwrap();
        assert_eq!(w.data, vec![32767, -32768, 0, 32767]);

        let mut d = entry(&[0, 4096, -4096]);
        WaveEdit::Distort.apply(&mut d).unwrap();
        assert_eq!(d.data[0], 0);
        assert!(d.data[1] > 4096);
        assert!(d.data[2] < -4096);
        assert_eq!(d.data[1], -d.data[2]);
    }

    #[test]
    fn comb_filter_reads_only_original_values() {
        let original = [1000i16, -2000, 3000, 500, -700, 0, 12000];
        let n = original.len();
        let mut w = entry(&original);
        WaveEdit::Filter(CombKind::LowPass).apply(&mut w).unwrap();
        for s in 0..n {
            let o = |i: usize| original[i % n] as i32;
            let expect = (o(s + n - 2) + o(s + n - 1) * 2 + o(s) * 4 + o(s + 1) * 2 + o(s + 2)) / 10;
            assert_eq!(w.data[s] as i32, expect, "index {}", s);
        }

        let mut hp = entry(&original);
        WaveEdit::Filter(CombKind::HighPass).apply(&mut hp).unwrap();
        for s in 0..n {
            assert_eq!(hp.data[s] as i32, original[s] as i32 - w.data[s] as i32);
        }
    }

    #[test]
    fn find_zero_rotates_to_crossing() {
        let mut w = entry(&[-1, 1, -1, 1]);
        assert_eq!(WaveEdit::FindZero.apply(&mut w).unwrap(), EditOutcome::Changed);
        assert_eq!(w.data, vec![1, -1, 1, -1]);

        let mut flat = entry(&[5, 6, 7]);
        assert_eq!(WaveEdit::FindZero.apply(&mut flat).unwrap(), EditOutcome::Unchanged);
        assert_eq!(flat.data, vec![5, 6, 7]);

        let mut rotated = entry(&[3, 2, 0, -4, 9]);
        WaveEdit::FindZero.apply(&mut rotated).unwrap();
        assert_eq!(rotated.data, vec![0, -4, 9, 3, 2]);
    }

    #[test]
    fn resample_scales_rate_and_loop() {
        let mut w = entry(&[0, 100, 200, 300]);
        w.loop_begin = 2;
        w.loop_end = 4;
        WaveEdit::Resample { length: 8 }.apply(&mut w).unwrap();
        assert_eq!(w.len(), 8);
        assert_eq!(w.sample_rate, 16000);
        assert_eq!((w.loop_begin, w.loop_end), (4, 8));
        assert_eq!(&w.data[..4], &[0, 50, 100, 150]);
    }

    #[test]
    fn resample_saturates_huge_rates() {
        let mut w = WavetableEntry::from_samples(vec![0, 1000], u32::MAX / 2);
        WaveEdit::Resample { length: 8 }.apply(&mut w).unwrap();
        assert_eq!(w.len(), 8);
        assert_eq!(w.sample_rate, u32::MAX);
    }

    #[test]
    fn draw_writes_span() {
        let mut w = entry(&[0; 10]);
        WaveEdit::Draw { x: 0.2, y: 1.0, width: 0.3 }.apply(&mut w).unwrap();
        assert_eq!(w.data, vec![0, 0, 32767, 32767, 32767, 0, 0, 0, 0, 0]);
        WaveEdit::Draw { x: 0.95, y: 0.0, width: 0.0 }.apply(&mut w).unwrap();
        assert_eq!(w.data[9], -32768);
    }
}
