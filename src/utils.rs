use crate::error::SynthError;

/// Note number of A-4 (440 Hz). C-0 is note 0, so C-4 is 48.
pub const NOTE_A4: i32 = 57;
pub const MIDDLE_C: i32 = 48;
pub const FREQ_A4: f64 = 440.0;

/// Frequency of a (fractional) note number.
#[inline]
pub fn note_to_freq(note: f64) -> f64 {
    FREQ_A4 * 2.0_f64.powf((note - NOTE_A4 as f64) / 12.0)
}

/// Frequency of an 8.8 fixed point base note.
#[inline]
pub fn base_note_freq(base_note: u16) -> f64 {
    note_to_freq(base_note as f64 / 256.0)
}

/// Parse tracker-style note names: "C-4", "C#4", "Db3", "a-2".
pub fn parse_note(note_str: &str) -> Result<u8, SynthError> {
    let note_str = note_str.trim().to_uppercase();
    let mut chars = note_str.chars();
    let mut semitone: i32 = match chars.next() {
        Some('C') => 0,
        Some('D') => 2,
        Some('E') => 4,
        Some('F') => 5,
        Some('G') => 7,
        Some('A') => 9,
        Some('B') => 11,
        _ => return Err(SynthError::ParseError(format!("Invalid note: {}", note_str))),
    };

    let rest = chars.as_str();
    let octave_str = match rest.chars().next() {
        Some('#') => {
            semitone += 1;
            &rest[1..]
        }
        Some('B') if rest.len() > 1 => {
            semitone -= 1;
            &rest[1..]
        }
        Some('-') => &rest[1..],
        _ => rest,
    };

    let octave: i32 = octave_str.trim().parse()
        .map_err(|_| SynthError::ParseError(format!("Invalid octave: {}", note_str)))?;

    let note = octave * 12 + semitone;
    u8::try_from(note)
        .ok()
        .filter(|&n| n < 12 * 10)
        .ok_or_else(|| SynthError::ParseError(format!("Note out of range: {}", note_str)))
}

pub fn note_name(note: u8) -> String {
    const NAMES: [&str; 12] = ["C-", "C#", "D-", "D#", "E-", "F-", "F#", "G-", "G#", "A-", "A#", "B-"];
    format!("{}{}", NAMES[(note % 12) as usize], note / 12)
}
