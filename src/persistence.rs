use std::io::{Read, Seek, Write};
use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::engine::Tracker;
use crate::error::SynthError;
use crate::song::Song;
use crate::synth::MAX_CHANNELS;
use crate::wavestore::{WaveStore, WavetableEntry, DEFAULT_BASE_NOTE};

pub const SONG_FILE_VERSION: u32 = 1;

/// Everything a song needs on disk: patterns, sequences, instruments,
/// wavetables and the global speeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongFile {
    pub version: u32,
    pub song: Song,
    pub waves: WaveStore,
}

impl SongFile {
    pub fn new(song: Song, waves: WaveStore) -> Self {
        SongFile { version: SONG_FILE_VERSION, song, waves }
    }

    pub fn to_json(&self) -> Result<String, SynthError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse and re-establish table invariants. Pattern references that point
    /// nowhere are kept; they play as silence.
    pub fn from_json(s: &str) -> Result<Self, SynthError> {
        let mut file: SongFile = serde_json::from_str(s)?;
        if file.version > SONG_FILE_VERSION {
            return Err(SynthError::ParseError(format!("Unsupported song file version {}", file.version)));
        }
        let channels = file.song.num_channels().clamp(1, MAX_CHANNELS);
        file.song.sanitize(channels);
        file.waves.sanitize();
        Ok(file)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), SynthError> {
        std::fs::write(path.as_ref(), self.to_json()?)?;
        info!("Saved song to {}", path.as_ref().display());
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SynthError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let file = Self::from_json(&content)?;
        info!("Loaded song file {}", path.as_ref().display());
        Ok(file)
    }
}

/// Read a WAV into a one-shot wavetable entry. Multi-channel files are
/// averaged down to mono.
pub fn import_wav_from<R: Read>(reader: R) -> Result<WavetableEntry, SynthError> {
    let mut reader = hound::WavReader::new(reader)?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    debug!("Importing wave: {} Hz, {} channels, {} bits", spec.sample_rate, spec.channels, spec.bits_per_sample);

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader.samples::<i32>()
                .map(|r| r.map(|s| s as f32 * scale))
                .collect::<Result<_, _>>()?
        }
    };

    let data: Vec<i16> = interleaved
        .chunks(channels)
        .map(|frame| {
            let avg = frame.iter().sum::<f32>() / frame.len() as f32;
            (avg * 32768.0).clamp(-32768.0, 32767.0) as i16
        })
        .collect();

    if data.is_empty() {
        return Err(SynthError::InvalidWavetable("No samples in file".to_string()));
    }

    Ok(WavetableEntry {
        base_note: DEFAULT_BASE_NOTE,
        ..WavetableEntry::from_samples(data, spec.sample_rate)
    })
}

pub fn import_wav<P: AsRef<Path>>(path: P) -> Result<WavetableEntry, SynthError> {
    let data = std::fs::read(path.as_ref())?;
    import_wav_from(std::io::Cursor::new(data))
}

pub fn export_wav_to<W: Write + Seek>(entry: &WavetableEntry, writer: W) -> Result<(), SynthError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: entry.sample_rate.max(1),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut wav = hound::WavWriter::new(writer, spec)?;
    for &s in &entry.data {
        wav.write_sample(s)?;
    }
    wav.finalize()?;
    Ok(())
}

pub fn export_wav<P: AsRef<Path>>(entry: &WavetableEntry, path: P) -> Result<(), SynthError> {
    let file = std::io::BufWriter::new(std::fs::File::create(path.as_ref())?);
    export_wav_to(entry, file)
}

/// Play the song from the top through the tick engine and write it as 16-bit
/// PCM. Stops at song end or after `max_seconds`. Returns frames written.
pub fn render_to_writer<W: Write + Seek>(tracker: &mut Tracker, writer: W, max_seconds: f32) -> Result<u64, SynthError> {
    const BLOCK_FRAMES: usize = 1024;

    let sample_rate = tracker.config().sample_rate;
    let frame_channels = tracker.config().output_channels.max(1);
    let spec = hound::WavSpec {
        channels: frame_channels as u16,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut wav = hound::WavWriter::new(writer, spec)?;

    let max_frames = (max_seconds.max(0.0) as f64 * sample_rate as f64) as u64;
    let mut buf = vec![0.0f32; BLOCK_FRAMES * frame_channels];
    let mut frames = 0u64;

    tracker.play(0);
    while tracker.is_playing() && frames < max_frames {
        let n = (max_frames - frames).min(BLOCK_FRAMES as u64) as usize;
        let block = &mut buf[..n * frame_channels];
        tracker.render(block, frame_channels);
        for &s in block.iter() {
            wav.write_sample((s * 32767.0) as i16)?;
        }
        frames += n as u64;
    }
    tracker.stop();
    wav.finalize()?;

    info!("Rendered {} frames ({:.2} s)", frames, frames as f64 / sample_rate as f64);
    Ok(frames)
}

pub fn render_to_wav<P: AsRef<Path>>(tracker: &mut Tracker, path: P, max_seconds: f32) -> Result<u64, SynthError> {
    let file = std::io::BufWriter::new(std::fs::File::create(path.as_ref())?);
    render_to_writer(tracker, file, max_seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::song::{EndPolicy, SequenceEntry, Step, NUM_PATTERNS};
    use crate::wavegen::preset;
    use crate::wavestore::{WAVE_LOOP, WAVE_PINGPONG};
    use std::io::Cursor;

    #[test]
    fn song_file_survives_json() {
        let mut song = Song::new(4);
        song.title = "test".into();
        song.set_step(7, 2, Step { command: 0x0c40, ..Step::note(50, 3) });
        song.set_sequence(1, SequenceEntry { position: 16, pattern: 7, note_offset: -12 });

        let mut waves = WaveStore::new();
        let mut w = preset("bell").unwrap().build_entry(128).unwrap();
        w.loop_begin = 10;
        w.loop_end = 100;
        w.flags = WAVE_LOOP | WAVE_PINGPONG;
        w.base_note = 0x3080;
        waves.replace(5, w);

        let file = SongFile::new(song, waves);
        let back = SongFile::from_json(&file.to_json().unwrap()).unwrap();
        assert_eq!(back, file);
    }

    #[test]
    fn load_repairs_bad_tables() {
        let mut song = Song::new(2);
        song.patterns.truncate(3);
        song.set_sequence(0, SequenceEntry { position: 0, pattern: NUM_PATTERNS + 1, note_offset: 0 });
        let mut waves = WaveStore::new();
        waves.replace(0, WavetableEntry::from_samples(vec![1, 2, 3], 8000));

        let mut json: serde_json::Value = serde_json::from_str(&SongFile::new(song, waves).to_json().unwrap()).unwrap();
        json["waves"]["entries"][0]["loop_end"] = 50.into();

        let back = SongFile::from_json(&json.to_string()).unwrap();
        assert_eq!(back.song.patterns.len(), NUM_PATTERNS);
        assert_eq!(back.song.sequences[0][0].pattern, NUM_PATTERNS + 1);
        assert_eq!(back.waves.get(0).unwrap().loop_end, 3);
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(SongFile::from_json("not json"), Err(SynthError::ParseError(_))));
    }

    #[test]
    fn wav_round_trip() {
        let entry = WavetableEntry::from_samples(vec![0, 1000, -32768, 32767, -5], 22050);
        let mut bytes = Cursor::new(Vec::new());
        export_wav_to(&entry, &mut bytes).unwrap();

        let back = import_wav_from(Cursor::new(bytes.into_inner())).unwrap();
        assert_eq!(back.data, entry.data);
        assert_eq!(back.sample_rate, 22050);
        assert_eq!(back.flags, 0);
        assert_eq!((back.loop_begin, back.loop_end), (0, 5));
    }

    #[test]
    fn stereo_import_is_averaged() {
        let spec = hound::WavSpec { channels: 2, sample_rate: 8000, bits_per_sample: 16, sample_format: hound::SampleFormat::Int };
        let mut bytes = Cursor::new(Vec::new());
        {
            let mut w = hound::WavWriter::new(&mut bytes, spec).unwrap();
            for s in [1000i16, 3000, -200, -400] {
                w.write_sample(s).unwrap();
            }
            w.finalize().unwrap();
        }
        let entry = import_wav_from(Cursor::new(bytes.into_inner())).unwrap();
        assert_eq!(entry.data, vec![2000, -300]);
    }

    #[test]
    fn render_stops_at_song_end() {
        let mut tracker = Tracker::new(EngineConfig { sample_rate: 8000, output_channels: 1, ..Default::default() });
        let mut file = tracker.song_file();
        file.song.song_length = 2;
        file.song.end_policy = EndPolicy::Stop;
        file.song.set_step(0, 0, Step::note(48, 0));
        file.song.set_sequence(0, SequenceEntry { position: 0, pattern: 0, note_offset: 0 });
        tracker.load_song_file(file);

        let mut bytes = Cursor::new(Vec::new());
        let frames = render_to_writer(&mut tracker, &mut bytes, 10.0).unwrap();
        // the twelfth tick (frame 1760) ends the song inside the second block
        assert_eq!(frames, 2048);

        let reader = hound::WavReader::new(Cursor::new(bytes.into_inner())).unwrap();
        assert_eq!(reader.len() as u64, frames);
    }

    #[test]
    fn render_honors_max_duration() {
        let mut tracker = Tracker::new(EngineConfig { sample_rate: 8000, output_channels: 2, ..Default::default() });
        let mut bytes = Cursor::new(Vec::new());
        assert_eq!(render_to_writer(&mut tracker, &mut bytes, 0.5).unwrap(), 4000);
    }
}
