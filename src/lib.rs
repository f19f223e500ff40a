//            _______           _______ _________ _______  _______  _______  _
//  |\     /|(  ___  )|\     /|(  ____ \\__   __/(  ____ )(  ___  )(  ____ \| \    /\
//  | )   ( || (   ) || )   ( || (    \/   ) (   | (    )|| (   ) || (    \/|  \  / /
//  | | _ | || (___) || |   | || (__       | |   | (____)|| (___) || |      |  (_/ /
//  | |( )| ||  ___  |( (   ) )|  __)      | |   |     __)|  ___  || |      |   _ (
//  | || || || (   ) | \ \_/ / | (         | |   | (\ (   | (   ) || |      |  ( \ \
//  | () () || )   ( |  \   /  | (____/\   | |   | ) \ \__| )   ( || (____/\|  /  \ \
//  (_______)|/     \|   \_/   (_______/   )_(   |/   \__/|/     \|(_______/|_/    \/

pub mod error;
pub mod utils;
pub mod waveform;
pub mod wavestore;
pub mod wavegen;
pub mod wave_edit;
pub mod filter;
pub mod instrument;
pub mod effects;
pub mod song;
pub mod history;
pub mod synth;
pub mod sequencer;
pub mod gate;
pub mod config;
pub mod engine;
pub mod persistence;

pub use error::SynthError;
pub use waveform::WaveformType;
pub use wavestore::{WaveStore, WavetableEntry, MAX_WAVETABLE_ENTRIES, WAVE_LOOP, WAVE_PINGPONG};
pub use wavegen::{ChainOp, OscStage, OscillatorChainSpec, preset, PRESET_NAMES};
pub use wave_edit::{ChordInterval, CombKind, EditOutcome, WaveEdit};
pub use filter::{FilterParams, FilterType};
pub use instrument::{Instrument, InstrumentSource};
pub use effects::Effect;
pub use song::{EndPolicy, Pattern, SequenceEntry, Song, Step, StepNote};
pub use history::{History, NoHistory, Snapshot, UndoStack};
pub use sequencer::{ChannelCommand, ChannelSink, PlayCursor, Sequencer, Transport};
pub use synth::{Synth, MAX_CHANNELS};
pub use gate::Gate;
pub use config::EngineConfig;
pub use engine::{ChannelStatus, StatusSnapshot, SynthEngine, Tracker};
#[cfg(feature = "playback")]
pub use engine::OutputStream;
pub use persistence::{SongFile, import_wav, export_wav, render_to_wav};
