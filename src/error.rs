use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum SynthError {
    #[error("Resulting wave was too big: {0}")]
    TooBig(String),
    #[error("Out of memory: {0}")]
    OutOfMemory(String),
    #[error("Parsing Error: {0}")]
    ParseError(String),
    #[error("File Error: {0}")]
    FileError(String),
    #[error("Audio Error: {0}")]
    AudioError(String),
    #[error("Invalid Wavetable Error: {0}")]
    InvalidWavetable(String),
}

impl From<std::io::Error> for SynthError {
    fn from(e: std::io::Error) -> Self {
        SynthError::FileError(e.to_string())
    }
}

impl From<serde_json::Error> for SynthError {
    fn from(e: serde_json::Error) -> Self {
        SynthError::ParseError(e.to_string())
    }
}

impl From<hound::Error> for SynthError {
    fn from(e: hound::Error) -> Self {
        match e {
            hound::Error::IoError(io) => SynthError::FileError(io.to_string()),
            other => SynthError::InvalidWavetable(other.to_string()),
        }
    }
}
