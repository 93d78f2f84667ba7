use thiserror::Error;

/// All errors produced by lipsync-audio.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("audio file not found: {path}")]
    FileNotFound { path: std::path::PathBuf },

    #[error("file is not a valid WAVE file: {0}")]
    InvalidContainer(String),

    #[error("WAVE file cannot be read: {0}")]
    UnsupportedFormat(String),

    #[error("cannot read from frame {start} to {end} in {frame_count}-frame file")]
    Range {
        start: usize,
        end: usize,
        frame_count: usize,
    },

    #[error("cannot convert from {input_rate} Hz to {output_rate} Hz: ratio must lie in [1/256, 256]")]
    RatioOutOfRange { input_rate: u32, output_rate: u32 },

    #[error("audio file has been closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAVE writer error: {0}")]
    WaveWrite(#[from] hound::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AudioError>;
