use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the playback and analysis pipeline.
///
/// None of these are fatal: callers log them and fall back to the
/// "Not available" display state.
#[derive(Debug, Error)]
pub enum VisualizerError {
    /// An operation needed an audio source (or output) before one existed.
    #[error("missing audio context: {0}")]
    MissingContext(&'static str),

    /// The frame analyzer rejected its configuration.
    #[error("analyzer initialization failed: {0}")]
    AnalyzerInit(String),

    #[error("failed to decode {}: {message}", path.display())]
    Decode { path: PathBuf, message: String },

    #[error("no audio output available: {0}")]
    OutputDevice(String),

    #[error("failed to load config {}: {message}", path.display())]
    Config { path: PathBuf, message: String },

    #[error("seek failed: {0}")]
    Seek(String),
}

pub type Result<T> = std::result::Result<T, VisualizerError>;
