pub mod audio;
pub mod config;
pub mod error;
pub mod graphics;
pub mod pipeline;
pub mod render;
pub mod ui;

pub use config::VisualizerConfig;
pub use error::{Result, VisualizerError};
pub use pipeline::PlaybackController;
