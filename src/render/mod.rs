pub mod history;
pub mod mappers;
pub mod render_loop;
pub mod scheduler;
pub mod surface;

pub use history::{draw_history, ChromaHistory, ChromaHistoryEntry, SharedHistory};
pub use render_loop::{FrameInputs, RenderLoop, Surfaces, TickOutcome};
pub use scheduler::{FrameHandle, FrameScheduler};
pub use surface::{hsla_to_rgba, DrawSurface, PixelCanvas, Rgba, TextRun};
