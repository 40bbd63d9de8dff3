pub mod adapter;
pub mod controller;

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

pub use adapter::FeatureStreamAdapter;
pub use controller::PlaybackController;

/// Playback state owned by the controller.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlaybackState {
    pub is_playing: bool,
    pub position: Duration,
    /// Unknown until the source reports its length.
    pub duration: Option<Duration>,
}

impl PlaybackState {
    /// `elapsed / total` as `m:ss / m:ss`, with `--:--` for an unknown length.
    pub fn clock_label(&self) -> String {
        let total = self.duration.map_or_else(|| "--:--".to_string(), format_clock);
        format!("{} / {}", format_clock(self.position), total)
    }
}

pub fn format_clock(time: Duration) -> String {
    let seconds = time.as_secs();
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// The playing flag the render loop checks at the top of every tick.
///
/// Cleared in the same step that cancels the tick and stops analysis, so a
/// loop never observes a torn-down source.
#[derive(Debug, Clone, Default)]
pub struct PlayingFlag(Rc<Cell<bool>>);

impl PlayingFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> bool {
        self.0.get()
    }

    pub fn set(&self, playing: bool) {
        self.0.set(playing);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_label() {
        let mut state = PlaybackState::default();
        assert_eq!(state.clock_label(), "0:00 / --:--");

        state.position = Duration::from_secs_f64(65.7);
        state.duration = Some(Duration::from_secs(600));
        assert_eq!(state.clock_label(), "1:05 / 10:00");
    }

    #[test]
    fn test_playing_flag_is_shared() {
        let flag = PlayingFlag::new();
        let seen_by_loop = flag.clone();
        flag.set(true);
        assert!(seen_by_loop.get());
    }
}
