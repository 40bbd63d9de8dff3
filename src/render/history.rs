use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use super::mappers::{chroma_hue, dominant_pitch_class};
use super::surface::{hsla_to_rgba, DrawSurface};
use crate::audio::CHROMA_BINS;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChromaHistoryEntry {
    pub chroma: [f32; CHROMA_BINS],
    pub captured_at: Duration,
}

/// Append-only chroma log, throttled to one entry per interval.
///
/// Entries are kept for the whole session.
#[derive(Debug)]
pub struct ChromaHistory {
    interval: Duration,
    entries: Vec<ChromaHistoryEntry>,
    last_recorded: Option<Duration>,
    revision: u64,
}

pub type SharedHistory = Rc<RefCell<ChromaHistory>>;

impl ChromaHistory {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            entries: Vec::new(),
            last_recorded: None,
            revision: 0,
        }
    }

    pub fn shared(interval: Duration) -> SharedHistory {
        Rc::new(RefCell::new(Self::new(interval)))
    }

    /// Appends `chroma` unless the previous entry is younger than the
    /// interval. Returns whether an entry was added.
    pub fn record(&mut self, chroma: [f32; CHROMA_BINS], now: Duration) -> bool {
        if let Some(last) = self.last_recorded {
            if now.saturating_sub(last) < self.interval {
                return false;
            }
        }
        self.entries.push(ChromaHistoryEntry { chroma, captured_at: now });
        self.last_recorded = Some(now);
        self.revision += 1;
        true
    }

    pub fn entries(&self) -> &[ChromaHistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bumped on every append, so views can tell when to redraw.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

/// Width in pixels of one history column.
pub const HISTORY_COLUMN_WIDTH: u32 = 4;

/// Draws one column per entry at the row of its dominant pitch class
/// (C at the bottom). When there are more entries than columns, the newest
/// ones are shown.
pub fn draw_history(surface: &mut dyn DrawSurface, history: &ChromaHistory) {
    let (width, height) = (surface.width(), surface.height());
    surface.clear();
    if width == 0 || height == 0 {
        return;
    }

    let columns = (width / HISTORY_COLUMN_WIDTH).max(1) as usize;
    let row_height = height as f32 / CHROMA_BINS as f32;
    let visible = &history.entries()[history.len().saturating_sub(columns)..];

    for (column, entry) in visible.iter().enumerate() {
        let pitch_class = dominant_pitch_class(&entry.chroma);
        let strength = entry.chroma[pitch_class];
        // silence has no dominant pitch class
        if strength <= 0.0 {
            continue;
        }
        let color = hsla_to_rgba(chroma_hue(pitch_class), 100.0, 25.0 + strength * 25.0, 1.0);
        let y = height as f32 - (pitch_class as f32 + 1.0) * row_height;
        surface.fill_rect(
            (column as u32 * HISTORY_COLUMN_WIDTH) as f32,
            y,
            HISTORY_COLUMN_WIDTH as f32,
            row_height,
            color,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::surface::PixelCanvas;

    fn chroma_peak(pc: usize) -> [f32; CHROMA_BINS] {
        let mut chroma = [0.1; CHROMA_BINS];
        chroma[pc] = 1.0;
        chroma
    }

    #[test]
    fn test_records_at_most_once_per_interval() {
        let mut history = ChromaHistory::new(Duration::from_millis(1000));
        let mut accepted = 0;
        // analysis callbacks every ~11.6 ms for 5 seconds
        for i in 0..431u64 {
            let now = Duration::from_micros(i * 11_610);
            if history.record(chroma_peak((i % 12) as usize), now) {
                accepted += 1;
            }
        }
        assert_eq!(accepted, history.len());
        assert_eq!(history.len(), 5);
        for pair in history.entries().windows(2) {
            assert!(pair[1].captured_at - pair[0].captured_at >= Duration::from_millis(1000));
        }
    }

    #[test]
    fn test_first_record_is_accepted_and_bumps_revision() {
        let mut history = ChromaHistory::new(Duration::from_millis(1000));
        assert!(history.record(chroma_peak(0), Duration::from_millis(5)));
        assert!(!history.record(chroma_peak(0), Duration::from_millis(1004)));
        assert!(history.record(chroma_peak(0), Duration::from_millis(1005)));
        assert_eq!(history.revision(), 2);
    }

    #[test]
    fn test_draws_dominant_pitch_class_per_column() {
        let mut history = ChromaHistory::new(Duration::from_millis(1000));
        history.record(chroma_peak(0), Duration::from_secs(0));
        history.record(chroma_peak(11), Duration::from_secs(1));

        let mut canvas = PixelCanvas::new(40, 120);
        draw_history(&mut canvas, &history);

        // 10 px per row: C occupies the bottom row, B the top row
        assert_ne!(canvas.pixel(1, 115), canvas.background());
        assert_eq!(canvas.pixel(1, 5), canvas.background());
        assert_ne!(canvas.pixel(5, 5), canvas.background());
        assert_eq!(canvas.pixel(5, 115), canvas.background());
        assert_eq!(canvas.pixel(9, 60), canvas.background());
    }

    #[test]
    fn test_silent_entry_leaves_its_column_empty() {
        let mut history = ChromaHistory::new(Duration::from_millis(1000));
        history.record([0.0; CHROMA_BINS], Duration::from_secs(0));
        history.record(chroma_peak(3), Duration::from_secs(1));

        let mut canvas = PixelCanvas::new(40, 120);
        draw_history(&mut canvas, &history);

        for y in (0..120).step_by(10) {
            assert_eq!(canvas.pixel(1, y + 5), canvas.background());
        }
        assert_ne!(canvas.pixel(5, 85), canvas.background());
    }

    #[test]
    fn test_overflowing_history_shows_newest_entries() {
        let mut history = ChromaHistory::new(Duration::from_millis(1000));
        for i in 0..20u64 {
            history.record(chroma_peak(if i == 19 { 11 } else { 0 }), Duration::from_secs(i));
        }
        let mut canvas = PixelCanvas::new(40, 120);
        draw_history(&mut canvas, &history);

        // 10 columns visible, the last one holds the B entry
        assert_ne!(canvas.pixel(37, 5), canvas.background());
        assert_ne!(canvas.pixel(1, 115), canvas.background());
    }
}
