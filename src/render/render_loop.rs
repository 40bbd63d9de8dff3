use log::debug;

use super::history::{draw_history, ChromaHistory};
use super::mappers::{
    bar_params, bar_thickness, chroma_fill, chroma_hue, heat_lightness, progress_width, VisualInputs,
    BAR_SATURATION,
};
use super::scheduler::{FrameHandle, FrameScheduler};
use super::surface::{hsla_to_rgba, DrawSurface, PixelCanvas, Rgba};
use crate::audio::{LatestFeatures, SpectrumAnalyser, CHROMA_BINS, PITCH_CLASSES};
use crate::config::CanvasConfig;
use crate::pipeline::{PlaybackState, PlayingFlag};

const PROGRESS_HEIGHT: f32 = 6.0;
const CHROMA_ROW_HEIGHT: f32 = 30.0;
const BAR_GAP: f32 = 1.0;
const PROGRESS_TRACK: Rgba = Rgba::rgb(40, 40, 40);
const PROGRESS_FILL: Rgba = Rgba::rgb(230, 230, 230);

/// The three drawing targets the loop paints each tick.
pub struct Surfaces {
    pub main: PixelCanvas,
    pub heatmap: PixelCanvas,
    pub history: PixelCanvas,
}

impl Surfaces {
    pub fn new(config: &CanvasConfig) -> Self {
        Self {
            main: PixelCanvas::new(config.width, config.height),
            heatmap: PixelCanvas::with_background(config.width, config.heatmap_height, Rgba::rgb(0, 0, 0)),
            history: PixelCanvas::new(config.width, config.history_height),
        }
    }

    pub fn clear(&mut self) {
        self.main.clear();
        self.heatmap.clear();
        self.history.clear();
    }
}

/// Vertical split of the main surface: bars, progress strip, chroma row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MainLayout {
    pub width: f32,
    pub bars_height: f32,
    pub progress_top: f32,
    pub progress_height: f32,
    pub chroma_top: f32,
    pub chroma_height: f32,
}

impl MainLayout {
    pub fn for_surface(surface: &dyn DrawSurface) -> Self {
        let width = surface.width() as f32;
        let height = surface.height() as f32;
        let chroma_height = CHROMA_ROW_HEIGHT.min(height / 3.0);
        let progress_height = PROGRESS_HEIGHT.min(height / 10.0);
        let bars_height = (height - chroma_height - progress_height).max(0.0);
        Self {
            width,
            bars_height,
            progress_top: bars_height,
            progress_height,
            chroma_top: bars_height + progress_height,
            chroma_height,
        }
    }
}

/// Read-only state a tick draws from.
pub struct FrameInputs<'a> {
    pub features: LatestFeatures,
    pub playback: &'a PlaybackState,
    pub history: &'a ChromaHistory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Playback is stopped; nothing was drawn and no tick was registered.
    Stopped,
    Drawn,
}

/// Self-rescheduling draw loop driven by display refreshes.
pub struct RenderLoop {
    playing: PlayingFlag,
    handle: Option<FrameHandle>,
    bins: Vec<u8>,
    history_revision: Option<u64>,
    ticks: u64,
}

impl RenderLoop {
    pub fn new(playing: PlayingFlag) -> Self {
        Self {
            playing,
            handle: None,
            bins: Vec::new(),
            history_revision: None,
            ticks: 0,
        }
    }

    /// Registers the first tick unless one is already pending.
    pub fn start(&mut self, scheduler: &mut FrameScheduler) {
        if self.handle.is_none() {
            self.handle = Some(scheduler.request_frame());
        }
    }

    /// Revokes the pending tick, if any.
    pub fn cancel(&mut self, scheduler: &mut FrameScheduler) {
        if let Some(handle) = self.handle.take() {
            scheduler.cancel_frame(handle);
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.handle.is_some()
    }

    /// Whether `handle` is this loop's pending registration.
    pub fn owns(&self, handle: FrameHandle) -> bool {
        self.handle == Some(handle)
    }

    /// Forces the history view to redraw on the next tick.
    pub fn invalidate_history(&mut self) {
        self.history_revision = None;
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// One render tick. The next tick is registered before any drawing so a
    /// cancel issued while drawing still stops the loop.
    pub fn run_frame(
        &mut self,
        scheduler: &mut FrameScheduler,
        spectrum: &mut SpectrumAnalyser,
        inputs: FrameInputs<'_>,
        surfaces: &mut Surfaces,
    ) -> TickOutcome {
        self.handle = None;
        if !self.playing.get() {
            return TickOutcome::Stopped;
        }
        self.handle = Some(scheduler.request_frame());

        self.bins.resize(spectrum.frequency_bin_count(), 0);
        spectrum.byte_frequency_data(&mut self.bins);

        let visual = VisualInputs::from(&inputs.features);
        surfaces.main.clear();
        let layout = MainLayout::for_surface(&surfaces.main);
        draw_bars(&mut surfaces.main, &self.bins, &visual, &layout);
        draw_progress(&mut surfaces.main, inputs.playback, &layout);
        draw_chroma_row(&mut surfaces.main, &visual.chroma, &layout);

        draw_heatmap_column(&mut surfaces.heatmap, &visual.chroma);

        let revision = inputs.history.revision();
        if self.history_revision != Some(revision) {
            draw_history(&mut surfaces.history, inputs.history);
            self.history_revision = Some(revision);
        }

        self.ticks += 1;
        if self.ticks % 120 == 0 {
            debug!(
                "tick {}: rms={:.4} zcr={:.1} centroid={:.2} position={:?}",
                self.ticks, visual.rms, visual.zcr, visual.spectral_centroid, inputs.playback.position
            );
        }
        TickOutcome::Drawn
    }
}

/// Frequency bars left to right, anchored at the bottom of the bars region.
pub fn draw_bars(surface: &mut dyn DrawSurface, bins: &[u8], inputs: &VisualInputs, layout: &MainLayout) {
    if bins.is_empty() || layout.bars_height <= 0.0 {
        return;
    }
    let bar_width = layout.width / bins.len() as f32 * bar_thickness(inputs.zcr);
    let mut x = 0.0;
    for (i, &amplitude) in bins.iter().enumerate() {
        if x >= layout.width {
            break;
        }
        let bar = bar_params(amplitude, i, bins.len(), layout.bars_height, inputs);
        let color = hsla_to_rgba(bar.hue, BAR_SATURATION, bar.lightness, bar.opacity);
        surface.fill_rect(x, layout.bars_height - bar.height, bar_width, bar.height, color);
        x += bar_width + BAR_GAP;
    }
}

pub fn draw_progress(surface: &mut dyn DrawSurface, playback: &PlaybackState, layout: &MainLayout) {
    surface.fill_rect(0.0, layout.progress_top, layout.width, layout.progress_height, PROGRESS_TRACK);
    let fill = progress_width(layout.width, playback.position, playback.duration);
    if fill > 0.0 {
        surface.fill_rect(0.0, layout.progress_top, fill, layout.progress_height, PROGRESS_FILL);
    }
}

/// One cell per pitch class with its note label.
pub fn draw_chroma_row(surface: &mut dyn DrawSurface, chroma: &[f32; CHROMA_BINS], layout: &MainLayout) {
    let cell_width = layout.width / CHROMA_BINS as f32;
    let bottom = layout.chroma_top + layout.chroma_height;
    for (pitch_class, &value) in chroma.iter().enumerate() {
        let x = pitch_class as f32 * cell_width;
        let fill = chroma_fill(value, layout.chroma_height);
        if fill > 0.0 {
            let color = hsla_to_rgba(chroma_hue(pitch_class), 100.0, 50.0, 1.0);
            surface.fill_rect(x + 1.0, bottom - fill, cell_width - 2.0, fill, color);
        }
        surface.draw_text(x + 2.0, layout.chroma_top + 2.0, PITCH_CLASSES[pitch_class], Rgba::WHITE);
    }
}

/// Scrolls the heat-map one column left and paints the newest chroma in the
/// rightmost column, C at the bottom.
pub fn draw_heatmap_column(surface: &mut dyn DrawSurface, chroma: &[f32; CHROMA_BINS]) {
    let (width, height) = (surface.width(), surface.height());
    if width == 0 || height == 0 {
        return;
    }
    surface.shift_left(1);
    let row_height = height as f32 / CHROMA_BINS as f32;
    for (pitch_class, &value) in chroma.iter().enumerate() {
        let color = hsla_to_rgba(chroma_hue(pitch_class), 100.0, heat_lightness(value), 1.0);
        let y = height as f32 - (pitch_class as f32 + 1.0) * row_height;
        surface.fill_rect((width - 1) as f32, y, 1.0, row_height, color);
    }
}
