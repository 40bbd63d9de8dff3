//! Pure feature-to-visual-parameter transforms.

use std::time::Duration;

use crate::audio::{LatestFeatures, CHROMA_BINS};

/// Largest value an analyser byte bin can hold.
pub const MAX_AMPLITUDE: f32 = 255.0;

/// Feature values with every unpublished feature replaced by its neutral
/// value, so mappers never see a missing input.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VisualInputs {
    pub spectral_centroid: f32,
    pub rms: f32,
    pub zcr: f32,
    pub loudness: f32,
    pub chroma: [f32; CHROMA_BINS],
}

impl From<&LatestFeatures> for VisualInputs {
    fn from(latest: &LatestFeatures) -> Self {
        Self {
            spectral_centroid: latest.spectral_centroid.unwrap_or(0.0),
            rms: latest.rms.unwrap_or(0.0),
            zcr: latest.zcr.unwrap_or(0.0),
            loudness: latest.loudness.unwrap_or(0.0),
            chroma: latest.chroma.unwrap_or([0.0; CHROMA_BINS]),
        }
    }
}

/// Quadratic compression of a byte amplitude onto `0..=max_height`.
pub fn bar_height(raw_amplitude: u8, max_height: f32) -> f32 {
    let normalized = raw_amplitude as f32 / MAX_AMPLITUDE;
    normalized * normalized * max_height
}

/// Width multiplier for bars; noisier signals (higher ZCR) get wider bars.
pub fn bar_thickness(zcr: f32) -> f32 {
    (zcr / 100.0).clamp(1.0, 3.0)
}

pub fn bar_opacity(rms: f32) -> f32 {
    (rms * 100.0 / 10.0).clamp(0.3, 1.0)
}

pub fn bar_hue(bin_index: usize, total_bins: usize) -> f32 {
    if total_bins == 0 {
        return 0.0;
    }
    bin_index as f32 / total_bins as f32 * 360.0
}

pub fn bar_lightness(bar_height: f32, max_height: f32) -> f32 {
    if max_height <= 0.0 {
        return 0.0;
    }
    bar_height / max_height * 50.0
}

pub const BAR_SATURATION: f32 = 100.0;

/// Everything needed to paint one frequency bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarParams {
    pub height: f32,
    pub hue: f32,
    pub lightness: f32,
    pub opacity: f32,
}

pub fn bar_params(raw_amplitude: u8, bin_index: usize, total_bins: usize, max_height: f32, inputs: &VisualInputs) -> BarParams {
    let height = bar_height(raw_amplitude, max_height);
    BarParams {
        height,
        hue: bar_hue(bin_index, total_bins),
        lightness: bar_lightness(height, max_height),
        opacity: bar_opacity(inputs.rms),
    }
}

pub fn chroma_fill(value: f32, cell_height: f32) -> f32 {
    value.clamp(0.0, 1.0) * cell_height
}

pub fn chroma_hue(pitch_class: usize) -> f32 {
    pitch_class as f32 * 30.0
}

/// Lightness of one heat-map cell.
pub fn heat_lightness(value: f32) -> f32 {
    value.clamp(0.0, 1.0) * 50.0
}

/// Progress-bar fill width. Unknown or zero duration draws nothing.
pub fn progress_width(total_width: f32, position: Duration, duration: Option<Duration>) -> f32 {
    let duration = match duration {
        Some(d) if !d.is_zero() => d.as_secs_f64(),
        _ => return 0.0,
    };
    let percent = position.as_secs_f64() / duration * 100.0;
    (total_width as f64 * percent / 100.0).clamp(0.0, total_width as f64) as f32
}

/// Index of the strongest pitch class; the first one wins a tie.
pub fn dominant_pitch_class(chroma: &[f32; CHROMA_BINS]) -> usize {
    chroma
        .iter()
        .enumerate()
        .fold((0, f32::MIN), |(best, best_value), (i, &v)| {
            if v > best_value {
                (i, v)
            } else {
                (best, best_value)
            }
        })
        .0
}
