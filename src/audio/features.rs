use std::cell::RefCell;
use std::rc::Rc;

use super::CHROMA_BINS;

/// Loudness as reported by the analyzer: per-Bark-band specific loudness and
/// their sum.
#[derive(Debug, Clone, PartialEq)]
pub struct Loudness {
    pub total: f32,
    pub specific: Vec<f32>,
}

/// One analyzer callback payload.
///
/// Only requested features are filled in, and the analyzer may leave any of
/// them out on a transient frame, so every field is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFeatures {
    pub spectral_centroid: Option<f32>,
    pub rms: Option<f32>,
    pub zcr: Option<f32>,
    pub loudness: Option<Loudness>,
    pub chroma: Option<Vec<f32>>,
}

/// Validated features of a single analysis frame.
///
/// `None` means the frame did not carry the feature; `Some(0.0)` is a real
/// zero reading (silence) and is published like any other value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FeatureSnapshot {
    pub generation: u64,
    pub spectral_centroid: Option<f32>,
    pub rms: Option<f32>,
    pub zcr: Option<f32>,
    pub loudness: Option<f32>,
    pub chroma: Option<[f32; CHROMA_BINS]>,
}

impl FeatureSnapshot {
    /// Guards a raw payload field by field. Non-finite scalars and chroma
    /// vectors of the wrong length are treated as absent.
    pub fn from_payload(raw: &RawFeatures, generation: u64) -> Self {
        Self {
            generation,
            spectral_centroid: finite(raw.spectral_centroid),
            rms: finite(raw.rms),
            zcr: finite(raw.zcr),
            loudness: finite(raw.loudness.as_ref().map(|l| l.total)),
            chroma: raw.chroma.as_deref().and_then(chroma_array),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.spectral_centroid.is_none()
            && self.rms.is_none()
            && self.zcr.is_none()
            && self.loudness.is_none()
            && self.chroma.is_none()
    }
}

fn finite(value: Option<f32>) -> Option<f32> {
    value.filter(|v| v.is_finite())
}

fn chroma_array(values: &[f32]) -> Option<[f32; CHROMA_BINS]> {
    if values.len() != CHROMA_BINS || values.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let mut chroma = [0.0; CHROMA_BINS];
    chroma.copy_from_slice(values);
    Some(chroma)
}

/// Latest published value of each feature.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LatestFeatures {
    pub spectral_centroid: Option<f32>,
    pub rms: Option<f32>,
    pub zcr: Option<f32>,
    pub loudness: Option<f32>,
    pub chroma: Option<[f32; CHROMA_BINS]>,
    /// Source generation of the most recently applied snapshot.
    pub generation: Option<u64>,
    pub frames: u64,
}

impl LatestFeatures {
    /// Overwrites the fields the snapshot carries and keeps the rest.
    pub fn apply(&mut self, snapshot: &FeatureSnapshot) {
        if let Some(v) = snapshot.spectral_centroid {
            self.spectral_centroid = Some(v);
        }
        if let Some(v) = snapshot.rms {
            self.rms = Some(v);
        }
        if let Some(v) = snapshot.zcr {
            self.zcr = Some(v);
        }
        if let Some(v) = snapshot.loudness {
            self.loudness = Some(v);
        }
        if let Some(v) = snapshot.chroma {
            self.chroma = Some(v);
        }
        self.generation = Some(snapshot.generation);
        self.frames += 1;
    }
}

/// The render loop's synchronous view of the latest features.
///
/// The adapter callback writes it and the render loop reads it straight
/// from the cell every tick. UI widgets read the same values through the
/// watch channel instead, whose updates only land on the next UI pass.
#[derive(Debug, Clone, Default)]
pub struct LiveFeatures(Rc<RefCell<LatestFeatures>>);

impl LiveFeatures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self) -> LatestFeatures {
        *self.0.borrow()
    }

    pub fn publish(&self, snapshot: &FeatureSnapshot) -> LatestFeatures {
        let mut latest = self.0.borrow_mut();
        latest.apply(snapshot);
        *latest
    }

    pub fn reset(&self) {
        *self.0.borrow_mut() = LatestFeatures::default();
    }
}

const NOT_AVAILABLE: &str = "Not available";

/// Loudness above which the readout is highlighted.
pub const HIGH_LOUDNESS: f32 = 50.0;

/// Feature values as the UI displays them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureReadout {
    pub spectral_centroid: Option<f32>,
    pub rms: Option<f32>,
    pub zcr: Option<f32>,
    pub loudness: Option<f32>,
    pub chroma: Option<[f32; CHROMA_BINS]>,
}

impl From<&LatestFeatures> for FeatureReadout {
    fn from(latest: &LatestFeatures) -> Self {
        Self {
            spectral_centroid: latest.spectral_centroid,
            rms: latest.rms,
            zcr: latest.zcr,
            loudness: latest.loudness,
            chroma: latest.chroma,
        }
    }
}

impl FeatureReadout {
    pub fn spectral_centroid_label(&self) -> String {
        self.spectral_centroid
            .map_or_else(|| NOT_AVAILABLE.to_string(), |v| format!("{:.2}", v))
    }

    /// RMS is shown as a percentage of full scale.
    pub fn rms_label(&self) -> String {
        self.rms
            .map_or_else(|| NOT_AVAILABLE.to_string(), |v| format!("{:.2}", v * 100.0))
    }

    pub fn zcr_label(&self) -> String {
        self.zcr
            .map_or_else(|| NOT_AVAILABLE.to_string(), |v| format!("{}", v.round() as i64))
    }

    pub fn loudness_label(&self) -> String {
        self.loudness
            .map_or_else(|| NOT_AVAILABLE.to_string(), |v| format!("{:.2}", v))
    }

    pub fn is_loud(&self) -> bool {
        self.loudness.map_or(false, |v| v > HIGH_LOUDNESS)
    }

    pub fn chroma_label(&self) -> String {
        match &self.chroma {
            Some(chroma) => chroma
                .iter()
                .map(|v| format!("{:.2}", v))
                .collect::<Vec<_>>()
                .join(" "),
            None => NOT_AVAILABLE.to_string(),
        }
    }
}
