pub mod analyzer;
pub mod extractor;
pub mod features;
pub mod playback;
pub mod spectrum;
pub mod tap;

use serde::{Deserialize, Serialize};

pub use analyzer::{create_analyzer, AnalyzerConfig, FrameAnalyzer};
pub use extractor::{CpuFeatureExtractor, FeatureExtractor};
pub use features::{FeatureReadout, FeatureSnapshot, LatestFeatures, LiveFeatures, Loudness, RawFeatures};
pub use playback::{AudioOutput, MediaBackend, MediaSource, RodioSource};
pub use spectrum::SpectrumAnalyser;
pub use tap::TappedSource;

/// Number of pitch classes in a chroma vector.
pub const CHROMA_BINS: usize = 12;

/// Pitch class labels, index-aligned with chroma vectors.
pub const PITCH_CLASSES: [&str; CHROMA_BINS] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Features the frame analyzer can be asked to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeatureKind {
    SpectralCentroid,
    Rms,
    Zcr,
    Loudness,
    Chroma,
}

impl FeatureKind {
    pub const ALL: [FeatureKind; 5] = [
        FeatureKind::SpectralCentroid,
        FeatureKind::Rms,
        FeatureKind::Zcr,
        FeatureKind::Loudness,
        FeatureKind::Chroma,
    ];
}
