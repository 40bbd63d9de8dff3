use log::{debug, info};

use super::{CpuFeatureExtractor, FeatureExtractor, FeatureKind, RawFeatures};
use crate::error::{Result, VisualizerError};

/// Callback invoked once per analysed frame.
pub type FeatureCallback = Box<dyn FnMut(RawFeatures)>;

#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub frame_size: usize,
    pub features: Vec<FeatureKind>,
    pub sample_rate: f32,
}

/// Cuts an incoming sample stream into fixed-size frames and hands each
/// frame's features to the callback while running.
pub struct FrameAnalyzer {
    extractor: Box<dyn FeatureExtractor>,
    features: Vec<FeatureKind>,
    callback: FeatureCallback,
    pending: Vec<f32>,
    running: bool,
    frames_emitted: u64,
}

/// Builds a frame analyzer backed by the CPU extractor.
pub fn create_analyzer(config: AnalyzerConfig, callback: FeatureCallback) -> Result<FrameAnalyzer> {
    let extractor = CpuFeatureExtractor::new(config.sample_rate, config.frame_size)?;
    FrameAnalyzer::with_extractor(Box::new(extractor), config.features, callback)
}

impl FrameAnalyzer {
    pub fn with_extractor(
        extractor: Box<dyn FeatureExtractor>,
        features: Vec<FeatureKind>,
        callback: FeatureCallback,
    ) -> Result<Self> {
        if features.is_empty() {
            return Err(VisualizerError::AnalyzerInit("no features requested".to_string()));
        }
        info!(
            "Frame analyzer ready ({} extractor, {} samples/frame, {:?})",
            extractor.extractor_type(),
            extractor.frame_size(),
            features
        );
        let frame_size = extractor.frame_size();
        Ok(Self {
            extractor,
            features,
            callback,
            pending: Vec::with_capacity(frame_size),
            running: false,
            frames_emitted: 0,
        })
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    /// Stops callbacks and drops any partially filled frame. Safe to call
    /// repeatedly.
    pub fn stop(&mut self) {
        self.running = false;
        self.pending.clear();
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn frame_size(&self) -> usize {
        self.extractor.frame_size()
    }

    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }

    /// Buffers samples and runs the callback for every completed frame.
    /// Samples pushed while stopped are discarded. Returns the number of
    /// frames analysed.
    pub fn push_samples(&mut self, samples: &[f32]) -> usize {
        if !self.running {
            return 0;
        }

        let frame_size = self.extractor.frame_size();
        let mut analysed = 0;
        let mut rest = samples;
        while !rest.is_empty() {
            let take = (frame_size - self.pending.len()).min(rest.len());
            self.pending.extend_from_slice(&rest[..take]);
            rest = &rest[take..];

            if self.pending.len() == frame_size {
                let raw = self.extractor.extract(&self.pending, &self.features);
                self.pending.clear();
                self.frames_emitted += 1;
                analysed += 1;
                (self.callback)(raw);
            }
        }

        if analysed > 0 && self.frames_emitted % 500 == 0 {
            debug!("Frame analyzer emitted {} frames", self.frames_emitted);
        }
        analysed
    }
}
