use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

use super::{FeatureKind, Loudness, RawFeatures, CHROMA_BINS};
use crate::error::{Result, VisualizerError};

const BARK_BANDS: usize = 24;

/// Lowest frequency folded into the chroma vector (A0).
const CHROMA_MIN_HZ: f32 = 27.5;

/// Frame-level feature extraction, the seam behind the frame analyzer.
///
/// Implementations return only the requested features. A feature may be left
/// out when it is undefined for the frame.
pub trait FeatureExtractor {
    fn extract(&mut self, frame: &[f32], features: &[FeatureKind]) -> RawFeatures;

    fn frame_size(&self) -> usize;

    /// Identification string used in logs ("CPU", ...).
    fn extractor_type(&self) -> &'static str;
}

/// rustfft-based extractor producing centroid, RMS, ZCR, Bark loudness and
/// chroma for one windowed frame.
pub struct CpuFeatureExtractor {
    sample_rate: f32,
    frame_size: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    spectrum: Vec<f32>,
    bark_limits: Vec<usize>,
    pitch_class_of_bin: Vec<Option<usize>>,
}

impl CpuFeatureExtractor {
    pub fn new(sample_rate: f32, frame_size: usize) -> Result<Self> {
        if frame_size < 2 || !frame_size.is_power_of_two() {
            return Err(VisualizerError::AnalyzerInit(format!(
                "frame size must be a power of two, got {}",
                frame_size
            )));
        }
        if !(sample_rate > 0.0) {
            return Err(VisualizerError::AnalyzerInit(format!("invalid sample rate {}", sample_rate)));
        }

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(frame_size);
        let bins = frame_size / 2;

        Ok(Self {
            sample_rate,
            frame_size,
            fft,
            window: Self::hann_window(frame_size),
            buffer: vec![Complex::new(0.0, 0.0); frame_size],
            spectrum: vec![0.0; bins],
            bark_limits: Self::bark_band_limits(sample_rate, frame_size),
            pitch_class_of_bin: Self::pitch_class_map(sample_rate, frame_size),
        })
    }

    fn hann_window(size: usize) -> Vec<f32> {
        (0..size)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32;
                0.5 * (1.0 - phase.cos())
            })
            .collect()
    }

    /// Bin indices splitting the amplitude spectrum into equal-width Bark bands.
    fn bark_band_limits(sample_rate: f32, frame_size: usize) -> Vec<usize> {
        let bins = frame_size / 2;
        let bark: Vec<f32> = (0..bins)
            .map(|i| {
                let f = i as f32 * sample_rate / frame_size as f32;
                13.0 * (f / 1315.8).atan() + 3.5 * (f / 7518.0).powi(2).atan()
            })
            .collect();

        let top = bark[bins - 1];
        let mut limits = vec![0usize; BARK_BANDS + 1];
        let mut band = 1;
        let mut band_end = top / BARK_BANDS as f32;
        for (i, &b) in bark.iter().enumerate() {
            while b > band_end && band < BARK_BANDS {
                limits[band] = i;
                band += 1;
                band_end = band as f32 * top / BARK_BANDS as f32;
            }
        }
        for limit in limits.iter_mut().skip(band) {
            *limit = bins - 1;
        }
        limits[BARK_BANDS] = bins - 1;
        limits
    }

    fn pitch_class_map(sample_rate: f32, frame_size: usize) -> Vec<Option<usize>> {
        let nyquist = sample_rate / 2.0;
        (0..frame_size / 2)
            .map(|i| {
                let freq = i as f32 * sample_rate / frame_size as f32;
                if i == 0 || freq < CHROMA_MIN_HZ || freq >= nyquist {
                    return None;
                }
                // MIDI 69 = A4 = 440 Hz, MIDI 60 = C4 = pitch class 0
                let midi = 69.0 + 12.0 * (freq / 440.0).log2();
                Some((midi.round() as i64).rem_euclid(CHROMA_BINS as i64) as usize)
            })
            .collect()
    }

    fn compute_spectrum(&mut self, frame: &[f32]) {
        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let sample = frame.get(i).copied().unwrap_or(0.0);
            *slot = Complex::new(sample * self.window[i], 0.0);
        }
        self.fft.process(&mut self.buffer);
        for (magnitude, c) in self.spectrum.iter_mut().zip(self.buffer.iter()) {
            *magnitude = c.norm();
        }
    }

    fn rms(frame: &[f32]) -> f32 {
        if frame.is_empty() {
            return 0.0;
        }
        (frame.iter().map(|x| x * x).sum::<f32>() / frame.len() as f32).sqrt()
    }

    /// Sign changes across the frame.
    fn zero_crossings(frame: &[f32]) -> f32 {
        frame
            .windows(2)
            .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
            .count() as f32
    }

    /// Centre of mass of the amplitude spectrum, in bins.
    fn spectral_centroid(&self) -> f32 {
        let total: f32 = self.spectrum.iter().sum();
        if total <= 0.0 {
            return 0.0;
        }
        let weighted: f32 = self
            .spectrum
            .iter()
            .enumerate()
            .map(|(i, &m)| i as f32 * m)
            .sum();
        weighted / total
    }

    fn loudness(&self) -> Loudness {
        let specific: Vec<f32> = self
            .bark_limits
            .windows(2)
            .map(|band| {
                let sum: f32 = self.spectrum[band[0]..band[1]].iter().sum();
                sum.powf(0.23)
            })
            .collect();
        Loudness {
            total: specific.iter().sum(),
            specific,
        }
    }

    /// Energy per pitch class, scaled so the strongest class is 1.0.
    fn chroma(&self) -> Vec<f32> {
        let mut chroma = vec![0.0f32; CHROMA_BINS];
        for (magnitude, pitch_class) in self.spectrum.iter().zip(self.pitch_class_of_bin.iter()) {
            if let Some(pc) = pitch_class {
                chroma[*pc] += magnitude * magnitude;
            }
        }
        let max = chroma.iter().cloned().fold(0.0f32, f32::max);
        if max > 0.0 {
            chroma.iter_mut().for_each(|v| *v /= max);
        }
        chroma
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }
}

impl FeatureExtractor for CpuFeatureExtractor {
    fn extract(&mut self, frame: &[f32], features: &[FeatureKind]) -> RawFeatures {
        let wants = |kind: FeatureKind| features.contains(&kind);
        let needs_spectrum = wants(FeatureKind::SpectralCentroid)
            || wants(FeatureKind::Loudness)
            || wants(FeatureKind::Chroma);
        if needs_spectrum {
            self.compute_spectrum(frame);
        }

        RawFeatures {
            spectral_centroid: wants(FeatureKind::SpectralCentroid).then(|| self.spectral_centroid()),
            rms: wants(FeatureKind::Rms).then(|| Self::rms(frame)),
            zcr: wants(FeatureKind::Zcr).then(|| Self::zero_crossings(frame)),
            loudness: wants(FeatureKind::Loudness).then(|| self.loudness()),
            chroma: wants(FeatureKind::Chroma).then(|| self.chroma()),
        }
    }

    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn extractor_type(&self) -> &'static str {
        "CPU"
    }
}
