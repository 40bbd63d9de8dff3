use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::collections::VecDeque;
use std::sync::Arc;

use crate::config::SpectrumConfig;

/// Byte-scaled spectrum of the most recent `fft_size` samples, with the same
/// scaling rules as a Web Audio analyser node: Blackman window, temporal
/// smoothing of magnitudes, dB range mapped linearly onto 0..=255.
pub struct SpectrumAnalyser {
    fft_size: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    history: VecDeque<f32>,
    smoothed: Vec<f32>,
    scratch: Vec<Complex<f32>>,
    smoothing: f32,
    min_decibels: f32,
    max_decibels: f32,
}

impl SpectrumAnalyser {
    pub fn new(config: &SpectrumConfig) -> Self {
        let fft_size = config.fft_size.next_power_of_two().clamp(32, 32768);
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        let (min_decibels, max_decibels) = if config.max_decibels > config.min_decibels {
            (config.min_decibels, config.max_decibels)
        } else {
            (-100.0, -30.0)
        };

        Self {
            fft_size,
            fft,
            window: Self::blackman_window(fft_size),
            history: VecDeque::from(vec![0.0; fft_size]),
            smoothed: vec![0.0; fft_size / 2],
            scratch: vec![Complex::new(0.0, 0.0); fft_size],
            smoothing: config.smoothing.clamp(0.0, 1.0),
            min_decibels,
            max_decibels,
        }
    }

    fn blackman_window(size: usize) -> Vec<f32> {
        let (a0, a1, a2) = (0.42, 0.5, 0.08);
        (0..size)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * i as f32 / size as f32;
                a0 - a1 * phase.cos() + a2 * (2.0 * phase).cos()
            })
            .collect()
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Appends mono samples, keeping only the newest `fft_size`.
    pub fn push_samples(&mut self, samples: &[f32]) {
        let skip = samples.len().saturating_sub(self.fft_size);
        for &sample in &samples[skip..] {
            self.history.pop_front();
            self.history.push_back(sample);
        }
    }

    pub fn reset(&mut self) {
        self.history.iter_mut().for_each(|s| *s = 0.0);
        self.smoothed.iter_mut().for_each(|m| *m = 0.0);
    }

    /// Fills `out` with byte magnitudes, one per bin. Each call advances the
    /// smoothing state.
    pub fn byte_frequency_data(&mut self, out: &mut [u8]) {
        for (i, slot) in self.scratch.iter_mut().enumerate() {
            *slot = Complex::new(self.history[i] * self.window[i], 0.0);
        }
        self.fft.process(&mut self.scratch);

        let scale = 1.0 / self.fft_size as f32;
        let range = self.max_decibels - self.min_decibels;
        for (k, smoothed) in self.smoothed.iter_mut().enumerate() {
            let magnitude = self.scratch[k].norm() * scale;
            *smoothed = self.smoothing * *smoothed + (1.0 - self.smoothing) * magnitude;

            if let Some(byte) = out.get_mut(k) {
                *byte = if *smoothed > 0.0 {
                    let db = 20.0 * smoothed.log10();
                    (255.0 * (db - self.min_decibels) / range).clamp(0.0, 255.0) as u8
                } else {
                    0
                };
            }
        }
    }

    /// Fills `out` with the newest samples mapped to 0..=255 around 128.
    pub fn byte_time_domain_data(&self, out: &mut [u8]) {
        for (byte, &sample) in out.iter_mut().zip(self.history.iter()) {
            *byte = (128.0 * (1.0 + sample)).clamp(0.0, 255.0) as u8;
        }
    }
}
