//! Spectral-flux onset detection.
//!
//! Frames the signal, takes the magnitude spectrum of each Hann-windowed
//! frame, sums the positive spectral differences between consecutive frames
//! into a flux envelope, and picks local maxima above an adaptive threshold.

use realfft::{RealFftPlanner, RealToComplex};

use super::{OnsetError, OnsetSource};

/// Built-in onset detector.
#[derive(Debug, Clone)]
pub struct SpectralFluxDetector {
    /// FFT window size in samples (power of two).
    pub window_size: usize,
    /// Advance between frames in samples.
    pub hop_size: usize,
    /// Adaptive threshold: mean(flux) + factor * std(flux).
    pub threshold_factor: f32,
    /// Minimum spacing between reported onsets, in seconds.
    pub min_gap_secs: f32,
}

impl Default for SpectralFluxDetector {
    fn default() -> Self {
        Self {
            window_size: 2048,
            hop_size: 512,
            threshold_factor: 1.5,
            min_gap_secs: 0.03,
        }
    }
}

impl OnsetSource for SpectralFluxDetector {
    fn onsets(&self, samples: &[f32], sample_rate: u32) -> Result<Vec<f32>, OnsetError> {
        if self.hop_size == 0 || self.window_size == 0 {
            return Err(OnsetError::InvalidConfig(
                "window and hop size must be non-zero".into(),
            ));
        }
        if samples.len() < self.window_size {
            return Ok(Vec::new());
        }

        let flux = self.flux_envelope(samples);
        Ok(self.pick_peaks(&flux, sample_rate))
    }
}

impl SpectralFluxDetector {
    /// Sum of positive magnitude differences between consecutive frames.
    /// The first frame has no predecessor and contributes zero.
    fn flux_envelope(&self, samples: &[f32]) -> Vec<f32> {
        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(self.window_size);
        let mut spectrum = fft.make_output_vec();
        let mut frame = vec![0.0f32; self.window_size];

        let num_frames = (samples.len() - self.window_size) / self.hop_size + 1;
        let mut flux = Vec::with_capacity(num_frames);
        let mut prev_mags: Option<Vec<f32>> = None;

        for idx in 0..num_frames {
            let start = idx * self.hop_size;
            frame.copy_from_slice(&samples[start..start + self.window_size]);
            apply_hann(&mut frame);

            // realfft only fails on mismatched buffer lengths, which are
            // fixed by construction here.
            if fft.process(&mut frame, &mut spectrum).is_err() {
                break;
            }
            let mags: Vec<f32> = spectrum.iter().map(|c| c.norm()).collect();

            let frame_flux = match &prev_mags {
                Some(prev) => mags
                    .iter()
                    .zip(prev)
                    .map(|(cur, prev)| (cur - prev).max(0.0))
                    .sum(),
                None => 0.0,
            };
            flux.push(frame_flux);
            prev_mags = Some(mags);
        }

        flux
    }

    /// Local maxima above mean + factor * std, at least `min_gap_secs` apart,
    /// converted from frame indices to seconds.
    fn pick_peaks(&self, flux: &[f32], sample_rate: u32) -> Vec<f32> {
        if flux.len() < 3 {
            return Vec::new();
        }

        let mean = flux.iter().sum::<f32>() / flux.len() as f32;
        let variance =
            flux.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / flux.len() as f32;
        let threshold = mean + self.threshold_factor * variance.sqrt();

        let frame_secs = self.hop_size as f32 / sample_rate as f32;
        let min_gap_frames = (self.min_gap_secs / frame_secs).ceil() as usize;

        let mut onsets = Vec::new();
        let mut last_peak: Option<usize> = None;

        for i in 1..flux.len() - 1 {
            let is_peak = flux[i] > flux[i - 1] && flux[i] > flux[i + 1];
            let gap_ok = last_peak.is_none_or(|p| i - p >= min_gap_frames.max(1));
            if is_peak && flux[i] > threshold && gap_ok {
                onsets.push(i as f32 * frame_secs);
                last_peak = Some(i);
            }
        }

        log::debug!(
            "Spectral flux: {} frames, {} onsets above threshold {:.3}",
            flux.len(),
            onsets.len(),
            threshold
        );
        onsets
    }
}

fn apply_hann(frame: &mut [f32]) {
    let n = frame.len() as f32;
    for (i, s) in frame.iter_mut().enumerate() {
        *s *= 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n).cos());
    }
}
