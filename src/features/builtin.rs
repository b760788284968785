//! Default descriptor computation for loop slices.
//!
//! Deliberately lightweight: single-window magnitude spectrum for the
//! spectral and tonal groups, framed energy for attacks and flux. Anything
//! heavier belongs in an external [`FeatureExtractor`] implementation.

use realfft::{RealFftPlanner, RealToComplex};

use super::{
    DynamicsFeatures, ExtractError, FeatureExtractor, LoopFeatures, RhythmFeatures,
    SpectralFeatures, TonalFeatures,
};
use crate::segment::Loop;

/// Frame length for the energy envelope, seconds.
const ENERGY_FRAME_SECS: f32 = 0.01;

/// An energy rise by this factor over the previous frame counts as an attack.
const ATTACK_RISE_FACTOR: f32 = 2.0;

/// Floor below which a frame is treated as silence.
const SILENCE_RMS: f32 = 1e-4;

#[derive(Debug, Clone)]
pub struct BuiltinExtractor {
    sample_rate: u32,
    /// FFT size for the spectral/tonal groups; slices shorter than this are
    /// zero-padded.
    fft_size: usize,
}

impl BuiltinExtractor {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            fft_size: 4096,
        }
    }
}

impl FeatureExtractor for BuiltinExtractor {
    fn extract(&self, lp: &Loop, slice: &[f32]) -> Result<LoopFeatures, ExtractError> {
        if slice.is_empty() {
            return Err(ExtractError::EmptySlice {
                head: lp.head,
                tail: lp.tail,
            });
        }

        let duration = slice.len() as f32 / self.sample_rate as f32;
        let attack_count = count_attacks(slice, self.sample_rate);

        let rms = rms(slice);
        let peak = slice.iter().fold(0.0f32, |m, &s| m.max(s.abs()));
        let dynamic_range = if rms > 0.0 { peak / rms } else { 0.0 };

        let mags = magnitude_spectrum(slice, self.fft_size);
        let centroid_hz = spectral_centroid(&mags, self.sample_rate, self.fft_size);
        let flux_mean = mean_flux(slice, self.sample_rate);
        let (chroma, strongest_pitch_class) =
            chroma_profile(&mags, self.sample_rate, self.fft_size);

        Ok(LoopFeatures {
            rhythm: RhythmFeatures {
                attack_count,
                attack_density: if duration > 0.0 {
                    attack_count as f32 / duration
                } else {
                    0.0
                },
            },
            dynamics: DynamicsFeatures {
                rms,
                peak,
                dynamic_range,
            },
            spectral: SpectralFeatures {
                zero_crossing_rate: zero_crossing_rate(slice),
                centroid_hz,
                flux_mean,
            },
            tonal: TonalFeatures {
                chroma,
                strongest_pitch_class,
            },
        })
    }
}

fn rms(samples: &[f32]) -> f32 {
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / samples.len() as f64).sqrt() as f32
}

fn zero_crossing_rate(samples: &[f32]) -> f32 {
    if samples.len() < 2 {
        return 0.0;
    }
    let crossings = samples
        .windows(2)
        .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
        .count();
    crossings as f32 / (samples.len() - 1) as f32
}

/// Count frames whose RMS jumps by `ATTACK_RISE_FACTOR` over the previous
/// frame. Coarse, but enough to tell a busy loop from a sustained one.
fn count_attacks(samples: &[f32], sample_rate: u32) -> usize {
    let frame_len = ((sample_rate as f32 * ENERGY_FRAME_SECS) as usize).max(1);
    let energies: Vec<f32> = samples.chunks(frame_len).map(rms).collect();

    energies
        .windows(2)
        .filter(|w| w[1] > SILENCE_RMS && w[1] > w[0] * ATTACK_RISE_FACTOR)
        .count()
}

/// Mean positive frame-to-frame RMS difference, a cheap flux stand-in over
/// the time envelope.
fn mean_flux(samples: &[f32], sample_rate: u32) -> f32 {
    let frame_len = ((sample_rate as f32 * ENERGY_FRAME_SECS) as usize).max(1);
    let energies: Vec<f32> = samples.chunks(frame_len).map(rms).collect();
    if energies.len() < 2 {
        return 0.0;
    }
    energies
        .windows(2)
        .map(|w| (w[1] - w[0]).max(0.0))
        .sum::<f32>()
        / (energies.len() - 1) as f32
}

/// Hann-windowed magnitude spectrum of the slice head, zero-padded to
/// `fft_size`.
fn magnitude_spectrum(samples: &[f32], fft_size: usize) -> Vec<f32> {
    let mut frame = vec![0.0f32; fft_size];
    let n = samples.len().min(fft_size);
    frame[..n].copy_from_slice(&samples[..n]);

    let len = frame.len() as f32;
    for (i, s) in frame.iter_mut().enumerate() {
        *s *= 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / len).cos());
    }

    let mut planner = RealFftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(fft_size);
    let mut spectrum = fft.make_output_vec();
    if fft.process(&mut frame, &mut spectrum).is_err() {
        return vec![0.0; fft_size / 2 + 1];
    }
    spectrum.iter().map(|c| c.norm()).collect()
}

fn spectral_centroid(mags: &[f32], sample_rate: u32, fft_size: usize) -> f32 {
    let bin_width = sample_rate as f32 / fft_size as f32;
    let total: f32 = mags.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    let weighted: f32 = mags
        .iter()
        .enumerate()
        .map(|(i, &m)| i as f32 * bin_width * m)
        .sum();
    weighted / total
}

/// Fold spectral energy onto the 12 pitch classes (C = 0) and normalize.
fn chroma_profile(mags: &[f32], sample_rate: u32, fft_size: usize) -> ([f32; 12], usize) {
    let bin_width = sample_rate as f32 / fft_size as f32;
    let mut chroma = [0.0f32; 12];

    for (i, &m) in mags.iter().enumerate().skip(1) {
        let freq = i as f32 * bin_width;
        if !(27.5..=5000.0).contains(&freq) {
            continue;
        }
        let midi = 69.0 + 12.0 * (freq / 440.0).log2();
        let class = (midi.round() as i32).rem_euclid(12) as usize;
        chroma[class] += m * m;
    }

    let total: f32 = chroma.iter().sum();
    if total > 0.0 {
        for c in &mut chroma {
            *c /= total;
        }
    }

    let strongest = chroma
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0);
    (chroma, strongest)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 44100;

    fn sine(freq: f32, duration_secs: f32, amp: f32) -> Vec<f32> {
        let n = (duration_secs * SR as f32) as usize;
        (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / SR as f32).sin() * amp)
            .collect()
    }

    fn test_loop(len: usize) -> Loop {
        Loop {
            id: 0,
            start: 0.0,
            end: 1.0,
            head: 0,
            tail: len,
            prev: 0,
            next: 0,
        }
    }

    #[test]
    fn empty_slice_is_an_error() {
        let extractor = BuiltinExtractor::new(SR);
        let err = extractor.extract(&test_loop(0), &[]).unwrap_err();
        assert!(matches!(err, ExtractError::EmptySlice { .. }));
    }

    #[test]
    fn sine_dynamics() {
        let extractor = BuiltinExtractor::new(SR);
        let slice = sine(440.0, 1.0, 0.5);
        let f = extractor.extract(&test_loop(slice.len()), &slice).unwrap();

        // RMS of a 0.5-amplitude sine is 0.5 / sqrt(2)
        assert!((f.dynamics.rms - 0.3535).abs() < 0.01);
        assert!((f.dynamics.peak - 0.5).abs() < 0.01);
        assert!((f.dynamics.dynamic_range - std::f32::consts::SQRT_2).abs() < 0.05);
    }

    #[test]
    fn sine_centroid_tracks_frequency() {
        let extractor = BuiltinExtractor::new(SR);

        let low = extractor
            .extract(&test_loop(0), &sine(220.0, 0.5, 0.5))
            .unwrap();
        let high = extractor
            .extract(&test_loop(0), &sine(3000.0, 0.5, 0.5))
            .unwrap();

        assert!(high.spectral.centroid_hz > low.spectral.centroid_hz);
    }

    #[test]
    fn sine_a440_lands_on_pitch_class_a() {
        let extractor = BuiltinExtractor::new(SR);
        let f = extractor
            .extract(&test_loop(0), &sine(440.0, 0.5, 0.5))
            .unwrap();
        // A = pitch class 9 with C = 0
        assert_eq!(f.tonal.strongest_pitch_class, 9);
        let sum: f32 = f.tonal.chroma.iter().sum();
        assert!((sum - 1.0).abs() < 1e-3);
    }

    #[test]
    fn steady_tone_has_no_attacks() {
        let extractor = BuiltinExtractor::new(SR);
        let f = extractor
            .extract(&test_loop(0), &sine(440.0, 1.0, 0.5))
            .unwrap();
        assert_eq!(f.rhythm.attack_count, 0);
    }

    #[test]
    fn bursts_register_as_attacks() {
        let extractor = BuiltinExtractor::new(SR);
        // Three loud 50 ms bursts separated by silence
        let mut slice = vec![0.0f32; SR as usize];
        for &start in &[0.1f32, 0.4, 0.7] {
            let pos = (start * SR as f32) as usize;
            for j in 0..(SR as usize / 20) {
                slice[pos + j] = if j % 2 == 0 { 0.6 } else { -0.6 };
            }
        }

        let f = extractor.extract(&test_loop(slice.len()), &slice).unwrap();
        assert!(f.rhythm.attack_count >= 3);
        assert!(f.rhythm.attack_density > 0.0);
    }
}
