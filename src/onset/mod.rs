pub mod detector;

pub use detector::SpectralFluxDetector;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OnsetError {
    #[error("Invalid detector config: {0}")]
    InvalidConfig(String),
    #[error("Detector error: {0}")]
    Detector(String),
}

/// Supplies the onset timestamps driving loop-point generation.
///
/// Implementations must return timestamps in seconds, strictly ascending.
/// An empty result is valid (silence, or a buffer too short to analyze) and
/// produces an empty loop sequence downstream. The segmentation core depends
/// only on this trait; the built-in [`SpectralFluxDetector`] is one
/// implementation.
pub trait OnsetSource {
    fn onsets(&self, samples: &[f32], sample_rate: u32) -> Result<Vec<f32>, OnsetError>;
}
