pub mod builtin;

pub use builtin::BuiltinExtractor;

use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;

use crate::segment::Loop;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Loop sample range [{head}, {tail}) is empty")]
    EmptySlice { head: usize, tail: usize },
    #[error("Extractor error: {0}")]
    Extractor(String),
}

/// Descriptor set for one loop, grouped the way the feature categories are
/// presented downstream: rhythm, dynamics, spectral, tonal.
#[derive(Debug, Clone, Serialize)]
pub struct LoopFeatures {
    pub rhythm: RhythmFeatures,
    pub dynamics: DynamicsFeatures,
    pub spectral: SpectralFeatures,
    pub tonal: TonalFeatures,
}

#[derive(Debug, Clone, Serialize)]
pub struct RhythmFeatures {
    /// Energy attacks detected inside the loop slice.
    pub attack_count: usize,
    /// Attacks per second.
    pub attack_density: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct DynamicsFeatures {
    pub rms: f32,
    pub peak: f32,
    /// Crest factor: peak over RMS.
    pub dynamic_range: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpectralFeatures {
    pub zero_crossing_rate: f32,
    pub centroid_hz: f32,
    pub flux_mean: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct TonalFeatures {
    /// Normalized 12-bin pitch-class profile, C = 0.
    pub chroma: [f32; 12],
    pub strongest_pitch_class: usize,
}

/// Computes descriptors for one loop's sample slice.
///
/// Called once per loop, sequentially, after all boundaries are final, with
/// the `[head, tail)` slice of the full buffer. A failure is non-fatal: the
/// pipeline records it and keeps going.
pub trait FeatureExtractor {
    fn extract(&self, lp: &Loop, slice: &[f32]) -> Result<LoopFeatures, ExtractError>;
}

/// Associates computed descriptors with loop identity. The segmentation core
/// only inserts and hands the pool over; it never inspects the contents.
#[derive(Debug, Default, Serialize)]
pub struct FeaturePool {
    features: HashMap<usize, LoopFeatures>,
}

impl FeaturePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, loop_id: usize, features: LoopFeatures) {
        self.features.insert(loop_id, features);
    }

    pub fn get(&self, loop_id: usize) -> Option<&LoopFeatures> {
        self.features.get(&loop_id)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}
