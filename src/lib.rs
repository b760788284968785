pub mod config;
pub mod decode;
pub mod features;
pub mod onset;
pub mod pipeline;
pub mod segment;
pub mod task;

/// Audio file extensions we support natively.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["wav", "flac"];

/// Application name for XDG paths
pub const APP_NAME: &str = "loopsmith";

/// Sample rate the segmentation core runs at. Files at other rates are
/// resampled by the loader before any onsets are detected.
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Target loop duration in seconds before quantization to the nearest onset.
pub const DEFAULT_BAR_SIZE: f32 = 1.0;
