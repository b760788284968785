//! End-to-end segmentation: decode → onsets → generate → link → background
//! feature extraction.
//!
//! The initiating thread gets a [`SegmentationHandle`] with a cancel token
//! and a status receiver; everything else runs on one dedicated worker
//! thread. [`compute_loops`] is the synchronous wrapper over that.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use thiserror::Error;

use crate::config::{AppConfig, TaskTiming};
use crate::decode::{self, DecodeError};
use crate::features::{BuiltinExtractor, ExtractError, FeatureExtractor, FeaturePool};
use crate::onset::{OnsetError, OnsetSource, SpectralFluxDetector};
use crate::segment::{self, Loop};
use crate::task::{BackgroundTask, CancelToken, StatusLabels, StatusUpdate, TaskReport};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("Onset detection error: {0}")]
    Onset(#[from] OnsetError),
    #[error("Worker thread panicked")]
    WorkerPanic,
}

/// Result of one segmentation run. On cancellation the loops and features
/// computed before the cancel point are kept; `report.cancelled` says which
/// case this is.
#[derive(Debug)]
pub struct SegmentedTrack {
    pub path: PathBuf,
    pub loops: Vec<Loop>,
    pub features: FeaturePool,
    pub report: TaskReport,
}

/// Control surface for an in-flight segmentation run.
pub struct SegmentationHandle {
    token: CancelToken,
    status: Receiver<StatusUpdate>,
    worker: JoinHandle<Result<SegmentedTrack, PipelineError>>,
}

impl SegmentationHandle {
    /// Token for requesting cooperative cancellation; takes effect at the
    /// next unit boundary.
    pub fn cancel_token(&self) -> CancelToken {
        self.token.clone()
    }

    /// Status updates from the worker. A lazy, finite stream: it ends when
    /// the worker finishes.
    pub fn status(&self) -> &Receiver<StatusUpdate> {
        &self.status
    }

    /// Block until the worker finishes and take the result.
    pub fn join(self) -> Result<SegmentedTrack, PipelineError> {
        self.worker.join().map_err(|_| PipelineError::WorkerPanic)?
    }
}

/// Start a segmentation run on a dedicated worker thread.
pub fn spawn<S, X>(
    path: PathBuf,
    config: AppConfig,
    source: S,
    extractor: X,
) -> SegmentationHandle
where
    S: OnsetSource + Send + 'static,
    X: FeatureExtractor + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let token = CancelToken::new();
    let worker_token = token.clone();
    let worker =
        std::thread::spawn(move || run(path, config, source, extractor, worker_token, tx));
    SegmentationHandle {
        token,
        status: rx,
        worker,
    }
}

/// Segment one file synchronously: spawn a worker and wait for it.
pub fn compute_loops<S, X>(
    path: &Path,
    config: &AppConfig,
    source: S,
    extractor: X,
) -> Result<SegmentedTrack, PipelineError>
where
    S: OnsetSource + Send + 'static,
    X: FeatureExtractor + Send + 'static,
{
    spawn(path.to_path_buf(), config.clone(), source, extractor).join()
}

/// Worker body: everything from decode to the terminal report happens here.
fn run<S, X>(
    path: PathBuf,
    config: AppConfig,
    source: S,
    extractor: X,
    token: CancelToken,
    status: Sender<StatusUpdate>,
) -> Result<SegmentedTrack, PipelineError>
where
    S: OnsetSource,
    X: FeatureExtractor,
{
    let buffer = decode::load_mono(&path, config.sample_rate)?;
    let onsets = source.onsets(&buffer.samples, buffer.sample_rate)?;
    log::info!(
        "{}: {:.1}s of audio, {} onsets",
        path.display(),
        buffer.duration_secs(),
        onsets.len()
    );

    // Degenerate input is a valid empty result, not a fault. The task still
    // runs so the caller sees the usual status protocol and terminal notice.
    let mut loops = if onsets.is_empty() {
        Vec::new()
    } else {
        segment::generate(&onsets, config.sample_rate, config.bar_size)
    };
    segment::link(&mut loops);

    let task = BackgroundTask::new(loops.len(), StatusLabels::segmentation(), config.task);
    let mut features = FeaturePool::new();
    let samples = &buffer.samples;

    let report = {
        let loops = &loops;
        let features = &mut features;
        task.run(&token, &status, |unit| {
            let lp = &loops[unit];
            let tail = lp.tail.min(samples.len());
            let head = lp.head.min(tail);
            let descriptors = extractor.extract(lp, &samples[head..tail])?;
            features.insert(lp.id, descriptors);
            Ok::<(), ExtractError>(())
        })
    };

    Ok(SegmentedTrack {
        path,
        loops,
        features,
        report,
    })
}

/// Collect supported audio files under `root`, sorted for stable ordering.
pub fn discover_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| crate::SUPPORTED_EXTENSIONS.contains(&e.to_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    files
}

#[derive(Debug, Default)]
pub struct BatchSummary {
    pub segmented: u64,
    pub failed: u64,
    pub total_loops: u64,
}

/// Segment many files in parallel with the built-in detector and extractor.
///
/// Processes files in chunks: segment a chunk in parallel with rayon, tally,
/// move on. Task pacing is disabled per file — the progress bar tracks whole
/// files here, not units within one.
pub fn segment_batch(paths: &[PathBuf], config: &AppConfig, jobs: usize) -> BatchSummary {
    if paths.is_empty() {
        log::info!("No audio files to segment");
        return BatchSummary::default();
    }

    log::info!("Segmenting {} files with {} workers", paths.len(), jobs);

    let pb = ProgressBar::new(paths.len() as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )
        .unwrap()
        .progress_chars("#>-"),
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build()
        .unwrap();

    let mut batch_config = config.clone();
    batch_config.task = TaskTiming::immediate();

    let mut summary = BatchSummary::default();
    let chunk_size = jobs * 2;

    for chunk in paths.chunks(chunk_size) {
        let results: Vec<_> = pool.install(|| {
            chunk
                .par_iter()
                .map(|path| {
                    let result = compute_loops(
                        path,
                        &batch_config,
                        SpectralFluxDetector::default(),
                        BuiltinExtractor::new(batch_config.sample_rate),
                    );
                    pb.inc(1);
                    (path.clone(), result)
                })
                .collect()
        });

        for (path, result) in results {
            match result {
                Ok(track) => {
                    summary.segmented += 1;
                    summary.total_loops += track.loops.len() as u64;
                }
                Err(e) => {
                    log::warn!("Segmentation failed for {}: {}", path.display(), e);
                    summary.failed += 1;
                }
            }
        }

        pb.set_message(format!(
            "{} segmented, {} failed",
            summary.segmented, summary.failed
        ));
    }

    pb.finish_with_message(format!(
        "Done: {} segmented, {} failed, {} loops",
        summary.segmented, summary.failed, summary.total_loops
    ));
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Notice;
    use std::time::Duration;

    /// Deterministic onset source for pipeline tests.
    struct FixedOnsets(Vec<f32>);

    impl OnsetSource for FixedOnsets {
        fn onsets(&self, _samples: &[f32], _sample_rate: u32) -> Result<Vec<f32>, OnsetError> {
            Ok(self.0.clone())
        }
    }

    /// Extractor that fails on selected loop ids.
    struct FlakyExtractor {
        fail_ids: Vec<usize>,
    }

    impl FeatureExtractor for FlakyExtractor {
        fn extract(
            &self,
            lp: &Loop,
            slice: &[f32],
        ) -> Result<crate::features::LoopFeatures, ExtractError> {
            if self.fail_ids.contains(&lp.id) {
                return Err(ExtractError::Extractor(format!("loop {} rejected", lp.id)));
            }
            BuiltinExtractor::new(44100).extract(lp, slice)
        }
    }

    fn test_config() -> AppConfig {
        AppConfig {
            task: TaskTiming::immediate(),
            ..Default::default()
        }
    }

    fn write_tone_wav(dir: &Path, secs: f32) -> PathBuf {
        let path = dir.join("tone.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        let n = (44100.0 * secs) as usize;
        for i in 0..n {
            let s = (2.0 * std::f32::consts::PI * 220.0 * i as f32 / 44100.0).sin() * 0.4;
            writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();
        path
    }

    #[test]
    fn full_run_extracts_every_loop() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tone_wav(dir.path(), 5.0);

        let track = compute_loops(
            &path,
            &test_config(),
            FixedOnsets(vec![0.0, 1.0, 2.0, 3.0, 4.0]),
            BuiltinExtractor::new(44100),
        )
        .unwrap();

        assert!(!track.report.cancelled);
        assert_eq!(track.loops.len(), 4);
        assert_eq!(track.features.len(), 4);
        assert!(track.report.failures.is_empty());

        // Linked and normalized
        for (i, lp) in track.loops.iter().enumerate() {
            assert!(lp.start <= lp.end);
            if i > 0 {
                assert_eq!(lp.prev, i - 1);
            }
        }
        assert!(matches!(track.report.notice, Notice::Info(_)));
    }

    #[test]
    fn extraction_failure_is_non_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tone_wav(dir.path(), 5.0);

        let track = compute_loops(
            &path,
            &test_config(),
            FixedOnsets(vec![0.0, 1.0, 2.0, 3.0, 4.0]),
            FlakyExtractor { fail_ids: vec![1] },
        )
        .unwrap();

        assert!(!track.report.cancelled);
        assert_eq!(track.loops.len(), 4);
        assert_eq!(track.features.len(), 3);
        assert!(track.features.get(1).is_none());
        assert_eq!(track.report.failures.len(), 1);
        assert_eq!(track.report.failures[0].unit, 1);
    }

    #[test]
    fn no_onsets_yields_empty_success() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tone_wav(dir.path(), 1.0);

        let track = compute_loops(
            &path,
            &test_config(),
            FixedOnsets(Vec::new()),
            BuiltinExtractor::new(44100),
        )
        .unwrap();

        assert!(!track.report.cancelled);
        assert!(track.loops.is_empty());
        assert!(track.features.is_empty());
    }

    #[test]
    fn cancellation_keeps_partial_results() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tone_wav(dir.path(), 7.0);

        let mut config = test_config();
        // Slow settle so the cancel lands mid-run
        config.task.settle_ms = 100;

        let handle = spawn(
            path,
            config,
            FixedOnsets(vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
            BuiltinExtractor::new(44100),
        );
        let token = handle.cancel_token();

        // Wait for the first fractional update, then cancel
        for update in handle.status().iter() {
            if update.progress.is_some() {
                token.cancel();
                break;
            }
        }

        let track = handle.join().unwrap();
        assert!(track.report.cancelled);
        assert!(matches!(track.report.notice, Notice::Warning(_)));
        assert!(track.report.completed < track.loops.len());
        assert_eq!(track.features.len(), track.report.completed);
    }

    #[test]
    fn cancel_before_start_processes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tone_wav(dir.path(), 5.0);

        let mut config = test_config();
        config.task.lead_in_ms = 10_000;

        let handle = spawn(
            path,
            config,
            FixedOnsets(vec![0.0, 1.0, 2.0, 3.0, 4.0]),
            BuiltinExtractor::new(44100),
        );
        handle.cancel_token().cancel();

        let track = handle.join().unwrap();
        assert!(track.report.cancelled);
        assert_eq!(track.report.completed, 0);
        assert!(track.features.is_empty());
        // Loops themselves were still generated before the unit loop began
        assert_eq!(track.loops.len(), 4);
    }

    #[test]
    fn tail_is_clamped_to_buffer_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tone_wav(dir.path(), 2.0);

        // Last onset past the end of the actual buffer
        let track = compute_loops(
            &path,
            &test_config(),
            FixedOnsets(vec![0.0, 1.0, 2.0, 3.0]),
            BuiltinExtractor::new(44100),
        )
        .unwrap();

        // Extraction must not have panicked on out-of-range slices; loops
        // whose slice is empty fail extraction instead.
        assert!(!track.report.cancelled);
        assert_eq!(
            track.features.len() + track.report.failures.len(),
            track.loops.len()
        );
    }

    #[test]
    fn status_stream_follows_protocol() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tone_wav(dir.path(), 5.0);

        let handle = spawn(
            path,
            test_config(),
            FixedOnsets(vec![0.0, 1.0, 2.0, 3.0, 4.0]),
            BuiltinExtractor::new(44100),
        );

        let updates: Vec<StatusUpdate> = handle.status().iter().collect();
        let track = handle.join().unwrap();

        assert!(!track.report.cancelled);
        // init, remaining, one fraction per loop, clean-up
        assert_eq!(updates.len(), 2 + track.loops.len() + 1);
        assert!(updates.first().unwrap().progress.is_none());
        assert!(updates.last().unwrap().progress.is_none());
        let fractions: Vec<f64> = updates
            .iter()
            .filter_map(|u| u.progress)
            .collect();
        assert!(fractions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn discover_finds_only_supported_files() {
        let dir = tempfile::tempdir().unwrap();
        write_tone_wav(dir.path(), 0.2);
        std::fs::write(dir.path().join("notes.txt"), "not audio").unwrap();

        let files = discover_files(dir.path());
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].extension().and_then(|e| e.to_str()), Some("wav"));
    }

    #[test]
    fn batch_tallies_files() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_tone_wav(dir.path(), 0.5);
        std::fs::copy(&first, dir.path().join("copy.wav")).unwrap();

        let files = discover_files(dir.path());
        assert_eq!(files.len(), 2);

        let summary = segment_batch(&files, &test_config(), 2);
        assert_eq!(summary.segmented, 2);
        assert_eq!(summary.failed, 0);
    }

    #[test]
    fn cancellation_wait_is_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tone_wav(dir.path(), 5.0);

        let mut config = test_config();
        config.task.lead_in_ms = 30_000;

        let start = std::time::Instant::now();
        let handle = spawn(
            path,
            config,
            FixedOnsets(vec![0.0, 1.0, 2.0, 3.0, 4.0]),
            BuiltinExtractor::new(44100),
        );
        std::thread::sleep(Duration::from_millis(50));
        handle.cancel_token().cancel();
        let track = handle.join().unwrap();

        assert!(track.report.cancelled);
        assert!(start.elapsed() < Duration::from_secs(10));
    }
}
