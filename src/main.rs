use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use loopsmith::config::{AppConfig, TaskTiming};
use loopsmith::features::BuiltinExtractor;
use loopsmith::onset::{OnsetSource, SpectralFluxDetector};
use loopsmith::pipeline::{self, SegmentedTrack};
use loopsmith::task::Notice;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "loopsmith", version, about = "Loop segmentation for live re-triggering")]
struct Cli {
    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Segment a file into onset-aligned loops and extract their features
    Segment {
        /// Audio file (wav or flac)
        file: PathBuf,

        /// Target loop length in seconds (overrides config)
        #[arg(long)]
        bar_size: Option<f32>,

        /// Emit loops and features as JSON instead of a table
        #[arg(long)]
        json: bool,

        /// Skip the task's pacing delays
        #[arg(long)]
        fast: bool,
    },

    /// Print detected onset timestamps for a file
    Onsets {
        /// Audio file (wav or flac)
        file: PathBuf,
    },

    /// Segment every supported file under a directory
    Batch {
        /// Directory to walk
        dir: PathBuf,

        /// Number of parallel workers (0 = auto-detect from config)
        #[arg(short = 'j', long, default_value = "0")]
        jobs: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let mut config = AppConfig::load();

    match cli.command {
        Commands::Segment {
            file,
            bar_size,
            json,
            fast,
        } => {
            if let Some(bar) = bar_size {
                anyhow::ensure!(bar > 0.0, "bar size must be positive");
                config.bar_size = bar;
            }
            if fast {
                config.task = TaskTiming::immediate();
            }

            let track = segment_with_progress(file, &config)?;

            if json {
                print_json(&track)?;
            } else {
                print_loop_table(&track);
            }

            match &track.report.notice {
                Notice::Info(text) => println!("{text}"),
                Notice::Warning(text) => println!("WARNING: {text}"),
            }
            if !track.report.failures.is_empty() {
                println!(
                    "{} of {} loops lack features",
                    track.report.failures.len(),
                    track.loops.len()
                );
            }
        }

        Commands::Onsets { file } => {
            let buffer = loopsmith::decode::load_mono(&file, config.sample_rate)
                .context("Failed to load audio")?;
            let onsets = SpectralFluxDetector::default()
                .onsets(&buffer.samples, buffer.sample_rate)
                .context("Onset detection failed")?;

            if onsets.is_empty() {
                println!("No onsets detected.");
                return Ok(());
            }
            println!("{} onsets over {:.1}s:", onsets.len(), buffer.duration_secs());
            for (i, t) in onsets.iter().enumerate() {
                println!("{:>5}  {:>8.3}s", i, t);
            }
        }

        Commands::Batch { dir, jobs } => {
            let workers = if jobs > 0 {
                jobs
            } else {
                config.resolve_workers()
            };
            let files = pipeline::discover_files(&dir);
            if files.is_empty() {
                anyhow::bail!("No supported audio files under {}", dir.display());
            }
            let summary = pipeline::segment_batch(&files, &config, workers);
            println!(
                "Batch complete: {} segmented, {} failed, {} loops total",
                summary.segmented, summary.failed, summary.total_loops
            );
        }
    }

    Ok(())
}

/// Run one segmentation with an indicatif bar fed by the status channel.
fn segment_with_progress(file: PathBuf, config: &AppConfig) -> Result<SegmentedTrack> {
    let handle = pipeline::spawn(
        file,
        config.clone(),
        SpectralFluxDetector::default(),
        BuiltinExtractor::new(config.sample_rate),
    );

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {percent}% {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );

    for update in handle.status().iter() {
        match update.progress {
            Some(fraction) => pb.set_position((fraction * 100.0) as u64),
            None => pb.tick(),
        }
        pb.set_message(update.message);
    }
    pb.finish_and_clear();

    handle.join().context("Segmentation failed")
}

fn print_json(track: &SegmentedTrack) -> Result<()> {
    let out = serde_json::json!({
        "path": track.path,
        "loops": track.loops,
        "features": track.features,
        "cancelled": track.report.cancelled,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

/// Print a table of generated loops with their headline descriptors.
fn print_loop_table(track: &SegmentedTrack) {
    println!("{}", track.path.display());
    println!(
        "{:>4} {:>8} {:>8} {:>10} {:>10}  {:>6} {:>8} {:>7} {:>5}",
        "Id", "Start", "End", "Head", "Tail", "RMS", "Centroid", "Attacks", "Pitch"
    );
    println!("{}", "-".repeat(78));

    const PITCH_NAMES: [&str; 12] = [
        "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
    ];

    for lp in &track.loops {
        let (rms, centroid, attacks, pitch) = match track.features.get(lp.id) {
            Some(f) => (
                format!("{:.3}", f.dynamics.rms),
                format!("{:.0}", f.spectral.centroid_hz),
                format!("{}", f.rhythm.attack_count),
                PITCH_NAMES[f.tonal.strongest_pitch_class].to_string(),
            ),
            None => ("-".into(), "-".into(), "-".into(), "-".into()),
        };
        println!(
            "{:>4} {:>7.3}s {:>7.3}s {:>10} {:>10}  {:>6} {:>8} {:>7} {:>5}",
            lp.id, lp.start, lp.end, lp.head, lp.tail, rms, centroid, attacks, pitch
        );
    }
    println!();
    println!(
        "{} loops, {} with features",
        track.loops.len(),
        track.features.len()
    );
}
