use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn, LevelFilter};

use capture_clustering::{
    build, classify, compute_gaps, exiftool_version, extract_all, PlaceMode, Strategy,
};

/// Angle cutoff used by the mixture strategy's scan when the sentinel
/// disables the explicit threshold.
const MIXTURE_ANGLE_SECS: f64 = 15.0;

/// Sort a photogrammetry capture session into angle/rotation directories.
///
/// Photos are grouped by the pauses between consecutive shots: long pauses
/// separate camera angles, medium pauses separate turntable rotations, and
/// short pauses separate bracketed exposures at one position.
#[derive(Parser)]
#[command(name = "photogram-sort", version)]
struct Cli {
    /// Directory containing all photos of one capture session
    #[arg(short, long)]
    input: PathBuf,

    /// Output directory; sorts in place (moving files) when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Photo file extension to pick up
    #[arg(long, default_value = "tif")]
    ext: String,

    /// Between-angles threshold in seconds. This pause comes from manually
    /// re-aiming the rig at the turntable and is usually very long. A
    /// negative value (-1) switches the rotation/bracket split to a fitted
    /// Gaussian mixture instead of the rotation threshold
    #[arg(short, long, default_value_t = 15.0)]
    angle: f64,

    /// Between-rotations threshold in seconds; ignored under the mixture
    /// strategy
    #[arg(short, long, default_value_t = 1.0)]
    rotation: f64,

    /// Move photos instead of copying them, even when an output directory
    /// is given
    #[arg(long = "move")]
    move_files: bool,

    /// Write the resulting layout as pretty JSON
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Raise log verbosity (-v: debug, -vv: trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only report errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.verbose, cli.quiet);

    let version =
        exiftool_version().context("exiftool is required for capture-time extraction")?;
    info!("using exiftool v{version}");

    // In-place sorting consumes the originals
    let (output_root, mode) = match &cli.output {
        Some(dir) => (
            dir.clone(),
            if cli.move_files {
                PlaceMode::Move
            } else {
                PlaceMode::Copy
            },
        ),
        None => {
            warn!(
                "no output directory given; sorting {} in place and moving files",
                cli.input.display()
            );
            (cli.input.clone(), PlaceMode::Move)
        }
    };

    let paths = scan_session(&cli.input, &cli.ext)?;
    if paths.is_empty() {
        bail!(
            "no *.{} photos found in {}; check the extension and the directory",
            cli.ext,
            cli.input.display()
        );
    }
    info!("found {} *.{} photos", paths.len(), cli.ext);

    let bar = ProgressBar::new(paths.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len}")?.progress_chars("=> "),
    );
    bar.set_message("reading capture times");
    let mut photos = extract_all(&paths, |done| bar.inc(done as u64))?;
    bar.finish_and_clear();

    photos.sort_by_key(|p| p.capture_time);

    let strategy = if cli.angle < 0.0 {
        Strategy::Mixture {
            angle_secs: MIXTURE_ANGLE_SECS,
        }
    } else {
        Strategy::Thresholds {
            angle_secs: cli.angle,
            rotation_secs: cli.rotation,
        }
    };

    let gaps = compute_gaps(&photos)?;
    let labels = classify(&gaps, strategy)?;
    let layout = build(&photos, &labels, &output_root, mode)?;

    println!(
        "placed {} photos into {} angle(s), {} rotation(s) under {}",
        layout.photo_count(),
        layout.angles.len(),
        layout.rotation_count(),
        output_root.display()
    );

    if let Some(summary_path) = &cli.summary {
        let json = serde_json::to_string_pretty(&layout)?;
        std::fs::write(summary_path, json)
            .with_context(|| format!("failed to write {}", summary_path.display()))?;
        info!("layout summary written to {}", summary_path.display());
    }

    Ok(())
}

fn init_logger(verbose: u8, quiet: bool) {
    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_timestamp(None)
        .init();
}

/// Collect the session's photos by extension, non-recursively.
fn scan_session(dir: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in
        std::fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?
    {
        let path = entry?.path();
        if path.is_file()
            && path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(ext))
        {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}
