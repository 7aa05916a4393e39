//! Command-line interface for the tabletop perception pipeline.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::core::loaders::load_frame;
use crate::core::transforms::colorize_clusters;
use crate::core::writers::{write_labels_csv, write_ply};
use crate::pipeline::{run_frame, PerceptionContext, PipelineError};
use crate::planning::{LoggingExecutor, PickPlaceExecutor};
use crate::processors::clustering::{cluster_labels, extract_clusters};
use crate::processors::filtering::preprocess;
use crate::processors::normals::KnnNormalEstimator;
use crate::processors::segmentation::segment_table;
use crate::PipelineConfig;

#[derive(Parser)]
#[command(name = "tabletop-perception")]
#[command(about = "Tabletop object perception and pick-and-place planning", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect objects in frames and write pick-and-place commands
    Run {
        /// Frame files (.ply / .csv) or directories containing them
        #[arg(required = true)]
        frames: Vec<PathBuf>,
        /// Model artifact (YAML, or JSON with a .json extension)
        #[arg(short, long)]
        model: PathBuf,
        /// Planning tables with `object_list` and `dropbox`
        #[arg(short, long)]
        pick_list: PathBuf,
        /// Directory for output_<scene>.yaml
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
        /// Scene number written into every command
        #[arg(long)]
        scene: Option<u32>,
        /// Seed for plane fitting
        #[arg(long)]
        seed: Option<u64>,
        /// Dispatch commands to the dry-run executor
        #[arg(long)]
        execute: bool,
    },

    /// Write the intermediate clouds of one frame as PLY/CSV
    Segment {
        /// Input frame (.ply / .csv)
        frame: PathBuf,
        /// Output directory for the intermediate clouds
        #[arg(short, long)]
        output_dir: PathBuf,
    },

    /// Write the default configuration as YAML
    InitConfig {
        /// Destination file
        path: PathBuf,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Create a bar for a known number of frames
fn create_progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("=> "));
    }
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 39 {
            format!("{}...", value.chars().take(36).collect::<String>())
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    let config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("Failed to load config from {}: {}, using defaults", path.display(), e);
                PipelineConfig::default()
            }
        },
        None => PipelineConfig::default(),
    };

    let result = match cli.command {
        Commands::Run {
            frames,
            model,
            pick_list,
            output_dir,
            scene,
            seed,
            execute,
        } => cmd_run(config, &frames, &model, &pick_list, &output_dir, scene, seed, execute),
        Commands::Segment { frame, output_dir } => cmd_segment(&config, &frame, &output_dir),
        Commands::InitConfig { path } => cmd_init_config(&config, &path),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn is_frame_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_ascii_lowercase().as_str(), "ply" | "csv"))
        .unwrap_or(false)
}

/// Expand directories into their frame files, sorted by name.
fn collect_frames(inputs: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut frames = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = fs::read_dir(input)
                .with_context(|| format!("failed to read directory {}", input.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_frame_file(p))
                .collect();
            found.sort();
            frames.extend(found);
        } else {
            frames.push(input.clone());
        }
    }
    Ok(frames)
}

#[allow(clippy::too_many_arguments)]
fn cmd_run(
    mut config: PipelineConfig,
    inputs: &[PathBuf],
    model: &Path,
    pick_list: &Path,
    output_dir: &Path,
    scene: Option<u32>,
    seed: Option<u64>,
    execute: bool,
) -> anyhow::Result<()> {
    let start = Instant::now();

    if let Some(scene) = scene {
        config.planner.scene_id = scene;
    }
    if seed.is_some() {
        config.segmentation.seed = seed;
    }

    let estimator = KnnNormalEstimator::new(config.normals.k);
    let ctx = PerceptionContext::load(config, model, pick_list)?;

    let frames = collect_frames(inputs)?;
    if frames.is_empty() {
        bail!("no .ply or .csv frames found");
    }

    println!("Processing {} frame(s)...", frames.len());
    println!("Output directory: {}", output_dir.display());

    let dry_run = LoggingExecutor;
    let executor: Option<&dyn PickPlaceExecutor> = if execute { Some(&dry_run) } else { None };

    let pb = create_progress_bar(frames.len() as u64);

    let mut processed = 0usize;
    let mut skipped = 0usize;
    let mut write_failures = 0usize;
    let mut objects = 0usize;
    let mut commands = 0usize;
    let mut last_output = None;

    for frame in &frames {
        let name = frame
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| frame.display().to_string());
        pb.set_message(name.clone());

        let cloud = match load_frame(frame) {
            Ok(cloud) => cloud,
            Err(e) => {
                warn!("{}: {}", name, e);
                skipped += 1;
                pb.inc(1);
                continue;
            }
        };

        match run_frame(&ctx, &cloud, &estimator, executor, output_dir) {
            Ok(report) => {
                info!(
                    "{}: {} objects, {} commands, {} skipped entries",
                    name,
                    report.perception.detections.len(),
                    report.plan.commands.len(),
                    report.plan.skipped.len()
                );
                if let Some(dispatch) = report.dispatch {
                    info!(
                        "{}: dispatched {} ok, {} failed, {} not sent",
                        name, dispatch.succeeded, dispatch.failed, dispatch.not_dispatched
                    );
                }
                processed += 1;
                objects += report.perception.detections.len();
                commands += report.plan.commands.len();
                last_output = Some(report.output_path);
            }
            Err(e @ PipelineError::Output(_)) => {
                error!("{}: {}", name, e);
                write_failures += 1;
            }
            Err(e) => {
                warn!("{}: {}; frame skipped", name, e);
                skipped += 1;
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();

    print_summary(
        "Perception Run Complete",
        &[
            ("Frames", frames.len().to_string()),
            ("Processed", processed.to_string()),
            ("Skipped", skipped.to_string()),
            ("Write failures", write_failures.to_string()),
            ("Objects detected", objects.to_string()),
            ("Commands", commands.to_string()),
            (
                "Last output",
                last_output
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );

    if write_failures > 0 {
        bail!("{} scene output(s) could not be written", write_failures);
    }
    Ok(())
}

fn cmd_segment(config: &PipelineConfig, frame: &Path, output_dir: &Path) -> anyhow::Result<()> {
    let start = Instant::now();

    println!("Segmenting frame...");
    println!("Input: {}", frame.display());
    println!("Output directory: {}", output_dir.display());

    let spinner = create_spinner("Loading frame...");

    let result = (|| -> anyhow::Result<(usize, usize, usize, usize)> {
        let cloud = load_frame(frame).with_context(|| format!("failed to load {}", frame.display()))?;

        spinner.set_message("Filtering and segmenting...");
        let filtered = preprocess(&cloud, &config.preprocess);
        let segmentation = segment_table(&filtered, &config.segmentation)?;
        let clusters = extract_clusters(&segmentation.objects, &config.clustering);

        spinner.set_message("Writing clouds...");
        write_ply(&output_dir.join("filtered.ply"), &filtered)?;
        write_ply(&output_dir.join("table.ply"), &segmentation.table)?;
        write_ply(&output_dir.join("objects.ply"), &segmentation.objects)?;

        let mask = colorize_clusters(&segmentation.objects, &clusters);
        write_ply(&output_dir.join("clusters.ply"), &mask)?;

        let labels = cluster_labels(segmentation.objects.len(), &clusters);
        write_labels_csv(
            &output_dir.join("clusters.csv"),
            &segmentation.objects.to_coords(),
            &labels,
        )?;

        Ok((
            cloud.len(),
            filtered.len(),
            segmentation.table.len(),
            clusters.len(),
        ))
    })();

    spinner.finish_and_clear();
    let (raw, filtered, table, clusters) = result?;

    print_summary(
        "Segmentation Complete",
        &[
            ("Input file", frame.display().to_string()),
            ("Raw points", raw.to_string()),
            ("Filtered points", filtered.to_string()),
            ("Table points", table.to_string()),
            ("Clusters", clusters.to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
    Ok(())
}

fn cmd_init_config(config: &PipelineConfig, path: &Path) -> anyhow::Result<()> {
    config
        .to_yaml(path)
        .map_err(|e| anyhow::anyhow!("failed to write config to {}: {}", path.display(), e))?;
    println!("Wrote configuration to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "tabletop-perception",
            "-vv",
            "run",
            "frames/",
            "--model",
            "model.yaml",
            "--pick-list",
            "pick_list_1.yaml",
            "--scene",
            "3",
            "--execute",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Run {
                frames,
                scene,
                execute,
                output_dir,
                ..
            } => {
                assert_eq!(frames, vec![PathBuf::from("frames/")]);
                assert_eq!(scene, Some(3));
                assert!(execute);
                assert_eq!(output_dir, PathBuf::from("."));
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_collect_frames_from_directory() {
        let dir = TempDir::new().unwrap();
        for name in ["b.ply", "a.csv", "notes.txt"] {
            fs::write(dir.path().join(name), "").unwrap();
        }

        let frames = collect_frames(&[dir.path().to_path_buf()]).unwrap();

        assert_eq!(
            frames,
            vec![dir.path().join("a.csv"), dir.path().join("b.ply")]
        );
    }
}
