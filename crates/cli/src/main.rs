//! CLI entry point for vidfix
//!
//! Loads configuration, checks the external tools, scans the input path and
//! runs the batch with a progress bar. Ctrl-C stops new files from starting.

mod logging;
mod progress;

use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};
use vidfix::config::ConfigError;
use vidfix::{
    free_space, run_startup_checks, scan_inputs, worker_count, BatchReport, Config,
    ConvertPipeline, Exclusions, Scheduler,
};

/// Exit status when a file failed or was cancelled.
const EXIT_FILES_FAILED: u8 = 1;
/// Exit status for configuration and startup errors.
const EXIT_SETUP: u8 = 2;

/// vidfix - repair and re-encode legacy video to H.264/AAC Matroska
#[derive(Parser, Debug)]
#[command(name = "vidfix")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Video file or directory to convert
    path: PathBuf,

    /// Path to the configuration file; defaults are used if it does not exist
    #[arg(short, long, default_value = "vidfix.toml")]
    config: PathBuf,

    /// Directory for converted files (default: next to each input)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Descend into subdirectories
    #[arg(short, long)]
    recursive: bool,

    /// Leave originals in place instead of archiving them
    #[arg(short, long)]
    keep_original: bool,

    /// Number of files converted in parallel (0 = derive from CPU count)
    #[arg(short = 'j', long)]
    jobs: Option<u32>,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,

    /// Disable the progress bar
    #[arg(long)]
    no_progress: bool,

    /// Skip the ffprobe/ffmpeg startup checks
    #[arg(long)]
    skip_checks: bool,

    /// Probe and plan every file, log the commands, write nothing
    #[arg(long)]
    dry_run: bool,
}

/// Load the config file and layer command-line flags on top.
fn load_config(args: &Args) -> Result<Config, ConfigError> {
    let mut config = Config::load_or_default(&args.config)?;
    apply_args(&mut config, args);
    config.validate()?;
    Ok(config)
}

fn apply_args(config: &mut Config, args: &Args) {
    if let Some(dir) = &args.output_dir {
        config.paths.output_dir = Some(dir.clone());
    }
    if args.keep_original {
        config.archive.keep_original = true;
    }
    if let Some(jobs) = args.jobs {
        config.concurrency.max_workers = jobs;
    }
}

/// Work directories the scanner must not pick inputs from.
fn exclusions(config: &Config) -> Exclusions {
    let mut dirs: Vec<&Path> = vec![
        config.paths.scratch_dir.as_path(),
        config.paths.archive_dir.as_path(),
        config.paths.log_dir.as_path(),
    ];
    if let Some(out) = &config.paths.output_dir {
        dirs.push(out.as_path());
    }
    Exclusions::new(dirs)
}

fn exit_status(report: &BatchReport) -> u8 {
    if report.all_succeeded() {
        0
    } else {
        EXIT_FILES_FAILED
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::from(EXIT_SETUP);
        }
    };

    let console = logging::ConsoleWriter::default();
    let _log_guard = match logging::init(&config.paths.log_dir, args.verbose, console.clone()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::from(EXIT_SETUP);
        }
    };

    if args.skip_checks {
        warn!("skipping startup checks (--skip-checks enabled)");
    } else if let Err(e) = run_startup_checks(&config) {
        error!(error = %e, "startup check failed");
        return ExitCode::from(EXIT_SETUP);
    }

    let inputs = match scan_inputs(&args.path, args.recursive, &exclusions(&config)) {
        Ok(inputs) => inputs,
        Err(e) => {
            error!(path = %args.path.display(), error = %e, "cannot read input");
            return ExitCode::from(EXIT_SETUP);
        }
    };
    if inputs.is_empty() {
        info!(path = %args.path.display(), "no video files found");
        return ExitCode::SUCCESS;
    }

    let workers = worker_count(&config.concurrency);
    if args.dry_run {
        info!("dry run, no files will be written or moved");
    }
    let pipeline = ConvertPipeline::new(&config).with_dry_run(args.dry_run);
    let scheduler = Scheduler::new(pipeline, workers);

    let cancel = scheduler.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing files in progress");
            cancel.cancel();
        }
    });

    let reporter = (!args.no_progress)
        .then(|| progress::ProgressReporter::spawn(scheduler.subscribe(), console.clone()));
    let report = scheduler.run(inputs).await;
    if let Some(reporter) = reporter {
        let last = scheduler.subscribe().borrow().clone();
        reporter.finish(&last);
    }

    let volume = config.paths.output_dir.as_deref().unwrap_or(&args.path);
    println!("{}", report.render_summary(&config.paths, free_space(volume)));
    ExitCode::from(exit_status(&report))
}
