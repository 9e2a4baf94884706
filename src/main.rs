//! fstimeline - Forensic file-system timeline builder.
//!
//! Usage:
//!   fstimeline --path DIR          Scan DIR and write DIR/fileEvents.json
//!   fstimeline --path DIR -o FILE  Write the timeline somewhere else
//!   fstimeline --serve [--path D]  Serve D (or the current directory) on
//!                                  http://127.0.0.1:9999/
//!   fstimeline --help              Show help

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::{Context, Result, eyre};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use fstimeline_core::{Timeline, default_output_path, write_events};
use fstimeline_scan::{ScanConfig, ScanProgress, Walker};
use fstimeline_serve::DEFAULT_ADDR;

const USAGE_HINT: &str = "Please provide a valid directory path using --path (-p).";

/// Warnings listed individually before the summary is cut short.
const MAX_LISTED_WARNINGS: usize = 10;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Parser, Debug)]
#[command(
    name = "fstimeline",
    version,
    about = "Build a forensic timeline of every file under a directory",
    long_about = "fstimeline walks a directory tree in parallel and records, for every \
                  regular file, its size, timestamps and owner in a single JSON timeline.\n\n\
                  Use --serve to browse a previously written timeline in a web browser."
)]
struct Cli {
    /// Directory to scan (with --serve: directory to serve)
    #[arg(short, long, value_name = "DIR")]
    path: Option<PathBuf>,

    /// Serve index.html and fileEvents.json on http://127.0.0.1:9999/
    #[arg(long)]
    serve: bool,

    /// Output file (defaults to <DIR>/fileEvents.json)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Worker threads (0 = one per CPU)
    #[arg(short = 'j', long, default_value = "0")]
    threads: usize,

    /// Follow symbolic links to files and directories
    #[arg(long)]
    follow_symlinks: bool,

    /// Do not descend more than N directories below the root
    #[arg(long, value_name = "N")]
    max_depth: Option<u32>,

    /// Skip entries whose name matches this glob (repeatable)
    #[arg(long = "ignore", value_name = "PATTERN")]
    ignore: Vec<String>,

    /// Skip files and directories whose name starts with '.'
    #[arg(long)]
    skip_hidden: bool,

    /// Do not resolve file owners
    #[arg(long)]
    no_owner: bool,

    /// Stop scanning after this many seconds and keep what was found
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<ExitCode> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_logging(cli.verbose);

    if cli.serve {
        run_serve(cli.path)?;
        return Ok(ExitCode::SUCCESS);
    }

    let Some(root) = cli.path.as_deref().filter(|p| p.is_dir()) else {
        println!("{USAGE_HINT}");
        return Ok(ExitCode::FAILURE);
    };

    run_scan(root, &cli)?;
    Ok(ExitCode::SUCCESS)
}

fn init_logging(verbosity: u8) {
    let default = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Scan a directory and write its timeline.
fn run_scan(path: &Path, cli: &Cli) -> Result<()> {
    let root = path.canonicalize().context("Invalid path")?;
    let output = match &cli.output {
        Some(output) => resolve_output(output)?,
        None => default_output_path(&root),
    };

    let config = scan_config(&root, &output, cli)?;
    let walker = Walker::new(config).context("Failed to start scan")?;

    let token = walker.cancellation_token();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, stopping scan...");
        token.cancel();
    })
    .context("Failed to set signal handler")?;

    eprintln!("Scanning {}...", root.display());
    let progress = spawn_progress_logger(walker.subscribe());
    let result = walker.scan();
    drop(walker);
    let _ = progress.join();

    let mut timeline = result.context("Scan failed")?;
    timeline.sort_by_path();

    write_events(&timeline.events, &output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    print_summary(&timeline);
    println!("File events written to {}", output.display());
    Ok(())
}

fn scan_config(root: &Path, output: &Path, cli: &Cli) -> Result<ScanConfig> {
    ScanConfig::builder()
        .root(root)
        .follow_symlinks(cli.follow_symlinks)
        .max_depth(cli.max_depth)
        .ignore_patterns(cli.ignore.clone())
        .threads(cli.threads)
        .include_hidden(!cli.skip_hidden)
        .resolve_owners(!cli.no_owner)
        .exclude_paths(vec![output.to_path_buf()])
        .timeout(cli.timeout.map(Duration::from_secs))
        .build()
        .context("Invalid scan configuration")
}

/// Make an output path absolute so it compares equal to walked paths.
fn resolve_output(path: &Path) -> Result<PathBuf> {
    let file_name = path
        .file_name()
        .ok_or_else(|| eyre!("Output path has no file name: {}", path.display()))?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let parent = parent
        .canonicalize()
        .with_context(|| format!("Output directory does not exist: {}", parent.display()))?;
    Ok(parent.join(file_name))
}

fn spawn_progress_logger(mut rx: broadcast::Receiver<ScanProgress>) -> JoinHandle<()> {
    thread::spawn(move || {
        loop {
            match rx.blocking_recv() {
                Ok(progress) => {
                    info!(
                        files = progress.files_scanned,
                        dirs = progress.dirs_scanned,
                        size = %format_size(progress.bytes_scanned),
                        files_per_sec = progress.files_per_second() as u64,
                        current = %progress.current_path.display(),
                        "scan progress"
                    );
                    if progress.finished {
                        break;
                    }
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn print_summary(timeline: &Timeline) {
    for line in summary_lines(timeline) {
        eprintln!("{line}");
    }
}

fn summary_lines(timeline: &Timeline) -> Vec<String> {
    let stats = &timeline.stats;
    let mut lines = vec![format!(
        "{} files, {} directories, {} in {:.2}s",
        stats.total_files,
        stats.total_dirs,
        format_size(stats.total_size),
        timeline.scan_duration.as_secs_f64()
    )];

    if let (Some(earliest), Some(latest)) = (stats.earliest_modified, stats.latest_modified) {
        lines.push(format!(
            "Modified between {} and {}",
            earliest.format(DATE_FORMAT),
            latest.format(DATE_FORMAT)
        ));
    }
    if let Some((path, size)) = &stats.largest_file {
        lines.push(format!("Largest file: {path} ({})", format_size(*size)));
    }
    if stats.unknown_owners > 0 {
        lines.push(format!("{} file(s) with unknown owner", stats.unknown_owners));
    }

    if timeline.has_warnings() {
        let mut by_kind: BTreeMap<String, usize> = BTreeMap::new();
        for warning in &timeline.warnings {
            *by_kind.entry(format!("{:?}", warning.kind)).or_default() += 1;
        }
        let breakdown: Vec<String> = by_kind
            .iter()
            .map(|(kind, count)| format!("{count} {kind}"))
            .collect();
        lines.push(format!(
            "{} warning(s) during scan ({})",
            timeline.warnings.len(),
            breakdown.join(", ")
        ));
        for warning in timeline.warnings.iter().take(MAX_LISTED_WARNINGS) {
            lines.push(format!("  {}: {}", warning.path.display(), warning.message));
        }
        if timeline.warnings.len() > MAX_LISTED_WARNINGS {
            lines.push(format!(
                "  ... and {} more",
                timeline.warnings.len() - MAX_LISTED_WARNINGS
            ));
        }
    }

    if timeline.cancelled {
        lines.push("Scan was interrupted; the timeline is partial.".to_string());
    }
    lines
}

/// Serve a content directory until Ctrl-C.
fn run_serve(path: Option<PathBuf>) -> Result<()> {
    let content_root = match path {
        Some(path) => path,
        None => std::env::current_dir().context("Failed to read current directory")?,
    };

    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nShutting down...");
        token.cancel();
    })
    .context("Failed to set signal handler")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    eprintln!(
        "Serving {} on http://{}/",
        content_root.display(),
        DEFAULT_ADDR
    );
    runtime
        .block_on(fstimeline_serve::serve(content_root, DEFAULT_ADDR, shutdown))
        .context("Server failed")?;
    Ok(())
}

fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}
