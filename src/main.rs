//! multicopy CLI
//!
//! Concurrent multi-file copy, copy-method comparison and file inspection.

use clap::Parser;
use console::style;
use multicopy::config::{parse_size, CliArgs, Commands, CopyArgs, EngineConfig, OutputFormat};
use multicopy::core::{PipelineManager, TransferRequest};
use multicopy::error::{CopyError, IoResultExt, Result};
use multicopy::fs::{compare_methods, inspect};
use multicopy::hash::verify_pairs;
use multicopy::menu::Menu;
use multicopy::progress::ProgressReporter;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() {
    let args = CliArgs::parse();

    if let Err(e) = init_logging(&args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    match run(args) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// `RUST_LOG` wins; otherwise `-q`/`-v` pick the level
fn init_logging(args: &CliArgs) -> Result<()> {
    let level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match &args.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_path(path)?;
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_thread_names(true)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .compact()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

/// Returns whether everything succeeded
fn run(args: CliArgs) -> Result<bool> {
    match args.command.clone().unwrap_or(Commands::Menu) {
        Commands::Copy(copy) => cmd_copy(&copy, &args),
        Commands::Compare {
            source,
            buffer_size,
        } => cmd_compare(&source, &buffer_size),
        Commands::Info { path } => cmd_info(&path, args.output_format),
        Commands::Menu => cmd_menu(),
    }
}

fn cmd_copy(copy: &CopyArgs, args: &CliArgs) -> Result<bool> {
    let config = EngineConfig::from_cli(copy)?;
    info!(
        "Copying {} file(s), {} at a time, {} buffers",
        copy.sources.len(),
        config.max_concurrency,
        humansize::format_size(config.buffer_size as u64, humansize::BINARY)
    );

    let requests: Vec<TransferRequest> = copy
        .sources
        .iter()
        .map(|s| TransferRequest::with_suffix(s, &config.destination_suffix))
        .collect();

    let text = args.output_format == OutputFormat::Text && !args.quiet;
    let progress = Arc::new(if copy.progress && !args.quiet {
        ProgressReporter::new()
    } else {
        ProgressReporter::disabled()
    });

    let verify = config.verify;
    let manager = PipelineManager::new(config)?.with_progress(Arc::clone(&progress));

    if text {
        let admitted = requests.len().min(manager.config().max_concurrency);
        println!("Starting asynchronous copy of {} file(s)...", admitted);
    }
    let report = manager.run_all_with(&requests, |outcome| {
        if text {
            progress.status_line(&outcome.status_line());
        }
    });

    info!(
        "Average throughput {}/s",
        humansize::format_size(progress.throughput() as u64, humansize::BINARY)
    );

    let mut ok = report.is_success();

    if let Some(algorithm) = verify {
        let pairs: Vec<_> = report
            .completed()
            .map(|o| (o.source.clone(), o.destination.clone()))
            .collect();
        for result in verify_pairs(&pairs, algorithm) {
            match result.and_then(|v| v.into_result()) {
                Ok(v) => {
                    if text {
                        println!(
                            "{} {} ({}: {})",
                            style("Verified").green(),
                            v.destination.display(),
                            algorithm.name(),
                            v.dest_digest
                        );
                    }
                }
                Err(e) => {
                    error!("{}", e);
                    if text {
                        println!("{} {}", style("Verification failed:").red().bold(), e);
                    }
                    ok = false;
                }
            }
        }
    }

    match args.output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text if !args.quiet => {
            report.print_summary()?;
            println!("Async copy completed.");
        }
        OutputFormat::Text => {}
    }

    Ok(ok)
}

fn cmd_compare(source: &Path, buffer_size: &str) -> Result<bool> {
    let size = parse_size(buffer_size).map_err(CopyError::config)?;
    let size = usize::try_from(size)
        .ok()
        .filter(|s| *s > 0)
        .ok_or_else(|| CopyError::config(format!("invalid buffer size: {}", buffer_size)))?;

    let comparison = compare_methods(source, size);
    comparison.print()?;
    Ok(comparison.runs.iter().all(|r| r.result.is_ok()))
}

fn cmd_info(path: &Path, format: OutputFormat) -> Result<bool> {
    let info = inspect(path)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&info)?),
        OutputFormat::Text => info.print()?,
    }
    Ok(true)
}

fn cmd_menu() -> Result<bool> {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut menu = Menu::new(stdin.lock(), stdout.lock(), EngineConfig::default());
    menu.run()?;
    Ok(true)
}
