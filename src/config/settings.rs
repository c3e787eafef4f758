//! Command line and runtime settings
//!
//! [`CliArgs`] is the clap surface of the binary; [`EngineConfig`] is what
//! the copy engine actually consumes.

use crate::core::MAX_WAIT_OBJECTS;
use crate::error::{CopyError, Result};
use crate::fs::async_io::DEFAULT_MAX_SIGNALS;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Largest accepted per-pipeline buffer
pub const MAX_BUFFER_SIZE: usize = 1024 * 1024 * 1024;

/// Default per-pipeline buffer (1 MiB)
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

/// Default number of files copied at once
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Default marker appended to source paths to name destinations
pub const DEFAULT_SUFFIX: &str = ".async.bin";

/// multicopy - copy several files at once with overlapped reads
#[derive(Parser, Debug, Clone)]
#[command(name = "multicopy")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Concurrent multi-file copy driven by asynchronous reads")]
#[command(long_about = r#"
multicopy copies a handful of files concurrently. Each file gets its own
pipeline with one read in flight; a single dispatcher writes blocks out as
their reads complete.

Examples:
  multicopy copy a.iso b.iso                   # -> a.iso.async.bin, b.iso.async.bin
  multicopy copy big.bin --buffer-size 4M --verify blake3
  multicopy compare big.bin                    # buffered vs direct copy timing
  multicopy info /etc/hosts
  multicopy                                    # interactive menu
"#)]
pub struct CliArgs {
    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (only errors are logged)
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Write JSON logs to this file instead of stderr
    #[arg(long, value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// Output format for reports
    #[arg(long, value_enum, default_value = "text", global = true)]
    pub output_format: OutputFormat,

    /// Subcommand (defaults to the interactive menu)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Copy files concurrently, each to <path><suffix>
    Copy(CopyArgs),

    /// Time a buffered copy against a direct read/write loop
    Compare {
        /// File to copy
        source: PathBuf,

        /// Buffer size for the direct loop (e.g., 1M, 64K)
        #[arg(short = 'b', long, default_value = "1M", value_name = "SIZE")]
        buffer_size: String,
    },

    /// Show attributes, size, times and owner of a path
    Info {
        /// Path to inspect
        path: PathBuf,
    },

    /// Interactive menu
    Menu,
}

/// Arguments of the `copy` subcommand
#[derive(Args, Debug, Clone)]
pub struct CopyArgs {
    /// Source files
    #[arg(value_name = "SOURCES", required = true)]
    pub sources: Vec<PathBuf>,

    /// Number of files copied at once; extra sources are skipped
    #[arg(short = 'm', long, default_value_t = DEFAULT_MAX_CONCURRENCY, value_name = "NUM")]
    pub max_files: usize,

    /// Buffer size per file (e.g., 1M, 64K)
    #[arg(short = 'b', long, default_value = "1M", value_name = "SIZE")]
    pub buffer_size: String,

    /// I/O worker threads (0 = one per admitted file)
    #[arg(long, default_value = "0", value_name = "NUM")]
    pub io_threads: usize,

    /// Suffix appended to each source path to form its destination
    #[arg(long, default_value = DEFAULT_SUFFIX, value_name = "SUFFIX")]
    pub suffix: String,

    /// Verify every completed copy with this hash
    #[arg(long, value_enum, value_name = "ALGO")]
    pub verify: Option<HashAlgorithm>,

    /// Show progress bars
    #[arg(short = 'p', long)]
    pub progress: bool,

    /// Copy the source modification time onto the destination
    #[arg(long)]
    pub preserve_mtime: bool,
}

/// Hash algorithm for integrity verification
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// XXHash3, 128-bit, non-cryptographic
    #[default]
    #[value(name = "xxhash3")]
    XXHash3,
    /// BLAKE3
    #[value(name = "blake3")]
    Blake3,
    /// SHA-256
    #[value(name = "sha256")]
    Sha256,
}

impl HashAlgorithm {
    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            Self::XXHash3 => "XXHash3",
            Self::Blake3 => "BLAKE3",
            Self::Sha256 => "SHA-256",
        }
    }
}

/// Output format for reports
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Status lines and a summary
    #[default]
    Text,
    /// The run report as JSON
    Json,
}

/// Runtime settings of the copy engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Bytes per read/write block, one buffer per pipeline
    pub buffer_size: usize,
    /// Transfers admitted per run
    pub max_concurrency: usize,
    /// I/O pool size (0 = `max_concurrency`, capped at twice the CPU count)
    pub io_threads: usize,
    /// Completion signals the I/O engine may hand out at once
    pub max_signals: usize,
    /// Signals a single wait accepts
    pub max_wait_objects: usize,
    /// Marker appended to source paths
    pub destination_suffix: String,
    /// Copy the source mtime after a successful transfer
    pub preserve_mtime: bool,
    /// Hash completed transfers with this algorithm
    pub verify: Option<HashAlgorithm>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            io_threads: 0,
            max_signals: DEFAULT_MAX_SIGNALS,
            max_wait_objects: MAX_WAIT_OBJECTS,
            destination_suffix: DEFAULT_SUFFIX.to_string(),
            preserve_mtime: false,
            verify: None,
        }
    }
}

impl EngineConfig {
    /// Build the engine settings of a `copy` invocation
    pub fn from_cli(args: &CopyArgs) -> Result<Self> {
        let buffer_size = parse_size(&args.buffer_size).map_err(CopyError::config)?;

        let config = Self {
            buffer_size: usize::try_from(buffer_size)
                .map_err(|_| CopyError::config(format!("buffer size {} too large", buffer_size)))?,
            max_concurrency: args.max_files,
            io_threads: args.io_threads,
            destination_suffix: args.suffix.clone(),
            preserve_mtime: args.preserve_mtime,
            verify: args.verify,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(CopyError::config("buffer size must be greater than zero"));
        }
        if self.buffer_size > MAX_BUFFER_SIZE {
            return Err(CopyError::config(format!(
                "buffer size {} exceeds the 1 GiB limit",
                humansize::format_size(self.buffer_size as u64, humansize::BINARY)
            )));
        }
        if self.max_concurrency == 0 {
            return Err(CopyError::config("at least one file must be copied at a time"));
        }
        if self.max_concurrency > self.max_wait_objects {
            return Err(CopyError::config(format!(
                "{} concurrent files exceed the wait limit of {}",
                self.max_concurrency, self.max_wait_objects
            )));
        }
        if self.destination_suffix.is_empty() {
            return Err(CopyError::config(
                "destination suffix must not be empty; the copy would overwrite its source",
            ));
        }
        Ok(())
    }

    /// Size of the I/O pool actually started
    pub fn effective_io_threads(&self) -> usize {
        if self.io_threads == 0 {
            self.max_concurrency.min(num_cpus::get() * 2).max(1)
        } else {
            self.io_threads
        }
    }
}

/// Parse a human-readable size such as `64K`, `1.5M` or `2GB`
///
/// Suffixes are binary multiples; a bare number is bytes.
pub fn parse_size(size: &str) -> std::result::Result<u64, String> {
    let upper = size.trim().to_uppercase();
    if upper.is_empty() {
        return Err("Empty size string".to_string());
    }

    let digits = upper.strip_suffix('B').unwrap_or(&upper);
    let (number, shift) = match digits.chars().last() {
        Some('K') => (&digits[..digits.len() - 1], 10),
        Some('M') => (&digits[..digits.len() - 1], 20),
        Some('G') => (&digits[..digits.len() - 1], 30),
        Some('T') => (&digits[..digits.len() - 1], 40),
        _ => (digits, 0),
    };

    let value: f64 = number
        .trim()
        .parse()
        .map_err(|_| format!("Invalid size: {}", size.trim()))?;
    if !value.is_finite() || value < 0.0 {
        return Err(format!("Invalid size: {}", size.trim()));
    }

    Ok((value * (1u64 << shift) as f64) as u64)
}
