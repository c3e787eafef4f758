//! Sequential baseline copies
//!
//! Two single-file strategies the asynchronous engine is measured against:
//! a stdio-style copy through `BufReader`/`BufWriter`, and a direct loop that
//! reads into one fixed buffer and writes each block straight out.

use crate::error::{CopyError, IoResultExt, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Baseline copy strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CopyMethod {
    /// Buffered streams
    Buffered,
    /// Unbuffered read/write loop
    Direct,
}

impl CopyMethod {
    /// Display label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Buffered => "Buffered stdio",
            Self::Direct => "Direct read/write",
        }
    }

    /// Suffix of the comparison output file
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Buffered => ".buffered.bin",
            Self::Direct => ".direct.bin",
        }
    }
}

/// Result of one baseline copy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyStats {
    /// Bytes written to the destination
    pub bytes_copied: u64,
    /// Time spent in the data loop
    pub duration: Duration,
    /// Bytes per second over `duration`
    pub throughput: f64,
    /// Strategy used
    pub method: CopyMethod,
}

impl CopyStats {
    fn new(method: CopyMethod, bytes_copied: u64, duration: Duration) -> Self {
        let secs = duration.as_secs_f64();
        Self {
            bytes_copied,
            duration,
            throughput: if secs > 0.0 { bytes_copied as f64 / secs } else { 0.0 },
            method,
        }
    }
}

/// Single-file copier used for the baselines
#[derive(Debug, Clone, Copy)]
pub struct FileCopier {
    buffer_size: usize,
}

impl FileCopier {
    /// Copier reading `buffer_size` bytes per block
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(1),
        }
    }

    /// Copy with the given strategy
    pub fn copy(&self, method: CopyMethod, source: &Path, dest: &Path) -> Result<CopyStats> {
        match method {
            CopyMethod::Buffered => self.copy_buffered(source, dest),
            CopyMethod::Direct => self.copy_direct(source, dest),
        }
    }

    /// Copy through buffered streams
    pub fn copy_buffered(&self, source: &Path, dest: &Path) -> Result<CopyStats> {
        let src = File::open(source).with_path(source)?;
        let dst = File::create(dest).with_path(dest)?;

        let mut reader = BufReader::with_capacity(self.buffer_size, src);
        let mut writer = BufWriter::with_capacity(self.buffer_size, dst);

        let start = Instant::now();
        let bytes = std::io::copy(&mut reader, &mut writer).with_path(dest)?;
        writer.flush().with_path(dest)?;
        let duration = start.elapsed();

        debug!("buffered copy {:?} -> {:?}: {} bytes in {:?}", source, dest, bytes, duration);
        Ok(CopyStats::new(CopyMethod::Buffered, bytes, duration))
    }

    /// Copy with a fixed buffer and one write per read
    ///
    /// A write that accepts fewer bytes than were read is an error.
    pub fn copy_direct(&self, source: &Path, dest: &Path) -> Result<CopyStats> {
        let mut src = File::open(source).with_path(source)?;
        let mut dst = File::create(dest).with_path(dest)?;
        let mut buffer = vec![0u8; self.buffer_size];

        let start = Instant::now();
        let mut total = 0u64;
        loop {
            let read = src.read(&mut buffer).with_path(source)?;
            if read == 0 {
                break;
            }
            let written = dst.write(&buffer[..read]).with_path(dest)?;
            if written != read {
                return Err(CopyError::io(
                    dest,
                    std::io::Error::new(
                        std::io::ErrorKind::WriteZero,
                        format!("short write: {} of {} bytes", written, read),
                    ),
                ));
            }
            total += written as u64;
        }
        let duration = start.elapsed();

        debug!("direct copy {:?} -> {:?}: {} bytes in {:?}", source, dest, total, duration);
        Ok(CopyStats::new(CopyMethod::Direct, total, duration))
    }
}

/// One row of a comparison
#[derive(Debug)]
pub struct MethodRun {
    /// Strategy
    pub method: CopyMethod,
    /// Output file
    pub destination: PathBuf,
    /// Stats, or why the copy failed
    pub result: Result<CopyStats>,
}

/// Buffered and direct copies of the same source
#[derive(Debug)]
pub struct Comparison {
    /// Copied file
    pub source: PathBuf,
    /// One entry per strategy, buffered first
    pub runs: Vec<MethodRun>,
}

impl Comparison {
    /// Stats of a strategy that succeeded
    pub fn stats(&self, method: CopyMethod) -> Option<&CopyStats> {
        self.runs
            .iter()
            .find(|r| r.method == method)
            .and_then(|r| r.result.as_ref().ok())
    }

    /// Write per-method timings and a result table
    pub fn render<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        for run in &self.runs {
            writeln!(out, "\n--- {} copy ---", run.method.label())?;
            match &run.result {
                Ok(stats) => writeln!(out, "Time: {:.3} sec", stats.duration.as_secs_f64())?,
                Err(e) => writeln!(out, "Failed: {}", e)?,
            }
        }

        writeln!(out, "\n=== RESULT ===")?;
        for run in &self.runs {
            match &run.result {
                Ok(stats) => writeln!(
                    out,
                    "{:<18} {:>9.3} sec  {:>12}/s",
                    run.method.label(),
                    stats.duration.as_secs_f64(),
                    humansize::format_size(stats.throughput as u64, humansize::BINARY)
                )?,
                Err(_) => writeln!(out, "{:<18} {:>9}", run.method.label(), "failed")?,
            }
        }
        Ok(())
    }

    /// Print to stdout
    pub fn print(&self) -> std::io::Result<()> {
        self.render(&mut std::io::stdout().lock())
    }
}

/// Copy `source` with both strategies into `<source>.buffered.bin` and
/// `<source>.direct.bin`
pub fn compare_methods(source: &Path, buffer_size: usize) -> Comparison {
    let copier = FileCopier::new(buffer_size);
    let runs = [CopyMethod::Buffered, CopyMethod::Direct]
        .into_iter()
        .map(|method| {
            let destination = append_suffix(source, method.suffix());
            let result = copier
                .copy(method, source, &destination)
                .and_then(|stats| verify_copy_size(source, &destination).map(|()| stats));
            if let Err(e) = &result {
                warn!("{} copy of {:?} failed: {}", method.label(), source, e);
            }
            MethodRun {
                method,
                destination,
                result,
            }
        })
        .collect();

    Comparison {
        source: source.to_path_buf(),
        runs,
    }
}

/// `path` with `suffix` appended to its final component
pub fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// Copy the source modification time onto the destination
pub fn preserve_mtime(source: &Path, dest: &Path) -> Result<()> {
    let meta = std::fs::metadata(source).with_path(source)?;
    let mtime = filetime::FileTime::from_last_modification_time(&meta);
    filetime::set_file_mtime(dest, mtime).with_path(dest)
}

/// Check that source and destination have the same size
pub fn verify_copy_size(source: &Path, dest: &Path) -> Result<()> {
    let src = std::fs::metadata(source).with_path(source)?.len();
    let dst = std::fs::metadata(dest).with_path(dest)?.len();
    if src != dst {
        return Err(CopyError::IntegrityMismatch {
            path: dest.to_path_buf(),
            expected: format!("{} bytes", src),
            actual: format!("{} bytes", dst),
        });
    }
    Ok(())
}
