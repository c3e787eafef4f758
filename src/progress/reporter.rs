//! Terminal progress for a multi-file run
//!
//! One bar counts finished transfers, another the bytes written across all
//! pipelines. Status lines are printed above the bars so they never get
//! overdrawn; with progress disabled they go straight to stdout.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

const FILES_TEMPLATE: &str = "{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} files";
const BYTES_TEMPLATE: &str =
    "{prefix:.bold.dim} [{bar:40.green/white}] {bytes}/{total_bytes} ({bytes_per_sec}, ETA {eta})";

/// Progress reporter for a copy run
pub struct ProgressReporter {
    multi: MultiProgress,
    files_bar: ProgressBar,
    bytes_bar: ProgressBar,
    started: Instant,
    bytes_copied: AtomicU64,
    enabled: bool,
}

impl ProgressReporter {
    /// Reporter drawing to stderr
    pub fn new() -> Self {
        Self::build(true)
    }

    /// Reporter that draws nothing and prints status lines to stdout
    pub fn disabled() -> Self {
        Self::build(false)
    }

    fn build(enabled: bool) -> Self {
        let multi = if enabled {
            MultiProgress::new()
        } else {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        };

        let files_bar = multi.add(ProgressBar::new(0));
        files_bar.set_style(bar_style(FILES_TEMPLATE));
        files_bar.set_prefix("Files");

        let bytes_bar = multi.add(ProgressBar::new(0));
        bytes_bar.set_style(bar_style(BYTES_TEMPLATE));
        bytes_bar.set_prefix("Data ");

        Self {
            multi,
            files_bar,
            bytes_bar,
            started: Instant::now(),
            bytes_copied: AtomicU64::new(0),
            enabled,
        }
    }

    /// Set the number of admitted transfers
    pub fn set_total_files(&self, total: u64) {
        self.files_bar.set_length(total);
    }

    /// Add to the expected byte total as pipelines open their sources
    pub fn add_total_bytes(&self, bytes: u64) {
        self.bytes_bar.inc_length(bytes);
    }

    /// Record newly written bytes
    pub fn increment_bytes(&self, bytes: u64) {
        self.bytes_copied.fetch_add(bytes, Ordering::Relaxed);
        self.bytes_bar.inc(bytes);
    }

    /// Record a finished transfer, successful or not
    pub fn file_finished(&self) {
        self.files_bar.inc(1);
    }

    /// Print a line without disturbing the bars
    pub fn status_line(&self, line: &str) {
        if self.enabled {
            if self.multi.println(line).is_err() {
                eprintln!("{}", line);
            }
        } else {
            println!("{}", line);
        }
    }

    /// Stop drawing; `ok` keeps the bars, otherwise they are abandoned
    pub fn finish(&self, ok: bool) {
        if ok {
            self.files_bar.finish();
            self.bytes_bar.finish();
        } else {
            self.files_bar.abandon();
            self.bytes_bar.abandon();
        }
    }

    /// Bytes recorded so far
    pub fn bytes_copied(&self) -> u64 {
        self.bytes_copied.load(Ordering::Relaxed)
    }

    /// Time since the reporter was created
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Average bytes per second since creation
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed().as_secs_f64();
        if secs > 0.0 {
            self.bytes_copied() as f64 / secs
        } else {
            0.0
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn bar_style(template: &str) -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_reporter_counts() {
        let reporter = ProgressReporter::disabled();

        reporter.set_total_files(3);
        reporter.add_total_bytes(1000);
        reporter.increment_bytes(400);
        reporter.increment_bytes(100);
        reporter.file_finished();

        assert_eq!(reporter.bytes_copied(), 500);
        assert!(reporter.throughput() >= 0.0);
        reporter.finish(true);
    }

    #[test]
    fn test_templates_parse() {
        assert!(ProgressStyle::default_bar().template(FILES_TEMPLATE).is_ok());
        assert!(ProgressStyle::default_bar().template(BYTES_TEMPLATE).is_ok());
    }
}
