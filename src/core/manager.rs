//! Run a batch of transfers to completion
//!
//! [`PipelineManager`] admits up to `max_concurrency` requests, creates one
//! [`CopyPipeline`] per admitted request and then drives every active pipeline
//! from a single dispatcher loop: wait for any completion, hand it to its
//! pipeline, retire the pipeline once it reaches a terminal state.
//!
//! A failing transfer never stops the others. Only a failure of the wait
//! itself ends the run early; every pipeline still active at that point is
//! released and reported as failed.

use crate::config::EngineConfig;
use crate::core::{CompletionMultiplexer, CopyPipeline, PipelineStats};
use crate::error::{ErrorKind, PipelineError, Result};
use crate::fs::{self, CompletionSignal, IoEngine, LocalStorage, Storage};
use crate::progress::ProgressReporter;
use serde::{Deserialize, Serialize, Serializer};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// One file to copy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    /// File to read
    pub source: PathBuf,
    /// File to create or truncate
    pub destination: PathBuf,
}

impl TransferRequest {
    /// Request with an explicit destination
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }

    /// Request whose destination is `source` with `suffix` appended
    pub fn with_suffix(source: impl Into<PathBuf>, suffix: &str) -> Self {
        let source = source.into();
        let destination = fs::append_suffix(&source, suffix);
        Self {
            source,
            destination,
        }
    }
}

/// How a transfer ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransferStatus {
    /// Destination is a full copy of the source
    Completed,
    /// Transfer stopped; the destination may hold a partial copy
    Failed {
        /// Failure category
        kind: ErrorKind,
        /// OS error code, when there is one
        os_code: Option<i32>,
        /// Human-readable cause
        message: String,
    },
}

impl TransferStatus {
    fn from_error(error: &PipelineError) -> Self {
        Self::Failed {
            kind: error.kind,
            os_code: error.os_code(),
            message: error.source.to_string(),
        }
    }

    /// Whether the transfer completed
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Final record of one admitted transfer
#[derive(Debug, Clone, Serialize)]
pub struct TransferOutcome {
    /// Position among the admitted requests
    pub index: usize,
    /// Source path
    pub source: PathBuf,
    /// Destination path
    pub destination: PathBuf,
    /// Result
    #[serde(flatten)]
    pub status: TransferStatus,
    /// Bytes written to the destination
    pub bytes_copied: u64,
    /// Read and write counters
    pub stats: PipelineStats,
}

impl TransferOutcome {
    fn from_pipeline(mut pipeline: CopyPipeline) -> Self {
        let status = match pipeline.take_error() {
            Some(e) => TransferStatus::from_error(&e),
            None => TransferStatus::Completed,
        };
        Self {
            index: pipeline.index(),
            source: pipeline.source().to_path_buf(),
            destination: pipeline.destination().to_path_buf(),
            status,
            bytes_copied: pipeline.offset(),
            stats: pipeline.stats(),
        }
    }

    fn not_started(index: usize, request: &TransferRequest, error: &PipelineError) -> Self {
        Self {
            index,
            source: request.source.clone(),
            destination: request.destination.clone(),
            status: TransferStatus::from_error(error),
            bytes_copied: 0,
            stats: PipelineStats::default(),
        }
    }

    /// Whether the transfer completed
    pub fn is_completed(&self) -> bool {
        self.status.is_completed()
    }

    /// Line printed when the transfer finishes
    pub fn status_line(&self) -> String {
        match &self.status {
            TransferStatus::Completed => format!(
                "Finished async copy for '{}' -> '{}' ({})",
                self.source.display(),
                self.destination.display(),
                humansize::format_size(self.bytes_copied, humansize::BINARY)
            ),
            TransferStatus::Failed {
                kind,
                os_code,
                message,
            } => {
                let code = os_code.map(|c| format!(" [os error {}]", c)).unwrap_or_default();
                format!(
                    "Copy of '{}' failed ({}){} after {} bytes: {}",
                    self.source.display(),
                    kind,
                    code,
                    self.bytes_copied,
                    message
                )
            }
        }
    }
}

/// Summary of one `run_all`
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// One entry per admitted request, in the order they finished
    pub outcomes: Vec<TransferOutcome>,
    /// Requests beyond the concurrency limit, never started
    pub dropped: Vec<TransferRequest>,
    /// Wall time from admission to the last completion
    #[serde(serialize_with = "duration_secs")]
    pub elapsed: Duration,
    /// Completions dispatched through the multiplexer
    pub waits: u64,
    /// Why the run stopped early, if it did
    pub aborted: Option<String>,
}

fn duration_secs<S: Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

impl RunReport {
    /// Outcome of the request admitted at `index`
    pub fn outcome(&self, index: usize) -> Option<&TransferOutcome> {
        self.outcomes.iter().find(|o| o.index == index)
    }

    /// Completed transfers
    pub fn completed(&self) -> impl Iterator<Item = &TransferOutcome> {
        self.outcomes.iter().filter(|o| o.is_completed())
    }

    /// Failed transfers
    pub fn failed(&self) -> impl Iterator<Item = &TransferOutcome> {
        self.outcomes.iter().filter(|o| !o.is_completed())
    }

    /// Bytes written across all transfers
    pub fn total_bytes(&self) -> u64 {
        self.outcomes.iter().map(|o| o.bytes_copied).sum()
    }

    /// No failure and no abort
    pub fn is_success(&self) -> bool {
        self.aborted.is_none() && self.failed().next().is_none()
    }

    /// Write the aggregate lines that follow the per-file status lines
    pub fn render_summary<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        let completed = self.completed().count();
        let failed = self.outcomes.len() - completed;
        let secs = self.elapsed.as_secs_f64();
        let throughput = if secs > 0.0 {
            self.total_bytes() as f64 / secs
        } else {
            0.0
        };

        writeln!(out, "\nTotal async copy time: {:.3} sec", secs)?;
        writeln!(out, "\n=== Copy Summary ===")?;
        writeln!(out, "Files copied:    {}", completed)?;
        writeln!(out, "Files failed:    {}", failed)?;
        if !self.dropped.is_empty() {
            writeln!(out, "Files skipped:   {}", self.dropped.len())?;
        }
        writeln!(
            out,
            "Bytes copied:    {}",
            humansize::format_size(self.total_bytes(), humansize::BINARY)
        )?;
        writeln!(
            out,
            "Duration:        {}",
            humantime::format_duration(Duration::from_millis(self.elapsed.as_millis() as u64))
        )?;
        writeln!(
            out,
            "Throughput:      {}/s",
            humansize::format_size(throughput as u64, humansize::BINARY)
        )?;
        writeln!(out, "Waits:           {}", self.waits)?;
        if let Some(reason) = &self.aborted {
            writeln!(out, "\nRun aborted: {}", reason)?;
        }
        Ok(())
    }

    /// Print the summary to stdout
    pub fn print_summary(&self) -> std::io::Result<()> {
        self.render_summary(&mut std::io::stdout().lock())
    }
}

/// Drives a batch of transfers with one dispatcher thread
pub struct PipelineManager {
    config: EngineConfig,
    io: IoEngine,
    mux: CompletionMultiplexer,
    storage: Arc<dyn Storage>,
    progress: Option<Arc<ProgressReporter>>,
}

impl PipelineManager {
    /// Manager over the local filesystem
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let io = IoEngine::new(config.effective_io_threads(), config.max_signals)?;
        let mux = CompletionMultiplexer::with_capacity(config.max_wait_objects);
        Ok(Self {
            config,
            io,
            mux,
            storage: Arc::new(LocalStorage::new()),
            progress: None,
        })
    }

    /// Use another storage backend
    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = storage;
        self
    }

    /// Use another multiplexer
    pub fn with_multiplexer(mut self, mux: CompletionMultiplexer) -> Self {
        self.mux = mux;
        self
    }

    /// Report progress through `progress`
    pub fn with_progress(mut self, progress: Arc<ProgressReporter>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Settings
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The I/O engine
    pub fn io(&self) -> &IoEngine {
        &self.io
    }

    /// Copy every admitted request
    pub fn run_all(&self, requests: &[TransferRequest]) -> RunReport {
        self.run_all_with(requests, |_| {})
    }

    /// Copy every admitted request, calling `observer` as each one finishes
    pub fn run_all_with<F>(&self, requests: &[TransferRequest], mut observer: F) -> RunReport
    where
        F: FnMut(&TransferOutcome),
    {
        let started = Instant::now();

        let admit = requests.len().min(self.config.max_concurrency);
        let (admitted, dropped) = requests.split_at(admit);
        for request in dropped {
            warn!(
                "Skipping {:?}: at most {} files per run",
                request.source, self.config.max_concurrency
            );
        }
        if let Some(p) = &self.progress {
            p.set_total_files(admitted.len() as u64);
        }

        let mut outcomes = Vec::with_capacity(admitted.len());
        let mut finish = |outcome: TransferOutcome| {
            if let Some(p) = &self.progress {
                p.file_finished();
            }
            observer(&outcome);
            outcomes.push(outcome);
        };

        let mut active: Vec<Tracked> = Vec::with_capacity(admitted.len());
        for (index, request) in admitted.iter().enumerate() {
            match CopyPipeline::create(
                index,
                request,
                self.storage.as_ref(),
                &self.io,
                self.config.buffer_size,
            ) {
                Ok(pipeline) => {
                    if let Some(p) = &self.progress {
                        p.add_total_bytes(pipeline.source_len());
                    }
                    let mut tracked = Tracked {
                        pipeline,
                        reported: 0,
                    };
                    tracked.pipeline.issue_read(&self.io);
                    self.report_bytes(&mut tracked);

                    if tracked.pipeline.is_active() {
                        active.push(tracked);
                    } else {
                        finish(self.retire(tracked.pipeline));
                    }
                }
                Err(e) => {
                    error!("Cannot start copy of {:?}: {}", request.source, e);
                    finish(TransferOutcome::not_started(index, request, &e));
                }
            }
        }

        debug!("{} pipelines waiting on completions", active.len());

        let waits_before = self.mux.waits();
        let mut aborted = None;
        while !active.is_empty() {
            let ready = {
                let signals: Vec<&CompletionSignal> =
                    active.iter().filter_map(|t| t.pipeline.signal()).collect();
                self.mux.wait_any(&signals)
            };

            match ready {
                Ok(i) => {
                    let tracked = &mut active[i];
                    tracked.pipeline.on_completion(&self.io);
                    self.report_bytes(tracked);
                    if !tracked.pipeline.is_active() {
                        let tracked = active.remove(i);
                        finish(self.retire(tracked.pipeline));
                    }
                }
                Err(e) => {
                    let reason = e.to_string();
                    error!("Completion wait failed, aborting run: {}", reason);
                    for mut tracked in active.drain(..) {
                        tracked.pipeline.abort(&reason);
                        finish(self.retire(tracked.pipeline));
                    }
                    aborted = Some(reason);
                }
            }
        }

        let elapsed = started.elapsed();
        let waits = self.mux.waits() - waits_before;
        if let Some(p) = &self.progress {
            p.finish(aborted.is_none());
        }
        info!(
            "Run finished: {} transfers, {} skipped, {} waits in {:?} ({:.1}% of reads inline)",
            outcomes.len(),
            dropped.len(),
            waits,
            elapsed,
            self.io.stats().immediate_percentage()
        );

        RunReport {
            outcomes,
            dropped: dropped.to_vec(),
            elapsed,
            waits,
            aborted,
        }
    }

    fn report_bytes(&self, tracked: &mut Tracked) {
        let offset = tracked.pipeline.offset();
        if let Some(p) = &self.progress {
            p.increment_bytes(offset - tracked.reported);
        }
        tracked.reported = offset;
    }

    fn retire(&self, pipeline: CopyPipeline) -> TransferOutcome {
        let outcome = TransferOutcome::from_pipeline(pipeline);

        if outcome.is_completed() {
            info!(
                "Copied {:?} -> {:?} ({} bytes)",
                outcome.source, outcome.destination, outcome.bytes_copied
            );
            if self.config.preserve_mtime {
                if let Err(e) = fs::preserve_mtime(&outcome.source, &outcome.destination) {
                    warn!("Cannot preserve mtime of {:?}: {}", outcome.destination, e);
                }
            }
        } else {
            error!("{}", outcome.status_line());
        }
        outcome
    }
}

impl std::fmt::Debug for PipelineManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineManager")
            .field("config", &self.config)
            .field("io", &self.io)
            .field("mux", &self.mux)
            .finish()
    }
}

struct Tracked {
    pipeline: CopyPipeline,
    /// Offset already counted by the progress reporter
    reported: u64,
}

/// Copy `sources` to `<source><suffix>` with the given settings
pub fn copy_files(sources: &[impl AsRef<Path>], config: EngineConfig) -> Result<RunReport> {
    let requests: Vec<TransferRequest> = sources
        .iter()
        .map(|s| TransferRequest::with_suffix(s.as_ref(), &config.destination_suffix))
        .collect();
    let manager = PipelineManager::new(config)?;
    Ok(manager.run_all(&requests))
}
