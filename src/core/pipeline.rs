//! Single-file copy pipeline
//!
//! A pipeline owns one source→destination transfer: the two handles, one
//! reusable buffer, a completion signal and the byte cursor. It moves
//! `Active → Done` on end of file and `Active → Failed` on the first error,
//! releasing every resource on the way out. There are no retries.

use crate::core::TransferRequest;
use crate::error::{ErrorKind, PipelineError};
use crate::fs::{CompletionSignal, DestinationFile, IoEngine, SourceFile, Storage, Submission};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

/// Lifecycle state of a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    /// Transfer in progress
    Active,
    /// Source copied completely
    Done,
    /// Transfer stopped on an error
    Failed,
}

impl PipelineState {
    /// Whether the pipeline can no longer change state
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

/// Per-pipeline counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Reads that completed during submission
    pub immediate_reads: u64,
    /// Reads handed to the I/O pool
    pub pending_reads: u64,
    /// Completions delivered through the multiplexer
    pub wait_dispatches: u64,
    /// Blocks written to the destination
    pub blocks_written: u64,
}

/// Resources held while the pipeline is active
struct Resources {
    input: Arc<dyn SourceFile>,
    output: Box<dyn DestinationFile>,
    signal: CompletionSignal,
    /// `None` while the buffer is lent to an in-flight read
    buffer: Option<Vec<u8>>,
}

/// One in-flight source→destination transfer
pub struct CopyPipeline {
    index: usize,
    source: PathBuf,
    destination: PathBuf,
    resources: Option<Resources>,
    offset: u64,
    source_len: u64,
    state: PipelineState,
    last_error: Option<PipelineError>,
    stats: PipelineStats,
}

impl CopyPipeline {
    /// Open both handles and allocate the signal and buffer
    ///
    /// Anything acquired before a failing step is dropped on return.
    pub fn create(
        index: usize,
        request: &TransferRequest,
        storage: &dyn Storage,
        io: &IoEngine,
        buffer_size: usize,
    ) -> Result<Self, PipelineError> {
        let input = storage
            .open_source(&request.source)
            .map_err(|e| PipelineError::new(ErrorKind::OpenSourceFailed, &request.source, e))?;

        // Creating the destination would truncate the source.
        if storage.same_file(&request.source, &request.destination) {
            return Err(PipelineError::new(
                ErrorKind::OpenDestFailed,
                &request.destination,
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "destination is the source file",
                ),
            ));
        }

        let output = storage
            .create_destination(&request.destination)
            .map_err(|e| PipelineError::new(ErrorKind::OpenDestFailed, &request.destination, e))?;

        let signal = io
            .create_signal()
            .map_err(|e| PipelineError::new(ErrorKind::SignalCreateFailed, &request.source, e))?;

        let source_len = input.size();
        debug!(
            "pipeline {} created: {:?} -> {:?} ({} bytes)",
            index, request.source, request.destination, source_len
        );

        Ok(Self {
            index,
            source: request.source.clone(),
            destination: request.destination.clone(),
            resources: Some(Resources {
                input,
                output,
                signal,
                buffer: Some(vec![0u8; buffer_size.max(1)]),
            }),
            offset: 0,
            source_len,
            state: PipelineState::Active,
            last_error: None,
            stats: PipelineStats::default(),
        })
    }

    /// Submit reads until one goes pending or the pipeline terminates
    ///
    /// Every read that completes during submission is written out and
    /// followed by the next read right here, so a short file can finish
    /// without ever reaching the multiplexer.
    pub fn issue_read(&mut self, io: &IoEngine) {
        while self.state == PipelineState::Active {
            let Some(res) = self.resources.as_mut() else {
                return;
            };
            // A read is already in flight.
            let Some(buffer) = res.buffer.take() else {
                return;
            };

            match io.submit_read(&res.input, self.offset, buffer, &res.signal) {
                Ok(Submission::Pending) => {
                    self.stats.pending_reads += 1;
                    trace!("pipeline {} read pending at {}", self.index, self.offset);
                    return;
                }
                Ok(Submission::Immediate { buffer, bytes }) => {
                    self.stats.immediate_reads += 1;
                    trace!(
                        "pipeline {} read {} bytes inline at {}",
                        self.index,
                        bytes,
                        self.offset
                    );
                    if !self.accept_block(buffer, bytes) {
                        return;
                    }
                }
                Err(e) => {
                    let path = self.source.clone();
                    self.fail(PipelineError::new(ErrorKind::ReadFailed, path, e));
                    return;
                }
            }
        }
    }

    /// Handle the completion the multiplexer reported for this pipeline
    pub fn on_completion(&mut self, io: &IoEngine) {
        if self.state != PipelineState::Active {
            return;
        }
        let Some(completion) = self.resources.as_ref().and_then(|r| r.signal.take()) else {
            trace!("pipeline {} woken without a completion", self.index);
            return;
        };
        self.stats.wait_dispatches += 1;

        match completion.result {
            Ok(bytes) => {
                if self.accept_block(completion.buffer, bytes) {
                    self.issue_read(io);
                }
            }
            Err(e) => {
                let path = self.source.clone();
                self.fail(PipelineError::new(ErrorKind::ReadFailed, path, e));
            }
        }
    }

    /// Write one finished block; returns whether the next read should follow
    fn accept_block(&mut self, buffer: Vec<u8>, bytes: usize) -> bool {
        if bytes == 0 {
            self.finish();
            return false;
        }

        let Some(res) = self.resources.as_mut() else {
            return false;
        };
        let requested = bytes.min(buffer.len());
        match res.output.write_at(&buffer[..requested], self.offset) {
            Ok(written) if written == requested => {
                res.buffer = Some(buffer);
                self.offset += written as u64;
                self.stats.blocks_written += 1;
                true
            }
            Ok(written) => {
                let path = self.destination.clone();
                self.fail(PipelineError::short_write(path, written, requested));
                false
            }
            Err(e) => {
                let path = self.destination.clone();
                self.fail(PipelineError::new(ErrorKind::WriteFailed, path, e));
                false
            }
        }
    }

    fn finish(&mut self) {
        if let Some(res) = self.resources.as_mut() {
            if let Err(e) = res.output.flush() {
                let path = self.destination.clone();
                self.fail(PipelineError::new(ErrorKind::WriteFailed, path, e));
                return;
            }
        }
        self.state = PipelineState::Done;
        self.release();
        debug!("pipeline {} done after {} bytes", self.index, self.offset);
    }

    fn fail(&mut self, error: PipelineError) {
        debug!("pipeline {} failed: {}", self.index, error);
        self.state = PipelineState::Failed;
        self.last_error = Some(error);
        self.release();
    }

    /// Stop an active pipeline because the run is being torn down
    pub fn abort(&mut self, reason: &str) {
        if !self.state.is_terminal() {
            let path = self.source.clone();
            self.fail(PipelineError::new(
                ErrorKind::WaitFailed,
                path,
                std::io::Error::new(std::io::ErrorKind::Other, reason.to_string()),
            ));
        }
    }

    /// Close both handles, return the signal and free the buffer
    ///
    /// Returns `false` when there was nothing left to release.
    pub fn release(&mut self) -> bool {
        match self.resources.take() {
            Some(res) => {
                drop(res);
                true
            }
            None => false,
        }
    }

    /// Position in the admitted request list
    pub fn index(&self) -> usize {
        self.index
    }

    /// Source path
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Destination path
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Current state
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Whether the transfer is still running
    pub fn is_active(&self) -> bool {
        self.state == PipelineState::Active
    }

    /// Bytes written so far
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Source length observed at open
    pub fn source_len(&self) -> u64 {
        self.source_len
    }

    /// Error that stopped the pipeline
    pub fn last_error(&self) -> Option<&PipelineError> {
        self.last_error.as_ref()
    }

    /// Take the error out, leaving `None`
    pub fn take_error(&mut self) -> Option<PipelineError> {
        self.last_error.take()
    }

    /// Counters
    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Completion signal, present while the pipeline is active
    pub fn signal(&self) -> Option<&CompletionSignal> {
        self.resources.as_ref().map(|r| &r.signal)
    }

    /// Whether handles are still held
    pub fn holds_resources(&self) -> bool {
        self.resources.is_some()
    }
}

impl std::fmt::Debug for CopyPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CopyPipeline")
            .field("index", &self.index)
            .field("source", &self.source)
            .field("destination", &self.destination)
            .field("state", &self.state)
            .field("offset", &self.offset)
            .finish()
    }
}
