//! Asynchronous positioned reads with per-request completion signals
//!
//! [`IoEngine`] runs reads on a small dedicated I/O pool and reports each
//! completion through the [`CompletionSignal`] the caller submitted it with.
//! A signal is a one-slot channel: it is *set* while a finished read waits in
//! the slot and is cleared by [`CompletionSignal::take`]. The dispatcher
//! never blocks on a single signal; it hands the whole active set to the
//! completion multiplexer.
//!
//! Reads whose range reaches the end of the file as it was observed at open
//! time complete inline at submission ([`Submission::Immediate`]). Small files
//! and the final EOF probe of every transfer therefore never wait.

use crate::error::{CopyError, Result};
use crate::fs::SourceFile;
use crossbeam::channel::{bounded, Receiver, Sender};
use std::io;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Default limit on simultaneously live completion signals
pub const DEFAULT_MAX_SIGNALS: usize = 64;

/// A finished read, carrying the buffer it was performed into
#[derive(Debug)]
pub struct ReadCompletion {
    /// The buffer lent to the read
    pub buffer: Vec<u8>,
    /// Bytes read, or the read error
    pub result: io::Result<usize>,
}

/// Outcome of submitting a read
#[derive(Debug)]
pub enum Submission {
    /// The read is in flight; its signal will be set when it finishes
    Pending,
    /// The read finished during submission
    Immediate {
        /// The buffer, handed straight back
        buffer: Vec<u8>,
        /// Bytes read (0 at end of file)
        bytes: usize,
    },
}

/// Waitable, manually cleared completion flag owned by one pipeline
pub struct CompletionSignal {
    tx: Sender<ReadCompletion>,
    rx: Receiver<ReadCompletion>,
    _slot: SignalSlot,
}

impl CompletionSignal {
    /// Whether a completion is waiting to be retrieved
    pub fn is_set(&self) -> bool {
        !self.rx.is_empty()
    }

    /// Retrieve the pending completion, clearing the signal
    pub fn take(&self) -> Option<ReadCompletion> {
        self.rx.try_recv().ok()
    }

    pub(crate) fn receiver(&self) -> &Receiver<ReadCompletion> {
        &self.rx
    }
}

impl std::fmt::Debug for CompletionSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionSignal")
            .field("set", &self.is_set())
            .finish()
    }
}

/// Returns its signal slot to the engine when dropped
struct SignalSlot {
    live: Arc<AtomicUsize>,
}

impl Drop for SignalSlot {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}

/// I/O engine statistics
#[derive(Debug, Default)]
pub struct IoStats {
    /// Reads submitted
    pub reads_submitted: AtomicU64,
    /// Reads that completed inline
    pub reads_immediate: AtomicU64,
    /// Reads handed to the I/O pool
    pub reads_pending: AtomicU64,
    /// Bytes read by either path
    pub bytes_read: AtomicU64,
}

impl IoStats {
    /// Share of submitted reads that completed inline, in percent
    pub fn immediate_percentage(&self) -> f64 {
        let submitted = self.reads_submitted.load(Ordering::Relaxed);
        if submitted == 0 {
            0.0
        } else {
            (self.reads_immediate.load(Ordering::Relaxed) as f64 / submitted as f64) * 100.0
        }
    }
}

/// Asynchronous read facility backed by a dedicated I/O thread pool
pub struct IoEngine {
    pool: rayon::ThreadPool,
    live_signals: Arc<AtomicUsize>,
    max_signals: usize,
    stats: Arc<IoStats>,
}

impl IoEngine {
    /// Create an engine with `threads` I/O workers and at most `max_signals`
    /// live completion signals
    pub fn new(threads: usize, max_signals: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("multicopy-io-{}", i))
            .build()
            .map_err(|e| CopyError::IoPool(e.to_string()))?;

        Ok(Self {
            pool,
            live_signals: Arc::new(AtomicUsize::new(0)),
            max_signals,
            stats: Arc::new(IoStats::default()),
        })
    }

    /// Allocate a completion signal
    ///
    /// Fails once `max_signals` signals are alive; dropping a signal frees
    /// its slot.
    pub fn create_signal(&self) -> io::Result<CompletionSignal> {
        let claimed = self
            .live_signals
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                (live < self.max_signals).then_some(live + 1)
            });
        if claimed.is_err() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("completion signal limit reached ({})", self.max_signals),
            ));
        }

        let (tx, rx) = bounded(1);
        Ok(CompletionSignal {
            tx,
            rx,
            _slot: SignalSlot {
                live: Arc::clone(&self.live_signals),
            },
        })
    }

    /// Number of signals currently alive
    pub fn live_signals(&self) -> usize {
        self.live_signals.load(Ordering::Acquire)
    }

    /// Engine statistics
    pub fn stats(&self) -> &IoStats {
        &self.stats
    }

    /// Submit a read of up to `buffer.len()` bytes at `offset`
    ///
    /// The buffer travels with the request and comes back either in
    /// [`Submission::Immediate`] or inside the [`ReadCompletion`] delivered
    /// to `signal`. Errors are only returned for reads that ran inline.
    pub fn submit_read(
        &self,
        source: &Arc<dyn SourceFile>,
        offset: u64,
        mut buffer: Vec<u8>,
        signal: &CompletionSignal,
    ) -> io::Result<Submission> {
        self.stats.reads_submitted.fetch_add(1, Ordering::Relaxed);

        let reaches_end = offset.saturating_add(buffer.len() as u64) >= source.size();
        if reaches_end {
            let bytes = source.read_at(&mut buffer, offset)?;
            self.stats.reads_immediate.fetch_add(1, Ordering::Relaxed);
            self.stats.bytes_read.fetch_add(bytes as u64, Ordering::Relaxed);
            return Ok(Submission::Immediate { buffer, bytes });
        }

        self.stats.reads_pending.fetch_add(1, Ordering::Relaxed);
        let source = Arc::clone(source);
        let tx = signal.tx.clone();
        let stats = Arc::clone(&self.stats);

        self.pool.spawn(move || {
            let result = source.read_at(&mut buffer, offset);
            if let Ok(bytes) = &result {
                stats.bytes_read.fetch_add(*bytes as u64, Ordering::Relaxed);
            }
            // The receiver is gone if the pipeline was released mid-read.
            let _ = tx.send(ReadCompletion { buffer, result });
        });

        Ok(Submission::Pending)
    }
}

impl std::fmt::Debug for IoEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoEngine")
            .field("threads", &self.pool.current_num_threads())
            .field("live_signals", &self.live_signals())
            .field("max_signals", &self.max_signals)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{LocalStorage, Storage};
    use std::time::Duration;
    use tempfile::TempDir;

    fn open(dir: &TempDir, size: usize) -> Arc<dyn SourceFile> {
        let path = dir.path().join("src.bin");
        let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, data).unwrap();
        LocalStorage::new().open_source(&path).unwrap()
    }

    fn wait_for(signal: &CompletionSignal) -> ReadCompletion {
        signal
            .receiver()
            .recv_timeout(Duration::from_secs(10))
            .unwrap()
    }

    #[test]
    fn test_tail_read_completes_inline() {
        let dir = TempDir::new().unwrap();
        let source = open(&dir, 100);
        let engine = IoEngine::new(1, 4).unwrap();
        let signal = engine.create_signal().unwrap();

        match engine.submit_read(&source, 0, vec![0u8; 4096], &signal).unwrap() {
            Submission::Immediate { buffer, bytes } => {
                assert_eq!(bytes, 100);
                assert_eq!(buffer[99], 99);
            }
            Submission::Pending => panic!("tail read should complete inline"),
        }

        match engine.submit_read(&source, 100, vec![0u8; 4096], &signal).unwrap() {
            Submission::Immediate { bytes, .. } => assert_eq!(bytes, 0),
            Submission::Pending => panic!("EOF probe should complete inline"),
        }
        assert!(!signal.is_set());
        assert_eq!(engine.stats().reads_immediate.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_body_read_is_pending_and_sets_signal() {
        let dir = TempDir::new().unwrap();
        let source = open(&dir, 64 * 1024);
        let engine = IoEngine::new(2, 4).unwrap();
        let signal = engine.create_signal().unwrap();

        let submission = engine.submit_read(&source, 1024, vec![0u8; 1024], &signal).unwrap();
        assert!(matches!(submission, Submission::Pending));

        let completion = wait_for(&signal);
        assert_eq!(completion.result.unwrap(), 1024);
        assert_eq!(completion.buffer[0], (1024 % 251) as u8);
        assert!(!signal.is_set());
        assert_eq!(engine.stats().reads_pending.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_signal_limit() {
        let engine = IoEngine::new(1, 2).unwrap();
        let first = engine.create_signal().unwrap();
        let _second = engine.create_signal().unwrap();
        assert!(engine.create_signal().is_err());
        assert_eq!(engine.live_signals(), 2);

        drop(first);
        assert_eq!(engine.live_signals(), 1);
        assert!(engine.create_signal().is_ok());
    }

    #[test]
    fn test_dropped_signal_does_not_break_worker() {
        let dir = TempDir::new().unwrap();
        let source = open(&dir, 64 * 1024);
        let engine = IoEngine::new(1, 4).unwrap();

        let signal = engine.create_signal().unwrap();
        engine.submit_read(&source, 0, vec![0u8; 512], &signal).unwrap();
        drop(signal);

        // The pool keeps serving requests afterwards.
        let signal = engine.create_signal().unwrap();
        engine.submit_read(&source, 512, vec![0u8; 512], &signal).unwrap();
        assert_eq!(wait_for(&signal).result.unwrap(), 512);
    }

    #[test]
    fn test_immediate_percentage() {
        let stats = IoStats::default();
        assert_eq!(stats.immediate_percentage(), 0.0);
        stats.reads_submitted.store(4, Ordering::Relaxed);
        stats.reads_immediate.store(1, Ordering::Relaxed);
        assert_eq!(stats.immediate_percentage(), 25.0);
    }
}
