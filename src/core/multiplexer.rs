//! Wait for the first of many completion signals
//!
//! The multiplexer blocks until at least one signal in the given set is set
//! and reports its position. When several are set at once the lowest index
//! wins, so dispatch order is reproducible.

use crate::fs::CompletionSignal;
use crossbeam::channel::Select;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::trace;

/// Largest set a single wait accepts unless configured otherwise
pub const MAX_WAIT_OBJECTS: usize = 64;

/// Why a wait could not produce an index
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WaitError {
    /// Nothing to wait on
    #[error("wait called with an empty signal set")]
    EmptySet,

    /// The set exceeds the primitive's capacity
    #[error("wait set of {count} signals exceeds the limit of {max}")]
    TooManyObjects {
        /// Size of the offered set
        count: usize,
        /// Configured capacity
        max: usize,
    },
}

/// Blocks on a set of completion signals
#[derive(Debug)]
pub struct CompletionMultiplexer {
    capacity: usize,
    waits: AtomicU64,
}

impl CompletionMultiplexer {
    /// Multiplexer with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(MAX_WAIT_OBJECTS)
    }

    /// Multiplexer accepting at most `capacity` signals per wait
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            waits: AtomicU64::new(0),
        }
    }

    /// Number of waits that returned an index
    pub fn waits(&self) -> u64 {
        self.waits.load(Ordering::Relaxed)
    }

    /// Block until a signal is set and return the lowest set index
    ///
    /// Signals are not cleared here; the owning pipeline takes the
    /// completion out when it handles it.
    pub fn wait_any(&self, signals: &[&CompletionSignal]) -> Result<usize, WaitError> {
        if signals.is_empty() {
            return Err(WaitError::EmptySet);
        }
        if signals.len() > self.capacity {
            return Err(WaitError::TooManyObjects {
                count: signals.len(),
                max: self.capacity,
            });
        }

        let mut sel = Select::new();
        for signal in signals {
            sel.recv(signal.receiver());
        }
        let index = wait_until_set(signals, || sel.ready());

        self.waits.fetch_add(1, Ordering::Relaxed);
        trace!("wait_any over {} signals -> {}", signals.len(), index);
        Ok(index)
    }
}

impl Default for CompletionMultiplexer {
    fn default() -> Self {
        Self::new()
    }
}

fn lowest_set(signals: &[&CompletionSignal]) -> Option<usize> {
    signals.iter().position(|s| s.is_set())
}

/// Block on `ready` until some signal is actually set
///
/// `Select::ready` may wake spuriously, and a woken signal is not
/// necessarily the lowest set one, so the set is rescanned after every wake.
fn wait_until_set(signals: &[&CompletionSignal], mut ready: impl FnMut() -> usize) -> usize {
    loop {
        if let Some(index) = lowest_set(signals) {
            return index;
        }
        let woke = ready();
        trace!("woke on signal {}", woke);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{IoEngine, LocalStorage, SourceFile, Storage, Submission};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn large_source(dir: &TempDir) -> Arc<dyn SourceFile> {
        let path = dir.path().join("src.bin");
        std::fs::write(&path, vec![7u8; 256 * 1024]).unwrap();
        LocalStorage::new().open_source(&path).unwrap()
    }

    fn settle(signal: &CompletionSignal) {
        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        while !signal.is_set() {
            assert!(std::time::Instant::now() < deadline, "read never completed");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_empty_set_fails() {
        let mux = CompletionMultiplexer::new();
        assert_eq!(mux.wait_any(&[]), Err(WaitError::EmptySet));
        assert_eq!(mux.waits(), 0);
    }

    #[test]
    fn test_over_capacity_fails() {
        let engine = IoEngine::new(1, 8).unwrap();
        let a = engine.create_signal().unwrap();
        let b = engine.create_signal().unwrap();
        let mux = CompletionMultiplexer::with_capacity(1);

        assert_eq!(
            mux.wait_any(&[&a, &b]),
            Err(WaitError::TooManyObjects { count: 2, max: 1 })
        );
    }

    #[test]
    fn test_returns_the_set_signal() {
        let dir = TempDir::new().unwrap();
        let source = large_source(&dir);
        let engine = IoEngine::new(1, 8).unwrap();
        let signals: Vec<_> = (0..3).map(|_| engine.create_signal().unwrap()).collect();

        let sub = engine.submit_read(&source, 0, vec![0u8; 1024], &signals[2]).unwrap();
        assert!(matches!(sub, Submission::Pending));

        let mux = CompletionMultiplexer::new();
        let refs: Vec<&CompletionSignal> = signals.iter().collect();
        assert_eq!(mux.wait_any(&refs).unwrap(), 2);
        assert_eq!(mux.waits(), 1);

        // Still set until the owner takes the completion.
        assert!(signals[2].is_set());
        assert!(signals[2].take().is_some());
    }

    #[test]
    fn test_lowest_index_wins() {
        let dir = TempDir::new().unwrap();
        let source = large_source(&dir);
        let engine = IoEngine::new(2, 8).unwrap();
        let signals: Vec<_> = (0..4).map(|_| engine.create_signal().unwrap()).collect();

        for i in [3usize, 1] {
            engine
                .submit_read(&source, 0, vec![0u8; 1024], &signals[i])
                .unwrap();
        }
        settle(&signals[3]);
        settle(&signals[1]);

        let mux = CompletionMultiplexer::new();
        let refs: Vec<&CompletionSignal> = signals.iter().collect();
        assert_eq!(mux.wait_any(&refs).unwrap(), 1);

        signals[1].take();
        assert_eq!(mux.wait_any(&refs).unwrap(), 3);
    }

    #[test]
    fn test_spurious_wake_keeps_waiting() {
        let dir = TempDir::new().unwrap();
        let source = large_source(&dir);
        let engine = IoEngine::new(1, 8).unwrap();
        let signals: Vec<_> = (0..2).map(|_| engine.create_signal().unwrap()).collect();
        let refs: Vec<&CompletionSignal> = signals.iter().collect();

        let mut wakes = 0;
        let index = wait_until_set(&refs, || {
            wakes += 1;
            if wakes == 2 {
                engine
                    .submit_read(&source, 0, vec![0u8; 1024], &signals[1])
                    .unwrap();
                settle(&signals[1]);
            }
            // Report signal 0 whether or not anything is set.
            0
        });

        assert_eq!(index, 1);
        assert_eq!(wakes, 2);
    }
}
