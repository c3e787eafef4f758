//! # multicopy - concurrent multi-file copy with overlapped reads
//!
//! multicopy copies a small batch of files at the same time from a single
//! dispatcher thread. Every file gets a [`CopyPipeline`](core::CopyPipeline)
//! holding one buffer and at most one read in flight; reads run on a small
//! I/O pool and signal their completion, and the dispatcher waits on all
//! signals at once, writing each block out as soon as it arrives.
//!
//! ## Features
//!
//! - **Overlapped reads**: one outstanding read per file, any number of files
//! - **Inline drain**: reads that reach end of file complete during submission
//! - **Failure isolation**: one broken transfer never stops the others
//! - **Baselines**: buffered and direct sequential copies for comparison
//! - **Integrity verification**: XXHash3, BLAKE3, SHA-256
//!
//! ## Quick Start
//!
//! ```no_run
//! use multicopy::config::EngineConfig;
//! use multicopy::core::copy_files;
//!
//! // a.iso -> a.iso.async.bin, b.iso -> b.iso.async.bin
//! let report = copy_files(&["a.iso", "b.iso"], EngineConfig::default()).unwrap();
//! for outcome in &report.outcomes {
//!     println!("{}", outcome.status_line());
//! }
//! ```
//!
//! ## Explicit Requests
//!
//! ```no_run
//! use multicopy::config::EngineConfig;
//! use multicopy::core::{PipelineManager, TransferRequest};
//! use multicopy::progress::ProgressReporter;
//! use std::sync::Arc;
//!
//! let config = EngineConfig {
//!     buffer_size: 4 * 1024 * 1024,
//!     max_concurrency: 2,
//!     ..Default::default()
//! };
//!
//! let manager = PipelineManager::new(config)
//!     .unwrap()
//!     .with_progress(Arc::new(ProgressReporter::new()));
//!
//! let report = manager.run_all(&[
//!     TransferRequest::new("/data/in.bin", "/backup/in.bin"),
//!     TransferRequest::with_suffix("/data/log.bin", ".copy"),
//! ]);
//! report.print_summary().unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod core;
pub mod error;
pub mod fs;
pub mod hash;
pub mod menu;
pub mod progress;

// Re-export commonly used types
pub use config::{EngineConfig, HashAlgorithm};
pub use core::{PipelineManager, RunReport, TransferRequest};
pub use error::{CopyError, Result};
pub use progress::ProgressReporter;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use multicopy::prelude::*;
    //! ```

    pub use crate::config::{EngineConfig, HashAlgorithm};
    pub use crate::core::{
        copy_files, CompletionMultiplexer, CopyPipeline, PipelineManager, RunReport,
        TransferOutcome, TransferRequest, TransferStatus,
    };
    pub use crate::error::{CopyError, ErrorKind, PipelineError, Result};
    pub use crate::fs::{compare_methods, inspect, FileCopier, IoEngine, LocalStorage, Storage};
    pub use crate::hash::{hash_file, verify_files_match};
    pub use crate::menu::Menu;
    pub use crate::progress::ProgressReporter;
}
