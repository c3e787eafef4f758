//! File system layer
//!
//! Handle abstraction and asynchronous reads for the copy engine, plus the
//! sequential baseline copies and file inspection used by the CLI.

mod operations;
pub mod async_io;
pub mod info;
pub mod storage;

pub use async_io::{CompletionSignal, IoEngine, IoStats, ReadCompletion, Submission};
pub use info::{inspect, FileAttribute, FileInfo};
pub use operations::*;
pub use storage::{DestinationFile, LocalStorage, SourceFile, Storage};
