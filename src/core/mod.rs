//! Copy engine
//!
//! Per-file pipelines, the completion multiplexer and the manager that
//! drives a batch of pipelines from one dispatcher thread.

mod manager;
mod multiplexer;
mod pipeline;

pub use manager::*;
pub use multiplexer::*;
pub use pipeline::*;
