//! Progress reporting
//!
//! indicatif bars for file and byte progress, plus status lines printed as
//! each transfer finishes.

mod reporter;

pub use reporter::*;
