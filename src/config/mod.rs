//! Configuration
//!
//! CLI arguments and the runtime settings of the copy engine.

mod settings;

pub use settings::*;
