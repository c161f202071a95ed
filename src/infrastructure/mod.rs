//! Infrastructure layer
//!
//! Process-wide concerns that sit outside the pipeline itself:
//! - Configuration loading and validation (figment)
//! - Logging setup (tracing)

pub mod config;
pub mod logging;
