//! Domain layer for the equiwatch trigger pipeline
//!
//! Core models, errors and the ports that adapters implement.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
