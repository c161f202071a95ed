//! Equiwatch - announcement trigger pipeline
//!
//! Turns exchange announcements and analyst notes into investigated,
//! assessed and delivered reports for a watchlist of companies.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models, errors and the ports adapters implement
//! - **Service Layer** (`services`): ingest, filter, gate, investigation,
//!   assessment, reporting and the orchestrator that drives them
//! - **Adapters** (`adapters`): SQLite stores, reasoning providers, delivery channels
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{Config, Trigger, TriggerCandidate, TriggerStatus, WatchlistConfig};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{IngestOutcome, Pipeline, ProcessOutcome, TriggerOrchestrator};
