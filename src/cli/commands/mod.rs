//! CLI command implementations.

pub mod assessment;
pub mod costs;
pub mod init;
pub mod investigation;
pub mod position;
pub mod report;
pub mod run;
pub mod trigger;
