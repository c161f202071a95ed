//! Delivery port - pushes a finished report to readers.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::models::Report;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Rejected by channel ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Delivery timed out after {0}s")]
    Timeout(u64),
}

#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Channel name recorded in `delivered_via`.
    fn name(&self) -> &str;

    async fn deliver(&self, report: &Report) -> Result<(), DeliveryError>;
}
