//! In-memory delivery channel for tests and dry runs.

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::models::Report;
use crate::domain::ports::{DeliveryChannel, DeliveryError};

/// Remembers every report it is handed; optionally fails every delivery.
pub struct RecordingChannel {
    name: String,
    fail_with: Option<String>,
    delivered: Mutex<Vec<Uuid>>,
}

impl RecordingChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), fail_with: None, delivered: Mutex::new(Vec::new()) }
    }

    /// A channel whose every delivery fails with `message`.
    pub fn failing(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self { fail_with: Some(message.into()), ..Self::new(name) }
    }

    /// Ids of the reports delivered successfully, in order.
    pub async fn delivered(&self) -> Vec<Uuid> {
        self.delivered.lock().await.clone()
    }
}

#[async_trait]
impl DeliveryChannel for RecordingChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, report: &Report) -> Result<(), DeliveryError> {
        if let Some(message) = &self.fail_with {
            return Err(DeliveryError::Transport(message.clone()));
        }
        self.delivered.lock().await.push(report.id);
        Ok(())
    }
}
