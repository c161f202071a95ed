//! Delivery channel that writes reports to the tracing log.

use async_trait::async_trait;
use tracing::info;

use crate::domain::models::Report;
use crate::domain::ports::{DeliveryChannel, DeliveryError};

#[derive(Debug, Default, Clone)]
pub struct LogChannel;

impl LogChannel {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DeliveryChannel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, report: &Report) -> Result<(), DeliveryError> {
        info!(
            report_id = %report.id,
            company_symbol = %report.company_symbol,
            title = %report.title,
            recommendation = %report.recommendation_summary,
            summary = %report.executive_summary,
            "report"
        );
        Ok(())
    }
}
