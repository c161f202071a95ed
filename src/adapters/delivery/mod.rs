//! Report delivery channels.

pub mod log;
pub mod recording;
pub mod slack;

pub use log::LogChannel;
pub use recording::RecordingChannel;
pub use slack::SlackWebhookChannel;
