use async_trait::async_trait;
use region_sweep::{NotificationChannel, NotificationError};

/// Log-only channel for runs without Telegram credentials
pub struct LogChannel;

#[async_trait]
impl NotificationChannel for LogChannel {
    async fn send(&self, message: &str) -> Result<(), NotificationError> {
        log::info!("📨 [LOG CHANNEL] {}", message);
        Ok(())
    }
}
