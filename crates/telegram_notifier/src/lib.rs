//! # Telegram Notifier
//!
//! Notification channels for sweep announcements: the Telegram Bot API and a
//! log-only fallback used when no bot credentials are configured.

/// Telegram Bot API channel.
pub mod telegram;
/// Channel that only writes to the log.
pub mod log_channel;

pub use log_channel::LogChannel;
pub use telegram::{TELEGRAM_API_BASE, TelegramChannel};
