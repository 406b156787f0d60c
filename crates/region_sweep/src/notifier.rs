use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info};

use crate::sweep_types::SweepEvent;

/// Trait for outbound notification channels (Telegram, logs)
#[async_trait::async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Deliver one message
    async fn send(&self, message: &str) -> Result<(), NotificationError>;
}

/// Why a notification could not be delivered
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    /// Request could not be delivered
    #[error("Transport error: {0}")]
    Transport(String),

    /// Channel answered but refused the message
    #[error("Message rejected: {0}")]
    Rejected(String),

    /// Missing or invalid channel credentials
    #[error("Channel configuration error: {0}")]
    Config(String),

    /// Send exceeded the dispatcher's limit
    #[error("Send timed out after {0:?}")]
    Timeout(Duration),
}

/// Operator-facing labels carried in every message
#[derive(Debug, Clone)]
pub struct NotificationContext {
    /// Search keyword
    pub keyword: String,
    /// Region selector as the operator typed it
    pub region_label: String,
}

/// Turns sweep events into channel messages
pub struct NotifierDispatcher {
    channel: Arc<dyn NotificationChannel>,
    context: NotificationContext,
    send_timeout: Duration,
}

impl NotifierDispatcher {
    pub fn new(channel: Arc<dyn NotificationChannel>, context: NotificationContext) -> Self {
        Self {
            channel,
            context,
            send_timeout: Duration::from_secs(5),
        }
    }

    /// Override the per-send limit (default: 5 seconds)
    pub fn with_send_timeout(mut self, send_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self
    }

    /// Message for `event`, or `None` for events that are not announced
    pub fn format_message(&self, event: &SweepEvent) -> Option<String> {
        let NotificationContext {
            keyword,
            region_label,
        } = &self.context;

        match event {
            SweepEvent::Started { total } => Some(format!(
                "🚀 [{}] '{}' sweep started! (targets: {} regions)",
                region_label, keyword, total
            )),
            SweepEvent::NewFinding { code, result_key } => Some(format!(
                "🔥 [{}] found!\nRegion code: {}\n👇 Link:\n{}",
                keyword, code, result_key
            )),
            SweepEvent::Completed { new_count } if *new_count > 0 => Some(format!(
                "🏁 [{}] '{}' sweep finished. {} new listings found",
                region_label, keyword, new_count
            )),
            SweepEvent::Completed { .. } => Some(format!(
                "🏁 [{}] '{}' sweep finished. (no new listings)",
                region_label, keyword
            )),
            SweepEvent::Aborted { reason } => Some(format!(
                "⏹️ [{}] '{}' sweep stopped ({})",
                region_label, keyword, reason
            )),
            SweepEvent::RegionChecked { .. } | SweepEvent::Progress { .. } => None,
        }
    }

    /// Send the message for `event`; failures are logged, never returned
    pub async fn on_event(&self, event: &SweepEvent) {
        let Some(message) = self.format_message(event) else {
            return;
        };

        match timeout(self.send_timeout, self.channel.send(&message)).await {
            Ok(Ok(())) => debug!("Notification sent: {}", message),
            Ok(Err(e)) => error!("Failed to send notification: {}", e),
            Err(_) => error!(
                "Failed to send notification: {}",
                NotificationError::Timeout(self.send_timeout)
            ),
        }
    }

    /// Consume `events` on a background task until the bus goes away
    pub fn spawn(self, mut events: UnboundedReceiver<SweepEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                self.on_event(&event).await;
            }
            info!("Notifier stopped: event stream closed");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SweepEventBus;
    use crate::sweep_types::{RegionCode, Verdict};
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingChannel {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl NotificationChannel for RecordingChannel {
        async fn send(&self, message: &str) -> Result<(), NotificationError> {
            self.sent.lock().await.push(message.to_string());
            Ok(())
        }
    }

    struct FailingChannel;

    #[async_trait::async_trait]
    impl NotificationChannel for FailingChannel {
        async fn send(&self, _message: &str) -> Result<(), NotificationError> {
            Err(NotificationError::Rejected("chat not found".to_string()))
        }
    }

    struct SlowChannel;

    #[async_trait::async_trait]
    impl NotificationChannel for SlowChannel {
        async fn send(&self, _message: &str) -> Result<(), NotificationError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }
    }

    fn context() -> NotificationContext {
        NotificationContext {
            keyword: "아이폰".to_string(),
            region_label: "서울특별시".to_string(),
        }
    }

    #[test]
    fn test_message_formats() {
        let dispatcher = NotifierDispatcher::new(Arc::new(RecordingChannel::default()), context());

        assert_eq!(
            dispatcher.format_message(&SweepEvent::Started { total: 25 }),
            Some("🚀 [서울특별시] '아이폰' sweep started! (targets: 25 regions)".to_string())
        );

        let finding = dispatcher
            .format_message(&SweepEvent::NewFinding {
                code: RegionCode::new("366"),
                result_key: "https://example.test/?in=366".to_string(),
            })
            .unwrap();
        assert!(finding.contains("[아이폰]"));
        assert!(finding.contains("366"));
        assert!(finding.ends_with("https://example.test/?in=366"));

        let none = dispatcher
            .format_message(&SweepEvent::Completed { new_count: 0 })
            .unwrap();
        assert!(none.contains("(no new listings)"));

        let some = dispatcher
            .format_message(&SweepEvent::Completed { new_count: 3 })
            .unwrap();
        assert!(some.contains("3 new listings"));

        assert!(
            dispatcher
                .format_message(&SweepEvent::Progress { done: 1, total: 2 })
                .is_none()
        );
        assert!(
            dispatcher
                .format_message(&SweepEvent::RegionChecked {
                    code: RegionCode::new("1"),
                    verdict: Verdict::None,
                })
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_spawned_dispatcher_forwards_announced_events() {
        let channel = Arc::new(RecordingChannel::default());
        let bus = SweepEventBus::new();
        let dispatcher = NotifierDispatcher::new(channel.clone(), context());
        let handle = dispatcher.spawn(bus.subscribe());

        bus.emit(SweepEvent::Started { total: 1 });
        bus.emit(SweepEvent::Progress { done: 1, total: 1 });
        bus.emit(SweepEvent::Aborted {
            reason: "user-cancelled".to_string(),
        });
        drop(bus);
        handle.await.unwrap();

        let sent = channel.sent.lock().await;
        assert_eq!(sent.len(), 2);
        assert!(sent[1].contains("user-cancelled"));
    }

    #[tokio::test]
    async fn test_failures_and_timeouts_are_swallowed() {
        let failing = NotifierDispatcher::new(Arc::new(FailingChannel), context());
        failing.on_event(&SweepEvent::Started { total: 1 }).await;

        let slow = NotifierDispatcher::new(Arc::new(SlowChannel), context())
            .with_send_timeout(Duration::from_millis(10));
        let started = std::time::Instant::now();
        slow.on_event(&SweepEvent::Started { total: 1 }).await;

        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
