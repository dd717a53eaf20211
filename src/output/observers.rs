use crate::output::traits::{LogLevel, SessionEvent, SessionObserver, SessionSnapshot};
use crate::state::CrawlSession;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Writes session events to the tracing subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl SessionObserver for TracingObserver {
    fn notify(&self, event: &SessionEvent) {
        match event {
            SessionEvent::Progress(snapshot) => {
                let total = snapshot
                    .total_pages
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "?".to_string());
                tracing::info!(
                    "[{}] page {}/{}: {} collected ({} duplicates, {} stale)",
                    snapshot.target_id,
                    snapshot.current_page,
                    total,
                    snapshot.collected_count,
                    snapshot.duplicates_dropped,
                    snapshot.stale_dropped
                );
            }
            SessionEvent::Log { text, level } => match level {
                LogLevel::Info => tracing::info!("{}", text),
                LogLevel::Warn => tracing::warn!("{}", text),
                LogLevel::Error => tracing::error!("{}", text),
            },
            SessionEvent::Complete(snapshot) => {
                tracing::info!(
                    "[{}] session {} with {} records",
                    snapshot.target_id,
                    snapshot.status,
                    snapshot.collected_count
                );
            }
        }
    }
}

/// Forwards session events to any number of channel receivers
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: broadcast::Sender<SessionEvent>,
}

impl ChannelObserver {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }
}

impl SessionObserver for ChannelObserver {
    fn notify(&self, event: &SessionEvent) {
        // No receivers is fine
        let _ = self.sender.send(event.clone());
    }
}

/// Fan-out over all registered observers
#[derive(Clone, Default)]
pub struct ObserverSet {
    observers: Vec<Arc<dyn SessionObserver>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn progress(&self, session: &CrawlSession) {
        self.publish(&SessionEvent::Progress(SessionSnapshot::from(session)));
    }

    pub fn log(&self, text: impl Into<String>, level: LogLevel) {
        self.publish(&SessionEvent::Log {
            text: text.into(),
            level,
        });
    }

    pub fn complete(&self, session: &CrawlSession) {
        self.publish(&SessionEvent::Complete(SessionSnapshot::from(session)));
    }

    fn publish(&self, event: &SessionEvent) {
        for observer in &self.observers {
            observer.notify(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{CrawlMode, SessionStatus};

    #[tokio::test]
    async fn test_channel_observer_delivers_in_order() {
        let channel = ChannelObserver::new(16);
        let mut receiver = channel.subscribe();
        let observers = ObserverSet::new()
            .with(Arc::new(TracingObserver))
            .with(Arc::new(channel));

        let session = CrawlSession::new("B00TEST123", "shop", CrawlMode::Fetch);
        observers.progress(&session);
        observers.log("blocked", LogLevel::Warn);
        observers.complete(&session);

        match receiver.recv().await.unwrap() {
            SessionEvent::Progress(snapshot) => {
                assert_eq!(snapshot.target_id, "B00TEST123");
                assert_eq!(snapshot.status, SessionStatus::Idle);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(
            receiver.recv().await.unwrap(),
            SessionEvent::Log {
                text: "blocked".to_string(),
                level: LogLevel::Warn,
            }
        );
        assert!(matches!(
            receiver.recv().await.unwrap(),
            SessionEvent::Complete(_)
        ));
    }

    #[test]
    fn test_channel_observer_without_receivers() {
        let channel = ChannelObserver::new(1);
        channel.notify(&SessionEvent::Log {
            text: "nobody listens".to_string(),
            level: LogLevel::Info,
        });
    }
}
