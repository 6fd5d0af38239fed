//! Cross-component notifications
//!
//! Components never call each other to announce a change; they emit an
//! [`AppEvent`] on the shared [`EventBus`] and whoever subscribed re-renders.
//! Subscribers get their own channel, so one slow or dropped listener does
//! not affect the others.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::settings::Theme;

/// How long a notification stays on screen
pub const NOTIFICATION_TTL: Duration = Duration::from_secs(4);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub severity: Severity,
    pub message: String,
}

impl Notification {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    RecordCreated(String),
    RecordUpdated(String),
    RecordDeleted(String),
    RecordMoved { id: String, category: String },
    FavoriteToggled { id: String, favorite: bool },
    RecordSelected(String),
    RecordDeselected,
    CategorySelected(String),
    CategoryCreated(String),
    SearchPerformed { query: String, results: usize },
    ThemeChanged(Theme),
    /// Collections were replaced from the store (another instance, restore, import)
    DataReloaded,
    BackupCreated,
    Notify(Notification),
}

/// One-to-many broadcast of [`AppEvent`]s
///
/// Cloning a bus yields another handle onto the same subscriber list.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Sender<AppEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<AppEvent> {
        let (sender, receiver) = channel();
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(sender);
        receiver
    }

    pub fn emit(&self, event: AppEvent) {
        tracing::trace!(?event, "Event emitted");
        // Receivers that were dropped are pruned on the way
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|sender| sender.send(event.clone()).is_ok());
    }

    pub fn notify(&self, severity: Severity, message: impl Into<String>) {
        self.emit(AppEvent::Notify(Notification::new(severity, message)));
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

/// Short-lived, dismissible notifications waiting to be shown
#[derive(Debug, Default)]
pub struct NotificationQueue {
    items: Vec<(Notification, Instant)>,
}

impl NotificationQueue {
    pub fn push(&mut self, notification: Notification, now: Instant) {
        self.items.push((notification, now));
    }

    pub fn expire(&mut self, now: Instant) {
        self.items
            .retain(|(_, shown)| now.duration_since(*shown) < NOTIFICATION_TTL);
    }

    pub fn dismiss(&mut self) -> Option<Notification> {
        if self.items.is_empty() {
            None
        } else {
            Some(self.items.remove(0).0)
        }
    }

    pub fn current(&self) -> Option<&Notification> {
        self.items.last().map(|(n, _)| n)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_subscriber_gets_the_event() {
        let bus = EventBus::new();
        let first = bus.subscribe();
        let second = bus.clone().subscribe();

        bus.emit(AppEvent::RecordCreated("id-1".to_string()));

        assert_eq!(
            first.try_recv().unwrap(),
            AppEvent::RecordCreated("id-1".to_string())
        );
        assert_eq!(
            second.try_recv().unwrap(),
            AppEvent::RecordCreated("id-1".to_string())
        );
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        let kept = bus.subscribe();
        drop(bus.subscribe());
        assert_eq!(bus.subscriber_count(), 2);

        bus.notify(Severity::Info, "hello");
        assert_eq!(bus.subscriber_count(), 1);
        assert!(matches!(kept.try_recv().unwrap(), AppEvent::Notify(_)));
    }

    #[test]
    fn test_notification_queue_expiry() {
        let start = Instant::now();
        let mut queue = NotificationQueue::default();
        queue.push(Notification::new(Severity::Success, "saved"), start);
        queue.push(
            Notification::new(Severity::Error, "failed"),
            start + Duration::from_secs(3),
        );

        assert_eq!(queue.current().unwrap().message, "failed");
        queue.expire(start + Duration::from_secs(5));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.dismiss().unwrap().message, "failed");
        assert!(queue.is_empty());
    }
}
