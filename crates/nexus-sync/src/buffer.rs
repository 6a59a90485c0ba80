use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use nexus_api::types::{Pulse, PulseStatus};

/// A toast-style notification derived from a significant pulse.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub read: bool,
    pub at: DateTime<Utc>,
}

/// Bounded, newest-first store of live agent pulses and the notifications
/// derived from them.
///
/// Both stores are capped independently; pushing past capacity evicts the
/// oldest entry. Ordering is insertion order, newest first — the pulse
/// timestamp string is display data and is never parsed or sorted on.
#[derive(Debug, Clone)]
pub struct EventBuffer {
    pulses: VecDeque<Pulse>,
    notifications: VecDeque<Notification>,
    event_capacity: usize,
    notification_capacity: usize,
}

impl Default for EventBuffer {
    fn default() -> Self {
        Self::with_capacity(100, 20)
    }
}

impl EventBuffer {
    pub fn with_capacity(event_capacity: usize, notification_capacity: usize) -> Self {
        Self {
            pulses: VecDeque::with_capacity(event_capacity),
            notifications: VecDeque::with_capacity(notification_capacity),
            event_capacity,
            notification_capacity,
        }
    }

    /// Record one pulse, evicting the oldest past capacity. Terminal
    /// pulses (completed or error) also produce a notification.
    pub fn push(&mut self, pulse: Pulse) {
        if matches!(pulse.status, PulseStatus::Completed | PulseStatus::Error) {
            self.notifications.push_front(Notification {
                title: format!("{}: {}", pulse.agent, pulse.action),
                message: pulse.target.clone(),
                read: false,
                at: Utc::now(),
            });
            self.notifications.truncate(self.notification_capacity);
        }
        self.pulses.push_front(pulse);
        self.pulses.truncate(self.event_capacity);
    }

    /// Retained pulses, newest first.
    pub fn pulses(&self) -> impl Iterator<Item = &Pulse> {
        self.pulses.iter()
    }

    /// Non-destructive filtered view, newest first.
    pub fn filter<P>(&self, mut pred: P) -> Vec<&Pulse>
    where
        P: FnMut(&Pulse) -> bool,
    {
        self.pulses.iter().filter(|p| pred(p)).collect()
    }

    pub fn len(&self) -> usize {
        self.pulses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pulses.is_empty()
    }

    /// Discard all pulses. Notifications are managed separately and
    /// survive a feed clear.
    pub fn clear(&mut self) {
        self.pulses.clear();
    }

    pub fn notifications(&self) -> impl Iterator<Item = &Notification> {
        self.notifications.iter()
    }

    pub fn unread(&self) -> usize {
        self.notifications.iter().filter(|n| !n.read).count()
    }

    pub fn mark_all_read(&mut self) {
        for n in self.notifications.iter_mut() {
            n.read = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pulse(id: &str, status: PulseStatus) -> Pulse {
        Pulse {
            id: id.to_string(),
            timestamp: "10:42:07".to_string(),
            agent: "Scribe".to_string(),
            action: "drafted ticket".to_string(),
            source: "jira".to_string(),
            target: "PROJ-12".to_string(),
            status,
            details: None,
        }
    }

    #[test]
    fn eviction_drops_oldest_not_newest() {
        let mut buf = EventBuffer::with_capacity(100, 20);
        for i in 0..101 {
            buf.push(pulse(&format!("p-{i}"), PulseStatus::Processing));
        }
        assert_eq!(buf.len(), 100);
        let ids: Vec<&str> = buf.pulses().map(|p| p.id.as_str()).collect();
        assert_eq!(ids.first(), Some(&"p-100"));
        assert_eq!(ids.last(), Some(&"p-1"));
    }

    #[test]
    fn terminal_pulses_derive_notifications() {
        let mut buf = EventBuffer::default();
        buf.push(pulse("p-1", PulseStatus::Processing));
        buf.push(pulse("p-2", PulseStatus::Completed));
        buf.push(pulse("p-3", PulseStatus::Error));

        let titles: Vec<&str> = buf.notifications().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, vec!["Scribe: drafted ticket", "Scribe: drafted ticket"]);
        assert_eq!(
            buf.notifications().next().unwrap().message,
            "PROJ-12"
        );
        assert_eq!(buf.unread(), 2);
    }

    #[test]
    fn notification_store_has_its_own_cap() {
        let mut buf = EventBuffer::with_capacity(100, 20);
        for i in 0..25 {
            buf.push(pulse(&format!("p-{i}"), PulseStatus::Completed));
        }
        assert_eq!(buf.notifications().count(), 20);
        assert_eq!(buf.len(), 25);
    }

    #[test]
    fn clear_keeps_notifications() {
        let mut buf = EventBuffer::default();
        buf.push(pulse("p-1", PulseStatus::Completed));
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.notifications().count(), 1);
    }

    #[test]
    fn mark_all_read_zeroes_unread() {
        let mut buf = EventBuffer::default();
        buf.push(pulse("p-1", PulseStatus::Completed));
        buf.push(pulse("p-2", PulseStatus::Error));
        assert_eq!(buf.unread(), 2);
        buf.mark_all_read();
        assert_eq!(buf.unread(), 0);
    }

    #[test]
    fn filter_is_non_destructive() {
        let mut buf = EventBuffer::default();
        buf.push(pulse("p-1", PulseStatus::Processing));
        buf.push(pulse("p-2", PulseStatus::Error));
        let errors = buf.filter(|p| p.status == PulseStatus::Error);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].id, "p-2");
        assert_eq!(buf.len(), 2);
    }
}
