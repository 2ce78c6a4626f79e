//! Fire-and-forget notification sinks.
//!
//! After a successful commit the coordinator tells collaborators (socket
//! layer, leaderboard, map) what changed. Sinks must not block and cannot
//! fail the commit that preceded them.

use serde::Serialize;
use stronghold_types::{EventTag, Report, Town};
use tokio::sync::broadcast;

/// Receiver of post-commit notifications.
pub trait Notifier: Send + Sync {
    /// A town was written.
    fn town_updated(&self, town: &Town, tag: EventTag);

    /// A report was written.
    fn report_created(&self, report: &Report);
}

/// A notifier that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn town_updated(&self, _town: &Town, _tag: EventTag) {}

    fn report_created(&self, _report: &Report) {}
}

/// A notification as carried by [`BroadcastNotifier`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Notification {
    /// A town was written.
    TownUpdated {
        /// The town as committed.
        town: Box<Town>,
        /// Why it was written.
        tag: EventTag,
    },
    /// A report was written.
    ReportCreated {
        /// The new report.
        report: Box<Report>,
    },
}

/// Publishes notifications on a [`tokio::sync::broadcast`] channel.
///
/// Sends with no subscribers are dropped silently; lagging subscribers lose
/// the oldest messages.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<Notification>,
}

impl BroadcastNotifier {
    /// Create a channel holding at most `capacity` undelivered messages.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to future notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }
}

impl Notifier for BroadcastNotifier {
    fn town_updated(&self, town: &Town, tag: EventTag) {
        let _ = self.sender.send(Notification::TownUpdated {
            town: Box::new(town.clone()),
            tag,
        });
    }

    fn report_created(&self, report: &Report) {
        let _ = self.sender.send(Notification::ReportCreated {
            report: Box::new(report.clone()),
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::test_support::town;

    #[tokio::test]
    async fn subscribers_receive_town_updates() {
        let notifier = BroadcastNotifier::new(8);
        let mut rx = notifier.subscribe();
        let home = town("Larkspur");

        notifier.town_updated(&home, EventTag::QueueProcessed);

        match rx.recv().await.unwrap() {
            Notification::TownUpdated { town, tag } => {
                assert_eq!(town.id, home.id);
                assert_eq!(tag, EventTag::QueueProcessed);
            }
            other @ Notification::ReportCreated { .. } => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn sending_without_subscribers_is_fine() {
        let notifier = BroadcastNotifier::new(1);
        notifier.town_updated(&town("Larkspur"), EventTag::QueueProcessed);
        NoopNotifier.town_updated(&town("Larkspur"), EventTag::QueueProcessed);
    }
}
