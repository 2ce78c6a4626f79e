//! NATS-backed notification sink.
//!
//! [`NatsNotifier`] implements [`Notifier`] by publishing JSON-encoded
//! [`Notification`]s. Publishing happens on spawned tasks so the
//! coordinator never waits on the network; a failed publish is logged and
//! forgotten.
//!
//! # Subject Convention
//!
//! - **Town written:** `stronghold.towns.{town_id}`
//! - **Report written:** `stronghold.reports.{town_id}`, once for the
//!   attacking town and once for the defending town

use stronghold_core::{Notification, Notifier};
use stronghold_types::{EventTag, Report, Town, TownId};
use tracing::warn;

use crate::error::EngineError;

/// Publishes post-commit notifications to NATS.
pub struct NatsNotifier {
    client: async_nats::Client,
}

impl NatsNotifier {
    /// Wrap an already connected client.
    pub const fn new(client: async_nats::Client) -> Self {
        Self { client }
    }

    /// Connect to a NATS server.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Nats`] if the connection fails.
    pub async fn connect(url: &str) -> Result<Self, EngineError> {
        let client = async_nats::connect(url).await.map_err(|e| EngineError::Nats {
            message: format!("failed to connect to NATS at {url}: {e}"),
        })?;
        Ok(Self::new(client))
    }

    /// The underlying client, for subscriptions sharing the connection.
    pub const fn client(&self) -> &async_nats::Client {
        &self.client
    }

    fn publish(&self, subjects: Vec<String>, notification: &Notification) {
        let payload = match serde_json::to_vec(notification) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "failed to serialize notification");
                return;
            }
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("no tokio runtime, notification dropped");
            return;
        };
        let client = self.client.clone();
        handle.spawn(async move {
            for subject in subjects {
                if let Err(e) = client.publish(subject.clone(), payload.clone().into()).await {
                    warn!(subject = subject, error = %e, "failed to publish notification");
                }
            }
        });
    }
}

impl Notifier for NatsNotifier {
    fn town_updated(&self, town: &Town, tag: EventTag) {
        self.publish(
            vec![town_subject(town.id)],
            &Notification::TownUpdated {
                town: Box::new(town.clone()),
                tag,
            },
        );
    }

    fn report_created(&self, report: &Report) {
        self.publish(
            report_subjects(report),
            &Notification::ReportCreated {
                report: Box::new(report.clone()),
            },
        );
    }
}

/// Subject for updates of one town.
pub fn town_subject(town_id: TownId) -> String {
    format!("stronghold.towns.{town_id}")
}

/// Subjects a report is published on.
pub fn report_subjects(report: &Report) -> Vec<String> {
    let mut subjects = vec![format!("stronghold.reports.{}", report.origin_town_id)];
    if report.destination_town_id != report.origin_town_id {
        subjects.push(format!("stronghold.reports.{}", report.destination_town_id));
    }
    subjects
}
