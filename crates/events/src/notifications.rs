//! Lifecycle email notifications.
//!
//! [`NotificationService`] subscribes to the [`EventBus`](crate::EventBus)
//! and sends one email per relevant event. Delivery is best-effort: a
//! failed send is logged and never affects the pipeline.

use std::sync::Arc;

use expressr_core::job::OutputItem;
use expressr_core::providers::Mailer;
use tokio::sync::broadcast;

use crate::bus::{event_types, PlatformEvent};
use crate::templates::{self, Email};

pub struct NotificationService {
    mailer: Arc<dyn Mailer>,
    app_url: String,
    price_label: String,
}

impl NotificationService {
    pub fn new(mailer: Arc<dyn Mailer>, app_url: impl Into<String>, price_cents: i64) -> Self {
        Self {
            mailer,
            app_url: app_url.into(),
            price_label: format!("${}.{:02}", price_cents / 100, price_cents % 100),
        }
    }

    /// Run the notification loop until the bus is dropped.
    pub async fn run(self, mut receiver: broadcast::Receiver<PlatformEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => self.handle(&event).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Notification service lagged, some emails were not sent");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, notification service shutting down");
                    break;
                }
            }
        }
    }

    /// Send the email for one event, if it warrants one.
    pub async fn handle(&self, event: &PlatformEvent) {
        let (Some(to), Some(email)) = (event.submitter.as_deref(), self.render(event)) else {
            return;
        };
        if let Err(e) = self.mailer.send(to, &email.subject, &email.html).await {
            tracing::warn!(
                error = %e,
                event_type = %event.event_type,
                job_id = ?event.job_id,
                "Failed to send notification email"
            );
        }
    }

    fn render(&self, event: &PlatformEvent) -> Option<Email> {
        let job_id = event.job_id?;
        match event.event_type.as_str() {
            event_types::FREE_PACK_READY => Some(templates::free_pack_ready(
                &self.app_url,
                job_id,
                &payload_items(event),
                &self.price_label,
            )),
            event_types::PAYMENT_RECEIVED => {
                Some(templates::payment_received(&self.app_url, job_id))
            }
            event_types::FULL_PACK_READY => Some(templates::full_pack_ready(
                &self.app_url,
                job_id,
                &payload_items(event),
            )),
            event_types::TRAINING_FAILED => Some(templates::training_failed(&self.app_url)),
            _ => None,
        }
    }
}

fn payload_items(event: &PlatformEvent) -> Vec<OutputItem> {
    event
        .payload
        .get("items")
        .cloned()
        .and_then(|items| serde_json::from_value(items).ok())
        .unwrap_or_default()
}
