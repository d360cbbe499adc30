//! Expressr event bus and notification infrastructure.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`PlatformEvent`]: the job lifecycle event envelope.
//! - [`NotificationService`]: background subscriber turning lifecycle
//!   events into best-effort emails.
//! - [`delivery`]: the SMTP [`Mailer`](expressr_core::providers::Mailer).

pub mod bus;
pub mod delivery;
pub mod notifications;
pub mod templates;

pub use bus::{event_types, EventBus, PlatformEvent};
pub use delivery::email::{EmailConfig, SmtpMailer};
pub use notifications::NotificationService;
