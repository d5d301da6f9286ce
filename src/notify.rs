//! Out-of-band notifications dispatched as background tasks.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::config::NotificationConfig;
use crate::resilience::backoff::Backoff;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    MovieCreated { id: i64, title: String },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::MovieCreated { .. } => "movie_created",
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification transport failed: {0}")]
    Transport(String),

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

/// Delivery channel for notifications.
pub trait Notifier: Send + Sync + 'static {
    fn send<'a>(&'a self, notification: &'a Notification) -> BoxFuture<'a, Result<(), NotifyError>>;
}

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send<'a>(&'a self, notification: &'a Notification) -> BoxFuture<'a, Result<(), NotifyError>> {
        Box::pin(async move {
            match notification {
                Notification::MovieCreated { id, title } => {
                    tracing::info!(kind = notification.kind(), id, title = %title, "Notification sent");
                }
            }
            Ok(())
        })
    }
}

/// Send `notification`, retrying with backoff up to `max_attempts` times.
pub async fn deliver(
    notifier: Arc<dyn Notifier>,
    notification: Notification,
    config: NotificationConfig,
) -> Result<(), NotifyError> {
    let backoff = Backoff::from_config(&config);
    let attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match notifier.send(&notification).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt >= attempts => {
                return Err(NotifyError::Exhausted {
                    attempts,
                    last: e.to_string(),
                });
            }
            Err(e) => {
                let delay = backoff.delay(attempt);
                tracing::warn!(
                    kind = notification.kind(),
                    attempt,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "Notification failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
