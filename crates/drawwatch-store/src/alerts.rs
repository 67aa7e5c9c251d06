use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use drawwatch_core::{Alert, AlertType, Severity};

use crate::{AlertStore, within};

/// Fire-and-forget alert creation.
///
/// [`raise`](Self::raise) never fails: persistence problems are logged and
/// swallowed so a broken alert table cannot take a scrape cycle down with
/// it. An alert is skipped when an active alert with the same type and
/// message already exists.
#[derive(Clone)]
pub struct AlertSink {
    store: Arc<dyn AlertStore>,
    timeout: Duration,
}

impl AlertSink {
    pub fn new(store: Arc<dyn AlertStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Returns the id of the stored alert, or of the active duplicate that
    /// suppressed it. `None` when nothing could be stored.
    pub async fn raise(
        &self,
        kind: AlertType,
        message: impl Into<String>,
        metadata: serde_json::Value,
        severity: Severity,
    ) -> Option<i64> {
        let message = message.into();

        match within(self.timeout, self.store.find_active(kind, &message)).await {
            Ok(Some(existing)) => {
                info!(
                    kind = %kind,
                    id = ?existing.id,
                    message = %message,
                    "alert already active"
                );
                return existing.id;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(kind = %kind, error = %e, "could not check for duplicate alert");
            }
        }

        let alert = Alert::new(kind, severity, message, metadata);
        match within(self.timeout, self.store.insert_alert(&alert)).await {
            Ok(id) => {
                warn!(
                    id,
                    kind = %kind,
                    severity = %severity,
                    message = %alert.message,
                    "alert raised"
                );
                Some(id)
            }
            Err(e) => {
                error!(
                    kind = %kind,
                    severity = %severity,
                    message = %alert.message,
                    error = %e,
                    "failed to persist alert"
                );
                None
            }
        }
    }
}
