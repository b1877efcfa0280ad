//! Delivery confirmation gate.
//!
//! History is written here and nowhere else: an alert is recorded only after
//! its [`Notifier`] reports success. A failed delivery leaves History
//! untouched, so the same item is offered again next cycle.

use std::io::Write;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::history::History;
use crate::models::{Alert, HistoryEntry};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("delivery failed for {url}: {message}")]
    Failed { url: String, message: String },
    #[error("could not encode alert: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Something that delivers alerts to people.
pub trait Notifier {
    async fn deliver(&self, alert: &Alert) -> Result<(), NotifyError>;
}

/// Counts from one delivery pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
    pub evicted: usize,
}

/// Deliver `alerts` in order, recording each confirmed one in `history`.
#[instrument(level = "info", skip_all, fields(alerts = alerts.len()))]
pub async fn deliver_alerts<N: Notifier>(
    alerts: &[Alert],
    notifier: &N,
    history: &mut History,
    now: DateTime<Utc>,
) -> DeliveryReport {
    let mut report = DeliveryReport::default();
    for alert in alerts {
        match notifier.deliver(alert).await {
            Ok(()) => {
                report.delivered += 1;
                if history.record(HistoryEntry::from_alert(alert, now)).is_some() {
                    report.evicted += 1;
                }
            }
            Err(e) => {
                warn!(url = %alert.item.canonical_url, error = %e, "Alert not delivered; History left unchanged");
                report.failed += 1;
            }
        }
    }
    info!(
        delivered = report.delivered,
        failed = report.failed,
        evicted = report.evicted,
        "Delivery pass finished"
    );
    report
}

/// Writes each alert as one JSON line.
#[derive(Debug)]
pub struct JsonLinesNotifier<W> {
    out: Mutex<W>,
}

impl<W: Write> JsonLinesNotifier<W> {
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }

    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write> Notifier for JsonLinesNotifier<W> {
    async fn deliver(&self, alert: &Alert) -> Result<(), NotifyError> {
        let line = serde_json::to_string(alert)?;
        let failed = |e: std::io::Error| NotifyError::Failed {
            url: alert.item.canonical_url.clone(),
            message: e.to_string(),
        };
        let mut out = self.out.lock().map_err(|_| NotifyError::Failed {
            url: alert.item.canonical_url.clone(),
            message: "output lock poisoned".into(),
        })?;
        writeln!(out, "{line}").map_err(failed)?;
        out.flush().map_err(failed)
    }
}
