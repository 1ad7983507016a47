use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::watch;

use crate::api::{Deliver, DeliveryError};
use crate::db;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainOutcome {
    /// Nothing was queued.
    Empty,
    /// Every record read at the start of the pass was delivered.
    Completed,
    /// A delivery failed; later records were not attempted.
    Stopped,
    /// Shutdown was requested between two records.
    Cancelled,
    /// Another pass was already running in this context.
    Busy,
    /// No session token, nothing was attempted. Records are never sent
    /// unauthenticated.
    NoToken,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub outcome: DrainOutcome,
    pub attempted: usize,
    pub delivered: usize,
    pub remaining: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The collaborator refused the token (401/403). The context owning the
    /// session should drop it.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub unauthorized: bool,
    pub finished_at: DateTime<Utc>,
}

impl DrainReport {
    /// A pass that attempted nothing.
    pub fn idle(outcome: DrainOutcome, remaining: usize) -> Self {
        Self {
            outcome,
            attempted: 0,
            delivered: 0,
            remaining,
            error: None,
            unauthorized: false,
            finished_at: Utc::now(),
        }
    }

    /// True when the queue was left empty by this pass.
    pub fn is_clean(&self) -> bool {
        self.remaining == 0 && matches!(self.outcome, DrainOutcome::Empty | DrainOutcome::Completed)
    }
}

/// Delivers queued records through the collaborator, oldest first.
///
/// One `Drainer` per execution context: the busy guard keeps a second pass
/// in the same context from starting while one is in flight. Passes from
/// different contexts may overlap; deletes are delete-if-exists so the store
/// stays consistent.
pub struct Drainer {
    pool: SqlitePool,
    api: Arc<dyn Deliver>,
    context: &'static str,
    busy: tokio::sync::Mutex<()>,
    last: Mutex<Option<DrainReport>>,
}

impl Drainer {
    pub fn new(pool: SqlitePool, api: Arc<dyn Deliver>, context: &'static str) -> Self {
        Self {
            pool,
            api,
            context,
            busy: tokio::sync::Mutex::new(()),
            last: Mutex::new(None),
        }
    }

    pub async fn has_pending(&self) -> Result<bool, sqlx::Error> {
        Ok(db::outbox::count(&self.pool).await? > 0)
    }

    pub fn last_report(&self) -> Option<DrainReport> {
        self.last
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Run one drain pass.
    ///
    /// Without a `token` nothing is sent and the pass reports `NoToken`.
    /// `cancel` is checked between records; a pass abandoned that way leaves
    /// every undelivered record in place.
    pub async fn drain(
        &self,
        token: Option<&str>,
        cancel: Option<&watch::Receiver<bool>>,
    ) -> Result<DrainReport, sqlx::Error> {
        let Ok(_guard) = self.busy.try_lock() else {
            tracing::debug!("[{}] drain already in progress, skipping", self.context);
            return Ok(DrainReport::idle(DrainOutcome::Busy, 0));
        };

        let records = db::outbox::list_pending(&self.pool).await?;
        if records.is_empty() {
            return Ok(self.finish(DrainReport::idle(DrainOutcome::Empty, 0)));
        }

        let total = records.len();

        let Some(token) = token else {
            tracing::warn!(
                "[{}] no session token, leaving {total} record(s) queued",
                self.context
            );
            return Ok(self.finish(DrainReport::idle(DrainOutcome::NoToken, total)));
        };

        tracing::info!("[{}] draining {total} queued record(s)", self.context);

        let mut outcome = DrainOutcome::Completed;
        let mut attempted = 0;
        let mut delivered = 0;
        let mut error = None;
        let mut unauthorized = false;

        for record in &records {
            if cancel.is_some_and(|c| *c.borrow()) {
                tracing::info!("[{}] drain cancelled", self.context);
                outcome = DrainOutcome::Cancelled;
                break;
            }

            attempted += 1;
            let result = match record.to_downtime() {
                Ok(downtime) => self.api.deliver(&downtime, Some(token)).await,
                Err(e) => Err(DeliveryError::Encoding(e)),
            };

            if let Err(e) = result {
                tracing::warn!(
                    "[{}] delivery of {} failed, {} record(s) left for the next pass (permanent={}): {e}",
                    self.context,
                    record.id,
                    total - delivered,
                    e.is_permanent()
                );
                outcome = DrainOutcome::Stopped;
                unauthorized = e.is_unauthorized();
                error = Some(e.to_string());
                break;
            }

            match db::outbox::delete(&self.pool, record.id).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(
                        "[{}] record {} was already removed by another pass",
                        self.context,
                        record.id
                    );
                }
                Err(e) => {
                    tracing::error!(
                        "[{}] record {} delivered but could not be removed: {e}",
                        self.context,
                        record.id
                    );
                    outcome = DrainOutcome::Stopped;
                    error = Some(e.to_string());
                    break;
                }
            }

            delivered += 1;
            tracing::debug!("[{}] delivered queued record {}", self.context, record.id);
        }

        let report = DrainReport {
            outcome,
            attempted,
            delivered,
            remaining: total - delivered,
            error,
            unauthorized,
            finished_at: Utc::now(),
        };

        tracing::info!(
            "[{}] drain finished: {:?}, delivered {}, remaining {}",
            self.context,
            report.outcome,
            report.delivered,
            report.remaining
        );

        Ok(self.finish(report))
    }

    fn finish(&self, report: DrainReport) -> DrainReport {
        *self
            .last
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(report.clone());
        report
    }
}
