use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use super::messages::{ClientMessage, DelegateMessage, QueueReply};
use super::{Connectivity, TokenBridge};
use crate::api::Deliver;
use crate::config::BackgroundConfig;
use crate::outbox::{DrainReport, Drainer, writer};

/// Lifecycle of the background delegate.
///
/// - Idle -> Registered: a registration for the sync tag was accepted
/// - Registered -> Executing: the grant delay passed while online
/// - Executing -> Idle: the pass ended, whatever happened to each record
///
/// A pass that leaves records behind re-registers with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Idle,
    Registered,
    Executing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// The delegate is not running.
    Unavailable,
}

impl std::fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistrationError::Unavailable => write!(f, "background sync is not available"),
        }
    }
}

impl std::error::Error for RegistrationError {}

/// Foreground handle for talking to the delegate.
#[derive(Debug, Clone)]
pub struct SyncRegistrar {
    tag: String,
    tx: mpsc::UnboundedSender<DelegateMessage>,
}

impl SyncRegistrar {
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Request a deferred drain under the configured tag.
    pub fn register(&self) -> Result<(), RegistrationError> {
        self.register_tag(&self.tag)
    }

    pub fn register_tag(&self, tag: &str) -> Result<(), RegistrationError> {
        self.tx
            .send(DelegateMessage::Register {
                tag: tag.to_string(),
            })
            .map_err(|_| RegistrationError::Unavailable)
    }

    /// Fire and forget.
    pub fn post_message(&self, message: ClientMessage) -> Result<(), RegistrationError> {
        self.tx
            .send(DelegateMessage::Client {
                message,
                reply: None,
            })
            .map_err(|_| RegistrationError::Unavailable)
    }

    /// Post a message and get told how the delegate's store write went.
    /// The receiver resolves to the new record id, or errors if the delegate
    /// stopped before handling the message.
    pub fn post_message_with_reply(
        &self,
        message: ClientMessage,
    ) -> Result<oneshot::Receiver<Result<Uuid, sqlx::Error>>, RegistrationError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(DelegateMessage::Client {
                message,
                reply: Some(reply),
            })
            .map_err(|_| RegistrationError::Unavailable)?;
        Ok(rx)
    }

    pub fn is_available(&self) -> bool {
        !self.tx.is_closed()
    }
}

pub struct BackgroundHandle {
    pub registrar: SyncRegistrar,
    pub state: watch::Receiver<SyncState>,
    pub task: JoinHandle<()>,
}

/// Drains the outbox from its own task, independent of the foreground.
pub struct BackgroundSync {
    pool: SqlitePool,
    drainer: Drainer,
    bridge: Arc<TokenBridge>,
    connectivity: Connectivity,
    config: BackgroundConfig,
}

impl BackgroundSync {
    pub fn new(
        pool: SqlitePool,
        api: Arc<dyn Deliver>,
        bridge: Arc<TokenBridge>,
        connectivity: Connectivity,
        config: BackgroundConfig,
    ) -> Self {
        Self {
            drainer: Drainer::new(pool.clone(), api, "background"),
            pool,
            bridge,
            connectivity,
            config,
        }
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> BackgroundHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SyncState::Idle);

        let registrar = SyncRegistrar {
            tag: self.config.tag.clone(),
            tx,
        };
        let task = tokio::spawn(self.run(rx, state_tx, shutdown));

        BackgroundHandle {
            registrar,
            state: state_rx,
            task,
        }
    }

    async fn run(
        self,
        mut inbox: mpsc::UnboundedReceiver<DelegateMessage>,
        state: watch::Sender<SyncState>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut online_rx = self.connectivity.subscribe();
        // Some(_) while Registered: when the platform may grant execution.
        let mut due: Option<Instant> = None;
        let mut failures: u32 = 0;

        tracing::info!("Background sync delegate started (tag={})", self.config.tag);

        loop {
            if *shutdown.borrow() {
                break;
            }

            let online = *online_rx.borrow_and_update();
            let grant_at = due.filter(|_| online);

            tokio::select! {
                res = shutdown.changed() => {
                    if res.is_err() {
                        break;
                    }
                }
                message = inbox.recv() => match message {
                    None => break,
                    Some(DelegateMessage::Register { tag }) => {
                        self.accept_registration(&tag, &mut due, &state);
                    }
                    Some(DelegateMessage::Client { message, reply }) => {
                        if self.handle_client(message, reply).await {
                            let tag = self.config.tag.clone();
                            self.accept_registration(&tag, &mut due, &state);
                        }
                    }
                },
                res = online_rx.changed() => {
                    if res.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep_until(grant_at.unwrap_or_else(Instant::now)), if grant_at.is_some() => {
                    due = None;
                    state.send_replace(SyncState::Executing);

                    let clean = self.execute(&shutdown).await;
                    state.send_replace(SyncState::Idle);

                    if clean {
                        failures = 0;
                    } else if !*shutdown.borrow() {
                        failures = failures.saturating_add(1);
                        let delay = self.backoff(failures);
                        tracing::info!("Records left behind, background sync re-registered in {delay:?}");
                        due = Some(Instant::now() + delay);
                        state.send_replace(SyncState::Registered);
                    }
                }
            }
        }

        state.send_replace(SyncState::Idle);
        tracing::info!("Background sync delegate stopped");
    }

    /// Returns true when something was queued and a sync is needed.
    async fn handle_client(&self, message: ClientMessage, reply: Option<QueueReply>) -> bool {
        match message {
            ClientMessage::QueueDowntime(submission) => {
                let result = writer::persist(&self.pool, submission).await.map(|r| r.id);
                let queued = result.is_ok();

                match reply {
                    Some(reply) => {
                        if reply.send(result).is_err() {
                            tracing::debug!("Queue requester went away before the reply");
                        }
                    }
                    None => {
                        if let Err(e) = result {
                            tracing::error!("Background delegate could not queue downtime: {e}");
                        }
                    }
                }
                queued
            }
        }
    }

    fn accept_registration(
        &self,
        tag: &str,
        due: &mut Option<Instant>,
        state: &watch::Sender<SyncState>,
    ) {
        if tag != self.config.tag {
            tracing::warn!("Ignoring sync registration for unknown tag {tag}");
            return;
        }
        if due.is_some() {
            tracing::debug!("Background sync already registered");
            return;
        }

        *due = Some(Instant::now() + self.config.grant_delay);
        state.send_replace(SyncState::Registered);
        tracing::debug!("Background sync registered (tag={tag})");
    }

    /// One granted execution, bounded by the configured window. Returns true
    /// when the queue was left empty.
    async fn execute(&self, shutdown: &watch::Receiver<bool>) -> bool {
        match tokio::time::timeout(self.config.window, self.flush(shutdown)).await {
            Ok(Ok(report)) => report.is_clean(),
            Ok(Err(e)) => {
                tracing::error!("Background sync could not read the store: {e}");
                false
            }
            Err(_) => {
                tracing::warn!(
                    "Background sync execution window of {:?} elapsed",
                    self.config.window
                );
                false
            }
        }
    }

    async fn flush(&self, shutdown: &watch::Receiver<bool>) -> Result<DrainReport, sqlx::Error> {
        // Only bother the pages when there is something to send.
        let token = if self.drainer.has_pending().await? {
            self.bridge.request_token().await
        } else {
            None
        };
        self.drainer.drain(token.as_deref(), Some(shutdown)).await
    }

    fn backoff(&self, failures: u32) -> Duration {
        let factor = 2_u32.saturating_pow(failures.min(16));
        self.config
            .grant_delay
            .max(Duration::from_millis(100))
            .saturating_mul(factor)
            .min(self.config.backoff_max)
    }
}
