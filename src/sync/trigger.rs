use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

use super::Connectivity;
use crate::outbox::Drainer;
use crate::session::Session;

/// Foreground drain scheduling: once at startup if online, on every periodic
/// tick while online, and immediately on each offline → online transition.
pub struct NetworkTrigger {
    drainer: Arc<Drainer>,
    session: Session,
    connectivity: Connectivity,
    interval: Duration,
}

impl NetworkTrigger {
    pub fn new(
        drainer: Arc<Drainer>,
        session: Session,
        connectivity: Connectivity,
        interval: Duration,
    ) -> Self {
        Self {
            drainer,
            session,
            connectivity,
            interval,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut online_rx = self.connectivity.subscribe();
        let mut was_online = *online_rx.borrow_and_update();

        if was_online {
            self.drain("startup", &shutdown).await;
        }

        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                res = shutdown.changed() => {
                    if res.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if self.connectivity.is_online() {
                        self.drain("interval", &shutdown).await;
                    }
                }
                res = online_rx.changed() => {
                    if res.is_err() {
                        break;
                    }
                    let online = *online_rx.borrow_and_update();
                    if online && !was_online {
                        self.drain("reconnect", &shutdown).await;
                    }
                    was_online = online;
                }
            }
        }

        tracing::info!("Network trigger stopped");
    }

    async fn drain(&self, reason: &str, shutdown: &watch::Receiver<bool>) {
        let token = self.session.token();
        match self.drainer.drain(token.as_deref(), Some(shutdown)).await {
            Ok(report) => {
                tracing::debug!("Outbox drain ({reason}): {:?}", report.outcome);
                if report.unauthorized {
                    tracing::warn!("Session token rejected by the server, clearing it");
                    self.session.clear();
                }
            }
            Err(e) => tracing::error!("Outbox drain ({reason}) could not read the store: {e}"),
        }
    }
}
