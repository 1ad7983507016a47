use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// Reported network availability, shared by every context in the process.
#[derive(Debug, Clone)]
pub struct Connectivity {
    tx: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Record the current state. Returns true on a transition.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });

        if changed {
            if online {
                tracing::info!("Back online");
            } else {
                tracing::warn!("Gone offline, submissions will be queued");
            }
        }
        changed
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Poll `url` and publish the result. Any HTTP response counts as online,
/// only transport errors count as offline.
pub async fn probe_loop(
    connectivity: Connectivity,
    url: String,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let timeout = interval.clamp(Duration::from_millis(500), Duration::from_secs(5));
    let client = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("Connectivity probe disabled: {e}");
            return;
        }
    };

    tracing::debug!("Connectivity probe started ({url}, every {interval:?})");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let online = match client.get(&url).send().await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("Connectivity probe failed: {e}");
                false
            }
        };
        connectivity.set_online(online);

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            res = shutdown.changed() => {
                if res.is_err() {
                    break;
                }
            }
        }
    }

    tracing::debug!("Connectivity probe stopped");
}
