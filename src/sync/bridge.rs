use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::messages::{TokenReply, WorkerMessage};
use crate::session::Session;

/// Lets a context without session access borrow the current token from any
/// open page.
///
/// A request is broadcast to every attached page; the first reply on the
/// private response channel wins and later ones are dropped. The wait is
/// bounded, and a timeout reads as "no token".
pub struct TokenBridge {
    pages: DashMap<Uuid, mpsc::Sender<WorkerMessage>>,
    timeout: Duration,
}

impl TokenBridge {
    pub fn new(timeout: Duration) -> Self {
        Self {
            pages: DashMap::new(),
            timeout,
        }
    }

    /// Attach a page that answers requests itself.
    pub fn attach(&self) -> (Uuid, mpsc::Receiver<WorkerMessage>) {
        let (tx, rx) = mpsc::channel(8);
        let id = Uuid::now_v7();
        self.pages.insert(id, tx);
        (id, rx)
    }

    pub fn detach(&self, id: Uuid) {
        self.pages.remove(&id);
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Attach a page backed by `session`. It answers until the returned
    /// connection is dropped.
    pub fn connect_page(self: &Arc<Self>, session: Session) -> PageConnection {
        let (id, mut rx) = self.attach();

        let task = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                match message {
                    WorkerMessage::RequestToken { reply } => {
                        let _ = reply
                            .send(TokenReply {
                                token: session.token(),
                            })
                            .await;
                    }
                }
            }
        });

        PageConnection {
            id,
            bridge: Arc::clone(self),
            task,
        }
    }

    pub async fn request_token(&self) -> Option<String> {
        let pages: Vec<(Uuid, mpsc::Sender<WorkerMessage>)> = self
            .pages
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        if pages.is_empty() {
            tracing::debug!("No open page to ask for a token");
            return None;
        }

        let (reply_tx, mut reply_rx) = mpsc::channel(pages.len());
        let mut asked = 0;
        for (id, page) in pages {
            match page.try_send(WorkerMessage::RequestToken {
                reply: reply_tx.clone(),
            }) {
                Ok(()) => asked += 1,
                Err(TrySendError::Closed(_)) => self.detach(id),
                Err(TrySendError::Full(_)) => {
                    tracing::debug!("Page {id} has a full inbox, not asking it");
                }
            }
        }
        drop(reply_tx);

        if asked == 0 {
            return None;
        }

        match tokio::time::timeout(self.timeout, reply_rx.recv()).await {
            Ok(Some(reply)) => reply.token,
            Ok(None) => {
                tracing::debug!("Every page declined the token request");
                None
            }
            Err(_) => {
                tracing::warn!("Token request timed out after {:?}", self.timeout);
                None
            }
        }
    }
}

/// An attached page answering from its session. Detaches on drop.
pub struct PageConnection {
    id: Uuid,
    bridge: Arc<TokenBridge>,
    task: JoinHandle<()>,
}

impl Drop for PageConnection {
    fn drop(&mut self) {
        self.bridge.detach(self.id);
        self.task.abort();
    }
}
