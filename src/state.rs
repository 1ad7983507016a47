use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::sync::watch;

use crate::api::Deliver;
use crate::config::Config;
use crate::outbox::Drainer;
use crate::session::Session;
use crate::sync::{Connectivity, SyncRegistrar, SyncState, TokenBridge};

pub type SharedState = Arc<AppState>;

/// Foreground context state.
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Config,
    pub api: Arc<dyn Deliver>,
    pub session: Session,
    pub connectivity: Connectivity,
    pub drainer: Arc<Drainer>,
    pub sync: SyncRegistrar,
    pub sync_state: watch::Receiver<SyncState>,
    pub bridge: Arc<TokenBridge>,
}
