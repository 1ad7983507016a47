pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod outbox;
pub mod routes;
pub mod session;
pub mod state;
pub mod submission;
pub mod sync;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, HeaderValue};
use sqlx::SqlitePool;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::api::Deliver;
use crate::config::Config;
use crate::outbox::Drainer;
use crate::session::Session;
use crate::state::{AppState, SharedState};
use crate::sync::{BackgroundSync, Connectivity, NetworkTrigger, PageConnection, TokenBridge};

/// A fully wired agent: the foreground router plus the tasks running
/// alongside it. Dropping it detaches the foreground page from the bridge.
pub struct App {
    pub router: Router,
    pub state: SharedState,
    pub tasks: Vec<JoinHandle<()>>,
    _page: PageConnection,
}

impl App {
    /// Wait for every background task to stop. Call after flipping the
    /// shutdown channel.
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!("Background task ended abnormally: {e}");
            }
        }
    }
}

pub fn build_app(
    pool: SqlitePool,
    config: Config,
    api: Arc<dyn Deliver>,
    shutdown: watch::Receiver<bool>,
) -> App {
    let session = Session::new(config.initial_token.clone());
    let connectivity = Connectivity::new(true);
    let bridge = Arc::new(TokenBridge::new(config.token_timeout));
    let page = bridge.connect_page(session.clone());

    let drainer = Arc::new(Drainer::new(pool.clone(), Arc::clone(&api), "foreground"));

    let background = BackgroundSync::new(
        pool.clone(),
        Arc::clone(&api),
        Arc::clone(&bridge),
        connectivity.clone(),
        config.background.clone(),
    )
    .spawn(shutdown.clone());

    let trigger = NetworkTrigger::new(
        Arc::clone(&drainer),
        session.clone(),
        connectivity.clone(),
        config.sync_interval,
    );

    let mut tasks = vec![background.task, tokio::spawn(trigger.run(shutdown.clone()))];

    if let Some(probe) = &config.probe {
        tasks.push(tokio::spawn(sync::connectivity::probe_loop(
            connectivity.clone(),
            probe.url.clone(),
            probe.interval,
            shutdown.clone(),
        )));
    }

    let max_body_size = config.max_body_size;

    let state: SharedState = Arc::new(AppState {
        pool,
        config,
        api,
        session,
        connectivity,
        drainer,
        sync: background.registrar,
        sync_state: background.state,
        bridge,
    });

    let router = Router::new()
        .merge(routes::api_routes())
        .route("/health", axum::routing::get(health))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body_size))
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        ))
        .with_state(Arc::clone(&state));

    App {
        router,
        state,
        tasks,
        _page: page,
    }
}

async fn health() -> &'static str {
    "ok"
}
