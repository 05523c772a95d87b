use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use mochi_peers::{PeerDirectory, PeerPool, QuicListener};
use mochi_queue::{Queue, QueueStore};
use mochi_ratelimit::{rate_limit_layer, RateLimiter};
use mochi_registry::AppRegistry;
use mochi_scheduler::{ScheduleStore, Scheduler};
use mochi_store::{
    ensure_schema, DirectorySchema, PeersSchema, QueueSchema, ScheduleSchema, SettingsSchema,
    StoreManager, UsersSchema,
};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::entity_directory::EntityDirectory;
use crate::node_identity;
use crate::peer_accept;
use crate::queue_sender::PeerPoolSender;
use crate::schedule_dispatch::RegistryScheduleDispatcher;
use crate::tls;

struct AppState {
    stores: StoreManager,
}

/// Boots every subsystem described in spec §4: opens the six global
/// databases, wires the scheduler/queue workers to the app registry and
/// peer pool, spawns the janitor/worker background loops, and serves the
/// thin admin HTTP surface. Mirrors `cave-daemon::server::run`'s shape —
/// load config, build state, build router, bind, serve — scaled down to
/// the `/healthz`/`/metrics` surface this core actually owns; the feature
/// apps, web UI and CLI this process would otherwise expose REST routes
/// for are external collaborators per spec §1's non-goals.
pub async fn run() -> Result<()> {
    let config = Config::from_env()?;
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("failed to create data directory {}", config.data_dir.display()))?;
    info!(
        concurrency = config.runtime.concurrency,
        timeout_secs = config.runtime.timeout.as_secs(),
        url_rate_limit = config.url_rate_limit.limit,
        p2p_send_rate_limit = config.p2p_send_rate_limit.limit,
        "effective configuration loaded"
    );

    let stores = StoreManager::new();

    // Opened so its schema exists for whatever external app registers
    // users against it; this core never queries it directly.
    let _users = stores.open(&config.users_db()).await.context("opening users.db")?;
    ensure_schema(&_users, &UsersSchema).await.context("migrating users.db")?;

    let directory_store = stores
        .open(&config.directory_db())
        .await
        .context("opening directory.db")?;
    ensure_schema(&directory_store, &DirectorySchema)
        .await
        .context("migrating directory.db")?;

    let peers_store = stores.open(&config.peers_db()).await.context("opening peers.db")?;
    ensure_schema(&peers_store, &PeersSchema).await.context("migrating peers.db")?;

    let queue_store_raw = stores.open(&config.queue_db()).await.context("opening queue.db")?;
    ensure_schema(&queue_store_raw, &QueueSchema).await.context("migrating queue.db")?;

    let schedule_store_raw = stores
        .open(&config.schedule_db())
        .await
        .context("opening schedule.db")?;
    ensure_schema(&schedule_store_raw, &ScheduleSchema)
        .await
        .context("migrating schedule.db")?;

    let settings_store = stores
        .open(&config.settings_db())
        .await
        .context("opening settings.db")?;
    ensure_schema(&settings_store, &SettingsSchema)
        .await
        .context("migrating settings.db")?;

    let node_key = node_identity::load_or_generate(&settings_store).await?;
    info!(entity = %node_key.entity_id().to_hex(), "node identity ready");

    let registry = Arc::new(AppRegistry::new());

    let url_limiter = Arc::new(RateLimiter::new(config.url_rate_limit));
    let p2p_limiter = Arc::new(RateLimiter::new(config.p2p_send_rate_limit));
    let admin_limiter = Arc::new(RateLimiter::new(config.url_rate_limit));

    let entity_directory = Arc::new(EntityDirectory::new(directory_store));

    let peer_directory = PeerDirectory::new(peers_store);
    let client_transport = Arc::new(mochi_peers::QuicTransport::client(
        "0.0.0.0:0".parse().context("invalid QUIC bind address")?,
        tls::client_config(),
    )?);
    let peer_pool = Arc::new(PeerPool::new(peer_directory, client_transport));

    let peer_listener = QuicListener::bind(config.peer_listen_addr, tls::server_config()?)
        .with_context(|| format!("failed to bind peer listener on {}", config.peer_listen_addr))?;
    info!(addr = %config.peer_listen_addr, "peer surface listening");
    tokio::spawn(peer_accept::run(
        peer_listener,
        entity_directory,
        registry.clone(),
        node_key.clone(),
    ));

    let queue_store = QueueStore::new(queue_store_raw);
    let peer_sender = Arc::new(PeerPoolSender::new(peer_pool.clone(), node_key.clone()));
    let queue = Arc::new(Queue::new(queue_store, peer_sender));

    let schedule_store = ScheduleStore::new(schedule_store_raw);
    let dispatcher = Arc::new(RegistryScheduleDispatcher::new(registry.clone()));
    let scheduler = Arc::new(Scheduler::new(schedule_store, dispatcher));

    stores.clone().spawn_janitor();
    url_limiter.clone().spawn_cleanup_task();
    p2p_limiter.clone().spawn_cleanup_task();
    admin_limiter.clone().spawn_cleanup_task();
    tokio::spawn(async move { scheduler.run().await });
    tokio::spawn(async move { queue.run().await });

    // `p2p_limiter` has no caller within this process yet (it gates the
    // host `p2p.send` builtin, invoked from whatever owns per-app
    // `CallEnv` assembly); held here so its cleanup task and the value
    // itself share the same lifetime as the rest of the wiring.
    let _p2p_limiter = p2p_limiter;

    let state = Arc::new(AppState { stores: stores.clone() });

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .layer(rate_limit_layer(admin_limiter))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind admin listener on {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, "admin surface listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("admin server exited")?;

    Ok(())
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let open_stores = state.stores.open_count();
    (
        StatusCode::OK,
        format!("# HELP mochi_daemon_up Process liveness\nmochi_daemon_up 1\nmochi_store_handles_open {open_stores}\n"),
    )
}
