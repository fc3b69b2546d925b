//! ---
//! eaf_section: "05-networking-external-interfaces"
//! eaf_subsection: "module"
//! eaf_type: "source"
//! eaf_scope: "code"
//! eaf_description: "Transport server builder, router and shutdown handle."
//! eaf_version: "v0.0.0-prealpha"
//! eaf_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::routing::{get, post};
use axum::Router;
use eaf_common::AppConfig;
use prometheus::Registry;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::metrics::TransportMetrics;
use crate::rest;
use crate::session::{SessionRegistry, SessionSettings};
use crate::websocket;

/// Shared state injected into the axum handlers.
pub(crate) struct ServerState {
    pub(crate) registry: Arc<SessionRegistry>,
    pub(crate) metrics: TransportMetrics,
    pub(crate) prometheus: Arc<Registry>,
    pub(crate) shutdown: watch::Receiver<bool>,
}

/// Builder for the transport server.
#[derive(Clone)]
pub struct TransportServerBuilder {
    listen: SocketAddr,
    settings: SessionSettings,
    expose_metrics: bool,
    prometheus: Arc<Registry>,
}

impl TransportServerBuilder {
    pub fn new(listen: SocketAddr, settings: SessionSettings) -> Self {
        Self {
            listen,
            settings,
            expose_metrics: true,
            prometheus: Arc::new(Registry::new()),
        }
    }

    /// Builder populated from the `[server]`, `[simulation]` and `[metrics]` sections.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.server.listen,
            SessionSettings::from_config(&config.server, &config.simulation),
        )
        .with_metrics(config.metrics.enabled)
    }

    pub fn listen(mut self, listen: SocketAddr) -> Self {
        self.listen = listen;
        self
    }

    /// Toggle the `/metrics` route.
    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.expose_metrics = enabled;
        self
    }

    /// Register transport metrics in an existing Prometheus registry.
    pub fn with_metrics_registry(mut self, registry: Arc<Registry>) -> Self {
        self.prometheus = registry;
        self
    }

    /// Bind, start serving and return a shutdown handle.
    pub async fn spawn(self) -> anyhow::Result<TransportServerHandle> {
        let metrics = TransportMetrics::register(&self.prometheus)?;
        let registry = Arc::new(SessionRegistry::new(self.settings.clone(), metrics.clone()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state = Arc::new(ServerState {
            registry: Arc::clone(&registry),
            metrics,
            prometheus: self.prometheus,
            shutdown: shutdown_rx.clone(),
        });

        let listener = TcpListener::bind(self.listen).await?;
        let local_addr = listener.local_addr()?;
        info!(address = %local_addr, "transport server listening");

        let mut router = Router::new()
            .route("/ws", get(websocket::upgrade_handler))
            .route("/healthz", get(rest::get_health))
            .route("/demo/scenarios", get(rest::get_catalog))
            .route("/demo/:session/status", get(rest::get_status))
            .route("/demo/:session/start", post(rest::post_start))
            .route("/demo/:session/stop", post(rest::post_stop))
            .route("/demo/:session/reset", post(rest::post_reset))
            .route(
                "/demo/:session/scenario",
                post(rest::post_scenario).delete(rest::delete_scenario),
            );
        if self.expose_metrics {
            router = router.route("/metrics", get(rest::get_metrics));
        }
        let app = router
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::clone(&state));

        let reaper = tokio::spawn(reap_idle_sessions(
            Arc::clone(&registry),
            self.settings.idle_timeout,
            shutdown_rx.clone(),
        ));
        let mut server_shutdown = shutdown_rx;
        let task = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = server_shutdown.changed().await;
            });
            if let Err(err) = server.await {
                warn!(error = %err, "transport server exited with error");
            }
        });

        Ok(TransportServerHandle {
            address: local_addr,
            registry,
            shutdown: shutdown_tx,
            task,
            reaper,
        })
    }
}

/// Handle for the running transport server.
pub struct TransportServerHandle {
    address: SocketAddr,
    registry: Arc<SessionRegistry>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    reaper: JoinHandle<()>,
}

impl TransportServerHandle {
    /// Return the bound listening address.
    pub fn local_addr(&self) -> SocketAddr {
        self.address
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Trigger graceful shutdown, stop every session and await completion.
    ///
    /// Open WebSocket connections are closed with code 1001 (going away).
    pub async fn shutdown(self) -> anyhow::Result<()> {
        let _ = self.shutdown.send(true);
        for key in self.registry.keys() {
            self.registry.remove(&key);
        }
        self.reaper.await.map_err(|err| anyhow::anyhow!(err))?;
        match tokio::time::timeout(Duration::from_secs(5), self.task).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(join)) => Err(anyhow::anyhow!(join)),
            Err(_) => {
                warn!("transport server did not drain connections in time");
                Ok(())
            }
        }
    }
}

async fn reap_idle_sessions(
    registry: Arc<SessionRegistry>,
    idle_timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let period = (idle_timeout / 4).max(Duration::from_millis(10));
    let mut ticks = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticks.tick() => {
                let reaped = registry.reap_idle(Instant::now());
                if !reaped.is_empty() {
                    debug!(sessions = ?reaped, "reaped idle sessions");
                }
            }
        }
    }
}
