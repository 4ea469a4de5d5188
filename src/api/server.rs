//! API Server
//!
//! Server bootstrap: builds the shared state, layers the middleware stack,
//! and runs with graceful shutdown.

use super::{
    handlers::AppState,
    middleware::{create_cors_layer, request_id_middleware},
    routes::create_router,
};
use crate::auth::AuthProvider;
use crate::bot::MoveOracle;
use crate::config::GambitConfig;
use crate::invites::InviteService;
use crate::registry::SessionRegistry;
use crate::store::MatchStore;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

/// Realtime match engine server.
pub struct ApiServer {
    config: GambitConfig,
    store: Arc<dyn MatchStore>,
    auth: Arc<dyn AuthProvider>,
    oracle: Arc<dyn MoveOracle>,
}

impl ApiServer {
    pub fn new(
        config: GambitConfig,
        store: Arc<dyn MatchStore>,
        auth: Arc<dyn AuthProvider>,
        oracle: Arc<dyn MoveOracle>,
    ) -> Self {
        Self {
            config,
            store,
            auth,
            oracle,
        }
    }

    /// Start the server.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "gambit=info,tower_http=info".into()),
            )
            .init();

        info!("🚀 Starting Gambit match engine");

        let registry = SessionRegistry::new(
            self.store.clone(),
            self.oracle.clone(),
            self.config.game.clone(),
            self.config.bot.clone(),
        );
        let invites = InviteService::new(self.store.clone(), registry.clone());

        let state = Arc::new(AppState {
            store: self.store.clone(),
            auth: self.auth.clone(),
            registry: registry.clone(),
            invites,
            version: env!("CARGO_PKG_VERSION").to_string(),
        });

        let app = create_router(state)
            // Request ID middleware (first for tracing)
            .layer(axum::middleware::from_fn(request_id_middleware))
            // CORS layer (before timeout to handle preflight)
            .layer(create_cors_layer(self.config.server.allowed_origins.clone()))
            // Timeout layer
            .layer(TimeoutLayer::new(Duration::from_secs(
                self.config.server.request_timeout_secs,
            )))
            // Tracing layer (last for complete request tracing)
            .layer(TraceLayer::new_for_http());

        let addr = SocketAddr::from((
            self.config.server.listen_address.parse::<std::net::IpAddr>()?,
            self.config.server.port,
        ));

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("🌐 Listening on http://{}", addr);
        self.log_server_info();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        registry.stop_all_timers();
        info!("🛑 Server stopped gracefully");
        Ok(())
    }

    fn log_server_info(&self) {
        info!("📋 Server Configuration:");
        info!("   CORS: {:?}", self.config.server.allowed_origins);
        info!("   Request timeout: {}s", self.config.server.request_timeout_secs);
        info!("   Initial clock: {}s", self.config.game.initial_clock_secs);
        info!("   Tick interval: {}ms", self.config.game.tick_interval_ms);
        info!("📊 Available endpoints:");
        info!("   GET  /health                    - Health check");
        info!("   POST /api/matches/bot           - Start a bot match");
        info!("   GET  /api/matches/:id           - Match state (polling)");
        info!("   POST /api/invites               - Challenge a player");
        info!("   GET  /api/invites               - Pending invites");
        info!("   POST /api/invites/:id/respond   - Accept/decline");
        info!("   POST /api/invites/:id/cancel    - Withdraw");
        info!("   GET  /ws/:match_id              - Realtime play");
    }
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
