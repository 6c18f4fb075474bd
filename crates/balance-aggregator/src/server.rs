//! Main server implementation for the balance gateway

use crate::{
    aggregator::Aggregator,
    api,
    config::Config,
    error::{Error, Result},
};
use axum::{http::HeaderValue, Router};
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};

/// Main server structure
pub struct Server {
    config: Arc<Config>,
    app: Router,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,

    /// Fan-out over the provider workers
    pub aggregator: Arc<Aggregator>,
}

impl Server {
    /// Create a new server instance, starting one dispatcher per enabled provider
    pub async fn new(config: Config) -> Result<Self> {
        info!("Initializing balance aggregator server");

        let http_client = build_http_client(&config)?;
        let aggregator = Aggregator::from_config(&config, &http_client);
        if aggregator.is_empty() {
            warn!("No providers enabled; balance lookups will be rejected");
        }

        Ok(Self::with_aggregator(config, Arc::new(aggregator)))
    }

    /// Create a server around an existing aggregator
    pub fn with_aggregator(config: Config, aggregator: Arc<Aggregator>) -> Self {
        let config = Arc::new(config);
        let state = AppState {
            config: config.clone(),
            aggregator,
        };
        let app = Self::build_router(state);
        Self { config, app }
    }

    /// The fully layered router
    pub fn router(&self) -> Router {
        self.app.clone()
    }

    /// Build the application router with all routes and middleware
    fn build_router(state: AppState) -> Router {
        let middleware = ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(TimeoutLayer::new(state.config.request_timeout()))
            .layer(cors_layer(&state.config.server.cors_origins));

        Router::new()
            .nest("/api/v1", api::routes(state.clone()))
            .merge(api::docs_routes())
            .layer(middleware)
            .with_state(state)
    }

    /// Run the server until shutdown signal
    pub async fn run(self) -> Result<()> {
        let addr = self.config.server.bind_address;

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Internal {
                message: format!("Failed to bind to address {addr}: {e}"),
            })?;

        info!("Balance aggregator listening on {}", addr);

        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Internal {
                message: format!("Server error: {e}"),
            })?;

        Ok(())
    }
}

/// HTTP client shared by the HTTP provider adapters
pub fn build_http_client(config: &Config) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.request_timeout())
        .user_agent(concat!("balance-aggregator/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(Error::HttpClient)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            warn!("Received terminate signal, shutting down");
        },
    }
}
