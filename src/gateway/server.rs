//! Gateway server

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::router::{AppState, create_router};
use crate::config::Config;
use crate::{Error, Result};

/// Exchange gateway server
pub struct Gateway {
    /// Configuration
    config: Config,
    /// Routes, stage and clients shared by all handlers
    state: Arc<AppState>,
    /// Cancelled once a shutdown signal arrives
    shutdown: CancellationToken,
}

impl Gateway {
    /// Create a new gateway, validating every route
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if any route or exchange block is invalid.
    pub fn new(config: Config) -> Result<Self> {
        let state = Arc::new(AppState::from_config(&config)?);

        for route in state.routes.iter() {
            info!(
                route = %route.name,
                upstream = %route.upstream_path,
                downstream = %route.downstream_url,
                exchange = route.auth.exchange_enabled,
                "Registered route"
            );
        }

        Ok(Self {
            config,
            state,
            shutdown: CancellationToken::new(),
        })
    }

    /// Token that starts a graceful shutdown when cancelled.
    ///
    /// [`Gateway::run`] cancels it on Ctrl+C or SIGTERM. In-flight requests,
    /// including pending token exchanges, are allowed to finish within
    /// `server.shutdown_timeout`.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run the gateway until a shutdown signal arrives
    ///
    /// # Errors
    ///
    /// Returns an error if the listen address is invalid or cannot be bound.
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );
        let listener = TcpListener::bind(addr).await?;

        let shutdown = self.shutdown_token();
        tokio::spawn(async move {
            shutdown_signal().await;
            shutdown.cancel();
        });

        self.serve(listener).await
    }

    /// Serve on an already bound listener until the shutdown token fires
    /// and in-flight requests drain
    ///
    /// # Errors
    ///
    /// Returns an error if the server task fails.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let app = create_router(Arc::clone(&self.state));
        let local = listener.local_addr()?;

        info!("============================================================");
        info!("EXCHANGE GATEWAY v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(addr = %local, "Listening");
        info!(routes = self.state.routes.len(), "Routes registered");

        let exchanging = self
            .state
            .routes
            .iter()
            .filter(|r| r.auth.exchange_enabled)
            .count();
        if exchanging == 0 {
            warn!("TOKEN EXCHANGE disabled on every route - credentials are forwarded as received");
        } else {
            info!(
                routes = exchanging,
                timeout = ?self.config.exchange.timeout,
                "TOKEN EXCHANGE enabled"
            );
        }
        info!("============================================================");

        let shutdown_timeout = self.config.server.shutdown_timeout;
        let serve = axum::serve(listener, app)
            .with_graceful_shutdown(self.shutdown.clone().cancelled_owned());

        let server = tokio::spawn(async move { serve.await });

        // Bound the drain once shutdown starts
        tokio::select! {
            result = server => {
                result
                    .map_err(|e| Error::Internal(e.to_string()))?
                    .map_err(|e| Error::Internal(e.to_string()))?;
            }
            () = async {
                self.shutdown.cancelled().await;
                tokio::time::sleep(shutdown_timeout).await;
            } => {
                warn!(timeout = ?shutdown_timeout, "In-flight requests did not drain in time");
            }
        }

        info!("Gateway stopped");
        Ok(())
    }
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
