//! Raw TCP accept loop for the collaboration WebSocket listener. Runs
//! alongside the Rocket HTTP server rather than through it, since Rocket 0.5
//! has no native WebSocket upgrade support — mirrors the shape of
//! `tokio_tungstenite`-based servers rather than inventing one.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::Config;
use crate::rate_limit::RateLimiter;
use crate::room::RoomRegistry;
use crate::session;

pub fn spawn(config: Arc<Config>, registry: Arc<RoomRegistry>, rate_limiter: Arc<RateLimiter>) {
    tokio::spawn(async move {
        let listener = match TcpListener::bind(&config.ws_addr).await {
            Ok(l) => l,
            Err(e) => {
                error!(addr = %config.ws_addr, error = %e, "failed to bind websocket listener");
                return;
            }
        };
        info!(addr = %config.ws_addr, "collaboration websocket listening");

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "accept failed");
                    continue;
                }
            };
            info!(%peer, "websocket connection accepted");
            let registry = Arc::clone(&registry);
            let rate_limiter = Arc::clone(&rate_limiter);
            let cursor_max = config.cursor_rate_max;
            let cursor_window = config.cursor_rate_window_secs;
            tokio::spawn(async move {
                session::run(stream, registry, rate_limiter, cursor_max, cursor_window).await;
            });
        }
    });
}
