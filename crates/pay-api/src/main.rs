//! # checkout-session
//!
//! Hosted-checkout session service.
//!
//! ## Usage
//!
//! ```bash
//! # Set environment variables
//! export IPAY88_MERCHANT_CODE=M00001
//! export IPAY88_MERCHANT_KEY=...
//! export BASE_URL=https://shop.example.com
//!
//! # Run the server
//! checkout-session
//! ```

use pay_api::{routes, state::AppState};
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let state = AppState::new()?;

    let addr = state.config.socket_addr()?;
    let is_prod = state.config.is_production();

    info!("Environment: {}", state.config.environment);
    info!(
        "Payment provider: {} (merchant {})",
        state.gateway.provider_name(),
        state.ipay88.merchant_code
    );
    info!("Backend posts expected at {}", state.config.backend_post_url());

    info!(
        "Sessions retained for {}s after last activity",
        state.config.session_retention.as_secs()
    );

    // Expire finished and abandoned sessions
    let pruner = state.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PRUNE_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(e) = pruner.prune_expired() {
                warn!("Session pruning failed: {}", e);
            }
        }
    });

    let app = routes::create_router(state);

    info!(
        "checkout-session {} starting on http://{}",
        env!("CARGO_PKG_VERSION"),
        addr
    );

    if !is_prod {
        info!("Health: http://{}/health", addr);
        info!("Sessions: POST http://{}/api/v1/sessions", addr);
        info!("Callback: POST http://{}/callback/ipay88", addr);
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
