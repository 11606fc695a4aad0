//! # Application State
//!
//! Shared state for the Axum application.
//! Contains the gateway, the session registry and the outcome store.

use chrono::{DateTime, Utc};
use pay_core::{
    BoxedCheckoutGateway, CheckoutGateway, PaymentError, PaymentFailure, PaymentOutcome,
    PaymentResult, PaymentSuccess, RedirectPatterns, RequeryFailure, RequeryOutcome,
    RequerySuccess, ResultListener, SessionRegistry, SharedRedirectVerifier,
};
use pay_ipay88::{IPay88Config, IPay88Gateway};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_SESSION_RETENTION_SECS: u64 = 3600;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Public base URL of this service
    pub base_url: String,
    /// Environment (development, staging, production)
    pub environment: String,
    /// How long sessions and outcomes are kept after their last activity
    pub session_retention: Duration,
}

impl AppConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            base_url: std::env::var("BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            session_retention: std::env::var("SESSION_RETENTION_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(DEFAULT_SESSION_RETENTION_SECS)),
        }
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<std::net::SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid socket address {}:{}: {}", self.host, self.port, e))
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Where the gateway should send backend posts
    pub fn backend_post_url(&self) -> String {
        format!("{}/callback/ipay88", self.base_url.trim_end_matches('/'))
    }

    /// Oldest activity still retained at `now`
    pub fn retention_cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        chrono::Duration::from_std(self.session_retention)
            .ok()
            .and_then(|retention| now.checked_sub_signed(retention))
    }
}

type Recorded<T> = Mutex<HashMap<String, (DateTime<Utc>, T)>>;

/// Records every outcome delivered to the service, keyed by reference number
#[derive(Debug, Default)]
pub struct OutcomeStore {
    payments: Recorded<PaymentOutcome>,
    requeries: Recorded<RequeryOutcome>,
}

impl OutcomeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last checkout outcome for a reference
    pub fn payment(&self, ref_no: &str) -> Option<PaymentOutcome> {
        self.payments.lock().ok()?.get(ref_no).map(|(_, o)| o.clone())
    }

    /// Last requery outcome for a reference
    pub fn requery(&self, ref_no: &str) -> Option<RequeryOutcome> {
        self.requeries.lock().ok()?.get(ref_no).map(|(_, o)| o.clone())
    }

    fn record_payment(&self, outcome: PaymentOutcome) -> PaymentResult<()> {
        lock(&self.payments)?.insert(outcome.ref_no().to_string(), (Utc::now(), outcome));
        Ok(())
    }

    /// Record an outcome no session claimed.
    ///
    /// Keeps an outcome already recorded for the reference; returns whether
    /// this one was stored.
    pub fn record_unclaimed(&self, outcome: PaymentOutcome) -> PaymentResult<bool> {
        let mut payments = lock(&self.payments)?;
        if payments.contains_key(outcome.ref_no()) {
            return Ok(false);
        }
        payments.insert(outcome.ref_no().to_string(), (Utc::now(), outcome));
        Ok(true)
    }

    fn record_requery(&self, outcome: RequeryOutcome) -> PaymentResult<()> {
        lock(&self.requeries)?.insert(outcome.ref_no().to_string(), (Utc::now(), outcome));
        Ok(())
    }

    /// Forget outcomes recorded before `cutoff`; returns how many were dropped
    pub fn prune_before(&self, cutoff: DateTime<Utc>) -> PaymentResult<usize> {
        let mut removed = 0;
        {
            let mut payments = lock(&self.payments)?;
            let before = payments.len();
            payments.retain(|_, (at, _)| *at >= cutoff);
            removed += before - payments.len();
        }
        let mut requeries = lock(&self.requeries)?;
        let before = requeries.len();
        requeries.retain(|_, (at, _)| *at >= cutoff);
        removed += before - requeries.len();
        Ok(removed)
    }
}

fn lock<T>(
    recorded: &Recorded<T>,
) -> PaymentResult<MutexGuard<'_, HashMap<String, (DateTime<Utc>, T)>>> {
    recorded
        .lock()
        .map_err(|_| PaymentError::Internal("outcome store poisoned".to_string()))
}

impl ResultListener for OutcomeStore {
    fn payment_success(&self, success: &PaymentSuccess) -> PaymentResult<()> {
        info!("Payment succeeded: ref_no={}, trans_id={}", success.ref_no, success.trans_id);
        self.record_payment(PaymentOutcome::Success(success.clone()))
    }

    fn payment_failed(&self, failure: &PaymentFailure) -> PaymentResult<()> {
        warn!("Payment failed: ref_no={}, error={}", failure.ref_no, failure.error_description);
        self.record_payment(PaymentOutcome::Failed(failure.clone()))
    }

    fn payment_cancelled(&self, cancellation: &PaymentFailure) -> PaymentResult<()> {
        info!("Payment cancelled: ref_no={}", cancellation.ref_no);
        self.record_payment(PaymentOutcome::Cancelled(cancellation.clone()))
    }

    fn requery_success(&self, success: &RequerySuccess) -> PaymentResult<()> {
        self.record_requery(RequeryOutcome::RequerySuccess(success.clone()))
    }

    fn requery_failed(&self, failure: &RequeryFailure) -> PaymentResult<()> {
        self.record_requery(RequeryOutcome::RequeryFailed(failure.clone()))
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Hosted checkout gateway
    pub gateway: BoxedCheckoutGateway,
    /// Merchant credentials for verifying backend posts
    pub ipay88: IPay88Config,
    /// Completion URL table for new sessions
    pub patterns: RedirectPatterns,
    /// Signature check new sessions apply to terminal redirects
    pub verifier: Option<SharedRedirectVerifier>,
    /// Live sessions; never held across an await
    pub sessions: Arc<Mutex<SessionRegistry>>,
    /// Listener for every session this service drives
    pub outcomes: Arc<OutcomeStore>,
    /// Application config
    pub config: AppConfig,
}

impl AppState {
    /// Create a new AppState with the iPay88 gateway from the environment
    pub fn new() -> anyhow::Result<Self> {
        let config = AppConfig::from_env();

        let ipay88 = IPay88Config::from_env()
            .map_err(|e| anyhow::anyhow!("Failed to initialize iPay88: {}", e))?;
        let gateway = IPay88Gateway::new(ipay88.clone())
            .map_err(|e| anyhow::anyhow!("Failed to initialize iPay88: {}", e))?;

        let patterns = load_redirect_patterns(gateway.redirect_patterns())?;

        Ok(Self::with_gateway(config, ipay88, gateway, patterns))
    }

    /// Assemble state around an existing gateway
    pub fn with_gateway(
        config: AppConfig,
        ipay88: IPay88Config,
        gateway: IPay88Gateway,
        patterns: RedirectPatterns,
    ) -> Self {
        let verifier = gateway.redirect_verifier();
        Self {
            gateway: Arc::new(gateway),
            ipay88,
            patterns,
            verifier,
            sessions: Arc::new(Mutex::new(SessionRegistry::new())),
            outcomes: Arc::new(OutcomeStore::new()),
            config,
        }
    }

    /// Lock the session registry
    pub fn sessions(&self) -> PaymentResult<MutexGuard<'_, SessionRegistry>> {
        self.sessions
            .lock()
            .map_err(|_| PaymentError::Internal("session registry poisoned".to_string()))
    }

    /// Drop sessions and outcomes past the retention window; returns how
    /// many sessions were removed
    pub fn prune_expired(&self) -> PaymentResult<usize> {
        let Some(cutoff) = self.config.retention_cutoff(Utc::now()) else {
            return Ok(0);
        };
        let removed = self.sessions()?.prune_expired(cutoff);
        let forgotten = self.outcomes.prune_before(cutoff)?;
        if removed > 0 || forgotten > 0 {
            debug!(
                "Pruned {} sessions and {} outcomes older than {}",
                removed, forgotten, cutoff
            );
        }
        Ok(removed)
    }
}

/// Load a redirect table override from config, falling back to the gateway's
fn load_redirect_patterns(default: RedirectPatterns) -> anyhow::Result<RedirectPatterns> {
    let config_paths = [
        "config/redirects.toml",
        "../config/redirects.toml",
        "../../config/redirects.toml",
    ];

    for path in config_paths {
        if let Ok(content) = std::fs::read_to_string(path) {
            let patterns = RedirectPatterns::from_toml(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path, e))?;
            if patterns.is_empty() {
                anyhow::bail!("{} defines no redirect prefixes", path);
            }
            info!("Loaded redirect patterns from {}", path);
            return Ok(patterns);
        }
    }

    info!("No redirect table found, using gateway defaults");
    Ok(default)
}
