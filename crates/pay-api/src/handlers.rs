//! # Request Handlers
//!
//! Axum request handlers driving checkout sessions for a thin web-view
//! client. The client opens the returned checkout URL, forwards every URL its
//! web view navigates to, and forwards deep links the app is opened with.

use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use pay_core::{
    listener_ref, requery, LinkResolution, NavigationDisposition, PaymentError, PaymentOutcome,
    PaymentRequest, PaymentSession, RequeryOutcome, RequeryQuery, SessionHandle,
};
use pay_ipay88::{dispatch_backend_post, BackendPost, LoggingBackendPostHandler, ACKNOWLEDGEMENT};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, instrument};

// =============================================================================
// Request/Response Types
// =============================================================================

/// Start session response
#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    /// Handle for subsequent navigation events
    pub handle: SessionHandle,
    pub state: String,
    /// Entry page with the form fields query-encoded (load this in the web view)
    pub checkout_url: String,
    /// Form target for clients that POST instead
    pub action_url: String,
    pub fields: Vec<(String, String)>,
}

/// Session status
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub handle: SessionHandle,
    pub ref_no: Option<String>,
    pub state: String,
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<PaymentOutcome>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl SessionResponse {
    fn from_session(session: &PaymentSession) -> Self {
        Self {
            handle: session.handle(),
            ref_no: session.request().map(|r| r.ref_no.clone()),
            state: session.state().to_string(),
            completed: session.is_completed(),
            outcome: session.outcome().cloned(),
            created_at: session.created_at,
            completed_at: session.completed_at,
        }
    }
}

/// A URL observed by the client
#[derive(Debug, Deserialize)]
pub struct UrlEvent {
    pub url: String,
}

/// Navigation event response
#[derive(Debug, Serialize)]
pub struct NavigationResponse {
    pub handle: SessionHandle,
    pub disposition: NavigationDisposition,
    pub state: String,
}

/// Status lookup request
#[derive(Debug, Deserialize)]
pub struct RequeryRequest {
    pub ref_no: String,
    pub merchant_code: String,
    #[serde(default)]
    pub amount: Option<String>,
    /// Upper bound for the lookup in milliseconds
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: u16) -> Self {
        Self {
            error: error.into(),
            code,
        }
    }
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn payment_error_to_response(err: PaymentError) -> ApiError {
    let code = err.status_code();
    let response = ErrorResponse::new(err.to_string(), code);
    (StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR), Json(response))
}

fn parse_handle(raw: &str) -> Result<SessionHandle, ApiError> {
    SessionHandle::parse(raw).map_err(payment_error_to_response)
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let active_sessions = state.sessions().map(|s| s.len()).unwrap_or_default();
    Json(serde_json::json!({
        "status": "healthy",
        "service": "checkout-session",
        "provider": state.gateway.provider_name(),
        "sessions": active_sessions,
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Start a checkout session
#[instrument(skip(state, request), fields(ref_no = %request.ref_no))]
pub async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<PaymentRequest>,
) -> Result<Json<CreateSessionResponse>, ApiError> {
    let mut request = request;
    if request.backend_post_url.is_none() {
        request.backend_post_url = Some(state.config.backend_post_url());
    }

    let form = state
        .gateway
        .checkout_form(&request)
        .map_err(|e| {
            error!("Rejected checkout request: {}", e);
            payment_error_to_response(e)
        })?;
    let checkout_url = form.to_url().map_err(payment_error_to_response)?;

    let mut session = PaymentSession::new(state.patterns.clone(), listener_ref(&state.outcomes));
    if let Some(verifier) = state.verifier.clone() {
        session = session.with_verifier(verifier);
    }
    let handle = session.start(request).map_err(payment_error_to_response)?;
    let session_state = session.state().to_string();

    state.prune_expired().map_err(payment_error_to_response)?;
    state
        .sessions()
        .map_err(payment_error_to_response)?
        .insert(session);

    info!("Started checkout session {}", handle);

    Ok(Json(CreateSessionResponse {
        handle,
        state: session_state,
        checkout_url,
        action_url: form.action_url,
        fields: form.fields,
    }))
}

/// Get session state and outcome
pub async fn get_session(
    State(state): State<AppState>,
    Path(handle): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let handle = parse_handle(&handle)?;
    let sessions = state.sessions().map_err(payment_error_to_response)?;

    let session = sessions.get(handle).ok_or_else(|| {
        payment_error_to_response(PaymentError::SessionNotFound {
            session: handle.to_string(),
        })
    })?;

    Ok(Json(SessionResponse::from_session(session)))
}

/// Forward a URL the checkout web view navigated to
#[instrument(skip(state, event))]
pub async fn navigation_event(
    State(state): State<AppState>,
    Path(handle): Path<String>,
    Json(event): Json<UrlEvent>,
) -> Result<Json<NavigationResponse>, ApiError> {
    let handle = parse_handle(&handle)?;
    let mut sessions = state.sessions().map_err(payment_error_to_response)?;

    let disposition = sessions
        .handle_navigation_event(handle, &event.url)
        .map_err(payment_error_to_response)?;
    let session_state = sessions
        .get(handle)
        .map(|s| s.state().to_string())
        .unwrap_or_default();

    debug!("Navigation disposition: {:?}", disposition);

    Ok(Json(NavigationResponse {
        handle,
        disposition,
        state: session_state,
    }))
}

/// Resume a session from a custom-scheme deep link
#[instrument(skip(state, event))]
pub async fn deep_link(
    State(state): State<AppState>,
    Json(event): Json<UrlEvent>,
) -> Result<Json<LinkResolution>, ApiError> {
    let resolution = state
        .sessions()
        .map_err(payment_error_to_response)?
        .handle_link_from_custom_scheme_url(&event.url)
        .map_err(payment_error_to_response)?;

    Ok(Json(resolution))
}

/// Look up a payment status with the gateway
#[instrument(skip(state, request), fields(ref_no = %request.ref_no))]
pub async fn requery_status(
    State(state): State<AppState>,
    Json(request): Json<RequeryRequest>,
) -> Result<Json<RequeryOutcome>, ApiError> {
    if request.ref_no.trim().is_empty() || request.merchant_code.trim().is_empty() {
        return Err(payment_error_to_response(PaymentError::InvalidRequest(
            "ref_no and merchant_code are required".to_string(),
        )));
    }

    let mut query = RequeryQuery::new(request.ref_no, request.merchant_code);
    if let Some(amount) = request.amount {
        query = query.with_amount(amount);
    }
    let timeout = request.timeout_ms.map(Duration::from_millis);

    let listener = listener_ref(&state.outcomes);
    let outcome = requery(state.gateway.as_ref(), &query, timeout, &listener).await;

    Ok(Json(outcome))
}

/// Handle an iPay88 backend post
#[instrument(skip(state, body))]
pub async fn ipay88_callback(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<&'static str, ApiError> {
    let post = BackendPost::from_form(&body).map_err(|e| {
        error!("Unreadable backend post: {}", e);
        payment_error_to_response(e)
    })?;

    let merchant_code = post.merchant_code.clone();
    let outcome = dispatch_backend_post(&LoggingBackendPostHandler, &state.ipay88, post)
        .map_err(|e| {
            error!("Backend post rejected: {}", e);
            payment_error_to_response(e)
        })?;

    info!(
        "Received backend post: ref_no={}, outcome={}",
        outcome.ref_no(),
        outcome.kind()
    );

    // A pending session for the reference completes with the posted outcome.
    // A finished one already delivered its outcome; only posts no session
    // knows about are recorded directly.
    let mut sessions = state.sessions().map_err(payment_error_to_response)?;
    let known = sessions
        .find(outcome.ref_no(), &merchant_code)
        .map(|s| s.handle());

    match known.and_then(|handle| sessions.get_mut(handle)) {
        Some(session) if session.is_completed() => {
            info!(
                "Backend post for finished session {} acknowledged ({} kept)",
                session.handle(),
                session.state()
            );
        }
        Some(session) => session.complete(outcome).map_err(payment_error_to_response)?,
        None => {
            let stored = state
                .outcomes
                .record_unclaimed(outcome)
                .map_err(payment_error_to_response)?;
            if !stored {
                debug!("Backend post for an already recorded reference acknowledged");
            }
        }
    }

    Ok(ACKNOWLEDGEMENT)
}
