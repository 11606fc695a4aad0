//! # pay-api
//!
//! HTTP host for checkout-session-rs.
//!
//! This crate provides:
//! - Axum-based HTTP server
//! - Endpoints a web-view client uses to drive a checkout session
//! - The iPay88 backend-post callback
//!
//! ## Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/health` | Health check |
//! | POST | `/api/v1/sessions` | Start a checkout session |
//! | GET | `/api/v1/sessions/{handle}` | Session state and outcome |
//! | POST | `/api/v1/sessions/{handle}/navigation` | Forward a navigation event |
//! | POST | `/api/v1/deeplink` | Resume from a custom-scheme link |
//! | POST | `/api/v1/requery` | Gateway status lookup |
//! | POST | `/callback/ipay88` | iPay88 backend post |

pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::{AppConfig, AppState, OutcomeStore};
