//! # Session Registry
//!
//! Caller-owned collection of live sessions keyed by handle. Lets an
//! application route navigation events and resume a checkout from a
//! custom-scheme deep link after it was re-activated.

use crate::error::{PaymentError, PaymentResult};
use crate::navigation::query_params;
use crate::session::{NavigationDisposition, PaymentSession, SessionHandle};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, instrument};

/// Result of routing a deep link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkResolution {
    /// Session the link resolved to, if any
    pub handle: Option<SessionHandle>,
    pub disposition: NavigationDisposition,
}

impl LinkResolution {
    fn ignored() -> Self {
        Self {
            handle: None,
            disposition: NavigationDisposition::Ignored,
        }
    }
}

/// Sessions by handle
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionHandle, PaymentSession>,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a session; returns its handle
    pub fn insert(&mut self, session: PaymentSession) -> SessionHandle {
        let handle = session.handle();
        self.sessions.insert(handle, session);
        handle
    }

    pub fn get(&self, handle: SessionHandle) -> Option<&PaymentSession> {
        self.sessions.get(&handle)
    }

    pub fn get_mut(&mut self, handle: SessionHandle) -> Option<&mut PaymentSession> {
        self.sessions.get_mut(&handle)
    }

    pub fn remove(&mut self, handle: SessionHandle) -> Option<PaymentSession> {
        self.sessions.remove(&handle)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Forward a navigation event to the session it belongs to
    pub fn handle_navigation_event(
        &mut self,
        handle: SessionHandle,
        url: &str,
    ) -> PaymentResult<NavigationDisposition> {
        self.get_mut(handle)
            .ok_or_else(|| PaymentError::SessionNotFound {
                session: handle.to_string(),
            })?
            .handle_navigation_event(handle, url)
    }

    /// The unfinished session started for `ref_no` at `merchant_code`
    pub fn find_pending(&self, ref_no: &str, merchant_code: &str) -> Option<&PaymentSession> {
        self.sessions
            .values()
            .find(|s| !s.is_completed() && s.matches_reference(ref_no, merchant_code))
    }

    /// The session started for `ref_no` at `merchant_code`, preferring an
    /// unfinished one over a completed one
    pub fn find(&self, ref_no: &str, merchant_code: &str) -> Option<&PaymentSession> {
        self.find_pending(ref_no, merchant_code).or_else(|| {
            self.sessions
                .values()
                .find(|s| s.matches_reference(ref_no, merchant_code))
        })
    }

    /// Resume a session from a link the application was opened with.
    ///
    /// The link must carry the reference number and merchant code as query
    /// parameters. Links without them, and links for sessions that already
    /// finished, are ignored. An unknown reference is `SessionNotFound`.
    #[instrument(skip(self))]
    pub fn handle_link_from_custom_scheme_url(&mut self, url: &str) -> PaymentResult<LinkResolution> {
        let params = match query_params(url) {
            Ok(params) => params,
            Err(e) => {
                debug!("Unparseable deep link ignored: {}", e);
                return Ok(LinkResolution::ignored());
            }
        };

        let mut saw_reference = false;
        let mut finished = false;
        let mut target = None;

        for session in self.sessions.values() {
            let fields = &session.patterns().fields;
            let (Some(ref_no), Some(merchant_code)) = (
                params.get(&fields.ref_no),
                params.get(&fields.merchant_code),
            ) else {
                continue;
            };
            saw_reference = true;

            if session.matches_reference(ref_no, merchant_code) {
                if session.is_completed() {
                    finished = true;
                } else {
                    target = Some(session.handle());
                    break;
                }
            }
        }

        let Some(handle) = target else {
            if finished || (!saw_reference && !self.sessions.is_empty()) {
                debug!("Deep link does not resume a pending session");
                return Ok(LinkResolution::ignored());
            }
            return match reference_of(&params) {
                Some(reference) => Err(PaymentError::SessionNotFound { session: reference }),
                None => Ok(LinkResolution::ignored()),
            };
        };

        info!("Deep link resumed session {}", handle);
        let disposition = self.handle_navigation_event(handle, url)?;
        Ok(LinkResolution {
            handle: Some(handle),
            disposition,
        })
    }

    /// Drop finished sessions; returns how many were removed
    pub fn prune_completed(&mut self) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| !s.is_completed());
        before - self.sessions.len()
    }

    /// Drop sessions that completed before `cutoff` and unfinished sessions
    /// created before it; returns how many were removed
    pub fn prune_expired(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| {
            let last_activity = s.completed_at.unwrap_or(s.created_at);
            last_activity >= cutoff
        });
        let removed = before - self.sessions.len();
        if removed > 0 {
            debug!("Pruned {} expired sessions", removed);
        }
        removed
    }
}

/// Reference named by a link using the default parameter names
fn reference_of(params: &HashMap<String, String>) -> Option<String> {
    let defaults = crate::navigation::ResponseFields::default();
    match (params.get(&defaults.ref_no), params.get(&defaults.merchant_code)) {
        (Some(ref_no), Some(merchant_code)) => Some(format!("{}/{}", merchant_code, ref_no)),
        _ => None,
    }
}
