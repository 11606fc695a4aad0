//! # Payment Session
//!
//! Drives one checkout attempt from request to exactly one terminal outcome.
//!
//! ```text
//! Created ──start()──▶ Submitted ──first navigation──▶ AwaitingRedirect
//!                                                          │
//!                                 success / failure / cancel URL
//!                                                          ▼
//!                                         Completed(Success | Failed | Cancelled)
//! ```
//!
//! Intermediate page loads leave the session in `AwaitingRedirect`; the
//! hosted page legitimately redirects many times before its final status
//! page. Completion is one-shot: the listener never sees a second terminal
//! callback for the same session.

use crate::amount::Amount;
use crate::error::{PaymentError, PaymentResult};
use crate::gateway::{RequeryBackend, RequeryQuery, SharedRedirectVerifier};
use crate::listener::{deliver_payment_outcome, Delivery, ResultListener};
use crate::navigation::RedirectPatterns;
use crate::outcome::{OutcomeKind, PaymentOutcome, RequeryOutcome};
use crate::request::PaymentRequest;
use crate::requery::requery;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Weak;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Opaque handle correlating navigation events with a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionHandle(Uuid);

impl SessionHandle {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a handle previously rendered with `to_string()`
    pub fn parse(s: &str) -> PaymentResult<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| PaymentError::SessionNotFound {
                session: s.to_string(),
            })
    }
}

impl std::fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Constructed, no request yet
    Created,
    /// Request accepted, checkout page not loaded yet
    Submitted,
    /// Hosted page is navigating; waiting for a terminal redirect
    AwaitingRedirect,
    /// Terminal outcome delivered
    Completed(OutcomeKind),
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Created => f.write_str("created"),
            SessionState::Submitted => f.write_str("submitted"),
            SessionState::AwaitingRedirect => f.write_str("awaiting_redirect"),
            SessionState::Completed(kind) => write!(f, "completed({})", kind),
        }
    }
}

/// What a navigation event did to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationDisposition {
    /// Not a terminal signal; session keeps waiting
    InProgress,
    /// Session reached a terminal outcome
    Completed(OutcomeKind),
    /// Event arrived after completion or belongs to another reference
    Ignored,
}

/// One checkout attempt.
///
/// The session does not own its listener. When the application drops the
/// listener, outcomes are still recorded on the session but not delivered.
#[derive(Debug)]
pub struct PaymentSession {
    handle: SessionHandle,
    state: SessionState,
    patterns: RedirectPatterns,
    listener: Weak<dyn ResultListener>,
    verifier: Option<SharedRedirectVerifier>,
    request: Option<PaymentRequest>,
    amount: Option<Amount>,
    outcome: Option<PaymentOutcome>,

    /// When the session object was created
    pub created_at: DateTime<Utc>,
    /// When the request was accepted
    pub submitted_at: Option<DateTime<Utc>>,
    /// When the terminal outcome was recorded
    pub completed_at: Option<DateTime<Utc>>,
}

impl PaymentSession {
    /// Create a session using `patterns` to recognise completion URLs
    pub fn new(patterns: RedirectPatterns, listener: Weak<dyn ResultListener>) -> Self {
        if patterns.is_empty() {
            warn!("Session created with an empty redirect table; it can only complete explicitly");
        }
        Self {
            handle: SessionHandle::generate(),
            state: SessionState::Created,
            patterns,
            listener,
            verifier: None,
            request: None,
            amount: None,
            outcome: None,
            created_at: Utc::now(),
            submitted_at: None,
            completed_at: None,
        }
    }

    /// Builder: check terminal redirects with `verifier` before completing
    pub fn with_verifier(mut self, verifier: SharedRedirectVerifier) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Accept the request and move to `Submitted`.
    ///
    /// Rejects a missing merchant code, missing reference number or malformed
    /// amount with `InvalidRequest`, leaving the session in `Created`.
    #[instrument(skip_all, fields(session = %self.handle, ref_no = %request.ref_no))]
    pub fn start(&mut self, request: PaymentRequest) -> PaymentResult<SessionHandle> {
        if self.state != SessionState::Created {
            return Err(PaymentError::InvalidState(format!(
                "session {} already started ({})",
                self.handle, self.state
            )));
        }

        let amount = request.validate().map_err(|e| {
            warn!("Rejected payment request: {}", e);
            e
        })?;

        info!(
            "Session submitted: merchant={}, amount={}",
            request.merchant_code, amount
        );

        self.amount = Some(amount);
        self.request = Some(request);
        self.state = SessionState::Submitted;
        self.submitted_at = Some(Utc::now());

        Ok(self.handle)
    }

    /// Feed a URL the hosted page navigated to.
    ///
    /// Terminal URLs complete the session; anything else is tolerated and
    /// reported as `InProgress`. Events after completion are `Ignored`.
    #[instrument(skip(self), fields(session = %self.handle))]
    pub fn handle_navigation_event(
        &mut self,
        handle: SessionHandle,
        url: &str,
    ) -> PaymentResult<NavigationDisposition> {
        if handle != self.handle {
            return Err(PaymentError::SessionNotFound {
                session: handle.to_string(),
            });
        }

        match self.state {
            SessionState::Created => {
                return Err(PaymentError::InvalidState(format!(
                    "session {} received navigation before start",
                    self.handle
                )));
            }
            SessionState::Completed(kind) => {
                debug!("Navigation after completion ({}), ignoring", kind);
                return Ok(NavigationDisposition::Ignored);
            }
            SessionState::Submitted => {
                self.state = SessionState::AwaitingRedirect;
            }
            SessionState::AwaitingRedirect => {}
        }

        let Some(mut outcome) = self.patterns.parse_outcome(url) else {
            debug!("Intermediate navigation");
            return Ok(NavigationDisposition::InProgress);
        };

        if !self.fill_from_request(&mut outcome) {
            return Ok(NavigationDisposition::Ignored);
        }

        if let (Some(verifier), Some(request)) = (&self.verifier, &self.request) {
            if let Err(e) = verifier.verify_redirect(outcome.kind(), url, request) {
                warn!("Redirect failed verification, ignoring: {}", e);
                return Ok(NavigationDisposition::Ignored);
            }
        }

        let kind = outcome.kind();
        self.complete(outcome)?;
        Ok(NavigationDisposition::Completed(kind))
    }

    /// Record the terminal outcome and notify the listener.
    ///
    /// Normally reached through [`handle_navigation_event`](Self::handle_navigation_event).
    /// A second call fails with `AlreadyCompleted` and delivers nothing.
    #[instrument(skip_all, fields(session = %self.handle, outcome = %outcome.kind()))]
    pub fn complete(&mut self, outcome: PaymentOutcome) -> PaymentResult<()> {
        match self.state {
            SessionState::Completed(_) => {
                warn!("Duplicate completion rejected");
                return Err(PaymentError::AlreadyCompleted {
                    session: self.handle.to_string(),
                });
            }
            SessionState::Created => {
                return Err(PaymentError::InvalidState(format!(
                    "session {} completed before start",
                    self.handle
                )));
            }
            SessionState::Submitted | SessionState::AwaitingRedirect => {}
        }

        self.state = SessionState::Completed(outcome.kind());
        self.completed_at = Some(Utc::now());
        info!(
            "Session completed: ref_no={}, trans_id={}",
            outcome.ref_no(),
            outcome.trans_id()
        );

        if deliver_payment_outcome(&self.listener, &outcome) != Delivery::Delivered {
            debug!("Outcome recorded without listener acknowledgement");
        }
        self.outcome = Some(outcome);
        Ok(())
    }

    /// Look up this session's payment status out of band.
    ///
    /// Uses the session's reference, merchant code and amount; the outcome is
    /// delivered to the session's listener.
    pub async fn requery<B: RequeryBackend + ?Sized>(
        &self,
        backend: &B,
        timeout: Option<Duration>,
    ) -> PaymentResult<RequeryOutcome> {
        let request = self.request.as_ref().ok_or_else(|| {
            PaymentError::InvalidState(format!("session {} has no request", self.handle))
        })?;

        let query = RequeryQuery::new(&request.ref_no, &request.merchant_code)
            .with_amount(&request.amount);
        Ok(requery(backend, &query, timeout, &self.listener).await)
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn patterns(&self) -> &RedirectPatterns {
        &self.patterns
    }

    pub fn request(&self) -> Option<&PaymentRequest> {
        self.request.as_ref()
    }

    /// Parsed amount of the accepted request
    pub fn amount(&self) -> Option<Amount> {
        self.amount
    }

    pub fn outcome(&self) -> Option<&PaymentOutcome> {
        self.outcome.as_ref()
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.state, SessionState::Completed(_))
    }

    /// True when this session was started for `ref_no` at `merchant_code`
    pub fn matches_reference(&self, ref_no: &str, merchant_code: &str) -> bool {
        self.request
            .as_ref()
            .map(|r| r.ref_no == ref_no && r.merchant_code == merchant_code)
            .unwrap_or(false)
    }

    /// Fill reference and amount the redirect left out; reject redirects for
    /// a different reference or amount.
    fn fill_from_request(&self, outcome: &mut PaymentOutcome) -> bool {
        let Some(request) = self.request.as_ref() else {
            return false;
        };

        let (ref_no, amount) = match outcome {
            PaymentOutcome::Success(s) => (&mut s.ref_no, &mut s.amount),
            PaymentOutcome::Failed(f) | PaymentOutcome::Cancelled(f) => {
                (&mut f.ref_no, &mut f.amount)
            }
        };

        if ref_no.is_empty() {
            *ref_no = request.ref_no.clone();
        } else if *ref_no != request.ref_no {
            warn!(
                "Redirect for reference {} does not belong to {}, ignoring",
                ref_no, request.ref_no
            );
            return false;
        }

        if amount.is_empty() {
            *amount = request.amount.clone();
            return true;
        }

        let Some(expected) = self.amount else {
            return false;
        };
        match Amount::parse(amount, expected.decimal_places()) {
            Ok(reported) if reported.minor_units() == expected.minor_units() => true,
            Ok(reported) => {
                warn!(
                    "Redirect reports amount {} but {} was requested, ignoring",
                    reported, expected
                );
                false
            }
            Err(e) => {
                warn!("Redirect carries an unreadable amount, ignoring: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{RedirectVerifier, RequeryStatus};
    use crate::listener::{detached_listener, listener_ref};
    use crate::outcome::{PaymentFailure, PaymentSuccess, RequerySuccess};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<PaymentOutcome>>,
    }

    impl ResultListener for Recorder {
        fn payment_success(&self, success: &PaymentSuccess) -> PaymentResult<()> {
            self.events
                .lock()
                .unwrap()
                .push(PaymentOutcome::Success(success.clone()));
            Ok(())
        }

        fn payment_failed(&self, failure: &PaymentFailure) -> PaymentResult<()> {
            self.events
                .lock()
                .unwrap()
                .push(PaymentOutcome::Failed(failure.clone()));
            Ok(())
        }

        fn payment_cancelled(&self, cancellation: &PaymentFailure) -> PaymentResult<()> {
            self.events
                .lock()
                .unwrap()
                .push(PaymentOutcome::Cancelled(cancellation.clone()));
            Ok(())
        }
    }

    impl Recorder {
        fn count(&self) -> usize {
            self.events.lock().unwrap().len()
        }
    }

    fn patterns() -> RedirectPatterns {
        RedirectPatterns::new()
            .with_success("shopapp://ipay88/success")
            .with_failure("shopapp://ipay88/failure")
            .with_cancel("shopapp://ipay88/cancel")
    }

    fn request() -> PaymentRequest {
        PaymentRequest::new("M001", "REF123", "25.50").with_currency("MYR")
    }

    fn started(recorder: &Arc<Recorder>) -> (PaymentSession, SessionHandle) {
        let mut session = PaymentSession::new(patterns(), listener_ref(recorder));
        let handle = session.start(request()).unwrap();
        (session, handle)
    }

    #[test]
    fn test_start_transitions_to_submitted() {
        let mut session = PaymentSession::new(patterns(), detached_listener());
        assert_eq!(session.state(), SessionState::Created);

        let handle = session.start(request()).unwrap();

        assert_eq!(handle, session.handle());
        assert_eq!(session.state(), SessionState::Submitted);
        assert_eq!(session.amount().unwrap().minor_units(), 2550);
        assert!(session.submitted_at.is_some());
    }

    #[test]
    fn test_invalid_request_leaves_state_unchanged() {
        for bad in [
            PaymentRequest::new("", "REF123", "1.00"),
            PaymentRequest::new("M001", "", "1.00"),
            PaymentRequest::new("M001", "REF123", "1.2.3"),
        ] {
            let mut session = PaymentSession::new(patterns(), detached_listener());
            assert!(matches!(
                session.start(bad),
                Err(PaymentError::InvalidRequest(_))
            ));
            assert_eq!(session.state(), SessionState::Created);
            assert!(session.request().is_none());
        }
    }

    #[test]
    fn test_start_twice_rejected() {
        let mut session = PaymentSession::new(patterns(), detached_listener());
        session.start(request()).unwrap();
        assert!(matches!(
            session.start(request()),
            Err(PaymentError::InvalidState(_))
        ));
    }

    #[test]
    fn test_success_redirect_delivers_once() {
        let recorder = Arc::new(Recorder::default());
        let (mut session, handle) = started(&recorder);

        let disposition = session
            .handle_navigation_event(
                handle,
                "shopapp://ipay88/success?RefNo=REF123&TransId=T777&Amount=25.50",
            )
            .unwrap();

        assert_eq!(
            disposition,
            NavigationDisposition::Completed(OutcomeKind::Success)
        );
        assert_eq!(session.state(), SessionState::Completed(OutcomeKind::Success));

        let events = recorder.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            PaymentOutcome::Success(s) => {
                assert_eq!(s.ref_no, "REF123");
                assert_eq!(s.trans_id, "T777");
                assert_eq!(s.amount, "25.50");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_intermediate_navigation_keeps_waiting() {
        let recorder = Arc::new(Recorder::default());
        let (mut session, handle) = started(&recorder);

        for url in [
            "https://payment.ipay88.com.my/epayment/entry.asp",
            "https://acs.bank.example/3ds?step=2",
            "about:blank",
            "garbage",
        ] {
            assert_eq!(
                session.handle_navigation_event(handle, url).unwrap(),
                NavigationDisposition::InProgress
            );
        }

        assert_eq!(session.state(), SessionState::AwaitingRedirect);
        assert_eq!(recorder.count(), 0);
    }

    #[test]
    fn test_complete_is_one_shot() {
        let recorder = Arc::new(Recorder::default());
        let (mut session, handle) = started(&recorder);

        session
            .handle_navigation_event(handle, "shopapp://ipay88/cancel?RefNo=REF123")
            .unwrap();
        assert_eq!(session.state(), SessionState::Completed(OutcomeKind::Cancelled));

        let second = session.complete(PaymentOutcome::Success(PaymentSuccess::default()));
        assert!(matches!(second, Err(PaymentError::AlreadyCompleted { .. })));

        // Late redirects are ignored, not errors
        assert_eq!(
            session
                .handle_navigation_event(handle, "shopapp://ipay88/success?RefNo=REF123")
                .unwrap(),
            NavigationDisposition::Ignored
        );

        assert_eq!(recorder.count(), 1);
        assert_eq!(session.outcome().unwrap().kind(), OutcomeKind::Cancelled);
    }

    #[test]
    fn test_missing_fields_filled_from_request() {
        let recorder = Arc::new(Recorder::default());
        let (mut session, handle) = started(&recorder);

        session
            .handle_navigation_event(handle, "shopapp://ipay88/failure?ErrDesc=Declined")
            .unwrap();

        let outcome = session.outcome().unwrap();
        assert_eq!(outcome.ref_no(), "REF123");
        assert_eq!(outcome.amount(), "25.50");
    }

    #[test]
    fn test_foreign_reference_ignored() {
        let recorder = Arc::new(Recorder::default());
        let (mut session, handle) = started(&recorder);

        let disposition = session
            .handle_navigation_event(handle, "shopapp://ipay88/success?RefNo=OTHER")
            .unwrap();

        assert_eq!(disposition, NavigationDisposition::Ignored);
        assert_eq!(session.state(), SessionState::AwaitingRedirect);
        assert_eq!(recorder.count(), 0);
    }

    #[test]
    fn test_mismatched_amount_ignored() {
        let recorder = Arc::new(Recorder::default());
        let (mut session, handle) = started(&recorder);

        for url in [
            "shopapp://ipay88/success?RefNo=REF123&TransId=FAKE&Amount=0.01",
            "shopapp://ipay88/success?RefNo=REF123&Amount=25.5x",
        ] {
            assert_eq!(
                session.handle_navigation_event(handle, url).unwrap(),
                NavigationDisposition::Ignored
            );
        }
        assert_eq!(recorder.count(), 0);

        // Same value in a different rendering still matches
        let disposition = session
            .handle_navigation_event(handle, "shopapp://ipay88/success?RefNo=REF123&Amount=25.500")
            .unwrap();
        assert_eq!(
            disposition,
            NavigationDisposition::Completed(OutcomeKind::Success)
        );
    }

    #[test]
    fn test_verifier_gates_completion() {
        #[derive(Debug)]
        struct TokenVerifier;

        impl RedirectVerifier for TokenVerifier {
            fn verify_redirect(
                &self,
                kind: OutcomeKind,
                url: &str,
                request: &PaymentRequest,
            ) -> PaymentResult<()> {
                assert_eq!(request.ref_no, "REF123");
                if kind == OutcomeKind::Success && !url.contains("Token=ok") {
                    return Err(PaymentError::SignatureMismatch("no token".to_string()));
                }
                Ok(())
            }
        }

        let recorder = Arc::new(Recorder::default());
        let mut session = PaymentSession::new(patterns(), listener_ref(&recorder))
            .with_verifier(Arc::new(TokenVerifier));
        let handle = session.start(request()).unwrap();

        assert_eq!(
            session
                .handle_navigation_event(handle, "shopapp://ipay88/success?RefNo=REF123")
                .unwrap(),
            NavigationDisposition::Ignored
        );
        assert_eq!(session.state(), SessionState::AwaitingRedirect);
        assert_eq!(recorder.count(), 0);

        assert_eq!(
            session
                .handle_navigation_event(handle, "shopapp://ipay88/success?RefNo=REF123&Token=ok")
                .unwrap(),
            NavigationDisposition::Completed(OutcomeKind::Success)
        );
        assert_eq!(recorder.count(), 1);
    }

    #[test]
    fn test_wrong_handle_and_premature_events() {
        let mut session = PaymentSession::new(patterns(), detached_listener());
        let own = session.handle();
        assert!(matches!(
            session.handle_navigation_event(own, "shopapp://ipay88/success"),
            Err(PaymentError::InvalidState(_))
        ));
        assert!(matches!(
            session.complete(PaymentOutcome::Success(PaymentSuccess::default())),
            Err(PaymentError::InvalidState(_))
        ));

        session.start(request()).unwrap();
        let other = PaymentSession::new(patterns(), detached_listener()).handle();
        assert!(matches!(
            session.handle_navigation_event(other, "shopapp://ipay88/success"),
            Err(PaymentError::SessionNotFound { .. })
        ));
    }

    #[test]
    fn test_dropped_listener_does_not_fault() {
        let recorder = Arc::new(Recorder::default());
        let (mut session, handle) = started(&recorder);
        drop(recorder);

        let disposition = session
            .handle_navigation_event(handle, "shopapp://ipay88/success?RefNo=REF123")
            .unwrap();
        assert_eq!(
            disposition,
            NavigationDisposition::Completed(OutcomeKind::Success)
        );
        assert!(session.is_completed());
    }

    #[test]
    fn test_handle_parse() {
        let session = PaymentSession::new(patterns(), detached_listener());
        let rendered = session.handle().to_string();
        assert_eq!(SessionHandle::parse(&rendered).unwrap(), session.handle());
        assert!(SessionHandle::parse("nope").is_err());
    }

    #[tokio::test]
    async fn test_session_requery_uses_request_reference() {
        struct EchoBackend;

        #[async_trait]
        impl RequeryBackend for EchoBackend {
            async fn query_status(
                &self,
                query: &RequeryQuery,
            ) -> PaymentResult<crate::gateway::RequeryStatus> {
                assert_eq!(query.ref_no, "REF123");
                assert_eq!(query.merchant_code, "M001");
                Ok(RequeryStatus::new("00"))
            }
        }

        let mut session = PaymentSession::new(patterns(), detached_listener());
        assert!(session.requery(&EchoBackend, None).await.is_err());

        session.start(request()).unwrap();
        let outcome = session.requery(&EchoBackend, None).await.unwrap();
        assert_eq!(
            outcome,
            RequeryOutcome::RequerySuccess(RequerySuccess {
                ref_no: "REF123".into(),
                merchant_code: "M001".into(),
                amount: "25.50".into(),
                result_code: "00".into(),
            })
        );
    }
}
