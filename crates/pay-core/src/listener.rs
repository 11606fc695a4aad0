//! # Result Listener
//!
//! The contract an integrating application implements to receive outcomes.
//! One method per outcome variant; each receives that variant's named fields.
//!
//! Sessions hold the listener through a [`Weak`] reference: the application
//! owns it, and a listener that has been dropped simply receives nothing.
//! Errors and panics raised by a listener are logged at the delivery boundary
//! and never reach the session state machine.

use crate::error::PaymentResult;
use crate::outcome::{
    PaymentCancellation, PaymentFailure, PaymentOutcome, PaymentSuccess, RequeryFailure,
    RequeryOutcome, RequerySuccess,
};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};

/// Outcome callbacks.
///
/// Every method has a logging default so implementors override only what
/// they act on.
#[allow(unused_variables)]
pub trait ResultListener: Send + Sync {
    /// Called once when a session completes successfully
    fn payment_success(&self, success: &PaymentSuccess) -> PaymentResult<()> {
        info!(
            "Payment succeeded: ref_no={}, trans_id={}, amount={}",
            success.ref_no, success.trans_id, success.amount
        );
        Ok(())
    }

    /// Called once when a session fails
    fn payment_failed(&self, failure: &PaymentFailure) -> PaymentResult<()> {
        warn!(
            "Payment failed: ref_no={}, error={}",
            failure.ref_no, failure.error_description
        );
        Ok(())
    }

    /// Called once when the payer cancels
    fn payment_cancelled(&self, cancellation: &PaymentCancellation) -> PaymentResult<()> {
        info!("Payment cancelled: ref_no={}", cancellation.ref_no);
        Ok(())
    }

    /// Called when a status lookup confirms the payment
    fn requery_success(&self, success: &RequerySuccess) -> PaymentResult<()> {
        info!(
            "Requery succeeded: ref_no={}, result_code={}",
            success.ref_no, success.result_code
        );
        Ok(())
    }

    /// Called when a status lookup fails or cannot be completed
    fn requery_failed(&self, failure: &RequeryFailure) -> PaymentResult<()> {
        warn!(
            "Requery failed: ref_no={}, error={}",
            failure.ref_no, failure.error_description
        );
        Ok(())
    }
}

/// Listener that only logs
pub struct LoggingListener;

impl ResultListener for LoggingListener {}

/// Non-owning handle to an application's listener
pub fn listener_ref<L: ResultListener + 'static>(listener: &Arc<L>) -> Weak<dyn ResultListener> {
    let weak: Weak<L> = Arc::downgrade(listener);
    weak
}

/// A handle that never upgrades (no listener registered)
pub fn detached_listener() -> Weak<dyn ResultListener> {
    Weak::<LoggingListener>::new()
}

/// What happened when an outcome was handed to a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The application dropped its listener
    ListenerGone,
    /// The listener returned an error
    ListenerFailed,
    /// The listener panicked
    ListenerPanicked,
}

/// Hand a checkout outcome to the listener
pub fn deliver_payment_outcome(
    listener: &Weak<dyn ResultListener>,
    outcome: &PaymentOutcome,
) -> Delivery {
    deliver(listener, outcome.ref_no(), |l| match outcome {
        PaymentOutcome::Success(success) => l.payment_success(success),
        PaymentOutcome::Failed(failure) => l.payment_failed(failure),
        PaymentOutcome::Cancelled(cancellation) => l.payment_cancelled(cancellation),
    })
}

/// Hand a requery outcome to the listener
pub fn deliver_requery_outcome(
    listener: &Weak<dyn ResultListener>,
    outcome: &RequeryOutcome,
) -> Delivery {
    deliver(listener, outcome.ref_no(), |l| match outcome {
        RequeryOutcome::RequerySuccess(success) => l.requery_success(success),
        RequeryOutcome::RequeryFailed(failure) => l.requery_failed(failure),
    })
}

fn deliver<F>(listener: &Weak<dyn ResultListener>, ref_no: &str, notify: F) -> Delivery
where
    F: FnOnce(&dyn ResultListener) -> PaymentResult<()>,
{
    let Some(listener) = listener.upgrade() else {
        debug!("Listener dropped, outcome for {} not delivered", ref_no);
        return Delivery::ListenerGone;
    };

    match panic::catch_unwind(AssertUnwindSafe(|| notify(listener.as_ref()))) {
        Ok(Ok(())) => Delivery::Delivered,
        Ok(Err(e)) => {
            error!("Listener error for {}: {}", ref_no, e);
            Delivery::ListenerFailed
        }
        Err(_) => {
            error!("Listener panicked while handling outcome for {}", ref_no);
            Delivery::ListenerPanicked
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PaymentError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingListener {
        successes: AtomicUsize,
        requery_failures: AtomicUsize,
    }

    impl ResultListener for CountingListener {
        fn payment_success(&self, _success: &PaymentSuccess) -> PaymentResult<()> {
            self.successes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn requery_failed(&self, _failure: &RequeryFailure) -> PaymentResult<()> {
            self.requery_failures.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FaultyListener;

    impl ResultListener for FaultyListener {
        fn payment_success(&self, _success: &PaymentSuccess) -> PaymentResult<()> {
            Err(PaymentError::Internal("ledger unavailable".into()))
        }

        fn payment_failed(&self, _failure: &PaymentFailure) -> PaymentResult<()> {
            panic!("listener bug");
        }
    }

    fn success() -> PaymentOutcome {
        PaymentOutcome::Success(PaymentSuccess {
            ref_no: "REF1".into(),
            ..Default::default()
        })
    }

    #[test]
    fn test_dispatch_by_variant() {
        let listener = Arc::new(CountingListener {
            successes: AtomicUsize::new(0),
            requery_failures: AtomicUsize::new(0),
        });
        let weak = listener_ref(&listener);

        assert_eq!(deliver_payment_outcome(&weak, &success()), Delivery::Delivered);
        let requery = RequeryOutcome::RequeryFailed(RequeryFailure::default());
        assert_eq!(deliver_requery_outcome(&weak, &requery), Delivery::Delivered);

        assert_eq!(listener.successes.load(Ordering::SeqCst), 1);
        assert_eq!(listener.requery_failures.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropped_listener_is_noop() {
        let listener = Arc::new(LoggingListener);
        let weak = listener_ref(&listener);
        drop(listener);

        assert_eq!(deliver_payment_outcome(&weak, &success()), Delivery::ListenerGone);
        assert_eq!(
            deliver_payment_outcome(&detached_listener(), &success()),
            Delivery::ListenerGone
        );
    }

    #[test]
    fn test_listener_errors_and_panics_are_contained() {
        let listener = Arc::new(FaultyListener);
        let weak = listener_ref(&listener);

        assert_eq!(deliver_payment_outcome(&weak, &success()), Delivery::ListenerFailed);

        let failed = PaymentOutcome::Failed(PaymentFailure::default());
        assert_eq!(deliver_payment_outcome(&weak, &failed), Delivery::ListenerPanicked);
    }
}
