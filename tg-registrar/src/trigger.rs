//! First-trigger-wins termination event shared by the signal listener, the pre-emption monitor
//! and the coordinator.

use std::fmt;
use std::sync::{Arc, OnceLock};

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{debug, info};

use crate::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownSignal::Interrupt => f.write_str("SIGINT"),
            ShutdownSignal::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// Why teardown started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationCause {
    Signal(ShutdownSignal),
    PreemptionNotice,
    RegistrationFailure,
}

impl TerminationCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationCause::Signal(ShutdownSignal::Interrupt) => "sigint",
            TerminationCause::Signal(ShutdownSignal::Terminate) => "sigterm",
            TerminationCause::PreemptionNotice => "preemption_notice",
            TerminationCause::RegistrationFailure => "registration_failure",
        }
    }
}

impl fmt::Display for TerminationCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Clone-able handle to a single-fire termination event.
///
/// Any number of producers may call [`fire`](TerminationTrigger::fire); only the first call
/// records its cause. Firing never blocks. Consumers either poll with
/// [`is_fired`](TerminationTrigger::is_fired) or await [`fired`](TerminationTrigger::fired).
/// Background tasks use [`cancelled`](TerminationTrigger::cancelled) as their stop signal.
#[derive(Clone, Default)]
pub struct TerminationTrigger {
    inner: Arc<TriggerInner>,
}

#[derive(Default)]
struct TriggerInner {
    cause: OnceLock<TerminationCause>,
    token: CancellationToken,
}

impl TerminationTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `cause` if nothing has fired yet. Returns true for the first caller only.
    pub fn fire(&self, cause: TerminationCause) -> bool {
        let first = self.inner.cause.set(cause).is_ok();
        metrics::emit_termination_trigger(cause, first);

        if first {
            info!(cause = %cause, "termination trigger fired");
        } else {
            debug!(
                cause = %cause,
                first_cause = ?self.cause(),
                "termination trigger already fired, ignoring"
            );
        }

        // The cause is always set before the token is cancelled.
        self.inner.token.cancel();
        first
    }

    pub fn is_fired(&self) -> bool {
        self.inner.cause.get().is_some()
    }

    pub fn cause(&self) -> Option<TerminationCause> {
        self.inner.cause.get().copied()
    }

    /// Wait for the first trigger and return its cause.
    pub async fn fired(&self) -> TerminationCause {
        self.inner.token.cancelled().await;
        self.cause()
            .expect("termination token is only cancelled after a cause is recorded")
    }

    /// Resolves once any trigger has fired. Use in `tokio::select!` to stop background loops.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.inner.token.cancelled()
    }
}

impl fmt::Debug for TerminationTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerminationTrigger")
            .field("cause", &self.cause())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_first_fire_wins() {
        let trigger = TerminationTrigger::new();
        assert!(!trigger.is_fired());
        assert_eq!(trigger.cause(), None);

        assert!(trigger.fire(TerminationCause::PreemptionNotice));
        assert!(!trigger.fire(TerminationCause::Signal(ShutdownSignal::Terminate)));

        assert!(trigger.is_fired());
        assert_eq!(trigger.fired().await, TerminationCause::PreemptionNotice);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_producers_have_one_winner() {
        let trigger = TerminationTrigger::new();

        let producers: Vec<_> = (0..32)
            .map(|i| {
                let trigger = trigger.clone();
                tokio::spawn(async move {
                    let cause = if i % 2 == 0 {
                        TerminationCause::PreemptionNotice
                    } else {
                        TerminationCause::Signal(ShutdownSignal::Interrupt)
                    };
                    trigger.fire(cause)
                })
            })
            .collect();

        let mut winners = 0;
        for producer in producers {
            if producer.await.unwrap() {
                winners += 1;
            }
        }

        assert_eq!(winners, 1);
        assert!(trigger.cause().is_some());
    }

    #[tokio::test]
    async fn test_waiters_wake_on_fire() {
        let trigger = TerminationTrigger::new();

        let waiter = {
            let trigger = trigger.clone();
            tokio::spawn(async move { trigger.fired().await })
        };
        let stopper = {
            let trigger = trigger.clone();
            tokio::spawn(async move { trigger.cancelled().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        trigger.fire(TerminationCause::Signal(ShutdownSignal::Interrupt));

        let cause = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter timed out")
            .unwrap();
        assert_eq!(cause, TerminationCause::Signal(ShutdownSignal::Interrupt));
        tokio::time::timeout(Duration::from_secs(1), stopper)
            .await
            .expect("stopper timed out")
            .unwrap();
    }
}
