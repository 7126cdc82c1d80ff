use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::trigger::{ShutdownSignal, TerminationCause, TerminationTrigger};

/// SIGINT/SIGTERM handlers, installed before registration starts so an early signal is not lost.
pub struct SignalListener {
    interrupt: Signal,
    terminate: Signal,
}

impl SignalListener {
    /// Must be called from within a tokio runtime.
    pub fn install() -> Result<Self, std::io::Error> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    /// Wait for the first signal and fire the trigger with it. Returns `None` if teardown
    /// started through another path first.
    pub async fn listen(mut self, trigger: TerminationTrigger) -> Option<ShutdownSignal> {
        let received = tokio::select! {
            _ = self.interrupt.recv() => ShutdownSignal::Interrupt,
            _ = self.terminate.recv() => ShutdownSignal::Terminate,
            _ = trigger.cancelled() => {
                debug!("termination already triggered, signal listener exiting");
                return None;
            }
        };

        info!(signal = %received, "caught signal");
        trigger.fire(TerminationCause::Signal(received));
        Some(received)
    }

    pub fn spawn(self, trigger: TerminationTrigger) -> JoinHandle<Option<ShutdownSignal>> {
        tokio::spawn(self.listen(trigger))
    }
}
