use std::io;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{InstanceSource, Settings};
use crate::control_plane::TargetGroupClient;
use crate::coordinator::{Coordinator, Outcome};
use crate::error::RegistrarError;
use crate::membership::{InstanceId, MembershipContext};
use crate::metadata::MetadataSource;
use crate::preemption::PreemptionMonitor;
use crate::signals::SignalListener;
use crate::trigger::TerminationTrigger;

/// Wires identity resolution, the background trigger sources and the coordinator together.
pub struct Registrar<C, M> {
    settings: Settings,
    client: C,
    metadata: Arc<M>,
    trigger: TerminationTrigger,
    trap_signals: bool,
    install_signals: fn() -> io::Result<SignalListener>,
}

impl<C, M> Registrar<C, M>
where
    C: TargetGroupClient,
    M: MetadataSource + 'static,
{
    pub fn new(settings: Settings, client: C, metadata: M) -> Self {
        Self {
            settings,
            client,
            metadata: Arc::new(metadata),
            trigger: TerminationTrigger::new(),
            trap_signals: true,
            install_signals: SignalListener::install,
        }
    }

    /// Install SIGINT/SIGTERM handlers (default: true).
    pub fn with_trap_signals(mut self, trap_signals: bool) -> Self {
        self.trap_signals = trap_signals;
        self
    }

    /// Handle to the trigger this registrar's coordinator waits on.
    pub fn trigger(&self) -> TerminationTrigger {
        self.trigger.clone()
    }

    async fn resolve_instance_id(&self) -> Result<InstanceId, RegistrarError> {
        match &self.settings.instance {
            InstanceSource::Literal(id) => Ok(id.clone()),
            InstanceSource::Metadata => {
                info!("fetching instance id from EC2 metadata");
                self.metadata
                    .instance_id()
                    .await
                    .map_err(RegistrarError::IdentityResolution)
            }
        }
    }

    /// Resolve identity, start the signal listener and pre-emption monitor, then run the
    /// coordinator to completion. Background tasks are joined before returning.
    pub async fn run(self) -> Result<Outcome, RegistrarError> {
        let instance_id = self.resolve_instance_id().await?;
        let context = Arc::new(MembershipContext::new(
            instance_id,
            self.settings.target_groups.clone(),
        ));

        info!(
            instance_id = %context.instance_id,
            target_group_ids = %context.target_groups,
            monitor_spot = self.settings.preemption.is_some(),
            "effective configuration"
        );

        // Installing handlers is the last fallible step, so nothing is spawned before it succeeds.
        let listener = if self.trap_signals {
            Some((self.install_signals)().map_err(RegistrarError::Signal)?)
        } else {
            None
        };

        let monitor = self.settings.preemption.as_ref().map(|preemption| {
            PreemptionMonitor::new(
                Arc::clone(&self.metadata),
                self.trigger.clone(),
                preemption.poll_interval,
            )
            .spawn()
        });
        let listener = listener.map(|listener| listener.spawn(self.trigger.clone()));

        let outcome = Coordinator::new(context, self.client, self.trigger.clone())
            .run()
            .await;

        // The coordinator only returns after the trigger has fired, which also stops both tasks.
        if let Some(monitor) = monitor {
            match monitor.await {
                Ok(exit) => debug!(exit = ?exit, "pre-emption monitor stopped"),
                Err(e) => warn!(error = %e, "pre-emption monitor task failed"),
            }
        }
        if let Some(listener) = listener {
            match listener.await {
                Ok(signal) => debug!(signal = ?signal, "signal listener stopped"),
                Err(e) => warn!(error = %e, "signal listener task failed"),
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::PreemptionSettings;
    use crate::control_plane::MockTargetGroupClient;
    use crate::metadata::MockMetadataSource;

    fn failing_install() -> io::Result<SignalListener> {
        Err(io::Error::other("signal handlers unavailable"))
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_install_failure_leaves_no_monitor_running() {
        let client = MockTargetGroupClient::new();
        let metadata = MockMetadataSource::new("i-abc");
        let poll_interval = Duration::from_secs(5);
        let settings = Settings {
            instance: InstanceSource::Literal(InstanceId::new("i-abc")),
            target_groups: "tg-1".parse().unwrap(),
            preemption: Some(PreemptionSettings { poll_interval }),
        };

        let mut registrar = Registrar::new(settings, client.clone(), metadata.clone());
        registrar.install_signals = failing_install;

        let result = registrar.run().await;
        assert!(matches!(result, Err(RegistrarError::Signal(_))));

        tokio::time::sleep(poll_interval * 5).await;
        assert_eq!(metadata.polls(), 0);
        assert!(client.calls().is_empty());
    }
}
