use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::metadata::MetadataSource;
use crate::metrics;
use crate::trigger::{TerminationCause, TerminationTrigger};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Why the monitor stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorExit {
    /// Metadata was unreachable at start; nothing was polled.
    Unavailable,
    /// A notice was seen and the trigger was fired.
    NoticeReceived,
    /// Teardown started through another path.
    Cancelled,
}

/// Polls the spot termination notice and fires the termination trigger at most once.
pub struct PreemptionMonitor<M> {
    source: M,
    trigger: TerminationTrigger,
    poll_interval: Duration,
}

impl<M: MetadataSource> PreemptionMonitor<M> {
    pub fn new(source: M, trigger: TerminationTrigger, poll_interval: Duration) -> Self {
        Self {
            source,
            trigger,
            poll_interval,
        }
    }

    pub async fn run(self) -> MonitorExit {
        info!("monitoring spot termination notice");
        info!("instance MetadataOptions.HttpTokens must be optional to see the termination notice");

        let available = tokio::select! {
            biased;

            _ = self.trigger.cancelled() => return self.stopped(),
            available = self.source.is_available() => available,
        };
        if !available {
            warn!("instance metadata service is not available, not monitoring spot termination");
            return MonitorExit::Unavailable;
        }

        let start = Instant::now() + self.poll_interval;
        let mut interval = time::interval_at(start, self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = self.trigger.cancelled() => return self.stopped(),
                _ = interval.tick() => {}
            }

            let notice = tokio::select! {
                biased;

                _ = self.trigger.cancelled() => return self.stopped(),
                notice = self.source.termination_notice() => notice,
            };

            match notice {
                Ok(true) => {
                    metrics::emit_preemption_poll("notice");
                    info!("spot instance termination notice received");
                    self.trigger.fire(TerminationCause::PreemptionNotice);
                    return MonitorExit::NoticeReceived;
                }
                Ok(false) => {
                    metrics::emit_preemption_poll("no_notice");
                    debug!("no termination notice, continuing monitoring");
                }
                Err(e) => {
                    metrics::emit_preemption_poll("error");
                    error!(error = %e, "error checking termination notice");
                }
            }
        }
    }

    fn stopped(&self) -> MonitorExit {
        info!("stopping monitoring of spot termination notice");
        MonitorExit::Cancelled
    }
}

impl<M: MetadataSource + 'static> PreemptionMonitor<M> {
    pub fn spawn(self) -> JoinHandle<MonitorExit> {
        tokio::spawn(self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{MockMetadataSource, NoticeResponse};
    use crate::trigger::ShutdownSignal;

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_on_first_notice_and_stops_polling() {
        let source = MockMetadataSource::new("i-abc").with_notice(|poll| {
            if poll >= 1 {
                NoticeResponse::Present
            } else {
                NoticeResponse::Absent
            }
        });
        let trigger = TerminationTrigger::new();
        let started = Instant::now();

        let exit = PreemptionMonitor::new(source.clone(), trigger.clone(), DEFAULT_POLL_INTERVAL)
            .run()
            .await;

        assert_eq!(exit, MonitorExit::NoticeReceived);
        assert_eq!(trigger.cause(), Some(TerminationCause::PreemptionNotice));
        assert_eq!(source.polls(), 2);
        assert_eq!(started.elapsed(), DEFAULT_POLL_INTERVAL * 2);

        time::advance(DEFAULT_POLL_INTERVAL * 10).await;
        assert_eq!(source.polls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_errors_do_not_stop_monitoring() {
        let source = MockMetadataSource::new("i-abc").with_notice(|poll| match poll {
            0 | 1 => NoticeResponse::TransportError,
            2 => NoticeResponse::Absent,
            _ => NoticeResponse::Present,
        });
        let trigger = TerminationTrigger::new();

        let exit = PreemptionMonitor::new(source.clone(), trigger.clone(), DEFAULT_POLL_INTERVAL)
            .run()
            .await;

        assert_eq!(exit, MonitorExit::NoticeReceived);
        assert_eq!(source.polls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_metadata_exits_without_polling() {
        let source = MockMetadataSource::unavailable();
        let trigger = TerminationTrigger::new();

        let exit = PreemptionMonitor::new(source.clone(), trigger.clone(), DEFAULT_POLL_INTERVAL)
            .run()
            .await;

        assert_eq!(exit, MonitorExit::Unavailable);
        assert_eq!(source.polls(), 0);
        assert!(!trigger.is_fired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_within_one_interval_when_triggered_elsewhere() {
        let source = MockMetadataSource::new("i-abc");
        let trigger = TerminationTrigger::new();

        let handle =
            PreemptionMonitor::new(source.clone(), trigger.clone(), DEFAULT_POLL_INTERVAL).spawn();

        time::sleep(DEFAULT_POLL_INTERVAL * 3 + Duration::from_millis(1)).await;
        assert_eq!(source.polls(), 3);

        trigger.fire(TerminationCause::Signal(ShutdownSignal::Terminate));
        let exit = time::timeout(DEFAULT_POLL_INTERVAL, handle)
            .await
            .expect("monitor did not stop")
            .unwrap();

        assert_eq!(exit, MonitorExit::Cancelled);
        assert_eq!(source.polls(), 3);
        assert_eq!(
            trigger.cause(),
            Some(TerminationCause::Signal(ShutdownSignal::Terminate))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_fired_trigger_means_no_polls() {
        let source = MockMetadataSource::new("i-abc").with_notice(|_| NoticeResponse::Present);
        let trigger = TerminationTrigger::new();
        trigger.fire(TerminationCause::RegistrationFailure);

        let exit = PreemptionMonitor::new(source.clone(), trigger.clone(), DEFAULT_POLL_INTERVAL)
            .run()
            .await;

        assert_eq!(exit, MonitorExit::Cancelled);
        assert_eq!(source.polls(), 0);
        assert_eq!(trigger.cause(), Some(TerminationCause::RegistrationFailure));
    }
}
