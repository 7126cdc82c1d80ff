//! Registration lifecycle state machine.
//!
//! A single coordinator task owns every [`MembershipState`] transition and is the only caller of
//! the control plane. Background tasks (signal listener, pre-emption monitor) only fire the
//! shared [`TerminationTrigger`]; they never run teardown themselves.

use std::process::ExitCode;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::control_plane::TargetGroupClient;
use crate::error::ApiError;
use crate::membership::{MembershipContext, MembershipState, TargetGroupId};
use crate::metrics;
use crate::trigger::{TerminationCause, TerminationTrigger};

/// Result of one deregistration pass, in target group order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub deregistered: Vec<TargetGroupId>,
    pub failed: Vec<(TargetGroupId, ApiError)>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Terminal result of [`Coordinator::run`]. The caller turns it into a process exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Teardown ran because of a termination trigger, possibly before registration finished.
    Deregistered {
        cause: TerminationCause,
        report: TeardownReport,
    },
    /// A registration call failed; every target group was then deregistered.
    RegistrationFailed {
        target_group: TargetGroupId,
        error: ApiError,
        report: TeardownReport,
    },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Deregistered { .. })
    }

    pub fn report(&self) -> &TeardownReport {
        match self {
            Outcome::Deregistered { report, .. } => report,
            Outcome::RegistrationFailed { report, .. } => report,
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        if self.is_success() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }
}

enum Registration {
    Complete,
    Interrupted(TerminationCause),
    Failed {
        target_group: TargetGroupId,
        error: ApiError,
    },
}

pub struct Coordinator<C> {
    context: Arc<MembershipContext>,
    client: C,
    trigger: TerminationTrigger,
    state: MembershipState,
}

impl<C: TargetGroupClient> Coordinator<C> {
    pub fn new(context: Arc<MembershipContext>, client: C, trigger: TerminationTrigger) -> Self {
        Self {
            context,
            client,
            trigger,
            state: MembershipState::Unregistered,
        }
    }

    pub fn state(&self) -> MembershipState {
        self.state
    }

    /// Register in every target group, wait for the first termination trigger, then deregister
    /// from every target group. Consumes the coordinator, so teardown runs at most once.
    pub async fn run(mut self) -> Outcome {
        self.advance(MembershipState::Registering);

        match self.register_all().await {
            Registration::Complete => {
                self.advance(MembershipState::Registered);
                info!(
                    instance_id = %self.context.instance_id,
                    "registered instance in all target groups, waiting for termination"
                );

                let cause = self.trigger.fired().await;
                let report = self.teardown(cause).await;
                Outcome::Deregistered { cause, report }
            }
            Registration::Interrupted(cause) => {
                warn!(cause = %cause, "termination triggered before registration completed");
                let report = self.teardown(cause).await;
                Outcome::Deregistered { cause, report }
            }
            Registration::Failed {
                target_group,
                error,
            } => {
                // Stops the pre-emption monitor and signal listener as well.
                self.trigger.fire(TerminationCause::RegistrationFailure);

                // Every target group is deregistered, including ones never registered.
                let report = self.teardown(TerminationCause::RegistrationFailure).await;
                error!(
                    target_group = %target_group,
                    error_code = error.code(),
                    "failed to register instance in all target groups, deregistered and quitting"
                );
                Outcome::RegistrationFailed {
                    target_group,
                    error,
                    report,
                }
            }
        }
    }

    async fn register_all(&self) -> Registration {
        let instance_id = &self.context.instance_id;

        for target_group in self.context.target_groups.iter() {
            // Best effort: a trigger that lands during a call is seen before the next one.
            if let Some(cause) = self.trigger.cause() {
                return Registration::Interrupted(cause);
            }

            info!(
                instance_id = %instance_id,
                target_group = %target_group,
                "setting up instance in target group"
            );

            match self.client.register(instance_id, target_group).await {
                Ok(()) => {
                    metrics::emit_register(target_group.as_str(), "ok");
                    info!(target_group = %target_group, "registered instance");
                }
                Err(error) => {
                    metrics::emit_register(target_group.as_str(), error.code());
                    error!(
                        target_group = %target_group,
                        error_code = error.code(),
                        error = %error,
                        "failed to register instance"
                    );
                    return Registration::Failed {
                        target_group: target_group.clone(),
                        error,
                    };
                }
            }
        }

        Registration::Complete
    }

    async fn teardown(&mut self, cause: TerminationCause) -> TeardownReport {
        let mut report = TeardownReport::default();
        if !self.advance(MembershipState::Deregistering) {
            return report;
        }

        info!(cause = %cause, "deregistering instance from all target groups");
        let context = Arc::clone(&self.context);
        let instance_id = &context.instance_id;

        for target_group in context.target_groups.iter() {
            info!(
                instance_id = %instance_id,
                target_group = %target_group,
                "removing instance from target group"
            );

            match self.client.deregister(instance_id, target_group).await {
                Ok(()) => {
                    metrics::emit_deregister(target_group.as_str(), "ok");
                    info!(target_group = %target_group, "deregistered instance");
                    report.deregistered.push(target_group.clone());
                }
                Err(error) => {
                    metrics::emit_deregister(target_group.as_str(), error.code());
                    error!(
                        target_group = %target_group,
                        error_code = error.code(),
                        error = %error,
                        "failed to deregister instance, continuing with remaining target groups"
                    );
                    report.failed.push((target_group.clone(), error));
                }
            }
        }

        self.advance(MembershipState::Deregistered);
        if report.is_clean() {
            info!("deregistered instance from all target groups");
        } else {
            warn!(
                failed = report.failed.len(),
                "deregistration finished with failures"
            );
        }

        report
    }

    fn advance(&mut self, next: MembershipState) -> bool {
        if !self.state.can_advance_to(next) {
            error!(from = %self.state, to = %next, "refusing membership state transition");
            return false;
        }

        debug!(from = %self.state, to = %next, "membership state transition");
        self.state = next;
        true
    }
}
