use crate::trigger::TerminationCause;

pub(crate) const METRIC_REGISTER: &str = "tg_registrar_register_total";
pub(crate) const METRIC_DEREGISTER: &str = "tg_registrar_deregister_total";
pub(crate) const METRIC_TERMINATION_TRIGGER: &str = "tg_registrar_termination_trigger_total";
pub(crate) const METRIC_PREEMPTION_POLLS: &str = "tg_registrar_preemption_polls_total";

pub(crate) fn emit_register(target_group: &str, result: &str) {
    metrics::counter!(
        METRIC_REGISTER,
        "target_group" => target_group.to_string(),
        "result" => result.to_string()
    )
    .increment(1);
}

pub(crate) fn emit_deregister(target_group: &str, result: &str) {
    metrics::counter!(
        METRIC_DEREGISTER,
        "target_group" => target_group.to_string(),
        "result" => result.to_string()
    )
    .increment(1);
}

pub(crate) fn emit_termination_trigger(cause: TerminationCause, first: bool) {
    metrics::counter!(
        METRIC_TERMINATION_TRIGGER,
        "cause" => cause.as_str(),
        "first" => first.to_string()
    )
    .increment(1);
}

pub(crate) fn emit_preemption_poll(result: &'static str) {
    metrics::counter!(METRIC_PREEMPTION_POLLS, "result" => result).increment(1);
}
