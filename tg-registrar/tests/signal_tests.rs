// Raising a real signal affects the whole process, so this lives in its own test binary and
// keeps to a single test.

use std::time::Duration;

use nix::sys::signal::{raise, Signal};

use tg_registrar::config::{InstanceSource, Settings};
use tg_registrar::control_plane::{ClientCall, MockTargetGroupClient};
use tg_registrar::membership::InstanceId;
use tg_registrar::metadata::MockMetadataSource;
use tg_registrar::{Outcome, Registrar, ShutdownSignal, TerminationCause};

#[tokio::test]
async fn sigterm_deregisters_every_target_group_in_order() {
    let client = MockTargetGroupClient::new();
    let settings = Settings {
        instance: InstanceSource::Literal(InstanceId::new("i-abc")),
        target_groups: "tg-1,tg-2,tg-3".parse().unwrap(),
        preemption: None,
    };

    let handle = tokio::spawn(
        Registrar::new(settings, client.clone(), MockMetadataSource::unavailable()).run(),
    );

    // Handlers are installed before the first register call.
    tokio::time::timeout(Duration::from_secs(5), async {
        while client.calls().len() < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("registration did not finish");

    raise(Signal::SIGTERM).expect("failed to raise SIGTERM");

    let outcome = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("teardown did not finish")
        .unwrap()
        .unwrap();

    assert!(matches!(
        outcome,
        Outcome::Deregistered {
            cause: TerminationCause::Signal(ShutdownSignal::Terminate),
            ..
        }
    ));
    assert!(outcome.report().is_clean());
    assert_eq!(
        client.calls(),
        vec![
            ClientCall::register("i-abc", "tg-1"),
            ClientCall::register("i-abc", "tg-2"),
            ClientCall::register("i-abc", "tg-3"),
            ClientCall::deregister("i-abc", "tg-1"),
            ClientCall::deregister("i-abc", "tg-2"),
            ClientCall::deregister("i-abc", "tg-3"),
        ]
    );
}
