use signal_framework::{join_all, joined, Signal, SignalError};
use std::time::Duration;

#[tokio::test]
async fn join_completes_when_members_resolve_on_other_tasks() {
    let members: Vec<Signal> = (0..8)
        .map(|i| Signal::new(format!("worker {i} finished")))
        .collect();
    let all_done = joined("all workers finished", members.clone());

    for (i, member) in members.into_iter().enumerate() {
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(8 - i as u64)).await;
            member.succeed();
        });
    }

    let outcome = tokio::time::timeout(Duration::from_secs(2), all_done.wait())
        .await
        .expect("join did not complete");
    assert_eq!(outcome, Ok(true));
}

#[tokio::test]
async fn join_fails_fast_while_stragglers_are_pending() {
    let slow = Signal::new("never resolves in this test");
    let failing = Signal::new("fails");
    let target = Signal::new("target");
    join_all(vec![slow.clone(), failing.clone()], &target);

    let remote = failing.clone();
    tokio::spawn(async move {
        remote.fail(SignalError::failed("start failed"));
    });

    let outcome = tokio::time::timeout(Duration::from_secs(2), target.wait())
        .await
        .expect("fail-fast did not fire");
    assert_eq!(outcome, Err(SignalError::failed("start failed")));
    assert!(!slow.is_resolved());
}

#[tokio::test]
async fn failed_result_is_kept_after_a_late_success() {
    let started = Signal::new("resolves when orders has started");
    started.fail(SignalError::failed("transient"));

    // A retry that genuinely starts later does not overwrite the first result.
    assert!(!started.succeed());
    assert_eq!(started.wait().await, Err(SignalError::failed("transient")));
}

#[tokio::test]
async fn nested_joins_compose() {
    let a = Signal::new("a");
    let b = Signal::new("b");
    let c = Signal::new("c");
    let ab = joined("a and b", vec![a.clone(), b.clone()]);
    let abc = joined("ab and c", vec![ab, c.clone()]);

    c.resolve(Ok(false));
    a.succeed();
    b.succeed();
    assert_eq!(abc.wait().await, Ok(false));
}
