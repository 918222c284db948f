//! # Join Combiner
//!
//! Folds a fixed set of signals into one target signal.
//!
//! - Empty input resolves the target to `Ok(true)` immediately.
//! - Every success decrements a countdown and ANDs its value into the
//!   aggregate; the last success resolves the target with the aggregate.
//! - Any failure fails the target at once, without waiting for stragglers.
//!   Because the target keeps the first result, later member outcomes are
//!   ignored.

use crate::signal::Signal;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Resolves `target` once every signal in `signals` has resolved.
pub fn join_all<I>(signals: I, target: &Signal)
where
    I: IntoIterator<Item = Signal>,
{
    let signals: Vec<Signal> = signals.into_iter().collect();
    trace!(target = %target, members = signals.len(), "Join");
    if signals.is_empty() {
        target.succeed();
        return;
    }

    let remaining = Arc::new(AtomicUsize::new(signals.len()));
    let all_true = Arc::new(AtomicBool::new(true));
    for member in &signals {
        let remaining = remaining.clone();
        let all_true = all_true.clone();
        let target = target.clone();
        member.on_completion(move |outcome| match outcome {
            Ok(value) => {
                if !value {
                    all_true.store(false, Ordering::SeqCst);
                }
                if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    target.resolve(Ok(all_true.load(Ordering::SeqCst)));
                }
            }
            Err(error) => {
                target.resolve(Err(error.clone()));
            }
        });
    }
}

/// Creates a new signal described by `description` that joins `signals`.
pub fn joined<I>(description: impl Into<String>, signals: I) -> Signal
where
    I: IntoIterator<Item = Signal>,
{
    let target = Signal::new(description);
    join_all(signals, &target);
    target
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SignalError;

    fn pending(n: usize) -> Vec<Signal> {
        (0..n).map(|i| Signal::new(format!("member {i}"))).collect()
    }

    #[test]
    fn empty_join_succeeds_immediately() {
        let target = joined("nothing to wait for", Vec::new());
        assert_eq!(target.outcome(), Some(Ok(true)));
    }

    #[test]
    fn resolves_only_after_every_member() {
        let members = pending(3);
        let target = joined("all three", members.clone());
        members[2].succeed();
        members[0].succeed();
        assert!(!target.is_resolved());
        members[1].succeed();
        assert_eq!(target.outcome(), Some(Ok(true)));
    }

    #[test]
    fn ands_boolean_results() {
        let members = pending(2);
        let target = joined("and", members.clone());
        members[0].resolve(Ok(false));
        members[1].succeed();
        assert_eq!(target.outcome(), Some(Ok(false)));
    }

    #[test]
    fn first_failure_wins_without_waiting() {
        let members = pending(3);
        let target = joined("fail fast", members.clone());
        members[1].fail(SignalError::failed("boom"));
        assert_eq!(target.outcome(), Some(Err(SignalError::failed("boom"))));

        members[0].fail(SignalError::failed("second"));
        members[2].succeed();
        assert_eq!(target.outcome(), Some(Err(SignalError::failed("boom"))));
    }

    #[test]
    fn already_failed_member_fails_synchronously() {
        let failed = Signal::resolved("failed early", Err(SignalError::failed("early")));
        let target = joined("one failed", vec![failed]);
        assert_eq!(target.outcome(), Some(Err(SignalError::failed("early"))));
    }
}
