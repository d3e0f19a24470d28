//! Per-subscription re-entrancy guard: a subscription must not run
//! re-entrantly; a trigger arriving mid-run is coalesced into one queued
//! follow-up run, further triggers collapse into that same follow-up.
//!
//! Mirrors the `Arc<Mutex<_>>`-guarded shared state the job executor uses
//! for its run counters, scoped down to the three states a single
//! subscription can be in.

use std::collections::HashMap;
use std::sync::Mutex;

use epcis_core::SubscriptionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Running,
    RunningWithFollowUp,
}

/// What the caller should do after asking to start a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// No run in flight; go ahead.
    Start,
    /// A run is already in flight; this trigger was coalesced into the
    /// queued follow-up (or absorbed into an already-queued one).
    Coalesced,
}

#[derive(Debug, Default)]
pub struct CoalesceTracker {
    slots: Mutex<HashMap<SubscriptionId, Slot>>,
}

impl CoalesceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_start(&self, id: SubscriptionId) -> StartOutcome {
        let mut slots = self.slots.lock().expect("coalesce tracker mutex poisoned");
        match slots.get(&id) {
            None => {
                slots.insert(id, Slot::Running);
                StartOutcome::Start
            }
            Some(Slot::Running) => {
                slots.insert(id, Slot::RunningWithFollowUp);
                StartOutcome::Coalesced
            }
            Some(Slot::RunningWithFollowUp) => StartOutcome::Coalesced,
        }
    }

    /// Call when a run finishes. Returns `true` if a follow-up run was
    /// queued while this run was in flight — the caller must start another
    /// run immediately (which itself calls `try_start` again).
    pub fn finish(&self, id: SubscriptionId) -> bool {
        let mut slots = self.slots.lock().expect("coalesce tracker mutex poisoned");
        match slots.remove(&id) {
            Some(Slot::RunningWithFollowUp) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_fresh_subscription_starts_immediately() {
        let tracker = CoalesceTracker::new();
        let id = SubscriptionId::new();
        assert_eq!(tracker.try_start(id), StartOutcome::Start);
    }

    #[test]
    fn triggers_while_running_are_coalesced_into_one_follow_up() {
        let tracker = CoalesceTracker::new();
        let id = SubscriptionId::new();

        assert_eq!(tracker.try_start(id), StartOutcome::Start);
        assert_eq!(tracker.try_start(id), StartOutcome::Coalesced);
        assert_eq!(tracker.try_start(id), StartOutcome::Coalesced);

        assert!(tracker.finish(id), "a follow-up was queued while running");
        assert_eq!(tracker.try_start(id), StartOutcome::Start);
    }

    #[test]
    fn finishing_with_no_follow_up_clears_the_slot() {
        let tracker = CoalesceTracker::new();
        let id = SubscriptionId::new();

        assert_eq!(tracker.try_start(id), StartOutcome::Start);
        assert!(!tracker.finish(id));
        assert_eq!(tracker.try_start(id), StartOutcome::Start);
    }

    #[test]
    fn different_subscriptions_never_block_each_other() {
        let tracker = CoalesceTracker::new();
        let a = SubscriptionId::new();
        let b = SubscriptionId::new();

        assert_eq!(tracker.try_start(a), StartOutcome::Start);
        assert_eq!(tracker.try_start(b), StartOutcome::Start);
    }
}
