//! Time source: "now" plus one-shot wake-up scheduling.
//!
//! The engine never reads the system clock directly and never sleeps.
//! It asks a [`Clock`] for the current time and hands future work to a
//! [`WakeScheduler`]; the caller decides when to drain due wake-ups
//! back into the engine. This is the seam that makes every clock-jump
//! and reboot scenario testable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::alarm::InstanceState;

/// Current wall-clock time.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// The real clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Why a wake-up was scheduled. Stale-generation wake-ups are dropped
/// unless they carry a user-action override tag, so in-flight snoozes
/// and dismisses survive a reboot race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WakeTag {
    Normal,
    Snooze,
    Dismiss,
}

/// A pending one-shot wake-up for one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledWake {
    pub instance_id: i64,
    pub at: DateTime<Utc>,
    /// State the instance should move to when this fires.
    pub target: InstanceState,
    /// Generation the wake was scheduled under.
    pub generation: i64,
    pub tag: WakeTag,
}

/// One-shot wake-up scheduler keyed by instance id.
///
/// Scheduling for an id that already has a pending wake replaces it;
/// there is never more than one pending wake per instance. Cancelling
/// an id with nothing pending is a no-op.
pub trait WakeScheduler {
    fn schedule(&mut self, wake: ScheduledWake);
    fn cancel(&mut self, instance_id: i64);
    /// Remove and return every wake due at or before `now`, soonest
    /// first.
    fn take_due(&mut self, now: DateTime<Utc>) -> Vec<ScheduledWake>;
    /// Snapshot of pending wakes, soonest first.
    fn pending(&self) -> Vec<ScheduledWake>;
}

/// In-process [`WakeScheduler`]: the engine's inbox of future work,
/// standing in for the OS exact-alarm scheduler.
#[derive(Debug, Default)]
pub struct WakeQueue {
    by_instance: BTreeMap<i64, ScheduledWake>,
}

impl WakeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Earliest pending wake time, if any.
    pub fn next_at(&self) -> Option<DateTime<Utc>> {
        self.by_instance.values().map(|w| w.at).min()
    }

    pub fn is_empty(&self) -> bool {
        self.by_instance.is_empty()
    }
}

impl WakeScheduler for WakeQueue {
    fn schedule(&mut self, wake: ScheduledWake) {
        self.by_instance.insert(wake.instance_id, wake);
    }

    fn cancel(&mut self, instance_id: i64) {
        self.by_instance.remove(&instance_id);
    }

    fn take_due(&mut self, now: DateTime<Utc>) -> Vec<ScheduledWake> {
        let due_ids: Vec<i64> = self
            .by_instance
            .iter()
            .filter(|(_, w)| w.at <= now)
            .map(|(id, _)| *id)
            .collect();
        let mut due: Vec<ScheduledWake> = due_ids
            .into_iter()
            .filter_map(|id| self.by_instance.remove(&id))
            .collect();
        due.sort_by_key(|w| w.at);
        due
    }

    fn pending(&self) -> Vec<ScheduledWake> {
        let mut wakes: Vec<ScheduledWake> = self.by_instance.values().cloned().collect();
        wakes.sort_by_key(|w| w.at);
        wakes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn wake(id: i64, minute: u32) -> ScheduledWake {
        ScheduledWake {
            instance_id: id,
            at: Utc.with_ymd_and_hms(2026, 8, 28, 8, minute, 0).unwrap(),
            target: InstanceState::Fired,
            generation: 1,
            tag: WakeTag::Normal,
        }
    }

    #[test]
    fn reschedule_replaces_pending_wake() {
        let mut queue = WakeQueue::new();
        queue.schedule(wake(1, 0));
        queue.schedule(wake(1, 30));
        assert_eq!(queue.pending().len(), 1);
        assert_eq!(queue.pending()[0].at.format("%M").to_string(), "30");
    }

    #[test]
    fn take_due_removes_and_orders() {
        let mut queue = WakeQueue::new();
        queue.schedule(wake(2, 20));
        queue.schedule(wake(1, 10));
        queue.schedule(wake(3, 50));

        let now = Utc.with_ymd_and_hms(2026, 8, 28, 8, 30, 0).unwrap();
        let due = queue.take_due(now);
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].instance_id, 1);
        assert_eq!(due[1].instance_id, 2);
        assert_eq!(queue.pending().len(), 1);

        // Draining again with no time passing yields nothing.
        assert!(queue.take_due(now).is_empty());
    }

    #[test]
    fn cancel_missing_is_noop() {
        let mut queue = WakeQueue::new();
        queue.cancel(42);
        assert!(queue.is_empty());
    }
}
