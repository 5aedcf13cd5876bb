//! Shared harness for engine integration tests.

use chrono::{DateTime, TimeZone, Utc};

use reveille_core::storage::AlarmStore;
use reveille_core::testing::{FixedClock, RecordingNotifier, RecordingSounder};
use reveille_core::{Engine, EnginePolicy, WakeQueue};

pub struct Harness {
    pub engine: Engine,
    pub clock: FixedClock,
    pub notifier: RecordingNotifier,
    pub sounder: RecordingSounder,
}

impl Harness {
    pub fn clock_now(&self) -> DateTime<Utc> {
        use reveille_core::Clock;
        self.clock.now()
    }
}

pub fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 8, 28, h, m, s).unwrap()
}

/// 2026-08-28 (a Friday) at the given time.
pub fn on_day(day: u32, h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 8, day, h, m, 0).unwrap()
}

pub fn harness(start: DateTime<Utc>) -> Harness {
    harness_with_policy(start, EnginePolicy::default())
}

pub fn harness_with_policy(start: DateTime<Utc>, policy: EnginePolicy) -> Harness {
    let clock = FixedClock::at(start);
    let notifier = RecordingNotifier::new();
    let sounder = RecordingSounder::new();
    let engine = Engine::new(
        AlarmStore::open_memory().unwrap(),
        policy,
        Box::new(clock.clone()),
        Box::new(WakeQueue::new()),
        Box::new(notifier.clone()),
        Box::new(sounder.clone()),
    )
    .unwrap();
    Harness {
        engine,
        clock,
        notifier,
        sounder,
    }
}
