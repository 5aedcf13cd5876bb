//! In-memory fakes for the engine's ports and time source.
//!
//! Used by the crate's own tests and available to downstream crates
//! that want to exercise the engine without a platform behind it.

use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};

use crate::alarm::AlarmInstance;
use crate::clock::Clock;
use crate::error::SounderError;
use crate::ports::{Notifier, Sounder};

/// A clock that only moves when told to.
///
/// Cloning shares the underlying time, so a test can keep a handle
/// while the engine owns another.
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// What a notifier was asked to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shown {
    Low(i64),
    High(i64),
    Snooze(i64, DateTime<Utc>),
    Missed(i64),
    PreAlarmDismissed(i64),
    Cleared(i64),
}

/// Records every notification call; shared so tests can inspect it
/// after handing a clone to the engine.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    calls: Arc<Mutex<Vec<Shown>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Shown> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn push(&self, shown: Shown) {
        self.calls.lock().unwrap().push(shown);
    }
}

impl Notifier for RecordingNotifier {
    fn show_low(&mut self, instance: &AlarmInstance) {
        self.push(Shown::Low(instance.id));
    }

    fn show_high(&mut self, instance: &AlarmInstance) {
        self.push(Shown::High(instance.id));
    }

    fn show_snooze(&mut self, instance: &AlarmInstance, until: DateTime<Utc>) {
        self.push(Shown::Snooze(instance.id, until));
    }

    fn show_missed(&mut self, instance: &AlarmInstance) {
        self.push(Shown::Missed(instance.id));
    }

    fn show_pre_alarm_dismissed(&mut self, instance: &AlarmInstance) {
        self.push(Shown::PreAlarmDismissed(instance.id));
    }

    fn clear(&mut self, instance_id: i64) {
        self.push(Shown::Cleared(instance_id));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SounderCall {
    Start {
        instance_id: i64,
        pre_alarm: bool,
        in_call: bool,
    },
    Stop,
}

/// Records sounder starts/stops and tracks whether it is "playing";
/// can be told to fail to exercise the fallback path.
#[derive(Debug, Clone, Default)]
pub struct RecordingSounder {
    inner: Arc<Mutex<RecordingSounderState>>,
}

#[derive(Debug, Default)]
struct RecordingSounderState {
    calls: Vec<SounderCall>,
    playing: bool,
    fail_next_start: bool,
}

impl RecordingSounder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<SounderCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn is_playing(&self) -> bool {
        self.inner.lock().unwrap().playing
    }

    pub fn start_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| matches!(c, SounderCall::Start { .. }))
            .count()
    }

    pub fn fail_next_start(&self) {
        self.inner.lock().unwrap().fail_next_start = true;
    }
}

impl Sounder for RecordingSounder {
    fn start(
        &mut self,
        instance: &AlarmInstance,
        pre_alarm: bool,
        in_call: bool,
    ) -> Result<(), SounderError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(SounderCall::Start {
            instance_id: instance.id,
            pre_alarm,
            in_call,
        });
        if inner.fail_next_start {
            inner.fail_next_start = false;
            return Err(SounderError::NoTone {
                fallback: "default".into(),
            });
        }
        inner.playing = true;
        Ok(())
    }

    fn stop(&mut self) {
        let mut inner = self.inner.lock().unwrap();
        // Idempotent: stopping while silent records nothing.
        if inner.playing {
            inner.calls.push(SounderCall::Stop);
            inner.playing = false;
        }
    }
}
