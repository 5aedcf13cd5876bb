//! Shared CLI plumbing: engine construction and console-backed ports.

use chrono::{DateTime, Utc};

use reveille_core::error::SounderError;
use reveille_core::{
    AlarmInstance, AlarmStore, Engine, EnginePolicy, Notifier, Sounder, SystemClock, WakeQueue,
};

/// Notifications rendered as plain lines on stdout.
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn show_low(&mut self, instance: &AlarmInstance) {
        println!(
            "[notify] upcoming alarm {} at {}",
            instance.id, instance.alarm_time
        );
    }

    fn show_high(&mut self, instance: &AlarmInstance) {
        println!(
            "[notify] alarm {} imminent at {}",
            instance.id, instance.alarm_time
        );
    }

    fn show_snooze(&mut self, instance: &AlarmInstance, until: DateTime<Utc>) {
        println!("[notify] alarm {} snoozed until {until}", instance.id);
    }

    fn show_missed(&mut self, instance: &AlarmInstance) {
        println!("[notify] alarm {} missed", instance.id);
    }

    fn show_pre_alarm_dismissed(&mut self, instance: &AlarmInstance) {
        println!(
            "[notify] pre-alarm {} silenced; alarm still set for {}",
            instance.id, instance.alarm_time
        );
    }

    fn clear(&mut self, _instance_id: i64) {}
}

/// Ringing rendered as plain lines on stdout.
pub struct ConsoleSounder;

impl Sounder for ConsoleSounder {
    fn start(
        &mut self,
        instance: &AlarmInstance,
        pre_alarm: bool,
        _in_call: bool,
    ) -> Result<(), SounderError> {
        let phase = if pre_alarm { "pre-alarm" } else { "alarm" };
        println!("[ring] {phase} {} ringing", instance.id);
        Ok(())
    }

    fn stop(&mut self) {}
}

/// Open the on-disk store and build an engine over the console ports.
pub fn open_engine() -> Result<Engine, Box<dyn std::error::Error>> {
    let store = AlarmStore::open()?;
    let policy = EnginePolicy::load()?;
    policy.validate()?;
    let engine = Engine::new(
        store,
        policy,
        Box::new(SystemClock),
        Box::new(WakeQueue::new()),
        Box::new(ConsoleNotifier),
        Box::new(ConsoleSounder),
    )?;
    Ok(engine)
}
