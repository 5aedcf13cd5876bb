//! Side-effect ports: the boundary between the lifecycle engine and
//! the excluded UI/platform layer.
//!
//! The engine drives these three narrow capability sets and nothing
//! else. Every call is best-effort and idempotent: clearing a
//! notification that is not showing, or stopping a sounder that is not
//! playing, must be a safe no-op. A port failure never aborts a state
//! transition -- the driver logs it and moves on.

use chrono::{DateTime, Utc};

use crate::alarm::AlarmInstance;
use crate::error::SounderError;

/// Notification surface.
pub trait Notifier {
    /// Unobtrusive "alarm coming up" notification.
    fn show_low(&mut self, instance: &AlarmInstance);
    /// Prominent "alarm imminent" notification.
    fn show_high(&mut self, instance: &AlarmInstance);
    /// Snoozed-until notification.
    fn show_snooze(&mut self, instance: &AlarmInstance, until: DateTime<Utc>);
    /// Missed-alarm notification.
    fn show_missed(&mut self, instance: &AlarmInstance);
    /// The pre-alarm was silenced; the main alarm is still coming.
    fn show_pre_alarm_dismissed(&mut self, instance: &AlarmInstance);
    /// Remove whatever is showing for this instance.
    fn clear(&mut self, instance_id: i64);
}

/// Alarm audio and vibration.
pub trait Sounder {
    /// Start ringing for `instance` under the given profile.
    ///
    /// Not reentrant: implementations must fully stop (release audio,
    /// restore saved volume) before starting again. Playback failure
    /// is reported but never blocks the state transition.
    fn start(
        &mut self,
        instance: &AlarmInstance,
        pre_alarm: bool,
        in_call: bool,
    ) -> Result<(), SounderError>;

    /// Stop ringing. No-op if nothing is playing.
    fn stop(&mut self);
}
