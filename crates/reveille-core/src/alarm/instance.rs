use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::template::{ModeOption, VolumeSetting};
use crate::storage::EnginePolicy;

/// Lifecycle state of a single alarm occurrence.
///
/// The declaration order is the ordinal order used for filtering:
/// "active for the next-alarm display" means `state < PreAlarm`.
/// Transitions only move forward, except Snooze (which loops back
/// toward Fired) and PreAlarmDismiss (a side branch before Fired).
/// Dismissed is terminal and deletes the row.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Silent,
    LowNotification,
    HideNotification,
    HighNotification,
    PreAlarm,
    PreAlarmDismiss,
    Fired,
    Snooze,
    Missed,
    Dismissed,
}

impl InstanceState {
    /// States counted toward the "next alarm" computation.
    pub fn is_upcoming(self) -> bool {
        self < InstanceState::PreAlarm
    }

    pub fn is_terminal(self) -> bool {
        self == InstanceState::Dismissed
    }
}

/// One concrete, time-stamped occurrence of an alarm.
///
/// Created from an [`AlarmTemplate`](super::template::AlarmTemplate)
/// (or directly, for one-shot alarms); mutated exclusively through the
/// state machine; deleted when dismissed or missed-then-expired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmInstance {
    /// Store-assigned id; 0 until first persisted.
    pub id: i64,
    /// Owning template; `None` for orphaned instances.
    pub template_id: Option<i64>,
    pub alarm_time: DateTime<Utc>,
    /// Alarm time as stamped at creation. Snooze moves `alarm_time`
    /// but never this; the pre-alarm snooze clamp compares against it.
    pub original_alarm_time: DateTime<Utc>,
    pub state: InstanceState,
    pub pre_alarm_time: Option<DateTime<Utc>>,
    pub label: String,
    pub ringtone: Option<String>,
    pub vibrate: bool,
    pub delete_after_use: bool,
    pub alarm_volume: VolumeSetting,
    pub pre_alarm_volume: VolumeSetting,
    pub increasing_volume: ModeOption,
    pub random_playback: ModeOption,
}

impl AlarmInstance {
    pub fn has_pre_alarm(&self) -> bool {
        self.pre_alarm_time.is_some()
    }

    /// When the low-priority notification appears.
    pub fn low_notification_time(&self, policy: &EnginePolicy) -> DateTime<Utc> {
        self.alarm_time - Duration::hours(policy.low_notification_hours_before)
    }

    /// When the notification escalates to high priority.
    pub fn high_notification_time(&self, policy: &EnginePolicy) -> DateTime<Utc> {
        self.alarm_time - Duration::minutes(policy.high_notification_minutes_before)
    }

    /// Past this point a fired alarm is considered missed.
    pub fn timeout_time(&self, policy: &EnginePolicy) -> DateTime<Utc> {
        self.alarm_time + Duration::minutes(policy.auto_silence_minutes)
    }

    /// Past this point a missed instance is dismissed outright.
    pub fn missed_expiry(&self, policy: &EnginePolicy) -> DateTime<Utc> {
        self.alarm_time + Duration::hours(policy.missed_ttl_hours)
    }

    /// The clock-jump tolerance window: an alarm whose time was passed
    /// by less than this still fires instead of going missed.
    pub fn fire_grace_end(&self, policy: &EnginePolicy) -> DateTime<Utc> {
        self.alarm_time + Duration::seconds(policy.fire_grace_seconds)
    }

    /// When a ringing pre-alarm silences itself, if the policy asks
    /// for that and the cutoff lands strictly before the alarm time.
    pub fn pre_alarm_timeout_time(&self, policy: &EnginePolicy) -> Option<DateTime<Utc>> {
        if policy.pre_alarm_timeout_minutes <= 0 {
            return None;
        }
        let pre = self.pre_alarm_time?;
        let cutoff = pre + Duration::minutes(policy.pre_alarm_timeout_minutes);
        (cutoff < self.alarm_time).then_some(cutoff)
    }

    /// Volume setting for the given phase.
    pub fn volume_for(&self, pre_alarm: bool) -> VolumeSetting {
        if pre_alarm {
            self.pre_alarm_volume
        } else {
            self.alarm_volume
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn base_instance() -> AlarmInstance {
        let t = Utc.with_ymd_and_hms(2026, 8, 28, 8, 0, 0).unwrap();
        AlarmInstance {
            id: 1,
            template_id: Some(1),
            alarm_time: t,
            original_alarm_time: t,
            state: InstanceState::Silent,
            pre_alarm_time: None,
            label: String::new(),
            ringtone: None,
            vibrate: true,
            delete_after_use: false,
            alarm_volume: VolumeSetting::System,
            pre_alarm_volume: VolumeSetting::System,
            increasing_volume: ModeOption::Off,
            random_playback: ModeOption::Off,
        }
    }

    #[test]
    fn state_ordinal_order_matches_lifecycle() {
        use InstanceState::*;
        let order = [
            Silent,
            LowNotification,
            HideNotification,
            HighNotification,
            PreAlarm,
            PreAlarmDismiss,
            Fired,
            Snooze,
            Missed,
            Dismissed,
        ];
        assert!(order.windows(2).all(|w| w[0] < w[1]));
        assert!(Silent.is_upcoming());
        assert!(HighNotification.is_upcoming());
        assert!(!PreAlarm.is_upcoming());
        assert!(Dismissed.is_terminal());
    }

    #[test]
    fn timing_accessors() {
        let policy = EnginePolicy::default();
        let inst = base_instance();
        assert_eq!(
            inst.low_notification_time(&policy),
            Utc.with_ymd_and_hms(2026, 8, 28, 6, 0, 0).unwrap()
        );
        assert_eq!(
            inst.high_notification_time(&policy),
            Utc.with_ymd_and_hms(2026, 8, 28, 7, 30, 0).unwrap()
        );
        assert_eq!(
            inst.timeout_time(&policy),
            Utc.with_ymd_and_hms(2026, 8, 28, 8, 10, 0).unwrap()
        );
        assert_eq!(
            inst.missed_expiry(&policy),
            Utc.with_ymd_and_hms(2026, 8, 28, 20, 0, 0).unwrap()
        );
        assert_eq!(
            inst.fire_grace_end(&policy),
            Utc.with_ymd_and_hms(2026, 8, 28, 8, 0, 15).unwrap()
        );
    }

    #[test]
    fn pre_alarm_timeout_requires_room_before_alarm() {
        let mut policy = EnginePolicy::default();
        let mut inst = base_instance();
        inst.pre_alarm_time = Some(inst.alarm_time - Duration::minutes(30));

        // Disabled by default.
        assert_eq!(inst.pre_alarm_timeout_time(&policy), None);

        policy.pre_alarm_timeout_minutes = 10;
        assert_eq!(
            inst.pre_alarm_timeout_time(&policy),
            Some(Utc.with_ymd_and_hms(2026, 8, 28, 7, 40, 0).unwrap())
        );

        // Cutoff at or past the alarm time is dropped.
        policy.pre_alarm_timeout_minutes = 30;
        assert_eq!(inst.pre_alarm_timeout_time(&policy), None);
    }
}
