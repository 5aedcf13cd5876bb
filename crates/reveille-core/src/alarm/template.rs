use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::days::DaySet;
use super::instance::{AlarmInstance, InstanceState};
use crate::error::ValidationError;
use crate::storage::EnginePolicy;

/// Which alarm phases an on/off option applies to.
///
/// Replaces paired on/off bit flags with an explicit tagged enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeOption {
    #[default]
    Off,
    MainOnly,
    PreAlarmOnly,
    Both,
}

impl ModeOption {
    /// Does the option apply to the main alarm?
    pub fn for_main(self) -> bool {
        matches!(self, ModeOption::MainOnly | ModeOption::Both)
    }

    /// Does the option apply to the pre-alarm?
    pub fn for_pre_alarm(self) -> bool {
        matches!(self, ModeOption::PreAlarmOnly | ModeOption::Both)
    }

    /// Does the option apply to the given phase?
    pub fn applies(self, pre_alarm: bool) -> bool {
        if pre_alarm {
            self.for_pre_alarm()
        } else {
            self.for_main()
        }
    }
}

/// Alarm volume: either a fixed level or "use whatever the system
/// volume currently is" (the source encodes the latter as -1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeSetting {
    #[default]
    System,
    Level(u8),
}

/// Pre-alarm configuration: a softer alarm sequence that precedes the
/// main alarm by `lead_minutes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreAlarm {
    pub lead_minutes: i64,
}

/// The user-edited recurring (or one-shot) alarm definition.
///
/// Templates spawn [`AlarmInstance`]s; instances snapshot the relevant
/// template fields at creation time and never read back through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmTemplate {
    /// Store-assigned id; 0 until first persisted.
    pub id: i64,
    pub hour: u32,
    pub minute: u32,
    /// Empty = one-shot.
    pub days: DaySet,
    pub enabled: bool,
    pub label: String,
    /// Ringtone reference; `None` plays the bundled default tone.
    pub ringtone: Option<String>,
    pub vibrate: bool,
    /// One-shot alarms with this set are deleted instead of disabled
    /// once their instance is retired.
    pub delete_after_use: bool,
    pub pre_alarm: Option<PreAlarm>,
    pub alarm_volume: VolumeSetting,
    pub pre_alarm_volume: VolumeSetting,
    pub increasing_volume: ModeOption,
    pub random_playback: ModeOption,
}

impl AlarmTemplate {
    pub fn new(hour: u32, minute: u32) -> Self {
        Self {
            id: 0,
            hour,
            minute,
            days: DaySet::default(),
            enabled: true,
            label: String::new(),
            ringtone: None,
            vibrate: true,
            delete_after_use: false,
            pre_alarm: None,
            alarm_volume: VolumeSetting::System,
            pre_alarm_volume: VolumeSetting::System,
            increasing_volume: ModeOption::Off,
            random_playback: ModeOption::Off,
        }
    }

    pub fn is_repeating(&self) -> bool {
        !self.days.is_empty()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.hour > 23 || self.minute > 59 {
            return Err(ValidationError::InvalidClockTime {
                hour: self.hour,
                minute: self.minute,
            });
        }
        Ok(())
    }

    /// Next wall-clock occurrence of this template strictly after
    /// `after`.
    ///
    /// One-shot templates resolve to today if the clock time is still
    /// ahead, otherwise tomorrow. Repeating templates resolve to the
    /// next matching weekday.
    pub fn next_occurrence(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        let clock = NaiveTime::from_hms_opt(self.hour, self.minute, 0)
            .unwrap_or(NaiveTime::MIN);
        let today = after.date_naive();
        let candidate = resolve(today.and_time(clock));

        if self.days.is_empty() {
            if candidate > after {
                candidate
            } else {
                resolve(today.succ_opt().unwrap_or(today).and_time(clock))
            }
        } else if candidate > after && self.days.contains(chrono::Datelike::weekday(&today)) {
            candidate
        } else {
            let next_day = self
                .days
                .next_date_after(today)
                .unwrap_or_else(|| today.succ_opt().unwrap_or(today));
            resolve(next_day.and_time(clock))
        }
    }

    /// Stamp a new instance for the next occurrence after `after`.
    ///
    /// The instance inherits the ringtone/volume/label snapshot and
    /// derives its pre-alarm time from the template's lead minutes
    /// (falling back to the policy default); neither time is ever
    /// recomputed afterward, except by snooze.
    pub fn create_instance(&self, after: DateTime<Utc>, policy: &EnginePolicy) -> AlarmInstance {
        let alarm_time = self.next_occurrence(after);
        let pre_alarm_time = self.pre_alarm.map(|p| {
            let lead = if p.lead_minutes > 0 {
                p.lead_minutes
            } else {
                policy.pre_alarm_lead_minutes_default
            };
            alarm_time - Duration::minutes(lead)
        });
        AlarmInstance {
            id: 0,
            template_id: Some(self.id),
            alarm_time,
            original_alarm_time: alarm_time,
            state: InstanceState::Silent,
            pre_alarm_time,
            label: self.label.clone(),
            ringtone: self.ringtone.clone(),
            vibrate: self.vibrate,
            delete_after_use: self.delete_after_use,
            alarm_volume: self.alarm_volume,
            pre_alarm_volume: self.pre_alarm_volume,
            increasing_volume: self.increasing_volume,
            random_playback: self.random_playback,
        }
    }
}

fn resolve(naive: chrono::NaiveDateTime) -> DateTime<Utc> {
    Utc.from_utc_datetime(&naive)
}
