//! TOML-based engine policy configuration.
//!
//! Stores the timing and snooze policy the state machine runs under:
//! - Notification lead times (low/high priority)
//! - Auto-silence timeout and missed time-to-live
//! - Snooze length and snooze-count limit
//! - The fire-grace tolerance for clock jumps
//!
//! Configuration is stored at `~/.config/reveille/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::data_dir;
use crate::error::ConfigError;

/// Timing and snooze policy for the alarm lifecycle engine.
///
/// Serialized to/from TOML at `~/.config/reveille/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnginePolicy {
    /// Hours before the alarm time at which the low-priority
    /// notification appears.
    #[serde(default = "default_low_notification_hours")]
    pub low_notification_hours_before: i64,
    /// Minutes before the alarm time at which the high-priority
    /// notification appears.
    #[serde(default = "default_high_notification_minutes")]
    pub high_notification_minutes_before: i64,
    /// Minutes a fired alarm rings before it is marked missed.
    #[serde(default = "default_auto_silence_minutes")]
    pub auto_silence_minutes: i64,
    /// Hours a missed alarm's notification lives (measured from the
    /// alarm time) before the instance is dismissed outright.
    #[serde(default = "default_missed_ttl_hours")]
    pub missed_ttl_hours: i64,
    /// Minutes a snooze defers the alarm.
    #[serde(default = "default_snooze_minutes")]
    pub snooze_minutes: i64,
    /// Maximum snoozes before further requests are rejected.
    /// 0 means unlimited.
    #[serde(default = "default_snooze_limit")]
    pub snooze_limit: u32,
    /// Tolerance for clock jumps: an alarm whose time was passed by
    /// less than this fires instead of being marked missed.
    #[serde(default = "default_fire_grace_seconds")]
    pub fire_grace_seconds: i64,
    /// Default pre-alarm lead time for templates that enable the
    /// pre-alarm without specifying one.
    #[serde(default = "default_pre_alarm_lead_minutes")]
    pub pre_alarm_lead_minutes_default: i64,
    /// Minutes a pre-alarm rings before it silences itself.
    /// 0 means it rings until the main alarm time.
    #[serde(default)]
    pub pre_alarm_timeout_minutes: i64,
    /// Volume cap applied when the alarm fires during a phone call.
    #[serde(default = "default_in_call_volume")]
    pub in_call_volume: u8,
}

fn default_low_notification_hours() -> i64 {
    2
}
fn default_high_notification_minutes() -> i64 {
    30
}
fn default_auto_silence_minutes() -> i64 {
    10
}
fn default_missed_ttl_hours() -> i64 {
    12
}
fn default_snooze_minutes() -> i64 {
    10
}
fn default_snooze_limit() -> u32 {
    3
}
fn default_fire_grace_seconds() -> i64 {
    15
}
fn default_pre_alarm_lead_minutes() -> i64 {
    30
}
fn default_in_call_volume() -> u8 {
    40
}

impl Default for EnginePolicy {
    fn default() -> Self {
        Self {
            low_notification_hours_before: default_low_notification_hours(),
            high_notification_minutes_before: default_high_notification_minutes(),
            auto_silence_minutes: default_auto_silence_minutes(),
            missed_ttl_hours: default_missed_ttl_hours(),
            snooze_minutes: default_snooze_minutes(),
            snooze_limit: default_snooze_limit(),
            fire_grace_seconds: default_fire_grace_seconds(),
            pre_alarm_lead_minutes_default: default_pre_alarm_lead_minutes(),
            pre_alarm_timeout_minutes: 0,
            in_call_volume: default_in_call_volume(),
        }
    }
}

impl EnginePolicy {
    fn config_path() -> Result<PathBuf, ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::LoadFailed {
            path: PathBuf::from("~/.config/reveille"),
            message: e.to_string(),
        })?;
        Ok(dir.join("config.toml"))
    }

    /// Load the policy from disk, falling back to defaults when the
    /// file does not exist yet.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::LoadFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        toml::from_str(&text).map_err(|e| ConfigError::LoadFailed {
            path,
            message: e.to_string(),
        })
    }

    /// Persist the policy to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::config_path()?;
        let text = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, text).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })
    }

    /// Reject obviously broken policies before they reach the engine.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.snooze_minutes <= 0 {
            return Err(ConfigError::InvalidValue {
                key: "snooze_minutes".into(),
                message: "must be positive".into(),
            });
        }
        if self.auto_silence_minutes <= 0 {
            return Err(ConfigError::InvalidValue {
                key: "auto_silence_minutes".into(),
                message: "must be positive".into(),
            });
        }
        if self.fire_grace_seconds < 0 {
            return Err(ConfigError::InvalidValue {
                key: "fire_grace_seconds".into(),
                message: "must not be negative".into(),
            });
        }
        Ok(())
    }
}
