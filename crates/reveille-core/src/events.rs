use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alarm::InstanceState;

/// Every transition the engine applies produces an Event. Callers
/// (CLI, widgets) drain these; they are also the audit trail in tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    InstanceRegistered {
        instance_id: i64,
        alarm_time: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    StateChanged {
        instance_id: i64,
        from: InstanceState,
        to: InstanceState,
        at: DateTime<Utc>,
    },
    AlarmFired {
        instance_id: i64,
        pre_alarm: bool,
        at: DateTime<Utc>,
    },
    AlarmSnoozed {
        instance_id: i64,
        until: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    /// A snooze request was rejected by the snooze-count limit.
    SnoozeRejected {
        instance_id: i64,
        at: DateTime<Utc>,
    },
    AlarmMissed {
        instance_id: i64,
        at: DateTime<Utc>,
    },
    AlarmDismissed {
        instance_id: i64,
        at: DateTime<Utc>,
    },
    PreAlarmDismissed {
        instance_id: i64,
        at: DateTime<Utc>,
    },
    /// The owning template was rescheduled, disabled or deleted after
    /// its instance was retired.
    ParentRetired {
        template_id: i64,
        rescheduled: bool,
        at: DateTime<Utc>,
    },
    /// A stale wake-up was dropped by the generation check.
    StaleWakeDropped {
        instance_id: i64,
        generation: i64,
        at: DateTime<Utc>,
    },
    NextAlarmChanged {
        instance_id: Option<i64>,
        alarm_time: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    },
}
