//! Pure transition logic for the alarm instance lifecycle.
//!
//! No I/O happens here. Every function computes, for one instance and
//! one moment in time, the state to move to, the side effects to emit
//! and the single next wake-up to schedule. The reconciliation driver
//! ([`Engine`](crate::engine::Engine)) persists the result and plays
//! the effects against the ports.
//!
//! ## Lifecycle
//!
//! ```text
//! Silent -> LowNotification -> HighNotification -> Fired -> Missed -> Dismissed
//!               |                    |               ^  \
//!               v                    v               |   v
//!        HideNotification    PreAlarm(Dismiss) ------+  Snooze (loops back)
//! ```

use chrono::{DateTime, Duration, Utc};

use crate::alarm::{AlarmInstance, InstanceState};
use crate::storage::EnginePolicy;

/// A side effect requested by a transition. The driver interprets
/// these against the notifier/sounder ports and the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    ShowLowNotification,
    ShowHighNotification,
    ShowSnoozeNotification { until: DateTime<Utc> },
    ShowMissedNotification,
    ShowPreAlarmDismissedNotification,
    ClearNotification,
    StartSounder { pre_alarm: bool },
    StopSounder,
    /// Reschedule, disable or delete the owning template.
    RetireParent,
    /// Remove the instance row. Terminal.
    DeleteInstance,
}

/// The computed result of one transition: the state the instance
/// moves to, the effects to play, and at most one future wake-up.
///
/// A pre-alarm with a silence timeout chains through that wake first;
/// the PreAlarmDismiss transition then schedules the main alarm wake.
/// Keeping a single wake slot per instance is what lets the scheduler
/// key on the instance id alone (reschedule = implicit cancel).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: InstanceState,
    pub effects: Vec<Effect>,
    pub wake: Option<(DateTime<Utc>, InstanceState)>,
}

/// Register a fresh or re-registered instance: clear leftovers and
/// wait for the low-notification window.
pub fn to_silent(instance: &AlarmInstance, policy: &EnginePolicy) -> Transition {
    Transition {
        state: InstanceState::Silent,
        effects: vec![Effect::ClearNotification],
        wake: Some((
            instance.low_notification_time(policy),
            InstanceState::LowNotification,
        )),
    }
}

pub fn to_low_notification(instance: &AlarmInstance, policy: &EnginePolicy) -> Transition {
    Transition {
        state: InstanceState::LowNotification,
        effects: vec![Effect::ShowLowNotification],
        wake: Some((
            instance.high_notification_time(policy),
            InstanceState::HighNotification,
        )),
    }
}

/// The user swiped the low-priority notification away; stay quiet
/// until the high-priority window.
pub fn to_hide_notification(instance: &AlarmInstance, policy: &EnginePolicy) -> Transition {
    Transition {
        state: InstanceState::HideNotification,
        effects: vec![Effect::ClearNotification],
        wake: Some((
            instance.high_notification_time(policy),
            InstanceState::HighNotification,
        )),
    }
}

pub fn to_high_notification(instance: &AlarmInstance, _policy: &EnginePolicy) -> Transition {
    let wake = match instance.pre_alarm_time {
        Some(pre) => (pre, InstanceState::PreAlarm),
        None => (instance.alarm_time, InstanceState::Fired),
    };
    Transition {
        state: InstanceState::HighNotification,
        effects: vec![Effect::ShowHighNotification],
        wake: Some(wake),
    }
}

/// Start the softer pre-alarm sequence. If the policy silences
/// pre-alarms after a while, wake for that cutoff first; otherwise
/// ring through to the main alarm time.
///
/// Entering the pre-alarm phase restores `alarm_time` to the original
/// time: a pre-alarm snooze pulls `alarm_time` forward to the deferred
/// wake, and ringing toward that would fire the main alarm early.
pub fn to_pre_alarm(instance: &mut AlarmInstance, policy: &EnginePolicy) -> Transition {
    instance.alarm_time = instance.original_alarm_time;
    let wake = match instance.pre_alarm_timeout_time(policy) {
        Some(cutoff) => (cutoff, InstanceState::PreAlarmDismiss),
        None => (instance.alarm_time, InstanceState::Fired),
    };
    Transition {
        state: InstanceState::PreAlarm,
        effects: vec![Effect::StartSounder { pre_alarm: true }],
        wake: Some(wake),
    }
}

/// The pre-alarm was silenced (by the user or by its timeout); the
/// main alarm still fires at the original time.
pub fn to_pre_alarm_dismiss(instance: &AlarmInstance, _policy: &EnginePolicy) -> Transition {
    Transition {
        state: InstanceState::PreAlarmDismiss,
        effects: vec![
            Effect::StopSounder,
            Effect::ShowPreAlarmDismissedNotification,
        ],
        wake: Some((instance.alarm_time, InstanceState::Fired)),
    }
}

pub fn to_fired(instance: &AlarmInstance, policy: &EnginePolicy) -> Transition {
    Transition {
        state: InstanceState::Fired,
        effects: vec![Effect::StartSounder { pre_alarm: false }],
        wake: Some((instance.timeout_time(policy), InstanceState::Missed)),
    }
}

/// Snooze from Fired or PreAlarm.
///
/// Mutates `instance.alarm_time` to `now + snooze_minutes`, never
/// earlier than `now`. Snoozing out of the pre-alarm clamps the new
/// time to the original alarm time and, when the clamp leaves room,
/// wakes back into PreAlarm rather than Fired.
pub fn to_snooze(
    instance: &mut AlarmInstance,
    now: DateTime<Utc>,
    policy: &EnginePolicy,
) -> Transition {
    let from_pre_alarm = instance.state == InstanceState::PreAlarm;
    let mut new_time = now + Duration::minutes(policy.snooze_minutes);
    if from_pre_alarm && new_time > instance.original_alarm_time {
        new_time = instance.original_alarm_time;
    }
    instance.alarm_time = new_time;

    let target = if from_pre_alarm && new_time < instance.original_alarm_time {
        InstanceState::PreAlarm
    } else {
        InstanceState::Fired
    };
    Transition {
        state: InstanceState::Snooze,
        effects: vec![
            Effect::StopSounder,
            Effect::ShowSnoozeNotification { until: new_time },
        ],
        wake: Some((new_time, target)),
    }
}

/// Whether another snooze is allowed under the policy limit.
/// `snoozes_used` resets whenever any instance goes Missed/Dismissed.
pub fn can_snooze(snoozes_used: u32, policy: &EnginePolicy) -> bool {
    policy.snooze_limit == 0 || snoozes_used < policy.snooze_limit
}

/// The fired alarm rang out its timeout with no user action.
pub fn to_missed(instance: &AlarmInstance, policy: &EnginePolicy) -> Transition {
    Transition {
        state: InstanceState::Missed,
        effects: vec![
            Effect::StopSounder,
            Effect::RetireParent,
            Effect::ShowMissedNotification,
        ],
        wake: Some((instance.missed_expiry(policy), InstanceState::Dismissed)),
    }
}

/// Terminal: silence everything, retire the parent, drop the row.
pub fn to_dismissed(_instance: &AlarmInstance) -> Transition {
    Transition {
        state: InstanceState::Dismissed,
        effects: vec![
            Effect::StopSounder,
            Effect::ClearNotification,
            Effect::RetireParent,
            Effect::DeleteInstance,
        ],
        wake: None,
    }
}

/// Expiry of a missed instance: the row goes away quietly. The parent
/// was already retired on the Fired -> Missed edge.
pub fn to_expired(_instance: &AlarmInstance) -> Transition {
    Transition {
        state: InstanceState::Dismissed,
        effects: vec![Effect::ClearNotification, Effect::DeleteInstance],
        wake: None,
    }
}

/// Re-derive the correct state of `instance` from scratch at `now`.
///
/// Used by registration and bulk reconciliation after boot or clock
/// change. Time alone decides, with these stored-state exceptions:
/// - Dismissed is never resurrected.
/// - A Fired instance that has not timed out keeps firing.
/// - A Snooze with its (deferred) alarm time still ahead keeps
///   snoozing; a pre-alarm snooze whose deferred time has passed
///   re-enters PreAlarm as long as the original alarm time is ahead.
/// - HideNotification is not downgraded back to LowNotification.
/// - PreAlarmDismiss stays silenced for the rest of the pre-alarm
///   window.
///
/// Clock-jump policy: past the alarm time by less than the fire grace
/// (strictly) still fires; past the missed TTL dismisses outright.
pub fn derive_state(
    instance: &AlarmInstance,
    now: DateTime<Utc>,
    policy: &EnginePolicy,
) -> InstanceState {
    use InstanceState::*;

    if instance.state == Dismissed {
        return Dismissed;
    }
    if now >= instance.missed_expiry(policy) {
        return Dismissed;
    }
    if instance.state == Fired && now < instance.timeout_time(policy) {
        return Fired;
    }
    if instance.state == Snooze && now < instance.alarm_time {
        return Snooze;
    }
    // A snooze taken out of the pre-alarm phase defers to a time
    // before the original alarm; once that passes, the pre-alarm
    // window is still active, not the grace/missed tail.
    if instance.state == Snooze
        && instance.has_pre_alarm()
        && instance.alarm_time < instance.original_alarm_time
        && now < instance.original_alarm_time
    {
        return PreAlarm;
    }

    if now < instance.alarm_time {
        if let Some(pre) = instance.pre_alarm_time {
            if now >= pre {
                return if instance.state == PreAlarmDismiss
                    || instance
                        .pre_alarm_timeout_time(policy)
                        .is_some_and(|cutoff| now >= cutoff)
                {
                    PreAlarmDismiss
                } else {
                    PreAlarm
                };
            }
        }
        if now >= instance.high_notification_time(policy) {
            return HighNotification;
        }
        if now >= instance.low_notification_time(policy) {
            return if instance.state == HideNotification {
                HideNotification
            } else {
                LowNotification
            };
        }
        return Silent;
    }

    if now < instance.fire_grace_end(policy) {
        Fired
    } else {
        Missed
    }
}

/// The wake-up an instance in its current state should have pending,
/// without re-running the transition (and without re-emitting its
/// effects or touching `alarm_time`). Used when reconciliation finds
/// an instance already in its correct state and only needs to refresh
/// the schedule under a new generation.
pub fn wake_for(
    instance: &AlarmInstance,
    policy: &EnginePolicy,
) -> Option<(DateTime<Utc>, InstanceState)> {
    use InstanceState::*;
    match instance.state {
        Silent => Some((instance.low_notification_time(policy), LowNotification)),
        LowNotification | HideNotification => {
            Some((instance.high_notification_time(policy), HighNotification))
        }
        HighNotification => Some(match instance.pre_alarm_time {
            Some(pre) => (pre, PreAlarm),
            None => (instance.alarm_time, Fired),
        }),
        PreAlarm => Some(match instance.pre_alarm_timeout_time(policy) {
            Some(cutoff) => (cutoff, PreAlarmDismiss),
            None => (instance.alarm_time, Fired),
        }),
        PreAlarmDismiss => Some((instance.alarm_time, Fired)),
        Fired => Some((instance.timeout_time(policy), Missed)),
        Snooze => {
            let target = if instance.has_pre_alarm()
                && instance.alarm_time < instance.original_alarm_time
            {
                PreAlarm
            } else {
                Fired
            };
            Some((instance.alarm_time, target))
        }
        Missed => Some((instance.missed_expiry(policy), Dismissed)),
        Dismissed => None,
    }
}

/// Build the transition that lands `instance` in `target`.
pub fn transition_to(
    instance: &mut AlarmInstance,
    target: InstanceState,
    now: DateTime<Utc>,
    policy: &EnginePolicy,
) -> Transition {
    use InstanceState::*;
    match target {
        Silent => to_silent(instance, policy),
        LowNotification => to_low_notification(instance, policy),
        HideNotification => to_hide_notification(instance, policy),
        HighNotification => to_high_notification(instance, policy),
        PreAlarm => to_pre_alarm(instance, policy),
        PreAlarmDismiss => to_pre_alarm_dismiss(instance, policy),
        Fired => to_fired(instance, policy),
        Snooze => to_snooze(instance, now, policy),
        Missed => to_missed(instance, policy),
        Dismissed => to_dismissed(instance),
    }
}
