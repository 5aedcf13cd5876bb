//! Reconciliation driver: the single entry point for every event that
//! can move an alarm instance through its lifecycle.
//!
//! Three categories of event come in:
//! 1. Scheduled wake-ups, carrying the generation they were scheduled
//!    under. Stale generations are dropped unless tagged with a user
//!    action.
//! 2. Direct user actions (snooze, dismiss, hide), which bypass the
//!    time-based derivation.
//! 3. Bulk re-registration (`fix_alarm_instances`) after boot or a
//!    clock/timezone change, which re-derives every instance's state
//!    from scratch.
//!
//! The driver persists the new state before playing side effects, so a
//! crash mid-handler re-enters at a recoverable point on the next
//! reconciliation pass. Side effects are best-effort: failures are
//! logged and never abort a transition.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::alarm::{AlarmInstance, AlarmTemplate, InstanceState};
use crate::clock::{Clock, ScheduledWake, WakeScheduler, WakeTag};
use crate::error::{CoreError, DatabaseError, Result};
use crate::events::Event;
use crate::machine::{self, Effect, Transition};
use crate::ports::{Notifier, Sounder};
use crate::storage::{AlarmStore, EnginePolicy};

/// Process-wide engine state, loaded from the store at startup and
/// persisted on every change. Explicit here instead of ambient statics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineContext {
    /// Monotonic counter invalidating wake-ups scheduled before the
    /// last boot/reset.
    pub generation: i64,
    /// Snoozes used since the last missed or dismissed alarm.
    pub snooze_count: u32,
}

/// The alarm instance lifecycle engine.
pub struct Engine {
    store: AlarmStore,
    policy: EnginePolicy,
    clock: Box<dyn Clock>,
    scheduler: Box<dyn WakeScheduler>,
    notifier: Box<dyn Notifier>,
    sounder: Box<dyn Sounder>,
    ctx: EngineContext,
    events: Vec<Event>,
    in_call: bool,
    last_next_alarm: Option<Option<(i64, DateTime<Utc>)>>,
}

impl Engine {
    pub fn new(
        store: AlarmStore,
        policy: EnginePolicy,
        clock: Box<dyn Clock>,
        scheduler: Box<dyn WakeScheduler>,
        notifier: Box<dyn Notifier>,
        sounder: Box<dyn Sounder>,
    ) -> Result<Self> {
        let ctx = EngineContext {
            generation: store.generation()?,
            snooze_count: store.snooze_count()?,
        };
        Ok(Self {
            store,
            policy,
            clock,
            scheduler,
            notifier,
            sounder,
            ctx,
            events: Vec::new(),
            in_call: false,
            last_next_alarm: None,
        })
    }

    pub fn store(&self) -> &AlarmStore {
        &self.store
    }

    pub fn policy(&self) -> &EnginePolicy {
        &self.policy
    }

    pub fn context(&self) -> EngineContext {
        self.ctx
    }

    pub fn pending_wakes(&self) -> Vec<ScheduledWake> {
        self.scheduler.pending()
    }

    /// Take the events emitted since the last drain.
    pub fn drain_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    /// Telephony hint: fired alarms ring at the capped in-call volume
    /// while set.
    pub fn set_in_call(&mut self, in_call: bool) {
        self.in_call = in_call;
    }

    // === Template-level entry points (UI layer) ===

    /// Persist a new template and, when it is enabled, register its
    /// first instance.
    pub fn add_template(&mut self, template: &mut AlarmTemplate) -> Result<Option<AlarmInstance>> {
        template.validate()?;
        self.store.insert_template(template)?;
        if !template.enabled {
            return Ok(None);
        }
        let now = self.clock.now();
        let mut instance = template.create_instance(now, &self.policy);
        self.store.insert_instance(&mut instance)?;
        self.register(&mut instance, true)?;
        Ok(Some(instance))
    }

    /// Re-register a template's instances after the user edited it:
    /// outstanding instances are replaced by a freshly stamped one.
    pub fn update_template(&mut self, template: &AlarmTemplate) -> Result<Option<AlarmInstance>> {
        template.validate()?;
        self.store.update_template(template)?;
        self.delete_all_instances(template.id)?;
        if !template.enabled {
            return Ok(None);
        }
        let now = self.clock.now();
        let mut instance = template.create_instance(now, &self.policy);
        self.store.insert_instance(&mut instance)?;
        self.register(&mut instance, true)?;
        Ok(Some(instance))
    }

    /// Remove a template and every instance it owns.
    pub fn delete_template(&mut self, template_id: i64) -> Result<()> {
        self.delete_all_instances(template_id)?;
        self.store.delete_template(template_id)?;
        Ok(())
    }

    /// Silence and delete every instance owned by `template_id`.
    /// Called on alarm deletion; does not touch the template row.
    pub fn delete_all_instances(&mut self, template_id: i64) -> Result<()> {
        let instances = self.store.instances_for_template(template_id)?;
        let now = self.clock.now();
        for instance in instances {
            self.scheduler.cancel(instance.id);
            self.notifier.clear(instance.id);
            if matches!(
                instance.state,
                InstanceState::Fired | InstanceState::PreAlarm
            ) {
                self.sounder.stop();
            }
            self.store.delete_instance(instance.id)?;
            self.push(Event::AlarmDismissed {
                instance_id: instance.id,
                at: now,
            });
        }
        self.update_next_alarm()?;
        Ok(())
    }

    // === Instance-level entry points ===

    /// Register (or re-register) an instance: derive its correct state
    /// for the current time and move it there.
    pub fn register_instance(&mut self, instance_id: i64, update_next_alarm: bool) -> Result<()> {
        let mut instance = self.load(instance_id)?;
        self.register(&mut instance, update_next_alarm)
    }

    /// A scheduled wake-up fired (or was delivered late).
    pub fn handle_wake(&mut self, wake: ScheduledWake) -> Result<()> {
        // User-action overrides are honored regardless of generation,
        // so an in-flight snooze/dismiss is never lost to a boot race.
        match wake.tag {
            WakeTag::Snooze => return self.set_snooze_state(wake.instance_id, true),
            WakeTag::Dismiss => return self.set_dismiss_state(wake.instance_id),
            WakeTag::Normal => {}
        }
        if wake.generation != self.ctx.generation {
            debug!(
                instance_id = wake.instance_id,
                generation = wake.generation,
                current = self.ctx.generation,
                "dropping stale wake-up"
            );
            self.push(Event::StaleWakeDropped {
                instance_id: wake.instance_id,
                generation: wake.generation,
                at: self.clock.now(),
            });
            return Ok(());
        }

        let Some(mut instance) = self.store.get_instance(wake.instance_id)? else {
            warn!(instance_id = wake.instance_id, "wake-up for unknown instance");
            self.scheduler.cancel(wake.instance_id);
            return Ok(());
        };

        let now = self.clock.now();
        let transition = if instance.state == InstanceState::Missed
            && wake.target == InstanceState::Dismissed
        {
            // TTL expiry of a missed instance: parent already retired.
            machine::to_expired(&instance)
        } else {
            machine::transition_to(&mut instance, wake.target, now, &self.policy)
        };
        self.apply(&mut instance, transition)?;
        self.update_next_alarm()
    }

    /// Drain every due wake-up through the driver, including wakes a
    /// handled transition chains directly into (a large clock jump can
    /// walk an instance through several states in one pass). Returns
    /// how many were processed.
    pub fn tick(&mut self) -> Result<usize> {
        let mut count = 0;
        loop {
            let now = self.clock.now();
            let due = self.scheduler.take_due(now);
            if due.is_empty() {
                return Ok(count);
            }
            count += due.len();
            for wake in due {
                self.handle_wake(wake)?;
            }
        }
    }

    /// User snooze, from the in-alarm UI or a notification action.
    ///
    /// Rejected (state and alarm time unchanged) once the snooze limit
    /// is reached. `show_feedback` controls whether the snoozed-until
    /// notification is (re)shown.
    pub fn set_snooze_state(&mut self, instance_id: i64, show_feedback: bool) -> Result<()> {
        let mut instance = self.load(instance_id)?;
        let now = self.clock.now();

        if !matches!(instance.state, InstanceState::Fired | InstanceState::PreAlarm) {
            warn!(instance_id, state = ?instance.state, "snooze ignored in this state");
            return Ok(());
        }
        if !machine::can_snooze(self.ctx.snooze_count, &self.policy) {
            self.push(Event::SnoozeRejected {
                instance_id,
                at: now,
            });
            return Ok(());
        }

        let mut transition = machine::to_snooze(&mut instance, now, &self.policy);
        if !show_feedback {
            transition
                .effects
                .retain(|e| !matches!(e, Effect::ShowSnoozeNotification { .. }));
        }
        self.apply(&mut instance, transition)?;
        self.ctx.snooze_count += 1;
        self.store.set_snooze_count(self.ctx.snooze_count)?;
        self.update_next_alarm()
    }

    /// User dismiss: terminal for the instance, retires the parent.
    pub fn set_dismiss_state(&mut self, instance_id: i64) -> Result<()> {
        let mut instance = self.load(instance_id)?;
        let transition = machine::to_dismissed(&instance);
        self.apply(&mut instance, transition)?;
        self.update_next_alarm()
    }

    /// User dismissed only the pre-alarm; the main alarm still fires.
    pub fn set_pre_alarm_dismiss_state(&mut self, instance_id: i64) -> Result<()> {
        let mut instance = self.load(instance_id)?;
        if instance.state != InstanceState::PreAlarm {
            warn!(instance_id, state = ?instance.state, "pre-alarm dismiss ignored");
            return Ok(());
        }
        let transition = machine::to_pre_alarm_dismiss(&instance, &self.policy);
        self.apply(&mut instance, transition)?;
        self.push(Event::PreAlarmDismissed {
            instance_id,
            at: self.clock.now(),
        });
        Ok(())
    }

    /// User swiped the low-priority notification away.
    pub fn set_hide_notification_state(&mut self, instance_id: i64) -> Result<()> {
        let mut instance = self.load(instance_id)?;
        if instance.state != InstanceState::LowNotification {
            return Ok(());
        }
        let transition = machine::to_hide_notification(&instance, &self.policy);
        self.apply(&mut instance, transition)
    }

    // === Bulk reconciliation ===

    /// Re-derive every instance's state from scratch. Called at boot
    /// and on system time/timezone changes.
    ///
    /// Bumps the generation first, synchronously, so no wake-up
    /// scheduled before the call can be mistaken for current.
    pub fn fix_alarm_instances(&mut self) -> Result<()> {
        self.ctx.generation = self.store.bump_generation()?;

        let now = self.clock.now();
        for mut instance in self.store.list_instances()? {
            // Time moved backward past a missed alarm: give its parent
            // another chance before re-deriving.
            if instance.state == InstanceState::Missed && now < instance.alarm_time {
                if let Some(template_id) = instance.template_id {
                    if let Some(mut template) = self.store.get_template(template_id)? {
                        if !template.enabled {
                            template.enabled = true;
                            self.store.update_template(&template)?;
                        }
                    }
                }
            }
            self.register(&mut instance, false)?;
        }
        self.update_next_alarm()
    }

    /// Recompute the soonest upcoming instance. Emits
    /// [`Event::NextAlarmChanged`] and rewrites the `next_alarm` kv
    /// entry only when it actually changed.
    pub fn update_next_alarm(&mut self) -> Result<()> {
        let next = self
            .store
            .upcoming_instances()?
            .into_iter()
            .next()
            .map(|i| (i.id, i.alarm_time));

        if self.last_next_alarm != Some(next) {
            self.last_next_alarm = Some(next);
            match next {
                Some((_, time)) => self.store.set_kv("next_alarm", &time.to_rfc3339())?,
                None => self.store.set_kv("next_alarm", "")?,
            }
            self.push(Event::NextAlarmChanged {
                instance_id: next.map(|(id, _)| id),
                alarm_time: next.map(|(_, time)| time),
                at: self.clock.now(),
            });
        }
        Ok(())
    }

    /// The soonest upcoming instance, if any.
    pub fn next_alarm(&self) -> Result<Option<AlarmInstance>> {
        Ok(self.store.upcoming_instances()?.into_iter().next())
    }

    // === Internal ===

    fn load(&self, instance_id: i64) -> Result<AlarmInstance> {
        self.store
            .get_instance(instance_id)?
            .ok_or(CoreError::Database(DatabaseError::NotFound {
                entity: "instance",
                id: instance_id,
            }))
    }

    fn register(&mut self, instance: &mut AlarmInstance, update_next_alarm: bool) -> Result<()> {
        let now = self.clock.now();

        // Orphan: owning template is gone. Never reactivate.
        if let Some(template_id) = instance.template_id {
            if self.store.get_template(template_id)?.is_none() {
                let transition = machine::to_dismissed(instance);
                self.apply(instance, transition)?;
                if update_next_alarm {
                    self.update_next_alarm()?;
                }
                return Ok(());
            }
        }

        let target = machine::derive_state(instance, now, &self.policy);
        if target == instance.state {
            // Already there: refresh the pending wake, re-emit nothing.
            self.scheduler.cancel(instance.id);
            if let Some((at, wake_target)) = machine::wake_for(instance, &self.policy) {
                self.schedule_wake(instance.id, at, wake_target);
            }
        } else if target == InstanceState::Dismissed {
            let transition = if instance.state == InstanceState::Missed {
                machine::to_expired(instance)
            } else {
                machine::to_dismissed(instance)
            };
            self.apply(instance, transition)?;
        } else {
            let transition = machine::transition_to(instance, target, now, &self.policy);
            self.apply(instance, transition)?;
        }

        self.push(Event::InstanceRegistered {
            instance_id: instance.id,
            alarm_time: instance.alarm_time,
            at: now,
        });
        if update_next_alarm {
            self.update_next_alarm()?;
        }
        Ok(())
    }

    fn schedule_wake(&mut self, instance_id: i64, at: DateTime<Utc>, target: InstanceState) {
        self.scheduler.schedule(ScheduledWake {
            instance_id,
            at,
            target,
            generation: self.ctx.generation,
            tag: WakeTag::Normal,
        });
    }

    /// Persist the new state, then play side effects, then schedule
    /// the next wake. Exactly this order: the persisted state is the
    /// recovery point, and the keyed schedule replaces any older wake.
    fn apply(&mut self, instance: &mut AlarmInstance, transition: Transition) -> Result<()> {
        let now = self.clock.now();
        let from = instance.state;
        instance.state = transition.state;

        let deletes = transition.effects.contains(&Effect::DeleteInstance);
        if deletes {
            self.store.delete_instance(instance.id)?;
        } else {
            self.store.update_instance(instance)?;
        }

        self.scheduler.cancel(instance.id);

        for effect in &transition.effects {
            match effect {
                Effect::ShowLowNotification => self.notifier.show_low(instance),
                Effect::ShowHighNotification => self.notifier.show_high(instance),
                Effect::ShowSnoozeNotification { until } => {
                    self.notifier.show_snooze(instance, *until)
                }
                Effect::ShowMissedNotification => self.notifier.show_missed(instance),
                Effect::ShowPreAlarmDismissedNotification => {
                    self.notifier.show_pre_alarm_dismissed(instance)
                }
                Effect::ClearNotification => self.notifier.clear(instance.id),
                Effect::StartSounder { pre_alarm } => {
                    if let Err(err) = self.sounder.start(instance, *pre_alarm, self.in_call) {
                        // The transition stands; the alarm is just silent.
                        warn!(instance_id = instance.id, %err, "sounder failed to start");
                    }
                }
                Effect::StopSounder => self.sounder.stop(),
                Effect::RetireParent => self.retire_parent(instance, now)?,
                Effect::DeleteInstance => {}
            }
        }

        if let Some((at, target)) = transition.wake {
            self.schedule_wake(instance.id, at, target);
        }

        if from != instance.state {
            self.push(Event::StateChanged {
                instance_id: instance.id,
                from,
                to: instance.state,
                at: now,
            });
        }
        match instance.state {
            InstanceState::Fired => self.push(Event::AlarmFired {
                instance_id: instance.id,
                pre_alarm: false,
                at: now,
            }),
            InstanceState::PreAlarm if from != InstanceState::PreAlarm => {
                self.push(Event::AlarmFired {
                    instance_id: instance.id,
                    pre_alarm: true,
                    at: now,
                })
            }
            InstanceState::Snooze => self.push(Event::AlarmSnoozed {
                instance_id: instance.id,
                until: instance.alarm_time,
                at: now,
            }),
            InstanceState::Missed => {
                self.push(Event::AlarmMissed {
                    instance_id: instance.id,
                    at: now,
                });
                self.reset_snoozes()?;
            }
            InstanceState::Dismissed => {
                self.push(Event::AlarmDismissed {
                    instance_id: instance.id,
                    at: now,
                });
                self.reset_snoozes()?;
            }
            _ => {}
        }
        Ok(())
    }

    fn reset_snoozes(&mut self) -> Result<()> {
        if self.ctx.snooze_count != 0 {
            self.ctx.snooze_count = 0;
            self.store.set_snooze_count(0)?;
        }
        Ok(())
    }

    /// The instance is done (missed or dismissed): advance, disable or
    /// delete its owning template.
    fn retire_parent(&mut self, instance: &AlarmInstance, now: DateTime<Utc>) -> Result<()> {
        let Some(template_id) = instance.template_id else {
            return Ok(());
        };
        let Some(mut template) = self.store.get_template(template_id)? else {
            return Ok(());
        };

        if template.is_repeating() {
            let keep = (instance.state != InstanceState::Dismissed).then_some(instance.id);
            let mut next =
                self.store
                    .replace_instance_for_template(&template, now, &self.policy, keep)?;
            self.register(&mut next, false)?;
            self.push(Event::ParentRetired {
                template_id,
                rescheduled: true,
                at: now,
            });
        } else if template.delete_after_use {
            self.store.delete_template(template_id)?;
            self.push(Event::ParentRetired {
                template_id,
                rescheduled: false,
                at: now,
            });
        } else {
            template.enabled = false;
            self.store.update_template(&template)?;
            self.push(Event::ParentRetired {
                template_id,
                rescheduled: false,
                at: now,
            });
        }
        Ok(())
    }

    fn push(&mut self, event: Event) {
        self.events.push(event);
    }
}
