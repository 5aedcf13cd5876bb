//! Bulk reconciliation tests: boot/clock-change recovery through
//! `fix_alarm_instances`, generation handling and late wake-ups.

mod common;

use common::{at, harness};
use reveille_core::alarm::template::PreAlarm;
use reveille_core::{
    AlarmTemplate, Event, InstanceState, ScheduledWake, WakeTag,
};

#[test]
fn fix_is_idempotent_when_nothing_changed() {
    let mut h = harness(at(6, 30, 0));
    let mut tpl = AlarmTemplate::new(8, 0);
    let inst = h.engine.add_template(&mut tpl).unwrap().unwrap();
    assert_eq!(
        h.engine.store().get_instance(inst.id).unwrap().unwrap().state,
        InstanceState::LowNotification
    );

    h.notifier.clear_calls();
    h.engine.drain_events();

    h.engine.fix_alarm_instances().unwrap();
    h.engine.fix_alarm_instances().unwrap();

    // Same state, no re-shown notifications, still exactly one pending
    // wake for the instance.
    assert_eq!(
        h.engine.store().get_instance(inst.id).unwrap().unwrap().state,
        InstanceState::LowNotification
    );
    assert!(h.notifier.calls().is_empty());
    assert_eq!(h.sounder.start_count(), 0);

    let wakes = h.engine.pending_wakes();
    assert_eq!(wakes.len(), 1);
    assert_eq!(wakes[0].at, at(7, 30, 0));
    assert_eq!(wakes[0].target, InstanceState::HighNotification);

    assert!(!h
        .engine
        .drain_events()
        .iter()
        .any(|e| matches!(e, Event::StateChanged { .. })));
}

#[test]
fn fix_invalidates_wakes_scheduled_before_it() {
    let mut h = harness(at(7, 0, 0));
    let mut tpl = AlarmTemplate::new(8, 0);
    let inst = h.engine.add_template(&mut tpl).unwrap().unwrap();

    // A wake the platform captured before the reboot.
    let stale = h.engine.pending_wakes()[0].clone();

    h.engine.fix_alarm_instances().unwrap();
    assert_eq!(h.engine.context().generation, stale.generation + 1);

    // The refreshed schedule carries the new generation.
    let wakes = h.engine.pending_wakes();
    assert_eq!(wakes.len(), 1);
    assert_eq!(wakes[0].generation, stale.generation + 1);

    // Delivering the pre-reboot wake is a no-op.
    h.engine.drain_events();
    h.engine.handle_wake(stale).unwrap();
    assert_eq!(
        h.engine.store().get_instance(inst.id).unwrap().unwrap().state,
        InstanceState::HighNotification
    );
    assert_eq!(h.sounder.start_count(), 0);
    assert!(h
        .engine
        .drain_events()
        .iter()
        .any(|e| matches!(e, Event::StaleWakeDropped { .. })));
}

#[test]
fn fix_keeps_a_ringing_alarm_ringing() {
    let mut h = harness(at(7, 50, 0));
    let mut tpl = AlarmTemplate::new(8, 0);
    let inst = h.engine.add_template(&mut tpl).unwrap().unwrap();

    h.clock.set(at(8, 0, 0));
    h.engine.tick().unwrap();
    assert_eq!(h.sounder.start_count(), 1);

    // Time or timezone changed five minutes into the ring.
    h.clock.set(at(8, 5, 0));
    h.engine.fix_alarm_instances().unwrap();

    let fired = h.engine.store().get_instance(inst.id).unwrap().unwrap();
    assert_eq!(fired.state, InstanceState::Fired);
    assert_eq!(h.sounder.start_count(), 1);

    let wakes = h.engine.pending_wakes();
    assert_eq!(wakes.len(), 1);
    assert_eq!(wakes[0].at, at(8, 10, 0));
    assert_eq!(wakes[0].target, InstanceState::Missed);
    assert_eq!(wakes[0].generation, h.engine.context().generation);
}

#[test]
fn clock_set_backward_past_missed_alarm_revives_it() {
    let mut h = harness(at(7, 50, 0));
    let mut tpl = AlarmTemplate::new(8, 0); // one-shot
    let inst = h.engine.add_template(&mut tpl).unwrap().unwrap();

    h.clock.set(at(8, 0, 0));
    h.engine.tick().unwrap();
    h.clock.set(at(8, 10, 1));
    h.engine.tick().unwrap();
    assert_eq!(
        h.engine.store().get_instance(inst.id).unwrap().unwrap().state,
        InstanceState::Missed
    );
    assert!(!h.engine.store().get_template(tpl.id).unwrap().unwrap().enabled);

    // The device clock is corrected back to before the alarm time.
    h.clock.set(at(7, 30, 0));
    h.engine.fix_alarm_instances().unwrap();

    let parent = h.engine.store().get_template(tpl.id).unwrap().unwrap();
    assert!(parent.enabled);
    let revived = h.engine.store().get_instance(inst.id).unwrap().unwrap();
    assert_eq!(revived.state, InstanceState::HighNotification);

    // And it rings again at the (now future) alarm time.
    h.clock.set(at(8, 0, 0));
    h.engine.tick().unwrap();
    assert_eq!(
        h.engine.store().get_instance(inst.id).unwrap().unwrap().state,
        InstanceState::Fired
    );
    assert_eq!(h.sounder.start_count(), 2);
}

#[test]
fn fix_during_pre_alarm_snooze_keeps_the_main_alarm() {
    let mut h = harness(at(7, 0, 0));
    let mut tpl = AlarmTemplate::new(8, 0); // one-shot
    tpl.pre_alarm = Some(PreAlarm { lead_minutes: 30 });
    let inst = h.engine.add_template(&mut tpl).unwrap().unwrap();

    h.clock.set(at(7, 32, 0));
    h.engine.tick().unwrap();
    assert_eq!(
        h.engine.store().get_instance(inst.id).unwrap().unwrap().state,
        InstanceState::PreAlarm
    );

    h.engine.set_snooze_state(inst.id, true).unwrap();
    let snoozed = h.engine.store().get_instance(inst.id).unwrap().unwrap();
    assert_eq!(snoozed.alarm_time, at(7, 42, 0));

    // A reboot lands after the deferred time but before the original
    // alarm time: the instance goes back into the pre-alarm phase, the
    // parent stays enabled, and the main alarm still rings at 8:00.
    h.clock.set(at(7, 43, 0));
    h.engine.fix_alarm_instances().unwrap();

    let revived = h.engine.store().get_instance(inst.id).unwrap().unwrap();
    assert_eq!(revived.state, InstanceState::PreAlarm);
    assert_eq!(revived.alarm_time, at(8, 0, 0));
    assert!(h.engine.store().get_template(tpl.id).unwrap().unwrap().enabled);

    h.clock.set(at(8, 0, 0));
    h.engine.tick().unwrap();
    assert_eq!(
        h.engine.store().get_instance(inst.id).unwrap().unwrap().state,
        InstanceState::Fired
    );
    assert!(h
        .sounder
        .calls()
        .contains(&reveille_core::testing::SounderCall::Start {
            instance_id: inst.id,
            pre_alarm: false,
            in_call: false,
        }));
}

#[test]
fn out_of_order_snooze_requests() {
    let mut h = harness(at(7, 50, 0));
    let mut tpl = AlarmTemplate::new(8, 0);
    let inst = h.engine.add_template(&mut tpl).unwrap().unwrap();

    h.clock.set(at(8, 0, 0));
    h.engine.tick().unwrap();
    let generation = h.engine.context().generation;

    // An untagged request from before the last reboot: dropped.
    h.engine
        .handle_wake(ScheduledWake {
            instance_id: inst.id,
            at: at(8, 0, 0),
            target: InstanceState::Snooze,
            generation: generation - 1,
            tag: WakeTag::Normal,
        })
        .unwrap();
    assert_eq!(
        h.engine.store().get_instance(inst.id).unwrap().unwrap().state,
        InstanceState::Fired
    );

    // The same request carrying the snooze override tag: applied even
    // with a stale generation.
    h.engine
        .handle_wake(ScheduledWake {
            instance_id: inst.id,
            at: at(8, 0, 0),
            target: InstanceState::Snooze,
            generation: generation - 1,
            tag: WakeTag::Snooze,
        })
        .unwrap();
    let snoozed = h.engine.store().get_instance(inst.id).unwrap().unwrap();
    assert_eq!(snoozed.state, InstanceState::Snooze);
    assert_eq!(snoozed.alarm_time, at(8, 10, 0));
}

#[test]
fn fix_purges_orphaned_instances() {
    let mut h = harness(at(7, 0, 0));
    let mut tpl = AlarmTemplate::new(8, 0);
    let inst = h.engine.add_template(&mut tpl).unwrap().unwrap();

    // The template row vanished without going through the engine.
    h.engine.store().delete_template(tpl.id).unwrap();
    h.engine.fix_alarm_instances().unwrap();

    assert!(h.engine.store().get_instance(inst.id).unwrap().is_none());
    assert!(h.engine.pending_wakes().is_empty());
}
