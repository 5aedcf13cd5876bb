//! Scheduled instance commands: inspect and act on what the engine has
//! queued up.

use clap::Subcommand;

use reveille_core::Event;

use crate::common;

#[derive(Subcommand)]
pub enum InstanceAction {
    /// List scheduled instances
    List,
    /// Snooze a ringing instance
    Snooze {
        /// Instance ID
        id: i64,
    },
    /// Dismiss an instance
    Dismiss {
        /// Instance ID
        id: i64,
    },
    /// Hide an instance's upcoming-alarm notification
    Hide {
        /// Instance ID
        id: i64,
    },
}

pub fn run(action: InstanceAction) -> Result<(), Box<dyn std::error::Error>> {
    let mut engine = common::open_engine()?;

    match action {
        InstanceAction::List => {
            let instances = engine.store().list_instances()?;
            println!("{}", serde_json::to_string_pretty(&instances)?);
        }
        InstanceAction::Snooze { id } => {
            engine.set_snooze_state(id, true)?;
            let rejected = engine
                .drain_events()
                .iter()
                .any(|e| matches!(e, Event::SnoozeRejected { .. }));
            if rejected {
                println!("Snooze rejected: limit reached");
            } else if let Some(instance) = engine.store().get_instance(id)? {
                println!("Instance {id} snoozed until {}", instance.alarm_time);
            }
        }
        InstanceAction::Dismiss { id } => {
            engine.set_dismiss_state(id)?;
            println!("Instance dismissed: {id}");
        }
        InstanceAction::Hide { id } => {
            engine.set_hide_notification_state(id)?;
            println!("Notification hidden: {id}");
        }
    }
    Ok(())
}
