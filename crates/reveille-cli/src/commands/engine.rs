//! Engine maintenance commands: reconciliation and wake processing.
//!
//! Each invocation is a fresh process, so a tick always starts with a
//! full reconciliation pass to rebuild the wake schedule from the
//! store before draining anything that is already due.

use clap::Subcommand;

use crate::common;

#[derive(Subcommand)]
pub enum EngineAction {
    /// Reconcile all instances and process due wake-ups
    Tick,
    /// Re-derive every instance's state (run after boot or a clock change)
    Fix,
    /// Show the next upcoming alarm
    Next,
}

pub fn run(action: EngineAction) -> Result<(), Box<dyn std::error::Error>> {
    let mut engine = common::open_engine()?;

    match action {
        EngineAction::Tick => {
            engine.fix_alarm_instances()?;
            let processed = engine.tick()?;
            println!("Processed {processed} wake-ups");
            print_events(&mut engine)?;
        }
        EngineAction::Fix => {
            engine.fix_alarm_instances()?;
            print_events(&mut engine)?;
        }
        EngineAction::Next => match engine.next_alarm()? {
            Some(instance) => println!("{}", serde_json::to_string_pretty(&instance)?),
            None => println!("No upcoming alarm"),
        },
    }
    Ok(())
}

fn print_events(
    engine: &mut reveille_core::Engine,
) -> Result<(), Box<dyn std::error::Error>> {
    let events = engine.drain_events();
    if !events.is_empty() {
        println!("{}", serde_json::to_string_pretty(&events)?);
    }
    Ok(())
}
