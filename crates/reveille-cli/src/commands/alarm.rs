//! Alarm management commands.

use clap::Subcommand;
use chrono::Weekday;

use reveille_core::alarm::template::PreAlarm;
use reveille_core::{AlarmTemplate, DaySet};

use crate::common;

#[derive(Subcommand)]
pub enum AlarmAction {
    /// Create a new alarm
    Add {
        /// Clock time, e.g. "07:30"
        time: String,
        /// Repeat days: "daily" or a comma-separated list like
        /// "mon,wed,fri". Omit for a one-shot alarm.
        #[arg(long)]
        days: Option<String>,
        /// Alarm label
        #[arg(long)]
        label: Option<String>,
        /// Ringtone reference (default tone when omitted)
        #[arg(long)]
        ringtone: Option<String>,
        /// Pre-alarm lead time in minutes (0 uses the configured default)
        #[arg(long)]
        pre_alarm: Option<i64>,
        /// Delete the alarm once it has gone off
        #[arg(long)]
        delete_after_use: bool,
        /// Create the alarm disabled
        #[arg(long)]
        disabled: bool,
    },
    /// List alarms
    List,
    /// Get alarm details
    Get {
        /// Alarm ID
        id: i64,
    },
    /// Enable an alarm
    Enable {
        /// Alarm ID
        id: i64,
    },
    /// Disable an alarm
    Disable {
        /// Alarm ID
        id: i64,
    },
    /// Change an alarm's label
    Label {
        /// Alarm ID
        id: i64,
        /// New label
        label: String,
    },
    /// Delete an alarm and its scheduled instances
    Delete {
        /// Alarm ID
        id: i64,
    },
}

pub fn run(action: AlarmAction) -> Result<(), Box<dyn std::error::Error>> {
    let mut engine = common::open_engine()?;

    match action {
        AlarmAction::Add {
            time,
            days,
            label,
            ringtone,
            pre_alarm,
            delete_after_use,
            disabled,
        } => {
            let (hour, minute) = parse_time(&time)?;
            let mut template = AlarmTemplate::new(hour, minute);
            if let Some(spec) = days {
                template.days = parse_days(&spec)?;
            }
            if let Some(label) = label {
                template.label = label;
            }
            template.ringtone = ringtone;
            template.pre_alarm = pre_alarm.map(|lead_minutes| PreAlarm { lead_minutes });
            template.delete_after_use = delete_after_use;
            template.enabled = !disabled;

            let instance = engine.add_template(&mut template)?;
            println!("Alarm created: {}", template.id);
            println!("{}", serde_json::to_string_pretty(&template)?);
            if let Some(instance) = instance {
                println!("Next occurrence: {}", instance.alarm_time);
            }
        }
        AlarmAction::List => {
            let templates = engine.store().list_templates()?;
            println!("{}", serde_json::to_string_pretty(&templates)?);
        }
        AlarmAction::Get { id } => match engine.store().get_template(id)? {
            Some(template) => println!("{}", serde_json::to_string_pretty(&template)?),
            None => println!("Alarm not found: {id}"),
        },
        AlarmAction::Enable { id } => {
            let mut template = load(&engine, id)?;
            template.enabled = true;
            let instance = engine.update_template(&template)?;
            match instance {
                Some(instance) => println!("Alarm {id} enabled, next at {}", instance.alarm_time),
                None => println!("Alarm {id} enabled"),
            }
        }
        AlarmAction::Disable { id } => {
            let mut template = load(&engine, id)?;
            template.enabled = false;
            engine.update_template(&template)?;
            println!("Alarm {id} disabled");
        }
        AlarmAction::Label { id, label } => {
            let mut template = load(&engine, id)?;
            template.label = label;
            engine.update_template(&template)?;
            println!("Alarm {id} updated");
        }
        AlarmAction::Delete { id } => {
            engine.delete_template(id)?;
            println!("Alarm deleted: {id}");
        }
    }
    Ok(())
}

fn load(
    engine: &reveille_core::Engine,
    id: i64,
) -> Result<AlarmTemplate, Box<dyn std::error::Error>> {
    engine
        .store()
        .get_template(id)?
        .ok_or_else(|| format!("Alarm not found: {id}").into())
}

fn parse_time(spec: &str) -> Result<(u32, u32), Box<dyn std::error::Error>> {
    let (hour, minute) = spec
        .split_once(':')
        .ok_or_else(|| format!("expected HH:MM, got: {spec}"))?;
    Ok((hour.parse()?, minute.parse()?))
}

fn parse_days(spec: &str) -> Result<DaySet, Box<dyn std::error::Error>> {
    if spec == "daily" {
        return Ok(DaySet::every_day());
    }
    let mut days = Vec::new();
    for part in spec.split(',') {
        let day = match part.trim().to_lowercase().as_str() {
            "mon" => Weekday::Mon,
            "tue" => Weekday::Tue,
            "wed" => Weekday::Wed,
            "thu" => Weekday::Thu,
            "fri" => Weekday::Fri,
            "sat" => Weekday::Sat,
            "sun" => Weekday::Sun,
            other => return Err(format!("unknown day: {other}").into()),
        };
        days.push(day);
    }
    Ok(DaySet::new(days))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_time_accepts_hh_mm() {
        assert_eq!(parse_time("07:30").unwrap(), (7, 30));
        assert!(parse_time("730").is_err());
    }

    #[test]
    fn parse_days_handles_daily_and_lists() {
        assert_eq!(parse_days("daily").unwrap(), DaySet::every_day());
        assert_eq!(
            parse_days("mon, wed,FRI").unwrap(),
            DaySet::new(vec![Weekday::Mon, Weekday::Wed, Weekday::Fri])
        );
        assert!(parse_days("mon,funday").is_err());
    }
}
