use clap::Subcommand;

use reveille_core::EnginePolicy;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the current policy
    Show,
    /// Set a policy value
    Set {
        /// Policy key (e.g. "snooze_minutes")
        key: String,
        /// New value
        value: String,
    },
    /// Reset the policy to defaults
    Reset,
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Show => {
            let policy = EnginePolicy::load()?;
            println!("{}", toml::to_string_pretty(&policy)?);
        }
        ConfigAction::Set { key, value } => {
            let mut policy = EnginePolicy::load()?;
            set_key(&mut policy, &key, &value)?;
            policy.validate()?;
            policy.save()?;
            println!("ok");
        }
        ConfigAction::Reset => {
            EnginePolicy::default().save()?;
            println!("config reset to defaults");
        }
    }
    Ok(())
}

fn set_key(
    policy: &mut EnginePolicy,
    key: &str,
    value: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    match key {
        "low_notification_hours_before" => policy.low_notification_hours_before = value.parse()?,
        "high_notification_minutes_before" => {
            policy.high_notification_minutes_before = value.parse()?
        }
        "auto_silence_minutes" => policy.auto_silence_minutes = value.parse()?,
        "missed_ttl_hours" => policy.missed_ttl_hours = value.parse()?,
        "snooze_minutes" => policy.snooze_minutes = value.parse()?,
        "snooze_limit" => policy.snooze_limit = value.parse()?,
        "fire_grace_seconds" => policy.fire_grace_seconds = value.parse()?,
        "pre_alarm_lead_minutes_default" => {
            policy.pre_alarm_lead_minutes_default = value.parse()?
        }
        "pre_alarm_timeout_minutes" => policy.pre_alarm_timeout_minutes = value.parse()?,
        "in_call_volume" => policy.in_call_volume = value.parse()?,
        _ => return Err(format!("unknown key: {key}").into()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_key_updates_known_fields() {
        let mut policy = EnginePolicy::default();
        set_key(&mut policy, "snooze_minutes", "5").unwrap();
        assert_eq!(policy.snooze_minutes, 5);
        set_key(&mut policy, "snooze_limit", "0").unwrap();
        assert_eq!(policy.snooze_limit, 0);
    }

    #[test]
    fn set_key_rejects_unknown_and_unparsable() {
        let mut policy = EnginePolicy::default();
        assert!(set_key(&mut policy, "nope", "1").is_err());
        assert!(set_key(&mut policy, "snooze_minutes", "soon").is_err());
    }
}
