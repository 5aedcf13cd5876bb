//! SQLite-based storage for alarm templates and instances.
//!
//! Provides persistent storage for:
//! - Alarm templates (the user-edited definitions)
//! - Alarm instances (one row per scheduled occurrence)
//! - Key-value store for engine state (generation id, snooze counter)

use chrono::{DateTime, Utc, Weekday};
use rusqlite::{params, Connection, OptionalExtension};

use super::{data_dir, EnginePolicy};
use crate::alarm::template::{ModeOption, PreAlarm, VolumeSetting};
use crate::alarm::{AlarmInstance, AlarmTemplate, DaySet, InstanceState};
use crate::error::DatabaseError;

// === Helper Functions ===

/// Format instance state for database storage
fn format_state(state: InstanceState) -> &'static str {
    match state {
        InstanceState::Silent => "silent",
        InstanceState::LowNotification => "low_notification",
        InstanceState::HideNotification => "hide_notification",
        InstanceState::HighNotification => "high_notification",
        InstanceState::PreAlarm => "pre_alarm",
        InstanceState::PreAlarmDismiss => "pre_alarm_dismiss",
        InstanceState::Fired => "fired",
        InstanceState::Snooze => "snooze",
        InstanceState::Missed => "missed",
        InstanceState::Dismissed => "dismissed",
    }
}

/// Parse instance state from database string
fn parse_state(state_str: &str) -> InstanceState {
    match state_str {
        "low_notification" => InstanceState::LowNotification,
        "hide_notification" => InstanceState::HideNotification,
        "high_notification" => InstanceState::HighNotification,
        "pre_alarm" => InstanceState::PreAlarm,
        "pre_alarm_dismiss" => InstanceState::PreAlarmDismiss,
        "fired" => InstanceState::Fired,
        "snooze" => InstanceState::Snooze,
        "missed" => InstanceState::Missed,
        "dismissed" => InstanceState::Dismissed,
        _ => InstanceState::Silent,
    }
}

/// Format mode option for database storage
fn format_mode(mode: ModeOption) -> &'static str {
    match mode {
        ModeOption::Off => "off",
        ModeOption::MainOnly => "main_only",
        ModeOption::PreAlarmOnly => "pre_alarm_only",
        ModeOption::Both => "both",
    }
}

/// Parse mode option from database string
fn parse_mode(mode_str: &str) -> ModeOption {
    match mode_str {
        "main_only" => ModeOption::MainOnly,
        "pre_alarm_only" => ModeOption::PreAlarmOnly,
        "both" => ModeOption::Both,
        _ => ModeOption::Off,
    }
}

/// Volume setting as a nullable integer (NULL = follow system volume)
fn format_volume(volume: VolumeSetting) -> Option<i64> {
    match volume {
        VolumeSetting::System => None,
        VolumeSetting::Level(v) => Some(v as i64),
    }
}

fn parse_volume(level: Option<i64>) -> VolumeSetting {
    match level {
        None => VolumeSetting::System,
        Some(v) => VolumeSetting::Level(v.clamp(0, 100) as u8),
    }
}

/// Repeat days as comma-separated offsets from Monday ("0,2,4")
fn format_days(days: &DaySet) -> String {
    days.days()
        .iter()
        .map(|d| d.num_days_from_monday().to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_days(days_str: &str) -> DaySet {
    let days = days_str
        .split(',')
        .filter_map(|s| s.trim().parse::<u32>().ok())
        .filter_map(|n| match n {
            0 => Some(Weekday::Mon),
            1 => Some(Weekday::Tue),
            2 => Some(Weekday::Wed),
            3 => Some(Weekday::Thu),
            4 => Some(Weekday::Fri),
            5 => Some(Weekday::Sat),
            6 => Some(Weekday::Sun),
            _ => None,
        })
        .collect();
    DaySet::new(days)
}

/// Parse an RFC3339 timestamp column. A corrupt value is a query
/// error, not a guess at the current time.
fn parse_datetime(idx: usize, dt_str: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(dt_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

/// Build an AlarmTemplate from a database row
fn row_to_template(row: &rusqlite::Row) -> Result<AlarmTemplate, rusqlite::Error> {
    let days_str: String = row.get(3)?;
    let increasing: String = row.get(12)?;
    let random: String = row.get(13)?;
    Ok(AlarmTemplate {
        id: row.get(0)?,
        hour: row.get(1)?,
        minute: row.get(2)?,
        days: parse_days(&days_str),
        enabled: row.get(4)?,
        label: row.get(5)?,
        ringtone: row.get(6)?,
        vibrate: row.get(7)?,
        delete_after_use: row.get(8)?,
        pre_alarm: row
            .get::<_, Option<i64>>(9)?
            .map(|lead_minutes| PreAlarm { lead_minutes }),
        alarm_volume: parse_volume(row.get(10)?),
        pre_alarm_volume: parse_volume(row.get(11)?),
        increasing_volume: parse_mode(&increasing),
        random_playback: parse_mode(&random),
    })
}

/// Build an AlarmInstance from a database row
fn row_to_instance(row: &rusqlite::Row) -> Result<AlarmInstance, rusqlite::Error> {
    let alarm_time: String = row.get(2)?;
    let original: String = row.get(3)?;
    let state_str: String = row.get(4)?;
    let pre_alarm: Option<String> = row.get(5)?;
    let increasing: String = row.get(12)?;
    let random: String = row.get(13)?;
    Ok(AlarmInstance {
        id: row.get(0)?,
        template_id: row.get(1)?,
        alarm_time: parse_datetime(2, &alarm_time)?,
        original_alarm_time: parse_datetime(3, &original)?,
        state: parse_state(&state_str),
        pre_alarm_time: pre_alarm
            .as_deref()
            .map(|s| parse_datetime(5, s))
            .transpose()?,
        label: row.get(6)?,
        ringtone: row.get(7)?,
        vibrate: row.get(8)?,
        delete_after_use: row.get(9)?,
        alarm_volume: parse_volume(row.get(10)?),
        pre_alarm_volume: parse_volume(row.get(11)?),
        increasing_volume: parse_mode(&increasing),
        random_playback: parse_mode(&random),
    })
}

const INSTANCE_COLUMNS: &str = "id, template_id, alarm_time, original_alarm_time, state, \
     pre_alarm_time, label, ringtone, vibrate, delete_after_use, alarm_volume, \
     pre_alarm_volume, increasing_volume, random_playback";

const TEMPLATE_COLUMNS: &str = "id, hour, minute, days, enabled, label, ringtone, vibrate, \
     delete_after_use, pre_alarm_lead_min, alarm_volume, pre_alarm_volume, \
     increasing_volume, random_playback";

/// SQLite database for alarm storage.
///
/// Stores templates, instances and the engine's persistent counters.
pub struct AlarmStore {
    conn: Connection,
}

impl AlarmStore {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `~/.config/reveille/reveille.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, DatabaseError> {
        let path = data_dir()
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?
            .join("reveille.db");
        let conn = Connection::open(&path).map_err(|source| DatabaseError::OpenFailed {
            path,
            source,
        })?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory database (for tests and dry runs).
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory().map_err(|source| DatabaseError::OpenFailed {
            path: ":memory:".into(),
            source,
        })?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), DatabaseError> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS templates (
                    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
                    hour               INTEGER NOT NULL,
                    minute             INTEGER NOT NULL,
                    days               TEXT NOT NULL DEFAULT '',
                    enabled            INTEGER NOT NULL DEFAULT 1,
                    label              TEXT NOT NULL DEFAULT '',
                    ringtone           TEXT,
                    vibrate            INTEGER NOT NULL DEFAULT 1,
                    delete_after_use   INTEGER NOT NULL DEFAULT 0,
                    pre_alarm_lead_min INTEGER,
                    alarm_volume       INTEGER,
                    pre_alarm_volume   INTEGER,
                    increasing_volume  TEXT NOT NULL DEFAULT 'off',
                    random_playback    TEXT NOT NULL DEFAULT 'off'
                );

                CREATE TABLE IF NOT EXISTS instances (
                    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                    template_id         INTEGER,
                    alarm_time          TEXT NOT NULL,
                    original_alarm_time TEXT NOT NULL,
                    state               TEXT NOT NULL DEFAULT 'silent',
                    pre_alarm_time      TEXT,
                    label               TEXT NOT NULL DEFAULT '',
                    ringtone            TEXT,
                    vibrate             INTEGER NOT NULL DEFAULT 1,
                    delete_after_use    INTEGER NOT NULL DEFAULT 0,
                    alarm_volume        INTEGER,
                    pre_alarm_volume    INTEGER,
                    increasing_volume   TEXT NOT NULL DEFAULT 'off',
                    random_playback     TEXT NOT NULL DEFAULT 'off'
                );

                CREATE TABLE IF NOT EXISTS kv (
                    key   TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_instances_template ON instances(template_id);
                CREATE INDEX IF NOT EXISTS idx_instances_state ON instances(state);
                CREATE INDEX IF NOT EXISTS idx_instances_alarm_time ON instances(alarm_time);",
            )
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))
    }

    // === Templates ===

    /// Insert a template, assigning its id.
    pub fn insert_template(&self, template: &mut AlarmTemplate) -> Result<i64, rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO templates (hour, minute, days, enabled, label, ringtone, vibrate,
                 delete_after_use, pre_alarm_lead_min, alarm_volume, pre_alarm_volume,
                 increasing_volume, random_playback)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                template.hour,
                template.minute,
                format_days(&template.days),
                template.enabled,
                template.label,
                template.ringtone,
                template.vibrate,
                template.delete_after_use,
                template.pre_alarm.map(|p| p.lead_minutes),
                format_volume(template.alarm_volume),
                format_volume(template.pre_alarm_volume),
                format_mode(template.increasing_volume),
                format_mode(template.random_playback),
            ],
        )?;
        template.id = self.conn.last_insert_rowid();
        Ok(template.id)
    }

    pub fn update_template(&self, template: &AlarmTemplate) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "UPDATE templates SET hour = ?2, minute = ?3, days = ?4, enabled = ?5, label = ?6,
                 ringtone = ?7, vibrate = ?8, delete_after_use = ?9, pre_alarm_lead_min = ?10,
                 alarm_volume = ?11, pre_alarm_volume = ?12, increasing_volume = ?13,
                 random_playback = ?14
             WHERE id = ?1",
            params![
                template.id,
                template.hour,
                template.minute,
                format_days(&template.days),
                template.enabled,
                template.label,
                template.ringtone,
                template.vibrate,
                template.delete_after_use,
                template.pre_alarm.map(|p| p.lead_minutes),
                format_volume(template.alarm_volume),
                format_volume(template.pre_alarm_volume),
                format_mode(template.increasing_volume),
                format_mode(template.random_playback),
            ],
        )?;
        Ok(())
    }

    pub fn get_template(&self, id: i64) -> Result<Option<AlarmTemplate>, rusqlite::Error> {
        self.conn
            .query_row(
                &format!("SELECT {TEMPLATE_COLUMNS} FROM templates WHERE id = ?1"),
                params![id],
                row_to_template,
            )
            .optional()
    }

    pub fn list_templates(&self) -> Result<Vec<AlarmTemplate>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM templates ORDER BY hour, minute, id"
        ))?;
        let rows = stmt.query_map([], row_to_template)?;
        rows.collect()
    }

    pub fn delete_template(&self, id: i64) -> Result<(), rusqlite::Error> {
        self.conn
            .execute("DELETE FROM templates WHERE id = ?1", params![id])?;
        Ok(())
    }

    // === Instances ===

    /// Insert an instance, assigning its id.
    pub fn insert_instance(&self, instance: &mut AlarmInstance) -> Result<i64, rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO instances (template_id, alarm_time, original_alarm_time, state,
                 pre_alarm_time, label, ringtone, vibrate, delete_after_use, alarm_volume,
                 pre_alarm_volume, increasing_volume, random_playback)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                instance.template_id,
                instance.alarm_time.to_rfc3339(),
                instance.original_alarm_time.to_rfc3339(),
                format_state(instance.state),
                instance.pre_alarm_time.map(|t| t.to_rfc3339()),
                instance.label,
                instance.ringtone,
                instance.vibrate,
                instance.delete_after_use,
                format_volume(instance.alarm_volume),
                format_volume(instance.pre_alarm_volume),
                format_mode(instance.increasing_volume),
                format_mode(instance.random_playback),
            ],
        )?;
        instance.id = self.conn.last_insert_rowid();
        Ok(instance.id)
    }

    pub fn update_instance(&self, instance: &AlarmInstance) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "UPDATE instances SET template_id = ?2, alarm_time = ?3,
                 original_alarm_time = ?4, state = ?5, pre_alarm_time = ?6, label = ?7,
                 ringtone = ?8, vibrate = ?9, delete_after_use = ?10, alarm_volume = ?11,
                 pre_alarm_volume = ?12, increasing_volume = ?13, random_playback = ?14
             WHERE id = ?1",
            params![
                instance.id,
                instance.template_id,
                instance.alarm_time.to_rfc3339(),
                instance.original_alarm_time.to_rfc3339(),
                format_state(instance.state),
                instance.pre_alarm_time.map(|t| t.to_rfc3339()),
                instance.label,
                instance.ringtone,
                instance.vibrate,
                instance.delete_after_use,
                format_volume(instance.alarm_volume),
                format_volume(instance.pre_alarm_volume),
                format_mode(instance.increasing_volume),
                format_mode(instance.random_playback),
            ],
        )?;
        Ok(())
    }

    pub fn get_instance(&self, id: i64) -> Result<Option<AlarmInstance>, rusqlite::Error> {
        self.conn
            .query_row(
                &format!("SELECT {INSTANCE_COLUMNS} FROM instances WHERE id = ?1"),
                params![id],
                row_to_instance,
            )
            .optional()
    }

    pub fn list_instances(&self) -> Result<Vec<AlarmInstance>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM instances ORDER BY alarm_time, id"
        ))?;
        let rows = stmt.query_map([], row_to_instance)?;
        rows.collect()
    }

    pub fn instances_for_template(
        &self,
        template_id: i64,
    ) -> Result<Vec<AlarmInstance>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM instances WHERE template_id = ?1
             ORDER BY alarm_time, id"
        ))?;
        let rows = stmt.query_map(params![template_id], row_to_instance)?;
        rows.collect()
    }

    /// Instances still counted toward the "next alarm" display:
    /// everything ordinally before the pre-alarm/ring phase, soonest
    /// first.
    pub fn upcoming_instances(&self) -> Result<Vec<AlarmInstance>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM instances
             WHERE state IN ('silent', 'low_notification', 'hide_notification',
                             'high_notification')
             ORDER BY alarm_time, id"
        ))?;
        let rows = stmt.query_map([], row_to_instance)?;
        rows.collect()
    }

    pub fn delete_instance(&self, id: i64) -> Result<(), rusqlite::Error> {
        self.conn
            .execute("DELETE FROM instances WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Atomically replace a repeating template's outstanding instances
    /// with a freshly stamped one for its next occurrence after
    /// `after`. Either the old rows are gone and the new row exists,
    /// or nothing changed. `keep_instance` survives the sweep (a
    /// missed instance stays visible until its TTL while its
    /// replacement is already scheduled).
    pub fn replace_instance_for_template(
        &mut self,
        template: &AlarmTemplate,
        after: DateTime<Utc>,
        policy: &EnginePolicy,
        keep_instance: Option<i64>,
    ) -> Result<AlarmInstance, rusqlite::Error> {
        let mut instance = template.create_instance(after, policy);
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM instances WHERE template_id = ?1 AND id != ?2",
            params![template.id, keep_instance.unwrap_or(-1)],
        )?;
        tx.execute(
            "INSERT INTO instances (template_id, alarm_time, original_alarm_time, state,
                 pre_alarm_time, label, ringtone, vibrate, delete_after_use, alarm_volume,
                 pre_alarm_volume, increasing_volume, random_playback)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                instance.template_id,
                instance.alarm_time.to_rfc3339(),
                instance.original_alarm_time.to_rfc3339(),
                format_state(instance.state),
                instance.pre_alarm_time.map(|t| t.to_rfc3339()),
                instance.label,
                instance.ringtone,
                instance.vibrate,
                instance.delete_after_use,
                format_volume(instance.alarm_volume),
                format_volume(instance.pre_alarm_volume),
                format_mode(instance.increasing_volume),
                format_mode(instance.random_playback),
            ],
        )?;
        instance.id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(instance)
    }

    // === Key-value engine state ===

    pub fn get_kv(&self, key: &str) -> Result<Option<String>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT value FROM kv WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
    }

    pub fn set_kv(&self, key: &str, value: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    /// Current wake-up generation, 0 when never bumped.
    pub fn generation(&self) -> Result<i64, rusqlite::Error> {
        Ok(self
            .get_kv("generation")?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0))
    }

    /// Bump and persist the generation, invalidating pending wake-ups
    /// scheduled under the previous one.
    pub fn bump_generation(&self) -> Result<i64, rusqlite::Error> {
        let next = self.generation()? + 1;
        self.set_kv("generation", &next.to_string())?;
        Ok(next)
    }

    pub fn snooze_count(&self) -> Result<u32, rusqlite::Error> {
        Ok(self
            .get_kv("snooze_count")?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0))
    }

    pub fn set_snooze_count(&self, count: u32) -> Result<(), rusqlite::Error> {
        self.set_kv("snooze_count", &count.to_string())
    }
}
