//! SQLite-backed storage for the attendance pipeline.
//!
//! Provides persistent storage for:
//! - The gym registry and per-member settings
//! - Presence lifecycle rows and immutable assistance records
//! - The append-only token ledger and multiplier activations
//! - Streak counters and weekly goal progress
//!
//! All writes are row-level primitives; orchestration and transaction
//! scoping belong to the service layer, which drives them through
//! `conn().unchecked_transaction()`.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::RewardError;
use crate::geofence::{GeoPoint, GeofenceZone};
use crate::ledger::{LedgerReason, MultiplierEffect, TokenLedgerEntry};
use crate::presence::{Presence, PresenceStatus};
use crate::streak::Streak;
use crate::weekly::WeeklyGoal;

use super::{data_dir, migrations};

/// A registered gym with its geofence parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gym {
    /// Unique gym id
    pub id: String,

    /// Display name
    pub name: String,

    /// Geofence center latitude
    pub latitude: f64,

    /// Geofence center longitude
    pub longitude: f64,

    /// Geofence radius in meters
    pub radius_m: f64,

    /// Minutes a member must stay before the visit counts
    pub min_stay_min: i64,

    /// When the gym was registered
    pub created_at: DateTime<Utc>,
}

impl Gym {
    /// The geofence zone this gym's rows describe.
    ///
    /// Re-validates the stored coordinates so corrupted rows surface as
    /// errors instead of nonsense distances.
    pub fn zone(&self) -> Result<GeofenceZone, RewardError> {
        let center = GeoPoint::new(self.latitude, self.longitude)?;
        GeofenceZone::new(center, self.radius_m, self.min_stay_min)
    }
}

/// How an assistance record came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssistanceSource {
    /// Produced by the geofence pipeline
    Geofence,

    /// Registered manually by an operator
    Manual,
}

/// An immutable record of one counted gym visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assistance {
    /// Unique assistance id
    pub id: String,

    /// Member who attended
    pub user_id: String,

    /// Gym attended
    pub gym_id: String,

    /// Presence this record was converted from
    pub presence_id: String,

    /// When the visit was confirmed
    pub occurred_at: DateTime<Utc>,

    /// How the record was produced
    pub source: AssistanceSource,

    /// When the row was inserted
    pub created_at: DateTime<Utc>,
}

/// Parse presence status from database string
fn parse_presence_status(status_str: &str) -> PresenceStatus {
    match status_str {
        "DETECTING" => PresenceStatus::Detecting,
        "CONFIRMED" => PresenceStatus::Confirmed,
        _ => PresenceStatus::Exited,
    }
}

/// Format presence status for database storage
fn format_presence_status(status: PresenceStatus) -> &'static str {
    match status {
        PresenceStatus::Detecting => "DETECTING",
        PresenceStatus::Confirmed => "CONFIRMED",
        PresenceStatus::Exited => "EXITED",
    }
}

/// Parse assistance source from database string
fn parse_assistance_source(source_str: &str) -> AssistanceSource {
    match source_str {
        "MANUAL" => AssistanceSource::Manual,
        _ => AssistanceSource::Geofence,
    }
}

/// Format assistance source for database storage
fn format_assistance_source(source: AssistanceSource) -> &'static str {
    match source {
        AssistanceSource::Geofence => "GEOFENCE",
        AssistanceSource::Manual => "MANUAL",
    }
}

/// Parse datetime from RFC3339 string with fallback to current time
fn parse_datetime_fallback(dt_str: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(dt_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Parse an optional datetime column
fn parse_datetime_opt(dt_str: Option<String>) -> Option<DateTime<Utc>> {
    dt_str.map(|s| parse_datetime_fallback(&s))
}

/// Parse an optional `YYYY-MM-DD` date column
fn parse_date_opt(date_str: Option<String>) -> Option<NaiveDate> {
    date_str.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())
}

/// Build a Presence from a database row
fn row_to_presence(row: &rusqlite::Row) -> Result<Presence, rusqlite::Error> {
    let status_str: String = row.get(3)?;
    let detected_at_str: String = row.get(4)?;

    Ok(Presence {
        id: row.get(0)?,
        user_id: row.get(1)?,
        gym_id: row.get(2)?,
        status: parse_presence_status(&status_str),
        detected_at: parse_datetime_fallback(&detected_at_str),
        confirmed_at: parse_datetime_opt(row.get(5)?),
        exited_at: parse_datetime_opt(row.get(6)?),
        converted_to_assistance: row.get(7)?,
        assistance_id: row.get(8)?,
    })
}

/// Build an Assistance from a database row
fn row_to_assistance(row: &rusqlite::Row) -> Result<Assistance, rusqlite::Error> {
    let occurred_at_str: String = row.get(4)?;
    let source_str: String = row.get(5)?;
    let created_at_str: String = row.get(6)?;

    Ok(Assistance {
        id: row.get(0)?,
        user_id: row.get(1)?,
        gym_id: row.get(2)?,
        presence_id: row.get(3)?,
        occurred_at: parse_datetime_fallback(&occurred_at_str),
        source: parse_assistance_source(&source_str),
        created_at: parse_datetime_fallback(&created_at_str),
    })
}

/// Build a TokenLedgerEntry from a database row
fn row_to_ledger_entry(row: &rusqlite::Row) -> Result<TokenLedgerEntry, rusqlite::Error> {
    let reason_str: String = row.get(3)?;
    let reason = LedgerReason::parse(&reason_str).map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown ledger reason: {reason_str}").into(),
        )
    })?;
    let occurred_at_str: String = row.get(4)?;
    let created_at_str: String = row.get(6)?;

    Ok(TokenLedgerEntry {
        id: row.get(0)?,
        user_id: row.get(1)?,
        delta: row.get(2)?,
        reason,
        occurred_at: parse_datetime_fallback(&occurred_at_str),
        idempotency_key: row.get(5)?,
        created_at: parse_datetime_fallback(&created_at_str),
    })
}

/// Build a MultiplierEffect from a database row
fn row_to_multiplier_effect(row: &rusqlite::Row) -> Result<MultiplierEffect, rusqlite::Error> {
    let activated_at_str: String = row.get(3)?;
    let expires_at_str: String = row.get(4)?;

    Ok(MultiplierEffect {
        id: row.get(0)?,
        user_id: row.get(1)?,
        multiplier_value: row.get(2)?,
        activated_at: parse_datetime_fallback(&activated_at_str),
        expires_at: parse_datetime_fallback(&expires_at_str),
    })
}

/// Build a Streak from a database row
fn row_to_streak(row: &rusqlite::Row) -> Result<Streak, rusqlite::Error> {
    Ok(Streak {
        user_id: row.get(0)?,
        value: row.get(1)?,
        last_value: row.get(2)?,
        max_value: row.get(3)?,
        recovery_items: row.get(4)?,
        last_assistance_date: parse_date_opt(row.get(5)?),
        linked_frequency_id: row.get(6)?,
    })
}

/// Build a WeeklyGoal from a database row
fn row_to_weekly_goal(row: &rusqlite::Row) -> Result<WeeklyGoal, rusqlite::Error> {
    let week_start_str: String = row.get(6)?;
    let week_start_date =
        NaiveDate::parse_from_str(&week_start_str, "%Y-%m-%d").map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                6,
                rusqlite::types::Type::Text,
                format!("invalid week_start_date: {week_start_str}").into(),
            )
        })?;

    Ok(WeeklyGoal {
        user_id: row.get(0)?,
        year: row.get(1)?,
        week_number: row.get(2)?,
        goal: row.get(3)?,
        assist_count: row.get(4)?,
        achieved_goal: row.get(5)?,
        week_start_date,
        last_assist_date: parse_date_opt(row.get(7)?),
    })
}

/// Build a Gym from a database row
fn row_to_gym(row: &rusqlite::Row) -> Result<Gym, rusqlite::Error> {
    let created_at_str: String = row.get(6)?;

    Ok(Gym {
        id: row.get(0)?,
        name: row.get(1)?,
        latitude: row.get(2)?,
        longitude: row.get(3)?,
        radius_m: row.get(4)?,
        min_stay_min: row.get(5)?,
        created_at: parse_datetime_fallback(&created_at_str),
    })
}

/// SQLite database for the attendance reward pipeline.
///
/// Stores gyms, presences, assistances, the token ledger, multiplier
/// activations, streaks, and weekly goals.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `~/.config/gymtally/gymtally.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, Box<dyn std::error::Error>> {
        let path = data_dir()?.join("gymtally.db");
        Self::open_at(&path)
    }

    /// Open a database at an explicit path.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_at(path: &std::path::Path) -> Result<Self, Box<dyn std::error::Error>> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests and ephemeral embedding).
    pub fn open_memory() -> Result<Self, Box<dyn std::error::Error>> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        // Create base tables (v1 schema) first
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS gyms (
                id           TEXT PRIMARY KEY,
                name         TEXT NOT NULL,
                latitude     REAL NOT NULL,
                longitude    REAL NOT NULL,
                radius_m     REAL NOT NULL,
                min_stay_min INTEGER NOT NULL,
                created_at   TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS member_settings (
                user_id     TEXT PRIMARY KEY,
                weekly_goal INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS presences (
                id                      TEXT PRIMARY KEY,
                user_id                 TEXT NOT NULL,
                gym_id                  TEXT NOT NULL,
                status                  TEXT NOT NULL,
                detected_at             TEXT NOT NULL,
                confirmed_at            TEXT,
                exited_at               TEXT,
                converted_to_assistance INTEGER NOT NULL DEFAULT 0,
                assistance_id           TEXT
            );

            CREATE TABLE IF NOT EXISTS assistances (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL,
                gym_id      TEXT NOT NULL,
                presence_id TEXT NOT NULL,
                occurred_at TEXT NOT NULL,
                source      TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS ledger_entries (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id         TEXT NOT NULL,
                delta           INTEGER NOT NULL,
                reason          TEXT NOT NULL,
                occurred_at     TEXT NOT NULL,
                idempotency_key TEXT NOT NULL,
                created_at      TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS multiplier_effects (
                id               TEXT PRIMARY KEY,
                user_id          TEXT NOT NULL,
                multiplier_value REAL NOT NULL,
                activated_at     TEXT NOT NULL,
                expires_at       TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS streaks (
                user_id              TEXT PRIMARY KEY,
                value                INTEGER NOT NULL DEFAULT 0,
                last_value           INTEGER NOT NULL DEFAULT 0,
                max_value            INTEGER NOT NULL DEFAULT 0,
                recovery_items      INTEGER NOT NULL DEFAULT 0,
                last_assistance_date TEXT
            );

            CREATE TABLE IF NOT EXISTS weekly_goals (
                user_id         TEXT NOT NULL,
                year            INTEGER NOT NULL,
                week_number     INTEGER NOT NULL,
                goal            INTEGER NOT NULL,
                assist_count    INTEGER NOT NULL DEFAULT 0,
                achieved_goal   INTEGER NOT NULL DEFAULT 0,
                week_start_date TEXT NOT NULL,
                PRIMARY KEY (user_id, year, week_number)
            );

            -- Create indexes for common query patterns
            CREATE UNIQUE INDEX IF NOT EXISTS idx_ledger_idempotency_key
                ON ledger_entries(idempotency_key);
            CREATE INDEX IF NOT EXISTS idx_ledger_user_reason_occurred
                ON ledger_entries(user_id, reason, occurred_at);
            CREATE INDEX IF NOT EXISTS idx_assistances_user_occurred
                ON assistances(user_id, occurred_at);
            CREATE INDEX IF NOT EXISTS idx_multiplier_effects_user
                ON multiplier_effects(user_id, expires_at);",
        )?;

        // Run incremental migrations (v1 -> v2 -> v3, etc.)
        migrations::migrate(&self.conn)?;

        // One live presence per member and gym (idempotent, partial over
        // the non-terminal states)
        self.conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_presences_active_unique
             ON presences(user_id, gym_id)
             WHERE status != 'EXITED'",
            [],
        )?;

        Ok(())
    }

    // --- gyms ---

    /// Insert or replace a gym registration.
    pub fn upsert_gym(&self, gym: &Gym) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT OR REPLACE INTO gyms (id, name, latitude, longitude, radius_m, min_stay_min, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                gym.id,
                gym.name,
                gym.latitude,
                gym.longitude,
                gym.radius_m,
                gym.min_stay_min,
                gym.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Look up a gym by id.
    pub fn gym(&self, id: &str) -> Result<Option<Gym>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT id, name, latitude, longitude, radius_m, min_stay_min, created_at
                 FROM gyms WHERE id = ?1",
                params![id],
                row_to_gym,
            )
            .optional()
    }

    /// All registered gyms, by name.
    pub fn gyms(&self) -> Result<Vec<Gym>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, latitude, longitude, radius_m, min_stay_min, created_at
             FROM gyms ORDER BY name ASC",
        )?;
        let rows = stmt.query_map([], row_to_gym)?;
        rows.collect()
    }

    // --- member settings ---

    /// Set a member's personal weekly goal.
    pub fn set_member_weekly_goal(&self, user_id: &str, goal: u32) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT OR REPLACE INTO member_settings (user_id, weekly_goal) VALUES (?1, ?2)",
            params![user_id, goal],
        )?;
        Ok(())
    }

    /// A member's personal weekly goal, if one was set.
    pub fn member_weekly_goal(&self, user_id: &str) -> Result<Option<u32>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT weekly_goal FROM member_settings WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()
    }

    // --- presences ---

    /// Insert a new presence row.
    ///
    /// The partial unique index rejects a second live presence for the
    /// same member and gym.
    pub fn insert_presence(&self, presence: &Presence) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO presences (id, user_id, gym_id, status, detected_at, confirmed_at,
                                    exited_at, converted_to_assistance, assistance_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                presence.id,
                presence.user_id,
                presence.gym_id,
                format_presence_status(presence.status),
                presence.detected_at.to_rfc3339(),
                presence.confirmed_at.map(|dt| dt.to_rfc3339()),
                presence.exited_at.map(|dt| dt.to_rfc3339()),
                presence.converted_to_assistance,
                presence.assistance_id,
            ],
        )?;
        Ok(())
    }

    /// The live (non-exited) presence for a member at a gym, if any.
    pub fn active_presence(
        &self,
        user_id: &str,
        gym_id: &str,
    ) -> Result<Option<Presence>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT id, user_id, gym_id, status, detected_at, confirmed_at, exited_at,
                        converted_to_assistance, assistance_id
                 FROM presences
                 WHERE user_id = ?1 AND gym_id = ?2 AND status != 'EXITED'",
                params![user_id, gym_id],
                row_to_presence,
            )
            .optional()
    }

    /// Look up a presence by id.
    pub fn presence(&self, id: &str) -> Result<Option<Presence>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT id, user_id, gym_id, status, detected_at, confirmed_at, exited_at,
                        converted_to_assistance, assistance_id
                 FROM presences WHERE id = ?1",
                params![id],
                row_to_presence,
            )
            .optional()
    }

    /// Persist the mutable fields of a presence.
    pub fn update_presence(&self, presence: &Presence) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "UPDATE presences
             SET status = ?1, confirmed_at = ?2, exited_at = ?3,
                 converted_to_assistance = ?4, assistance_id = ?5
             WHERE id = ?6",
            params![
                format_presence_status(presence.status),
                presence.confirmed_at.map(|dt| dt.to_rfc3339()),
                presence.exited_at.map(|dt| dt.to_rfc3339()),
                presence.converted_to_assistance,
                presence.assistance_id,
                presence.id,
            ],
        )?;
        Ok(())
    }

    /// Atomically claim a presence for conversion to an assistance.
    ///
    /// The compare-and-set on `converted_to_assistance` makes conversion
    /// first-writer-wins: exactly one caller observes `true`, every other
    /// delivery of the same confirmation observes `false`.
    pub fn claim_presence_conversion(
        &self,
        presence_id: &str,
        confirmed_at: DateTime<Utc>,
        assistance_id: &str,
    ) -> Result<bool, rusqlite::Error> {
        let updated = self.conn.execute(
            "UPDATE presences
             SET status = 'CONFIRMED',
                 confirmed_at = COALESCE(confirmed_at, ?2),
                 converted_to_assistance = 1,
                 assistance_id = ?3
             WHERE id = ?1 AND converted_to_assistance = 0 AND status != 'EXITED'",
            params![presence_id, confirmed_at.to_rfc3339(), assistance_id],
        )?;
        Ok(updated == 1)
    }

    // --- assistances ---

    /// Insert an immutable assistance record.
    pub fn insert_assistance(&self, assistance: &Assistance) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO assistances (id, user_id, gym_id, presence_id, occurred_at, source, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                assistance.id,
                assistance.user_id,
                assistance.gym_id,
                assistance.presence_id,
                assistance.occurred_at.to_rfc3339(),
                format_assistance_source(assistance.source),
                assistance.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Look up an assistance by id.
    pub fn assistance(&self, id: &str) -> Result<Option<Assistance>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT id, user_id, gym_id, presence_id, occurred_at, source, created_at
                 FROM assistances WHERE id = ?1",
                params![id],
                row_to_assistance,
            )
            .optional()
    }

    /// A member's assistances, most recent first.
    pub fn assistances_for(&self, user_id: &str) -> Result<Vec<Assistance>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, gym_id, presence_id, occurred_at, source, created_at
             FROM assistances WHERE user_id = ?1 ORDER BY occurred_at DESC",
        )?;
        let rows = stmt.query_map(params![user_id], row_to_assistance)?;
        rows.collect()
    }

    // --- token ledger ---

    /// Append a ledger row. Fails on a duplicate idempotency key.
    pub fn insert_ledger_entry(
        &self,
        user_id: &str,
        delta: i64,
        reason: LedgerReason,
        occurred_at: DateTime<Utc>,
        idempotency_key: &str,
    ) -> Result<TokenLedgerEntry, rusqlite::Error> {
        let created_at = Utc::now();
        self.conn.execute(
            "INSERT INTO ledger_entries (user_id, delta, reason, occurred_at, idempotency_key, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user_id,
                delta,
                reason.as_str(),
                occurred_at.to_rfc3339(),
                idempotency_key,
                created_at.to_rfc3339(),
            ],
        )?;
        Ok(TokenLedgerEntry {
            id: self.conn.last_insert_rowid(),
            user_id: user_id.to_string(),
            delta,
            reason,
            occurred_at,
            idempotency_key: idempotency_key.to_string(),
            created_at,
        })
    }

    /// The ledger row a key resolved to, if the key was ever used.
    pub fn ledger_entry_by_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<TokenLedgerEntry>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT id, user_id, delta, reason, occurred_at, idempotency_key, created_at
                 FROM ledger_entries WHERE idempotency_key = ?1",
                params![idempotency_key],
                row_to_ledger_entry,
            )
            .optional()
    }

    /// The attendance entry inside a UTC interval, if one exists.
    ///
    /// `[start, end)` are the bounds of one gym-local day; at most one
    /// such row can exist per member and day.
    pub fn attendance_entry_between(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<TokenLedgerEntry>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT id, user_id, delta, reason, occurred_at, idempotency_key, created_at
                 FROM ledger_entries
                 WHERE user_id = ?1 AND reason = 'ATTENDANCE'
                   AND occurred_at >= ?2 AND occurred_at < ?3
                 LIMIT 1",
                params![user_id, start.to_rfc3339(), end.to_rfc3339()],
                row_to_ledger_entry,
            )
            .optional()
    }

    /// Fold of all deltas for a member.
    pub fn ledger_balance(&self, user_id: &str) -> Result<i64, rusqlite::Error> {
        self.conn.query_row(
            "SELECT COALESCE(SUM(delta), 0) FROM ledger_entries WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )
    }

    /// Full journal for a member, oldest first.
    pub fn ledger_entries(&self, user_id: &str) -> Result<Vec<TokenLedgerEntry>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, delta, reason, occurred_at, idempotency_key, created_at
             FROM ledger_entries WHERE user_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![user_id], row_to_ledger_entry)?;
        rows.collect()
    }

    // --- multiplier effects ---

    /// Record a multiplier activation.
    pub fn insert_multiplier_effect(
        &self,
        effect: &MultiplierEffect,
    ) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO multiplier_effects (id, user_id, multiplier_value, activated_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                effect.id,
                effect.user_id,
                effect.multiplier_value,
                effect.activated_at.to_rfc3339(),
                effect.expires_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Every activation ever recorded for a member, oldest first.
    ///
    /// Expired rows are included; activity is a time predicate the caller
    /// applies, not a stored flag.
    pub fn multiplier_effects(
        &self,
        user_id: &str,
    ) -> Result<Vec<MultiplierEffect>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, multiplier_value, activated_at, expires_at
             FROM multiplier_effects WHERE user_id = ?1 ORDER BY activated_at ASC",
        )?;
        let rows = stmt.query_map(params![user_id], row_to_multiplier_effect)?;
        rows.collect()
    }

    // --- streaks ---

    /// A member's streak row, if one exists.
    pub fn streak(&self, user_id: &str) -> Result<Option<Streak>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT user_id, value, last_value, max_value, recovery_items,
                        last_assistance_date, linked_frequency_id
                 FROM streaks WHERE user_id = ?1",
                params![user_id],
                row_to_streak,
            )
            .optional()
    }

    /// Insert or replace a member's streak row.
    pub fn upsert_streak(&self, streak: &Streak) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT OR REPLACE INTO streaks
             (user_id, value, last_value, max_value, recovery_items, last_assistance_date, linked_frequency_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                streak.user_id,
                streak.value,
                streak.last_value,
                streak.max_value,
                streak.recovery_items,
                streak.last_assistance_date.map(|d| d.to_string()),
                streak.linked_frequency_id,
            ],
        )?;
        Ok(())
    }

    // --- weekly goals ---

    /// The goal row for a member and ISO week, if one exists.
    pub fn weekly_goal(
        &self,
        user_id: &str,
        year: i32,
        week_number: u32,
    ) -> Result<Option<WeeklyGoal>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT user_id, year, week_number, goal, assist_count, achieved_goal,
                        week_start_date, last_assist_date
                 FROM weekly_goals WHERE user_id = ?1 AND year = ?2 AND week_number = ?3",
                params![user_id, year, week_number],
                row_to_weekly_goal,
            )
            .optional()
    }

    /// Insert or replace a weekly goal row.
    pub fn upsert_weekly_goal(&self, goal: &WeeklyGoal) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT OR REPLACE INTO weekly_goals
             (user_id, year, week_number, goal, assist_count, achieved_goal, week_start_date, last_assist_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                goal.user_id,
                goal.year,
                goal.week_number,
                goal.goal,
                goal.assist_count,
                goal.achieved_goal,
                goal.week_start_date.to_string(),
                goal.last_assist_date.map(|d| d.to_string()),
            ],
        )?;
        Ok(())
    }
}
