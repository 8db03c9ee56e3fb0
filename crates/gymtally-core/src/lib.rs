//! # Gymtally Core Library
//!
//! Core business logic for Gymtally: rewarding gym members with tokens for
//! verified attendance, tracking consecutive-day streaks, and aggregating
//! weekly visit goals. All operations are available through a standalone
//! CLI binary built on this library.
//!
//! ## Architecture
//!
//! - **Geofence**: pure distance/stay math classifying coordinate samples
//!   against a gym's zone
//! - **Presence**: DETECTING → CONFIRMED → EXITED lifecycle per member and
//!   gym, confirmed presences converting to immutable assistance records
//!   exactly once
//! - **Ledger**: append-only signed-delta journal; balance is always a
//!   fold, never a stored counter
//! - **Streaks & weekly goals**: consecutive-day and per-ISO-week counters
//!   advanced by attendance facts, with lazy day rollover instead of
//!   background timers
//! - **Storage**: SQLite rows and TOML configuration
//!
//! ## Key Components
//!
//! - [`AttendanceService`]: the exposed pipeline API
//! - [`GeofenceEvaluator`]: stateless zone classification
//! - [`TokenLedger`]: award rules and balance folds
//! - [`Database`]: row persistence
//! - [`Config`]: application configuration management

pub mod day;
pub mod error;
pub mod events;
pub mod geofence;
pub mod ledger;
pub mod presence;
pub mod service;
pub mod storage;
pub mod streak;
pub mod weekly;

pub use day::{DayBoundary, IsoWeekKey};
pub use error::{ConfigError, CoreError, DatabaseError, Result, RewardError};
pub use events::{Event, EventSink, MemorySink};
pub use geofence::{GeoPoint, GeofenceEvaluator, GeofenceStatus, GeofenceZone};
pub use ledger::{
    AwardOutcome, AwardRequest, LedgerReason, MultiplierEffect, MultiplierRegistry,
    StackingPolicy, TokenLedger, TokenLedgerEntry,
};
pub use presence::{Presence, PresenceStatus};
pub use service::{AttendanceService, PresenceUpdate, StreakSnapshot, WeeklySnapshot};
pub use storage::database::{Assistance, AssistanceSource};
pub use storage::{Config, Database, Gym};
pub use streak::{SettleAction, Streak, StreakOutcome};
pub use weekly::{WeeklyGoal, WeeklyOutcome};
