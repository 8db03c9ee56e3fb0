use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ledger::LedgerReason;

/// Every confirmed fact in the attendance pipeline produces an Event.
/// Embedders subscribe through an [`EventSink`]; delivery is best-effort
/// and never blocks or rolls back the state change that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// Member entered a gym's geofence; presence tracking started.
    PresenceDetected {
        presence_id: String,
        user_id: String,
        gym_id: String,
        at: DateTime<Utc>,
    },
    /// Presence closed (member left the zone or an explicit checkout).
    PresenceClosed {
        presence_id: String,
        user_id: String,
        gym_id: String,
        at: DateTime<Utc>,
    },
    /// Minimum stay satisfied; the visit became an immutable assistance.
    AttendanceConfirmed {
        assistance_id: String,
        presence_id: String,
        user_id: String,
        gym_id: String,
        occurred_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    /// A ledger entry was appended for the member.
    TokensAwarded {
        user_id: String,
        delta: i64,
        reason: LedgerReason,
        balance: i64,
        at: DateTime<Utc>,
    },
    /// Streak counter changed (extended, restarted, or bridged).
    StreakUpdated {
        user_id: String,
        value: u32,
        max_value: u32,
        recovery_items: u32,
        recovery_used: bool,
        restarted: bool,
        at: DateTime<Utc>,
    },
    /// Weekly goal reached for the first time in this ISO week.
    WeeklyGoalAchieved {
        user_id: String,
        year: i32,
        week: u32,
        assist_count: u32,
        goal: u32,
        at: DateTime<Utc>,
    },
}

/// Receives events emitted by the attendance pipeline.
///
/// Implementations must not assume exactly-once delivery; the pipeline
/// retries nothing and drops events whose publication fails (the failure
/// is logged). State is committed before any publish happens.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: &Event) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Sink that remembers every event, for tests and local inspection.
#[derive(Default)]
pub struct MemorySink {
    events: std::sync::Mutex<Vec<Event>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything published so far.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl EventSink for MemorySink {
    fn publish(&self, event: &Event) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
        Ok(())
    }
}
