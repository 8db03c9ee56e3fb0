//! Presence lifecycle per member and gym.
//!
//! A presence starts as `Detecting` when a member first samples inside the
//! geofence, becomes `Confirmed` once the minimum stay is satisfied, and
//! ends as `Exited`. `Exited` is terminal; any further transition attempt
//! surfaces as [`RewardError::PresenceAlreadyClosed`]. Transitions here are
//! pure; persistence and the single-active-presence rule live in storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RewardError;

/// Lifecycle state of a presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PresenceStatus {
    /// Member entered the geofence; minimum stay not yet satisfied
    Detecting,

    /// Minimum stay satisfied; the visit counts
    Confirmed,

    /// Member left or the presence was closed; terminal
    Exited,
}

/// One tracked visit of a member to a gym.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Presence {
    /// Unique presence id
    pub id: String,

    /// Member being tracked
    pub user_id: String,

    /// Gym whose geofence produced this presence
    pub gym_id: String,

    /// Current lifecycle state
    pub status: PresenceStatus,

    /// When the member was first sampled inside the zone
    pub detected_at: DateTime<Utc>,

    /// When the minimum stay was satisfied, if it was
    pub confirmed_at: Option<DateTime<Utc>>,

    /// When the presence was closed, if it was
    pub exited_at: Option<DateTime<Utc>>,

    /// Whether this presence has already produced an assistance record
    pub converted_to_assistance: bool,

    /// Id of the assistance produced by this presence, if any
    pub assistance_id: Option<String>,
}

impl Presence {
    /// Start tracking a new presence in the `Detecting` state.
    pub fn detect(user_id: &str, gym_id: &str, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            gym_id: gym_id.to_string(),
            status: PresenceStatus::Detecting,
            detected_at: at,
            confirmed_at: None,
            exited_at: None,
            converted_to_assistance: false,
            assistance_id: None,
        }
    }

    /// Whether this presence still tracks the member (not yet exited).
    pub fn is_active(&self) -> bool {
        self.status != PresenceStatus::Exited
    }

    /// Move `Detecting` to `Confirmed`.
    ///
    /// Returns `true` when the presence was newly confirmed and `false`
    /// when it already was (duplicate stay-satisfied sample). Confirming
    /// an exited presence fails.
    pub fn confirm(&mut self, at: DateTime<Utc>) -> Result<bool, RewardError> {
        match self.status {
            PresenceStatus::Detecting => {
                self.status = PresenceStatus::Confirmed;
                self.confirmed_at = Some(at);
                Ok(true)
            }
            PresenceStatus::Confirmed => Ok(false),
            PresenceStatus::Exited => Err(RewardError::PresenceAlreadyClosed {
                presence_id: self.id.clone(),
            }),
        }
    }

    /// Close the presence.
    ///
    /// Valid from both `Detecting` and `Confirmed`; closing twice fails.
    pub fn close(&mut self, at: DateTime<Utc>) -> Result<(), RewardError> {
        match self.status {
            PresenceStatus::Detecting | PresenceStatus::Confirmed => {
                self.status = PresenceStatus::Exited;
                self.exited_at = Some(at);
                Ok(())
            }
            PresenceStatus::Exited => Err(RewardError::PresenceAlreadyClosed {
                presence_id: self.id.clone(),
            }),
        }
    }
}
