//! Time-windowed reward multipliers.
//!
//! Activating an item like a "double tokens weekend" records a row with an
//! activation window. Whether a multiplier is in force is recomputed from
//! the window on every call; rows are kept after expiry for audit, and
//! nothing ever flips a stored "active" bit.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, RewardError};
use crate::storage::Database;

/// One activated multiplier with its validity window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiplierEffect {
    /// Unique effect id
    pub id: String,

    /// Member the multiplier applies to
    pub user_id: String,

    /// Factor applied to award amounts; 1.0 is neutral, 2.0 doubles
    pub multiplier_value: f64,

    /// Start of the validity window (inclusive)
    pub activated_at: DateTime<Utc>,

    /// End of the validity window (exclusive)
    pub expires_at: DateTime<Utc>,
}

impl MultiplierEffect {
    /// Whether the effect is in force at the given instant.
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.activated_at <= at && at < self.expires_at
    }
}

/// How overlapping multipliers combine into one factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackingPolicy {
    /// Sum the boosts above neutral: 1.2 and 1.3 combine to 1.5
    Additive,

    /// Multiply the factors: 1.2 and 1.3 combine to 1.56
    Multiplicative,
}

impl StackingPolicy {
    /// Collapse any number of concurrent factors into one.
    ///
    /// No active multipliers yields the neutral factor 1.0.
    pub fn combine(&self, values: &[f64]) -> f64 {
        match self {
            StackingPolicy::Additive => values.iter().fold(1.0, |acc, v| acc + (v - 1.0)),
            StackingPolicy::Multiplicative => values.iter().product(),
        }
    }
}

impl Default for StackingPolicy {
    fn default() -> Self {
        StackingPolicy::Additive
    }
}

/// Registry of multiplier activations backed by storage.
pub struct MultiplierRegistry<'a> {
    db: &'a Database,
    policy: StackingPolicy,
}

impl<'a> MultiplierRegistry<'a> {
    pub fn new(db: &'a Database, policy: StackingPolicy) -> Self {
        Self { db, policy }
    }

    /// Activate a multiplier for a member, valid from `starts_at` for
    /// `duration_min` minutes.
    ///
    /// Values below 1.0 would silently shrink rewards and are rejected.
    pub fn activate(
        &self,
        user_id: &str,
        multiplier_value: f64,
        starts_at: DateTime<Utc>,
        duration_min: i64,
    ) -> Result<MultiplierEffect> {
        if !multiplier_value.is_finite() || multiplier_value < 1.0 {
            return Err(RewardError::InvalidMultiplier {
                value: multiplier_value,
            }
            .into());
        }
        if duration_min <= 0 {
            return Err(RewardError::InvalidValue {
                field: "duration_min".to_string(),
                message: format!("must be positive, got {duration_min}"),
            }
            .into());
        }

        let effect = MultiplierEffect {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            multiplier_value,
            activated_at: starts_at,
            expires_at: starts_at + Duration::minutes(duration_min),
        };
        self.db.insert_multiplier_effect(&effect)?;

        tracing::info!(
            "Activated x{} multiplier for {} until {}",
            multiplier_value,
            user_id,
            effect.expires_at
        );
        Ok(effect)
    }

    /// Combined factor in force for a member at the given instant.
    pub fn active_multiplier(&self, user_id: &str, at: DateTime<Utc>) -> Result<f64> {
        let values: Vec<f64> = self
            .db
            .multiplier_effects(user_id)?
            .into_iter()
            .filter(|e| e.is_active_at(at))
            .map(|e| e.multiplier_value)
            .collect();
        Ok(self.policy.combine(&values))
    }

    /// Every recorded activation for a member, expired ones included.
    pub fn effects(&self, user_id: &str) -> Result<Vec<MultiplierEffect>> {
        Ok(self.db.multiplier_effects(user_id)?)
    }
}
