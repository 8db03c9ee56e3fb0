//! Append-only token ledger.
//!
//! A member's balance is never stored; it is the fold of signed deltas over
//! an immutable journal. Rows are only ever inserted. Replays are absorbed
//! by a unique idempotency key per entry, and the one-attendance-reward-per
//! -day rule is enforced against gym-local day bounds before insertion.

pub mod multiplier;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::day::DayBoundary;
use crate::error::{Result, RewardError};
use crate::storage::Database;

pub use multiplier::{MultiplierEffect, MultiplierRegistry, StackingPolicy};

/// Closed vocabulary of ledger entry reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerReason {
    /// Confirmed gym visit
    Attendance,

    /// Completed workout routine
    RoutineComplete,

    /// Tokens spent claiming a reward
    RewardClaim,

    /// Weekly attendance goal reached
    WeeklyBonus,

    /// Manual correction by an operator
    AdminAdjustment,

    /// Zero-amount audit marker for a consumed streak recovery item
    StreakRecovery,
}

impl LedgerReason {
    /// Storage and wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerReason::Attendance => "ATTENDANCE",
            LedgerReason::RoutineComplete => "ROUTINE_COMPLETE",
            LedgerReason::RewardClaim => "REWARD_CLAIM",
            LedgerReason::WeeklyBonus => "WEEKLY_BONUS",
            LedgerReason::AdminAdjustment => "ADMIN_ADJUSTMENT",
            LedgerReason::StreakRecovery => "STREAK_RECOVERY",
        }
    }

    /// Parse the storage representation; anything else is rejected.
    pub fn parse(s: &str) -> Result<Self, RewardError> {
        match s {
            "ATTENDANCE" => Ok(LedgerReason::Attendance),
            "ROUTINE_COMPLETE" => Ok(LedgerReason::RoutineComplete),
            "REWARD_CLAIM" => Ok(LedgerReason::RewardClaim),
            "WEEKLY_BONUS" => Ok(LedgerReason::WeeklyBonus),
            "ADMIN_ADJUSTMENT" => Ok(LedgerReason::AdminAdjustment),
            "STREAK_RECOVERY" => Ok(LedgerReason::StreakRecovery),
            other => Err(RewardError::InvalidReason(other.to_string())),
        }
    }

    /// Only operator corrections may subtract tokens.
    pub fn allows_negative(&self) -> bool {
        matches!(self, LedgerReason::AdminAdjustment)
    }

    /// Whether active multipliers scale this reason's amount.
    ///
    /// Operator corrections are exact by definition and recovery markers
    /// are always zero, so neither is scaled.
    pub fn multiplier_applies(&self) -> bool {
        !matches!(
            self,
            LedgerReason::AdminAdjustment | LedgerReason::StreakRecovery
        )
    }
}

/// One immutable row of the token journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenLedgerEntry {
    /// Journal row id, assigned on insert
    pub id: i64,

    /// Member the delta applies to
    pub user_id: String,

    /// Signed token delta
    pub delta: i64,

    /// Why the delta exists
    pub reason: LedgerReason,

    /// When the underlying fact happened (drives day bucketing)
    pub occurred_at: DateTime<Utc>,

    /// Deterministic key absorbing replays of the same fact
    pub idempotency_key: String,

    /// When the row was inserted
    pub created_at: DateTime<Utc>,
}

/// Derive a deterministic idempotency key from the identity of a fact.
///
/// The same parts always hash to the same key, so a replayed event maps
/// onto the row its first delivery created.
pub fn idempotency_key(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update([0u8]);
        }
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// A requested token award, not yet validated or written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwardRequest {
    /// Member to award
    pub user_id: String,

    /// Entry reason
    pub reason: LedgerReason,

    /// Amount before multipliers
    pub base_amount: i64,

    /// When the rewarded fact happened
    pub occurred_at: DateTime<Utc>,

    /// Key identifying the fact; replays of the same key are absorbed
    pub idempotency_key: String,
}

impl AwardRequest {
    /// Award for a confirmed visit, keyed by the assistance it rewards.
    pub fn attendance(
        user_id: &str,
        assistance_id: &str,
        occurred_at: DateTime<Utc>,
        base_amount: i64,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            reason: LedgerReason::Attendance,
            base_amount,
            occurred_at,
            idempotency_key: idempotency_key(&["attendance", assistance_id]),
        }
    }

    /// Bonus for reaching a weekly goal, keyed by member and ISO week.
    pub fn weekly_bonus(
        user_id: &str,
        year: i32,
        week: u32,
        occurred_at: DateTime<Utc>,
        base_amount: i64,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            reason: LedgerReason::WeeklyBonus,
            base_amount,
            occurred_at,
            idempotency_key: idempotency_key(&[
                "weekly_bonus",
                user_id,
                &year.to_string(),
                &week.to_string(),
            ]),
        }
    }

    /// Audit marker for a recovery item consumed to bridge a missed day.
    pub fn streak_recovery(
        user_id: &str,
        bridged_day: chrono::NaiveDate,
        occurred_at: DateTime<Utc>,
        base_amount: i64,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            reason: LedgerReason::StreakRecovery,
            base_amount,
            occurred_at,
            idempotency_key: idempotency_key(&[
                "streak_recovery",
                user_id,
                &bridged_day.to_string(),
            ]),
        }
    }

    /// Award driven by an external fact (routine completion, reward claim,
    /// operator adjustment), keyed by a caller-supplied reference.
    pub fn external(
        user_id: &str,
        reason: LedgerReason,
        base_amount: i64,
        occurred_at: DateTime<Utc>,
        source_ref: &str,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            reason,
            base_amount,
            occurred_at,
            idempotency_key: idempotency_key(&[reason.as_str(), user_id, source_ref]),
        }
    }
}

/// What happened to an award request.
#[derive(Debug, Clone, PartialEq)]
pub enum AwardOutcome {
    /// A new journal row was written
    Awarded(TokenLedgerEntry),

    /// An attendance reward already exists for this gym-local day
    DailyCapReached(TokenLedgerEntry),

    /// The idempotency key already has a row; that row is returned
    Replayed(TokenLedgerEntry),
}

impl AwardOutcome {
    /// The journal row this request resolved to, new or pre-existing.
    pub fn entry(&self) -> &TokenLedgerEntry {
        match self {
            AwardOutcome::Awarded(e)
            | AwardOutcome::DailyCapReached(e)
            | AwardOutcome::Replayed(e) => e,
        }
    }

    /// Whether a new row was written.
    pub fn is_awarded(&self) -> bool {
        matches!(self, AwardOutcome::Awarded(_))
    }
}

/// The token journal with its award rules.
pub struct TokenLedger<'a> {
    db: &'a Database,
    day: DayBoundary,
    policy: StackingPolicy,
}

impl<'a> TokenLedger<'a> {
    pub fn new(db: &'a Database, day: DayBoundary, policy: StackingPolicy) -> Self {
        Self { db, day, policy }
    }

    /// Run an award request through the full pipeline: replay absorption,
    /// daily attendance cap, multiplier scaling, append.
    pub fn award(&self, req: &AwardRequest) -> Result<AwardOutcome> {
        validate_amount(req.reason, req.base_amount)?;

        if let Some(existing) = self.db.ledger_entry_by_key(&req.idempotency_key)? {
            return Ok(AwardOutcome::Replayed(existing));
        }

        if req.reason == LedgerReason::Attendance {
            let (start, end) = self.day.day_bounds(self.day.local_day(req.occurred_at));
            if let Some(existing) =
                self.db.attendance_entry_between(&req.user_id, start, end)?
            {
                tracing::debug!(
                    "Attendance already rewarded for {} on {}",
                    req.user_id,
                    self.day.local_day(req.occurred_at)
                );
                return Ok(AwardOutcome::DailyCapReached(existing));
            }
        }

        let delta = self.effective_amount(req)?;
        self.append(&req.user_id, delta, req.reason, req.occurred_at, &req.idempotency_key)
    }

    /// Append a validated row, absorbing a replay that raced us in.
    pub fn append(
        &self,
        user_id: &str,
        delta: i64,
        reason: LedgerReason,
        occurred_at: DateTime<Utc>,
        key: &str,
    ) -> Result<AwardOutcome> {
        validate_amount(reason, delta)?;

        match self
            .db
            .insert_ledger_entry(user_id, delta, reason, occurred_at, key)
        {
            Ok(entry) => {
                tracing::info!(
                    "Appended {} {} for {} (key {})",
                    delta,
                    reason.as_str(),
                    user_id,
                    &key[..8.min(key.len())]
                );
                Ok(AwardOutcome::Awarded(entry))
            }
            Err(err) if is_unique_violation(&err) => {
                let existing = self.db.ledger_entry_by_key(key)?.ok_or_else(|| {
                    crate::error::DatabaseError::QueryFailed(format!(
                        "ledger key {key} violated uniqueness but has no row"
                    ))
                })?;
                Ok(AwardOutcome::Replayed(existing))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Current balance: the fold of all deltas for a member.
    pub fn balance(&self, user_id: &str) -> Result<i64> {
        Ok(self.db.ledger_balance(user_id)?)
    }

    /// Full journal for a member, oldest first.
    pub fn entries(&self, user_id: &str) -> Result<Vec<TokenLedgerEntry>> {
        Ok(self.db.ledger_entries(user_id)?)
    }

    /// Amount after applying the multiplier in force at `occurred_at`.
    fn effective_amount(&self, req: &AwardRequest) -> Result<i64> {
        if !req.reason.multiplier_applies() {
            return Ok(req.base_amount);
        }
        let registry = MultiplierRegistry::new(self.db, self.policy);
        let factor = registry.active_multiplier(&req.user_id, req.occurred_at)?;
        Ok((req.base_amount as f64 * factor).round() as i64)
    }
}

fn validate_amount(reason: LedgerReason, amount: i64) -> Result<(), RewardError> {
    if amount < 0 && !reason.allows_negative() {
        return Err(RewardError::InvalidAmount {
            reason: reason.as_str().to_string(),
            amount,
        });
    }
    Ok(())
}

pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ledger(db: &Database) -> TokenLedger<'_> {
        TokenLedger::new(db, DayBoundary::default(), StackingPolicy::Additive)
    }

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_reason_round_trip_and_rejection() {
        for reason in [
            LedgerReason::Attendance,
            LedgerReason::RoutineComplete,
            LedgerReason::RewardClaim,
            LedgerReason::WeeklyBonus,
            LedgerReason::AdminAdjustment,
            LedgerReason::StreakRecovery,
        ] {
            assert_eq!(LedgerReason::parse(reason.as_str()).unwrap(), reason);
        }
        assert!(matches!(
            LedgerReason::parse("GIFT"),
            Err(RewardError::InvalidReason(_))
        ));
    }

    #[test]
    fn test_idempotency_key_is_deterministic() {
        let a = idempotency_key(&["attendance", "asst-1"]);
        let b = idempotency_key(&["attendance", "asst-1"]);
        let c = idempotency_key(&["attendance", "asst-2"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        // Separator prevents part-boundary collisions.
        assert_ne!(
            idempotency_key(&["ab", "c"]),
            idempotency_key(&["a", "bc"])
        );
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_balance_is_fold_of_deltas() {
        let db = Database::open_memory().unwrap();
        let l = ledger(&db);

        assert_eq!(l.balance("member-1").unwrap(), 0);
        l.append("member-1", 10, LedgerReason::Attendance, at(1, 12), "k1")
            .unwrap();
        l.append("member-1", 50, LedgerReason::WeeklyBonus, at(2, 12), "k2")
            .unwrap();
        l.append("member-1", -30, LedgerReason::AdminAdjustment, at(3, 12), "k3")
            .unwrap();

        assert_eq!(l.balance("member-1").unwrap(), 30);
        assert_eq!(l.entries("member-1").unwrap().len(), 3);
        // Other members see their own fold only.
        assert_eq!(l.balance("member-2").unwrap(), 0);
    }

    #[test]
    fn test_negative_amount_needs_admin_reason() {
        let db = Database::open_memory().unwrap();
        let l = ledger(&db);

        let err = l
            .append("member-1", -5, LedgerReason::Attendance, at(1, 12), "k1")
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::CoreError::Reward(RewardError::InvalidAmount { .. })
        ));
        assert!(l
            .append("member-1", -5, LedgerReason::AdminAdjustment, at(1, 12), "k2")
            .is_ok());
    }

    #[test]
    fn test_replay_is_absorbed_by_key() {
        let db = Database::open_memory().unwrap();
        let l = ledger(&db);

        let req = AwardRequest::attendance("member-1", "asst-1", at(1, 12), 10);
        let first = l.award(&req).unwrap();
        assert!(first.is_awarded());

        let second = l.award(&req).unwrap();
        assert!(matches!(second, AwardOutcome::Replayed(_)));
        assert_eq!(second.entry().id, first.entry().id);
        assert_eq!(l.balance("member-1").unwrap(), 10);
    }

    #[test]
    fn test_one_attendance_reward_per_local_day() {
        let db = Database::open_memory().unwrap();
        let l = ledger(&db);

        // Two distinct visits on the same gym-local day.
        let first = l
            .award(&AwardRequest::attendance("member-1", "asst-1", at(1, 12), 10))
            .unwrap();
        assert!(first.is_awarded());

        let second = l
            .award(&AwardRequest::attendance("member-1", "asst-2", at(1, 20), 10))
            .unwrap();
        assert!(matches!(second, AwardOutcome::DailyCapReached(_)));
        assert_eq!(l.balance("member-1").unwrap(), 10);

        // Next local day earns again.
        let next_day = l
            .award(&AwardRequest::attendance("member-1", "asst-3", at(2, 12), 10))
            .unwrap();
        assert!(next_day.is_awarded());
        assert_eq!(l.balance("member-1").unwrap(), 20);
    }

    #[test]
    fn test_daily_cap_respects_local_midnight_not_utc() {
        let db = Database::open_memory().unwrap();
        let l = ledger(&db);

        // 02:00 UTC on the 2nd is still the 1st at UTC-3; 04:00 UTC is the 2nd.
        let late_local_evening = Utc.with_ymd_and_hms(2024, 6, 2, 2, 0, 0).unwrap();
        let after_local_midnight = Utc.with_ymd_and_hms(2024, 6, 2, 4, 0, 0).unwrap();

        let first = l
            .award(&AwardRequest::attendance(
                "member-1",
                "asst-1",
                late_local_evening,
                10,
            ))
            .unwrap();
        assert!(first.is_awarded());

        let second = l
            .award(&AwardRequest::attendance(
                "member-1",
                "asst-2",
                after_local_midnight,
                10,
            ))
            .unwrap();
        assert!(second.is_awarded(), "different local day must earn again");
    }

    #[test]
    fn test_multiplier_scales_award() {
        let db = Database::open_memory().unwrap();
        let l = ledger(&db);
        let registry = MultiplierRegistry::new(&db, StackingPolicy::Additive);
        registry.activate("member-1", 2.0, at(1, 0), 24 * 60).unwrap();

        let outcome = l
            .award(&AwardRequest::attendance("member-1", "asst-1", at(1, 12), 10))
            .unwrap();
        assert_eq!(outcome.entry().delta, 20);
    }

    #[test]
    fn test_multiplier_skips_admin_adjustment() {
        let db = Database::open_memory().unwrap();
        let l = ledger(&db);
        let registry = MultiplierRegistry::new(&db, StackingPolicy::Additive);
        registry.activate("member-1", 2.0, at(1, 0), 24 * 60).unwrap();

        let outcome = l
            .award(&AwardRequest::external(
                "member-1",
                LedgerReason::AdminAdjustment,
                -5,
                at(1, 12),
                "ticket-77",
            ))
            .unwrap();
        assert_eq!(outcome.entry().delta, -5);
    }

    #[test]
    fn test_expired_multiplier_does_not_scale() {
        let db = Database::open_memory().unwrap();
        let l = ledger(&db);
        let registry = MultiplierRegistry::new(&db, StackingPolicy::Additive);
        registry.activate("member-1", 3.0, at(1, 0), 60).unwrap();

        let outcome = l
            .award(&AwardRequest::attendance("member-1", "asst-1", at(1, 12), 10))
            .unwrap();
        assert_eq!(outcome.entry().delta, 10);
    }
}
