//! Orchestration of the attendance pipeline.
//!
//! [`AttendanceService`] is the exposed API: it drives coordinate pings
//! through the geofence and presence machine, converts a confirmed presence
//! into an immutable assistance exactly once, and fans the attendance fact
//! out to the ledger, streak, and weekly goal. Every mutation path is
//! idempotent, so a retried or redelivered fact lands on the state its
//! first delivery produced.
//!
//! The conversion itself is a compare-and-set on
//! `converted_to_assistance` running inside a SQLite transaction; the
//! fan-out happens in the same transaction and the resulting events are
//! published only after commit, so a failing sink can never corrupt state.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::day::DayBoundary;
use crate::error::{Result, RewardError};
use crate::events::{Event, EventSink};
use crate::geofence::{GeoPoint, GeofenceEvaluator, GeofenceStatus};
use crate::ledger::{
    is_unique_violation, AwardOutcome, AwardRequest, LedgerReason, MultiplierEffect,
    MultiplierRegistry, TokenLedger, TokenLedgerEntry,
};
use crate::presence::Presence;
use crate::storage::database::{Assistance, AssistanceSource};
use crate::storage::{Config, Database, Gym};
use crate::streak::{SettleAction, Streak, StreakOutcome};
use crate::weekly::{WeeklyGoal, WeeklyOutcome};

/// What one coordinate ping (or checkout) did to presence tracking.
#[derive(Debug, Clone, Serialize)]
pub struct PresenceUpdate {
    /// How the sample classified against the gym's zone
    pub geofence_status: GeofenceStatus,

    /// The presence row after the update, if one is involved
    pub presence: Option<Presence>,

    /// The assistance produced by this update, if the visit was confirmed
    pub assistance: Option<Assistance>,

    /// Events this update emitted; empty for idempotent no-ops
    pub events: Vec<Event>,
}

impl PresenceUpdate {
    fn quiet(status: GeofenceStatus, presence: Option<Presence>) -> Self {
        Self {
            geofence_status: status,
            presence,
            assistance: None,
            events: Vec::new(),
        }
    }
}

/// Read-model of a member's streak.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakSnapshot {
    pub value: u32,
    pub last_value: u32,
    pub max_value: u32,
    pub recovery_items: u32,
    pub last_assistance_date: Option<NaiveDate>,
}

impl From<&Streak> for StreakSnapshot {
    fn from(streak: &Streak) -> Self {
        Self {
            value: streak.value,
            last_value: streak.last_value,
            max_value: streak.max_value,
            recovery_items: streak.recovery_items,
            last_assistance_date: streak.last_assistance_date,
        }
    }
}

/// Read-model of a member's progress in one ISO week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklySnapshot {
    pub year: i32,
    pub week: u32,
    pub assist_count: u32,
    pub goal: u32,
    pub achieved_goal: bool,
}

impl From<&WeeklyGoal> for WeeklySnapshot {
    fn from(goal: &WeeklyGoal) -> Self {
        Self {
            year: goal.year,
            week: goal.week_number,
            assist_count: goal.assist_count,
            goal: goal.goal,
            achieved_goal: goal.achieved_goal,
        }
    }
}

/// The attendance reward pipeline behind one database.
pub struct AttendanceService {
    db: Database,
    config: Config,
    day: DayBoundary,
    sink: Option<Arc<dyn EventSink>>,
}

impl AttendanceService {
    pub fn new(db: Database, config: Config) -> Self {
        let day = config.day_boundary();
        Self {
            db,
            config,
            day,
            sink: None,
        }
    }

    /// Open the service on the default database and configuration.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, Box<dyn std::error::Error>> {
        let db = Database::open()?;
        let config = Config::load_or_default();
        Ok(Self::new(db, config))
    }

    /// Attach a best-effort publish hook for emitted events.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// The day boundary rule this service applies everywhere.
    pub fn day_boundary(&self) -> DayBoundary {
        self.day
    }

    // --- presence pipeline ---

    /// Process one device coordinate ping for a member at a gym.
    pub fn record_presence(
        &self,
        user_id: &str,
        gym_id: &str,
        point: &GeoPoint,
    ) -> Result<PresenceUpdate> {
        self.record_presence_at(user_id, gym_id, point, Utc::now())
    }

    /// Process a coordinate ping taken at an explicit instant.
    ///
    /// The sample either opens a presence (entered the zone), confirms one
    /// (minimum stay satisfied), closes one (left the zone), or changes
    /// nothing (still waiting out the stay, or outside with nothing open).
    pub fn record_presence_at(
        &self,
        user_id: &str,
        gym_id: &str,
        point: &GeoPoint,
        at: DateTime<Utc>,
    ) -> Result<PresenceUpdate> {
        let gym = self.require_gym(gym_id)?;
        let evaluator = GeofenceEvaluator::new(gym.zone()?);
        let active = self.db.active_presence(user_id, gym_id)?;
        let status = evaluator.evaluate(point, active.as_ref().map(|p| p.detected_at), at);

        match status {
            GeofenceStatus::Outside => match active {
                Some(presence) => self.close_presence(presence, status, at),
                None => Ok(PresenceUpdate::quiet(status, None)),
            },
            GeofenceStatus::Entered => self.open_presence(user_id, gym_id, status, at),
            GeofenceStatus::InsidePendingStay => Ok(PresenceUpdate::quiet(status, active)),
            GeofenceStatus::StaySatisfied => match active {
                Some(presence) => {
                    self.convert_presence(presence, AssistanceSource::Geofence, status, at)
                }
                // The evaluator only reports a satisfied stay when a
                // detection exists; treat a raced-away row as a fresh entry.
                None => self.open_presence(user_id, gym_id, GeofenceStatus::Entered, at),
            },
        }
    }

    /// Explicit member checkout, closing the active presence if any.
    pub fn check_out(&self, user_id: &str, gym_id: &str) -> Result<PresenceUpdate> {
        self.check_out_at(user_id, gym_id, Utc::now())
    }

    pub fn check_out_at(
        &self,
        user_id: &str,
        gym_id: &str,
        at: DateTime<Utc>,
    ) -> Result<PresenceUpdate> {
        match self.db.active_presence(user_id, gym_id)? {
            Some(presence) => self.close_presence(presence, GeofenceStatus::Outside, at),
            None => {
                tracing::info!("No active presence for {user_id} at {gym_id}; checkout is a no-op");
                Ok(PresenceUpdate::quiet(GeofenceStatus::Outside, None))
            }
        }
    }

    /// Record a visit directly, bypassing the geofence (operator entry).
    ///
    /// Runs through the same presence conversion as a geofenced visit, so
    /// every downstream guarantee (daily cap, streak, weekly goal) holds.
    pub fn record_manual_attendance(&self, user_id: &str, gym_id: &str) -> Result<PresenceUpdate> {
        self.record_manual_attendance_at(user_id, gym_id, Utc::now())
    }

    pub fn record_manual_attendance_at(
        &self,
        user_id: &str,
        gym_id: &str,
        at: DateTime<Utc>,
    ) -> Result<PresenceUpdate> {
        self.require_gym(gym_id)?;
        let presence = match self.db.active_presence(user_id, gym_id)? {
            Some(existing) => existing,
            None => {
                let presence = Presence::detect(user_id, gym_id, at);
                self.db.insert_presence(&presence)?;
                presence
            }
        };
        let mut update =
            self.convert_presence(presence, AssistanceSource::Manual, GeofenceStatus::StaySatisfied, at)?;

        // A manual entry has no exit ping to close it later.
        if let Some(presence) = update.presence.take() {
            let closed = self.close_presence(presence, update.geofence_status, at)?;
            update.presence = closed.presence;
            update.events.extend(closed.events);
        }
        Ok(update)
    }

    /// The live presence for a member at a gym, if any.
    pub fn active_presence(&self, user_id: &str, gym_id: &str) -> Result<Option<Presence>> {
        Ok(self.db.active_presence(user_id, gym_id)?)
    }

    fn open_presence(
        &self,
        user_id: &str,
        gym_id: &str,
        status: GeofenceStatus,
        at: DateTime<Utc>,
    ) -> Result<PresenceUpdate> {
        let presence = Presence::detect(user_id, gym_id, at);
        match self.db.insert_presence(&presence) {
            Ok(()) => {
                let events = vec![Event::PresenceDetected {
                    presence_id: presence.id.clone(),
                    user_id: user_id.to_string(),
                    gym_id: gym_id.to_string(),
                    at,
                }];
                self.publish(&events);
                Ok(PresenceUpdate {
                    geofence_status: status,
                    presence: Some(presence),
                    assistance: None,
                    events,
                })
            }
            // Lost a race against a concurrent ping; the partial unique
            // index kept the first row, which we return instead.
            Err(err) if is_unique_violation(&err) => {
                let existing = self.db.active_presence(user_id, gym_id)?;
                Ok(PresenceUpdate::quiet(status, existing))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn close_presence(
        &self,
        mut presence: Presence,
        status: GeofenceStatus,
        at: DateTime<Utc>,
    ) -> Result<PresenceUpdate> {
        match presence.close(at) {
            Ok(()) => {
                self.db.update_presence(&presence)?;
                let events = vec![Event::PresenceClosed {
                    presence_id: presence.id.clone(),
                    user_id: presence.user_id.clone(),
                    gym_id: presence.gym_id.clone(),
                    at,
                }];
                self.publish(&events);
                Ok(PresenceUpdate {
                    geofence_status: status,
                    presence: Some(presence),
                    assistance: None,
                    events,
                })
            }
            Err(RewardError::PresenceAlreadyClosed { presence_id }) => {
                tracing::info!("Presence {presence_id} is already closed; nothing to do");
                Ok(PresenceUpdate::quiet(status, Some(presence)))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Convert a presence into an assistance and fan the fact out.
    ///
    /// The claim, the assistance insert, and the ledger/streak/weekly
    /// bookkeeping commit as one transaction. A duplicate confirmation of
    /// the same presence claims nothing and returns current state with no
    /// events.
    fn convert_presence(
        &self,
        presence: Presence,
        source: AssistanceSource,
        status: GeofenceStatus,
        at: DateTime<Utc>,
    ) -> Result<PresenceUpdate> {
        let assistance_id = Uuid::new_v4().to_string();
        let tx = self.db.conn().unchecked_transaction()?;

        if !self
            .db
            .claim_presence_conversion(&presence.id, at, &assistance_id)?
        {
            drop(tx);
            tracing::debug!(
                "Presence {} was already converted; duplicate confirmation absorbed",
                presence.id
            );
            let current = self.db.presence(&presence.id)?;
            let assistance = match current.as_ref().and_then(|p| p.assistance_id.as_deref()) {
                Some(id) => self.db.assistance(id)?,
                None => None,
            };
            return Ok(PresenceUpdate {
                geofence_status: status,
                presence: current,
                assistance,
                events: Vec::new(),
            });
        }

        let assistance = Assistance {
            id: assistance_id,
            user_id: presence.user_id.clone(),
            gym_id: presence.gym_id.clone(),
            presence_id: presence.id.clone(),
            occurred_at: at,
            source,
            created_at: Utc::now(),
        };
        self.db.insert_assistance(&assistance)?;

        let mut events = vec![Event::AttendanceConfirmed {
            assistance_id: assistance.id.clone(),
            presence_id: presence.id.clone(),
            user_id: assistance.user_id.clone(),
            gym_id: assistance.gym_id.clone(),
            occurred_at: assistance.occurred_at,
            at,
        }];
        self.apply_attendance(&assistance, &mut events)?;
        tx.commit()?;

        self.publish(&events);
        let current = self.db.presence(&presence.id)?;
        Ok(PresenceUpdate {
            geofence_status: status,
            presence: current,
            assistance: Some(assistance),
            events,
        })
    }

    /// Fan an attendance fact out to the ledger, streak, and weekly goal.
    fn apply_attendance(&self, assistance: &Assistance, events: &mut Vec<Event>) -> Result<()> {
        let day = self.day.local_day(assistance.occurred_at);
        let ledger = self.ledger();

        let award = ledger.award(&AwardRequest::attendance(
            &assistance.user_id,
            &assistance.id,
            assistance.occurred_at,
            self.config.rewards.attendance_tokens,
        ))?;
        if award.is_awarded() {
            events.push(Event::TokensAwarded {
                user_id: assistance.user_id.clone(),
                delta: award.entry().delta,
                reason: LedgerReason::Attendance,
                balance: ledger.balance(&assistance.user_id)?,
                at: assistance.occurred_at,
            });
        }

        self.apply_streak(&assistance.user_id, day, assistance.occurred_at, events)?;
        self.apply_weekly(&assistance.user_id, day, assistance.occurred_at, events)?;
        Ok(())
    }

    fn apply_streak(
        &self,
        user_id: &str,
        day: NaiveDate,
        occurred_at: DateTime<Utc>,
        events: &mut Vec<Event>,
    ) -> Result<()> {
        let mut streak = self
            .db
            .streak(user_id)?
            .unwrap_or_else(|| Streak::new(user_id));

        let outcome = streak.advance(day);
        if outcome == StreakOutcome::AlreadyCounted {
            tracing::debug!("Visit on {day} already counted toward {user_id}'s streak");
            return Ok(());
        }
        self.db.upsert_streak(&streak)?;

        let recovery_used = matches!(outcome, StreakOutcome::Extended { recovery_used: true });
        if recovery_used {
            let bridged = day.pred_opt().unwrap_or(day);
            self.record_recovery_audit(user_id, bridged, occurred_at)?;
        }
        let restarted = matches!(outcome, StreakOutcome::Restarted { .. });
        if let StreakOutcome::Restarted { previous } = outcome {
            tracing::info!(
                "Streak for {user_id} broke at {previous} with no recovery items; restarting"
            );
        }

        events.push(Event::StreakUpdated {
            user_id: user_id.to_string(),
            value: streak.value,
            max_value: streak.max_value,
            recovery_items: streak.recovery_items,
            recovery_used,
            restarted,
            at: occurred_at,
        });
        Ok(())
    }

    fn apply_weekly(
        &self,
        user_id: &str,
        day: NaiveDate,
        occurred_at: DateTime<Utc>,
        events: &mut Vec<Event>,
    ) -> Result<()> {
        let week = self.day.iso_week_of(day);
        let mut goal = match self.db.weekly_goal(user_id, week.year, week.week)? {
            Some(existing) => existing,
            None => WeeklyGoal::new(user_id, week, self.member_goal(user_id)?),
        };

        match goal.apply_visit(day) {
            WeeklyOutcome::AlreadyCounted => {
                tracing::debug!("Visit on {day} already counted toward {user_id}'s week");
                Ok(())
            }
            WeeklyOutcome::Counted { achieved_now } => {
                self.db.upsert_weekly_goal(&goal)?;
                if achieved_now {
                    let ledger = self.ledger();
                    let award = ledger.award(&AwardRequest::weekly_bonus(
                        user_id,
                        week.year,
                        week.week,
                        occurred_at,
                        self.config.rewards.weekly_bonus_tokens,
                    ))?;
                    if award.is_awarded() {
                        events.push(Event::TokensAwarded {
                            user_id: user_id.to_string(),
                            delta: award.entry().delta,
                            reason: LedgerReason::WeeklyBonus,
                            balance: ledger.balance(user_id)?,
                            at: occurred_at,
                        });
                    }
                    events.push(Event::WeeklyGoalAchieved {
                        user_id: user_id.to_string(),
                        year: week.year,
                        week: week.week,
                        assist_count: goal.assist_count,
                        goal: goal.goal,
                        at: occurred_at,
                    });
                }
                Ok(())
            }
        }
    }

    // --- reads and external facts ---

    /// Current token balance: the fold of the member's journal.
    pub fn balance(&self, user_id: &str) -> Result<i64> {
        self.ledger().balance(user_id)
    }

    /// Full journal for a member, oldest first.
    pub fn ledger_entries(&self, user_id: &str) -> Result<Vec<TokenLedgerEntry>> {
        self.ledger().entries(user_id)
    }

    /// A member's assistances, most recent first.
    pub fn assistances(&self, user_id: &str) -> Result<Vec<Assistance>> {
        Ok(self.db.assistances_for(user_id)?)
    }

    /// Streak snapshot, settled against today's boundary.
    pub fn streak(&self, user_id: &str) -> Result<StreakSnapshot> {
        self.streak_at(user_id, Utc::now())
    }

    /// Streak snapshot settled as of an explicit instant.
    ///
    /// This is the lazy day-rollover sweep: a stale row is settled and
    /// persisted here, so every reader observes the same boundary rule.
    pub fn streak_at(&self, user_id: &str, at: DateTime<Utc>) -> Result<StreakSnapshot> {
        let today = self.day.local_day(at);
        let mut streak = self
            .db
            .streak(user_id)?
            .unwrap_or_else(|| Streak::new(user_id));

        match streak.settle(today) {
            SettleAction::Intact => {}
            action => {
                let tx = self.db.conn().unchecked_transaction()?;
                self.db.upsert_streak(&streak)?;
                if let SettleAction::RecoveryConsumed { bridged_to } = action {
                    self.record_recovery_audit(user_id, bridged_to, at)?;
                }
                tx.commit()?;
                if let SettleAction::Reset { previous } = action {
                    tracing::info!(
                        "Streak for {user_id} broke at {previous} with no recovery items"
                    );
                }
            }
        }
        Ok(StreakSnapshot::from(&streak))
    }

    /// Weekly progress for the ISO week containing now.
    pub fn weekly_progress(&self, user_id: &str) -> Result<WeeklySnapshot> {
        self.weekly_progress_at(user_id, Utc::now())
    }

    pub fn weekly_progress_at(&self, user_id: &str, at: DateTime<Utc>) -> Result<WeeklySnapshot> {
        let week = self.day.iso_week(at);
        let goal = match self.db.weekly_goal(user_id, week.year, week.week)? {
            Some(existing) => existing,
            None => WeeklyGoal::new(user_id, week, self.member_goal(user_id)?),
        };
        Ok(WeeklySnapshot::from(&goal))
    }

    /// Run an externally-driven award (routine completion, reward claim,
    /// operator adjustment) through the ledger.
    pub fn award(&self, request: &AwardRequest) -> Result<AwardOutcome> {
        let ledger = self.ledger();
        let outcome = ledger.award(request)?;
        if outcome.is_awarded() {
            let events = vec![Event::TokensAwarded {
                user_id: request.user_id.clone(),
                delta: outcome.entry().delta,
                reason: request.reason,
                balance: ledger.balance(&request.user_id)?,
                at: request.occurred_at,
            }];
            self.publish(&events);
        }
        Ok(outcome)
    }

    /// Activate a multiplier for a member, starting now.
    pub fn activate_multiplier(
        &self,
        user_id: &str,
        value: f64,
        duration_min: i64,
    ) -> Result<MultiplierEffect> {
        self.activate_multiplier_at(user_id, value, Utc::now(), duration_min)
    }

    pub fn activate_multiplier_at(
        &self,
        user_id: &str,
        value: f64,
        starts_at: DateTime<Utc>,
        duration_min: i64,
    ) -> Result<MultiplierEffect> {
        self.registry().activate(user_id, value, starts_at, duration_min)
    }

    /// Every multiplier activation for a member, expired ones included.
    pub fn multiplier_effects(&self, user_id: &str) -> Result<Vec<MultiplierEffect>> {
        self.registry().effects(user_id)
    }

    /// Consume the fact that the rewards subsystem granted recovery items.
    pub fn grant_recovery_items(&self, user_id: &str, count: u32) -> Result<StreakSnapshot> {
        self.grant_recovery_items_at(user_id, count, Utc::now())
    }

    pub fn grant_recovery_items_at(
        &self,
        user_id: &str,
        count: u32,
        at: DateTime<Utc>,
    ) -> Result<StreakSnapshot> {
        // Settle first so fresh items never retroactively bridge a gap
        // the member already lost.
        self.streak_at(user_id, at)?;

        let mut streak = self
            .db
            .streak(user_id)?
            .unwrap_or_else(|| Streak::new(user_id));
        streak.grant_recovery_items(count);
        self.db.upsert_streak(&streak)?;
        Ok(StreakSnapshot::from(&streak))
    }

    /// Set a member's personal weekly goal, used for future weeks.
    pub fn set_weekly_goal(&self, user_id: &str, goal: u32) -> Result<()> {
        if goal == 0 {
            return Err(RewardError::InvalidValue {
                field: "weekly_goal".to_string(),
                message: "must be at least 1".to_string(),
            }
            .into());
        }
        Ok(self.db.set_member_weekly_goal(user_id, goal)?)
    }

    /// Cache a gym from the external registry, applying configured
    /// geofence defaults where the caller left parameters unset.
    pub fn upsert_gym(
        &self,
        id: &str,
        name: &str,
        latitude: f64,
        longitude: f64,
        radius_m: Option<f64>,
        min_stay_min: Option<i64>,
    ) -> Result<Gym> {
        let created_at = match self.db.gym(id)? {
            Some(existing) => existing.created_at,
            None => Utc::now(),
        };
        let gym = Gym {
            id: id.to_string(),
            name: name.to_string(),
            latitude,
            longitude,
            radius_m: radius_m.unwrap_or(self.config.geofence.default_radius_m),
            min_stay_min: min_stay_min.unwrap_or(self.config.geofence.default_min_stay_min),
            created_at,
        };
        // Validates coordinates, radius, and stay before anything persists.
        gym.zone()?;
        self.db.upsert_gym(&gym)?;
        Ok(gym)
    }

    /// Look up a cached gym.
    pub fn gym(&self, id: &str) -> Result<Option<Gym>> {
        Ok(self.db.gym(id)?)
    }

    /// All cached gyms, by name.
    pub fn gyms(&self) -> Result<Vec<Gym>> {
        Ok(self.db.gyms()?)
    }

    // --- internals ---

    fn ledger(&self) -> TokenLedger<'_> {
        TokenLedger::new(&self.db, self.day, self.config.rewards.stacking_policy)
    }

    fn registry(&self) -> MultiplierRegistry<'_> {
        MultiplierRegistry::new(&self.db, self.config.rewards.stacking_policy)
    }

    fn require_gym(&self, gym_id: &str) -> Result<Gym> {
        self.db
            .gym(gym_id)?
            .ok_or_else(|| RewardError::GymNotFound(gym_id.to_string()).into())
    }

    fn member_goal(&self, user_id: &str) -> Result<u32> {
        Ok(self
            .db
            .member_weekly_goal(user_id)?
            .unwrap_or(self.config.rewards.default_weekly_goal))
    }

    fn record_recovery_audit(
        &self,
        user_id: &str,
        bridged_day: NaiveDate,
        occurred_at: DateTime<Utc>,
    ) -> Result<()> {
        self.ledger().award(&AwardRequest::streak_recovery(
            user_id,
            bridged_day,
            occurred_at,
            self.config.rewards.streak_recovery_tokens,
        ))?;
        Ok(())
    }

    fn publish(&self, events: &[Event]) {
        let Some(sink) = &self.sink else {
            return;
        };
        for event in events {
            if let Err(err) = sink.publish(event) {
                tracing::warn!("Event publication failed: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MemorySink;
    use chrono::TimeZone;

    fn service() -> AttendanceService {
        AttendanceService::new(Database::open_memory().unwrap(), Config::default())
    }

    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, d, h, m, 0).unwrap()
    }

    fn inside() -> GeoPoint {
        GeoPoint::new(-34.6037, -58.3816).unwrap()
    }

    fn outside() -> GeoPoint {
        GeoPoint::new(-34.59, -58.3816).unwrap()
    }

    fn add_gym(svc: &AttendanceService) {
        svc.upsert_gym("gym-1", "Iron Temple", -34.6037, -58.3816, None, None)
            .unwrap();
    }

    #[test]
    fn test_ping_outside_with_nothing_open_is_quiet() {
        let svc = service();
        add_gym(&svc);

        let update = svc
            .record_presence_at("member-1", "gym-1", &outside(), at(15, 10, 0))
            .unwrap();
        assert_eq!(update.geofence_status, GeofenceStatus::Outside);
        assert!(update.presence.is_none());
        assert!(update.events.is_empty());
    }

    #[test]
    fn test_unknown_gym_is_rejected() {
        let svc = service();
        let err = svc
            .record_presence_at("member-1", "nowhere", &inside(), at(15, 10, 0))
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::CoreError::Reward(RewardError::GymNotFound(_))
        ));
    }

    #[test]
    fn test_entry_opens_presence_and_emits() {
        let sink = Arc::new(MemorySink::new());
        let svc = service().with_sink(sink.clone());
        add_gym(&svc);

        let update = svc
            .record_presence_at("member-1", "gym-1", &inside(), at(15, 10, 0))
            .unwrap();
        assert_eq!(update.geofence_status, GeofenceStatus::Entered);
        let presence = update.presence.unwrap();
        assert!(presence.is_active());
        assert_eq!(sink.events().len(), 1);
        assert!(matches!(
            sink.events()[0],
            Event::PresenceDetected { .. }
        ));
    }

    #[test]
    fn test_second_entry_ping_reuses_open_presence() {
        let svc = service();
        add_gym(&svc);

        let first = svc
            .record_presence_at("member-1", "gym-1", &inside(), at(15, 10, 0))
            .unwrap();
        let second = svc
            .record_presence_at("member-1", "gym-1", &inside(), at(15, 10, 5))
            .unwrap();
        assert_eq!(second.geofence_status, GeofenceStatus::InsidePendingStay);
        assert_eq!(
            second.presence.unwrap().id,
            first.presence.unwrap().id
        );
    }

    #[test]
    fn test_satisfied_stay_confirms_and_rewards() {
        let sink = Arc::new(MemorySink::new());
        let svc = service().with_sink(sink.clone());
        add_gym(&svc);

        svc.record_presence_at("member-1", "gym-1", &inside(), at(15, 10, 0))
            .unwrap();
        let update = svc
            .record_presence_at("member-1", "gym-1", &inside(), at(15, 10, 25))
            .unwrap();

        assert_eq!(update.geofence_status, GeofenceStatus::StaySatisfied);
        let assistance = update.assistance.unwrap();
        assert_eq!(assistance.source, AssistanceSource::Geofence);
        assert!(update.presence.unwrap().converted_to_assistance);

        assert_eq!(svc.balance("member-1").unwrap(), 10);
        assert_eq!(svc.streak_at("member-1", at(15, 11, 0)).unwrap().value, 1);
        assert_eq!(
            svc.weekly_progress_at("member-1", at(15, 11, 0))
                .unwrap()
                .assist_count,
            1
        );
        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(e, Event::AttendanceConfirmed { .. })));
    }

    #[test]
    fn test_duplicate_confirmation_is_absorbed() {
        let svc = service();
        add_gym(&svc);

        svc.record_presence_at("member-1", "gym-1", &inside(), at(15, 10, 0))
            .unwrap();
        let first = svc
            .record_presence_at("member-1", "gym-1", &inside(), at(15, 10, 25))
            .unwrap();
        // The same stay-satisfied sample delivered again.
        let second = svc
            .record_presence_at("member-1", "gym-1", &inside(), at(15, 10, 26))
            .unwrap();

        assert!(second.events.is_empty());
        assert_eq!(
            second.assistance.unwrap().id,
            first.assistance.unwrap().id
        );
        assert_eq!(svc.balance("member-1").unwrap(), 10);
        assert_eq!(svc.ledger_entries("member-1").unwrap().len(), 1);
        assert_eq!(svc.assistances("member-1").unwrap().len(), 1);
    }

    #[test]
    fn test_leaving_closes_presence() {
        let svc = service();
        add_gym(&svc);

        svc.record_presence_at("member-1", "gym-1", &inside(), at(15, 10, 0))
            .unwrap();
        let update = svc
            .record_presence_at("member-1", "gym-1", &outside(), at(15, 10, 5))
            .unwrap();

        assert_eq!(update.geofence_status, GeofenceStatus::Outside);
        assert!(!update.presence.unwrap().is_active());
        assert!(svc.active_presence("member-1", "gym-1").unwrap().is_none());
        // Leaving before the stay was satisfied earns nothing.
        assert_eq!(svc.balance("member-1").unwrap(), 0);
    }

    #[test]
    fn test_explicit_checkout() {
        let svc = service();
        add_gym(&svc);

        svc.record_presence_at("member-1", "gym-1", &inside(), at(15, 10, 0))
            .unwrap();
        let update = svc.check_out_at("member-1", "gym-1", at(15, 10, 10)).unwrap();
        assert!(!update.presence.unwrap().is_active());

        // A second checkout has nothing to close.
        let again = svc.check_out_at("member-1", "gym-1", at(15, 10, 11)).unwrap();
        assert!(again.presence.is_none());
        assert!(again.events.is_empty());
    }

    #[test]
    fn test_manual_attendance_records_and_closes() {
        let svc = service();
        add_gym(&svc);

        let update = svc
            .record_manual_attendance_at("member-1", "gym-1", at(15, 10, 0))
            .unwrap();
        let assistance = update.assistance.unwrap();
        assert_eq!(assistance.source, AssistanceSource::Manual);
        assert!(!update.presence.unwrap().is_active());
        assert_eq!(svc.balance("member-1").unwrap(), 10);

        // A second manual entry the same day opens a fresh presence but
        // the daily cap holds the ledger at one entry.
        svc.record_manual_attendance_at("member-1", "gym-1", at(15, 12, 0))
            .unwrap();
        assert_eq!(svc.balance("member-1").unwrap(), 10);
        assert_eq!(svc.ledger_entries("member-1").unwrap().len(), 1);
    }

    #[test]
    fn test_award_routes_through_ledger() {
        let svc = service();

        let outcome = svc
            .award(&AwardRequest::external(
                "member-1",
                LedgerReason::RoutineComplete,
                15,
                at(15, 10, 0),
                "routine-42",
            ))
            .unwrap();
        assert!(outcome.is_awarded());
        assert_eq!(svc.balance("member-1").unwrap(), 15);

        let err = svc
            .award(&AwardRequest::external(
                "member-1",
                LedgerReason::RewardClaim,
                -15,
                at(15, 10, 0),
                "claim-1",
            ))
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::CoreError::Reward(RewardError::InvalidAmount { .. })
        ));
    }

    #[test]
    fn test_weekly_goal_setting_validates() {
        let svc = service();
        assert!(svc.set_weekly_goal("member-1", 0).is_err());
        svc.set_weekly_goal("member-1", 5).unwrap();
        assert_eq!(
            svc.weekly_progress_at("member-1", at(15, 10, 0))
                .unwrap()
                .goal,
            5
        );
    }

    #[test]
    fn test_grant_recovery_items_settles_first() {
        let svc = service();
        add_gym(&svc);

        svc.record_manual_attendance_at("member-1", "gym-1", at(10, 12, 0))
            .unwrap();
        // The run already broke before the grant; items must not revive it.
        let snapshot = svc
            .grant_recovery_items_at("member-1", 2, at(14, 12, 0))
            .unwrap();
        assert_eq!(snapshot.value, 0);
        assert_eq!(snapshot.last_value, 1);
        assert_eq!(snapshot.recovery_items, 2);
    }

    #[test]
    fn test_gym_defaults_come_from_config() {
        let svc = service();
        let gym = svc
            .upsert_gym("gym-1", "Iron Temple", -34.6037, -58.3816, None, None)
            .unwrap();
        assert_eq!(gym.radius_m, 180.0);
        assert_eq!(gym.min_stay_min, 20);

        let gym = svc
            .upsert_gym("gym-2", "Annex", -34.6037, -58.3816, Some(90.0), Some(0))
            .unwrap();
        assert_eq!(gym.radius_m, 90.0);
        assert_eq!(gym.min_stay_min, 0);

        assert!(svc
            .upsert_gym("gym-3", "Bad", 200.0, 0.0, None, None)
            .is_err());
    }
}
