//! Consecutive-day attendance streaks.
//!
//! A streak counts gym-local days with at least one confirmed visit. The
//! counter never runs on a timer: day rollover is settled lazily, on the
//! next read or write that touches the row. Settling consumes a recovery
//! item to bridge a missed day when one is available, otherwise the run is
//! archived into `last_value` and the counter drops to zero.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Per-member streak state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Streak {
    /// Member this streak belongs to
    pub user_id: String,

    /// Length of the current run in days; 0 when broken
    pub value: u32,

    /// Length of the previous run, saved when the counter resets
    pub last_value: u32,

    /// Longest run ever reached
    pub max_value: u32,

    /// Items available to bridge missed days
    pub recovery_items: u32,

    /// Gym-local day of the last counted visit
    pub last_assistance_date: Option<NaiveDate>,

    /// External habit/frequency plan this streak mirrors, if any
    pub linked_frequency_id: Option<String>,
}

/// What a lazy rollover sweep did to the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleAction {
    /// Continuity holds (or there is nothing to settle)
    Intact,

    /// A recovery item was consumed; the run now reaches yesterday
    RecoveryConsumed { bridged_to: NaiveDate },

    /// Run broken with no items left; previous length archived
    Reset { previous: u32 },
}

/// What recording a visit did to the counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreakOutcome {
    /// This day is already counted (or the fact is older than the state)
    AlreadyCounted,

    /// First counted day of a run starting from zero
    Started,

    /// Run grew by one day
    Extended { recovery_used: bool },

    /// This visit itself broke and restarted the run
    Restarted { previous: u32 },
}

impl Streak {
    /// Empty streak for a member with no history.
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            value: 0,
            last_value: 0,
            max_value: 0,
            recovery_items: 0,
            last_assistance_date: None,
            linked_frequency_id: None,
        }
    }

    /// Settle day rollover as of `today`.
    ///
    /// A run is stale once its last counted day is before yesterday. One
    /// recovery item bridges one such gap, whatever its length, by moving
    /// the last counted day to yesterday; with no items the run resets.
    /// Settling an already-settled row does nothing, so sweeps are safe to
    /// repeat on every read.
    pub fn settle(&mut self, today: NaiveDate) -> SettleAction {
        let Some(last) = self.last_assistance_date else {
            return SettleAction::Intact;
        };
        let Some(yesterday) = today.pred_opt() else {
            return SettleAction::Intact;
        };
        if last >= yesterday || self.value == 0 {
            return SettleAction::Intact;
        }

        if self.recovery_items > 0 {
            self.recovery_items -= 1;
            self.last_assistance_date = Some(yesterday);
            SettleAction::RecoveryConsumed {
                bridged_to: yesterday,
            }
        } else {
            let previous = self.value;
            self.last_value = previous;
            self.value = 0;
            SettleAction::Reset { previous }
        }
    }

    /// Count a confirmed visit on `day`.
    ///
    /// Settles rollover first, then extends, starts, or restarts the run.
    /// A day already counted, or a fact older than the current state, is
    /// a no-op; the counter never moves backwards.
    pub fn advance(&mut self, day: NaiveDate) -> StreakOutcome {
        if let Some(last) = self.last_assistance_date {
            if last >= day {
                return StreakOutcome::AlreadyCounted;
            }
        }

        let settled = self.settle(day);
        let consecutive = self
            .last_assistance_date
            .and_then(|last| last.succ_opt())
            .map(|next| next == day)
            .unwrap_or(false);

        if consecutive && self.value > 0 {
            self.value += 1;
            self.touch(day);
            return StreakOutcome::Extended {
                recovery_used: matches!(settled, SettleAction::RecoveryConsumed { .. }),
            };
        }

        self.value = 1;
        self.touch(day);
        match settled {
            SettleAction::Reset { previous } => StreakOutcome::Restarted { previous },
            _ => StreakOutcome::Started,
        }
    }

    /// Add recovery items to the pool.
    pub fn grant_recovery_items(&mut self, count: u32) {
        self.recovery_items = self.recovery_items.saturating_add(count);
    }

    fn touch(&mut self, day: NaiveDate) {
        self.last_assistance_date = Some(day);
        if self.value > self.max_value {
            self.max_value = self.value;
        }
    }
}
