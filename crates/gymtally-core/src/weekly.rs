//! Weekly attendance goals.
//!
//! Progress is bucketed by ISO week of the gym-local day. Each week gets
//! its own row; a visit counts at most once per day, and the bonus fires
//! exactly once per week, guarded by the `achieved_goal` flag on the row.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::day::IsoWeekKey;

/// Goal progress for one member and one ISO week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyGoal {
    /// Member this row belongs to
    pub user_id: String,

    /// ISO week-numbering year
    pub year: i32,

    /// ISO week number, 1-53
    pub week_number: u32,

    /// Visits needed this week for the bonus
    pub goal: u32,

    /// Distinct gym-local days with a confirmed visit so far
    pub assist_count: u32,

    /// Set when the goal was reached; the bonus fires on the transition
    pub achieved_goal: bool,

    /// Monday of this week
    pub week_start_date: NaiveDate,

    /// Last gym-local day that was counted
    pub last_assist_date: Option<NaiveDate>,
}

/// What counting a visit did to the week.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeeklyOutcome {
    /// This day was already counted (or the fact is older than the state)
    AlreadyCounted,

    /// Progress advanced; `achieved_now` marks the goal transition
    Counted { achieved_now: bool },
}

impl WeeklyGoal {
    /// Fresh row for a week with no visits yet.
    pub fn new(user_id: &str, week: IsoWeekKey, goal: u32) -> Self {
        Self {
            user_id: user_id.to_string(),
            year: week.year,
            week_number: week.week,
            goal,
            assist_count: 0,
            achieved_goal: false,
            week_start_date: week.week_start,
            last_assist_date: None,
        }
    }

    /// Count a confirmed visit on `day`.
    ///
    /// At most one count per gym-local day; facts older than the last
    /// counted day are ignored so replays cannot inflate progress. The
    /// goal transition happens at most once because the flag stays set.
    pub fn apply_visit(&mut self, day: NaiveDate) -> WeeklyOutcome {
        if let Some(last) = self.last_assist_date {
            if last >= day {
                return WeeklyOutcome::AlreadyCounted;
            }
        }

        self.assist_count += 1;
        self.last_assist_date = Some(day);

        let achieved_now = !self.achieved_goal && self.assist_count >= self.goal;
        if achieved_now {
            self.achieved_goal = true;
        }
        WeeklyOutcome::Counted { achieved_now }
    }
}
