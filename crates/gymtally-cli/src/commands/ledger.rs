use chrono::Utc;
use clap::Subcommand;
use gymtally_core::{AttendanceService, AwardRequest, LedgerReason};

#[derive(Subcommand)]
pub enum LedgerAction {
    /// Current token balance (fold of the journal)
    Balance {
        /// Member id
        user: String,
    },
    /// Full journal for a member, oldest first
    List {
        /// Member id
        user: String,
    },
    /// Append an externally-driven award to the journal
    Award {
        /// Member id
        user: String,
        /// Entry reason (ROUTINE_COMPLETE, REWARD_CLAIM, ADMIN_ADJUSTMENT)
        reason: String,
        /// Signed token amount (negative only for ADMIN_ADJUSTMENT)
        #[arg(allow_hyphen_values = true)]
        amount: i64,
        /// Reference identifying the triggering fact; replays of the same
        /// reference are absorbed
        #[arg(long = "ref")]
        source_ref: String,
    },
}

pub fn run(action: LedgerAction) -> Result<(), Box<dyn std::error::Error>> {
    let service = AttendanceService::open()?;

    match action {
        LedgerAction::Balance { user } => {
            let balance = service.balance(&user)?;
            println!("{}", serde_json::json!({ "user_id": user, "balance": balance }));
        }
        LedgerAction::List { user } => {
            let entries = service.ledger_entries(&user)?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        LedgerAction::Award {
            user,
            reason,
            amount,
            source_ref,
        } => {
            let reason = LedgerReason::parse(&reason)?;
            let request = AwardRequest::external(&user, reason, amount, Utc::now(), &source_ref);
            let outcome = service.award(&request)?;
            println!("{}", serde_json::to_string_pretty(outcome.entry())?);
        }
    }
    Ok(())
}
