use clap::Subcommand;
use gymtally_core::AttendanceService;

#[derive(Subcommand)]
pub enum ProgressAction {
    /// Current streak, settled against today's boundary
    Streak {
        /// Member id
        user: String,
    },
    /// Progress in the current ISO week
    Weekly {
        /// Member id
        user: String,
    },
    /// Balance, streak, and weekly progress in one view
    Summary {
        /// Member id
        user: String,
    },
}

pub fn run(action: ProgressAction) -> Result<(), Box<dyn std::error::Error>> {
    let service = AttendanceService::open()?;

    match action {
        ProgressAction::Streak { user } => {
            let snapshot = service.streak(&user)?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        ProgressAction::Weekly { user } => {
            let snapshot = service.weekly_progress(&user)?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        ProgressAction::Summary { user } => {
            let summary = serde_json::json!({
                "user_id": user,
                "balance": service.balance(&user)?,
                "streak": service.streak(&user)?,
                "weekly": service.weekly_progress(&user)?,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }
    Ok(())
}
