use clap::Subcommand;
use gymtally_core::AttendanceService;

#[derive(Subcommand)]
pub enum MemberAction {
    /// Set a member's weekly visit goal
    SetGoal {
        /// Member id
        user: String,
        /// Visits per week needed for the bonus
        goal: u32,
    },
    /// Grant streak recovery items to a member
    GrantRecovery {
        /// Member id
        user: String,
        /// Number of items to grant
        #[arg(default_value = "1")]
        count: u32,
    },
}

pub fn run(action: MemberAction) -> Result<(), Box<dyn std::error::Error>> {
    let service = AttendanceService::open()?;

    match action {
        MemberAction::SetGoal { user, goal } => {
            service.set_weekly_goal(&user, goal)?;
            println!("ok");
        }
        MemberAction::GrantRecovery { user, count } => {
            let snapshot = service.grant_recovery_items(&user, count)?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
    }
    Ok(())
}
