use clap::Subcommand;
use gymtally_core::AttendanceService;

#[derive(Subcommand)]
pub enum MultiplierAction {
    /// Activate a multiplier for a member, starting now
    Activate {
        /// Member id
        user: String,
        /// Factor applied to awards; 2.0 doubles
        value: f64,
        /// Validity window in minutes
        #[arg(long, default_value = "1440")]
        duration: i64,
    },
    /// List a member's activations, expired ones included
    List {
        /// Member id
        user: String,
    },
}

pub fn run(action: MultiplierAction) -> Result<(), Box<dyn std::error::Error>> {
    let service = AttendanceService::open()?;

    match action {
        MultiplierAction::Activate {
            user,
            value,
            duration,
        } => {
            let effect = service.activate_multiplier(&user, value, duration)?;
            println!("{}", serde_json::to_string_pretty(&effect)?);
        }
        MultiplierAction::List { user } => {
            let effects = service.multiplier_effects(&user)?;
            println!("{}", serde_json::to_string_pretty(&effects)?);
        }
    }
    Ok(())
}
