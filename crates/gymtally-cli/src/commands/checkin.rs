use clap::Subcommand;
use gymtally_core::{AttendanceService, GeoPoint};

#[derive(Subcommand)]
pub enum CheckinAction {
    /// Process one device coordinate ping
    Ping {
        /// Member id
        user: String,
        /// Gym id
        gym: String,
        /// Device latitude
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        /// Device longitude
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },
    /// Close the member's active presence at a gym
    Out {
        /// Member id
        user: String,
        /// Gym id
        gym: String,
    },
    /// Record a visit directly, bypassing the geofence
    Manual {
        /// Member id
        user: String,
        /// Gym id
        gym: String,
    },
    /// Show the member's active presence at a gym, if any
    Status {
        /// Member id
        user: String,
        /// Gym id
        gym: String,
    },
}

pub fn run(action: CheckinAction) -> Result<(), Box<dyn std::error::Error>> {
    let service = AttendanceService::open()?;

    match action {
        CheckinAction::Ping { user, gym, lat, lon } => {
            let point = GeoPoint::new(lat, lon)?;
            let update = service.record_presence(&user, &gym, &point)?;
            println!("{}", serde_json::to_string_pretty(&update)?);
        }
        CheckinAction::Out { user, gym } => {
            let update = service.check_out(&user, &gym)?;
            println!("{}", serde_json::to_string_pretty(&update)?);
        }
        CheckinAction::Manual { user, gym } => {
            let update = service.record_manual_attendance(&user, &gym)?;
            println!("{}", serde_json::to_string_pretty(&update)?);
        }
        CheckinAction::Status { user, gym } => {
            let presence = service.active_presence(&user, &gym)?;
            println!("{}", serde_json::to_string_pretty(&presence)?);
        }
    }
    Ok(())
}
