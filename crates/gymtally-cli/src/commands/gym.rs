use clap::Subcommand;
use gymtally_core::AttendanceService;

#[derive(Subcommand)]
pub enum GymAction {
    /// Register or update a gym's location facts
    Add {
        /// Gym id
        id: String,
        /// Display name
        #[arg(long)]
        name: String,
        /// Geofence center latitude
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        /// Geofence center longitude
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        /// Geofence radius in meters (config default when omitted)
        #[arg(long)]
        radius: Option<f64>,
        /// Minimum stay in minutes (config default when omitted)
        #[arg(long)]
        min_stay: Option<i64>,
    },
    /// List registered gyms
    List,
    /// Show one gym
    Show {
        /// Gym id
        id: String,
    },
}

pub fn run(action: GymAction) -> Result<(), Box<dyn std::error::Error>> {
    let service = AttendanceService::open()?;

    match action {
        GymAction::Add {
            id,
            name,
            lat,
            lon,
            radius,
            min_stay,
        } => {
            let gym = service.upsert_gym(&id, &name, lat, lon, radius, min_stay)?;
            println!("{}", serde_json::to_string_pretty(&gym)?);
        }
        GymAction::List => {
            let gyms = service.gyms()?;
            println!("{}", serde_json::to_string_pretty(&gyms)?);
        }
        GymAction::Show { id } => match service.gym(&id)? {
            Some(gym) => println!("{}", serde_json::to_string_pretty(&gym)?),
            None => {
                eprintln!("unknown gym: {id}");
                std::process::exit(1);
            }
        },
    }
    Ok(())
}
