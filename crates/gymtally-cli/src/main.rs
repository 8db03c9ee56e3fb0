use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "gymtally", version, about = "Gymtally attendance rewards CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Gym registry management
    Gym {
        #[command(subcommand)]
        action: commands::gym::GymAction,
    },
    /// Member settings and recovery items
    Member {
        #[command(subcommand)]
        action: commands::member::MemberAction,
    },
    /// Presence pings, checkout, and manual attendance
    Checkin {
        #[command(subcommand)]
        action: commands::checkin::CheckinAction,
    },
    /// Streak and weekly goal progress
    Progress {
        #[command(subcommand)]
        action: commands::progress::ProgressAction,
    },
    /// Token ledger queries and awards
    Ledger {
        #[command(subcommand)]
        action: commands::ledger::LedgerAction,
    },
    /// Reward multiplier activation
    Multiplier {
        #[command(subcommand)]
        action: commands::multiplier::MultiplierAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Gym { action } => commands::gym::run(action),
        Commands::Member { action } => commands::member::run(action),
        Commands::Checkin { action } => commands::checkin::run(action),
        Commands::Progress { action } => commands::progress::run(action),
        Commands::Ledger { action } => commands::ledger::run(action),
        Commands::Multiplier { action } => commands::multiplier::run(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
