use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod feedback;

#[derive(Parser)]
#[command(name = "cadence", version, about = "Focus timer and circuit workout runner")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a focus session or a workout in the foreground
    Run(commands::run::RunArgs),
    /// Print the saved recovery snapshot as JSON
    Status,
    /// Throw away the saved recovery snapshot
    Discard,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Phase statistics
    Stats {
        #[command(subcommand)]
        action: commands::stats::StatsAction,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("CADENCE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run(args) => commands::run::run(args),
        Commands::Status => commands::recovery::status(),
        Commands::Discard => commands::recovery::discard(),
        Commands::Config { action } => commands::config::run(action),
        Commands::Stats { action } => commands::stats::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
