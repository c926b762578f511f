use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod wiring;

#[derive(Parser)]
#[command(name = "vbl")]
#[command(about = "Volatility-rebalancing trading engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the live engine with the configured positions.
    Run {
        /// Config files in merge order (base -> overlays).
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },

    /// Replay the decision pipeline over a historical bar series.
    Simulate(commands::simulate::SimulateArgs),
}

fn main() -> Result<()> {
    // Dev-time .env bootstrap; missing files are fine.
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Commands::Run { config_paths } => commands::run::execute(&config_paths),
        Commands::Simulate(args) => commands::simulate::execute(&args),
    }
}
