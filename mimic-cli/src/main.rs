use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "mimic")]
#[command(about = "Clone a workstation environment into a fleet of VMs", long_about = None)]
struct Cli {
    /// Path to the fleet file
    #[arg(short = 'f', long, global = true, default_value = "fleet.yaml")]
    file: String,

    /// External single-VM driver program
    #[arg(long, global = true, default_value = "mimic-vm")]
    driver: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start VMs (all, or the named subset plus its dependencies)
    Up {
        /// VM names to start (empty for all)
        names: Vec<String>,

        /// Start VMs one at a time instead of per-wave concurrency
        #[arg(long)]
        sequential: bool,
    },

    /// Stop VMs in reverse dependency order
    Down {
        /// VM names to stop (empty for all)
        names: Vec<String>,

        /// Hard-kill instead of clean shutdown
        #[arg(long)]
        force: bool,
    },

    /// Stop then start VMs
    Restart {
        /// VM names to restart (empty for all)
        names: Vec<String>,

        /// Start VMs one at a time instead of per-wave concurrency
        #[arg(long)]
        sequential: bool,
    },

    /// Show orchestration and live driver state for every VM
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let ok = match cli.command {
        Commands::Up { names, sequential } => {
            commands::up(&cli.file, &cli.driver, &names, !sequential).await?
        }
        Commands::Down { names, force } => {
            commands::down(&cli.file, &cli.driver, &names, force).await?
        }
        Commands::Restart { names, sequential } => {
            commands::restart(&cli.file, &cli.driver, &names, !sequential).await?
        }
        Commands::Status => {
            commands::status(&cli.file, &cli.driver).await?;
            true
        }
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}
