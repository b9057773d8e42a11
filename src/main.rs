use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use medibridge::config::Config;
use medibridge::security::credentials::hash_password;
use medibridge::{api, utils};

#[derive(Parser)]
#[command(name = "medibridge", version, about = "MediBridge API gateway")]
struct AppCli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve {
        #[arg(long, env = "PORT", default_value_t = 8080)]
        port: u16,
    },
    /// Print an Argon2id hash for a user directory entry
    HashPassword { password: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    utils::logging::init();

    let args = AppCli::parse();
    match args.command {
        Commands::Serve { port } => {
            let config = Config::from_env().context("loading configuration")?;
            info!("Starting MediBridge API on port {port}");
            api::serve(config, port).await?;
        }
        Commands::HashPassword { password } => {
            println!("{}", hash_password(&password)?);
        }
    }

    Ok(())
}
