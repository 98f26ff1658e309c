use anyhow::Result;
use clap::{Parser, Subcommand};
use packsmith::supervisor::Transport;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cmd;

#[derive(Parser)]
#[command(name = "packsmith")]
#[command(version, about = "Build distributable executables from scripted projects")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile the project into a distributable executable
    Build {
        /// Path to the build configuration file
        #[arg(short, long, default_value = "build.yaml")]
        config: PathBuf,

        /// Child output transport: auto, pty, or pipe
        #[arg(long, default_value = "auto")]
        transport: Transport,

        /// Suppress the compiler's output lines (progress bars only)
        #[arg(short, long)]
        quiet: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "packsmith=debug" } else { "packsmith=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::Build {
            config,
            transport,
            quiet,
        } => {
            let outcome = cmd::cmd_build(config, *transport, !*quiet).await?;
            if !outcome.success() {
                std::process::exit(outcome.exit_code());
            }
        }
    }

    Ok(())
}
