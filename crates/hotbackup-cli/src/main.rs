// CLI for smoke tests and operator tooling

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands {
    pub mod run;
    pub mod stages;
}

#[derive(Parser)]
#[command(name = "hotbackup-sim")]
#[command(about = "Drive simulated BACKUP STAGE sessions against in-memory collaborators", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a stage script on concurrent sessions
    Run {
        /// Configuration file (TOML); HOTBACKUP_* variables override it
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of concurrent sessions
        #[arg(short = 'n', long, default_value = "2")]
        sessions: usize,

        /// Comma-separated stages each session requests
        #[arg(short, long, default_value = "START,FLUSH,BLOCK_DDL,BLOCK_COMMIT,END")]
        stages: String,

        /// Time each session spends "copying" before its last stage, in milliseconds
        #[arg(long, default_value = "0")]
        copy_ms: u64,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the stage ladder and the backup lock each stage leaves behind
    Stages,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            config,
            sessions,
            stages,
            copy_ms,
            json,
        } => {
            let options = commands::run::RunOptions {
                config,
                sessions,
                stages,
                copy_ms,
                json,
            };
            commands::run::run(options).await?;
        }
        Commands::Stages => commands::stages::list(),
    }

    Ok(())
}
