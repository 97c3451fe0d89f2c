use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use prospector::prospector_config::ProspectorConfig;
use prospector::telemetry;

mod cmd;

#[derive(Parser)]
#[command(name = "prospector")]
#[command(version, about = "Sales-pipeline CRM: prospects, board and dashboard")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP and WebSocket server
    Serve {
        /// Port to serve on (overrides config and PROSPECTOR_PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Database path
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Enable dev mode (CORS permissive for a separately served UI)
        #[arg(long)]
        dev: bool,
    },
    /// Create the database and a default prospector.toml
    Init,
    /// Add a prospect
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        company: Option<String>,
        #[arg(long)]
        email: Option<String>,
        /// Initial stage (default: new)
        #[arg(long)]
        stage: Option<String>,
        /// hot, warm or cold (default: warm)
        #[arg(long)]
        temperature: Option<String>,
    },
    /// List prospects
    List {
        /// Stage filter, or "all"
        #[arg(long)]
        stage: Option<String>,
        /// Temperature filter, or "all"
        #[arg(long)]
        temperature: Option<String>,
        /// Case-insensitive match on name, company or email
        #[arg(short, long)]
        search: Option<String>,
        /// created_desc, created_asc, updated_desc, name_asc, amount_desc, next_action_asc
        #[arg(long)]
        sort: Option<String>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Move a prospect to another stage
    Move { id: String, stage: String },
    /// Show the change history of a prospect
    History { id: String },
    /// Show pipeline statistics
    Stats,
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default prospector.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let _ = dotenvy::from_path(project_dir.join(".env"));
    dotenvy::dotenv().ok();

    let config = ProspectorConfig::with_cli_args(project_dir, cli.verbose)?;
    let _log_guard = telemetry::init_tracing(&config)?;

    match cli.command {
        Commands::Serve {
            port,
            host,
            db_path,
            dev,
        } => cmd::cmd_serve(&config, port, host, db_path, dev).await?,
        Commands::Init => cmd::cmd_init(&config)?,
        Commands::Add {
            name,
            company,
            email,
            stage,
            temperature,
        } => {
            cmd::cmd_add(
                &config,
                cmd::prospects::NewProspect {
                    name,
                    company,
                    email,
                    stage,
                    temperature,
                },
            )
            .await?
        }
        Commands::List {
            stage,
            temperature,
            search,
            sort,
            json,
        } => {
            cmd::cmd_list(
                &config,
                stage.as_deref(),
                temperature.as_deref(),
                search.as_deref(),
                sort.as_deref(),
                json,
            )
            .await?
        }
        Commands::Move { id, stage } => cmd::cmd_move(&config, &id, &stage).await?,
        Commands::History { id } => cmd::cmd_history(&config, &id).await?,
        Commands::Stats => cmd::cmd_stats(&config).await?,
        Commands::Config { command } => cmd::cmd_config(&config, command)?,
    }

    Ok(())
}
