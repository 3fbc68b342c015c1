mod config;
mod demo_cmd;
mod pipeline;
mod serve_cmd;

use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use orc_core::checkpoint::Checkpointer;
use orc_db::PgCheckpointer;
use orc_db::pool;

use config::OrcConfig;

#[derive(Parser)]
#[command(name = "orc", about = "Conversation-to-plan agent orchestrator")]
struct Cli {
    /// Database URL (overrides ORC_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write an orc config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/orc")]
        db_url: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Initialize the orc database (requires config file or env vars)
    DbInit,
    /// Drive one conversational turn in process, no database required
    Demo {
        /// The user message to send
        message: String,
        /// Conversation thread to send it on
        #[arg(long, default_value = "demo")]
        thread_id: String,
    },
    /// Serve the orchestration pipeline over HTTP
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Port to listen on
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Print a shell completion script to stdout
    Completions {
        shell: Shell,
    },
}

/// Execute the `orc init` command: write config file.
fn cmd_init(db_url: &str, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
        },
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    println!();
    println!("Next: run `orc db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `orc db-init` command: create database and run migrations.
async fn cmd_db_init(cli_db_url: Option<&str>) -> anyhow::Result<()> {
    let resolved = OrcConfig::resolve(cli_db_url)?;

    println!("Initializing orc database...");

    pool::ensure_database_exists(&resolved.db_config).await?;
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    pool::run_migrations(&db_pool).await?;

    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    db_pool.close().await;

    println!("orc db-init complete.");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { db_url, force } => {
            cmd_init(&db_url, force)?;
        }
        Commands::DbInit => {
            cmd_db_init(cli.database_url.as_deref()).await?;
        }
        Commands::Demo { message, thread_id } => {
            demo_cmd::run_demo(&message, &thread_id).await?;
        }
        Commands::Serve { bind, port } => {
            let resolved = OrcConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let checkpointer: Arc<dyn Checkpointer> = Arc::new(PgCheckpointer::new(db_pool));
            serve_cmd::run_serve(checkpointer, &bind, port).await?;
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut std::io::stdout());
        }
    }

    Ok(())
}
