// CoFrame CLI - import git repositories into project file stores
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use coframe::{
    init_logging_with_level, AppConfig, ImportSummary, Importer, MemoryProjectStore,
    PgProjectStore, ProjectId, ProjectStore, PLAINTEXT_LABEL,
};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "CoFrame - import git repositories into project file stores",
    long_about = None,
    after_help = "EXAMPLES:
  coframe create-project my-app
  coframe import 1 https://github.com/owner/my-app.git
  coframe list-files 1
  coframe preview https://github.com/owner/my-app.git --json"
)]
struct Cli {
    /// Enable verbose logging (DEBUG level)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// TOML configuration file
    #[arg(short, long, global = true, env = "COFRAME_CONFIG")]
    config: Option<PathBuf>,

    /// PostgreSQL connection URL (overrides config and environment)
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Parent directory for per-project scratch clones
    #[arg(long, global = true)]
    scratch_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clone a repository and replace a project's files with its contents
    Import {
        /// Target project id
        project_id: ProjectId,
        /// Repository URL (https, ssh, git, file or git@host:path)
        url: String,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run an import against a throwaway in-memory project
    Preview {
        /// Repository URL
        url: String,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create an empty project
    CreateProject {
        /// Display name
        name: String,
    },

    /// List all projects
    ListProjects,

    /// List the files stored for a project
    ListFiles {
        /// Project id
        project_id: ProjectId,
    },
}

async fn connect(config: &AppConfig) -> Result<PgProjectStore> {
    PgProjectStore::connect(&config.database)
        .await
        .context("Failed to connect to the project database")
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling fetch");
            trigger.cancel();
        }
    });
    cancel
}

fn print_summary(summary: &ImportSummary, as_json: bool) -> Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else {
        println!("Imported {} files", summary.files_imported);
        println!(
            "Skipped {} files ({} too large, {} binary, {} unreadable)",
            summary.files_skipped,
            summary.skipped_too_large,
            summary.skipped_binary,
            summary.skipped_unreadable
        );
        println!(
            "Committed {} rows in {} batches",
            summary.files_committed, summary.batches_committed
        );
    }
    Ok(())
}

async fn run_import(
    store: Arc<dyn ProjectStore>,
    config: &AppConfig,
    project_id: ProjectId,
    url: &str,
    as_json: bool,
) -> Result<()> {
    let importer = Importer::new(store, &config.ingest);
    match importer
        .import_repository_with_cancel(project_id, url, cancel_on_ctrl_c())
        .await
    {
        Ok(summary) => print_summary(&summary, as_json),
        Err(err) => {
            if as_json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({
                        "error": err.to_string(),
                        "step": err.step(),
                        "summary": err.summary(),
                    }))?
                );
            }
            Err(err.into())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _ = init_logging_with_level(cli.verbose, cli.quiet);

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(url) = cli.database_url {
        config.database.url = Some(url);
    }
    if let Some(dir) = cli.scratch_dir {
        config.ingest.scratch_dir = dir;
    }

    match cli.command {
        Commands::Import {
            project_id,
            url,
            json,
        } => {
            let store = connect(&config).await?;
            run_import(Arc::new(store), &config, project_id, &url, json).await?;
        }
        Commands::Preview { url, json } => {
            let store = Arc::new(MemoryProjectStore::new());
            let project = store.create_project("preview").await?;
            run_import(store.clone(), &config, project.id, &url, json).await?;
            if !json {
                for file in store.list_files(project.id).await? {
                    println!(
                        "  {} ({})",
                        file.path,
                        file.language.as_deref().unwrap_or(PLAINTEXT_LABEL)
                    );
                }
            }
        }
        Commands::CreateProject { name } => {
            let project = connect(&config).await?.create_project(&name).await?;
            println!("Created project {} ({})", project.id, project.name);
        }
        Commands::ListProjects => {
            for project in connect(&config).await?.list_projects().await? {
                println!(
                    "{}\t{}\t{}\t{}",
                    project.id,
                    project.name,
                    project.repo_url.as_deref().unwrap_or("-"),
                    project.created_at.format("%Y-%m-%d %H:%M:%S UTC")
                );
            }
        }
        Commands::ListFiles { project_id } => {
            for file in connect(&config).await?.list_files(project_id).await? {
                println!(
                    "{}\t{}\t{} bytes",
                    file.path,
                    file.language.as_deref().unwrap_or(PLAINTEXT_LABEL),
                    file.content.as_deref().map_or(0, str::len)
                );
            }
        }
    }

    Ok(())
}
