use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use directories::ProjectDirs;
use tracing_subscriber::EnvFilter;

use draftguard::cli::{Cli, Commands};
use draftguard::commands;
use draftguard_core::storage::Workspace;
use draftguard_core::storage::snapshot::LocalCache;
use draftguard_core::store::ProjectStore;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Commands::Init { path } = &cli.command {
        let target = match path {
            Some(path) => path.clone(),
            None => std::env::current_dir()?,
        };
        let ws = Workspace::create(&target).await?;
        println!("Created workspace at {}", ws.path().display());
        return Ok(());
    }

    let workspace = find_workspace(cli.workspace.clone()).await?;
    let mut store = ProjectStore::connect(workspace, local_cache()).await?;

    match cli.command {
        Commands::Init { .. } => unreachable!("handled above"),
        Commands::Info => commands::handle_info(&store).await?,
        Commands::Tree { project } => commands::handle_tree(&store, project).await?,
        Commands::NewProject { name } => commands::handle_new_project(&mut store, name).await?,
        Commands::New { path } => commands::handle_new(&mut store, path).await?,
        Commands::Rename { path, new_name } => {
            commands::handle_rename(&mut store, path, new_name).await?
        }
        Commands::Mv(args) => commands::handle_mv(&mut store, args).await?,
        Commands::Rm { path, force } => commands::handle_rm(&mut store, path, force).await?,
        Commands::Upgrade { path } => commands::handle_upgrade(&mut store, path).await?,
        Commands::Comment(args) => commands::handle_comment(&mut store, args).await?,
        Commands::Save { path, from } => commands::handle_save(&mut store, path, from).await?,
    }

    Ok(())
}

fn init_tracing(verbose: u8, quiet: bool) {
    let default = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Opens the workspace given by flag/env, or walks up from the current
/// directory looking for one.
async fn find_workspace(flag: Option<PathBuf>) -> Result<Workspace> {
    if let Some(path) = flag {
        return Workspace::open(&path)
            .await
            .with_context(|| format!("Failed to open workspace at {}", path.display()));
    }

    let mut dir = std::env::current_dir()?;
    loop {
        if let Ok(ws) = Workspace::open(&dir).await {
            return Ok(ws);
        }
        if !dir.pop() {
            bail!("No workspace found in the current directory or its parents (run 'draftguard init')");
        }
    }
}

/// Machine-local snapshot cache in the platform cache directory. Absent on
/// exotic platforms; the store then runs on the side-car alone.
fn local_cache() -> Option<LocalCache> {
    ProjectDirs::from("", "", "draftguard").map(|dirs| LocalCache::new(dirs.cache_dir()))
}
