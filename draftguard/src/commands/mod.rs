use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use console::{Style, style};
use dialoguer::Confirm;
use tracing::info;

use draftguard_core::storage::{ItemId, Position, status};
use draftguard_core::store::ProjectStore;

use crate::cli::{CommentArgs, CommentCommands, MvArgs};

/// Splits `PROJECT/REST` and resolves the item. Fails with a readable message
/// when either part does not exist.
fn resolve(store: &ProjectStore, path: &str) -> Result<ItemId> {
    let (project, rest) = path
        .split_once('/')
        .with_context(|| format!("'{path}' names a project; expected PROJECT/DOCUMENT"))?;
    let idx = store
        .tree()
        .project_index(project)
        .with_context(|| format!("No project named '{project}'"))?;
    store
        .tree()
        .resolve(idx, rest)
        .with_context(|| format!("No document at '{path}'"))
}

pub async fn handle_info(store: &ProjectStore) -> Result<()> {
    let tree = store.tree();
    let items: usize = (0..tree.projects.len()).map(|p| tree.project_items(p).len()).sum();
    println!("Workspace: {}", store.workspace().path().display());
    println!("Id:        {}", store.workspace().id());
    println!("Projects:  {}", tree.projects.len());
    println!("Documents: {}", items);
    println!("Autosave:  every {}s", store.config().autosave_interval);
    print!("Statuses: ");
    for (idx, def) in store.config().states.iter().enumerate() {
        if idx > 0 {
            print!(" -> ");
        }
        print!("{}", status_style(idx).apply_to(&def.name));
    }
    println!();
    Ok(())
}

pub async fn handle_tree(store: &ProjectStore, project: Option<String>) -> Result<()> {
    let tree = store.tree();
    if let Some(name) = &project {
        if tree.project_index(name).is_none() {
            bail!("No project named '{name}'");
        }
    }
    for proj in &tree.projects {
        if project.as_deref().is_some_and(|name| name != proj.name) {
            continue;
        }
        println!("{}", style(&proj.name).bold());
        for &root in proj.roots() {
            print_item(store, root, 1)?;
        }
    }
    Ok(())
}

fn print_item(store: &ProjectStore, id: ItemId, depth: usize) -> Result<()> {
    let item = store.tree().item(id)?;
    let line = match store.config().status(&item.status) {
        Some(def) => {
            let idx = store.config().states.iter().position(|s| s.id == def.id).unwrap_or(0);
            let count = status::current_count(item, item.last_char_count, def);
            let pct = status::goal_percentage(count, status::effective_goal(item, def));
            format!(
                "{} [{}] {}%",
                item.base(),
                status_style(idx).apply_to(&def.name),
                pct
            )
        }
        None => item.base().to_string(),
    };
    println!("{:indent$}{}", "", line, indent = depth * 2);
    for &child in store.tree().item(id)?.children() {
        print_item(store, child, depth + 1)?;
    }
    Ok(())
}

fn status_style(position: usize) -> Style {
    match position {
        0 => Style::new().red(),
        1 => Style::new().yellow(),
        2 => Style::new().green(),
        _ => Style::new(),
    }
}

pub async fn handle_new_project(store: &mut ProjectStore, name: String) -> Result<()> {
    store.create_project(&name).await?;
    println!("Created project '{name}'");
    Ok(())
}

pub async fn handle_new(store: &mut ProjectStore, path: String) -> Result<()> {
    let (parent_path, base) = path
        .rsplit_once('/')
        .with_context(|| format!("'{path}' must be PROJECT/DOCUMENT"))?;
    let (project, parent) = match parent_path.split_once('/') {
        Some((project, rest)) => {
            let idx = store
                .tree()
                .project_index(project)
                .with_context(|| format!("No project named '{project}'"))?;
            let parent = store
                .tree()
                .resolve(idx, rest)
                .with_context(|| format!("No document at '{parent_path}'"))?;
            (idx, Some(parent))
        }
        None => {
            let idx = store
                .tree()
                .project_index(parent_path)
                .with_context(|| format!("No project named '{parent_path}'"))?;
            (idx, None)
        }
    };
    store.create_item(project, parent, base).await?;
    println!("Created {path}");
    Ok(())
}

pub async fn handle_rename(store: &mut ProjectStore, path: String, new_name: String) -> Result<()> {
    let id = resolve(store, &path)?;
    store.rename_item(id, &new_name).await?;
    println!("Renamed to {}", store.tree().display_path(id)?);
    Ok(())
}

pub async fn handle_mv(store: &mut ProjectStore, args: MvArgs) -> Result<()> {
    let source = resolve(store, &args.source)?;
    let target = resolve(store, &args.target)?;
    let position = if args.before { Position::Before } else { Position::After };
    store.move_item(source, target, position).await?;
    println!("Moved to {}", store.tree().display_path(source)?);
    Ok(())
}

pub async fn handle_rm(store: &mut ProjectStore, path: String, force: bool) -> Result<()> {
    let id = resolve(store, &path)?;
    let subtree = store.tree().descendants(id).len();
    if !force {
        let prompt = if subtree > 1 {
            format!("Delete '{path}' and {} nested document(s)?", subtree - 1)
        } else {
            format!("Delete '{path}'?")
        };
        if !Confirm::new().with_prompt(prompt).default(false).interact()? {
            println!("Aborted");
            return Ok(());
        }
    }
    store.delete_item(id).await?;
    info!(path, "Deleted document subtree");
    println!("Deleted {path}");
    Ok(())
}

pub async fn handle_upgrade(store: &mut ProjectStore, path: String) -> Result<()> {
    let id = resolve(store, &path)?;
    let definition = store
        .upgrade_status(id)
        .await?
        .context("No statuses are configured for this workspace")?;
    let idx = store
        .config()
        .states
        .iter()
        .position(|s| s.id == definition.id)
        .unwrap_or(0);
    println!("{path} is now {}", status_style(idx).apply_to(&definition.name));
    Ok(())
}

pub async fn handle_comment(store: &mut ProjectStore, args: CommentArgs) -> Result<()> {
    match args.command {
        CommentCommands::Add { path, paragraph, text } => {
            let id = resolve(store, &path)?;
            let comment = store.add_comment(id, paragraph, &text).await?;
            println!("Comment added to paragraph {} by {}", paragraph, comment.author);
        }
        CommentCommands::List { path } => {
            let id = resolve(store, &path)?;
            let item = store.tree().item(id)?;
            if item.comments.is_empty() {
                println!("No comments on {path}");
                return Ok(());
            }
            for comment in &item.comments {
                println!(
                    "¶{} {} ({}): {}",
                    comment.paragraph,
                    style(&comment.author).bold(),
                    comment.posted_at.format("%Y-%m-%d %H:%M"),
                    comment.text
                );
            }
        }
    }
    Ok(())
}

pub async fn handle_save(
    store: &mut ProjectStore,
    path: String,
    from: Option<PathBuf>,
) -> Result<()> {
    let body = match from {
        Some(file) => tokio::fs::read_to_string(&file)
            .await
            .with_context(|| format!("Cannot read '{}'", file.display()))?,
        None => std::io::read_to_string(std::io::stdin()).context("Cannot read stdin")?,
    };

    let id = resolve(store, &path)?;
    let (session, _) = store.open_document(id).await?;
    let len = store.save_document(&session, &body).await?;
    store.close_document(session).await?;
    println!("Saved {path} ({len} characters)");
    Ok(())
}
