//! Walks the workspace directory structure into a fresh [`ProjectTree`].
//!
//! Every directory at the workspace root is a project; inside a project,
//! every `*.txt` file is an item, and the sibling directory `sub_<base>`
//! (when present) supplies that item's children by the same rule. Entries are
//! sorted lexicographically so two scans of unchanged disk state produce
//! structurally identical trees regardless of host enumeration order.
//!
//! Scanning never mutates disk state.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::fs;
use tracing::{debug, instrument, warn};

use crate::config::Config;
use crate::storage::{
    DOCUMENT_EXTENSION, Error, INTERNAL_DIR_NAME, Item, ItemId, ProjectTree, Result, Workspace,
};

/// Builds the live tree from disk.
///
/// Fails only if the workspace's top-level enumeration cannot be read. A
/// single unreadable project directory is skipped with a warning, not a
/// whole-scan failure.
#[instrument(skip(workspace, config), fields(workspace = %workspace.path().display()))]
pub async fn scan(workspace: &Workspace, config: &Config) -> Result<ProjectTree> {
    debug!("Scanning workspace");
    let mut tree = ProjectTree::new();

    let mut read_dir = fs::read_dir(workspace.path())
        .await
        .map_err(|e| Error::from_io(e, workspace.path()))?;

    let mut project_dirs: Vec<(String, PathBuf)> = Vec::new();
    while let Some(entry) = read_dir.next_entry().await.map_err(Error::Io)? {
        let file_type = entry.file_type().await.map_err(Error::Io)?;
        if !file_type.is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            warn!("Skipping project directory with non-UTF-8 name");
            continue;
        };
        if name == INTERNAL_DIR_NAME {
            continue;
        }
        project_dirs.push((name, entry.path()));
    }
    project_dirs.sort_by(|a, b| a.0.cmp(&b.0));

    for (name, path) in project_dirs {
        let project_idx = tree.add_project(&name);
        if let Err(e) = scan_dir(&mut tree, path.clone(), project_idx, None, config).await {
            // Non-fatal per project: drop the half-built project and move on.
            warn!("Skipping unreadable project directory '{}': {}", path.display(), e);
            for root in tree.projects[project_idx].roots().to_vec() {
                tree.detach(root).ok();
                tree.free_subtree(root);
            }
            tree.projects.pop();
        }
    }

    debug!("Scan complete: {} projects", tree.projects.len());
    Ok(tree)
}

/// Recursively populates one directory level. `parent` is `None` at project
/// root.
fn scan_dir<'a>(
    tree: &'a mut ProjectTree,
    dir: PathBuf,
    project_idx: usize,
    parent: Option<ItemId>,
    config: &'a Config,
) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let mut read_dir = fs::read_dir(&dir).await.map_err(|e| Error::from_io(e, &dir))?;

        let mut documents: Vec<String> = Vec::new();
        let mut directories: Vec<String> = Vec::new();
        while let Some(entry) = read_dir.next_entry().await.map_err(Error::Io)? {
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            let file_type = entry.file_type().await.map_err(Error::Io)?;
            if file_type.is_dir() {
                directories.push(name);
            } else if file_type.is_file() && is_document(&name) {
                documents.push(name);
            }
            // Anything else (non-document files, symlinks) is ignored.
        }
        documents.sort();

        let project_name = tree.projects[project_idx].name.clone();
        for name in documents {
            let status = config.initial_status().to_string();
            let item = Item::new(&name, status, &project_name);
            let child_dir_name = item.child_dir_name();
            let id = match parent {
                Some(parent) => tree.insert_child(parent, item)?,
                None => tree.insert_root(project_idx, item),
            };
            if directories.iter().any(|d| d == &child_dir_name) {
                scan_dir(tree, dir.join(&child_dir_name), project_idx, Some(id), config).await?;
            }
        }
        Ok(())
    })
}

fn is_document(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e == DOCUMENT_EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn write(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.unwrap();
        }
        fs::write(path, content).await.unwrap();
    }

    async fn sample_workspace() -> (tempfile::TempDir, Workspace) {
        let dir = tempdir().unwrap();
        let ws = Workspace::create(&dir.path().join("ws")).await.unwrap();
        write(&ws.path().join("Novel/Ch1.txt"), "one").await;
        write(&ws.path().join("Novel/Ch2.txt"), "two").await;
        write(&ws.path().join("Novel/sub_Ch1/Notes.txt"), "notes").await;
        write(&ws.path().join("Novel/sub_Ch1/sub_Notes/Deep.txt"), "deep").await;
        write(&ws.path().join("Novel/ignored.md"), "not a document").await;
        write(&ws.path().join("Shorts/Flash.txt"), "flash").await;
        (dir, ws)
    }

    #[tokio::test]
    async fn scan_builds_nested_tree() {
        let (_dir, ws) = sample_workspace().await;
        let config = Config::default();
        let tree = scan(&ws, &config).await.unwrap();

        assert_eq!(tree.projects.len(), 2);
        let novel = tree.project_index("Novel").unwrap();
        let shorts = tree.project_index("Shorts").unwrap();
        assert_eq!(tree.projects[novel].roots().len(), 2);
        assert_eq!(tree.projects[shorts].roots().len(), 1);

        let notes = tree.resolve(novel, "Ch1/Notes").unwrap();
        let deep = tree.resolve(novel, "Ch1/Notes/Deep").unwrap();
        assert_eq!(tree.get(notes).unwrap().project, "Novel");
        assert!(tree.is_descendant_of(deep, notes));

        // Non-document entries are ignored.
        assert!(tree.resolve(novel, "ignored").is_none());
    }

    #[tokio::test]
    async fn scan_is_idempotent_without_disk_changes() {
        let (_dir, ws) = sample_workspace().await;
        let config = Config::default();
        let first = scan(&ws, &config).await.unwrap();
        let second = scan(&ws, &config).await.unwrap();

        assert_eq!(first.projects.len(), second.projects.len());
        for (idx, project) in first.projects.iter().enumerate() {
            assert_eq!(project.name, second.projects[idx].name);
            let a: Vec<String> = first
                .project_items(idx)
                .into_iter()
                .map(|id| first.display_path(id).unwrap())
                .collect();
            let b: Vec<String> = second
                .project_items(idx)
                .into_iter()
                .map(|id| second.display_path(id).unwrap())
                .collect();
            assert_eq!(a, b);
        }
    }

    #[tokio::test]
    async fn internal_dir_is_not_a_project() {
        let (_dir, ws) = sample_workspace().await;
        let tree = scan(&ws, &Config::default()).await.unwrap();
        assert!(tree.project_index(INTERNAL_DIR_NAME).is_none());
    }

    #[tokio::test]
    async fn children_without_matching_document_are_ignored() {
        let dir = tempdir().unwrap();
        let ws = Workspace::create(&dir.path().join("ws")).await.unwrap();
        // A stray sub_ directory whose document is gone contributes nothing.
        write(&ws.path().join("P/sub_Ghost/Orphan.txt"), "x").await;
        let tree = scan(&ws, &Config::default()).await.unwrap();
        let p = tree.project_index("P").unwrap();
        assert!(tree.projects[p].roots().is_empty());
    }
}
