//! Structural moves (drag-and-drop reparenting).
//!
//! The physical relocation executes first; the logical tree is spliced only
//! after every disk step succeeds, so a failed move never corrupts the
//! in-memory model. The move is not atomic on disk: a crash between the copy
//! and the old-entry removal can leave duplicated bytes. To make that state
//! detectable, every move writes a journal into the internal directory
//! before touching content and deletes it after the last removal; a journal
//! that survives to the next connect is completed or rolled back by
//! [`recover_pending_move`].

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, instrument, warn};

use crate::storage::tree::Container;
use crate::storage::{
    CHILD_DIR_PREFIX, Error, ItemId, Position, ProjectTree, Result, Workspace,
};

/// Write-ahead record of an in-flight move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct MoveJournal {
    src_file: PathBuf,
    dst_file: PathBuf,
    src_child_dir: Option<PathBuf>,
    dst_child_dir: Option<PathBuf>,
}

/// What [`recover_pending_move`] did with a surviving journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// The copy had finished; the stale source entries were removed.
    Completed,
    /// The copy had not finished; the partial destination was removed.
    RolledBack,
}

/// Moves `dragged` relative to `target`.
///
/// Preconditions, checked before any disk mutation: the dragged node is not
/// the target, and the target is not a descendant of the dragged node.
///
/// Destination resolution: dropping `After` a root-level target reparents
/// the dragged item *into* the target (creating or reusing its `sub_<base>`
/// directory); any other drop inserts the item before or after the target in
/// the target's own sibling list.
#[instrument(skip(workspace, tree))]
pub async fn move_item(
    workspace: &Workspace,
    tree: &mut ProjectTree,
    dragged: ItemId,
    target: ItemId,
    position: Position,
) -> Result<()> {
    if dragged == target {
        return Err(Error::CycleDetected);
    }
    if tree.is_descendant_of(target, dragged) {
        return Err(Error::CycleDetected);
    }

    let target_container = tree.container_of(target)?;
    let source_container = tree.container_of(dragged)?;

    // Root-level drop "after" means "make it a child of the target".
    let reparent_into_target =
        matches!(target_container, Container::Root(_)) && position == Position::After;
    let dest_container = if reparent_into_target {
        Container::Child(target)
    } else {
        target_container
    };

    let name = tree.item(dragged)?.name.clone();
    if dest_container != source_container && tree.name_taken(dest_container, &name) {
        return Err(Error::DuplicateName(name));
    }

    let src_dir = tree.disk_dir(workspace.path(), dragged)?;
    let dest_dir = container_dir(workspace.path(), tree, dest_container)?;

    if src_dir != dest_dir {
        relocate_on_disk(workspace, tree, dragged, &src_dir, &dest_dir).await?;
    }

    // Disk is consistent; now splice the logical tree.
    tree.detach(dragged)?;
    let index = match dest_container {
        Container::Child(_) if reparent_into_target => {
            tree.container_children(dest_container)?.len()
        }
        _ => {
            let siblings = tree.container_children(dest_container)?;
            let target_index = siblings
                .iter()
                .position(|&id| id == target)
                .ok_or(Error::StaleItemId)?;
            match position {
                Position::Before => target_index,
                Position::After => target_index + 1,
            }
        }
    };
    tree.attach(dragged, dest_container, index)?;

    let dest_project = tree.project_of(dragged)?;
    let project_name = tree.projects[dest_project].name.clone();
    tree.relabel_project(dragged, &project_name);

    debug!("Move complete: {}", tree.display_path(dragged)?);
    Ok(())
}

/// Directory that holds the children of `container` on disk.
fn container_dir(
    workspace_root: &Path,
    tree: &ProjectTree,
    container: Container,
) -> Result<PathBuf> {
    match container {
        Container::Root(project_idx) => {
            Ok(workspace_root.join(&tree.projects[project_idx].name))
        }
        Container::Child(parent) => {
            let parent_dir = tree.disk_dir(workspace_root, parent)?;
            Ok(parent_dir.join(tree.item(parent)?.child_dir_name()))
        }
    }
}

/// Copies the dragged file (and its child directory, if any) into the
/// destination, then removes the originals. Journaled; on failure after the
/// first byte lands, the journal is left in place for recovery and
/// [`Error::PartialMove`] is surfaced.
async fn relocate_on_disk(
    workspace: &Workspace,
    tree: &ProjectTree,
    dragged: ItemId,
    src_dir: &Path,
    dest_dir: &Path,
) -> Result<()> {
    let item = tree.item(dragged)?;
    let src_file = src_dir.join(&item.name);
    let dst_file = dest_dir.join(&item.name);
    let child_dir_name = item.child_dir_name();
    let src_child_dir = src_dir.join(&child_dir_name);
    let has_child_dir = fs::try_exists(&src_child_dir).await.unwrap_or(false);

    let journal = MoveJournal {
        src_file: src_file.clone(),
        dst_file: dst_file.clone(),
        src_child_dir: has_child_dir.then(|| src_child_dir.clone()),
        dst_child_dir: has_child_dir.then(|| dest_dir.join(&child_dir_name)),
    };

    fs::create_dir_all(dest_dir).await.map_err(|e| Error::from_io(e, dest_dir))?;
    write_journal(workspace, &journal).await?;

    // First copy: nothing has landed yet, so a failure here is clean.
    if let Err(e) = fs::copy(&src_file, &dst_file).await {
        clear_journal(workspace).await.ok();
        return Err(Error::from_io(e, &src_file));
    }

    let outcome: std::io::Result<()> = async {
        if has_child_dir {
            copy_dir_recursive(&src_child_dir, &dest_dir.join(&child_dir_name)).await?;
            fs::remove_dir_all(&src_child_dir).await?;
        }
        fs::remove_file(&src_file).await?;
        remove_dir_if_empty_child_dir(src_dir).await;
        Ok(())
    }
    .await;

    match outcome {
        Ok(()) => {
            clear_journal(workspace).await?;
            Ok(())
        }
        Err(e) => {
            // Duplicated bytes may exist on disk; the journal stays behind so
            // the next connect can finish or undo the move.
            warn!("Physical move failed partway: {}", e);
            Err(Error::PartialMove(e))
        }
    }
}

/// Removes `dir` if it is a `sub_` child directory that just lost its last
/// entry, so empty child directories do not linger after a move.
async fn remove_dir_if_empty_child_dir(dir: &Path) {
    let is_child_dir = dir
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(CHILD_DIR_PREFIX));
    if !is_child_dir {
        return;
    }
    let empty = match fs::read_dir(dir).await {
        Ok(mut rd) => matches!(rd.next_entry().await, Ok(None)),
        Err(_) => false,
    };
    if empty {
        fs::remove_dir(dir).await.ok();
    }
}

fn copy_dir_recursive<'a>(
    src: &'a Path,
    dst: &'a Path,
) -> Pin<Box<dyn Future<Output = std::io::Result<()>> + Send + 'a>> {
    Box::pin(async move {
        fs::create_dir_all(dst).await?;
        let mut read_dir = fs::read_dir(src).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            let file_type = entry.file_type().await?;
            let to = dst.join(entry.file_name());
            if file_type.is_dir() {
                copy_dir_recursive(&entry.path(), &to).await?;
            } else {
                fs::copy(entry.path(), &to).await?;
            }
        }
        Ok(())
    })
}

async fn write_journal(workspace: &Workspace, journal: &MoveJournal) -> Result<()> {
    let path = workspace.move_journal_path();
    let content = serde_json::to_string_pretty(journal).map_err(Error::Metadata)?;
    fs::write(&path, content).await.map_err(|e| Error::from_io(e, &path))?;
    Ok(())
}

async fn clear_journal(workspace: &Workspace) -> Result<()> {
    let path = workspace.move_journal_path();
    match fs::remove_file(&path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::from_io(e, &path)),
    }
}

/// Inspects the move journal left by a crashed or failed move and makes the
/// disk consistent again: if the destination copy completed, the stale
/// source entries are removed; otherwise the partial destination is removed.
/// Runs before every scan on connect.
#[instrument(skip(workspace))]
pub async fn recover_pending_move(workspace: &Workspace) -> Result<Option<Recovery>> {
    let path = workspace.move_journal_path();
    let content = match fs::read(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::from_io(e, &path)),
    };
    let journal: MoveJournal = match serde_json::from_slice(&content) {
        Ok(journal) => journal,
        Err(e) => {
            warn!("Malformed move journal discarded: {}", e);
            clear_journal(workspace).await?;
            return Ok(None);
        }
    };

    let dst_exists = fs::try_exists(&journal.dst_file).await.unwrap_or(false);
    let recovery = if dst_exists {
        debug!("Completing interrupted move to {}", journal.dst_file.display());
        if let (Some(src_child), Some(dst_child)) = (&journal.src_child_dir, &journal.dst_child_dir)
        {
            if fs::try_exists(src_child).await.unwrap_or(false) {
                // Idempotent re-copy covers a child dir that was half done.
                copy_dir_recursive(src_child, dst_child)
                    .await
                    .map_err(Error::PartialMove)?;
                fs::remove_dir_all(src_child).await.map_err(Error::PartialMove)?;
            }
        }
        match fs::remove_file(&journal.src_file).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::PartialMove(e)),
        }
        if let Some(parent) = journal.src_file.parent() {
            remove_dir_if_empty_child_dir(parent).await;
        }
        Recovery::Completed
    } else {
        debug!("Rolling back interrupted move to {}", journal.dst_file.display());
        if let Some(dst_child) = &journal.dst_child_dir {
            if fs::try_exists(dst_child).await.unwrap_or(false) {
                fs::remove_dir_all(dst_child).await.map_err(Error::PartialMove)?;
            }
        }
        Recovery::RolledBack
    };

    clear_journal(workspace).await?;
    Ok(Some(recovery))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::storage::scanner;
    use tempfile::tempdir;

    async fn write(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.unwrap();
        }
        fs::write(path, content).await.unwrap();
    }

    async fn novel_workspace() -> (tempfile::TempDir, Workspace, ProjectTree) {
        let dir = tempdir().unwrap();
        let ws = Workspace::create(&dir.path().join("ws")).await.unwrap();
        write(&ws.path().join("Novel/Ch1.txt"), "chapter one").await;
        write(&ws.path().join("Novel/Ch2.txt"), "chapter two").await;
        write(&ws.path().join("Novel/sub_Ch1/Notes.txt"), "notes").await;
        let tree = scanner::scan(&ws, &Config::default()).await.unwrap();
        (dir, ws, tree)
    }

    #[tokio::test]
    async fn move_child_to_root_removes_emptied_child_dir() {
        let (_dir, ws, mut tree) = novel_workspace().await;
        let p = tree.project_index("Novel").unwrap();
        let notes = tree.resolve(p, "Ch1/Notes").unwrap();
        let ch2 = tree.resolve(p, "Ch2").unwrap();

        move_item(&ws, &mut tree, notes, ch2, Position::Before).await.unwrap();

        assert_eq!(tree.projects[p].roots().len(), 3);
        assert_eq!(tree.get(notes).unwrap().parent(), None);
        assert!(ws.path().join("Novel/Notes.txt").is_file());
        assert!(
            !ws.path().join("Novel/sub_Ch1").exists(),
            "emptied sub_Ch1 must not linger"
        );
        // Notes sits before Ch2 in the root order.
        let order: Vec<String> = tree.projects[p]
            .roots()
            .iter()
            .map(|&id| tree.get(id).unwrap().name.clone())
            .collect();
        assert_eq!(order, ["Ch1.txt", "Notes.txt", "Ch2.txt"]);
    }

    #[tokio::test]
    async fn root_level_drop_after_reparents_into_target() {
        let (_dir, ws, mut tree) = novel_workspace().await;
        let p = tree.project_index("Novel").unwrap();
        let ch1 = tree.resolve(p, "Ch1").unwrap();
        let ch2 = tree.resolve(p, "Ch2").unwrap();

        move_item(&ws, &mut tree, ch2, ch1, Position::After).await.unwrap();

        assert_eq!(tree.get(ch2).unwrap().parent(), Some(ch1));
        assert!(ws.path().join("Novel/sub_Ch1/Ch2.txt").is_file());
        assert!(!ws.path().join("Novel/Ch2.txt").exists());
    }

    #[tokio::test]
    async fn moving_subtree_carries_child_directory() {
        let (_dir, ws, mut tree) = novel_workspace().await;
        let p = tree.project_index("Novel").unwrap();
        let ch1 = tree.resolve(p, "Ch1").unwrap();
        let ch2 = tree.resolve(p, "Ch2").unwrap();

        // Ch1 (with its Notes child) becomes a child of Ch2.
        move_item(&ws, &mut tree, ch1, ch2, Position::After).await.unwrap();

        assert!(ws.path().join("Novel/sub_Ch2/Ch1.txt").is_file());
        assert!(ws.path().join("Novel/sub_Ch2/sub_Ch1/Notes.txt").is_file());
        assert!(!ws.path().join("Novel/Ch1.txt").exists());
        assert!(!ws.path().join("Novel/sub_Ch1").exists());
        let notes = tree.resolve(p, "Ch2/Ch1/Notes").unwrap();
        assert_eq!(tree.get(notes).unwrap().project, "Novel");
    }

    #[tokio::test]
    async fn descendant_target_is_rejected_without_mutation() {
        let (_dir, ws, mut tree) = novel_workspace().await;
        let p = tree.project_index("Novel").unwrap();
        let ch1 = tree.resolve(p, "Ch1").unwrap();
        let notes = tree.resolve(p, "Ch1/Notes").unwrap();

        let err = move_item(&ws, &mut tree, ch1, notes, Position::Before).await.unwrap_err();
        assert!(matches!(err, Error::CycleDetected));

        // Neither tree nor disk changed.
        assert_eq!(tree.get(notes).unwrap().parent(), Some(ch1));
        assert!(ws.path().join("Novel/Ch1.txt").is_file());
        assert!(ws.path().join("Novel/sub_Ch1/Notes.txt").is_file());
        assert!(!fs::try_exists(&ws.move_journal_path()).await.unwrap());
    }

    #[tokio::test]
    async fn self_target_is_rejected() {
        let (_dir, ws, mut tree) = novel_workspace().await;
        let p = tree.project_index("Novel").unwrap();
        let ch1 = tree.resolve(p, "Ch1").unwrap();
        let err = move_item(&ws, &mut tree, ch1, ch1, Position::After).await.unwrap_err();
        assert!(matches!(err, Error::CycleDetected));
    }

    #[tokio::test]
    async fn duplicate_name_in_destination_is_rejected() {
        let (_dir, ws, _stale) = novel_workspace().await;
        write(&ws.path().join("Novel/sub_Ch2/Notes.txt"), "other notes").await;
        let mut tree = scanner::scan(&ws, &Config::default()).await.unwrap();
        let p = tree.project_index("Novel").unwrap();
        let notes = tree.resolve(p, "Ch1/Notes").unwrap();
        let ch2 = tree.resolve(p, "Ch2").unwrap();

        let err = move_item(&ws, &mut tree, notes, ch2, Position::After).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateName(_)));
    }

    #[tokio::test]
    async fn same_container_reorder_touches_no_files() {
        let (_dir, ws, mut tree) = novel_workspace().await;
        let p = tree.project_index("Novel").unwrap();
        let ch1 = tree.resolve(p, "Ch1").unwrap();
        let ch2 = tree.resolve(p, "Ch2").unwrap();

        move_item(&ws, &mut tree, ch2, ch1, Position::Before).await.unwrap();
        let order: Vec<String> = tree.projects[p]
            .roots()
            .iter()
            .map(|&id| tree.get(id).unwrap().name.clone())
            .collect();
        assert_eq!(order, ["Ch2.txt", "Ch1.txt"]);
        assert!(ws.path().join("Novel/Ch1.txt").is_file());
        assert!(ws.path().join("Novel/Ch2.txt").is_file());
    }

    #[tokio::test]
    async fn recovery_completes_a_copied_move() {
        let (_dir, ws, _tree) = novel_workspace().await;
        // Simulate a crash after the copy but before the removals.
        let journal = MoveJournal {
            src_file: ws.path().join("Novel/sub_Ch1/Notes.txt"),
            dst_file: ws.path().join("Novel/Notes.txt"),
            src_child_dir: None,
            dst_child_dir: None,
        };
        write(&journal.dst_file, "notes").await;
        write_journal(&ws, &journal).await.unwrap();

        let recovery = recover_pending_move(&ws).await.unwrap();
        assert_eq!(recovery, Some(Recovery::Completed));
        assert!(ws.path().join("Novel/Notes.txt").is_file());
        assert!(!ws.path().join("Novel/sub_Ch1").exists());
        assert!(!fs::try_exists(&ws.move_journal_path()).await.unwrap());
    }

    #[tokio::test]
    async fn recovery_rolls_back_an_uncopied_move() {
        let (_dir, ws, _tree) = novel_workspace().await;
        // Crash before the file copy landed; a partial child dir exists.
        let journal = MoveJournal {
            src_file: ws.path().join("Novel/Ch1.txt"),
            dst_file: ws.path().join("Novel/sub_Ch2/Ch1.txt"),
            src_child_dir: Some(ws.path().join("Novel/sub_Ch1")),
            dst_child_dir: Some(ws.path().join("Novel/sub_Ch2/sub_Ch1")),
        };
        write(&ws.path().join("Novel/sub_Ch2/sub_Ch1/Notes.txt"), "partial").await;
        write_journal(&ws, &journal).await.unwrap();

        let recovery = recover_pending_move(&ws).await.unwrap();
        assert_eq!(recovery, Some(Recovery::RolledBack));
        assert!(ws.path().join("Novel/Ch1.txt").is_file(), "source untouched");
        assert!(ws.path().join("Novel/sub_Ch1/Notes.txt").is_file());
        assert!(!ws.path().join("Novel/sub_Ch2/sub_Ch1").exists());
    }

    #[tokio::test]
    async fn no_journal_means_no_recovery() {
        let (_dir, ws, _tree) = novel_workspace().await;
        assert_eq!(recover_pending_move(&ws).await.unwrap(), None);
    }
}
