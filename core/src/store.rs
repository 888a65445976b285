//! Command interface over a connected workspace.
//!
//! [`ProjectStore`] owns the [`Workspace`], the live [`ProjectTree`], and the
//! workspace [`Config`]. Consumers mutate the tree exclusively through store
//! commands; every successful command persists both snapshot tiers and
//! notifies subscribers through [`StoreEvents`], so a UI never has to poll or
//! co-own the model.
//!
//! Connecting follows the optimistic-then-authoritative flow: cached state is
//! read first (the side-car, falling back to the local cache tier), any
//! interrupted move is recovered, and a full scan plus reconcile establishes
//! ground truth.

use tokio::fs;
use tracing::{debug, info, instrument, warn};

use crate::config::{Config, StatusDefinition};
use crate::event::{Event, define_event_listeners};
use crate::session::Session;
use crate::storage::snapshot::{self, LocalCache, Snapshot};
use crate::storage::tree::{Comment, Container};
use crate::storage::{
    CHILD_DIR_PREFIX, DOCUMENT_EXTENSION, Error, Item, ItemId, Position, ProjectTree, Result,
    Workspace, reconcile, reorganize, scanner, status,
};

/// The tree structure changed (create, rename, delete, move, refresh).
#[derive(Debug, Clone, Copy)]
pub struct TreeChanged;
impl Event for TreeChanged {}

/// An item was relocated by a structural move.
#[derive(Debug, Clone)]
pub struct ItemMoved {
    pub item: ItemId,
    /// Human-readable destination, e.g. `Novel/Ch1/Notes`.
    pub path: String,
}
impl Event for ItemMoved {}

define_event_listeners!(StoreEvents {
    tree_changed: TreeChanged,
    item_moved: ItemMoved,
});

/// A connected workspace with its live tree and configuration.
#[derive(Debug)]
pub struct ProjectStore {
    workspace: Workspace,
    config: Config,
    tree: ProjectTree,
    cache: Option<LocalCache>,
    pub events: StoreEvents,
}

impl ProjectStore {
    /// Connects to a workspace: restores cached state, recovers any
    /// interrupted move, scans disk, and reconciles cached attributes onto
    /// the fresh tree. The resulting state is persisted immediately so both
    /// snapshot tiers reflect reality as of this connect.
    #[instrument(skip(workspace, cache), fields(workspace = %workspace.path().display()))]
    pub async fn connect(workspace: Workspace, cache: Option<LocalCache>) -> Result<ProjectStore> {
        // The portable side-car outranks the machine-local tier: the folder
        // may have been edited elsewhere, leaving this machine's cache stale.
        let cached = match snapshot::restore(&workspace).await? {
            Some(snapshot) => Some(snapshot),
            None => match &cache {
                Some(cache) => cache.load(workspace.id()).await?,
                None => None,
            },
        };
        let config = cached.as_ref().map(|s| s.config.clone()).unwrap_or_default();

        if let Some(recovery) = reorganize::recover_pending_move(&workspace).await? {
            info!(?recovery, "Recovered an interrupted move");
        }

        let mut tree = scanner::scan(&workspace, &config).await?;
        if let Some(cached) = &cached {
            reconcile::reconcile(&mut tree, cached);
        }

        let mut store = ProjectStore { workspace, config, tree, cache, events: StoreEvents::new() };
        store.persist().await?;
        debug!("Store connected: {} projects", store.tree.projects.len());
        Ok(store)
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tree(&self) -> &ProjectTree {
        &self.tree
    }

    /// Re-scans disk and reconciles current in-memory attributes onto the
    /// fresh tree. Picks up external edits, deletions, and renames.
    #[instrument(skip(self))]
    pub async fn refresh(&mut self) -> Result<()> {
        let snapshot = Snapshot::capture(&self.tree, &self.config);
        let mut tree = scanner::scan(&self.workspace, &self.config).await?;
        reconcile::reconcile(&mut tree, &snapshot);
        self.tree = tree;
        self.persist().await?;
        self.events.tree_changed.dispatch(&TreeChanged);
        Ok(())
    }

    /// Creates a new project directory at the workspace root.
    #[instrument(skip(self))]
    pub async fn create_project(&mut self, name: &str) -> Result<usize> {
        validate_name(name)?;
        if self.tree.project_index(name).is_some() {
            return Err(Error::DuplicateName(name.to_string()));
        }
        let dir = self.workspace.path().join(name);
        fs::create_dir(&dir).await.map_err(|e| Error::from_io(e, &dir))?;
        let idx = self.tree.add_project(name);
        self.persist().await?;
        self.events.tree_changed.dispatch(&TreeChanged);
        Ok(idx)
    }

    /// Creates an empty document. With a parent, the file lands in the
    /// parent's child directory (created on demand); without one, at the
    /// project root. `base` is the name without extension.
    #[instrument(skip(self))]
    pub async fn create_item(
        &mut self,
        project_idx: usize,
        parent: Option<ItemId>,
        base: &str,
    ) -> Result<ItemId> {
        validate_name(base)?;
        let name = format!("{base}.{DOCUMENT_EXTENSION}");
        let container = match parent {
            Some(parent) => Container::Child(parent),
            None => Container::Root(project_idx),
        };
        if self.tree.name_taken(container, &name) {
            return Err(Error::DuplicateName(name));
        }

        let dir = match parent {
            Some(parent) => {
                let parent_dir = self.tree.disk_dir(self.workspace.path(), parent)?;
                parent_dir.join(self.tree.item(parent)?.child_dir_name())
            }
            None => self.workspace.path().join(&self.tree.projects[project_idx].name),
        };
        fs::create_dir_all(&dir).await.map_err(|e| Error::from_io(e, &dir))?;
        let path = dir.join(&name);
        fs::write(&path, "").await.map_err(|e| Error::from_io(e, &path))?;

        let project_name = self.tree.projects[project_idx].name.clone();
        let item = Item::new(&name, self.config.initial_status(), &project_name);
        let id = match parent {
            Some(parent) => self.tree.insert_child(parent, item)?,
            None => self.tree.insert_root(project_idx, item),
        };
        self.persist().await?;
        self.events.tree_changed.dispatch(&TreeChanged);
        Ok(id)
    }

    /// Renames a document, carrying its child directory along so the
    /// children stay attached under the new base name.
    #[instrument(skip(self))]
    pub async fn rename_item(&mut self, id: ItemId, new_base: &str) -> Result<()> {
        validate_name(new_base)?;
        let new_name = format!("{new_base}.{DOCUMENT_EXTENSION}");
        let container = self.tree.container_of(id)?;
        if self.tree.item(id)?.name == new_name {
            return Ok(());
        }
        if self.tree.name_taken(container, &new_name) {
            return Err(Error::DuplicateName(new_name));
        }

        let dir = self.tree.disk_dir(self.workspace.path(), id)?;
        let item = self.tree.item(id)?;
        let old_path = dir.join(&item.name);
        let old_child_dir = dir.join(item.child_dir_name());
        let new_path = dir.join(&new_name);
        let new_child_dir = dir.join(format!("{CHILD_DIR_PREFIX}{new_base}"));

        fs::rename(&old_path, &new_path).await.map_err(|e| Error::from_io(e, &old_path))?;
        if fs::try_exists(&old_child_dir).await.unwrap_or(false) {
            fs::rename(&old_child_dir, &new_child_dir)
                .await
                .map_err(|e| Error::from_io(e, &old_child_dir))?;
        }

        self.tree.item_mut(id)?.name = new_name;
        self.persist().await?;
        self.events.tree_changed.dispatch(&TreeChanged);
        Ok(())
    }

    /// Deletes a document and its whole subtree, on disk and in the tree.
    #[instrument(skip(self))]
    pub async fn delete_item(&mut self, id: ItemId) -> Result<()> {
        let dir = self.tree.disk_dir(self.workspace.path(), id)?;
        let item = self.tree.item(id)?;
        let path = dir.join(&item.name);
        let child_dir = dir.join(item.child_dir_name());

        if fs::try_exists(&child_dir).await.unwrap_or(false) {
            fs::remove_dir_all(&child_dir).await.map_err(|e| Error::from_io(e, &child_dir))?;
        }
        match fs::remove_file(&path).await {
            Ok(()) => {}
            // Already gone externally; the tree still needs the removal.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Deleting item whose file was already gone: {}", path.display());
            }
            Err(e) => return Err(Error::from_io(e, &path)),
        }

        self.tree.detach(id)?;
        self.tree.free_subtree(id);
        self.persist().await?;
        self.events.tree_changed.dispatch(&TreeChanged);
        Ok(())
    }

    /// Moves `dragged` relative to `target`; see
    /// [`reorganize::move_item`] for the drop semantics.
    #[instrument(skip(self))]
    pub async fn move_item(
        &mut self,
        dragged: ItemId,
        target: ItemId,
        position: Position,
    ) -> Result<()> {
        reorganize::move_item(&self.workspace, &mut self.tree, dragged, target, position).await?;
        self.persist().await?;
        self.events.item_moved.dispatch(&ItemMoved {
            item: dragged,
            path: self.tree.display_path(dragged)?,
        });
        self.events.tree_changed.dispatch(&TreeChanged);
        Ok(())
    }

    /// Advances the item to the next status in the configured cycle and
    /// returns the new definition.
    #[instrument(skip(self))]
    pub async fn upgrade_status(&mut self, id: ItemId) -> Result<Option<StatusDefinition>> {
        let definition = status::upgrade(self.tree.item_mut(id)?, &self.config).cloned();
        self.persist().await?;
        self.events.tree_changed.dispatch(&TreeChanged);
        Ok(definition)
    }

    /// Attaches a comment to a paragraph of the item's content. The author
    /// comes from the workspace config, falling back to `"anonymous"`.
    #[instrument(skip(self, text))]
    pub async fn add_comment(&mut self, id: ItemId, paragraph: usize, text: &str) -> Result<Comment> {
        let author = self.config.author.clone().unwrap_or_else(|| "anonymous".to_string());
        let comment = Comment::new(paragraph, author, text);
        self.tree.item_mut(id)?.comments.push(comment.clone());
        self.persist().await?;
        Ok(comment)
    }

    /// Opens an editing session for a document; see [`Session`].
    pub async fn open_document(&mut self, id: ItemId) -> Result<(Session, String)> {
        Session::open(&self.workspace, &mut self.tree, id).await
    }

    /// Saves through an open session and persists the updated counters.
    pub async fn save_document(&mut self, session: &Session, body: &str) -> Result<u64> {
        let len = session.save(&mut self.tree, body).await?;
        self.persist().await?;
        Ok(len)
    }

    /// Waits for any in-flight save and closes the session.
    pub async fn close_document(&mut self, session: Session) -> Result<()> {
        session.finish(&mut self.tree).await;
        self.persist().await
    }

    /// Writes both snapshot tiers: the portable side-car and, when
    /// configured, the machine-local cache.
    pub async fn persist(&mut self) -> Result<()> {
        let snapshot = Snapshot::capture(&self.tree, &self.config);
        snapshot::persist(&self.workspace, &snapshot).await?;
        if let Some(cache) = &self.cache {
            cache.store(self.workspace.id(), &snapshot).await?;
        }
        Ok(())
    }
}

/// Valid item base names and project names: non-empty, no path separators,
/// not hidden, and not colliding with the child-directory namespace.
fn validate_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name.contains(['/', '\\'])
        || name.starts_with('.')
        || name.starts_with(CHILD_DIR_PREFIX)
    {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Listener;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    async fn fresh_store() -> (tempfile::TempDir, ProjectStore) {
        let dir = tempdir().unwrap();
        let ws = Workspace::create(&dir.path().join("ws")).await.unwrap();
        let store = ProjectStore::connect(ws, None).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn connect_on_empty_workspace_persists_a_snapshot() {
        let (_dir, store) = fresh_store().await;
        assert!(store.workspace().snapshot_path().is_file());
        assert!(store.tree().projects.is_empty());
    }

    #[tokio::test]
    async fn create_project_and_item_land_on_disk() {
        let (_dir, mut store) = fresh_store().await;
        let p = store.create_project("Novel").await.unwrap();
        let ch1 = store.create_item(p, None, "Ch1").await.unwrap();
        let notes = store.create_item(p, Some(ch1), "Notes").await.unwrap();

        let root = store.workspace().path();
        assert!(root.join("Novel/Ch1.txt").is_file());
        assert!(root.join("Novel/sub_Ch1/Notes.txt").is_file());
        assert_eq!(store.tree().get(notes).unwrap().parent(), Some(ch1));
    }

    #[tokio::test]
    async fn duplicate_and_invalid_names_are_rejected() {
        let (_dir, mut store) = fresh_store().await;
        let p = store.create_project("Novel").await.unwrap();
        store.create_item(p, None, "Ch1").await.unwrap();

        let err = store.create_item(p, None, "Ch1").await.unwrap_err();
        assert!(matches!(err, Error::DuplicateName(_)));
        let err = store.create_item(p, None, "sub_evil").await.unwrap_err();
        assert!(matches!(err, Error::InvalidName(_)));
        let err = store.create_project(".hidden").await.unwrap_err();
        assert!(matches!(err, Error::InvalidName(_)));
    }

    #[tokio::test]
    async fn rename_carries_the_child_directory() {
        let (_dir, mut store) = fresh_store().await;
        let p = store.create_project("Novel").await.unwrap();
        let ch1 = store.create_item(p, None, "Ch1").await.unwrap();
        store.create_item(p, Some(ch1), "Notes").await.unwrap();

        store.rename_item(ch1, "Chapter1").await.unwrap();

        let root = store.workspace().path();
        assert!(root.join("Novel/Chapter1.txt").is_file());
        assert!(root.join("Novel/sub_Chapter1/Notes.txt").is_file());
        assert!(!root.join("Novel/Ch1.txt").exists());
        assert_eq!(store.tree().get(ch1).unwrap().name, "Chapter1.txt");
        assert!(store.tree().resolve(p, "Chapter1/Notes").is_some());
    }

    #[tokio::test]
    async fn delete_removes_the_whole_subtree() {
        let (_dir, mut store) = fresh_store().await;
        let p = store.create_project("Novel").await.unwrap();
        let ch1 = store.create_item(p, None, "Ch1").await.unwrap();
        let notes = store.create_item(p, Some(ch1), "Notes").await.unwrap();

        store.delete_item(ch1).await.unwrap();

        let root = store.workspace().path();
        assert!(!root.join("Novel/Ch1.txt").exists());
        assert!(!root.join("Novel/sub_Ch1").exists());
        assert!(store.tree().get(ch1).is_none());
        assert!(store.tree().get(notes).is_none());
    }

    #[tokio::test]
    async fn metadata_survives_a_reconnect() {
        let dir = tempdir().unwrap();
        let ws = Workspace::create(&dir.path().join("ws")).await.unwrap();
        let mut store = ProjectStore::connect(ws, None).await.unwrap();
        let p = store.create_project("Novel").await.unwrap();
        let ch1 = store.create_item(p, None, "Ch1").await.unwrap();
        store.upgrade_status(ch1).await.unwrap();
        store.add_comment(ch1, 0, "needs work").await.unwrap();

        let ws = Workspace::open(&dir.path().join("ws")).await.unwrap();
        let store = ProjectStore::connect(ws, None).await.unwrap();
        let p = store.tree().project_index("Novel").unwrap();
        let ch1 = store.tree().resolve(p, "Ch1").unwrap();
        let item = store.tree().get(ch1).unwrap();
        assert_eq!(item.status, "review");
        assert_eq!(item.comments.len(), 1);
    }

    #[tokio::test]
    async fn local_cache_feeds_the_next_connect() {
        let dir = tempdir().unwrap();
        let cache_dir = dir.path().join("cache");
        let ws = Workspace::create(&dir.path().join("ws")).await.unwrap();
        let mut store =
            ProjectStore::connect(ws, Some(LocalCache::new(&cache_dir))).await.unwrap();
        let p = store.create_project("Novel").await.unwrap();
        let ch1 = store.create_item(p, None, "Ch1").await.unwrap();
        store.upgrade_status(ch1).await.unwrap();

        // Remove the portable side-car; the local tier alone must restore.
        tokio::fs::remove_file(store.workspace().snapshot_path()).await.unwrap();

        let ws = Workspace::open(&dir.path().join("ws")).await.unwrap();
        let store = ProjectStore::connect(ws, Some(LocalCache::new(&cache_dir))).await.unwrap();
        let p = store.tree().project_index("Novel").unwrap();
        let ch1 = store.tree().resolve(p, "Ch1").unwrap();
        assert_eq!(store.tree().get(ch1).unwrap().status, "review");
    }

    #[tokio::test]
    async fn side_car_outranks_a_stale_local_cache() {
        let dir = tempdir().unwrap();
        let cache_dir = dir.path().join("cache");
        let ws_path = dir.path().join("ws");

        // Session one, with a local cache: advance to "review".
        {
            let ws = Workspace::create(&ws_path).await.unwrap();
            let mut store =
                ProjectStore::connect(ws, Some(LocalCache::new(&cache_dir))).await.unwrap();
            let p = store.create_project("Novel").await.unwrap();
            let ch1 = store.create_item(p, None, "Ch1").await.unwrap();
            store.upgrade_status(ch1).await.unwrap();
        }

        // Session two on another machine (no local cache): advance to "final".
        {
            let ws = Workspace::open(&ws_path).await.unwrap();
            let mut store = ProjectStore::connect(ws, None).await.unwrap();
            let p = store.tree().project_index("Novel").unwrap();
            let ch1 = store.tree().resolve(p, "Ch1").unwrap();
            store.upgrade_status(ch1).await.unwrap();
        }

        // Back on the first machine: the side-car's newer state must win over
        // the stale cache entry.
        let ws = Workspace::open(&ws_path).await.unwrap();
        let store = ProjectStore::connect(ws, Some(LocalCache::new(&cache_dir))).await.unwrap();
        let p = store.tree().project_index("Novel").unwrap();
        let ch1 = store.tree().resolve(p, "Ch1").unwrap();
        assert_eq!(store.tree().get(ch1).unwrap().status, "final");
    }

    #[tokio::test]
    async fn commands_notify_subscribers() {
        let (_dir, mut store) = fresh_store().await;
        let fired = Arc::new(Mutex::new(0u32));
        let counter = fired.clone();
        let _guard = Listener::new(&store.events.tree_changed, move |_: &TreeChanged| {
            *counter.lock().unwrap() += 1;
        });

        let p = store.create_project("Novel").await.unwrap();
        store.create_item(p, None, "Ch1").await.unwrap();
        assert_eq!(*fired.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn move_notifies_with_the_new_path() {
        let (_dir, mut store) = fresh_store().await;
        let p = store.create_project("Novel").await.unwrap();
        let ch1 = store.create_item(p, None, "Ch1").await.unwrap();
        let ch2 = store.create_item(p, None, "Ch2").await.unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _guard = Listener::new(&store.events.item_moved, move |e: &ItemMoved| {
            sink.lock().unwrap().push(e.path.clone());
        });

        store.move_item(ch2, ch1, Position::After).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["Novel/Ch1/Ch2".to_string()]);
        assert!(store.workspace().path().join("Novel/sub_Ch1/Ch2.txt").is_file());
    }

    #[tokio::test]
    async fn refresh_picks_up_external_changes() {
        let (_dir, mut store) = fresh_store().await;
        let p = store.create_project("Novel").await.unwrap();
        let ch1 = store.create_item(p, None, "Ch1").await.unwrap();
        store.upgrade_status(ch1).await.unwrap();

        // An external tool drops a new document in.
        tokio::fs::write(store.workspace().path().join("Novel/Ch2.txt"), "new")
            .await
            .unwrap();
        store.refresh().await.unwrap();

        let p = store.tree().project_index("Novel").unwrap();
        assert!(store.tree().resolve(p, "Ch2").is_some());
        // Attributes of existing items survive the rescan.
        let ch1 = store.tree().resolve(p, "Ch1").unwrap();
        assert_eq!(store.tree().get(ch1).unwrap().status, "review");
    }
}
