//! Durable persistence of per-item attributes that cannot be derived from
//! file content alone.
//!
//! Two tiers share one serialized shape:
//!
//! * the side-car [`SNAPSHOT_FILENAME`](crate::storage::SNAPSHOT_FILENAME)
//!   at the workspace root, so metadata travels with the folder;
//! * a [`LocalCache`] file keyed by workspace id in a machine-local
//!   directory, read back before any disk scan for optimistic restore.
//!
//! A snapshot is a hint: it pre-seeds attributes, but a full scan plus
//! reconcile always establishes ground truth for what exists. Malformed
//! snapshots are treated as a cache miss, never as a fatal error.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::storage::tree::{Comment, EditHistory};
use crate::storage::{Error, Item, ItemId, ProjectTree, Result, Workspace};

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 2;

/// Recursively serialized item attributes. Transient fields (session start
/// length, arena ids) are deliberately absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub name: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<u64>,
    #[serde(default)]
    pub last_char_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub open: bool,
    #[serde(default)]
    pub history: EditHistory,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<Comment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<ItemSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    pub name: String,
    #[serde(default)]
    pub open: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<ItemSnapshot>,
}

/// The complete durable state: format version, timestamp, portable config,
/// and the recursively serialized project tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub last_updated: DateTime<Utc>,
    pub config: Config,
    #[serde(default)]
    pub projects: Vec<ProjectSnapshot>,
}

impl Snapshot {
    /// Captures the current tree and config.
    pub fn capture(tree: &ProjectTree, config: &Config) -> Self {
        Snapshot {
            version: SNAPSHOT_VERSION,
            last_updated: Utc::now(),
            config: config.clone(),
            projects: tree
                .projects
                .iter()
                .map(|project| ProjectSnapshot {
                    name: project.name.clone(),
                    open: project.open,
                    items: project.roots().iter().map(|&id| item_snapshot(tree, id)).collect(),
                })
                .collect(),
        }
    }

    /// Rebuilds a tree from cached state, used to paint consumers before the
    /// first scan completes. Existence claims in here are provisional.
    pub fn to_tree(&self) -> ProjectTree {
        let mut tree = ProjectTree::new();
        for project in &self.projects {
            let idx = tree.add_project(&project.name);
            tree.projects[idx].open = project.open;
            for item in &project.items {
                restore_item(&mut tree, idx, None, item, &project.name);
            }
        }
        tree
    }
}

fn item_snapshot(tree: &ProjectTree, id: ItemId) -> ItemSnapshot {
    let item = tree.get(id).expect("tree ids are live during capture");
    ItemSnapshot {
        name: item.name.clone(),
        status: item.status.clone(),
        goal: item.goal,
        last_char_count: item.last_char_count,
        last_updated: item.last_updated,
        open: item.open,
        history: item.history,
        comments: item.comments.clone(),
        items: item.children().iter().map(|&child| item_snapshot(tree, child)).collect(),
    }
}

fn restore_item(
    tree: &mut ProjectTree,
    project_idx: usize,
    parent: Option<ItemId>,
    snapshot: &ItemSnapshot,
    project_name: &str,
) {
    let mut item = Item::new(&snapshot.name, &snapshot.status, project_name);
    item.goal = snapshot.goal;
    item.last_char_count = snapshot.last_char_count;
    item.last_updated = snapshot.last_updated;
    item.open = snapshot.open;
    item.history = snapshot.history;
    item.comments = snapshot.comments.clone();
    let id = match parent {
        Some(parent) => tree.insert_child(parent, item).expect("parent is live"),
        None => tree.insert_root(project_idx, item),
    };
    for child in &snapshot.items {
        restore_item(tree, project_idx, Some(id), child, project_name);
    }
}

/// Writes the durable side-car into the workspace root.
#[instrument(skip(workspace, snapshot))]
pub async fn persist(workspace: &Workspace, snapshot: &Snapshot) -> Result<()> {
    let path = workspace.snapshot_path();
    let content = serde_json::to_string_pretty(snapshot).map_err(Error::Metadata)?;
    fs::write(&path, content).await.map_err(|e| Error::from_io(e, &path))?;
    debug!("Snapshot persisted to {}", path.display());
    Ok(())
}

/// Reads the durable side-car. Absence and malformed content both yield
/// `None`; the latter is logged.
#[instrument(skip(workspace))]
pub async fn restore(workspace: &Workspace) -> Result<Option<Snapshot>> {
    read_snapshot_file(&workspace.snapshot_path()).await
}

async fn read_snapshot_file(path: &Path) -> Result<Option<Snapshot>> {
    let content = match fs::read(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No snapshot at {}", path.display());
            return Ok(None);
        }
        Err(e) => return Err(Error::from_io(e, path)),
    };
    match serde_json::from_slice(&content) {
        Ok(snapshot) => Ok(Some(snapshot)),
        Err(e) => {
            // Corrupt cache is a miss, never fatal to scanning.
            warn!("Malformed snapshot '{}' treated as missing: {}", path.display(), e);
            Ok(None)
        }
    }
}

/// Machine-local cache tier. One file per workspace id; not portable, read
/// back instantly on the next connect before any scan.
#[derive(Debug, Clone)]
pub struct LocalCache {
    dir: PathBuf,
}

impl LocalCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        LocalCache { dir: dir.into() }
    }

    fn entry_path(&self, workspace_id: Uuid) -> PathBuf {
        self.dir.join(format!("{workspace_id}.json"))
    }

    /// Updated eagerly on every structural or metadata change.
    pub async fn store(&self, workspace_id: Uuid, snapshot: &Snapshot) -> Result<()> {
        fs::create_dir_all(&self.dir).await.map_err(Error::Io)?;
        let path = self.entry_path(workspace_id);
        let content = serde_json::to_string(snapshot).map_err(Error::Metadata)?;
        fs::write(&path, content).await.map_err(|e| Error::from_io(e, &path))?;
        Ok(())
    }

    pub async fn load(&self, workspace_id: Uuid) -> Result<Option<Snapshot>> {
        read_snapshot_file(&self.entry_path(workspace_id)).await
    }
}
