//! Provides filesystem storage abstractions for the project tree
//! synchronization engine.
//!
//! This module defines the core structures and logic for interacting with the
//! application's data model on disk. It establishes conventions for how
//! workspaces, projects, and nested documents are represented in the file
//! system, and for how per-item metadata that cannot be derived from file
//! content survives across sessions.
//!
//! # Core Concepts
//!
//! *   **[`Workspace`]:** The root container for all managed data. A workspace
//!     corresponds to a directory on the filesystem. It contains one directory
//!     per project plus a special `.draftguard` subdirectory for internal
//!     configuration (identity, move journal). Users typically start by
//!     [`Workspace::create`]ing or [`Workspace::open`]ing a workspace.
//! *   **Projects and items:** Each directory at the workspace root is a
//!     project. Inside a project, every file with the `.txt` extension is an
//!     item (a document node). An item's children live in a sibling directory
//!     named `sub_<base>`, where `<base>` is the item's file name without the
//!     extension. That directory is the *only* addressing mechanism for the
//!     parent/child relationship; no back-reference is persisted on disk.
//! *   **[`ProjectTree`]:** The in-memory model. Nodes are held in a
//!     generational arena and addressed by stable [`ItemId`]s; parent links
//!     are explicit and on-disk paths are resolved lazily by walking them.
//!     The `sub_<base>` convention is an on-disk compatibility detail, never
//!     the model's source of truth.
//! *   **Snapshots:** Attributes such as status, goal, and comments are
//!     persisted in a JSON side-car at the workspace root (portable) and in a
//!     fast local cache (per machine). See [`snapshot`].
//!
//! # Synchronization flow
//!
//! On connect, the cached snapshot pre-seeds the tree optimistically, then a
//! full scan ([`scanner`]) establishes ground truth for *existence* and the
//! reconciler ([`reconcile`]) overlays cached *attributes* by name, with a
//! narrow single-pair rename heuristic. Structural moves ([`reorganize`])
//! relocate bytes on disk first, under a write-ahead journal, and mutate the
//! logical tree only on success.
//!
//! # Asynchronous API
//!
//! All filesystem I/O operations within this module are `async` and rely on
//! the `tokio` runtime. Methods that perform I/O return `Result<T, Error>`,
//! where [`Error`] encapsulates I/O failures, permission problems, malformed
//! caches, and partial-move states.

pub use self::tree::{Item, ItemId, Position, Project, ProjectTree};
pub use self::workspace::{Permission, Workspace};

pub mod document;
pub mod reconcile;
pub mod reorganize;
pub mod scanner;
pub mod snapshot;
pub mod status;
pub mod tree;
mod workspace;

use std::path::PathBuf;
use thiserror::Error;

/// File extension identifying document items.
pub const DOCUMENT_EXTENSION: &str = "txt";
/// Prefix of the sibling directory holding an item's children.
pub const CHILD_DIR_PREFIX: &str = "sub_";
/// Internal per-workspace directory (identity, move journal).
pub const INTERNAL_DIR_NAME: &str = ".draftguard";
/// Workspace identity file inside the internal directory.
pub const WORKSPACE_CONFIG_FILENAME: &str = "config.json";
/// Durable metadata side-car at the workspace root.
pub const SNAPSHOT_FILENAME: &str = "draftguard_metadata.json";
/// Write-ahead journal for in-flight structural moves.
pub const MOVE_JOURNAL_FILENAME: &str = "move_journal.json";

#[derive(Debug, Error)]
pub enum Error {
    #[error("Permission to access the workspace was denied or revoked: {0}")]
    PermissionDenied(PathBuf),

    #[error("Entry not found (moved or deleted externally): {0}")]
    NotFound(PathBuf),

    #[error("A save operation is already in flight for this document")]
    SaveInFlight,

    #[error("Stale item id: the node no longer exists in the tree")]
    StaleItemId,

    #[error("Physical move failed after partial disk writes; tree left unchanged")]
    PartialMove(#[source] std::io::Error),

    #[error("An entry named '{0}' already exists in the destination")]
    DuplicateName(String),

    #[error("Cannot move an item onto itself or into its own descendant")]
    CycleDetected,

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Path is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Path is not a valid workspace (missing '.draftguard' subdirectory): {0}")]
    NotAWorkspace(PathBuf),

    #[error("Cannot create workspace: path exists and is not an empty directory: {0}")]
    WorkspaceCreationConflict(PathBuf),

    #[error("Cannot create workspace: path exists and is a file: {0}")]
    PathIsFile(PathBuf),

    #[error("Workspace configuration file is missing or invalid: {0}")]
    InvalidWorkspaceConfig(PathBuf),

    #[error("Metadata serialization/deserialization error")]
    Metadata(#[from] serde_json::Error),

    #[error("IO error")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Maps an I/O error on `path` to the storage taxonomy, so callers can
    /// distinguish a revoked handle from a vanished entry.
    pub(crate) fn from_io(e: std::io::Error, path: &std::path::Path) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Error::PermissionDenied(path.to_path_buf()),
            _ => Error::Io(e),
        }
    }
}

// Define a standard Result type for the library
pub type Result<T> = std::result::Result<T, Error>;
