use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::storage::{
    Error, INTERNAL_DIR_NAME, MOVE_JOURNAL_FILENAME, Result, SNAPSHOT_FILENAME,
    WORKSPACE_CONFIG_FILENAME,
};

/// Access state of the workspace handle. The handle is revocable: an external
/// actor (OS, user) can take read/write access away between sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
    /// The handle exists but access must be re-established (reconnect flow).
    Prompt,
}

/// Represents the root workspace directory containing one directory per
/// project, along with internal configuration storage.
#[derive(Debug)]
pub struct Workspace {
    // Absolute path to the workspace root
    absolute_path: PathBuf,
    internal_dir: PathBuf,
    id: Uuid,
}

impl Workspace {
    /// Returns the root path of the workspace.
    pub fn path(&self) -> &Path {
        &self.absolute_path
    }

    /// Stable identity of this workspace, used to key the fast local cache.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the path to the internal `.draftguard` directory.
    pub(crate) fn internal_dir_path(&self) -> &Path {
        &self.internal_dir
    }

    /// Path of the durable metadata side-car at the workspace root.
    pub fn snapshot_path(&self) -> PathBuf {
        self.absolute_path.join(SNAPSHOT_FILENAME)
    }

    /// Path of the write-ahead journal for in-flight structural moves.
    pub(crate) fn move_journal_path(&self) -> PathBuf {
        self.internal_dir.join(MOVE_JOURNAL_FILENAME)
    }

    /// Probes the current access state of the workspace handle.
    ///
    /// A vanished root reports [`Permission::Prompt`] (the handle is stale and
    /// must be re-established); a readable-but-not-writable root reports
    /// [`Permission::Denied`].
    pub async fn query_permission(&self) -> Permission {
        match fs::metadata(&self.absolute_path).await {
            Ok(meta) if meta.is_dir() => {
                if meta.permissions().readonly() {
                    Permission::Denied
                } else {
                    Permission::Granted
                }
            }
            Ok(_) => Permission::Denied,
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => Permission::Denied,
            Err(_) => Permission::Prompt,
        }
    }

    /// Re-establishes access. Local directories carry no interactive prompt,
    /// so this re-probes and errors unless access is granted.
    pub async fn request_permission(&self) -> Result<Permission> {
        match self.query_permission().await {
            Permission::Granted => Ok(Permission::Granted),
            _ => Err(Error::PermissionDenied(self.absolute_path.clone())),
        }
    }

    /// Opens an existing workspace directory.
    ///
    /// Checks that the directory exists and contains a valid `.draftguard`
    /// subdirectory with an identity file.
    #[instrument(skip(path), fields(path = %path.display()))]
    pub async fn open(path: &Path) -> Result<Workspace> {
        debug!("Attempting to open workspace");

        // Check if the path exists (necessary prior to canonicalization)
        let meta = fs::metadata(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(path.to_path_buf())
            } else {
                Error::from_io(e, path)
            }
        })?;

        if !meta.is_dir() {
            return Err(Error::NotADirectory(path.to_path_buf()));
        }

        let absolute_path = fs::canonicalize(path).await.map_err(Error::Io)?;
        debug!("Canonicalized workspace path: {}", absolute_path.display());

        let internal_dir = absolute_path.join(INTERNAL_DIR_NAME);
        let internal_meta = fs::metadata(&internal_dir).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotAWorkspace(absolute_path.clone())
            } else {
                Error::from_io(e, &internal_dir)
            }
        })?;

        if !internal_meta.is_dir() {
            return Err(Error::NotAWorkspace(absolute_path));
        }

        let metadata_path = internal_dir.join(WORKSPACE_CONFIG_FILENAME);
        debug!("Reading workspace identity from {}", metadata_path.display());
        let metadata = read_workspace_metadata(&metadata_path).await?;

        debug!("Workspace opened successfully");
        Ok(Workspace { absolute_path, internal_dir, id: metadata.id })
    }

    /// Creates a new workspace at the specified path.
    ///
    /// - If the path does not exist, creates the directory and the
    ///   `.draftguard` subdirectory.
    /// - If the path exists and is an empty directory, creates the
    ///   `.draftguard` subdirectory.
    /// - Fails if the path exists and is a file, is a non-empty directory,
    ///   or already contains a `.draftguard` file/directory.
    #[instrument(skip(path), fields(path = %path.display()))]
    pub async fn create(path: &Path) -> Result<Workspace> {
        debug!("Attempting to create workspace");

        let internal_dir = path.join(INTERNAL_DIR_NAME);
        let metadata = WorkspaceMetadata::new();

        match fs::metadata(path).await {
            Ok(meta) => {
                if !meta.is_dir() {
                    debug!("Workspace creation failed: path exists and is a file");
                    return Err(Error::PathIsFile(path.to_path_buf()));
                }

                if fs::metadata(&internal_dir).await.is_ok() {
                    debug!("Workspace creation failed: '.draftguard' directory already exists");
                    return Err(Error::WorkspaceCreationConflict(path.to_path_buf()));
                }

                let mut read_dir = fs::read_dir(path).await.map_err(Error::Io)?;
                if read_dir.next_entry().await.map_err(Error::Io)?.is_some() {
                    debug!("Workspace creation failed: directory is not empty");
                    return Err(Error::WorkspaceCreationConflict(path.to_path_buf()));
                }

                debug!("Path exists and is an empty directory. Creating internal directory.");
                fs::create_dir(&internal_dir).await.map_err(Error::Io)?;
                write_workspace_metadata(&internal_dir.join(WORKSPACE_CONFIG_FILENAME), &metadata)
                    .await?;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Path does not exist. Creating workspace and internal directory.");
                fs::create_dir_all(path).await.map_err(Error::Io)?;
                fs::create_dir(&internal_dir).await.map_err(Error::Io)?;
                write_workspace_metadata(&internal_dir.join(WORKSPACE_CONFIG_FILENAME), &metadata)
                    .await?;
            }
            Err(e) => {
                return Err(Error::from_io(e, path));
            }
        }
        debug!("Workspace created successfully");

        let absolute_path = fs::canonicalize(path).await.map_err(Error::Io)?;
        let internal_dir = absolute_path.join(INTERNAL_DIR_NAME);

        Ok(Workspace { absolute_path, internal_dir, id: metadata.id })
    }
}

/// Identity of a workspace, stored in `.draftguard/config.json`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub(crate) struct WorkspaceMetadata {
    /// A unique identifier for the workspace instance.
    pub(crate) id: Uuid,
    /// A version number for the identity format, useful for migrations.
    version: u32,
}

impl WorkspaceMetadata {
    pub(crate) fn new() -> Self {
        WorkspaceMetadata { id: Uuid::new_v4(), version: 1 }
    }
}

/// Helper to read and deserialize the workspace identity file.
pub(crate) async fn read_workspace_metadata(path: &Path) -> Result<WorkspaceMetadata> {
    let content = fs::read(path).await.map_err(|e| {
        warn!("Failed to read workspace config file '{}': {}", path.display(), e);
        Error::InvalidWorkspaceConfig(path.to_path_buf())
    })?;

    serde_json::from_slice(&content).map_err(|e| {
        warn!("Failed to parse workspace config file '{}': {}", path.display(), e);
        Error::InvalidWorkspaceConfig(path.to_path_buf())
    })
}

/// Helper to serialize and write the workspace identity file.
pub(crate) async fn write_workspace_metadata(
    path: &Path,
    metadata: &WorkspaceMetadata,
) -> Result<()> {
    let content = serde_json::to_string_pretty(metadata).map_err(Error::Metadata)?;
    fs::write(path, content).await.map_err(Error::Io)?;
    debug!("Workspace identity written to {}", path.display());
    Ok(())
}
