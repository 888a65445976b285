//! An editing session for one open document.
//!
//! Opening a document captures its session start length (the baseline for
//! delta-style progress counting) and prunes comments whose anchor paragraph
//! no longer exists. Saves are serialized through a gate: a save requested
//! while another is still writing fails fast with
//! [`Error::SaveInFlight`] instead of queueing, so a slow disk cannot pile
//! up stale writes. Switching documents calls [`Session::finish`], which
//! waits for any in-flight save before the next document opens.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::storage::document::{self, DocumentContent, DocumentHeader};
use crate::storage::{Error, ItemId, ProjectTree, Result, Workspace};

/// One open document. Methods take the tree separately so the session can be
/// shared (e.g. with an autosave task) while the tree stays exclusively
/// owned by the store.
#[derive(Debug)]
pub struct Session {
    item: ItemId,
    path: PathBuf,
    /// Header of the file as read, re-inserted verbatim on every save.
    header: Option<DocumentHeader>,
    gate: Arc<Mutex<()>>,
}

impl Session {
    /// Opens the document backing `item` and returns the session together
    /// with the current body text.
    #[instrument(skip(workspace, tree))]
    pub async fn open(
        workspace: &Workspace,
        tree: &mut ProjectTree,
        item: ItemId,
    ) -> Result<(Session, String)> {
        let path = tree.disk_path(workspace.path(), item)?;
        let content = document::read(&path).await?;
        let paragraphs = content.paragraph_count();
        let len = content.body.chars().count() as u64;

        let node = tree.item_mut(item)?;
        node.session_start_len = Some(len);
        node.last_char_count = len;
        node.prune_orphaned_comments(paragraphs);
        node.open = true;
        debug!(path = %path.display(), len, "Document opened");

        let session = Session {
            item,
            path,
            header: content.header.clone(),
            gate: Arc::new(Mutex::new(())),
        };
        Ok((session, content.body))
    }

    pub fn item(&self) -> ItemId {
        self.item
    }

    /// Writes `body` to disk and folds the length delta into the item's edit
    /// history. Fails with [`Error::SaveInFlight`] if a previous save has not
    /// finished yet.
    #[instrument(skip(self, tree, body))]
    pub async fn save(&self, tree: &mut ProjectTree, body: &str) -> Result<u64> {
        let _guard = self.gate.try_lock().map_err(|_| Error::SaveInFlight)?;

        let new_len = body.chars().count() as u64;
        let content = DocumentContent {
            header: self.header.clone(),
            body: body.to_string(),
        };
        document::write(&self.path, &content).await?;

        let node = tree.item_mut(self.item)?;
        let old_len = node.last_char_count;
        if new_len >= old_len {
            node.history.added += new_len - old_len;
            node.history.edited += new_len - old_len;
        } else {
            node.history.removed += old_len - new_len;
            node.history.edited += old_len - new_len;
        }
        node.last_char_count = new_len;
        node.last_updated = Some(Utc::now());
        node.prune_orphaned_comments(content.paragraph_count());
        debug!(len = new_len, "Document saved");
        Ok(new_len)
    }

    /// Waits for any in-flight save, then marks the item closed. Called when
    /// the user switches to another document.
    pub async fn finish(self, tree: &mut ProjectTree) {
        let _guard = self.gate.lock().await;
        if let Some(node) = tree.get_mut(self.item) {
            node.open = false;
            node.session_start_len = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::storage::scanner;
    use crate::storage::tree::Comment;
    use tempfile::tempdir;
    use tokio::fs;

    async fn one_doc_workspace(body: &str) -> (tempfile::TempDir, Workspace, ProjectTree, ItemId) {
        let dir = tempdir().unwrap();
        let ws = Workspace::create(&dir.path().join("ws")).await.unwrap();
        fs::create_dir_all(ws.path().join("Novel")).await.unwrap();
        fs::write(ws.path().join("Novel/Ch1.txt"), body).await.unwrap();
        let tree = scanner::scan(&ws, &Config::default()).await.unwrap();
        let p = tree.project_index("Novel").unwrap();
        let id = tree.resolve(p, "Ch1").unwrap();
        (dir, ws, tree, id)
    }

    #[tokio::test]
    async fn open_captures_session_start_length() {
        let (_dir, ws, mut tree, id) = one_doc_workspace("hello world").await;
        let (_session, body) = Session::open(&ws, &mut tree, id).await.unwrap();
        assert_eq!(body, "hello world");
        let item = tree.get(id).unwrap();
        assert_eq!(item.session_start_len, Some(11));
        assert_eq!(item.last_char_count, 11);
        assert!(item.open);
    }

    #[tokio::test]
    async fn open_prunes_orphaned_comments() {
        let (_dir, ws, mut tree, id) = one_doc_workspace("one\n\ntwo").await;
        let item = tree.get_mut(id).unwrap();
        item.comments.push(Comment::new(1, "ana", "keep"));
        item.comments.push(Comment::new(7, "ana", "orphaned"));

        Session::open(&ws, &mut tree, id).await.unwrap();
        let comments = &tree.get(id).unwrap().comments;
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].text, "keep");
    }

    #[tokio::test]
    async fn save_accumulates_edit_history() {
        let (_dir, ws, mut tree, id) = one_doc_workspace("12345").await;
        let (session, _) = Session::open(&ws, &mut tree, id).await.unwrap();

        session.save(&mut tree, "1234567890").await.unwrap();
        session.save(&mut tree, "123").await.unwrap();

        let item = tree.get(id).unwrap();
        assert_eq!(item.history.added, 5);
        assert_eq!(item.history.removed, 7);
        assert_eq!(item.history.edited, 12);
        assert_eq!(item.last_char_count, 3);
        assert!(item.last_updated.is_some());
        assert_eq!(
            fs::read_to_string(ws.path().join("Novel/Ch1.txt")).await.unwrap(),
            "123"
        );
    }

    #[tokio::test]
    async fn save_preserves_the_header() {
        let (_dir, ws, mut tree, id) =
            one_doc_workspace("<!-- draftguard: {\"v\":1} -->\noriginal").await;
        let (session, body) = Session::open(&ws, &mut tree, id).await.unwrap();
        assert_eq!(body, "original");

        session.save(&mut tree, "rewritten").await.unwrap();
        assert_eq!(
            fs::read_to_string(ws.path().join("Novel/Ch1.txt")).await.unwrap(),
            "<!-- draftguard: {\"v\":1} -->\nrewritten"
        );
    }

    #[tokio::test]
    async fn concurrent_save_fails_fast() {
        let (_dir, ws, mut tree, id) = one_doc_workspace("text").await;
        let (session, _) = Session::open(&ws, &mut tree, id).await.unwrap();

        // Hold the gate as an in-flight save would.
        let gate = session.gate.clone();
        let guard = gate.lock().await;
        let err = session.save(&mut tree, "blocked").await.unwrap_err();
        assert!(matches!(err, Error::SaveInFlight));
        drop(guard);

        session.save(&mut tree, "unblocked").await.unwrap();
    }

    #[tokio::test]
    async fn finish_clears_session_state() {
        let (_dir, ws, mut tree, id) = one_doc_workspace("text").await;
        let (session, _) = Session::open(&ws, &mut tree, id).await.unwrap();
        session.finish(&mut tree).await;
        let item = tree.get(id).unwrap();
        assert!(!item.open);
        assert_eq!(item.session_start_len, None);
    }
}
