//! In-memory hierarchical model of projects and document items.
//!
//! Nodes live in a generational arena and are addressed by opaque, stable
//! [`ItemId`]s. Parent/child relationships are explicit links; index-based
//! paths are never persisted or cached across structural mutation. A stale id
//! (slot freed or reused) simply resolves to `None`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::storage::{CHILD_DIR_PREFIX, DOCUMENT_EXTENSION, Error, Result};

/// Stable opaque identifier for a node in a [`ProjectTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemId {
    index: u32,
    generation: u32,
}

/// Insertion side relative to a drop target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Before,
    After,
}

/// Session edit counters. `edited` accumulates the absolute value of every
/// length delta and never resets on save.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditHistory {
    pub added: u64,
    pub removed: u64,
    pub edited: u64,
}

/// A comment anchored to a paragraph of its item's content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    /// Zero-based paragraph index the comment is anchored to.
    pub paragraph: usize,
    pub author: String,
    pub text: String,
    pub posted_at: DateTime<Utc>,
}

impl Comment {
    pub fn new(paragraph: usize, author: impl Into<String>, text: impl Into<String>) -> Self {
        Comment {
            id: Uuid::new_v4(),
            paragraph,
            author: author.into(),
            text: text.into(),
            posted_at: Utc::now(),
        }
    }
}

/// A document node. Its physical file is `<dir>/<name>` and its children live
/// in the sibling directory `sub_<base>` inside the same `<dir>`.
#[derive(Debug, Clone)]
pub struct Item {
    /// File name including the `.txt` extension.
    pub name: String,
    /// Status definition id (see [`crate::config::StatusDefinition`]).
    pub status: String,
    /// Per-item character target. `None` until a status assignment supplies
    /// the definition's default.
    pub goal: Option<u64>,
    pub last_char_count: u64,
    /// Content length captured when the document was opened this session.
    /// Transient; never serialized.
    pub session_start_len: Option<u64>,
    pub history: EditHistory,
    pub comments: Vec<Comment>,
    pub last_updated: Option<DateTime<Utc>>,
    /// Sidebar accordion flag.
    pub open: bool,
    /// Denormalized owning project name, relabeled when a subtree moves.
    pub project: String,
    pub(crate) parent: Option<ItemId>,
    pub(crate) children: Vec<ItemId>,
}

impl Item {
    pub fn new(name: impl Into<String>, status: impl Into<String>, project: impl Into<String>) -> Self {
        Item {
            name: name.into(),
            status: status.into(),
            goal: None,
            last_char_count: 0,
            session_start_len: None,
            history: EditHistory::default(),
            comments: Vec::new(),
            last_updated: None,
            open: false,
            project: project.into(),
            parent: None,
            children: Vec::new(),
        }
    }

    /// File name without the document extension.
    pub fn base(&self) -> &str {
        self.name
            .strip_suffix(&format!(".{}", DOCUMENT_EXTENSION))
            .unwrap_or(&self.name)
    }

    /// Name of the sibling directory holding this item's children.
    pub fn child_dir_name(&self) -> String {
        format!("{}{}", CHILD_DIR_PREFIX, self.base())
    }

    pub fn parent(&self) -> Option<ItemId> {
        self.parent
    }

    pub fn children(&self) -> &[ItemId] {
        &self.children
    }

    /// Drops comments whose anchor paragraph no longer exists.
    pub fn prune_orphaned_comments(&mut self, paragraph_count: usize) {
        self.comments.retain(|c| c.paragraph < paragraph_count);
    }
}

/// A top-level directory in the workspace, owning an ordered list of root items.
#[derive(Debug, Clone)]
pub struct Project {
    pub name: String,
    pub open: bool,
    pub(crate) roots: Vec<ItemId>,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Project { name: name.into(), open: true, roots: Vec::new() }
    }

    pub fn roots(&self) -> &[ItemId] {
        &self.roots
    }
}

/// Where a node sits: directly under a project, or under a parent item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Root(usize),
    Child(ItemId),
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    item: Option<Item>,
}

/// Generational arena holding every item of every project.
#[derive(Debug, Default)]
pub struct ProjectTree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    pub projects: Vec<Project>,
}

impl ProjectTree {
    pub fn new() -> Self {
        ProjectTree::default()
    }

    pub fn get(&self, id: ItemId) -> Option<&Item> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.item.as_ref()
    }

    pub fn get_mut(&mut self, id: ItemId) -> Option<&mut Item> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.item.as_mut()
    }

    /// Like [`get`](Self::get) but surfacing stale ids as an error.
    pub fn item(&self, id: ItemId) -> Result<&Item> {
        self.get(id).ok_or(Error::StaleItemId)
    }

    pub fn item_mut(&mut self, id: ItemId) -> Result<&mut Item> {
        self.get_mut(id).ok_or(Error::StaleItemId)
    }

    fn alloc(&mut self, item: Item) -> ItemId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            debug_assert!(slot.item.is_none());
            slot.item = Some(item);
            ItemId { index, generation: slot.generation }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot { generation: 0, item: Some(item) });
            ItemId { index, generation: 0 }
        }
    }

    fn dealloc(&mut self, id: ItemId) {
        if let Some(slot) = self.slots.get_mut(id.index as usize) {
            if slot.generation == id.generation && slot.item.is_some() {
                slot.item = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(id.index);
            }
        }
    }

    pub fn add_project(&mut self, name: impl Into<String>) -> usize {
        self.projects.push(Project::new(name));
        self.projects.len() - 1
    }

    pub fn project_index(&self, name: &str) -> Option<usize> {
        self.projects.iter().position(|p| p.name == name)
    }

    /// Inserts `item` as the last root of project `project_idx`.
    pub fn insert_root(&mut self, project_idx: usize, item: Item) -> ItemId {
        let id = self.alloc(item);
        self.projects[project_idx].roots.push(id);
        id
    }

    /// Inserts `item` as the last child of `parent`.
    pub fn insert_child(&mut self, parent: ItemId, item: Item) -> Result<ItemId> {
        self.item(parent)?;
        let id = self.alloc(item);
        self.item_mut(id).expect("freshly allocated").parent = Some(parent);
        self.item_mut(parent)?.children.push(id);
        Ok(id)
    }

    /// The sibling list an id currently lives in.
    pub fn container_of(&self, id: ItemId) -> Result<Container> {
        let item = self.item(id)?;
        if let Some(parent) = item.parent {
            return Ok(Container::Child(parent));
        }
        for (idx, project) in self.projects.iter().enumerate() {
            if project.roots.contains(&id) {
                return Ok(Container::Root(idx));
            }
        }
        Err(Error::StaleItemId)
    }

    pub fn container_children(&self, container: Container) -> Result<&[ItemId]> {
        match container {
            Container::Root(idx) => Ok(&self.projects[idx].roots),
            Container::Child(parent) => Ok(&self.item(parent)?.children),
        }
    }

    /// Unlinks `id` from its sibling list without freeing the node.
    pub fn detach(&mut self, id: ItemId) -> Result<()> {
        match self.container_of(id)? {
            Container::Root(idx) => self.projects[idx].roots.retain(|&c| c != id),
            Container::Child(parent) => self.item_mut(parent)?.children.retain(|&c| c != id),
        }
        self.item_mut(id)?.parent = None;
        Ok(())
    }

    /// Splices a detached node into `container` at `index`.
    pub fn attach(&mut self, id: ItemId, container: Container, index: usize) -> Result<()> {
        match container {
            Container::Root(project_idx) => {
                let roots = &mut self.projects[project_idx].roots;
                roots.insert(index.min(roots.len()), id);
                self.item_mut(id)?.parent = None;
            }
            Container::Child(parent) => {
                let children = &mut self.item_mut(parent)?.children;
                children.insert(index.min(children.len()), id);
                self.item_mut(id)?.parent = Some(parent);
            }
        }
        Ok(())
    }

    /// Frees `id` and every node below it. The caller detaches first.
    pub fn free_subtree(&mut self, id: ItemId) {
        for child in self.get(id).map(|i| i.children.clone()).unwrap_or_default() {
            self.free_subtree(child);
        }
        self.dealloc(id);
    }

    /// True if `node` sits anywhere below `ancestor`.
    pub fn is_descendant_of(&self, node: ItemId, ancestor: ItemId) -> bool {
        let mut current = self.get(node).and_then(|i| i.parent);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.get(id).and_then(|i| i.parent);
        }
        false
    }

    /// Project index owning `id`, found by walking to the root ancestor.
    pub fn project_of(&self, id: ItemId) -> Result<usize> {
        let mut root = id;
        while let Some(parent) = self.item(root)?.parent {
            root = parent;
        }
        self.projects
            .iter()
            .position(|p| p.roots.contains(&root))
            .ok_or(Error::StaleItemId)
    }

    /// Preorder traversal of `id` and everything below it.
    pub fn descendants(&self, id: ItemId) -> Vec<ItemId> {
        let mut out = vec![id];
        if let Some(item) = self.get(id) {
            for &child in &item.children {
                out.extend(self.descendants(child));
            }
        }
        out
    }

    /// Every item of a project, preorder.
    pub fn project_items(&self, project_idx: usize) -> Vec<ItemId> {
        let mut out = Vec::new();
        for &root in &self.projects[project_idx].roots {
            out.extend(self.descendants(root));
        }
        out
    }

    /// Rewrites the denormalized project name on a whole subtree.
    pub fn relabel_project(&mut self, id: ItemId, project_name: &str) {
        for node in self.descendants(id) {
            if let Some(item) = self.get_mut(node) {
                item.project = project_name.to_string();
            }
        }
    }

    /// Directory holding the item's physical file, resolved lazily by walking
    /// parent links from the project root downward.
    pub fn disk_dir(&self, workspace_root: &Path, id: ItemId) -> Result<PathBuf> {
        let project_idx = self.project_of(id)?;
        let mut chain = Vec::new();
        let mut current = self.item(id)?.parent;
        while let Some(ancestor) = current {
            chain.push(ancestor);
            current = self.item(ancestor)?.parent;
        }
        let mut dir = workspace_root.join(&self.projects[project_idx].name);
        for ancestor in chain.into_iter().rev() {
            dir.push(self.item(ancestor)?.child_dir_name());
        }
        Ok(dir)
    }

    /// Absolute path of the item's physical file.
    pub fn disk_path(&self, workspace_root: &Path, id: ItemId) -> Result<PathBuf> {
        Ok(self.disk_dir(workspace_root, id)?.join(&self.item(id)?.name))
    }

    /// Human-readable location, e.g. `Novel/Ch1/Notes`.
    pub fn display_path(&self, id: ItemId) -> Result<String> {
        let project_idx = self.project_of(id)?;
        let mut parts = Vec::new();
        let mut current = Some(id);
        while let Some(node) = current {
            let item = self.item(node)?;
            parts.push(item.base().to_string());
            current = item.parent;
        }
        parts.push(self.projects[project_idx].name.clone());
        parts.reverse();
        Ok(parts.join("/"))
    }

    /// Resolves `Base/Sub/...` (extension-less segments) inside a project.
    pub fn resolve(&self, project_idx: usize, path: &str) -> Option<ItemId> {
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        let first = segments.next()?;
        let mut current = *self.projects[project_idx]
            .roots
            .iter()
            .find(|&&id| self.get(id).is_some_and(|i| i.base() == first))?;
        for segment in segments {
            current = *self
                .get(current)?
                .children
                .iter()
                .find(|&&id| self.get(id).is_some_and(|i| i.base() == segment))?;
        }
        Some(current)
    }

    /// True if `container` already holds a child named `name`.
    pub fn name_taken(&self, container: Container, name: &str) -> bool {
        self.container_children(container)
            .map(|children| {
                children
                    .iter()
                    .any(|&id| self.get(id).is_some_and(|i| i.name == name))
            })
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str) -> Item {
        Item::new(format!("{name}.txt"), "draft", "P")
    }

    #[test]
    fn stale_ids_resolve_to_none() {
        let mut tree = ProjectTree::new();
        let p = tree.add_project("P");
        let a = tree.insert_root(p, item("a"));
        tree.detach(a).unwrap();
        tree.free_subtree(a);
        assert!(tree.get(a).is_none());

        // Slot reuse bumps the generation, so the old id stays dead.
        let b = tree.insert_root(p, item("b"));
        assert!(tree.get(a).is_none());
        assert_eq!(tree.get(b).unwrap().name, "b.txt");
    }

    #[test]
    fn descendant_check_walks_parent_links() {
        let mut tree = ProjectTree::new();
        let p = tree.add_project("P");
        let a = tree.insert_root(p, item("a"));
        let b = tree.insert_child(a, item("b")).unwrap();
        let c = tree.insert_child(b, item("c")).unwrap();
        assert!(tree.is_descendant_of(c, a));
        assert!(tree.is_descendant_of(b, a));
        assert!(!tree.is_descendant_of(a, c));
        assert!(!tree.is_descendant_of(a, a));
    }

    #[test]
    fn disk_paths_follow_the_child_dir_convention() {
        let mut tree = ProjectTree::new();
        let p = tree.add_project("Novel");
        let ch1 = tree.insert_root(p, item("Ch1"));
        let notes = tree.insert_child(ch1, item("Notes")).unwrap();
        let root = Path::new("/ws");
        assert_eq!(
            tree.disk_path(root, notes).unwrap(),
            Path::new("/ws/Novel/sub_Ch1/Notes.txt")
        );
        assert_eq!(tree.display_path(notes).unwrap(), "Novel/Ch1/Notes");
    }

    #[test]
    fn resolve_by_base_names() {
        let mut tree = ProjectTree::new();
        let p = tree.add_project("Novel");
        let ch1 = tree.insert_root(p, item("Ch1"));
        let notes = tree.insert_child(ch1, item("Notes")).unwrap();
        assert_eq!(tree.resolve(p, "Ch1/Notes"), Some(notes));
        assert_eq!(tree.resolve(p, "Ch1"), Some(ch1));
        assert_eq!(tree.resolve(p, "Ch2"), None);
    }

    #[test]
    fn comment_pruning_drops_orphaned_anchors() {
        let mut it = item("a");
        it.comments.push(Comment::new(0, "w", "first"));
        it.comments.push(Comment::new(5, "w", "beyond"));
        it.prune_orphaned_comments(3);
        assert_eq!(it.comments.len(), 1);
        assert_eq!(it.comments[0].paragraph, 0);
    }
}
