//! Merges a freshly scanned tree with a previously cached snapshot.
//!
//! Matching is by name, per sibling level, in two passes: exact matches
//! first, then a narrow orphan-recovery pass that treats *exactly one*
//! unmatched cached node plus *exactly one* unprocessed live node as a rename
//! pair. The heuristic makes no attempt at N:M disambiguation; with two or
//! more simultaneous renames at the same level, metadata survives for at most
//! one of them. That ambiguity is inherent to name-based identity and is kept
//! as an explicit, tested limitation.
//!
//! Reconciliation is best-effort and never fails; the absence of a cache is a
//! no-op.

use tracing::{debug, instrument};

use crate::storage::ItemId;
use crate::storage::snapshot::{ItemSnapshot, Snapshot};
use crate::storage::tree::ProjectTree;

/// Overlays cached attributes onto the live tree. Projects match by exact
/// name only; items additionally get the single-pair rename fallback.
#[instrument(skip(tree, snapshot))]
pub fn reconcile(tree: &mut ProjectTree, snapshot: &Snapshot) {
    for project_idx in 0..tree.projects.len() {
        let Some(cached) = snapshot
            .projects
            .iter()
            .find(|p| p.name == tree.projects[project_idx].name)
        else {
            continue;
        };
        tree.projects[project_idx].open = cached.open;
        let roots = tree.projects[project_idx].roots().to_vec();
        reconcile_level(tree, &roots, &cached.items);
    }
    debug!("Reconcile complete");
}

fn reconcile_level(tree: &mut ProjectTree, live: &[ItemId], cached: &[ItemSnapshot]) {
    let mut cached_matched = vec![false; cached.len()];
    let mut live_processed = vec![false; live.len()];

    // Pass 1: exact name match.
    for (live_idx, &id) in live.iter().enumerate() {
        let Some(name) = tree.get(id).map(|i| i.name.clone()) else {
            continue;
        };
        if let Some(cached_idx) = cached.iter().position(|c| c.name == name) {
            apply_metadata(tree, id, &cached[cached_idx]);
            cached_matched[cached_idx] = true;
            live_processed[live_idx] = true;
        }
    }

    // Pass 2: orphan recovery. Exactly one leftover on each side is treated
    // as a rename; anything else stays untouched.
    let unmatched_cached: Vec<usize> =
        (0..cached.len()).filter(|&i| !cached_matched[i]).collect();
    let unprocessed_live: Vec<usize> =
        (0..live.len()).filter(|&i| !live_processed[i]).collect();

    if let ([cached_idx], [live_idx]) = (&unmatched_cached[..], &unprocessed_live[..]) {
        debug!("Recovering metadata across a rename at this level");
        apply_metadata(tree, live[*live_idx], &cached[*cached_idx]);
    }
}

/// Copies cached attributes onto a live node, then reconciles its children
/// with the same two passes.
fn apply_metadata(tree: &mut ProjectTree, id: ItemId, cached: &ItemSnapshot) {
    if let Some(item) = tree.get_mut(id) {
        item.status = cached.status.clone();
        item.goal = cached.goal;
        item.last_char_count = cached.last_char_count;
        item.last_updated = cached.last_updated;
        item.open = cached.open;
        item.history = cached.history;
        item.comments = cached.comments.clone();
    }
    let children = tree.get(id).map(|i| i.children().to_vec()).unwrap_or_default();
    reconcile_level(tree, &children, &cached.items);
}
