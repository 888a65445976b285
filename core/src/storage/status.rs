//! Per-project progress state machine and count policies.
//!
//! Statuses form a cyclic ordered list configured workspace-wide. The only
//! transition is a sequential advance: from the last definition the cycle
//! wraps back to the first, which doubles as a "reset". There is no jump or
//! skip operation.

use tracing::debug;

use crate::config::{Config, CountType, StatusDefinition};
use crate::storage::Item;

/// Advances the item's status to the next definition in the cycle and
/// returns it. An unknown or stale status id advances to the first
/// definition. Returns `None` only when no statuses are configured.
pub fn upgrade<'a>(item: &mut Item, config: &'a Config) -> Option<&'a StatusDefinition> {
    if config.states.is_empty() {
        return None;
    }
    let next = match config.states.iter().position(|s| s.id == item.status) {
        Some(current) if current + 1 < config.states.len() => current + 1,
        // Last state wraps to the first: a full reset.
        Some(_) => 0,
        None => 0,
    };
    let definition = &config.states[next];
    debug!(item = %item.name, status = %definition.id, "Status upgraded");
    item.status = definition.id.clone();
    Some(definition)
}

/// Progress metric for `item` given its current content length, evaluated
/// against the item's current status definition.
///
/// * `Absolute`: the raw character count.
/// * `Edited`: cumulative absolute length deltas this session (monotonic).
/// * `Delta`: growth over the session start length, floored at zero.
pub fn current_count(item: &Item, content_len: u64, definition: &StatusDefinition) -> u64 {
    match definition.count_type {
        CountType::Absolute => content_len,
        CountType::Edited => item.history.edited,
        CountType::Delta => content_len.saturating_sub(item.session_start_len.unwrap_or(0)),
    }
}

/// The goal an item is measured against: its own if set, otherwise the
/// current status definition's.
pub fn effective_goal(item: &Item, definition: &StatusDefinition) -> u64 {
    item.goal.unwrap_or(definition.goal)
}

/// Completion percentage, capped at 100.
pub fn goal_percentage(count: u64, goal: u64) -> u8 {
    if goal == 0 {
        return if count > 0 { 100 } else { 0 };
    }
    let pct = ((count as f64 / goal as f64) * 100.0).round();
    pct.min(100.0) as u8
}
