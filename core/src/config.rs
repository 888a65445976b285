//! Workspace-wide configuration: the ordered status cycle, counting policy,
//! autosave interval, and portable author identity.
//!
//! The config travels inside the durable snapshot so it follows the folder
//! across machines. Older snapshots may lack `count_type` or `goal` on a
//! status definition; both normalize on deserialize.

use serde::{Deserialize, Serialize};

/// Default per-status character target when none is configured.
pub const DEFAULT_GOAL: u64 = 30_000;
/// Default autosave period in seconds.
pub const DEFAULT_AUTOSAVE_INTERVAL: u64 = 30;

/// Policy for deriving a progress metric from document content and session
/// history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountType {
    /// Raw current character count.
    #[default]
    Absolute,
    /// Cumulative absolute length deltas since the document was opened.
    Edited,
    /// Growth over the session start length, floored at zero.
    Delta,
}

/// One named, colored stage in the cyclic progress-tracking state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusDefinition {
    pub id: String,
    pub name: String,
    pub color: String,
    #[serde(default = "default_goal")]
    pub goal: u64,
    #[serde(default)]
    pub count_type: CountType,
}

fn default_goal() -> u64 {
    DEFAULT_GOAL
}

fn default_autosave_interval() -> u64 {
    DEFAULT_AUTOSAVE_INTERVAL
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub states: Vec<StatusDefinition>,
    #[serde(default = "default_autosave_interval")]
    pub autosave_interval: u64,
    /// Author name stamped on comments; synced through the snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            states: vec![
                StatusDefinition {
                    id: "draft".into(),
                    name: "First Draft".into(),
                    color: "#ff3b30".into(),
                    goal: 30_000,
                    count_type: CountType::Absolute,
                },
                StatusDefinition {
                    id: "review".into(),
                    name: "In Review".into(),
                    color: "#ff9500".into(),
                    goal: 15_000,
                    count_type: CountType::Edited,
                },
                StatusDefinition {
                    id: "final".into(),
                    name: "Final Touches".into(),
                    color: "#34c759".into(),
                    goal: 5_000,
                    count_type: CountType::Delta,
                },
            ],
            autosave_interval: DEFAULT_AUTOSAVE_INTERVAL,
            author: None,
        }
    }
}

impl Config {
    /// The definition for `id`, falling back to the first state for unknown
    /// or stale ids.
    pub fn status(&self, id: &str) -> Option<&StatusDefinition> {
        self.states
            .iter()
            .find(|s| s.id == id)
            .or_else(|| self.states.first())
    }

    /// Id the scanner assigns to freshly discovered items.
    pub fn initial_status(&self) -> &str {
        self.states.first().map(|s| s.id.as_str()).unwrap_or("draft")
    }
}
