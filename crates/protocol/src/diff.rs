use serde::{Deserialize, Serialize};

/// Change status of a node between two snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiffType {
    #[default]
    None,
    Modified,
    Added,
    Deleted,
    /// The node exists in the old snapshot under a different parent; this is
    /// its new position.
    AddedMove,
    /// The node exists in the new snapshot under a different parent; this is
    /// its stale old position.
    DeletedMove,
}
