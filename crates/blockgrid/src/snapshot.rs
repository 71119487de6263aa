//! Loading saved structures.
//!
//! A snapshot is a JSON document holding a structure plus an optional list of
//! slots to blank out before parsing (used when authoring puzzles).

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::token::Structure;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("failed to read snapshot")]
    Io(#[from] std::io::Error),
    #[error("malformed snapshot")]
    Json(#[from] serde_json::Error),
    #[error("blank refers to unknown line `{0}`")]
    UnknownLine(String),
    #[error("blank refers to slot {slot} of line `{line}`, which has {len} slots")]
    SlotOutOfRange { line: String, slot: usize, len: usize },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlankSlot {
    pub line: String,
    pub slot: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub structure: Structure,
    #[serde(default)]
    pub blanks: Vec<BlankSlot>,
}

impl Snapshot {
    pub fn from_json(text: &str) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Applies the blank instructions and hands back the structure.
    pub fn into_structure(self) -> Result<Structure, SnapshotError> {
        let mut structure = self.structure;
        for blank in &self.blanks {
            let line = structure
                .lines
                .iter_mut()
                .find(|line| line.id == blank.line)
                .ok_or_else(|| SnapshotError::UnknownLine(blank.line.clone()))?;
            let len = line.slots.len();
            let slot = line
                .slots
                .get_mut(blank.slot)
                .ok_or_else(|| SnapshotError::SlotOutOfRange {
                    line: blank.line.clone(),
                    slot: blank.slot,
                    len,
                })?;
            *slot = None;
        }
        debug!(
            lines = structure.lines.len(),
            blanks = self.blanks.len(),
            "Prepared structure from snapshot"
        );
        Ok(structure)
    }
}

pub fn load(path: &Path) -> Result<Snapshot, SnapshotError> {
    let text = std::fs::read_to_string(path)?;
    Snapshot::from_json(&text)
}
