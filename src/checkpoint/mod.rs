/*!
 * Checkpoint Module
 * Incremental state capture and the persisted image
 */

pub mod backend;

pub use backend::{JsonFileBackend, MemoryBackend, StateBackend};

use crate::core::types::{Cycle, FastMap, Pid};
use crate::process::types::PersistedProcess;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One captured process state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct Checkpoint {
    pub pid: Pid,
    /// Cycle the state was captured on
    pub cycle: Cycle,
    pub state: Value,
}

/// Everything the kernel persists across restarts: the process table and
/// the per-process checkpoints.
///
/// Ordered maps keep the serialized form stable, so identical kernel
/// state always produces byte-identical images.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct PersistedImage {
    pub processes: BTreeMap<Pid, PersistedProcess>,
    pub checkpoints: BTreeMap<Pid, Checkpoint>,
}

/// In-memory authority over the persisted image.
///
/// Checkpoint writes are incremental: a capture only lands (and only
/// dirties the image) when its canonical string form differs from the
/// previous capture, so stable processes cost one comparison per sweep.
pub(crate) struct CheckpointStore {
    image: PersistedImage,
    /// Canonical string of each pid's latest checkpoint state
    stable: FastMap<Pid, String>,
    dirty: bool,
}

impl CheckpointStore {
    pub fn new() -> Self {
        Self {
            image: PersistedImage::default(),
            stable: FastMap::default(),
            dirty: false,
        }
    }

    /// Adopt a previously saved image, rebuilding the comparison cache
    pub fn from_image(image: PersistedImage) -> Self {
        let mut stable = FastMap::default();
        for (pid, checkpoint) in &image.checkpoints {
            if let Ok(text) = serde_json::to_string(&checkpoint.state) {
                stable.insert(pid.clone(), text);
            }
        }
        Self {
            image,
            stable,
            dirty: false,
        }
    }

    pub fn image(&self) -> &PersistedImage {
        &self.image
    }

    pub fn checkpoint(&self, pid: &str) -> Option<&Checkpoint> {
        self.image.checkpoints.get(pid)
    }

    /// Record a capture for `pid`. Returns true when the state actually
    /// changed and a new checkpoint row was written.
    pub fn record(&mut self, pid: &Pid, cycle: Cycle, state: Value) -> bool {
        let Ok(text) = serde_json::to_string(&state) else {
            // Unserializable state cannot be persisted; skip the capture
            return false;
        };
        if self.stable.get(pid).map(String::as_str) == Some(text.as_str()) {
            return false;
        }
        self.stable.insert(pid.clone(), text);
        self.image.checkpoints.insert(
            pid.clone(),
            Checkpoint {
                pid: pid.clone(),
                cycle,
                state,
            },
        );
        self.dirty = true;
        true
    }

    /// Replace the process table with the current registry view
    pub fn set_process_rows(&mut self, rows: BTreeMap<Pid, PersistedProcess>) {
        if self.image.processes != rows {
            self.image.processes = rows;
            self.dirty = true;
        }
    }

    /// True when the image changed since the last backend save
    pub fn dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_saved(&mut self) {
        self.dirty = false;
    }
}
