/*!
 * State Backends
 * Pluggable storage for the persisted image
 */

use crate::checkpoint::PersistedImage;
use crate::core::errors::CheckpointError;
use std::cell::RefCell;
use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

/// Durable storage for the kernel's persisted image.
///
/// `load` is called once at startup; `save` whenever a sweep finds the
/// image dirty. Implementations replace the whole image atomically.
pub trait StateBackend {
    fn load(&mut self) -> Result<Option<PersistedImage>, CheckpointError>;
    fn save(&mut self, image: &PersistedImage) -> Result<(), CheckpointError>;
}

/// In-memory backend.
///
/// Clones share the same storage cell, so a test can hold a handle,
/// tear a kernel down, and boot a second kernel from what the first one
/// saved.
#[derive(Debug, Default, Clone)]
pub struct MemoryBackend {
    cell: Rc<RefCell<Option<PersistedImage>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Peek at the last saved image
    pub fn stored(&self) -> Option<PersistedImage> {
        self.cell.borrow().clone()
    }
}

impl StateBackend for MemoryBackend {
    fn load(&mut self) -> Result<Option<PersistedImage>, CheckpointError> {
        Ok(self.cell.borrow().clone())
    }

    fn save(&mut self, image: &PersistedImage) -> Result<(), CheckpointError> {
        *self.cell.borrow_mut() = Some(image.clone());
        Ok(())
    }
}

/// JSON file backend with write-then-rename saves, so a crash mid-save
/// leaves the previous image intact
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut tmp = OsString::from(self.path.as_os_str());
        tmp.push(".tmp");
        PathBuf::from(tmp)
    }
}

impl StateBackend for JsonFileBackend {
    fn load(&mut self) -> Result<Option<PersistedImage>, CheckpointError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CheckpointError::Io(e)),
        };
        let image = serde_json::from_str(&text)
            .map_err(|e| CheckpointError::Corrupt(e.to_string()))?;
        Ok(Some(image))
    }

    fn save(&mut self, image: &PersistedImage) -> Result<(), CheckpointError> {
        let text = serde_json::to_string_pretty(image)
            .map_err(|e| CheckpointError::Corrupt(e.to_string()))?;
        let tmp = self.tmp_path();
        fs::write(&tmp, text)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
