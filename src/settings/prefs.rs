//! File-backed preferences
//!
//! A flat JSON object of named values, shared by the whole process. Writes
//! replace the file by atomic rename, so a reader sees either the old or
//! the new document, never a torn one.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Serializes read-modify-write cycles within this process
static WRITE_LOCK: Mutex<()> = Mutex::new(());

/// Errors accessing the preferences file
#[derive(Debug, thiserror::Error)]
pub enum PrefsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode preferences: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Handle to the preferences document at a fixed path
#[derive(Debug, Clone)]
pub struct Preferences {
    path: PathBuf,
}

impl Preferences {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read the current document.
    ///
    /// A missing file is an empty document. So is a file that does not
    /// parse as a JSON object; that case is logged.
    pub fn load(&self) -> Result<Map<String, Value>, PrefsError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(source) => {
                return Err(PrefsError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) | Err(_) => {
                warn!(path = ?self.path, "preferences file is malformed, ignoring its contents");
                Ok(Map::new())
            }
        }
    }

    /// Apply `edit` to the document and persist the result
    pub fn update<F>(&self, edit: F) -> Result<(), PrefsError>
    where
        F: FnOnce(&mut Map<String, Value>),
    {
        let _guard = WRITE_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut doc = self.load()?;
        edit(&mut doc);
        self.write(&doc)
    }

    fn write(&self, doc: &Map<String, Value>) -> Result<(), PrefsError> {
        let write_err = |source| PrefsError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }

        let content = serde_json::to_string_pretty(doc)?;
        let tmp = self.path.with_extension(format!("json.{}.tmp", std::process::id()));
        fs::write(&tmp, content).map_err(write_err)?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(write_err(e));
        }

        debug!(path = ?self.path, "preferences saved");
        Ok(())
    }
}
