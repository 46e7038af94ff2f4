//! JSON file storage backend - one `<id>.json` file per identity.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::{Bundle, Store};
use crate::error::StoreError;

/// A [`Store`] that keeps each identity's bundle in its own JSON file
/// inside a configured folder.
///
/// Identity strings are sanitized before being used as file names, so ids
/// containing separators or other path-hostile characters are safe (but two
/// ids that sanitize to the same name will share a file).
pub struct JsonFileStore {
    folder: PathBuf,
}

impl JsonFileStore {
    /// Create a store rooted at `folder`. The folder is created lazily on
    /// the first write.
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }

    /// The folder in which the bundle files are located.
    pub fn folder(&self) -> &Path {
        &self.folder
    }

    fn file_path(&self, id: &str) -> PathBuf {
        self.folder.join(format!("{}.json", sanitize_id(id)))
    }
}

/// Replace characters that are unsafe in file names.
fn sanitize_id(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl Store for JsonFileStore {
    fn get_bundle(&self, id: &str) -> Result<Option<Bundle>, StoreError> {
        let path = self.file_path(id);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StoreError::Io(err)),
        };

        match serde_json::from_str::<Bundle>(&contents) {
            Ok(bundle) => Ok(Some(bundle)),
            Err(err) => {
                // A corrupt bundle reads as "no data" so apply can fall
                // through to defaults instead of failing the whole object.
                warn!(
                    file = %path.display(),
                    error = %err,
                    "unreadable bundle, treating as empty"
                );
                Ok(None)
            }
        }
    }

    fn set_bundle(&self, id: &str, values: Bundle) -> Result<(), StoreError> {
        fs::create_dir_all(&self.folder)?;
        let serialized = serde_json::to_string_pretty(&values)?;
        let path = self.file_path(id);
        fs::write(&path, serialized)?;
        debug!(id = %id, file = %path.display(), "bundle written");
        Ok(())
    }

    fn clear_bundle(&self, id: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.file_path(id)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StoreError::Io(err)),
        }
    }

    fn clear_all(&self) -> Result<(), StoreError> {
        for id in self.list_ids()? {
            self.clear_bundle(&id)?;
        }
        Ok(())
    }

    fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        let entries = match fs::read_dir(&self.folder) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StoreError::Io(err)),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}
