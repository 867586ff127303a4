// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use tracing::debug;

use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::Result;

/// A string blob store, durable for as long as the session lasts.
///
/// Backends shared between several processes are last-writer-wins: each write replaces the blob
/// wholesale, and nothing merges concurrent sessions.
pub trait Storage {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&mut self, key: &str, value: &str) -> Result<()>;

    /// Drop every key.
    fn clear(&mut self) -> Result<()>;
}

/// Blobs held in memory; the session ends with the process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    blobs: BTreeMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.blobs.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.blobs.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.blobs.clear();
        Ok(())
    }
}

/// Blobs kept in a single JSON object file.
///
/// The file is rewritten through a freshly created temporary file in the same directory and a
/// rename, so a crash mid-write leaves the previous contents intact. The file holds the seed, so
/// on unix it is readable by its owner only. A missing file is an empty session.
#[derive(Clone, Debug)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileStorage { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, blobs: &BTreeMap<String, String>) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;
        // Created with a random name and mode 0600, never following an existing link.
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(serde_json::to_string_pretty(blobs)?.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        debug!(path = %self.path.display(), keys = blobs.len(), "session file written");
        Ok(())
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load()?.remove(key))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut blobs = self.load()?;
        blobs.insert(key.to_owned(), value.to_owned());
        self.save(&blobs)
    }

    fn clear(&mut self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "session file removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
fn check_storage(mut storage: impl Storage) {
    assert_eq!(storage.get("seed").unwrap(), None);
    storage.set("seed", "00").unwrap();
    storage.set("other", "{}").unwrap();
    storage.set("seed", "FF").unwrap();
    assert_eq!(storage.get("seed").unwrap().as_deref(), Some("FF"));

    assert_eq!(storage.get("other").unwrap().as_deref(), Some("{}"));
    assert_eq!(storage.get("never-set").unwrap(), None);

    storage.clear().unwrap();
    assert_eq!(storage.get("other").unwrap(), None);
    storage.clear().unwrap();
}

#[test]
fn test_memory_storage() {
    check_storage(MemoryStorage::new());
}

#[test]
fn test_file_storage() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("session.json");
    check_storage(FileStorage::new(&path));
    assert!(!path.exists());

    let mut first = FileStorage::new(&path);
    first.set("seed", "AB").unwrap();
    let second = FileStorage::new(&path);
    assert_eq!(second.get("seed").unwrap().as_deref(), Some("AB"));
}

#[test]
fn test_file_storage_rejects_garbage() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    fs::write(&path, "not json").unwrap();
    assert!(matches!(
        FileStorage::new(&path).get("seed"),
        Err(crate::Error::Json(_))
    ));
}

#[cfg(unix)]
#[test]
fn test_file_storage_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    fs::write(&path, "{}").unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

    FileStorage::new(&path).set("seed", "AB").unwrap();
    let mode = fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[cfg(unix)]
#[test]
fn test_file_storage_ignores_planted_link() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    let victim = dir.path().join("victim");
    fs::write(&victim, "untouched").unwrap();
    std::os::unix::fs::symlink(&victim, dir.path().join("session.json.tmp")).unwrap();

    FileStorage::new(&path).set("seed", "AB").unwrap();
    assert_eq!(fs::read_to_string(&victim).unwrap(), "untouched");
    assert_eq!(FileStorage::new(&path).get("seed").unwrap().as_deref(), Some("AB"));
    assert!(!fs::symlink_metadata(&path).unwrap().file_type().is_symlink());
}

