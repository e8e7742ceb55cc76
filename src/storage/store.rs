//! File-backed key/value store.
//!
//! One directory holds one key space. Every value lives in its own file named
//! after the encoded key (see [`super::codec`]). Batch writes go through a
//! stage-then-commit protocol:
//!
//! 1. **Purge**: staged files left behind by an interrupted write are removed.
//! 2. **Stage**: every value is written in full (and synced) to `<key>.tmp`.
//! 3. **Commit**: only after every stage succeeded, each `<key>.tmp` is renamed
//!    to `<key>.txt`.
//!
//! A rename is atomic per file, so readers only ever see a complete old value
//! or a complete new value. The batch as a whole is not atomic: a failure
//! during commit can leave part of the batch committed.

use super::codec::{self, COMMITTED_EXT, STAGED_EXT};

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{op} {}: {source}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot remove stale staged files [{}]", .files.join(","))]
    Purge { files: Vec<String> },

    #[error("cannot commit keys [{}]", .keys.join(","))]
    Commit { keys: Vec<String> },
}

impl StorageError {
    fn io(op: &'static str, path: &Path, source: io::Error) -> Self {
        Self::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// A single key space rooted at one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValueStore {
    root: PathBuf,
}

impl KeyValueStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Private key space nested under this one, selected by `name`.
    ///
    /// The namespace name goes through the same codec as keys, so it can never
    /// escape the parent directory.
    pub fn namespace(&self, name: &str) -> Self {
        Self::new(self.root.join(codec::encode_key(name)))
    }

    /// Creates the backing directory if it does not exist yet.
    pub fn ensure_dir(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root).map_err(|e| StorageError::io("create", &self.root, e))
    }

    /// Durably stores every entry of `batch` and returns the written keys.
    pub fn write(&self, batch: &BTreeMap<String, String>) -> Result<Vec<String>, StorageError> {
        self.ensure_dir()?;
        self.purge_staged()?;

        let mut staged = Vec::with_capacity(batch.len());
        for (key, value) in batch {
            let path = self.path_for(key, STAGED_EXT);
            if let Err(e) = write_synced(&path, value) {
                // Nothing has been committed yet; drop what this batch staged.
                for done in &staged {
                    let _ = fs::remove_file(done);
                }
                let _ = fs::remove_file(&path);
                return Err(StorageError::io("stage", &path, e));
            }
            staged.push(path);
        }

        let mut failed = Vec::new();
        for (key, staged_path) in batch.keys().zip(&staged) {
            let committed = self.path_for(key, COMMITTED_EXT);
            if let Err(e) = fs::rename(staged_path, &committed) {
                tracing::error!("Commit of {:?} failed: {}", committed, e);
                let _ = fs::remove_file(staged_path);
                failed.push(key.clone());
            }
        }
        if !failed.is_empty() {
            return Err(StorageError::Commit { keys: failed });
        }

        Ok(batch.keys().cloned().collect())
    }

    /// Committed value of `key`, or an empty string when the key is absent.
    pub fn read(&self, key: &str) -> Result<String, StorageError> {
        let path = self.path_for(key, COMMITTED_EXT);
        match fs::read_to_string(&path) {
            Ok(value) => Ok(value),
            Err(e) if is_absent(&e) => Ok(String::new()),
            Err(e) => Err(StorageError::io("read", &path, e)),
        }
    }

    /// Removes the committed entry for `key`.
    ///
    /// Returns `false` if there was nothing to remove.
    pub fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let path = self.path_for(key, COMMITTED_EXT);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if is_absent(&e) => Ok(false),
            Err(e) => Err(StorageError::io("delete", &path, e)),
        }
    }

    /// All committed keys, sorted. Staged entries are never reported.
    pub fn list(&self) -> Result<Vec<String>, StorageError> {
        let mut keys: Vec<String> = self
            .file_names()?
            .iter()
            .filter_map(|name| codec::strip_ext(name, COMMITTED_EXT))
            .filter_map(|stem| {
                let key = codec::decode_key(stem);
                if key.is_none() {
                    tracing::debug!("Ignoring foreign file {:?} in {:?}", stem, self.root);
                }
                key
            })
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn purge_staged(&self) -> Result<(), StorageError> {
        let mut failed = Vec::new();
        for name in self.file_names()? {
            if codec::strip_ext(&name, STAGED_EXT).is_none() {
                continue;
            }
            tracing::warn!("Removing stale staged file {:?} in {:?}", name, self.root);
            if fs::remove_file(self.root.join(&name)).is_err() {
                failed.push(name);
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(StorageError::Purge { files: failed })
        }
    }

    fn file_names(&self) -> Result<Vec<String>, StorageError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io("list", &self.root, e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::io("list", &self.root, e))?;
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
        Ok(names)
    }

    fn path_for(&self, key: &str, ext: &str) -> PathBuf {
        self.root.join(codec::file_name(key, ext))
    }
}

/// No committed file: missing, or a name too long to have ever been written.
fn is_absent(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::InvalidFilename
    )
}

fn write_synced(path: &Path, value: &str) -> io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(value.as_bytes())?;
    file.sync_all()
}
