use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{CodeKey, CodeStore, StoreError, UserIdentity};

const SNAPSHOT_EXTENSION: &str = "frag";

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Best-effort cache of the most recently edited text.
#[derive(Debug, Clone)]
pub struct DraftCache {
    path: PathBuf,
}

impl DraftCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the draft through a temporary file so a crash never leaves a
    /// truncated draft behind.
    pub fn store(&self, text: &str) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
        let staging = self.path.with_extension("tmp");
        fs::write(&staging, text).map_err(io_error(&staging))?;
        fs::rename(&staging, &self.path).map_err(io_error(&self.path))?;
        debug!(path = %self.path.display(), bytes = text.len(), "cached draft");
        Ok(())
    }

    pub fn restore(&self) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_error(&self.path)(err)),
        }
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_error(&self.path)(err)),
        }
    }
}

/// Named snapshots kept as `<root>/<uuid>/<name>.frag`.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn user_dir(&self, user: &UserIdentity) -> PathBuf {
        self.root.join(user.uuid.to_string())
    }

    fn snapshot_path(&self, key: &CodeKey) -> PathBuf {
        self.user_dir(&key.user)
            .join(format!("{}.{SNAPSHOT_EXTENSION}", key.name))
    }
}

impl CodeStore for SnapshotStore {
    fn save(&self, key: &CodeKey, source: &str) -> Result<(), StoreError> {
        let dir = self.user_dir(&key.user);
        fs::create_dir_all(&dir).map_err(io_error(&dir))?;
        let path = self.snapshot_path(key);
        fs::write(&path, source).map_err(io_error(&path))?;
        debug!(path = %path.display(), "saved snapshot");
        Ok(())
    }

    fn load(&self, key: &CodeKey) -> Result<String, StoreError> {
        let path = self.snapshot_path(key);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(text),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(key.name.clone()))
            }
            Err(err) => Err(io_error(&path)(err)),
        }
    }

    fn list(&self, user: &UserIdentity) -> Result<Vec<String>, StoreError> {
        let dir = self.user_dir(user);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(io_error(&dir)(err)),
        };
        let mut names = Vec::new();
        for entry in entries {
            let path = entry.map_err(io_error(&dir))?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(SNAPSHOT_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use uuid::Uuid;

    #[test]
    fn draft_round_trip_and_clear() {
        let dir = tempdir().unwrap();
        let cache = DraftCache::new(dir.path().join("drafts").join("last.frag"));
        assert_eq!(cache.restore().unwrap(), None);
        cache.store("void main() {}").unwrap();
        assert_eq!(cache.restore().unwrap().as_deref(), Some("void main() {}"));
        cache.clear().unwrap();
        assert_eq!(cache.restore().unwrap(), None);
        cache.clear().unwrap();
    }

    #[test]
    fn snapshots_are_scoped_per_user() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let alice = UserIdentity::new("alice", Uuid::new_v4());
        let bob = UserIdentity::new("bob", Uuid::new_v4());

        store
            .save(&CodeKey::new(alice.clone(), "waves").unwrap(), "a")
            .unwrap();
        store
            .save(&CodeKey::new(alice.clone(), "circles").unwrap(), "b")
            .unwrap();
        fs::write(dir.path().join(alice.uuid.to_string()).join("notes.txt"), "x").unwrap();

        assert_eq!(store.list(&alice).unwrap(), ["circles", "waves"]);
        assert!(store.list(&bob).unwrap().is_empty());
        assert_eq!(
            store
                .load(&CodeKey::new(alice.clone(), "waves").unwrap())
                .unwrap(),
            "a"
        );
        assert!(matches!(
            store.load(&CodeKey::new(bob, "waves").unwrap()),
            Err(StoreError::NotFound(_))
        ));
    }
}
