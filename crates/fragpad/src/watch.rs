use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::Sender;
use notify::{Config, Event, EventKind, PollWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};

/// Follows a shader file and sends its full text whenever it changes on disk.
///
/// The parent directory is watched rather than the file itself so editors
/// that save by writing a temporary file and renaming it are still seen.
/// Watching stops when this value is dropped.
pub struct FileWatcher {
    path: PathBuf,
    _watcher: PollWatcher,
}

impl FileWatcher {
    pub fn spawn(path: PathBuf, interval: Duration, updates: Sender<String>) -> Result<Self> {
        let canonical = path
            .canonicalize()
            .with_context(|| format!("failed to resolve shader path {}", path.display()))?;
        let dir = canonical
            .parent()
            .ok_or_else(|| anyhow!("shader path has no parent: {}", canonical.display()))?
            .to_path_buf();
        let file_name = canonical
            .file_name()
            .ok_or_else(|| anyhow!("shader path has no file name: {}", canonical.display()))?
            .to_os_string();

        let mut last_sent = fs::read_to_string(&canonical).ok();
        let target = canonical.clone();
        let mut watcher = PollWatcher::new(
            move |result: std::result::Result<Event, notify::Error>| match result {
                Ok(event) => {
                    if !touches(&event, &file_name) {
                        return;
                    }
                    // A rename-on-save shows up as a removal followed by a create.
                    if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                        return;
                    }
                    match fs::read_to_string(&target) {
                        Ok(text) => {
                            if last_sent.as_deref() == Some(text.as_str()) {
                                return;
                            }
                            debug!(path = %target.display(), bytes = text.len(), "watched file changed");
                            if updates.send(text.clone()).is_ok() {
                                last_sent = Some(text);
                            }
                        }
                        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                        Err(err) => {
                            warn!(path = %target.display(), %err, "failed to read watched file")
                        }
                    }
                }
                Err(err) => warn!(%err, "file watcher error"),
            },
            Config::default().with_poll_interval(interval),
        )
        .context("failed to create file watcher")?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch shader directory {}", dir.display()))?;
        debug!(dir = %dir.display(), "watching directory for shader changes");

        Ok(Self {
            path,
            _watcher: watcher,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn touches(event: &Event, file_name: &OsString) -> bool {
    event
        .paths
        .iter()
        .any(|path| path.file_name() == Some(file_name.as_os_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use tempfile::TempDir;

    #[test]
    fn sends_new_contents_after_a_change() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shader.frag");
        fs::write(&path, "void main() {}").unwrap();

        let (tx, rx) = unbounded();
        let watcher = FileWatcher::spawn(path.clone(), Duration::from_millis(10), tx).unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

        fs::write(&path, "void mainImage(out vec4 c, in vec2 p) {}").unwrap();
        let text = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(text.starts_with("void mainImage"));
        assert_eq!(watcher.path(), path.as_path());
    }

    #[test]
    fn follows_saves_that_rename_over_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shader.frag");
        fs::write(&path, "void main() {}").unwrap();

        let (tx, rx) = unbounded();
        let _watcher = FileWatcher::spawn(path.clone(), Duration::from_millis(10), tx).unwrap();

        let temp = dir.path().join(".shader.frag.swp");
        fs::write(&temp, "void main() { gl_FragColor = vec4(1.0); }").unwrap();
        fs::rename(&temp, &path).unwrap();

        let text = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(text.contains("gl_FragColor"));
    }

    #[test]
    fn ignores_other_files_in_the_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shader.frag");
        fs::write(&path, "void main() {}").unwrap();

        let (tx, rx) = unbounded();
        let _watcher = FileWatcher::spawn(path, Duration::from_millis(10), tx).unwrap();
        fs::write(dir.path().join("notes.txt"), "unrelated").unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
    }

    #[test]
    fn stops_when_dropped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shader.frag");
        fs::write(&path, "a").unwrap();

        let (tx, rx) = unbounded();
        drop(FileWatcher::spawn(path.clone(), Duration::from_millis(5), tx).unwrap());
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
        assert!(rx.is_empty());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let (tx, _rx) = unbounded::<String>();
        let missing = FileWatcher::spawn(dir.path().join("nope.frag"), Duration::from_millis(5), tx);
        assert!(missing.is_err());
    }
}
