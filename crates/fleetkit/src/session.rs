//! Persistence of session tokens between runs.
//!
//! A token saved by one invocation (e.g. `sumactl user --login`) is picked up
//! by the next one, so the password is not needed on every run. The store is
//! injected into [`Client`](crate::Client); nothing here is global.

use crate::error::{Error, Result};
use crate::types::SessionKey;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// A saved session: who logged in and the token they got.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSession {
    /// Login name the token belongs to.
    pub username: String,
    /// Session token.
    pub key: SessionKey,
}

/// Backing store for session tokens.
pub trait SessionStore: Send + Sync {
    /// Load the saved session, if any.
    fn load(&self) -> Result<Option<StoredSession>>;

    /// Save a session, replacing any previous one.
    fn save(&self, session: &StoredSession) -> Result<()>;

    /// Forget the saved session.
    fn clear(&self) -> Result<()>;
}

/// File-backed store: one `username:token` line.
///
/// One file per server; the caller picks the path, typically
/// `<config dir>/<server fqdn>/session`.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    /// Create a store at the given path. Nothing is touched until first use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the path of the session file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<StoredSession>> {
        if !self.path.exists() {
            log::debug!("No session file at {}", self.path.display());
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path).map_err(|e| Error::io(&self.path, e))?;
        Ok(content.lines().find_map(parse_line))
    }

    fn save(&self, session: &StoredSession) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            create_private_dir(dir)?;
        }
        let line = format!("{}:{}\n", session.username, session.key.as_str());
        let mut file = open_private(&self.path)?;
        file.write_all(line.as_bytes())
            .map_err(|e| Error::io(&self.path, e))?;
        log::debug!("Session saved for user {}", session.username);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(&self.path, e)),
        }
    }
}

fn parse_line(line: &str) -> Option<StoredSession> {
    let (username, token) = line.trim().split_once(':')?;
    let (username, token) = (username.trim(), token.trim());
    if username.is_empty() || token.is_empty() {
        return None;
    }
    Some(StoredSession {
        username: username.to_string(),
        key: SessionKey::new(token),
    })
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    if dir.exists() {
        return Ok(());
    }
    fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(dir)
        .map_err(|e| Error::io(dir, e))
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))
}

/// Open for writing, readable by the owner only before any byte lands.
#[cfg(unix)]
fn open_private(path: &Path) -> Result<fs::File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
    let file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .map_err(|e| Error::io(path, e))?;
    // mode() only applies to new files
    file.set_permissions(fs::Permissions::from_mode(0o600))
        .map_err(|e| Error::io(path, e))?;
    Ok(file)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> Result<fs::File> {
    fs::File::create(path).map_err(|e| Error::io(path, e))
}

/// In-memory store, for tests and for runs that must not persist anything.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    session: Arc<Mutex<Option<StoredSession>>>,
}

impl MemorySessionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding a session.
    #[must_use]
    pub fn with_session(username: &str, token: &str) -> Self {
        let store = Self::new();
        *store.session.lock().unwrap() = Some(StoredSession {
            username: username.to_string(),
            key: SessionKey::new(token),
        });
        store
    }

    /// Peek at the stored session.
    #[must_use]
    pub fn current(&self) -> Option<StoredSession> {
        self.session.lock().unwrap().clone()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<StoredSession>> {
        Ok(self.current())
    }

    fn save(&self, session: &StoredSession) -> Result<()> {
        *self.session.lock().unwrap() = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.session.lock().unwrap() = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn session(user: &str, token: &str) -> StoredSession {
        StoredSession {
            username: user.to_string(),
            key: SessionKey::new(token),
        }
    }

    #[test]
    fn test_file_store_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(dir.path().join("suma.example.com").join("session"));

        assert_eq!(store.load().unwrap(), None);

        store.save(&session("admin", "4xdeadbeef")).unwrap();
        assert_eq!(store.load().unwrap(), Some(session("admin", "4xdeadbeef")));

        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
        // clearing twice is fine
        store.clear().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(dir.path().join("host").join("session"));
        store.save(&session("admin", "token")).unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_tightens_existing_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session");
        fs::write(&path, "old:token\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        let store = FileSessionStore::new(&path);
        store.save(&session("admin", "fresh")).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(store.load().unwrap(), Some(session("admin", "fresh")));
    }

    #[test]
    fn test_file_store_ignores_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session");
        fs::write(&path, "\nno-colon-here\n:missing-user\nops:abc123\n").unwrap();

        let store = FileSessionStore::new(&path);
        assert_eq!(store.load().unwrap(), Some(session("ops", "abc123")));
    }

    #[test]
    fn test_memory_store() {
        let store = MemorySessionStore::with_session("admin", "t1");
        assert_eq!(store.load().unwrap(), Some(session("admin", "t1")));

        store.save(&session("ops", "t2")).unwrap();
        assert_eq!(store.current(), Some(session("ops", "t2")));

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }
}
