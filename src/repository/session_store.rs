use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::domain::session::Session;

/// Local persistence for the authenticated session.
///
/// The whole session is one JSON record, written only by `login` and removed
/// only by `logout`. Subscribers are notified of every change; the reminder
/// poller follows login and logout this way.
pub struct SessionStore {
    path: Option<PathBuf>,
    tx: watch::Sender<Option<Session>>,
}

impl SessionStore {
    /// Opens the store at `path`, restoring any saved session.
    ///
    /// A missing file means "logged out". A corrupted file is deleted and
    /// also treated as logged out; this never fails.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let restored = Self::restore(&path);
        let (tx, _rx) = watch::channel(restored);
        Self {
            path: Some(path),
            tx,
        }
    }

    /// A store that never touches the filesystem.
    pub fn in_memory() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { path: None, tx }
    }

    fn restore(path: &Path) -> Option<Session> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = ?path, "No saved session");
                return None;
            }
            Err(e) => {
                warn!(path = ?path, error = %e, "Could not read saved session");
                return None;
            }
        };

        match serde_json::from_str::<Session>(&content) {
            Ok(session) if session.has_token() => {
                info!(user_id = session.user_id, "Restored saved session");
                Some(session)
            }
            Ok(_) => {
                warn!(path = ?path, "Saved session has no token, clearing it");
                Self::discard(path);
                None
            }
            Err(e) => {
                warn!(path = ?path, error = %e, "Saved session is corrupted, clearing it");
                Self::discard(path);
                None
            }
        }
    }

    fn discard(path: &Path) {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = ?path, error = %e, "Failed to remove session file");
            }
        }
    }

    pub fn current(&self) -> Option<Session> {
        self.tx.borrow().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.tx
            .borrow()
            .as_ref()
            .filter(|session| session.has_token())
            .map(|session| session.token.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.tx.subscribe()
    }

    /// Persists `session` and makes it current.
    pub fn login(&self, session: Session) -> Result<()> {
        if let Some(path) = &self.path {
            Self::write_atomically(path, &session)?;
        }
        info!(user_id = session.user_id, username = %session.username, "Session started");
        self.tx.send_replace(Some(session));
        Ok(())
    }

    /// Removes the persisted session and publishes the logged-out state.
    pub fn logout(&self) -> Result<()> {
        if let Some(path) = &self.path {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to remove {:?}", path));
                }
            }
        }
        info!("Session cleared");
        self.tx.send_replace(None);
        Ok(())
    }

    fn write_atomically(path: &Path, session: &Session) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(session)?;
        std::fs::write(&tmp, content).with_context(|| format!("Failed to write {:?}", tmp))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
        }

        std::fs::rename(&tmp, path).with_context(|| format!("Failed to replace {:?}", path))?;
        Ok(())
    }
}
