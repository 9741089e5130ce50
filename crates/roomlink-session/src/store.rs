//! Credential persistence.
//!
//! Stores hold at most one credential: the secret of the last session
//! the server accepted. The API is deliberately infallible — a store
//! that cannot read or write logs the problem and behaves as empty, so
//! a broken disk degrades the experience to "prompt again" rather than
//! an error path every caller must handle.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::{debug, warn};

use roomlink_protocol::Credential;

/// Backing storage for the session credential.
pub trait CredentialStore: Send + Sync + 'static {
    /// Returns the stored credential, if any.
    fn load(&self) -> Option<Credential>;

    /// Persists the credential, replacing any previous one.
    fn save(&self, credential: &Credential);

    /// Removes the stored credential.
    fn clear(&self);
}

/// Stores can be shared; the gate takes one by value, callers that also
/// want a handle wrap it in an `Arc`.
impl<S: CredentialStore> CredentialStore for std::sync::Arc<S> {
    fn load(&self) -> Option<Credential> {
        (**self).load()
    }

    fn save(&self, credential: &Credential) {
        (**self).save(credential)
    }

    fn clear(&self) {
        (**self).clear()
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-process store. Forgets everything when dropped; the default for
/// tests and for callers that opt out of persistence.
#[derive(Default)]
pub struct MemoryStore {
    slot: Mutex<Option<Credential>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryStore {
    // A panic while the lock was held cannot corrupt an Option, so a
    // poisoned slot is still good data.
    fn load(&self) -> Option<Credential> {
        self.slot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn save(&self, credential: &Credential) {
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) =
            Some(credential.clone());
    }

    fn clear(&self) {
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

// ---------------------------------------------------------------------------
// FileStore
// ---------------------------------------------------------------------------

/// Single-file store holding the bare secret string.
///
/// The room id is session input, not identity, so only the secret is
/// persisted. An unreadable or missing file loads as empty.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CredentialStore for FileStore {
    fn load(&self) -> Option<Credential> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => {
                let secret = contents.trim();
                if secret.is_empty() {
                    None
                } else {
                    Some(Credential::new(secret))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e,
                    "could not read credential store");
                None
            }
        }
    }

    fn save(&self, credential: &Credential) {
        if let Err(e) = fs::write(&self.path, &credential.secret) {
            warn!(path = %self.path.display(), error = %e,
                "could not write credential store");
        } else {
            debug!(path = %self.path.display(), "credential saved");
        }
    }

    fn clear(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "credential cleared"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %self.path.display(), error = %e,
                    "could not clear credential store");
            }
        }
    }
}
