use chrono::{DateTime, Utc};
use hex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::sync::broadcast;

use crate::errors::{ClientError, ResultExt};

/// Persistent home of the bearer token.
///
/// The API client reads the token on every request and clears it when the
/// service answers 401.
pub trait TokenStore: Send + Sync {
    /// Current token, or `None` when logged out.
    fn load(&self) -> Option<String>;
    /// Replaces the stored token.
    fn save(&self, token: &str) -> Result<(), ClientError>;
    /// Forgets the stored token. Clearing an empty store is not an error.
    fn clear(&self) -> Result<(), ClientError>;
}

/// Short SHA-256 fingerprint of a token, safe to log.
pub fn fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(&digest[..6])
}

fn checksum(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// On-disk token record with an integrity checksum.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredToken {
    token: String,
    checksum: String,
    saved_at: DateTime<Utc>,
}

impl StoredToken {
    fn new(token: &str) -> Self {
        Self {
            token: token.to_string(),
            checksum: checksum(token),
            saved_at: Utc::now(),
        }
    }

    fn is_valid(&self) -> bool {
        checksum(&self.token) == self.checksum
    }
}

/// Token kept in a JSON file, by default `<config dir>/leadboost/token.json`.
///
/// A file that fails to parse or whose checksum does not match reads as
/// "logged out".
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default location under the platform config directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("leadboost").join("token.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Option<String> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("Failed to read token file {}: {}", self.path.display(), e);
                return None;
            }
        };

        let stored: StoredToken = match serde_json::from_str(&content) {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!("Token file {} is not valid JSON: {}", self.path.display(), e);
                return None;
            }
        };

        if !stored.is_valid() {
            tracing::warn!(
                "Token file {} failed checksum validation; ignoring it",
                self.path.display()
            );
            return None;
        }

        Some(stored.token)
    }

    fn save(&self, token: &str) -> Result<(), ClientError> {
        if token.trim().is_empty() {
            return Err(ClientError::InvalidInput("token cannot be empty".to_string()));
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create token directory")?;
        }

        let content = serde_json::to_string_pretty(&StoredToken::new(token.trim()))?;
        std::fs::write(&self.path, content).context("Failed to write token file")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .context("Failed to restrict token file permissions")?;
        }

        tracing::info!("Stored token {} at {}", fingerprint(token.trim()), self.path.display());
        Ok(())
    }

    fn clear(&self) -> Result<(), ClientError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::info!("Removed token file {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("Failed to remove token file"),
        }
    }
}

/// In-process token store.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<String> {
        self.token.lock().ok().and_then(|guard| guard.clone())
    }

    fn save(&self, token: &str) -> Result<(), ClientError> {
        let mut guard = self
            .token
            .lock()
            .map_err(|_| ClientError::Storage("token lock poisoned".to_string()))?;
        *guard = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), ClientError> {
        let mut guard = self
            .token
            .lock()
            .map_err(|_| ClientError::Storage("token lock poisoned".to_string()))?;
        *guard = None;
        Ok(())
    }
}

/// Session-level notifications raised by the API client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    /// The service rejected the token; it has already been cleared from storage.
    SessionExpired,
}

/// Broadcast hub for [`AuthEvent`]s. Top-level code subscribes once and
/// sends the user back to login when a session expires.
#[derive(Debug, Clone)]
pub struct AuthEvents {
    sender: broadcast::Sender<AuthEvent>,
}

impl Default for AuthEvents {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(16);
        Self { sender }
    }
}

impl AuthEvents {
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.sender.subscribe()
    }

    pub(crate) fn publish(&self, event: AuthEvent) {
        // No receivers is fine: nobody is listening yet.
        let _ = self.sender.send(event);
    }
}
