//! Persisted session token.
//!
//! The dashboard keeps exactly one piece of durable client state: the bearer
//! token handed out at login. It authorizes REST calls and decides whether
//! admin-only views are offered.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Cheap-to-clone handle over the stored token.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: Option<PathBuf>,
    token: Arc<RwLock<Option<String>>>,
}

impl SessionStore {
    /// Open a file-backed store, reading any token already saved at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = path.as_ref().to_path_buf();
        let token = match std::fs::read_to_string(&path) {
            Ok(raw) => Some(raw.trim().to_string()).filter(|t| !t.is_empty()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(source) => return Err(SessionError::Io { path, source }),
        };
        Ok(Self {
            path: Some(path),
            token: Arc::new(RwLock::new(token)),
        })
    }

    /// Store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            token: Arc::new(RwLock::new(None)),
        }
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().ok().and_then(|guard| guard.clone())
    }

    pub fn set_token(&self, token: impl Into<String>) -> Result<(), SessionError> {
        let token = token.into().trim().to_string();
        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|source| SessionError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            std::fs::write(path, &token).map_err(|source| SessionError::Io {
                path: path.clone(),
                source,
            })?;
        }
        if let Ok(mut guard) = self.token.write() {
            *guard = Some(token).filter(|t| !t.is_empty());
        }
        Ok(())
    }

    pub fn clear(&self) -> Result<(), SessionError> {
        if let Some(path) = &self.path {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(SessionError::Io {
                        path: path.clone(),
                        source,
                    })
                }
            }
        }
        if let Ok(mut guard) = self.token.write() {
            *guard = None;
        }
        Ok(())
    }

    /// Whether the stored token grants admin views.
    pub fn is_admin(&self) -> bool {
        self.token()
            .as_deref()
            .and_then(token_claims)
            .map(|claims| claims_grant_admin(&claims))
            .unwrap_or(false)
    }
}

/// Decode the payload segment of a JWT without verifying it. Verification
/// is the server's job; the client only uses claims for UI gating.
fn token_claims(token: &str) -> Option<serde_json::Value> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&bytes).ok()
}

fn claims_grant_admin(claims: &serde_json::Value) -> bool {
    if claims.get("role").and_then(|v| v.as_str()) == Some("admin") {
        return true;
    }
    ["is_admin", "admin"]
        .iter()
        .any(|key| claims.get(*key).and_then(|v| v.as_bool()) == Some(true))
}
