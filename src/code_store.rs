use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

const FILE_NAME: &str = "codigo_avaliacao.json";

#[derive(Debug, thiserror::Error)]
pub enum CodeStoreError {
    #[error("could not access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("stored code is unreadable: {0}")]
    Format(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StoredCode {
    code: String,
    expires_at: DateTime<Utc>,
}

/// Short-lived holder for a verified check-in code, kept between the
/// redeem step and the emotion survey.
#[derive(Debug, Clone)]
pub struct CodeStore {
    path: PathBuf,
    ttl: Duration,
}

impl CodeStore {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join(FILE_NAME),
            ttl: Duration::minutes(30),
        }
    }

    pub fn save(&self, code: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, CodeStoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| self.io(source))?;
        }
        let stored = StoredCode {
            code: code.to_string(),
            expires_at: now + self.ttl,
        };
        let body = serde_json::to_vec_pretty(&stored)?;
        std::fs::write(&self.path, body).map_err(|source| self.io(source))?;
        Ok(stored.expires_at)
    }

    /// The live code, if any. Expired entries are removed on the way out.
    pub fn load(&self, now: DateTime<Utc>) -> Result<Option<String>, CodeStoreError> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(self.io(source)),
        };

        let stored: StoredCode = match serde_json::from_slice(&raw) {
            Ok(stored) => stored,
            Err(err) => {
                tracing::warn!("discarding unreadable check-in code: {}", err);
                self.clear()?;
                return Ok(None);
            }
        };

        if stored.expires_at <= now {
            tracing::debug!(expired_at = %stored.expires_at, "stored check-in code expired");
            self.clear()?;
            return Ok(None);
        }
        Ok(Some(stored.code))
    }

    pub fn clear(&self) -> Result<(), CodeStoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(self.io(source)),
        }
    }

    fn io(&self, source: std::io::Error) -> CodeStoreError {
        CodeStoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
