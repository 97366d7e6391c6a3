use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;

/// Bearer credentials for the playback API. Valid only while
/// `now < expires_at`; expired credentials must be refreshed before any
/// authenticated call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Credentials {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Persistent slot for credentials plus the PKCE verifier, which has to
/// survive the authorization redirect.
///
/// `get` never errors: absence is the ordinary "not yet authenticated"
/// state. Injected everywhere instead of living in a process-wide
/// global, so any persistence can back it.
pub trait CredentialStore: Send + Sync {
    fn get(&self) -> Option<Credentials>;
    fn put(&self, credentials: &Credentials) -> AppResult<()>;
    fn clear(&self) -> AppResult<()>;

    fn verifier(&self) -> Option<String>;
    fn set_verifier(&self, verifier: &str) -> AppResult<()>;
    fn clear_verifier(&self) -> AppResult<()>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredAuth {
    #[serde(default)]
    credentials: Option<Credentials>,
    #[serde(default)]
    pkce_verifier: Option<String>,
}

/// JSON-file-backed store under the user's home directory.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn default_path() -> AppResult<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| AppError::Config("Cannot find home directory".into()))?;
        Ok(home.join(".nowbar").join("auth.json"))
    }

    fn read(&self) -> StoredAuth {
        let Ok(content) = std::fs::read_to_string(&self.path) else {
            return StoredAuth::default();
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            log::warn!("Corrupt auth file, treating as empty: {}", e);
            StoredAuth::default()
        })
    }

    fn write(&self, auth: &StoredAuth) -> AppResult<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let content = serde_json::to_string_pretty(auth)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

impl CredentialStore for FileStore {
    fn get(&self) -> Option<Credentials> {
        self.read().credentials
    }

    fn put(&self, credentials: &Credentials) -> AppResult<()> {
        let mut auth = self.read();
        auth.credentials = Some(credentials.clone());
        self.write(&auth)
    }

    fn clear(&self) -> AppResult<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    fn verifier(&self) -> Option<String> {
        self.read().pkce_verifier
    }

    fn set_verifier(&self, verifier: &str) -> AppResult<()> {
        let mut auth = self.read();
        auth.pkce_verifier = Some(verifier.to_string());
        self.write(&auth)
    }

    fn clear_verifier(&self) -> AppResult<()> {
        let mut auth = self.read();
        if auth.pkce_verifier.take().is_some() {
            self.write(&auth)?;
        }
        Ok(())
    }
}

/// In-memory store for tests and embedders that manage persistence
/// themselves.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<StoredAuth>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self) -> Option<Credentials> {
        self.inner.lock().unwrap().credentials.clone()
    }

    fn put(&self, credentials: &Credentials) -> AppResult<()> {
        self.inner.lock().unwrap().credentials = Some(credentials.clone());
        Ok(())
    }

    fn clear(&self) -> AppResult<()> {
        *self.inner.lock().unwrap() = StoredAuth::default();
        Ok(())
    }

    fn verifier(&self) -> Option<String> {
        self.inner.lock().unwrap().pkce_verifier.clone()
    }

    fn set_verifier(&self, verifier: &str) -> AppResult<()> {
        self.inner.lock().unwrap().pkce_verifier = Some(verifier.to_string());
        Ok(())
    }

    fn clear_verifier(&self) -> AppResult<()> {
        self.inner.lock().unwrap().pkce_verifier = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn credentials(expires_in_secs: i64) -> Credentials {
        Credentials {
            access_token: "at".into(),
            refresh_token: "rt".into(),
            expires_at: Utc::now() + Duration::seconds(expires_in_secs),
        }
    }

    #[test]
    fn expiry_boundary() {
        assert!(!credentials(60).is_expired());
        assert!(credentials(-1).is_expired());
    }

    #[test]
    fn file_store_round_trip() {
        let path = std::env::temp_dir().join(format!(
            "nowbar-store-test-{}-{}.json",
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        let store = FileStore::new(path.clone());

        assert!(store.get().is_none());
        assert!(store.verifier().is_none());

        store.set_verifier("verifier-123").unwrap();
        store.put(&credentials(3600)).unwrap();

        let loaded = store.get().expect("credentials persisted");
        assert_eq!(loaded.access_token, "at");
        assert_eq!(store.verifier().as_deref(), Some("verifier-123"));

        // Dropping just the verifier leaves the credentials alone.
        store.clear_verifier().unwrap();
        assert!(store.verifier().is_none());
        assert!(store.get().is_some());

        store.clear().unwrap();
        assert!(store.get().is_none());
        assert!(store.verifier().is_none());

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn memory_store_clear_drops_verifier_too() {
        let store = MemoryStore::new();
        store.set_verifier("v").unwrap();
        store.put(&credentials(10)).unwrap();
        store.clear().unwrap();
        assert!(store.get().is_none());
        assert!(store.verifier().is_none());
    }
}
