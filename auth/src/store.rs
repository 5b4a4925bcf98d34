//! Persistence of the token pair between runs.

use crate::{AuthError, Credentials};
use keyring::Entry;
use std::sync::Mutex;

pub const KEYRING_SERVICE_NAME: &str = "PhotoScroll";

/// Read-at-startup, write-on-change storage for [`Credentials`].
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Result<Option<Credentials>, AuthError>;
    fn save(&self, credentials: &Credentials) -> Result<(), AuthError>;
    fn clear(&self) -> Result<(), AuthError>;
}

/// Tokens kept in the operating system keyring.
///
/// Both entries are created once, so every call goes through the same
/// credential handles.
pub struct KeyringStore {
    access: Entry,
    refresh: Entry,
}

fn keyring_error(e: keyring::Error) -> AuthError {
    AuthError::Keyring(e.to_string())
}

fn read(entry: &Entry) -> Result<Option<String>, AuthError> {
    match entry.get_password() {
        Ok(token) => Ok(Some(token)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => Err(keyring_error(e)),
    }
}

fn delete(entry: &Entry) -> Result<(), AuthError> {
    match entry.delete_password() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(keyring_error(e)),
    }
}

impl KeyringStore {
    pub fn new(service: &str) -> Result<Self, AuthError> {
        Ok(KeyringStore {
            access: Entry::new(service, "access_token").map_err(keyring_error)?,
            refresh: Entry::new(service, "refresh_token").map_err(keyring_error)?,
        })
    }
}

impl TokenStore for KeyringStore {
    fn load(&self) -> Result<Option<Credentials>, AuthError> {
        let Some(access_token) = read(&self.access)? else {
            return Ok(None);
        };
        let refresh_token = read(&self.refresh)?;
        Ok(Some(Credentials {
            access_token,
            refresh_token,
        }))
    }

    fn save(&self, credentials: &Credentials) -> Result<(), AuthError> {
        self.access
            .set_password(&credentials.access_token)
            .map_err(keyring_error)?;
        match &credentials.refresh_token {
            Some(refresh_token) => self
                .refresh
                .set_password(refresh_token)
                .map_err(keyring_error),
            None => delete(&self.refresh),
        }
    }

    fn clear(&self) -> Result<(), AuthError> {
        delete(&self.access)?;
        delete(&self.refresh)
    }
}

/// Tokens kept as JSON in a file, for systems without a usable keyring.
#[cfg(feature = "file-store")]
pub struct FileStore {
    path: std::path::PathBuf,
}

#[cfg(feature = "file-store")]
impl FileStore {
    pub fn new(path: std::path::PathBuf) -> Self {
        FileStore { path }
    }

    /// `~/.photoscroll/tokens.json`
    pub fn default_path() -> std::path::PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| std::path::PathBuf::from("."))
            .join(".photoscroll")
            .join("tokens.json")
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[cfg(feature = "file-store")]
impl TokenStore for FileStore {
    fn load(&self) -> Result<Option<Credentials>, AuthError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&self.path)?;
        serde_json::from_str(&data)
            .map(Some)
            .map_err(|e| AuthError::Store(e.to_string()))
    }

    fn save(&self, credentials: &Credentials) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data =
            serde_json::to_string_pretty(credentials).map_err(|e| AuthError::Store(e.to_string()))?;
        std::fs::write(&self.path, data)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), AuthError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local store, used by tests and short-lived sessions.
#[derive(Default)]
pub struct MemoryStore {
    credentials: Mutex<Option<Credentials>>,
}

impl MemoryStore {
    pub fn new(credentials: Option<Credentials>) -> Self {
        MemoryStore {
            credentials: Mutex::new(credentials),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<Credentials>>, AuthError> {
        self.credentials
            .lock()
            .map_err(|_| AuthError::Store("token store lock poisoned".into()))
    }
}

impl TokenStore for MemoryStore {
    fn load(&self) -> Result<Option<Credentials>, AuthError> {
        Ok(self.lock()?.clone())
    }

    fn save(&self, credentials: &Credentials) -> Result<(), AuthError> {
        *self.lock()? = Some(credentials.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), AuthError> {
        *self.lock()? = None;
        Ok(())
    }
}

impl<T: TokenStore + ?Sized> TokenStore for std::sync::Arc<T> {
    fn load(&self) -> Result<Option<Credentials>, AuthError> {
        (**self).load()
    }

    fn save(&self, credentials: &Credentials) -> Result<(), AuthError> {
        (**self).save(credentials)
    }

    fn clear(&self) -> Result<(), AuthError> {
        (**self).clear()
    }
}
