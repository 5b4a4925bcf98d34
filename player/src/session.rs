//! Persistent viewing session: credentials, the selected collection and the
//! last viewed position.

use auth::{AuthError, Credentials, TokenStore};
use fetcher::CollectionSelector;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Token store Error: {0}")]
    Auth(#[from] AuthError),
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Session file is not valid: {0}")]
    Format(#[from] serde_json::Error),
    #[error("Session store Error: {0}")]
    Store(String),
}

/// What survives a restart besides the tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default, rename = "albumId")]
    pub selector: Option<CollectionSelector>,
    #[serde(default)]
    pub position: usize,
}

pub trait SessionStore: Send + Sync {
    fn load(&self) -> Result<Option<SessionState>, SessionError>;
    fn save(&self, state: &SessionState) -> Result<(), SessionError>;
    fn clear(&self) -> Result<(), SessionError>;
}

impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    fn load(&self) -> Result<Option<SessionState>, SessionError> {
        (**self).load()
    }

    fn save(&self, state: &SessionState) -> Result<(), SessionError> {
        (**self).save(state)
    }

    fn clear(&self) -> Result<(), SessionError> {
        (**self).clear()
    }
}

pub const SESSION_FILE_NAME: &str = "session.json";

/// Session state as a JSON file.
pub struct JsonSessionStore {
    path: PathBuf,
}

impl JsonSessionStore {
    pub fn new(path: PathBuf) -> Self {
        JsonSessionStore { path }
    }

    /// `<dir>/session.json`
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(SESSION_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for JsonSessionStore {
    fn load(&self) -> Result<Option<SessionState>, SessionError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&data)?))
    }

    fn save(&self, state: &SessionState) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(state)?)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local store. Counts writes so callers can observe them.
#[derive(Default)]
pub struct MemorySessionStore {
    state: Mutex<Option<SessionState>>,
    writes: Mutex<usize>,
}

impl MemorySessionStore {
    pub fn new(state: Option<SessionState>) -> Self {
        MemorySessionStore {
            state: Mutex::new(state),
            writes: Mutex::new(0),
        }
    }

    pub fn writes(&self) -> usize {
        self.writes.lock().map(|w| *w).unwrap_or_default()
    }

    pub fn snapshot(&self) -> Option<SessionState> {
        self.state.lock().ok().and_then(|s| s.clone())
    }

    fn put(&self, state: Option<SessionState>) -> Result<(), SessionError> {
        *self.state.lock().map_err(poisoned)? = state;
        *self.writes.lock().map_err(poisoned)? += 1;
        Ok(())
    }
}

fn poisoned<T>(_: T) -> SessionError {
    SessionError::Store("session store lock poisoned".into())
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<SessionState>, SessionError> {
        self.state.lock().map(|s| s.clone()).map_err(poisoned)
    }

    fn save(&self, state: &SessionState) -> Result<(), SessionError> {
        self.put(Some(state.clone()))
    }

    fn clear(&self) -> Result<(), SessionError> {
        self.put(None)
    }
}

/// Explicit session context. Reads both stores once at startup and writes
/// through on every change.
pub struct Session {
    tokens: Box<dyn TokenStore>,
    store: Box<dyn SessionStore>,
    credentials: Option<Credentials>,
    state: SessionState,
}

impl Session {
    pub fn open(
        tokens: impl TokenStore + 'static,
        store: impl SessionStore + 'static,
    ) -> Result<Self, SessionError> {
        let credentials = tokens.load()?;
        let state = store.load()?.unwrap_or_default();
        tracing::debug!(
            signed_in = credentials.is_some(),
            selector = ?state.selector,
            position = state.position,
            "Session opened"
        );
        Ok(Session {
            tokens: Box::new(tokens),
            store: Box::new(store),
            credentials,
            state,
        })
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn is_signed_in(&self) -> bool {
        self.credentials.is_some()
    }

    pub fn selector(&self) -> Option<&CollectionSelector> {
        self.state.selector.as_ref()
    }

    pub fn position(&self) -> usize {
        self.state.position
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn set_credentials(&mut self, credentials: Credentials) -> Result<(), SessionError> {
        if self.credentials.as_ref() == Some(&credentials) {
            return Ok(());
        }
        self.tokens.save(&credentials)?;
        self.credentials = Some(credentials);
        Ok(())
    }

    /// Replace the access token, keeping the refresh token.
    pub fn update_access_token(&mut self, access_token: String) -> Result<(), SessionError> {
        let credentials = match &self.credentials {
            Some(current) => current.with_access_token(access_token),
            None => Credentials::new(access_token, None),
        };
        self.set_credentials(credentials)
    }

    /// Choose a collection. A different collection starts at its first item.
    pub fn select(&mut self, selector: CollectionSelector) -> Result<(), SessionError> {
        if self.state.selector.as_ref() == Some(&selector) {
            return Ok(());
        }
        tracing::info!(%selector, "Collection selected");
        self.state = SessionState {
            selector: Some(selector),
            position: 0,
        };
        self.store.save(&self.state)
    }

    pub fn set_position(&mut self, position: usize) -> Result<(), SessionError> {
        if self.state.position == position {
            return Ok(());
        }
        self.state.position = position;
        self.store.save(&self.state)
    }

    /// Forget the tokens and the selection.
    pub fn logout(&mut self) -> Result<(), SessionError> {
        self.tokens.clear()?;
        self.store.clear()?;
        self.credentials = None;
        self.state = SessionState::default();
        tracing::info!("Signed out");
        Ok(())
    }
}
