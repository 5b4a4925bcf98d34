//! Ties a [`Session`], a [`MediaFetcher`] and a [`Navigator`] together.

use crate::navigator::{Gesture, Navigator};
use crate::session::{Session, SessionError};
use api_client::PhotosLibrary;
use auth::{AuthError, TokenRefresher};
use fetcher::{AlbumListing, CollectionSelector, FetchError, MediaFetcher, VideoItem};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("Not signed in. Run `photoscroll login` first.")]
    NotSignedIn,
    #[error("No collection selected. Pick an album or all videos first.")]
    NoSelection,
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewStatus {
    Idle,
    Loading,
    Ready,
    /// The collection holds no videos.
    Empty,
    Failed {
        message: String,
        /// The API is not enabled or the scope was not granted.
        permission: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewerInput {
    Gesture(Gesture),
    Tap(usize),
    Next,
    Previous,
    Ended,
}

pub struct Viewer<L, R> {
    fetcher: MediaFetcher<L>,
    refresher: R,
    session: Session,
    navigator: Navigator,
    status: ViewStatus,
}

async fn refresh_with<R: TokenRefresher>(
    refresher: &R,
    refresh_token: Option<String>,
) -> Result<String, AuthError> {
    match refresh_token {
        Some(token) => refresher.refresh_access_token(&token).await,
        None => Err(AuthError::NoRefreshToken),
    }
}

impl<L: PhotosLibrary, R: TokenRefresher> Viewer<L, R> {
    pub fn new(fetcher: MediaFetcher<L>, refresher: R, session: Session) -> Self {
        Viewer {
            fetcher,
            refresher,
            session,
            navigator: Navigator::new(),
            status: ViewStatus::Idle,
        }
    }

    pub fn status(&self) -> &ViewStatus {
        &self.status
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    pub fn navigator_mut(&mut self) -> &mut Navigator {
        &mut self.navigator
    }

    pub fn current(&self) -> Option<&VideoItem> {
        self.navigator.current()
    }

    /// Select `selector` and load it.
    pub async fn open(
        &mut self,
        selector: CollectionSelector,
        page_limit: Option<usize>,
    ) -> Result<usize, ViewerError> {
        self.session.select(selector)?;
        self.load(page_limit).await
    }

    /// Fetch the selected collection, install it and restore the saved
    /// position. Returns the number of videos installed.
    #[cfg_attr(feature = "trace-spans", tracing::instrument(skip(self)))]
    pub async fn load(&mut self, page_limit: Option<usize>) -> Result<usize, ViewerError> {
        let credentials = self
            .session
            .credentials()
            .cloned()
            .ok_or(ViewerError::NotSignedIn)?;
        let selector = self
            .session
            .selector()
            .cloned()
            .ok_or(ViewerError::NoSelection)?;

        self.status = ViewStatus::Loading;
        let refresher = &self.refresher;
        let refresh_token = credentials.refresh_token.clone();
        let result = self
            .fetcher
            .fetch_collection(&credentials.access_token, &selector, page_limit, move || {
                refresh_with(refresher, refresh_token)
            })
            .await;

        let fetched = match result {
            Ok(fetched) => fetched,
            Err(e) => {
                tracing::error!(code = e.code(), error = %e, "Failed to load collection");
                self.navigator.set_collection(Vec::new());
                self.status = ViewStatus::Failed {
                    message: e.to_string(),
                    permission: matches!(e, FetchError::PermissionDenied(_)),
                };
                return Err(e.into());
            }
        };

        if let Some(token) = fetched.refreshed_token {
            self.session.update_access_token(token)?;
        }

        let len = fetched.items.len();
        self.navigator.set_collection(fetched.items);
        let saved = self.session.position();
        if saved < len {
            self.navigator.go_to(saved);
        } else {
            self.session.set_position(0)?;
        }

        self.status = if len == 0 {
            ViewStatus::Empty
        } else {
            ViewStatus::Ready
        };
        Ok(len)
    }

    /// List owned and shared albums, refreshing the token once if the
    /// service rejected it.
    pub async fn albums(&mut self) -> Result<AlbumListing, ViewerError> {
        let credentials = self
            .session
            .credentials()
            .cloned()
            .ok_or(ViewerError::NotSignedIn)?;

        let listing = self.fetcher.fetch_albums(&credentials.access_token).await;
        if !listing.auth_expired() {
            return Ok(listing);
        }

        tracing::warn!("Album listing rejected the access token, refreshing once");
        let token = match refresh_with(&self.refresher, credentials.refresh_token).await {
            Ok(token) => token,
            Err(e) => {
                tracing::error!(error = %e, "Token refresh failed, keeping partial album listing");
                return Ok(listing.with_refresh_failure(e.to_string()));
            }
        };
        self.session.update_access_token(token.clone())?;
        Ok(self.fetcher.fetch_albums(&token).await)
    }

    /// Sign out and drop the installed collection.
    pub fn logout(&mut self) -> Result<(), ViewerError> {
        self.session.logout()?;
        self.navigator.set_collection(Vec::new());
        self.status = ViewStatus::Idle;
        Ok(())
    }

    /// Route one input to the navigator. A position change is persisted.
    pub fn handle(&mut self, input: ViewerInput) -> Result<Option<usize>, ViewerError> {
        let moved = match input {
            ViewerInput::Gesture(gesture) => self.navigator.on_gesture(gesture),
            ViewerInput::Tap(index) => self.navigator.go_to(index),
            ViewerInput::Next => self.navigator.advance(),
            ViewerInput::Previous => self.navigator.retreat(),
            ViewerInput::Ended => self.navigator.on_item_ended(),
        };
        if moved {
            if let Some(position) = self.navigator.position() {
                self.session.set_position(position)?;
            }
        }
        Ok(self.navigator.position())
    }
}
