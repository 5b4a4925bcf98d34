//! Owned and shared album listing.

use crate::{CollectionSelector, FetchError, MediaFetcher};
use api_client::{Album, PhotosLibrary, MAX_ALBUM_PAGE_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlbumOrigin {
    Owned,
    Shared,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LibraryAlbum {
    pub album: Album,
    pub origin: AlbumOrigin,
}

impl LibraryAlbum {
    pub fn title(&self) -> &str {
        self.album.title.as_deref().unwrap_or("Untitled Album")
    }

    /// Item count as reported upstream. The service is known to report 0 for
    /// albums that do hold videos, so this is for display only.
    pub fn reported_count(&self) -> Option<u64> {
        self.album
            .media_items_count
            .as_deref()
            .and_then(|c| c.parse().ok())
    }

    pub fn selector(&self) -> CollectionSelector {
        CollectionSelector::Album(self.album.id.clone())
    }
}

/// Albums from both sources. A source that failed contributes no albums and
/// one entry in `failures`.
#[derive(Debug, Default)]
pub struct AlbumListing {
    pub albums: Vec<LibraryAlbum>,
    pub failures: Vec<(AlbumOrigin, FetchError)>,
}

impl AlbumListing {
    /// Albums to offer for selection. Albums reporting exactly zero items
    /// are hidden unless `show_all`; albums without a count always show.
    pub fn visible(&self, show_all: bool) -> impl Iterator<Item = &LibraryAlbum> {
        self.albums
            .iter()
            .filter(move |a| show_all || a.reported_count() != Some(0))
    }

    pub fn permission_denied(&self) -> bool {
        self.failures
            .iter()
            .any(|(_, e)| matches!(e, FetchError::PermissionDenied(_)))
    }

    pub fn auth_expired(&self) -> bool {
        self.failures
            .iter()
            .any(|(_, e)| matches!(e, FetchError::AuthExpired(_)))
    }

    /// Record that renewing the token failed: every source rejected for an
    /// expired token is reported as a refresh failure instead.
    pub fn with_refresh_failure(mut self, reason: String) -> Self {
        for (_, e) in &mut self.failures {
            if matches!(e, FetchError::AuthExpired(_)) {
                *e = FetchError::Refresh(reason.clone());
            }
        }
        self
    }
}

impl<L: PhotosLibrary> MediaFetcher<L> {
    /// List owned and shared albums concurrently. Never fails as a whole.
    #[cfg_attr(feature = "trace-spans", tracing::instrument(skip_all))]
    pub async fn fetch_albums(&self, access_token: &str) -> AlbumListing {
        let (owned, shared) = tokio::join!(
            self.collect_albums(access_token, AlbumOrigin::Owned),
            self.collect_albums(access_token, AlbumOrigin::Shared),
        );

        let mut listing = AlbumListing::default();
        for (origin, result) in [(AlbumOrigin::Owned, owned), (AlbumOrigin::Shared, shared)] {
            match result {
                Ok(albums) => listing
                    .albums
                    .extend(albums.into_iter().map(|album| LibraryAlbum { album, origin })),
                Err(e) => {
                    tracing::error!(?origin, code = e.code(), error = %e, "Album listing failed, continuing without it");
                    listing.failures.push((origin, e));
                }
            }
        }

        tracing::info!(
            albums = listing.albums.len(),
            failed_sources = listing.failures.len(),
            "Albums listed"
        );
        listing
    }

    async fn collect_albums(
        &self,
        access_token: &str,
        origin: AlbumOrigin,
    ) -> Result<Vec<Album>, FetchError> {
        let mut albums = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let (page, next_page_token) = match origin {
                AlbumOrigin::Owned => {
                    self.library
                        .list_albums(access_token, MAX_ALBUM_PAGE_SIZE, page_token.take())
                        .await?
                }
                AlbumOrigin::Shared => {
                    self.library
                        .list_shared_albums(access_token, MAX_ALBUM_PAGE_SIZE, page_token.take())
                        .await?
                }
            };
            albums.extend(page);
            match next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(albums)
    }
}
