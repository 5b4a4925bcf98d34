//! Retrieval of video collections and album listings from the library service.

use api_client::{
    ApiClientError, PhotosLibrary, SearchFilters, SearchMediaItemsRequest,
    DEFAULT_THUMBNAIL_WIDTH, MAX_SEARCH_PAGE_SIZE,
};
use std::fmt::Display;
use std::future::Future;
use thiserror::Error;
use tokio::sync::mpsc;

mod albums;
mod model;

pub use albums::{AlbumListing, AlbumOrigin, LibraryAlbum};
pub use model::{CollectionSelector, MediaCollection, VideoItem, ALL_VIDEOS, LIBRARY_VIDEO_LIMIT};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Access token expired or revoked: {0}")]
    AuthExpired(String),
    #[error("Access denied ({0}). Enable the Google Photos Library API for this OAuth client in the Google Cloud Console.")]
    PermissionDenied(String),
    #[error("Quota exceeded: {0}")]
    Quota(String),
    #[error("Network Error: {0}")]
    Network(String),
    #[error("API Error: {0}")]
    Api(String),
    #[error("Token refresh failed: {0}")]
    Refresh(String),
}

impl FetchError {
    /// Short tag for logs and status lines.
    pub fn code(&self) -> &'static str {
        match self {
            FetchError::AuthExpired(_) => "auth",
            FetchError::PermissionDenied(_) => "permission",
            FetchError::Quota(_) => "quota",
            FetchError::Network(_) => "network",
            FetchError::Api(_) => "api",
            FetchError::Refresh(_) => "refresh",
        }
    }
}

impl From<ApiClientError> for FetchError {
    fn from(err: ApiClientError) -> Self {
        match err {
            ApiClientError::Unauthorized(msg) => FetchError::AuthExpired(msg),
            ApiClientError::PermissionDenied(msg) => FetchError::PermissionDenied(msg),
            ApiClientError::RateLimited(msg) => FetchError::Quota(msg),
            ApiClientError::RequestError(msg) => FetchError::Network(msg),
            e @ ApiClientError::GoogleApiError { .. } => FetchError::Api(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchProgress {
    Started,
    PageFetched { page: usize, total: usize },
    RefreshingToken,
    Finished(usize),
}

/// Result of [`MediaFetcher::fetch_collection`].
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    pub items: MediaCollection,
    /// Set when the access token was refreshed during the fetch.
    pub refreshed_token: Option<String>,
}

pub struct MediaFetcher<L> {
    library: L,
    thumbnail_width: u32,
    library_limit: usize,
    progress: Option<mpsc::UnboundedSender<FetchProgress>>,
}

impl<L: PhotosLibrary> MediaFetcher<L> {
    pub fn new(library: L) -> Self {
        MediaFetcher {
            library,
            thumbnail_width: DEFAULT_THUMBNAIL_WIDTH,
            library_limit: LIBRARY_VIDEO_LIMIT,
            progress: None,
        }
    }

    pub fn with_thumbnail_width(mut self, width: u32) -> Self {
        self.thumbnail_width = width;
        self
    }

    /// Replace the default cap for whole-library fetches.
    pub fn with_library_limit(mut self, limit: usize) -> Self {
        self.library_limit = limit;
        self
    }

    pub fn with_progress(mut self, progress: mpsc::UnboundedSender<FetchProgress>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn library(&self) -> &L {
        &self.library
    }

    pub fn resolve_limit(
        &self,
        selector: &CollectionSelector,
        page_limit: Option<usize>,
    ) -> Option<usize> {
        page_limit.or(selector.default_limit(self.library_limit))
    }

    fn report(&self, progress: FetchProgress) {
        if let Some(tx) = &self.progress {
            if let Err(e) = tx.send(progress) {
                tracing::warn!(error = %e, "Failed to send fetch progress");
            }
        }
    }

    /// Fetch the videos selected by `selector`.
    ///
    /// If the service rejects the token, `refresh` is awaited once and the
    /// whole page sequence restarts from the first page with the new token.
    /// Any failure after that propagates unchanged.
    #[cfg_attr(
        feature = "trace-spans",
        tracing::instrument(skip(self, access_token, refresh))
    )]
    pub async fn fetch_collection<F, Fut, E>(
        &self,
        access_token: &str,
        selector: &CollectionSelector,
        page_limit: Option<usize>,
        refresh: F,
    ) -> Result<Fetched, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, E>>,
        E: Display,
    {
        let limit = self.resolve_limit(selector, page_limit);
        tracing::info!(%selector, ?limit, "Fetching video collection");
        self.report(FetchProgress::Started);

        let fetched = match self.fetch_pages(access_token, selector, limit).await {
            Err(FetchError::AuthExpired(reason)) => {
                tracing::warn!(%reason, "Access token rejected, refreshing once");
                self.report(FetchProgress::RefreshingToken);
                let token = refresh()
                    .await
                    .map_err(|e| FetchError::Refresh(e.to_string()))?;
                let items = self.fetch_pages(&token, selector, limit).await?;
                Fetched {
                    items,
                    refreshed_token: Some(token),
                }
            }
            other => Fetched {
                items: other?,
                refreshed_token: None,
            },
        };

        if fetched.items.is_empty() {
            tracing::info!(%selector, "No videos found in collection");
        } else {
            tracing::info!(%selector, total = fetched.items.len(), "Video collection fetched");
        }
        self.report(FetchProgress::Finished(fetched.items.len()));
        Ok(fetched)
    }

    async fn fetch_pages(
        &self,
        access_token: &str,
        selector: &CollectionSelector,
        limit: Option<usize>,
    ) -> Result<MediaCollection, FetchError> {
        let mut items = MediaCollection::new();
        if limit == Some(0) {
            return Ok(items);
        }

        // The service refuses filters combined with an album id, so album
        // pages are filtered here instead.
        let (album_id, filters) = match selector {
            CollectionSelector::Album(id) => (Some(id.clone()), None),
            CollectionSelector::Library => (None, Some(SearchFilters::videos_only())),
        };

        let mut page_token: Option<String> = None;
        let mut page = 0;
        loop {
            let page_size = match limit {
                Some(cap) => (cap - items.len()).min(MAX_SEARCH_PAGE_SIZE),
                None => MAX_SEARCH_PAGE_SIZE,
            };
            let request = SearchMediaItemsRequest {
                album_id: album_id.clone(),
                page_size,
                page_token: page_token.take(),
                filters: filters.clone(),
            };

            let (media_items, next_page_token) = self
                .library
                .search_media_items(access_token, &request)
                .await?;
            page += 1;

            let received = media_items.len();
            items.extend(
                media_items
                    .iter()
                    .filter(|item| item.is_video())
                    .map(|item| VideoItem::from_media_item(item, self.thumbnail_width)),
            );
            tracing::debug!(page, received, total = items.len(), "Fetched media page");
            self.report(FetchProgress::PageFetched {
                page,
                total: items.len(),
            });

            if let Some(cap) = limit {
                if items.len() >= cap {
                    items.truncate(cap);
                    break;
                }
            }
            match next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(items)
    }
}
