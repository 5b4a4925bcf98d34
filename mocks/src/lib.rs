//! Test doubles shared by the workspace: HTTP mock servers for the OAuth token
//! endpoint and the library endpoints, plus an in-memory [`FakeLibrary`].

use api_client::{
    Album, ApiClientError, MediaItem, MediaMetadata, PhotosLibrary, SearchMediaItemsRequest,
    VideoMetadata,
};
use httptest::{matchers::*, responders::*, Expectation, Server};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;

/// Create a mock server for the OAuth token endpoint.
/// The server will respond to POST `/token` with a fixed access token.
pub fn token_server(access_token: &str) -> Server {
    let server = Server::run();
    server.expect(
        Expectation::matching(all_of![request::method_path("POST", "/token"),]).respond_with(
            json_encoded(json!({
                "access_token": access_token,
                "token_type": "Bearer",
                "expires_in": 3600
            })),
        ),
    );
    server
}

/// Token endpoint that answers once with `invalid_grant`.
pub fn rejecting_token_server() -> Server {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("POST", "/token")).respond_with(
            status_code(400)
                .insert_header("Content-Type", "application/json")
                .body(json!({ "error": "invalid_grant" }).to_string()),
        ),
    );
    server
}

/// Create an empty mock server for Google Photos API endpoints.
pub fn photos_server() -> Server {
    Server::run()
}

/// Base URL of a mock server without a trailing slash.
pub fn base_url(server: &Server) -> String {
    server.url_str("/").trim_end_matches('/').to_string()
}

pub fn video_item_json(id: &str) -> serde_json::Value {
    json!({
        "id": id,
        "productUrl": format!("https://example.com/{}", id),
        "baseUrl": format!("https://example.com/base/{}", id),
        "mimeType": "video/mp4",
        "mediaMetadata": {
            "creationTime": "2023-01-01T00:00:00Z",
            "width": "1080",
            "height": "1920",
            "video": { "fps": 30.0, "status": "READY" }
        },
        "filename": format!("{}.mp4", id)
    })
}

/// Expect one GET `/v1/albums` answered with `albums`.
pub fn expect_albums(server: &Server, albums: serde_json::Value) {
    server.expect(
        Expectation::matching(request::method_path("GET", "/v1/albums"))
            .respond_with(json_encoded(json!({ "albums": albums }))),
    );
}

/// Expect one GET `/v1/sharedAlbums` answered with `albums`.
pub fn expect_shared_albums(server: &Server, albums: serde_json::Value) {
    server.expect(
        Expectation::matching(request::method_path("GET", "/v1/sharedAlbums"))
            .respond_with(json_encoded(json!({ "sharedAlbums": albums }))),
    );
}

/// Expect one GET on `path` answered with an error status.
pub fn expect_failure(server: &Server, method: &'static str, path: &'static str, status: u16) {
    server.expect(
        Expectation::matching(request::method_path(method, path))
            .respond_with(status_code(status).body("{\"error\":{\"status\":\"FAILED\"}}")),
    );
}

/// Expect one POST `/v1/mediaItems:search` answered with a final page.
pub fn expect_search(server: &Server, items: serde_json::Value) {
    server.expect(
        Expectation::matching(request::method_path("POST", "/v1/mediaItems:search"))
            .respond_with(json_encoded(json!({ "mediaItems": items }))),
    );
}

pub fn video_item(id: &str) -> MediaItem {
    MediaItem {
        id: id.to_string(),
        description: None,
        product_url: format!("https://example.com/{}", id),
        base_url: format!("https://example.com/base/{}", id),
        mime_type: "video/mp4".into(),
        media_metadata: MediaMetadata {
            creation_time: "2023-01-01T00:00:00Z".into(),
            width: "1080".into(),
            height: "1920".into(),
            video: Some(VideoMetadata {
                fps: Some(30.0),
                status: Some("READY".into()),
            }),
        },
        filename: format!("{}.mp4", id),
    }
}

pub fn photo_item(id: &str) -> MediaItem {
    MediaItem {
        mime_type: "image/jpeg".into(),
        filename: format!("{}.jpg", id),
        media_metadata: MediaMetadata {
            creation_time: "2023-01-01T00:00:00Z".into(),
            width: "1".into(),
            height: "1".into(),
            video: None,
        },
        ..video_item(id)
    }
}

/// `pages` pages of `per_page` videos with ids `v<page>-<index>`.
pub fn video_pages(pages: usize, per_page: usize) -> Vec<Vec<MediaItem>> {
    (0..pages)
        .map(|p| {
            (0..per_page)
                .map(|i| video_item(&format!("v{}-{}", p, i)))
                .collect()
        })
        .collect()
}

pub fn album(id: &str, title: &str, count: Option<&str>) -> Album {
    Album {
        id: id.to_string(),
        title: Some(title.to_string()),
        product_url: None,
        is_writeable: None,
        media_items_count: count.map(str::to_string),
        cover_photo_base_url: None,
        cover_photo_media_item_id: None,
    }
}

/// One recorded search request.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchCall {
    pub access_token: String,
    pub request: SearchMediaItemsRequest,
}

/// In-memory library serving fixed pages with `page-<n>` continuation tokens.
///
/// When an accepted token is configured every other token is answered with
/// `Unauthorized`, which models an expired access token.
#[derive(Default)]
pub struct FakeLibrary {
    media_pages: Vec<Vec<MediaItem>>,
    owned_albums: Vec<Vec<Album>>,
    shared_albums: Vec<Vec<Album>>,
    owned_failure: Option<ApiClientError>,
    shared_failure: Option<ApiClientError>,
    search_failure: Option<ApiClientError>,
    album_failures: HashMap<String, ApiClientError>,
    ignore_page_size: bool,
    accepted_token: Option<String>,
    searches: Mutex<Vec<SearchCall>>,
    album_requests: Mutex<Vec<String>>,
}

impl FakeLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_media_pages(mut self, pages: Vec<Vec<MediaItem>>) -> Self {
        self.media_pages = pages;
        self
    }

    pub fn with_owned_albums(mut self, pages: Vec<Vec<Album>>) -> Self {
        self.owned_albums = pages;
        self
    }

    pub fn with_shared_albums(mut self, pages: Vec<Vec<Album>>) -> Self {
        self.shared_albums = pages;
        self
    }

    pub fn failing_owned(mut self, err: ApiClientError) -> Self {
        self.owned_failure = Some(err);
        self
    }

    pub fn failing_shared(mut self, err: ApiClientError) -> Self {
        self.shared_failure = Some(err);
        self
    }

    pub fn failing_search(mut self, err: ApiClientError) -> Self {
        self.search_failure = Some(err);
        self
    }

    /// Fail searches scoped to `album_id` only.
    pub fn failing_album(mut self, album_id: &str, err: ApiClientError) -> Self {
        self.album_failures.insert(album_id.to_string(), err);
        self
    }

    /// Serve whole pages even when the request asks for fewer items.
    pub fn ignoring_page_size(mut self) -> Self {
        self.ignore_page_size = true;
        self
    }

    pub fn accepting_token(mut self, token: &str) -> Self {
        self.accepted_token = Some(token.to_string());
        self
    }

    pub fn searches(&self) -> Vec<SearchCall> {
        self.searches.lock().unwrap().clone()
    }

    /// Endpoints hit by album listings, e.g. `albums:page-1`.
    pub fn album_requests(&self) -> Vec<String> {
        self.album_requests.lock().unwrap().clone()
    }

    fn check_token(&self, access_token: &str) -> Result<(), ApiClientError> {
        match &self.accepted_token {
            Some(accepted) if accepted != access_token => {
                Err(ApiClientError::Unauthorized("token expired".into()))
            }
            _ => Ok(()),
        }
    }

    fn album_page(
        &self,
        endpoint: &str,
        pages: &[Vec<Album>],
        failure: &Option<ApiClientError>,
        access_token: &str,
        page_token: Option<String>,
    ) -> Result<(Vec<Album>, Option<String>), ApiClientError> {
        let index = page_index(page_token.as_deref());
        self.album_requests
            .lock()
            .unwrap()
            .push(format!("{}:page-{}", endpoint, index));
        self.check_token(access_token)?;
        if let Some(err) = failure {
            return Err(err.clone());
        }
        let albums = pages.get(index).cloned().unwrap_or_default();
        Ok((albums, next_token(index, pages.len())))
    }
}

fn page_index(token: Option<&str>) -> usize {
    token
        .and_then(|t| t.strip_prefix("page-"))
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

fn next_token(index: usize, len: usize) -> Option<String> {
    if index + 1 < len {
        Some(format!("page-{}", index + 1))
    } else {
        None
    }
}

impl PhotosLibrary for FakeLibrary {
    async fn list_albums(
        &self,
        access_token: &str,
        _page_size: usize,
        page_token: Option<String>,
    ) -> Result<(Vec<Album>, Option<String>), ApiClientError> {
        self.album_page(
            "albums",
            &self.owned_albums,
            &self.owned_failure,
            access_token,
            page_token,
        )
    }

    async fn list_shared_albums(
        &self,
        access_token: &str,
        _page_size: usize,
        page_token: Option<String>,
    ) -> Result<(Vec<Album>, Option<String>), ApiClientError> {
        self.album_page(
            "sharedAlbums",
            &self.shared_albums,
            &self.shared_failure,
            access_token,
            page_token,
        )
    }

    async fn search_media_items(
        &self,
        access_token: &str,
        request: &SearchMediaItemsRequest,
    ) -> Result<(Vec<MediaItem>, Option<String>), ApiClientError> {
        self.searches.lock().unwrap().push(SearchCall {
            access_token: access_token.to_string(),
            request: request.clone(),
        });
        self.check_token(access_token)?;
        if let Some(err) = &self.search_failure {
            return Err(err.clone());
        }
        if let Some(err) = request
            .album_id
            .as_ref()
            .and_then(|id| self.album_failures.get(id))
        {
            return Err(err.clone());
        }
        let index = page_index(request.page_token.as_deref());
        let take = if self.ignore_page_size {
            usize::MAX
        } else {
            request.page_size
        };
        let items = self
            .media_pages
            .get(index)
            .map(|page| page.iter().take(take).cloned().collect())
            .unwrap_or_default();
        Ok((items, next_token(index, self.media_pages.len())))
    }
}
