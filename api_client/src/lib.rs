//! API client module for the Google Photos Library API.

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://photoslibrary.googleapis.com";
/// Upper bound the search endpoint accepts for `pageSize`.
pub const MAX_SEARCH_PAGE_SIZE: usize = 100;
/// Upper bound the album endpoints accept for `pageSize`.
pub const MAX_ALBUM_PAGE_SIZE: usize = 50;
pub const DEFAULT_THUMBNAIL_WIDTH: u32 = 400;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub id: String,
    pub description: Option<String>,
    #[serde(default)]
    pub product_url: String,
    pub base_url: String,
    pub mime_type: String,
    pub media_metadata: MediaMetadata,
    pub filename: String,
}

impl MediaItem {
    /// Whether the upstream record describes a video.
    pub fn is_video(&self) -> bool {
        self.mime_type.starts_with("video/")
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaMetadata {
    pub creation_time: String,
    #[serde(default)]
    pub width: String,
    #[serde(default)]
    pub height: String,
    pub video: Option<VideoMetadata>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VideoMetadata {
    pub fps: Option<f64>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Album {
    pub id: String,
    pub title: Option<String>,
    pub product_url: Option<String>,
    pub is_writeable: Option<bool>,
    pub media_items_count: Option<String>,
    pub cover_photo_base_url: Option<String>,
    pub cover_photo_media_item_id: Option<String>,
}

/// Playable stream URL for a media base URL.
pub fn video_url(base_url: &str) -> String {
    format!("{}=dv", base_url)
}

/// Thumbnail URL constrained to `width` pixels for a media base URL.
pub fn thumbnail_url(base_url: &str, width: u32) -> String {
    format!("{}=w{}", base_url, width)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListMediaItemsResponse {
    media_items: Option<Vec<MediaItem>>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListAlbumsResponse {
    albums: Option<Vec<Album>>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListSharedAlbumsResponse {
    shared_albums: Option<Vec<Album>>,
    next_page_token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaType {
    AllMedia,
    Video,
    Photo,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaTypeFilter {
    pub media_types: Vec<MediaType>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilters {
    pub media_type_filter: MediaTypeFilter,
}

impl SearchFilters {
    pub fn videos_only() -> Self {
        SearchFilters {
            media_type_filter: MediaTypeFilter {
                media_types: vec![MediaType::Video],
            },
        }
    }
}

/// Body of `POST /v1/mediaItems:search`.
///
/// The service rejects `album_id` combined with `filters`, so callers set at
/// most one of them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMediaItemsRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album_id: Option<String>,
    pub page_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<SearchFilters>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiClientError {
    #[error("Request Error: {0}")]
    RequestError(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Permission Denied: {0}")]
    PermissionDenied(String),
    #[error("Rate Limited: {0}")]
    RateLimited(String),
    #[error("Google API Error ({status}): {message}")]
    GoogleApiError { status: u16, message: String },
}

impl ApiClientError {
    fn from_status(status: StatusCode, message: String) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => ApiClientError::Unauthorized(message),
            StatusCode::FORBIDDEN => ApiClientError::PermissionDenied(message),
            StatusCode::TOO_MANY_REQUESTS => ApiClientError::RateLimited(message),
            other => ApiClientError::GoogleApiError {
                status: other.as_u16(),
                message,
            },
        }
    }
}

/// Read operations of the library service used by this workspace.
///
/// Each call takes the bearer token explicitly so a caller can retry the same
/// sequence with a refreshed token.
#[allow(async_fn_in_trait)]
pub trait PhotosLibrary {
    async fn list_albums(
        &self,
        access_token: &str,
        page_size: usize,
        page_token: Option<String>,
    ) -> Result<(Vec<Album>, Option<String>), ApiClientError>;

    async fn list_shared_albums(
        &self,
        access_token: &str,
        page_size: usize,
        page_token: Option<String>,
    ) -> Result<(Vec<Album>, Option<String>), ApiClientError>;

    async fn search_media_items(
        &self,
        access_token: &str,
        request: &SearchMediaItemsRequest,
    ) -> Result<(Vec<MediaItem>, Option<String>), ApiClientError>;
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL.to_string())
    }

    /// Create a new client with a custom API base URL. Mainly used for testing.
    pub fn with_base_url(base_url: String) -> Self {
        ApiClient {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        access_token: &str,
    ) -> Result<T, ApiClientError> {
        let response = request
            .header(AUTHORIZATION, format!("Bearer {}", access_token))
            .send()
            .await
            .map_err(|e| ApiClientError::RequestError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::debug!(status = status.as_u16(), "Library request rejected");
            return Err(ApiClientError::from_status(status, error_text));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ApiClientError::RequestError(e.to_string()))
    }

    fn album_page_request(
        &self,
        path: &str,
        page_size: usize,
        page_token: Option<String>,
    ) -> reqwest::RequestBuilder {
        let mut query = vec![("pageSize", page_size.to_string())];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }
        self.client
            .get(format!("{}{}", self.base_url, path))
            .query(&query)
    }
}

impl PhotosLibrary for ApiClient {
    #[cfg_attr(feature = "trace-spans", tracing::instrument(skip(self, access_token)))]
    async fn list_albums(
        &self,
        access_token: &str,
        page_size: usize,
        page_token: Option<String>,
    ) -> Result<(Vec<Album>, Option<String>), ApiClientError> {
        let request = self.album_page_request("/v1/albums", page_size, page_token);
        let list_response: ListAlbumsResponse = self.send(request, access_token).await?;
        Ok((
            list_response.albums.unwrap_or_default(),
            list_response.next_page_token,
        ))
    }

    #[cfg_attr(feature = "trace-spans", tracing::instrument(skip(self, access_token)))]
    async fn list_shared_albums(
        &self,
        access_token: &str,
        page_size: usize,
        page_token: Option<String>,
    ) -> Result<(Vec<Album>, Option<String>), ApiClientError> {
        let request = self.album_page_request("/v1/sharedAlbums", page_size, page_token);
        let list_response: ListSharedAlbumsResponse = self.send(request, access_token).await?;
        Ok((
            list_response.shared_albums.unwrap_or_default(),
            list_response.next_page_token,
        ))
    }

    #[cfg_attr(feature = "trace-spans", tracing::instrument(skip(self, access_token)))]
    async fn search_media_items(
        &self,
        access_token: &str,
        request: &SearchMediaItemsRequest,
    ) -> Result<(Vec<MediaItem>, Option<String>), ApiClientError> {
        let builder = self
            .client
            .post(format!("{}/v1/mediaItems:search", self.base_url))
            .header(CONTENT_TYPE, "application/json")
            .json(request);

        let search_response: ListMediaItemsResponse = self.send(builder, access_token).await?;
        Ok((
            search_response.media_items.unwrap_or_default(),
            search_response.next_page_token,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[test]
    fn test_parse_list_albums_response() {
        let json = r#"{
            "albums": [
                {
                    "id": "1",
                    "title": "Test Album",
                    "productUrl": "http://example.com/album/1",
                    "isWriteable": true,
                    "mediaItemsCount": "10",
                    "coverPhotoBaseUrl": "http://example.com/base.jpg",
                    "coverPhotoMediaItemId": "cover1"
                }
            ],
            "nextPageToken": "token123"
        }"#;

        let parsed: ListAlbumsResponse = serde_json::from_str(json).unwrap();
        let albums = parsed.albums.unwrap();
        assert_eq!(albums.len(), 1);
        assert_eq!(albums[0].id, "1");
        assert_eq!(albums[0].title.as_deref(), Some("Test Album"));
        assert_eq!(parsed.next_page_token, Some("token123".to_string()));
    }

    #[test]
    fn test_parse_video_item_with_metadata() {
        let json = r#"{
            "id": "v1",
            "productUrl": "https://photos.google.com/lr/photo/v1",
            "baseUrl": "https://lh3.googleusercontent.com/v1",
            "mimeType": "video/mp4",
            "mediaMetadata": {
                "creationTime": "2023-05-01T10:00:00Z",
                "width": "1080",
                "height": "1920",
                "video": { "fps": 29.97, "status": "READY" }
            },
            "filename": "clip.mp4"
        }"#;

        let item: MediaItem = serde_json::from_str(json).unwrap();
        assert!(item.is_video());
        let video = item.media_metadata.video.unwrap();
        assert_eq!(video.status.as_deref(), Some("READY"));
        assert!(item.description.is_none());
    }

    #[test]
    fn test_url_derivation() {
        assert_eq!(video_url("https://lh3/abc"), "https://lh3/abc=dv");
        assert_eq!(thumbnail_url("https://lh3/abc", 400), "https://lh3/abc=w400");
        assert_eq!(thumbnail_url("https://lh3/abc", 150), "https://lh3/abc=w150");
    }

    #[test]
    fn test_search_request_shapes() {
        let album = SearchMediaItemsRequest {
            album_id: Some("a1".into()),
            page_size: 100,
            page_token: None,
            filters: None,
        };
        assert_eq!(
            serde_json::to_value(&album).unwrap(),
            json!({ "albumId": "a1", "pageSize": 100 })
        );

        let library = SearchMediaItemsRequest {
            album_id: None,
            page_size: 50,
            page_token: Some("next".into()),
            filters: Some(SearchFilters::videos_only()),
        };
        assert_eq!(
            serde_json::to_value(&library).unwrap(),
            json!({
                "pageSize": 50,
                "pageToken": "next",
                "filters": { "mediaTypeFilter": { "mediaTypes": ["VIDEO"] } }
            })
        );
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            ApiClientError::from_status(StatusCode::UNAUTHORIZED, "x".into()),
            ApiClientError::Unauthorized(_)
        ));
        assert!(matches!(
            ApiClientError::from_status(StatusCode::FORBIDDEN, "x".into()),
            ApiClientError::PermissionDenied(_)
        ));
        assert!(matches!(
            ApiClientError::from_status(StatusCode::TOO_MANY_REQUESTS, "x".into()),
            ApiClientError::RateLimited(_)
        ));
        assert_eq!(
            ApiClientError::from_status(StatusCode::BAD_REQUEST, "bad".into()),
            ApiClientError::GoogleApiError {
                status: 400,
                message: "bad".into()
            }
        );
    }

    #[tokio::test]
    async fn test_search_sends_bearer_and_body() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/mediaItems:search")
                    .header("authorization", "Bearer test")
                    .json_body(json!({
                        "pageSize": 100,
                        "filters": { "mediaTypeFilter": { "mediaTypes": ["VIDEO"] } }
                    }));
                then.status(200).json_body(json!({
                    "mediaItems": [{
                        "id": "v1",
                        "baseUrl": "https://lh3/v1",
                        "mimeType": "video/mp4",
                        "mediaMetadata": { "creationTime": "2023-01-01T00:00:00Z" },
                        "filename": "v1.mp4"
                    }],
                    "nextPageToken": "p2"
                }));
            })
            .await;

        let client = ApiClient::with_base_url(server.base_url());
        let request = SearchMediaItemsRequest {
            album_id: None,
            page_size: 100,
            page_token: None,
            filters: Some(SearchFilters::videos_only()),
        };
        let (items, token) = client.search_media_items("test", &request).await.unwrap();
        mock.assert_async().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "v1");
        assert_eq!(token.as_deref(), Some("p2"));
    }

    #[tokio::test]
    async fn test_expired_token_maps_to_unauthorized() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/mediaItems:search");
                then.status(401).body("{\"error\":{\"status\":\"UNAUTHENTICATED\"}}");
            })
            .await;

        let client = ApiClient::with_base_url(server.base_url());
        let request = SearchMediaItemsRequest {
            album_id: Some("a1".into()),
            page_size: 100,
            page_token: None,
            filters: None,
        };
        let err = client.search_media_items("old", &request).await.unwrap_err();
        assert!(matches!(err, ApiClientError::Unauthorized(ref body) if body.contains("UNAUTHENTICATED")));
    }

    #[tokio::test]
    async fn test_shared_albums_query_and_parse() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/v1/sharedAlbums")
                    .query_param("pageSize", "50")
                    .query_param("pageToken", "s2")
                    .header("authorization", "Bearer test");
                then.status(200).json_body(json!({
                    "sharedAlbums": [{ "id": "s1", "title": "Trip" }]
                }));
            })
            .await;

        let client = ApiClient::with_base_url(server.base_url());
        let (albums, token) = client
            .list_shared_albums("test", 50, Some("s2".into()))
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(albums[0].id, "s1");
        assert!(token.is_none());
    }

    #[tokio::test]
    async fn test_forbidden_album_listing() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/albums");
                then.status(403).body("PERMISSION_DENIED");
            })
            .await;

        let client = ApiClient::with_base_url(server.base_url());
        let err = client.list_albums("test", 50, None).await.unwrap_err();
        assert_eq!(err, ApiClientError::PermissionDenied("PERMISSION_DENIED".into()));
    }
}
