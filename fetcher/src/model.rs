//! Playable items and collection selectors.

use api_client::{thumbnail_url, video_url, MediaItem, DEFAULT_THUMBNAIL_WIDTH};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Reserved selector value meaning "every video in the library".
pub const ALL_VIDEOS: &str = "ALL_VIDEOS";

/// Cap applied to whole-library fetches unless the caller asks otherwise.
pub const LIBRARY_VIDEO_LIMIT: usize = 50;

/// Which media items to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CollectionSelector {
    Album(String),
    /// Entire library, most recent first.
    Library,
}

impl CollectionSelector {
    /// Item cap used when the caller passes no explicit limit. Albums are
    /// uncapped; the library is cut at `library_limit`.
    pub fn default_limit(&self, library_limit: usize) -> Option<usize> {
        match self {
            CollectionSelector::Album(_) => None,
            CollectionSelector::Library => Some(library_limit),
        }
    }

    pub fn album_id(&self) -> Option<&str> {
        match self {
            CollectionSelector::Album(id) => Some(id),
            CollectionSelector::Library => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            CollectionSelector::Album(id) => id,
            CollectionSelector::Library => ALL_VIDEOS,
        }
    }
}

impl From<String> for CollectionSelector {
    fn from(value: String) -> Self {
        if value == ALL_VIDEOS {
            CollectionSelector::Library
        } else {
            CollectionSelector::Album(value)
        }
    }
}

impl From<CollectionSelector> for String {
    fn from(selector: CollectionSelector) -> Self {
        match selector {
            CollectionSelector::Album(id) => id,
            CollectionSelector::Library => ALL_VIDEOS.to_string(),
        }
    }
}

impl FromStr for CollectionSelector {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(CollectionSelector::from(s.to_string()))
    }
}

impl fmt::Display for CollectionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A video ready to hand to a player.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoItem {
    id: String,
    playback_url: String,
    thumbnail_url: String,
    title: String,
    created_time: Option<DateTime<Utc>>,
    mime_type: String,
}

impl VideoItem {
    pub fn from_media_item(item: &MediaItem, thumbnail_width: u32) -> Self {
        let created_time = DateTime::parse_from_rfc3339(&item.media_metadata.creation_time)
            .ok()
            .map(|t| t.with_timezone(&Utc));
        VideoItem {
            id: item.id.clone(),
            playback_url: video_url(&item.base_url),
            thumbnail_url: thumbnail_url(&item.base_url, thumbnail_width),
            title: item.filename.clone(),
            created_time,
            mime_type: item.mime_type.clone(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn playback_url(&self) -> &str {
        &self.playback_url
    }

    pub fn thumbnail_url(&self) -> &str {
        &self.thumbnail_url
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn created_time(&self) -> Option<DateTime<Utc>> {
        self.created_time
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }
}

impl From<&MediaItem> for VideoItem {
    fn from(item: &MediaItem) -> Self {
        VideoItem::from_media_item(item, DEFAULT_THUMBNAIL_WIDTH)
    }
}

/// Ordered videos in upstream return order.
pub type MediaCollection = Vec<VideoItem>;
