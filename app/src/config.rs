use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub fn default_data_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".photoscroll")
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    pub log_level: String,
    pub oauth_redirect_port: u16,
    pub library_video_limit: usize,
    pub thumbnail_width: u32,
    pub use_file_store: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_url: Option<String>,
    pub data_path: PathBuf,
}

#[derive(Default)]
pub struct AppConfigOverrides {
    pub log_level: Option<String>,
    pub oauth_redirect_port: Option<u16>,
    pub library_video_limit: Option<usize>,
    pub thumbnail_width: Option<u32>,
    pub use_file_store: bool,
}

impl AppConfig {
    /// `~/.photoscroll/config.toml`
    pub fn default_path() -> PathBuf {
        default_data_path().join("config.toml")
    }

    pub fn load_from(path: Option<PathBuf>) -> Self {
        let path = path.unwrap_or_else(Self::default_path);
        let cfg = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .build()
            .unwrap_or_default();

        let log_level = cfg
            .get_string("log_level")
            .unwrap_or_else(|_| "info".to_string());
        let oauth_redirect_port = cfg.get_int("oauth_redirect_port").unwrap_or(8080) as u16;
        let library_video_limit = cfg
            .get_int("library_video_limit")
            .map(|v| v as usize)
            .unwrap_or(fetcher::LIBRARY_VIDEO_LIMIT);
        let thumbnail_width = cfg
            .get_int("thumbnail_width")
            .map(|v| v as u32)
            .unwrap_or(api_client::DEFAULT_THUMBNAIL_WIDTH);
        let use_file_store = cfg.get_bool("use_file_store").unwrap_or(false);
        let api_base_url = cfg.get_string("api_base_url").ok();
        let token_url = cfg.get_string("token_url").ok();
        let data_path = cfg
            .get_string("data_path")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_data_path());

        Self {
            log_level,
            oauth_redirect_port,
            library_video_limit,
            thumbnail_width,
            use_file_store,
            api_base_url,
            token_url,
            data_path,
        }
    }

    pub fn apply_overrides(mut self, ov: &AppConfigOverrides) -> Self {
        if let Some(l) = &ov.log_level {
            self.log_level = l.clone();
        }
        if let Some(p) = ov.oauth_redirect_port {
            self.oauth_redirect_port = p;
        }
        if let Some(limit) = ov.library_video_limit {
            self.library_video_limit = limit;
        }
        if let Some(w) = ov.thumbnail_width {
            self.thumbnail_width = w;
        }
        if ov.use_file_store {
            self.use_file_store = true;
        }
        self
    }

    pub fn save_to(&self, path: Option<PathBuf>) -> std::io::Result<()> {
        let path = path.unwrap_or_else(Self::default_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = toml::to_string(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(path, data)
    }
}
