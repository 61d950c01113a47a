use config::{Config, ConfigError, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::retry::RetryPolicies;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub url: String,
    #[serde(default)]
    pub session_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaginationSettings {
    pub root_page_size: u32,
    pub reply_page_size: u32,
    /// Fetch the first reply page of every root comment as soon as it is listed
    pub eager_replies: bool,
}

impl Default for PaginationSettings {
    fn default() -> Self {
        Self {
            root_page_size: 20,
            reply_page_size: 5,
            eager_replies: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ComposeSettings {
    pub max_chars: usize,
}

impl Default for ComposeSettings {
    fn default() -> Self {
        Self { max_chars: 280 }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    #[serde(default)]
    pub pagination: PaginationSettings,
    #[serde(default)]
    pub compose: ComposeSettings,
    #[serde(default)]
    pub retry: RetryPolicies,
}

const CONFIG_FILE_NAME: &str = "threadline.toml";
const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3000/api";

impl Settings {
    /// Load from `threadline.toml` (current directory or `threadline/`), then
    /// environment overrides
    pub fn new() -> Result<Self, ConfigError> {
        let candidates = [
            PathBuf::from(CONFIG_FILE_NAME),
            PathBuf::from("threadline").join(CONFIG_FILE_NAME),
        ];
        Self::load(candidates.iter().filter(|p| p.exists()).map(PathBuf::as_path))
    }

    /// Load from an explicit file, then environment overrides
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Self::load(std::iter::once(path))
    }

    fn load<'a>(files: impl Iterator<Item = &'a Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        for path in files {
            builder = builder.add_source(File::from(path).required(false));
        }

        builder = builder.set_default("server.url", DEFAULT_SERVER_URL)?;

        // Environment variables have the highest priority
        if let Ok(url) = std::env::var("THREADLINE_SERVER_URL") {
            builder = builder.set_override("server.url", url)?;
        }
        if let Ok(token) = std::env::var("THREADLINE_SESSION_TOKEN") {
            builder = builder.set_override("server.session_token", token)?;
        }
        if let Ok(size) = std::env::var("THREADLINE_ROOT_PAGE_SIZE") {
            builder = builder.set_override("pagination.root_page_size", size)?;
        }
        if let Ok(size) = std::env::var("THREADLINE_REPLY_PAGE_SIZE") {
            builder = builder.set_override("pagination.reply_page_size", size)?;
        }

        let s = builder.build()?;
        s.try_deserialize()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                url: DEFAULT_SERVER_URL.to_string(),
                session_token: None,
            },
            pagination: PaginationSettings::default(),
            compose: ComposeSettings::default(),
            retry: RetryPolicies::default(),
        }
    }
}
