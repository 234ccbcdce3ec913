use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::auth::FileTokenStore;

/// Default page size for `GET /api/v2/leads`.
pub const DEFAULT_PAGE_SIZE: u32 = 100;
/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api_url: String,
    pub token_file: PathBuf,
    pub timeout_secs: u64,
    pub page_size: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            api_url: std::env::var("LEADBOOST_API_URL")
                .map_err(|_| anyhow::anyhow!("LEADBOOST_API_URL environment variable required"))
                .and_then(|url| Self::validate_api_url(&url))?,
            token_file: match std::env::var("LEADBOOST_TOKEN_FILE")
                .ok()
                .filter(|s| !s.trim().is_empty())
            {
                Some(path) => PathBuf::from(path),
                None => FileTokenStore::default_path().ok_or_else(|| {
                    anyhow::anyhow!(
                        "Could not determine a config directory; set LEADBOOST_TOKEN_FILE"
                    )
                })?,
            },
            timeout_secs: std::env::var("LEADBOOST_TIMEOUT_SECS")
                .unwrap_or_else(|_| DEFAULT_TIMEOUT_SECS.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("LEADBOOST_TIMEOUT_SECS must be a whole number"))
                .and_then(|secs: u64| {
                    if secs == 0 {
                        anyhow::bail!("LEADBOOST_TIMEOUT_SECS must be greater than 0");
                    }
                    Ok(secs)
                })?,
            page_size: std::env::var("LEADBOOST_PAGE_SIZE")
                .unwrap_or_else(|_| DEFAULT_PAGE_SIZE.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("LEADBOOST_PAGE_SIZE must be a whole number"))
                .and_then(|size: u32| {
                    if !(1..=1000).contains(&size) {
                        anyhow::bail!("LEADBOOST_PAGE_SIZE must be between 1 and 1000");
                    }
                    Ok(size)
                })?,
        };

        tracing::debug!("API URL: {}", config.api_url);
        tracing::debug!("Token file: {}", config.token_file.display());
        tracing::debug!(
            "Timeout: {}s, page size: {}",
            config.timeout_secs,
            config.page_size
        );

        Ok(config)
    }

    /// Config pointing at `api_url` with defaults for everything else.
    pub fn new(api_url: impl Into<String>, token_file: impl Into<PathBuf>) -> Self {
        Self {
            api_url: api_url.into(),
            token_file: token_file.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn validate_api_url(url: &str) -> anyhow::Result<String> {
        let url = url.trim();
        if url.is_empty() {
            anyhow::bail!("LEADBOOST_API_URL cannot be empty");
        }
        if !url.starts_with("http://") && !url.starts_with("https://") {
            anyhow::bail!("LEADBOOST_API_URL must start with http:// or https://");
        }
        url::Url::parse(url)
            .map_err(|e| anyhow::anyhow!("LEADBOOST_API_URL is not a valid URL: {}", e))?;
        Ok(url.trim_end_matches('/').to_string())
    }
}
