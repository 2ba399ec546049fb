use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::geocode::DEFAULT_NOMINATIM_URL;
use crate::overpass::DEFAULT_OVERPASS_URL;

pub const DEFAULT_MAX_AGE_SECS: u64 = 3600;

/// Place names move rarely; sixty days.
pub const DEFAULT_GEOCODE_TTL_SECS: u64 = 60 * 24 * 3600;

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Config {
    pub listen_addr: String,
    pub overpass_url: String,
    pub thread_count: Option<usize>,
    pub cache_dir: PathBuf,
    pub cache_size_mb: u64,
    pub cache_ttl_secs: u64,
    /// `max-age` advertised to browsers, independent of how long cells
    /// stay in the server cache.
    pub max_age_secs: u64,
    pub query_timeout_secs: u64,
    pub user_agent: String,
    pub nominatim_url: String,
    pub geocode_ttl_secs: u64,
    /// Pause between upstream calls while seeding the geocoder cache.
    pub seed_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8000".to_string(),
            overpass_url: DEFAULT_OVERPASS_URL.to_string(),
            thread_count: None,
            cache_dir: PathBuf::from("data/cache"),
            cache_size_mb: 256,
            cache_ttl_secs: 3600,
            max_age_secs: DEFAULT_MAX_AGE_SECS,
            query_timeout_secs: 25,
            user_agent: concat!("fountain-finder/", env!("CARGO_PKG_VERSION")).to_string(),
            nominatim_url: DEFAULT_NOMINATIM_URL.to_string(),
            geocode_ttl_secs: DEFAULT_GEOCODE_TTL_SECS,
            seed_delay_ms: 1000,
        }
    }
}

impl Config {
    /// Reads `fountains.toml`, then `fountains.example.toml`, then falls
    /// back to defaults. `ADDRESS` overrides the listen address.
    pub fn load() -> anyhow::Result<Self> {
        let path = ["fountains.toml", "fountains.example.toml"]
            .into_iter()
            .find(|p| Path::new(p).exists());

        let mut config = match path {
            Some(path) => Self::from_toml_str(&fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        if let Ok(addr) = std::env::var("ADDRESS") {
            config.listen_addr = addr;
        }
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn geocode_ttl(&self) -> Duration {
        Duration::from_secs(self.geocode_ttl_secs)
    }

    pub fn seed_delay(&self) -> Duration {
        Duration::from_millis(self.seed_delay_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn cache_size_bytes(&self) -> u64 {
        self.cache_size_mb * 1024 * 1024
    }

    /// `max-age` advertised on fountain responses.
    pub fn cache_control(&self) -> String {
        format!("public, max-age={}, stale-while-revalidate=86400", self.max_age_secs)
    }
}
