//! Place search through a Nominatim instance, plus the cache seeder that
//! warms the response cache with short prefix queries.
//!
//! Nominatim's usage policy asks for an identifying user agent and at most
//! one request per second, so the seeder sleeps between upstream calls.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::models::GeoCodeResponse;
use crate::response_cache::ResponseCache;

pub const DEFAULT_NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org/search";

/// Longest query the proxy forwards.
pub const MAX_QUERY_LEN: usize = 100;

/// Cache key shared by the proxy route and the seeder.
pub fn geocode_cache_key(query: &str) -> String {
    format!("osm:{}", query.trim().to_lowercase())
}

/// Every `a`..`z` string of length 1 through `max_len`, shorter first.
pub fn seed_queries(max_len: usize) -> Vec<String> {
    let mut all = Vec::new();
    let mut level = vec![String::new()];
    for _ in 0..max_len {
        level = level
            .iter()
            .flat_map(|prefix| ('a'..='z').map(move |c| format!("{prefix}{c}")))
            .collect();
        all.extend(level.iter().cloned());
    }
    all
}

#[derive(Debug, Clone)]
pub struct NominatimClient {
    http: Client,
    url: String,
}

impl NominatimClient {
    /// `http` must carry an identifying user agent.
    pub fn new(http: Client, url: impl Into<String>) -> Self {
        Self { http, url: url.into() }
    }

    pub async fn search(&self, query: &str) -> Result<Vec<GeoCodeResponse>> {
        let resp = self
            .http
            .get(&self.url)
            .query(&[("q", query), ("format", "json")])
            .send()
            .await
            .with_context(|| format!("request to {} failed", self.url))?
            .error_for_status()?;
        let bytes = resp.bytes().await?;
        let hits: Vec<GeoCodeResponse> =
            serde_json::from_slice(&bytes).context("unexpected geocoder response")?;
        Ok(hits)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedStats {
    pub fetched: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Fills the response cache with geocoder answers, one upstream call per
/// `delay`, skipping queries that are already cached.
pub struct Seeder<'a> {
    pub client: &'a NominatimClient,
    pub cache: &'a ResponseCache,
    pub delay: Duration,
    pub ttl: Duration,
}

impl Seeder<'_> {
    /// Failed queries are logged and counted; the run goes on.
    pub async fn run<I, Q>(&self, queries: I) -> Result<SeedStats>
    where
        I: IntoIterator<Item = Q>,
        Q: AsRef<str>,
    {
        let mut stats = SeedStats::default();
        for query in queries {
            let query = query.as_ref();
            let key = geocode_cache_key(query);
            if self.cache.contains(&key).await? {
                debug!("{} already cached", query);
                stats.skipped += 1;
                continue;
            }

            tokio::time::sleep(self.delay).await;
            info!("fetching {}", query);
            let hits = match self.client.search(query).await {
                Ok(hits) => hits,
                Err(e) => {
                    warn!("geocoding {} failed: {:#}", query, e);
                    stats.failed += 1;
                    continue;
                }
            };
            self.cache.insert_with_ttl(&key, serde_json::to_vec(&hits)?, self.ttl).await?;
            stats.fetched += 1;
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_queries_cover_all_prefixes() {
        let q = seed_queries(2);
        assert_eq!(q.len(), 26 + 26 * 26);
        assert_eq!(q[0], "a");
        assert_eq!(q[25], "z");
        assert_eq!(q[26], "aa");
        assert_eq!(q.last().unwrap(), "zz");
        assert_eq!(seed_queries(3).len(), 18278);
        assert!(seed_queries(0).is_empty());
    }

    #[test]
    fn cache_key_ignores_case_and_padding() {
        assert_eq!(geocode_cache_key("  Roma "), "osm:roma");
        assert_eq!(geocode_cache_key("roma"), geocode_cache_key("ROMA"));
    }
}
