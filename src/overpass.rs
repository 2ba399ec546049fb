use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::debug;

use crate::models::FountainsResponse;
use crate::region::BoundingRegion;

pub const DEFAULT_OVERPASS_URL: &str = "https://overpass.kumi.systems/api/interpreter/";

/// Interpreter query selecting drinking-water nodes inside `region`.
/// Overpass bounding boxes are `(south,west,north,east)`.
pub fn drinking_water_query(region: &BoundingRegion, timeout: Duration) -> String {
    format!(
        "[out:json][timeout:{}];(node[\"amenity\"=\"drinking_water\"]({},{},{},{}););out body;>;out skel qt;",
        timeout.as_secs(),
        region.south,
        region.west,
        region.north,
        region.east
    )
}

#[derive(Debug, Clone)]
pub struct OverpassClient {
    http: Client,
    url: String,
    query_timeout: Duration,
}

impl OverpassClient {
    /// `http` should carry a request timeout above `query_timeout`, the
    /// interpreter aborts on its own once the query budget is spent.
    pub fn new(http: Client, url: impl Into<String>, query_timeout: Duration) -> Self {
        Self { http, url: url.into(), query_timeout }
    }

    pub async fn fountains_in(&self, region: &BoundingRegion) -> Result<FountainsResponse> {
        let query = drinking_water_query(region, self.query_timeout);
        debug!("overpass query: {}", query);
        let resp = self
            .http
            .get(&self.url)
            .query(&[("data", query.as_str())])
            .send()
            .await
            .with_context(|| format!("request to {} failed", self.url))?
            .error_for_status()?;
        let bytes = resp.bytes().await?;
        let body: FountainsResponse =
            serde_json::from_slice(&bytes).context("unexpected interpreter response")?;
        Ok(body)
    }
}
