use std::future::Future;

use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::error::FetchError;
use crate::models::{FountainsResponse, GeoPoint};
use crate::region_cache::RegionRequest;

/// Points for one region plus whether the backend answered from its cache.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchResponse {
    pub points: Vec<GeoPoint>,
    pub served_from_cache: bool,
}

impl From<FountainsResponse> for FetchResponse {
    fn from(body: FountainsResponse) -> Self {
        Self {
            points: body.elements,
            served_from_cache: body.cache.unwrap_or(false),
        }
    }
}

/// Source of fountain points for an encoded region.
pub trait FetchClient {
    fn fetch(
        &self,
        request: &RegionRequest,
    ) -> impl Future<Output = Result<FetchResponse, FetchError>> + Send;
}

/// Talks to the `/api/fountains` endpoint. One GET per call, no retries.
#[derive(Debug, Clone)]
pub struct HttpFetchClient {
    http: Client,
    base_url: Url,
}

impl HttpFetchClient {
    /// A base without a trailing `/` gets one, so its last path segment
    /// survives the join in `url_for`.
    pub fn new(http: Client, mut base_url: Url) -> Self {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self { http, base_url }
    }

    pub fn from_base(base_url: &str) -> Result<Self, FetchError> {
        Ok(Self::new(Client::new(), Url::parse(base_url)?))
    }

    pub fn url_for(&self, request: &RegionRequest) -> Result<Url, FetchError> {
        Ok(self.base_url.join(request.path().trim_start_matches('/'))?)
    }
}

impl FetchClient for HttpFetchClient {
    async fn fetch(&self, request: &RegionRequest) -> Result<FetchResponse, FetchError> {
        let url = self.url_for(request)?;
        debug!("fetching {}", url);
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        let bytes = resp.bytes().await?;
        let body: FountainsResponse = serde_json::from_slice(&bytes)?;
        Ok(body.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::BoundingRegion;
    use crate::region_cache::RegionEncoding;

    #[test]
    fn url_joins_request_path_onto_base() {
        let client = HttpFetchClient::from_base("http://127.0.0.1:8000/").unwrap();
        let req = RegionEncoding::Cell.encode(&BoundingRegion::new(12.4, 41.8, 12.5, 41.9));
        assert_eq!(
            client.url_for(&req).unwrap().as_str(),
            "http://127.0.0.1:8000/api/fountains/12/41"
        );
    }

    #[test]
    fn url_keeps_base_path_prefix() {
        let req = RegionEncoding::Cell.encode(&BoundingRegion::new(12.4, 41.8, 12.5, 41.9));
        for base in ["http://127.0.0.1:8000/app", "http://127.0.0.1:8000/app/"] {
            let client = HttpFetchClient::from_base(base).unwrap();
            assert_eq!(
                client.url_for(&req).unwrap().as_str(),
                "http://127.0.0.1:8000/app/api/fountains/12/41"
            );
        }
    }

    #[test]
    fn cache_flag_defaults_to_false() {
        let resp: FetchResponse = FountainsResponse::default().into();
        assert!(!resp.served_from_cache);
        let resp: FetchResponse = FountainsResponse { cache: Some(true), ..Default::default() }.into();
        assert!(resp.served_from_cache);
    }

    #[test]
    fn invalid_base_is_rejected() {
        assert!(matches!(HttpFetchClient::from_base("not a url"), Err(FetchError::Url(_))));
    }
}
