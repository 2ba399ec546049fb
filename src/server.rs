//! HTTP proxy in front of the Overpass interpreter.
//!
//! Whole degree cells are cached. A precise request is answered from the
//! cell cache when it fits inside a cached cell; otherwise it goes upstream
//! while the enclosing cell is prefetched in the background, so the client
//! can switch to cell requests for that area.
//!
//! Place searches are forwarded to Nominatim and cached per query.

use axum::{
    extract::{Path, State},
    http::{header, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::ApiError;
use crate::geocode::{geocode_cache_key, NominatimClient, MAX_QUERY_LEN};
use crate::models::{FountainsResponse, GeoCodeResponse};
use crate::overpass::OverpassClient;
use crate::region::{BoundingRegion, LngLat, MAX_LAT, MAX_LNG};
use crate::region_cache::RegionCacheKey;
use crate::response_cache::ResponseCache;

pub struct AppState {
    pub config: Config,
    pub overpass: OverpassClient,
    pub geocoder: NominatimClient,
    pub cache: ResponseCache,
    prefetching: Mutex<HashSet<RegionCacheKey>>,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.query_timeout() + Duration::from_secs(5))
            .build()?;
        let geocoder = NominatimClient::new(http_client.clone(), config.nominatim_url.clone());
        let overpass = OverpassClient::new(http_client, config.overpass_url.clone(), config.query_timeout());
        let cache = ResponseCache::new(config.cache_dir.clone(), config.cache_size_bytes(), config.cache_ttl()).await?;

        Ok(Self {
            config,
            overpass,
            geocoder,
            cache,
            prefetching: Mutex::new(HashSet::new()),
        })
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/fountains/{west}/{south}", get(cell_fountains))
        .route("/api/fountains/{west}/{south}/{east}/{north}", get(region_fountains))
        .route("/api/geocode/{query}", get(geocode))
        .layer(middleware::from_fn(log_request_response))
        .with_state(state)
}

pub async fn serve(config: Config) -> anyhow::Result<()> {
    let addr = config.listen_addr.clone();
    let state = Arc::new(AppState::new(config).await?);
    let app = router(state);

    info!("listening on {}", addr);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn log_request_response(
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    let method = req.method().to_string();
    info!("incoming request: {} {}", method, path);
    let response = next.run(req).await;
    info!("request result: {} for {} {}", response.status(), method, path);
    response
}

// --- Handlers ---

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn cell_fountains(
    State(state): State<Arc<AppState>>,
    Path((west, south)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let corner = LngLat::new(parse_coord("west", &west)?, parse_coord("south", &south)?);
    if corner.lng.abs() > MAX_LNG || corner.lat.abs() > MAX_LAT {
        return Err(ApiError::OutOfRange);
    }
    let key = RegionCacheKey::containing(corner);

    if let Some(body) = cached_cell(&state, key).await {
        return Ok(fountains_response(&state, body));
    }
    let body = fetch_cell(&state, key).await.map_err(ApiError::Upstream)?;
    Ok(fountains_response(&state, body))
}

async fn region_fountains(
    State(state): State<Arc<AppState>>,
    Path((west, south, east, north)): Path<(String, String, String, String)>,
) -> Result<Response, ApiError> {
    let region = BoundingRegion::new(
        parse_coord("west", &west)?,
        parse_coord("south", &south)?,
        parse_coord("east", &east)?,
        parse_coord("north", &north)?,
    );
    if !region.is_valid() {
        return Err(ApiError::OutOfRange);
    }
    let key = RegionCacheKey::of(&region);

    if key.bounds().contains_region(&region) {
        if let Some(body) = cached_cell(&state, key).await {
            return Ok(fountains_response(&state, body));
        }
    }

    spawn_prefetch(state.clone(), key);

    let mut body = state.overpass.fountains_in(&region).await.map_err(|e| {
        error!("overpass query for {:?} failed: {:#}", region, e);
        ApiError::Upstream(e)
    })?;
    body.cache = Some(false);
    Ok(fountains_response(&state, body))
}

async fn geocode(
    State(state): State<Arc<AppState>>,
    Path(query): Path<String>,
) -> Result<Response, ApiError> {
    let query = query.trim();
    if query.is_empty() || query.chars().count() > MAX_QUERY_LEN {
        return Err(ApiError::InvalidQuery { max: MAX_QUERY_LEN });
    }
    let key = geocode_cache_key(query);

    match state.cache.get(&key).await {
        Ok(Some(bytes)) => match serde_json::from_slice::<Vec<GeoCodeResponse>>(&bytes) {
            Ok(hits) => return Ok(geocode_response(&state, hits)),
            Err(e) => warn!("cached geocode for {:?} is corrupt: {}", query, e),
        },
        Ok(None) => {}
        Err(e) => warn!("cache read for {:?} failed: {:#}", query, e),
    }

    let hits = state.geocoder.search(query).await.map_err(|e| {
        error!("geocoding {:?} failed: {:#}", query, e);
        ApiError::Upstream(e)
    })?;
    match serde_json::to_vec(&hits) {
        Ok(bytes) => {
            if let Err(e) = state.cache.insert_with_ttl(&key, bytes, state.config.geocode_ttl()).await {
                warn!("storing geocode for {:?} failed: {:#}", query, e);
            }
        }
        Err(e) => warn!("serializing geocode for {:?} failed: {}", query, e),
    }
    Ok(geocode_response(&state, hits))
}

fn geocode_response(state: &AppState, hits: Vec<GeoCodeResponse>) -> Response {
    ([(header::CACHE_CONTROL, state.config.cache_control())], Json(hits)).into_response()
}

fn fountains_response(state: &AppState, body: FountainsResponse) -> Response {
    ([(header::CACHE_CONTROL, state.config.cache_control())], Json(body)).into_response()
}

// --- Helper Functions ---

fn parse_coord(name: &'static str, raw: &str) -> Result<f64, ApiError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ApiError::InvalidCoordinate { name, value: raw.to_string() })
}

fn cell_cache_key(key: RegionCacheKey) -> String {
    format!("cell:{}:{}", key.lng, key.lat)
}

/// Cache read errors are logged and treated as misses.
async fn cached_cell(state: &AppState, key: RegionCacheKey) -> Option<FountainsResponse> {
    let bytes = match state.cache.get(&cell_cache_key(key)).await {
        Ok(bytes) => bytes?,
        Err(e) => {
            warn!("cache read for cell {} failed: {:#}", key, e);
            return None;
        }
    };
    match serde_json::from_slice::<FountainsResponse>(&bytes) {
        Ok(mut body) => {
            body.cache = Some(true);
            Some(body)
        }
        Err(e) => {
            warn!("cached body for cell {} is corrupt: {}", key, e);
            None
        }
    }
}

/// Queries a whole cell upstream and stores it.
async fn fetch_cell(state: &AppState, key: RegionCacheKey) -> anyhow::Result<FountainsResponse> {
    let mut body = state.overpass.fountains_in(&key.bounds()).await?;
    match serde_json::to_vec(&body) {
        Ok(bytes) => {
            if let Err(e) = state.cache.insert(&cell_cache_key(key), bytes).await {
                warn!("storing cell {} failed: {:#}", key, e);
            }
        }
        Err(e) => warn!("serializing cell {} failed: {}", key, e),
    }
    body.cache = Some(false);
    Ok(body)
}

/// At most one prefetch per cell is in flight.
fn spawn_prefetch(state: Arc<AppState>, key: RegionCacheKey) {
    {
        let mut pending = state.prefetching.lock().unwrap_or_else(PoisonError::into_inner);
        if !pending.insert(key) {
            return;
        }
    }

    tokio::spawn(async move {
        match state.cache.contains(&cell_cache_key(key)).await {
            Ok(true) => debug!("cell {} already cached", key),
            _ => match fetch_cell(&state, key).await {
                Ok(body) => info!("prefetched cell {} ({} elements)", key, body.elements.len()),
                Err(e) => error!("prefetch of cell {} failed: {:#}", key, e),
            },
        }
        state.prefetching.lock().unwrap_or_else(PoisonError::into_inner).remove(&key);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinates_must_be_finite_numbers() {
        assert_eq!(parse_coord("west", " 12.5 ").unwrap(), 12.5);
        assert!(matches!(parse_coord("west", "abc"), Err(ApiError::InvalidCoordinate { name: "west", .. })));
        assert!(parse_coord("north", "NaN").is_err());
        assert!(parse_coord("north", "inf").is_err());
    }

    #[test]
    fn cell_keys_are_namespaced() {
        assert_eq!(cell_cache_key(RegionCacheKey { lng: -1, lat: 41 }), "cell:-1:41");
    }
}
