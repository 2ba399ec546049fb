//! Drinking-water fountain finder.
//!
//! The client side ([`session::MapSession`]) decides which region to query
//! as a map viewport moves, avoids redundant fetches and keeps the on-screen
//! marker set in sync. The server side ([`server`]) proxies region queries
//! to an Overpass interpreter and caches whole degree cells, and proxies
//! place searches to Nominatim ([`geocode`]).

pub mod config;
pub mod error;
pub mod fetch;
pub mod geocode;
pub mod markers;
pub mod models;
pub mod movement;
pub mod overpass;
pub mod region;
pub mod region_cache;
pub mod response_cache;
pub mod server;
pub mod session;

pub use error::{ApiError, FetchError};
pub use fetch::{FetchClient, FetchResponse, HttpFetchClient};
pub use markers::{EvictionPolicy, MarkerSet, MarkerSurface};
pub use models::{GeoCodeResponse, GeoPoint};
pub use region::{BoundingRegion, LngLat};
pub use session::{CycleOutcome, MapSession, SessionConfig};
