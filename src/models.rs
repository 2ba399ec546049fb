use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::region::LngLat;

/// A point of interest as returned by the interpreter. Identity is `id`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct GeoPoint {
    pub id: i64,
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl GeoPoint {
    pub fn position(&self) -> LngLat {
        LngLat::new(self.lon, self.lat)
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct Osm3s {
    #[serde(default)]
    pub timestamp_osm_base: String,
    #[serde(default)]
    pub copyright: String,
}

/// Body of both the upstream interpreter response and the proxy response.
/// The proxy adds `cache` when the body came out of its cell cache.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct FountainsResponse {
    #[serde(default)]
    pub version: f64,
    #[serde(default)]
    pub generator: String,
    #[serde(default)]
    pub osm3s: Osm3s,
    pub elements: Vec<GeoPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<bool>,
}

/// One Nominatim search hit. Coordinates and the bounding box arrive as
/// strings.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct GeoCodeResponse {
    #[serde(default)]
    pub boundingbox: Vec<String>,
    pub lat: String,
    pub lon: String,
    #[serde(rename = "display_name")]
    pub name: String,
}

impl GeoCodeResponse {
    pub fn position(&self) -> Option<LngLat> {
        let lng = self.lon.parse::<f64>().ok()?;
        let lat = self.lat.parse::<f64>().ok()?;
        Some(LngLat::new(lng, lat))
    }
}
