use std::collections::HashSet;
use std::fmt;

use tracing::debug;

use crate::region::{BoundingRegion, LngLat};

/// Default number of decimals used for precise requests.
pub const DEFAULT_PRECISE_DECIMALS: usize = 2;

/// Finer precision than this is meaningless for a viewport and larger
/// values overflow the rounding factor.
pub const MAX_PRECISE_DECIMALS: usize = 8;

/// A 1°×1° cell identified by the integer degree of its south-west corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionCacheKey {
    pub lng: i32,
    pub lat: i32,
}

impl RegionCacheKey {
    /// Cell enclosing the region's south-west corner.
    pub fn of(region: &BoundingRegion) -> Self {
        Self::containing(region.south_west())
    }

    /// `floor` rather than truncation, so that negative coordinates map to
    /// the cell that actually encloses them. Keys built with `Math.trunc`
    /// differ from these by one degree west of Greenwich or south of the
    /// equator (`-0.5` is cell `-1` here, `0` under truncation), so such
    /// clients do not share cell paths with this one. The northern/eastern
    /// limits fold into the last valid cell.
    pub fn containing(p: LngLat) -> Self {
        Self {
            lng: (p.lng.floor() as i32).clamp(-180, 179),
            lat: (p.lat.floor() as i32).clamp(-90, 89),
        }
    }

    pub fn bounds(&self) -> BoundingRegion {
        let (w, s) = (f64::from(self.lng), f64::from(self.lat));
        BoundingRegion::new(w, s, w + 1.0, s + 1.0)
    }
}

impl fmt::Display for RegionCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.lng, self.lat)
    }
}

/// Degree cells the backend has reported as fully cached.
///
/// Lives inside a single map session; entries are never evicted.
#[derive(Debug, Default)]
pub struct RegionKeyCache {
    cells: HashSet<RegionCacheKey>,
}

impl RegionKeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, key: &RegionCacheKey) -> bool {
        self.cells.contains(key)
    }

    pub fn record(&mut self, key: RegionCacheKey) {
        if self.cells.insert(key) {
            debug!("cell {} recorded as cached", key);
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cell mode is only used when the whole region fits in a recorded
    /// cell; a region straddling cells would otherwise lose its other part.
    pub fn encoding_for(&self, region: &BoundingRegion, decimals: usize) -> RegionEncoding {
        let key = RegionCacheKey::of(region);
        if self.has(&key) && key.bounds().contains_region(region) {
            RegionEncoding::Cell
        } else {
            RegionEncoding::Precise { decimals }
        }
    }
}

/// How a region is turned into a backend request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionEncoding {
    /// Round to the enclosing degree cell. Byte-identical across every
    /// viewport inside the cell.
    Cell,
    /// Fixed decimal precision, rounded outward.
    Precise { decimals: usize },
}

impl RegionEncoding {
    pub fn encode(&self, region: &BoundingRegion) -> RegionRequest {
        match *self {
            RegionEncoding::Cell => RegionRequest::Cell(RegionCacheKey::of(region)),
            RegionEncoding::Precise { decimals } => {
                let decimals = decimals.min(MAX_PRECISE_DECIMALS);
                let factor = 10f64.powi(decimals as i32);
                RegionRequest::Precise {
                    region: BoundingRegion {
                        west: (region.west * factor).floor() / factor,
                        south: (region.south * factor).floor() / factor,
                        east: (region.east * factor).ceil() / factor,
                        north: (region.north * factor).ceil() / factor,
                    },
                    decimals,
                }
            }
        }
    }
}

/// An encoded request for the fountains endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum RegionRequest {
    Cell(RegionCacheKey),
    Precise { region: BoundingRegion, decimals: usize },
}

impl RegionRequest {
    /// Path below the service base URL.
    pub fn path(&self) -> String {
        match self {
            RegionRequest::Cell(key) => format!("/api/fountains/{}/{}", key.lng, key.lat),
            RegionRequest::Precise { region, decimals } => format!(
                "/api/fountains/{:.d$}/{:.d$}/{:.d$}/{:.d$}",
                region.west,
                region.south,
                region.east,
                region.north,
                d = *decimals
            ),
        }
    }

    /// Area the backend will answer for.
    pub fn coverage(&self) -> BoundingRegion {
        match self {
            RegionRequest::Cell(key) => key.bounds(),
            RegionRequest::Precise { region, .. } => *region,
        }
    }

    pub fn is_cell(&self) -> bool {
        matches!(self, RegionRequest::Cell(_))
    }
}
