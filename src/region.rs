use serde::{Deserialize, Serialize};

pub const MAX_LAT: f64 = 90.0;
pub const MAX_LNG: f64 = 180.0;

/// Default padding, in degrees, added around a viewport before fetching.
pub const DEFAULT_BUFFER: f64 = 0.001;

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

impl LngLat {
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }
}

/// Rectangular geographic area. Constructors keep `west <= east` and
/// `south <= north`.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
pub struct BoundingRegion {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl BoundingRegion {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        // plain comparisons so a NaN edge survives and fails `is_valid`
        let (west, east) = if west <= east { (west, east) } else { (east, west) };
        let (south, north) = if south <= north { (south, north) } else { (north, south) };
        Self { west, south, east, north }
    }

    /// Region spanned by two opposite corners, in any order.
    pub fn from_corners(a: LngLat, b: LngLat) -> Self {
        Self::new(a.lng, a.lat, b.lng, b.lat)
    }

    pub fn contains(&self, p: LngLat) -> bool {
        p.lng >= self.west && p.lng <= self.east && p.lat >= self.south && p.lat <= self.north
    }

    pub fn contains_region(&self, other: &BoundingRegion) -> bool {
        other.west >= self.west
            && other.east <= self.east
            && other.south >= self.south
            && other.north <= self.north
    }

    pub fn center(&self) -> LngLat {
        LngLat::new((self.west + self.east) / 2.0, (self.south + self.north) / 2.0)
    }

    pub fn south_west(&self) -> LngLat {
        LngLat::new(self.west, self.south)
    }

    /// True when every edge is finite and inside the valid lng/lat range.
    pub fn is_valid(&self) -> bool {
        [self.west, self.south, self.east, self.north]
            .iter()
            .all(|v| v.is_finite())
            && self.west >= -MAX_LNG
            && self.east <= MAX_LNG
            && self.south >= -MAX_LAT
            && self.north <= MAX_LAT
    }
}

/// Pads a region on all four sides so that small pans stay inside the
/// area that was last fetched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundsExpander {
    margin: f64,
}

impl Default for BoundsExpander {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER)
    }
}

impl BoundsExpander {
    /// Negative or non-finite margins are treated as zero.
    pub fn new(margin: f64) -> Self {
        let margin = if margin.is_finite() { margin.max(0.0) } else { 0.0 };
        Self { margin }
    }

    pub fn margin(&self) -> f64 {
        self.margin
    }

    /// Result is clamped to the valid coordinate range.
    pub fn expand(&self, region: &BoundingRegion) -> BoundingRegion {
        BoundingRegion {
            west: (region.west - self.margin).max(-MAX_LNG),
            south: (region.south - self.margin).max(-MAX_LAT),
            east: (region.east + self.margin).min(MAX_LNG),
            north: (region.north + self.margin).min(MAX_LAT),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_normalizes_swapped_edges() {
        let r = BoundingRegion::new(10.0, 5.0, 9.0, 4.0);
        assert_eq!(r, BoundingRegion { west: 9.0, south: 4.0, east: 10.0, north: 5.0 });
    }

    #[test]
    fn expanded_region_is_a_strict_superset() {
        let expander = BoundsExpander::new(0.01);
        for r in [
            BoundingRegion::new(2.3, 5.9, 2.4, 6.0),
            BoundingRegion::new(-73.99, 40.7, -73.95, 40.75),
            BoundingRegion::new(0.0, 0.0, 0.0, 0.0),
        ] {
            let e = expander.expand(&r);
            assert!(e.contains_region(&r));
            assert!(e.west < r.west && e.south < r.south);
            assert!(e.east > r.east && e.north > r.north);
        }
    }

    #[test]
    fn zero_margin_is_identity() {
        let r = BoundingRegion::new(1.0, 2.0, 3.0, 4.0);
        assert_eq!(BoundsExpander::new(0.0).expand(&r), r);
        assert_eq!(BoundsExpander::new(-1.0).margin(), 0.0);
    }

    #[test]
    fn expansion_clamps_at_the_poles_and_antimeridian() {
        let r = BoundingRegion::new(179.95, 89.95, 180.0, 90.0);
        let e = BoundsExpander::new(0.1).expand(&r);
        assert_eq!(e.east, MAX_LNG);
        assert_eq!(e.north, MAX_LAT);
        assert!(e.is_valid());
        assert!(e.contains_region(&r));
    }

    #[test]
    fn contains_includes_edges() {
        let r = BoundingRegion::new(10.0, 10.0, 11.0, 11.0);
        assert!(r.contains(LngLat::new(10.0, 11.0)));
        assert!(!r.contains(LngLat::new(11.0001, 10.5)));
        assert_eq!(r.center(), LngLat::new(10.5, 10.5));
    }

    #[test]
    fn nan_region_is_invalid() {
        assert!(!BoundingRegion::new(f64::NAN, 0.0, 1.0, 1.0).is_valid());
        assert!(!BoundingRegion::new(0.0, -91.0, 1.0, 1.0).is_valid());
    }
}
