//! A map session: the state behind one live map view.
//!
//! A fetch cycle is split in two so overlapping cycles can be expressed:
//! [`MapSession::plan`] decides whether and what to fetch, the caller runs
//! the fetch, and [`MapSession::apply`] folds the result back in. Each plan
//! carries a generation number; a result older than the newest one already
//! applied is discarded.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::FetchError;
use crate::fetch::{FetchClient, FetchResponse};
use crate::markers::{
    EvictionPolicy, MarkerReconciler, MarkerSet, MarkerSurface, ReconcileOutcome,
    DEFAULT_MAX_MARKERS,
};
use crate::movement::MovementGate;
use crate::region::{BoundingRegion, BoundsExpander, LngLat, DEFAULT_BUFFER};
use crate::region_cache::{
    RegionCacheKey, RegionKeyCache, RegionRequest, DEFAULT_PRECISE_DECIMALS, MAX_PRECISE_DECIMALS,
};

pub const DEFAULT_ZOOM: f64 = 16.0;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Degrees added around the viewport before fetching.
    pub buffer: f64,
    pub max_markers: usize,
    /// Clamped to `MAX_PRECISE_DECIMALS`.
    pub precise_decimals: usize,
    pub eviction: EvictionPolicy,
    /// Used when geolocation is unavailable or denied.
    pub default_center: LngLat,
    pub default_zoom: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            buffer: DEFAULT_BUFFER,
            max_markers: DEFAULT_MAX_MARKERS,
            precise_decimals: DEFAULT_PRECISE_DECIMALS,
            eviction: EvictionPolicy::default(),
            // Rome
            default_center: LngLat::new(12.4964, 41.9028),
            default_zoom: DEFAULT_ZOOM,
        }
    }
}

/// A planned fetch, handed back to [`MapSession::apply`] with its result.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchPlan {
    pub generation: u64,
    /// Viewport after buffer expansion.
    pub viewport: BoundingRegion,
    pub center: LngLat,
    pub request: RegionRequest,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Movement gate decided the last fetch still covers the view.
    Skipped,
    /// A newer cycle was applied first.
    Stale { generation: u64 },
    Applied(ReconcileOutcome),
}

pub struct MapSession<S: MarkerSurface> {
    config: SessionConfig,
    expander: BoundsExpander,
    reconciler: MarkerReconciler,
    gate: MovementGate,
    regions: RegionKeyCache,
    markers: MarkerSet<S::Handle>,
    surface: S,
    issued: u64,
    applied: u64,
}

impl<S: MarkerSurface> MapSession<S> {
    pub fn new(mut config: SessionConfig, surface: S) -> Self {
        config.precise_decimals = config.precise_decimals.min(MAX_PRECISE_DECIMALS);
        Self {
            expander: BoundsExpander::new(config.buffer),
            reconciler: MarkerReconciler::new(config.max_markers, config.eviction),
            config,
            gate: MovementGate::new(),
            regions: RegionKeyCache::new(),
            markers: MarkerSet::new(),
            surface,
            issued: 0,
            applied: 0,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Where to center the map at startup.
    pub fn initial_view(&self, geolocated: Option<LngLat>) -> (LngLat, f64) {
        match geolocated {
            Some(pos) => (pos, self.config.default_zoom),
            None => {
                info!("no geolocation, using default center");
                (self.config.default_center, self.config.default_zoom)
            }
        }
    }

    pub fn markers(&self) -> &MarkerSet<S::Handle> {
        &self.markers
    }

    pub fn region_cache(&self) -> &RegionKeyCache {
        &self.regions
    }

    pub fn gate(&self) -> &MovementGate {
        &self.gate
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Returns `None` when no fetch is needed for this viewport.
    pub fn plan(&mut self, viewport: BoundingRegion, center: LngLat) -> Option<FetchPlan> {
        let expanded = self.expander.expand(&viewport);
        if !self.gate.should_refetch(&expanded) {
            debug!("viewport still covers last fetch center, skipping");
            return None;
        }

        let encoding = self.regions.encoding_for(&expanded, self.config.precise_decimals);
        self.issued += 1;
        Some(FetchPlan {
            generation: self.issued,
            viewport: expanded,
            center,
            request: encoding.encode(&expanded),
        })
    }

    /// On error the session is left untouched and the error is returned.
    pub fn apply(
        &mut self,
        plan: FetchPlan,
        result: Result<FetchResponse, FetchError>,
    ) -> Result<CycleOutcome, FetchError> {
        let response = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("fetch cycle {} failed: {}", plan.generation, e);
                return Err(e);
            }
        };
        if plan.generation < self.applied {
            debug!("dropping cycle {}, {} already applied", plan.generation, self.applied);
            return Ok(CycleOutcome::Stale { generation: plan.generation });
        }
        self.applied = plan.generation;

        if response.served_from_cache {
            self.regions.record(RegionCacheKey::of(&plan.viewport));
        }
        let outcome = self.reconciler.reconcile(
            &mut self.markers,
            &mut self.surface,
            &plan.viewport,
            &response.points,
        );
        self.gate.record(plan.center);
        Ok(CycleOutcome::Applied(outcome))
    }

    /// One full cycle: plan, fetch, apply.
    pub async fn refresh<C: FetchClient>(
        &mut self,
        client: &C,
        viewport: BoundingRegion,
        center: LngLat,
    ) -> Result<CycleOutcome, FetchError> {
        let Some(plan) = self.plan(viewport, center) else {
            return Ok(CycleOutcome::Skipped);
        };
        let result = client.fetch(&plan.request).await;
        self.apply(plan, result)
    }

    /// Removes every marker from the surface and hands the surface back.
    pub fn close(mut self) -> S {
        self.markers.clear(&mut self.surface);
        self.surface
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markers::tests::{point, RecordingSurface};

    fn session() -> MapSession<RecordingSurface> {
        MapSession::new(SessionConfig::default(), RecordingSurface::default())
    }

    fn ok(points: Vec<crate::models::GeoPoint>, cache: bool) -> Result<FetchResponse, FetchError> {
        Ok(FetchResponse { points, served_from_cache: cache })
    }

    fn failed() -> Result<FetchResponse, FetchError> {
        Err(FetchError::Status(reqwest::StatusCode::BAD_GATEWAY))
    }

    #[test]
    fn first_plan_is_precise_and_expanded() {
        let mut s = session();
        let vp = BoundingRegion::new(12.45, 41.85, 12.55, 41.95);
        let plan = s.plan(vp, vp.center()).unwrap();
        assert_eq!(plan.generation, 1);
        assert!(plan.viewport.contains_region(&vp));
        assert!(!plan.request.is_cell());
    }

    #[test]
    fn unmoved_viewport_is_skipped_after_success() {
        let mut s = session();
        let vp = BoundingRegion::new(12.45, 41.85, 12.55, 41.95);
        let plan = s.plan(vp, vp.center()).unwrap();
        s.apply(plan, ok(vec![point(1, 41.9, 12.5)], false)).unwrap();
        assert!(s.plan(vp, vp.center()).is_none());
    }

    #[test]
    fn failure_leaves_everything_untouched() {
        let mut s = session();
        let vp = BoundingRegion::new(12.45, 41.85, 12.55, 41.95);
        let plan = s.plan(vp, vp.center()).unwrap();
        s.apply(plan, ok(vec![point(1, 41.9, 12.5)], false)).unwrap();

        let far = BoundingRegion::new(13.45, 42.85, 13.55, 42.95);
        let plan = s.plan(far, far.center()).unwrap();
        assert!(s.apply(plan, failed()).is_err());

        assert_eq!(s.markers().ids(), vec![1]);
        assert_eq!(s.gate().previous_center(), Some(vp.center()));
        assert_eq!(s.surface().placed, 1);
    }

    #[test]
    fn failed_first_fetch_keeps_gate_open() {
        let mut s = session();
        let vp = BoundingRegion::new(12.45, 41.85, 12.55, 41.95);
        let plan = s.plan(vp, vp.center()).unwrap();
        assert!(s.apply(plan, failed()).is_err());
        assert!(s.plan(vp, vp.center()).is_some());
    }

    #[test]
    fn cache_hit_switches_cell_to_cell_mode() {
        let mut s = session();
        let vp = BoundingRegion::new(12.45, 41.85, 12.55, 41.95);
        let plan = s.plan(vp, vp.center()).unwrap();
        s.apply(plan, ok(vec![], true)).unwrap();
        assert!(s.region_cache().has(&RegionCacheKey { lng: 12, lat: 41 }));

        let next = BoundingRegion::new(12.65, 41.55, 12.75, 41.65);
        let plan = s.plan(next, next.center()).unwrap();
        assert_eq!(plan.request.path(), "/api/fountains/12/41");
    }

    #[test]
    fn stale_cycle_is_discarded() {
        let mut s = session();
        let a = BoundingRegion::new(12.45, 41.85, 12.55, 41.95);
        let b = BoundingRegion::new(12.65, 41.55, 12.75, 41.65);
        let first = s.plan(a, a.center()).unwrap();
        let second = s.plan(b, b.center()).unwrap();

        s.apply(second, ok(vec![point(2, 41.6, 12.7)], false)).unwrap();
        let outcome = s.apply(first, ok(vec![point(1, 41.9, 12.5)], false)).unwrap();

        assert_eq!(outcome, CycleOutcome::Stale { generation: 1 });
        assert_eq!(s.markers().ids(), vec![2]);
        assert_eq!(s.gate().previous_center(), Some(b.center()));
    }

    #[test]
    fn huge_precision_still_yields_valid_requests() {
        let config = SessionConfig { precise_decimals: 400, ..SessionConfig::default() };
        let mut s = MapSession::new(config, RecordingSurface::default());
        assert_eq!(s.config().precise_decimals, MAX_PRECISE_DECIMALS);

        let vp = BoundingRegion::new(12.45, 41.85, 12.55, 41.95);
        let plan = s.plan(vp, vp.center()).unwrap();
        assert!(plan.request.coverage().is_valid());
        assert!(plan.request.coverage().contains_region(&plan.viewport));
    }

    #[test]
    fn initial_view_falls_back_to_default() {
        let s = session();
        let here = LngLat::new(2.35, 48.85);
        assert_eq!(s.initial_view(Some(here)), (here, DEFAULT_ZOOM));
        assert_eq!(s.initial_view(None).0, SessionConfig::default().default_center);
    }

    #[test]
    fn close_clears_the_surface() {
        let mut s = session();
        let vp = BoundingRegion::new(12.45, 41.85, 12.55, 41.95);
        let plan = s.plan(vp, vp.center()).unwrap();
        s.apply(plan, ok(vec![point(1, 41.9, 12.5), point(2, 41.91, 12.51)], false)).unwrap();
        let surface = s.close();
        assert!(surface.live.is_empty());
        assert_eq!(surface.removed, 2);
    }

    #[test]
    fn config_reads_partial_toml() {
        let cfg: SessionConfig = toml::from_str("max_markers = 50\neviction = \"keep_all\"").unwrap();
        assert_eq!(cfg.max_markers, 50);
        assert_eq!(cfg.eviction, EvictionPolicy::KeepAll);
        assert_eq!(cfg.buffer, DEFAULT_BUFFER);
    }
}
