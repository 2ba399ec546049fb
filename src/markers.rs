//! On-screen marker bookkeeping.
//!
//! The rendering surface is an external collaborator: the reconciler only
//! asks it to place a marker for a point and to remove a marker by handle.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::GeoPoint;
use crate::region::BoundingRegion;

pub const DEFAULT_MAX_MARKERS: usize = 200;

/// The map surface markers are drawn on.
pub trait MarkerSurface {
    type Handle;

    fn place(&mut self, point: &GeoPoint) -> Self::Handle;
    fn remove(&mut self, handle: Self::Handle);
}

#[derive(Debug)]
pub struct PlacedMarker<H> {
    pub point: GeoPoint,
    pub handle: H,
}

/// Markers currently on screen, keyed by point id.
#[derive(Debug)]
pub struct MarkerSet<H> {
    entries: HashMap<i64, PlacedMarker<H>>,
}

impl<H> Default for MarkerSet<H> {
    fn default() -> Self {
        Self { entries: HashMap::new() }
    }
}

impl<H> MarkerSet<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn get(&self, id: i64) -> Option<&PlacedMarker<H>> {
        self.entries.get(&id)
    }

    /// Ids in ascending order.
    pub fn ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlacedMarker<H>> {
        self.entries.values()
    }

    /// Removes every marker from `surface`.
    pub fn clear<S>(&mut self, surface: &mut S)
    where
        S: MarkerSurface<Handle = H>,
    {
        for (_, marker) in self.entries.drain() {
            surface.remove(marker.handle);
        }
    }
}

/// What happens to markers that fall outside the viewport.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Drop markers outside the expanded viewport on every reconcile,
    /// unless the current batch selects them again.
    #[default]
    EvictOffscreen,
    /// Markers stay until the session is closed.
    KeepAll,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Ids placed on the surface, in admission order.
    pub added: Vec<i64>,
    /// Ids removed from the surface, ascending.
    pub removed: Vec<i64>,
    /// Markers that were already present and stayed.
    pub kept: usize,
}

impl ReconcileOutcome {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MarkerReconciler {
    max_markers: usize,
    eviction: EvictionPolicy,
}

impl Default for MarkerReconciler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MARKERS, EvictionPolicy::default())
    }
}

impl MarkerReconciler {
    pub fn new(max_markers: usize, eviction: EvictionPolicy) -> Self {
        Self { max_markers, eviction }
    }

    pub fn max_markers(&self) -> usize {
        self.max_markers
    }

    /// Brings `set` in line with a freshly fetched batch.
    ///
    /// Points inside `viewport` are admitted before points outside it, each
    /// group in batch order, until the set holds `max_markers` entries. The
    /// cap also binds in-viewport points. Identity is the point id, so a
    /// point seen in several batches (or twice in one) yields one marker.
    /// Re-applying the same batch over the same viewport is a no-op.
    pub fn reconcile<S>(
        &self,
        set: &mut MarkerSet<S::Handle>,
        surface: &mut S,
        viewport: &BoundingRegion,
        points: &[GeoPoint],
    ) -> ReconcileOutcome
    where
        S: MarkerSurface,
    {
        let mut selected: HashSet<i64> = set
            .entries
            .values()
            .filter(|m| match self.eviction {
                EvictionPolicy::KeepAll => true,
                EvictionPolicy::EvictOffscreen => viewport.contains(m.point.position()),
            })
            .map(|m| m.point.id)
            .collect();

        let (inside, outside): (Vec<&GeoPoint>, Vec<&GeoPoint>) =
            points.iter().partition(|p| viewport.contains(p.position()));

        let mut seen = HashSet::new();
        let mut admitted = Vec::new();
        for point in inside.into_iter().chain(outside) {
            if !seen.insert(point.id) || selected.contains(&point.id) {
                continue;
            }
            if selected.len() >= self.max_markers {
                break;
            }
            selected.insert(point.id);
            if !set.contains(point.id) {
                admitted.push(point);
            }
        }

        let mut removed: Vec<i64> = set
            .entries
            .keys()
            .filter(|id| !selected.contains(id))
            .copied()
            .collect();
        removed.sort_unstable();
        for id in &removed {
            if let Some(marker) = set.entries.remove(id) {
                surface.remove(marker.handle);
            }
        }
        let kept = set.len();

        let mut added = Vec::with_capacity(admitted.len());
        for point in admitted {
            let handle = surface.place(point);
            set.entries.insert(point.id, PlacedMarker { point: point.clone(), handle });
            added.push(point.id);
        }

        debug!(
            "reconciled markers: +{} -{} ={} (total {})",
            added.len(),
            removed.len(),
            kept,
            set.len()
        );
        ReconcileOutcome { added, removed, kept }
    }
}
