use crate::region::{BoundingRegion, LngLat};

/// Whether a viewport needs a new fetch, given the center of the last one.
/// `bounds` is expected to be already expanded by the buffer.
pub fn should_refetch(bounds: &BoundingRegion, previous_center: Option<LngLat>) -> bool {
    match previous_center {
        Some(center) => !bounds.contains(center),
        None => true,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateState {
    NoPriorFetch,
    HasPriorFetch(LngLat),
}

/// Skips refetching while the last fetch center is still on screen.
#[derive(Debug, Clone, Copy)]
pub struct MovementGate {
    state: GateState,
}

impl Default for MovementGate {
    fn default() -> Self {
        Self { state: GateState::NoPriorFetch }
    }
}

impl MovementGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn previous_center(&self) -> Option<LngLat> {
        match self.state {
            GateState::NoPriorFetch => None,
            GateState::HasPriorFetch(c) => Some(c),
        }
    }

    pub fn should_refetch(&self, expanded: &BoundingRegion) -> bool {
        should_refetch(expanded, self.previous_center())
    }

    /// Called after a successful fetch. There is no way back to
    /// `NoPriorFetch`.
    pub fn record(&mut self, center: LngLat) {
        self.state = GateState::HasPriorFetch(center);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_call_always_fetches() {
        let gate = MovementGate::new();
        assert!(gate.should_refetch(&BoundingRegion::new(0.0, 0.0, 1.0, 1.0)));
        assert!(should_refetch(&BoundingRegion::new(0.0, 0.0, 1.0, 1.0), None));
    }

    #[test]
    fn center_inside_bounds_skips() {
        let mut gate = MovementGate::new();
        gate.record(LngLat::new(0.5, 0.5));
        assert_eq!(gate.state(), GateState::HasPriorFetch(LngLat::new(0.5, 0.5)));
        assert!(!gate.should_refetch(&BoundingRegion::new(0.0, 0.0, 1.0, 1.0)));
        assert!(gate.should_refetch(&BoundingRegion::new(2.0, 2.0, 3.0, 3.0)));
    }

    #[test]
    fn record_replaces_previous_center() {
        let mut gate = MovementGate::new();
        gate.record(LngLat::new(0.5, 0.5));
        gate.record(LngLat::new(2.5, 2.5));
        assert_eq!(gate.previous_center(), Some(LngLat::new(2.5, 2.5)));
        assert!(!gate.should_refetch(&BoundingRegion::new(2.0, 2.0, 3.0, 3.0)));
    }
}
