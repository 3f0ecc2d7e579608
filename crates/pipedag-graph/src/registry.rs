use indexmap::IndexMap;
use pipedag_core::{ConnectionKey, Rect, StepId, StepMap, Vec2};

/// Result of a hit test at a canvas position.
///
/// Priority order: OutgoingHandle > IncomingHandle > Step > Connection > None
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitResult {
    None,
    /// Connector a new connection is dragged out of.
    OutgoingHandle(StepId),
    /// Connector a dragged connection can be dropped onto.
    IncomingHandle(StepId),
    Step(StepId),
    Connection(ConnectionKey),
}

impl HitResult {
    /// The step under the pointer, whichever part of it was hit.
    pub fn step(&self) -> Option<StepId> {
        match self {
            Self::OutgoingHandle(id) | Self::IncomingHandle(id) | Self::Step(id) => Some(*id),
            Self::None | Self::Connection(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubicBezier {
    pub start: Vec2,
    pub control1: Vec2,
    pub control2: Vec2,
    pub end: Vec2,
}

impl CubicBezier {
    /// Connection curve leaving `start` and entering `end` horizontally.
    pub fn horizontal(start: Vec2, end: Vec2) -> Self {
        let half = (end.x - start.x) / 2.0;
        Self {
            start,
            control1: Vec2::new(start.x + half, start.y),
            control2: Vec2::new(end.x - half, end.y),
            end,
        }
    }

    /// Sample the curve at parameter t [0, 1]
    pub fn sample(&self, t: f64) -> Vec2 {
        let mt = 1.0 - t;
        self.start * (mt * mt * mt)
            + self.control1 * (3.0 * mt * mt * t)
            + self.control2 * (3.0 * mt * t * t)
            + self.end * (t * t * t)
    }

    /// Minimum distance from `point` to `num_samples` uniformly spaced curve points.
    pub fn point_distance(&self, point: Vec2, num_samples: usize) -> f64 {
        let samples = num_samples.max(2);
        (0..=samples)
            .map(|i| self.sample(i as f64 / samples as f64).distance(point))
            .fold(f64::INFINITY, f64::min)
    }
}

/// Canvas-space geometry of one mounted step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepHandle {
    pub bounds: Rect,
    pub incoming_handle: Rect,
    pub outgoing_handle: Rect,
}

impl StepHandle {
    pub const CONNECTOR_SIZE: f64 = 20.0;

    /// Handle with connectors centered on the left and right edges.
    pub fn from_bounds(bounds: Rect) -> Self {
        let half = Self::CONNECTOR_SIZE / 2.0;
        let mid_y = bounds.center().y;
        let connector = Vec2::new(Self::CONNECTOR_SIZE, Self::CONNECTOR_SIZE);
        Self {
            bounds,
            incoming_handle: Rect::from_pos_size(
                Vec2::new(bounds.min.x - half, mid_y - half),
                connector,
            ),
            outgoing_handle: Rect::from_pos_size(
                Vec2::new(bounds.max.x - half, mid_y - half),
                connector,
            ),
        }
    }

    pub fn center(&self) -> Vec2 {
        self.bounds.center()
    }
}

/// Id-to-geometry lookup for mounted steps and drawn connections.
///
/// Steps are registered when they are mounted on the canvas and looked up by
/// uuid, so gesture handling never inspects rendered output. Later mounts are
/// drawn on top and win overlapping hit tests.
#[derive(Debug, Clone)]
pub struct StepRegistry {
    handles: IndexMap<StepId, StepHandle>,
    connection_curves: Vec<(ConnectionKey, CubicBezier)>,
    /// Tolerance (canvas units) for connection hit testing.
    edge_tolerance: f64,
    /// Number of samples along bezier curves for distance computation.
    bezier_samples: usize,
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StepRegistry {
    pub fn new() -> Self {
        Self {
            handles: IndexMap::new(),
            connection_curves: Vec::new(),
            edge_tolerance: 8.0,
            bezier_samples: 48,
        }
    }

    pub fn with_tolerance(tolerance: f64) -> Self {
        Self {
            edge_tolerance: tolerance,
            ..Self::new()
        }
    }

    pub fn edge_tolerance(&self) -> f64 {
        self.edge_tolerance
    }

    pub fn mount(&mut self, id: StepId, handle: StepHandle) {
        self.handles.insert(id, handle);
    }

    pub fn unmount(&mut self, id: &StepId) -> Option<StepHandle> {
        self.handles.shift_remove(id)
    }

    pub fn get(&self, id: &StepId) -> Option<&StepHandle> {
        self.handles.get(id)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &StepId> {
        self.handles.keys()
    }

    /// Re-mounts every step at its current position and drops steps that are gone.
    pub fn sync_steps(&mut self, steps: &StepMap, step_size: Vec2) {
        self.handles.retain(|id, _| steps.contains_key(id));
        for (id, step) in steps {
            let bounds = Rect::from_pos_size(step.position(), step_size);
            self.handles.insert(*id, StepHandle::from_bounds(bounds));
        }
    }

    pub fn set_connection_curves(&mut self, curves: Vec<(ConnectionKey, CubicBezier)>) {
        self.connection_curves = curves;
    }

    pub fn hit_test(&self, pos: Vec2) -> HitResult {
        if let Some(id) = self.topmost(|h| h.outgoing_handle.contains(pos)) {
            return HitResult::OutgoingHandle(id);
        }

        if let Some(id) = self.topmost(|h| h.incoming_handle.contains(pos)) {
            return HitResult::IncomingHandle(id);
        }

        if let Some(id) = self.topmost(|h| h.bounds.contains(pos)) {
            return HitResult::Step(id);
        }

        if let Some(key) = self.hit_test_connection(pos, self.edge_tolerance) {
            return HitResult::Connection(key);
        }

        HitResult::None
    }

    /// Closest connection within `tolerance` of `pos`.
    pub fn hit_test_connection(&self, pos: Vec2, tolerance: f64) -> Option<ConnectionKey> {
        let mut best: Option<(ConnectionKey, f64)> = None;
        for (key, curve) in &self.connection_curves {
            let dist = curve.point_distance(pos, self.bezier_samples);
            if dist <= tolerance && best.is_none_or(|(_, best_dist)| dist < best_dist) {
                best = Some((*key, dist));
            }
        }
        best.map(|(key, _)| key)
    }

    fn topmost(&self, pred: impl Fn(&StepHandle) -> bool) -> Option<StepId> {
        self.handles
            .iter()
            .rev()
            .find(|(_, handle)| pred(handle))
            .map(|(id, _)| *id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipedag_core::Step;

    const SIZE: Vec2 = Vec2::new(190.0, 105.0);

    fn registry_with(positions: &[(u128, Vec2)]) -> StepRegistry {
        let mut steps = StepMap::new();
        for (raw, pos) in positions {
            let id = StepId::from_u128(*raw);
            steps.insert(id, Step::new(id, "s").with_position(*pos));
        }
        let mut registry = StepRegistry::new();
        registry.sync_steps(&steps, SIZE);
        registry
    }

    #[test]
    fn test_handles_take_priority_over_body() {
        let registry = registry_with(&[(1, Vec2::ZERO)]);
        let id = StepId::from_u128(1);

        assert_eq!(
            registry.hit_test(Vec2::new(190.0, 52.5)),
            HitResult::OutgoingHandle(id)
        );
        assert_eq!(
            registry.hit_test(Vec2::new(0.0, 52.5)),
            HitResult::IncomingHandle(id)
        );
        assert_eq!(registry.hit_test(Vec2::new(95.0, 10.0)), HitResult::Step(id));
        assert_eq!(registry.hit_test(Vec2::new(500.0, 500.0)), HitResult::None);
    }

    #[test]
    fn test_later_mount_wins_overlap() {
        let registry = registry_with(&[(1, Vec2::ZERO), (2, Vec2::new(50.0, 0.0))]);
        assert_eq!(
            registry.hit_test(Vec2::new(100.0, 10.0)),
            HitResult::Step(StepId::from_u128(2))
        );
    }

    #[test]
    fn test_sync_unmounts_removed_steps() {
        let mut registry = registry_with(&[(1, Vec2::ZERO), (2, Vec2::new(400.0, 0.0))]);
        let mut steps = StepMap::new();
        let keep = StepId::from_u128(2);
        steps.insert(keep, Step::new(keep, "s").with_position(Vec2::new(400.0, 0.0)));
        registry.sync_steps(&steps, SIZE);

        assert_eq!(registry.len(), 1);
        assert!(registry.get(&StepId::from_u128(1)).is_none());
        assert_eq!(registry.get(&keep).unwrap().center(), Vec2::new(495.0, 52.5));
    }

    #[test]
    fn test_connection_hit_within_tolerance() {
        let mut registry = StepRegistry::new();
        let key = ConnectionKey::new(StepId::from_u128(1), StepId::from_u128(2));
        registry.set_connection_curves(vec![(
            key,
            CubicBezier::horizontal(Vec2::new(0.0, 0.0), Vec2::new(300.0, 0.0)),
        )]);

        assert_eq!(
            registry.hit_test(Vec2::new(150.0, 5.0)),
            HitResult::Connection(key)
        );
        assert_eq!(registry.hit_test(Vec2::new(150.0, 30.0)), HitResult::None);
    }

    #[test]
    fn test_bezier_endpoints() {
        let curve = CubicBezier::horizontal(Vec2::new(10.0, 20.0), Vec2::new(110.0, 80.0));
        assert_eq!(curve.sample(0.0), Vec2::new(10.0, 20.0));
        assert!(curve.sample(1.0).distance(Vec2::new(110.0, 80.0)) < 1e-9);
        assert!(curve.point_distance(Vec2::new(10.0, 20.0), 48) < 1e-9);
    }
}
