use std::time::{Duration, Instant};

use chipglass_core::Document;

/// Hierarchical render depth bounds.
pub const MAX_DEPTH: u8 = 10;

/// Tuning for the level-of-detail policy. Construction-time configuration;
/// see [`crate::engine::RenderConfig`].
#[derive(Debug, Clone, Copy)]
pub struct LodParams {
    pub max_depth: u8,
    /// Deepen when EMA utilization drops below this.
    pub low_utilization: f64,
    /// Flatten when EMA utilization climbs above this.
    pub high_utilization: f64,
    /// EMA weight of the newest sample.
    pub ema_alpha: f64,
    /// Minimum wall time between committed depth changes.
    pub commit_interval: Duration,
    /// Commit needs `zoom < commit_zoom_low · zoom_at_commit`...
    pub commit_zoom_low: f64,
    /// ...or `zoom > commit_zoom_high · zoom_at_commit`.
    pub commit_zoom_high: f64,
}

impl Default for LodParams {
    fn default() -> Self {
        Self {
            max_depth: MAX_DEPTH,
            low_utilization: 0.30,
            high_utilization: 0.90,
            ema_alpha: 0.1,
            commit_interval: Duration::from_secs(1),
            commit_zoom_low: 0.2,
            commit_zoom_high: 2.0,
        }
    }
}

/// Owns the current render depth.
///
/// Fed once per frame with the visible polygon count (hidden layers already
/// excluded), the polygon budget, and the zoom. A depth change is committed
/// only when the utilization EMA sits outside the deadband AND at least one
/// second has passed since the last commit AND the zoom has crossed a 2x
/// threshold since then — smooth zooming inside one regime never rebuilds.
#[derive(Debug)]
pub struct LodController {
    params: LodParams,
    depth: u8,
    avg_visible: f64,
    last_commit: Option<Instant>,
    zoom_at_commit: f64,
}

impl LodController {
    pub fn new(params: LodParams) -> Self {
        Self {
            params,
            depth: 0,
            avg_visible: 0.0,
            last_commit: None,
            zoom_at_commit: 1.0,
        }
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    pub fn avg_visible(&self) -> f64 {
        self.avg_visible
    }

    /// Reset after a document swap or an externally built depth.
    pub fn reset(&mut self, depth: u8, zoom: f64, now: Instant) {
        self.depth = depth.min(self.params.max_depth);
        self.avg_visible = 0.0;
        self.last_commit = Some(now);
        self.zoom_at_commit = zoom;
    }

    /// Thresholds exposed in metrics: visible counts at which the current
    /// depth would want to change.
    pub fn thresholds(&self, budget: usize) -> (f64, f64) {
        (
            self.params.low_utilization * budget as f64,
            self.params.high_utilization * budget as f64,
        )
    }

    /// Observe one frame. Returns the newly committed depth if this frame
    /// decided to change it.
    pub fn observe(
        &mut self,
        visible_polygons: usize,
        budget: usize,
        zoom: f64,
        now: Instant,
    ) -> Option<u8> {
        self.avg_visible = (1.0 - self.params.ema_alpha) * self.avg_visible
            + self.params.ema_alpha * visible_polygons as f64;

        let utilization = self.avg_visible / budget.max(1) as f64;
        let candidate = if utilization < self.params.low_utilization {
            self.depth.saturating_add(1).min(self.params.max_depth)
        } else if utilization > self.params.high_utilization {
            self.depth.saturating_sub(1)
        } else {
            self.depth
        };
        if candidate == self.depth {
            return None;
        }

        if let Some(last) = self.last_commit {
            if now.duration_since(last) < self.params.commit_interval {
                return None;
            }
            let crossed = zoom < self.zoom_at_commit * self.params.commit_zoom_low
                || zoom > self.zoom_at_commit * self.params.commit_zoom_high;
            if !crossed {
                return None;
            }
        }

        log::info!(
            "LOD commit: depth {} -> {} (avg visible {:.0}, zoom {:.4})",
            self.depth,
            candidate,
            self.avg_visible,
            zoom
        );
        self.depth = candidate;
        self.last_commit = Some(now);
        self.zoom_at_commit = zoom;
        Some(candidate)
    }
}

/// Initial depth for a fresh document: the deepest level whose full
/// flattened polygon count still fits in 90% of the budget. Keeps the first
/// frame both detailed and stable.
pub fn initial_depth(doc: &Document, budget: usize, params: &LodParams) -> u8 {
    let order = match doc.topo_order() {
        Ok(order) => order,
        Err(_) => return 0, // validated at load; unreachable in practice
    };
    let counts = doc.polygon_counts_by_depth(&order, params.max_depth as usize);
    let limit = (params.high_utilization * budget as f64) as u64;
    let mut best = 0u8;
    for d in 0..=params.max_depth {
        if doc.polygons_at_depth(&counts, d as usize) <= limit {
            best = d;
        } else {
            break;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> LodController {
        LodController::new(LodParams::default())
    }

    fn warm(lod: &mut LodController, visible: usize) {
        // Run the EMA to steady state without going through commit gating.
        for _ in 0..100 {
            lod.avg_visible = (1.0 - lod.params.ema_alpha) * lod.avg_visible
                + lod.params.ema_alpha * visible as f64;
        }
    }

    #[test]
    fn test_no_commit_within_interval() {
        let t0 = Instant::now();
        let mut lod = controller();
        lod.reset(2, 1.0, t0);
        warm(&mut lod, 100);
        // Low utilization wants depth+1, but neither gate is open.
        assert_eq!(lod.observe(100, 100_000, 1.0, t0 + Duration::from_millis(10)), None);
        assert_eq!(lod.depth(), 2);
    }

    #[test]
    fn test_no_commit_without_zoom_crossing() {
        let t0 = Instant::now();
        let mut lod = controller();
        lod.reset(2, 1.0, t0);
        warm(&mut lod, 100);
        // Plenty of time, but zoom stayed inside [0.2x, 2x].
        assert_eq!(
            lod.observe(100, 100_000, 1.5, t0 + Duration::from_secs(5)),
            None
        );
    }

    #[test]
    fn test_commit_deepens_on_low_utilization() {
        let t0 = Instant::now();
        let mut lod = controller();
        lod.reset(2, 1.0, t0);
        warm(&mut lod, 100);
        let committed = lod.observe(100, 100_000, 2.5, t0 + Duration::from_secs(2));
        assert_eq!(committed, Some(3));
        assert_eq!(lod.depth(), 3);
    }

    #[test]
    fn test_commit_flattens_on_high_utilization() {
        let t0 = Instant::now();
        let mut lod = controller();
        lod.reset(5, 1.0, t0);
        warm(&mut lod, 99_000);
        let committed = lod.observe(99_000, 100_000, 0.1, t0 + Duration::from_secs(2));
        assert_eq!(committed, Some(4));
    }

    #[test]
    fn test_at_most_one_step_per_crossing() {
        // S4: a single x2 zoom crossing commits at most one depth change.
        let t0 = Instant::now();
        let mut lod = controller();
        lod.reset(2, 1.0, t0);
        warm(&mut lod, 100);
        assert_eq!(
            lod.observe(100, 100_000, 2.5, t0 + Duration::from_secs(2)),
            Some(3)
        );
        // Immediately after the commit both gates are shut again.
        assert_eq!(
            lod.observe(100, 100_000, 2.5, t0 + Duration::from_secs(2)),
            None
        );
    }

    #[test]
    fn test_depth_stays_in_range() {
        let t0 = Instant::now();
        let mut lod = controller();
        lod.reset(0, 1.0, t0);
        warm(&mut lod, 99_900);
        // Already at 0; high utilization cannot go below 0.
        assert_eq!(
            lod.observe(99_900, 100_000, 0.1, t0 + Duration::from_secs(2)),
            None
        );
        assert_eq!(lod.depth(), 0);

        lod.reset(MAX_DEPTH, 1.0, t0);
        lod.avg_visible = 0.0;
        assert_eq!(
            lod.observe(0, 100_000, 10.0, t0 + Duration::from_secs(2)),
            None
        );
        assert_eq!(lod.depth(), MAX_DEPTH);
    }

    #[test]
    fn test_deadband_holds_depth() {
        let t0 = Instant::now();
        let mut lod = controller();
        lod.reset(3, 1.0, t0);
        warm(&mut lod, 50_000);
        // 50% utilization sits between 30% and 90%: no candidate at all.
        assert_eq!(
            lod.observe(50_000, 100_000, 100.0, t0 + Duration::from_secs(10)),
            None
        );
        assert_eq!(lod.depth(), 3);
    }
}
