#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Derivation system that turns observed frames into render-ready view state.
//!
//! The engine is synchronous and performs no I/O. Callers hand it the current
//! [`FrameSource`] whenever it may have changed; flattening is cached behind a
//! fingerprint of the source identity and frame count, and trajectories grow
//! incrementally from the frames that arrived since the previous observation.

mod source;

use std::{borrow::Cow, collections::BTreeMap, sync::Arc};

use patrol_view_core::{
    AgentId, CellCoord, EnvironmentMetadata, Frame, GridMatrix, Position, RouteStats, Trajectory,
};
use tracing::debug;

pub use source::{FeedId, FrameSource, LiveFeed};
use source::{Fingerprint, SourceKey};

/// Default number of points kept by [`waypoint_preview`].
pub const DEFAULT_PREVIEW_LIMIT: usize = 30;

/// Memoized derivation of view state from a changing frame source.
#[derive(Debug)]
pub struct FrameDerivationEngine {
    metadata: Option<EnvironmentMetadata>,
    preview_limit: usize,
    fingerprint: Option<Fingerprint>,
    flattened: Arc<Vec<Arc<Frame>>>,
    trajectory_source: Option<SourceKey>,
    processed: usize,
    trajectory: Trajectory,
    agent_trajectories: BTreeMap<AgentId, Trajectory>,
}

impl FrameDerivationEngine {
    /// Creates an engine backed by optional static environment metadata.
    #[must_use]
    pub fn new(metadata: Option<EnvironmentMetadata>) -> Self {
        Self {
            metadata,
            preview_limit: DEFAULT_PREVIEW_LIMIT,
            fingerprint: None,
            flattened: Arc::new(Vec::new()),
            trajectory_source: None,
            processed: 0,
            trajectory: Trajectory::new(),
            agent_trajectories: BTreeMap::new(),
        }
    }

    /// Overrides the number of points returned by [`Self::waypoint_preview`].
    #[must_use]
    pub fn with_preview_limit(mut self, limit: usize) -> Self {
        self.preview_limit = limit.max(1);
        self
    }

    /// Replaces the static environment metadata.
    pub fn set_metadata(&mut self, metadata: Option<EnvironmentMetadata>) {
        self.metadata = metadata;
    }

    /// Static environment metadata, if any.
    #[must_use]
    pub fn metadata(&self) -> Option<&EnvironmentMetadata> {
        self.metadata.as_ref()
    }

    /// Re-evaluates derived state for the provided source.
    ///
    /// Returns `true` when the flattened frame list was rebuilt. An unchanged
    /// fingerprint leaves every derived value, including the flattened list
    /// reference, untouched.
    pub fn observe(&mut self, source: FrameSource<'_>) -> bool {
        let fingerprint = Fingerprint {
            source: source.key(),
            frame_count: source.frame_count(),
            evicted: source.evicted(),
        };
        if self.fingerprint.as_ref() == Some(&fingerprint) {
            return false;
        }

        self.flattened = source.flatten();
        self.extend_trajectories(&fingerprint.source, fingerprint.evicted);
        self.fingerprint = Some(fingerprint);
        true
    }

    // `processed` counts frames from the start of the source, evicted ones
    // included, so eviction alone never looks like a shrink.
    fn extend_trajectories(&mut self, source: &SourceKey, evicted: usize) {
        let count = evicted + self.flattened.len();
        let same_source = self.trajectory_source.as_ref() == Some(source);

        if !same_source || count < self.processed {
            if self.processed > 0 {
                debug!(
                    previous = self.processed,
                    frames = count,
                    same_source,
                    "rebuilding trajectories from the first frame"
                );
            }
            self.trajectory.clear();
            self.agent_trajectories.clear();
            self.processed = 0;
            self.trajectory_source = Some(source.clone());
        }

        if evicted > self.processed {
            debug!(
                skipped = evicted - self.processed,
                "frames were evicted before they were observed"
            );
        }
        let start = self.processed.saturating_sub(evicted);
        for frame in &self.flattened[start..] {
            if let Some(position) = frame.primary_position() {
                self.trajectory.push(position);
            }
            for agent in &frame.agents {
                self.agent_trajectories
                    .entry(agent.id.clone())
                    .or_default()
                    .push(agent.position);
            }
        }
        self.processed = count;
    }

    /// Resets every derived value, as when the consuming view is torn down.
    pub fn clear_cache(&mut self) {
        self.fingerprint = None;
        self.flattened = Arc::new(Vec::new());
        self.trajectory_source = None;
        self.processed = 0;
        self.trajectory.clear();
        self.agent_trajectories.clear();
    }

    /// Flattened frames of the last observed source.
    #[must_use]
    pub fn frames(&self) -> &Arc<Vec<Arc<Frame>>> {
        &self.flattened
    }

    /// Last frame of the flattened list.
    #[must_use]
    pub fn latest_frame(&self) -> Option<&Arc<Frame>> {
        self.flattened.last()
    }

    /// Deduplicated path of the tracked subject: the first agent of each frame.
    #[must_use]
    pub fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }

    /// Deduplicated path of every agent seen so far.
    #[must_use]
    pub fn agent_trajectories(&self) -> &BTreeMap<AgentId, Trajectory> {
        &self.agent_trajectories
    }

    /// Coverage grid of the latest frame with metadata fallbacks.
    #[must_use]
    pub fn coverage_grid(&self) -> Cow<'_, GridMatrix> {
        self.grid_with_fallback(
            |frame| &frame.coverage_grid,
            |metadata| metadata.coverage_grid.as_ref(),
        )
    }

    /// Threat grid of the latest frame with metadata fallbacks.
    #[must_use]
    pub fn threat_grid(&self) -> Cow<'_, GridMatrix> {
        self.grid_with_fallback(
            |frame| &frame.threat_grid,
            |metadata| metadata.threat_grid.as_ref(),
        )
    }

    fn grid_with_fallback<'a>(
        &'a self,
        from_frame: impl Fn(&'a Frame) -> &'a GridMatrix,
        from_metadata: impl Fn(&'a EnvironmentMetadata) -> Option<&'a GridMatrix>,
    ) -> Cow<'a, GridMatrix> {
        if let Some(grid) = self
            .latest_frame()
            .map(|frame| from_frame(frame))
            .filter(|grid| !grid.is_empty())
        {
            return Cow::Borrowed(grid);
        }

        let Some(metadata) = &self.metadata else {
            return Cow::Owned(GridMatrix::empty());
        };
        match from_metadata(metadata).filter(|grid| !grid.is_empty()) {
            Some(grid) => Cow::Borrowed(grid),
            None => Cow::Owned(GridMatrix::zeros(
                metadata.width as usize,
                metadata.height as usize,
            )),
        }
    }

    /// Recency grid of the latest frame, if it carries one.
    #[must_use]
    pub fn recency_grid(&self) -> Option<&GridMatrix> {
        self.latest_frame()
            .and_then(|frame| frame.recency_grid.as_ref())
    }

    /// Obstacle cells of the latest frame, otherwise those of the metadata.
    #[must_use]
    pub fn obstacles(&self) -> &[CellCoord] {
        match self.latest_frame() {
            Some(frame) if !frame.obstacles.is_empty() => &frame.obstacles,
            _ => self
                .metadata
                .as_ref()
                .map(|metadata| metadata.obstacles.as_slice())
                .unwrap_or_default(),
        }
    }

    /// Charging stations of the latest frame, otherwise those of the metadata.
    #[must_use]
    pub fn charging_stations(&self) -> &[Position] {
        match self.latest_frame() {
            Some(frame) if !frame.charging_stations.is_empty() => &frame.charging_stations,
            _ => self
                .metadata
                .as_ref()
                .map(|metadata| metadata.charging_stations.as_slice())
                .unwrap_or_default(),
        }
    }

    /// Bounded sample of the tracked subject's trajectory.
    #[must_use]
    pub fn waypoint_preview(&self) -> Vec<Position> {
        waypoint_preview(self.trajectory.points(), self.preview_limit)
    }

    /// Summary of the route covered so far.
    #[must_use]
    pub fn route_stats(&self) -> RouteStats {
        let total_tiles = self
            .metadata
            .as_ref()
            .map_or(0, EnvironmentMetadata::total_tiles);
        let visited_tiles = self.coverage_grid().positive_count();
        let visited_ratio = if total_tiles == 0 {
            0.0
        } else {
            visited_tiles as f32 / total_tiles as f32 * 100.0
        };

        RouteStats {
            visited_tiles,
            total_tiles,
            visited_ratio,
            step_count: self.flattened.len(),
            path_length: self.trajectory.len(),
            start: self.trajectory.first(),
            end: self.trajectory.last(),
        }
    }
}

impl Default for FrameDerivationEngine {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Samples `points` down to roughly `limit` entries.
///
/// Short paths are returned unchanged. Longer ones are sampled every
/// `ceil(len / limit)` points from the start, and the final point is always
/// kept, so the preview never exceeds `limit + 1` entries.
#[must_use]
pub fn waypoint_preview(points: &[Position], limit: usize) -> Vec<Position> {
    let limit = limit.max(1);
    if points.len() <= limit {
        return points.to_vec();
    }

    let stride = points.len().div_ceil(limit);
    let mut preview: Vec<Position> = points.iter().step_by(stride).copied().collect();
    if (points.len() - 1) % stride != 0 {
        if let Some(last) = points.last() {
            preview.push(*last);
        }
    }
    preview
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(length: usize) -> Vec<Position> {
        (0..length).map(|x| Position::new(x as f32, 0.0)).collect()
    }

    #[test]
    fn preview_keeps_short_paths_intact() {
        let points = line(30);
        assert_eq!(waypoint_preview(&points, 30), points);
    }

    #[test]
    fn preview_strides_and_forces_last_point() {
        let points = line(31);
        let preview = waypoint_preview(&points, 30);

        assert_eq!(preview.first(), Some(&Position::new(0.0, 0.0)));
        assert_eq!(preview.get(1), Some(&Position::new(2.0, 0.0)));
        assert_eq!(preview.last(), Some(&Position::new(30.0, 0.0)));
        assert_eq!(preview.len(), 16);
    }

    #[test]
    fn preview_does_not_duplicate_a_sampled_last_point() {
        let points = line(61);
        let preview = waypoint_preview(&points, 30);

        assert_eq!(preview.last(), Some(&Position::new(60.0, 0.0)));
        assert_eq!(preview.len(), 21);
    }
}
