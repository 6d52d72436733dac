use std::fmt;

use patrol_view_core::{EnvironmentMetadata, EpisodeBatch, Position, RouteStats};
use patrol_view_system_frame_derivation::{FrameDerivationEngine, FrameSource};

/// Offline summary of a recorded batch.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct InspectReport {
    pub(crate) episodes: usize,
    pub(crate) agents: usize,
    pub(crate) stats: RouteStats,
    pub(crate) preview: Vec<Position>,
}

pub(crate) fn inspect(
    batch: &EpisodeBatch,
    metadata: Option<EnvironmentMetadata>,
    preview_limit: usize,
) -> InspectReport {
    let mut engine = FrameDerivationEngine::new(metadata).with_preview_limit(preview_limit);
    let _ = engine.observe(FrameSource::Batch(batch));

    InspectReport {
        episodes: batch.episodes().len(),
        agents: engine.agent_trajectories().len(),
        stats: engine.route_stats(),
        preview: engine.waypoint_preview(),
    }
}

impl fmt::Display for InspectReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = &self.stats;
        writeln!(f, "episodes:      {}", self.episodes)?;
        writeln!(f, "agents:        {}", self.agents)?;
        writeln!(f, "steps:         {}", stats.step_count)?;
        writeln!(f, "path length:   {}", stats.path_length)?;
        writeln!(
            f,
            "coverage:      {}/{} tiles ({:.1}%)",
            stats.visited_tiles, stats.total_tiles, stats.visited_ratio
        )?;
        writeln!(f, "start:         {}", describe(stats.start))?;
        writeln!(f, "end:           {}", describe(stats.end))?;
        write!(f, "waypoints:    ")?;
        if self.preview.is_empty() {
            return writeln!(f, " none");
        }
        for point in &self.preview {
            write!(f, " ({}, {})", point.x, point.y)?;
        }
        writeln!(f)
    }
}

fn describe(position: Option<Position>) -> String {
    position.map_or_else(|| "-".to_owned(), |p| format!("({}, {})", p.x, p.y))
}
