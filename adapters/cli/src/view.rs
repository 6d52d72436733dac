use patrol_view_core::AgentId;
use patrol_view_rendering::{TrackedPath, ViewState};
use patrol_view_system_frame_derivation::FrameDerivationEngine;

/// Snapshot of the engine's derived state in the shape the renderer draws.
pub(crate) fn build_view(engine: &FrameDerivationEngine) -> ViewState {
    let metadata = engine.metadata();
    let latest = engine.latest_frame();

    let mut trajectories: Vec<TrackedPath> = engine
        .agent_trajectories()
        .iter()
        .filter(|(_, trajectory)| !trajectory.is_empty())
        .map(|(id, trajectory)| TrackedPath::new(id.clone(), trajectory.points().to_vec()))
        .collect();
    if trajectories.is_empty() && !engine.trajectory().is_empty() {
        trajectories.push(TrackedPath::new(
            AgentId::Numeric(0),
            engine.trajectory().points().to_vec(),
        ));
    }

    ViewState {
        columns: metadata.map_or(0, |metadata| metadata.width as usize),
        rows: metadata.map_or(0, |metadata| metadata.height as usize),
        threat_grid: engine.threat_grid().into_owned(),
        coverage_grid: engine.coverage_grid().into_owned(),
        recency_grid: engine.recency_grid().cloned(),
        obstacles: engine.obstacles().to_vec(),
        charging_stations: engine.charging_stations().to_vec(),
        trajectories,
        agents: latest.map(|frame| frame.agents.clone()).unwrap_or_default(),
        patrol_radius: metadata.and_then(|metadata| metadata.patrol_radius),
    }
}
