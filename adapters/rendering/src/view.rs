use patrol_view_core::{AgentId, AgentRenderState, CellCoord, GridMatrix, Position};

/// Everything the raster renderer draws for one frame.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct ViewState {
    /// Number of columns of the environment.
    pub columns: usize,
    /// Number of rows of the environment.
    pub rows: usize,
    /// Threat level per cell.
    pub threat_grid: GridMatrix,
    /// Visited flag per cell.
    pub coverage_grid: GridMatrix,
    /// Visit recency per cell, preferred over the coverage flag.
    pub recency_grid: Option<GridMatrix>,
    /// Impassable cells.
    pub obstacles: Vec<CellCoord>,
    /// Charging station locations.
    pub charging_stations: Vec<Position>,
    /// Paths drawn underneath the agents.
    pub trajectories: Vec<TrackedPath>,
    /// Agents of the latest frame, in roster order.
    pub agents: Vec<AgentRenderState>,
    /// Patrol radius of the first agent, in cells.
    pub patrol_radius: Option<f32>,
}

impl ViewState {
    /// Grid size drawn by the renderer.
    ///
    /// The configured size wins; otherwise the largest overlay grid decides.
    #[must_use]
    pub fn dimensions(&self) -> (usize, usize) {
        let grids = [
            Some(&self.threat_grid),
            Some(&self.coverage_grid),
            self.recency_grid.as_ref(),
        ];
        let columns = if self.columns > 0 {
            self.columns
        } else {
            grids.iter().flatten().map(|grid| grid.width()).max().unwrap_or(0)
        };
        let rows = if self.rows > 0 {
            self.rows
        } else {
            grids.iter().flatten().map(|grid| grid.height()).max().unwrap_or(0)
        };
        (columns, rows)
    }

    /// Identifiers of the current agents, in roster order.
    #[must_use]
    pub fn roster(&self) -> Vec<AgentId> {
        self.agents.iter().map(|agent| agent.id.clone()).collect()
    }
}

/// Trajectory of one agent.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackedPath {
    /// Agent the path belongs to.
    pub subject: AgentId,
    /// Visited positions in order.
    pub points: Vec<Position>,
}

impl TrackedPath {
    /// Creates a new path.
    #[must_use]
    pub fn new(subject: AgentId, points: Vec<Position>) -> Self {
        Self { subject, points }
    }
}
