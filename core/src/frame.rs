use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::{
    finite_number, normalize_grid_matrix, AgentId, AgentRenderState, CellCoord, GridMatrix,
    Orientation, Position,
};

/// Battery level assumed when a frame does not report one.
const DEFAULT_BATTERY: f32 = 100.0;

/// One discrete snapshot of the simulated environment.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Frame {
    /// Simulation step that produced the frame.
    pub timestep: u64,
    /// Agents present in the frame, in roster order.
    pub agents: Vec<AgentRenderState>,
    /// Cells visited so far; positive values count as visited.
    pub coverage_grid: GridMatrix,
    /// Threat level per cell in `0.0..=1.0`.
    pub threat_grid: GridMatrix,
    /// How recently each cell was visited, `1.0` being the current step.
    pub recency_grid: Option<GridMatrix>,
    /// Cells that agents cannot enter.
    pub obstacles: Vec<CellCoord>,
    /// Locations of the charging stations.
    pub charging_stations: Vec<Position>,
    /// Wall-clock time reported by the simulation, in seconds.
    pub timestamp: Option<f64>,
}

impl Frame {
    /// Position of the tracked subject: the first agent in the roster.
    #[must_use]
    pub fn primary_position(&self) -> Option<Position> {
        self.agents.first().map(|agent| agent.position)
    }

    /// Decodes a frame from JSON text.
    pub fn from_json(text: &str) -> Result<Self, FrameDecodeError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(&value)
    }

    /// Decodes a frame from a loosely shaped JSON object.
    ///
    /// Both `snake_case` and `camelCase` field names are accepted. Frames
    /// without an `agents` list fall back to a single legacy
    /// `agent_position`, reported as agent `0`.
    pub fn from_value(value: &Value) -> Result<Self, FrameDecodeError> {
        let object = value.as_object().ok_or(FrameDecodeError::NotAnObject)?;

        let timestep = field(object, &["timestep", "step", "t"])
            .and_then(finite_number)
            .map_or(0, |step| step.max(0.0) as u64);

        let agents = match field(object, &["agents"]) {
            Some(Value::Array(agents)) => agents.iter().enumerate().filter_map(decode_agent).collect(),
            _ => legacy_agent(object).into_iter().collect(),
        };

        let grid = |names: &[&str]| field(object, names).map(normalize_grid_matrix);
        let coverage_grid =
            grid(&["coverage_grid", "coverageGrid", "coverage"]).unwrap_or_default();
        let threat_grid = grid(&["threat_grid", "threatGrid", "threats"]).unwrap_or_default();
        let grid_shape = [&coverage_grid, &threat_grid]
            .into_iter()
            .find(|grid| !grid.is_empty())
            .map(|grid| (grid.width(), grid.height()));

        let obstacles = match field(object, &["obstacle_grid", "obstacleGrid"]) {
            Some(value) => normalize_grid_matrix(value).positive_cells().collect(),
            None => field(object, &["obstacles"])
                .map(|value| decode_cells(value, grid_shape))
                .unwrap_or_default(),
        };

        Ok(Self {
            timestep,
            agents,
            recency_grid: grid(&["recency_grid", "recencyGrid", "visit_recency"])
                .filter(|grid| !grid.is_empty()),
            coverage_grid,
            threat_grid,
            obstacles,
            charging_stations: match field(object, &["charging_stations", "chargingStations"]) {
                Some(Value::Array(stations)) => {
                    stations.iter().filter_map(Position::from_value).collect()
                }
                _ => Vec::new(),
            },
            timestamp: field(object, &["timestamp"]).and_then(finite_number),
        })
    }
}

/// Errors raised while decoding frames and episode batches.
#[derive(Debug, Error)]
pub enum FrameDecodeError {
    /// The payload was not valid JSON.
    #[error("frame payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A frame was expected to be a JSON object.
    #[error("frame payload must be a JSON object")]
    NotAnObject,
    /// A batch was neither a list of episodes nor an object holding one.
    #[error("episode batch must be a list of episodes or an object with an `episodes` list")]
    InvalidBatch,
}

/// Ordered frames recorded for one episode.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Episode {
    /// Frames in simulation order.
    pub frames: Vec<Arc<Frame>>,
}

impl Episode {
    /// Creates an episode from frames.
    #[must_use]
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames: frames.into_iter().map(Arc::new).collect(),
        }
    }
}

/// Recorded episodes replayed as one batch.
///
/// The episode list is shared so that its identity can be compared cheaply.
#[derive(Clone, Debug)]
pub struct EpisodeBatch {
    episodes: Arc<[Episode]>,
}

impl EpisodeBatch {
    /// Creates a batch from episodes.
    #[must_use]
    pub fn new(episodes: Vec<Episode>) -> Self {
        Self {
            episodes: episodes.into(),
        }
    }

    /// Episodes in replay order.
    #[must_use]
    pub fn episodes(&self) -> &[Episode] {
        &self.episodes
    }

    /// Shared handle to the episode list.
    #[must_use]
    pub fn episode_list(&self) -> &Arc<[Episode]> {
        &self.episodes
    }

    /// Total number of frames across all episodes.
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.episodes.iter().map(|episode| episode.frames.len()).sum()
    }

    /// Decodes a batch from JSON text.
    pub fn from_json(text: &str) -> Result<Self, FrameDecodeError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(&value)
    }

    /// Decodes a batch from `[episode, ...]` or `{"episodes": [...]}`.
    ///
    /// Each episode is either `{"frames": [...]}` or a bare list of frames.
    /// Frames that fail to decode are skipped.
    pub fn from_value(value: &Value) -> Result<Self, FrameDecodeError> {
        let episodes = match value {
            Value::Array(episodes) => episodes,
            Value::Object(object) => match object.get("episodes") {
                Some(Value::Array(episodes)) => episodes,
                _ => return Err(FrameDecodeError::InvalidBatch),
            },
            _ => return Err(FrameDecodeError::InvalidBatch),
        };

        let episodes = episodes
            .iter()
            .map(|episode| {
                let frames = match episode {
                    Value::Array(frames) => frames.as_slice(),
                    Value::Object(object) => match object.get("frames") {
                        Some(Value::Array(frames)) => frames.as_slice(),
                        _ => &[],
                    },
                    _ => &[],
                };
                Episode {
                    frames: frames
                        .iter()
                        .filter_map(|frame| Frame::from_value(frame).ok())
                        .map(Arc::new)
                        .collect(),
                }
            })
            .collect();

        Ok(Self::new(episodes))
    }
}

fn field<'a>(object: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .find_map(|name| object.get(*name))
        .filter(|value| !value.is_null())
}

fn decode_agent((index, value): (usize, &Value)) -> Option<AgentRenderState> {
    let object = value.as_object()?;
    let position = field(object, &["position", "pos"])
        .and_then(Position::from_value)
        .or_else(|| Position::from_value(value))?;
    let id = field(object, &["id", "agent_id", "agentId"])
        .map(AgentId::from_value)
        .unwrap_or(AgentId::Numeric(index as u64));

    Some(AgentRenderState {
        id,
        position,
        orientation: field(object, &["orientation", "direction"]).and_then(Orientation::normalize),
        battery: field(object, &["battery", "battery_level", "batteryLevel"])
            .and_then(finite_number)
            .map_or(DEFAULT_BATTERY, |battery| battery as f32),
        is_charging: field(object, &["is_charging", "isCharging", "charging"])
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

fn legacy_agent(object: &Map<String, Value>) -> Option<AgentRenderState> {
    let position =
        field(object, &["agent_position", "agentPosition", "position"]).and_then(Position::from_value)?;

    Some(AgentRenderState {
        id: AgentId::Numeric(0),
        position,
        orientation: field(object, &["agent_orientation", "agentOrientation", "orientation"])
            .and_then(Orientation::normalize),
        battery: field(object, &["battery", "agent_battery", "agentBattery"])
            .and_then(finite_number)
            .map_or(DEFAULT_BATTERY, |battery| battery as f32),
        is_charging: field(object, &["is_charging", "isCharging"])
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

/// Reads obstacle cells from a list of positions or from a 0/1 grid.
///
/// Rows of exactly two entries read as `[x, y]` pairs unless the frame's
/// other grids are two columns wide with the same number of rows.
fn decode_cells(value: &Value, grid_shape: Option<(usize, usize)>) -> Vec<CellCoord> {
    let Value::Array(items) = value else {
        return normalize_grid_matrix(value).positive_cells().collect();
    };
    let widths: Option<Vec<usize>> = items
        .iter()
        .map(|item| item.as_array().map(Vec::len))
        .collect();
    let is_grid = match widths {
        Some(widths) if !widths.is_empty() => {
            widths.iter().all(|width| *width != 2) || grid_shape == Some((2, items.len()))
        }
        _ => false,
    };
    if is_grid {
        return normalize_grid_matrix(value).positive_cells().collect();
    }

    items
        .iter()
        .filter_map(|item| match item {
            Value::Object(cell) if cell.contains_key("column") => Some(CellCoord::new(
                cell.get("column").and_then(finite_number)? as i32,
                cell.get("row").and_then(finite_number)? as i32,
            )),
            other => Position::from_value(other).map(Position::cell),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_multi_agent_frames() {
        let frame = Frame::from_value(&json!({
            "timestep": 7,
            "agents": [
                {"id": 1, "position": {"x": 2, "y": 3}, "orientation": -1, "battery": 40, "is_charging": true},
                {"id": "b", "position": [4.5, 1], "orientation": null},
            ],
            "coverage_grid": [[1, 0], [0, 0]],
            "threatGrid": [[0, 0.5], [1, 0]],
            "timestamp": 12.5,
        }))
        .expect("frame decodes");

        assert_eq!(frame.timestep, 7);
        assert_eq!(frame.agents.len(), 2);
        assert_eq!(frame.agents[0].orientation, Some(Orientation::West));
        assert!(frame.agents[0].is_charging);
        assert_eq!(frame.agents[0].battery, 40.0);
        assert_eq!(frame.agents[1].id, AgentId::Named("b".to_owned()));
        assert_eq!(frame.agents[1].orientation, None);
        assert_eq!(frame.agents[1].battery, DEFAULT_BATTERY);
        assert_eq!(frame.threat_grid.get(1, 0), Some(0.5));
        assert_eq!(frame.coverage_grid.positive_count(), 1);
        assert_eq!(frame.timestamp, Some(12.5));
        assert!(frame.recency_grid.is_none());
    }

    #[test]
    fn legacy_single_agent_frames_become_agent_zero() {
        let frame = Frame::from_value(&json!({
            "timestep": 1,
            "agent_position": [3, 4],
            "agent_orientation": 5,
        }))
        .expect("frame decodes");

        assert_eq!(frame.agents.len(), 1);
        assert_eq!(frame.agents[0].id, AgentId::Numeric(0));
        assert_eq!(frame.primary_position(), Some(Position::new(3.0, 4.0)));
        assert_eq!(frame.agents[0].orientation, Some(Orientation::East));
        assert!(frame.coverage_grid.is_empty());
    }

    #[test]
    fn obstacles_accept_cell_lists_and_grids() {
        let listed = Frame::from_value(&json!({"obstacles": [{"x": 1, "y": 2}, [0, 3]]}))
            .expect("frame decodes");
        assert_eq!(
            listed.obstacles,
            vec![CellCoord::new(1, 2), CellCoord::new(0, 3)]
        );

        let gridded = Frame::from_value(&json!({"obstacles": [[0, 1, 0], [1, 0, 0]]}))
            .expect("frame decodes");
        assert_eq!(
            gridded.obstacles,
            vec![CellCoord::new(1, 0), CellCoord::new(0, 1)]
        );
    }

    #[test]
    fn two_column_obstacle_grids_follow_the_frame_shape() {
        let shaped = Frame::from_value(&json!({
            "coverage_grid": [[0, 0], [0, 0]],
            "obstacles": [[1, 1], [0, 0]],
        }))
        .expect("frame decodes");
        assert_eq!(
            shaped.obstacles,
            vec![CellCoord::new(0, 0), CellCoord::new(1, 0)]
        );

        let named = Frame::from_value(&json!({"obstacle_grid": [[1, 1], [0, 0]]}))
            .expect("frame decodes");
        assert_eq!(named.obstacles, shaped.obstacles);

        let listed = Frame::from_value(&json!({
            "coverage_grid": [[0, 0, 0], [0, 0, 0]],
            "obstacles": [[1, 1], [0, 0]],
        }))
        .expect("frame decodes");
        assert_eq!(
            listed.obstacles,
            vec![CellCoord::new(1, 1), CellCoord::new(0, 0)]
        );
    }

    #[test]
    fn rejects_non_object_frames() {
        assert!(matches!(
            Frame::from_value(&json!([1, 2])),
            Err(FrameDecodeError::NotAnObject)
        ));
        assert!(matches!(
            Frame::from_json("{not json"),
            Err(FrameDecodeError::Json(_))
        ));
    }

    #[test]
    fn batches_accept_both_episode_shapes() {
        let batch = EpisodeBatch::from_value(&json!({
            "episodes": [
                {"frames": [{"agent_position": [0, 0]}, {"agent_position": [1, 0]}]},
                [{"agent_position": [2, 0]}, "garbage"],
            ]
        }))
        .expect("batch decodes");

        assert_eq!(batch.episodes().len(), 2);
        assert_eq!(batch.frame_count(), 3);
        assert!(matches!(
            EpisodeBatch::from_value(&json!({"frames": []})),
            Err(FrameDecodeError::InvalidBatch)
        ));
    }
}
