#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the patrol viewer.
//!
//! This crate defines the data that flows through the viewer. Live sessions
//! deliver [`WireMessage`] envelopes, some of which decode into [`Frame`]
//! snapshots of the simulated grid-world. Recorded sessions arrive as an
//! [`EpisodeBatch`]. The derivation system turns frames into trajectories,
//! overlay grids and [`RouteStats`], and rendering adapters paint the result
//! under a caller-supplied [`ViewportTransform`].

mod frame;
mod grid;
mod wire;

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub use frame::{Episode, EpisodeBatch, Frame, FrameDecodeError};
pub use grid::{normalize_grid_matrix, GridMatrix};
pub use wire::{
    message_kinds, MetricRecord, SessionRecord, WireMessage, ABNORMAL_CLOSURE, NORMAL_CLOSURE,
};

/// Continuous coordinate within the simulated grid-world.
///
/// Rendering always floors a position to the cell that contains it.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal coordinate measured in cells.
    pub x: f32,
    /// Vertical coordinate measured in cells.
    pub y: f32,
}

impl Position {
    /// Creates a new position.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Cell that contains the position.
    #[must_use]
    pub fn cell(self) -> CellCoord {
        CellCoord::new(self.x.floor() as i32, self.y.floor() as i32)
    }

    /// Decodes a position from `{x, y}` objects or `[x, y]` pairs.
    ///
    /// Numeric strings are accepted. Returns `None` when either axis is
    /// missing or not a finite number.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        let (x, y) = match value {
            Value::Object(map) => (map.get("x")?, map.get("y")?),
            Value::Array(pair) if pair.len() >= 2 => (&pair[0], &pair[1]),
            _ => return None,
        };
        Some(Self::new(finite_number(x)? as f32, finite_number(y)? as f32))
    }
}

/// Location of a single grid cell expressed as column and row coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellCoord {
    column: i32,
    row: i32,
}

impl CellCoord {
    /// Creates a new grid cell coordinate.
    #[must_use]
    pub const fn new(column: i32, row: i32) -> Self {
        Self { column, row }
    }

    /// Zero-based column index of the cell.
    #[must_use]
    pub const fn column(&self) -> i32 {
        self.column
    }

    /// Zero-based row index of the cell.
    #[must_use]
    pub const fn row(&self) -> i32 {
        self.row
    }
}

/// Cardinal facing of an agent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Orientation {
    /// Facing toward decreasing row indices.
    North,
    /// Facing toward increasing column indices.
    East,
    /// Facing toward increasing row indices.
    South,
    /// Facing toward decreasing column indices.
    West,
}

impl Orientation {
    /// Orientations in index order, `0..=3`.
    pub const ALL: [Self; 4] = [Self::North, Self::East, Self::South, Self::West];

    /// Reduces any finite number modulo 4 into an orientation.
    ///
    /// Negative values wrap (`-1` becomes [`Orientation::West`]) and fractional
    /// values are floored after reduction. Non-finite input yields `None`.
    #[must_use]
    pub fn from_number(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        let index = (value.rem_euclid(4.0).floor() as usize) % 4;
        Some(Self::ALL[index])
    }

    /// Normalises an arbitrary JSON value; anything but a finite number is unknown.
    #[must_use]
    pub fn normalize(value: &Value) -> Option<Self> {
        value.as_f64().and_then(Self::from_number)
    }

    /// Index of the orientation in `0..=3`.
    #[must_use]
    pub const fn index(self) -> u8 {
        match self {
            Self::North => 0,
            Self::East => 1,
            Self::South => 2,
            Self::West => 3,
        }
    }

    /// Unit vector pointing along the orientation in screen space (y grows downward).
    #[must_use]
    pub const fn unit_vector(self) -> [f32; 2] {
        match self {
            Self::North => [0.0, -1.0],
            Self::East => [1.0, 0.0],
            Self::South => [0.0, 1.0],
            Self::West => [-1.0, 0.0],
        }
    }
}

/// Identifier reported for an agent.
///
/// Simulations normally number their agents, but labels are tolerated.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AgentId {
    /// Numeric identifier.
    Numeric(u64),
    /// Free-form label.
    Named(String),
}

impl AgentId {
    /// Returns the numeric identifier, if the agent has one.
    #[must_use]
    pub fn as_numeric(&self) -> Option<u64> {
        match self {
            Self::Numeric(id) => Some(*id),
            Self::Named(_) => None,
        }
    }

    /// Decodes an identifier from a JSON value.
    ///
    /// Non-negative integral numbers become [`AgentId::Numeric`]; everything
    /// else keeps its textual form.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        if let Some(id) = value.as_u64() {
            return Self::Numeric(id);
        }
        if let Some(id) = value.as_f64() {
            if id.is_finite() && id >= 0.0 && id.fract() == 0.0 {
                return Self::Numeric(id as u64);
            }
        }
        match value {
            Value::String(label) => Self::Named(label.clone()),
            other => Self::Named(other.to_string()),
        }
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(id) => write!(f, "{id}"),
            Self::Named(label) => f.write_str(label),
        }
    }
}

/// Render-ready description of one agent, rebuilt from every frame.
#[derive(Clone, Debug, PartialEq)]
pub struct AgentRenderState {
    /// Identifier reported by the simulation.
    pub id: AgentId,
    /// Current position of the agent.
    pub position: Position,
    /// Facing of the agent, `None` when unknown.
    pub orientation: Option<Orientation>,
    /// Remaining battery charge in percent.
    pub battery: f32,
    /// Whether the agent is docked at a charging station.
    pub is_charging: bool,
}

/// Ordered path of positions visited by a tracked subject.
///
/// No two consecutive entries are equal: idle frames do not grow the path.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Trajectory {
    points: Vec<Position>,
}

impl Trajectory {
    /// Creates an empty trajectory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a position unless it repeats the current last entry.
    pub fn push(&mut self, position: Position) {
        if self.points.last() != Some(&position) {
            self.points.push(position);
        }
    }

    /// Removes every recorded position.
    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Recorded positions in visiting order.
    #[must_use]
    pub fn points(&self) -> &[Position] {
        &self.points
    }

    /// Number of recorded positions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether no position has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// First recorded position.
    #[must_use]
    pub fn first(&self) -> Option<Position> {
        self.points.first().copied()
    }

    /// Most recently recorded position.
    #[must_use]
    pub fn last(&self) -> Option<Position> {
        self.points.last().copied()
    }
}

impl FromIterator<Position> for Trajectory {
    fn from_iter<I: IntoIterator<Item = Position>>(iter: I) -> Self {
        let mut trajectory = Self::new();
        for position in iter {
            trajectory.push(position);
        }
        trajectory
    }
}

/// Summary of the route covered by the tracked subject.
#[derive(Clone, Debug, PartialEq, Default, Serialize)]
pub struct RouteStats {
    /// Cells of the coverage grid with a positive value.
    pub visited_tiles: usize,
    /// Cells in the environment, `width × height`.
    pub total_tiles: usize,
    /// Visited share of the environment in percent.
    pub visited_ratio: f32,
    /// Number of frames observed.
    pub step_count: usize,
    /// Number of distinct consecutive trajectory points.
    pub path_length: usize,
    /// First trajectory point.
    pub start: Option<Position>,
    /// Last trajectory point.
    pub end: Option<Position>,
}

/// Lifecycle of a monitored session's connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No connection and no pending work.
    #[default]
    Idle,
    /// Handshake in progress.
    Connecting,
    /// Connection established and streaming.
    Open,
    /// Waiting for the backoff delay before the next attempt.
    Reconnecting,
    /// Reconnects exhausted; state is fetched periodically instead.
    FallbackPolling,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Reconnecting => "reconnecting",
            Self::FallbackPolling => "fallback polling",
        };
        f.write_str(label)
    }
}

/// Affine transform applied to every render call: translate, then uniform scale.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViewportTransform {
    /// Horizontal translation in surface pixels.
    pub offset_x: f32,
    /// Vertical translation in surface pixels.
    pub offset_y: f32,
    /// Uniform scale factor.
    pub scale: f32,
}

impl ViewportTransform {
    /// Creates a new transform.
    #[must_use]
    pub const fn new(offset_x: f32, offset_y: f32, scale: f32) -> Self {
        Self {
            offset_x,
            offset_y,
            scale,
        }
    }
}

impl Default for ViewportTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0)
    }
}

/// Static description of the simulated environment.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentMetadata {
    /// Number of columns in the environment.
    pub width: u32,
    /// Number of rows in the environment.
    pub height: u32,
    /// Threat levels known before any frame arrives.
    pub threat_grid: Option<GridMatrix>,
    /// Coverage known before any frame arrives.
    pub coverage_grid: Option<GridMatrix>,
    /// Cells that agents cannot enter.
    pub obstacles: Vec<CellCoord>,
    /// Locations of the charging stations.
    pub charging_stations: Vec<Position>,
    /// Patrol radius of the lead agent measured in cells.
    #[serde(deserialize_with = "lenient_radius")]
    pub patrol_radius: Option<f32>,
}

impl EnvironmentMetadata {
    /// Creates metadata for a `width × height` environment without static layers.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    /// Number of cells in the environment.
    #[must_use]
    pub fn total_tiles(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

fn lenient_radius<'de, D>(deserializer: D) -> Result<Option<f32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value
        .as_f64()
        .filter(|radius| radius.is_finite())
        .map(|radius| radius as f32))
}

/// Reads a finite number from a JSON number or numeric string.
pub(crate) fn finite_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => text.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn orientation_wraps_negative_and_overflowing_values() {
        assert_eq!(Orientation::normalize(&json!(-1)), Some(Orientation::West));
        assert_eq!(Orientation::normalize(&json!(4)), Some(Orientation::North));
        assert_eq!(Orientation::normalize(&json!(6)), Some(Orientation::South));
        assert_eq!(Orientation::normalize(&json!(1.5)), Some(Orientation::East));
    }

    #[test]
    fn orientation_rejects_non_numbers() {
        assert_eq!(Orientation::normalize(&Value::Null), None);
        assert_eq!(Orientation::normalize(&json!("2")), None);
        assert_eq!(Orientation::from_number(f64::NAN), None);
        assert_eq!(Orientation::from_number(f64::INFINITY), None);
    }

    #[test]
    fn trajectory_suppresses_consecutive_duplicates_only() {
        let trajectory: Trajectory = [
            Position::new(0.0, 0.0),
            Position::new(1.0, 0.0),
            Position::new(1.0, 0.0),
            Position::new(0.0, 0.0),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            trajectory.points(),
            &[
                Position::new(0.0, 0.0),
                Position::new(1.0, 0.0),
                Position::new(0.0, 0.0)
            ]
        );
    }

    #[test]
    fn position_cell_floors_fractional_and_negative_coordinates() {
        assert_eq!(Position::new(2.9, 0.1).cell(), CellCoord::new(2, 0));
        assert_eq!(Position::new(-0.5, 3.0).cell(), CellCoord::new(-1, 3));
    }

    #[test]
    fn position_decodes_objects_pairs_and_numeric_strings() {
        assert_eq!(
            Position::from_value(&json!({"x": 1, "y": "2.5"})),
            Some(Position::new(1.0, 2.5))
        );
        assert_eq!(
            Position::from_value(&json!([3, 4])),
            Some(Position::new(3.0, 4.0))
        );
        assert_eq!(Position::from_value(&json!({"x": 1})), None);
        assert_eq!(Position::from_value(&json!("1,2")), None);
    }

    #[test]
    fn agent_ids_keep_numbers_numeric() {
        assert_eq!(AgentId::from_value(&json!(3)), AgentId::Numeric(3));
        assert_eq!(AgentId::from_value(&json!(2.0)), AgentId::Numeric(2));
        assert_eq!(
            AgentId::from_value(&json!("scout")),
            AgentId::Named("scout".to_owned())
        );
        assert_eq!(AgentId::from_value(&json!(-1)).as_numeric(), None);
    }

    #[test]
    fn metadata_ignores_non_numeric_patrol_radius() {
        let metadata: EnvironmentMetadata =
            serde_json::from_value(json!({"width": 4, "height": 3, "patrol_radius": "wide"}))
                .expect("metadata decodes");

        assert_eq!(metadata.patrol_radius, None);
        assert_eq!(metadata.total_tiles(), 12);
    }
}
