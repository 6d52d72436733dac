use patrol_view_core::AgentId;

use crate::Color;

/// Fill of cells without threat.
pub const NO_THREAT: Color = Color::from_rgb_u8(236, 240, 241);

/// Fill of impassable cells.
pub const OBSTACLE: Color = Color::from_rgb_u8(44, 62, 80);

/// Border drawn around every cell.
pub const GRID_LINE: Color = Color::from_rgb_u8(189, 195, 199);

/// Flat overlay marking visited cells when no recency is known.
pub const VISITED_OVERLAY: Color = Color::new(46.0 / 255.0, 204.0 / 255.0, 113.0 / 255.0, 0.3);

/// Tint of the recency overlay; its alpha follows the recency value.
pub const RECENCY_TINT: Color = Color::from_rgb_u8(52, 152, 219);

/// Fill of charging stations.
pub const STATION: Color = Color::from_rgb_u8(241, 196, 15);

/// Ring drawn around agents that are charging.
pub const CHARGING_RING: Color = Color::from_rgb_u8(39, 174, 96);

/// Disk and ring marking the patrol range.
pub const PATROL_RANGE: Color = Color::from_rgb_u8(155, 89, 182);

/// Colors assigned to agents and their trajectories.
pub const AGENT_PALETTE: [Color; 6] = [
    Color::from_rgb_u8(41, 128, 185),
    Color::from_rgb_u8(231, 76, 60),
    Color::from_rgb_u8(39, 174, 96),
    Color::from_rgb_u8(142, 68, 173),
    Color::from_rgb_u8(230, 126, 34),
    Color::from_rgb_u8(22, 160, 133),
];

/// Heatmap color of a threat level.
///
/// Level `0` (and anything not positive) maps to [`NO_THREAT`]. Positive
/// levels keep red at full intensity while green falls linearly from 255 to
/// 0 as the level rises to 1, so the ramp runs from yellow to red.
#[must_use]
pub fn threat_color(level: f32) -> Color {
    if !(level > 0.0) {
        return NO_THREAT;
    }
    let level = level.min(1.0);
    let green = (255.0 * (1.0 - level)).floor() as u8;
    Color::from_rgb_u8(255, green, 0)
}

/// Palette color of an agent.
///
/// Agents present in the roster use their roster index; others fall back to
/// their numeric id, and labelled agents to `fallback`.
#[must_use]
pub fn agent_color(id: &AgentId, roster: &[AgentId], fallback: usize) -> Color {
    let index = roster
        .iter()
        .position(|candidate| candidate == id)
        .or_else(|| id.as_numeric().map(|id| (id % AGENT_PALETTE.len() as u64) as usize))
        .unwrap_or(fallback);
    AGENT_PALETTE[index % AGENT_PALETTE.len()]
}
