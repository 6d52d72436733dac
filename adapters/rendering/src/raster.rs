use std::collections::HashSet;

use glam::Vec2;
use patrol_view_core::{AgentId, AgentRenderState, CellCoord, Position, ViewportTransform};

use crate::{
    agent_color, threat_color, Color, DrawingContext, Surface, TrackedPath, ViewState,
    CHARGING_RING, GRID_LINE, NO_THREAT, OBSTACLE, PATROL_RANGE, RECENCY_TINT, STATION,
    VISITED_OVERLAY,
};

/// Side length of a grid cell in pixels, before the viewport scale.
pub const CELL_SIZE: f32 = 60.0;

const TRAJECTORY_ALPHA: f32 = 0.6;
const FIRST_DOT_ALPHA: f32 = 0.2;
const LAST_DOT_ALPHA: f32 = 0.8;
const RECENCY_MAX_ALPHA: f32 = 0.6;
const PATROL_FILL_ALPHA: f32 = 0.12;
const PATROL_DASH: [f32; 2] = [8.0, 6.0];
const STATION_GLYPH: &str = "\u{26A1}";
const BORDER: Color = Color::from_rgb_u8(44, 62, 80);
const BADGE_TEXT: Color = Color::from_rgb_u8(255, 255, 255);

/// Pixel center of the cell containing `position`.
#[must_use]
pub fn cell_center(position: Position) -> Vec2 {
    let cell = position.cell();
    Vec2::new(
        cell.column() as f32 * CELL_SIZE + CELL_SIZE / 2.0,
        cell.row() as f32 * CELL_SIZE + CELL_SIZE / 2.0,
    )
}

/// Paints `view` onto `surface` under `transform`.
///
/// A missing surface, or one that cannot provide a drawing context, is
/// silently skipped.
pub fn render(surface: Option<&mut dyn Surface>, view: &ViewState, transform: ViewportTransform) {
    let Some(surface) = surface else {
        return;
    };
    let Some(context) = surface.context() else {
        return;
    };
    render_to(context, view, transform);
}

/// Paints `view` directly onto a drawing context.
pub fn render_to(
    context: &mut dyn DrawingContext,
    view: &ViewState,
    transform: ViewportTransform,
) {
    let size = context.size();
    context.clear_rect(Vec2::ZERO, size);

    context.save();
    context.translate(Vec2::new(transform.offset_x, transform.offset_y));
    context.scale(transform.scale);

    let roster = view.roster();
    draw_cells(context, view);
    draw_stations(context, &view.charging_stations);
    for (ordinal, path) in view.trajectories.iter().enumerate() {
        let color = agent_color(&path.subject, &roster, ordinal);
        draw_trajectory(context, path, color);
    }
    draw_agents(context, &view.agents, &roster);
    if let Some(first) = view.agents.first() {
        draw_patrol_range(context, first, view.patrol_radius);
    }

    context.restore();
}

fn draw_cells(context: &mut dyn DrawingContext, view: &ViewState) {
    let (columns, rows) = view.dimensions();
    let obstacles: HashSet<CellCoord> = view.obstacles.iter().copied().collect();
    let cell_size = Vec2::splat(CELL_SIZE);

    context.set_stroke_color(GRID_LINE);
    context.set_line_width(1.0);
    for row in 0..rows {
        for column in 0..columns {
            let origin = Vec2::new(column as f32, row as f32) * CELL_SIZE;
            let cell = CellCoord::new(column as i32, row as i32);

            let threat = view.threat_grid.get(column, row).unwrap_or(0.0);
            if obstacles.contains(&cell) {
                context.set_fill_color(OBSTACLE);
                context.fill_rect(origin, cell_size);
            } else if threat > 0.0 {
                context.set_fill_color(threat_color(threat));
                context.fill_rect(origin, cell_size);
            } else {
                context.set_fill_color(NO_THREAT);
                context.fill_rect(origin, cell_size);
                if let Some(overlay) = coverage_overlay(view, column, row) {
                    context.set_fill_color(overlay);
                    context.fill_rect(origin, cell_size);
                }
            }
            context.stroke_rect(origin, cell_size);
        }
    }
}

/// Recency tint when the cell has a recency value, else the flat visited overlay.
fn coverage_overlay(view: &ViewState, column: usize, row: usize) -> Option<Color> {
    let recency = view
        .recency_grid
        .as_ref()
        .and_then(|grid| grid.get(column, row))
        .filter(|value| *value > 0.0);
    if let Some(recency) = recency {
        return Some(RECENCY_TINT.with_alpha((recency * RECENCY_MAX_ALPHA).min(RECENCY_MAX_ALPHA)));
    }
    let visited = view
        .coverage_grid
        .get(column, row)
        .is_some_and(|value| value > 0.0);
    visited.then_some(VISITED_OVERLAY)
}

fn draw_stations(context: &mut dyn DrawingContext, stations: &[Position]) {
    for station in stations {
        let center = cell_center(*station);
        context.begin_path();
        context.arc(center, CELL_SIZE * 0.3);
        context.set_fill_color(STATION);
        context.fill();
        context.set_stroke_color(BORDER);
        context.set_line_width(2.0);
        context.stroke();

        context.set_fill_color(BORDER);
        context.fill_text(STATION_GLYPH, center, CELL_SIZE * 0.35);
    }
}

fn draw_trajectory(context: &mut dyn DrawingContext, path: &TrackedPath, color: Color) {
    let Some((first, rest)) = path.points.split_first() else {
        return;
    };

    context.set_global_alpha(TRAJECTORY_ALPHA);
    context.set_stroke_color(color);
    context.set_line_width(3.0);
    context.begin_path();
    context.move_to(cell_center(*first));
    for point in rest {
        context.line_to(cell_center(*point));
    }
    context.stroke();

    context.set_fill_color(color);
    let last_index = path.points.len().saturating_sub(1);
    for (index, point) in path.points.iter().enumerate() {
        let progress = if last_index == 0 {
            1.0
        } else {
            index as f32 / last_index as f32
        };
        context.set_global_alpha(FIRST_DOT_ALPHA + (LAST_DOT_ALPHA - FIRST_DOT_ALPHA) * progress);
        context.begin_path();
        context.arc(cell_center(*point), 4.0);
        context.fill();
    }
    context.set_global_alpha(1.0);
}

fn draw_agents(context: &mut dyn DrawingContext, agents: &[AgentRenderState], roster: &[AgentId]) {
    let show_badges = agents.len() > 1;
    for (index, agent) in agents.iter().enumerate() {
        let center = cell_center(agent.position);
        let color = agent_color(&agent.id, roster, index);

        context.begin_path();
        context.arc(center, CELL_SIZE * 0.35);
        context.set_fill_color(color);
        context.fill();
        context.set_stroke_color(BORDER);
        context.set_line_width(2.0);
        context.stroke();

        if agent.is_charging {
            context.begin_path();
            context.arc(center, CELL_SIZE * 0.45);
            context.set_stroke_color(CHARGING_RING);
            context.set_line_width(3.0);
            context.stroke();
        }

        match agent.orientation {
            Some(orientation) => {
                let [x, y] = orientation.unit_vector();
                draw_arrow(context, center, Vec2::new(x, y));
            }
            None => {
                context.begin_path();
                context.arc(center, 4.0);
                context.set_fill_color(BADGE_TEXT);
                context.fill();
            }
        }

        if let (true, Some(id)) = (show_badges, agent.id.as_numeric()) {
            context.set_fill_color(BADGE_TEXT);
            context.fill_text(&id.to_string(), center, CELL_SIZE * 0.25);
        }
    }
}

fn draw_arrow(context: &mut dyn DrawingContext, center: Vec2, direction: Vec2) {
    let tip = center + direction * CELL_SIZE * 0.3;
    let base = center + direction * CELL_SIZE * 0.12;
    let side = direction.perp() * CELL_SIZE * 0.1;

    context.set_stroke_color(BADGE_TEXT);
    context.set_line_width(3.0);
    context.begin_path();
    context.move_to(center);
    context.line_to(base);
    context.stroke();

    context.set_fill_color(BADGE_TEXT);
    context.begin_path();
    context.move_to(tip);
    context.line_to(base + side);
    context.line_to(base - side);
    context.close_path();
    context.fill();
}

fn draw_patrol_range(
    context: &mut dyn DrawingContext,
    agent: &AgentRenderState,
    radius: Option<f32>,
) {
    let Some(radius) = radius.filter(|radius| radius.is_finite() && *radius > 0.0) else {
        return;
    };
    let center = cell_center(agent.position);
    let radius = radius * CELL_SIZE;

    context.set_global_alpha(PATROL_FILL_ALPHA);
    context.set_fill_color(PATROL_RANGE);
    context.begin_path();
    context.arc(center, radius);
    context.fill();
    context.set_global_alpha(1.0);

    if let Some(dash) = context.line_dash() {
        dash.set_line_dash(&PATROL_DASH);
    }
    context.set_stroke_color(PATROL_RANGE);
    context.set_line_width(2.0);
    context.begin_path();
    context.arc(center, radius);
    context.stroke();
    if let Some(dash) = context.line_dash() {
        dash.set_line_dash(&[]);
    }
}
