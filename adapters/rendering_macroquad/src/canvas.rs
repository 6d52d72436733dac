//! Canvas-style drawing context recorded into a display list.
//!
//! Macroquad draws in immediate mode and has no notion of a current path or a
//! transform stack, so the canvas resolves both into screen-space primitives
//! first. [`MacroquadCanvas::flush`] submits the recorded primitives once the
//! whole view has been painted.

use glam::Vec2;
use macroquad::math::Vec2 as MacroquadVec2;
use patrol_view_rendering::{Color, DrawingContext, Surface};

/// Screen-space primitive produced by [`MacroquadCanvas`].
#[derive(Clone, Debug, PartialEq)]
pub enum Primitive {
    /// Solid rectangle.
    Rect {
        /// Top-left corner.
        origin: Vec2,
        /// Width and height.
        size: Vec2,
        /// Fill color with the global alpha applied.
        color: Color,
    },
    /// Rectangle outline.
    RectLines {
        /// Top-left corner.
        origin: Vec2,
        /// Width and height.
        size: Vec2,
        /// Outline thickness.
        thickness: f32,
        /// Outline color with the global alpha applied.
        color: Color,
    },
    /// Solid disk.
    Circle {
        /// Disk center.
        center: Vec2,
        /// Disk radius.
        radius: f32,
        /// Fill color with the global alpha applied.
        color: Color,
    },
    /// Circle outline.
    CircleLines {
        /// Circle center.
        center: Vec2,
        /// Circle radius.
        radius: f32,
        /// Outline thickness.
        thickness: f32,
        /// Outline color with the global alpha applied.
        color: Color,
    },
    /// Straight segment.
    Line {
        /// Segment start.
        from: Vec2,
        /// Segment end.
        to: Vec2,
        /// Segment thickness.
        thickness: f32,
        /// Segment color with the global alpha applied.
        color: Color,
    },
    /// Solid triangle.
    Triangle {
        /// Triangle corners.
        corners: [Vec2; 3],
        /// Fill color with the global alpha applied.
        color: Color,
    },
    /// Text centered on a point.
    Text {
        /// Text content.
        text: String,
        /// Center of the text box.
        center: Vec2,
        /// Font size in pixels.
        font_size: f32,
        /// Text color with the global alpha applied.
        color: Color,
    },
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Style {
    offset: Vec2,
    scale: f32,
    fill: Color,
    stroke: Color,
    line_width: f32,
    alpha: f32,
}

impl Default for Style {
    fn default() -> Self {
        let black = Color::new(0.0, 0.0, 0.0, 1.0);
        Self {
            offset: Vec2::ZERO,
            scale: 1.0,
            fill: black,
            stroke: black,
            line_width: 1.0,
            alpha: 1.0,
        }
    }
}

impl Style {
    fn project(&self, point: Vec2) -> Vec2 {
        self.offset + point * self.scale
    }

    fn faded(&self, color: Color) -> Color {
        color.with_alpha(color.alpha * self.alpha)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
struct SubPath {
    points: Vec<Vec2>,
    closed: bool,
}

/// Shapes of the current path, already projected to screen space.
#[derive(Clone, Debug, Default, PartialEq)]
struct Path {
    circles: Vec<(Vec2, f32)>,
    polygons: Vec<SubPath>,
}

/// Drawing context that records macroquad primitives.
#[derive(Clone, Debug)]
pub struct MacroquadCanvas {
    size: Vec2,
    background: Color,
    style: Style,
    saved: Vec<Style>,
    path: Path,
    primitives: Vec<Primitive>,
}

impl MacroquadCanvas {
    /// Creates a canvas covering `size` pixels; cleared areas take `background`.
    #[must_use]
    pub fn new(size: Vec2, background: Color) -> Self {
        Self {
            size,
            background,
            style: Style::default(),
            saved: Vec::new(),
            path: Path::default(),
            primitives: Vec::new(),
        }
    }

    /// Primitives recorded since the last flush.
    #[must_use]
    pub fn primitives(&self) -> &[Primitive] {
        &self.primitives
    }

    /// Draws every recorded primitive with macroquad and empties the list.
    ///
    /// Must run inside the macroquad window loop.
    pub fn flush(&mut self) {
        for primitive in self.primitives.drain(..) {
            submit(primitive);
        }
    }

    fn push_sub_path(&mut self, start: Vec2) {
        self.path.polygons.push(SubPath {
            points: vec![start],
            closed: false,
        });
    }
}

impl DrawingContext for MacroquadCanvas {
    fn size(&self) -> Vec2 {
        self.size
    }

    fn clear_rect(&mut self, origin: Vec2, size: Vec2) {
        let origin = self.style.project(origin);
        self.primitives.push(Primitive::Rect {
            origin,
            size: size * self.style.scale,
            color: self.background,
        });
    }

    fn save(&mut self) {
        self.saved.push(self.style);
    }

    fn restore(&mut self) {
        if let Some(style) = self.saved.pop() {
            self.style = style;
        }
    }

    fn translate(&mut self, offset: Vec2) {
        self.style.offset += offset * self.style.scale;
    }

    fn scale(&mut self, factor: f32) {
        self.style.scale *= factor;
    }

    fn set_fill_color(&mut self, color: Color) {
        self.style.fill = color;
    }

    fn set_stroke_color(&mut self, color: Color) {
        self.style.stroke = color;
    }

    fn set_line_width(&mut self, width: f32) {
        self.style.line_width = width;
    }

    fn set_global_alpha(&mut self, alpha: f32) {
        self.style.alpha = alpha.clamp(0.0, 1.0);
    }

    fn fill_rect(&mut self, origin: Vec2, size: Vec2) {
        self.primitives.push(Primitive::Rect {
            origin: self.style.project(origin),
            size: size * self.style.scale,
            color: self.style.faded(self.style.fill),
        });
    }

    fn stroke_rect(&mut self, origin: Vec2, size: Vec2) {
        self.primitives.push(Primitive::RectLines {
            origin: self.style.project(origin),
            size: size * self.style.scale,
            thickness: self.style.line_width * self.style.scale,
            color: self.style.faded(self.style.stroke),
        });
    }

    fn begin_path(&mut self) {
        self.path = Path::default();
    }

    fn move_to(&mut self, point: Vec2) {
        let point = self.style.project(point);
        self.push_sub_path(point);
    }

    fn line_to(&mut self, point: Vec2) {
        let point = self.style.project(point);
        match self.path.polygons.last_mut() {
            Some(current) if !current.closed => current.points.push(point),
            _ => self.push_sub_path(point),
        }
    }

    fn arc(&mut self, center: Vec2, radius: f32) {
        self.path
            .circles
            .push((self.style.project(center), radius * self.style.scale));
    }

    fn close_path(&mut self) {
        if let Some(current) = self.path.polygons.last_mut() {
            current.closed = true;
        }
    }

    fn fill(&mut self) {
        let color = self.style.faded(self.style.fill);
        for &(center, radius) in &self.path.circles {
            self.primitives.push(Primitive::Circle {
                center,
                radius,
                color,
            });
        }
        for polygon in &self.path.polygons {
            let Some((&anchor, rest)) = polygon.points.split_first() else {
                continue;
            };
            // Fan triangulation; the shapes drawn here are convex.
            for pair in rest.windows(2) {
                self.primitives.push(Primitive::Triangle {
                    corners: [anchor, pair[0], pair[1]],
                    color,
                });
            }
        }
    }

    fn stroke(&mut self) {
        let color = self.style.faded(self.style.stroke);
        let thickness = self.style.line_width * self.style.scale;
        for &(center, radius) in &self.path.circles {
            self.primitives.push(Primitive::CircleLines {
                center,
                radius,
                thickness,
                color,
            });
        }
        for polygon in &self.path.polygons {
            for pair in polygon.points.windows(2) {
                self.primitives.push(Primitive::Line {
                    from: pair[0],
                    to: pair[1],
                    thickness,
                    color,
                });
            }
            if let (true, Some(first), Some(last)) =
                (polygon.closed, polygon.points.first(), polygon.points.last())
            {
                if polygon.points.len() > 2 {
                    self.primitives.push(Primitive::Line {
                        from: *last,
                        to: *first,
                        thickness,
                        color,
                    });
                }
            }
        }
    }

    fn fill_text(&mut self, text: &str, center: Vec2, font_size: f32) {
        self.primitives.push(Primitive::Text {
            text: text.to_owned(),
            center: self.style.project(center),
            font_size: font_size * self.style.scale,
            color: self.style.faded(self.style.fill),
        });
    }
}

impl Surface for MacroquadCanvas {
    fn context(&mut self) -> Option<&mut dyn DrawingContext> {
        Some(self)
    }
}

fn submit(primitive: Primitive) {
    use macroquad::shapes::{
        draw_circle, draw_circle_lines, draw_line, draw_rectangle, draw_rectangle_lines,
        draw_triangle,
    };

    match primitive {
        Primitive::Rect {
            origin,
            size,
            color,
        } => draw_rectangle(origin.x, origin.y, size.x, size.y, to_macroquad_color(color)),
        Primitive::RectLines {
            origin,
            size,
            thickness,
            color,
        } => draw_rectangle_lines(
            origin.x,
            origin.y,
            size.x,
            size.y,
            thickness,
            to_macroquad_color(color),
        ),
        Primitive::Circle {
            center,
            radius,
            color,
        } => draw_circle(center.x, center.y, radius, to_macroquad_color(color)),
        Primitive::CircleLines {
            center,
            radius,
            thickness,
            color,
        } => draw_circle_lines(
            center.x,
            center.y,
            radius,
            thickness,
            to_macroquad_color(color),
        ),
        Primitive::Line {
            from,
            to,
            thickness,
            color,
        } => draw_line(from.x, from.y, to.x, to.y, thickness, to_macroquad_color(color)),
        Primitive::Triangle { corners, color } => {
            let [a, b, c] = corners.map(|corner| MacroquadVec2::new(corner.x, corner.y));
            draw_triangle(a, b, c, to_macroquad_color(color));
        }
        Primitive::Text {
            text,
            center,
            font_size,
            color,
        } => {
            let font_size = font_size.max(1.0);
            let bounds = macroquad::text::measure_text(&text, None, font_size as u16, 1.0);
            let _ = macroquad::text::draw_text(
                &text,
                center.x - bounds.width / 2.0,
                center.y + bounds.height / 2.0,
                font_size,
                to_macroquad_color(color),
            );
        }
    }
}

pub(crate) fn to_macroquad_color(color: Color) -> macroquad::color::Color {
    macroquad::color::Color::new(color.red, color.green, color.blue, color.alpha)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canvas() -> MacroquadCanvas {
        MacroquadCanvas::new(Vec2::new(100.0, 100.0), Color::from_rgb_u8(0, 0, 0))
    }

    #[test]
    fn transforms_compose_and_restore() {
        let mut canvas = canvas();
        canvas.save();
        canvas.translate(Vec2::new(10.0, 20.0));
        canvas.scale(2.0);
        canvas.translate(Vec2::new(1.0, 1.0));
        canvas.fill_rect(Vec2::new(5.0, 5.0), Vec2::splat(3.0));
        canvas.restore();
        canvas.fill_rect(Vec2::new(5.0, 5.0), Vec2::splat(3.0));

        let origins: Vec<(Vec2, Vec2)> = canvas
            .primitives()
            .iter()
            .filter_map(|primitive| match primitive {
                Primitive::Rect { origin, size, .. } => Some((*origin, *size)),
                _ => None,
            })
            .collect();
        assert_eq!(
            origins,
            vec![
                (Vec2::new(22.0, 32.0), Vec2::splat(6.0)),
                (Vec2::new(5.0, 5.0), Vec2::splat(3.0)),
            ]
        );
    }

    #[test]
    fn unbalanced_restore_keeps_the_current_style() {
        let mut canvas = canvas();
        canvas.scale(3.0);
        canvas.restore();
        canvas.arc(Vec2::ZERO, 2.0);
        canvas.fill();

        assert!(matches!(
            canvas.primitives(),
            [Primitive::Circle { radius, .. }] if (*radius - 6.0).abs() < f32::EPSILON
        ));
    }

    #[test]
    fn global_alpha_fades_fills() {
        let mut canvas = canvas();
        canvas.set_fill_color(Color::new(1.0, 0.0, 0.0, 0.5));
        canvas.set_global_alpha(0.5);
        canvas.fill_rect(Vec2::ZERO, Vec2::ONE);

        assert!(matches!(
            canvas.primitives(),
            [Primitive::Rect { color, .. }] if (color.alpha - 0.25).abs() < f32::EPSILON
        ));
    }

    #[test]
    fn closed_polygons_fill_as_triangles_and_stroke_their_outline() {
        let mut canvas = canvas();
        canvas.begin_path();
        canvas.move_to(Vec2::new(0.0, 0.0));
        canvas.line_to(Vec2::new(4.0, 0.0));
        canvas.line_to(Vec2::new(0.0, 4.0));
        canvas.close_path();
        canvas.fill();
        canvas.stroke();

        let triangles = canvas
            .primitives()
            .iter()
            .filter(|primitive| matches!(primitive, Primitive::Triangle { .. }))
            .count();
        let lines = canvas
            .primitives()
            .iter()
            .filter(|primitive| matches!(primitive, Primitive::Line { .. }))
            .count();
        assert_eq!(triangles, 1);
        assert_eq!(lines, 3);
    }

    #[test]
    fn begin_path_discards_previous_shapes() {
        let mut canvas = canvas();
        canvas.arc(Vec2::ZERO, 1.0);
        canvas.begin_path();
        canvas.move_to(Vec2::ZERO);
        canvas.line_to(Vec2::ONE);
        canvas.stroke();

        assert!(matches!(canvas.primitives(), [Primitive::Line { .. }]));
    }
}
