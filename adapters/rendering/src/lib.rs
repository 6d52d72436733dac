#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Shared rendering contracts for patrol viewer adapters.
//!
//! [`render`] paints a [`ViewState`] onto any [`Surface`] whose drawing
//! context offers canvas-style primitives. Backends implement
//! [`DrawingContext`] on top of their graphics API and [`RenderingBackend`]
//! to drive the frame loop.

mod palette;
mod raster;
mod view;

use anyhow::Result as AnyResult;
use glam::Vec2;
use patrol_view_core::ViewportTransform;
use std::{error::Error, fmt, time::Duration};

pub use palette::{
    agent_color, threat_color, AGENT_PALETTE, CHARGING_RING, GRID_LINE, NO_THREAT, OBSTACLE,
    PATROL_RANGE, RECENCY_TINT, STATION, VISITED_OVERLAY,
};
pub use raster::{cell_center, render, render_to, CELL_SIZE};
pub use view::{TrackedPath, ViewState};

/// RGBA color used when presenting frames.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Color {
    /// Red channel intensity in the range 0.0..=1.0.
    pub red: f32,
    /// Green channel intensity in the range 0.0..=1.0.
    pub green: f32,
    /// Blue channel intensity in the range 0.0..=1.0.
    pub blue: f32,
    /// Alpha channel intensity in the range 0.0..=1.0.
    pub alpha: f32,
}

impl Color {
    /// Creates a new color from floating point channels.
    #[must_use]
    pub const fn new(red: f32, green: f32, blue: f32, alpha: f32) -> Self {
        Self {
            red,
            green,
            blue,
            alpha,
        }
    }

    /// Creates an opaque color from byte RGB values.
    #[must_use]
    pub const fn from_rgb_u8(red: u8, green: u8, blue: u8) -> Self {
        Self {
            red: red as f32 / 255.0,
            green: green as f32 / 255.0,
            blue: blue as f32 / 255.0,
            alpha: 1.0,
        }
    }

    /// Returns the same color with the provided alpha.
    #[must_use]
    pub const fn with_alpha(self, alpha: f32) -> Self {
        Self { alpha, ..self }
    }

    /// Channels rounded to bytes, in `[red, green, blue]` order.
    #[must_use]
    pub fn rgb_u8(self) -> [u8; 3] {
        [self.red, self.green, self.blue].map(|channel| (channel.clamp(0.0, 1.0) * 255.0).round() as u8)
    }
}

/// Canvas-style 2D drawing context.
///
/// Path operations build a single current path that [`fill`](Self::fill) and
/// [`stroke`](Self::stroke) consume with the current style. Transform calls
/// compose with the current transform until [`restore`](Self::restore).
pub trait DrawingContext {
    /// Size of the drawable area in pixels.
    fn size(&self) -> Vec2;
    /// Clears a rectangle to transparent.
    fn clear_rect(&mut self, origin: Vec2, size: Vec2);
    /// Pushes the current transform and style.
    fn save(&mut self);
    /// Pops the transform and style pushed by the matching [`save`](Self::save).
    fn restore(&mut self);
    /// Translates subsequent drawing.
    fn translate(&mut self, offset: Vec2);
    /// Uniformly scales subsequent drawing.
    fn scale(&mut self, factor: f32);
    /// Sets the color used by fills.
    fn set_fill_color(&mut self, color: Color);
    /// Sets the color used by strokes.
    fn set_stroke_color(&mut self, color: Color);
    /// Sets the stroke width in local units.
    fn set_line_width(&mut self, width: f32);
    /// Sets the opacity multiplied into every subsequent fill and stroke.
    fn set_global_alpha(&mut self, alpha: f32);
    /// Fills an axis-aligned rectangle.
    fn fill_rect(&mut self, origin: Vec2, size: Vec2);
    /// Outlines an axis-aligned rectangle.
    fn stroke_rect(&mut self, origin: Vec2, size: Vec2);
    /// Starts a new path.
    fn begin_path(&mut self);
    /// Starts a new sub-path at `point`.
    fn move_to(&mut self, point: Vec2);
    /// Adds a straight segment to `point`.
    fn line_to(&mut self, point: Vec2);
    /// Adds a full circle around `center`.
    fn arc(&mut self, center: Vec2, radius: f32);
    /// Closes the current sub-path.
    fn close_path(&mut self);
    /// Fills the current path.
    fn fill(&mut self);
    /// Strokes the current path.
    fn stroke(&mut self);
    /// Draws `text` centered on `center` with the fill color.
    fn fill_text(&mut self, text: &str, center: Vec2, font_size: f32);

    /// Dash pattern support, when the context has it.
    fn line_dash(&mut self) -> Option<&mut dyn LineDash> {
        None
    }
}

/// Optional dash pattern capability of a [`DrawingContext`].
pub trait LineDash {
    /// Sets alternating dash and gap lengths; an empty slice draws solid lines.
    fn set_line_dash(&mut self, segments: &[f32]);
}

/// Drawable target that may or may not yield a context.
pub trait Surface {
    /// Acquires the drawing context, if available.
    fn context(&mut self) -> Option<&mut dyn DrawingContext>;
}

/// Input snapshot gathered by adapters before drawing a frame.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct FrameInput {
    /// Pointer movement while dragging, in surface pixels.
    pub pan: Vec2,
    /// Zoom steps requested this frame; positive zooms in.
    pub zoom_steps: f32,
    /// Pointer position used as the zoom anchor, in surface pixels.
    pub cursor: Vec2,
    /// Whether the adapter detected a request to restore the initial view.
    pub reset_view: bool,
}

/// Smallest scale reachable through [`apply_input`].
pub const MIN_SCALE: f32 = 0.1;

/// Largest scale reachable through [`apply_input`].
pub const MAX_SCALE: f32 = 10.0;

/// Scale multiplier applied per zoom step.
const ZOOM_STEP: f32 = 1.1;

/// Applies pan and zoom input to a viewport, keeping the cursor anchored while zooming.
#[must_use]
pub fn apply_input(
    transform: ViewportTransform,
    initial: ViewportTransform,
    input: &FrameInput,
) -> ViewportTransform {
    if input.reset_view {
        return initial;
    }

    let mut offset = Vec2::new(transform.offset_x, transform.offset_y) + input.pan;
    let mut scale = transform.scale;
    if input.zoom_steps != 0.0 && scale > 0.0 {
        let zoomed = (scale * ZOOM_STEP.powf(input.zoom_steps)).clamp(MIN_SCALE, MAX_SCALE);
        offset = input.cursor - (input.cursor - offset) * (zoomed / scale);
        scale = zoomed;
    }

    ViewportTransform::new(offset.x, offset.y, scale)
}

/// Presentation descriptor consumed by rendering backends.
#[derive(Clone, Debug, PartialEq)]
pub struct Presentation {
    /// Title used by the created window.
    pub window_title: String,
    /// Solid color used to clear each frame.
    pub clear_color: Color,
    /// Viewport applied to the first frame and restored on reset.
    pub initial_transform: ViewportTransform,
}

impl Presentation {
    /// Constructs a new presentation descriptor.
    ///
    /// Returns an error when the viewport scale is not a positive finite number.
    pub fn new<T>(
        window_title: T,
        clear_color: Color,
        initial_transform: ViewportTransform,
    ) -> std::result::Result<Self, RenderingError>
    where
        T: Into<String>,
    {
        let scale = initial_transform.scale;
        if !scale.is_finite() || scale <= 0.0 {
            return Err(RenderingError::InvalidScale { scale });
        }

        Ok(Self {
            window_title: window_title.into(),
            clear_color,
            initial_transform,
        })
    }
}

/// Rendering backend capable of presenting patrol views.
pub trait RenderingBackend {
    /// Runs the rendering backend until it is requested to exit.
    ///
    /// The provided `update_view` closure receives the frame delta and may
    /// mutate the view state before it is rendered.
    fn run<F>(self, presentation: Presentation, update_view: F) -> AnyResult<()>
    where
        F: FnMut(Duration, &mut ViewState) + 'static;
}

/// Errors that can occur when constructing rendering descriptors.
#[derive(Debug, PartialEq)]
pub enum RenderingError {
    /// The viewport scale must be positive to keep the view visible.
    InvalidScale {
        /// Provided scale that failed validation.
        scale: f32,
    },
}

impl fmt::Display for RenderingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidScale { scale } => {
                write!(f, "viewport scale must be positive (received {scale})")
            }
        }
    }
}

impl Error for RenderingError {}
