#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Macroquad-backed rendering adapter for the patrol viewer.
//!
//! Macroquad's optional audio stack depends on native ALSA development
//! libraries, which are unavailable in the containerised CI environment.
//! To keep `cargo test` usable everywhere we depend on macroquad without its
//! default `audio` feature.
//!
//! The shared raster routine paints into a [`MacroquadCanvas`], which records
//! screen-space primitives and submits them at the end of each frame.

mod canvas;

pub use canvas::{MacroquadCanvas, Primitive};

use self::canvas::to_macroquad_color;
use anyhow::Result;
use glam::Vec2;
use macroquad::input::{
    is_key_pressed, is_mouse_button_down, mouse_position, mouse_wheel, KeyCode, MouseButton,
};
use patrol_view_rendering::{
    apply_input, render, FrameInput, Presentation, RenderingBackend, ViewState,
};
use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

/// Converts raw pointer observations into per-frame viewport input.
///
/// Dragging with the primary button pans by the pointer movement since the
/// previous frame. Wheel motion zooms one step per notch around the cursor.
#[doc(hidden)]
#[derive(Clone, Copy, Debug, Default)]
pub struct PointerTracker {
    drag_anchor: Option<Vec2>,
}

impl PointerTracker {
    /// Folds one frame of pointer observations into a [`FrameInput`].
    pub fn observe(
        &mut self,
        cursor: Vec2,
        dragging: bool,
        wheel: f32,
        reset_view: bool,
    ) -> FrameInput {
        let pan = match (dragging, self.drag_anchor) {
            (true, Some(anchor)) => cursor - anchor,
            _ => Vec2::ZERO,
        };
        self.drag_anchor = dragging.then_some(cursor);

        FrameInput {
            pan,
            zoom_steps: if wheel > 0.0 {
                1.0
            } else if wheel < 0.0 {
                -1.0
            } else {
                0.0
            },
            cursor,
            reset_view,
        }
    }
}

/// Rendering backend implemented on top of macroquad.
#[derive(Debug, Default)]
pub struct MacroquadBackend {
    swap_interval: Option<i32>,
    show_fps: bool,
}

impl MacroquadBackend {
    /// Returns a backend that requests the platform's default swap interval.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the backend to request a specific swap interval from the platform.
    #[must_use]
    pub fn with_swap_interval(mut self, swap_interval: Option<i32>) -> Self {
        self.swap_interval = swap_interval;
        self
    }

    /// Configures the backend to either synchronise presentation with the display refresh rate
    /// or render as fast as possible.
    #[must_use]
    pub fn with_vsync(self, enabled: bool) -> Self {
        let swap_interval = if enabled { Some(1) } else { Some(0) };
        self.with_swap_interval(swap_interval)
    }

    /// Configures whether the backend logs frame timing metrics once per second.
    #[must_use]
    pub fn with_show_fps(mut self, show: bool) -> Self {
        self.show_fps = show;
        self
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct FrameBreakdown {
    frame: Duration,
    update: Duration,
    render: Duration,
}

/// Tracks the average frames-per-second produced by the render loop.
#[derive(Debug, Default)]
struct FpsCounter {
    elapsed: Duration,
    frames: u32,
    frame_times: VecDeque<Duration>,
    window_duration: Duration,
    update_accum: Duration,
    render_accum: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct FpsMetrics {
    per_second: f32,
    trailing_ten_seconds: f32,
    avg_update: Duration,
    avg_render: Duration,
}

impl FpsCounter {
    /// Records a rendered frame and returns the per-second and trailing ten-second averages once
    /// one second has elapsed.
    fn record_frame(&mut self, breakdown: FrameBreakdown) -> Option<FpsMetrics> {
        self.elapsed += breakdown.frame;
        self.frames = self.frames.saturating_add(1);
        self.update_accum += breakdown.update;
        self.render_accum += breakdown.render;

        self.frame_times.push_back(breakdown.frame);
        self.window_duration += breakdown.frame;

        let trailing_window = Duration::from_secs(10);
        while self.window_duration > trailing_window {
            let Some(removed) = self.frame_times.pop_front() else {
                break;
            };
            self.window_duration = self.window_duration.saturating_sub(removed);
        }

        if self.elapsed < Duration::from_secs(1) {
            return None;
        }

        let seconds = self.elapsed.as_secs_f32();
        let frames = self.frames.max(1);
        let per_second = self.frames as f32 / seconds;
        let window_seconds = self.window_duration.as_secs_f32();
        let trailing_ten_seconds = if window_seconds <= f32::EPSILON {
            per_second
        } else {
            self.frame_times.len() as f32 / window_seconds
        };
        let metrics = FpsMetrics {
            per_second,
            trailing_ten_seconds,
            avg_update: self.update_accum / frames,
            avg_render: self.render_accum / frames,
        };

        self.elapsed = Duration::ZERO;
        self.frames = 0;
        self.update_accum = Duration::ZERO;
        self.render_accum = Duration::ZERO;
        Some(metrics)
    }
}

impl RenderingBackend for MacroquadBackend {
    fn run<F>(self, presentation: Presentation, mut update_view: F) -> Result<()>
    where
        F: FnMut(Duration, &mut ViewState) + 'static,
    {
        let Self {
            swap_interval,
            show_fps,
        } = self;

        let Presentation {
            window_title,
            clear_color,
            initial_transform,
        } = presentation;

        let mut config = macroquad::window::Conf {
            window_title,
            window_width: 960,
            window_height: 960,
            ..macroquad::window::Conf::default()
        };
        if let Some(swap_interval) = swap_interval {
            config.platform.swap_interval = Some(swap_interval);
        }

        macroquad::Window::from_config(config, async move {
            let background = to_macroquad_color(clear_color);
            let mut view = ViewState::default();
            let mut transform = initial_transform;
            let mut pointer = PointerTracker::default();
            let mut fps_counter = FpsCounter::default();

            loop {
                if is_key_pressed(KeyCode::Escape) {
                    break;
                }

                macroquad::window::clear_background(background);

                let dt_seconds = macroquad::time::get_frame_time();
                let frame_dt = Duration::from_secs_f32(dt_seconds.max(0.0));

                let (cursor_x, cursor_y) = mouse_position();
                let (_, wheel) = mouse_wheel();
                let input = pointer.observe(
                    Vec2::new(cursor_x, cursor_y),
                    is_mouse_button_down(MouseButton::Left),
                    wheel,
                    is_key_pressed(KeyCode::R),
                );
                transform = apply_input(transform, initial_transform, &input);

                let update_start = Instant::now();
                update_view(frame_dt, &mut view);
                let update_duration = update_start.elapsed();

                let render_start = Instant::now();
                let mut canvas = MacroquadCanvas::new(
                    Vec2::new(
                        macroquad::window::screen_width(),
                        macroquad::window::screen_height(),
                    ),
                    clear_color,
                );
                render(Some(&mut canvas), &view, transform);
                canvas.flush();
                let render_duration = render_start.elapsed();

                let fps_metrics = fps_counter.record_frame(FrameBreakdown {
                    frame: frame_dt,
                    update: update_duration,
                    render: render_duration,
                });
                if let (true, Some(metrics)) = (show_fps, fps_metrics) {
                    tracing::info!(
                        fps = metrics.per_second,
                        fps_10s = metrics.trailing_ten_seconds,
                        update_ms = metrics.avg_update.as_secs_f64() * 1_000.0,
                        render_ms = metrics.avg_render.as_secs_f64() * 1_000.0,
                        "frame timing"
                    );
                }

                macroquad::window::next_frame().await;
            }
        });

        Ok(())
    }
}
