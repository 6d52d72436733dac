use std::{fs, io, path::Path, path::PathBuf};

use patrol_view_connection::ConnectionConfig;
use patrol_view_core::{EnvironmentMetadata, ViewportTransform};
use patrol_view_rendering::{Color, Presentation, RenderingError};
use patrol_view_system_frame_derivation::DEFAULT_PREVIEW_LIMIT;
use serde::Deserialize;
use thiserror::Error;

/// File consulted when `--config` is not given.
pub(crate) const DEFAULT_CONFIG_PATH: &str = "patrol-view.toml";

/// Frames a live feed keeps before evicting the oldest.
const DEFAULT_MAX_LIVE_FRAMES: usize = 5000;

const CLEAR_COLOR: Color = Color::from_rgb_u8(250, 250, 250);

/// Settings read from `patrol-view.toml`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub(crate) struct Settings {
    pub(crate) connection: ConnectionConfig,
    pub(crate) viewer: ViewerConfig,
    pub(crate) environment: Option<EnvironmentMetadata>,
}

/// Window and derivation options of the viewer.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub(crate) struct ViewerConfig {
    pub(crate) window_title: String,
    pub(crate) preview_limit: usize,
    pub(crate) show_fps: bool,
    /// Requests a swap interval of 1 (`true`) or 0; unset keeps the platform default.
    pub(crate) vsync: Option<bool>,
    pub(crate) max_live_frames: usize,
    pub(crate) offset_x: f32,
    pub(crate) offset_y: f32,
    pub(crate) scale: f32,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            window_title: "Patrol View".to_owned(),
            preview_limit: DEFAULT_PREVIEW_LIMIT,
            show_fps: false,
            vsync: None,
            max_live_frames: DEFAULT_MAX_LIVE_FRAMES,
            offset_x: 0.0,
            offset_y: 0.0,
            scale: 1.0,
        }
    }
}

impl ViewerConfig {
    pub(crate) fn initial_transform(&self) -> ViewportTransform {
        ViewportTransform::new(self.offset_x, self.offset_y, self.scale)
    }

    /// Presentation of a window titled `{window_title} - {subtitle}`.
    pub(crate) fn presentation(&self, subtitle: &str) -> Result<Presentation, RenderingError> {
        Presentation::new(
            format!("{} - {subtitle}", self.window_title),
            CLEAR_COLOR,
            self.initial_transform(),
        )
    }
}

/// Errors raised while loading settings.
#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("failed to read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl Settings {
    /// Loads settings from `path`; a missing file yields the defaults.
    pub(crate) fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_owned(),
                    source,
                })
            }
        };
        Self::parse(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patrol_view_core::CellCoord;

    #[test]
    fn empty_file_yields_defaults() {
        let settings = Settings::parse("").expect("empty config parses");

        assert_eq!(settings, Settings::default());
        assert_eq!(settings.connection.max_reconnect_attempts, 5);
        assert_eq!(settings.viewer.preview_limit, 30);
        assert_eq!(settings.viewer.max_live_frames, 5000);
        assert_eq!(settings.viewer.vsync, None);
        assert!(settings.environment.is_none());
    }

    #[test]
    fn sections_override_individual_fields() {
        let settings = Settings::parse(
            r#"
            [connection]
            ws_base_url = "ws://sim.local:9000"
            fallback_poll_interval_ms = 500

            [viewer]
            scale = 0.5
            show_fps = true
            vsync = false
            max_live_frames = 200

            [environment]
            width = 4
            height = 3
            obstacles = [{ column = 1, row = 2 }]
            patrol_radius = 2.5
            "#,
        )
        .expect("valid config parses");

        assert_eq!(
            settings.connection.endpoint("abc"),
            "ws://sim.local:9000/ws/training/abc"
        );
        assert_eq!(settings.connection.fallback_poll_interval_ms, 500);
        assert_eq!(settings.connection.base_reconnect_delay_ms, 1000);
        assert_eq!(
            settings.viewer.initial_transform(),
            ViewportTransform::new(0.0, 0.0, 0.5)
        );
        assert!(settings.viewer.show_fps);
        assert_eq!(settings.viewer.vsync, Some(false));
        assert_eq!(settings.viewer.max_live_frames, 200);

        let environment = settings.environment.expect("environment section");
        assert_eq!(environment.total_tiles(), 12);
        assert_eq!(environment.obstacles, vec![CellCoord::new(1, 2)]);
        assert_eq!(environment.patrol_radius, Some(2.5));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let path = std::env::temp_dir().join("patrol-view-missing-config-does-not-exist.toml");

        let settings = Settings::load(&path).expect("missing file is not an error");

        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn malformed_file_reports_its_path() {
        let path = std::env::temp_dir().join(format!(
            "patrol-view-malformed-{}.toml",
            std::process::id()
        ));
        fs::write(&path, "[viewer]\nscale = \"large\"\n").expect("temp file is writable");

        let error = Settings::load(&path).expect_err("type mismatch is reported");
        let _ = fs::remove_file(&path);

        assert!(matches!(error, ConfigError::Parse { .. }));
        assert!(error.to_string().contains(&path.display().to_string()));
    }

    #[test]
    fn degenerate_scale_is_rejected_by_the_presentation() {
        let viewer = ViewerConfig {
            scale: 0.0,
            ..ViewerConfig::default()
        };

        assert!(viewer.presentation("replay").is_err());
        assert_eq!(
            ViewerConfig::default()
                .presentation("replay")
                .expect("default scale is valid")
                .window_title,
            "Patrol View - replay"
        );
    }
}
