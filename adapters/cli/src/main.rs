#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that watches live patrol sessions and replays recordings.

mod config;
mod inspect;
mod replay;
mod view;

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use patrol_view_connection::ConnectionManager;
use patrol_view_core::{message_kinds, ConnectionState, EpisodeBatch};
use patrol_view_rendering::RenderingBackend;
use patrol_view_rendering_macroquad::MacroquadBackend;
use patrol_view_system_frame_derivation::{FrameDerivationEngine, FrameSource, LiveFeed};
use tokio::runtime::Runtime;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use self::{
    config::{Settings, ViewerConfig, DEFAULT_CONFIG_PATH},
    replay::ReplayPlayer,
    view::build_view,
};

/// Command-line arguments of the patrol viewer.
#[derive(Parser, Debug)]
#[command(name = "patrol-view", about = "Live view of patrolling agents", long_about = None)]
struct Cli {
    /// Settings file; missing files fall back to built-in defaults.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log filter such as `debug` or `patrol_view_connection=trace`; defaults to `RUST_LOG`.
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stream a live training session into a window.
    Watch {
        /// Session to subscribe to.
        #[arg(long)]
        session: String,

        /// Overrides `connection.ws_base_url`.
        #[arg(long)]
        ws_url: Option<String>,

        /// Overrides `connection.api_base_url`.
        #[arg(long)]
        api_url: Option<String>,
    },
    /// Play a recorded batch of episodes in a window.
    Replay {
        /// JSON file holding the episodes.
        file: PathBuf,

        /// Playback speed; zero shows the whole batch at once.
        #[arg(long, default_value_t = 10.0)]
        fps: f32,

        /// Start over when the last frame has been shown.
        #[arg(long = "loop")]
        looping: bool,
    },
    /// Print route statistics of a recorded batch without opening a window.
    Inspect {
        /// JSON file holding the episodes.
        file: PathBuf,

        /// Overrides `viewer.preview_limit`.
        #[arg(long)]
        preview_limit: Option<usize>,
    },
}

/// Entry point for the patrol viewer command-line interface.
fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    let settings = Settings::load(&cli.config)?;
    match cli.command {
        Command::Watch {
            session,
            ws_url,
            api_url,
        } => {
            let mut settings = settings;
            if let Some(ws_url) = ws_url {
                settings.connection.ws_base_url = ws_url;
            }
            if let Some(api_url) = api_url {
                settings.connection.api_base_url = api_url;
            }
            watch(settings, session)
        }
        Command::Replay { file, fps, looping } => {
            let batch = load_batch(&file)?;
            replay(settings, batch, fps, looping)
        }
        Command::Inspect {
            file,
            preview_limit,
        } => {
            let batch = load_batch(&file)?;
            let limit = preview_limit.unwrap_or(settings.viewer.preview_limit);
            print!("{}", inspect::inspect(&batch, settings.environment, limit));
            Ok(())
        }
    }
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

fn load_batch(path: &Path) -> Result<EpisodeBatch> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read recording {}", path.display()))?;
    let batch = EpisodeBatch::from_json(&contents)
        .with_context(|| format!("failed to decode recording {}", path.display()))?;
    info!(
        path = %path.display(),
        episodes = batch.episodes().len(),
        frames = batch.frame_count(),
        "loaded recording"
    );
    Ok(batch)
}

/// Live connection plus the runtime driving it.
///
/// Fields drop in order, so the manager disconnects before the runtime stops.
struct LiveSession {
    manager: ConnectionManager,
    feed: Arc<Mutex<LiveFeed>>,
    reported: ConnectionState,
    _runtime: Runtime,
}

impl LiveSession {
    fn start(settings: &Settings, session: String) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .context("failed to start the async runtime")?;
        let manager = ConnectionManager::websocket(settings.connection.clone(), runtime.handle().clone())
            .context("failed to create the connection manager")?;
        let feed = Arc::new(Mutex::new(
            LiveFeed::new().with_retention(settings.viewer.max_live_frames),
        ));

        let frames = Arc::clone(&feed);
        manager.on(message_kinds::ENVIRONMENT_UPDATE, move |message| {
            match message.to_frame() {
                Ok(frame) => frames
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(frame),
                Err(error) => warn!(%error, "dropping undecodable environment update"),
            }
        });
        manager.on(message_kinds::CONNECTION_ACK, |_| info!("session acknowledged"));
        manager.on(message_kinds::TRAINING_STATUS, |message| {
            info!(payload = %message.to_value(), "training status");
        });
        manager.on(message_kinds::TRAINING_PROGRESS, |message| {
            debug!(payload = %message.to_value(), "training progress");
        });
        manager.on(message_kinds::TRAINING_ERROR, |message| {
            error!(payload = %message.to_value(), "training error");
        });
        manager.on(message_kinds::METRICS, |message| {
            debug!(payload = %message.to_value(), "metrics");
        });

        info!(session = %session, "connecting");
        manager.connect(session);

        Ok(Self {
            reported: manager.state(),
            manager,
            feed,
            _runtime: runtime,
        })
    }

    fn report_state(&mut self) {
        let state = self.manager.state();
        if state == self.reported {
            return;
        }
        self.reported = state;
        match self.manager.last_error() {
            Some(last_error) => warn!(
                %state,
                attempts = self.manager.reconnect_attempts(),
                %last_error,
                "connection state changed"
            ),
            None => info!(%state, "connection state changed"),
        }
    }
}

fn backend(viewer: &ViewerConfig) -> MacroquadBackend {
    let backend = MacroquadBackend::new().with_show_fps(viewer.show_fps);
    match viewer.vsync {
        Some(enabled) => backend.with_vsync(enabled),
        None => backend,
    }
}

fn watch(settings: Settings, session: String) -> Result<()> {
    let presentation = settings
        .viewer
        .presentation(&session)
        .context("invalid viewer settings")?;
    let mut live = LiveSession::start(&settings, session)?;
    let mut engine = FrameDerivationEngine::new(settings.environment)
        .with_preview_limit(settings.viewer.preview_limit);

    backend(&settings.viewer).run(presentation, move |_, view| {
        live.report_state();
        let feed = live.feed.lock().unwrap_or_else(PoisonError::into_inner);
        if engine.observe(FrameSource::Live(&feed)) {
            *view = build_view(&engine);
        }
    })
}

fn replay(settings: Settings, batch: EpisodeBatch, fps: f32, looping: bool) -> Result<()> {
    let presentation = settings
        .viewer
        .presentation("replay")
        .context("invalid viewer settings")?;
    let mut player = ReplayPlayer::new(&batch, fps, looping);
    let mut engine = FrameDerivationEngine::new(settings.environment)
        .with_preview_limit(settings.viewer.preview_limit);
    let mut announced = false;

    backend(&settings.viewer).run(presentation, move |delta, view| {
        player.advance(delta);
        if engine.observe(FrameSource::Live(player.feed())) {
            *view = build_view(&engine);
        }
        if player.is_finished() && !announced {
            announced = true;
            let stats = engine.route_stats();
            info!(
                steps = stats.step_count,
                path_length = stats.path_length,
                visited = stats.visited_tiles,
                "replay reached the last frame"
            );
        }
    })
}
