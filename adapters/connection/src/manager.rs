use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use patrol_view_core::{
    message_kinds, ConnectionState, WireMessage, ABNORMAL_CLOSURE, NORMAL_CLOSURE,
};
use serde::Serialize;
use serde_json::json;
use tokio::{
    runtime::Handle,
    sync::mpsc::UnboundedSender,
    task::JoinHandle,
    time::{interval_at, sleep, timeout, Instant, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use crate::{
    ConnectionConfig, ConnectionError, HttpSessionStatusSource, LinkEvent, Outbound,
    SessionStatusSource, Transport, WebSocketTransport,
};

/// Error reported once every reconnect attempt has failed.
pub const MAX_ATTEMPTS_REACHED: &str = "Maximum reconnection attempts reached";

/// Callback invoked for every message of one type.
pub type MessageHandler = Arc<dyn Fn(&WireMessage) + Send + Sync>;

/// Owns the live subscription of one monitored session.
///
/// Inbound messages are dispatched to at most one handler per message type,
/// in arrival order. Reconnect and fallback timers run on the provided tokio
/// runtime and are cancelled by [`ConnectionManager::disconnect`], which also
/// runs when the manager is dropped.
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    config: ConnectionConfig,
    transport: Arc<dyn Transport>,
    status: Arc<dyn SessionStatusSource>,
    runtime: Handle,
    shared: Mutex<Shared>,
}

#[derive(Default)]
struct Shared {
    state: ConnectionState,
    session_id: Option<String>,
    reconnect_attempts: u32,
    last_error: Option<String>,
    handlers: HashMap<String, MessageHandler>,
    outgoing: Option<UnboundedSender<Outbound>>,
    link_task: Option<JoinHandle<()>>,
    reconnect_timer: Option<JoinHandle<()>>,
    fallback_timer: Option<JoinHandle<()>>,
    // Bumped whenever a link is opened or the manager disconnects; tasks
    // carrying an older value no longer drive the state machine.
    generation: u64,
}

impl ConnectionManager {
    /// Creates a manager whose tasks run on `runtime`.
    #[must_use]
    pub fn new(
        config: ConnectionConfig,
        transport: Arc<dyn Transport>,
        status: Arc<dyn SessionStatusSource>,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                status,
                runtime,
                shared: Mutex::new(Shared::default()),
            }),
        }
    }

    /// Creates a manager on the runtime of the calling task.
    pub fn with_current_runtime(
        config: ConnectionConfig,
        transport: Arc<dyn Transport>,
        status: Arc<dyn SessionStatusSource>,
    ) -> Result<Self, ConnectionError> {
        let runtime = Handle::try_current()?;
        Ok(Self::new(config, transport, status, runtime))
    }

    /// Creates a manager speaking websocket and HTTP to the configured service.
    pub fn websocket(config: ConnectionConfig, runtime: Handle) -> Result<Self, ConnectionError> {
        let status = HttpSessionStatusSource::new(
            config.api_base_url.clone(),
            config.fallback_poll_interval(),
        )?;
        Ok(Self::new(
            config,
            Arc::new(WebSocketTransport),
            Arc::new(status),
            runtime,
        ))
    }

    /// Opens the subscription of `session_id`.
    ///
    /// Does nothing while a connection is open. Fallback polling is only left
    /// through [`Self::disconnect`], so a connect request is ignored there too.
    pub fn connect(&self, session_id: impl Into<String>) {
        let session_id = session_id.into();
        let mut shared = self.inner.lock();
        match shared.state {
            ConnectionState::Open => {
                warn!(session = %session_id, "connection already open, ignoring connect");
                return;
            }
            ConnectionState::FallbackPolling => {
                warn!(session = %session_id, "fallback polling active, disconnect before reconnecting");
                return;
            }
            ConnectionState::Idle
            | ConnectionState::Connecting
            | ConnectionState::Reconnecting => {}
        }
        shared.session_id = Some(session_id);
        self.inner.open_link(&mut shared);
    }

    /// Closes the subscription and cancels every pending timer.
    pub fn disconnect(&self) {
        let mut shared = self.inner.lock();
        shared.generation += 1;
        if let Some(outgoing) = shared.outgoing.take() {
            let _ = outgoing.send(Outbound::Close {
                code: NORMAL_CLOSURE,
            });
        }
        for task in [
            shared.link_task.take(),
            shared.reconnect_timer.take(),
            shared.fallback_timer.take(),
        ]
        .into_iter()
        .flatten()
        {
            task.abort();
        }
        shared.reconnect_attempts = 0;
        shared.last_error = None;
        if shared.state != ConnectionState::Idle {
            info!(from = %shared.state, "connection closed");
        }
        shared.state = ConnectionState::Idle;
    }

    /// Registers `handler` for messages of type `kind`, replacing any previous one.
    pub fn on<F>(&self, kind: impl Into<String>, handler: F)
    where
        F: Fn(&WireMessage) + Send + Sync + 'static,
    {
        let kind = kind.into();
        let replaced = self
            .inner
            .lock()
            .handlers
            .insert(kind.clone(), Arc::new(handler))
            .is_some();
        if replaced {
            debug!(%kind, "replaced message handler");
        }
    }

    /// Removes the handler registered for `kind`.
    pub fn off(&self, kind: &str) {
        let _ = self.inner.lock().handlers.remove(kind);
    }

    /// Serializes `payload` and sends it while the connection is open.
    ///
    /// In any other state the payload is dropped and a warning is logged.
    pub fn send<T: Serialize + ?Sized>(&self, payload: &T) {
        let shared = self.inner.lock();
        let outgoing = match (&shared.outgoing, shared.state) {
            (Some(outgoing), ConnectionState::Open) => outgoing,
            _ => {
                warn!(state = %shared.state, "connection not open, dropping outbound message");
                return;
            }
        };
        match serde_json::to_string(payload) {
            Ok(text) => {
                if outgoing.send(Outbound::Text(text)).is_err() {
                    warn!("link closed before the message could be queued");
                }
            }
            Err(error) => warn!(%error, "failed to encode outbound message"),
        }
    }

    /// Sends a keep-alive ping.
    pub fn send_ping(&self) {
        self.send(&WireMessage::ping());
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    /// Human-readable description of the last failure.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.inner.lock().last_error.clone()
    }

    /// Abnormal closes since the last successful open.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.lock().reconnect_attempts
    }

    /// Session requested by the last [`Self::connect`].
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.inner.lock().session_id.clone()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open_link(self: &Arc<Self>, shared: &mut Shared) {
        let Some(session_id) = shared.session_id.as_deref() else {
            return;
        };
        let url = self.config.endpoint(session_id);

        shared.generation += 1;
        let generation = shared.generation;
        if let Some(task) = shared.link_task.take() {
            task.abort();
        }
        if let Some(timer) = shared.reconnect_timer.take() {
            timer.abort();
        }
        shared.outgoing = None;
        shared.state = ConnectionState::Connecting;
        info!(%url, attempt = shared.reconnect_attempts, "connecting");

        let inner = Arc::clone(self);
        shared.link_task = Some(
            self.runtime
                .spawn(async move { inner.run_link(generation, url).await }),
        );
    }

    async fn run_link(self: Arc<Self>, generation: u64, url: String) {
        let limit = self.config.connect_timeout();
        let link = match timeout(limit, self.transport.open(&url)).await {
            Ok(Ok(link)) => link,
            Ok(Err(error)) => {
                warn!(%url, %error, "failed to open connection");
                self.handle_close(generation, ABNORMAL_CLOSURE, Some(error.to_string()));
                return;
            }
            Err(_) => {
                let message = format!("handshake timed out after {}ms", limit.as_millis());
                warn!(%url, "{message}");
                self.handle_close(generation, ABNORMAL_CLOSURE, Some(message));
                return;
            }
        };

        let mut incoming = {
            let mut shared = self.lock();
            if shared.generation != generation {
                return;
            }
            shared.state = ConnectionState::Open;
            shared.reconnect_attempts = 0;
            shared.last_error = None;
            shared.outgoing = Some(link.outgoing);
            link.incoming
        };
        info!(%url, "connection open");

        while let Some(event) = incoming.recv().await {
            match event {
                LinkEvent::Text(text) => self.dispatch(&text),
                LinkEvent::Error(message) => {
                    warn!(%url, error = %message, "connection error");
                    let mut shared = self.lock();
                    if shared.generation == generation {
                        shared.last_error = Some(message);
                    }
                }
                LinkEvent::Closed { code } => {
                    self.handle_close(generation, code, None);
                    return;
                }
            }
        }
        self.handle_close(generation, ABNORMAL_CLOSURE, None);
    }

    fn dispatch(&self, text: &str) {
        let message: WireMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(error) => {
                let snippet: String = text.chars().take(160).collect();
                warn!(%error, %snippet, "dropping malformed message");
                return;
            }
        };

        let handler = self.lock().handlers.get(&message.kind).cloned();
        match handler {
            Some(handler) => handler(&message),
            None => debug!(kind = %message.kind, "no handler registered"),
        }
    }

    fn handle_close(self: &Arc<Self>, generation: u64, code: u16, error: Option<String>) {
        let mut shared = self.lock();
        if shared.generation != generation {
            return;
        }
        // The calling task is the link task itself, so it is detached rather than aborted.
        drop(shared.link_task.take());
        shared.outgoing = None;
        if let Some(error) = error {
            shared.last_error = Some(error);
        }

        if code == NORMAL_CLOSURE {
            info!(code, "connection closed normally");
            shared.state = ConnectionState::Idle;
            return;
        }

        shared.reconnect_attempts += 1;
        let attempt = shared.reconnect_attempts;
        if attempt >= self.config.max_reconnect_attempts {
            error!(code, attempt, "reconnect attempts exhausted, switching to fallback polling");
            shared.last_error = Some(MAX_ATTEMPTS_REACHED.to_owned());
            self.start_fallback(&mut shared);
            return;
        }

        let delay = self.config.reconnect_delay(attempt);
        warn!(
            code,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "connection lost, scheduling reconnect"
        );
        shared.state = ConnectionState::Reconnecting;

        let inner = Arc::clone(self);
        shared.reconnect_timer = Some(self.runtime.spawn(async move {
            sleep(delay).await;
            let mut shared = inner.lock();
            if shared.generation != generation {
                return;
            }
            drop(shared.reconnect_timer.take());
            inner.open_link(&mut shared);
        }));
    }

    fn start_fallback(self: &Arc<Self>, shared: &mut Shared) {
        shared.state = ConnectionState::FallbackPolling;
        if shared.fallback_timer.is_some() {
            debug!("fallback polling already running");
            return;
        }
        let Some(session_id) = shared.session_id.clone() else {
            return;
        };

        let period = self.config.fallback_poll_interval();
        info!(session = %session_id, period_ms = period.as_millis() as u64, "starting fallback polling");
        let inner = Arc::clone(self);
        shared.fallback_timer = Some(self.runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                let _ = ticker.tick().await;
                if timeout(period, inner.poll_once(&session_id)).await.is_err() {
                    warn!(session = %session_id, period_ms = period.as_millis() as u64, "fallback poll timed out, skipping tick");
                }
            }
        }));
    }

    async fn poll_once(&self, session_id: &str) {
        let session = match self.status.find_by_id(session_id).await {
            Ok(session) => session,
            Err(error) => {
                warn!(session = %session_id, %error, "fallback status fetch failed");
                return;
            }
        };
        let metrics = match self
            .status
            .get_metrics(session_id, self.config.metrics_limit)
            .await
        {
            Ok(metrics) => metrics,
            Err(error) => {
                warn!(session = %session_id, %error, "fallback metrics fetch failed");
                return;
            }
        };

        let handler = self.lock().handlers.get(message_kinds::METRICS).cloned();
        if let Some(handler) = handler {
            handler(&WireMessage::metrics(json!({
                "session": session,
                "metrics": metrics,
            })));
        }
    }
}
