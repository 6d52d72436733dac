use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Endpoints and timing of a live session connection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Base URL of the streaming service, e.g. `ws://localhost:8000`.
    pub ws_base_url: String,
    /// Base URL of the request/response API used by fallback polling.
    pub api_base_url: String,
    /// Delay before the first reconnect; attempt `n` waits `n` times as long.
    pub base_reconnect_delay_ms: u64,
    /// Time allowed for the streaming handshake before it counts as an abnormal close.
    pub connect_timeout_ms: u64,
    /// Abnormal closes tolerated before switching to fallback polling.
    pub max_reconnect_attempts: u32,
    /// Interval between fallback polls.
    pub fallback_poll_interval_ms: u64,
    /// Number of metric records requested per fallback poll.
    pub metrics_limit: usize,
}

impl ConnectionConfig {
    /// Streaming endpoint of a session.
    #[must_use]
    pub fn endpoint(&self, session_id: &str) -> String {
        format!(
            "{}/ws/training/{session_id}",
            self.ws_base_url.trim_end_matches('/')
        )
    }

    /// Delay scheduled before reconnect attempt `attempt`.
    #[must_use]
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_reconnect_delay_ms.saturating_mul(u64::from(attempt)))
    }

    /// Time allowed for the streaming handshake.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms.max(1))
    }

    /// Interval between fallback polls; also bounds each poll.
    #[must_use]
    pub fn fallback_poll_interval(&self) -> Duration {
        Duration::from_millis(self.fallback_poll_interval_ms.max(1))
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            ws_base_url: "ws://localhost:8000".to_owned(),
            api_base_url: "http://localhost:8000".to_owned(),
            base_reconnect_delay_ms: 1000,
            connect_timeout_ms: 10_000,
            max_reconnect_attempts: 5,
            fallback_poll_interval_ms: 3000,
            metrics_limit: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_session_without_double_slash() {
        let config = ConnectionConfig {
            ws_base_url: "wss://example.test/".to_owned(),
            ..ConnectionConfig::default()
        };
        assert_eq!(
            config.endpoint("abc"),
            "wss://example.test/ws/training/abc"
        );
    }

    #[test]
    fn reconnect_delay_grows_linearly() {
        let config = ConnectionConfig::default();
        let delays: Vec<u128> = (1..=4)
            .map(|attempt| config.reconnect_delay(attempt).as_millis())
            .collect();
        assert_eq!(delays, vec![1000, 2000, 3000, 4000]);
    }
}
