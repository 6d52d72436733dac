use thiserror::Error;

/// Failures raised while establishing a live connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The manager was created outside of a tokio runtime.
    #[error("no tokio runtime is available to drive the connection")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
    /// The websocket handshake failed.
    #[error("websocket handshake with {url} failed: {source}")]
    Handshake {
        /// Endpoint that was dialled.
        url: String,
        /// Underlying protocol error.
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },
    /// The HTTP client used by fallback polling could not be built.
    #[error("failed to build the http client: {0}")]
    HttpClient(#[source] reqwest::Error),
    /// The transport refused to open a link.
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

/// Failures raised by the session status source.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request failed or returned an error status.
    #[error("status request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The response body did not have the expected shape.
    #[error("status response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
    /// The source could not serve the request.
    #[error("status source unavailable: {0}")]
    Unavailable(String),
}
