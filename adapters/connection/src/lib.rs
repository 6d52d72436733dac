#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Live session connection for the patrol viewer.
//!
//! [`ConnectionManager`] keeps one subscription per monitored session. It
//! reconnects with a linearly growing delay after abnormal closes and, once
//! the attempts are exhausted, falls back to polling the session status
//! endpoint. Network access goes through the [`Transport`] and
//! [`SessionStatusSource`] seams so the state machine can be driven by
//! in-memory fakes.

mod config;
mod error;
mod manager;
mod status;
mod transport;

pub use config::ConnectionConfig;
pub use error::{ConnectionError, FetchError};
pub use manager::{ConnectionManager, MessageHandler, MAX_ATTEMPTS_REACHED};
pub use status::{HttpSessionStatusSource, SessionStatusSource};
pub use transport::{BoxFuture, Link, LinkDriver, LinkEvent, Outbound, Transport, WebSocketTransport};
