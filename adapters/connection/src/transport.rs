use std::{future::Future, pin::Pin};

use futures_util::{SinkExt, StreamExt};
use patrol_view_core::ABNORMAL_CLOSURE;
use tokio::{
    net::TcpStream,
    sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        protocol::{frame::coding::CloseCode, CloseFrame},
        Message,
    },
    MaybeTlsStream, WebSocketStream,
};
use tracing::debug;

use crate::ConnectionError;

/// Boxed future returned by the connection seams.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Close code reported when the peer closed without a status.
const NO_STATUS_RECEIVED: u16 = 1005;

/// Opens bidirectional links to a streaming endpoint.
pub trait Transport: Send + Sync {
    /// Performs the handshake with `url` and returns the established link.
    fn open<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Link, ConnectionError>>;
}

/// Message queued for the remote peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    /// Text frame.
    Text(String),
    /// Close handshake with the provided code.
    Close {
        /// Close code sent to the peer.
        code: u16,
    },
}

/// Event observed on an open link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkEvent {
    /// Text payload received from the peer.
    Text(String),
    /// Non-fatal error reported by the link.
    Error(String),
    /// The link closed with the provided code; no further events follow.
    Closed {
        /// Close code reported by the peer or the transport.
        code: u16,
    },
}

/// Manager side of an open link.
#[derive(Debug)]
pub struct Link {
    /// Queue of messages to send.
    pub outgoing: UnboundedSender<Outbound>,
    /// Events received from the peer, in arrival order.
    pub incoming: UnboundedReceiver<LinkEvent>,
}

/// Transport side of an open link.
#[derive(Debug)]
pub struct LinkDriver {
    /// Messages queued by the manager.
    pub outgoing: UnboundedReceiver<Outbound>,
    /// Sink for events delivered to the manager.
    pub events: UnboundedSender<LinkEvent>,
}

impl Link {
    /// Creates a connected link and its driver.
    #[must_use]
    pub fn pair() -> (Self, LinkDriver) {
        let (outgoing_tx, outgoing_rx) = unbounded_channel();
        let (events_tx, events_rx) = unbounded_channel();
        (
            Self {
                outgoing: outgoing_tx,
                incoming: events_rx,
            },
            LinkDriver {
                outgoing: outgoing_rx,
                events: events_tx,
            },
        )
    }
}

impl LinkDriver {
    /// Delivers an event to the manager, ignoring a closed link.
    pub fn emit(&self, event: LinkEvent) {
        let _ = self.events.send(event);
    }
}

/// [`Transport`] backed by a websocket connection.
#[derive(Clone, Copy, Debug, Default)]
pub struct WebSocketTransport;

impl Transport for WebSocketTransport {
    fn open<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Link, ConnectionError>> {
        Box::pin(async move {
            let (stream, _) =
                connect_async(url)
                    .await
                    .map_err(|source| ConnectionError::Handshake {
                        url: url.to_owned(),
                        source,
                    })?;
            debug!(url, "websocket handshake completed");

            let (link, driver) = Link::pair();
            drop(tokio::spawn(pump(stream, driver)));
            Ok(link)
        })
    }
}

async fn pump(stream: WebSocketStream<MaybeTlsStream<TcpStream>>, mut driver: LinkDriver) {
    let (mut write, mut read) = stream.split();
    loop {
        tokio::select! {
            outbound = driver.outgoing.recv() => match outbound {
                Some(Outbound::Text(text)) => {
                    if let Err(error) = write.send(Message::Text(text)).await {
                        driver.emit(LinkEvent::Error(error.to_string()));
                        driver.emit(LinkEvent::Closed { code: ABNORMAL_CLOSURE });
                        return;
                    }
                }
                Some(Outbound::Close { code }) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: "".into(),
                    };
                    let _ = write.send(Message::Close(Some(frame))).await;
                    return;
                }
                None => {
                    let _ = write.close().await;
                    return;
                }
            },
            inbound = read.next() => match inbound {
                Some(Ok(Message::Text(text))) => driver.emit(LinkEvent::Text(text)),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => driver.emit(LinkEvent::Text(text)),
                    Err(_) => debug!("ignoring non-utf8 binary frame"),
                },
                Some(Ok(Message::Ping(payload))) => {
                    let _ = write.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Close(frame))) => {
                    let code = frame.map_or(NO_STATUS_RECEIVED, |frame| u16::from(frame.code));
                    driver.emit(LinkEvent::Closed { code });
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    driver.emit(LinkEvent::Error(error.to_string()));
                    driver.emit(LinkEvent::Closed { code: ABNORMAL_CLOSURE });
                    return;
                }
                None => {
                    driver.emit(LinkEvent::Closed { code: ABNORMAL_CLOSURE });
                    return;
                }
            },
        }
    }
}
