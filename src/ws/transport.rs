//! Transport seam between the connection manager and the socket.
//!
//! A [`Connector`] opens one connection and hands back a [`TransportLink`]:
//! a sender for outgoing text frames and a receiver of inbound
//! [`TransportFrame`]s. Dropping the outgoing sender closes the connection.

use std::fmt;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::error::RealtimeError;

/// Something that happened on an open connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFrame {
    /// A text frame.
    Text(String),
    /// The connection closed, with the peer's reason if it gave one.
    Closed(Option<String>),
    /// The connection failed; no further frames follow.
    Error(String),
}

/// Channels of one open connection.
#[derive(Debug)]
pub struct TransportLink {
    /// Outgoing text frames, transmitted in order.
    pub outgoing: mpsc::UnboundedSender<String>,
    /// Inbound frames in delivery order.
    pub incoming: mpsc::UnboundedReceiver<TransportFrame>,
}

/// Opens transport connections.
pub trait Connector: Send + Sync + fmt::Debug {
    /// Starts opening a connection to `url`.
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<TransportLink, RealtimeError>>;
}

/// WebSocket connector built on `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct TungsteniteConnector {
    connect_timeout: Duration,
}

impl TungsteniteConnector {
    /// Creates a connector that gives up opening after `connect_timeout`.
    #[must_use]
    pub const fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TungsteniteConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl Connector for TungsteniteConnector {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<TransportLink, RealtimeError>> {
        let url = url.to_string();
        let connect_timeout = self.connect_timeout;

        Box::pin(async move {
            let (stream, _response) =
                tokio::time::timeout(connect_timeout, tokio_tungstenite::connect_async(url.as_str()))
                    .await
                    .map_err(|_| {
                        RealtimeError::Transport(format!(
                            "connect to {url} timed out after {} ms",
                            connect_timeout.as_millis()
                        ))
                    })?
                    .map_err(|e| RealtimeError::Transport(format!("connect to {url}: {e}")))?;

            let (mut ws_tx, mut ws_rx) = stream.split();
            let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<String>();
            let (incoming_tx, incoming) = mpsc::unbounded_channel();

            // Writer: forwards queued text frames; closes the socket once the
            // client drops its sender.
            tokio::spawn(async move {
                while let Some(text) = outgoing_rx.recv().await {
                    if let Err(e) = ws_tx.send(Message::text(text)).await {
                        tracing::debug!(error = %e, "ws write failed");
                        break;
                    }
                }
                let _ = ws_tx.close().await;
            });

            // Reader: converts socket messages into frames.
            tokio::spawn(async move {
                while let Some(msg) = ws_rx.next().await {
                    let frame = match msg {
                        Ok(Message::Text(text)) => TransportFrame::Text(text.as_str().to_owned()),
                        Ok(Message::Close(close)) => {
                            let reason = close
                                .map(|c| c.reason.as_str().to_owned())
                                .filter(|r| !r.is_empty());
                            let _ = incoming_tx.send(TransportFrame::Closed(reason));
                            return;
                        }
                        Ok(_) => continue,
                        Err(e) => {
                            let _ = incoming_tx.send(TransportFrame::Error(e.to_string()));
                            return;
                        }
                    };
                    if incoming_tx.send(frame).is_err() {
                        return;
                    }
                }
                let _ = incoming_tx.send(TransportFrame::Closed(None));
            });

            tracing::debug!(%url, "ws transport open");
            Ok(TransportLink { outgoing, incoming })
        })
    }
}
