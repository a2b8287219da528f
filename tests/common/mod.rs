//! Shared fixtures for the integration tests: an in-memory connector that
//! hands each accepted connection to the test as a [`ServerSide`].

#![allow(dead_code, clippy::panic)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;

use credential_realtime::ws::messages::OutboundMessage;
use credential_realtime::ws::{Connector, TransportFrame, TransportLink};
use credential_realtime::{ClientConfig, RealtimeError};

/// Connector that opens in-memory links and can be told to refuse.
#[derive(Debug)]
pub struct FakeConnector {
    attempts: AtomicUsize,
    refusals: AtomicUsize,
    refuse_all: AtomicBool,
    accepted: mpsc::UnboundedSender<ServerSide>,
}

impl FakeConnector {
    /// Creates a connector and the receiver of accepted connections.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerSide>) {
        let (accepted, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            attempts: AtomicUsize::new(0),
            refusals: AtomicUsize::new(0),
            refuse_all: AtomicBool::new(false),
            accepted,
        });
        (connector, rx)
    }

    /// Refuses every attempt while `refuse` is set.
    pub fn refuse_all(&self, refuse: bool) {
        self.refuse_all.store(refuse, Ordering::SeqCst);
    }

    /// Refuses the next `count` attempts.
    pub fn refuse_next(&self, count: usize) {
        self.refusals.store(count, Ordering::SeqCst);
    }

    /// Connection attempts seen so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn should_refuse(&self) -> bool {
        if self.refuse_all.load(Ordering::SeqCst) {
            return true;
        }
        self.refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Connector for FakeConnector {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<TransportLink, RealtimeError>> {
        let _ = self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.should_refuse() {
            let url = url.to_string();
            return Box::pin(async move {
                Err(RealtimeError::Transport(format!("{url} refused")))
            });
        }

        let (outgoing, from_client) = mpsc::unbounded_channel();
        let (to_client, incoming) = mpsc::unbounded_channel();
        let _ = self.accepted.send(ServerSide {
            url: url.to_string(),
            from_client,
            to_client,
        });
        Box::pin(async move { Ok(TransportLink { outgoing, incoming }) })
    }
}

/// The gateway's end of one fake connection.
#[derive(Debug)]
pub struct ServerSide {
    /// Address the client dialled.
    pub url: String,
    from_client: mpsc::UnboundedReceiver<String>,
    to_client: mpsc::UnboundedSender<TransportFrame>,
}

impl ServerSide {
    /// Waits for the next command from the client.
    pub async fn recv_message(&mut self) -> OutboundMessage {
        let Some(text) = self.from_client.recv().await else {
            panic!("client closed the connection");
        };
        let Ok(message) = serde_json::from_str(&text) else {
            panic!("client sent an unparseable frame: {text}");
        };
        message
    }

    /// Next command if one is already buffered.
    pub fn try_recv_message(&mut self) -> Option<OutboundMessage> {
        let text = self.from_client.try_recv().ok()?;
        serde_json::from_str(&text).ok()
    }

    /// Returns `true` once the client dropped its sending half.
    pub async fn client_closed(&mut self) -> bool {
        loop {
            match self.from_client.recv().await {
                Some(_) => continue,
                None => return true,
            }
        }
    }

    /// Sends a JSON frame to the client.
    pub fn send_json(&self, value: serde_json::Value) {
        self.send_text(value.to_string());
    }

    /// Sends a raw text frame to the client.
    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self.to_client.send(TransportFrame::Text(text.into()));
    }

    /// Closes the connection from the gateway side.
    pub fn close(&self) {
        let _ = self.to_client.send(TransportFrame::Closed(None));
    }

    /// Fails the connection with a transport error.
    pub fn fail(&self, message: &str) {
        let _ = self.to_client.send(TransportFrame::Error(message.to_string()));
    }
}

/// Configuration with a heartbeat far enough out not to disturb counts.
pub fn quiet_config() -> ClientConfig {
    let mut config = ClientConfig::new("ws://gateway.test", "issuer-1");
    config.heartbeat_interval = Duration::from_secs(3_600);
    config
}

/// Lets spawned client tasks run until they block.
pub async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

/// Builds a wire `event` frame.
pub fn event_frame(event_type: &str, data: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "type": "event",
        "event": { "type": event_type, "data": data }
    })
}
