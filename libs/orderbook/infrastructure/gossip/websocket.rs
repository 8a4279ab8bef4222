//! WebSocket pub/sub gossip client
//!
//! Talks to a topic-based relay bridge using JSON envelopes:
//!
//! - `{"type":"subscribe","topic":T}` sent after every (re)connect
//! - `{"type":"publish","topic":T,"payload":P}` for outgoing payloads
//! - `{"topic":T,"payload":P}` for incoming payloads
//!
//! Publishing fails while disconnected and when the outbox is full, so the
//! caller knows the payload never left the node.

use super::{GossipChannel, GossipError, Result};
use crate::infrastructure::shutdown::ShutdownManager;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, trace, warn};

const INCOMING_CAPACITY: usize = 1024;
const OUTGOING_CAPACITY: usize = 256;

pub struct WebSocketGossip {
    incoming: broadcast::Sender<Value>,
    outgoing: mpsc::Sender<Value>,
    connected: Arc<AtomicBool>,
}

impl WebSocketGossip {
    /// Spawn the connection task; it runs until `shutdown` triggers
    pub fn spawn(
        url: impl Into<String>,
        topic: impl Into<String>,
        reconnect_delay: Duration,
        shutdown: ShutdownManager,
    ) -> Self {
        let (incoming, _) = broadcast::channel(INCOMING_CAPACITY);
        let (outgoing, outgoing_rx) = mpsc::channel(OUTGOING_CAPACITY);
        let connected = Arc::new(AtomicBool::new(false));

        let connection = Connection {
            url: url.into(),
            topic: topic.into(),
            reconnect_delay,
            shutdown,
            incoming: incoming.clone(),
            connected: connected.clone(),
        };
        tokio::spawn(connection.run(outgoing_rx));

        Self {
            incoming,
            outgoing,
            connected,
        }
    }
}

#[async_trait]
impl GossipChannel for WebSocketGossip {
    fn subscribe(&self) -> broadcast::Receiver<Value> {
        self.incoming.subscribe()
    }

    async fn publish(&self, payload: Value) -> Result<()> {
        if !self.is_connected() {
            return Err(GossipError::NotConnected);
        }
        self.outgoing.try_send(payload).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => GossipError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => GossipError::Closed,
        })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

fn subscribe_message(topic: &str) -> Value {
    json!({ "type": "subscribe", "topic": topic })
}

fn publish_message(topic: &str, payload: Value) -> Value {
    json!({ "type": "publish", "topic": topic, "payload": payload })
}

/// Payload of an incoming envelope addressed to `topic`
fn parse_incoming(text: &str, topic: &str) -> Option<Value> {
    let mut envelope: Value = serde_json::from_str(text).ok()?;
    if envelope.get("topic").and_then(Value::as_str) != Some(topic) {
        return None;
    }
    envelope.get_mut("payload").map(Value::take)
}

struct Connection {
    url: String,
    topic: String,
    reconnect_delay: Duration,
    shutdown: ShutdownManager,
    incoming: broadcast::Sender<Value>,
    connected: Arc<AtomicBool>,
}

impl Connection {
    async fn run(self, mut outgoing_rx: mpsc::Receiver<Value>) {
        let mut reconnect_attempt: u64 = 0;

        while self.shutdown.is_running() {
            match connect_async(self.url.as_str()).await {
                Ok((ws_stream, _)) => {
                    info!(url = %self.url, topic = %self.topic, "Connected to gossip relay");
                    reconnect_attempt = 0;

                    let outcome = self.handle_connection(ws_stream, &mut outgoing_rx).await;
                    self.connected.store(false, Ordering::Release);
                    match outcome {
                        Ok(true) => {
                            debug!("All gossip handles dropped, closing connection task");
                            return;
                        }
                        Ok(false) => info!("Gossip connection closed"),
                        Err(e) => warn!(error = %e, "Gossip connection error"),
                    }
                }
                Err(e) => {
                    warn!(url = %self.url, error = %e, "Failed to connect to gossip relay");
                }
            }

            if !self.shutdown.is_running() {
                break;
            }

            reconnect_attempt += 1;
            info!(
                "Reconnecting gossip in {:?} (attempt {})",
                self.reconnect_delay, reconnect_attempt
            );
            self.shutdown.interruptible_sleep(self.reconnect_delay).await;
        }

        debug!("Gossip connection task exiting");
    }

    /// Returns `Ok(true)` once every publisher handle is gone
    async fn handle_connection(
        &self,
        ws_stream: tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        outgoing_rx: &mut mpsc::Receiver<Value>,
    ) -> Result<bool> {
        let (mut write, mut read) = ws_stream.split();

        write
            .send(Message::Text(subscribe_message(&self.topic).to_string()))
            .await
            .map_err(|e| GossipError::WebSocket(format!("Failed to subscribe: {}", e)))?;

        self.connected.store(true, Ordering::Release);

        let mut shutdown_check = tokio::time::interval(Duration::from_millis(250));

        loop {
            tokio::select! {
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.deliver(&text),
                    Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                        Ok(text) => self.deliver(&text),
                        Err(_) => trace!("Ignoring non-UTF-8 binary frame"),
                    },
                    Some(Ok(Message::Ping(data))) => {
                        write
                            .send(Message::Pong(data))
                            .await
                            .map_err(|e| GossipError::WebSocket(e.to_string()))?;
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(false),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(GossipError::WebSocket(e.to_string())),
                },
                payload = outgoing_rx.recv() => match payload {
                    Some(payload) => {
                        let envelope = publish_message(&self.topic, payload);
                        write
                            .send(Message::Text(envelope.to_string()))
                            .await
                            .map_err(|e| GossipError::WebSocket(e.to_string()))?;
                    }
                    None => {
                        let _ = write.close().await;
                        return Ok(true);
                    }
                },
                _ = shutdown_check.tick() => {
                    if !self.shutdown.is_running() {
                        let _ = write.close().await;
                        return Ok(false);
                    }
                }
            }
        }
    }

    fn deliver(&self, text: &str) {
        match parse_incoming(text, &self.topic) {
            // Lagging or absent subscribers only lose this payload
            Some(payload) => {
                let _ = self.incoming.send(payload);
            }
            None => trace!("Ignoring frame for another topic"),
        }
    }
}
