//! # Connection Manager — push channel lifecycle
//!
//! Owns at most one WebSocket at a time: open, send, receive, close. State
//! transitions here drive everything downstream — the session schedules
//! reconnects off the `Closed` transition, and `Errored` always resolves to
//! a close in this transport model.

use crate::error::{StreamError, StreamResult};
use crate::types::{ChannelState, ControlFrame};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct ConnectionManager {
    endpoint: String,
    state: ChannelState,
    ws: Option<WsStream>,
}

impl ConnectionManager {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            state: ChannelState::Closed,
            ws: None,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ChannelState::Open && self.ws.is_some()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Open the channel. A no-op while already `Connecting` or `Open`.
    pub async fn connect(&mut self) -> StreamResult<()> {
        if matches!(self.state, ChannelState::Connecting | ChannelState::Open) {
            debug!(state = ?self.state, "connect ignored, channel already active");
            return Ok(());
        }

        Url::parse(&self.endpoint)
            .map_err(|e| StreamError::TransportOpen(format!("invalid endpoint: {}", e)))?;

        self.state = ChannelState::Connecting;
        match connect_async(self.endpoint.as_str()).await {
            Ok((ws, _response)) => {
                self.ws = Some(ws);
                self.state = ChannelState::Open;
                info!(endpoint = %self.endpoint, "push channel open");
                Ok(())
            }
            Err(e) => {
                self.ws = None;
                self.state = ChannelState::Errored;
                Err(StreamError::TransportOpen(e.to_string()))
            }
        }
    }

    /// Next inbound text payload.
    ///
    /// `Some(Ok(text))` is a frame to parse; `Some(Err(_))` is a transport
    /// error (state goes `Errored`, the close that follows is implicit here —
    /// the socket is already gone); `None` means the channel closed.
    pub async fn next_text(&mut self) -> Option<Result<String, StreamError>> {
        loop {
            let item = match self.ws.as_mut() {
                Some(ws) => ws.next().await,
                None => return None,
            };
            match item {
                Some(Ok(Message::Text(text))) => return Some(Ok(text)),
                Some(Ok(Message::Close(_))) => {
                    debug!("close frame from peer");
                    self.ws = None;
                    self.state = ChannelState::Closed;
                    return None;
                }
                // Transport-level ping/pong and binary frames are not part of
                // the intel protocol; tungstenite answers pings on flush.
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    self.ws = None;
                    self.state = ChannelState::Errored;
                    return Some(Err(StreamError::TransportClosed(e.to_string())));
                }
                None => {
                    self.ws = None;
                    self.state = ChannelState::Closed;
                    return None;
                }
            }
        }
    }

    /// Send a control frame. Returns false without error when the channel is
    /// not open, so callers can drop or queue as they see fit.
    pub async fn send(&mut self, frame: &ControlFrame) -> bool {
        if self.state != ChannelState::Open {
            return false;
        }
        let Some(ws) = self.ws.as_mut() else {
            return false;
        };
        let text = match serde_json::to_string(frame) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "control frame serialization failed");
                return false;
            }
        };
        match ws.send(Message::Text(text)).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "send failed, channel errored");
                self.ws = None;
                self.state = ChannelState::Errored;
                false
            }
        }
    }

    /// Close the channel if one is up. Safe to call in any state.
    pub async fn close(&mut self) {
        if let Some(mut ws) = self.ws.take() {
            let _ = ws.close(None).await;
            debug!(endpoint = %self.endpoint, "push channel closed");
        }
        self.state = ChannelState::Closed;
    }

    /// Record the channel as closed without a close handshake — used after
    /// an error, where the socket is already unusable.
    pub fn mark_closed(&mut self) {
        self.ws = None;
        self.state = ChannelState::Closed;
    }
}
