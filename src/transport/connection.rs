//! WebSocket connection and event loop.
//!
//! This module handles the client WebSocket connection to the chat server.
//!
//! # Event Loop
//!
//! [`WsTransport::open`] spawns a tokio task that:
//!
//! - Connects (bounded by the connect timeout)
//! - Decodes incoming text frames into [`ServerFrame`]s
//! - Writes outgoing frames queued by [`Transport::send`]
//! - Reports exactly one `Opened` and one `Closed` event

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::ServerFrame;

use super::{CloseReason, Transport, TransportEvent};

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for the WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// TransportCommand
// ============================================================================

/// Internal commands for the event loop.
enum TransportCommand {
    /// Write a text frame.
    Send(String),
    /// Close the connection.
    Close,
}

// ============================================================================
// WsTransport
// ============================================================================

/// WebSocket connection to the chat server.
///
/// Cheap to clone; all clones feed the same connection task.
#[derive(Clone)]
pub struct WsTransport {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<TransportCommand>,
    /// Set while the connection is open.
    open: Arc<AtomicBool>,
}

impl WsTransport {
    /// Starts connecting to `url` and returns immediately.
    ///
    /// Progress is reported on the returned event receiver. A failed or
    /// timed-out connect yields a single [`TransportEvent::Closed`].
    #[must_use]
    pub fn open(
        url: &Url,
        connect_timeout: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(false));

        tokio::spawn(Self::run_event_loop(
            url.to_string(),
            connect_timeout,
            command_rx,
            event_tx,
            Arc::clone(&open),
        ));

        (Self { command_tx, open }, event_rx)
    }

    /// Returns `true` while the connection is open.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop(
        url: String,
        connect_timeout: Duration,
        mut command_rx: mpsc::UnboundedReceiver<TransportCommand>,
        event_tx: mpsc::UnboundedSender<TransportEvent>,
        open: Arc<AtomicBool>,
    ) {
        let ws_stream = match timeout(connect_timeout, connect_async(url.as_str())).await {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => {
                warn!(%url, error = %e, "WebSocket connect failed");
                let _ = event_tx.send(TransportEvent::Closed(CloseReason::Error(e.to_string())));
                return;
            }
            Err(_) => {
                warn!(%url, timeout_ms = connect_timeout.as_millis() as u64, "WebSocket connect timed out");
                let _ = event_tx.send(TransportEvent::Closed(CloseReason::Timeout));
                return;
            }
        };

        info!(%url, "WebSocket connection established");
        open.store(true, Ordering::Release);
        let _ = event_tx.send(TransportEvent::Opened);

        let (mut ws_write, mut ws_read) = ws_stream.split();

        let reason = loop {
            tokio::select! {
                // Incoming frames from the server
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            match ServerFrame::from_json(text.as_str()) {
                                Ok(frame) => {
                                    trace!(?frame, "Frame received");
                                    let _ = event_tx.send(TransportEvent::Message(frame));
                                }
                                Err(e) => {
                                    warn!(error = %e, text = %text, "Failed to decode server frame");
                                }
                            }
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!("WebSocket closed by remote");
                            break CloseReason::Normal;
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            break CloseReason::Error(e.to_string());
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            break CloseReason::Error("stream ended".to_string());
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                // Commands from the client
                command = command_rx.recv() => {
                    match command {
                        Some(TransportCommand::Send(text)) => {
                            if let Err(e) = ws_write.send(Message::Text(text.into())).await {
                                error!(error = %e, "Failed to write frame");
                                break CloseReason::Error(e.to_string());
                            }
                            trace!("Frame sent");
                        }

                        Some(TransportCommand::Close) | None => {
                            debug!("Closing WebSocket");
                            let _ = ws_write.close().await;
                            break CloseReason::Normal;
                        }
                    }
                }
            }
        };

        open.store(false, Ordering::Release);
        let _ = event_tx.send(TransportEvent::Closed(reason));

        debug!("Event loop terminated");
    }
}

impl Transport for WsTransport {
    fn send(&self, text: String) -> Result<()> {
        if !self.is_open() {
            return Err(Error::NotConnected);
        }
        self.command_tx
            .send(TransportCommand::Send(text))
            .map_err(|_| Error::NotConnected)
    }

    fn close(&self) {
        let _ = self.command_tx.send(TransportCommand::Close);
    }
}

// ============================================================================
// Tests
// ============================================================================
