//! Async driver owning a chat session.
//!
//! The [`Driver`] is a cheap handle to a background task that owns the
//! [`ChatClient`]. The task processes transport events strictly in arrival
//! order and serves handle commands in between, so no lock guards the
//! session state.
//!
//! ```text
//! Driver ──DriverCommand──► ┌────────────┐ ◄──TransportEvent── WsTransport
//!   ▲                       │ DriverLoop │
//!   └───oneshot reply────── │ ChatClient │ ──ClientEvent──► broadcast
//!                           └────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use chat_ddp_client::Driver;
//!
//! # async fn example() -> chat_ddp_client::Result<()> {
//! let driver = Driver::builder()
//!     .url("wss://chat.example.com/websocket")
//!     .token("resume-token")
//!     .build()?;
//!
//! driver.connect().await?;
//! driver.wait_until_ready(Duration::from_secs(10)).await?;
//!
//! driver.open_room("GENERAL").await?;
//! driver.send_message("GENERAL", "hello").await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Instant, Interval, MissedTickBehavior, interval, sleep_until, timeout};
use tracing::{debug, info, warn};
use url::Url;

use crate::chat::{Message, Room};
use crate::error::{Error, Result};
use crate::identifiers::{CallId, RoomId};
use crate::session::{ChatClient, ClientEvent, ConnectionState};
use crate::transport::{Transport, TransportEvent, WsTransport};

use super::builder::DriverBuilder;
use super::credentials::CredentialIssuer;

// ============================================================================
// Constants
// ============================================================================

/// Capacity of the client event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Consecutive credential requests before giving up until the next ready.
const MAX_CREDENTIAL_ATTEMPTS: u32 = 3;

/// Lower bound on the pending-call sweep period.
const MIN_SWEEP_PERIOD: Duration = Duration::from_millis(100);

// ============================================================================
// DriverCommand
// ============================================================================

/// Internal commands for the driver loop.
enum DriverCommand {
    Connect {
        reply: oneshot::Sender<Result<()>>,
    },
    Authenticate {
        token: String,
        reply: Option<oneshot::Sender<Result<()>>>,
    },
    State {
        reply: oneshot::Sender<ConnectionState>,
    },
    FetchRooms {
        reply: oneshot::Sender<Result<CallId>>,
    },
    Rooms {
        reply: oneshot::Sender<Vec<Room>>,
    },
    OpenRoom {
        room_id: RoomId,
        reply: oneshot::Sender<Result<CallId>>,
    },
    CloseRoom {
        room_id: RoomId,
        reply: oneshot::Sender<Result<()>>,
    },
    Messages {
        room_id: RoomId,
        reply: oneshot::Sender<Vec<Message>>,
    },
    IsSubscribed {
        room_id: RoomId,
        reply: oneshot::Sender<bool>,
    },
    SendMessage {
        room_id: RoomId,
        text: String,
        reply: oneshot::Sender<Result<CallId>>,
    },
    Logout {
        reply: oneshot::Sender<()>,
    },
    Shutdown,
}

// ============================================================================
// Driver
// ============================================================================

/// Handle to a running chat session.
///
/// Clones share the same session. The background task stops once
/// [`Driver::shutdown`] is called or every handle is dropped.
#[derive(Clone)]
pub struct Driver {
    /// Channel to the driver loop.
    command_tx: mpsc::UnboundedSender<DriverCommand>,
    /// Source of event subscriptions.
    events_tx: broadcast::Sender<ClientEvent>,
    /// Server endpoint.
    url: Url,
    /// Whether closed connections are retried.
    reconnects: bool,
}

// ============================================================================
// Driver - Display
// ============================================================================

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("url", &self.url.as_str())
            .field("reconnects", &self.reconnects)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Driver - Public API
// ============================================================================

impl Driver {
    /// Creates a configuration builder for the driver.
    #[inline]
    #[must_use]
    pub fn builder() -> DriverBuilder {
        DriverBuilder::new()
    }

    /// Returns the server endpoint.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Subscribes to client events.
    ///
    /// Only events emitted after this call are received.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events_tx.subscribe()
    }

    /// Opens the connection.
    ///
    /// Returns once the connection attempt has started; progress is
    /// reported through [`Driver::subscribe`]. Does nothing if a connection
    /// is already open or opening.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DriverStopped`] if the driver task has ended.
    pub async fn connect(&self) -> Result<()> {
        self.request(|reply| DriverCommand::Connect { reply }).await?
    }

    /// Supplies a token and resumes login if the session is waiting.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `token` is empty
    /// - [`Error::DriverStopped`] if the driver task has ended
    pub async fn authenticate(&self, token: impl Into<String>) -> Result<()> {
        let token = token.into();
        self.request(|reply| DriverCommand::Authenticate {
            token,
            reply: Some(reply),
        })
        .await?
    }

    /// Returns the connection state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DriverStopped`] if the driver task has ended.
    pub async fn state(&self) -> Result<ConnectionState> {
        self.request(|reply| DriverCommand::State { reply }).await
    }

    /// Waits until the session is ready.
    ///
    /// # Errors
    ///
    /// - [`Error::AuthFailed`] if the server rejects the token
    /// - [`Error::TransportClosed`] if the connection closes and
    ///   reconnection is disabled
    /// - [`Error::ConnectionTimeout`] if `wait` elapses first
    pub async fn wait_until_ready(&self, wait: Duration) -> Result<()> {
        let mut events = self.subscribe();
        if self.state().await?.is_ready() {
            return Ok(());
        }

        let waiting = async {
            loop {
                match events.recv().await {
                    Ok(ClientEvent::Ready) => return Ok(()),
                    Ok(ClientEvent::AuthenticationFailed { message }) => {
                        return Err(Error::auth_failed(message));
                    }
                    Ok(ClientEvent::Disconnected { reason }) if !self.reconnects => {
                        return Err(Error::transport_closed(reason));
                    }
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => return Err(Error::DriverStopped),
                }
            }
        };

        timeout(wait, waiting)
            .await
            .map_err(|_| Error::connection_timeout(wait.as_millis() as u64))?
    }

    /// Requests the room list.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] / [`Error::NotReady`] outside `Ready`
    /// - [`Error::DriverStopped`] if the driver task has ended
    pub async fn fetch_rooms(&self) -> Result<CallId> {
        self.request(|reply| DriverCommand::FetchRooms { reply }).await?
    }

    /// Returns the room snapshot, most recently active first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DriverStopped`] if the driver task has ended.
    pub async fn rooms(&self) -> Result<Vec<Room>> {
        self.request(|reply| DriverCommand::Rooms { reply }).await
    }

    /// Opens a room: loads its history and subscribes to its live feed.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidRoom`] if the room id is empty
    /// - [`Error::NotConnected`] / [`Error::NotReady`] outside `Ready`
    /// - [`Error::DriverStopped`] if the driver task has ended
    pub async fn open_room(&self, room_id: impl Into<RoomId>) -> Result<CallId> {
        let room_id = room_id.into();
        self.request(|reply| DriverCommand::OpenRoom { room_id, reply }).await?
    }

    /// Closes a room's live feed.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidRoom`] if the room is not open
    /// - [`Error::DriverStopped`] if the driver task has ended
    pub async fn close_room(&self, room_id: impl Into<RoomId>) -> Result<()> {
        let room_id = room_id.into();
        self.request(|reply| DriverCommand::CloseRoom { room_id, reply }).await?
    }

    /// Returns a snapshot of a room's messages in timestamp order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DriverStopped`] if the driver task has ended.
    pub async fn messages(&self, room_id: impl Into<RoomId>) -> Result<Vec<Message>> {
        let room_id = room_id.into();
        self.request(|reply| DriverCommand::Messages { room_id, reply }).await
    }

    /// Returns `true` if the room's live feed is active.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DriverStopped`] if the driver task has ended.
    pub async fn is_subscribed(&self, room_id: impl Into<RoomId>) -> Result<bool> {
        let room_id = room_id.into();
        self.request(|reply| DriverCommand::IsSubscribed { room_id, reply }).await
    }

    /// Posts a message to a room.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidRoom`] / [`Error::InvalidArgument`] for bad input
    /// - [`Error::NotConnected`] / [`Error::NotReady`] outside `Ready`
    /// - [`Error::DriverStopped`] if the driver task has ended
    pub async fn send_message(
        &self,
        room_id: impl Into<RoomId>,
        text: impl Into<String>,
    ) -> Result<CallId> {
        let room_id = room_id.into();
        let text = text.into();
        self.request(|reply| DriverCommand::SendMessage {
            room_id,
            text,
            reply,
        })
        .await?
    }

    /// Ends the session, clearing the token and cache, and closes the
    /// connection. No reconnection follows.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DriverStopped`] if the driver task has ended.
    pub async fn logout(&self) -> Result<()> {
        self.request(|reply| DriverCommand::Logout { reply }).await
    }

    /// Stops the driver task and closes the connection.
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(DriverCommand::Shutdown);
    }
}

// ============================================================================
// Driver - Internal API
// ============================================================================

impl Driver {
    /// Spawns the driver loop around `client`.
    pub(crate) fn new(
        url: Url,
        client: ChatClient<WsTransport>,
        issuer: Option<Arc<dyn CredentialIssuer>>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let reconnects = client.options().reconnect.is_some();

        let driver_loop = DriverLoop {
            client,
            url: url.clone(),
            issuer,
            command_tx: command_tx.downgrade(),
            events_tx: events_tx.clone(),
            transport_rx: None,
            reconnect_at: None,
            reconnect_attempt: 0,
            credential_attempts: 0,
        };
        tokio::spawn(driver_loop.run(command_rx));

        info!(%url, "Driver started");
        Self {
            command_tx,
            events_tx,
            url,
            reconnects,
        }
    }

    /// Sends a command and waits for its reply.
    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> DriverCommand,
    ) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.command_tx
            .send(command(reply))
            .map_err(|_| Error::DriverStopped)?;
        response.await.map_err(|_| Error::DriverStopped)
    }
}

// ============================================================================
// DriverLoop
// ============================================================================

/// State owned by the driver task.
struct DriverLoop {
    client: ChatClient<WsTransport>,
    url: Url,
    issuer: Option<Arc<dyn CredentialIssuer>>,
    /// Weak so that dropping every handle stops the loop.
    command_tx: mpsc::WeakUnboundedSender<DriverCommand>,
    events_tx: broadcast::Sender<ClientEvent>,
    /// Events of the current connection.
    transport_rx: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    /// When the next reconnection attempt is due.
    reconnect_at: Option<Instant>,
    /// Reconnection attempts since the last ready session.
    reconnect_attempt: u32,
    /// Credential requests since the last ready session.
    credential_attempts: u32,
}

impl DriverLoop {
    async fn run(mut self, mut command_rx: mpsc::UnboundedReceiver<DriverCommand>) {
        let request_timeout = self.client.options().request_timeout;
        let mut sweep = request_timeout.map(|max_age| {
            let mut ticker = interval((max_age / 2).max(MIN_SWEEP_PERIOD));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        loop {
            tokio::select! {
                event = next_transport_event(&mut self.transport_rx) => {
                    match event {
                        Some(event) => self.on_transport_event(event),
                        None => self.transport_rx = None,
                    }
                }

                command = command_rx.recv() => {
                    match command {
                        Some(DriverCommand::Shutdown) | None => break,
                        Some(command) => self.on_command(command),
                    }
                }

                () = wait_until(self.reconnect_at) => {
                    self.reconnect_at = None;
                    if let Err(e) = self.connect() {
                        warn!(error = %e, "Reconnection failed");
                    }
                }

                () = next_tick(&mut sweep) => {
                    if let Some(max_age) = request_timeout {
                        self.client.expire_pending(max_age);
                    }
                }
            }

            self.flush_events();
        }

        if let Some(transport) = self.client.transport() {
            transport.close();
        }
        info!(url = %self.url, "Driver stopped");
    }

    fn on_transport_event(&mut self, event: TransportEvent) {
        let closed = matches!(event, TransportEvent::Closed(_));
        self.client.handle_event(event);
        if closed {
            self.transport_rx = None;
            self.schedule_reconnect();
        }
    }

    fn on_command(&mut self, command: DriverCommand) {
        match command {
            DriverCommand::Connect { reply } => {
                self.reconnect_at = None;
                self.reconnect_attempt = 0;
                let _ = reply.send(self.connect());
            }
            DriverCommand::Authenticate { token, reply } => {
                let result = self.client.authenticate(token);
                match reply {
                    Some(reply) => {
                        let _ = reply.send(result);
                    }
                    None => {
                        if let Err(e) = result {
                            warn!(error = %e, "Issued token rejected");
                        }
                    }
                }
            }
            DriverCommand::State { reply } => {
                let _ = reply.send(self.client.state());
            }
            DriverCommand::FetchRooms { reply } => {
                let _ = reply.send(self.client.fetch_rooms());
            }
            DriverCommand::Rooms { reply } => {
                let _ = reply.send(self.client.rooms());
            }
            DriverCommand::OpenRoom { room_id, reply } => {
                let _ = reply.send(self.client.open_room(&room_id));
            }
            DriverCommand::CloseRoom { room_id, reply } => {
                let _ = reply.send(self.client.close_room(&room_id));
            }
            DriverCommand::Messages { room_id, reply } => {
                let _ = reply.send(self.client.messages(&room_id));
            }
            DriverCommand::IsSubscribed { room_id, reply } => {
                let _ = reply.send(self.client.is_subscribed(&room_id));
            }
            DriverCommand::SendMessage {
                room_id,
                text,
                reply,
            } => {
                let _ = reply.send(self.client.send_message(&room_id, text));
            }
            DriverCommand::Logout { reply } => {
                self.client.logout();
                self.transport_rx = None;
                self.reconnect_at = None;
                self.reconnect_attempt = 0;
                let _ = reply.send(());
            }
            DriverCommand::Shutdown => {}
        }
    }

    /// Opens a new connection unless one is open or opening.
    fn connect(&mut self) -> Result<()> {
        let state = self.client.state();
        if !state.can_open() {
            debug!(%state, "Connect ignored, connection already in progress");
            return Ok(());
        }

        let (transport, events) =
            WsTransport::open(&self.url, self.client.options().connect_timeout);
        self.client.open(transport)?;
        self.transport_rx = Some(events);
        debug!(url = %self.url, "Connecting");
        Ok(())
    }

    fn schedule_reconnect(&mut self) {
        let Some(policy) = self.client.options().reconnect.as_ref() else {
            return;
        };

        if !policy.allows(self.reconnect_attempt) {
            warn!(
                attempts = self.reconnect_attempt,
                "Reconnection attempts exhausted"
            );
            return;
        }

        let delay = policy.delay(self.reconnect_attempt);
        self.reconnect_attempt += 1;
        info!(
            attempt = self.reconnect_attempt,
            delay_ms = delay.as_millis() as u64,
            "Scheduling reconnection"
        );
        self.reconnect_at = Some(Instant::now() + delay);
    }

    fn flush_events(&mut self) {
        for event in self.client.take_events() {
            match &event {
                ClientEvent::Ready => {
                    self.reconnect_attempt = 0;
                    self.credential_attempts = 0;
                }
                ClientEvent::AuthenticationRequired => self.request_credentials(),
                _ => {}
            }
            // No subscribers is not an error.
            let _ = self.events_tx.send(event);
        }
    }

    /// Asks the issuer for a token without blocking the loop.
    fn request_credentials(&mut self) {
        let Some(issuer) = self.issuer.clone() else {
            return;
        };
        if self.credential_attempts >= MAX_CREDENTIAL_ATTEMPTS {
            warn!(
                attempts = self.credential_attempts,
                "Not requesting more credentials"
            );
            return;
        }
        let Some(command_tx) = self.command_tx.upgrade() else {
            return;
        };

        self.credential_attempts += 1;
        debug!(attempt = self.credential_attempts, "Requesting credentials");
        tokio::spawn(async move {
            match issuer.issue_token().await {
                Ok(token) => {
                    let _ = command_tx.send(DriverCommand::Authenticate { token, reply: None });
                }
                Err(e) => warn!(error = %e, "Credential issuer failed"),
            }
        });
    }
}

// ============================================================================
// Select Helpers
// ============================================================================

async fn next_transport_event(
    events: &mut Option<mpsc::UnboundedReceiver<TransportEvent>>,
) -> Option<TransportEvent> {
    match events.as_mut() {
        Some(events) => events.recv().await,
        None => future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => future::pending().await,
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker.as_mut() {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => future::pending().await,
    }
}

// ============================================================================
// Tests
// ============================================================================
