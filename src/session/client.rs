//! Protocol state machine for one chat session.
//!
//! [`ChatClient`] is synchronous and single-writer: the owner feeds it
//! transport events in arrival order and calls its operations in between.
//! Everything it wants to tell the outside world is queued as
//! [`ClientEvent`]s, drained with [`ChatClient::take_events`].
//!
//! # Room Open Sequence
//!
//! ```text
//! open_room ──► openRoom ──ack──► loadHistory ──result──► load_initial ──► sub
//!                (room_R)          (messages_R)                           (sub_R)
//! ```
//!
//! The acknowledgement of `openRoom` is either its `result` or an
//! `updated` frame listing it, whichever arrives first.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, trace, warn};

use crate::cache::SessionCache;
use crate::chat::{Message, MessageStore, Room, RoomDirectory, SubscriptionManager};
use crate::driver::ClientOptions;
use crate::error::{Error, Result};
use crate::identifiers::{CallId, RoomId};
use crate::protocol::{
    ClientFrame, HistoryResult, LoginResult, MethodCall, MethodError, RoomsResult, ServerFrame,
    Timestamp, WireMessage,
};
use crate::transport::{CloseReason, Transport, TransportEvent};

use super::correlator::{Correlator, PendingRequest, RequestKind};
use super::state::{ConnectionState, Session};

// ============================================================================
// ClientEvent
// ============================================================================

/// Notification for the user-facing layer.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// The connection state changed.
    StateChanged(ConnectionState),
    /// A token is needed before the session can continue.
    AuthenticationRequired,
    /// The server rejected the stored token.
    AuthenticationFailed {
        /// Server-provided reason.
        message: String,
    },
    /// Login succeeded.
    Ready,
    /// The room snapshot was replaced.
    RoomsUpdated {
        /// Number of rooms now held.
        count: usize,
    },
    /// A room's initial history was loaded.
    HistoryLoaded {
        /// Room loaded.
        room_id: RoomId,
        /// Messages now held for the room.
        count: usize,
    },
    /// A new message was merged into a room's log.
    MessageReceived {
        /// Room the message belongs to.
        room_id: RoomId,
        /// The message.
        message: Message,
    },
    /// A room's live feed was requested.
    SubscriptionActive {
        /// Room subscribed.
        room_id: RoomId,
    },
    /// A room's live feed ended.
    SubscriptionClosed {
        /// Room unsubscribed.
        room_id: RoomId,
    },
    /// A call was answered with an error.
    CallFailed {
        /// What the call was for.
        kind: RequestKind,
        /// Error description.
        message: String,
    },
    /// A call received no answer in time.
    CallTimedOut {
        /// What the call was for.
        kind: RequestKind,
    },
    /// The connection closed.
    Disconnected {
        /// Why it closed.
        reason: CloseReason,
    },
}

// ============================================================================
// ChatClient
// ============================================================================

/// Session manager owning all per-connection state.
///
/// Generic over the [`Transport`] so the protocol logic runs without
/// network I/O.
pub struct ChatClient<T: Transport> {
    /// Configuration.
    options: ClientOptions,
    /// Token and lifecycle state.
    session: Session,
    /// Current connection, if any.
    transport: Option<T>,
    /// Pending calls.
    correlator: Correlator,
    /// Room snapshot.
    rooms: RoomDirectory,
    /// Per-room message logs.
    messages: MessageStore,
    /// Live feed state.
    subscriptions: SubscriptionManager,
    /// Optional persistence for token and rooms.
    cache: Option<Arc<dyn SessionCache>>,
    /// Events not yet drained.
    events: Vec<ClientEvent>,
}

// ============================================================================
// Constructors
// ============================================================================

impl<T: Transport> ChatClient<T> {
    /// Creates a disconnected client without a token.
    #[must_use]
    pub fn new(options: ClientOptions) -> Self {
        let subscriptions = SubscriptionManager::with_limit(options.max_subscriptions);
        Self {
            options,
            session: Session::default(),
            transport: None,
            correlator: Correlator::new(),
            rooms: RoomDirectory::new(),
            messages: MessageStore::new(),
            subscriptions,
            cache: None,
            events: Vec::new(),
        }
    }

    /// Sets the resume token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.session.set_token(Some(token.into()));
        self
    }

    /// Attaches a cache.
    ///
    /// The cached token is used unless one is already set, and the cached
    /// room snapshot seeds the directory.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn SessionCache>) -> Self {
        if self.session.auth_token().is_none() {
            self.session.set_token(cache.load_token());
        }
        if let Some(rooms) = cache.load_rooms() {
            self.rooms.seed(rooms);
        }
        self.cache = Some(cache);
        self
    }
}

// ============================================================================
// Connection Lifecycle
// ============================================================================

impl<T: Transport> ChatClient<T> {
    /// Adopts a newly opening connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] unless the client is disconnected or
    /// failed.
    pub fn open(&mut self, transport: T) -> Result<()> {
        let state = self.session.state();
        if !state.can_open() {
            return Err(Error::protocol(format!("Cannot open a connection while {state}")));
        }

        if let Some(previous) = self.transport.take() {
            previous.close();
        }
        self.correlator.clear();
        self.transport = Some(transport);
        self.set_state(ConnectionState::Connecting);
        Ok(())
    }

    /// Processes one transport event.
    pub fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => self.on_opened(),
            TransportEvent::Message(frame) => self.handle_frame(frame),
            TransportEvent::Closed(reason) => self.on_closed(reason),
        }
    }

    /// Stores a token and resumes login if the session is waiting for one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `token` is empty.
    pub fn authenticate(&mut self, token: impl Into<String>) -> Result<()> {
        let token = token.into();
        if token.is_empty() {
            return Err(Error::invalid_argument("Auth token must not be empty"));
        }

        self.session.set_token(Some(token.clone()));
        self.store_token(&token);

        match self.session.state() {
            ConnectionState::Connected => self.begin_login(),
            ConnectionState::Failed if self.transport.is_some() => {
                self.set_state(ConnectionState::Connected);
                self.begin_login();
            }
            state => debug!(%state, "Token stored for the next connection"),
        }
        Ok(())
    }

    /// Ends the session: forgets the token and every room, message and
    /// subscription, and closes the connection.
    pub fn logout(&mut self) {
        info!("Logging out");

        self.session.set_token(None);
        if let Some(cache) = &self.cache
            && let Err(e) = cache.clear()
        {
            warn!(error = %e, "Failed to clear session cache");
        }

        if let Some(transport) = self.transport.take() {
            transport.close();
        }
        self.correlator.clear();
        self.rooms.clear();
        self.messages.clear();
        self.subscriptions.clear();
        self.set_state(ConnectionState::Disconnected);
    }

    /// Abandons calls pending longer than `max_age`.
    ///
    /// A timed-out login closes the connection. Returns the number of
    /// calls abandoned.
    pub fn expire_pending(&mut self, max_age: Duration) -> usize {
        let expired = self.correlator.expire(max_age);

        for request in &expired {
            warn!(id = %request.id, call = request.kind.label(), "Call timed out");
            match &request.kind {
                RequestKind::Login => {
                    if let Some(transport) = &self.transport {
                        transport.close();
                    }
                }
                RequestKind::Subscribe(room_id) => {
                    if self.subscriptions.room_for_call(&request.id).is_some() {
                        self.subscriptions.deactivate(room_id);
                    }
                }
                RequestKind::OpenRoom(room_id) | RequestKind::LoadHistory(room_id) => {
                    self.subscriptions.deactivate(room_id);
                }
                RequestKind::ListRooms | RequestKind::SendMessage(_) => {}
            }
            self.events.push(ClientEvent::CallTimedOut {
                kind: request.kind.clone(),
            });
        }

        expired.len()
    }

    fn on_opened(&mut self) {
        let state = self.session.state();
        if state != ConnectionState::Connecting {
            warn!(%state, "Open event outside of connecting state");
            return;
        }

        self.set_state(ConnectionState::Connected);
        let handshake = ClientFrame::connect(
            self.options.protocol_version.clone(),
            &self.options.supported_versions,
        );
        if let Err(e) = self.send_frame(&handshake) {
            warn!(error = %e, "Failed to send handshake");
            return;
        }
        self.begin_login();
    }

    fn on_closed(&mut self, reason: CloseReason) {
        if self.transport.is_none() && self.session.state() == ConnectionState::Disconnected {
            debug!(%reason, "Close of a discarded connection");
            return;
        }

        self.transport = None;
        let abandoned = self.correlator.clear();
        self.subscriptions.invalidate_all();
        self.rooms.invalidate();

        info!(%reason, abandoned, "Connection closed");
        self.set_state(ConnectionState::Disconnected);
        self.events.push(ClientEvent::Disconnected { reason });
    }

    fn begin_login(&mut self) {
        let Some(token) = self.session.auth_token().map(str::to_string) else {
            info!("No auth token, authentication required");
            self.events.push(ClientEvent::AuthenticationRequired);
            return;
        };

        match self.call(RequestKind::Login, MethodCall::Login { token }) {
            Ok(_) => self.set_state(ConnectionState::Authenticating),
            Err(e) => warn!(error = %e, "Failed to send login"),
        }
    }

    fn on_login(&mut self, result: Value) {
        match serde_json::from_value::<LoginResult>(result) {
            Ok(LoginResult {
                token: Some(token), ..
            }) if !token.is_empty() => {
                self.session.set_token(Some(token.clone()));
                self.store_token(&token);
            }
            Ok(_) => {}
            Err(e) => debug!(error = %e, "Login result without session data"),
        }

        info!("Session ready");
        self.set_state(ConnectionState::Ready);
        self.events.push(ClientEvent::Ready);

        if let Err(e) = self.fetch_rooms() {
            warn!(error = %e, "Failed to request rooms");
        }

        if self.options.resubscribe_on_ready {
            for room_id in self.subscriptions.rooms() {
                if let Err(e) = self.open_room(&room_id) {
                    warn!(%room_id, error = %e, "Failed to re-open room");
                }
            }
        }
    }

    fn on_login_rejected(&mut self, message: String) {
        warn!(error = %message, "Login rejected");

        self.session.set_token(None);
        if let Some(cache) = &self.cache
            && let Err(e) = cache.clear_token()
        {
            warn!(error = %e, "Failed to clear cached token");
        }

        self.set_state(ConnectionState::Failed);
        self.events.push(ClientEvent::AuthenticationFailed { message });
        self.events.push(ClientEvent::AuthenticationRequired);
    }
}

// ============================================================================
// Rooms and Messages
// ============================================================================

impl<T: Transport> ChatClient<T> {
    /// Requests the room list.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] / [`Error::NotReady`] outside `Ready`
    /// - Transport errors
    pub fn fetch_rooms(&mut self) -> Result<CallId> {
        self.ensure_ready()?;
        self.call(
            RequestKind::ListRooms,
            MethodCall::GetRooms {
                since: Timestamp::EPOCH,
            },
        )
    }

    /// Starts the open sequence for a room.
    ///
    /// Opening an already open room runs the sequence again; the new
    /// subscription replaces the old one.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidRoom`] if `room_id` is empty
    /// - [`Error::NotConnected`] / [`Error::NotReady`] outside `Ready`
    pub fn open_room(&mut self, room_id: &RoomId) -> Result<CallId> {
        if room_id.is_empty() {
            return Err(Error::invalid_room(room_id.clone()));
        }
        self.ensure_ready()?;

        let id = self.call(
            RequestKind::OpenRoom(room_id.clone()),
            MethodCall::OpenRoom {
                room_id: room_id.clone(),
            },
        )?;
        self.subscriptions.begin(room_id);

        for evicted in self.subscriptions.overflow() {
            debug!(room_id = %evicted, "Closing least recently opened room");
            if let Err(e) = self.close_room(&evicted) {
                warn!(room_id = %evicted, error = %e, "Failed to close room");
            }
        }
        Ok(id)
    }

    /// Ends a room's live feed and forgets it.
    ///
    /// The room's message log is kept.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRoom`] if the room is empty or not open.
    pub fn close_room(&mut self, room_id: &RoomId) -> Result<()> {
        let Some(subscription) = self.subscriptions.remove(room_id) else {
            return Err(Error::invalid_room(room_id.clone()));
        };

        if subscription.active
            && let Some(id) = subscription.call_id
        {
            self.correlator.cancel(&id);
            if let Err(e) = self.send_frame(&ClientFrame::Unsub { id }) {
                debug!(%room_id, error = %e, "Unsubscribe not sent");
            }
        }

        debug!(%room_id, "Room closed");
        self.events.push(ClientEvent::SubscriptionClosed {
            room_id: room_id.clone(),
        });
        Ok(())
    }

    /// Posts a message to a room.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidRoom`] if `room_id` is empty
    /// - [`Error::InvalidArgument`] if `text` is blank
    /// - [`Error::NotConnected`] / [`Error::NotReady`] outside `Ready`
    pub fn send_message(&mut self, room_id: &RoomId, text: impl Into<String>) -> Result<CallId> {
        if room_id.is_empty() {
            return Err(Error::invalid_room(room_id.clone()));
        }
        let text = text.into();
        if text.trim().is_empty() {
            return Err(Error::invalid_argument("Message text must not be blank"));
        }
        self.ensure_ready()?;

        self.call(
            RequestKind::SendMessage(room_id.clone()),
            MethodCall::SendMessage {
                room_id: room_id.clone(),
                text,
            },
        )
    }

    fn on_rooms(&mut self, result: Value) {
        let rooms = match serde_json::from_value::<RoomsResult>(result) {
            Ok(rooms) => rooms.into_rooms(),
            Err(e) => {
                warn!(error = %e, "Malformed room list");
                self.events.push(ClientEvent::CallFailed {
                    kind: RequestKind::ListRooms,
                    message: e.to_string(),
                });
                return;
            }
        };

        let count = self.rooms.replace(rooms.into_iter().map(Room::from));
        if let Some(cache) = &self.cache
            && let Err(e) = cache.store_rooms(&self.rooms.rooms())
        {
            warn!(error = %e, "Failed to cache rooms");
        }
        self.events.push(ClientEvent::RoomsUpdated { count });
    }

    fn on_room_opened(&mut self, room_id: RoomId) {
        if !self.subscriptions.history_requested(&room_id) {
            debug!(%room_id, "Open acknowledged for a room no longer open");
            return;
        }

        let call = MethodCall::LoadHistory {
            room_id: room_id.clone(),
            before: None,
            limit: self.options.history_limit,
            last_update: Timestamp::EPOCH,
        };
        if let Err(e) = self.call(RequestKind::LoadHistory(room_id.clone()), call) {
            warn!(%room_id, error = %e, "Failed to request history");
        }
    }

    fn on_history(&mut self, room_id: RoomId, result: Value) {
        let batch = if result.is_null() {
            Vec::new()
        } else {
            match serde_json::from_value::<HistoryResult>(result) {
                Ok(history) => history.messages,
                Err(e) => {
                    warn!(%room_id, error = %e, "Malformed history result");
                    self.subscriptions.deactivate(&room_id);
                    self.events.push(ClientEvent::CallFailed {
                        kind: RequestKind::LoadHistory(room_id),
                        message: e.to_string(),
                    });
                    return;
                }
            }
        };

        let messages = batch
            .into_iter()
            .map(|wire| Message::from_wire(&room_id, wire))
            .collect();
        match self.messages.load_initial(&room_id, messages) {
            Ok(count) => self.events.push(ClientEvent::HistoryLoaded {
                room_id: room_id.clone(),
                count,
            }),
            Err(e) => {
                warn!(%room_id, error = %e, "Failed to store history");
                return;
            }
        }

        if self.subscriptions.get(&room_id).is_none() {
            debug!(%room_id, "Room closed before its history arrived");
            return;
        }
        self.subscribe(&room_id);
    }

    fn subscribe(&mut self, room_id: &RoomId) {
        let id = self
            .correlator
            .issue(RequestKind::Subscribe(room_id.clone()));
        if let Err(e) = self.send_frame(&ClientFrame::subscribe_room(id.clone(), room_id)) {
            self.correlator.cancel(&id);
            warn!(%room_id, error = %e, "Failed to subscribe");
            return;
        }

        if let Some(previous) = self.subscriptions.activate(room_id, id) {
            debug!(%room_id, %previous, "Replacing earlier subscription");
            self.correlator.cancel(&previous);
            if let Err(e) = self.send_frame(&ClientFrame::Unsub { id: previous }) {
                warn!(%room_id, error = %e, "Failed to unsubscribe");
            }
        }

        self.events.push(ClientEvent::SubscriptionActive {
            room_id: room_id.clone(),
        });
    }

    fn on_message_sent(&mut self, room_id: RoomId, result: Value) {
        match serde_json::from_value::<WireMessage>(result) {
            Ok(wire) if wire.id.is_some() => self.merge_live(&room_id, wire),
            Ok(_) => trace!(%room_id, "Send acknowledged without message echo"),
            Err(e) => debug!(%room_id, error = %e, "Send acknowledged without message echo"),
        }
    }

    fn merge_live(&mut self, room_id: &RoomId, wire: WireMessage) {
        let message = Message::from_wire(room_id, wire);
        match self.messages.append_live(room_id, message.clone()) {
            Ok(true) => self.events.push(ClientEvent::MessageReceived {
                room_id: room_id.clone(),
                message,
            }),
            Ok(false) => trace!(%room_id, message_id = %message.id, "Duplicate message ignored"),
            Err(e) => warn!(error = %e, "Dropping live message"),
        }
    }
}

// ============================================================================
// Frame Dispatch
// ============================================================================

impl<T: Transport> ChatClient<T> {
    fn handle_frame(&mut self, frame: ServerFrame) {
        match frame {
            ServerFrame::Ping { id } => self.answer_ping(id),
            ServerFrame::Pong { .. } => trace!("Pong received"),
            ServerFrame::Connected { session } => {
                debug!(session = ?session, "Handshake accepted");
                self.session.set_server_session(session);
            }
            ServerFrame::Failed { version } => self.on_version_rejected(version),
            ServerFrame::Result { id, result, error } => self.on_result(&id, result, error),
            ServerFrame::Updated { methods } => self.on_updated(methods),
            ServerFrame::Ready { subs } => self.on_subscriptions_ready(subs),
            ServerFrame::Nosub { id, error } => self.on_nosub(&id, error),
            frame @ ServerFrame::Changed { .. } => self.on_changed(&frame),
            ServerFrame::Error { reason } => {
                warn!(
                    reason = reason.as_deref().unwrap_or("unspecified"),
                    "Server reported a protocol error"
                );
            }
            ServerFrame::Unknown => debug!("Ignoring unhandled frame"),
        }
    }

    fn answer_ping(&self, id: Option<String>) {
        if let Err(e) = self.send_raw(&ClientFrame::pong(id)) {
            warn!(error = %e, "Failed to answer ping");
        }
    }

    fn on_version_rejected(&mut self, version: Option<String>) {
        warn!(proposed = ?version, "Server rejected the protocol version");
        if let Some(transport) = self.transport.take() {
            transport.close();
        }
        self.set_state(ConnectionState::Failed);
    }

    fn on_result(&mut self, id: &CallId, result: Option<Value>, error: Option<MethodError>) {
        let Ok(request) = self.correlator.resolve(id) else {
            return;
        };

        if let Some(error) = error {
            self.on_call_failed(request, &error);
            return;
        }

        let result = result.unwrap_or(Value::Null);
        match request.kind {
            RequestKind::Login => self.on_login(result),
            RequestKind::ListRooms => self.on_rooms(result),
            RequestKind::OpenRoom(room_id) => self.on_room_opened(room_id),
            RequestKind::LoadHistory(room_id) => self.on_history(room_id, result),
            RequestKind::SendMessage(room_id) => self.on_message_sent(room_id, result),
            RequestKind::Subscribe(room_id) => trace!(%room_id, "Subscription result"),
        }
    }

    fn on_call_failed(&mut self, request: PendingRequest, error: &MethodError) {
        let message = error.describe();
        if request.kind == RequestKind::Login {
            self.on_login_rejected(message);
            return;
        }

        warn!(id = %request.id, call = request.kind.label(), error = %message, "Call failed");
        if let RequestKind::OpenRoom(room_id)
        | RequestKind::LoadHistory(room_id)
        | RequestKind::Subscribe(room_id) = &request.kind
        {
            self.subscriptions.deactivate(room_id);
        }
        self.events.push(ClientEvent::CallFailed {
            kind: request.kind,
            message,
        });
    }

    fn on_updated(&mut self, methods: Vec<CallId>) {
        for id in methods {
            if !matches!(self.correlator.kind_of(&id), Some(RequestKind::OpenRoom(_))) {
                trace!(%id, "Call side effects applied");
                continue;
            }
            if let Some(PendingRequest {
                kind: RequestKind::OpenRoom(room_id),
                ..
            }) = self.correlator.cancel(&id)
            {
                self.on_room_opened(room_id);
            }
        }
    }

    fn on_subscriptions_ready(&mut self, subs: Vec<CallId>) {
        for id in subs {
            match self.correlator.kind_of(&id) {
                Some(RequestKind::Subscribe(room_id)) => {
                    debug!(%room_id, "Subscription ready");
                    self.correlator.cancel(&id);
                }
                _ => debug!(%id, "Ready for an untracked subscription"),
            }
        }
    }

    fn on_nosub(&mut self, id: &CallId, error: Option<MethodError>) {
        let room_id = match self.correlator.cancel(id) {
            Some(PendingRequest {
                kind: RequestKind::Subscribe(room_id),
                ..
            }) => Some(room_id),
            _ => self.subscriptions.room_for_call(id),
        };
        let Some(room_id) = room_id else {
            debug!(%id, "Subscription end for an untracked subscription");
            return;
        };

        let current = self
            .subscriptions
            .get(&room_id)
            .and_then(|subscription| subscription.call_id.as_ref())
            == Some(id);
        if !current {
            debug!(%room_id, %id, "Superseded subscription ended");
            return;
        }

        match error {
            Some(error) => warn!(%room_id, error = %error.describe(), "Subscription refused"),
            None => debug!(%room_id, "Subscription ended by server"),
        }
        self.subscriptions.deactivate(&room_id);
        self.events.push(ClientEvent::SubscriptionClosed { room_id });
    }

    fn on_changed(&mut self, frame: &ServerFrame) {
        let Some(event) = frame.stream_event() else {
            trace!("Ignoring change outside the room message stream");
            return;
        };

        let room_id = RoomId::new(event.event_name);
        let Some(payload) = event.args.into_iter().next() else {
            debug!(%room_id, "Stream event without payload");
            return;
        };

        match serde_json::from_value::<WireMessage>(payload) {
            Ok(wire) => self.merge_live(&room_id, wire),
            Err(e) => warn!(%room_id, error = %e, "Malformed stream message"),
        }
    }
}

// ============================================================================
// Sending
// ============================================================================

impl<T: Transport> ChatClient<T> {
    /// Issues a call and sends it. The call is forgotten if sending fails.
    fn call(&mut self, kind: RequestKind, method: MethodCall) -> Result<CallId> {
        let id = self.correlator.issue(kind);
        if let Err(e) = self.send_frame(&method.into_frame(id.clone())) {
            self.correlator.cancel(&id);
            return Err(e);
        }
        Ok(id)
    }

    fn send_frame(&self, frame: &ClientFrame) -> Result<()> {
        if !self.session.state().can_send() {
            return Err(Error::NotConnected);
        }
        self.send_raw(frame)
    }

    /// Sends regardless of state, as long as a transport is attached.
    fn send_raw(&self, frame: &ClientFrame) -> Result<()> {
        let transport = self.transport.as_ref().ok_or(Error::NotConnected)?;
        transport.send(frame.to_json()?)
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.session.state() {
            ConnectionState::Ready => Ok(()),
            ConnectionState::Disconnected | ConnectionState::Connecting => {
                Err(Error::NotConnected)
            }
            state => Err(Error::not_ready(state)),
        }
    }

    fn set_state(&mut self, next: ConnectionState) {
        if self.session.transition(next) {
            self.events.push(ClientEvent::StateChanged(next));
        }
    }

    fn store_token(&self, token: &str) {
        if let Some(cache) = &self.cache
            && let Err(e) = cache.store_token(token)
        {
            warn!(error = %e, "Failed to cache auth token");
        }
    }
}

// ============================================================================
// Accessors
// ============================================================================

impl<T: Transport> ChatClient<T> {
    /// Returns the connection state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    /// Returns the session.
    #[inline]
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Returns the room snapshot, most recently active first.
    #[must_use]
    pub fn rooms(&self) -> Vec<Room> {
        self.rooms.rooms()
    }

    /// Returns the room directory.
    #[inline]
    #[must_use]
    pub fn room_directory(&self) -> &RoomDirectory {
        &self.rooms
    }

    /// Returns a snapshot of a room's messages in timestamp order.
    #[must_use]
    pub fn messages(&self, room_id: &RoomId) -> Vec<Message> {
        self.messages.get(room_id)
    }

    /// Returns the message store.
    #[inline]
    #[must_use]
    pub fn message_store(&self) -> &MessageStore {
        &self.messages
    }

    /// Returns the subscription manager.
    #[inline]
    #[must_use]
    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    /// Returns `true` if the room's live feed is active.
    #[inline]
    #[must_use]
    pub fn is_subscribed(&self, room_id: &RoomId) -> bool {
        self.subscriptions.is_active(room_id)
    }

    /// Returns the number of calls awaiting a response.
    #[inline]
    #[must_use]
    pub fn pending_calls(&self) -> usize {
        self.correlator.len()
    }

    /// Returns the attached transport.
    #[inline]
    #[must_use]
    pub fn transport(&self) -> Option<&T> {
        self.transport.as_ref()
    }

    /// Drains the queued events.
    pub fn take_events(&mut self) -> Vec<ClientEvent> {
        std::mem::take(&mut self.events)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::cache::MemoryCache;
    use crate::transport::testing::RecordingTransport;

    fn frame(value: Value) -> TransportEvent {
        TransportEvent::Message(serde_json::from_value(value).expect("valid server frame"))
    }

    fn room(id: &str) -> RoomId {
        RoomId::new(id)
    }

    fn connected_client(
        mut client: ChatClient<RecordingTransport>,
    ) -> (ChatClient<RecordingTransport>, RecordingTransport) {
        let transport = RecordingTransport::new();
        client.open(transport.clone()).expect("open");
        client.handle_event(TransportEvent::Opened);
        (client, transport)
    }

    fn ready_client_with(
        options: ClientOptions,
    ) -> (ChatClient<RecordingTransport>, RecordingTransport) {
        let (mut client, transport) =
            connected_client(ChatClient::new(options).with_token("tok"));
        client.handle_event(frame(json!({
            "msg": "result", "id": "login", "result": {"id": "u1", "token": "tok"}
        })));
        transport.take();
        client.take_events();
        (client, transport)
    }

    fn ready_client() -> (ChatClient<RecordingTransport>, RecordingTransport) {
        ready_client_with(ClientOptions::new())
    }

    fn history(messages: Value) -> Value {
        json!({ "messages": messages })
    }

    fn wire_message(id: &str, text: &str, ts: i64) -> Value {
        json!({"_id": id, "rid": "R1", "msg": text, "u": {"username": "ann"}, "ts": {"$date": ts}})
    }

    /// Drives `R1` through open, history and subscribe.
    fn open_r1(client: &mut ChatClient<RecordingTransport>, transport: &RecordingTransport) {
        client.open_room(&room("R1")).expect("open room");
        client.handle_event(frame(json!({"msg": "result", "id": "room_R1"})));
        client.handle_event(frame(json!({
            "msg": "result", "id": "messages_R1", "result": history(json!([]))
        })));
        transport.take();
        client.take_events();
    }

    // ------------------------------------------------------------------------
    // Handshake and login
    // ------------------------------------------------------------------------

    #[test]
    fn test_open_sends_handshake_then_login() {
        let (client, transport) =
            connected_client(ChatClient::new(ClientOptions::new()).with_token("tok"));

        assert_eq!(
            transport.take(),
            vec![
                json!({"msg": "connect", "version": "1", "support": ["1", "pre2", "pre1"]}),
                json!({"msg": "method", "id": "login", "method": "login", "params": [{"resume": "tok"}]}),
            ]
        );
        assert_eq!(client.state(), ConnectionState::Authenticating);
    }

    #[test]
    fn test_login_success_reaches_ready_and_fetches_rooms() {
        let cache = Arc::new(MemoryCache::new());
        let (mut client, transport) = connected_client(
            ChatClient::new(ClientOptions::new())
                .with_token("tok")
                .with_cache(cache.clone()),
        );
        transport.take();

        client.handle_event(frame(json!({
            "msg": "result", "id": "login", "result": {"id": "u1", "token": "fresh"}
        })));

        assert_eq!(client.state(), ConnectionState::Ready);
        assert_eq!(client.session().auth_token(), Some("fresh"));
        assert_eq!(cache.load_token().as_deref(), Some("fresh"));
        assert_eq!(
            transport.take(),
            vec![json!({"msg": "method", "id": "rooms", "method": "rooms/get", "params": [{"$date": 0}]})]
        );
        assert!(client.take_events().contains(&ClientEvent::Ready));
    }

    #[test]
    fn test_missing_token_requires_authentication() {
        let (mut client, transport) = connected_client(ChatClient::new(ClientOptions::new()));

        assert_eq!(client.state(), ConnectionState::Connected);
        assert!(client.take_events().contains(&ClientEvent::AuthenticationRequired));
        assert_eq!(transport.take().len(), 1);

        client.authenticate("issued").expect("authenticate");
        assert_eq!(client.state(), ConnectionState::Authenticating);
        assert_eq!(
            transport.take(),
            vec![json!({"msg": "method", "id": "login", "method": "login", "params": [{"resume": "issued"}]})]
        );
    }

    #[test]
    fn test_login_rejection_is_terminal() {
        let cache = Arc::new(MemoryCache::with_token("stale"));
        let (mut client, _transport) =
            connected_client(ChatClient::new(ClientOptions::new()).with_cache(cache.clone()));
        client.take_events();

        client.handle_event(frame(json!({
            "msg": "result", "id": "login", "error": {"error": 403, "reason": "Token expired"}
        })));

        assert_eq!(client.state(), ConnectionState::Failed);
        assert_eq!(client.session().auth_token(), None);
        assert_eq!(cache.load_token(), None);

        let events = client.take_events();
        assert!(events.contains(&ClientEvent::AuthenticationFailed {
            message: "Token expired".into()
        }));
        assert!(events.contains(&ClientEvent::AuthenticationRequired));

        assert!(matches!(
            client.fetch_rooms(),
            Err(Error::NotReady {
                state: ConnectionState::Failed
            })
        ));
    }

    #[test]
    fn test_authenticate_after_rejection_retries_on_same_connection() {
        let (mut client, transport) =
            connected_client(ChatClient::new(ClientOptions::new()).with_token("stale"));
        client.handle_event(frame(json!({
            "msg": "result", "id": "login", "error": {"error": 403}
        })));
        transport.take();

        client.authenticate("fresh").expect("authenticate");
        assert_eq!(client.state(), ConnectionState::Authenticating);

        let sent = transport.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["params"], json!([{"resume": "fresh"}]));
    }

    #[test]
    fn test_empty_token_rejected() {
        let mut client: ChatClient<RecordingTransport> = ChatClient::new(ClientOptions::new());
        assert!(matches!(
            client.authenticate(""),
            Err(Error::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_version_rejection_fails_session() {
        let (mut client, transport) =
            connected_client(ChatClient::new(ClientOptions::new()).with_token("tok"));
        client.handle_event(frame(json!({"msg": "failed", "version": "2"})));

        assert_eq!(client.state(), ConnectionState::Failed);
        assert!(transport.is_closed());

        client.handle_event(TransportEvent::Closed(CloseReason::Normal));
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_open_twice_is_rejected() {
        let (mut client, _transport) = connected_client(ChatClient::new(ClientOptions::new()));
        assert!(matches!(
            client.open(RecordingTransport::new()),
            Err(Error::Protocol { .. })
        ));
    }

    #[test]
    fn test_connected_frame_records_server_session() {
        let (mut client, _transport) = connected_client(ChatClient::new(ClientOptions::new()));
        client.handle_event(frame(json!({"msg": "connected", "session": "abc"})));
        assert_eq!(client.session().server_session(), Some("abc"));
    }

    // ------------------------------------------------------------------------
    // Heartbeat
    // ------------------------------------------------------------------------

    #[test]
    fn test_ping_answered_with_bare_pong_in_any_state() {
        let (mut client, transport) = connected_client(ChatClient::new(ClientOptions::new()));
        transport.take();

        client.handle_event(frame(json!({"msg": "ping"})));
        assert_eq!(transport.take_raw(), vec![r#"{"msg":"pong"}"#.to_string()]);

        let (mut ready, transport) = ready_client();
        ready.handle_event(frame(json!({"msg": "ping"})));
        assert_eq!(transport.take_raw(), vec![r#"{"msg":"pong"}"#.to_string()]);
    }

    #[test]
    fn test_ping_id_is_echoed() {
        let (mut client, transport) = ready_client();
        client.handle_event(frame(json!({"msg": "ping", "id": "p1"})));
        assert_eq!(transport.take(), vec![json!({"msg": "pong", "id": "p1"})]);
    }

    // ------------------------------------------------------------------------
    // Readiness gating
    // ------------------------------------------------------------------------

    #[test]
    fn test_operations_before_ready_fail() {
        let mut client: ChatClient<RecordingTransport> = ChatClient::new(ClientOptions::new());
        assert!(matches!(client.fetch_rooms(), Err(Error::NotConnected)));

        let (mut client, _transport) = connected_client(ChatClient::new(ClientOptions::new()));
        assert!(matches!(
            client.open_room(&room("R1")),
            Err(Error::NotReady {
                state: ConnectionState::Connected
            })
        ));
    }

    #[test]
    fn test_empty_room_is_invalid() {
        let (mut client, transport) = ready_client();
        assert!(matches!(
            client.open_room(&room("")),
            Err(Error::InvalidRoom { .. })
        ));
        assert!(matches!(
            client.send_message(&room(""), "hi"),
            Err(Error::InvalidRoom { .. })
        ));
        assert!(transport.take().is_empty());
    }

    // ------------------------------------------------------------------------
    // Rooms
    // ------------------------------------------------------------------------

    #[test]
    fn test_rooms_result_replaces_snapshot() {
        let cache = Arc::new(MemoryCache::new());
        let (mut client, _transport) = connected_client(
            ChatClient::new(ClientOptions::new())
                .with_token("tok")
                .with_cache(cache.clone()),
        );
        client.handle_event(frame(json!({"msg": "result", "id": "login", "result": {}})));

        client.handle_event(frame(json!({
            "msg": "result", "id": "rooms",
            "result": {"update": [
                {"_id": "A", "name": "alpha", "lm": {"$date": 10}},
                {"_id": "B", "fname": "Bob Smith", "_updatedAt": {"$date": 20}}
            ], "remove": []}
        })));

        let names: Vec<String> = client.rooms().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["Bob Smith", "alpha"]);
        assert_eq!(cache.load_rooms().map(|rooms| rooms.len()), Some(2));
        assert!(client.take_events().contains(&ClientEvent::RoomsUpdated { count: 2 }));
    }

    #[test]
    fn test_cache_seeds_token_and_rooms() {
        let cache = Arc::new(MemoryCache::with_token("cached"));
        cache
            .store_rooms(&[Room {
                id: room("A"),
                name: "alpha".into(),
                last_activity: Timestamp::EPOCH,
            }])
            .expect("store");

        let client: ChatClient<RecordingTransport> =
            ChatClient::new(ClientOptions::new()).with_cache(cache);
        assert_eq!(client.session().auth_token(), Some("cached"));
        assert_eq!(client.rooms().len(), 1);
        assert!(!client.room_directory().is_fetched());
    }

    #[test]
    fn test_explicit_token_wins_over_cache() {
        let client: ChatClient<RecordingTransport> = ChatClient::new(ClientOptions::new())
            .with_token("explicit")
            .with_cache(Arc::new(MemoryCache::with_token("cached")));
        assert_eq!(client.session().auth_token(), Some("explicit"));
    }

    // ------------------------------------------------------------------------
    // Room open sequence
    // ------------------------------------------------------------------------

    #[test]
    fn test_open_room_sequence() {
        let (mut client, transport) = ready_client();

        let id = client.open_room(&room("R1")).expect("open room");
        assert_eq!(id.as_str(), "room_R1");
        assert_eq!(
            transport.take(),
            vec![json!({"msg": "method", "id": "room_R1", "method": "openRoom", "params": ["R1"]})]
        );

        client.handle_event(frame(json!({"msg": "result", "id": "room_R1"})));
        assert_eq!(
            transport.take(),
            vec![json!({
                "msg": "method", "id": "messages_R1", "method": "loadHistory",
                "params": ["R1", null, 10, {"$date": 0}]
            })]
        );

        client.handle_event(frame(json!({
            "msg": "result", "id": "messages_R1",
            "result": history(json!([wire_message("m2", "second", 2000), wire_message("m1", "first", 1000)]))
        })));
        assert_eq!(
            transport.take(),
            vec![json!({
                "msg": "sub", "id": "sub_R1", "name": "stream-room-messages",
                "params": ["R1", {"useCollection": false, "args": []}]
            })]
        );
        assert!(client.is_subscribed(&room("R1")));

        let texts: Vec<String> = client.messages(&room("R1")).into_iter().map(|m| m.text).collect();
        assert_eq!(texts, vec!["first", "second"]);

        let events = client.take_events();
        assert!(events.contains(&ClientEvent::HistoryLoaded {
            room_id: room("R1"),
            count: 2
        }));
        assert!(events.contains(&ClientEvent::SubscriptionActive { room_id: room("R1") }));

        client.handle_event(frame(json!({"msg": "ready", "subs": ["sub_R1"]})));
        assert_eq!(client.pending_calls(), 1);
    }

    #[test]
    fn test_updated_frame_acknowledges_open_room() {
        let (mut client, transport) = ready_client();
        client.open_room(&room("R1")).expect("open room");
        transport.take();

        client.handle_event(frame(json!({"msg": "updated", "methods": ["room_R1"]})));
        let sent = transport.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["method"], "loadHistory");
    }

    #[test]
    fn test_history_limit_is_configurable() {
        let (mut client, transport) =
            ready_client_with(ClientOptions::new().with_history_limit(25));
        client.open_room(&room("R1")).expect("open room");
        client.handle_event(frame(json!({"msg": "result", "id": "room_R1"})));

        let sent = transport.take();
        assert_eq!(sent[1]["params"][2], 25);
    }

    #[test]
    fn test_opening_room_twice_uses_distinct_ids() {
        let (mut client, transport) = ready_client();

        let first = client.open_room(&room("R1")).expect("first open");
        let second = client.open_room(&room("R1")).expect("second open");
        assert_ne!(first, second);
        assert_eq!(second.as_str(), "room_R1#1");
        transport.take();

        client.handle_event(frame(json!({"msg": "result", "id": "room_R1"})));
        client.handle_event(frame(json!({"msg": "result", "id": "room_R1#1"})));
        let history_ids: Vec<Value> = transport
            .take()
            .into_iter()
            .map(|f| f["id"].clone())
            .collect();
        assert_eq!(history_ids, vec![json!("messages_R1"), json!("messages_R1#1")]);

        client.handle_event(frame(json!({
            "msg": "result", "id": "messages_R1", "result": history(json!([]))
        })));
        client.handle_event(frame(json!({
            "msg": "result", "id": "messages_R1#1", "result": history(json!([]))
        })));

        let sent = transport.take();
        assert_eq!(sent[0]["id"], "sub_R1");
        assert_eq!(sent[1]["id"], "sub_R1#1");
        assert_eq!(sent[2], json!({"msg": "unsub", "id": "sub_R1"}));
        assert_eq!(client.subscriptions().len(), 1);
        assert!(client.is_subscribed(&room("R1")));
    }

    #[test]
    fn test_live_message_before_history_is_kept() {
        let (mut client, _transport) = ready_client();
        client.open_room(&room("R1")).expect("open room");
        client.handle_event(frame(json!({"msg": "result", "id": "room_R1"})));

        client.handle_event(frame(json!({
            "msg": "changed", "collection": "stream-room-messages", "id": "id",
            "fields": {"eventName": "R1", "args": [wire_message("live", "early bird", 5000)]}
        })));
        client.handle_event(frame(json!({
            "msg": "result", "id": "messages_R1",
            "result": history(json!([wire_message("m1", "old", 1000)]))
        })));

        let ids: Vec<String> = client
            .messages(&room("R1"))
            .into_iter()
            .map(|m| m.id.to_string())
            .collect();
        assert_eq!(ids, vec!["m1", "live"]);
    }

    #[test]
    fn test_malformed_history_entry_does_not_block_room() {
        let (mut client, transport) = ready_client();
        client.open_room(&room("R1")).expect("open room");
        client.handle_event(frame(json!({"msg": "result", "id": "room_R1"})));
        transport.take();

        client.handle_event(frame(json!({
            "msg": "result", "id": "messages_R1",
            "result": history(json!([
                wire_message("m1", "first", 1000),
                {"_id": "m2", "rid": "R1", "msg": null, "ts": "not a date"},
                wire_message("m3", "third", 3000)
            ]))
        })));

        let ids: Vec<String> = client
            .messages(&room("R1"))
            .into_iter()
            .map(|m| m.id.to_string())
            .collect();
        assert_eq!(ids, vec!["m1", "m3"]);
        assert!(client.is_subscribed(&room("R1")));
        assert_eq!(
            transport.take(),
            vec![json!({
                "msg": "sub", "id": "sub_R1", "name": "stream-room-messages",
                "params": ["R1", {"useCollection": false, "args": []}]
            })]
        );
    }

    #[test]
    fn test_stream_messages_are_merged_and_deduplicated() {
        let (mut client, transport) = ready_client();
        open_r1(&mut client, &transport);

        let changed = json!({
            "msg": "changed", "collection": "stream-room-messages", "id": "id",
            "fields": {"eventName": "R1", "args": [wire_message("m9", "hello", 9000)]}
        });
        client.handle_event(frame(changed.clone()));
        client.handle_event(frame(changed));

        assert_eq!(client.messages(&room("R1")).len(), 1);
        let received = client
            .take_events()
            .into_iter()
            .filter(|event| matches!(event, ClientEvent::MessageReceived { .. }))
            .count();
        assert_eq!(received, 1);
    }

    #[test]
    fn test_nosub_deactivates_room() {
        let (mut client, transport) = ready_client();
        open_r1(&mut client, &transport);

        client.handle_event(frame(json!({
            "msg": "nosub", "id": "sub_R1", "error": {"error": "not-allowed"}
        })));
        assert!(!client.is_subscribed(&room("R1")));
        assert!(
            client
                .take_events()
                .contains(&ClientEvent::SubscriptionClosed { room_id: room("R1") })
        );
    }

    #[test]
    fn test_close_room_unsubscribes() {
        let (mut client, transport) = ready_client();
        open_r1(&mut client, &transport);

        client.close_room(&room("R1")).expect("close room");
        assert_eq!(transport.take(), vec![json!({"msg": "unsub", "id": "sub_R1"})]);
        assert!(client.subscriptions().get(&room("R1")).is_none());

        assert!(matches!(
            client.close_room(&room("R1")),
            Err(Error::InvalidRoom { .. })
        ));
    }

    #[test]
    fn test_max_subscriptions_closes_least_recent_room() {
        let (mut client, transport) =
            ready_client_with(ClientOptions::new().with_max_subscriptions(1));
        open_r1(&mut client, &transport);

        client.open_room(&room("R2")).expect("open R2");
        let sent = transport.take();
        assert!(sent.contains(&json!({"msg": "unsub", "id": "sub_R1"})));
        assert!(client.subscriptions().get(&room("R1")).is_none());
        assert_eq!(client.subscriptions().rooms(), vec![room("R2")]);
    }

    #[test]
    fn test_open_room_error_is_reported() {
        let (mut client, _transport) = ready_client();
        client.open_room(&room("R1")).expect("open room");

        client.handle_event(frame(json!({
            "msg": "result", "id": "room_R1", "error": {"error": "error-not-allowed", "message": "Not allowed"}
        })));

        assert!(client.take_events().contains(&ClientEvent::CallFailed {
            kind: RequestKind::OpenRoom(room("R1")),
            message: "Not allowed".into()
        }));
        assert!(!client.is_subscribed(&room("R1")));
    }

    // ------------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------------

    #[test]
    fn test_send_message() {
        let (mut client, transport) = ready_client();

        assert!(matches!(
            client.send_message(&room("R1"), "   "),
            Err(Error::InvalidArgument { .. })
        ));

        let id = client.send_message(&room("R1"), "hello").expect("send");
        assert_eq!(id.as_str(), "send_R1");
        assert_eq!(
            transport.take(),
            vec![json!({
                "msg": "method", "id": "send_R1", "method": "sendMessage",
                "params": [{"rid": "R1", "msg": "hello"}]
            })]
        );

        client.handle_event(frame(json!({
            "msg": "result", "id": "send_R1", "result": wire_message("s1", "hello", 7000)
        })));
        assert_eq!(client.messages(&room("R1")).len(), 1);

        // The stream echo of the same message is a duplicate.
        client.handle_event(frame(json!({
            "msg": "changed", "collection": "stream-room-messages", "id": "id",
            "fields": {"eventName": "R1", "args": [wire_message("s1", "hello", 7000)]}
        })));
        assert_eq!(client.messages(&room("R1")).len(), 1);
    }

    // ------------------------------------------------------------------------
    // Correlation and close
    // ------------------------------------------------------------------------

    #[test]
    fn test_unsolicited_result_changes_nothing() {
        let (mut client, transport) = ready_client();
        let pending = client.pending_calls();

        client.handle_event(frame(json!({"msg": "result", "id": "43", "result": []})));

        assert_eq!(client.pending_calls(), pending);
        assert_eq!(client.state(), ConnectionState::Ready);
        assert!(transport.take().is_empty());
        assert!(client.take_events().is_empty());
    }

    #[test]
    fn test_close_invalidates_everything() {
        let (mut client, transport) = ready_client();
        open_r1(&mut client, &transport);
        client.open_room(&room("R2")).expect("open R2");

        client.handle_event(TransportEvent::Closed(CloseReason::Error("reset".into())));

        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(client.pending_calls(), 0);
        assert!(client.subscriptions().active_rooms().is_empty());
        assert!(client.take_events().contains(&ClientEvent::Disconnected {
            reason: CloseReason::Error("reset".into())
        }));

        assert!(matches!(client.fetch_rooms(), Err(Error::NotConnected)));
        assert!(matches!(client.open_room(&room("R1")), Err(Error::NotConnected)));
        assert!(matches!(
            client.send_message(&room("R1"), "hi"),
            Err(Error::NotConnected)
        ));
    }

    #[test]
    fn test_reopen_after_close_resubscribes_when_enabled() {
        let (mut client, transport) =
            ready_client_with(ClientOptions::new().with_resubscribe_on_ready(true));
        open_r1(&mut client, &transport);
        client.handle_event(TransportEvent::Closed(CloseReason::Normal));

        let (mut client, transport) = connected_client(client);
        client.handle_event(frame(json!({"msg": "result", "id": "login", "result": {}})));

        let methods: Vec<Value> = transport
            .take()
            .into_iter()
            .filter_map(|f| f.get("method").cloned())
            .collect();
        assert_eq!(
            methods,
            vec![json!("login"), json!("rooms/get"), json!("openRoom")]
        );
    }

    #[test]
    fn test_logout_forgets_everything() {
        let cache = Arc::new(MemoryCache::with_token("tok"));
        let (mut client, transport) = connected_client(
            ChatClient::new(ClientOptions::new()).with_cache(cache.clone()),
        );
        client.handle_event(frame(json!({"msg": "result", "id": "login", "result": {}})));
        open_r1(&mut client, &transport);

        client.logout();

        assert!(transport.is_closed());
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(client.session().auth_token(), None);
        assert_eq!(cache.load_token(), None);
        assert!(client.subscriptions().is_empty());
        assert!(client.message_store().room_ids().is_empty());

        client.take_events();
        client.handle_event(TransportEvent::Closed(CloseReason::Normal));
        assert!(client.take_events().is_empty());
    }

    #[test]
    fn test_expire_pending_reports_timeouts() {
        let (mut client, _transport) = ready_client();
        client.open_room(&room("R1")).expect("open room");
        let pending = client.pending_calls();
        client.take_events();

        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(client.expire_pending(Duration::ZERO), pending);
        assert_eq!(client.pending_calls(), 0);

        let events = client.take_events();
        assert!(events.contains(&ClientEvent::CallTimedOut {
            kind: RequestKind::OpenRoom(room("R1"))
        }));
    }

    #[test]
    fn test_login_timeout_closes_connection() {
        let (mut client, transport) =
            connected_client(ChatClient::new(ClientOptions::new()).with_token("tok"));

        std::thread::sleep(Duration::from_millis(2));
        client.expire_pending(Duration::ZERO);
        assert!(transport.is_closed());
    }
}
