//! Call correlation.
//!
//! Every call and subscription the client issues is recorded here under a
//! fresh [`CallId`] together with its [`RequestKind`]. Responses are routed
//! by looking the id up, never by re-parsing it.
//!
//! Ids keep the server-visible namespace (`room_<rid>`, `messages_<rid>`,
//! ...). Reissuing the same kind within one connection appends `#<n>`.
//! An id is never handed out twice on a connection, even after its call
//! has resolved.

// ============================================================================
// Imports
// ============================================================================

use std::time::{Duration, Instant};

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{CallId, RoomId};

// ============================================================================
// RequestKind
// ============================================================================

/// What a pending call is for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// Resume login.
    Login,
    /// Room list fetch.
    ListRooms,
    /// Open-room call.
    OpenRoom(RoomId),
    /// History page load.
    LoadHistory(RoomId),
    /// Outgoing chat message.
    SendMessage(RoomId),
    /// Live feed subscription.
    Subscribe(RoomId),
}

impl RequestKind {
    /// Returns the room this call concerns, if any.
    #[must_use]
    pub fn room_id(&self) -> Option<&RoomId> {
        match self {
            Self::Login | Self::ListRooms => None,
            Self::OpenRoom(room)
            | Self::LoadHistory(room)
            | Self::SendMessage(room)
            | Self::Subscribe(room) => Some(room),
        }
    }

    /// Returns a short label for logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::ListRooms => "listRooms",
            Self::OpenRoom(_) => "openRoom",
            Self::LoadHistory(_) => "loadHistory",
            Self::SendMessage(_) => "sendMessage",
            Self::Subscribe(_) => "subscribe",
        }
    }

    /// Server-visible id prefix for this kind.
    fn base_id(&self) -> String {
        match self {
            Self::Login => "login".to_string(),
            Self::ListRooms => "rooms".to_string(),
            Self::OpenRoom(room) => format!("room_{room}"),
            Self::LoadHistory(room) => format!("messages_{room}"),
            Self::SendMessage(room) => format!("send_{room}"),
            Self::Subscribe(room) => format!("sub_{room}"),
        }
    }
}

// ============================================================================
// PendingRequest
// ============================================================================

/// A call awaiting its response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    /// Correlation id sent on the wire.
    pub id: CallId,
    /// What the call is for.
    pub kind: RequestKind,
    /// When the call was issued.
    pub created_at: Instant,
}

// ============================================================================
// Correlator
// ============================================================================

/// Pending-call table for one connection.
#[derive(Debug, Default)]
pub struct Correlator {
    /// Calls awaiting a response.
    pending: FxHashMap<CallId, PendingRequest>,
    /// How many ids each base has produced on this connection.
    issued: FxHashMap<String, u32>,
    /// Every id handed out on this connection.
    used: FxHashSet<CallId>,
}

impl Correlator {
    /// Creates an empty correlator.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a new pending call and returns its id.
    pub fn issue(&mut self, kind: RequestKind) -> CallId {
        let base = kind.base_id();
        let count = self.issued.entry(base.clone()).or_insert(0);

        let mut id = if *count == 0 {
            CallId::new(base.clone())
        } else {
            CallId::new(format!("{base}#{count}"))
        };
        *count += 1;

        while !self.used.insert(id.clone()) {
            id = CallId::new(format!("{base}#{count}"));
            *count += 1;
        }

        trace!(%id, kind = kind.label(), "Call issued");

        self.pending.insert(
            id.clone(),
            PendingRequest {
                id: id.clone(),
                kind,
                created_at: Instant::now(),
            },
        );
        id
    }

    /// Removes and returns the pending call matching `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsolicitedResponse`] if no call is pending under
    /// `id`. Nothing is mutated in that case.
    pub fn resolve(&mut self, id: &CallId) -> Result<PendingRequest> {
        match self.pending.remove(id) {
            Some(request) => {
                trace!(%id, kind = request.kind.label(), "Call resolved");
                Ok(request)
            }
            None => {
                warn!(%id, "Response for unknown call");
                Err(Error::unsolicited(id.clone()))
            }
        }
    }

    /// Removes the call pending under `id` without treating a miss as an
    /// unsolicited response.
    pub fn cancel(&mut self, id: &CallId) -> Option<PendingRequest> {
        self.pending.remove(id)
    }

    /// Returns the kind of the call pending under `id`, without removing it.
    #[inline]
    #[must_use]
    pub fn kind_of(&self, id: &CallId) -> Option<&RequestKind> {
        self.pending.get(id).map(|request| &request.kind)
    }

    /// Removes and returns every call older than `max_age`.
    pub fn expire(&mut self, max_age: Duration) -> Vec<PendingRequest> {
        self.expire_at(Instant::now(), max_age)
    }

    /// Removes and returns every call issued more than `max_age` before `now`.
    pub fn expire_at(&mut self, now: Instant, max_age: Duration) -> Vec<PendingRequest> {
        let expired_ids: Vec<CallId> = self
            .pending
            .values()
            .filter(|request| now.saturating_duration_since(request.created_at) > max_age)
            .map(|request| request.id.clone())
            .collect();

        let expired: Vec<PendingRequest> = expired_ids
            .iter()
            .filter_map(|id| self.pending.remove(id))
            .collect();

        if !expired.is_empty() {
            debug!(count = expired.len(), "Expired pending calls");
        }
        expired
    }

    /// Abandons every pending call and resets id generation.
    ///
    /// Returns the number of calls abandoned.
    pub fn clear(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        self.issued.clear();
        self.used.clear();

        if count > 0 {
            debug!(count, "Abandoned pending calls");
        }
        count
    }

    /// Returns the number of pending calls.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` if no call is pending.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
