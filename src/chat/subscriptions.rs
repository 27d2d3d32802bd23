//! Live feed tracking.
//!
//! Opening a room walks it through `Opening → LoadingHistory → Streaming`.
//! Rooms stay subscribed when the user switches to another room; an
//! optional bound closes the least recently opened rooms once exceeded.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::identifiers::{CallId, RoomId};

// ============================================================================
// SubscriptionPhase
// ============================================================================

/// Progress of a room through the open sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionPhase {
    /// `openRoom` sent, awaiting acknowledgement.
    Opening,
    /// `loadHistory` sent, awaiting the batch.
    LoadingHistory,
    /// `sub` sent; live updates flow.
    Streaming,
    /// Feed ended (connection lost or server `nosub`).
    Closed,
}

// ============================================================================
// Subscription
// ============================================================================

/// Live feed state of one room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Room the feed belongs to.
    pub room_id: RoomId,
    /// `true` while live updates are expected.
    pub active: bool,
    /// Where the room is in the open sequence.
    pub phase: SubscriptionPhase,
    /// Id of the `sub` frame, once sent.
    pub call_id: Option<CallId>,
}

impl Subscription {
    fn opening(room_id: RoomId) -> Self {
        Self {
            room_id,
            active: false,
            phase: SubscriptionPhase::Opening,
            call_id: None,
        }
    }
}

// ============================================================================
// SubscriptionManager
// ============================================================================

/// Subscriptions of the current connection.
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    subscriptions: FxHashMap<RoomId, Subscription>,
    /// Rooms by open time, least recent first.
    open_order: VecDeque<RoomId>,
    /// Maximum number of rooms kept open; `None` for no bound.
    max_open: Option<usize>,
}

impl SubscriptionManager {
    /// Creates a manager with no bound on open rooms.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a manager keeping at most `max_open` rooms open.
    #[inline]
    #[must_use]
    pub fn with_limit(max_open: Option<usize>) -> Self {
        Self {
            max_open: max_open.map(|max| max.max(1)),
            ..Self::default()
        }
    }

    /// Starts (or restarts) the open sequence for a room.
    ///
    /// An already-active feed stays active until the new `sub` replaces it.
    pub fn begin(&mut self, room_id: &RoomId) {
        let subscription = self
            .subscriptions
            .entry(room_id.clone())
            .or_insert_with(|| Subscription::opening(room_id.clone()));
        subscription.phase = SubscriptionPhase::Opening;

        self.open_order.retain(|id| id != room_id);
        self.open_order.push_back(room_id.clone());
        debug!(%room_id, "Room open sequence started");
    }

    /// Records that the room's history is being loaded.
    ///
    /// Returns `false` if the room is not being opened.
    pub fn history_requested(&mut self, room_id: &RoomId) -> bool {
        match self.subscriptions.get_mut(room_id) {
            Some(subscription) => {
                subscription.phase = SubscriptionPhase::LoadingHistory;
                true
            }
            None => false,
        }
    }

    /// Marks the room's feed active under `call_id`.
    ///
    /// Returns the id of a feed this one supersedes, which should be
    /// unsubscribed.
    pub fn activate(&mut self, room_id: &RoomId, call_id: CallId) -> Option<CallId> {
        let subscription = self
            .subscriptions
            .entry(room_id.clone())
            .or_insert_with(|| Subscription::opening(room_id.clone()));

        let superseded = if subscription.active {
            subscription.call_id.take()
        } else {
            None
        };

        subscription.active = true;
        subscription.phase = SubscriptionPhase::Streaming;
        subscription.call_id = Some(call_id);

        debug!(%room_id, "Room feed active");
        superseded
    }

    /// Marks the room's feed inactive, keeping the entry.
    pub fn deactivate(&mut self, room_id: &RoomId) {
        if let Some(subscription) = self.subscriptions.get_mut(room_id) {
            subscription.active = false;
            subscription.phase = SubscriptionPhase::Closed;
            subscription.call_id = None;
        }
    }

    /// Forgets the room. Returns its last state.
    pub fn remove(&mut self, room_id: &RoomId) -> Option<Subscription> {
        self.open_order.retain(|id| id != room_id);
        self.subscriptions.remove(room_id)
    }

    /// Marks every feed inactive (the connection is gone).
    pub fn invalidate_all(&mut self) {
        for subscription in self.subscriptions.values_mut() {
            subscription.active = false;
            subscription.phase = SubscriptionPhase::Closed;
            subscription.call_id = None;
        }
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.subscriptions.clear();
        self.open_order.clear();
    }

    /// Returns the rooms exceeding the open bound, least recently opened first.
    #[must_use]
    pub fn overflow(&self) -> Vec<RoomId> {
        match self.max_open {
            Some(max) if self.open_order.len() > max => self
                .open_order
                .iter()
                .take(self.open_order.len() - max)
                .cloned()
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Returns the room whose feed was opened with `call_id`.
    #[must_use]
    pub fn room_for_call(&self, call_id: &CallId) -> Option<RoomId> {
        self.subscriptions
            .values()
            .find(|subscription| subscription.call_id.as_ref() == Some(call_id))
            .map(|subscription| subscription.room_id.clone())
    }

    /// Returns the room's subscription.
    #[inline]
    #[must_use]
    pub fn get(&self, room_id: &RoomId) -> Option<&Subscription> {
        self.subscriptions.get(room_id)
    }

    /// Returns `true` if the room's feed is active.
    #[inline]
    #[must_use]
    pub fn is_active(&self, room_id: &RoomId) -> bool {
        self.subscriptions
            .get(room_id)
            .is_some_and(|subscription| subscription.active)
    }

    /// Returns the rooms with an active feed, in open order.
    #[must_use]
    pub fn active_rooms(&self) -> Vec<RoomId> {
        self.open_order
            .iter()
            .filter(|id| self.is_active(id))
            .cloned()
            .collect()
    }

    /// Returns every tracked room, in open order.
    #[must_use]
    pub fn rooms(&self) -> Vec<RoomId> {
        self.open_order.iter().cloned().collect()
    }

    /// Returns the number of tracked rooms.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Returns `true` if no room is tracked.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
