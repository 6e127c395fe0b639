//! Subscription types for live attendance queries.

use super::manager::LiveQueryRouter;
use crate::types::{CommunityId, Record, RecordKey};
use serde::{Deserialize, Serialize};
use std::sync::Weak;

/// Configuration for subscriptions.
#[derive(Clone, Debug)]
pub struct SubscriptionConfig {
    /// Max buffered events before dropping subscriber.
    /// Default: 1000
    pub buffer_size: usize,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self { buffer_size: 1000 }
    }
}

/// Which records a subscription follows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryFilter {
    /// Every community.
    Communities,
    /// People registered to one community.
    People(CommunityId),
    /// Matches nothing; used when a filter parameter is absent or unusable.
    Empty,
}

impl QueryFilter {
    /// People filter from an optional community id.
    ///
    /// Missing or blank ids yield [`QueryFilter::Empty`] so an absent filter
    /// never exposes another community's people.
    pub fn people(community_id: Option<&str>) -> Self {
        match community_id.map(CommunityId::parse) {
            Some(Ok(id)) => QueryFilter::People(id),
            _ => QueryFilter::Empty,
        }
    }

    /// People filter from an untyped wire parameter; anything but a string is empty.
    pub fn people_from_param(param: Option<&serde_json::Value>) -> Self {
        Self::people(param.and_then(serde_json::Value::as_str))
    }

    pub fn matches(&self, record: &Record) -> bool {
        match (self, record) {
            (QueryFilter::Communities, Record::Community(_)) => true,
            (QueryFilter::People(community), Record::Person(person)) => {
                &person.community_id == community
            }
            _ => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, QueryFilter::Empty)
    }
}

/// Events delivered to a subscriber.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveEvent {
    /// Initial result set; always the first event. Deltas follow.
    Ready { records: Vec<Record> },

    /// A record started matching.
    Added { record: Record },

    /// A matching record changed and still matches.
    Changed { record: Record },

    /// A record stopped matching or was deleted.
    Removed { key: RecordKey },

    /// Subscription ended; no further events follow.
    Dropped { reason: DropReason },
}

/// Why a subscription was dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Receiver went away.
    Disconnected,
    /// Explicitly unsubscribed.
    Unsubscribed,
    /// Router shut down.
    Shutdown,
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Handle to a live subscription. Dropping it cancels the subscription.
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<LiveEvent>,
    pub(crate) router: Weak<LiveQueryRouter>,
}

impl SubscriptionHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<LiveEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<LiveEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<LiveEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Stop the subscription and release its state in the router.
    ///
    /// Same as dropping the handle; the `Drop` impl unsubscribes.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Some(router) = self.router.upgrade() {
            router.unsubscribe(self.id);
        }
    }
}
