//! Live query router: fans store changes out to filtered subscriptions.

use crate::error::{AttendanceError, Result};
use crate::store::{AttendanceStore, ChangeEvent, ChangeListener, ListenerId};
use crate::types::{Record, RecordKey};
use crossbeam_channel::{bounded, Sender};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

use super::types::{
    DropReason, LiveEvent, QueryFilter, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
};

/// Subscription name for all communities.
pub const COMMUNITIES: &str = "communities";

/// Subscription name for the people of one community.
pub const PEOPLE: &str = "people";

/// Internal subscription state.
struct Subscription {
    filter: QueryFilter,
    sender: Sender<LiveEvent>,
    /// Whether the initial snapshot has been delivered.
    caught_up: bool,
    /// Changes seen while the initial snapshot was being taken.
    pending: Vec<ChangeEvent>,
    /// Currently matching records and the revision last delivered for each.
    members: HashMap<RecordKey, u64>,
    /// A send failed; the subscription is waiting to be removed.
    dropped: bool,
}

impl Subscription {
    /// Try to send an event. Returns false if the buffer is full or the receiver is gone.
    fn try_send(&self, event: LiveEvent) -> std::result::Result<(), DropReason> {
        match self.sender.try_send(event) {
            Ok(()) => Ok(()),
            Err(crossbeam_channel::TrySendError::Full(_)) => Err(DropReason::BufferOverflow),
            Err(crossbeam_channel::TrySendError::Disconnected(_)) => {
                Err(DropReason::Disconnected)
            }
        }
    }

    fn is_relevant(&self, event: &ChangeEvent) -> bool {
        event.before.iter().chain(event.after.iter()).any(|r| self.filter.matches(r))
    }

    /// Turn a store change into the delta this subscriber should see.
    ///
    /// Membership mirrors whether the previous value matched, so the three
    /// cases are enter (add), exit (remove) and continued match (change).
    fn delta_for(&mut self, event: &ChangeEvent) -> Option<LiveEvent> {
        if let Some(&seen) = self.members.get(&event.key) {
            if event.revision <= seen {
                return None;
            }
        }

        let was_member = self.members.contains_key(&event.key);
        let now_matching = event.after.as_ref().filter(|r| self.filter.matches(r));

        match (was_member, now_matching) {
            (false, Some(record)) => {
                self.members.insert(event.key.clone(), event.revision);
                Some(LiveEvent::Added {
                    record: record.clone(),
                })
            }
            (true, Some(record)) => {
                self.members.insert(event.key.clone(), event.revision);
                Some(LiveEvent::Changed {
                    record: record.clone(),
                })
            }
            (true, None) => {
                self.members.remove(&event.key);
                Some(LiveEvent::Removed {
                    key: event.key.clone(),
                })
            }
            (false, None) => None,
        }
    }
}

/// Routes store changes to live subscriptions.
pub struct LiveQueryRouter {
    store: Arc<AttendanceStore>,
    config: SubscriptionConfig,
    /// Active subscriptions by ID. The map lock is only taken exclusively to
    /// add or remove entries; deliveries lock a single subscription.
    subscriptions: RwLock<HashMap<SubscriptionId, Mutex<Subscription>>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
    listener: Mutex<Option<ListenerId>>,
}

impl LiveQueryRouter {
    /// Create a router and register it for the store's change notifications.
    pub fn attach(store: Arc<AttendanceStore>, config: SubscriptionConfig) -> Arc<Self> {
        let router = Arc::new(Self {
            store: Arc::clone(&store),
            config,
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            listener: Mutex::new(None),
        });

        let weak: Weak<dyn ChangeListener> = Arc::downgrade(&router) as Weak<dyn ChangeListener>;
        *router.listener.lock() = Some(store.add_listener(weak));

        router
    }

    /// Live set of all communities.
    pub fn subscribe_communities(self: &Arc<Self>) -> SubscriptionHandle {
        self.open(QueryFilter::Communities)
    }

    /// Live set of the people in one community.
    ///
    /// A missing or blank id yields a subscription that is immediately ready
    /// and empty.
    pub fn subscribe_people(self: &Arc<Self>, community_id: Option<&str>) -> SubscriptionHandle {
        self.open(QueryFilter::people(community_id))
    }

    /// Subscribe by name with untyped parameters, as a remote caller would.
    pub fn subscribe(
        self: &Arc<Self>,
        name: &str,
        params: &[serde_json::Value],
    ) -> Result<SubscriptionHandle> {
        match name {
            COMMUNITIES => Ok(self.subscribe_communities()),
            PEOPLE => Ok(self.open(QueryFilter::people_from_param(params.first()))),
            other => Err(AttendanceError::InvalidArgument(format!(
                "unknown subscription: {other}"
            ))),
        }
    }

    /// Open a subscription for an arbitrary filter.
    pub fn open(self: &Arc<Self>, filter: QueryFilter) -> SubscriptionHandle {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(self.config.buffer_size.max(1));
        let handle = SubscriptionHandle {
            id,
            receiver,
            router: Arc::downgrade(self),
        };

        let empty = filter.is_empty();
        let subscription = Subscription {
            filter: filter.clone(),
            sender,
            caught_up: empty,
            pending: Vec::new(),
            members: HashMap::new(),
            dropped: false,
        };

        if empty {
            // Nothing to scan; ready with no records.
            let ready = subscription.try_send(LiveEvent::Ready {
                records: Vec::new(),
            });
            if ready.is_ok() {
                self.subscriptions.write().insert(id, Mutex::new(subscription));
            }
            debug!(subscription = id.0, "empty subscription ready");
            return handle;
        }

        // Register before scanning so no change slips between snapshot and stream.
        self.subscriptions.write().insert(id, Mutex::new(subscription));

        let snapshot = self.scan(&filter);
        self.finish_catch_up(id, snapshot);

        handle
    }

    /// Unsubscribe and clean up.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let removed = self.subscriptions.write().remove(&id);
        if let Some(sub) = removed {
            debug!(subscription = id.0, "unsubscribed");
            // Best effort
            let _ = sub.into_inner().sender.try_send(LiveEvent::Dropped {
                reason: DropReason::Unsubscribed,
            });
        }
    }

    /// Get subscription count.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// End every subscription and stop listening to the store.
    pub fn shutdown(&self) {
        if let Some(listener) = self.listener.lock().take() {
            self.store.remove_listener(listener);
        }

        let subs: Vec<_> = self.subscriptions.write().drain().collect();
        info!(subscriptions = subs.len(), "live query router shut down");
        for (_, sub) in subs {
            let _ = sub.into_inner().sender.try_send(LiveEvent::Dropped {
                reason: DropReason::Shutdown,
            });
        }
    }

    fn scan(&self, filter: &QueryFilter) -> Vec<(Record, u64)> {
        match filter {
            QueryFilter::Communities => self
                .store
                .community_snapshot()
                .into_iter()
                .map(|v| (Record::Community(v.value), v.revision))
                .collect(),
            QueryFilter::People(community) => self
                .store
                .people_snapshot(community)
                .into_iter()
                .map(|v| (Record::Person(v.value), v.revision))
                .collect(),
            QueryFilter::Empty => Vec::new(),
        }
    }

    /// Fold changes buffered during the scan into the snapshot and go live.
    fn finish_catch_up(&self, id: SubscriptionId, snapshot: Vec<(Record, u64)>) {
        let subs = self.subscriptions.read();
        let Some(sub) = subs.get(&id) else {
            return;
        };
        let mut sub = sub.lock();

        let mut records: Vec<Option<Record>> = Vec::with_capacity(snapshot.len());
        let mut positions: HashMap<RecordKey, usize> = HashMap::new();
        for (record, revision) in snapshot {
            positions.insert(record.key(), records.len());
            sub.members.insert(record.key(), revision);
            records.push(Some(record));
        }

        for event in std::mem::take(&mut sub.pending) {
            match sub.delta_for(&event) {
                Some(LiveEvent::Added { record }) => {
                    positions.insert(record.key(), records.len());
                    records.push(Some(record));
                }
                Some(LiveEvent::Changed { record }) => {
                    if let Some(&pos) = positions.get(&record.key()) {
                        records[pos] = Some(record);
                    }
                }
                Some(LiveEvent::Removed { key }) => {
                    if let Some(pos) = positions.remove(&key) {
                        records[pos] = None;
                    }
                }
                _ => {}
            }
        }

        let records: Vec<Record> = records.into_iter().flatten().collect();
        let count = records.len();
        sub.caught_up = true;

        if let Err(reason) = sub.try_send(LiveEvent::Ready { records }) {
            warn!(subscription = id.0, ?reason, "dropping subscriber before ready");
            sub.dropped = true;
            drop(sub);
            drop(subs);
            self.subscriptions.write().remove(&id);
            return;
        }

        debug!(subscription = id.0, records = count, "subscription ready");
    }
}

impl ChangeListener for LiveQueryRouter {
    fn on_change(&self, event: &ChangeEvent) {
        let mut to_remove = Vec::new();

        for (id, sub) in self.subscriptions.read().iter() {
            let mut sub = sub.lock();
            if sub.dropped {
                continue;
            }
            if !sub.caught_up {
                if sub.is_relevant(event) {
                    sub.pending.push(event.clone());
                }
                continue;
            }

            if let Some(delta) = sub.delta_for(event) {
                if let Err(reason) = sub.try_send(delta) {
                    sub.dropped = true;
                    to_remove.push((*id, reason));
                }
            }
        }

        if to_remove.is_empty() {
            return;
        }

        // Remove dropped subscriptions
        let mut subs = self.subscriptions.write();
        for (id, reason) in to_remove {
            if let Some(sub) = subs.remove(&id) {
                warn!(subscription = id.0, ?reason, "dropping subscriber");
                // Might fail, that's ok
                let _ = sub.into_inner().sender.try_send(LiveEvent::Dropped { reason });
            }
        }
    }
}
