//! Client-side materialization of a subscription's event stream.

use super::types::{DropReason, LiveEvent, SubscriptionHandle};
use crate::types::{AttendanceState, Person, Record, RecordKey};
use std::collections::BTreeMap;

/// The current result set of one subscription, kept up to date by
/// feeding it the subscription's events.
#[derive(Clone, Debug, Default)]
pub struct LiveSet {
    records: BTreeMap<RecordKey, Record>,
    ready: bool,
    dropped: Option<DropReason>,
}

impl LiveSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: &LiveEvent) {
        match event {
            LiveEvent::Ready { records } => {
                self.records = records.iter().map(|r| (r.key(), r.clone())).collect();
                self.ready = true;
            }
            LiveEvent::Added { record } | LiveEvent::Changed { record } => {
                self.records.insert(record.key(), record.clone());
            }
            LiveEvent::Removed { key } => {
                self.records.remove(key);
            }
            LiveEvent::Dropped { reason } => {
                self.dropped = Some(*reason);
            }
        }
    }

    /// Apply every event currently queued on the handle. Returns how many were applied.
    pub fn drain(&mut self, handle: &SubscriptionHandle) -> usize {
        let mut applied = 0;
        while let Ok(event) = handle.try_recv() {
            self.apply(&event);
            applied += 1;
        }
        applied
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn dropped(&self) -> Option<DropReason> {
        self.dropped
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, key: &RecordKey) -> Option<&Record> {
        self.records.get(key)
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    pub fn people(&self) -> impl Iterator<Item = &Person> {
        self.records.values().filter_map(Record::as_person)
    }

    /// How many people in the set are in `state`.
    pub fn count_in_state(&self, state: AttendanceState) -> usize {
        self.people().filter(|p| p.state() == state).count()
    }
}
