//! Check-in/check-out state machine.
//!
//! A person moves `Unregistered -> Present -> Departed`. Every transition is
//! a single predicate-guarded write through
//! [`AttendanceStore::conditional_update`]; the pre-check read in
//! `check_out` only classifies errors, it never authorizes the write.

use crate::clock::{Clock, SystemClock};
use crate::error::{AttendanceError, Result, StateViolation};
use crate::store::AttendanceStore;
use crate::types::{AttendanceState, PersonId, PersonPatch, TransitionReceipt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// What `check_in` does with a person who is already present or departed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReentryPolicy {
    /// Start a fresh session: refresh `checkInDate`, clear `checkOutDate`.
    #[default]
    Overwrite,
    /// Only unregistered people may check in.
    Reject,
}

/// Performs attendance transitions over a shared store.
pub struct TransitionService {
    store: Arc<AttendanceStore>,
    clock: Arc<dyn Clock>,
    reentry: ReentryPolicy,
}

impl TransitionService {
    pub fn new(store: Arc<AttendanceStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<AttendanceStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            reentry: ReentryPolicy::default(),
        }
    }

    pub fn with_reentry(mut self, reentry: ReentryPolicy) -> Self {
        self.reentry = reentry;
        self
    }

    pub fn reentry(&self) -> ReentryPolicy {
        self.reentry
    }

    /// Mark a person present.
    pub fn check_in(&self, person_id: impl AsRef<str>) -> Result<TransitionReceipt> {
        let id = PersonId::parse(person_id)?;
        let now = self.clock.now();

        let updated = match self.reentry {
            ReentryPolicy::Overwrite => {
                self.store
                    .conditional_update(&id, |_| true, PersonPatch::check_in(now))?
            }
            ReentryPolicy::Reject => self.store.conditional_update(
                &id,
                |p| p.state() == AttendanceState::Unregistered,
                PersonPatch::check_in(now),
            )?,
        };

        if updated == 0 {
            return Err(self.classify_rejected_check_in(&id));
        }

        info!(person = %id, timestamp = now.0, "checked in");
        Ok(TransitionReceipt::at(now))
    }

    /// Mark a present person departed.
    pub fn check_out(&self, person_id: impl AsRef<str>) -> Result<TransitionReceipt> {
        let id = PersonId::parse(person_id)?;

        let current = self.store.get(&id)?;
        let checked_in = current
            .check_in_date
            .ok_or(AttendanceError::InvalidState(StateViolation::NotCheckedIn))?;
        if current.check_out_date.is_some() {
            return Err(AttendanceError::InvalidState(
                StateViolation::AlreadyCheckedOut,
            ));
        }

        // Never earlier than the check-in, even if the clock stepped back.
        let now = self.clock.now().max(checked_in);

        let updated = self.store.conditional_update(
            &id,
            |p| p.check_out_date.is_none() && p.check_in_date.is_some_and(|at| at <= now),
            PersonPatch::check_out(now),
        )?;

        if updated == 0 {
            warn!(person = %id, "check-out lost a concurrent update");
            return Err(AttendanceError::ConcurrencyConflict(id));
        }

        info!(person = %id, timestamp = now.0, "checked out");
        Ok(TransitionReceipt::at(now))
    }

    /// Clear both dates, returning the person to `Unregistered`.
    pub fn reset(&self, person_id: impl AsRef<str>) -> Result<TransitionReceipt> {
        let id = PersonId::parse(person_id)?;
        let now = self.clock.now();

        if self
            .store
            .conditional_update(&id, |_| true, PersonPatch::clear())?
            == 0
        {
            return Err(AttendanceError::PersonNotFound(id));
        }

        info!(person = %id, "attendance reset");
        Ok(TransitionReceipt::at(now))
    }

    pub fn state_of(&self, person_id: impl AsRef<str>) -> Result<AttendanceState> {
        let id = PersonId::parse(person_id)?;
        Ok(self.store.get(&id)?.state())
    }

    fn classify_rejected_check_in(&self, id: &PersonId) -> AttendanceError {
        match self.store.get(id) {
            Err(err) => err,
            Ok(person) => match person.state() {
                AttendanceState::Present => {
                    AttendanceError::InvalidState(StateViolation::AlreadyCheckedIn)
                }
                AttendanceState::Departed => {
                    AttendanceError::InvalidState(StateViolation::AlreadyCheckedOut)
                }
                // Reset between our write and this read.
                AttendanceState::Unregistered => AttendanceError::ConcurrencyConflict(id.clone()),
            },
        }
    }
}
