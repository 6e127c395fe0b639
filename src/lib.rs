//! # Rollcall
//!
//! Live attendance tracking for events ("communities").
//!
//! ## Core Concepts
//!
//! - **Store**: durable keyed records for communities and people; attendance
//!   fields only change through predicate-guarded conditional updates
//! - **Transitions**: the `Unregistered -> Present -> Departed` state machine
//!   (`check_in` / `check_out`), safe under concurrent callers
//! - **Live queries**: filtered subscriptions that receive adds, changes and
//!   removals as the store is written, without polling
//!
//! ## Example
//!
//! ```ignore
//! use rollcall::{Community, CommunityId, NewPerson, PersonId, Rollcall};
//!
//! let app = Rollcall::in_memory();
//! let c1 = CommunityId::parse("C1")?;
//! app.store().insert_community(Community::new(c1.clone(), "Launch"))?;
//! app.store().insert_person(NewPerson::new(PersonId::parse("P1")?, c1, "Ana", "Lee"))?;
//!
//! let people = app.subscribe_people(Some("C1"));
//! app.check_in("P1")?;
//! // `people` now receives a Changed event carrying the new checkInDate
//! ```

pub mod clock;
pub mod error;
pub mod records;
pub mod store;
pub mod subscriptions;
pub mod transition;
pub mod types;

use std::sync::Arc;
use tracing::info;

// Re-exports
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{AttendanceError, ErrorKind, Result, StateViolation};
pub use store::{
    AttendanceStore, ChangeEvent, ChangeListener, ListenerId, StoreConfig, UpdatedCount,
    Versioned,
};
pub use subscriptions::{
    DropReason, LiveEvent, LiveQueryRouter, LiveSet, QueryFilter, SubscriptionConfig,
    SubscriptionHandle, SubscriptionId,
};
pub use transition::{ReentryPolicy, TransitionService};
pub use types::*;

/// Top-level configuration.
#[derive(Clone, Debug, Default)]
pub struct RollcallConfig {
    pub store: StoreConfig,
    pub subscriptions: SubscriptionConfig,
    pub reentry: ReentryPolicy,
}

/// Owns the store and the components built over it.
///
/// Created at process start and torn down with [`Rollcall::shutdown`].
pub struct Rollcall {
    store: Arc<AttendanceStore>,
    router: Arc<LiveQueryRouter>,
    transitions: TransitionService,
}

impl Rollcall {
    /// Open (or create) an on-disk store and wire everything up.
    pub fn open(config: RollcallConfig) -> Result<Self> {
        let store = Arc::new(AttendanceStore::open_or_create(config.store)?);
        Ok(Self::from_store(
            store,
            config.subscriptions,
            config.reentry,
            Arc::new(SystemClock),
        ))
    }

    /// An in-memory instance with default settings.
    pub fn in_memory() -> Self {
        Self::from_store(
            Arc::new(AttendanceStore::in_memory()),
            SubscriptionConfig::default(),
            ReentryPolicy::default(),
            Arc::new(SystemClock),
        )
    }

    pub fn from_store(
        store: Arc<AttendanceStore>,
        subscriptions: SubscriptionConfig,
        reentry: ReentryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let router = LiveQueryRouter::attach(Arc::clone(&store), subscriptions);
        let transitions =
            TransitionService::with_clock(Arc::clone(&store), clock).with_reentry(reentry);

        info!(path = ?store.path(), ?reentry, "rollcall started");
        Self {
            store,
            router,
            transitions,
        }
    }

    pub fn store(&self) -> &Arc<AttendanceStore> {
        &self.store
    }

    pub fn router(&self) -> &Arc<LiveQueryRouter> {
        &self.router
    }

    pub fn transitions(&self) -> &TransitionService {
        &self.transitions
    }

    pub fn check_in(&self, person_id: impl AsRef<str>) -> Result<TransitionReceipt> {
        self.transitions.check_in(person_id)
    }

    pub fn check_out(&self, person_id: impl AsRef<str>) -> Result<TransitionReceipt> {
        self.transitions.check_out(person_id)
    }

    pub fn subscribe_communities(&self) -> SubscriptionHandle {
        self.router.subscribe_communities()
    }

    pub fn subscribe_people(&self, community_id: Option<&str>) -> SubscriptionHandle {
        self.router.subscribe_people(community_id)
    }

    /// End all subscriptions and flush the store.
    pub fn shutdown(self) -> Result<()> {
        self.router.shutdown();
        self.store.sync()?;
        info!("rollcall shut down");
        Ok(())
    }
}
