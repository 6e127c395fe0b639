//! Live queries over the attendance store.
//!
//! A subscription follows a filtered set of records:
//! - `communities`: every community
//! - `people`: the people of one community
//!
//! The router listens to store change notifications and turns each one into
//! an add, change or remove for every subscription whose filter it touches,
//! without rescanning the store.
//!
//! # Example
//!
//! ```ignore
//! let router = LiveQueryRouter::attach(store.clone(), SubscriptionConfig::default());
//! let handle = router.subscribe_people(Some("C1"));
//!
//! let mut view = LiveSet::new();
//! loop {
//!     match handle.recv() {
//!         Ok(event @ LiveEvent::Dropped { .. }) => { view.apply(&event); break; }
//!         Ok(event) => view.apply(&event),
//!         Err(_) => break,
//!     }
//! }
//! ```

mod manager;
mod types;
mod view;

pub use manager::{LiveQueryRouter, COMMUNITIES, PEOPLE};
pub use types::{
    DropReason, LiveEvent, QueryFilter, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
};
pub use view::LiveSet;
