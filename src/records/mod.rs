//! On-disk journal and in-memory indices backing the attendance store.

mod index;
mod journal;

pub use index::CommunityIndex;
pub use journal::{Journal, JournalEntry, JournalOp};
