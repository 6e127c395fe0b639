//! Secondary index from community to its people.

use crate::types::{CommunityId, PersonId};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Community membership index.
///
/// Members are kept in insertion order so repeated scans of the same
/// community return people in the same order.
#[derive(Default)]
pub struct CommunityIndex {
    members: RwLock<HashMap<CommunityId, Vec<PersonId>>>,
}

impl CommunityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, community: &CommunityId, person: &PersonId) {
        let mut members = self.members.write();
        let list = members.entry(community.clone()).or_default();
        if !list.contains(person) {
            list.push(person.clone());
        }
    }

    pub fn remove(&self, community: &CommunityId, person: &PersonId) {
        let mut members = self.members.write();
        if let Some(list) = members.get_mut(community) {
            list.retain(|p| p != person);
            if list.is_empty() {
                members.remove(community);
            }
        }
    }

    /// People registered to a community, in insertion order.
    pub fn get(&self, community: &CommunityId) -> Vec<PersonId> {
        self.members
            .read()
            .get(community)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(s: &str) -> PersonId {
        PersonId::parse(s).unwrap()
    }

    #[test]
    fn test_insertion_order_and_removal() {
        let index = CommunityIndex::new();
        let c1 = CommunityId::parse("C1").unwrap();

        index.add(&c1, &pid("P2"));
        index.add(&c1, &pid("P1"));
        index.add(&c1, &pid("P2"));
        assert_eq!(index.get(&c1), vec![pid("P2"), pid("P1")]);

        index.remove(&c1, &pid("P2"));
        assert_eq!(index.get(&c1), vec![pid("P1")]);

        index.remove(&c1, &pid("P1"));
        assert!(index.get(&c1).is_empty());
    }
}
