//! The attendance store: durable keyed records for communities and people.
//!
//! The store is the only component that mutates persisted state. Attendance
//! fields change exclusively through [`AttendanceStore::conditional_update`],
//! which checks its predicate and writes under the target record's lock.
//! Every committed write is journaled and then announced to registered
//! [`ChangeListener`]s.

use crate::error::{AttendanceError, Result};
use crate::records::{CommunityIndex, Journal, JournalOp};
use crate::types::{
    Community, CommunityId, NewPerson, Person, PersonId, PersonPatch, Record, RecordKey,
};
use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info};

/// Number of records a conditional update changed (0 or 1).
pub type UpdatedCount = usize;

/// Store configuration.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Base directory for the store.
    pub path: PathBuf,

    /// Whether to create the store if it doesn't exist.
    pub create_if_missing: bool,

    /// Fsync the journal every N writes.
    pub sync_interval: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./attendance"),
            create_if_missing: true,
            sync_interval: Journal::DEFAULT_SYNC_INTERVAL,
        }
    }
}

/// Magic bytes for the store manifest.
const STORE_MAGIC: &[u8; 4] = b"RLC\0";

/// Current store format version.
const STORE_VERSION: u8 = 1;

const JOURNAL_FILE: &str = "attendance.log";

/// A committed write, as seen by listeners.
#[derive(Clone, Debug)]
pub struct ChangeEvent {
    pub key: RecordKey,
    /// Value before the write (`None` for inserts).
    pub before: Option<Record>,
    /// Value after the write (`None` for removals).
    pub after: Option<Record>,
    /// Store-wide write counter; increases with every write to a record.
    pub revision: u64,
}

/// Receives change notifications from the store.
///
/// Called synchronously while the written record is still locked, so
/// notifications for one record arrive in write order. Implementations
/// must not call back into the store.
pub trait ChangeListener: Send + Sync {
    fn on_change(&self, event: &ChangeEvent);
}

/// Handle returned by [`AttendanceStore::add_listener`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// A value together with the revision it was read at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Versioned<T> {
    pub value: T,
    pub revision: u64,
}

struct PersonSlot {
    /// `None` once the record has been removed.
    person: Option<Person>,
    revision: u64,
}

#[derive(Default)]
struct Communities {
    by_id: HashMap<CommunityId, Versioned<Community>>,
    order: Vec<CommunityId>,
}

/// The attendance record store.
pub struct AttendanceStore {
    /// Base directory, `None` for in-memory stores.
    path: Option<PathBuf>,

    /// Lock file for exclusive access.
    _lock_file: Option<File>,

    journal: Option<Journal>,

    communities: RwLock<Communities>,

    /// Each person is locked individually; the map lock only guards membership.
    people: RwLock<HashMap<PersonId, Arc<Mutex<PersonSlot>>>>,

    index: CommunityIndex,

    listeners: RwLock<Vec<(ListenerId, Weak<dyn ChangeListener>)>>,
    next_listener: AtomicU64,

    next_revision: AtomicU64,

    /// Serializes provisioning (inserts and removals).
    provision_lock: Mutex<()>,
}

impl AttendanceStore {
    /// A store that keeps everything in memory.
    pub fn in_memory() -> Self {
        Self::assemble(None, None, None)
    }

    /// Open an existing store or create a new one.
    pub fn open_or_create(config: StoreConfig) -> Result<Self> {
        if config.path.join("MANIFEST").exists() {
            Self::open(config)
        } else if config.create_if_missing {
            Self::create(config)
        } else {
            Err(AttendanceError::NotInitialized)
        }
    }

    /// Create a new store.
    pub fn create(config: StoreConfig) -> Result<Self> {
        if config.path.join("MANIFEST").exists() {
            return Err(AttendanceError::AlreadyExists(format!(
                "store at {}",
                config.path.display()
            )));
        }
        fs::create_dir_all(&config.path)?;
        Self::write_manifest(&config.path)?;

        let lock_file = Self::acquire_lock(&config.path)?;
        let (journal, _) = Journal::open(config.path.join(JOURNAL_FILE), config.sync_interval)?;

        info!(path = %config.path.display(), "created attendance store");
        Ok(Self::assemble(Some(config.path), Some(lock_file), Some(journal)))
    }

    /// Open an existing store, replaying its journal.
    pub fn open(config: StoreConfig) -> Result<Self> {
        Self::verify_manifest(&config.path)?;

        let lock_file = Self::acquire_lock(&config.path)?;
        let (journal, entries) =
            Journal::open(config.path.join(JOURNAL_FILE), config.sync_interval)?;

        let store = Self::assemble(Some(config.path), Some(lock_file), Some(journal));
        for entry in entries {
            store.apply_replayed(entry.op);
        }

        info!(
            path = ?store.path,
            communities = store.communities.read().order.len(),
            people = store.person_count(),
            "opened attendance store"
        );
        Ok(store)
    }

    fn assemble(path: Option<PathBuf>, lock_file: Option<File>, journal: Option<Journal>) -> Self {
        Self {
            path,
            _lock_file: lock_file,
            journal,
            communities: RwLock::new(Communities::default()),
            people: RwLock::new(HashMap::new()),
            index: CommunityIndex::new(),
            listeners: RwLock::new(Vec::new()),
            next_listener: AtomicU64::new(1),
            next_revision: AtomicU64::new(1),
            provision_lock: Mutex::new(()),
        }
    }

    fn apply_replayed(&self, op: JournalOp) {
        let revision = self.bump_revision();
        match op {
            JournalOp::PutCommunity(community) => {
                let mut communities = self.communities.write();
                if !communities.by_id.contains_key(&community.id) {
                    communities.order.push(community.id.clone());
                }
                communities
                    .by_id
                    .insert(community.id.clone(), Versioned { value: community, revision });
            }
            JournalOp::PutPerson(person) => {
                self.index.add(&person.community_id, &person.id);
                self.people.write().insert(
                    person.id.clone(),
                    Arc::new(Mutex::new(PersonSlot {
                        person: Some(person),
                        revision,
                    })),
                );
            }
            JournalOp::RemovePerson(id) => {
                if let Some(slot) = self.people.write().remove(&id) {
                    if let Some(person) = slot.lock().person.take() {
                        self.index.remove(&person.community_id, &person.id);
                    }
                }
            }
        }
    }

    // --- Reads ---

    /// Get a person by id.
    pub fn get(&self, id: &PersonId) -> Result<Person> {
        self.get_versioned(id)
            .map(|v| v.value)
            .ok_or_else(|| AttendanceError::PersonNotFound(id.clone()))
    }

    /// Get a person together with the revision of its last write.
    pub fn get_versioned(&self, id: &PersonId) -> Option<Versioned<Person>> {
        let slot = self.people.read().get(id).cloned()?;
        let slot = slot.lock();
        slot.person.clone().map(|value| Versioned {
            value,
            revision: slot.revision,
        })
    }

    /// People in a community, in registration order.
    pub fn find_by_community(&self, community: &CommunityId) -> Vec<Person> {
        self.people_snapshot(community)
            .into_iter()
            .map(|v| v.value)
            .collect()
    }

    /// People in a community with the revision each was read at.
    pub fn people_snapshot(&self, community: &CommunityId) -> Vec<Versioned<Person>> {
        self.index
            .get(community)
            .iter()
            .filter_map(|id| self.get_versioned(id))
            .filter(|v| &v.value.community_id == community)
            .collect()
    }

    pub fn get_community(&self, id: &CommunityId) -> Result<Community> {
        self.communities
            .read()
            .by_id
            .get(id)
            .map(|v| v.value.clone())
            .ok_or_else(|| AttendanceError::CommunityNotFound(id.clone()))
    }

    /// All communities, in creation order.
    pub fn communities(&self) -> Vec<Community> {
        self.community_snapshot()
            .into_iter()
            .map(|v| v.value)
            .collect()
    }

    pub fn community_snapshot(&self) -> Vec<Versioned<Community>> {
        let communities = self.communities.read();
        communities
            .order
            .iter()
            .filter_map(|id| communities.by_id.get(id).cloned())
            .collect()
    }

    pub fn person_count(&self) -> usize {
        self.people.read().len()
    }

    // --- Writes ---

    /// Atomically patch a person if `expected` holds for its current value.
    ///
    /// Returns 0 when the person is absent or the predicate fails, 1 when
    /// the patch was applied. Predicate check, journal append and the
    /// in-memory write all happen under the person's lock.
    pub fn conditional_update<P>(
        &self,
        id: &PersonId,
        expected: P,
        patch: PersonPatch,
    ) -> Result<UpdatedCount>
    where
        P: FnOnce(&Person) -> bool,
    {
        let slot = match self.people.read().get(id).cloned() {
            Some(slot) => slot,
            None => return Ok(0),
        };
        let mut slot = slot.lock();

        let before = match slot.person.as_ref() {
            Some(person) => person.clone(),
            None => return Ok(0),
        };
        if !expected(&before) {
            return Ok(0);
        }

        let after = before.patched(&patch);
        if !after.is_consistent() {
            return Err(AttendanceError::OrderingViolation(id.clone()));
        }

        self.persist(JournalOp::PutPerson(after.clone()))?;

        let revision = self.bump_revision();
        slot.person = Some(after.clone());
        slot.revision = revision;

        debug!(person = %id, revision, state = ?after.state(), "person updated");
        self.notify(&ChangeEvent {
            key: RecordKey::Person(id.clone()),
            before: Some(Record::Person(before)),
            after: Some(Record::Person(after)),
            revision,
        });

        Ok(1)
    }

    /// Register a new community.
    pub fn insert_community(&self, community: Community) -> Result<()> {
        let _lock = self.provision_lock.lock();

        if self.communities.read().by_id.contains_key(&community.id) {
            return Err(AttendanceError::AlreadyExists(format!(
                "community {}",
                community.id
            )));
        }

        self.persist(JournalOp::PutCommunity(community.clone()))?;

        let revision = self.bump_revision();
        {
            let mut communities = self.communities.write();
            communities.order.push(community.id.clone());
            communities.by_id.insert(
                community.id.clone(),
                Versioned {
                    value: community.clone(),
                    revision,
                },
            );
        }

        debug!(community = %community.id, revision, "community inserted");
        self.notify(&ChangeEvent {
            key: RecordKey::Community(community.id.clone()),
            before: None,
            after: Some(Record::Community(community)),
            revision,
        });

        Ok(())
    }

    /// Provision a person with both attendance dates unset.
    pub fn insert_person(&self, input: NewPerson) -> Result<Person> {
        let _lock = self.provision_lock.lock();

        if !self.communities.read().by_id.contains_key(&input.community_id) {
            return Err(AttendanceError::CommunityNotFound(input.community_id));
        }
        if self.people.read().contains_key(&input.id) {
            return Err(AttendanceError::AlreadyExists(format!("person {}", input.id)));
        }

        let person = input.into_person();
        self.persist(JournalOp::PutPerson(person.clone()))?;

        let revision = self.bump_revision();
        let slot = Arc::new(Mutex::new(PersonSlot {
            person: Some(person.clone()),
            revision,
        }));
        // Hold the new record's lock until listeners have seen the insert.
        let _guard = slot.lock();
        self.people
            .write()
            .insert(person.id.clone(), Arc::clone(&slot));
        self.index.add(&person.community_id, &person.id);

        debug!(person = %person.id, community = %person.community_id, revision, "person inserted");
        self.notify(&ChangeEvent {
            key: RecordKey::Person(person.id.clone()),
            before: None,
            after: Some(Record::Person(person.clone())),
            revision,
        });

        Ok(person)
    }

    /// Delete a person record.
    pub fn remove_person(&self, id: &PersonId) -> Result<Person> {
        let _lock = self.provision_lock.lock();

        let slot = self
            .people
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| AttendanceError::PersonNotFound(id.clone()))?;
        let mut slot = slot.lock();

        let before = slot
            .person
            .clone()
            .ok_or_else(|| AttendanceError::PersonNotFound(id.clone()))?;

        self.persist(JournalOp::RemovePerson(id.clone()))?;

        let revision = self.bump_revision();
        slot.person = None;
        slot.revision = revision;
        self.people.write().remove(id);
        self.index.remove(&before.community_id, id);

        debug!(person = %id, revision, "person removed");
        self.notify(&ChangeEvent {
            key: RecordKey::Person(id.clone()),
            before: Some(Record::Person(before.clone())),
            after: None,
            revision,
        });

        Ok(before)
    }

    // --- Listeners ---

    /// Register a listener. The store holds it weakly; dropped listeners
    /// are pruned whenever the registry changes.
    pub fn add_listener(&self, listener: Weak<dyn ChangeListener>) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::SeqCst));
        let mut listeners = self.listeners.write();
        listeners.retain(|(_, l)| l.strong_count() > 0);
        listeners.push((id, listener));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) {
        self.listeners
            .write()
            .retain(|(lid, l)| *lid != id && l.strong_count() > 0);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .iter()
            .filter(|(_, l)| l.strong_count() > 0)
            .count()
    }

    fn notify(&self, event: &ChangeEvent) {
        // Shared lock only: writers to different records notify in parallel.
        let live: Vec<Arc<dyn ChangeListener>> = self
            .listeners
            .read()
            .iter()
            .filter_map(|(_, l)| l.upgrade())
            .collect();

        for listener in live {
            listener.on_change(event);
        }
    }

    // --- Durability ---

    fn persist(&self, op: JournalOp) -> Result<()> {
        if let Some(journal) = &self.journal {
            journal.append(op)?;
        }
        Ok(())
    }

    fn bump_revision(&self) -> u64 {
        self.next_revision.fetch_add(1, Ordering::SeqCst)
    }

    /// Flush the journal to disk.
    pub fn sync(&self) -> Result<()> {
        match &self.journal {
            Some(journal) => journal.sync(),
            None => Ok(()),
        }
    }

    /// Base directory, if the store is on disk.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // --- Private Helpers ---

    fn write_manifest(path: &Path) -> Result<()> {
        use std::io::Write;

        let mut file = File::create(path.join("MANIFEST"))?;
        file.write_all(STORE_MAGIC)?;
        file.write_all(&[STORE_VERSION])?;
        file.sync_all()?;

        Ok(())
    }

    fn verify_manifest(path: &Path) -> Result<()> {
        use std::io::Read;

        let manifest_path = path.join("MANIFEST");
        if !manifest_path.exists() {
            return Err(AttendanceError::NotInitialized);
        }
        let mut file = File::open(manifest_path)?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != STORE_MAGIC {
            return Err(AttendanceError::InvalidFormat("Invalid store magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != STORE_VERSION {
            return Err(AttendanceError::InvalidFormat(format!(
                "Unsupported store version: {}",
                version[0]
            )));
        }

        Ok(())
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_file = File::create(path.join("LOCK"))?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| AttendanceError::Locked)?;

        Ok(lock_file)
    }
}

impl Drop for AttendanceStore {
    fn drop(&mut self) {
        // Best-effort sync on drop
        let _ = self.sync();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::Timestamp;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> StoreConfig {
        StoreConfig {
            path: dir.path().join("store"),
            create_if_missing: true,
            sync_interval: 1,
        }
    }

    fn cid(s: &str) -> CommunityId {
        CommunityId::parse(s).unwrap()
    }

    fn pid(s: &str) -> PersonId {
        PersonId::parse(s).unwrap()
    }

    fn seed(store: &AttendanceStore) {
        store
            .insert_community(Community::new(cid("C1"), "Launch"))
            .unwrap();
        store
            .insert_person(NewPerson::new(pid("P1"), cid("C1"), "Ana", "Lee"))
            .unwrap();
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<ChangeEvent>>,
    }

    impl ChangeListener for Recorder {
        fn on_change(&self, event: &ChangeEvent) {
            self.events.lock().push(event.clone());
        }
    }

    #[test]
    fn test_conditional_update_applies_when_predicate_holds() {
        let store = AttendanceStore::in_memory();
        seed(&store);

        let n = store
            .conditional_update(&pid("P1"), |_| true, PersonPatch::check_in(Timestamp(5)))
            .unwrap();
        assert_eq!(n, 1);
        assert_eq!(store.get(&pid("P1")).unwrap().check_in_date, Some(Timestamp(5)));
    }

    #[test]
    fn test_conditional_update_skips_when_predicate_fails() {
        let store = AttendanceStore::in_memory();
        seed(&store);

        let n = store
            .conditional_update(
                &pid("P1"),
                |p| p.check_in_date.is_some(),
                PersonPatch::check_out(Timestamp(5)),
            )
            .unwrap();
        assert_eq!(n, 0);
        assert!(store.get(&pid("P1")).unwrap().check_out_date.is_none());
    }

    #[test]
    fn test_conditional_update_missing_record() {
        let store = AttendanceStore::in_memory();
        let n = store
            .conditional_update(&pid("nope"), |_| true, PersonPatch::clear())
            .unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn test_conditional_update_rejects_ordering_violation() {
        let store = AttendanceStore::in_memory();
        seed(&store);
        store
            .conditional_update(&pid("P1"), |_| true, PersonPatch::check_in(Timestamp(10)))
            .unwrap();

        let result =
            store.conditional_update(&pid("P1"), |_| true, PersonPatch::check_out(Timestamp(9)));
        assert!(matches!(result, Err(AttendanceError::OrderingViolation(_))));
        assert!(store.get(&pid("P1")).unwrap().is_present());
    }

    #[test]
    fn test_provisioning_errors() {
        let store = AttendanceStore::in_memory();
        let result = store.insert_person(NewPerson::new(pid("P1"), cid("C9"), "A", "B"));
        assert!(matches!(result, Err(AttendanceError::CommunityNotFound(_))));

        seed(&store);
        let result = store.insert_community(Community::new(cid("C1"), "Again"));
        assert!(matches!(result, Err(AttendanceError::AlreadyExists(_))));
        let result = store.insert_person(NewPerson::new(pid("P1"), cid("C1"), "A", "B"));
        assert!(matches!(result, Err(AttendanceError::AlreadyExists(_))));
    }

    #[test]
    fn test_find_by_community_is_stable() {
        let store = AttendanceStore::in_memory();
        seed(&store);
        store
            .insert_community(Community::new(cid("C2"), "Other"))
            .unwrap();
        store
            .insert_person(NewPerson::new(pid("P2"), cid("C1"), "Bo", "Kim"))
            .unwrap();
        store
            .insert_person(NewPerson::new(pid("P3"), cid("C2"), "Cy", "Ng"))
            .unwrap();

        let ids: Vec<_> = store
            .find_by_community(&cid("C1"))
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec![pid("P1"), pid("P2")]);
        assert_eq!(store.find_by_community(&cid("C2")).len(), 1);
        assert!(store.find_by_community(&cid("C3")).is_empty());
    }

    #[test]
    fn test_listener_sees_each_write_once() {
        let store = AttendanceStore::in_memory();
        let recorder = Arc::new(Recorder::default());
        let weak: Weak<dyn ChangeListener> = Arc::downgrade(&recorder) as Weak<dyn ChangeListener>;
        store.add_listener(weak);

        seed(&store);
        store
            .conditional_update(&pid("P1"), |_| true, PersonPatch::check_in(Timestamp(1)))
            .unwrap();
        store
            .conditional_update(&pid("P1"), |_| false, PersonPatch::clear())
            .unwrap();
        store.remove_person(&pid("P1")).unwrap();

        let events = recorder.events.lock();
        assert_eq!(events.len(), 4);
        assert!(events[1].before.is_none());
        assert!(events[3].after.is_none());
        assert!(events.windows(2).all(|w| w[0].revision < w[1].revision));
    }

    #[test]
    fn test_dropped_listener_is_pruned() {
        let store = AttendanceStore::in_memory();
        let recorder: Arc<dyn ChangeListener> = Arc::new(Recorder::default());
        store.add_listener(Arc::downgrade(&recorder));
        assert_eq!(store.listener_count(), 1);

        drop(recorder);
        seed(&store);
        assert_eq!(store.listener_count(), 0);

        let live: Arc<dyn ChangeListener> = Arc::new(Recorder::default());
        store.add_listener(Arc::downgrade(&live));
        assert_eq!(store.listeners.read().len(), 1);
    }

    #[test]
    fn test_writes_notify_while_another_listener_call_is_running() {
        use std::sync::mpsc;
        use std::time::Duration;

        /// Parks inside the first notification until released.
        struct Gate {
            entered: Mutex<Option<mpsc::Sender<()>>>,
            release: Mutex<mpsc::Receiver<()>>,
            seen: Mutex<Vec<RecordKey>>,
        }

        impl ChangeListener for Gate {
            fn on_change(&self, event: &ChangeEvent) {
                self.seen.lock().push(event.key.clone());
                if let Some(entered) = self.entered.lock().take() {
                    entered.send(()).unwrap();
                    let _ = self.release.lock().recv_timeout(Duration::from_secs(5));
                }
            }
        }

        let store = Arc::new(AttendanceStore::in_memory());
        seed(&store);
        store
            .insert_person(NewPerson::new(pid("P2"), cid("C1"), "Bo", "Kim"))
            .unwrap();

        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let gate = Arc::new(Gate {
            entered: Mutex::new(Some(entered_tx)),
            release: Mutex::new(release_rx),
            seen: Mutex::new(Vec::new()),
        });
        let as_listener: Arc<dyn ChangeListener> = gate.clone();
        store.add_listener(Arc::downgrade(&as_listener));

        let parked = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                store
                    .conditional_update(&pid("P1"), |_| true, PersonPatch::check_in(Timestamp(1)))
                    .unwrap()
            })
        };
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        // P1's writer is still inside its notification.
        let updated = store
            .conditional_update(&pid("P2"), |_| true, PersonPatch::check_in(Timestamp(2)))
            .unwrap();
        assert_eq!(updated, 1);

        release_tx.send(()).unwrap();
        assert_eq!(parked.join().unwrap(), 1);
        assert_eq!(gate.seen.lock().len(), 2);
    }

    #[test]
    fn test_oversized_record_is_refused_and_store_reopens() {
        let dir = TempDir::new().unwrap();

        {
            let store = AttendanceStore::create(test_config(&dir)).unwrap();
            seed(&store);
            let err = store
                .insert_person(NewPerson::new(
                    pid("P2"),
                    cid("C1"),
                    "x".repeat(17 * 1024 * 1024),
                    "Kim",
                ))
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
            assert_eq!(store.person_count(), 1);
        }

        let store = AttendanceStore::open(test_config(&dir)).unwrap();
        assert_eq!(store.person_count(), 1);
        assert!(store.get(&pid("P1")).is_ok());
        assert!(matches!(
            store.get(&pid("P2")),
            Err(AttendanceError::PersonNotFound(_))
        ));
    }

    #[test]
    fn test_persistence() {
        let dir = TempDir::new().unwrap();

        {
            let store = AttendanceStore::create(test_config(&dir)).unwrap();
            seed(&store);
            store
                .insert_person(NewPerson::new(pid("P2"), cid("C1"), "Bo", "Kim").with_title("CTO"))
                .unwrap();
            store
                .conditional_update(&pid("P1"), |_| true, PersonPatch::check_in(Timestamp(7)))
                .unwrap();
            store.remove_person(&pid("P2")).unwrap();
        }

        let store = AttendanceStore::open(test_config(&dir)).unwrap();
        assert_eq!(store.communities().len(), 1);
        assert_eq!(store.person_count(), 1);
        assert_eq!(store.get(&pid("P1")).unwrap().check_in_date, Some(Timestamp(7)));
        assert!(matches!(
            store.get(&pid("P2")),
            Err(AttendanceError::PersonNotFound(_))
        ));
    }

    #[test]
    fn test_store_lock() {
        let dir = TempDir::new().unwrap();
        let _store = AttendanceStore::create(test_config(&dir)).unwrap();

        let result = AttendanceStore::open(test_config(&dir));
        assert!(matches!(result, Err(AttendanceError::Locked)));
    }

    #[test]
    fn test_open_missing_store() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig {
            create_if_missing: false,
            ..test_config(&dir)
        };
        assert!(matches!(
            AttendanceStore::open_or_create(config),
            Err(AttendanceError::NotInitialized)
        ));
    }
}
