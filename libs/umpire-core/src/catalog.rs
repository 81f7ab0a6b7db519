//! The in-memory problem store.
//!
//! Readers take an `Arc` snapshot of the whole map; writers build the next
//! map off to the side and publish it with a single pointer swap, so a
//! reader never observes a partially built catalog. The background refresher
//! and the transient `validate` registrations both go through the same swap.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rand::Rng;
use tracing::debug;

use crate::types::JudgeData;

type Snapshot = Arc<HashMap<String, Arc<JudgeData>>>;

const KEY_LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const TEMP_KEY_LEN: usize = 12;

#[derive(Default)]
pub struct Catalog {
    current: RwLock<Snapshot>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_slot(&self) -> RwLockReadGuard<'_, Snapshot> {
        self.current.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write_slot(&self) -> RwLockWriteGuard<'_, Snapshot> {
        self.current.write().unwrap_or_else(|p| p.into_inner())
    }

    pub fn get(&self, problem_id: &str) -> Option<Arc<JudgeData>> {
        self.read_slot().get(problem_id).cloned()
    }

    /// A consistent view of the whole mapping as of this call.
    pub fn snapshot(&self) -> Snapshot {
        self.read_slot().clone()
    }

    pub fn len(&self) -> usize {
        self.read_slot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_slot().is_empty()
    }

    /// Replace the entire mapping atomically.
    pub fn swap(&self, next: HashMap<String, JudgeData>) {
        let next: HashMap<String, Arc<JudgeData>> =
            next.into_iter().map(|(k, v)| (k, Arc::new(v))).collect();
        let count = next.len();
        *self.write_slot() = Arc::new(next);
        debug!(problems = count, "catalog published");
    }

    /// Register `data` under a fresh random key, for transient validations.
    /// The caller removes the key when done.
    pub fn temp_insert(&self, data: JudgeData) -> String {
        let key = random_key(TEMP_KEY_LEN);
        let mut slot = self.write_slot();
        let mut next: HashMap<String, Arc<JudgeData>> = slot.as_ref().clone();
        next.insert(key.clone(), Arc::new(data));
        *slot = Arc::new(next);
        key
    }

    pub fn remove(&self, key: &str) {
        let mut slot = self.write_slot();
        if !slot.contains_key(key) {
            return;
        }
        let mut next: HashMap<String, Arc<JudgeData>> = slot.as_ref().clone();
        next.remove(key);
        *slot = Arc::new(next);
    }
}

fn random_key(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| KEY_LETTERS[rng.gen_range(0..KEY_LETTERS.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InMemoryFile, Payload};

    fn make_data(language: &str) -> JudgeData {
        JudgeData {
            solution: Payload {
                language: language.to_string(),
                files: vec![InMemoryFile {
                    name: "main.cpp".to_string(),
                    content: "int main() {}".to_string(),
                }],
                problem: None,
                stdin: String::new(),
            },
            io: vec![],
        }
    }

    #[test]
    fn swap_replaces_the_whole_mapping() {
        let catalog = Catalog::new();
        let mut first = HashMap::new();
        first.insert("a".to_string(), make_data("cpp"));
        first.insert("b".to_string(), make_data("python"));
        catalog.swap(first);
        assert_eq!(catalog.len(), 2);
        assert!(catalog.get("a").is_some());

        let mut second = HashMap::new();
        second.insert("c".to_string(), make_data("cpp"));
        catalog.swap(second);
        assert_eq!(catalog.len(), 1);
        assert!(catalog.get("a").is_none());
        assert!(catalog.get("c").is_some());
    }

    #[test]
    fn snapshots_survive_a_swap() {
        let catalog = Catalog::new();
        let mut first = HashMap::new();
        first.insert("a".to_string(), make_data("cpp"));
        catalog.swap(first);

        let before = catalog.snapshot();
        catalog.swap(HashMap::new());

        // The old snapshot is still fully intact; the new one is empty.
        assert_eq!(before.len(), 1);
        assert!(catalog.is_empty());
    }

    #[test]
    fn temp_insert_generates_twelve_letter_keys() {
        let catalog = Catalog::new();
        let key = catalog.temp_insert(make_data("cpp"));
        assert_eq!(key.len(), 12);
        assert!(key.chars().all(|c| c.is_ascii_alphabetic()));
        assert!(catalog.get(&key).is_some());

        catalog.remove(&key);
        assert!(catalog.get(&key).is_none());
    }

    #[test]
    fn temp_insert_leaves_existing_entries_alone() {
        let catalog = Catalog::new();
        let mut map = HashMap::new();
        map.insert("stable".to_string(), make_data("cpp"));
        catalog.swap(map);

        let key = catalog.temp_insert(make_data("python"));
        assert_eq!(catalog.len(), 2);
        assert!(catalog.get("stable").is_some());

        catalog.remove(&key);
        assert_eq!(catalog.len(), 1);
        assert!(catalog.get("stable").is_some());
    }

    #[test]
    fn removing_an_unknown_key_is_a_no_op() {
        let catalog = Catalog::new();
        catalog.remove("never-there");
        assert!(catalog.is_empty());
    }

    #[test]
    fn concurrent_readers_see_one_of_the_published_maps() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::thread;

        let catalog = Arc::new(Catalog::new());
        let mut initial = HashMap::new();
        initial.insert("p1".to_string(), make_data("cpp"));
        initial.insert("p2".to_string(), make_data("cpp"));
        catalog.swap(initial);

        let stop = Arc::new(AtomicBool::new(false));
        let mut readers = Vec::new();
        for _ in 0..4 {
            let catalog = catalog.clone();
            let stop = stop.clone();
            readers.push(thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    let snap = catalog.snapshot();
                    // Every published map holds either {p1, p2} or {p3};
                    // a mix would mean a torn read.
                    let has_old = snap.contains_key("p1") && snap.contains_key("p2");
                    let has_new = snap.contains_key("p3") && snap.len() == 1;
                    assert!(has_old || has_new, "torn catalog snapshot: {:?}", snap.keys());
                }
            }));
        }

        for _ in 0..100 {
            let mut old = HashMap::new();
            old.insert("p1".to_string(), make_data("cpp"));
            old.insert("p2".to_string(), make_data("cpp"));
            catalog.swap(old);

            let mut new = HashMap::new();
            new.insert("p3".to_string(), make_data("python"));
            catalog.swap(new);
        }
        stop.store(true, Ordering::Relaxed);
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
