// Dottrace
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

/// Process-wide row id allocator. Ids are unique across every provider
/// instance for the lifetime of the process.
static ID_GENERATOR: AtomicI64 = AtomicI64::new(0);

/// Bijective mapping from categorical keys to stable row ids.
///
/// Entries are only ever added. The allocator behind it is a shared atomic
/// counter, so two maps interleaving allocations can never hand out the
/// same id; within one map, a key's id is invariant once assigned.
/// Mutation requires `&mut`, which the provider guarantees by holding the
/// write side of its lock around every fetch.
#[derive(Debug, Default)]
pub struct EntryIdMap {
    forward: HashMap<String, i64>,
    reverse: HashMap<i64, String>,
}

impl EntryIdMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id of `key`, allocating one on first observation.
    pub fn id_for(&mut self, key: &str) -> i64 {
        if let Some(id) = self.forward.get(key) {
            return *id;
        }
        let id = ID_GENERATOR.fetch_add(1, Ordering::Relaxed);
        self.forward.insert(key.to_string(), id);
        self.reverse.insert(id, key.to_string());
        id
    }

    /// Reverse lookup of a previously allocated id.
    pub fn key_for(&self, id: i64) -> Option<&str> {
        self.reverse.get(&id).map(String::as_str)
    }

    /// Number of allocated entries.
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    /// Whether no entry was allocated yet.
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};
    use std::thread;

    #[test]
    fn test_same_key_is_stable() {
        let mut map = EntryIdMap::new();
        let id = map.id_for("sched_switch");
        assert_eq!(map.id_for("sched_switch"), id);
        assert_eq!(map.key_for(id), Some("sched_switch"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_distinct_keys_never_collide() {
        let mut map = EntryIdMap::new();
        let a = map.id_for("a");
        let b = map.id_for("b");
        assert_ne!(a, b);
    }

    #[test]
    fn test_concurrent_maps_share_the_allocator() {
        let seen = Arc::new(Mutex::new(HashSet::new()));
        let mut handles = Vec::new();
        for worker in 0..8 {
            let seen = Arc::clone(&seen);
            handles.push(thread::spawn(move || {
                let mut map = EntryIdMap::new();
                for key in 0..100 {
                    let id = map.id_for(&format!("worker-{worker}-key-{key}"));
                    assert!(seen.lock().unwrap().insert(id), "id {id} allocated twice");
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(seen.lock().unwrap().len(), 800);
    }

    proptest! {
        #[test]
        fn prop_id_map_is_bijective(keys in proptest::collection::vec("[a-z]{1,8}", 1..50)) {
            let mut map = EntryIdMap::new();
            let ids: Vec<i64> = keys.iter().map(|key| map.id_for(key)).collect();
            for (key, id) in keys.iter().zip(&ids) {
                // equal keys yield equal ids, and reverse lookup agrees
                prop_assert_eq!(map.id_for(key), *id);
                prop_assert_eq!(map.key_for(*id), Some(key.as_str()));
            }
            let distinct_keys: HashSet<&String> = keys.iter().collect();
            let distinct_ids: HashSet<i64> = ids.iter().copied().collect();
            prop_assert_eq!(distinct_keys.len(), distinct_ids.len());
        }
    }
}
