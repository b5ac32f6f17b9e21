//! IdentityStore: structural layer keyed by identity with stable handles.

use crate::identity_key::IdentityWeakKey;
use crate::reclaim::{ReclaimQueue, ReclaimToken, Tracked};
use core::hash::BuildHasher;
use hashbrown::HashTable;
use slotmap::{DefaultKey, SlotMap};
use std::collections::hash_map::RandomState;

/// Generational slot handle. Doubles as the reclamation token of the entry,
/// so a token that outlives its entry can never name a later one.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub(crate) struct Handle(DefaultKey);

impl Handle {
    pub(crate) fn from_token(token: ReclaimToken) -> Self {
        Handle(token)
    }
}

struct Slot<K, V> {
    key: IdentityWeakKey<K>,
    value: V,
    hash: u64,
}

pub(crate) struct IdentityStore<K, V, S = RandomState> {
    hasher: S,
    index: HashTable<DefaultKey>,
    slots: SlotMap<DefaultKey, Slot<K, V>>, // storage using generational keys
}

/// Iterator over stored entries, including ones whose key expired since the
/// last reap.
pub(crate) struct Iter<'a, K, V> {
    it: slotmap::basic::Iter<'a, DefaultKey, Slot<K, V>>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a IdentityWeakKey<K>, &'a V);
    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.it.next().map(|(_, s)| (&s.key, &s.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.it.size_hint()
    }
}

impl<K, V, S> IdentityStore<K, V, S>
where
    S: BuildHasher,
{
    pub(crate) fn with_capacity_and_hasher(capacity: usize, hasher: S) -> Self {
        Self {
            hasher,
            index: HashTable::with_capacity(capacity),
            slots: SlotMap::with_capacity(capacity),
        }
    }

    fn make_hash(&self, identity: u64) -> u64 {
        self.hasher.hash_one(identity)
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }
    pub(crate) fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub(crate) fn find(&self, probe: &IdentityWeakKey<K>) -> Option<Handle> {
        let hash = self.make_hash(probe.identity_hash());
        self.index
            .find(hash, |&k| {
                self.slots
                    .get(k)
                    .map(|s| s.key == *probe)
                    .unwrap_or(false)
            })
            .map(|&k| Handle(k))
    }

    pub(crate) fn get(&self, probe: &IdentityWeakKey<K>) -> Option<&V> {
        let h = self.find(probe)?;
        self.slots.get(h.0).map(|s| &s.value)
    }

    pub(crate) fn get_mut(&mut self, probe: &IdentityWeakKey<K>) -> Option<&mut V> {
        let h = self.find(probe)?;
        self.slots.get_mut(h.0).map(|s| &mut s.value)
    }

    /// Insert `value` under `key`, or overwrite the value of the live entry
    /// already keyed by it. An overwrite keeps the existing key handle and
    /// returns the previous value.
    pub(crate) fn insert(&mut self, key: &Tracked<K>, value: V, queue: &ReclaimQueue) -> Option<V> {
        let probe = IdentityWeakKey::probe(key);
        if let Some(h) = self.find(&probe) {
            if let Some(slot) = self.slots.get_mut(h.0) {
                return Some(core::mem::replace(&mut slot.value, value));
            }
        }

        let hash = self.make_hash(probe.identity_hash());
        let k = self.slots.insert_with_key(|k| Slot {
            key: IdentityWeakKey::new(key, queue, k),
            value,
            hash,
        });
        self.index
            .insert_unique(hash, k, |&kk| self.slots.get(kk).map(|s| s.hash).unwrap_or(0));
        None
    }

    pub(crate) fn remove_key(&mut self, probe: &IdentityWeakKey<K>) -> Option<V> {
        let h = self.find(probe)?;
        self.remove(h).map(|(_k, v)| v)
    }

    /// Remove the entry in `handle`'s slot. Stale handles (slot empty or
    /// reused by a later entry) return `None`.
    pub(crate) fn remove(&mut self, handle: Handle) -> Option<(IdentityWeakKey<K>, V)> {
        let k = handle.0;
        let slot = self.slots.remove(k)?;
        debug_assert_eq!(slot.key.token(), Some(k));

        if let Ok(entry) = self.index.find_entry(slot.hash, |&kk| kk == k) {
            entry.remove();
        }
        Some((slot.key, slot.value))
    }

    /// Drop every entry. Returns how many there were.
    pub(crate) fn clear(&mut self) -> usize {
        let n = self.slots.len();
        self.index.clear();
        self.slots.clear();
        n
    }

    pub(crate) fn contains_value(&self, value: &V) -> bool
    where
        V: PartialEq,
    {
        self.slots.values().any(|s| s.value == *value)
    }

    pub(crate) fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            it: self.slots.iter(),
        }
    }
}
