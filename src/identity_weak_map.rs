use crate::error::Error;
use crate::identity_key::IdentityWeakKey;
use crate::identity_store::{self, Handle, IdentityStore};
use crate::reclaim::{ReclaimQueue, Tracked};
use core::fmt;
use core::hash::{BuildHasher, Hash, Hasher};
use log::{debug, trace};
use std::collections::hash_map::{DefaultHasher, RandomState};

/// A map keyed by the identity of `Tracked` keys that does not keep its keys
/// alive.
///
/// Once the last `Tracked` owner of a key is dropped, its entry is removed by
/// the next operation on the map. Every operation that observes or changes the
/// contents reaps first, which is why even lookups take `&mut self`.
///
/// Not a general-purpose map: two value-equal keys in different allocations
/// name different entries.
pub struct IdentityWeakMap<K, V, S = RandomState> {
    store: IdentityStore<K, V, S>,
    queue: ReclaimQueue,
}

impl<K, V> IdentityWeakMap<K, V> {
    pub fn new() -> Self {
        Self::with_hasher(RandomState::new())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, RandomState::new())
    }
}

impl<K, V> Default for IdentityWeakMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> IdentityWeakMap<K, V, S>
where
    S: BuildHasher,
{
    pub fn with_hasher(hasher: S) -> Self {
        Self::with_capacity_and_hasher(0, hasher)
    }

    pub fn with_capacity_and_hasher(capacity: usize, hasher: S) -> Self {
        Self {
            store: IdentityStore::with_capacity_and_hasher(capacity, hasher),
            queue: ReclaimQueue::new(),
        }
    }

    /// Drain pending reclamation notifications and remove the entries they
    /// name. Returns the number of entries removed.
    ///
    /// Removed values are dropped during the pass; keys they were the last
    /// owner of are reaped in the same pass.
    pub fn reap(&mut self) -> usize {
        let store = &mut self.store;
        let mut removed = 0;
        let drained = self.queue.drain(|token| match store.remove(Handle::from_token(token)) {
            Some(entry) => {
                removed += 1;
                drop(entry);
            }
            None => trace!("stale reclamation token {:?}", token),
        });
        if removed > 0 {
            trace!(
                "reaped {} entries from {} notifications, {} remain",
                removed,
                drained,
                self.store.len()
            );
        }
        removed
    }

    pub fn len(&mut self) -> usize {
        self.reap();
        self.store.len()
    }

    pub fn is_empty(&mut self) -> bool {
        self.reap();
        self.store.is_empty()
    }

    pub fn get(&mut self, key: &Tracked<K>) -> Option<&V> {
        self.reap();
        self.store.get(&IdentityWeakKey::probe(key))
    }

    pub fn get_mut(&mut self, key: &Tracked<K>) -> Option<&mut V> {
        self.reap();
        self.store.get_mut(&IdentityWeakKey::probe(key))
    }

    pub fn contains_key(&mut self, key: &Tracked<K>) -> bool {
        self.reap();
        self.store.find(&IdentityWeakKey::probe(key)).is_some()
    }

    /// True if any stored value equals `value`.
    pub fn contains_value(&mut self, value: &V) -> bool
    where
        V: PartialEq,
    {
        self.reap();
        self.store.contains_value(value)
    }

    /// Map `key` to `value`, returning the value it replaced. The map does not
    /// keep `key` alive.
    pub fn insert(&mut self, key: &Tracked<K>, value: V) -> Option<V> {
        self.reap();
        self.store.insert(key, value, &self.queue)
    }

    pub fn remove(&mut self, key: &Tracked<K>) -> Option<V> {
        self.reap();
        self.store.remove_key(&IdentityWeakKey::probe(key))
    }

    /// Bulk insert is not supported: identity-merging two sources has no
    /// single obvious meaning. Always fails without touching the map.
    pub fn put_all<I>(&mut self, _entries: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = (Tracked<K>, V)>,
    {
        Err(Error::Unsupported {
            operation: "put_all",
        })
    }

    pub fn clear(&mut self) {
        let n = self.store.clear();
        debug!("cleared {} entries", n);
        // Leftover notifications name emptied slots and are discarded.
        self.reap();
    }

    /// Snapshot of the live keys. The returned owners keep those keys alive
    /// until dropped.
    pub fn keys(&mut self) -> Vec<Tracked<K>> {
        self.reap();
        self.store.iter().filter_map(|(k, _)| k.resolve()).collect()
    }

    /// Read-only snapshot of the live entries.
    pub fn entries(&mut self) -> Vec<Entry<'_, K, V>> {
        self.reap();
        self.store
            .iter()
            .filter_map(|(k, value)| k.resolve().map(|key| Entry { key, value }))
            .collect()
    }

    pub fn values(&mut self) -> Values<'_, K, V> {
        self.reap();
        Values {
            inner: self.store.iter(),
        }
    }

    pub fn iter(&mut self) -> Iter<'_, K, V> {
        self.reap();
        Iter {
            inner: self.store.iter(),
        }
    }

    fn live(&self) -> impl Iterator<Item = (&IdentityWeakKey<K>, &V)> {
        self.store.iter().filter(|(k, _)| !k.is_expired())
    }
}

/// Entry of the snapshot returned by [`IdentityWeakMap::entries`].
pub struct Entry<'a, K, V> {
    key: Tracked<K>,
    value: &'a V,
}

impl<'a, K, V> Entry<'a, K, V> {
    pub fn key(&self) -> &Tracked<K> {
        &self.key
    }

    pub fn value(&self) -> &'a V {
        self.value
    }

    /// Snapshot entries are read-only; always fails.
    pub fn set_value(&mut self, _value: V) -> Result<V, Error> {
        Err(Error::Unsupported {
            operation: "Entry::set_value",
        })
    }

    pub fn into_parts(self) -> (Tracked<K>, &'a V) {
        (self.key, self.value)
    }
}

impl<'a, K: fmt::Debug, V: fmt::Debug> fmt::Debug for Entry<'a, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Entry")
            .field(&self.key)
            .field(self.value)
            .finish()
    }
}

/// Iterator over the stored values.
pub struct Values<'a, K, V> {
    inner: identity_store::Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_k, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// Iterator over live entries, yielding an owner of each key.
pub struct Iter<'a, K, V> {
    inner: identity_store::Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (Tracked<K>, &'a V);
    fn next(&mut self) -> Option<Self::Item> {
        // Keys reclaimed after the reap that created this iterator are skipped.
        for (k, v) in self.inner.by_ref() {
            if let Some(key) = k.resolve() {
                return Some((key, v));
            }
        }
        None
    }
}

// Equality and hashing look only at live entries, which is the state an
// implicit reap would leave behind.

impl<K, V, S> PartialEq for IdentityWeakMap<K, V, S>
where
    V: PartialEq,
    S: BuildHasher,
{
    fn eq(&self, other: &Self) -> bool {
        if core::ptr::eq(self, other) {
            return true;
        }
        self.live().count() == other.live().count()
            && self
                .live()
                .all(|(k, v)| other.store.get(k).map_or(false, |ov| *v == *ov))
    }
}

impl<K, V, S> Eq for IdentityWeakMap<K, V, S>
where
    V: Eq,
    S: BuildHasher,
{
}

impl<K, V, S> Hash for IdentityWeakMap<K, V, S>
where
    V: Hash,
    S: BuildHasher,
{
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Order-independent, and built from identity hashes so that it does
        // not depend on either map's hasher state.
        let mut len = 0usize;
        let mut sum = 0u64;
        for (k, v) in self.live() {
            let mut h = DefaultHasher::new();
            k.identity_hash().hash(&mut h);
            v.hash(&mut h);
            sum = sum.wrapping_add(h.finish());
            len += 1;
        }
        state.write_usize(len);
        state.write_u64(sum);
    }
}

impl<K, V, S> fmt::Debug for IdentityWeakMap<K, V, S>
where
    K: fmt::Debug,
    V: fmt::Debug,
    S: BuildHasher,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.store
                    .iter()
                    .filter_map(|(k, v)| k.resolve().map(|key| (key, v))),
            )
            .finish()
    }
}
