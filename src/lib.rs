//! weak-identity-map: a hash map keyed by object identity that holds its
//! keys weakly, for caches and side-tables that must not extend the lifetime
//! of the objects they describe.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: an identity-keyed map whose entries disappear once nothing else
//!   owns their key, built in small layers with one job each.
//! - Layers:
//!   - `Tracked<T>` / `ReclaimQueue` (reclaim): an `Arc`-like owner whose
//!     final drop pushes a token onto every queue a weak handle registered
//!     it with. This is the notification channel a garbage-collected runtime
//!     would otherwise provide.
//!   - `IdentityWeakKey<K>`: weak handle to a key allocation with an identity
//!     hash cached at construction; compared by identity, never by value.
//!   - `IdentityStore<K, V, S>`: structural map with generational slot
//!     handles. A slot handle doubles as the entry's reclamation token.
//!   - `IdentityWeakMap<K, V, S>`: public API. Every operation reaps (drains
//!     the queue and removes the named slots) before doing its work.
//!
//! Constraints
//! - Keys are `Tracked<K>`; values are owned by the map.
//! - Keys may be dropped on any thread. The notification queue is lock-free
//!   and draining it is serialized by its own lock.
//! - The map itself is not internally synchronized: every reaping operation
//!   takes `&mut self`, so sharing a map across threads needs an external
//!   lock.
//! - O(1) average lookups. No `K: Hash/Eq` bound: user code never runs during
//!   probing.
//!
//! Reclamation tokens
//! - A token is the slot key of the entry it belongs to. Slots are
//!   generational, so a token that arrives after its entry was removed
//!   explicitly (or after `clear`) cannot name a later entry in the same slot.
//! - Dropping a registered key handle while its referent is alive
//!   unregisters it, so long-lived keys do not accumulate watchers.
//!
//! Null and expired keys
//! - Null keys are not representable. A reclaimed referent is reported by
//!   `IdentityWeakKey::is_expired`; snapshot views skip expired keys instead
//!   of yielding a placeholder.
//!
//! Notes and non-goals
//! - No eviction policy (capacity, TTL, LRU); reclamation of keys is the
//!   only implicit removal.
//! - Bulk insert (`put_all`) and mutation through entry snapshots are
//!   deliberately unsupported and return `Error::Unsupported`.
//! - Equality and hashing of maps consider live entries only.

mod error;
mod identity_key;
mod identity_store;
mod identity_weak_map;
mod reclaim;

// Public surface
pub use error::Error;
pub use identity_key::IdentityWeakKey;
pub use identity_weak_map::{Entry, IdentityWeakMap, Iter, Values};
pub use reclaim::Tracked;
