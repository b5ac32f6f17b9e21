//! IdentityWeakKey: a weak handle to a `Tracked` key, compared by identity.

use crate::reclaim::{ReclaimQueue, ReclaimToken, Registration, Shared, Tracked};
use core::fmt;
use core::hash::{Hash, Hasher};
use std::sync::Weak;

/// Weak, non-owning handle to a key allocation.
///
/// The identity hash is taken from the allocation address when the handle is
/// created and never recomputed, so it stays stable after the referent has
/// been reclaimed. The weak reference keeps the allocation's memory reserved,
/// which means no other key can appear at the same address while this handle
/// exists.
///
/// Two handles are equal if they are the same handle, or if both point at the
/// same allocation and that allocation is still live. Handles whose referent
/// has been reclaimed are never equal to any other handle.
pub struct IdentityWeakKey<K> {
    weak: Weak<Shared<K>>,
    hash: u64,
    registration: Option<Registration>,
}

impl<K> IdentityWeakKey<K> {
    /// Persistent handle registered against `queue`; `token` is delivered to
    /// the queue once the referent is reclaimed.
    pub(crate) fn new(key: &Tracked<K>, queue: &ReclaimQueue, token: ReclaimToken) -> Self {
        let registration = Tracked::shared(key).register(queue, token);
        Self {
            weak: Tracked::downgrade(key),
            hash: identity_hash(key),
            registration: Some(registration),
        }
    }

    /// Transient handle for lookups. Not registered anywhere.
    pub fn probe(key: &Tracked<K>) -> Self {
        Self {
            weak: Tracked::downgrade(key),
            hash: identity_hash(key),
            registration: None,
        }
    }

    #[inline]
    pub fn identity_hash(&self) -> u64 {
        self.hash
    }

    /// The referent, or `None` once it has been reclaimed.
    pub fn resolve(&self) -> Option<Tracked<K>> {
        self.weak.upgrade().map(Tracked::from_shared)
    }

    #[inline]
    pub fn is_expired(&self) -> bool {
        self.weak.strong_count() == 0
    }

    /// True if this handle points at `key`'s allocation.
    #[inline]
    pub fn refers_to(&self, key: &Tracked<K>) -> bool {
        // A live `key` means the allocation cannot have been reclaimed.
        core::ptr::eq(self.weak.as_ptr() as *const (), Tracked::as_ptr(key))
    }

    pub(crate) fn token(&self) -> Option<ReclaimToken> {
        self.registration.as_ref().map(Registration::token)
    }
}

fn identity_hash<K>(key: &Tracked<K>) -> u64 {
    Tracked::as_ptr(key) as usize as u64
}

impl<K> Drop for IdentityWeakKey<K> {
    fn drop(&mut self) {
        if let Some(reg) = &self.registration {
            if let Some(shared) = self.weak.upgrade() {
                shared.unregister(reg);
            }
        }
    }
}

impl<K> PartialEq for IdentityWeakKey<K> {
    fn eq(&self, other: &Self) -> bool {
        core::ptr::eq(self, other) || (Weak::ptr_eq(&self.weak, &other.weak) && !self.is_expired())
    }
}

impl<K> Eq for IdentityWeakKey<K> {}

impl<K> Hash for IdentityWeakKey<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl<K> fmt::Debug for IdentityWeakKey<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityWeakKey")
            .field("hash", &format_args!("{:#x}", self.hash))
            .field("expired", &self.is_expired())
            .field("registered", &self.registration.is_some())
            .finish()
    }
}
