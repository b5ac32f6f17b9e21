//! Reclamation notifications for weakly held keys.
//!
//! `Tracked<T>` is an atomically reference-counted owner of a value. Weak
//! handles to its allocation may register a token against a `ReclaimQueue`;
//! when the last `Tracked` owner is dropped, every registered token whose
//! queue still exists is pushed onto that queue. The queue owner drains the
//! tokens later and cleans up whatever the tokens name.
//!
//! Producers run on whichever thread drops the last owner, so the queue is a
//! lock-free `SegQueue`. Draining is serialized by its own lock; nothing else
//! about the consumer is made thread-safe here.

use core::fmt;
use core::hash::{Hash, Hasher};
use core::ops::Deref;
use crossbeam_queue::SegQueue;
use parking_lot::Mutex;
use slotmap::DefaultKey;
use std::sync::{Arc, Weak};

/// Payload delivered through a `ReclaimQueue`: the slot of the entry whose key
/// was reclaimed.
pub(crate) type ReclaimToken = DefaultKey;

/// A token registered against one queue. Also serves as the identity used
/// to unregister it again.
#[derive(Clone)]
pub(crate) struct Registration {
    queue: Weak<QueueShared>,
    token: ReclaimToken,
}

impl Registration {
    #[inline]
    pub(crate) fn token(&self) -> ReclaimToken {
        self.token
    }

    fn same_as(&self, other: &Registration) -> bool {
        self.token == other.token && Weak::ptr_eq(&self.queue, &other.queue)
    }
}

/// Allocation shared by all `Tracked` owners of one value.
pub(crate) struct Shared<T> {
    value: T,
    watchers: Mutex<Vec<Registration>>,
}

impl<T> Shared<T> {
    pub(crate) fn register(&self, queue: &ReclaimQueue, token: ReclaimToken) -> Registration {
        let reg = Registration {
            queue: Arc::downgrade(&queue.shared),
            token,
        };
        let mut watchers = self.watchers.lock();
        // Queues that are gone can never be notified again.
        watchers.retain(|w| w.queue.strong_count() > 0);
        watchers.push(reg.clone());
        reg
    }

    pub(crate) fn unregister(&self, reg: &Registration) {
        self.watchers.lock().retain(|w| !w.same_as(reg));
    }

    #[cfg(test)]
    pub(crate) fn watcher_count(&self) -> usize {
        self.watchers.lock().len()
    }
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        // The strong count is already zero: every weak handle resolves absent
        // before its token becomes visible to a drain.
        for w in self.watchers.get_mut().drain(..) {
            if let Some(queue) = w.queue.upgrade() {
                queue.pending.push(w.token);
            }
        }
    }
}

/// Owning, atomically reference-counted pointer whose final drop notifies the
/// maps holding it as a weak key.
///
/// Cloning produces another owner of the same allocation. Comparison and
/// hashing forward to the value, like `Arc<T>`; use [`Tracked::ptr_eq`] for
/// identity.
pub struct Tracked<T> {
    inner: Arc<Shared<T>>,
}

impl<T> Tracked<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Shared {
                value,
                watchers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// True if both point to the same allocation.
    #[inline]
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Arc::ptr_eq(&this.inner, &other.inner)
    }

    /// Number of live owners of this allocation.
    #[inline]
    pub fn strong_count(this: &Self) -> usize {
        Arc::strong_count(&this.inner)
    }

    /// Address of the allocation; stable for as long as any owner or weak
    /// handle exists.
    #[inline]
    pub fn as_ptr(this: &Self) -> *const () {
        Arc::as_ptr(&this.inner) as *const ()
    }

    pub(crate) fn downgrade(this: &Self) -> Weak<Shared<T>> {
        Arc::downgrade(&this.inner)
    }

    pub(crate) fn from_shared(inner: Arc<Shared<T>>) -> Self {
        Self { inner }
    }

    pub(crate) fn shared(this: &Self) -> &Shared<T> {
        &this.inner
    }
}

impl<T> Clone for Tracked<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Deref for Tracked<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.inner.value
    }
}

impl<T> AsRef<T> for Tracked<T> {
    fn as_ref(&self) -> &T {
        &self.inner.value
    }
}

impl<T> From<T> for Tracked<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: Default> Default for Tracked<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: PartialEq> PartialEq for Tracked<T> {
    fn eq(&self, other: &Self) -> bool {
        **self == **other
    }
}

impl<T: Eq> Eq for Tracked<T> {}

impl<T: Hash> Hash for Tracked<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (**self).hash(state);
    }
}

impl<T: fmt::Debug> fmt::Debug for Tracked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

pub(crate) struct QueueShared {
    pending: SegQueue<ReclaimToken>,
    drain_lock: Mutex<()>,
}

/// Pending-removal channel filled by `Tracked` drops.
pub(crate) struct ReclaimQueue {
    shared: Arc<QueueShared>,
}

impl ReclaimQueue {
    pub(crate) fn new() -> Self {
        Self {
            shared: Arc::new(QueueShared {
                pending: SegQueue::new(),
                drain_lock: Mutex::new(()),
            }),
        }
    }

    /// Notifications not yet drained.
    pub(crate) fn pending(&self) -> usize {
        self.shared.pending.len()
    }

    /// Pop tokens until the queue is empty, feeding each to `f`. Tokens pushed
    /// by `f` itself (cascading drops) are drained in the same pass. Returns
    /// the number of tokens drained.
    pub(crate) fn drain<F>(&self, mut f: F) -> usize
    where
        F: FnMut(ReclaimToken),
    {
        let _guard = self.shared.drain_lock.lock();
        let mut drained = 0;
        while let Some(token) = self.shared.pending.pop() {
            f(token);
            drained += 1;
        }
        drained
    }
}

impl fmt::Debug for ReclaimQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReclaimQueue")
            .field("pending", &self.pending())
            .finish()
    }
}
