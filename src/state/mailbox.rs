use std::collections::HashMap;
use std::hash::Hash;

use parking_lot::Mutex;

/// A lock-guarded `HashMap` shared between producer and consumer stages
/// (spec §4.1). Every cross-stage handoff in this crate goes through one
/// of these rather than a channel, matching the original design's shared
/// mutable mailboxes.
#[derive(Debug, Default)]
pub struct Mailbox<K, V> {
    inner: Mutex<HashMap<K, V>>,
}

impl<K, V> Mailbox<K, V>
where
    K: Eq + Hash + Clone,
{
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Runs `f` against the locked map and returns its result. Kept
    /// generic so callers express read/write/drain as closures instead
    /// of exposing the lock guard past this module's boundary.
    pub fn with<R>(&self, f: impl FnOnce(&mut HashMap<K, V>) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }

    /// Atomically swaps out the entire map, returning its previous
    /// contents. Used by the DSP tick to drain `unprocessed_data` without
    /// holding the lock across computation (spec §4.4a).
    pub fn take(&self) -> HashMap<K, V> {
        std::mem::take(&mut *self.inner.lock())
    }

    /// Reads the map without removing anything, for the raw-passthrough
    /// sink which must observe `unprocessed_data` without clearing it
    /// (spec §4.5 Raw passthrough).
    pub fn snapshot(&self) -> HashMap<K, V>
    where
        V: Clone,
    {
        self.inner.lock().clone()
    }

    pub fn insert(&self, key: K, value: V) {
        self.inner.lock().insert(key, value);
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.inner.lock().remove(key)
    }

    pub fn get_cloned(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.inner.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn take_empties_the_mailbox() {
        let mailbox: Mailbox<u32, Vec<u8>> = Mailbox::new();
        mailbox.insert(1, vec![1, 2, 3]);
        let taken = mailbox.take();
        assert_eq!(1, taken.len());
        assert!(mailbox.is_empty());
    }

    #[test]
    fn snapshot_does_not_clear() {
        let mailbox: Mailbox<u32, Vec<u8>> = Mailbox::new();
        mailbox.insert(1, vec![1]);
        let snap = mailbox.snapshot();
        assert_eq!(1, snap.len());
        assert_eq!(1, mailbox.len());
    }
}
