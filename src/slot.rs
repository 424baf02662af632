use crate::task::Task;

const DEFAULT_SLOT_CAP: usize = 16;

/// Unordered bucket of tasks due on the same wheel position.
///
/// Removal leaves a tombstone (`None`) in place so that indices of the
/// other entries never shift. Tombstones are dropped the next time the
/// slot is compacted by [`Slot::advance`].
pub struct Slot<K, A> {
    entries: Vec<Option<Task<K, A>>>,
    live: usize,
}

impl<K, A> Default for Slot<K, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, A> Slot<K, A> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SLOT_CAP)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            live: 0,
        }
    }

    #[inline]
    pub fn push(&mut self, task: Task<K, A>) {
        self.entries.push(Some(task));
        self.live += 1;
    }

    /// Live tasks in the slot.
    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Live tasks plus tombstones.
    #[inline]
    pub fn raw_len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task<K, A>> {
        self.entries.iter().flatten()
    }

    /// Run one wheel pass over this slot.
    ///
    /// Tombstones are dropped, tasks owing more revolutions have their circle
    /// decremented and stay, tasks at circle 0 are handed to `on_expire`.
    /// Returns the number of expired tasks.
    pub fn advance(&mut self, mut on_expire: impl FnMut(Task<K, A>)) -> usize {
        let mut kept = 0;
        let mut expired = 0;

        // Compact in place: survivors are written back at or before their
        // own index, so nothing unread is overwritten.
        for i in 0..self.entries.len() {
            let Some(mut task) = self.entries[i].take() else {
                continue;
            };
            if task.circle > 0 {
                task.circle -= 1;
                self.entries[kept] = Some(task);
                kept += 1;
                continue;
            }
            expired += 1;
            on_expire(task);
        }

        self.entries.truncate(kept);
        self.live = kept;
        expired
    }
}

impl<K: PartialEq, A> Slot<K, A> {
    /// Most recently inserted live task carrying `key`.
    pub fn find(&self, key: &K) -> Option<&Task<K, A>> {
        self.entries.iter().rev().flatten().find(|task| task.has_key(key))
    }

    #[inline]
    pub fn contains_key(&self, key: &K) -> bool {
        self.find(key).is_some()
    }

    /// Tombstone the most recently inserted live task carrying `key` and
    /// return it.
    pub fn take(&mut self, key: &K) -> Option<Task<K, A>> {
        let entry = self
            .entries
            .iter_mut()
            .rev()
            .find(|entry| entry.as_ref().is_some_and(|task| task.has_key(key)))?;

        let task = entry.take();
        self.live -= 1;
        task
    }
}
