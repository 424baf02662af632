use std::{collections::HashMap, hash::Hash, time::Duration};

use crate::config::ConfigError;
use crate::slot::Slot;
use crate::task::{Task, TimerInfo};

/// Where a task lands on the wheel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub slot: usize,
    pub circle: usize,
}

/// Single-level timing wheel.
///
/// This is the synchronous engine: it owns the slot array, the key index
/// and the cursor, and is advanced one slot per call to [`Wheel::tick`].
/// It has no internal synchronization. [`TimeWheel`](crate::TimeWheel)
/// moves it onto a dedicated worker thread; it can also be embedded
/// directly into an existing event loop.
///
/// # Duplicate keys
///
/// The index stores one slot per key. Adding a task under a key that is
/// already live repoints the index at the new task. The earlier task stays
/// on the wheel and fires on schedule, but can no longer be reached by
/// [`Wheel::get`], [`Wheel::remove`] or [`Wheel::refresh`]. This holds when
/// both tasks share a slot too: lookups within a slot pick the most recent
/// insertion.
pub struct Wheel<K, A> {
    interval: Duration,
    slots: Box<[Slot<K, A>]>,
    index: HashMap<K, usize>,
    curr_pos: usize,
}

impl<K, A> Wheel<K, A>
where
    K: Eq + Hash + Clone,
{
    pub fn new(interval: Duration, slot_num: usize) -> Result<Self, ConfigError> {
        if interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        if slot_num == 0 {
            return Err(ConfigError::ZeroSlots);
        }

        Ok(Self {
            interval,
            slots: (0..slot_num)
                .map(|_| Slot::new())
                .collect::<Vec<_>>()
                .into_boxed_slice(),
            index: HashMap::new(),
            curr_pos: 0,
        })
    }

    /// Compute slot and circle for a task due `delay` from now.
    ///
    /// Delays are truncated to whole ticks.
    pub fn placement(&self, delay: Duration) -> Placement {
        let slot_num = self.slots.len() as u128;
        let steps = delay.as_nanos() / self.interval.as_nanos();

        let circle = usize::try_from(steps / slot_num).unwrap_or(usize::MAX);
        let slot = ((self.curr_pos as u128 + steps % slot_num) % slot_num) as usize;

        Placement { slot, circle }
    }

    /// Schedule `task`. Any existing index entry for its key is overwritten.
    pub fn add(&mut self, mut task: Task<K, A>) -> Placement {
        let placement = self.placement(task.delay);
        task.circle = placement.circle;

        if let Some(key) = &task.key {
            if let Some(prev) = self.index.insert(key.clone(), placement.slot) {
                tracing::debug!(
                    prev_slot = prev,
                    slot = placement.slot,
                    "key already scheduled, earlier task is orphaned"
                );
            }
        }

        self.slots[placement.slot].push(task);
        placement
    }

    /// Cancel the task indexed under `key`, leaving a tombstone in its slot.
    pub fn remove(&mut self, key: &K) -> Option<Task<K, A>> {
        let slot = self.index.remove(key)?;
        self.slots[slot].take(key)
    }

    /// Remove `task`'s key, then schedule `task` afresh from the current position.
    pub fn refresh(&mut self, task: Task<K, A>) -> Placement {
        if let Some(key) = &task.key {
            self.remove(key);
        }
        self.add(task)
    }

    pub fn get(&self, key: &K) -> Option<&Task<K, A>> {
        let slot = *self.index.get(key)?;
        self.slots[slot].find(key)
    }

    /// Snapshot of the task indexed under `key`.
    pub fn info(&self, key: &K) -> Option<TimerInfo<A>>
    where
        A: Clone,
    {
        self.get(key).map(Task::info)
    }

    /// Slot index the key currently maps to.
    #[inline]
    pub fn position_of(&self, key: &K) -> Option<usize> {
        self.index.get(key).copied()
    }

    /// Process the slot under the cursor, then advance the cursor by one.
    ///
    /// Expired tasks are passed to `on_expire`; the wheel never runs
    /// callbacks itself. Returns the number of expired tasks.
    pub fn tick(&mut self, mut on_expire: impl FnMut(Task<K, A>)) -> usize {
        let pos = self.curr_pos;
        let index = &mut self.index;
        let slot = &mut self.slots[pos];
        let mut released: Vec<K> = Vec::new();

        let expired = slot.advance(|task| {
            if let Some(key) = &task.key {
                if index.get(key) == Some(&pos) {
                    released.push(key.clone());
                }
            }
            on_expire(task);
        });

        // A same-key task with a larger circle may still live here.
        for key in released {
            if !slot.contains_key(&key) {
                index.remove(&key);
            }
        }

        self.curr_pos = (pos + 1) % self.slots.len();
        expired
    }

    /// Live tasks on the wheel.
    pub fn len(&self) -> usize {
        self.slots.iter().map(Slot::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Slot::is_empty)
    }

    #[inline]
    pub fn curr_pos(&self) -> usize {
        self.curr_pos
    }

    #[inline]
    pub fn slot_num(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Tasks (live and tombstoned) in `slot`.
    #[inline]
    pub fn slot_raw_len(&self, slot: usize) -> usize {
        self.slots[slot].raw_len()
    }
}
