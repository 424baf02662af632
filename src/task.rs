use std::{fmt, sync::Arc, time::Duration};

/// User callback invoked with the task's argument when the task expires.
pub type Callback<A> = Arc<dyn Fn(A) + Send + Sync + 'static>;

/// One scheduled callback.
///
/// `circle` counts the full wheel revolutions still owed before the task is
/// due. It is assigned by the wheel on insertion and decremented each time
/// the cursor passes the task's slot.
pub struct Task<K, A> {
    pub(crate) key: Option<K>,
    pub(crate) delay: Duration,
    pub(crate) circle: usize,
    pub(crate) callback: Callback<A>,
    pub(crate) arg: A,
}

impl<K, A> Task<K, A> {
    pub fn new(delay: Duration, key: Option<K>, callback: Callback<A>, arg: A) -> Self {
        Self {
            key,
            delay,
            circle: 0,
            callback,
            arg,
        }
    }

    #[inline]
    pub fn key(&self) -> Option<&K> {
        self.key.as_ref()
    }

    #[inline]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Remaining full revolutions before the task fires.
    #[inline]
    pub fn circle(&self) -> usize {
        self.circle
    }

    #[inline]
    pub fn arg(&self) -> &A {
        &self.arg
    }

    #[inline]
    pub(crate) fn has_key(&self, key: &K) -> bool
    where
        K: PartialEq,
    {
        self.key.as_ref() == Some(key)
    }

    /// Consume the task and run its callback on the current thread.
    pub fn fire(self) {
        (self.callback)(self.arg)
    }

    pub(crate) fn info(&self) -> TimerInfo<A>
    where
        A: Clone,
    {
        TimerInfo {
            delay: self.delay,
            callback: Arc::clone(&self.callback),
            arg: self.arg.clone(),
        }
    }
}

impl<K: fmt::Debug, A: fmt::Debug> fmt::Debug for Task<K, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("key", &self.key)
            .field("delay", &self.delay)
            .field("circle", &self.circle)
            .field("arg", &self.arg)
            .finish_non_exhaustive()
    }
}

/// Snapshot of a pending timer, as returned by `get_timer`.
pub struct TimerInfo<A> {
    pub delay: Duration,
    pub callback: Callback<A>,
    pub arg: A,
}

impl<A: fmt::Debug> fmt::Debug for TimerInfo<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerInfo")
            .field("delay", &self.delay)
            .field("arg", &self.arg)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_new_task_starts_at_circle_zero() {
        let task: Task<&str, u32> = Task::new(Duration::from_secs(3), Some("a"), Arc::new(|_| {}), 7);

        assert_eq!(task.key(), Some(&"a"));
        assert_eq!(task.delay(), Duration::from_secs(3));
        assert_eq!(task.circle(), 0);
        assert_eq!(*task.arg(), 7);
    }

    #[test]
    fn test_fire_passes_argument() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);

        let task: Task<u32, usize> = Task::new(
            Duration::ZERO,
            None,
            Arc::new(move |v| {
                seen_clone.store(v, Ordering::SeqCst);
            }),
            42,
        );
        task.fire();

        assert_eq!(seen.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn test_info_shares_callback() {
        let callback: Callback<u8> = Arc::new(|_| {});
        let task: Task<u32, u8> = Task::new(Duration::from_millis(5), Some(1), Arc::clone(&callback), 9);

        let info = task.info();

        assert_eq!(info.delay, Duration::from_millis(5));
        assert_eq!(info.arg, 9);
        assert!(Arc::ptr_eq(&info.callback, &callback));
    }
}
