use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_SLOT_NUM: usize = 60;
pub const DEFAULT_INBOX_CAPACITY: usize = 1;
pub const DEFAULT_DISPATCH_THREADS: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("tick interval must be greater than zero")]
    ZeroInterval,
    #[error("slot count must be greater than zero")]
    ZeroSlots,
    #[error("at least one dispatch thread is required")]
    ZeroDispatchThreads,
}

/// Configuration for a [`TimeWheel`](crate::TimeWheel).
#[derive(Clone, Debug)]
pub struct WheelConfig {
    /// Duration of one tick. Delays are truncated to whole ticks.
    pub interval: Duration,

    /// Number of slots in the wheel. One revolution spans
    /// `interval * slot_num`.
    pub slot_num: usize,

    /// Depth of the request inbox shared by all producers.
    /// Producers block once this many requests are queued.
    /// Zero makes every request a rendezvous with the worker.
    pub inbox_capacity: usize,

    /// Threads running expired callbacks.
    ///
    /// Callbacks share this pool. Once every thread is busy, later expired
    /// callbacks queue behind the running ones, so with the default of one
    /// thread a single blocking callback delays every callback after it.
    /// Ticks are not delayed. Raise this when callbacks may block.
    pub dispatch_threads: usize,

    /// Prefix for the worker and dispatch thread names.
    pub thread_name: String,
}

impl Default for WheelConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            slot_num: DEFAULT_SLOT_NUM,
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
            dispatch_threads: DEFAULT_DISPATCH_THREADS,
            thread_name: "slotwheel".to_string(),
        }
    }
}

impl WheelConfig {
    pub fn new(interval: Duration, slot_num: usize) -> Self {
        Self {
            interval,
            slot_num,
            ..Self::default()
        }
    }

    pub fn with_inbox_capacity(mut self, inbox_capacity: usize) -> Self {
        self.inbox_capacity = inbox_capacity;
        self
    }

    pub fn with_dispatch_threads(mut self, dispatch_threads: usize) -> Self {
        self.dispatch_threads = dispatch_threads;
        self
    }

    pub fn with_thread_name(mut self, thread_name: impl Into<String>) -> Self {
        self.thread_name = thread_name.into();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        if self.slot_num == 0 {
            return Err(ConfigError::ZeroSlots);
        }
        if self.dispatch_threads == 0 {
            return Err(ConfigError::ZeroDispatchThreads);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert_eq!(WheelConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let cfg = WheelConfig::new(Duration::ZERO, 10);
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroInterval));
    }

    #[test]
    fn test_zero_slots_rejected() {
        let cfg = WheelConfig::new(Duration::from_millis(1), 0);
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroSlots));
    }

    #[test]
    fn test_zero_dispatch_threads_rejected() {
        let cfg = WheelConfig::new(Duration::from_millis(1), 8).with_dispatch_threads(0);
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroDispatchThreads));
    }

    #[test]
    fn test_builders() {
        let cfg = WheelConfig::new(Duration::from_millis(10), 32)
            .with_inbox_capacity(0)
            .with_dispatch_threads(4)
            .with_thread_name("timeouts");

        assert_eq!(cfg.interval, Duration::from_millis(10));
        assert_eq!(cfg.slot_num, 32);
        assert_eq!(cfg.inbox_capacity, 0);
        assert_eq!(cfg.dispatch_threads, 4);
        assert_eq!(cfg.thread_name, "timeouts");
        assert!(cfg.validate().is_ok());
    }
}
