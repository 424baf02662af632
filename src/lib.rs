//! Single-level timing wheel for large numbers of one-shot timers.
//!
//! A [`TimeWheel`] schedules delayed callbacks with O(1) insertion and
//! per-tick expiry. All wheel state lives on one worker thread; producers
//! talk to it through a [`WheelHandle`], so no locks guard the slots or the
//! key index. Expired callbacks run on a separate dispatch pool and never
//! stall the tick cadence.
//!
//! ```no_run
//! use std::time::Duration;
//! use slotwheel::TimeWheel;
//!
//! let mut wheel: TimeWheel<&str, u32> = TimeWheel::new(Duration::from_millis(10), 64)?;
//! wheel.start()?;
//!
//! wheel.add_timer(Duration::from_millis(250), Some("session-7"), |id| println!("expired {id}"), 7)?;
//! wheel.refresh_timer(Duration::from_millis(500), "session-7", |id| println!("expired {id}"), 7)?;
//! assert!(wheel.get_timer("session-7")?.is_some());
//!
//! wheel.remove_timer("session-7")?;
//! wheel.stop()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::{
    hash::Hash,
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, Sender};
use thiserror::Error;

use crate::dispatch::Dispatcher;
use crate::worker::{Request, Worker};

mod config;
mod dispatch;
mod slot;
mod task;
mod wheel;
mod worker;

pub use config::{ConfigError, WheelConfig};
pub use task::{Callback, Task, TimerInfo};
pub use wheel::{Placement, Wheel};

#[derive(Debug, Error)]
pub enum WheelError {
    #[error("time wheel is already running")]
    AlreadyRunning,
    #[error("time wheel is not running")]
    NotRunning,
    #[error("time wheel worker is gone")]
    Disconnected,
    #[error("failed to spawn time wheel thread")]
    Spawn(#[source] io::Error),
    #[error("time wheel state was lost with its worker thread")]
    WorkerLost,
}

/// Cloneable producer side of a [`TimeWheel`].
///
/// Every operation is a message to the wheel's worker; add, remove and
/// refresh return once the message is queued, get and len wait for the
/// worker's reply. Requests from one handle are applied in the order they
/// were sent.
///
/// Operations fail with [`WheelError::NotRunning`] while the wheel is
/// stopped. A request racing with [`TimeWheel::stop`] may instead stay
/// queued and be applied on the next start.
pub struct WheelHandle<K, A> {
    requests: Sender<Request<K, A>>,
    running: Arc<AtomicBool>,
}

impl<K, A> Clone for WheelHandle<K, A> {
    fn clone(&self) -> Self {
        Self {
            requests: self.requests.clone(),
            running: Arc::clone(&self.running),
        }
    }
}

impl<K, A> WheelHandle<K, A>
where
    K: Eq + Hash + Clone + Send + 'static,
    A: Clone + Send + 'static,
{
    /// Schedule `callback(arg)` to run after `delay`.
    ///
    /// Anonymous timers (`key == None`) cannot be removed, refreshed or
    /// queried. Adding under a key that is already live leaves the earlier
    /// timer scheduled but unreachable by key; use
    /// [`refresh_timer`](Self::refresh_timer) to replace it.
    pub fn add_timer<F>(&self, delay: Duration, key: Option<K>, callback: F, arg: A) -> Result<(), WheelError>
    where
        F: Fn(A) + Send + Sync + 'static,
    {
        self.add_task(Task::new(delay, key, Arc::new(callback), arg))
    }

    /// Schedule a prebuilt task. Its circle is recomputed by the wheel.
    pub fn add_task(&self, task: Task<K, A>) -> Result<(), WheelError> {
        self.send(Request::Add(task))
    }

    /// Cancel the timer under `key`. Unknown keys are ignored.
    pub fn remove_timer(&self, key: K) -> Result<(), WheelError> {
        self.send(Request::Remove(key))
    }

    /// Cancel the timer under `key`, if any, and schedule a new one in the
    /// same worker step.
    pub fn refresh_timer<F>(&self, delay: Duration, key: K, callback: F, arg: A) -> Result<(), WheelError>
    where
        F: Fn(A) + Send + Sync + 'static,
    {
        self.send(Request::Refresh(Task::new(delay, Some(key), Arc::new(callback), arg)))
    }

    /// Look up the pending timer under `key`.
    pub fn get_timer(&self, key: K) -> Result<Option<TimerInfo<A>>, WheelError> {
        let (reply, rx) = crossbeam_channel::bounded(1);
        self.send(Request::Get { key, reply })?;
        rx.recv().map_err(|_| WheelError::Disconnected)
    }

    /// Number of pending timers.
    pub fn len(&self) -> Result<usize, WheelError> {
        let (reply, rx) = crossbeam_channel::bounded(1);
        self.send(Request::Len { reply })?;
        rx.recv().map_err(|_| WheelError::Disconnected)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn send(&self, request: Request<K, A>) -> Result<(), WheelError> {
        if !self.is_running() {
            return Err(WheelError::NotRunning);
        }
        self.requests.send(request).map_err(|_| WheelError::Disconnected)
    }
}

/// Body of the worker thread. It waits for the wheel state to be handed
/// over, so a failed spawn leaves that state with the caller.
type WorkerMain<K, A> = Box<dyn FnOnce() -> Option<Worker<K, A>> + Send>;

type WorkerThread<K, A> = JoinHandle<Option<Worker<K, A>>>;

enum State<K, A> {
    Idle(Worker<K, A>),
    Running {
        stop: Sender<()>,
        thread: WorkerThread<K, A>,
    },
    Lost,
}

/// Timing wheel driven by a periodic clock on a dedicated worker thread.
///
/// Construction does not start anything; call [`start`](Self::start).
/// A stopped wheel keeps its pending timers and can be started again.
/// Ticks that elapse while stopped are not replayed.
pub struct TimeWheel<K, A>
where
    K: Eq + Hash + Clone + Send + 'static,
    A: Clone + Send + 'static,
{
    config: WheelConfig,
    handle: WheelHandle<K, A>,
    state: State<K, A>,
}

impl<K, A> TimeWheel<K, A>
where
    K: Eq + Hash + Clone + Send + 'static,
    A: Clone + Send + 'static,
{
    pub fn new(interval: Duration, slot_num: usize) -> Result<Self, ConfigError> {
        Self::with_config(WheelConfig::new(interval, slot_num))
    }

    pub fn with_config(config: WheelConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let wheel = Wheel::new(config.interval, config.slot_num)?;
        let (requests, inbox) = crossbeam_channel::bounded(config.inbox_capacity);

        Ok(Self {
            config,
            handle: WheelHandle {
                requests,
                running: Arc::new(AtomicBool::new(false)),
            },
            state: State::Idle(Worker::new(wheel, inbox)),
        })
    }

    /// Start the clock at the configured interval and the worker loop.
    pub fn start(&mut self) -> Result<(), WheelError> {
        let clock = crossbeam_channel::tick(self.config.interval);
        self.start_with_clock(clock)
    }

    /// Start the worker loop, advancing the wheel once per message on `clock`.
    ///
    /// The worker stops on its own if `clock` disconnects.
    pub fn start_with_clock(&mut self, clock: Receiver<Instant>) -> Result<(), WheelError> {
        self.launch(clock, |builder, main| builder.spawn(main))
    }

    fn launch<S>(&mut self, clock: Receiver<Instant>, spawn: S) -> Result<(), WheelError>
    where
        S: FnOnce(thread::Builder, WorkerMain<K, A>) -> io::Result<WorkerThread<K, A>>,
    {
        let worker = match std::mem::replace(&mut self.state, State::Lost) {
            State::Idle(worker) => worker,
            // Worker exited on its own after its clock disconnected. The flag
            // is cleared only after `run` returns, so the join is immediate.
            State::Running { thread, .. } if thread.is_finished() || !self.handle.is_running() => {
                reclaim(thread)?
            }
            running @ State::Running { .. } => {
                self.state = running;
                return Err(WheelError::AlreadyRunning);
            }
            State::Lost => return Err(WheelError::WorkerLost),
        };

        let dispatcher = match Dispatcher::spawn(self.config.dispatch_threads, &self.config.thread_name) {
            Ok(dispatcher) => dispatcher,
            Err(e) => {
                self.state = State::Idle(worker);
                return Err(WheelError::Spawn(e));
            }
        };

        let (stop, stop_rx) = crossbeam_channel::bounded(0);
        let (handoff, handoff_rx) = crossbeam_channel::bounded::<Worker<K, A>>(1);
        let running = Arc::clone(&self.handle.running);
        running.store(true, Ordering::Release);

        let main: WorkerMain<K, A> = Box::new(move || {
            let mut worker = handoff_rx.recv().ok()?;
            worker.run(&clock, &stop_rx, &dispatcher);
            running.store(false, Ordering::Release);
            Some(worker)
        });

        let builder = thread::Builder::new().name(format!("{}-worker", self.config.thread_name));
        let thread = match spawn(builder, main) {
            Ok(thread) => thread,
            Err(e) => {
                tracing::warn!(error = %e, "failed to spawn time wheel worker");
                self.handle.running.store(false, Ordering::Release);
                self.state = State::Idle(worker);
                return Err(WheelError::Spawn(e));
            }
        };

        if let Err(returned) = handoff.send(worker) {
            self.handle.running.store(false, Ordering::Release);
            self.state = State::Idle(returned.into_inner());
            let _ = thread.join();
            return Err(WheelError::Spawn(io::Error::other("worker thread exited before startup")));
        }

        self.state = State::Running { stop, thread };
        Ok(())
    }

    /// Signal the worker to halt and wait for it to hand back the wheel.
    ///
    /// Stopping a wheel that is not running does nothing.
    pub fn stop(&mut self) -> Result<(), WheelError> {
        let (stop, thread) = match std::mem::replace(&mut self.state, State::Lost) {
            State::Running { stop, thread } => (stop, thread),
            idle @ State::Idle(_) => {
                self.state = idle;
                return Ok(());
            }
            State::Lost => return Ok(()),
        };

        // Fails only if the worker already exited on its own.
        let _ = stop.send(());
        self.handle.running.store(false, Ordering::Release);

        let worker = reclaim(thread)?;
        tracing::debug!(pending = worker.wheel.len(), "time wheel stopped");
        self.state = State::Idle(worker);
        Ok(())
    }

    /// Whether a worker is currently processing ticks and requests.
    pub fn is_running(&self) -> bool {
        self.handle.is_running()
    }

    /// A cloneable handle for submitting requests from other threads.
    pub fn handle(&self) -> WheelHandle<K, A> {
        self.handle.clone()
    }

    pub fn config(&self) -> &WheelConfig {
        &self.config
    }

    pub fn add_timer<F>(&self, delay: Duration, key: Option<K>, callback: F, arg: A) -> Result<(), WheelError>
    where
        F: Fn(A) + Send + Sync + 'static,
    {
        self.handle.add_timer(delay, key, callback, arg)
    }

    pub fn remove_timer(&self, key: K) -> Result<(), WheelError> {
        self.handle.remove_timer(key)
    }

    pub fn refresh_timer<F>(&self, delay: Duration, key: K, callback: F, arg: A) -> Result<(), WheelError>
    where
        F: Fn(A) + Send + Sync + 'static,
    {
        self.handle.refresh_timer(delay, key, callback, arg)
    }

    pub fn get_timer(&self, key: K) -> Result<Option<TimerInfo<A>>, WheelError> {
        self.handle.get_timer(key)
    }

    pub fn len(&self) -> Result<usize, WheelError> {
        self.handle.len()
    }
}

fn reclaim<K, A>(thread: WorkerThread<K, A>) -> Result<Worker<K, A>, WheelError> {
    thread.join().ok().flatten().ok_or(WheelError::WorkerLost)
}

impl<K, A> Drop for TimeWheel<K, A>
where
    K: Eq + Hash + Clone + Send + 'static,
    A: Clone + Send + 'static,
{
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!(error = %e, "time wheel did not stop cleanly");
        }
    }
}
