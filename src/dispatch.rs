//! Detached execution of expired callbacks.
//!
//! The worker hands every expired task to a [`Dispatcher`] and moves on to
//! the next event. Callbacks run on a small pool of named threads, each call
//! isolated with `catch_unwind` so that a panicking callback is logged and
//! never reaches the worker or the other callbacks.

use std::{
    io,
    panic::{self, AssertUnwindSafe},
    thread::{self, JoinHandle},
};

use crossbeam_channel::{Receiver, Sender};

use crate::task::Task;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed pool of threads running expired callbacks.
///
/// Dropping the dispatcher closes its queue; threads finish the callbacks
/// already queued and exit without being joined.
pub(crate) struct Dispatcher {
    jobs: Sender<Job>,
    threads: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    pub(crate) fn spawn(threads: usize, name: &str) -> io::Result<Self> {
        let (jobs, queue) = crossbeam_channel::unbounded::<Job>();

        let threads = (0..threads)
            .map(|i| {
                let queue = queue.clone();
                thread::Builder::new()
                    .name(format!("{name}-dispatch-{i}"))
                    .spawn(move || run(queue))
            })
            .collect::<io::Result<Vec<_>>>()?;

        Ok(Self { jobs, threads })
    }

    /// Queue `task` to fire on the pool.
    pub(crate) fn dispatch<K, A>(&self, task: Task<K, A>)
    where
        K: Send + 'static,
        A: Send + 'static,
    {
        // Receivers live as long as the pool threads, which only exit once
        // every sender is gone.
        if self.jobs.send(Box::new(move || task.fire())).is_err() {
            tracing::error!("dispatch queue closed, dropping expired callback");
        }
    }

    #[inline]
    pub(crate) fn threads(&self) -> usize {
        self.threads.len()
    }

    /// Callbacks queued but not yet started.
    #[inline]
    pub(crate) fn backlog(&self) -> usize {
        self.jobs.len()
    }
}

fn run(queue: Receiver<Job>) {
    for job in queue {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
            tracing::warn!(panic = panic_message(payload.as_ref()), "timer callback panicked");
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}
