use std::{hash::Hash, time::Instant};

use crossbeam_channel::{Receiver, Sender, select};

use crate::dispatch::Dispatcher;
use crate::task::{Task, TimerInfo};
use crate::wheel::Wheel;

/// Messages accepted by the worker inbox.
pub(crate) enum Request<K, A> {
    Add(Task<K, A>),
    Remove(K),
    Refresh(Task<K, A>),
    Get {
        key: K,
        reply: Sender<Option<TimerInfo<A>>>,
    },
    Len {
        reply: Sender<usize>,
    },
}

/// Why the worker loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Exit {
    Stopped,
    ClockClosed,
    InboxClosed,
}

/// Sole owner of the wheel state while the wheel is running.
///
/// Everything that touches `wheel` happens on the thread running
/// [`Worker::run`], one event at a time.
pub(crate) struct Worker<K, A> {
    pub(crate) wheel: Wheel<K, A>,
    pub(crate) inbox: Receiver<Request<K, A>>,
}

impl<K, A> Worker<K, A>
where
    K: Eq + Hash + Clone + Send + 'static,
    A: Clone + Send + 'static,
{
    pub(crate) fn new(wheel: Wheel<K, A>, inbox: Receiver<Request<K, A>>) -> Self {
        Self { wheel, inbox }
    }

    /// Handle ticks and requests until `stop` fires or a channel closes.
    pub(crate) fn run(
        &mut self,
        clock: &Receiver<Instant>,
        stop: &Receiver<()>,
        dispatcher: &Dispatcher,
    ) -> Exit {
        tracing::debug!(
            slot_num = self.wheel.slot_num(),
            interval = ?self.wheel.interval(),
            curr_pos = self.wheel.curr_pos(),
            dispatch_threads = dispatcher.threads(),
            "wheel worker started"
        );

        let inbox = self.inbox.clone();
        let exit = loop {
            select! {
                recv(stop) -> _ => break Exit::Stopped,
                recv(inbox) -> msg => match msg {
                    Ok(request) => self.handle(request),
                    Err(_) => break Exit::InboxClosed,
                },
                recv(clock) -> tick => match tick {
                    Ok(_) => self.on_tick(dispatcher),
                    Err(_) => break Exit::ClockClosed,
                },
            }
        };

        tracing::debug!(?exit, pending = self.wheel.len(), "wheel worker exiting");
        exit
    }

    pub(crate) fn handle(&mut self, request: Request<K, A>) {
        match request {
            Request::Add(task) => {
                let placement = self.wheel.add(task);
                tracing::trace!(slot = placement.slot, circle = placement.circle, "timer added");
            }
            Request::Remove(key) => {
                let removed = self.wheel.remove(&key).is_some();
                tracing::trace!(removed, "timer remove");
            }
            Request::Refresh(task) => {
                let placement = self.wheel.refresh(task);
                tracing::trace!(slot = placement.slot, circle = placement.circle, "timer refreshed");
            }
            Request::Get { key, reply } => {
                // The caller may have given up; nothing to do then.
                let _ = reply.send(self.wheel.info(&key));
            }
            Request::Len { reply } => {
                let _ = reply.send(self.wheel.len());
            }
        }
    }

    fn on_tick(&mut self, dispatcher: &Dispatcher) {
        let pos = self.wheel.curr_pos();
        let fired = self.wheel.tick(|task| dispatcher.dispatch(task));

        if fired > 0 {
            tracing::trace!(slot = pos, fired, backlog = dispatcher.backlog(), "tick");
        }
    }
}
