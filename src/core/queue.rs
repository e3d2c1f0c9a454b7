//! Serialized command queue
//! Every side effect that touches the device link is funneled through here and
//! executed one at a time, strictly in queue order, by a single worker task.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::core::device::DeviceState;

/// Modifiers attached to a queued action
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionOptions {
    /// Drop every pending action before enqueuing this one
    pub clear_queue_first: bool,
    /// Do not flush a frame after running
    pub skip_flush: bool,
    /// Pause the worker for this long after running
    pub delay: Duration,
    /// Insert ahead of the Nth pending action instead of appending
    pub insert_before: Option<usize>,
}

impl ActionOptions {
    /// Options for an action that supersedes everything still pending.
    pub fn superseding() -> Self {
        Self {
            clear_queue_first: true,
            ..Self::default()
        }
    }

    pub fn skip_flush(mut self) -> Self {
        self.skip_flush = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn at_index(mut self, index: usize) -> Self {
        self.insert_before = Some(index);
        self
    }
}

/// What a running action can reach: the bound device state and the queue itself.
pub struct ActionContext<'a> {
    pub device: &'a mut DeviceState,
    pub queue: &'a CommandQueue,
    heat_request: Option<u8>,
}

impl<'a> ActionContext<'a> {
    pub fn new(device: &'a mut DeviceState, queue: &'a CommandQueue) -> Self {
        Self {
            device,
            queue,
            heat_request: None,
        }
    }

    /// Asks the executor to send a heat command once the action returns.
    pub fn request_heat(&mut self, level: u8) {
        self.heat_request = Some(level);
    }

    pub fn heat_request(&self) -> Option<u8> {
        self.heat_request
    }
}

type ActionFn = Box<dyn FnOnce(&mut ActionContext<'_>) + Send>;

/// A unit of work plus its modifiers
pub struct QueuedAction {
    run: ActionFn,
    options: ActionOptions,
}

impl QueuedAction {
    pub fn new<F>(options: ActionOptions, run: F) -> Self
    where
        F: FnOnce(&mut ActionContext<'_>) + Send + 'static,
    {
        Self {
            run: Box::new(run),
            options,
        }
    }

    pub fn options(&self) -> ActionOptions {
        self.options
    }

    pub fn run(self, ctx: &mut ActionContext<'_>) {
        (self.run)(ctx)
    }
}

/// Ordered pending-action list guarded by its own lock
#[derive(Default)]
pub struct CommandQueue {
    pending: Mutex<VecDeque<QueuedAction>>,
    signal: Notify,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn pending(&self) -> MutexGuard<'_, VecDeque<QueuedAction>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueues a closure with the given modifiers.
    pub fn enqueue<F>(&self, options: ActionOptions, run: F)
    where
        F: FnOnce(&mut ActionContext<'_>) + Send + 'static,
    {
        self.push(QueuedAction::new(options, run));
    }

    pub fn push(&self, action: QueuedAction) {
        let options = action.options;
        {
            let mut pending = self.pending();
            if options.clear_queue_first && !pending.is_empty() {
                debug!("Dropping {} pending actions", pending.len());
                pending.clear();
            }
            match options.insert_before {
                Some(index) if index < pending.len() => pending.insert(index, action),
                _ => pending.push_back(action),
            }
        }
        self.signal.notify_one();
    }

    /// Drops every pending action, returning how many were discarded.
    pub fn clear(&self) -> usize {
        let mut pending = self.pending();
        let dropped = pending.len();
        pending.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.pending().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending().is_empty()
    }

    pub fn try_pop(&self) -> Option<QueuedAction> {
        self.pending().pop_front()
    }

    /// Pops the front action, waiting until one is available.
    pub async fn pop(&self) -> QueuedAction {
        loop {
            if let Some(action) = self.try_pop() {
                return action;
            }
            self.signal.notified().await;
        }
    }
}

/// Runs queued actions against the device link
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, action: QueuedAction);
}

/// Spawns the single worker that drains `queue` through `executor`.
pub fn spawn_worker(queue: Arc<CommandQueue>, executor: Arc<dyn ActionExecutor>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let action = queue.pop().await;
            let delay = action.options().delay;
            executor.execute(action).await;
            if !delay.is_zero() {
                sleep(delay).await;
            }
        }
    })
}
