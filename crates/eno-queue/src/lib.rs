//! eno-queue
//!
//! Deduplicating async work queue with per-item exponential backoff.
//!
//! Semantics:
//! - Adding an item already waiting in the queue is a no-op.
//! - Adding an item currently being processed does not create a second
//!   in-flight task; one additional pass is scheduled when the current
//!   one calls [`WorkQueue::done`].
//! - [`WorkQueue::add_rate_limited`] delays the re-add by an exponential
//!   backoff derived from the item's consecutive failure count.
//! - [`WorkQueue::forget`] resets the failure count.
//!
//! Workers drain the queue with `get`/`done` pairs; `get` returns `None`
//! once the queue is shut down and empty.

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;

/// Default backoff floor for failed items.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(250);

/// Default backoff ceiling.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// A deduplicating work queue shared between producers and worker tasks.
///
/// Cloning is cheap and clones share the same queue.
pub struct WorkQueue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for WorkQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<T> {
    state: Mutex<State<T>>,
    notify: Notify,
    base_delay: Duration,
    max_delay: Duration,
}

struct State<T> {
    queue: VecDeque<T>,
    queued: HashSet<T>,
    processing: HashSet<T>,
    redo: HashSet<T>,
    failures: HashMap<T, u32>,
    shut_down: bool,
}

impl<T> Default for State<T> {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            queued: HashSet::new(),
            processing: HashSet::new(),
            redo: HashSet::new(),
            failures: HashMap::new(),
            shut_down: false,
        }
    }
}

impl<T> WorkQueue<T>
where
    T: Clone + Eq + Hash + Send + 'static,
{
    pub fn new() -> Self {
        Self::with_backoff(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }

    pub fn with_backoff(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                notify: Notify::new(),
                base_delay,
                max_delay,
            }),
        }
    }

    /// Enqueue an item for processing. Duplicate of a waiting item: no-op.
    /// Duplicate of an in-flight item: schedules one extra pass.
    pub fn add(&self, item: T) {
        {
            let mut state = self.inner.state.lock().unwrap();
            if state.shut_down {
                return;
            }
            if state.processing.contains(&item) {
                state.redo.insert(item);
                return;
            }
            if !state.queued.insert(item.clone()) {
                return;
            }
            state.queue.push_back(item);
        }
        self.inner.notify.notify_waiters();
    }

    /// Enqueue after the item's current backoff delay, and bump its
    /// consecutive failure count.
    pub fn add_rate_limited(&self, item: T) {
        let delay = {
            let mut state = self.inner.state.lock().unwrap();
            if state.shut_down {
                return;
            }
            let failures = state.failures.entry(item.clone()).or_insert(0);
            let delay = backoff(self.inner.base_delay, self.inner.max_delay, *failures);
            *failures = failures.saturating_add(1);
            delay
        };
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(item);
        });
    }

    /// Reset the item's failure count.
    pub fn forget(&self, item: &T) {
        self.inner.state.lock().unwrap().failures.remove(item);
    }

    /// Pop the next item, waiting if the queue is empty. Returns `None`
    /// once the queue is shut down and drained.
    pub async fn get(&self) -> Option<T> {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        loop {
            notified.as_mut().enable();
            {
                let mut state = self.inner.state.lock().unwrap();
                if let Some(item) = state.queue.pop_front() {
                    state.queued.remove(&item);
                    state.processing.insert(item.clone());
                    return Some(item);
                }
                if state.shut_down {
                    return None;
                }
            }
            notified.as_mut().await;
            notified.set(self.inner.notify.notified());
        }
    }

    /// Mark an item returned by [`WorkQueue::get`] as finished. If the
    /// item was re-added while in flight, it goes straight back into the
    /// queue.
    pub fn done(&self, item: &T) {
        let readd = {
            let mut state = self.inner.state.lock().unwrap();
            state.processing.remove(item);
            if state.shut_down {
                false
            } else if state.redo.remove(item) && state.queued.insert(item.clone()) {
                state.queue.push_back(item.clone());
                true
            } else {
                false
            }
        };
        if readd {
            self.inner.notify.notify_waiters();
        }
    }

    /// Stop accepting work and wake all waiting workers. Items already
    /// queued are still handed out; pending delayed re-adds are dropped.
    pub fn shut_down(&self) {
        let waiting = {
            let mut state = self.inner.state.lock().unwrap();
            state.shut_down = true;
            state.queue.len()
        };
        tracing::debug!(waiting, "work queue shutting down");
        self.inner.notify.notify_waiters();
    }

    /// Number of items waiting (not counting in-flight ones).
    pub fn len(&self) -> usize {
        self.inner.state.lock().unwrap().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consecutive failure count for an item. Exposed for tests.
    pub fn failures(&self, item: &T) -> u32 {
        self.inner
            .state
            .lock()
            .unwrap()
            .failures
            .get(item)
            .copied()
            .unwrap_or(0)
    }
}

impl<T> Default for WorkQueue<T>
where
    T: Clone + Eq + Hash + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

fn backoff(base: Duration, max: Duration, failures: u32) -> Duration {
    let exp = failures.min(24);
    base.saturating_mul(2u32.saturating_pow(exp)).min(max)
}

/// Spawn a pool of worker tasks draining the queue.
///
/// Each worker pops an item, runs the handler, and marks the item done;
/// the queue's dedup keeps one in-flight task per item no matter how many
/// workers race. Workers exit when the queue shuts down, and the returned
/// handles can be awaited to join them.
pub fn spawn_workers<T, F, Fut>(
    queue: &WorkQueue<T>,
    workers: usize,
    handler: F,
) -> Vec<tokio::task::JoinHandle<()>>
where
    T: Clone + Eq + Hash + Send + 'static,
    F: Fn(T) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    (0..workers)
        .map(|_| {
            let queue = queue.clone();
            let handler = handler.clone();
            tokio::spawn(async move {
                while let Some(item) = queue.get().await {
                    handler(item.clone()).await;
                    queue.done(&item);
                }
            })
        })
        .collect()
}
