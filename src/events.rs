//! Focus-change gate
//!
//! The panel reacts to the host's buffer-focus events, but most window and
//! buffer switches it performs itself would re-enter that handler. The gate
//! sits between the host's raw event stream and the subscribers:
//!
//! - while any suppression guard is alive, events are dropped
//! - buffer ids queued with [`FocusEventGate::skip_next`] swallow exactly one event each
//! - everything else goes through a trailing-edge throttle per subscriber
//!
//! The filtering happens when the host fires the event, not when a
//! subscriber gets around to reading it, so an event raised inside a
//! suppressed block is dropped even if the throttle task runs later.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Host buffer number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u32);

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Gate in front of the host's focus-change stream
pub struct FocusEventGate {
    /// Number of live suppression guards
    suppress_depth: AtomicUsize,
    /// One-shot ids to ignore
    skip_queue: Mutex<Vec<BufferId>>,
    listeners: Mutex<Vec<mpsc::UnboundedSender<BufferId>>>,
    /// Admitted events, for debug logging
    event_count: AtomicU64,
    /// Report every admitted event at info level
    debug: AtomicBool,
}

impl FocusEventGate {
    pub fn new() -> Self {
        Self {
            suppress_depth: AtomicUsize::new(0),
            skip_queue: Mutex::new(Vec::new()),
            listeners: Mutex::new(Vec::new()),
            event_count: AtomicU64::new(0),
            debug: AtomicBool::new(false),
        }
    }

    pub fn set_debug(&self, debug: bool) {
        self.debug.store(debug, Ordering::Relaxed);
    }

    /// Number of events forwarded to subscribers so far
    pub fn event_count(&self) -> u64 {
        self.event_count.load(Ordering::Relaxed)
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppress_depth.load(Ordering::SeqCst) > 0
    }

    /// Suppress focus events until the returned guard is dropped.
    ///
    /// Guards nest and may overlap across suspension points; events stay
    /// suppressed while at least one is alive.
    pub fn suppress(&self) -> SuppressGuard<'_> {
        self.suppress_depth.fetch_add(1, Ordering::SeqCst);
        SuppressGuard { gate: self }
    }

    /// Run `block` with focus events suppressed.
    ///
    /// Suppression ends on every exit path: completion, error output, panic
    /// or the future being dropped. The block's output is returned unchanged.
    pub async fn run_suppressed<F>(&self, block: F) -> F::Output
    where
        F: Future,
    {
        let _guard = self.suppress();
        block.await
    }

    /// Ignore the next focus event for each of these buffers
    pub fn skip_next(&self, bufnrs: impl IntoIterator<Item = BufferId>) {
        let mut queue = lock(&self.skip_queue);
        queue.extend(bufnrs);
    }

    /// Number of pending one-shot skips
    pub fn pending_skips(&self) -> usize {
        lock(&self.skip_queue).len()
    }

    /// Entry point for the host's raw focus-change events.
    ///
    /// Returns whether the event was forwarded to the subscribers.
    pub fn fire(&self, bufnr: BufferId) -> bool {
        if !self.admit(bufnr) {
            return false;
        }

        let mut listeners = lock(&self.listeners);
        listeners.retain(|tx| tx.send(bufnr).is_ok());
        true
    }

    fn admit(&self, bufnr: BufferId) -> bool {
        if self.is_suppressed() {
            tracing::trace!("Focus event for buffer {} suppressed", bufnr);
            return false;
        }

        {
            let mut queue = lock(&self.skip_queue);
            if let Some(index) = queue.iter().position(|b| *b == bufnr) {
                queue.remove(index);
                tracing::trace!("Focus event for buffer {} skipped", bufnr);
                return false;
            }
        }

        let count = self.event_count.fetch_add(1, Ordering::Relaxed);
        if self.debug.load(Ordering::Relaxed) {
            tracing::info!("Focus change: buffer {}, count {}", bufnr, count);
        } else {
            tracing::debug!("Focus change: buffer {}, count {}", bufnr, count);
        }
        true
    }

    /// Subscribe to admitted focus changes.
    ///
    /// Events are throttled with a trailing edge: the first event opens a
    /// window of `delay`, later events in that window replace the pending
    /// buffer id, and when the window closes `handler` runs once with the last
    /// id. The next window cannot open before the handler has finished, so
    /// there is at most one invocation in flight.
    ///
    /// Must be called from within a tokio runtime.
    pub fn on_focus_change<F, Fut>(&self, delay: Duration, handler: F) -> FocusSubscription
    where
        F: Fn(BufferId) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.listeners).push(tx);
        let task = tokio::spawn(throttle(rx, delay, handler));
        FocusSubscription { task }
    }
}

impl Default for FocusEventGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps focus events suppressed while alive
#[must_use = "suppression ends as soon as the guard is dropped"]
pub struct SuppressGuard<'a> {
    gate: &'a FocusEventGate,
}

impl Drop for SuppressGuard<'_> {
    fn drop(&mut self) {
        self.gate.suppress_depth.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Handle on a focus subscription; unsubscribes when dropped
pub struct FocusSubscription {
    task: JoinHandle<()>,
}

impl FocusSubscription {
    pub fn dispose(self) {}
}

impl Drop for FocusSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn throttle<F, Fut>(
    mut events: mpsc::UnboundedReceiver<BufferId>,
    delay: Duration,
    handler: F,
) where
    F: Fn(BufferId) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let mut pending: Option<BufferId> = None;
    let mut deadline: Option<Instant> = None;

    loop {
        let window_end = deadline;
        tokio::select! {
            event = events.recv() => match event {
                Some(bufnr) => {
                    pending = Some(bufnr);
                    deadline.get_or_insert_with(|| Instant::now() + delay);
                }
                None => break,
            },
            _ = sleep_until(window_end), if window_end.is_some() => {
                deadline = None;
                if let Some(bufnr) = pending.take() {
                    if let Err(e) = handler(bufnr).await {
                        tracing::error!("Focus change handler failed for buffer {}: {:#}", bufnr, e);
                    }
                }
            }
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    if let Some(deadline) = deadline {
        tokio::time::sleep_until(deadline).await;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
