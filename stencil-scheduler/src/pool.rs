//! Fixed-size worker pool with cooperative cancellation.
//!
//! Jobs run on named OS threads pulled from a crossbeam channel. Each job
//! carries a [`CancelToken`]; a job whose token is already cancelled when a
//! worker picks it up is skipped. Running jobs observe cancellation by
//! polling the token (the output writer does this on every write).

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::error::{io_err, SchedulerError};

/// How long `shutdown` waits for workers before detaching them.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// CancelToken
// ---------------------------------------------------------------------------

/// Shared cancellation flag. Cancelling a token cancels all of its children.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

#[derive(Debug, Default)]
struct TokenInner {
    cancelled: AtomicBool,
    parent: Option<CancelToken>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that is cancelled when either it or `self` is cancelled.
    pub fn child(&self) -> Self {
        Self {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                parent: Some(self.clone()),
            }),
        }
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
            || self
                .inner
                .parent
                .as_ref()
                .is_some_and(CancelToken::is_cancelled)
    }
}

// ---------------------------------------------------------------------------
// TaskHandle
// ---------------------------------------------------------------------------

enum Outcome<T> {
    Done(T),
    Skipped,
    Panicked(String),
}

/// Why waiting on a task produced no value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitError {
    TimedOut(Duration),
    Cancelled,
    Panicked(String),
}

impl WaitError {
    /// Attach the name of the entity the task was running for.
    pub fn into_error(self, entity: &str) -> SchedulerError {
        let entity = entity.to_string();
        match self {
            WaitError::TimedOut(limit) => SchedulerError::Timeout {
                entity,
                timeout: format!("{limit:?}"),
            },
            WaitError::Cancelled => SchedulerError::Cancelled { entity },
            WaitError::Panicked(message) => SchedulerError::Panicked { entity, message },
        }
    }
}

/// The pending result of a submitted job.
pub struct TaskHandle<T> {
    result: Receiver<Outcome<T>>,
    token: CancelToken,
}

impl<T> TaskHandle<T> {
    /// Block for the result, at most `timeout` if given.
    ///
    /// On timeout the task's token is cancelled before returning.
    pub fn wait(self, timeout: Option<Duration>) -> Result<T, WaitError> {
        let outcome = match timeout {
            Some(limit) => match self.result.recv_timeout(limit) {
                Ok(outcome) => outcome,
                Err(RecvTimeoutError::Timeout) => {
                    self.token.cancel();
                    return Err(WaitError::TimedOut(limit));
                }
                Err(RecvTimeoutError::Disconnected) => return Err(WaitError::Cancelled),
            },
            None => self.result.recv().map_err(|_| WaitError::Cancelled)?,
        };
        match outcome {
            Outcome::Done(value) => Ok(value),
            Outcome::Skipped => Err(WaitError::Cancelled),
            Outcome::Panicked(message) => Err(WaitError::Panicked(message)),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }
}

// ---------------------------------------------------------------------------
// WorkerPool
// ---------------------------------------------------------------------------

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A fixed set of worker threads.
pub struct WorkerPool {
    name: String,
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    /// Disconnects once every worker thread has exited.
    exited: Receiver<()>,
}

impl WorkerPool {
    /// Spawn `size` workers (at least one) named `<name>-<n>`.
    pub fn new(name: &str, size: usize) -> Result<Self, SchedulerError> {
        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();
        let (exit_tx, exited) = crossbeam_channel::bounded::<()>(0);
        let mut workers = Vec::with_capacity(size.max(1));
        for n in 0..size.max(1) {
            let jobs = receiver.clone();
            let exit_tx = exit_tx.clone();
            let thread_name = format!("{name}-{n}");
            let handle = thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || {
                    let _exit = exit_tx;
                    for job in jobs.iter() {
                        job();
                    }
                })
                .map_err(|e| io_err(thread_name, e))?;
            workers.push(handle);
        }
        Ok(Self {
            name: name.to_string(),
            sender: Some(sender),
            workers,
            exited,
        })
    }

    /// One worker, or one per available core.
    pub fn sized_for(name: &str, concurrent: bool) -> Result<Self, SchedulerError> {
        let size = if concurrent {
            thread::available_parallelism().map_or(1, |n| n.get())
        } else {
            1
        };
        Self::new(name, size)
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queue `task` to run with `token`.
    ///
    /// If the pool is already shut down the handle reports `Cancelled`.
    pub fn submit<T, F>(&self, token: CancelToken, task: F) -> TaskHandle<T>
    where
        F: FnOnce(&CancelToken) -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let job_token = token.clone();
        let job: Job = Box::new(move || {
            let outcome = if job_token.is_cancelled() {
                Outcome::Skipped
            } else {
                match panic::catch_unwind(AssertUnwindSafe(|| task(&job_token))) {
                    Ok(value) => Outcome::Done(value),
                    Err(payload) => Outcome::Panicked(panic_message(payload)),
                }
            };
            let _ = tx.send(outcome);
        });
        if let Some(sender) = &self.sender {
            if sender.send(job).is_err() {
                tracing::warn!(pool = %self.name, "worker pool is closed; task dropped");
            }
        }
        TaskHandle { result: rx, token }
    }

    /// Stop accepting work and wait up to `grace` for workers to drain.
    ///
    /// Returns `false` if workers were still busy and have been detached.
    pub fn shutdown(mut self, grace: Duration) -> bool {
        self.sender.take();
        let deadline = Instant::now() + grace;
        loop {
            match self.exited.recv_deadline(deadline) {
                Ok(()) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    tracing::warn!(
                        pool = %self.name,
                        grace = ?grace,
                        "workers still busy after shutdown grace period; detaching"
                    );
                    return false;
                }
            }
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        true
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.sender.take();
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn results_come_back_per_handle() {
        let pool = WorkerPool::new("t", 3).expect("pool");
        let handles: Vec<_> = (0..8)
            .map(|i| pool.submit(CancelToken::new(), move |_| i * 10))
            .collect();
        let values: Vec<i32> = handles
            .into_iter()
            .map(|h| h.wait(None).expect("value"))
            .collect();
        assert_eq!(values, vec![0, 10, 20, 30, 40, 50, 60, 70]);
        assert!(pool.shutdown(Duration::from_secs(5)));
    }

    #[test]
    fn timeout_cancels_the_task_token() {
        let pool = WorkerPool::new("t", 1).expect("pool");
        let handle = pool.submit(CancelToken::new(), |token: &CancelToken| {
            while !token.is_cancelled() {
                thread::sleep(Duration::from_millis(2));
            }
            "stopped"
        });
        let token = handle.token().clone();
        let started = Instant::now();
        let err = handle.wait(Some(Duration::from_millis(20))).unwrap_err();
        assert_eq!(err, WaitError::TimedOut(Duration::from_millis(20)));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(token.is_cancelled());
        assert!(pool.shutdown(Duration::from_secs(5)));
    }

    #[test]
    fn cancelled_queued_job_is_skipped() {
        let pool = WorkerPool::new("t", 1).expect("pool");
        let ran = Arc::new(AtomicUsize::new(0));
        let gate = CancelToken::new();

        let blocker_gate = gate.clone();
        let blocker = pool.submit(CancelToken::new(), move |_| {
            while !blocker_gate.is_cancelled() {
                thread::sleep(Duration::from_millis(1));
            }
        });
        let counter = Arc::clone(&ran);
        let queued = pool.submit(CancelToken::new(), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        queued.cancel();
        gate.cancel();

        blocker.wait(None).expect("blocker");
        assert_eq!(queued.wait(None).unwrap_err(), WaitError::Cancelled);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn panics_are_reported() {
        let pool = WorkerPool::new("t", 1).expect("pool");
        let handle = pool.submit(CancelToken::new(), |_| -> () { panic!("boom") });
        assert_eq!(handle.wait(None).unwrap_err(), WaitError::Panicked("boom".into()));
        let after = pool.submit(CancelToken::new(), |_| 1);
        assert_eq!(after.wait(None).expect("pool survives panics"), 1);
    }

    #[test]
    fn child_tokens_follow_parent() {
        let parent = CancelToken::new();
        let child = parent.child();
        let grandchild = child.child();
        assert!(!grandchild.is_cancelled());
        parent.cancel();
        assert!(child.is_cancelled() && grandchild.is_cancelled());

        let other = CancelToken::new();
        let sibling = other.child();
        sibling.cancel();
        assert!(!other.is_cancelled());
    }

    #[test]
    fn shutdown_detaches_stuck_workers() {
        let pool = WorkerPool::new("t", 1).expect("pool");
        let release = CancelToken::new();
        let gate = release.clone();
        let _handle = pool.submit(CancelToken::new(), move |_| {
            while !gate.is_cancelled() {
                thread::sleep(Duration::from_millis(1));
            }
        });
        thread::sleep(Duration::from_millis(10));
        assert!(!pool.shutdown(Duration::from_millis(20)));
        release.cancel();
    }
}
