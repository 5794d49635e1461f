//! One level of fan-out: submit everything, then walk results in order.

use std::time::Duration;

use crate::error::SchedulerError;
use crate::pool::{CancelToken, WorkerPool, DEFAULT_SHUTDOWN_GRACE};

/// How the walk treats one task.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    /// Used in logs and errors.
    pub label: String,
    pub timeout: Option<Duration>,
    /// Stop the walk if this task fails.
    pub fail_fast: bool,
}

/// Submit every job to `pool` under a child of `parent`, then wait on each in
/// submission order.
///
/// After a fail-fast failure the remaining handles are cancelled without
/// being waited on and reported as [`SchedulerError::Cancelled`]. The pool is
/// shut down on every path. Results are in submission order.
pub fn run_in_order<T, F>(
    pool: WorkerPool,
    parent: &CancelToken,
    jobs: Vec<(TaskSpec, F)>,
) -> Vec<Result<T, SchedulerError>>
where
    F: FnOnce(&CancelToken) -> Result<T, SchedulerError> + Send + 'static,
    T: Send + 'static,
{
    let submitted: Vec<_> = jobs
        .into_iter()
        .map(|(spec, job)| {
            let handle = pool.submit(parent.child(), job);
            (spec, handle)
        })
        .collect();

    let mut results = Vec::with_capacity(submitted.len());
    let mut stopped = false;
    for (spec, handle) in submitted {
        if stopped {
            handle.cancel();
            results.push(Err(SchedulerError::Cancelled { entity: spec.label }));
            continue;
        }
        let result = handle
            .wait(spec.timeout)
            .map_err(|e| e.into_error(&spec.label))
            .and_then(|r| r);
        if let Err(e) = &result {
            tracing::error!(task = %spec.label, error = %e, "task failed");
            if spec.fail_fast {
                tracing::warn!(task = %spec.label, "fail-fast: cancelling remaining tasks");
                stopped = true;
            }
        }
        results.push(result);
    }

    pool.shutdown(DEFAULT_SHUTDOWN_GRACE);
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    type Job = Box<dyn FnOnce(&CancelToken) -> Result<usize, SchedulerError> + Send>;

    fn spec(label: &str, fail_fast: bool) -> TaskSpec {
        TaskSpec {
            label: label.to_string(),
            timeout: Some(Duration::from_secs(10)),
            fail_fast,
        }
    }

    fn job(f: impl FnOnce(&CancelToken) -> Result<usize, SchedulerError> + Send + 'static) -> Job {
        Box::new(f)
    }

    fn failing(label: &'static str) -> Job {
        job(move |_| {
            Err(SchedulerError::Render {
                entity: label.to_string(),
                message: "boom".to_string(),
            })
        })
    }

    /// Signals `started`, waits for cancellation, then counts it in `seen`.
    fn until_cancelled(started: Arc<AtomicUsize>, seen: Arc<AtomicUsize>) -> Job {
        job(move |token: &CancelToken| {
            started.fetch_add(1, Ordering::SeqCst);
            while !token.is_cancelled() {
                thread::sleep(Duration::from_millis(1));
            }
            seen.fetch_add(1, Ordering::SeqCst);
            Err(SchedulerError::Cancelled { entity: "slow".into() })
        })
    }

    #[test]
    fn results_are_in_submission_order() {
        let pool = WorkerPool::new("t", 4).unwrap();
        let jobs: Vec<(TaskSpec, Job)> = (0..6usize)
            .map(|i| {
                let sleeper = job(move |_| {
                    thread::sleep(Duration::from_millis((6 - i as u64) * 3));
                    Ok(i)
                });
                (spec(&format!("t{i}"), false), sleeper)
            })
            .collect();
        let values: Vec<usize> = run_in_order(pool, &CancelToken::new(), jobs)
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(values, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn continue_policy_walks_every_task() {
        let pool = WorkerPool::new("t", 2).unwrap();
        let jobs: Vec<(TaskSpec, Job)> = vec![
            (spec("a", false), job(|_| Ok(1))),
            (spec("b", false), failing("b")),
            (spec("c", false), job(|_| Ok(3))),
        ];
        let results = run_in_order(pool, &CancelToken::new(), jobs);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert_eq!(*results[2].as_ref().unwrap(), 3);
    }

    #[test]
    fn fail_fast_cancels_everything_not_yet_observed() {
        let pool = WorkerPool::new("t", 3).unwrap();
        let started = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(AtomicUsize::new(0));
        let gate = Arc::clone(&started);
        let fails_after_others_start = job(move |_| {
            while gate.load(Ordering::SeqCst) < 2 {
                thread::sleep(Duration::from_millis(1));
            }
            Err(SchedulerError::Render {
                entity: "fails".into(),
                message: "boom".into(),
            })
        });
        let jobs: Vec<(TaskSpec, Job)> = vec![
            (spec("fails", true), fails_after_others_start),
            (spec("slow-1", true), until_cancelled(Arc::clone(&started), Arc::clone(&seen))),
            (spec("slow-2", true), until_cancelled(Arc::clone(&started), Arc::clone(&seen))),
            (spec("queued", true), job(|_| Ok(4))),
        ];
        let results = run_in_order(pool, &CancelToken::new(), jobs);

        assert!(matches!(results[0], Err(SchedulerError::Render { .. })));
        for r in &results[1..] {
            assert!(matches!(r, Err(SchedulerError::Cancelled { .. })), "{r:?}");
        }
        // running tasks were interrupted, not abandoned
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn timeout_is_a_failure() {
        let pool = WorkerPool::new("t", 1).unwrap();
        let mut slow = spec("slow", false);
        slow.timeout = Some(Duration::from_millis(20));
        let counter = Arc::new(AtomicUsize::new(0));
        let jobs: Vec<(TaskSpec, Job)> =
            vec![(slow, until_cancelled(Arc::clone(&counter), Arc::clone(&counter)))];

        let started = std::time::Instant::now();
        let results = run_in_order(pool, &CancelToken::new(), jobs);
        assert!(matches!(results[0], Err(SchedulerError::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
