//! Monotonic failure flag shared between an entity and its listeners.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Once set, never cleared. Read it after the owning task has completed.
#[derive(Debug, Clone, Default)]
pub struct FailureFlag(Arc<AtomicBool>);

impl FailureFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn clones_share_state_and_never_reset() {
        let flag = FailureFlag::new();
        let listener = flag.clone();
        assert!(!flag.is_set());

        listener.mark();
        listener.mark();
        assert!(flag.is_set());
    }

    #[test]
    fn concurrent_marks_converge() {
        let flag = FailureFlag::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let f = flag.clone();
                thread::spawn(move || f.mark())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(flag.is_set());
    }
}
