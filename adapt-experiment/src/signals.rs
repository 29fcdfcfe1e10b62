//! Abort requests raised outside the main loop (key handlers, Ctrl-C) and
//! polled once per iteration.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// The two independent abort flags of a session.
#[derive(Debug, Clone, Default)]
pub struct AbortSignals {
    /// Ends the current block; the session continues with the next one.
    pub block: CancelToken,
    /// Ends the whole run.
    pub run: CancelToken,
}

impl AbortSignals {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let signals = AbortSignals::new();
        let handle = signals.clone();
        handle.block.trigger();
        assert!(signals.block.is_triggered());
        assert!(!signals.run.is_triggered());
        signals.block.clear();
        assert!(!handle.block.is_triggered());
    }

    #[test]
    fn trigger_from_another_thread() {
        let token = CancelToken::new();
        let remote = token.clone();
        std::thread::spawn(move || remote.trigger()).join().unwrap();
        assert!(token.is_triggered());
    }
}
