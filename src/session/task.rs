//! Cancellable scheduled tasks.
//!
//! Every timer loop of a detection session holds a `GuardToken`. Stopping or
//! disconnecting bumps the `SessionGuard` generation, which invalidates every
//! outstanding token at once; a loop checks its token before doing work and
//! before scheduling the next tick, so nothing outlives the session that
//! started it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

#[derive(Clone, Debug, Default)]
pub struct SessionGuard {
    current: Arc<AtomicU64>,
}

impl SessionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    pub fn token(&self) -> GuardToken {
        GuardToken {
            current: self.current.clone(),
            generation: self.generation(),
        }
    }

    /// Invalidate all outstanding tokens. Returns the new generation.
    pub fn invalidate(&self) -> u64 {
        self.current.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[derive(Clone, Debug)]
pub struct GuardToken {
    current: Arc<AtomicU64>,
    generation: u64,
}

impl GuardToken {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_valid(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.generation
    }
}

/// Handle on a spawned timer task. Dropping it aborts the task.
#[derive(Debug)]
pub struct ScheduledTask {
    name: &'static str,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Run `tick` every `period` while the token is valid and `tick` returns
    /// true. Exactly one tick is outstanding at a time.
    pub fn periodic<F>(name: &'static str, period: Duration, token: GuardToken, mut tick: F) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                if !token.is_valid() || !tick() {
                    break;
                }
            }
            log::debug!("{} loop ended (generation {})", name, token.generation());
        });
        Self { name, handle }
    }

    /// Run `f` once after `delay` unless the token was invalidated first.
    pub fn once<F>(name: &'static str, delay: Duration, token: GuardToken, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if token.is_valid() {
                f();
            }
        });
        Self { name, handle }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn cancel(self) {
        log::debug!("cancelling {}", self.name);
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
