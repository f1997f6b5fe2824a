// src/core/master/timer.rs

//! Resettable token-liveness timer.
//!
//! The original prototype builds this on `threading.Timer`: `reset()`
//! cancels the running timer and starts a fresh one, `inUse()` just
//! cancels, and cancelling an already-cancelled timer is a no-op
//! (`examples/original_source/backend/master/timer.py`). Rust has no timer
//! object to cancel, so this re-expresses the same triple as a generation
//! counter: every arm of the timer captures the generation it was armed
//! with, and only fires if that generation is still current when its sleep
//! elapses. Bumping the counter is "cancel"; bumping it and spawning a new
//! sleep is "reset".

use super::state::MasterState;
use crate::core::protocol::TokenKey;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Recommended in spec.md §4.2; must exceed `hop_sleep * membership_size`
/// by a wide margin (spec.md §5).
pub const TOKEN_TIMEOUT: Duration = Duration::from_secs(20);

/// One timer's cancellation handle: the generation it is currently on.
#[derive(Debug, Default)]
pub struct TimerHandle {
    generation: AtomicU64,
}

impl TimerHandle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { generation: AtomicU64::new(0) })
    }

    /// Arms the timer at its current generation, starting it running.
    pub fn arm(self: &Arc<Self>, state: Arc<MasterState>, key: TokenKey) {
        let my_generation = self.generation.load(Ordering::SeqCst);
        spawn_tick(state, key, Arc::clone(self), my_generation);
    }

    /// `cancel()` followed by re-arming with a fresh generation.
    pub fn reset(self: &Arc<Self>, state: Arc<MasterState>, key: TokenKey) {
        let my_generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        spawn_tick(state, key, Arc::clone(self), my_generation);
    }

    /// Invalidates the currently-armed generation without re-arming.
    /// A no-op if the timer was already cancelled (the stale tick simply
    /// observes a generation mismatch and does nothing).
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

fn spawn_tick(state: Arc<MasterState>, key: TokenKey, handle: Arc<TimerHandle>, my_generation: u64) {
    tokio::spawn(async move {
        tokio::time::sleep(TOKEN_TIMEOUT).await;
        if handle.generation.load(Ordering::SeqCst) == my_generation {
            state.token_timeout(key).await;
        }
    });
}
