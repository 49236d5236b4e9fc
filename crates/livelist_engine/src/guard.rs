//! Reentrancy guard between the two reconcilers.
//!
//! The guard is a two-state machine per list:
//!
//! ```text
//!   Idle --begin()--> Suppressed --(one deferred turn)--> Idle
//! ```
//!
//! The upstream reconciler opens a suppression window before applying a
//! remote batch and schedules its close on the event loop. Local change
//! detection only runs while the guard is `Idle`, so mutations made by the
//! upstream reconciler are never replayed to the store.
//!
//! Every window carries a generation number. A scheduled close only takes
//! effect if no newer window was opened and the guard was not reset since;
//! overlapping batches in the same turn therefore close exactly once, after
//! the last of them.

use crate::scheduler::EventLoop;
use parking_lot::Mutex;
use std::sync::Arc;

/// State of the reentrancy guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    /// Local change detection may run.
    Idle,
    /// A remote batch is being applied or has not settled yet.
    Suppressed,
}

/// Proof that a suppression window was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "a suppression window stays open until its ticket is settled"]
pub struct SuppressionTicket {
    generation: u64,
}

impl SuppressionTicket {
    /// Returns the generation of the window this ticket opened.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug)]
struct GuardInner {
    state: GuardState,
    generation: u64,
    windows_opened: u64,
}

/// Suppression flag shared by both reconcilers of one list.
#[derive(Debug)]
pub struct ReentrancyGuard {
    inner: Mutex<GuardInner>,
}

impl ReentrancyGuard {
    /// Creates an idle guard.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(GuardInner {
                state: GuardState::Idle,
                generation: 0,
                windows_opened: 0,
            }),
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> GuardState {
        self.inner.lock().state
    }

    /// Returns true while a suppression window is open.
    pub fn is_suppressed(&self) -> bool {
        self.state() == GuardState::Suppressed
    }

    /// Returns the number of windows opened so far.
    pub fn windows_opened(&self) -> u64 {
        self.inner.lock().windows_opened
    }

    /// Opens a suppression window.
    pub fn begin(&self) -> SuppressionTicket {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        inner.windows_opened += 1;
        if inner.state == GuardState::Idle {
            tracing::debug!(generation = inner.generation, "guard: idle -> suppressed");
        }
        inner.state = GuardState::Suppressed;
        SuppressionTicket {
            generation: inner.generation,
        }
    }

    /// Closes the window opened with `ticket`.
    ///
    /// Returns false, leaving the state untouched, if a newer window was
    /// opened or the guard was reset after the ticket was issued.
    pub fn settle(&self, ticket: SuppressionTicket) -> bool {
        let mut inner = self.inner.lock();
        if inner.generation != ticket.generation || inner.state != GuardState::Suppressed {
            tracing::trace!(
                ticket = ticket.generation,
                current = inner.generation,
                "guard: stale settle ignored"
            );
            return false;
        }
        inner.state = GuardState::Idle;
        tracing::debug!(generation = inner.generation, "guard: suppressed -> idle");
        true
    }

    /// Schedules the close of a window one turn later on `events`.
    ///
    /// `on_idle` runs only if the close takes effect.
    pub fn settle_after_turn(
        self: &Arc<Self>,
        events: &EventLoop,
        ticket: SuppressionTicket,
        on_idle: impl FnOnce() + Send + 'static,
    ) {
        let guard = Arc::clone(self);
        events.defer(move || {
            if guard.settle(ticket) {
                on_idle();
            }
        });
    }

    /// Forces the guard back to `Idle` and invalidates every pending close.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        inner.state = GuardState::Idle;
    }
}

impl Default for ReentrancyGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn begin_and_settle() {
        let guard = ReentrancyGuard::new();
        assert_eq!(guard.state(), GuardState::Idle);

        let ticket = guard.begin();
        assert!(guard.is_suppressed());
        assert!(guard.settle(ticket));
        assert_eq!(guard.state(), GuardState::Idle);

        // Settling twice is a no-op.
        assert!(!guard.settle(ticket));
    }

    #[test]
    fn only_latest_window_settles() {
        let guard = ReentrancyGuard::new();
        let first = guard.begin();
        let second = guard.begin();

        assert!(!guard.settle(first));
        assert!(guard.is_suppressed());
        assert!(guard.settle(second));
        assert!(!guard.is_suppressed());
        assert_eq!(guard.windows_opened(), 2);
    }

    #[test]
    fn reset_invalidates_pending_settles() {
        let guard = ReentrancyGuard::new();
        let ticket = guard.begin();
        guard.reset();
        assert_eq!(guard.state(), GuardState::Idle);
        assert!(!guard.settle(ticket));
    }

    #[test]
    fn settle_waits_one_turn() {
        let events = EventLoop::new();
        let guard = Arc::new(ReentrancyGuard::new());
        let resumed = Arc::new(AtomicBool::new(false));

        let ticket = guard.begin();
        {
            let resumed = Arc::clone(&resumed);
            guard.settle_after_turn(&events, ticket, move || {
                resumed.store(true, Ordering::SeqCst);
            });
        }

        assert!(guard.is_suppressed());
        assert!(!resumed.load(Ordering::SeqCst));

        events.run_turn().unwrap();
        assert!(!guard.is_suppressed());
        assert!(resumed.load(Ordering::SeqCst));
    }

    #[test]
    fn stale_settle_skips_callback() {
        let events = EventLoop::new();
        let guard = Arc::new(ReentrancyGuard::new());
        let resumed = Arc::new(AtomicBool::new(false));

        let ticket = guard.begin();
        {
            let resumed = Arc::clone(&resumed);
            guard.settle_after_turn(&events, ticket, move || {
                resumed.store(true, Ordering::SeqCst);
            });
        }
        guard.reset();
        events.run_until_idle(10).unwrap();
        assert!(!resumed.load(Ordering::SeqCst));
    }
}
