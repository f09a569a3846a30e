//! Single build-or-flash activity guard.
//!
//! Acquisition is one critical section: callers either get an [`ActivityLease`]
//! or learn which activity holds the guard. Leases carry a generation so a late
//! release (e.g. from a cancel handler) never frees a newer holder.

use once_cell::sync::Lazy;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Build,
    Flash,
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Activity::Build => write!(f, "build"),
            Activity::Flash => write!(f, "flash"),
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cannot start {requested}: a {active} is already in progress")]
pub struct ActivityBusy {
    pub requested: Activity,
    pub active: Activity,
}

#[derive(Debug, Clone, Copy)]
struct Holder {
    activity: Activity,
    generation: u64,
}

#[derive(Debug, Default)]
struct GuardState {
    holder: Option<Holder>,
    next_generation: u64,
}

#[derive(Debug, Default)]
pub struct ActivityGuard {
    state: Mutex<GuardState>,
}

static GLOBAL: Lazy<Arc<ActivityGuard>> = Lazy::new(|| Arc::new(ActivityGuard::new()));

impl ActivityGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide guard shared by every build and flash entry point.
    pub fn global() -> Arc<ActivityGuard> {
        Arc::clone(&GLOBAL)
    }

    fn state(&self) -> MutexGuard<'_, GuardState> {
        match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn try_acquire(self: &Arc<Self>, activity: Activity) -> Result<ActivityLease, ActivityBusy> {
        let mut state = self.state();
        if let Some(holder) = state.holder {
            return Err(ActivityBusy {
                requested: activity,
                active: holder.activity,
            });
        }
        state.next_generation += 1;
        let generation = state.next_generation;
        state.holder = Some(Holder {
            activity,
            generation,
        });
        log::debug!("{} acquired activity guard (generation {})", activity, generation);
        Ok(ActivityLease {
            guard: Arc::clone(self),
            activity,
            generation,
        })
    }

    /// Currently running activity, if any.
    pub fn current(&self) -> Option<Activity> {
        self.state().holder.map(|h| h.activity)
    }

    pub fn is_busy(&self) -> bool {
        self.current().is_some()
    }

    /// Releases the guard only if `generation` still holds it. Returns whether it did.
    pub fn release(&self, generation: u64) -> bool {
        let mut state = self.state();
        match state.holder {
            Some(holder) if holder.generation == generation => {
                state.holder = None;
                log::debug!("{} released activity guard (generation {})", holder.activity, generation);
                true
            }
            _ => false,
        }
    }
}

/// RAII lease that releases its activity when dropped.
#[derive(Debug)]
pub struct ActivityLease {
    guard: Arc<ActivityGuard>,
    activity: Activity,
    generation: u64,
}

impl ActivityLease {
    pub fn activity(&self) -> Activity {
        self.activity
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether this lease still owns the guard.
    pub fn is_held(&self) -> bool {
        self.guard
            .state()
            .holder
            .is_some_and(|h| h.generation == self.generation)
    }
}

impl Drop for ActivityLease {
    fn drop(&mut self) {
        self.guard.release(self.generation);
    }
}
