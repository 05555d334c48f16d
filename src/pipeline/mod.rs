pub mod scheduler;

pub use scheduler::{PeriodicTask, Scheduler};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock shared state, recovering the guard if a task panicked while holding it.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
