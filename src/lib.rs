//! Meetpoint: collect a list of cities, resolve them to coordinates and keep
//! the settlement nearest their centroid up to date.

pub mod config;
pub mod geo;
pub mod location;
pub mod server;
pub mod session;
pub mod store;

pub use session::{Session, SessionError, SessionView};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a std mutex, carrying on with the inner value if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
