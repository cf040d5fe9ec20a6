//! One-shot value cell shared between tasks
//!
//! A [`OneShot`] can be raised exactly once. Later raises are ignored and
//! report `false`, so the first value wins for the lifetime of the cell.
//! The current value can be peeked without blocking, or awaited.

use core::cell::Cell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

/// Write-once cell with an async wait.
///
/// The value is kept behind a critical-section mutex so it can live in a
/// `static` and be raised from any task. Waking uses an embassy [`Signal`],
/// which supports a single waiter at a time; every other observer should
/// use [`OneShot::get`].
pub struct OneShot<T> {
    value: Mutex<CriticalSectionRawMutex, Cell<Option<T>>>,
    wake: Signal<CriticalSectionRawMutex, T>,
}

impl<T: Copy> OneShot<T> {
    pub const fn new() -> Self {
        Self {
            value: Mutex::new(Cell::new(None)),
            wake: Signal::new(),
        }
    }

    /// Store `value` if nothing has been raised yet.
    ///
    /// Returns `true` if this call set the value.
    pub fn raise(&self, value: T) -> bool {
        let first = self.value.lock(|cell| {
            if cell.get().is_some() {
                false
            } else {
                cell.set(Some(value));
                true
            }
        });

        if first {
            self.wake.signal(value);
        }

        first
    }

    /// The raised value, if any.
    pub fn get(&self) -> Option<T> {
        self.value.lock(|cell| cell.get())
    }

    pub fn is_raised(&self) -> bool {
        self.get().is_some()
    }

    /// Wait until a value is raised and return it.
    ///
    /// Returns immediately if the cell was raised before the call.
    pub async fn wait(&self) -> T {
        if let Some(value) = self.get() {
            return value;
        }
        self.wake.wait().await
    }
}

impl<T: Copy> Default for OneShot<T> {
    fn default() -> Self {
        Self::new()
    }
}
