//! Sleeping admission lock
//!
//! One primitive backs all three blocking scopes in the catalog:
//!
//! - the per-entry intent lock (exclusive: [`SleepLock::lock`])
//! - per-directory reader/writer admission ([`SleepLock::start_read`],
//!   [`SleepLock::start_write`])
//! - the per-volume rename lock (exclusive again)
//!
//! Reader/writer admission is group exclusion: any number of readers or any
//! number of writers may be inside, never both. A newcomer defers to the other
//! group while it is active or waiting, but once asleep it only re-checks the
//! active count. Neither side is protected from starvation.
//!
//! Waits are not interruptible.

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct SleepState {
    held: bool,
    lockers_waiting: u32,
    readers: u32,
    writers: u32,
    readers_waiting: u32,
    writers_waiting: u32,
}

/// Blocking lock with an exclusive mode and a reader/writer group mode
#[derive(Debug, Default)]
pub struct SleepLock {
    state: Mutex<SleepState>,
    cond: Condvar,
}

impl SleepLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep until the exclusive lock is free, then take it
    pub fn lock(&self) {
        let mut state = self.state.lock();
        if state.held {
            state.lockers_waiting += 1;
            while state.held {
                self.cond.wait(&mut state);
            }
            state.lockers_waiting -= 1;
        }
        state.held = true;
    }

    /// Take the exclusive lock if it is free
    pub fn try_lock(&self) -> bool {
        let mut state = self.state.lock();
        if state.held {
            return false;
        }
        state.held = true;
        true
    }

    /// Release the exclusive lock and wake sleepers
    pub fn unlock(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.held, "unlocking a free sleep lock");
        state.held = false;
        drop(state);
        self.cond.notify_all();
    }

    /// Sleep until nobody holds the exclusive lock, without taking it
    pub fn wait_unlocked(&self) {
        let mut state = self.state.lock();
        if state.held {
            state.lockers_waiting += 1;
            while state.held {
                self.cond.wait(&mut state);
            }
            state.lockers_waiting -= 1;
        }
    }

    pub fn is_locked(&self) -> bool {
        self.state.lock().held
    }

    /// Join the reader group
    pub fn start_read(&self) {
        let mut state = self.state.lock();
        if state.writers > 0 || state.writers_waiting > 0 {
            state.readers_waiting += 1;
            loop {
                self.cond.wait(&mut state);
                if state.writers == 0 {
                    break;
                }
            }
            state.readers_waiting -= 1;
        }
        state.readers += 1;
    }

    /// Join the reader group if that would not sleep
    pub fn try_start_read(&self) -> bool {
        let mut state = self.state.lock();
        if state.writers > 0 || state.writers_waiting > 0 {
            return false;
        }
        state.readers += 1;
        true
    }

    /// Leave the reader group; the last reader admits writers
    pub fn end_read(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.readers > 0, "end_read without start_read");
        state.readers = state.readers.saturating_sub(1);
        let wake = state.readers == 0;
        drop(state);
        if wake {
            self.cond.notify_all();
        }
    }

    /// Join the writer group
    pub fn start_write(&self) {
        let mut state = self.state.lock();
        if state.readers > 0 || state.readers_waiting > 0 {
            state.writers_waiting += 1;
            loop {
                self.cond.wait(&mut state);
                if state.readers == 0 {
                    break;
                }
            }
            state.writers_waiting -= 1;
        }
        state.writers += 1;
    }

    /// Join the writer group if that would not sleep
    pub fn try_start_write(&self) -> bool {
        let mut state = self.state.lock();
        if state.readers > 0 || state.readers_waiting > 0 {
            return false;
        }
        state.writers += 1;
        true
    }

    /// Leave the writer group; the last writer admits readers
    pub fn end_write(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.writers > 0, "end_write without start_write");
        state.writers = state.writers.saturating_sub(1);
        let wake = state.writers == 0;
        drop(state);
        if wake {
            self.cond.notify_all();
        }
    }

    pub fn readers(&self) -> u32 {
        self.state.lock().readers
    }

    pub fn writers(&self) -> u32 {
        self.state.lock().writers
    }

    /// Threads asleep on the exclusive lock
    pub fn lock_waiters(&self) -> u32 {
        self.state.lock().lockers_waiting
    }

    pub fn readers_waiting(&self) -> u32 {
        self.state.lock().readers_waiting
    }

    pub fn writers_waiting(&self) -> u32 {
        self.state.lock().writers_waiting
    }

    /// True when no lock or group membership is outstanding
    pub fn is_idle(&self) -> bool {
        let state = self.state.lock();
        !state.held
            && state.lockers_waiting == 0
            && state.readers == 0
            && state.writers == 0
            && state.readers_waiting == 0
            && state.writers_waiting == 0
    }
}
