//! Guest-visible synchronization object.
//!
//! A `SyncObject` gates on a small closed set of subjects (pipeline
//! stages). The guest owns these objects; the renderer only flips subject
//! bits and wakes waiters. Producer threads block in [`SyncObject::wishlist`]
//! until the renderer thread reports the subjects done.

use std::sync::{Condvar, Mutex, MutexGuard};

bitflags::bitflags! {
    /// Independently trackable completion flags within a [`SyncObject`].
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct SyncSubject: u32 {
        const FRAGMENT = 1 << 0;
        const DISPLAY = 1 << 1;
    }
}

#[derive(Debug)]
pub struct SyncObject {
    done: Mutex<SyncSubject>,
    cond: Condvar,
}

impl SyncObject {
    /// All subjects start idle.
    pub fn new() -> Self {
        Self {
            done: Mutex::new(SyncSubject::empty()),
            cond: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SyncSubject> {
        match self.done.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Clears `subjects` back to idle. Must be issued before starting work
    /// whose completion will later call [`subject_done`](Self::subject_done)
    /// with an overlapping mask.
    pub fn subject_in_progress(&self, subjects: SyncSubject) {
        let mut done = self.lock();
        done.remove(subjects);
    }

    /// Marks `subjects` done and wakes all waiters unconditionally.
    pub fn subject_done(&self, subjects: SyncSubject) {
        {
            let mut done = self.lock();
            done.insert(subjects);
        }
        self.cond.notify_all();
    }

    /// Blocks until every bit in `subjects` is done.
    ///
    /// The satisfied check and the wait registration happen under a single
    /// lock acquisition; releasing the lock between them would let another
    /// thread flip a subject back to in-progress and signal again in the
    /// window, losing the wakeup.
    pub fn wishlist(&self, subjects: SyncSubject) {
        let guard = self.lock();
        let _done = self
            .cond
            .wait_while(guard, |done| !done.contains(subjects))
            .unwrap_or_else(|poisoned| poisoned.into_inner());
    }

    pub fn is_done(&self, subjects: SyncSubject) -> bool {
        self.lock().contains(subjects)
    }
}

impl Default for SyncObject {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{SyncObject, SyncSubject};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn wishlist_returns_immediately_when_already_done() {
        let sync = SyncObject::new();
        sync.subject_done(SyncSubject::FRAGMENT);
        sync.wishlist(SyncSubject::FRAGMENT);
    }

    #[test]
    fn wishlist_blocks_until_subject_done() {
        let sync = Arc::new(SyncObject::new());
        let released = Arc::new(AtomicBool::new(false));

        let waiter = {
            let sync = Arc::clone(&sync);
            let released = Arc::clone(&released);
            std::thread::spawn(move || {
                sync.wishlist(SyncSubject::FRAGMENT);
                released.store(true, Ordering::SeqCst);
            })
        };

        std::thread::sleep(Duration::from_millis(50));
        assert!(!released.load(Ordering::SeqCst), "waiter released too early");

        sync.subject_done(SyncSubject::FRAGMENT);
        waiter.join().expect("waiter thread");
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn wishlist_requires_every_requested_subject() {
        let sync = Arc::new(SyncObject::new());
        sync.subject_done(SyncSubject::FRAGMENT);

        let waiter = {
            let sync = Arc::clone(&sync);
            std::thread::spawn(move || {
                sync.wishlist(SyncSubject::FRAGMENT | SyncSubject::DISPLAY);
            })
        };

        std::thread::sleep(Duration::from_millis(50));
        assert!(!waiter.is_finished(), "waiter must not pass on a partial mask");

        sync.subject_done(SyncSubject::DISPLAY);
        waiter.join().expect("waiter thread");
    }

    #[test]
    fn subject_in_progress_clears_done_bits() {
        let sync = SyncObject::new();
        sync.subject_done(SyncSubject::FRAGMENT | SyncSubject::DISPLAY);
        sync.subject_in_progress(SyncSubject::FRAGMENT);
        assert!(!sync.is_done(SyncSubject::FRAGMENT));
        assert!(sync.is_done(SyncSubject::DISPLAY));
    }
}
