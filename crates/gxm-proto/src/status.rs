use std::sync::atomic::{AtomicI32, Ordering};

/// Command finished without error.
pub const STATUS_NONE: i32 = 0;
/// Command has not been executed yet.
pub const STATUS_PENDING: i32 = -1;
/// The handler failed (e.g. backend resource creation).
pub const STATUS_ERROR: i32 = -2;
/// The renderer was shut down before the command completed.
pub const STATUS_SHUTDOWN: i32 = -3;

/// Completion cell a producer can block on while the renderer thread
/// executes its command.
///
/// The cell always outlives the command that points at it: the producer
/// owns it (via `Arc`) and the command only carries a reference. Handlers
/// write a result code here through
/// [`Command::complete`](crate::Command::complete); waking blocked waiters
/// is the renderer's job, via its shared completion condvar.
///
/// Non-negative codes are handler results (resource-creation handlers
/// return the new handle this way); negative codes are the `STATUS_*`
/// protocol values.
#[derive(Debug)]
pub struct StatusCell(AtomicI32);

impl StatusCell {
    pub fn pending() -> Self {
        Self(AtomicI32::new(STATUS_PENDING))
    }

    pub fn get(&self) -> i32 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self, code: i32) {
        self.0.store(code, Ordering::SeqCst);
    }

    pub fn is_pending(&self) -> bool {
        self.get() == STATUS_PENDING
    }

    /// Re-arms the cell for another synchronous round trip.
    pub fn reset(&self) {
        self.set(STATUS_PENDING);
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::pending()
    }
}
