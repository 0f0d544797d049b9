//! Shared renderer state: the command queue, the completion protocol and
//! frame-pacing counters.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use thiserror::Error;
use tracing::info;

use gxm_proto::{
    Command, CommandList, CommandOpcode, ContextId, EncodeError, RenderTargetId,
    RenderTargetParams, StatusCell, STATUS_PENDING, STATUS_SHUTDOWN,
};

use crate::backend::{BackendKind, FeatureFlags};
use crate::queue::{Queue, QueueClosed};

/// Default bound on pending command lists before producers block.
pub const DEFAULT_QUEUE_CAPACITY: usize = 30;

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum RendererError {
    #[error("renderer is shutting down")]
    Shutdown,
    /// The handler reported a failure through the completion code.
    #[error("backend rejected the request (status {0})")]
    Backend(i32),
}

impl From<QueueClosed> for RendererError {
    fn from(_: QueueClosed) -> Self {
        Self::Shutdown
    }
}

/// One explicitly constructed renderer instance shared by every producer
/// context and the single consumer thread. There is no ambient global;
/// owners pass an `Arc<Renderer>` to whoever needs it and call
/// [`shutdown`](Self::shutdown) on teardown.
pub struct Renderer {
    kind: BackendKind,
    features: FeatureFlags,
    queue: Queue<CommandList>,

    // One condvar shared by all command completions. Every waiter re-checks
    // its own cell after waking, so each completion costs O(waiters)
    // spurious wakeups; accepted in exchange for not carrying a condvar per
    // command.
    completion_lock: Mutex<()>,
    command_finish_one: Condvar,
    shutting_down: AtomicBool,

    scene_processed_since_last_frame: AtomicU32,
    average_scene_per_frame: AtomicU32,
    next_context_id: AtomicU32,
}

impl Renderer {
    pub fn new(kind: BackendKind, features: FeatureFlags) -> Self {
        Self::with_queue_capacity(kind, features, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_queue_capacity(kind: BackendKind, features: FeatureFlags, capacity: usize) -> Self {
        info!(?kind, ?features, capacity, "renderer initialized");
        Self {
            kind,
            features,
            queue: Queue::new(capacity),
            completion_lock: Mutex::new(()),
            command_finish_one: Condvar::new(),
            shutting_down: AtomicBool::new(false),
            scene_processed_since_last_frame: AtomicU32::new(0),
            average_scene_per_frame: AtomicU32::new(1),
            next_context_id: AtomicU32::new(0),
        }
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    /// Capability bits of the selected backend, for collaborators that
    /// pick code paths by feature (shader translation, upload strategies).
    pub fn features(&self) -> FeatureFlags {
        self.features
    }

    pub(crate) fn queue(&self) -> &Queue<CommandList> {
        &self.queue
    }

    pub(crate) fn allocate_context_id(&self) -> ContextId {
        ContextId(self.next_context_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Appends a command list to the queue, blocking on backpressure.
    pub fn submit_list(&self, list: CommandList) -> Result<(), RendererError> {
        self.queue.push(list)?;
        Ok(())
    }

    fn completion_guard(&self) -> MutexGuard<'_, ()> {
        match self.completion_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Completes a command and wakes every blocked `wait_for_status`
    /// caller. Called by handlers on the renderer thread.
    pub fn complete(&self, command: &Command, code: i32) {
        command.complete(code);
        drop(self.completion_guard());
        self.command_finish_one.notify_all();
    }

    /// Blocks until `cell` leaves the pending state, re-checking the cell
    /// after every wakeup of the shared completion condvar.
    ///
    /// Returns [`STATUS_SHUTDOWN`] if the renderer shuts down first.
    pub fn wait_for_status(&self, cell: &StatusCell) -> i32 {
        let code = cell.get();
        if code != STATUS_PENDING {
            return code;
        }

        let mut guard = self.completion_guard();
        while cell.is_pending() {
            if self.is_shutting_down() {
                return STATUS_SHUTDOWN;
            }
            guard = self
                .command_finish_one
                .wait(guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        cell.get()
    }

    /// Submits a one-command list and blocks until its handler completes,
    /// returning the completion code. Used for synchronous requests such
    /// as resource creation.
    pub fn send_single_command(
        &self,
        opcode: CommandOpcode,
        encode: impl FnOnce(&mut Command) -> Result<(), EncodeError>,
    ) -> Result<i32, RendererError> {
        let status = Arc::new(StatusCell::pending());
        let mut list = CommandList::new();
        list.add(opcode, Some(Arc::clone(&status)), encode);
        self.submit_list(list)?;

        match self.wait_for_status(&status) {
            STATUS_SHUTDOWN => Err(RendererError::Shutdown),
            code => Ok(code),
        }
    }

    /// Synchronously creates a render target on the renderer thread. The
    /// handler returns the new handle through the completion code; a
    /// negative code is a creation failure, fatal to the session.
    pub fn create_render_target(
        &self,
        params: RenderTargetParams,
    ) -> Result<RenderTargetId, RendererError> {
        let code =
            self.send_single_command(CommandOpcode::CreateRenderTarget, |cmd| cmd.push(params))?;
        if code < 0 {
            return Err(RendererError::Backend(code));
        }
        Ok(RenderTargetId(code as u32))
    }

    /// Synchronously destroys a render target on the renderer thread.
    pub fn destroy_render_target(&self, id: RenderTargetId) -> Result<(), RendererError> {
        let code =
            self.send_single_command(CommandOpcode::DestroyRenderTarget, |cmd| cmd.push(id))?;
        if code < 0 {
            return Err(RendererError::Backend(code));
        }
        Ok(())
    }

    /// Closes the queue and releases every producer blocked in
    /// `submit_list` or `wait_for_status`.
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        self.queue.close();
        drop(self.completion_guard());
        self.command_finish_one.notify_all();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    pub(crate) fn note_scene_processed(&self) {
        self.scene_processed_since_last_frame
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Folds the scenes processed since the previous frame into the
    /// rolling average that bounds how many lists the consumer drains per
    /// tick.
    pub fn new_frame(&self) {
        let processed = self
            .scene_processed_since_last_frame
            .swap(0, Ordering::Relaxed);
        let average = self.average_scene_per_frame.load(Ordering::Relaxed);
        let folded = ((average + processed) / 2).max(1);
        self.average_scene_per_frame.store(folded, Ordering::Relaxed);
    }

    pub fn average_scene_per_frame(&self) -> u32 {
        self.average_scene_per_frame.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::{Renderer, RendererError};
    use crate::backend::{BackendKind, FeatureFlags};
    use gxm_proto::{StatusCell, STATUS_NONE, STATUS_SHUTDOWN};
    use std::sync::Arc;
    use std::time::Duration;

    fn renderer() -> Renderer {
        Renderer::new(BackendKind::OpenGl, FeatureFlags::default())
    }

    #[test]
    fn wait_for_status_returns_immediately_when_already_signaled() {
        let renderer = renderer();
        let cell = StatusCell::pending();
        cell.set(STATUS_NONE);
        assert_eq!(renderer.wait_for_status(&cell), STATUS_NONE);
    }

    #[test]
    fn wait_for_status_blocks_until_complete() {
        let renderer = Arc::new(renderer());
        let cell = Arc::new(StatusCell::pending());

        let waiter = {
            let renderer = Arc::clone(&renderer);
            let cell = Arc::clone(&cell);
            std::thread::spawn(move || renderer.wait_for_status(&cell))
        };

        std::thread::sleep(Duration::from_millis(50));
        assert!(!waiter.is_finished(), "waiter released before completion");

        let cmd = gxm_proto::Command::new(gxm_proto::CommandOpcode::Nop, Some(Arc::clone(&cell)));
        renderer.complete(&cmd, 7);
        assert_eq!(waiter.join().expect("waiter thread"), 7);
    }

    #[test]
    fn shutdown_releases_blocked_waiters() {
        let renderer = Arc::new(renderer());
        let cell = Arc::new(StatusCell::pending());

        let waiter = {
            let renderer = Arc::clone(&renderer);
            let cell = Arc::clone(&cell);
            std::thread::spawn(move || renderer.wait_for_status(&cell))
        };

        std::thread::sleep(Duration::from_millis(20));
        renderer.shutdown();
        assert_eq!(waiter.join().expect("waiter thread"), STATUS_SHUTDOWN);
    }

    #[test]
    fn submissions_fail_after_shutdown() {
        let renderer = renderer();
        renderer.shutdown();
        assert_eq!(
            renderer.submit_list(gxm_proto::CommandList::new()),
            Err(RendererError::Shutdown)
        );
    }

    #[test]
    fn rolling_average_tracks_processed_scenes() {
        let renderer = renderer();
        assert_eq!(renderer.average_scene_per_frame(), 1);

        for _ in 0..7 {
            renderer.note_scene_processed();
        }
        renderer.new_frame();
        assert_eq!(renderer.average_scene_per_frame(), 4);

        // An idle frame decays the average but never below one.
        renderer.new_frame();
        renderer.new_frame();
        renderer.new_frame();
        assert_eq!(renderer.average_scene_per_frame(), 1);
    }
}
