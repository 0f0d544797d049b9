//! Renderer core for the GXM command stream.
//!
//! Guest driver calls are encoded as commands on producer threads (see
//! `gxm-proto`), accumulate in per-context lists, and cross to a single
//! renderer thread through a bounded queue. That thread owns the live
//! backend and replays every list in submission order; it is the only
//! thread allowed to touch the graphics API.
//!
//! ```text
//! producer: facade call -> Command -> CommandList -> Queue::push (blocks when full)
//! renderer: Queue::pop -> Executor dispatch -> Backend calls -> complete()
//! ```
//!
//! Producers synchronize with the renderer through per-command
//! [`StatusCell`](gxm_proto::StatusCell)s (one shared completion condvar on
//! the [`Renderer`]) and through guest-visible
//! [`SyncObject`](gxm_proto::SyncObject)s.

mod backend;
mod context;
mod executor;
mod queue;
mod renderer;
mod shader_cache;

pub use backend::{Backend, BackendError, BackendKind, FeatureFlags, RecordingBackend};
pub use context::GxmContext;
pub use executor::Executor;
pub use queue::{Queue, QueueClosed};
pub use renderer::{Renderer, RendererError, DEFAULT_QUEUE_CAPACITY};
pub use shader_cache::{
    ShaderCache, ShaderStage, ShaderStore, ShaderTranslator, TranslateError, Translation,
};
