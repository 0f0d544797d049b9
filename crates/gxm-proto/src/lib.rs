//! Guest-visible GXM command protocol.
//!
//! Producer threads intercept guest driver calls and encode each of them as
//! one [`Command`]: an opcode plus a fixed-capacity typed argument buffer.
//! Commands accumulate in a [`CommandList`] that is later replayed, in
//! submission order, by the single renderer thread. This crate defines only
//! the encoding; queueing and dispatch live in `gxm-renderer`.

mod arg;
mod cmd;
mod state;
mod status;
mod sync_object;

pub use arg::{ArgTag, CommandArg};
pub use cmd::{Command, CommandList, EncodeError, MAX_COMMAND_ARGS, MAX_COMMAND_DATA_SIZE};
pub use state::{
    ContextId, ContextSnapshot, CullMode, DepthFunc, DepthWriteMode, IndexFormat, PolygonMode,
    PrimitiveType, ProgramId, RegionClipMode, RenderTargetId, RenderTargetParams, StencilFunc,
    StencilOp, TextureWord, TwoSidedMode, UniformParam, Viewport, ViewportMode,
};
pub use status::{
    StatusCell, STATUS_ERROR, STATUS_NONE, STATUS_PENDING, STATUS_SHUTDOWN,
};
pub use sync_object::{SyncObject, SyncSubject};

/// Logical operation tag carried by a [`Command`].
///
/// Stored on the wire as a raw `u16` so that a stream may carry opcodes this
/// build does not know about; the dispatcher treats those as recoverable
/// (logged and skipped), which is the forward-compatibility path for
/// backends implementing a subset of the catalogue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CommandOpcode {
    /// Synchronous: backend sets up its per-context resources.
    CreateContext = 0,
    /// Synchronous: backend allocates a render target, returns its handle
    /// through the completion code.
    CreateRenderTarget = 1,
    Draw = 2,
    /// No effect on the backend; only signals back to the producer.
    Nop = 3,
    /// Set one piece of GXM state; the first argument is the
    /// [`GxmState`] sub-tag identifying which piece.
    SetState = 4,
    SetContext = 5,
    SyncSurfaceData = 6,
    /// Mark the fragment subject of the carried sync object as done.
    SignalSyncObject = 7,
    DestroyRenderTarget = 8,
    /// Synchronous: backend releases its per-context resources.
    DestroyContext = 9,
}

impl CommandOpcode {
    /// One past the highest assigned opcode; sizes the dispatch table.
    pub const COUNT: usize = 10;

    pub fn from_raw(raw: u16) -> Option<Self> {
        Some(match raw {
            0 => Self::CreateContext,
            1 => Self::CreateRenderTarget,
            2 => Self::Draw,
            3 => Self::Nop,
            4 => Self::SetState,
            5 => Self::SetContext,
            6 => Self::SyncSurfaceData,
            7 => Self::SignalSyncObject,
            8 => Self::DestroyRenderTarget,
            9 => Self::DestroyContext,
            _ => return None,
        })
    }
}

/// Sub-tag carried by `SetState` commands, identifying which piece of
/// driver-visible state the rest of the arguments describe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum GxmState {
    DepthBias = 0,
    DepthFunc = 1,
    DepthWriteEnable = 2,
    PointLineWidth = 3,
    PolygonMode = 4,
    StencilFunc = 5,
    StencilRef = 6,
    Program = 7,
    CullMode = 8,
    FragmentTexture = 9,
    Viewport = 10,
    RegionClip = 11,
    TwoSided = 12,
    Uniform = 13,
    UniformBuffer = 14,
    VertexStream = 15,
}

impl GxmState {
    pub fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => Self::DepthBias,
            1 => Self::DepthFunc,
            2 => Self::DepthWriteEnable,
            3 => Self::PointLineWidth,
            4 => Self::PolygonMode,
            5 => Self::StencilFunc,
            6 => Self::StencilRef,
            7 => Self::Program,
            8 => Self::CullMode,
            9 => Self::FragmentTexture,
            10 => Self::Viewport,
            11 => Self::RegionClip,
            12 => Self::TwoSided,
            13 => Self::Uniform,
            14 => Self::UniformBuffer,
            15 => Self::VertexStream,
            _ => return None,
        })
    }
}

arg::impl_arg_for_enum! { GxmState => State }
