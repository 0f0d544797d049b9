//! Typed argument encoding for the inline command buffer.
//!
//! Every argument pushed into a [`Command`](crate::Command) records an
//! [`ArgTag`] beside its little-endian payload. The tag is checked again on
//! `pop`, so an encoder/decoder disagreement about argument shape is caught
//! as an explicit contract violation instead of being silently misread as
//! another type.

/// Type tag recorded for each pushed argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ArgTag {
    Bool,
    U8,
    U16,
    U32,
    U64,
    I32,
    I64,
    F32,
    F64,
    /// `GxmState` sub-tag of a `SetState` command.
    State,
    /// Index of an out-of-line payload in the command's blob table.
    Blob,
    ContextId,
    RenderTargetId,
    DepthFunc,
    DepthWriteMode,
    PolygonMode,
    StencilFunc,
    StencilOp,
    CullMode,
    TwoSidedMode,
    ViewportMode,
    RegionClipMode,
    PrimitiveType,
    IndexFormat,
    TextureWord,
    Viewport,
    RenderTargetParams,
    UniformParam,
}

/// A value that can travel through a command's inline argument buffer.
pub trait CommandArg: Sized {
    const TAG: ArgTag;
    const SIZE: usize;

    /// Writes exactly [`Self::SIZE`] bytes into `out`.
    fn encode(&self, out: &mut [u8]);

    /// Reads back a value from exactly [`Self::SIZE`] bytes.
    ///
    /// Only called after the tag check passed, so the bytes are guaranteed
    /// to have been produced by `encode` of the same type.
    fn decode(bytes: &[u8]) -> Self;
}

macro_rules! impl_arg_for_int {
    ($($ty:ty => $tag:ident),* $(,)?) => {
        $(impl CommandArg for $ty {
            const TAG: ArgTag = ArgTag::$tag;
            const SIZE: usize = core::mem::size_of::<$ty>();

            fn encode(&self, out: &mut [u8]) {
                out.copy_from_slice(&self.to_le_bytes());
            }

            fn decode(bytes: &[u8]) -> Self {
                let mut raw = [0u8; core::mem::size_of::<$ty>()];
                raw.copy_from_slice(bytes);
                Self::from_le_bytes(raw)
            }
        })*
    };
}

impl_arg_for_int! {
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    i32 => I32,
    i64 => I64,
    f32 => F32,
    f64 => F64,
}

impl CommandArg for bool {
    const TAG: ArgTag = ArgTag::Bool;
    const SIZE: usize = 1;

    fn encode(&self, out: &mut [u8]) {
        out[0] = u8::from(*self);
    }

    fn decode(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}

/// Implements [`CommandArg`] for a fieldless `#[repr(u32)]` enum that
/// provides `from_raw(u32) -> Option<Self>`.
macro_rules! impl_arg_for_enum {
    ($($ty:ty => $tag:ident),* $(,)?) => {
        $(impl $crate::arg::CommandArg for $ty {
            const TAG: $crate::arg::ArgTag = $crate::arg::ArgTag::$tag;
            const SIZE: usize = 4;

            fn encode(&self, out: &mut [u8]) {
                out.copy_from_slice(&(*self as u32).to_le_bytes());
            }

            fn decode(bytes: &[u8]) -> Self {
                let mut raw = [0u8; 4];
                raw.copy_from_slice(bytes);
                let raw = u32::from_le_bytes(raw);
                <$ty>::from_raw(raw).unwrap_or_else(|| {
                    panic!(concat!("invalid encoded ", stringify!($ty), " value {}"), raw)
                })
            }
        })*
    };
}

/// Implements [`CommandArg`] for a `bytemuck::Pod` struct.
macro_rules! impl_arg_for_pod {
    ($($ty:ty => $tag:ident),* $(,)?) => {
        $(impl $crate::arg::CommandArg for $ty {
            const TAG: $crate::arg::ArgTag = $crate::arg::ArgTag::$tag;
            const SIZE: usize = core::mem::size_of::<$ty>();

            fn encode(&self, out: &mut [u8]) {
                out.copy_from_slice(bytemuck::bytes_of(self));
            }

            fn decode(bytes: &[u8]) -> Self {
                bytemuck::pod_read_unaligned(bytes)
            }
        })*
    };
}

pub(crate) use {impl_arg_for_enum, impl_arg_for_pod};
