//! Driver-visible state values carried as command arguments.
//!
//! These mirror the guest GXM enums closely enough for a backend to map
//! them onto its own pipeline state; they are deliberately plain `Copy`
//! data with no backend types leaking in.

use bytemuck::{Pod, Zeroable};

use crate::arg::{impl_arg_for_pod, ArgTag, CommandArg};

macro_rules! gxm_enum {
    ($(#[$meta:meta])* $name:ident => $tag:ident {
        $($(#[$vmeta:meta])* $variant:ident = $value:expr),* $(,)?
    }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        #[repr(u32)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $value),*
        }

        impl $name {
            pub fn from_raw(raw: u32) -> Option<Self> {
                match raw {
                    $($value => Some(Self::$variant),)*
                    _ => None,
                }
            }
        }

        crate::arg::impl_arg_for_enum! { $name => $tag }
    };
}

gxm_enum! {
    DepthFunc => DepthFunc {
        Never = 0,
        Less = 1,
        Equal = 2,
        LessEqual = 3,
        Greater = 4,
        NotEqual = 5,
        GreaterEqual = 6,
        Always = 7,
    }
}

gxm_enum! {
    DepthWriteMode => DepthWriteMode {
        Disabled = 0,
        Enabled = 1,
    }
}

gxm_enum! {
    PolygonMode => PolygonMode {
        Point = 0,
        Line = 1,
        TriangleLine = 2,
        TriangleFill = 3,
    }
}

gxm_enum! {
    StencilFunc => StencilFunc {
        Never = 0,
        Less = 1,
        Equal = 2,
        LessEqual = 3,
        Greater = 4,
        NotEqual = 5,
        GreaterEqual = 6,
        Always = 7,
    }
}

gxm_enum! {
    StencilOp => StencilOp {
        Keep = 0,
        Zero = 1,
        Replace = 2,
        Incr = 3,
        Decr = 4,
        Invert = 5,
        IncrWrap = 6,
        DecrWrap = 7,
    }
}

gxm_enum! {
    CullMode => CullMode {
        None = 0,
        Cw = 1,
        Ccw = 2,
    }
}

gxm_enum! {
    TwoSidedMode => TwoSidedMode {
        Disabled = 0,
        Enabled = 1,
    }
}

gxm_enum! {
    ViewportMode => ViewportMode {
        Disabled = 0,
        Enabled = 1,
    }
}

gxm_enum! {
    RegionClipMode => RegionClipMode {
        None = 0,
        All = 1,
        Outside = 2,
        Inside = 3,
    }
}

gxm_enum! {
    PrimitiveType => PrimitiveType {
        Points = 0,
        Lines = 1,
        Triangles = 2,
        TriangleStrip = 3,
        TriangleFan = 4,
    }
}

gxm_enum! {
    IndexFormat => IndexFormat {
        U16 = 0,
        U32 = 1,
    }
}

/// Identifier of one emulated GXM context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContextId(pub u32);

impl CommandArg for ContextId {
    const TAG: ArgTag = ArgTag::ContextId;
    const SIZE: usize = 4;

    fn encode(&self, out: &mut [u8]) {
        out.copy_from_slice(&self.0.to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> Self {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(bytes);
        Self(u32::from_le_bytes(raw))
    }
}

/// Backend-assigned render target handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RenderTargetId(pub u32);

impl CommandArg for RenderTargetId {
    const TAG: ArgTag = ArgTag::RenderTargetId;
    const SIZE: usize = 4;

    fn encode(&self, out: &mut [u8]) {
        out.copy_from_slice(&self.0.to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> Self {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(bytes);
        Self(u32::from_le_bytes(raw))
    }
}

/// Backend-assigned shader program handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProgramId(pub u32);

/// Raw guest texture descriptor, carried by value like the original
/// control words.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct TextureWord {
    pub words: [u32; 4],
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Viewport {
    pub x_offset: f32,
    pub y_offset: f32,
    pub z_offset: f32,
    pub x_scale: f32,
    pub y_scale: f32,
    pub z_scale: f32,
}

/// Guest parameters for render target creation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct RenderTargetParams {
    pub width: u32,
    pub height: u32,
    pub scenes_per_frame: u32,
    pub multisample_mode: u32,
}

/// Location of one uniform within the active program.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct UniformParam {
    pub index: u32,
    pub component_count: u32,
}

impl_arg_for_pod! {
    TextureWord => TextureWord,
    Viewport => Viewport,
    RenderTargetParams => RenderTargetParams,
    UniformParam => UniformParam,
}

/// Snapshot of the driver-visible state a context had when it submitted a
/// command list. Cloned at submission time, so the renderer thread reads a
/// stable copy while the producer keeps mutating its own.
#[derive(Clone, Debug, Default)]
pub struct ContextSnapshot {
    /// Render target bound by the most recent `set_context`, if any.
    pub render_target: Option<RenderTargetId>,
}
