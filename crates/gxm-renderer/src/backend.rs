//! Backend capability interface.
//!
//! A backend is one concrete host graphics API realizing the context
//! operation contract. The set of variants is closed and selected once at
//! startup; dispatch goes through this trait rather than a shared base
//! type, and every call happens on the renderer thread — invoking a
//! backend from any other thread is forbidden by contract.

use std::sync::{Arc, Mutex};

use thiserror::Error;

use gxm_proto::{
    CullMode, DepthFunc, DepthWriteMode, IndexFormat, PolygonMode, PrimitiveType, ProgramId,
    RegionClipMode, RenderTargetId, RenderTargetParams, StencilFunc, StencilOp, TextureWord,
    TwoSidedMode, UniformParam, Viewport, ViewportMode,
};

use gxm_proto::ContextId;

/// Host graphics API variants a backend may be built against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    OpenGl,
    Vulkan,
}

/// Backend device/resource creation failure. Fatal to the emulation
/// session; surfaced to the caller, never retried.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("backend {0:?} is not available in this build")]
    Unavailable(BackendKind),
    #[error("backend resource creation failed: {0}")]
    Creation(String),
}

/// Capability bits of the selected backend, probed once at startup and
/// exposed to collaborators (shader translation, texture upload paths)
/// through the renderer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Fragment output can be read back directly in-shader.
    pub direct_fragcolor: bool,
    /// Fragment shader interlock (or an equivalent) is usable.
    pub support_shader_interlock: bool,
}

/// Operation contract every backend variant implements.
///
/// State setters mirror the facade 1:1 and are infallible by design: a
/// backend maps unsupported state to its nearest equivalent and logs,
/// because a malformed or exotic guest stream must degrade rendering, not
/// crash it. Resource creation is the fallible surface.
pub trait Backend: Send {
    fn create_context(&mut self, id: ContextId) -> Result<(), BackendError>;
    fn destroy_context(&mut self, id: ContextId);

    fn create_render_target(
        &mut self,
        params: &RenderTargetParams,
    ) -> Result<RenderTargetId, BackendError>;
    fn destroy_render_target(&mut self, id: RenderTargetId);

    /// Creates a vertex program from raw guest program bytes plus the
    /// translated source produced by the shader cache.
    fn create_vertex_program(
        &mut self,
        program: &[u8],
        source: &str,
    ) -> Result<ProgramId, BackendError>;
    fn create_fragment_program(
        &mut self,
        program: &[u8],
        source: &str,
    ) -> Result<ProgramId, BackendError>;

    fn set_context(&mut self, render_target: Option<RenderTargetId>);
    fn set_depth_bias(&mut self, front: bool, factor: i32, units: i32);
    fn set_depth_func(&mut self, front: bool, func: DepthFunc);
    fn set_depth_write_enable(&mut self, front: bool, mode: DepthWriteMode);
    fn set_point_line_width(&mut self, front: bool, width: u32);
    fn set_polygon_mode(&mut self, front: bool, mode: PolygonMode);
    #[allow(clippy::too_many_arguments)]
    fn set_stencil_func(
        &mut self,
        front: bool,
        func: StencilFunc,
        stencil_fail: StencilOp,
        depth_fail: StencilOp,
        depth_pass: StencilOp,
        compare_mask: u8,
        write_mask: u8,
    );
    fn set_stencil_ref(&mut self, front: bool, sref: u8);
    fn set_program(&mut self, id: ProgramId, is_fragment: bool);
    fn set_cull_mode(&mut self, cull: CullMode);
    fn set_fragment_texture(&mut self, index: u32, texture: TextureWord);
    fn set_viewport(&mut self, viewport: Viewport);
    fn set_viewport_enable(&mut self, mode: ViewportMode);
    fn set_region_clip(&mut self, mode: RegionClipMode, x_min: u32, x_max: u32, y_min: u32, y_max: u32);
    fn set_two_sided_enable(&mut self, mode: TwoSidedMode);
    fn set_uniform(&mut self, is_vertex: bool, param: UniformParam, data: &[u8]);
    fn set_uniform_buffer(&mut self, is_vertex: bool, block: u32, data: &[u8]);
    fn set_vertex_stream(&mut self, index: u32, data: &[u8]);

    fn draw(
        &mut self,
        primitive: PrimitiveType,
        index_format: IndexFormat,
        index_data: &[u8],
        count: u32,
    );

    fn sync_surface_data(&mut self);
}

/// Backend that records every call instead of touching a real device.
///
/// Used by the dispatch tests and useful as a trace backend when diffing
/// two replays of the same guest stream.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    log: Arc<Mutex<Vec<String>>>,
    next_render_target: u32,
    next_program: u32,
    /// When set, render target creation fails; exercises the fatal
    /// creation path.
    pub fail_render_target_creation: bool,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone of the shared call log, for inspection after the backend has
    /// moved onto the renderer thread.
    pub fn log_handle(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.log)
    }

    fn record(&self, entry: String) {
        self.log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(entry);
    }
}

impl Backend for RecordingBackend {
    fn create_context(&mut self, id: ContextId) -> Result<(), BackendError> {
        self.record(format!("create_context({})", id.0));
        Ok(())
    }

    fn destroy_context(&mut self, id: ContextId) {
        self.record(format!("destroy_context({})", id.0));
    }

    fn create_render_target(
        &mut self,
        params: &RenderTargetParams,
    ) -> Result<RenderTargetId, BackendError> {
        if self.fail_render_target_creation {
            return Err(BackendError::Creation(format!(
                "refusing {}x{} render target",
                params.width, params.height
            )));
        }
        let id = RenderTargetId(self.next_render_target);
        self.next_render_target += 1;
        self.record(format!(
            "create_render_target({}x{}) -> {}",
            params.width, params.height, id.0
        ));
        Ok(id)
    }

    fn destroy_render_target(&mut self, id: RenderTargetId) {
        self.record(format!("destroy_render_target({})", id.0));
    }

    fn create_vertex_program(
        &mut self,
        program: &[u8],
        _source: &str,
    ) -> Result<ProgramId, BackendError> {
        let id = ProgramId(self.next_program);
        self.next_program += 1;
        self.record(format!("create_vertex_program({} bytes) -> {}", program.len(), id.0));
        Ok(id)
    }

    fn create_fragment_program(
        &mut self,
        program: &[u8],
        _source: &str,
    ) -> Result<ProgramId, BackendError> {
        let id = ProgramId(self.next_program);
        self.next_program += 1;
        self.record(format!(
            "create_fragment_program({} bytes) -> {}",
            program.len(),
            id.0
        ));
        Ok(id)
    }

    fn set_context(&mut self, render_target: Option<RenderTargetId>) {
        self.record(format!("set_context({:?})", render_target.map(|rt| rt.0)));
    }

    fn set_depth_bias(&mut self, front: bool, factor: i32, units: i32) {
        self.record(format!("set_depth_bias({front}, {factor}, {units})"));
    }

    fn set_depth_func(&mut self, front: bool, func: DepthFunc) {
        self.record(format!("set_depth_func({front}, {func:?})"));
    }

    fn set_depth_write_enable(&mut self, front: bool, mode: DepthWriteMode) {
        self.record(format!("set_depth_write_enable({front}, {mode:?})"));
    }

    fn set_point_line_width(&mut self, front: bool, width: u32) {
        self.record(format!("set_point_line_width({front}, {width})"));
    }

    fn set_polygon_mode(&mut self, front: bool, mode: PolygonMode) {
        self.record(format!("set_polygon_mode({front}, {mode:?})"));
    }

    fn set_stencil_func(
        &mut self,
        front: bool,
        func: StencilFunc,
        stencil_fail: StencilOp,
        depth_fail: StencilOp,
        depth_pass: StencilOp,
        compare_mask: u8,
        write_mask: u8,
    ) {
        self.record(format!(
            "set_stencil_func({front}, {func:?}, {stencil_fail:?}, {depth_fail:?}, {depth_pass:?}, {compare_mask:#04x}, {write_mask:#04x})"
        ));
    }

    fn set_stencil_ref(&mut self, front: bool, sref: u8) {
        self.record(format!("set_stencil_ref({front}, {sref})"));
    }

    fn set_program(&mut self, id: ProgramId, is_fragment: bool) {
        self.record(format!("set_program({}, fragment={is_fragment})", id.0));
    }

    fn set_cull_mode(&mut self, cull: CullMode) {
        self.record(format!("set_cull_mode({cull:?})"));
    }

    fn set_fragment_texture(&mut self, index: u32, texture: TextureWord) {
        self.record(format!("set_fragment_texture({index}, {:08x?})", texture.words));
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.record(format!(
            "set_viewport({}, {}, {})",
            viewport.x_offset, viewport.y_offset, viewport.z_offset
        ));
    }

    fn set_viewport_enable(&mut self, mode: ViewportMode) {
        self.record(format!("set_viewport_enable({mode:?})"));
    }

    fn set_region_clip(&mut self, mode: RegionClipMode, x_min: u32, x_max: u32, y_min: u32, y_max: u32) {
        self.record(format!(
            "set_region_clip({mode:?}, {x_min}..{x_max}, {y_min}..{y_max})"
        ));
    }

    fn set_two_sided_enable(&mut self, mode: TwoSidedMode) {
        self.record(format!("set_two_sided_enable({mode:?})"));
    }

    fn set_uniform(&mut self, is_vertex: bool, param: UniformParam, data: &[u8]) {
        self.record(format!(
            "set_uniform(vertex={is_vertex}, index={}, {} bytes)",
            param.index,
            data.len()
        ));
    }

    fn set_uniform_buffer(&mut self, is_vertex: bool, block: u32, data: &[u8]) {
        self.record(format!(
            "set_uniform_buffer(vertex={is_vertex}, block={block}, {} bytes)",
            data.len()
        ));
    }

    fn set_vertex_stream(&mut self, index: u32, data: &[u8]) {
        self.record(format!("set_vertex_stream({index}, {} bytes)", data.len()));
    }

    fn draw(
        &mut self,
        primitive: PrimitiveType,
        index_format: IndexFormat,
        index_data: &[u8],
        count: u32,
    ) {
        self.record(format!(
            "draw({primitive:?}, {index_format:?}, {} index bytes, {count})",
            index_data.len()
        ));
    }

    fn sync_surface_data(&mut self) {
        self.record("sync_surface_data".to_owned());
    }
}
