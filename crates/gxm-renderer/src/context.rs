//! Producer-side context facade.
//!
//! One `GxmContext` exists per emulated GXM context. Every mutating call
//! encodes exactly one command into the context's in-progress list; the
//! list reaches the renderer thread on [`flush`](GxmContext::flush),
//! [`finish`](GxmContext::finish) or one of the synchronous resource
//! operations. Successive submissions from one context are never reordered
//! relative to each other.

use std::sync::Arc;

use gxm_proto::{
    Command, CommandList, CommandOpcode, ContextId, ContextSnapshot, CullMode, DepthFunc,
    DepthWriteMode, GxmState, IndexFormat, PolygonMode, PrimitiveType, RegionClipMode,
    RenderTargetId, StatusCell, StencilFunc, StencilOp, SyncObject, TextureWord, TwoSidedMode,
    UniformParam, Viewport, ViewportMode, STATUS_NONE, STATUS_SHUTDOWN,
};

use crate::renderer::{Renderer, RendererError};

pub struct GxmContext {
    renderer: Arc<Renderer>,
    id: ContextId,
    /// Driver-visible state mirrored as commands are encoded; cloned into
    /// each submitted list as that list's snapshot.
    state: ContextSnapshot,
    command_list: CommandList,
    /// Completion cell reused by every `finish` round trip.
    render_finish_status: Arc<StatusCell>,
}

impl GxmContext {
    /// Creates the producer-side facade without touching the backend.
    pub fn new(renderer: Arc<Renderer>) -> Self {
        let id = renderer.allocate_context_id();
        Self {
            renderer,
            id,
            state: ContextSnapshot::default(),
            command_list: CommandList::new(),
            render_finish_status: Arc::new(StatusCell::pending()),
        }
    }

    /// Creates the facade and synchronously asks the backend to set up its
    /// per-context resources. Requires the renderer thread to be draining
    /// the queue; fails hard if the backend cannot create the context.
    pub fn create(renderer: Arc<Renderer>) -> Result<Self, RendererError> {
        let ctx = Self::new(renderer);
        let code = ctx
            .renderer
            .send_single_command(CommandOpcode::CreateContext, |cmd| cmd.push(ctx.id))?;
        if code < 0 {
            return Err(RendererError::Backend(code));
        }
        Ok(ctx)
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn renderer(&self) -> &Arc<Renderer> {
        &self.renderer
    }

    /// Number of commands accumulated and not yet submitted.
    pub fn pending_commands(&self) -> usize {
        self.command_list.len()
    }

    // --- state setters: one encoded command each -------------------------

    pub fn set_depth_bias(&mut self, front: bool, factor: i32, units: i32) {
        self.command_list.add_set_state(GxmState::DepthBias, |cmd| {
            cmd.push(front)?;
            cmd.push(factor)?;
            cmd.push(units)
        });
    }

    pub fn set_depth_func(&mut self, front: bool, func: DepthFunc) {
        self.command_list.add_set_state(GxmState::DepthFunc, |cmd| {
            cmd.push(front)?;
            cmd.push(func)
        });
    }

    pub fn set_depth_write_enable(&mut self, front: bool, mode: DepthWriteMode) {
        self.command_list
            .add_set_state(GxmState::DepthWriteEnable, |cmd| {
                cmd.push(front)?;
                cmd.push(mode)
            });
    }

    pub fn set_point_line_width(&mut self, front: bool, width: u32) {
        self.command_list
            .add_set_state(GxmState::PointLineWidth, |cmd| {
                cmd.push(front)?;
                cmd.push(width)
            });
    }

    pub fn set_polygon_mode(&mut self, front: bool, mode: PolygonMode) {
        self.command_list.add_set_state(GxmState::PolygonMode, |cmd| {
            cmd.push(front)?;
            cmd.push(mode)
        });
    }

    #[allow(clippy::too_many_arguments)]
    pub fn set_stencil_func(
        &mut self,
        front: bool,
        func: StencilFunc,
        stencil_fail: StencilOp,
        depth_fail: StencilOp,
        depth_pass: StencilOp,
        compare_mask: u8,
        write_mask: u8,
    ) {
        self.command_list.add_set_state(GxmState::StencilFunc, |cmd| {
            cmd.push(front)?;
            cmd.push(func)?;
            cmd.push(stencil_fail)?;
            cmd.push(depth_fail)?;
            cmd.push(depth_pass)?;
            cmd.push(compare_mask)?;
            cmd.push(write_mask)
        });
    }

    pub fn set_stencil_ref(&mut self, front: bool, sref: u8) {
        self.command_list.add_set_state(GxmState::StencilRef, |cmd| {
            cmd.push(front)?;
            cmd.push(sref)
        });
    }

    /// Binds a guest program by its raw bytes. The renderer thread
    /// translates (or pulls from the shader cache) and creates the backend
    /// program on first sight of a given byte sequence.
    pub fn set_program(&mut self, program: &[u8], is_fragment: bool) {
        let bytes = program.to_vec();
        self.command_list.add_set_state(GxmState::Program, |cmd| {
            cmd.push(is_fragment)?;
            cmd.push_blob(bytes)
        });
    }

    pub fn set_cull_mode(&mut self, cull: CullMode) {
        self.command_list
            .add_set_state(GxmState::CullMode, |cmd| cmd.push(cull));
    }

    pub fn set_fragment_texture(&mut self, index: u32, texture: TextureWord) {
        self.command_list
            .add_set_state(GxmState::FragmentTexture, |cmd| {
                cmd.push(index)?;
                cmd.push(texture)
            });
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.command_list.add_set_state(GxmState::Viewport, |cmd| {
            cmd.push(ViewportMode::Enabled)?;
            cmd.push(true)?;
            cmd.push(viewport)
        });
    }

    pub fn set_viewport_enable(&mut self, mode: ViewportMode) {
        self.command_list.add_set_state(GxmState::Viewport, |cmd| {
            cmd.push(mode)?;
            cmd.push(false)
        });
    }

    pub fn set_region_clip(&mut self, mode: RegionClipMode, x_min: u32, x_max: u32, y_min: u32, y_max: u32) {
        self.command_list.add_set_state(GxmState::RegionClip, |cmd| {
            cmd.push(mode)?;
            cmd.push(x_min)?;
            cmd.push(x_max)?;
            cmd.push(y_min)?;
            cmd.push(y_max)
        });
    }

    pub fn set_two_sided_enable(&mut self, mode: TwoSidedMode) {
        self.command_list
            .add_set_state(GxmState::TwoSided, |cmd| cmd.push(mode));
    }

    pub fn set_uniform(&mut self, is_vertex: bool, param: UniformParam, data: &[u8]) {
        let bytes = data.to_vec();
        self.command_list.add_set_state(GxmState::Uniform, |cmd| {
            cmd.push(is_vertex)?;
            cmd.push(param)?;
            cmd.push_blob(bytes)
        });
    }

    /// Uploads a uniform block. The copy is padded to a 16-byte multiple,
    /// the granularity uniform blocks are laid out in.
    pub fn set_uniform_buffer(&mut self, is_vertex: bool, block: u32, data: &[u8]) {
        let padded_len = data.len().div_ceil(16) * 16;
        let mut copy = vec![0u8; padded_len];
        copy[..data.len()].copy_from_slice(data);

        self.command_list
            .add_set_state(GxmState::UniformBuffer, |cmd| {
                cmd.push(is_vertex)?;
                cmd.push(block)?;
                cmd.push_blob(copy)
            });
    }

    pub fn set_vertex_stream(&mut self, index: u32, data: &[u8]) {
        let bytes = data.to_vec();
        self.command_list.add_set_state(GxmState::VertexStream, |cmd| {
            cmd.push(index)?;
            cmd.push_blob(bytes)
        });
    }

    // --- dedicated opcodes ----------------------------------------------

    pub fn set_context(&mut self, render_target: Option<RenderTargetId>) {
        self.state.render_target = render_target;
        self.command_list
            .add(CommandOpcode::SetContext, None, |cmd| {
                cmd.push(render_target.is_some())?;
                cmd.push(render_target.unwrap_or(RenderTargetId(0)))
            });
    }

    pub fn draw(
        &mut self,
        primitive: PrimitiveType,
        index_format: IndexFormat,
        index_data: &[u8],
        count: u32,
    ) {
        let indices = index_data.to_vec();
        self.command_list.add(CommandOpcode::Draw, None, |cmd| {
            cmd.push(primitive)?;
            cmd.push(index_format)?;
            cmd.push(count)?;
            cmd.push_blob(indices)
        });
    }

    pub fn sync_surface_data(&mut self) {
        self.command_list
            .add(CommandOpcode::SyncSurfaceData, None, |_| Ok(()));
    }

    /// Queues a signal of the sync object's fragment subject, to fire once
    /// all previously queued work in this list has executed.
    pub fn signal_sync_object(&mut self, sync: Arc<SyncObject>) {
        let mut cmd = Command::new(CommandOpcode::SignalSyncObject, None);
        cmd.set_sync_object(sync);
        self.command_list.commands.push_back(cmd);
    }

    /// Synchronously releases the backend's per-context resources,
    /// consuming the facade. Commands accumulated but never submitted are
    /// dropped.
    pub fn destroy(self) -> Result<(), RendererError> {
        let code = self
            .renderer
            .send_single_command(CommandOpcode::DestroyContext, |cmd| cmd.push(self.id))?;
        if code < 0 {
            return Err(RendererError::Backend(code));
        }
        Ok(())
    }

    // --- submission ------------------------------------------------------

    /// Stamps `list` with this context and a snapshot of its driver state,
    /// then pushes it onto the renderer's queue (blocking on backpressure).
    pub fn submit(&self, mut list: CommandList) -> Result<(), RendererError> {
        list.context = Some(self.id);
        list.snapshot = Some(Arc::new(self.state.clone()));
        self.renderer.submit_list(list)
    }

    /// Submits the accumulated command list, if any.
    pub fn flush(&mut self) -> Result<(), RendererError> {
        if self.command_list.is_empty() {
            return Ok(());
        }
        let list = std::mem::take(&mut self.command_list);
        self.submit(list)
    }

    /// Queues a no-op carrying this context's completion cell, submits
    /// everything accumulated, and blocks until the no-op executes — i.e.
    /// until all previously queued work for this context has been
    /// dispatched.
    pub fn finish(&mut self) -> Result<(), RendererError> {
        self.render_finish_status.reset();
        let status = Arc::clone(&self.render_finish_status);
        self.command_list.add(CommandOpcode::Nop, Some(status), |cmd| {
            cmd.push(STATUS_NONE)
        });
        self.flush()?;

        match self.renderer.wait_for_status(&self.render_finish_status) {
            STATUS_SHUTDOWN => Err(RendererError::Shutdown),
            _ => Ok(()),
        }
    }
}
