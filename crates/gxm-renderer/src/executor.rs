//! Consumer-side command dispatch.
//!
//! The executor runs on the single renderer thread, owns the live backend,
//! and replays popped command lists against it. Dispatch is a linear walk
//! over each list with a static opcode-indexed handler table — no state
//! machine. An opcode with no table entry is logged and skipped: backends
//! implementing a subset of the catalogue degrade rendering, they do not
//! abort it.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, error, warn};

use gxm_proto::{
    Command, CommandList, ContextId, CullMode, DepthFunc, DepthWriteMode, GxmState, IndexFormat,
    PolygonMode, PrimitiveType, ProgramId, RegionClipMode, RenderTargetId, RenderTargetParams,
    StencilFunc, StencilOp, SyncSubject, TextureWord, TwoSidedMode, UniformParam, Viewport,
    ViewportMode, STATUS_ERROR, STATUS_NONE,
};

use crate::backend::Backend;
use crate::renderer::Renderer;
use crate::shader_cache::{ShaderCache, ShaderStage};

/// How long one `pop` may wait for emulated work before the tick yields
/// back to the frame loop.
const POP_TIMEOUT: Duration = Duration::from_millis(2);

type HandlerFn = fn(&mut Executor, &Renderer, &mut Command, &CommandList);

// Indexed by raw opcode; order must match `CommandOpcode`'s discriminants.
static HANDLERS: [Option<HandlerFn>; gxm_proto::CommandOpcode::COUNT] = [
    Some(cmd_handle_create_context),
    Some(cmd_handle_create_render_target),
    Some(cmd_handle_draw),
    Some(cmd_handle_nop),
    Some(cmd_handle_set_state),
    Some(cmd_handle_set_context),
    Some(cmd_handle_sync_surface_data),
    Some(cmd_handle_signal_sync_object),
    Some(cmd_handle_destroy_render_target),
    Some(cmd_handle_destroy_context),
];

pub struct Executor {
    backend: Box<dyn Backend>,
    shader_cache: ShaderCache,
    /// Backend program handle per program digest, so the backend creates
    /// each distinct guest program once.
    programs: HashMap<(blake3::Hash, ShaderStage), ProgramId>,
}

impl Executor {
    pub fn new(backend: Box<dyn Backend>, shader_cache: ShaderCache) -> Self {
        Self {
            backend,
            shader_cache,
            programs: HashMap::new(),
        }
    }

    pub fn shader_cache(&self) -> &ShaderCache {
        &self.shader_cache
    }

    /// Per-tick driver: pops and replays up to the renderer's rolling
    /// average of lists per frame, returning immediately once the queue
    /// runs dry — a tick with no emulated work beats a stalled present.
    pub fn process_batches(&mut self, renderer: &Renderer) {
        let quota = renderer.average_scene_per_frame();
        let mut processed = 0;
        while processed < quota {
            let Some(list) = renderer.queue().pop(POP_TIMEOUT) else {
                return;
            };
            self.process_batch(renderer, list);
            processed += 1;
        }
    }

    /// Replays one command list in order, freeing each command after its
    /// handler runs.
    pub fn process_batch(&mut self, renderer: &Renderer, mut list: CommandList) {
        while let Some(mut cmd) = list.commands.pop_front() {
            let raw = cmd.opcode_raw();
            match HANDLERS.get(raw as usize).copied().flatten() {
                Some(handler) => handler(self, renderer, &mut cmd, &list),
                None => error!(opcode = raw, "unimplemented command opcode"),
            }
        }
        renderer.note_scene_processed();
    }
}

fn cmd_handle_nop(_exec: &mut Executor, renderer: &Renderer, cmd: &mut Command, _list: &CommandList) {
    let code = cmd.pop::<i32>();
    renderer.complete(cmd, code);
}

fn cmd_handle_signal_sync_object(
    _exec: &mut Executor,
    _renderer: &Renderer,
    cmd: &mut Command,
    _list: &CommandList,
) {
    match cmd.take_sync_object() {
        Some(sync) => sync.subject_done(SyncSubject::FRAGMENT),
        None => warn!("signal command without a sync object"),
    }
}

fn cmd_handle_create_context(
    exec: &mut Executor,
    renderer: &Renderer,
    cmd: &mut Command,
    _list: &CommandList,
) {
    let id = cmd.pop::<ContextId>();
    match exec.backend.create_context(id) {
        Ok(()) => renderer.complete(cmd, STATUS_NONE),
        Err(err) => {
            error!(%err, context = id.0, "backend context creation failed");
            renderer.complete(cmd, STATUS_ERROR);
        }
    }
}

fn cmd_handle_create_render_target(
    exec: &mut Executor,
    renderer: &Renderer,
    cmd: &mut Command,
    _list: &CommandList,
) {
    let params = cmd.pop::<RenderTargetParams>();
    match exec.backend.create_render_target(&params) {
        Ok(id) => renderer.complete(cmd, id.0 as i32),
        Err(err) => {
            error!(%err, "render target creation failed");
            renderer.complete(cmd, STATUS_ERROR);
        }
    }
}

fn cmd_handle_destroy_context(
    exec: &mut Executor,
    renderer: &Renderer,
    cmd: &mut Command,
    _list: &CommandList,
) {
    let id = cmd.pop::<ContextId>();
    exec.backend.destroy_context(id);
    renderer.complete(cmd, STATUS_NONE);
}

fn cmd_handle_destroy_render_target(
    exec: &mut Executor,
    renderer: &Renderer,
    cmd: &mut Command,
    _list: &CommandList,
) {
    let id = cmd.pop::<RenderTargetId>();
    exec.backend.destroy_render_target(id);
    renderer.complete(cmd, STATUS_NONE);
}

fn cmd_handle_set_context(
    exec: &mut Executor,
    _renderer: &Renderer,
    cmd: &mut Command,
    _list: &CommandList,
) {
    let bound = cmd.pop::<bool>();
    let id = cmd.pop::<RenderTargetId>();
    exec.backend.set_context(bound.then_some(id));
}

fn cmd_handle_sync_surface_data(
    exec: &mut Executor,
    _renderer: &Renderer,
    _cmd: &mut Command,
    _list: &CommandList,
) {
    exec.backend.sync_surface_data();
}

fn cmd_handle_draw(exec: &mut Executor, _renderer: &Renderer, cmd: &mut Command, list: &CommandList) {
    let primitive = cmd.pop::<PrimitiveType>();
    let index_format = cmd.pop::<IndexFormat>();
    let count = cmd.pop::<u32>();
    let index_data = cmd.pop_blob();

    if list
        .snapshot
        .as_ref()
        .map_or(true, |snapshot| snapshot.render_target.is_none())
    {
        debug!("draw issued without a bound render target");
    }

    exec.backend.draw(primitive, index_format, &index_data, count);
}

fn cmd_handle_set_state(
    exec: &mut Executor,
    renderer: &Renderer,
    cmd: &mut Command,
    _list: &CommandList,
) {
    let state = cmd.pop::<GxmState>();
    match state {
        GxmState::DepthBias => {
            let front = cmd.pop::<bool>();
            let factor = cmd.pop::<i32>();
            let units = cmd.pop::<i32>();
            exec.backend.set_depth_bias(front, factor, units);
        }
        GxmState::DepthFunc => {
            let front = cmd.pop::<bool>();
            let func = cmd.pop::<DepthFunc>();
            exec.backend.set_depth_func(front, func);
        }
        GxmState::DepthWriteEnable => {
            let front = cmd.pop::<bool>();
            let mode = cmd.pop::<DepthWriteMode>();
            exec.backend.set_depth_write_enable(front, mode);
        }
        GxmState::PointLineWidth => {
            let front = cmd.pop::<bool>();
            let width = cmd.pop::<u32>();
            exec.backend.set_point_line_width(front, width);
        }
        GxmState::PolygonMode => {
            let front = cmd.pop::<bool>();
            let mode = cmd.pop::<PolygonMode>();
            exec.backend.set_polygon_mode(front, mode);
        }
        GxmState::StencilFunc => {
            let front = cmd.pop::<bool>();
            let func = cmd.pop::<StencilFunc>();
            let stencil_fail = cmd.pop::<StencilOp>();
            let depth_fail = cmd.pop::<StencilOp>();
            let depth_pass = cmd.pop::<StencilOp>();
            let compare_mask = cmd.pop::<u8>();
            let write_mask = cmd.pop::<u8>();
            exec.backend.set_stencil_func(
                front,
                func,
                stencil_fail,
                depth_fail,
                depth_pass,
                compare_mask,
                write_mask,
            );
        }
        GxmState::StencilRef => {
            let front = cmd.pop::<bool>();
            let sref = cmd.pop::<u8>();
            exec.backend.set_stencil_ref(front, sref);
        }
        GxmState::Program => {
            let is_fragment = cmd.pop::<bool>();
            let program = cmd.pop_blob();
            set_program(exec, renderer, &program, is_fragment);
        }
        GxmState::CullMode => {
            let cull = cmd.pop::<CullMode>();
            exec.backend.set_cull_mode(cull);
        }
        GxmState::FragmentTexture => {
            let index = cmd.pop::<u32>();
            let texture = cmd.pop::<TextureWord>();
            exec.backend.set_fragment_texture(index, texture);
        }
        GxmState::Viewport => {
            let mode = cmd.pop::<ViewportMode>();
            let has_values = cmd.pop::<bool>();
            exec.backend.set_viewport_enable(mode);
            if has_values {
                let viewport = cmd.pop::<Viewport>();
                exec.backend.set_viewport(viewport);
            }
        }
        GxmState::RegionClip => {
            let mode = cmd.pop::<RegionClipMode>();
            let x_min = cmd.pop::<u32>();
            let x_max = cmd.pop::<u32>();
            let y_min = cmd.pop::<u32>();
            let y_max = cmd.pop::<u32>();
            exec.backend.set_region_clip(mode, x_min, x_max, y_min, y_max);
        }
        GxmState::TwoSided => {
            let mode = cmd.pop::<TwoSidedMode>();
            exec.backend.set_two_sided_enable(mode);
        }
        GxmState::Uniform => {
            let is_vertex = cmd.pop::<bool>();
            let param = cmd.pop::<UniformParam>();
            let data = cmd.pop_blob();
            exec.backend.set_uniform(is_vertex, param, &data);
        }
        GxmState::UniformBuffer => {
            let is_vertex = cmd.pop::<bool>();
            let block = cmd.pop::<u32>();
            let data = cmd.pop_blob();
            exec.backend.set_uniform_buffer(is_vertex, block, &data);
        }
        GxmState::VertexStream => {
            let index = cmd.pop::<u32>();
            let data = cmd.pop_blob();
            exec.backend.set_vertex_stream(index, &data);
        }
    }
}

/// Resolves a guest program to a backend handle, translating and creating
/// it on first sight, then binds it.
fn set_program(exec: &mut Executor, renderer: &Renderer, program: &[u8], is_fragment: bool) {
    let stage = if is_fragment {
        ShaderStage::Fragment
    } else {
        ShaderStage::Vertex
    };
    let digest = blake3::hash(program);

    let cached = exec.programs.get(&(digest, stage)).copied();
    let id = match cached {
        Some(id) => id,
        None => {
            let source = exec
                .shader_cache
                .get_or_translate(program, stage, renderer.features())
                .to_owned();
            let created = if is_fragment {
                exec.backend.create_fragment_program(program, &source)
            } else {
                exec.backend.create_vertex_program(program, &source)
            };
            match created {
                Ok(id) => {
                    exec.programs.insert((digest, stage), id);
                    id
                }
                Err(err) => {
                    // Skip the bind; rendering continues without this
                    // program's output.
                    error!(%err, ?stage, "backend program creation failed");
                    return;
                }
            }
        }
    };

    exec.backend.set_program(id, is_fragment);
}
