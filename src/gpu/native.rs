use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use log::{debug, warn};
use wgpu::util::DeviceExt;
use winit::window::{Window, WindowId};

use crate::error::{GpuError, InitError};
use crate::gpu::reflect::{self, Declaration, ShaderInterface, ShaderLanguage};
use crate::gpu::{
    AttribLayout, DrawSurface, GraphicsBackend, ShaderStage, Topology, ViewportRect,
};

/// Every uniform gets its own buffer, padded to a `vec4<f32>`.
const UNIFORM_SLOT_SIZE: u64 = 16;

/// Window surface. Resizes are recorded here and applied by the backend on
/// the next present.
pub struct WgpuSurface {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    requested: (u32, u32),
    dirty: bool,
}

impl WgpuSurface {
    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn window_id(&self) -> WindowId {
        self.window.id()
    }

    pub fn scale_factor(&self) -> f64 {
        self.window.scale_factor()
    }

    fn reconfigure(&mut self, device: &wgpu::Device) {
        let (width, height) = self.requested;
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(device, &self.config);
        self.dirty = false;
    }
}

impl DrawSurface for WgpuSurface {
    fn client_size(&self) -> (f64, f64) {
        let logical = self
            .window
            .inner_size()
            .to_logical::<f64>(self.window.scale_factor());
        (logical.width, logical.height)
    }

    fn backing_size(&self) -> (u32, u32) {
        self.requested
    }

    fn set_backing_size(&mut self, width: u32, height: u32) {
        self.requested = (width, height);
        self.dirty = true;
    }
}

pub struct WgpuShader {
    module: Rc<wgpu::ShaderModule>,
    interface: ShaderInterface,
}

struct ProgramObjects {
    id: u32,
    vertex: Rc<wgpu::ShaderModule>,
    vertex_entry: String,
    fragment: Rc<wgpu::ShaderModule>,
    fragment_entry: String,
    layout: wgpu::PipelineLayout,
    bind_group: wgpu::BindGroup,
    uniforms: Vec<(Declaration, Rc<wgpu::Buffer>)>,
    attributes: Vec<Declaration>,
}

#[derive(Clone)]
pub struct WgpuProgram {
    objects: Rc<ProgramObjects>,
}

pub struct WgpuBuffer {
    buffer: Rc<wgpu::Buffer>,
}

#[derive(Debug, Clone)]
pub struct WgpuUniformLocation {
    buffer: Rc<wgpu::Buffer>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: u32,
    topology: Topology,
    location: u32,
    layout: AttribLayout,
}

struct PendingDraw {
    pipeline: Rc<wgpu::RenderPipeline>,
    program: Rc<ProgramObjects>,
    buffer: Rc<wgpu::Buffer>,
    first: u32,
    count: u32,
}

/// Bound state, persistent across frames like a GL context's. Only the
/// clear color and queued draws are consumed by `present`.
#[derive(Default)]
struct FrameState {
    clear: Option<wgpu::Color>,
    viewport: Option<ViewportRect>,
    program: Option<Rc<ProgramObjects>>,
    vertex_buffer: Option<Rc<wgpu::Buffer>>,
    attribute: Option<(u32, AttribLayout)>,
    enabled: Vec<u32>,
    draws: Vec<PendingDraw>,
}

/// `wgpu` device behind the WebGL-shaped backend API. Shaders are WGSL;
/// uniforms are bound at `@group(0)`.
pub struct WgpuBackend {
    surface: WgpuSurface,
    device: wgpu::Device,
    queue: wgpu::Queue,
    format: wgpu::TextureFormat,
    pipelines: HashMap<PipelineKey, Rc<wgpu::RenderPipeline>>,
    frame: FrameState,
    next_id: u32,
}

impl WgpuBackend {
    /// Acquires an adapter and device for `window` and configures its
    /// surface.
    pub async fn new(window: Arc<Window>) -> Result<Self, InitError> {
        let size = window.inner_size();
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let surface = instance
            .create_surface(Arc::clone(&window))
            .map_err(|err| InitError::ContextUnavailable(err.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|err| InitError::ContextUnavailable(format!("no GPU adapter: {err}")))?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("harness-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                ..Default::default()
            })
            .await
            .map_err(|err| InitError::ContextUnavailable(format!("no GPU device: {err}")))?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .find(|format| format.is_srgb())
            .or_else(|| caps.formats.first())
            .copied()
            .ok_or_else(|| {
                InitError::ContextUnavailable("surface reports no texture formats".to_string())
            })?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            desired_maximum_frame_latency: 2,
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
        };
        surface.configure(&device, &config);
        debug!("configured {format:?} surface at {}x{}", config.width, config.height);

        Ok(Self {
            surface: WgpuSurface {
                window,
                surface,
                config,
                requested: (size.width, size.height),
                dirty: false,
            },
            device,
            queue,
            format,
            pipelines: HashMap::new(),
            frame: FrameState::default(),
            next_id: 0,
        })
    }

    pub fn window(&self) -> &Window {
        self.surface.window()
    }

    fn allocate(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn pipeline(&mut self, key: PipelineKey, program: &ProgramObjects) -> Option<Rc<wgpu::RenderPipeline>> {
        if let Some(pipeline) = self.pipelines.get(&key) {
            return Some(Rc::clone(pipeline));
        }

        let Some(format) = vertex_format(key.layout.components) else {
            warn!("unsupported attribute size {}", key.layout.components);
            return None;
        };
        let attributes = [wgpu::VertexAttribute {
            format,
            offset: u64::from(key.layout.offset),
            shader_location: key.location,
        }];
        let topology = match key.topology {
            Topology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
            Topology::Triangles => wgpu::PrimitiveTopology::TriangleList,
        };

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("harness-pipeline"),
                layout: Some(&program.layout),
                vertex: wgpu::VertexState {
                    module: &program.vertex,
                    entry_point: Some(program.vertex_entry.as_str()),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: u64::from(key.layout.effective_stride()),
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &attributes,
                    }],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &program.fragment,
                    entry_point: Some(program.fragment_entry.as_str()),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    unclipped_depth: false,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            });
        debug!("created pipeline for program {} ({:?})", key.program, key.topology);

        let pipeline = Rc::new(pipeline);
        self.pipelines.insert(key, Rc::clone(&pipeline));
        Some(pipeline)
    }

    fn write_uniform(&self, location: &WgpuUniformLocation, values: &[f32]) {
        let mut padded = [0.0f32; 4];
        padded[..values.len()].copy_from_slice(values);
        self.queue
            .write_buffer(&location.buffer, 0, bytemuck::bytes_of(&padded));
    }
}

fn vertex_format(components: u8) -> Option<wgpu::VertexFormat> {
    match components {
        1 => Some(wgpu::VertexFormat::Float32),
        2 => Some(wgpu::VertexFormat::Float32x2),
        3 => Some(wgpu::VertexFormat::Float32x3),
        4 => Some(wgpu::VertexFormat::Float32x4),
        _ => None,
    }
}

fn is_float_uniform(ty: &str) -> bool {
    matches!(
        ty.replace(' ', "").as_str(),
        "f32" | "vec2<f32>" | "vec3<f32>" | "vec4<f32>" | "vec2f" | "vec3f" | "vec4f"
    )
}

impl GraphicsBackend for WgpuBackend {
    type Shader = WgpuShader;
    type Program = WgpuProgram;
    type Buffer = WgpuBuffer;
    type UniformLocation = WgpuUniformLocation;
    type Surface = WgpuSurface;

    fn surface(&self) -> &WgpuSurface {
        &self.surface
    }

    fn surface_mut(&mut self) -> &mut WgpuSurface {
        &mut self.surface
    }

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<WgpuShader, String> {
        let interface = reflect::inspect(stage, source)?;
        if interface.language != ShaderLanguage::Wgsl {
            return Err(format!("{stage} shader is not WGSL"));
        }

        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(match stage {
                    ShaderStage::Vertex => "harness-vertex",
                    ShaderStage::Fragment => "harness-fragment",
                }),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
        Ok(WgpuShader {
            module: Rc::new(module),
            interface,
        })
    }

    fn delete_shader(&mut self, shader: WgpuShader) {
        drop(shader);
    }

    fn link_program(&mut self, vertex: &WgpuShader, fragment: &WgpuShader) -> Result<WgpuProgram, String> {
        reflect::check_link(&vertex.interface, &fragment.interface)?;
        let uniforms = reflect::merged_uniforms(&vertex.interface, &fragment.interface);
        if let Some(uniform) = uniforms.iter().find(|u| !is_float_uniform(&u.ty)) {
            return Err(format!(
                "uniform `{}` has unsupported type `{}`",
                uniform.name, uniform.ty
            ));
        }

        let id = self.allocate();
        let layout_entries: Vec<_> = uniforms
            .iter()
            .map(|uniform| wgpu::BindGroupLayoutEntry {
                binding: uniform.slot.unwrap_or_default(),
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            })
            .collect();
        let bind_layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("harness-uniform-layout"),
                entries: &layout_entries,
            });

        let buffers: Vec<_> = uniforms
            .into_iter()
            .map(|uniform| {
                let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(uniform.name.as_str()),
                    size: UNIFORM_SLOT_SIZE,
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });
                (uniform, Rc::new(buffer))
            })
            .collect();
        let bind_entries: Vec<_> = buffers
            .iter()
            .map(|(uniform, buffer)| wgpu::BindGroupEntry {
                binding: uniform.slot.unwrap_or_default(),
                resource: buffer.as_entire_binding(),
            })
            .collect();
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("harness-uniforms"),
            layout: &bind_layout,
            entries: &bind_entries,
        });

        let layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("harness-pipeline-layout"),
                bind_group_layouts: &[&bind_layout],
                immediate_size: 0,
            });

        Ok(WgpuProgram {
            objects: Rc::new(ProgramObjects {
                id,
                vertex: Rc::clone(&vertex.module),
                vertex_entry: vertex.interface.entry_point.clone(),
                fragment: Rc::clone(&fragment.module),
                fragment_entry: fragment.interface.entry_point.clone(),
                layout,
                bind_group,
                uniforms: buffers,
                attributes: vertex.interface.attributes.clone(),
            }),
        })
    }

    fn delete_program(&mut self, program: WgpuProgram) {
        let id = program.objects.id;
        self.pipelines.retain(|key, _| key.program != id);
    }

    fn attrib_location(&self, program: &WgpuProgram, name: &str) -> Option<u32> {
        program
            .objects
            .attributes
            .iter()
            .find(|attribute| attribute.name == name)
            .and_then(|attribute| attribute.slot)
    }

    fn uniform_location(&self, program: &WgpuProgram, name: &str) -> Option<WgpuUniformLocation> {
        program
            .objects
            .uniforms
            .iter()
            .find(|(uniform, _)| uniform.name == name)
            .map(|(_, buffer)| WgpuUniformLocation {
                buffer: Rc::clone(buffer),
            })
    }

    fn create_static_buffer(&mut self, data: &[f32]) -> Result<WgpuBuffer, GpuError> {
        if data.is_empty() {
            return Err(GpuError::Buffer("zero-length vertex data".to_string()));
        }
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("harness-vertices"),
                contents: bytemuck::cast_slice(data),
                usage: wgpu::BufferUsages::VERTEX,
            });
        Ok(WgpuBuffer {
            buffer: Rc::new(buffer),
        })
    }

    fn delete_buffer(&mut self, buffer: WgpuBuffer) {
        buffer.buffer.destroy();
    }

    fn set_viewport(&mut self, rect: ViewportRect) {
        self.frame.viewport = Some(rect);
    }

    fn clear(&mut self, color: [f32; 4]) {
        self.frame.clear = Some(wgpu::Color {
            r: f64::from(color[0]),
            g: f64::from(color[1]),
            b: f64::from(color[2]),
            a: f64::from(color[3]),
        });
        self.frame.draws.clear();
    }

    fn use_program(&mut self, program: &WgpuProgram) {
        self.frame.program = Some(Rc::clone(&program.objects));
    }

    fn bind_vertex_buffer(&mut self, buffer: &WgpuBuffer) {
        self.frame.vertex_buffer = Some(Rc::clone(&buffer.buffer));
    }

    fn vertex_attrib_pointer(&mut self, location: u32, layout: AttribLayout) {
        self.frame.attribute = Some((location, layout));
    }

    fn enable_vertex_attrib(&mut self, location: u32) {
        if !self.frame.enabled.contains(&location) {
            self.frame.enabled.push(location);
        }
    }

    fn uniform2f(&mut self, location: &WgpuUniformLocation, value: [f32; 2]) {
        self.write_uniform(location, &value);
    }

    fn uniform3f(&mut self, location: &WgpuUniformLocation, value: [f32; 3]) {
        self.write_uniform(location, &value);
    }

    fn draw_arrays(&mut self, topology: Topology, first: u32, count: u32) {
        let (Some(program), Some(buffer), Some((location, layout))) = (
            self.frame.program.clone(),
            self.frame.vertex_buffer.clone(),
            self.frame.attribute,
        ) else {
            warn!("draw skipped: program, vertex buffer or attribute not set");
            return;
        };
        if !self.frame.enabled.contains(&location) {
            warn!("draw skipped: attribute {location} is not enabled");
            return;
        }

        let key = PipelineKey {
            program: program.id,
            topology,
            location,
            layout,
        };
        if let Some(pipeline) = self.pipeline(key, &program) {
            self.frame.draws.push(PendingDraw {
                pipeline,
                program,
                buffer,
                first,
                count,
            });
        }
    }

    fn present(&mut self) -> Result<(), GpuError> {
        let clear = self.frame.clear.take().unwrap_or(wgpu::Color::BLACK);
        let draws = std::mem::take(&mut self.frame.draws);
        if self.surface.dirty {
            self.surface.reconfigure(&self.device);
        }

        let output = match self.surface.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.reconfigure(&self.device);
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                debug!("surface timeout; frame dropped");
                return Ok(());
            }
            Err(err) => return Err(GpuError::Present(err.to_string())),
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("harness-encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("harness-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            if let Some(rect) = self.frame.viewport {
                let target = output.texture.size();
                let x = rect.x.max(0) as u32;
                let y = rect.y.max(0) as u32;
                let width = rect.width.min(target.width.saturating_sub(x));
                let height = rect.height.min(target.height.saturating_sub(y));
                if width > 0 && height > 0 {
                    pass.set_viewport(x as f32, y as f32, width as f32, height as f32, 0.0, 1.0);
                }
            }

            for draw in &draws {
                pass.set_pipeline(&draw.pipeline);
                pass.set_bind_group(0, &draw.program.bind_group, &[]);
                pass.set_vertex_buffer(0, draw.buffer.slice(..));
                pass.draw(draw.first..draw.first + draw.count, 0..1);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}
