//! Shader-program lifecycle, quad geometry, viewport sizing and the
//! synchronous redraw that ties them together.

pub mod geometry;
pub mod program;
pub mod viewport;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::HarnessConfig;
use crate::controls::{ControlEvent, ControlSpec, UniformControlRegistry};
use crate::error::{GpuError, InitError, UpdateError};
use crate::gpu::{DrawSurface, GraphicsBackend, Topology};
use crate::shaders::ShaderSources;

pub use geometry::{GeometryBuffer, QUAD_VERTICES};
pub use program::{Location, ShaderProgram, POSITION_ATTRIBUTE, RESOLUTION_UNIFORM};
pub use viewport::{display_size, Viewport};

/// Fixed per-frame state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    pub clear_color: [f32; 4],
    pub topology: Topology,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            topology: Topology::TriangleStrip,
        }
    }
}

/// Owns the backend and every GPU object drawn through it.
pub struct Renderer<B: GraphicsBackend> {
    backend: B,
    options: RenderOptions,
    geometry: GeometryBuffer<B>,
    program: Option<ShaderProgram<B>>,
    controls: UniformControlRegistry<B::UniformLocation>,
    viewport: Viewport,
    device_pixel_ratio: f64,
}

impl<B: GraphicsBackend> Renderer<B> {
    /// Uploads the quad. No program is loaded yet, so frames draw nothing
    /// until [`load_program`](Self::load_program) succeeds.
    pub fn new(mut backend: B, options: RenderOptions) -> Result<Self, InitError> {
        let geometry = GeometryBuffer::quad(&mut backend)?;
        Ok(Self {
            backend,
            options,
            geometry,
            program: None,
            controls: UniformControlRegistry::empty(),
            viewport: Viewport::default(),
            device_pixel_ratio: 1.0,
        })
    }

    /// Builds the program, then the quad, then the controls; sizes the
    /// surface and draws the first frame. Any failure aborts initialization
    /// after releasing whatever was already created.
    pub fn init(
        mut backend: B,
        config: &HarnessConfig,
        sources: &ShaderSources,
        device_pixel_ratio: f64,
    ) -> Result<Self, InitError> {
        let (program, geometry, controls) = build_parts(&mut backend, config, sources)?;
        let mut renderer = Self {
            backend,
            options: config.render,
            geometry,
            program: Some(program),
            controls,
            viewport: Viewport::default(),
            device_pixel_ratio,
        };
        let (width, height) = renderer.viewport.resize(&mut renderer.backend, device_pixel_ratio);
        if let Err(err) = renderer.render() {
            drop(renderer.shutdown());
            return Err(err.into());
        }
        info!(
            "renderer ready: {} control(s), {width}x{height}",
            renderer.controls.len()
        );
        Ok(renderer)
    }

    /// Links a program from `sources` and rebuilds the controls against it.
    /// The previous program is kept if anything fails.
    pub fn load_program(
        &mut self,
        sources: &ShaderSources,
        table: &[ControlSpec],
    ) -> Result<(), InitError> {
        let program = ShaderProgram::build(&mut self.backend, sources)?;
        let controls = match UniformControlRegistry::init(&program, &self.backend, table) {
            Ok(controls) => controls,
            Err(err) => {
                program.destroy(&mut self.backend);
                return Err(err.into());
            }
        };

        if let Some(previous) = self.program.replace(program) {
            previous.destroy(&mut self.backend);
        }
        self.controls = controls;
        debug!("program loaded with {} control(s)", self.controls.len());
        Ok(())
    }

    /// Draws one frame with the current control values. Without a linked
    /// program nothing is issued and the previous frame stays visible.
    pub fn render(&mut self) -> Result<(), GpuError> {
        let Some(program) = &self.program else {
            return Ok(());
        };
        self.backend.clear(self.options.clear_color);

        let position = program.position_location();
        self.backend.use_program(program.handle());
        self.backend.bind_vertex_buffer(self.geometry.handle());
        self.backend
            .vertex_attrib_pointer(position, self.geometry.layout());
        self.backend.enable_vertex_attrib(position);

        if let Some(location) = program.resolution().as_present() {
            let (width, height) = self.backend.surface().backing_size();
            self.backend
                .uniform2f(location, [width as f32, height as f32]);
        }
        for control in self.controls.iter() {
            if let Some(location) = control.location.as_present() {
                self.backend.uniform3f(location, control.normalized());
            }
        }

        let topology = self.options.topology;
        self.backend
            .draw_arrays(topology, 0, topology.vertex_count(self.geometry.vertex_count()));
        self.backend.present()
    }

    /// Applies one control update and redraws. An event that names no bound
    /// control still redraws and returns `Ok(false)`; a malformed value is
    /// returned without drawing.
    pub fn apply_event(&mut self, event: &ControlEvent) -> Result<bool, UpdateError> {
        let changed = self.controls.apply(event)?;
        if !changed {
            debug!(
                "ignored update for `{}-{}`",
                event.uniform_name, event.channel
            );
        }
        self.render()?;
        Ok(changed)
    }

    /// Re-sizes the surface for `device_pixel_ratio` and redraws.
    pub fn resize(&mut self, device_pixel_ratio: f64) -> Result<(u32, u32), GpuError> {
        self.device_pixel_ratio = device_pixel_ratio;
        let size = self.viewport.resize(&mut self.backend, device_pixel_ratio);
        self.render()?;
        Ok(size)
    }

    /// Restores every control to its default and redraws.
    pub fn reset_controls(&mut self) -> Result<(), GpuError> {
        self.controls.reset();
        self.render()
    }

    pub fn controls(&self) -> &UniformControlRegistry<B::UniformLocation> {
        &self.controls
    }

    pub fn controls_mut(&mut self) -> &mut UniformControlRegistry<B::UniformLocation> {
        &mut self.controls
    }

    pub fn program(&self) -> Option<&ShaderProgram<B>> {
        self.program.as_ref()
    }

    pub fn is_ready(&self) -> bool {
        self.program.is_some()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn device_pixel_ratio(&self) -> f64 {
        self.device_pixel_ratio
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Releases every GPU object and hands the backend back.
    pub fn shutdown(mut self) -> B {
        if let Some(program) = self.program.take() {
            program.destroy(&mut self.backend);
        }
        self.geometry.destroy(&mut self.backend);
        self.backend
    }
}

type Parts<B> = (
    ShaderProgram<B>,
    GeometryBuffer<B>,
    UniformControlRegistry<<B as GraphicsBackend>::UniformLocation>,
);

/// GPU objects in dependency order. Nothing created here survives an error.
fn build_parts<B: GraphicsBackend>(
    backend: &mut B,
    config: &HarnessConfig,
    sources: &ShaderSources,
) -> Result<Parts<B>, InitError> {
    let program = ShaderProgram::build(backend, sources)?;
    let geometry = match GeometryBuffer::quad(backend) {
        Ok(geometry) => geometry,
        Err(err) => {
            program.destroy(backend);
            return Err(err.into());
        }
    };
    match UniformControlRegistry::init(&program, &*backend, &config.controls) {
        Ok(controls) => Ok((program, geometry, controls)),
        Err(err) => {
            program.destroy(backend);
            geometry.destroy(backend);
            Err(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{GpuCommand, RecordingBackend, ShaderStage};
    use crate::vector::Channel;

    fn ready() -> Renderer<RecordingBackend> {
        Renderer::init(
            RecordingBackend::with_client_size(400.0, 300.0),
            &HarnessConfig::default(),
            &ShaderSources::glsl_lighting(),
            1.0,
        )
        .unwrap()
    }

    #[test]
    fn frame_without_program_issues_nothing() {
        let mut renderer =
            Renderer::new(RecordingBackend::default(), RenderOptions::default()).unwrap();
        renderer.backend_mut().take_commands();
        renderer.render().unwrap();
        assert!(renderer.backend().commands().is_empty());
        assert!(!renderer.is_ready());
    }

    #[test]
    fn init_compiles_before_uploading_geometry() {
        let renderer = ready();
        let commands = renderer.backend().commands();
        assert!(matches!(
            commands[..4],
            [
                GpuCommand::CompileShader {
                    stage: ShaderStage::Vertex,
                    ..
                },
                GpuCommand::CompileShader {
                    stage: ShaderStage::Fragment,
                    ..
                },
                GpuCommand::LinkProgram { .. },
                GpuCommand::CreateBuffer { .. },
            ]
        ));
    }

    #[test]
    fn failed_build_leaves_no_objects() {
        let mut backend = RecordingBackend::default();
        let broken = ShaderSources::new(
            crate::shaders::QUAD_VERT_GLSL,
            "precision mediump float;\nvoid main() {\n  gl_FragColor = vec4(1.0)\n}\n",
        );
        let err = build_parts(&mut backend, &HarnessConfig::solid(), &broken).err();
        assert!(matches!(err, Some(InitError::Shader(_))));
        assert!(!backend
            .commands()
            .iter()
            .any(|c| matches!(c, GpuCommand::CreateBuffer { .. })));
        assert_eq!(backend.live_objects(), 0);

        let mut config = HarnessConfig::default();
        config.controls.push(config.controls[0].clone());
        let err = build_parts(&mut backend, &config, &ShaderSources::glsl_lighting()).err();
        assert!(matches!(err, Some(InitError::Registry(_))));
        assert_eq!(backend.live_objects(), 0);
    }

    #[test]
    fn controls_can_be_edited_in_place() {
        let mut renderer = ready();
        renderer
            .controls_mut()
            .update("uLightAmb", Channel::Z, "0")
            .unwrap();
        renderer.render().unwrap();
        let last_upload = renderer
            .backend()
            .commands()
            .iter()
            .filter_map(|c| match c {
                GpuCommand::Uniform3f { value, .. } => Some(*value),
                _ => None,
            })
            .nth_back(3);
        assert_eq!(last_upload, Some([0.05, 0.05, 0.0]));
    }

    #[test]
    fn frame_uploads_resolution_then_controls() {
        let mut renderer = ready();
        renderer.backend_mut().take_commands();
        renderer.render().unwrap();

        let commands = renderer.backend().commands();
        assert!(matches!(commands[0], GpuCommand::Clear { color } if color == [0.0, 0.0, 0.0, 1.0]));
        assert!(commands.iter().any(|c| matches!(
            c,
            GpuCommand::Uniform2f { value, .. } if *value == [400.0, 300.0]
        )));
        assert!(matches!(
            commands[commands.len() - 2],
            GpuCommand::DrawArrays {
                topology: Topology::TriangleStrip,
                first: 0,
                count: 4
            }
        ));
        assert_eq!(commands.last(), Some(&GpuCommand::Present));
    }

    #[test]
    fn triangle_topology_draws_three_vertices() {
        let config = HarnessConfig {
            render: RenderOptions {
                topology: Topology::Triangles,
                ..RenderOptions::default()
            },
            ..HarnessConfig::default()
        };
        let renderer = Renderer::init(
            RecordingBackend::default(),
            &config,
            &ShaderSources::glsl_lighting(),
            1.0,
        )
        .unwrap();
        assert!(renderer.backend().commands().iter().any(|c| matches!(
            c,
            GpuCommand::DrawArrays { count: 3, .. }
        )));
    }

    #[test]
    fn rejected_update_does_not_redraw() {
        let mut renderer = ready();
        let frames = renderer.backend().stats().frames;
        let err = renderer
            .apply_event(&ControlEvent::new("uLightAmb", Channel::X, "bright"))
            .unwrap_err();
        assert!(matches!(err, UpdateError::Control(_)));
        assert_eq!(renderer.backend().stats().frames, frames);
    }

    #[test]
    fn present_failure_surfaces_from_apply_event() {
        let mut renderer = ready();
        renderer.backend_mut().fail_next_present();
        let err = renderer
            .apply_event(&ControlEvent::new("uLightAmb", Channel::X, "10"))
            .unwrap_err();
        assert!(matches!(err, UpdateError::Gpu(_)));
    }

    #[test]
    fn reload_replaces_program() {
        let mut renderer = ready();
        renderer
            .load_program(&ShaderSources::glsl_solid(), &HarnessConfig::solid().controls)
            .unwrap();
        assert!(renderer.controls().is_empty());
        // quad buffer + new program and its two shaders
        assert_eq!(renderer.backend().live_objects(), 4);
    }

    #[test]
    fn shutdown_releases_all_objects() {
        let backend = ready().shutdown();
        assert_eq!(backend.live_objects(), 0);
    }
}
