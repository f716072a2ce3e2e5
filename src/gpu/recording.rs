//! Headless backend that validates shaders with [`reflect`](super::reflect)
//! and records every call instead of drawing.
//!
//! Used by the test suite and by the CLI's `--headless` mode.

use std::collections::BTreeSet;

use log::trace;

use crate::error::GpuError;
use crate::gpu::reflect::{self, Declaration, ShaderInterface};
use crate::gpu::{
    AttribLayout, DrawSurface, GraphicsBackend, ShaderStage, Topology, ViewportRect,
};

/// HTML canvas default backing size, used until the first resize.
const DEFAULT_BACKING: (u32, u32) = (300, 150);

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCommand {
    CompileShader { id: u32, stage: ShaderStage },
    DeleteShader { id: u32 },
    LinkProgram { id: u32 },
    DeleteProgram { id: u32 },
    CreateBuffer { id: u32, len: usize },
    DeleteBuffer { id: u32 },
    Viewport(ViewportRect),
    Clear { color: [f32; 4] },
    UseProgram { id: u32 },
    BindVertexBuffer { id: u32 },
    VertexAttribPointer { location: u32, layout: AttribLayout },
    EnableVertexAttrib { location: u32 },
    Uniform2f { location: RecordedLocation, value: [f32; 2] },
    Uniform3f { location: RecordedLocation, value: [f32; 3] },
    DrawArrays { topology: Topology, first: u32, count: u32 },
    Present,
}

/// Uniform location: the owning program and the uniform's index within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordedLocation {
    pub program: u32,
    pub index: u32,
}

#[derive(Debug)]
pub struct RecordedShader {
    id: u32,
    interface: ShaderInterface,
}

#[derive(Debug)]
pub struct RecordedProgram {
    id: u32,
    attributes: Vec<Declaration>,
    uniforms: Vec<Declaration>,
}

impl RecordedProgram {
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Uniform names in the order they were declared across both stages.
    pub fn uniform_names(&self) -> impl Iterator<Item = &str> {
        self.uniforms.iter().map(|uniform| uniform.name.as_str())
    }
}

#[derive(Debug)]
pub struct RecordedBuffer {
    id: u32,
}

/// Canvas stand-in with a fixed client size.
#[derive(Debug, Clone)]
pub struct HeadlessSurface {
    client: (f64, f64),
    backing: (u32, u32),
    reallocations: u32,
}

impl HeadlessSurface {
    pub fn new(client_width: f64, client_height: f64) -> Self {
        Self {
            client: (client_width, client_height),
            backing: DEFAULT_BACKING,
            reallocations: 0,
        }
    }

    pub fn set_client_size(&mut self, width: f64, height: f64) {
        self.client = (width, height);
    }

    /// Number of times the backing buffer was reallocated.
    pub fn reallocations(&self) -> u32 {
        self.reallocations
    }
}

impl Default for HeadlessSurface {
    fn default() -> Self {
        Self::new(f64::from(DEFAULT_BACKING.0), f64::from(DEFAULT_BACKING.1))
    }
}

impl DrawSurface for HeadlessSurface {
    fn client_size(&self) -> (f64, f64) {
        self.client
    }

    fn backing_size(&self) -> (u32, u32) {
        self.backing
    }

    fn set_backing_size(&mut self, width: u32, height: u32) {
        self.backing = (width, height);
        self.reallocations += 1;
    }
}

/// Counters derived from the recorded stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordingStats {
    pub frames: usize,
    pub draw_calls: usize,
    pub control_uploads: usize,
}

#[derive(Debug, Default)]
pub struct RecordingBackend {
    surface: HeadlessSurface,
    commands: Vec<GpuCommand>,
    next_id: u32,
    live: BTreeSet<u32>,
    fail_next_present: bool,
}

impl RecordingBackend {
    pub fn new(surface: HeadlessSurface) -> Self {
        Self {
            surface,
            ..Self::default()
        }
    }

    pub fn with_client_size(width: f64, height: f64) -> Self {
        Self::new(HeadlessSurface::new(width, height))
    }

    pub fn commands(&self) -> &[GpuCommand] {
        &self.commands
    }

    /// Drains the recorded stream, keeping object bookkeeping intact.
    pub fn take_commands(&mut self) -> Vec<GpuCommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn draw_calls(&self) -> usize {
        self.commands
            .iter()
            .filter(|command| matches!(command, GpuCommand::DrawArrays { .. }))
            .count()
    }

    /// Shaders, programs and buffers created and not yet deleted.
    pub fn live_objects(&self) -> usize {
        self.live.len()
    }

    pub fn stats(&self) -> RecordingStats {
        let mut stats = RecordingStats::default();
        for command in &self.commands {
            match command {
                GpuCommand::Present => stats.frames += 1,
                GpuCommand::DrawArrays { .. } => stats.draw_calls += 1,
                GpuCommand::Uniform3f { .. } => stats.control_uploads += 1,
                _ => {}
            }
        }
        stats
    }

    /// Makes the next `present` fail, to exercise frame-error paths.
    pub fn fail_next_present(&mut self) {
        self.fail_next_present = true;
    }

    fn allocate(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn record(&mut self, command: GpuCommand) {
        trace!("gpu: {command:?}");
        self.commands.push(command);
    }

    fn release(&mut self, id: u32) {
        self.live.remove(&id);
    }
}

impl GraphicsBackend for RecordingBackend {
    type Shader = RecordedShader;
    type Program = RecordedProgram;
    type Buffer = RecordedBuffer;
    type UniformLocation = RecordedLocation;
    type Surface = HeadlessSurface;

    fn surface(&self) -> &HeadlessSurface {
        &self.surface
    }

    fn surface_mut(&mut self) -> &mut HeadlessSurface {
        &mut self.surface
    }

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<RecordedShader, String> {
        let id = self.allocate();
        self.record(GpuCommand::CompileShader { id, stage });
        match reflect::inspect(stage, source) {
            Ok(interface) => {
                self.live.insert(id);
                Ok(RecordedShader { id, interface })
            }
            Err(log) => {
                self.record(GpuCommand::DeleteShader { id });
                Err(log)
            }
        }
    }

    fn delete_shader(&mut self, shader: RecordedShader) {
        self.release(shader.id);
        self.record(GpuCommand::DeleteShader { id: shader.id });
    }

    fn link_program(
        &mut self,
        vertex: &RecordedShader,
        fragment: &RecordedShader,
    ) -> Result<RecordedProgram, String> {
        let id = self.allocate();
        self.record(GpuCommand::LinkProgram { id });
        if let Err(log) = reflect::check_link(&vertex.interface, &fragment.interface) {
            self.record(GpuCommand::DeleteProgram { id });
            return Err(log);
        }

        self.live.insert(id);
        Ok(RecordedProgram {
            id,
            attributes: vertex.interface.attributes.clone(),
            uniforms: reflect::merged_uniforms(&vertex.interface, &fragment.interface),
        })
    }

    fn delete_program(&mut self, program: RecordedProgram) {
        self.release(program.id);
        self.record(GpuCommand::DeleteProgram { id: program.id });
    }

    fn attrib_location(&self, program: &RecordedProgram, name: &str) -> Option<u32> {
        program
            .attributes
            .iter()
            .enumerate()
            .find(|(_, attribute)| attribute.name == name)
            .map(|(index, attribute)| attribute.slot.unwrap_or(index as u32))
    }

    fn uniform_location(&self, program: &RecordedProgram, name: &str) -> Option<RecordedLocation> {
        program
            .uniforms
            .iter()
            .position(|uniform| uniform.name == name)
            .map(|index| RecordedLocation {
                program: program.id,
                index: index as u32,
            })
    }

    fn create_static_buffer(&mut self, data: &[f32]) -> Result<RecordedBuffer, GpuError> {
        if data.is_empty() {
            return Err(GpuError::Buffer("zero-length vertex data".to_string()));
        }
        let id = self.allocate();
        self.live.insert(id);
        self.record(GpuCommand::CreateBuffer { id, len: data.len() });
        Ok(RecordedBuffer { id })
    }

    fn delete_buffer(&mut self, buffer: RecordedBuffer) {
        self.release(buffer.id);
        self.record(GpuCommand::DeleteBuffer { id: buffer.id });
    }

    fn set_viewport(&mut self, rect: ViewportRect) {
        self.record(GpuCommand::Viewport(rect));
    }

    fn clear(&mut self, color: [f32; 4]) {
        self.record(GpuCommand::Clear { color });
    }

    fn use_program(&mut self, program: &RecordedProgram) {
        self.record(GpuCommand::UseProgram { id: program.id });
    }

    fn bind_vertex_buffer(&mut self, buffer: &RecordedBuffer) {
        self.record(GpuCommand::BindVertexBuffer { id: buffer.id });
    }

    fn vertex_attrib_pointer(&mut self, location: u32, layout: AttribLayout) {
        self.record(GpuCommand::VertexAttribPointer { location, layout });
    }

    fn enable_vertex_attrib(&mut self, location: u32) {
        self.record(GpuCommand::EnableVertexAttrib { location });
    }

    fn uniform2f(&mut self, location: &RecordedLocation, value: [f32; 2]) {
        self.record(GpuCommand::Uniform2f {
            location: *location,
            value,
        });
    }

    fn uniform3f(&mut self, location: &RecordedLocation, value: [f32; 3]) {
        self.record(GpuCommand::Uniform3f {
            location: *location,
            value,
        });
    }

    fn draw_arrays(&mut self, topology: Topology, first: u32, count: u32) {
        self.record(GpuCommand::DrawArrays {
            topology,
            first,
            count,
        });
    }

    fn present(&mut self) -> Result<(), GpuError> {
        if std::mem::take(&mut self.fail_next_present) {
            return Err(GpuError::Present("surface lost".to_string()));
        }
        self.record(GpuCommand::Present);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shaders::ShaderSources;

    #[test]
    fn failed_compile_is_released() {
        let mut backend = RecordingBackend::default();
        let err = backend
            .compile_shader(ShaderStage::Fragment, "void main() {")
            .unwrap_err();
        assert!(err.contains("never closed"));
        assert_eq!(backend.live_objects(), 0);
        assert!(matches!(
            backend.commands(),
            [GpuCommand::CompileShader { id: 1, .. }, GpuCommand::DeleteShader { id: 1 }]
        ));
    }

    #[test]
    fn links_and_resolves_locations() {
        let sources = ShaderSources::glsl_lighting();
        let mut backend = RecordingBackend::default();
        let vertex = backend
            .compile_shader(ShaderStage::Vertex, &sources.vertex)
            .unwrap();
        let fragment = backend
            .compile_shader(ShaderStage::Fragment, &sources.fragment)
            .unwrap();
        let program = backend.link_program(&vertex, &fragment).unwrap();
        assert_eq!(program.id(), 3);
        assert_eq!(
            program.uniform_names().collect::<Vec<_>>(),
            ["uResolution", "uLightAmb", "uLightDiff", "uSphereAmb", "uSphereDiff"]
        );

        assert_eq!(backend.attrib_location(&program, "aPosition"), Some(0));
        assert_eq!(
            backend.uniform_location(&program, "uLightDiff"),
            Some(RecordedLocation {
                program: 3,
                index: 2,
            })
        );
        assert!(backend.uniform_location(&program, "uMissing").is_none());
        assert_eq!(backend.live_objects(), 3);
    }

    #[test]
    fn body_syntax_error_fails_compile() {
        let mut backend = RecordingBackend::default();
        let err = backend
            .compile_shader(
                ShaderStage::Fragment,
                "precision mediump float;\nvoid main() {\n  gl_FragColor = vec4(1.0) + ;\n}\n",
            )
            .unwrap_err();
        assert!(err.starts_with("syntax error"), "{err}");
        assert_eq!(backend.live_objects(), 0);
    }

    #[test]
    fn swapped_stages_fail_to_link() {
        let sources = ShaderSources::glsl_solid();
        let mut backend = RecordingBackend::default();
        let vertex = backend
            .compile_shader(ShaderStage::Vertex, &sources.vertex)
            .unwrap();
        let fragment = backend
            .compile_shader(ShaderStage::Fragment, &sources.fragment)
            .unwrap();
        assert!(backend.link_program(&fragment, &vertex).is_err());
        assert_eq!(backend.live_objects(), 2);
        assert_eq!(
            backend.commands().last(),
            Some(&GpuCommand::DeleteProgram { id: 3 })
        );
    }

    #[test]
    fn stats_count_frames_and_uploads() {
        let mut backend = RecordingBackend::default();
        let location = RecordedLocation {
            program: 1,
            index: 0,
        };
        backend.uniform3f(&location, [1.0, 0.5, 0.0]);
        backend.draw_arrays(Topology::TriangleStrip, 0, 4);
        backend.present().unwrap();

        backend.fail_next_present();
        assert!(backend.present().is_err());
        assert_eq!(
            backend.stats(),
            RecordingStats {
                frames: 1,
                draw_calls: 1,
                control_uploads: 1,
            }
        );
    }

    #[test]
    fn surface_counts_reallocations() {
        let mut surface = HeadlessSurface::new(800.0, 600.0);
        assert_eq!(surface.backing_size(), (300, 150));
        surface.set_backing_size(1600, 1200);
        assert_eq!(surface.backing_size(), (1600, 1200));
        assert_eq!(surface.reallocations(), 1);
    }
}
