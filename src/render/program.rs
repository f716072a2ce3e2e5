use log::debug;

use crate::error::ShaderError;
use crate::gpu::{GraphicsBackend, ShaderStage};
use crate::shaders::ShaderSources;

/// Vertex attribute carrying the quad corners.
pub const POSITION_ATTRIBUTE: &str = "aPosition";
/// Optional `vec2` uniform receiving the backing size in pixels.
pub const RESOLUTION_UNIFORM: &str = "uResolution";

/// Uniform location that may be missing from the linked program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location<L> {
    Present(L),
    Absent,
}

impl<L> Location<L> {
    pub fn is_present(&self) -> bool {
        matches!(self, Location::Present(_))
    }

    pub fn as_present(&self) -> Option<&L> {
        match self {
            Location::Present(location) => Some(location),
            Location::Absent => None,
        }
    }
}

impl<L> From<Option<L>> for Location<L> {
    fn from(value: Option<L>) -> Self {
        value.map_or(Location::Absent, Location::Present)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeBinding {
    pub name: String,
    pub location: u32,
}

/// A linked vertex + fragment program and the locations resolved from it.
pub struct ShaderProgram<B: GraphicsBackend> {
    program: B::Program,
    vertex: B::Shader,
    fragment: B::Shader,
    attributes: Vec<AttributeBinding>,
    position: u32,
    resolution: Location<B::UniformLocation>,
}

impl<B: GraphicsBackend> ShaderProgram<B> {
    /// Compiles both stages and links them. Every object created along the
    /// way is deleted before an error is returned.
    ///
    /// The linked program must expose `aPosition`. WebGL also reports -1
    /// for an attribute that is declared but optimized out of the program,
    /// so a vertex shader that ignores `aPosition` fails here with
    /// `MissingAttribute` rather than drawing from an unbound attribute.
    pub fn build(backend: &mut B, sources: &ShaderSources) -> Result<Self, ShaderError> {
        let vertex = compile(backend, ShaderStage::Vertex, &sources.vertex)?;
        let fragment = match compile(backend, ShaderStage::Fragment, &sources.fragment) {
            Ok(fragment) => fragment,
            Err(err) => {
                backend.delete_shader(vertex);
                return Err(err);
            }
        };

        let program = match backend.link_program(&vertex, &fragment) {
            Ok(program) => program,
            Err(log) => {
                debug!("link failed: {log}");
                backend.delete_shader(vertex);
                backend.delete_shader(fragment);
                return Err(ShaderError::Link { log });
            }
        };

        let Some(position) = backend.attrib_location(&program, POSITION_ATTRIBUTE) else {
            backend.delete_program(program);
            backend.delete_shader(vertex);
            backend.delete_shader(fragment);
            return Err(ShaderError::MissingAttribute {
                name: POSITION_ATTRIBUTE.to_string(),
            });
        };
        let resolution: Location<B::UniformLocation> =
            backend.uniform_location(&program, RESOLUTION_UNIFORM).into();
        debug!("linked program: {POSITION_ATTRIBUTE} at {position}, {RESOLUTION_UNIFORM} {resolution:?}");

        Ok(Self {
            program,
            vertex,
            fragment,
            attributes: vec![AttributeBinding {
                name: POSITION_ATTRIBUTE.to_string(),
                location: position,
            }],
            position,
            resolution,
        })
    }

    pub fn attrib_location(&self, name: &str) -> Option<u32> {
        self.attributes
            .iter()
            .find(|binding| binding.name == name)
            .map(|binding| binding.location)
    }

    pub fn position_location(&self) -> u32 {
        self.position
    }

    pub fn attributes(&self) -> &[AttributeBinding] {
        &self.attributes
    }

    pub fn uniform_location(&self, backend: &B, name: &str) -> Location<B::UniformLocation> {
        backend.uniform_location(&self.program, name).into()
    }

    pub fn resolution(&self) -> &Location<B::UniformLocation> {
        &self.resolution
    }

    pub fn handle(&self) -> &B::Program {
        &self.program
    }

    pub fn destroy(self, backend: &mut B) {
        backend.delete_program(self.program);
        backend.delete_shader(self.vertex);
        backend.delete_shader(self.fragment);
    }
}

fn compile<B: GraphicsBackend>(
    backend: &mut B,
    stage: ShaderStage,
    source: &str,
) -> Result<B::Shader, ShaderError> {
    backend.compile_shader(stage, source).map_err(|log| {
        debug!("{stage} shader failed to compile: {log}");
        ShaderError::Compile { stage, log }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{GpuCommand, RecordingBackend};

    #[test]
    fn resolves_position_and_resolution() {
        let mut backend = RecordingBackend::default();
        let program = ShaderProgram::build(&mut backend, &ShaderSources::glsl_lighting()).unwrap();
        assert_eq!(program.attrib_location(POSITION_ATTRIBUTE), Some(0));
        assert_eq!(
            program.attributes(),
            [AttributeBinding {
                name: POSITION_ATTRIBUTE.to_string(),
                location: 0,
            }]
        );
        assert!(program.resolution().is_present());
        assert!(program.uniform_location(&backend, "uSphereAmb").is_present());
        assert_eq!(program.uniform_location(&backend, "uGone"), Location::Absent);
    }

    #[test]
    fn fragment_compile_failure_releases_vertex_shader() {
        let mut backend = RecordingBackend::default();
        let sources = ShaderSources::new(
            ShaderSources::glsl_solid().vertex,
            "precision mediump float;\nvoid main() {\n",
        );
        let err = ShaderProgram::build(&mut backend, &sources).err().unwrap();
        assert!(matches!(
            err,
            ShaderError::Compile {
                stage: ShaderStage::Fragment,
                ..
            }
        ));
        assert_eq!(backend.live_objects(), 0);
        assert!(!backend
            .commands()
            .iter()
            .any(|c| matches!(c, GpuCommand::LinkProgram { .. })));
    }

    #[test]
    fn syntax_error_in_main_body_fails_compile() {
        let mut backend = RecordingBackend::default();
        let sources = ShaderSources::new(
            ShaderSources::glsl_solid().vertex,
            "precision mediump float;\nvoid main() {\n  gl_FragColor = vec4(1.0, 0.0, 0.0 1.0)\n}\n",
        );
        let err = ShaderProgram::build(&mut backend, &sources).err().unwrap();
        assert!(matches!(
            err,
            ShaderError::Compile {
                stage: ShaderStage::Fragment,
                ..
            }
        ));
        assert_eq!(backend.live_objects(), 0);

        let misspelled = ShaderSources::new(
            ShaderSources::glsl_solid().vertex,
            "precision mediump float;\nvoid main() {\n  gl_FragColr = vec4(1.0);\n}\n",
        );
        let err = ShaderProgram::build(&mut backend, &misspelled).err().unwrap();
        assert!(err.to_string().contains("gl_FragColr"), "{err}");
        assert_eq!(backend.live_objects(), 0);
    }

    #[test]
    fn link_failure_releases_both_shaders() {
        let mut backend = RecordingBackend::default();
        let sources = ShaderSources::new(
            "uniform vec2 uResolution;\nattribute vec4 aPosition;\nvoid main() { gl_Position = aPosition; }",
            "precision mediump float;\nuniform vec3 uResolution;\nvoid main() { gl_FragColor = vec4(uResolution, 1.0); }",
        );
        let err = ShaderProgram::build(&mut backend, &sources).err().unwrap();
        assert!(matches!(err, ShaderError::Link { .. }));
        assert_eq!(backend.live_objects(), 0);
    }

    #[test]
    fn program_without_position_is_rejected() {
        let mut backend = RecordingBackend::default();
        let sources = ShaderSources::new(
            "void main() { gl_Position = vec4(0.0); }",
            ShaderSources::glsl_solid().fragment,
        );
        let err = ShaderProgram::build(&mut backend, &sources).err().unwrap();
        assert!(matches!(err, ShaderError::MissingAttribute { .. }));
        assert_eq!(backend.live_objects(), 0);
    }

    #[test]
    fn destroy_releases_everything() {
        let mut backend = RecordingBackend::default();
        let program = ShaderProgram::build(&mut backend, &ShaderSources::glsl_solid()).unwrap();
        assert_eq!(backend.live_objects(), 3);
        program.destroy(&mut backend);
        assert_eq!(backend.live_objects(), 0);
    }
}
