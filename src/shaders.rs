//! Shader source pairs: the embedded defaults and files named by a harness
//! description.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::ShaderPaths;
use crate::error::ConfigError;

pub const QUAD_VERT_GLSL: &str = include_str!("../shaders/quad.vert");
pub const LIGHTING_FRAG_GLSL: &str = include_str!("../shaders/lighting.frag");
pub const SOLID_FRAG_GLSL: &str = include_str!("../shaders/solid.frag");
pub const QUAD_VERT_WGSL: &str = include_str!("../shaders/quad.vert.wgsl");
pub const LIGHTING_FRAG_WGSL: &str = include_str!("../shaders/lighting.frag.wgsl");
pub const SOLID_FRAG_WGSL: &str = include_str!("../shaders/solid.frag.wgsl");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderSources {
    pub vertex: String,
    pub fragment: String,
}

impl ShaderSources {
    pub fn new(vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            vertex: vertex.into(),
            fragment: fragment.into(),
        }
    }

    /// GLSL ES pair shading a lit sphere from the four default controls.
    pub fn glsl_lighting() -> Self {
        Self::new(QUAD_VERT_GLSL, LIGHTING_FRAG_GLSL)
    }

    /// GLSL ES pair filling the quad with a fixed color.
    pub fn glsl_solid() -> Self {
        Self::new(QUAD_VERT_GLSL, SOLID_FRAG_GLSL)
    }

    pub fn wgsl_lighting() -> Self {
        Self::new(QUAD_VERT_WGSL, LIGHTING_FRAG_WGSL)
    }

    pub fn wgsl_solid() -> Self {
        Self::new(QUAD_VERT_WGSL, SOLID_FRAG_WGSL)
    }

    pub fn read(paths: &ShaderPaths) -> Result<Self, ConfigError> {
        Ok(Self {
            vertex: read_source(&paths.vertex)?,
            fragment: read_source(&paths.fragment)?,
        })
    }
}

fn read_source(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn reads_sources_from_disk() {
        let mut vertex = NamedTempFile::new().unwrap();
        write!(vertex, "{QUAD_VERT_GLSL}").unwrap();
        let mut fragment = NamedTempFile::new().unwrap();
        write!(fragment, "{SOLID_FRAG_GLSL}").unwrap();

        let paths = ShaderPaths {
            vertex: vertex.path().to_path_buf(),
            fragment: fragment.path().to_path_buf(),
        };
        assert_eq!(ShaderSources::read(&paths).unwrap(), ShaderSources::glsl_solid());
    }

    #[test]
    fn missing_file_names_the_path() {
        let paths = ShaderPaths {
            vertex: "does/not/exist.vert".into(),
            fragment: "does/not/exist.frag".into(),
        };
        let err = ShaderSources::read(&paths).unwrap_err();
        assert!(err.to_string().contains("does/not/exist.vert"));
    }
}
