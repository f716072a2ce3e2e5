//! Backend seam between the harness core and a concrete graphics API.
//!
//! The trait is deliberately shaped like a WebGL context: shaders are
//! compiled and linked as separate steps, uniforms are addressed by
//! location, and drawing is immediate. The recording backend is always
//! available; the `wgpu` and WebGL backends are selected per target.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GpuError;

pub mod recording;
pub mod reflect;

#[cfg(not(target_arch = "wasm32"))]
pub mod native;
#[cfg(target_arch = "wasm32")]
pub mod webgl;

pub use recording::{GpuCommand, HeadlessSurface, RecordedLocation, RecordingBackend, RecordingStats};

/// Programmable stage a shader source targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        })
    }
}

/// Primitive assembly used by the draw call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    /// Four vertices, two triangles sharing an edge.
    #[default]
    #[serde(rename = "strip")]
    TriangleStrip,
    /// The first three vertices as a single triangle.
    Triangles,
}

impl Topology {
    /// Number of vertices drawn from a buffer holding `available` vertices.
    pub fn vertex_count(self, available: u32) -> u32 {
        match self {
            Topology::TriangleStrip => available,
            Topology::Triangles => available.min(3),
        }
    }
}

impl FromStr for Topology {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strip" | "triangle-strip" => Ok(Topology::TriangleStrip),
            "triangles" | "triangle-list" => Ok(Topology::Triangles),
            other => Err(format!("unknown topology `{other}`")),
        }
    }
}

/// How a float vertex attribute is read out of the bound buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttribLayout {
    pub components: u8,
    pub normalized: bool,
    /// Zero means tightly packed.
    pub stride: u32,
    pub offset: u32,
}

impl AttribLayout {
    pub const fn tight(components: u8) -> Self {
        Self {
            components,
            normalized: false,
            stride: 0,
            offset: 0,
        }
    }

    /// Byte distance between consecutive vertices.
    pub fn effective_stride(&self) -> u32 {
        if self.stride == 0 {
            u32::from(self.components) * std::mem::size_of::<f32>() as u32
        } else {
            self.stride
        }
    }
}

/// Rendering viewport in backing-buffer pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewportRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Drawable surface with a logical (client) size and a backing buffer in
/// device pixels.
pub trait DrawSurface {
    fn client_size(&self) -> (f64, f64);
    fn backing_size(&self) -> (u32, u32);
    fn set_backing_size(&mut self, width: u32, height: u32);
}

/// WebGL-shaped graphics API used by the renderer.
///
/// Failed compiles and links return the driver's info log. The backend
/// releases the object that failed; the caller is responsible only for the
/// handles it was actually given.
pub trait GraphicsBackend {
    type Shader;
    type Program;
    type Buffer;
    type UniformLocation: Clone + fmt::Debug;
    type Surface: DrawSurface;

    fn surface(&self) -> &Self::Surface;
    fn surface_mut(&mut self) -> &mut Self::Surface;

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<Self::Shader, String>;
    fn delete_shader(&mut self, shader: Self::Shader);
    fn link_program(
        &mut self,
        vertex: &Self::Shader,
        fragment: &Self::Shader,
    ) -> Result<Self::Program, String>;
    fn delete_program(&mut self, program: Self::Program);
    fn attrib_location(&self, program: &Self::Program, name: &str) -> Option<u32>;
    fn uniform_location(&self, program: &Self::Program, name: &str)
        -> Option<Self::UniformLocation>;

    fn create_static_buffer(&mut self, data: &[f32]) -> Result<Self::Buffer, GpuError>;
    fn delete_buffer(&mut self, buffer: Self::Buffer);

    fn set_viewport(&mut self, rect: ViewportRect);
    fn clear(&mut self, color: [f32; 4]);
    fn use_program(&mut self, program: &Self::Program);
    fn bind_vertex_buffer(&mut self, buffer: &Self::Buffer);
    fn vertex_attrib_pointer(&mut self, location: u32, layout: AttribLayout);
    fn enable_vertex_attrib(&mut self, location: u32);
    fn uniform2f(&mut self, location: &Self::UniformLocation, value: [f32; 2]);
    fn uniform3f(&mut self, location: &Self::UniformLocation, value: [f32; 3]);
    fn draw_arrays(&mut self, topology: Topology, first: u32, count: u32);

    /// Flushes the frame for backends that batch work. Immediate-mode
    /// backends keep the default.
    fn present(&mut self) -> Result<(), GpuError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topology_picks_vertex_count() {
        assert_eq!(Topology::TriangleStrip.vertex_count(4), 4);
        assert_eq!(Topology::Triangles.vertex_count(4), 3);
        assert_eq!(Topology::Triangles.vertex_count(2), 2);
    }

    #[test]
    fn tight_layout_stride() {
        assert_eq!(AttribLayout::tight(2).effective_stride(), 8);
        let padded = AttribLayout {
            stride: 24,
            ..AttribLayout::tight(3)
        };
        assert_eq!(padded.effective_stride(), 24);
    }
}
