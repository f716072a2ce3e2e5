//! Interactive shader harness.
//!
//! Draws a full-screen quad through a compiled and linked shader program,
//! exposes a table of RGB uniform controls and redraws synchronously
//! whenever a control changes or the surface is resized. All GPU work goes
//! through the [`GraphicsBackend`] trait, so the core runs unchanged against
//! `wgpu`, WebGL or the headless recording backend used by the tests.

pub mod config;
pub mod controls;
pub mod error;
pub mod gpu;
pub mod render;
pub mod shaders;
pub mod vector;

#[cfg(not(target_arch = "wasm32"))]
pub mod app;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use config::{default_controls, HarnessConfig, ShaderPaths, ShaderVariant};
pub use controls::{control_id, ControlEvent, ControlSpec, UniformControl, UniformControlRegistry};
pub use error::{ConfigError, ControlError, GpuError, InitError, RegistryError, ShaderError, UpdateError};
pub use gpu::reflect::ShaderLanguage;
pub use gpu::{
    DrawSurface, GpuCommand, GraphicsBackend, HeadlessSurface, RecordingBackend, RecordingStats,
    ShaderStage, Topology,
};
pub use render::{Location, RenderOptions, Renderer, ShaderProgram};
pub use shaders::ShaderSources;
pub use vector::{Channel, Vector3};
