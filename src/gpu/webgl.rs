use js_sys::Float32Array;
use wasm_bindgen::JsCast;
use web_sys::{
    HtmlCanvasElement, WebGlBuffer, WebGlProgram, WebGlRenderingContext as Gl, WebGlShader,
    WebGlUniformLocation,
};

use crate::error::{GpuError, InitError};
use crate::gpu::{
    AttribLayout, DrawSurface, GraphicsBackend, ShaderStage, Topology, ViewportRect,
};

/// Canvas element: CSS size as the client size, `width`/`height` as the
/// backing buffer.
pub struct CanvasSurface {
    canvas: HtmlCanvasElement,
}

impl CanvasSurface {
    pub fn canvas(&self) -> &HtmlCanvasElement {
        &self.canvas
    }
}

impl DrawSurface for CanvasSurface {
    fn client_size(&self) -> (f64, f64) {
        (
            f64::from(self.canvas.client_width()),
            f64::from(self.canvas.client_height()),
        )
    }

    fn backing_size(&self) -> (u32, u32) {
        (self.canvas.width(), self.canvas.height())
    }

    fn set_backing_size(&mut self, width: u32, height: u32) {
        self.canvas.set_width(width);
        self.canvas.set_height(height);
    }
}

/// WebGL 1 context. Calls map one-to-one onto the backend API.
pub struct WebGlBackend {
    gl: Gl,
    surface: CanvasSurface,
}

impl WebGlBackend {
    pub fn new(canvas: HtmlCanvasElement) -> Result<Self, InitError> {
        let gl = canvas
            .get_context("webgl")
            .ok()
            .flatten()
            .and_then(|context| context.dyn_into::<Gl>().ok())
            .ok_or_else(|| InitError::ContextUnavailable("WebGL is not supported".to_string()))?;
        Ok(Self {
            gl,
            surface: CanvasSurface { canvas },
        })
    }
}

impl GraphicsBackend for WebGlBackend {
    type Shader = WebGlShader;
    type Program = WebGlProgram;
    type Buffer = WebGlBuffer;
    type UniformLocation = WebGlUniformLocation;
    type Surface = CanvasSurface;

    fn surface(&self) -> &CanvasSurface {
        &self.surface
    }

    fn surface_mut(&mut self) -> &mut CanvasSurface {
        &mut self.surface
    }

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<WebGlShader, String> {
        let kind = match stage {
            ShaderStage::Vertex => Gl::VERTEX_SHADER,
            ShaderStage::Fragment => Gl::FRAGMENT_SHADER,
        };
        let shader = self
            .gl
            .create_shader(kind)
            .ok_or_else(|| format!("unable to create {stage} shader object"))?;
        self.gl.shader_source(&shader, source);
        self.gl.compile_shader(&shader);

        let compiled = self
            .gl
            .get_shader_parameter(&shader, Gl::COMPILE_STATUS)
            .as_bool()
            .unwrap_or(false);
        if compiled {
            return Ok(shader);
        }
        let log = self
            .gl
            .get_shader_info_log(&shader)
            .unwrap_or_else(|| "unknown error".to_string());
        self.gl.delete_shader(Some(&shader));
        Err(log)
    }

    fn delete_shader(&mut self, shader: WebGlShader) {
        self.gl.delete_shader(Some(&shader));
    }

    fn link_program(&mut self, vertex: &WebGlShader, fragment: &WebGlShader) -> Result<WebGlProgram, String> {
        let program = self
            .gl
            .create_program()
            .ok_or_else(|| "unable to create program object".to_string())?;
        self.gl.attach_shader(&program, vertex);
        self.gl.attach_shader(&program, fragment);
        self.gl.link_program(&program);

        let linked = self
            .gl
            .get_program_parameter(&program, Gl::LINK_STATUS)
            .as_bool()
            .unwrap_or(false);
        if linked {
            return Ok(program);
        }
        let log = self
            .gl
            .get_program_info_log(&program)
            .unwrap_or_else(|| "unknown error".to_string());
        self.gl.delete_program(Some(&program));
        Err(log)
    }

    fn delete_program(&mut self, program: WebGlProgram) {
        self.gl.delete_program(Some(&program));
    }

    fn attrib_location(&self, program: &WebGlProgram, name: &str) -> Option<u32> {
        u32::try_from(self.gl.get_attrib_location(program, name)).ok()
    }

    fn uniform_location(&self, program: &WebGlProgram, name: &str) -> Option<WebGlUniformLocation> {
        self.gl.get_uniform_location(program, name)
    }

    fn create_static_buffer(&mut self, data: &[f32]) -> Result<WebGlBuffer, GpuError> {
        let buffer = self
            .gl
            .create_buffer()
            .ok_or_else(|| GpuError::Buffer("unable to create buffer object".to_string()))?;
        self.gl.bind_buffer(Gl::ARRAY_BUFFER, Some(&buffer));
        let array = Float32Array::from(data);
        self.gl
            .buffer_data_with_array_buffer_view(Gl::ARRAY_BUFFER, &array, Gl::STATIC_DRAW);
        Ok(buffer)
    }

    fn delete_buffer(&mut self, buffer: WebGlBuffer) {
        self.gl.delete_buffer(Some(&buffer));
    }

    fn set_viewport(&mut self, rect: ViewportRect) {
        self.gl.viewport(
            rect.x,
            rect.y,
            i32::try_from(rect.width).unwrap_or(i32::MAX),
            i32::try_from(rect.height).unwrap_or(i32::MAX),
        );
    }

    fn clear(&mut self, color: [f32; 4]) {
        self.gl.clear_color(color[0], color[1], color[2], color[3]);
        self.gl.clear(Gl::COLOR_BUFFER_BIT);
    }

    fn use_program(&mut self, program: &WebGlProgram) {
        self.gl.use_program(Some(program));
    }

    fn bind_vertex_buffer(&mut self, buffer: &WebGlBuffer) {
        self.gl.bind_buffer(Gl::ARRAY_BUFFER, Some(buffer));
    }

    fn vertex_attrib_pointer(&mut self, location: u32, layout: AttribLayout) {
        self.gl.vertex_attrib_pointer_with_i32(
            location,
            i32::from(layout.components),
            Gl::FLOAT,
            layout.normalized,
            layout.stride as i32,
            layout.offset as i32,
        );
    }

    fn enable_vertex_attrib(&mut self, location: u32) {
        self.gl.enable_vertex_attrib_array(location);
    }

    fn uniform2f(&mut self, location: &WebGlUniformLocation, value: [f32; 2]) {
        self.gl.uniform2f(Some(location), value[0], value[1]);
    }

    fn uniform3f(&mut self, location: &WebGlUniformLocation, value: [f32; 3]) {
        self.gl.uniform3f(Some(location), value[0], value[1], value[2]);
    }

    fn draw_arrays(&mut self, topology: Topology, first: u32, count: u32) {
        let mode = match topology {
            Topology::TriangleStrip => Gl::TRIANGLE_STRIP,
            Topology::Triangles => Gl::TRIANGLES,
        };
        self.gl.draw_arrays(mode, first as i32, count as i32);
    }
}
