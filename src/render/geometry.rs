use crate::error::GpuError;
use crate::gpu::{AttribLayout, GraphicsBackend};

/// Full-screen quad as 2-D corners, in triangle-strip order.
pub const QUAD_VERTICES: [f32; 8] = [1.0, 1.0, -1.0, 1.0, 1.0, -1.0, -1.0, -1.0];

/// Static vertex buffer and the layout its contents are read with.
pub struct GeometryBuffer<B: GraphicsBackend> {
    buffer: B::Buffer,
    vertex_count: u32,
    layout: AttribLayout,
}

impl<B: GraphicsBackend> GeometryBuffer<B> {
    pub fn upload(backend: &mut B, vertices: &[f32], components: u8) -> Result<Self, GpuError> {
        if components == 0 || vertices.is_empty() {
            return Err(GpuError::Buffer("vertex data is empty".to_string()));
        }
        if vertices.len() % usize::from(components) != 0 {
            return Err(GpuError::Buffer(format!(
                "{} floats do not form whole {components}-component vertices",
                vertices.len()
            )));
        }
        let vertex_count = u32::try_from(vertices.len() / usize::from(components))
            .map_err(|_| GpuError::Buffer("too many vertices".to_string()))?;

        let buffer = backend.create_static_buffer(vertices)?;
        log::debug!("uploaded {vertex_count} vertices");
        Ok(Self {
            buffer,
            vertex_count,
            layout: AttribLayout::tight(components),
        })
    }

    pub fn quad(backend: &mut B) -> Result<Self, GpuError> {
        Self::upload(backend, &QUAD_VERTICES, 2)
    }

    pub fn handle(&self) -> &B::Buffer {
        &self.buffer
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn layout(&self) -> AttribLayout {
        self.layout
    }

    pub fn destroy(self, backend: &mut B) {
        backend.delete_buffer(self.buffer);
    }
}
