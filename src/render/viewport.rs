use crate::gpu::{DrawSurface, GraphicsBackend, ViewportRect};

/// Backing size for a client size at the given device pixel ratio.
pub fn display_size(client: (f64, f64), device_pixel_ratio: f64) -> (u32, u32) {
    let scale = |logical: f64| (logical * device_pixel_ratio).floor().max(0.0) as u32;
    (scale(client.0), scale(client.1))
}

/// Keeps the backing buffer matched to the surface's on-screen size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Viewport {
    current: Option<ViewportRect>,
}

impl Viewport {
    /// Reallocates the backing buffer only when its size changed, then
    /// always resets the viewport rectangle.
    pub fn resize<B: GraphicsBackend>(&mut self, backend: &mut B, device_pixel_ratio: f64) -> (u32, u32) {
        let (width, height) = display_size(backend.surface().client_size(), device_pixel_ratio);
        if backend.surface().backing_size() != (width, height) {
            log::debug!("resizing backing buffer to {width}x{height}");
            backend.surface_mut().set_backing_size(width, height);
        }

        let (width, height) = backend.surface().backing_size();
        let rect = ViewportRect {
            x: 0,
            y: 0,
            width,
            height,
        };
        backend.set_viewport(rect);
        self.current = Some(rect);
        (width, height)
    }

    pub fn current(&self) -> Option<ViewportRect> {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::RecordingBackend;

    #[test]
    fn floors_fractional_sizes() {
        assert_eq!(display_size((801.0, 600.5), 1.5), (1201, 900));
        assert_eq!(display_size((100.0, 50.0), 1.0), (100, 50));
    }

    #[test]
    fn resize_is_idempotent() {
        let mut backend = RecordingBackend::with_client_size(800.0, 600.0);
        let mut viewport = Viewport::default();
        assert_eq!(viewport.resize(&mut backend, 2.0), (1600, 1200));
        assert_eq!(viewport.resize(&mut backend, 2.0), (1600, 1200));
        assert_eq!(backend.surface().reallocations(), 1);
        assert_eq!(
            viewport.current(),
            Some(ViewportRect {
                x: 0,
                y: 0,
                width: 1600,
                height: 1200
            })
        );
    }
}
