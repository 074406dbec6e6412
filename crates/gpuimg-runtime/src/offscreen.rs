//! Offscreen rendering of still images through the same filter graph as the preview.

use gpuimg_core::{EngineError, Rotation, ScaleType};
use image::RgbaImage;

use crate::filter::Filter;
use crate::gpu::{Gpu, RenderTarget, TextureId};
use crate::renderer::{FrameGeometry, Renderer};

/// Read `w`x`h` pixels from the bound framebuffer as a top-down image.
pub fn read_surface(gpu: &mut dyn Gpu, w: i32, h: i32) -> Result<RgbaImage, EngineError> {
    let raw = gpu.read_pixels(w, h)?;
    let row = w.max(0) as usize * 4;
    if row == 0 || raw.len() != row * h.max(0) as usize {
        return Err(EngineError::other(format!(
            "readback of {w}x{h} returned {} bytes",
            raw.len()
        )));
    }
    let mut top_down = Vec::with_capacity(raw.len());
    for line in raw.chunks_exact(row).rev() {
        top_down.extend_from_slice(line);
    }
    RgbaImage::from_raw(w as u32, h as u32, top_down)
        .ok_or_else(|| EngineError::other("readback buffer does not match its size"))
}

/// A render target installed as the surface target for its lifetime.
///
/// While it exists, `bind_framebuffer(None)` draws here instead of the visible surface.
#[derive(Debug)]
pub struct OffscreenBuffer {
    target: RenderTarget,
}

impl OffscreenBuffer {
    pub fn new(gpu: &mut dyn Gpu, w: i32, h: i32) -> Result<Self, EngineError> {
        let target = gpu.create_render_target(w, h)?;
        gpu.set_surface_target(Some(target.fbo));
        gpu.bind_framebuffer(None);
        gpu.viewport(0, 0, w, h);
        Ok(Self { target })
    }

    pub fn size(&self) -> (i32, i32) {
        (self.target.w, self.target.h)
    }

    pub fn read(&self, gpu: &mut dyn Gpu) -> Result<RgbaImage, EngineError> {
        gpu.bind_framebuffer(None);
        read_surface(gpu, self.target.w, self.target.h)
    }

    /// Restores the visible surface as the surface target.
    pub fn destroy(self, gpu: &mut dyn Gpu) {
        gpu.set_surface_target(None);
        gpu.bind_framebuffer(None);
        gpu.delete_render_target(self.target);
    }
}

fn image_extent(image: &RgbaImage) -> Result<(i32, i32), EngineError> {
    let (w, h) = image.dimensions();
    match (i32::try_from(w), i32::try_from(h)) {
        (Ok(w), Ok(h)) if w > 0 && h > 0 => Ok((w, h)),
        _ => Err(EngineError::other(format!("cannot render a {w}x{h} image"))),
    }
}

/// One offscreen pass of `filter` over an already uploaded image.
struct StillFrame<'a> {
    buffer: &'a OffscreenBuffer,
    texture: TextureId,
    geometry: FrameGeometry,
    background: [f32; 3],
}

impl StillFrame<'_> {
    fn render(&self, gpu: &mut dyn Gpu, filter: &mut dyn Filter) -> Result<RgbaImage, EngineError> {
        let (w, h) = self.buffer.size();
        filter.on_output_size_changed(gpu, w, h);
        gpu.bind_framebuffer(None);
        gpu.viewport(0, 0, w, h);
        let [r, g, b] = self.background;
        gpu.clear([r, g, b, 1.0]);
        filter.on_draw(
            gpu,
            Some(self.texture),
            &self.geometry.positions,
            &self.geometry.tex_coords,
        );
        self.buffer.read(gpu)
    }
}

impl Renderer {
    /// Render `image` at its own size with the active filter and read the result back.
    ///
    /// Uses the preview's flips and scale type with no rotation. The visible surface and the
    /// filter's preview size are restored afterwards.
    pub fn render_offscreen(
        &mut self,
        gpu: &mut dyn Gpu,
        image: &RgbaImage,
    ) -> Result<RgbaImage, EngineError> {
        let (w, h) = image_extent(image)?;
        self.run_pending(gpu);
        self.filter_mut().init(gpu)?;

        let buffer = OffscreenBuffer::new(gpu, w, h)?;
        let result = match gpu.upload_texture(image, None) {
            Ok(texture) => {
                let frame = StillFrame {
                    buffer: &buffer,
                    texture,
                    geometry: FrameGeometry::fit(
                        (w, h),
                        image.dimensions(),
                        Rotation::Normal,
                        self.is_flipped_horizontally(),
                        self.is_flipped_vertically(),
                        self.scale_type(),
                    ),
                    background: self.background(),
                };
                let pixels = frame.render(gpu, self.filter_mut());
                gpu.delete_texture(texture);
                pixels
            }
            Err(e) => Err(e),
        };
        buffer.destroy(gpu);

        let (ow, oh) = self.output_size();
        if ow > 0 && oh > 0 {
            self.filter_mut().on_output_size_changed(gpu, ow, oh);
            gpu.viewport(0, 0, ow, oh);
        }
        result
    }
}

/// Render `image` once per filter, sharing one offscreen target and one input texture.
///
/// Each filter is initialized, drawn, read back and destroyed in turn. A filter that fails to
/// initialize yields an error entry; the others are unaffected.
pub fn render_batch(
    gpu: &mut dyn Gpu,
    image: &RgbaImage,
    filters: Vec<Box<dyn Filter>>,
    scale_type: ScaleType,
    background: [f32; 3],
) -> Result<Vec<Result<RgbaImage, EngineError>>, EngineError> {
    let (w, h) = image_extent(image)?;
    let buffer = OffscreenBuffer::new(gpu, w, h)?;
    let texture = match gpu.upload_texture(image, None) {
        Ok(texture) => texture,
        Err(e) => {
            buffer.destroy(gpu);
            return Err(e);
        }
    };
    let frame = StillFrame {
        buffer: &buffer,
        texture,
        geometry: FrameGeometry::fit(
            (w, h),
            image.dimensions(),
            Rotation::Normal,
            false,
            false,
            scale_type,
        ),
        background,
    };

    let mut results = Vec::with_capacity(filters.len());
    for mut filter in filters {
        let result = match filter.init(gpu) {
            Ok(()) => frame.render(gpu, filter.as_mut()),
            Err(e) => Err(e),
        };
        filter.destroy(gpu);
        results.push(result);
    }

    gpu.delete_texture(texture);
    buffer.destroy(gpu);
    Ok(results)
}
