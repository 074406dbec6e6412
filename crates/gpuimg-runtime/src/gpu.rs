//! Backend contract: the explicit rendering context passed through every GPU-touching call.
//!
//! A `Gpu` is owned by exactly one thread (the render thread). Handles are plain ids; a handle
//! is only meaningful for the `Gpu` that produced it.

use gpuimg_core::{EngineError, Quad};
use image::RgbaImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FramebufferId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttribLocation(pub u32);

/// A value for one shader uniform.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Int(i32),
    IntArray(Vec<i32>),
    Float(f32),
    FloatArray(Vec<f32>),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Mat3([f32; 9]),
    Mat4([f32; 16]),
}

impl UniformValue {
    pub fn as_float(&self) -> Option<f32> {
        match self {
            UniformValue::Float(v) => Some(*v),
            _ => None,
        }
    }
}

/// Framebuffer plus its color texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTarget {
    pub fbo: FramebufferId,
    pub tex: TextureId,
    pub w: i32,
    pub h: i32,
}

/// The operations the filter engine needs from a graphics API.
///
/// Semantics follow OpenGL ES 2.0: texture row 0 is the bottom row of a framebuffer, quads are
/// drawn as a 4-vertex triangle strip, and `bind_framebuffer(None)` binds the current surface
/// target (the visible surface unless an offscreen target was installed with
/// [`Gpu::set_surface_target`]).
pub trait Gpu {
    /// Compile and link. Compile/link failures carry the driver's info log.
    fn create_program(&mut self, vertex: &str, fragment: &str) -> Result<ProgramId, EngineError>;
    fn delete_program(&mut self, program: ProgramId);
    fn use_program(&mut self, program: Option<ProgramId>);
    fn attrib_location(&mut self, program: ProgramId, name: &str) -> Option<AttribLocation>;
    fn uniform_location(&mut self, program: ProgramId, name: &str) -> Option<UniformLocation>;
    /// Writes to the program currently in use.
    fn set_uniform(&mut self, location: UniformLocation, value: &UniformValue);

    /// Upload RGBA8 pixels (rows top to bottom as given) with linear filtering and
    /// clamp-to-edge. With `reuse`, the existing texture is updated in place and must have the
    /// same dimensions.
    fn upload_texture(
        &mut self,
        image: &RgbaImage,
        reuse: Option<TextureId>,
    ) -> Result<TextureId, EngineError>;
    fn delete_texture(&mut self, texture: TextureId);
    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>);

    fn create_render_target(&mut self, w: i32, h: i32) -> Result<RenderTarget, EngineError>;
    fn delete_render_target(&mut self, target: RenderTarget);
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>);
    /// Switch the global surface binding. `None` restores the visible surface.
    fn set_surface_target(&mut self, framebuffer: Option<FramebufferId>);
    fn viewport(&mut self, x: i32, y: i32, w: i32, h: i32);
    fn clear(&mut self, rgba: [f32; 4]);

    /// Stream `data` as a vec2 attribute array and enable it.
    fn enable_vertex_attrib(&mut self, location: AttribLocation, data: &Quad);
    fn disable_vertex_attrib(&mut self, location: AttribLocation);
    /// Draw the 4-vertex triangle strip with the current program.
    fn draw_quad(&mut self);

    /// Read RGBA8 pixels from the bound framebuffer, bottom row first.
    fn read_pixels(&mut self, w: i32, h: i32) -> Result<Vec<u8>, EngineError>;
    /// Drain pending error codes.
    fn take_errors(&mut self) -> Vec<u32>;
    fn max_texture_size(&mut self) -> i32;

    /// Make the last frame visible. Offscreen backends do nothing.
    fn present(&mut self) {}
}

/// Logs every pending backend error. Returns true when at least one was pending.
pub fn check_error(gpu: &mut dyn Gpu) -> bool {
    let errors = gpu.take_errors();
    for code in &errors {
        tracing::error!(code = format_args!("0x{code:04x}"), "gpu error");
    }
    !errors.is_empty()
}
