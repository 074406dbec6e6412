//! gpuimg runtime (glow/OpenGL backend)
//
// This crate only maps the `Gpu` contract onto OpenGL / OpenGL ES through glow:
// - compile/link shaders (with a version line for the context's dialect)
// - textures, framebuffers and the streamed quad attributes
// - readback and error draining
//
// Window and context creation belong to the host.
#![allow(clippy::missing_safety_doc)]

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU32;

use glow::HasContext;
use gpuimg_core::Quad;
use gpuimg_runtime::{
    AttribLocation, FramebufferId, Gpu, ProgramId, RenderTarget, TextureId, UniformLocation,
    UniformValue,
};
use image::RgbaImage;

pub use gpuimg_core::EngineError;

/// Error codes are drained in batches of at most this many per call.
const MAX_ERRORS_PER_DRAIN: usize = 32;

/// The `#version` line prepended to sources that carry none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderDialect {
    /// OpenGL ES 2.0 / WebGL: `#version 100`.
    Es100,
    /// Desktop GL 3.x: `#version 130`, which still accepts `attribute`/`varying`/`texture2D`.
    Glsl130,
}

impl ShaderDialect {
    pub fn for_version(version: &glow::Version) -> Self {
        if version.is_embedded {
            ShaderDialect::Es100
        } else {
            ShaderDialect::Glsl130
        }
    }

    fn header(self) -> &'static str {
        match self {
            ShaderDialect::Es100 => "#version 100\n",
            ShaderDialect::Glsl130 => "#version 130\n",
        }
    }

    /// Prefixes the version line unless the source already declares one.
    pub fn prepare(self, source: &str) -> String {
        if source.trim_start().starts_with("#version") {
            source.to_string()
        } else {
            format!("{}{}", self.header(), source)
        }
    }
}

pub unsafe fn compile_program(
    gl: &glow::Context,
    vert_src: &str,
    frag_src: &str,
) -> Result<glow::NativeProgram, EngineError> {
    let vs = gl
        .create_shader(glow::VERTEX_SHADER)
        .map_err(|e| EngineError::GlCreate(format!("create_shader(VS) failed: {e:?}")))?;
    gl.shader_source(vs, vert_src);
    gl.compile_shader(vs);
    if !gl.get_shader_compile_status(vs) {
        let log = gl.get_shader_info_log(vs);
        gl.delete_shader(vs);
        return Err(EngineError::VertexCompile(log));
    }

    let fs = gl
        .create_shader(glow::FRAGMENT_SHADER)
        .map_err(|e| EngineError::GlCreate(format!("create_shader(FS) failed: {e:?}")))?;
    gl.shader_source(fs, frag_src);
    gl.compile_shader(fs);
    if !gl.get_shader_compile_status(fs) {
        let log = gl.get_shader_info_log(fs);
        gl.delete_shader(vs);
        gl.delete_shader(fs);
        return Err(EngineError::FragmentCompile(log));
    }

    let program = gl
        .create_program()
        .map_err(|e| EngineError::GlCreate(format!("create_program failed: {e:?}")))?;
    gl.attach_shader(program, vs);
    gl.attach_shader(program, fs);
    gl.link_program(program);

    gl.detach_shader(program, vs);
    gl.detach_shader(program, fs);
    gl.delete_shader(vs);
    gl.delete_shader(fs);

    if !gl.get_program_link_status(program) {
        let log = gl.get_program_info_log(program);
        gl.delete_program(program);
        return Err(EngineError::Link(log));
    }

    Ok(program)
}

unsafe fn set_sampling(gl: &glow::Context) {
    gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, glow::LINEAR as i32);
    gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::LINEAR as i32);
    gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE as i32);
    gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE as i32);
}

/// Offscreen render target (FBO + color texture).
pub unsafe fn create_render_target(
    gl: &glow::Context,
    w: i32,
    h: i32,
) -> Result<(glow::NativeFramebuffer, glow::NativeTexture), EngineError> {
    let fbo = gl
        .create_framebuffer()
        .map_err(|e| EngineError::GlCreate(format!("create_framebuffer failed: {e:?}")))?;
    let tex = match gl.create_texture() {
        Ok(tex) => tex,
        Err(e) => {
            gl.delete_framebuffer(fbo);
            return Err(EngineError::GlCreate(format!("create_texture failed: {e:?}")));
        }
    };

    gl.bind_texture(glow::TEXTURE_2D, Some(tex));
    set_sampling(gl);
    gl.tex_image_2d(
        glow::TEXTURE_2D,
        0,
        glow::RGBA as i32,
        w,
        h,
        0,
        glow::RGBA,
        glow::UNSIGNED_BYTE,
        None,
    );

    gl.bind_framebuffer(glow::FRAMEBUFFER, Some(fbo));
    gl.framebuffer_texture_2d(
        glow::FRAMEBUFFER,
        glow::COLOR_ATTACHMENT0,
        glow::TEXTURE_2D,
        Some(tex),
        0,
    );

    let status = gl.check_framebuffer_status(glow::FRAMEBUFFER);
    gl.bind_framebuffer(glow::FRAMEBUFFER, None);
    gl.bind_texture(glow::TEXTURE_2D, None);
    if status != glow::FRAMEBUFFER_COMPLETE {
        gl.delete_framebuffer(fbo);
        gl.delete_texture(tex);
        return Err(EngineError::FramebufferIncomplete(status));
    }

    Ok((fbo, tex))
}

// -------------------------------------------------------------------------------------------------
// Handle conversion
// -------------------------------------------------------------------------------------------------

fn program_handle(id: ProgramId) -> Option<glow::NativeProgram> {
    NonZeroU32::new(id.0).map(glow::NativeProgram)
}

fn texture_handle(id: TextureId) -> Option<glow::NativeTexture> {
    NonZeroU32::new(id.0).map(glow::NativeTexture)
}

fn framebuffer_handle(id: FramebufferId) -> Option<glow::NativeFramebuffer> {
    NonZeroU32::new(id.0).map(glow::NativeFramebuffer)
}

// -------------------------------------------------------------------------------------------------
// GlowGpu
// -------------------------------------------------------------------------------------------------

type Present = Box<dyn FnMut()>;

/// [`Gpu`] over a current glow context.
///
/// The context must stay current on the thread that owns this value.
pub struct GlowGpu {
    gl: glow::Context,
    dialect: ShaderDialect,
    vao: Option<glow::NativeVertexArray>,
    /// One streamed buffer per attribute location.
    buffers: HashMap<u32, glow::NativeBuffer>,
    surface_target: Option<FramebufferId>,
    present: Option<Present>,
}

impl fmt::Debug for GlowGpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlowGpu")
            .field("dialect", &self.dialect)
            .field("vao", &self.vao)
            .field("buffers", &self.buffers.len())
            .field("surface_target", &self.surface_target)
            .finish_non_exhaustive()
    }
}

impl GlowGpu {
    pub fn new(gl: glow::Context) -> Result<Self, EngineError> {
        let version = gl.version().clone();
        if version.major < 2 {
            return Err(EngineError::Unsupported(format!(
                "OpenGL {}.{} is older than 2.0",
                version.major, version.minor
            )));
        }
        let dialect = ShaderDialect::for_version(&version);

        // Core profiles refuse to draw without a bound vertex array.
        let vao = if version.major >= 3 {
            let vao = unsafe { gl.create_vertex_array() }
                .map_err(|e| EngineError::GlCreate(format!("create_vertex_array: {e}")))?;
            unsafe { gl.bind_vertex_array(Some(vao)) };
            Some(vao)
        } else {
            None
        };
        unsafe { gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1) };
        unsafe { gl.pixel_store_i32(glow::PACK_ALIGNMENT, 1) };

        tracing::info!(
            major = version.major,
            minor = version.minor,
            embedded = version.is_embedded,
            vendor = %version.vendor_info,
            ?dialect,
            "gl context ready"
        );
        Ok(Self {
            gl,
            dialect,
            vao,
            buffers: HashMap::new(),
            surface_target: None,
            present: None,
        })
    }

    /// Called from [`Gpu::present`], typically to swap the window's buffers.
    pub fn with_present(mut self, present: impl FnMut() + 'static) -> Self {
        self.present = Some(Box::new(present));
        self
    }

    pub fn gl(&self) -> &glow::Context {
        &self.gl
    }

    pub fn dialect(&self) -> ShaderDialect {
        self.dialect
    }

    /// Release backend-owned objects. Filter resources are released by their owners.
    pub fn destroy(&mut self) {
        unsafe {
            for (_, buffer) in self.buffers.drain() {
                self.gl.delete_buffer(buffer);
            }
            if let Some(vao) = self.vao.take() {
                self.gl.delete_vertex_array(vao);
            }
        }
    }

    fn buffer_for(&mut self, location: u32) -> Option<glow::NativeBuffer> {
        if let Some(buffer) = self.buffers.get(&location) {
            return Some(*buffer);
        }
        match unsafe { self.gl.create_buffer() } {
            Ok(buffer) => {
                self.buffers.insert(location, buffer);
                Some(buffer)
            }
            Err(e) => {
                tracing::error!(location, error = %e, "vertex buffer creation failed");
                None
            }
        }
    }
}

impl Gpu for GlowGpu {
    fn create_program(&mut self, vertex: &str, fragment: &str) -> Result<ProgramId, EngineError> {
        let vertex = self.dialect.prepare(vertex);
        let fragment = self.dialect.prepare(fragment);
        let program = unsafe { compile_program(&self.gl, &vertex, &fragment)? };
        Ok(ProgramId(program.0.get()))
    }

    fn delete_program(&mut self, program: ProgramId) {
        if let Some(program) = program_handle(program) {
            unsafe { self.gl.delete_program(program) };
        }
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        unsafe { self.gl.use_program(program.and_then(program_handle)) };
    }

    fn attrib_location(&mut self, program: ProgramId, name: &str) -> Option<AttribLocation> {
        let program = program_handle(program)?;
        unsafe { self.gl.get_attrib_location(program, name) }.map(AttribLocation)
    }

    fn uniform_location(&mut self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        let program = program_handle(program)?;
        unsafe { self.gl.get_uniform_location(program, name) }.map(|loc| UniformLocation(loc.0))
    }

    fn set_uniform(&mut self, location: UniformLocation, value: &UniformValue) {
        let loc = glow::NativeUniformLocation(location.0);
        let loc = Some(&loc);
        let gl = &self.gl;
        unsafe {
            match value {
                UniformValue::Int(v) => gl.uniform_1_i32(loc, *v),
                UniformValue::IntArray(v) => gl.uniform_1_i32_slice(loc, v),
                UniformValue::Float(v) => gl.uniform_1_f32(loc, *v),
                UniformValue::FloatArray(v) => gl.uniform_1_f32_slice(loc, v),
                UniformValue::Vec2(v) => gl.uniform_2_f32_slice(loc, v),
                UniformValue::Vec3(v) => gl.uniform_3_f32_slice(loc, v),
                UniformValue::Vec4(v) => gl.uniform_4_f32_slice(loc, v),
                UniformValue::Mat3(m) => gl.uniform_matrix_3_f32_slice(loc, false, m),
                UniformValue::Mat4(m) => gl.uniform_matrix_4_f32_slice(loc, false, m),
            }
        }
    }

    fn upload_texture(
        &mut self,
        image: &RgbaImage,
        reuse: Option<TextureId>,
    ) -> Result<TextureId, EngineError> {
        let (w, h) = (image.width() as i32, image.height() as i32);
        let gl = &self.gl;
        unsafe {
            if let Some(existing) = reuse.and_then(texture_handle) {
                gl.bind_texture(glow::TEXTURE_2D, Some(existing));
                gl.tex_sub_image_2d(
                    glow::TEXTURE_2D,
                    0,
                    0,
                    0,
                    w,
                    h,
                    glow::RGBA,
                    glow::UNSIGNED_BYTE,
                    glow::PixelUnpackData::Slice(image.as_raw()),
                );
                return Ok(TextureId(existing.0.get()));
            }

            let tex = gl
                .create_texture()
                .map_err(|e| EngineError::GlCreate(format!("create_texture failed: {e:?}")))?;
            gl.bind_texture(glow::TEXTURE_2D, Some(tex));
            set_sampling(gl);
            gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::RGBA as i32,
                w,
                h,
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                Some(image.as_raw()),
            );
            Ok(TextureId(tex.0.get()))
        }
    }

    fn delete_texture(&mut self, texture: TextureId) {
        if let Some(texture) = texture_handle(texture) {
            unsafe { self.gl.delete_texture(texture) };
        }
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>) {
        unsafe {
            self.gl.active_texture(glow::TEXTURE0 + unit);
            self.gl
                .bind_texture(glow::TEXTURE_2D, texture.and_then(texture_handle));
        }
    }

    fn create_render_target(&mut self, w: i32, h: i32) -> Result<RenderTarget, EngineError> {
        let (fbo, tex) = unsafe { create_render_target(&self.gl, w, h)? };
        Ok(RenderTarget {
            fbo: FramebufferId(fbo.0.get()),
            tex: TextureId(tex.0.get()),
            w,
            h,
        })
    }

    fn delete_render_target(&mut self, target: RenderTarget) {
        if self.surface_target == Some(target.fbo) {
            self.surface_target = None;
        }
        unsafe {
            if let Some(fbo) = framebuffer_handle(target.fbo) {
                self.gl.delete_framebuffer(fbo);
            }
            if let Some(tex) = texture_handle(target.tex) {
                self.gl.delete_texture(tex);
            }
        }
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        let fbo = framebuffer
            .or(self.surface_target)
            .and_then(framebuffer_handle);
        unsafe { self.gl.bind_framebuffer(glow::FRAMEBUFFER, fbo) };
    }

    fn set_surface_target(&mut self, framebuffer: Option<FramebufferId>) {
        self.surface_target = framebuffer;
    }

    fn viewport(&mut self, x: i32, y: i32, w: i32, h: i32) {
        unsafe { self.gl.viewport(x, y, w, h) };
    }

    fn clear(&mut self, [r, g, b, a]: [f32; 4]) {
        unsafe {
            self.gl.clear_color(r, g, b, a);
            self.gl.clear(glow::COLOR_BUFFER_BIT);
        }
    }

    fn enable_vertex_attrib(&mut self, location: AttribLocation, data: &Quad) {
        let Some(buffer) = self.buffer_for(location.0) else {
            return;
        };
        let gl = &self.gl;
        unsafe {
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(buffer));
            gl.buffer_data_u8_slice(
                glow::ARRAY_BUFFER,
                bytemuck::cast_slice(data),
                glow::STREAM_DRAW,
            );
            gl.vertex_attrib_pointer_f32(location.0, 2, glow::FLOAT, false, 0, 0);
            gl.enable_vertex_attrib_array(location.0);
            gl.bind_buffer(glow::ARRAY_BUFFER, None);
        }
    }

    fn disable_vertex_attrib(&mut self, location: AttribLocation) {
        unsafe { self.gl.disable_vertex_attrib_array(location.0) };
    }

    fn draw_quad(&mut self) {
        unsafe { self.gl.draw_arrays(glow::TRIANGLE_STRIP, 0, 4) };
    }

    fn read_pixels(&mut self, w: i32, h: i32) -> Result<Vec<u8>, EngineError> {
        if w <= 0 || h <= 0 {
            return Err(EngineError::other(format!("readback {w}x{h} is empty")));
        }
        let mut buf = vec![0u8; w as usize * h as usize * 4];
        unsafe {
            self.gl.read_pixels(
                0,
                0,
                w,
                h,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                glow::PixelPackData::Slice(&mut buf),
            );
        }
        Ok(buf)
    }

    fn take_errors(&mut self) -> Vec<u32> {
        let mut errors = Vec::new();
        while errors.len() < MAX_ERRORS_PER_DRAIN {
            match unsafe { self.gl.get_error() } {
                glow::NO_ERROR => break,
                code => errors.push(code),
            }
        }
        errors
    }

    fn max_texture_size(&mut self) -> i32 {
        unsafe { self.gl.get_parameter_i32(glow::MAX_TEXTURE_SIZE) }
    }

    fn present(&mut self) {
        if let Some(present) = self.present.as_mut() {
            present();
        }
    }
}
