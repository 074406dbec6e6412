#![forbid(unsafe_code)]

//! CPU reference backend.
//!
//! `SoftGpu` implements the [`Gpu`] contract with GL ES 2.0 semantics (bottom-up rows, strip
//! quads, unorm8 color attachments) and evaluates fragment shaders through registered
//! [`Kernel`]s. It exists for headless tests and for checking the GL backend against known
//! output.
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_debug_implementations)]

mod kernels;
mod raster;
mod shader;

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use gpuimg_core::{EngineError, Quad};
use gpuimg_runtime::filter::ATTR_POSITION;
use gpuimg_runtime::filter::ATTR_TEXTURE_COORDINATE;
use gpuimg_runtime::two_input::ATTR_TEXTURE_COORDINATE_2;
use gpuimg_runtime::{
    AttribLocation, FramebufferId, Gpu, ProgramId, RenderTarget, TextureId, UniformLocation,
    UniformValue,
};
use image::{Rgba, RgbaImage};

pub use kernels::Kernel;

pub const GL_INVALID_ENUM: u32 = 0x0500;
pub const GL_INVALID_VALUE: u32 = 0x0501;
pub const GL_INVALID_OPERATION: u32 = 0x0502;
pub const GL_OUT_OF_MEMORY: u32 = 0x0505;

const TEXTURE_UNITS: usize = 8;
const DEFAULT_MAX_TEXTURE_SIZE: i32 = 4096;

/// Counters for leak and call-count checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SoftStats {
    pub programs: usize,
    pub textures: usize,
    pub render_targets: usize,
    pub render_targets_created: usize,
    pub framebuffer_binds: usize,
    pub draws: usize,
    pub presents: usize,
}

struct SoftProgram {
    kernel: Kernel,
    attribs: HashMap<String, u32>,
    uniforms: HashMap<String, u32>,
    values: HashMap<u32, UniformValue>,
}

impl fmt::Debug for SoftProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftProgram")
            .field("attribs", &self.attribs)
            .field("uniforms", &self.uniforms)
            .field("values", &self.values)
            .finish_non_exhaustive()
    }
}

/// What a kernel sees for one fragment.
pub struct Fragment<'a> {
    tex_coord: [f32; 2],
    tex_coord2: [f32; 2],
    program: &'a SoftProgram,
    units: &'a [Option<TextureId>; TEXTURE_UNITS],
    textures: &'a HashMap<TextureId, RgbaImage>,
}

impl fmt::Debug for Fragment<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fragment")
            .field("tex_coord", &self.tex_coord)
            .field("tex_coord2", &self.tex_coord2)
            .finish_non_exhaustive()
    }
}

impl Fragment<'_> {
    pub fn tex_coord(&self) -> [f32; 2] {
        self.tex_coord
    }

    pub fn tex_coord2(&self) -> [f32; 2] {
        self.tex_coord2
    }

    fn value(&self, name: &str) -> Option<&UniformValue> {
        let loc = self.program.uniforms.get(name)?;
        self.program.values.get(loc)
    }

    /// Float uniform by name. Unset uniforms read as zero, as in GL.
    pub fn float(&self, name: &str) -> f32 {
        self.value(name).and_then(UniformValue::as_float).unwrap_or(0.0)
    }

    /// Samples the texture on the unit named by sampler uniform `sampler`.
    ///
    /// An empty unit reads as opaque black.
    pub fn sample(&self, sampler: &str, uv: [f32; 2]) -> [f32; 4] {
        let unit = match self.value(sampler) {
            Some(UniformValue::Int(unit)) => *unit,
            _ => 0,
        };
        let texture = usize::try_from(unit)
            .ok()
            .and_then(|u| self.units.get(u).copied().flatten())
            .and_then(|id| self.textures.get(&id));
        match texture {
            Some(texture) => raster::sample_linear(texture, uv),
            None => [0.0, 0.0, 0.0, 1.0],
        }
    }
}

/// Software implementation of [`Gpu`].
///
/// The visible surface and every texture are stored with row 0 at the bottom.
pub struct SoftGpu {
    kernels: HashMap<String, Kernel>,
    programs: BTreeMap<ProgramId, SoftProgram>,
    current: Option<ProgramId>,
    textures: HashMap<TextureId, RgbaImage>,
    framebuffers: HashMap<FramebufferId, TextureId>,
    surface: RgbaImage,
    surface_target: Option<FramebufferId>,
    bound: Option<FramebufferId>,
    units: [Option<TextureId>; TEXTURE_UNITS],
    arrays: HashMap<u32, Quad>,
    viewport: [i32; 4],
    errors: Vec<u32>,
    uniform_writes: Vec<(String, UniformValue)>,
    next_id: u32,
    max_texture_size: i32,
    render_target_budget: Option<usize>,
    stats: SoftStats,
}

impl fmt::Debug for SoftGpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftGpu")
            .field("kernels", &self.kernels.len())
            .field("programs", &self.programs)
            .field("surface", &self.surface.dimensions())
            .field("surface_target", &self.surface_target)
            .field("bound", &self.bound)
            .field("viewport", &self.viewport)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl SoftGpu {
    pub fn new(width: u32, height: u32) -> Self {
        let kernels = kernels::BUILTIN
            .iter()
            .map(|(source, kernel)| (source.to_string(), *kernel))
            .collect();
        Self {
            kernels,
            programs: BTreeMap::new(),
            current: None,
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            surface: RgbaImage::new(width, height),
            surface_target: None,
            bound: None,
            units: [None; TEXTURE_UNITS],
            arrays: HashMap::new(),
            viewport: [0, 0, width as i32, height as i32],
            errors: Vec::new(),
            uniform_writes: Vec::new(),
            next_id: 0,
            max_texture_size: DEFAULT_MAX_TEXTURE_SIZE,
            render_target_budget: None,
            stats: SoftStats::default(),
        }
    }

    pub fn with_max_texture_size(mut self, size: i32) -> Self {
        self.max_texture_size = size;
        self
    }

    /// Make render target creation fail once `budget` targets are live.
    pub fn with_render_target_budget(mut self, budget: usize) -> Self {
        self.render_target_budget = Some(budget);
        self
    }

    /// Makes `fragment` compilable, evaluated by `kernel`.
    pub fn register_kernel(&mut self, fragment: impl Into<String>, kernel: Kernel) {
        self.kernels.insert(fragment.into(), kernel);
    }

    pub fn stats(&self) -> SoftStats {
        SoftStats {
            programs: self.programs.len(),
            textures: self.textures.len(),
            render_targets: self.framebuffers.len(),
            ..self.stats
        }
    }

    /// Current value of a uniform in a linked program.
    pub fn uniform_value(&self, program: ProgramId, name: &str) -> Option<&UniformValue> {
        let program = self.programs.get(&program)?;
        program.values.get(program.uniforms.get(name)?)
    }

    /// Every successful uniform write since the last call, by name, in call order.
    pub fn take_uniform_writes(&mut self) -> Vec<(String, UniformValue)> {
        std::mem::take(&mut self.uniform_writes)
    }

    pub fn surface_size(&self) -> (u32, u32) {
        self.surface.dimensions()
    }

    /// The visible surface, top row first.
    pub fn surface_image(&self) -> RgbaImage {
        image::imageops::flip_vertical(&self.surface)
    }

    /// Texture contents, top row first.
    pub fn texture_image(&self, texture: TextureId) -> Option<RgbaImage> {
        self.textures.get(&texture).map(|t| image::imageops::flip_vertical(t))
    }

    /// Reallocates the visible surface, as a window resize does. Contents are cleared.
    pub fn resize_surface(&mut self, width: u32, height: u32) {
        self.surface = RgbaImage::new(width, height);
    }

    fn id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn error(&mut self, code: u32) {
        self.errors.push(code);
    }

    fn target(&self) -> Option<&RgbaImage> {
        match self.bound {
            None => Some(&self.surface),
            Some(fbo) => self.textures.get(self.framebuffers.get(&fbo)?),
        }
    }

    fn target_mut(&mut self) -> Option<&mut RgbaImage> {
        match self.bound {
            None => Some(&mut self.surface),
            Some(fbo) => {
                let texture = *self.framebuffers.get(&fbo)?;
                self.textures.get_mut(&texture)
            }
        }
    }

    /// Pixels covered by the viewport and the target, clipped.
    fn covered(&self) -> Option<(u32, u32, u32, u32)> {
        let target = self.target()?;
        let [x, y, w, h] = self.viewport;
        let x0 = x.max(0) as u32;
        let y0 = y.max(0) as u32;
        let x1 = (x.saturating_add(w)).clamp(0, target.width() as i32) as u32;
        let y1 = (y.saturating_add(h)).clamp(0, target.height() as i32) as u32;
        (x0 < x1 && y0 < y1).then_some((x0, y0, x1, y1))
    }

    fn shade(&self, program: &SoftProgram, positions: &Quad) -> Vec<(u32, u32, Rgba<u8>)> {
        let Some((x0, y0, x1, y1)) = self.covered() else {
            return Vec::new();
        };
        let array = |name: &str| program.attribs.get(name).and_then(|loc| self.arrays.get(loc));
        let tex_coords = array(ATTR_TEXTURE_COORDINATE);
        let tex_coords2 = array(ATTR_TEXTURE_COORDINATE_2);
        let [vx, vy, vw, vh] = self.viewport;

        let mut out = Vec::with_capacity(((x1 - x0) * (y1 - y0)) as usize);
        for py in y0..y1 {
            for px in x0..x1 {
                let ndc = [
                    (px as f32 + 0.5 - vx as f32) / vw as f32 * 2.0 - 1.0,
                    (py as f32 + 0.5 - vy as f32) / vh as f32 * 2.0 - 1.0,
                ];
                let Some(st) = raster::quad_params(positions, ndc) else {
                    continue;
                };
                let frag = Fragment {
                    tex_coord: tex_coords.map_or([0.0; 2], |q| raster::interpolate(q, st)),
                    tex_coord2: tex_coords2.map_or([0.0; 2], |q| raster::interpolate(q, st)),
                    program,
                    units: &self.units,
                    textures: &self.textures,
                };
                out.push((px, py, Rgba(raster::to_unorm8((program.kernel)(&frag)))));
            }
        }
        out
    }
}

impl Gpu for SoftGpu {
    fn create_program(&mut self, vertex: &str, fragment: &str) -> Result<ProgramId, EngineError> {
        if vertex.trim().is_empty() {
            return Err(EngineError::VertexCompile("empty vertex shader".into()));
        }
        let Some(kernel) = self.kernels.get(fragment).copied() else {
            return Err(EngineError::FragmentCompile(
                "no kernel registered for fragment shader".into(),
            ));
        };
        if !vertex.contains("gl_Position") {
            return Err(EngineError::Link("vertex shader never writes gl_Position".into()));
        }

        let attribs = shader::declared(vertex, "attribute")
            .into_iter()
            .enumerate()
            .map(|(i, name)| (name.to_string(), i as u32))
            .collect();
        let mut uniforms = HashMap::new();
        for name in shader::declared(vertex, "uniform")
            .into_iter()
            .chain(shader::declared(fragment, "uniform"))
        {
            let next = uniforms.len() as u32;
            uniforms.entry(name.to_string()).or_insert(next);
        }

        let id = ProgramId(self.id());
        self.programs.insert(
            id,
            SoftProgram {
                kernel,
                attribs,
                uniforms,
                values: HashMap::new(),
            },
        );
        Ok(id)
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        if self.current == Some(program) {
            self.current = None;
        }
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        match program {
            Some(id) if !self.programs.contains_key(&id) => self.error(GL_INVALID_VALUE),
            _ => self.current = program,
        }
    }

    fn attrib_location(&mut self, program: ProgramId, name: &str) -> Option<AttribLocation> {
        let program = self.programs.get(&program)?;
        program.attribs.get(name).copied().map(AttribLocation)
    }

    fn uniform_location(&mut self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        let program = self.programs.get(&program)?;
        program.uniforms.get(name).copied().map(UniformLocation)
    }

    fn set_uniform(&mut self, location: UniformLocation, value: &UniformValue) {
        let Some(program) = self.current.and_then(|id| self.programs.get_mut(&id)) else {
            self.error(GL_INVALID_OPERATION);
            return;
        };
        let name = program
            .uniforms
            .iter()
            .find(|(_, loc)| **loc == location.0)
            .map(|(name, _)| name.clone());
        match name {
            Some(name) => {
                program.values.insert(location.0, value.clone());
                self.uniform_writes.push((name, value.clone()));
            }
            None => self.error(GL_INVALID_OPERATION),
        }
    }

    fn upload_texture(
        &mut self,
        image: &RgbaImage,
        reuse: Option<TextureId>,
    ) -> Result<TextureId, EngineError> {
        let (w, h) = image.dimensions();
        if w as i32 > self.max_texture_size || h as i32 > self.max_texture_size {
            self.error(GL_INVALID_VALUE);
            return Err(EngineError::GlCreate(format!(
                "texture {w}x{h} exceeds max size {}",
                self.max_texture_size
            )));
        }
        if let Some(id) = reuse {
            if self.textures.get(&id).map(RgbaImage::dimensions) != Some((w, h)) {
                self.error(GL_INVALID_OPERATION);
                return Err(EngineError::other(format!(
                    "texture {} cannot be updated with a {w}x{h} image",
                    id.0
                )));
            }
            if let Some(existing) = self.textures.get_mut(&id) {
                existing.copy_from_slice(image);
            }
            return Ok(id);
        }
        let id = TextureId(self.id());
        self.textures.insert(id, image.clone());
        Ok(id)
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture);
        for unit in &mut self.units {
            if *unit == Some(texture) {
                *unit = None;
            }
        }
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>) {
        match self.units.get_mut(unit as usize) {
            Some(slot) => *slot = texture,
            None => self.error(GL_INVALID_ENUM),
        }
    }

    fn create_render_target(&mut self, w: i32, h: i32) -> Result<RenderTarget, EngineError> {
        if w <= 0 || h <= 0 || w > self.max_texture_size || h > self.max_texture_size {
            self.error(GL_INVALID_VALUE);
            return Err(EngineError::GlCreate(format!("render target {w}x{h}")));
        }
        if let Some(budget) = self.render_target_budget {
            if self.framebuffers.len() >= budget {
                self.error(GL_OUT_OF_MEMORY);
                return Err(EngineError::GlCreate("render target budget exhausted".into()));
            }
        }
        let tex = TextureId(self.id());
        self.textures.insert(tex, RgbaImage::new(w as u32, h as u32));
        let fbo = FramebufferId(self.id());
        self.framebuffers.insert(fbo, tex);
        self.stats.render_targets_created += 1;
        Ok(RenderTarget { fbo, tex, w, h })
    }

    fn delete_render_target(&mut self, target: RenderTarget) {
        self.framebuffers.remove(&target.fbo);
        self.delete_texture(target.tex);
        if self.bound == Some(target.fbo) {
            self.bound = None;
        }
        if self.surface_target == Some(target.fbo) {
            self.surface_target = None;
        }
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        let resolved = framebuffer.or(self.surface_target);
        match resolved {
            Some(fbo) if !self.framebuffers.contains_key(&fbo) => {
                self.error(GL_INVALID_OPERATION);
            }
            _ => {
                self.bound = resolved;
                self.stats.framebuffer_binds += 1;
            }
        }
    }

    fn set_surface_target(&mut self, framebuffer: Option<FramebufferId>) {
        self.surface_target = framebuffer;
    }

    fn viewport(&mut self, x: i32, y: i32, w: i32, h: i32) {
        if w < 0 || h < 0 {
            self.error(GL_INVALID_VALUE);
            return;
        }
        self.viewport = [x, y, w, h];
    }

    fn clear(&mut self, rgba: [f32; 4]) {
        let color = Rgba(raster::to_unorm8(rgba));
        if let Some(target) = self.target_mut() {
            for pixel in target.pixels_mut() {
                *pixel = color;
            }
        }
    }

    fn enable_vertex_attrib(&mut self, location: AttribLocation, data: &Quad) {
        self.arrays.insert(location.0, *data);
    }

    fn disable_vertex_attrib(&mut self, location: AttribLocation) {
        self.arrays.remove(&location.0);
    }

    fn draw_quad(&mut self) {
        let Some(program) = self.current.and_then(|id| self.programs.get(&id)) else {
            self.error(GL_INVALID_OPERATION);
            return;
        };
        let positions = program
            .attribs
            .get(ATTR_POSITION)
            .and_then(|loc| self.arrays.get(loc))
            .copied();
        let Some(positions) = positions else {
            tracing::trace!("draw without a position array");
            self.stats.draws += 1;
            return;
        };
        let shaded = self.shade(program, &positions);
        self.stats.draws += 1;
        if let Some(target) = self.target_mut() {
            for (x, y, color) in shaded {
                target.put_pixel(x, y, color);
            }
        }
    }

    fn read_pixels(&mut self, w: i32, h: i32) -> Result<Vec<u8>, EngineError> {
        let Some(target) = self.target() else {
            return Err(EngineError::other("no framebuffer bound for readback"));
        };
        if w <= 0 || h <= 0 || w as u32 > target.width() || h as u32 > target.height() {
            self.error(GL_INVALID_VALUE);
            return Err(EngineError::other(format!("readback {w}x{h} out of bounds")));
        }
        let mut out = Vec::with_capacity((w * h * 4) as usize);
        for y in 0..h as u32 {
            for x in 0..w as u32 {
                out.extend_from_slice(&target.get_pixel(x, y).0);
            }
        }
        Ok(out)
    }

    fn take_errors(&mut self) -> Vec<u32> {
        std::mem::take(&mut self.errors)
    }

    fn max_texture_size(&mut self) -> i32 {
        self.max_texture_size
    }

    fn present(&mut self) {
        self.stats.presents += 1;
    }
}
