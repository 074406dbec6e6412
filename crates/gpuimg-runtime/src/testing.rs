//! Call-recording backend for unit tests.

use std::collections::{BTreeSet, HashMap};

use gpuimg_core::{EngineError, Quad};
use image::RgbaImage;

use crate::gpu::{
    AttribLocation, FramebufferId, Gpu, ProgramId, RenderTarget, TextureId, UniformLocation,
    UniformValue,
};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    CreateProgram(u32),
    DeleteProgram(u32),
    UseProgram(Option<u32>),
    SetUniform(String, UniformValue),
    Upload { tex: u32, w: u32, h: u32, reuse: bool },
    DeleteTexture(u32),
    BindTexture(u32, Option<u32>),
    CreateTarget { fbo: u32, w: i32, h: i32 },
    DeleteTarget(u32),
    BindFramebuffer(Option<u32>),
    SurfaceTarget(Option<u32>),
    Viewport(i32, i32, i32, i32),
    Clear([f32; 4]),
    EnableAttrib(String, Quad),
    DisableAttrib(String),
    Draw,
    ReadPixels(i32, i32),
}

#[derive(Debug, Default)]
pub(crate) struct RecordingGpu {
    pub calls: Vec<Call>,
    pub enabled_attribs: BTreeSet<u32>,
    pub live_targets: usize,
    /// Render target creation fails once this many are live.
    pub target_budget: Option<usize>,
    /// Returned by `read_pixels` when non-empty.
    pub pixels: Vec<u8>,
    next_id: u32,
    names: Vec<String>,
    locations: HashMap<String, u32>,
}

impl RecordingGpu {
    /// Render target creation fails once `budget` targets are live.
    pub fn with_target_budget(budget: usize) -> Self {
        Self {
            target_budget: Some(budget),
            ..Self::default()
        }
    }

    /// `read_pixels` returns `pixels` verbatim.
    pub fn with_pixels(pixels: Vec<u8>) -> Self {
        Self {
            pixels,
            ..Self::default()
        }
    }

    fn id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn intern(&mut self, name: &str) -> u32 {
        if let Some(loc) = self.locations.get(name) {
            return *loc;
        }
        let loc = self.names.len() as u32;
        self.names.push(name.to_string());
        self.locations.insert(name.to_string(), loc);
        loc
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    pub fn uniform_writes(&self) -> Vec<(String, UniformValue)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::SetUniform(name, value) => Some((name.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn framebuffer_calls(&self) -> usize {
        self.count(|c| {
            matches!(
                c,
                Call::CreateTarget { .. } | Call::DeleteTarget(_) | Call::BindFramebuffer(Some(_))
            )
        })
    }
}

impl Gpu for RecordingGpu {
    fn create_program(&mut self, _vertex: &str, fragment: &str) -> Result<ProgramId, EngineError> {
        if fragment.contains("#error") {
            return Err(EngineError::FragmentCompile("0:1: #error".to_string()));
        }
        let id = self.id();
        self.calls.push(Call::CreateProgram(id));
        Ok(ProgramId(id))
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.calls.push(Call::DeleteProgram(program.0));
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        self.calls.push(Call::UseProgram(program.map(|p| p.0)));
    }

    fn attrib_location(&mut self, _program: ProgramId, name: &str) -> Option<AttribLocation> {
        Some(AttribLocation(self.intern(name)))
    }

    fn uniform_location(&mut self, _program: ProgramId, name: &str) -> Option<UniformLocation> {
        Some(UniformLocation(self.intern(name)))
    }

    fn set_uniform(&mut self, location: UniformLocation, value: &UniformValue) {
        let name = self.names[location.0 as usize].clone();
        self.calls.push(Call::SetUniform(name, value.clone()));
    }

    fn upload_texture(
        &mut self,
        image: &RgbaImage,
        reuse: Option<TextureId>,
    ) -> Result<TextureId, EngineError> {
        let tex = match reuse {
            Some(t) => t.0,
            None => self.id(),
        };
        self.calls.push(Call::Upload {
            tex,
            w: image.width(),
            h: image.height(),
            reuse: reuse.is_some(),
        });
        Ok(TextureId(tex))
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.calls.push(Call::DeleteTexture(texture.0));
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureId>) {
        self.calls.push(Call::BindTexture(unit, texture.map(|t| t.0)));
    }

    fn create_render_target(&mut self, w: i32, h: i32) -> Result<RenderTarget, EngineError> {
        if self.target_budget.is_some_and(|b| self.live_targets >= b) {
            return Err(EngineError::GlCreate("out of memory".to_string()));
        }
        let fbo = self.id();
        let tex = self.id();
        self.live_targets += 1;
        self.calls.push(Call::CreateTarget { fbo, w, h });
        Ok(RenderTarget {
            fbo: FramebufferId(fbo),
            tex: TextureId(tex),
            w,
            h,
        })
    }

    fn delete_render_target(&mut self, target: RenderTarget) {
        self.live_targets -= 1;
        self.calls.push(Call::DeleteTarget(target.fbo.0));
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) {
        self.calls.push(Call::BindFramebuffer(framebuffer.map(|f| f.0)));
    }

    fn set_surface_target(&mut self, framebuffer: Option<FramebufferId>) {
        self.calls.push(Call::SurfaceTarget(framebuffer.map(|f| f.0)));
    }

    fn viewport(&mut self, x: i32, y: i32, w: i32, h: i32) {
        self.calls.push(Call::Viewport(x, y, w, h));
    }

    fn clear(&mut self, rgba: [f32; 4]) {
        self.calls.push(Call::Clear(rgba));
    }

    fn enable_vertex_attrib(&mut self, location: AttribLocation, data: &Quad) {
        self.enabled_attribs.insert(location.0);
        let name = self.names[location.0 as usize].clone();
        self.calls.push(Call::EnableAttrib(name, *data));
    }

    fn disable_vertex_attrib(&mut self, location: AttribLocation) {
        self.enabled_attribs.remove(&location.0);
        let name = self.names[location.0 as usize].clone();
        self.calls.push(Call::DisableAttrib(name));
    }

    fn draw_quad(&mut self) {
        self.calls.push(Call::Draw);
    }

    fn read_pixels(&mut self, w: i32, h: i32) -> Result<Vec<u8>, EngineError> {
        self.calls.push(Call::ReadPixels(w, h));
        if !self.pixels.is_empty() {
            return Ok(self.pixels.clone());
        }
        Ok(vec![0; (w * h * 4) as usize])
    }

    fn take_errors(&mut self) -> Vec<u32> {
        Vec::new()
    }

    fn max_texture_size(&mut self) -> i32 {
        4096
    }
}
