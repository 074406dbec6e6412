use std::borrow::Cow;
use std::collections::HashMap;

use gpuimg_core::EngineError;

use crate::gpu::{AttribLocation, Gpu, ProgramId, UniformLocation};

/// A vertex/fragment pair and, between `init` and `destroy`, its linked program.
///
/// Location lookups are cached per name; a cached `None` means the shader does not declare
/// (or the compiler removed) that input.
#[derive(Debug)]
pub struct ShaderProgram {
    vertex: Cow<'static, str>,
    fragment: Cow<'static, str>,
    handle: Option<ProgramId>,
    attribs: HashMap<String, Option<AttribLocation>>,
    uniforms: HashMap<String, Option<UniformLocation>>,
}

impl ShaderProgram {
    pub fn new(vertex: impl Into<Cow<'static, str>>, fragment: impl Into<Cow<'static, str>>) -> Self {
        Self {
            vertex: vertex.into(),
            fragment: fragment.into(),
            handle: None,
            attribs: HashMap::new(),
            uniforms: HashMap::new(),
        }
    }

    pub fn vertex_source(&self) -> &str {
        &self.vertex
    }

    pub fn fragment_source(&self) -> &str {
        &self.fragment
    }

    pub fn handle(&self) -> Option<ProgramId> {
        self.handle
    }

    pub fn is_linked(&self) -> bool {
        self.handle.is_some()
    }

    /// Compile and link. Calling again while linked returns the existing handle.
    pub fn init(&mut self, gpu: &mut dyn Gpu) -> Result<ProgramId, EngineError> {
        if let Some(handle) = self.handle {
            return Ok(handle);
        }
        match gpu.create_program(&self.vertex, &self.fragment) {
            Ok(handle) => {
                tracing::debug!(program = handle.0, "program linked");
                self.handle = Some(handle);
                Ok(handle)
            }
            Err(e) => {
                tracing::error!(error = %e, "shader program failed to build");
                Err(e)
            }
        }
    }

    pub fn attrib(&mut self, gpu: &mut dyn Gpu, name: &str) -> Option<AttribLocation> {
        let handle = self.handle?;
        if let Some(loc) = self.attribs.get(name) {
            return *loc;
        }
        let loc = gpu.attrib_location(handle, name);
        self.attribs.insert(name.to_string(), loc);
        loc
    }

    pub fn uniform(&mut self, gpu: &mut dyn Gpu, name: &str) -> Option<UniformLocation> {
        let handle = self.handle?;
        if let Some(loc) = self.uniforms.get(name) {
            return *loc;
        }
        let loc = gpu.uniform_location(handle, name);
        self.uniforms.insert(name.to_string(), loc);
        loc
    }

    /// Deletes the program. Safe to call repeatedly; only the first call reaches the backend.
    pub fn destroy(&mut self, gpu: &mut dyn Gpu) {
        if let Some(handle) = self.handle.take() {
            gpu.delete_program(handle);
            tracing::debug!(program = handle.0, "program deleted");
        }
        self.attribs.clear();
        self.uniforms.clear();
    }
}
