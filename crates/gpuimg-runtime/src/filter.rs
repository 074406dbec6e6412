//! The filter contract and the single-program shader filter.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use gpuimg_core::{EngineError, FilterKind, Quad};
use image::RgbaImage;

use crate::gpu::{AttribLocation, Gpu, TextureId, UniformLocation, UniformValue};
use crate::group::FilterGroup;
use crate::program::ShaderProgram;
use crate::queue::{Command, CommandQueue, CommandSender};

pub const ATTR_POSITION: &str = "position";
pub const ATTR_TEXTURE_COORDINATE: &str = "inputTextureCoordinate";
pub const UNIFORM_INPUT_TEXTURE: &str = "inputImageTexture";

/// Texture unit the primary input is bound to.
pub const INPUT_TEXTURE_UNIT: u32 = 0;

pub const NO_FILTER_VERTEX_SHADER: &str = "\
attribute vec4 position;
attribute vec4 inputTextureCoordinate;

varying vec2 textureCoordinate;

void main()
{
    gl_Position = position;
    textureCoordinate = inputTextureCoordinate.xy;
}
";

pub const NO_FILTER_FRAGMENT_SHADER: &str = "\
varying highp vec2 textureCoordinate;

uniform sampler2D inputImageTexture;

void main()
{
    gl_FragColor = texture2D(inputImageTexture, textureCoordinate);
}
";

/// One node of a filter tree.
///
/// All methods taking a [`Gpu`] run on the render thread. Other threads talk to a filter only
/// through its [`CommandSender`].
pub trait Filter: Send + fmt::Debug {
    fn kind(&self) -> FilterKind;

    fn label(&self) -> &str {
        self.kind().label()
    }

    /// Build GPU resources. A failure leaves the filter uninitialized and its draws no-ops.
    fn init(&mut self, gpu: &mut dyn Gpu) -> Result<(), EngineError>;

    fn is_initialized(&self) -> bool;

    /// Record the output size and re-derive size-dependent uniforms.
    fn on_output_size_changed(&mut self, gpu: &mut dyn Gpu, w: i32, h: i32);

    fn output_size(&self) -> (i32, i32);

    /// Per-frame housekeeping run on every node of a tree before its flattened passes draw.
    fn prepare(&mut self, _gpu: &mut dyn Gpu) {}

    /// Draw `input` into whatever framebuffer is bound. No-op when not initialized.
    fn on_draw(
        &mut self,
        gpu: &mut dyn Gpu,
        input: Option<TextureId>,
        positions: &Quad,
        tex_coords: &Quad,
    );

    /// Release GPU resources. Repeated calls are harmless.
    fn destroy(&mut self, gpu: &mut dyn Gpu);

    /// Handle for deferred state changes from any thread.
    fn sender(&self) -> CommandSender;

    /// Last value applied (or preset) for a uniform, if this filter tracks it.
    fn uniform(&self, _name: &str) -> Option<&UniformValue> {
        None
    }

    /// Groups expose their children so enclosing groups can flatten them.
    fn as_group(&self) -> Option<&FilterGroup> {
        None
    }

    fn as_group_mut(&mut self) -> Option<&mut FilterGroup> {
        None
    }
}

// -------------------------------------------------------------------------------------------------
// ShaderFilter
// -------------------------------------------------------------------------------------------------

/// A filter made of one shader program and its uniform state.
///
/// Concrete effects are `ShaderFilter`s with their own sources and preset uniforms.
#[derive(Debug)]
pub struct ShaderFilter {
    kind: FilterKind,
    label: Option<String>,
    program: ShaderProgram,
    position: Option<AttribLocation>,
    tex_coord: Option<AttribLocation>,
    input_sampler: Option<UniformLocation>,
    uniforms: BTreeMap<String, UniformValue>,
    queue: CommandQueue,
    output: (i32, i32),
    initialized: bool,
}

impl ShaderFilter {
    pub fn new(
        kind: FilterKind,
        vertex: impl Into<Cow<'static, str>>,
        fragment: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            kind,
            label: None,
            program: ShaderProgram::new(vertex, fragment),
            position: None,
            tex_coord: None,
            input_sampler: None,
            uniforms: BTreeMap::new(),
            queue: CommandQueue::new(),
            output: (0, 0),
            initialized: false,
        }
    }

    /// Copies its input unchanged.
    pub fn passthrough() -> Self {
        Self::new(
            FilterKind::Passthrough,
            NO_FILTER_VERTEX_SHADER,
            NO_FILTER_FRAGMENT_SHADER,
        )
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Preset a uniform; written to the GPU on every (re)initialization.
    pub fn with_uniform(mut self, name: impl Into<String>, value: UniformValue) -> Self {
        self.uniforms.insert(name.into(), value);
        self
    }

    pub fn program(&self) -> &ShaderProgram {
        &self.program
    }

    pub fn set_uniform(&self, name: impl Into<Cow<'static, str>>, value: UniformValue) {
        self.queue.push(Command::Uniform {
            name: name.into(),
            value,
        });
    }

    pub fn set_float(&self, name: impl Into<Cow<'static, str>>, value: f32) {
        self.set_uniform(name, UniformValue::Float(value));
    }

    /// Binds the program when the filter is drawable.
    pub(crate) fn begin(&mut self, gpu: &mut dyn Gpu) -> bool {
        match self.program.handle() {
            Some(handle) if self.initialized => {
                gpu.use_program(Some(handle));
                true
            }
            _ => false,
        }
    }

    /// Drains the queue. Uniform and param commands are applied here; images go to `on_image`.
    pub(crate) fn apply_commands(
        &mut self,
        gpu: &mut dyn Gpu,
        mut on_image: impl FnMut(&mut dyn Gpu, Arc<RgbaImage>),
    ) {
        for command in self.queue.drain() {
            match command {
                Command::Uniform { name, value } => self.apply_uniform(gpu, name, value),
                Command::Param { name, value } => {
                    self.apply_uniform(gpu, name, UniformValue::Float(value))
                }
                Command::Image(image) => on_image(gpu, image),
            }
        }
    }

    fn apply_uniform(&mut self, gpu: &mut dyn Gpu, name: Cow<'static, str>, value: UniformValue) {
        match self.program.uniform(gpu, &name) {
            Some(loc) => gpu.set_uniform(loc, &value),
            None => tracing::trace!(uniform = %name, "uniform not declared by program"),
        }
        self.uniforms.insert(name.into_owned(), value);
    }

    /// Bind geometry and input, let `bind_extra` add inputs, draw, then disable every
    /// attribute array that was enabled.
    pub(crate) fn draw_with(
        &mut self,
        gpu: &mut dyn Gpu,
        input: Option<TextureId>,
        positions: &Quad,
        tex_coords: &Quad,
        bind_extra: impl FnOnce(&mut dyn Gpu, &mut ShaderProgram) -> Option<AttribLocation>,
    ) {
        let (Some(position), Some(tex_coord)) = (self.position, self.tex_coord) else {
            tracing::warn!(filter = self.label(), "program lacks quad attributes; pass skipped");
            return;
        };

        gpu.enable_vertex_attrib(position, positions);
        gpu.enable_vertex_attrib(tex_coord, tex_coords);
        if let Some(texture) = input {
            gpu.bind_texture(INPUT_TEXTURE_UNIT, Some(texture));
            if let Some(sampler) = self.input_sampler {
                gpu.set_uniform(sampler, &UniformValue::Int(INPUT_TEXTURE_UNIT as i32));
            }
        }
        let extra = bind_extra(gpu, &mut self.program);

        gpu.draw_quad();

        gpu.disable_vertex_attrib(position);
        gpu.disable_vertex_attrib(tex_coord);
        if let Some(extra) = extra {
            gpu.disable_vertex_attrib(extra);
        }
        gpu.bind_texture(INPUT_TEXTURE_UNIT, None);
    }
}

impl Filter for ShaderFilter {
    fn kind(&self) -> FilterKind {
        self.kind
    }

    fn label(&self) -> &str {
        self.label.as_deref().unwrap_or_else(|| self.kind.label())
    }

    fn init(&mut self, gpu: &mut dyn Gpu) -> Result<(), EngineError> {
        if self.initialized {
            return Ok(());
        }
        let handle = self.program.init(gpu)?;
        self.position = self.program.attrib(gpu, ATTR_POSITION);
        self.tex_coord = self.program.attrib(gpu, ATTR_TEXTURE_COORDINATE);
        self.input_sampler = self.program.uniform(gpu, UNIFORM_INPUT_TEXTURE);

        gpu.use_program(Some(handle));
        for (name, value) in &self.uniforms {
            if let Some(loc) = self.program.uniform(gpu, name) {
                gpu.set_uniform(loc, value);
            }
        }
        self.initialized = true;
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn on_output_size_changed(&mut self, _gpu: &mut dyn Gpu, w: i32, h: i32) {
        self.output = (w, h);
    }

    fn output_size(&self) -> (i32, i32) {
        self.output
    }

    fn on_draw(
        &mut self,
        gpu: &mut dyn Gpu,
        input: Option<TextureId>,
        positions: &Quad,
        tex_coords: &Quad,
    ) {
        // Commands stay queued until the filter can draw.
        if !self.begin(gpu) {
            return;
        }
        let kind = self.kind;
        self.apply_commands(gpu, |_, _| {
            tracing::warn!(filter = kind.label(), "image command ignored: filter has one input");
        });
        self.draw_with(gpu, input, positions, tex_coords, |_, _| None);
    }

    fn destroy(&mut self, gpu: &mut dyn Gpu) {
        self.initialized = false;
        self.position = None;
        self.tex_coord = None;
        self.input_sampler = None;
        self.program.destroy(gpu);
    }

    fn sender(&self) -> CommandSender {
        self.queue.sender()
    }

    fn uniform(&self, name: &str) -> Option<&UniformValue> {
        self.uniforms.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, RecordingGpu};
    use gpuimg_core::{texture_coords, Rotation, CUBE};

    fn canonical() -> Quad {
        texture_coords(Rotation::Normal, false, false)
    }

    #[test]
    fn commands_apply_once_in_order() {
        let mut gpu = RecordingGpu::default();
        let mut filter = ShaderFilter::passthrough();
        filter.init(&mut gpu).expect("init");
        let sender = filter.sender();
        sender.set_float("u1", 1.0);
        sender.set_float("u2", 2.0);
        sender.set_float("u3", 3.0);

        gpu.calls.clear();
        filter.on_draw(&mut gpu, Some(TextureId(1)), &CUBE, &canonical());
        let writes = gpu.uniform_writes();
        assert_eq!(
            writes,
            vec![
                ("u1".to_string(), UniformValue::Float(1.0)),
                ("u2".to_string(), UniformValue::Float(2.0)),
                ("u3".to_string(), UniformValue::Float(3.0)),
                (UNIFORM_INPUT_TEXTURE.to_string(), UniformValue::Int(0)),
            ]
        );

        gpu.calls.clear();
        filter.on_draw(&mut gpu, Some(TextureId(1)), &CUBE, &canonical());
        assert_eq!(
            gpu.uniform_writes(),
            vec![(UNIFORM_INPUT_TEXTURE.to_string(), UniformValue::Int(0))]
        );
    }

    #[test]
    fn uninitialized_draw_is_a_noop_and_keeps_the_queue() {
        let mut gpu = RecordingGpu::default();
        let mut filter = ShaderFilter::passthrough();
        filter.sender().set_float("late", 0.25);

        filter.on_draw(&mut gpu, Some(TextureId(1)), &CUBE, &canonical());
        assert!(gpu.calls.is_empty());

        filter.init(&mut gpu).expect("init");
        filter.on_draw(&mut gpu, Some(TextureId(1)), &CUBE, &canonical());
        assert_eq!(filter.uniform("late"), Some(&UniformValue::Float(0.25)));
    }

    #[test]
    fn draw_leaves_no_attribute_enabled() {
        let mut gpu = RecordingGpu::default();
        let mut filter = ShaderFilter::passthrough();
        filter.init(&mut gpu).expect("init");
        filter.on_draw(&mut gpu, Some(TextureId(9)), &CUBE, &canonical());

        assert!(gpu.enabled_attribs.is_empty());
        assert_eq!(gpu.count(|c| matches!(c, Call::Draw)), 1);
    }

    #[test]
    fn preset_uniforms_are_written_at_init() {
        let mut gpu = RecordingGpu::default();
        let mut filter = ShaderFilter::passthrough().with_uniform("gain", UniformValue::Float(2.0));
        filter.init(&mut gpu).expect("init");
        assert!(gpu
            .uniform_writes()
            .contains(&("gain".to_string(), UniformValue::Float(2.0))));
    }

    #[test]
    fn compile_failure_is_surfaced_and_draws_nothing() {
        let mut gpu = RecordingGpu::default();
        let mut filter = ShaderFilter::new(
            FilterKind::Custom,
            NO_FILTER_VERTEX_SHADER,
            "#error broken\nvoid main() {}",
        );
        let err = filter.init(&mut gpu).expect_err("must fail");
        assert!(err.is_shader_error());
        assert!(!filter.is_initialized());

        gpu.calls.clear();
        filter.on_draw(&mut gpu, Some(TextureId(1)), &CUBE, &canonical());
        assert!(gpu.calls.is_empty());
    }

    #[test]
    fn destroy_deletes_program_once() {
        let mut gpu = RecordingGpu::default();
        let mut filter = ShaderFilter::passthrough();
        filter.init(&mut gpu).expect("init");
        filter.destroy(&mut gpu);
        filter.destroy(&mut gpu);
        assert_eq!(gpu.count(|c| matches!(c, Call::DeleteProgram(_))), 1);
    }
}
