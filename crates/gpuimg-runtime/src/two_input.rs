//! Filters sampling a second, independently loaded image (blend modes).

use std::borrow::Cow;
use std::sync::Arc;

use gpuimg_core::{texture_coords, EngineError, FilterKind, Quad, Rotation};
use image::RgbaImage;

use crate::filter::{Filter, ShaderFilter};
use crate::gpu::{AttribLocation, Gpu, TextureId, UniformLocation, UniformValue};
use crate::queue::{Command, CommandSender};

pub const ATTR_TEXTURE_COORDINATE_2: &str = "inputTextureCoordinate2";
pub const UNIFORM_INPUT_TEXTURE_2: &str = "inputImageTexture2";

/// Texture unit of the second image. Units 1 and 2 stay free for custom filters.
pub const SECOND_TEXTURE_UNIT: u32 = 3;

pub const TWO_INPUT_VERTEX_SHADER: &str = "\
attribute vec4 position;
attribute vec4 inputTextureCoordinate;
attribute vec4 inputTextureCoordinate2;

varying vec2 textureCoordinate;
varying vec2 textureCoordinate2;

void main()
{
    gl_Position = position;
    textureCoordinate = inputTextureCoordinate.xy;
    textureCoordinate2 = inputTextureCoordinate2.xy;
}
";

#[derive(Debug)]
struct SecondInput {
    image: Option<Arc<RgbaImage>>,
    texture: Option<TextureId>,
    coords: Quad,
    attrib: Option<AttribLocation>,
    sampler: Option<UniformLocation>,
}

impl SecondInput {
    /// Releases the previous texture before uploading the replacement.
    fn replace(&mut self, gpu: &mut dyn Gpu, image: Arc<RgbaImage>) {
        if let Some(old) = self.texture.take() {
            gpu.delete_texture(old);
        }
        self.upload(gpu, image);
    }

    fn upload(&mut self, gpu: &mut dyn Gpu, image: Arc<RgbaImage>) {
        match gpu.upload_texture(&image, None) {
            Ok(texture) => self.texture = Some(texture),
            Err(e) => tracing::warn!(error = %e, "second input upload failed"),
        }
        self.image = Some(image);
    }

    fn bind(&self, gpu: &mut dyn Gpu) -> Option<AttribLocation> {
        let attrib = self.attrib?;
        gpu.enable_vertex_attrib(attrib, &self.coords);
        gpu.bind_texture(SECOND_TEXTURE_UNIT, self.texture);
        if let Some(sampler) = self.sampler {
            gpu.set_uniform(sampler, &UniformValue::Int(SECOND_TEXTURE_UNIT as i32));
        }
        Some(attrib)
    }
}

/// A shader filter with a second sampler and texture-coordinate stream.
#[derive(Debug)]
pub struct TwoInputFilter {
    base: ShaderFilter,
    second: SecondInput,
}

impl TwoInputFilter {
    pub fn new(kind: FilterKind, fragment: impl Into<Cow<'static, str>>) -> Self {
        Self::with_shaders(kind, TWO_INPUT_VERTEX_SHADER, fragment)
    }

    pub fn with_shaders(
        kind: FilterKind,
        vertex: impl Into<Cow<'static, str>>,
        fragment: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            base: ShaderFilter::new(kind, vertex, fragment),
            second: SecondInput {
                image: None,
                texture: None,
                coords: texture_coords(Rotation::Normal, false, false),
                attrib: None,
                sampler: None,
            },
        }
    }

    pub fn with_uniform(mut self, name: impl Into<String>, value: UniformValue) -> Self {
        self.base = self.base.with_uniform(name, value);
        self
    }

    pub fn with_image(mut self, image: RgbaImage) -> Self {
        self.set_image(image);
        self
    }

    /// Orientation of the second image, independent of the primary input.
    pub fn set_rotation(&mut self, rotation: Rotation, flip_horizontal: bool, flip_vertical: bool) {
        self.second.coords = texture_coords(rotation, flip_horizontal, flip_vertical);
    }

    /// Keep `image` as the second input. Uploading happens on the render thread: at the next
    /// draw when initialized, otherwise during `init`.
    pub fn set_image(&mut self, image: RgbaImage) {
        let image = Arc::new(image);
        if self.base.is_initialized() {
            self.base.sender().send(Command::Image(image));
        } else {
            self.second.image = Some(image);
        }
    }

    pub fn image(&self) -> Option<&RgbaImage> {
        self.second.image.as_deref()
    }

    pub fn second_texture(&self) -> Option<TextureId> {
        self.second.texture
    }
}

impl Filter for TwoInputFilter {
    fn kind(&self) -> FilterKind {
        self.base.kind()
    }

    fn label(&self) -> &str {
        self.base.label()
    }

    fn init(&mut self, gpu: &mut dyn Gpu) -> Result<(), EngineError> {
        self.base.init(gpu)?;
        let Some(handle) = self.base.program().handle() else {
            return Err(EngineError::other("program missing after init"));
        };
        self.second.attrib = gpu.attrib_location(handle, ATTR_TEXTURE_COORDINATE_2);
        self.second.sampler = gpu.uniform_location(handle, UNIFORM_INPUT_TEXTURE_2);
        if self.second.texture.is_none() {
            if let Some(image) = self.second.image.clone() {
                self.second.upload(gpu, image);
            }
        }
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.base.is_initialized()
    }

    fn on_output_size_changed(&mut self, gpu: &mut dyn Gpu, w: i32, h: i32) {
        self.base.on_output_size_changed(gpu, w, h);
    }

    fn output_size(&self) -> (i32, i32) {
        self.base.output_size()
    }

    fn on_draw(
        &mut self,
        gpu: &mut dyn Gpu,
        input: Option<TextureId>,
        positions: &Quad,
        tex_coords: &Quad,
    ) {
        if !self.base.begin(gpu) {
            return;
        }
        let second = &mut self.second;
        self.base
            .apply_commands(gpu, |gpu, image| second.replace(gpu, image));
        self.base
            .draw_with(gpu, input, positions, tex_coords, |gpu, _| second.bind(gpu));
        gpu.bind_texture(SECOND_TEXTURE_UNIT, None);
    }

    fn destroy(&mut self, gpu: &mut dyn Gpu) {
        self.base.destroy(gpu);
        if let Some(texture) = self.second.texture.take() {
            gpu.delete_texture(texture);
        }
        self.second.attrib = None;
        self.second.sampler = None;
    }

    fn sender(&self) -> CommandSender {
        self.base.sender()
    }

    fn uniform(&self, name: &str) -> Option<&UniformValue> {
        self.base.uniform(name)
    }
}
