//! The renderer: input texture, output surface, scaling geometry and the active filter.

use std::collections::VecDeque;
use std::mem;
use std::sync::Arc;

use gpuimg_core::{texture_coords, EngineConfig, EngineError, Quad, Rotation, ScaleType, CUBE};
use image::RgbaImage;

use crate::filter::{Filter, ShaderFilter};
use crate::gpu::{Gpu, TextureId};

/// Quad positions and texture coordinates for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameGeometry {
    pub positions: Quad,
    pub tex_coords: Quad,
}

impl Default for FrameGeometry {
    fn default() -> Self {
        Self {
            positions: CUBE,
            tex_coords: texture_coords(Rotation::Normal, false, false),
        }
    }
}

impl FrameGeometry {
    /// Fit an `image`-sized input into `output`.
    ///
    /// Center-crop pulls texture coordinates toward the center; center-inside shrinks the quad.
    /// Quarter turns swap the output axes before the ratios are taken.
    pub fn fit(
        output: (i32, i32),
        image: (u32, u32),
        rotation: Rotation,
        flip_horizontal: bool,
        flip_vertical: bool,
        scale_type: ScaleType,
    ) -> Self {
        let tex_coords = texture_coords(rotation, flip_horizontal, flip_vertical);
        if output.0 <= 0 || output.1 <= 0 || image.0 == 0 || image.1 == 0 {
            return Self {
                positions: CUBE,
                tex_coords,
            };
        }

        let (mut out_w, mut out_h) = (output.0 as f32, output.1 as f32);
        if rotation.is_quarter_turn() {
            mem::swap(&mut out_w, &mut out_h);
        }
        let (img_w, img_h) = (image.0 as f32, image.1 as f32);
        let ratio_max = (out_w / img_w).max(out_h / img_h);
        let ratio_w = (img_w * ratio_max).round() / out_w;
        let ratio_h = (img_h * ratio_max).round() / out_h;

        match scale_type {
            ScaleType::CenterCrop => {
                let dist_h = (1.0 - 1.0 / ratio_w) / 2.0;
                let dist_v = (1.0 - 1.0 / ratio_h) / 2.0;
                let mut cropped = tex_coords;
                for (i, c) in cropped.iter_mut().enumerate() {
                    let dist = if i % 2 == 0 { dist_h } else { dist_v };
                    *c = add_distance(*c, dist);
                }
                Self {
                    positions: CUBE,
                    tex_coords: cropped,
                }
            }
            ScaleType::CenterInside => {
                let mut positions = CUBE;
                for (i, p) in positions.iter_mut().enumerate() {
                    *p /= if i % 2 == 0 { ratio_h } else { ratio_w };
                }
                Self {
                    positions,
                    tex_coords,
                }
            }
        }
    }
}

fn add_distance(coord: f32, distance: f32) -> f32 {
    if coord == 0.0 {
        distance
    } else {
        1.0 - distance
    }
}

/// Work queued for the render thread, applied at the start (or end) of the next frame.
#[derive(Debug)]
pub enum RendererCommand {
    /// Destroy the current filter, then init the new one at the current output size.
    SetFilter(Box<dyn Filter>),
    SetImage(Arc<RgbaImage>),
    /// A live-source frame; updates the input texture in place when the size is unchanged.
    PushFrame(RgbaImage),
    DeleteImage,
    SetRotation {
        rotation: Rotation,
        flip_horizontal: bool,
        flip_vertical: bool,
    },
    SetScaleType(ScaleType),
    SetBackground([f32; 3]),
}

#[derive(Debug, Clone, Copy)]
struct InputTexture {
    id: TextureId,
    w: u32,
    h: u32,
}

/// Draws the active filter over the input texture into the current surface target.
#[derive(Debug)]
pub struct Renderer {
    filter: Box<dyn Filter>,
    input: Option<InputTexture>,
    output: (i32, i32),
    rotation: Rotation,
    flip_horizontal: bool,
    flip_vertical: bool,
    scale_type: ScaleType,
    background: [f32; 3],
    geometry: FrameGeometry,
    run_on_draw: VecDeque<RendererCommand>,
    run_on_draw_end: VecDeque<RendererCommand>,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(Box::new(ShaderFilter::passthrough()))
    }
}

impl Renderer {
    pub fn new(filter: Box<dyn Filter>) -> Self {
        Self {
            filter,
            input: None,
            output: (0, 0),
            rotation: Rotation::Normal,
            flip_horizontal: false,
            flip_vertical: false,
            scale_type: ScaleType::default(),
            background: [0.0, 0.0, 0.0],
            geometry: FrameGeometry::default(),
            run_on_draw: VecDeque::new(),
            run_on_draw_end: VecDeque::new(),
        }
    }

    pub fn with_config(mut self, config: &EngineConfig) -> Self {
        self.background = config.background;
        self.scale_type = config.scale_type;
        self
    }

    // ---- Surface lifecycle (render thread) ----

    pub fn on_surface_created(&mut self, gpu: &mut dyn Gpu) -> Result<(), EngineError> {
        self.filter.init(gpu)
    }

    pub fn on_surface_changed(&mut self, gpu: &mut dyn Gpu, w: i32, h: i32) {
        self.output = (w, h);
        gpu.viewport(0, 0, w, h);
        self.filter.on_output_size_changed(gpu, w, h);
        self.adjust_image_scaling();
    }

    pub fn on_draw_frame(&mut self, gpu: &mut dyn Gpu) {
        gpu.bind_framebuffer(None);
        self.clear(gpu);
        self.run_pending(gpu);
        self.filter.on_draw(
            gpu,
            self.input.map(|t| t.id),
            &self.geometry.positions,
            &self.geometry.tex_coords,
        );
        while let Some(command) = self.run_on_draw_end.pop_front() {
            self.apply(gpu, command);
        }
    }

    pub fn destroy(&mut self, gpu: &mut dyn Gpu) {
        self.filter.destroy(gpu);
        if let Some(input) = self.input.take() {
            gpu.delete_texture(input.id);
        }
    }

    // ---- Deferred state (any order, applied on the next frame) ----

    pub fn run_on_draw(&mut self, command: RendererCommand) {
        self.run_on_draw.push_back(command);
    }

    pub fn run_on_draw_end(&mut self, command: RendererCommand) {
        self.run_on_draw_end.push_back(command);
    }

    pub fn set_filter(&mut self, filter: Box<dyn Filter>) {
        self.run_on_draw(RendererCommand::SetFilter(filter));
    }

    pub fn set_image(&mut self, image: RgbaImage) {
        self.run_on_draw(RendererCommand::SetImage(Arc::new(image)));
    }

    pub fn push_frame(&mut self, frame: RgbaImage) {
        self.run_on_draw(RendererCommand::PushFrame(frame));
    }

    pub fn delete_image(&mut self) {
        self.run_on_draw(RendererCommand::DeleteImage);
    }

    // ---- Immediate CPU-side state ----

    pub fn set_rotation(&mut self, rotation: Rotation, flip_horizontal: bool, flip_vertical: bool) {
        self.rotation = rotation;
        self.flip_horizontal = flip_horizontal;
        self.flip_vertical = flip_vertical;
        self.adjust_image_scaling();
    }

    pub fn set_scale_type(&mut self, scale_type: ScaleType) {
        self.scale_type = scale_type;
        self.adjust_image_scaling();
    }

    pub fn set_background_color(&mut self, rgb: [f32; 3]) {
        self.background = rgb;
    }

    pub fn filter(&self) -> &dyn Filter {
        self.filter.as_ref()
    }

    pub fn filter_mut(&mut self) -> &mut dyn Filter {
        self.filter.as_mut()
    }

    pub fn geometry(&self) -> &FrameGeometry {
        &self.geometry
    }

    pub fn output_size(&self) -> (i32, i32) {
        self.output
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn is_flipped_horizontally(&self) -> bool {
        self.flip_horizontal
    }

    pub fn is_flipped_vertically(&self) -> bool {
        self.flip_vertical
    }

    pub fn scale_type(&self) -> ScaleType {
        self.scale_type
    }

    pub fn background(&self) -> [f32; 3] {
        self.background
    }

    pub fn input_texture(&self) -> Option<TextureId> {
        self.input.map(|t| t.id)
    }

    pub fn input_size(&self) -> Option<(u32, u32)> {
        self.input.map(|t| (t.w, t.h))
    }

    // ---- Internals ----

    pub(crate) fn clear(&self, gpu: &mut dyn Gpu) {
        let [r, g, b] = self.background;
        gpu.clear([r, g, b, 1.0]);
    }

    pub(crate) fn run_pending(&mut self, gpu: &mut dyn Gpu) {
        while let Some(command) = self.run_on_draw.pop_front() {
            self.apply(gpu, command);
        }
    }

    fn apply(&mut self, gpu: &mut dyn Gpu, command: RendererCommand) {
        match command {
            RendererCommand::SetFilter(filter) => {
                let mut old = mem::replace(&mut self.filter, filter);
                old.destroy(gpu);
                if let Err(e) = self.filter.init(gpu) {
                    tracing::error!(filter = self.filter.label(), error = %e, "filter init failed");
                }
                let (w, h) = self.output;
                self.filter.on_output_size_changed(gpu, w, h);
            }
            RendererCommand::SetImage(image) => self.upload_input(gpu, &image),
            RendererCommand::PushFrame(frame) => self.upload_input(gpu, &frame),
            RendererCommand::DeleteImage => {
                if let Some(input) = self.input.take() {
                    gpu.delete_texture(input.id);
                }
            }
            RendererCommand::SetRotation {
                rotation,
                flip_horizontal,
                flip_vertical,
            } => self.set_rotation(rotation, flip_horizontal, flip_vertical),
            RendererCommand::SetScaleType(scale_type) => self.set_scale_type(scale_type),
            RendererCommand::SetBackground(rgb) => self.set_background_color(rgb),
        }
    }

    fn upload_input(&mut self, gpu: &mut dyn Gpu, image: &RgbaImage) {
        let (w, h) = image.dimensions();
        let reuse = self.input.filter(|t| t.w == w && t.h == h).map(|t| t.id);
        if reuse.is_none() {
            if let Some(old) = self.input.take() {
                gpu.delete_texture(old.id);
            }
        }
        match gpu.upload_texture(image, reuse) {
            Ok(id) => self.input = Some(InputTexture { id, w, h }),
            Err(e) => {
                tracing::warn!(error = %e, w, h, "input upload failed");
                self.input = None;
            }
        }
        self.adjust_image_scaling();
    }

    fn adjust_image_scaling(&mut self) {
        let image = self.input.map(|t| (t.w, t.h)).unwrap_or((0, 0));
        self.geometry = FrameGeometry::fit(
            self.output,
            image,
            self.rotation,
            self.flip_horizontal,
            self.flip_vertical,
            self.scale_type,
        );
    }
}
