//! Two-pass filters, optionally fed per-axis texel offsets for separable sampling.

use gpuimg_core::{EngineError, FilterKind, Quad};

use crate::filter::Filter;
use crate::gpu::{Gpu, TextureId};
use crate::group::FilterGroup;
use crate::queue::{Command, CommandQueue, CommandSender};

pub const TEXEL_WIDTH_OFFSET: &str = "texelWidthOffset";
pub const TEXEL_HEIGHT_OFFSET: &str = "texelHeightOffset";

/// Param setting both texel ratios.
pub const PARAM_TEXEL_RATIO: &str = "texelRatio";
pub const PARAM_HORIZONTAL_TEXEL_RATIO: &str = "horizontalTexelRatio";
pub const PARAM_VERTICAL_TEXEL_RATIO: &str = "verticalTexelRatio";

/// Multipliers applied to one texel step on each axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TexelRatio {
    pub horizontal: f32,
    pub vertical: f32,
}

impl TexelRatio {
    pub fn uniform(ratio: f32) -> Self {
        Self {
            horizontal: ratio,
            vertical: ratio,
        }
    }
}

impl Default for TexelRatio {
    fn default() -> Self {
        Self::uniform(1.0)
    }
}

/// A group of exactly two filters.
///
/// With a [`TexelRatio`], the first pass receives `horizontal / width` as
/// `texelWidthOffset` and the second `vertical / height` as `texelHeightOffset` (the other
/// offset is zero), recomputed on init, resize and ratio change.
#[derive(Debug)]
pub struct TwoPassFilter {
    kind: FilterKind,
    group: FilterGroup,
    ratio: Option<TexelRatio>,
    queue: CommandQueue,
}

impl TwoPassFilter {
    pub fn new(kind: FilterKind, first: Box<dyn Filter>, second: Box<dyn Filter>) -> Self {
        Self {
            kind,
            group: FilterGroup::with_filters(vec![first, second]),
            ratio: None,
            queue: CommandQueue::new(),
        }
    }

    pub fn texture_sampling(
        kind: FilterKind,
        first: Box<dyn Filter>,
        second: Box<dyn Filter>,
        ratio: TexelRatio,
    ) -> Self {
        let mut filter = Self::new(kind, first, second);
        filter.ratio = Some(ratio);
        filter
    }

    pub fn texel_ratio(&self) -> Option<TexelRatio> {
        self.ratio
    }

    pub fn group(&self) -> &FilterGroup {
        &self.group
    }

    fn init_texel_offsets(&self) {
        let Some(ratio) = self.ratio else {
            return;
        };
        let (w, h) = self.group.output_size();
        if w <= 0 || h <= 0 {
            return;
        }
        let [first, second] = self.group.filters() else {
            return;
        };

        let horizontal = first.sender();
        horizontal.set_float(TEXEL_WIDTH_OFFSET, ratio.horizontal / w as f32);
        horizontal.set_float(TEXEL_HEIGHT_OFFSET, 0.0);

        let vertical = second.sender();
        vertical.set_float(TEXEL_WIDTH_OFFSET, 0.0);
        vertical.set_float(TEXEL_HEIGHT_OFFSET, ratio.vertical / h as f32);
    }

    fn apply_params(&mut self) {
        let mut changed = false;
        for command in self.queue.drain() {
            let Command::Param { name, value } = command else {
                tracing::debug!(filter = self.kind.label(), "only params apply to two-pass filters");
                continue;
            };
            match name.as_ref() {
                PARAM_TEXEL_RATIO => self.ratio = Some(TexelRatio::uniform(value)),
                PARAM_HORIZONTAL_TEXEL_RATIO => {
                    self.ratio.get_or_insert_with(TexelRatio::default).horizontal = value
                }
                PARAM_VERTICAL_TEXEL_RATIO => {
                    self.ratio.get_or_insert_with(TexelRatio::default).vertical = value
                }
                other => {
                    tracing::debug!(param = other, "unknown two-pass param ignored");
                    continue;
                }
            }
            changed = true;
        }
        if changed {
            self.init_texel_offsets();
        }
    }
}

impl Filter for TwoPassFilter {
    fn kind(&self) -> FilterKind {
        self.kind
    }

    fn init(&mut self, gpu: &mut dyn Gpu) -> Result<(), EngineError> {
        let result = self.group.init(gpu);
        self.init_texel_offsets();
        result
    }

    fn is_initialized(&self) -> bool {
        self.group.is_initialized()
    }

    fn on_output_size_changed(&mut self, gpu: &mut dyn Gpu, w: i32, h: i32) {
        self.group.on_output_size_changed(gpu, w, h);
        self.init_texel_offsets();
    }

    fn output_size(&self) -> (i32, i32) {
        self.group.output_size()
    }

    fn prepare(&mut self, gpu: &mut dyn Gpu) {
        self.apply_params();
        self.group.prepare(gpu);
    }

    fn on_draw(
        &mut self,
        gpu: &mut dyn Gpu,
        input: Option<TextureId>,
        positions: &Quad,
        tex_coords: &Quad,
    ) {
        self.apply_params();
        self.group.on_draw(gpu, input, positions, tex_coords);
    }

    fn destroy(&mut self, gpu: &mut dyn Gpu) {
        self.group.destroy(gpu);
    }

    fn sender(&self) -> CommandSender {
        self.queue.sender()
    }

    fn as_group(&self) -> Option<&FilterGroup> {
        Some(&self.group)
    }

    fn as_group_mut(&mut self) -> Option<&mut FilterGroup> {
        Some(&mut self.group)
    }
}
