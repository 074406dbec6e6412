//! Filter catalogue keyed by [`FilterKind`], with slider adjusters.

use std::collections::BTreeMap;
use std::fmt;

use gpuimg_core::{EngineError, FilterKind};
use gpuimg_runtime::two_pass::PARAM_TEXEL_RATIO;
use gpuimg_runtime::{CommandSender, Filter, FilterGroup, ShaderFilter};

use crate::blend::{self, MIXTURE_PERCENT};
use crate::blur;
use crate::color::{self, BRIGHTNESS, CONTRAST, EXPOSURE, GAMMA, OPACITY, SATURATION};

/// Linear map of a 0..=100 slider position onto `start..=end`.
pub fn range(percent: u8, start: f32, end: f32) -> f32 {
    (end - start) * f32::from(percent.min(100)) / 100.0 + start
}

/// Something a 0..=100 slider can drive.
pub trait Adjustable {
    fn adjust(&self, percent: u8);
}

/// Applies a slider position to one filter through its command sender.
pub type AdjustFn = fn(&CommandSender, u8);

/// Slider binding for one filter instance. Safe to move to a UI thread.
#[derive(Clone)]
pub struct Adjuster {
    kind: FilterKind,
    sender: CommandSender,
    apply: AdjustFn,
}

impl Adjuster {
    pub fn kind(&self) -> FilterKind {
        self.kind
    }
}

impl fmt::Debug for Adjuster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Adjuster").field("kind", &self.kind).finish_non_exhaustive()
    }
}

impl Adjustable for Adjuster {
    fn adjust(&self, percent: u8) {
        (self.apply)(&self.sender, percent.min(100));
    }
}

/// Construction and optional adjustment for one filter kind.
#[derive(Clone, Copy)]
pub struct FilterEntry {
    pub kind: FilterKind,
    pub create: fn() -> Box<dyn Filter>,
    pub adjust: Option<AdjustFn>,
}

impl fmt::Debug for FilterEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterEntry")
            .field("kind", &self.kind)
            .field("adjustable", &self.adjust.is_some())
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct FilterRegistry {
    entries: BTreeMap<FilterKind, FilterEntry>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every filter shipped with this crate.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for entry in BUILTIN {
            registry.register(*entry);
        }
        registry
    }

    /// Add or replace the entry for `entry.kind`.
    pub fn register(&mut self, entry: FilterEntry) -> Option<FilterEntry> {
        self.entries.insert(entry.kind, entry)
    }

    pub fn get(&self, kind: FilterKind) -> Option<&FilterEntry> {
        self.entries.get(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = FilterKind> + '_ {
        self.entries.keys().copied()
    }

    pub fn create(&self, kind: FilterKind) -> Option<Box<dyn Filter>> {
        self.entries.get(&kind).map(|e| (e.create)())
    }

    /// A group with one filter per kind, in order. An empty list yields a passthrough.
    pub fn build_chain(&self, kinds: &[FilterKind]) -> Result<Box<dyn Filter>, EngineError> {
        if kinds.is_empty() {
            return Ok(Box::new(ShaderFilter::passthrough()));
        }
        let mut group = FilterGroup::new();
        for kind in kinds {
            let filter = self
                .create(*kind)
                .ok_or_else(|| EngineError::other(format!("no filter registered for {kind:?}")))?;
            group.add_filter(filter);
        }
        Ok(Box::new(group))
    }

    /// Adjuster for `filter` itself, if its kind has one.
    pub fn adjuster(&self, filter: &dyn Filter) -> Option<Adjuster> {
        let apply = self.entries.get(&filter.kind())?.adjust?;
        Some(Adjuster {
            kind: filter.kind(),
            sender: filter.sender(),
            apply,
        })
    }

    /// Adjusters for `filter` or, when it has none, for the adjustable nodes inside it.
    pub fn adjusters(&self, filter: &dyn Filter) -> Vec<Adjuster> {
        let mut out = Vec::new();
        self.collect_adjusters(filter, &mut out);
        out
    }

    fn collect_adjusters(&self, filter: &dyn Filter, out: &mut Vec<Adjuster>) {
        if let Some(adjuster) = self.adjuster(filter) {
            out.push(adjuster);
        } else if let Some(group) = filter.as_group() {
            for child in group.filters() {
                self.collect_adjusters(child.as_ref(), out);
            }
        }
    }
}

const BUILTIN: &[FilterEntry] = &[
    FilterEntry {
        kind: FilterKind::Passthrough,
        create: create_passthrough,
        adjust: None,
    },
    FilterEntry {
        kind: FilterKind::Brightness,
        create: create_brightness,
        adjust: Some(adjust_brightness as AdjustFn),
    },
    FilterEntry {
        kind: FilterKind::Contrast,
        create: create_contrast,
        adjust: Some(adjust_contrast as AdjustFn),
    },
    FilterEntry {
        kind: FilterKind::Gamma,
        create: create_gamma,
        adjust: Some(adjust_gamma as AdjustFn),
    },
    FilterEntry {
        kind: FilterKind::Exposure,
        create: create_exposure,
        adjust: Some(adjust_exposure as AdjustFn),
    },
    FilterEntry {
        kind: FilterKind::Saturation,
        create: create_saturation,
        adjust: Some(adjust_saturation as AdjustFn),
    },
    FilterEntry {
        kind: FilterKind::Grayscale,
        create: create_grayscale,
        adjust: None,
    },
    FilterEntry {
        kind: FilterKind::ColorInvert,
        create: create_color_invert,
        adjust: None,
    },
    FilterEntry {
        kind: FilterKind::Opacity,
        create: create_opacity,
        adjust: Some(adjust_opacity as AdjustFn),
    },
    FilterEntry {
        kind: FilterKind::BoxBlur,
        create: create_box_blur,
        adjust: Some(adjust_box_blur as AdjustFn),
    },
    FilterEntry {
        kind: FilterKind::AlphaBlend,
        create: create_alpha_blend,
        adjust: Some(adjust_alpha_blend as AdjustFn),
    },
    FilterEntry {
        kind: FilterKind::MultiplyBlend,
        create: create_multiply_blend,
        adjust: None,
    },
    FilterEntry {
        kind: FilterKind::OverlayBlend,
        create: create_overlay_blend,
        adjust: None,
    },
];

fn create_passthrough() -> Box<dyn Filter> {
    Box::new(ShaderFilter::passthrough())
}

fn create_brightness() -> Box<dyn Filter> {
    Box::new(color::brightness(0.0))
}

fn create_contrast() -> Box<dyn Filter> {
    Box::new(color::contrast(1.2))
}

fn create_gamma() -> Box<dyn Filter> {
    Box::new(color::gamma(1.2))
}

fn create_exposure() -> Box<dyn Filter> {
    Box::new(color::exposure(0.0))
}

fn create_saturation() -> Box<dyn Filter> {
    Box::new(color::saturation(1.0))
}

fn create_grayscale() -> Box<dyn Filter> {
    Box::new(color::grayscale())
}

fn create_color_invert() -> Box<dyn Filter> {
    Box::new(color::color_invert())
}

fn create_opacity() -> Box<dyn Filter> {
    Box::new(color::opacity(1.0))
}

fn create_box_blur() -> Box<dyn Filter> {
    Box::new(blur::box_blur(1.0))
}

fn create_alpha_blend() -> Box<dyn Filter> {
    Box::new(blend::alpha_blend(0.5))
}

fn create_multiply_blend() -> Box<dyn Filter> {
    Box::new(blend::multiply_blend())
}

fn create_overlay_blend() -> Box<dyn Filter> {
    Box::new(blend::overlay_blend())
}

fn adjust_brightness(s: &CommandSender, p: u8) {
    s.set_float(BRIGHTNESS, range(p, -1.0, 1.0));
}

fn adjust_contrast(s: &CommandSender, p: u8) {
    s.set_float(CONTRAST, range(p, 0.0, 2.0));
}

fn adjust_gamma(s: &CommandSender, p: u8) {
    s.set_float(GAMMA, range(p, 0.0, 3.0));
}

fn adjust_exposure(s: &CommandSender, p: u8) {
    s.set_float(EXPOSURE, range(p, -10.0, 10.0));
}

fn adjust_saturation(s: &CommandSender, p: u8) {
    s.set_float(SATURATION, range(p, 0.0, 2.0));
}

fn adjust_opacity(s: &CommandSender, p: u8) {
    s.set_float(OPACITY, range(p, 0.0, 1.0));
}

fn adjust_box_blur(s: &CommandSender, p: u8) {
    s.set_param(PARAM_TEXEL_RATIO, range(p, 0.0, 10.0));
}

fn adjust_alpha_blend(s: &CommandSender, p: u8) {
    s.set_float(MIXTURE_PERCENT, range(p, 0.0, 1.0));
}
