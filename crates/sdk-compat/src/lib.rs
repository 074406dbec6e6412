//! Compile-only compatibility crate.
//!
//! This crate exists to ensure the public SDK surface remains usable by third-party
//! consumers. It is not shipped or run; it must only build.

use gpuimg_core::{EngineConfig, FilterKind, Rotation, ScaleType};
use gpuimg_filters::{alpha_blend, box_blur, brightness, FilterRegistry};
use gpuimg_runtime::{Filter, FilterGroup, Gpu, GpuImage, Renderer, ShaderFilter, UniformValue};

#[allow(dead_code)]
pub fn _compile_witness() {
    // Groups nest and flatten using only public APIs.
    let mut group = FilterGroup::new();
    group.add_filter(Box::new(brightness(0.1)));
    group.add_filter(Box::new(FilterGroup::with_filters(vec![
        Box::new(box_blur(1.0)),
        Box::new(alpha_blend(0.5)),
    ])));
    let _ = (group.merged_len(), group.framebuffer_count());

    // Custom filters stay constructible from raw shader sources.
    let custom = ShaderFilter::new(
        FilterKind::Custom,
        gpuimg_runtime::NO_FILTER_VERTEX_SHADER,
        gpuimg_runtime::NO_FILTER_FRAGMENT_SHADER,
    )
    .with_label("custom")
    .with_uniform("strength", UniformValue::Float(1.0));
    custom.set_float("strength", 0.5);

    // The registry maps kinds to constructors and adjusters.
    let registry = FilterRegistry::builtin();
    let chain = registry.build_chain(&[FilterKind::Contrast, FilterKind::Grayscale]);
    if let Ok(filter) = &chain {
        let _ = registry.adjusters(filter.as_ref());
    }

    // The renderer is backend-agnostic: any `Gpu` drives it.
    let mut renderer = Renderer::new(Box::new(group)).with_config(&EngineConfig::default());
    renderer.set_rotation(Rotation::Rotation90, false, true);
    renderer.set_scale_type(ScaleType::CenterInside);
    let _drive = |gpu: &mut dyn Gpu| {
        let _ = renderer.on_surface_created(gpu);
        renderer.on_draw_frame(gpu);
    };

    // The façade signature stays callable with a boxed backend factory.
    let _start = |factory: fn() -> Result<Box<dyn Gpu>, gpuimg_core::EngineError>| {
        GpuImage::new(EngineConfig::default(), Box::new(custom) as Box<dyn Filter>, factory)
    };
}
