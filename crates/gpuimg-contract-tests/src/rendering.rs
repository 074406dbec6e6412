//! Pixel contracts, checked on the CPU backend.

use gpuimg_core::{Rotation, ScaleType};
use gpuimg_filters::{box_blur, brightness, color_invert, contrast};
use gpuimg_runtime::{render_batch, Filter, FilterGroup, Renderer, RgbaImage, ShaderFilter};
use gpuimg_runtime_soft::SoftGpu;
use image::Rgba;

const RED: [u8; 4] = [255, 0, 0, 255];
const BLACK: [u8; 4] = [0, 0, 0, 255];

/// 4x2 black image with a red top-left pixel.
fn marked() -> RgbaImage {
    let mut image = RgbaImage::from_pixel(4, 2, Rgba(BLACK));
    image.put_pixel(0, 0, Rgba(RED));
    image
}

fn gray(w: u32, h: u32, v: u8) -> RgbaImage {
    RgbaImage::from_pixel(w, h, Rgba([v, v, v, 255]))
}

fn passthroughs(n: usize) -> Vec<Box<dyn Filter>> {
    (0..n)
        .map(|_| Box::new(ShaderFilter::passthrough()) as Box<dyn Filter>)
        .collect()
}

fn show(gpu: &mut SoftGpu, filter: Box<dyn Filter>, image: RgbaImage) -> Renderer {
    let (w, h) = image.dimensions();
    let mut renderer = Renderer::new(filter);
    renderer.set_image(image);
    renderer.on_surface_created(gpu).expect("filter init");
    renderer.on_surface_changed(gpu, w as i32, h as i32);
    renderer.on_draw_frame(gpu);
    renderer
}

#[test]
fn corner_marker_survives_one_two_and_three_passes() {
    for n in 1..=3 {
        let mut gpu = SoftGpu::new(4, 2);
        show(&mut gpu, Box::new(FilterGroup::with_filters(passthroughs(n))), marked());
        assert_eq!(gpu.surface_image(), marked(), "{n} passes");
    }
}

#[test]
fn skipped_passes_keep_orientation() {
    for budget in 0..=2 {
        let mut gpu = SoftGpu::new(4, 2).with_render_target_budget(budget);
        show(&mut gpu, Box::new(FilterGroup::with_filters(passthroughs(3))), marked());
        assert_eq!(gpu.surface_image(), marked(), "budget {budget}");
    }
}

#[test]
fn skipped_first_pass_keeps_the_caller_rotation() {
    let mut gpu = SoftGpu::new(4, 2).with_render_target_budget(0);
    let mut renderer = Renderer::new(Box::new(FilterGroup::with_filters(passthroughs(2))));
    renderer.set_rotation(Rotation::Rotation180, false, false);
    renderer.set_image(marked());
    renderer.on_surface_created(&mut gpu).expect("init");
    renderer.on_surface_changed(&mut gpu, 4, 2);
    renderer.on_draw_frame(&mut gpu);

    let out = gpu.surface_image();
    assert_eq!(out.get_pixel(3, 1).0, RED);
    assert_eq!(out.get_pixel(0, 0).0, BLACK);
}

#[test]
fn nested_groups_use_the_flattened_pass_count_for_parity() {
    // [a, [b]] is two passes, [[a, b], [c]] is three.
    let two = FilterGroup::with_filters(vec![
        Box::new(ShaderFilter::passthrough()),
        Box::new(FilterGroup::with_filters(passthroughs(1))),
    ]);
    let three = FilterGroup::with_filters(vec![
        Box::new(FilterGroup::with_filters(passthroughs(2))),
        Box::new(FilterGroup::with_filters(passthroughs(1))),
    ]);
    for (name, tree) in [("two", two), ("three", three)] {
        let mut gpu = SoftGpu::new(4, 2);
        show(&mut gpu, Box::new(tree), marked());
        assert_eq!(gpu.surface_image(), marked(), "{name}");
    }
}

#[test]
fn golden_brightness_then_contrast_on_gray() {
    let expected = ((((128.0f32 / 255.0 + 0.2) - 0.5) * 1.5 + 0.5).clamp(0.0, 1.0) * 255.0).round();
    let mut gpu = SoftGpu::new(4, 4);
    let chain = FilterGroup::with_filters(vec![Box::new(brightness(0.2)), Box::new(contrast(1.5))]);
    show(&mut gpu, Box::new(chain), gray(4, 4, 128));

    for pixel in gpu.surface_image().pixels() {
        for c in &pixel.0[..3] {
            assert!((f32::from(*c) - expected).abs() <= 1.0, "channel {c} vs {expected}");
        }
        assert_eq!(pixel[3], 255);
    }
}

#[test]
fn offscreen_snapshot_equals_the_preview() {
    let mut gpu = SoftGpu::new(4, 2);
    let chain = FilterGroup::with_filters(vec![
        Box::new(brightness(0.1)),
        Box::new(color_invert()),
        Box::new(contrast(1.2)),
    ]);
    let mut renderer = show(&mut gpu, Box::new(chain), marked());
    let preview = gpu.surface_image();

    let snapshot = renderer
        .render_offscreen(&mut gpu, &marked())
        .expect("offscreen render");
    assert_eq!(snapshot, preview);

    // The visible surface is the draw target again afterwards.
    renderer.on_draw_frame(&mut gpu);
    assert_eq!(gpu.surface_image(), preview);
}

#[test]
fn resize_to_the_same_size_keeps_the_pool() {
    let mut gpu = SoftGpu::new(4, 2);
    let mut renderer = show(&mut gpu, Box::new(FilterGroup::with_filters(passthroughs(3))), marked());
    assert_eq!(gpu.stats().render_targets_created, 2);

    for _ in 0..3 {
        renderer.on_surface_changed(&mut gpu, 4, 2);
        renderer.on_draw_frame(&mut gpu);
    }
    assert_eq!(gpu.stats().render_targets_created, 2);
    assert_eq!(gpu.stats().render_targets, 2);

    gpu.resize_surface(8, 4);
    renderer.on_surface_changed(&mut gpu, 8, 4);
    renderer.on_draw_frame(&mut gpu);
    assert_eq!(gpu.stats().render_targets_created, 4);
    assert_eq!(gpu.stats().render_targets, 2);
}

#[test]
fn resize_to_the_same_size_keeps_texel_offsets() {
    fn offsets(gpu: &mut SoftGpu) -> Vec<(String, f32)> {
        gpu.take_uniform_writes()
            .into_iter()
            .filter(|(name, _)| name.starts_with("texel"))
            .filter_map(|(name, value)| value.as_float().map(|v| (name, v)))
            .collect()
    }

    let mut gpu = SoftGpu::new(4, 2);
    let mut renderer = show(&mut gpu, Box::new(box_blur(1.0)), gray(4, 2, 90));
    let first = offsets(&mut gpu);
    assert_eq!(first.len(), 4);
    assert!(first.contains(&("texelWidthOffset".to_string(), 0.25)));
    assert!(first.contains(&("texelHeightOffset".to_string(), 0.5)));

    renderer.on_surface_changed(&mut gpu, 4, 2);
    renderer.on_draw_frame(&mut gpu);
    assert_eq!(offsets(&mut gpu), first);
    assert_eq!(gpu.stats().render_targets, 1);
}

#[test]
fn half_turn_matches_both_flips() {
    let render = |rotation, flip_h, flip_v| {
        let mut gpu = SoftGpu::new(4, 2);
        let mut renderer = Renderer::new(Box::new(ShaderFilter::passthrough()));
        renderer.set_rotation(rotation, flip_h, flip_v);
        renderer.set_image(marked());
        renderer.on_surface_created(&mut gpu).expect("init");
        renderer.on_surface_changed(&mut gpu, 4, 2);
        renderer.on_draw_frame(&mut gpu);
        gpu.surface_image()
    };
    let turned = render(Rotation::Rotation180, false, false);
    assert_eq!(turned, render(Rotation::Normal, true, true));
    assert_eq!(turned.get_pixel(3, 1).0, RED);
}

#[test]
fn center_inside_leaves_background_bars() {
    let mut gpu = SoftGpu::new(4, 4);
    let mut renderer = Renderer::new(Box::new(ShaderFilter::passthrough()));
    renderer.set_scale_type(ScaleType::CenterInside);
    renderer.set_background_color([0.0, 0.0, 1.0]);
    renderer.set_image(gray(4, 2, 200));
    renderer.on_surface_created(&mut gpu).expect("init");
    renderer.on_surface_changed(&mut gpu, 4, 4);
    renderer.on_draw_frame(&mut gpu);

    let out = gpu.surface_image();
    assert_eq!(out.get_pixel(0, 0).0, [0, 0, 255, 255], "top bar");
    assert_eq!(out.get_pixel(3, 3).0, [0, 0, 255, 255], "bottom bar");
    assert_eq!(out.get_pixel(1, 1).0, [200, 200, 200, 255], "image band");
    assert_eq!(out.get_pixel(2, 2).0, [200, 200, 200, 255], "image band");
}

#[test]
fn batch_renders_each_filter_and_releases_everything() {
    let mut gpu = SoftGpu::new(1, 1);
    let filters: Vec<Box<dyn Filter>> = vec![
        Box::new(ShaderFilter::passthrough()),
        Box::new(color_invert()),
        Box::new(FilterGroup::with_filters(vec![
            Box::new(brightness(0.2)),
            Box::new(contrast(1.5)),
        ])),
    ];
    let results = render_batch(&mut gpu, &marked(), filters, ScaleType::CenterCrop, [0.0; 3])
        .expect("batch");

    assert_eq!(results.len(), 3);
    let plain = results[0].as_ref().expect("passthrough");
    assert_eq!(plain, &marked());
    let inverted = results[1].as_ref().expect("invert");
    assert_eq!(inverted.get_pixel(0, 0).0, [0, 255, 255, 255]);
    assert!(results[2].is_ok());

    let stats = gpu.stats();
    assert_eq!((stats.programs, stats.textures, stats.render_targets), (0, 0, 0));
}
