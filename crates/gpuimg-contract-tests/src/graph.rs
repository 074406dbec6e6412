//! Structural contracts: flattening, pool sizing and command ordering.

use gpuimg_core::{texture_coords, Rotation, CUBE};
use gpuimg_filters::brightness;
use gpuimg_runtime::{Filter, FilterGroup, Gpu, RgbaImage, ShaderFilter, UniformValue};
use gpuimg_runtime_soft::SoftGpu;

fn leaf(label: &str) -> Box<dyn Filter> {
    Box::new(ShaderFilter::passthrough().with_label(label))
}

fn group(children: Vec<Box<dyn Filter>>) -> Box<dyn Filter> {
    Box::new(FilterGroup::with_filters(children))
}

fn next_leaf(next: &mut usize) -> Box<dyn Filter> {
    *next += 1;
    leaf(&format!("f{}", *next - 1))
}

/// `depth` levels of groups, each holding one leaf before and one after the next level.
/// Leaves are numbered in creation order, which is also their pre-order position.
fn nested(depth: usize, next: &mut usize) -> Box<dyn Filter> {
    let first = next_leaf(next);
    if depth == 1 {
        let second = next_leaf(next);
        return group(vec![first, second]);
    }
    let inner = nested(depth - 1, next);
    let last = next_leaf(next);
    group(vec![first, inner, last])
}

fn labels(group: &FilterGroup) -> Vec<String> {
    group.merged().iter().map(|f| f.label().to_string()).collect()
}

#[test]
fn flatten_is_pre_order_for_depths_one_to_four() {
    for depth in 1..=4 {
        let mut next = 0;
        let tree = nested(depth, &mut next);
        let group = tree.as_group().expect("root is a group");
        assert_eq!(group.merged_len(), next, "depth {depth}");
        let expected: Vec<String> = (0..next).map(|i| format!("f{i}")).collect();
        assert_eq!(labels(group), expected, "depth {depth}");
    }
}

#[test]
fn flatten_skips_empty_groups_and_keeps_mixed_order() {
    let tree = FilterGroup::with_filters(vec![
        group(vec![]),
        leaf("a"),
        group(vec![group(vec![]), leaf("b"), group(vec![leaf("c")])]),
        group(vec![]),
        leaf("d"),
    ]);
    assert_eq!(labels(&tree), ["a", "b", "c", "d"]);
}

fn drawn_group(n: usize, gpu: &mut SoftGpu) -> FilterGroup {
    let mut group = FilterGroup::with_filters((0..n).map(|i| leaf(&format!("p{i}"))).collect());
    group.init(gpu).expect("init");
    group.on_output_size_changed(gpu, 4, 4);
    let input = gpu
        .upload_texture(&RgbaImage::new(4, 4), None)
        .expect("upload");
    group.on_draw(
        gpu,
        Some(input),
        &CUBE,
        &texture_coords(Rotation::Normal, false, false),
    );
    group
}

#[test]
fn pool_holds_one_framebuffer_per_pass_but_the_last() {
    for n in 2..=5 {
        let mut gpu = SoftGpu::new(4, 4);
        let group = drawn_group(n, &mut gpu);
        assert_eq!(group.framebuffer_count(), n - 1, "{n} passes");
        assert_eq!(gpu.stats().render_targets, n - 1, "{n} passes");
    }
}

#[test]
fn zero_or_one_pass_touches_no_framebuffer() {
    for n in 0..=1 {
        let mut gpu = SoftGpu::new(4, 4);
        let group = drawn_group(n, &mut gpu);
        assert_eq!(group.framebuffer_count(), 0);
        let stats = gpu.stats();
        assert_eq!(stats.render_targets_created, 0, "{n} passes");
        assert_eq!(stats.framebuffer_binds, 0, "{n} passes");
        assert_eq!(stats.draws, n);
    }
}

#[test]
fn queued_uniforms_apply_once_in_order() {
    let mut gpu = SoftGpu::new(2, 2);
    let mut filter = brightness(0.0);
    filter.init(&mut gpu).expect("init");
    filter.on_output_size_changed(&mut gpu, 2, 2);

    let sender = filter.sender();
    for v in [0.1, 0.2, 0.3] {
        sender.set_float("brightness", v);
    }
    gpu.take_uniform_writes();

    let coords = texture_coords(Rotation::Normal, false, false);
    let brightness_writes = |gpu: &mut SoftGpu| -> Vec<UniformValue> {
        gpu.take_uniform_writes()
            .into_iter()
            .filter(|(name, _)| name == "brightness")
            .map(|(_, value)| value)
            .collect()
    };

    filter.on_draw(&mut gpu, None, &CUBE, &coords);
    assert_eq!(
        brightness_writes(&mut gpu),
        [0.1, 0.2, 0.3].map(UniformValue::Float).to_vec()
    );

    filter.on_draw(&mut gpu, None, &CUBE, &coords);
    assert!(brightness_writes(&mut gpu).is_empty(), "second draw re-applied commands");
    assert_eq!(filter.uniform("brightness"), Some(&UniformValue::Float(0.3)));
}

#[test]
fn commands_sent_before_init_wait_for_it() {
    let mut gpu = SoftGpu::new(2, 2);
    let mut filter = brightness(0.0);
    filter.sender().set_float("brightness", 0.5);

    let coords = texture_coords(Rotation::Normal, false, false);
    filter.on_draw(&mut gpu, None, &CUBE, &coords);
    assert_eq!(gpu.stats().draws, 0);

    filter.init(&mut gpu).expect("init");
    filter.on_draw(&mut gpu, None, &CUBE, &coords);
    let program = filter.program().handle().expect("linked");
    assert_eq!(
        gpu.uniform_value(program, "brightness"),
        Some(&UniformValue::Float(0.5))
    );
}
