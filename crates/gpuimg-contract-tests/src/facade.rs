//! The threaded façade, driven through the CPU backend on its render thread.

use std::sync::mpsc;
use std::time::{Duration, Instant};

use gpuimg_core::{EngineConfig, EngineError, FilterKind};
use gpuimg_filters::color_invert;
use gpuimg_runtime::{
    Filter, Gpu, GpuImage, LiveSource, RgbaImage, ShaderFilter, NO_FILTER_VERTEX_SHADER,
};
use gpuimg_runtime_soft::SoftGpu;
use image::Rgba;

fn marked() -> RgbaImage {
    let mut image = RgbaImage::from_pixel(4, 2, Rgba([0, 0, 0, 255]));
    image.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
    image
}

fn start(filter: Box<dyn Filter>) -> GpuImage {
    GpuImage::new(EngineConfig::default(), filter, || {
        Ok(Box::new(SoftGpu::new(4, 2)) as Box<dyn Gpu>)
    })
    .expect("engine start")
}

fn broken() -> ShaderFilter {
    ShaderFilter::new(
        FilterKind::Custom,
        NO_FILTER_VERTEX_SHADER,
        "void main() { gl_FragColor = vec4(0.5); }",
    )
}

#[test]
fn captured_surface_matches_the_offscreen_snapshot() {
    let engine = start(Box::new(ShaderFilter::passthrough()));
    engine.surface_changed(4, 2);
    engine.set_image(marked());

    let surface = engine.capture_surface().expect("capture");
    assert_eq!(surface, marked());
    let snapshot = engine.get_bitmap_with_filter_applied().expect("snapshot");
    assert_eq!(snapshot, surface);
    engine.shutdown();
}

#[test]
fn snapshot_uses_the_active_filter() {
    let engine = start(Box::new(ShaderFilter::passthrough()));
    engine.surface_changed(4, 2);
    engine.set_filter(Box::new(color_invert()));

    let out = engine
        .get_bitmap_with_filter_applied_to(marked())
        .expect("snapshot");
    assert_eq!(out.get_pixel(0, 0).0, [0, 255, 255, 255]);
    assert_eq!(out.get_pixel(1, 0).0, [255, 255, 255, 255]);
}

#[test]
fn batch_isolates_a_failing_filter() {
    let engine = start(Box::new(ShaderFilter::passthrough()));
    let results = engine
        .get_bitmap_for_multiple_filters(
            marked(),
            vec![
                Box::new(ShaderFilter::passthrough()),
                Box::new(broken()),
                Box::new(color_invert()),
            ],
        )
        .expect("batch");

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().expect("passthrough"), &marked());
    assert!(matches!(results[1], Err(EngineError::FragmentCompile(_))));
    assert!(results[2].is_ok());
}

#[test]
fn backend_and_initial_filter_failures_surface_from_new() {
    let err = GpuImage::new(
        EngineConfig::default(),
        Box::new(ShaderFilter::passthrough()),
        || Err(EngineError::Unsupported("no context".to_string())),
    )
    .expect_err("factory failure");
    assert!(matches!(err, EngineError::Unsupported(_)));

    let err = GpuImage::new(EngineConfig::default(), Box::new(broken()), || {
        Ok(Box::new(SoftGpu::new(4, 2)) as Box<dyn Gpu>)
    })
    .expect_err("filter failure");
    assert!(matches!(err, EngineError::FragmentCompile(_)));
}

#[test]
fn invalid_config_is_rejected_before_the_thread_starts() {
    let config = EngineConfig {
        background: [2.0, 0.0, 0.0],
        ..EngineConfig::default()
    };
    let err = GpuImage::new(config, Box::new(ShaderFilter::passthrough()), || {
        Ok(Box::new(SoftGpu::new(4, 2)) as Box<dyn Gpu>)
    })
    .expect_err("bad background");
    assert!(matches!(err, EngineError::InvalidConfig { .. }));
}

struct Still(RgbaImage);

impl LiveSource for Still {
    fn next_frame(&mut self) -> Option<RgbaImage> {
        Some(self.0.clone())
    }
}

#[test]
fn camera_frames_reach_the_surface() {
    let engine = start(Box::new(ShaderFilter::passthrough()));
    engine.surface_changed(4, 2);
    engine
        .set_up_camera(Box::new(Still(marked())), 0, false, false)
        .expect("camera");

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let surface = engine.capture_surface().expect("capture");
        if surface == marked() {
            break;
        }
        assert!(Instant::now() < deadline, "no camera frame reached the surface");
        std::thread::sleep(Duration::from_millis(10));
    }
    engine.stop_camera();
}

#[test]
fn camera_rotation_must_be_a_quarter_turn() {
    let engine = start(Box::new(ShaderFilter::passthrough()));
    let err = engine
        .set_up_camera(Box::new(Still(marked())), 45, false, false)
        .expect_err("45 degrees");
    assert!(err.to_string().contains("45"));
}

#[test]
fn changing_the_scale_type_drops_the_image() {
    let engine = start(Box::new(ShaderFilter::passthrough()));
    engine.set_image(marked());
    engine.set_scale_type(gpuimg_core::ScaleType::CenterInside);

    let err = engine
        .get_bitmap_with_filter_applied()
        .expect_err("image was dropped");
    assert!(err.to_string().contains("no image set"));
}

#[test]
fn render_thread_tasks_run_with_the_renderer() {
    let engine = start(Box::new(ShaderFilter::passthrough()));
    engine.surface_changed(4, 2);

    let (tx, rx) = mpsc::channel();
    engine.run_on_render_thread(move |renderer, gpu| {
        let _ = tx.send((renderer.output_size(), gpu.max_texture_size()));
    });
    let (size, max) = rx.recv_timeout(Duration::from_secs(5)).expect("task ran");
    assert_eq!(size, (4, 2));
    assert_eq!(max, 4096);
}
