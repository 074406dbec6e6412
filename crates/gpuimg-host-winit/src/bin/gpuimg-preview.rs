// gpuimg-preview: show an image through the configured filter chain.
//
// usage: gpuimg-preview <image> [config.json]
//
// Keys: Up/Down adjust every adjustable filter, R rotates, H flips, C toggles the scale type,
// S writes the filtered full-size image to gpuimg-snapshot.png.

use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use std::time::Instant;

use anyhow::{bail, Context as _};
use tracing_subscriber::EnvFilter;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, KeyboardInput, VirtualKeyCode, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};

use gpuimg_core::{load_engine_config_from, EngineConfig, Rotation, ScaleType};
use gpuimg_filters::{Adjustable, FilterRegistry};
use gpuimg_host_winit::make_gl;
use gpuimg_input_image::{load_resized, LoadOptions};
use gpuimg_runtime::{check_error, Gpu, Renderer, RgbaImage};

const WIN_W: u32 = 960;
const WIN_H: u32 = 540;
const SNAPSHOT_PATH: &str = "gpuimg-snapshot.png";

fn init_logging(config: &EngineConfig) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .with_target(true)
        .init();
}

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args_os().skip(1);
    let Some(image_path) = args.next().map(PathBuf::from) else {
        bail!("usage: gpuimg-preview <image> [config.json]");
    };
    let config = match args.next() {
        Some(path) => load_engine_config_from(&path).context("loading engine config")?,
        None => EngineConfig::default(),
    };
    init_logging(&config);

    let event_loop = EventLoop::new();
    let (gl_window, gl) = make_gl(&event_loop, "gpuimg preview", PhysicalSize::new(WIN_W, WIN_H))
        .context("creating GL window")?;
    let mut gpu = gl_window.gpu(gl).context("initializing glow backend")?;

    let registry = FilterRegistry::builtin();
    let filter = registry
        .build_chain(&config.filters)
        .context("building filter chain")?;
    let adjusters = registry.adjusters(&*filter);
    let mut percent: u8 = 50;

    let mut renderer = Renderer::new(filter).with_config(&config);
    renderer.on_surface_created(&mut gpu).context("initializing filters")?;
    let size = gl_window.window.inner_size();
    renderer.on_surface_changed(&mut gpu, size.width as i32, size.height as i32);

    // Decoding stays off the render thread.
    let max_texture_size = gpu.max_texture_size().min(config.max_texture_size as i32).max(1) as u32;
    let options = LoadOptions {
        max_texture_size,
        ..LoadOptions::default()
    };
    let (image_tx, image_rx) = mpsc::channel::<RgbaImage>();
    thread::spawn(move || match load_resized(&image_path, &options) {
        Ok(image) => {
            let _ = image_tx.send(image);
        }
        Err(e) => tracing::error!(path = %image_path.display(), error = %e, "image load failed"),
    });

    let mut source: Option<RgbaImage> = None;
    let mut rotation = Rotation::Normal;
    let mut flip_horizontal = false;

    event_loop.run(move |event, _, control_flow| {
        // Poll for the decoded image until it arrives, then sleep between events.
        *control_flow = if source.is_none() {
            ControlFlow::WaitUntil(Instant::now() + config.frame_interval())
        } else {
            ControlFlow::Wait
        };

        match event {
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::CloseRequested => *control_flow = ControlFlow::Exit,
                WindowEvent::Resized(size) => {
                    gl_window.target.resize(size);
                    renderer.on_surface_changed(&mut gpu, size.width as i32, size.height as i32);
                    gl_window.window.request_redraw();
                }
                WindowEvent::KeyboardInput {
                    input:
                        KeyboardInput {
                            state: ElementState::Pressed,
                            virtual_keycode: Some(key),
                            ..
                        },
                    ..
                } => {
                    match key {
                        VirtualKeyCode::Up | VirtualKeyCode::Down => {
                            percent = if key == VirtualKeyCode::Up {
                                percent.saturating_add(5).min(100)
                            } else {
                                percent.saturating_sub(5)
                            };
                            for adjuster in &adjusters {
                                adjuster.adjust(percent);
                            }
                            tracing::info!(percent, filters = adjusters.len(), "adjusted");
                        }
                        VirtualKeyCode::R => {
                            rotation = Rotation::from_degrees(rotation.degrees() + 90)
                                .unwrap_or(Rotation::Normal);
                            renderer.set_rotation(rotation, flip_horizontal, false);
                        }
                        VirtualKeyCode::H => {
                            flip_horizontal = !flip_horizontal;
                            renderer.set_rotation(rotation, flip_horizontal, false);
                        }
                        VirtualKeyCode::C => {
                            let next = match renderer.scale_type() {
                                ScaleType::CenterCrop => ScaleType::CenterInside,
                                ScaleType::CenterInside => ScaleType::CenterCrop,
                            };
                            renderer.set_scale_type(next);
                        }
                        VirtualKeyCode::S => match source.as_ref() {
                            Some(image) => match renderer.render_offscreen(&mut gpu, image) {
                                Ok(out) => match out.save(SNAPSHOT_PATH) {
                                    Ok(()) => tracing::info!(path = SNAPSHOT_PATH, "snapshot saved"),
                                    Err(e) => tracing::error!(error = %e, "snapshot write failed"),
                                },
                                Err(e) => tracing::error!(error = %e, "snapshot failed"),
                            },
                            None => tracing::warn!("no image loaded yet"),
                        },
                        _ => return,
                    }
                    gl_window.window.request_redraw();
                }
                _ => {}
            },
            Event::MainEventsCleared => {
                if let Ok(image) = image_rx.try_recv() {
                    renderer.set_image(image.clone());
                    source = Some(image);
                    gl_window.window.request_redraw();
                }
            }
            Event::RedrawRequested(_) => {
                renderer.on_draw_frame(&mut gpu);
                gpu.present();
                check_error(&mut gpu);
            }
            Event::LoopDestroyed => {
                renderer.destroy(&mut gpu);
                gpu.destroy();
            }
            _ => {}
        }
    });
}
