//! `GpuImage`: the threaded façade owning the render thread.
//!
//! Every GPU call happens on the render thread. Public methods only send messages, except the
//! snapshot calls, which wait for the render thread's reply.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use gpuimg_core::{EngineConfig, EngineError, RenderMode, Rotation, ScaleType};
use image::RgbaImage;

use crate::filter::Filter;
use crate::gpu::Gpu;
use crate::offscreen::{read_surface, render_batch};
use crate::renderer::{Renderer, RendererCommand};

/// A producer of live frames (camera, video decoder, screen capture).
///
/// Polled on the render thread once per frame in continuous mode.
pub trait LiveSource: Send {
    fn next_frame(&mut self) -> Option<RgbaImage>;
}

type RenderTask = Box<dyn FnOnce(&mut Renderer, &mut dyn Gpu) + Send>;
type Reply<T> = Sender<Result<T, EngineError>>;

enum RenderMessage {
    Renderer(RendererCommand),
    SurfaceChanged(i32, i32),
    RequestRender,
    SetRenderMode(RenderMode),
    AttachSource(Box<dyn LiveSource>),
    DetachSource,
    CaptureSurface(Reply<RgbaImage>),
    Snapshot(Arc<RgbaImage>, Reply<RgbaImage>),
    Batch {
        image: Arc<RgbaImage>,
        filters: Vec<Box<dyn Filter>>,
        reply: Reply<Vec<Result<RgbaImage, EngineError>>>,
    },
    Task(RenderTask),
    Shutdown,
}

enum Wake {
    Message(RenderMessage),
    Frame,
    Closed,
}

struct RenderLoop {
    gpu: Box<dyn Gpu>,
    renderer: Renderer,
    rx: Receiver<RenderMessage>,
    mode: RenderMode,
    interval: Duration,
    source: Option<Box<dyn LiveSource>>,
    scale_type: ScaleType,
    background: [f32; 3],
    dirty: bool,
}

impl RenderLoop {
    fn wait(&self, next_frame: Instant) -> Wake {
        if self.dirty {
            return match self.rx.try_recv() {
                Ok(msg) => Wake::Message(msg),
                Err(TryRecvError::Empty) => Wake::Frame,
                Err(TryRecvError::Disconnected) => Wake::Closed,
            };
        }
        match self.mode {
            RenderMode::WhenDirty => match self.rx.recv() {
                Ok(msg) => Wake::Message(msg),
                Err(_) => Wake::Closed,
            },
            RenderMode::Continuously => {
                let timeout = next_frame.saturating_duration_since(Instant::now());
                match self.rx.recv_timeout(timeout) {
                    Ok(msg) => Wake::Message(msg),
                    Err(RecvTimeoutError::Timeout) => Wake::Frame,
                    Err(RecvTimeoutError::Disconnected) => Wake::Closed,
                }
            }
        }
    }

    fn run(mut self) {
        let mut next_frame = Instant::now();
        loop {
            match self.wait(next_frame) {
                Wake::Message(msg) => {
                    if !self.handle(msg) {
                        break;
                    }
                }
                Wake::Frame => {
                    self.frame();
                    next_frame = Instant::now() + self.interval;
                }
                Wake::Closed => break,
            }
        }
        self.renderer.destroy(&mut *self.gpu);
        tracing::debug!("render thread stopped");
    }

    fn frame(&mut self) {
        if let Some(frame) = self.source.as_mut().and_then(|s| s.next_frame()) {
            self.renderer.push_frame(frame);
        }
        self.renderer.on_draw_frame(&mut *self.gpu);
        self.gpu.present();
        self.dirty = false;
    }

    /// Returns false when the loop must stop.
    fn handle(&mut self, msg: RenderMessage) -> bool {
        let gpu = &mut *self.gpu;
        match msg {
            RenderMessage::Renderer(command) => {
                match &command {
                    RendererCommand::SetScaleType(scale_type) => self.scale_type = *scale_type,
                    RendererCommand::SetBackground(rgb) => self.background = *rgb,
                    _ => {}
                }
                self.renderer.run_on_draw(command);
            }
            RenderMessage::SurfaceChanged(w, h) => {
                self.renderer.on_surface_changed(gpu, w, h);
                self.dirty = true;
            }
            RenderMessage::RequestRender => self.dirty = true,
            RenderMessage::SetRenderMode(mode) => self.mode = mode,
            RenderMessage::AttachSource(source) => {
                self.source = Some(source);
                self.mode = RenderMode::Continuously;
            }
            RenderMessage::DetachSource => self.source = None,
            RenderMessage::CaptureSurface(reply) => {
                self.renderer.on_draw_frame(gpu);
                let (w, h) = self.renderer.output_size();
                let _ = reply.send(read_surface(gpu, w, h));
            }
            RenderMessage::Snapshot(image, reply) => {
                let _ = reply.send(self.renderer.render_offscreen(gpu, &image));
                self.dirty = true;
            }
            RenderMessage::Batch {
                image,
                filters,
                reply,
            } => {
                let result = render_batch(gpu, &image, filters, self.scale_type, self.background);
                let _ = reply.send(result);
                self.dirty = true;
            }
            RenderMessage::Task(task) => task(&mut self.renderer, gpu),
            RenderMessage::Shutdown => return false,
        }
        true
    }
}

/// Entry point for applications: filter selection, image input, live sources and snapshots.
pub struct GpuImage {
    tx: Sender<RenderMessage>,
    worker: Option<JoinHandle<()>>,
    config: EngineConfig,
    image: Arc<Mutex<Option<Arc<RgbaImage>>>>,
}

impl std::fmt::Debug for GpuImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuImage")
            .field("config", &self.config)
            .field("running", &self.worker.is_some())
            .finish()
    }
}

impl GpuImage {
    /// Spawn the render thread and build the backend on it.
    ///
    /// `factory` runs on the render thread (GL contexts are bound to one thread). Its error, or
    /// a failure of the initial filter to build, is returned here.
    pub fn new<F>(config: EngineConfig, filter: Box<dyn Filter>, factory: F) -> Result<Self, EngineError>
    where
        F: FnOnce() -> Result<Box<dyn Gpu>, EngineError> + Send + 'static,
    {
        config.validate().map_err(|msg| EngineError::InvalidConfig {
            path: "<engine config>".into(),
            msg,
        })?;

        let (tx, rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), EngineError>>();
        let loop_config = config.clone();

        let worker = thread::Builder::new()
            .name("gpuimg-render".to_string())
            .spawn(move || {
                let mut gpu = match factory() {
                    Ok(gpu) => gpu,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let mut renderer = Renderer::new(filter).with_config(&loop_config);
                if let Err(e) = renderer.on_surface_created(&mut *gpu) {
                    renderer.destroy(&mut *gpu);
                    let _ = ready_tx.send(Err(e));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                RenderLoop {
                    gpu,
                    renderer,
                    rx,
                    mode: loop_config.render_mode,
                    interval: loop_config.frame_interval(),
                    source: None,
                    scale_type: loop_config.scale_type,
                    background: loop_config.background,
                    dirty: false,
                }
                .run();
            })
            .map_err(|e| EngineError::RenderThread(format!("spawn failed: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                tx,
                worker: Some(worker),
                config,
                image: Arc::new(Mutex::new(None)),
            }),
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(e)
            }
            Err(_) => {
                let _ = worker.join();
                Err(EngineError::RenderThread(
                    "render thread exited during start-up".to_string(),
                ))
            }
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn send(&self, msg: RenderMessage) {
        if self.tx.send(msg).is_err() {
            tracing::warn!("render thread is gone; message dropped");
        }
    }

    fn send_command(&self, command: RendererCommand) {
        self.send(RenderMessage::Renderer(command));
        self.request_render();
    }

    // ---- Surface ----

    pub fn surface_changed(&self, w: i32, h: i32) {
        self.send(RenderMessage::SurfaceChanged(w, h));
    }

    pub fn request_render(&self) {
        self.send(RenderMessage::RequestRender);
    }

    pub fn set_render_mode(&self, mode: RenderMode) {
        self.send(RenderMessage::SetRenderMode(mode));
    }

    // ---- Filter and image ----

    /// Replace the active filter; the previous one is destroyed on the render thread.
    pub fn set_filter(&self, filter: Box<dyn Filter>) {
        self.send_command(RendererCommand::SetFilter(filter));
    }

    pub fn set_image(&self, image: RgbaImage) {
        let image = Arc::new(image);
        *self.image.lock().unwrap_or_else(PoisonError::into_inner) = Some(image.clone());
        self.send_command(RendererCommand::SetImage(image));
    }

    /// Load an image on a worker thread, then hand it to the render thread.
    ///
    /// The returned handle yields the load error, if any. Dropping it does not cancel the load.
    pub fn set_image_with<L, E>(&self, load: L) -> JoinHandle<Result<(), E>>
    where
        L: FnOnce() -> Result<RgbaImage, E> + Send + 'static,
        E: Send + 'static,
    {
        let tx = self.tx.clone();
        let current = Arc::clone(&self.image);
        thread::spawn(move || {
            let image = Arc::new(load()?);
            *current.lock().unwrap_or_else(PoisonError::into_inner) = Some(image.clone());
            let _ = tx.send(RenderMessage::Renderer(RendererCommand::SetImage(image)));
            let _ = tx.send(RenderMessage::RequestRender);
            Ok(())
        })
    }

    pub fn delete_image(&self) {
        *self.image.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.send_command(RendererCommand::DeleteImage);
    }

    pub fn set_rotation(&self, rotation: Rotation, flip_horizontal: bool, flip_vertical: bool) {
        self.send_command(RendererCommand::SetRotation {
            rotation,
            flip_horizontal,
            flip_vertical,
        });
    }

    /// Changing the scale type drops the current image, which must be set again.
    pub fn set_scale_type(&self, scale_type: ScaleType) {
        self.send_command(RendererCommand::SetScaleType(scale_type));
        self.delete_image();
    }

    pub fn set_background_color(&self, r: f32, g: f32, b: f32) {
        self.send_command(RendererCommand::SetBackground([r, g, b]));
    }

    // ---- Live source ----

    /// Attach a live source and switch to continuous rendering.
    pub fn set_up_camera(
        &self,
        source: Box<dyn LiveSource>,
        degrees: i32,
        flip_horizontal: bool,
        flip_vertical: bool,
    ) -> Result<(), EngineError> {
        let rotation = Rotation::from_degrees(degrees).ok_or_else(|| {
            EngineError::other(format!("camera rotation {degrees} is not a multiple of 90"))
        })?;
        self.send(RenderMessage::Renderer(RendererCommand::SetRotation {
            rotation,
            flip_horizontal,
            flip_vertical,
        }));
        self.send(RenderMessage::AttachSource(source));
        Ok(())
    }

    /// Detach the live source and go back to on-demand rendering.
    pub fn stop_camera(&self) {
        self.send(RenderMessage::DetachSource);
        self.set_render_mode(RenderMode::WhenDirty);
    }

    // ---- Render thread access ----

    /// Run `task` on the render thread before the next frame (structural filter edits).
    pub fn run_on_render_thread<T>(&self, task: T)
    where
        T: FnOnce(&mut Renderer, &mut dyn Gpu) + Send + 'static,
    {
        self.send(RenderMessage::Task(Box::new(task)));
        self.request_render();
    }

    fn wait<T>(&self, rx: Receiver<Result<T, EngineError>>) -> Result<T, EngineError> {
        match rx.recv_timeout(self.config.snapshot_timeout()) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(EngineError::RenderThread(
                "timed out waiting for the render thread".to_string(),
            )),
            Err(RecvTimeoutError::Disconnected) => Err(EngineError::RenderThread(
                "render thread dropped the request".to_string(),
            )),
        }
    }

    /// Draw a frame and read back the visible surface.
    pub fn capture_surface(&self) -> Result<RgbaImage, EngineError> {
        let (reply, rx) = mpsc::channel();
        self.send(RenderMessage::CaptureSurface(reply));
        self.wait(rx)
    }

    /// The current image rendered offscreen at full size through the active filter.
    pub fn get_bitmap_with_filter_applied(&self) -> Result<RgbaImage, EngineError> {
        let image = self
            .image
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| EngineError::other("no image set"))?;
        self.render_snapshot(image)
    }

    pub fn get_bitmap_with_filter_applied_to(&self, image: RgbaImage) -> Result<RgbaImage, EngineError> {
        self.render_snapshot(Arc::new(image))
    }

    fn render_snapshot(&self, image: Arc<RgbaImage>) -> Result<RgbaImage, EngineError> {
        let (reply, rx) = mpsc::channel();
        self.send(RenderMessage::Snapshot(image, reply));
        self.wait(rx)
    }

    /// One thumbnail per filter; each filter is destroyed after its render.
    pub fn get_bitmap_for_multiple_filters(
        &self,
        image: RgbaImage,
        filters: Vec<Box<dyn Filter>>,
    ) -> Result<Vec<Result<RgbaImage, EngineError>>, EngineError> {
        let (reply, rx) = mpsc::channel();
        self.send(RenderMessage::Batch {
            image: Arc::new(image),
            filters,
            reply,
        });
        self.wait(rx)
    }

    /// Stop the render thread after it destroys every GPU resource it owns.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = self.tx.send(RenderMessage::Shutdown);
            if worker.join().is_err() {
                tracing::error!("render thread panicked");
            }
        }
    }
}

impl Drop for GpuImage {
    fn drop(&mut self) {
        self.stop();
    }
}
