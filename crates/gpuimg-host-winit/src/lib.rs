//! Host glue (policy layer): winit window plus a current GL context for `GlowGpu`.
//!
//! Kept apart from the runtime so the engine stays embeddable in hosts that bring their own
//! context.

use std::ffi::CString;
use std::num::NonZeroU32;
use std::rc::Rc;

use glutin::config::{Config, ConfigTemplateBuilder};
use glutin::context::{
    ContextApi, ContextAttributesBuilder, NotCurrentGlContextSurfaceAccessor,
    PossiblyCurrentContext, Version,
};
use glutin::display::{Display, DisplayApiPreference};
use glutin::prelude::{GlConfig, GlDisplay, GlSurface};
use glutin::surface::{Surface, SurfaceAttributesBuilder, WindowSurface};
use glutin_winit::GlWindow as _;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use winit::dpi::PhysicalSize;
use winit::event_loop::EventLoop;
use winit::window::{Window, WindowBuilder};

use gpuimg_core::EngineError;
use gpuimg_runtime_glow::GlowGpu;

/// Surface and context, shared between the event loop (resize) and the backend (present).
#[derive(Debug)]
pub struct GlTarget {
    pub surface: Surface<WindowSurface>,
    pub context: PossiblyCurrentContext,
}

impl GlTarget {
    pub fn resize(&self, size: PhysicalSize<u32>) {
        self.surface.resize(&self.context, non_zero(size.width), non_zero(size.height));
    }

    pub fn swap(&self) {
        if let Err(e) = self.surface.swap_buffers(&self.context) {
            tracing::warn!(error = %e, "swap_buffers failed");
        }
    }
}

#[derive(Debug)]
pub struct GlWindow {
    pub window: Window,
    pub target: Rc<GlTarget>,
}

impl GlWindow {
    /// Wrap `gl` as a backend that swaps this window's buffers on present.
    pub fn gpu(&self, gl: glow::Context) -> Result<GlowGpu, EngineError> {
        let target = Rc::clone(&self.target);
        Ok(GlowGpu::new(gl)?.with_present(move || target.swap()))
    }
}

fn non_zero(v: u32) -> NonZeroU32 {
    NonZeroU32::new(v.max(1)).unwrap_or(NonZeroU32::MIN)
}

/// Highest-sample candidate, or `None` when there were no candidates.
fn most_samples<T>(candidates: impl Iterator<Item = T>, samples: impl Fn(&T) -> u8) -> Option<T> {
    candidates.reduce(|a, b| if samples(&a) > samples(&b) { a } else { b })
}

fn pick_config(configs: impl Iterator<Item = Config>) -> Option<Config> {
    most_samples(configs, |c| c.num_samples())
}

fn display_preference(window: &Window) -> DisplayApiPreference {
    #[cfg(target_os = "windows")]
    {
        DisplayApiPreference::Wgl(Some(window.raw_window_handle()))
    }
    #[cfg(target_os = "macos")]
    {
        let _ = window;
        DisplayApiPreference::Cgl
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        let _ = window;
        DisplayApiPreference::Egl
    }
}

/// Open a window and make a GL context current on it.
///
/// Prefers an OpenGL ES 2.0 context (the shader dialect the filters are written in) and
/// falls back to the platform default.
pub fn make_gl(
    event_loop: &EventLoop<()>,
    title: &str,
    size: PhysicalSize<u32>,
) -> Result<(GlWindow, glow::Context), EngineError> {
    let window = WindowBuilder::new()
        .with_title(title)
        .with_inner_size(size)
        .build(event_loop)
        .map_err(|e| EngineError::GlCreate(format!("window creation failed: {e}")))?;
    let raw_window_handle = window.raw_window_handle();

    let gl_display = unsafe { Display::new(window.raw_display_handle(), display_preference(&window)) }
        .map_err(|e| EngineError::Unsupported(format!("no GL display: {e}")))?;

    let template = ConfigTemplateBuilder::new()
        .with_alpha_size(8)
        .with_depth_size(0)
        .with_stencil_size(0)
        .compatible_with_native_window(raw_window_handle)
        .build();
    let configs = unsafe { gl_display.find_configs(template) }
        .map_err(|e| EngineError::Unsupported(format!("no usable GL config: {e}")))?;
    let gl_config = pick_config(configs)
        .ok_or_else(|| EngineError::Unsupported("display offered no GL configs".into()))?;

    let gles = ContextAttributesBuilder::new()
        .with_context_api(ContextApi::Gles(Some(Version::new(2, 0))))
        .build(Some(raw_window_handle));
    let fallback = ContextAttributesBuilder::new().build(Some(raw_window_handle));
    let not_current = unsafe {
        gl_display
            .create_context(&gl_config, &gles)
            .or_else(|_| gl_display.create_context(&gl_config, &fallback))
    }
    .map_err(|e| EngineError::Unsupported(format!("create_context failed: {e}")))?;

    let attrs = window.build_surface_attributes(SurfaceAttributesBuilder::<WindowSurface>::new());
    let surface = unsafe { gl_display.create_window_surface(&gl_config, &attrs) }
        .map_err(|e| EngineError::GlCreate(format!("create_window_surface failed: {e}")))?;
    let context = not_current
        .make_current(&surface)
        .map_err(|e| EngineError::GlCreate(format!("make_current failed: {e}")))?;

    let gl = unsafe {
        glow::Context::from_loader_function(|s| match CString::new(s) {
            Ok(name) => gl_display.get_proc_address(&name) as *const _,
            Err(_) => std::ptr::null(),
        })
    };

    Ok((
        GlWindow {
            window,
            target: Rc::new(GlTarget { surface, context }),
        },
        gl,
    ))
}

#[cfg(test)]
mod tests {
    use super::most_samples;

    #[test]
    fn no_candidates_is_none() {
        assert_eq!(most_samples(std::iter::empty::<u8>(), |s| *s), None);
    }

    #[test]
    fn picks_the_most_samples() {
        let picked = most_samples([("a", 0u8), ("b", 4), ("c", 2)].into_iter(), |c| c.1);
        assert_eq!(picked, Some(("b", 4)));
    }

    #[test]
    fn ties_keep_the_later_candidate() {
        let picked = most_samples([("a", 4u8), ("b", 4)].into_iter(), |c| c.1);
        assert_eq!(picked, Some(("b", 4)));
    }
}
