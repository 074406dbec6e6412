#![forbid(unsafe_code)]

//! Backend-agnostic filter engine.
//!
//! Filters, groups and the renderer talk to the graphics API only through the [`Gpu`] context
//! passed into each call. Backends (`gpuimg-runtime-glow`, `gpuimg-runtime-soft`) implement it.
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_debug_implementations)]

pub mod facade;
pub mod filter;
pub mod gpu;
pub mod group;
pub mod offscreen;
pub mod program;
pub mod queue;
pub mod renderer;
pub mod two_input;
pub mod two_pass;

#[cfg(test)]
mod testing;

pub use gpuimg_core::{EngineError, FilterKind, Quad, Rotation, ScaleType};
pub use image::RgbaImage;

pub use facade::{GpuImage, LiveSource};
pub use filter::{Filter, ShaderFilter, NO_FILTER_FRAGMENT_SHADER, NO_FILTER_VERTEX_SHADER};
pub use gpu::{
    check_error, AttribLocation, FramebufferId, Gpu, ProgramId, RenderTarget, TextureId,
    UniformLocation, UniformValue,
};
pub use group::FilterGroup;
pub use offscreen::{read_surface, render_batch, OffscreenBuffer};
pub use program::ShaderProgram;
pub use queue::{Command, CommandQueue, CommandSender};
pub use renderer::{FrameGeometry, Renderer, RendererCommand};
pub use two_input::{TwoInputFilter, TWO_INPUT_VERTEX_SHADER};
pub use two_pass::{TexelRatio, TwoPassFilter};
