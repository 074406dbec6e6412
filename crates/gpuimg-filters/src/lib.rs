#![forbid(unsafe_code)]

//! Built-in filters: shader sources, constructors and the registry that maps a
//! [`FilterKind`](gpuimg_core::FilterKind) to a constructor and a slider adjuster.
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_debug_implementations)]

pub mod blend;
pub mod blur;
pub mod color;
pub mod registry;

pub use blend::{alpha_blend, multiply_blend, overlay_blend};
pub use blur::box_blur;
pub use color::{
    brightness, color_invert, contrast, exposure, gamma, grayscale, opacity, saturation,
};
pub use registry::{range, Adjustable, Adjuster, AdjustFn, FilterEntry, FilterRegistry};
