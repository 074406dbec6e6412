#![forbid(unsafe_code)]

//! gpuimg core vocabulary.
//!
//! This crate is **contract-only**: no GPU handles, no threads, no windowing. It holds the
//! engine error type, the JSON engine configuration, the filter type tags and the
//! texture-coordinate tables shared by every filter and backend.
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_debug_implementations)]

pub mod config;
pub mod coords;
pub mod error;
pub mod kind;

pub use config::{load_engine_config_from, parse_engine_config, EngineConfig, RenderMode};
pub use coords::{texture_coords, Quad, Rotation, ScaleType, CUBE};
pub use error::EngineError;
pub use kind::FilterKind;
