//! Duetboard Render Library
//!
//! Surface abstraction, deterministic reconstruction of the stroke log,
//! surface sizing and the per-client canvas controller.

pub mod cpu;
pub mod live;
pub mod reconstruct;
pub mod shared;
pub mod sizing;
pub mod surface;

#[cfg(target_arch = "wasm32")]
pub mod web;

pub use cpu::{CpuSurface, Snapshot};
pub use live::paint_action;
pub use reconstruct::Reconstructor;
pub use shared::SharedCanvas;
pub use sizing::{ResizeOutcome, SurfaceSizer};
pub use surface::{Surface, SurfaceError, SurfaceResult};

#[cfg(target_arch = "wasm32")]
pub use web::WebCanvasSurface;
