//! GPU compute backend (feature `gpu`)
//!
//! Runs the three layout kernels (evaluate, integrate, reduce) as wgpu
//! compute shaders. Particle state is packed into [`GpuParticle`] only here;
//! the engine keeps working on plain [`Particle`](crate::layout::Particle)
//! values.
//!
//! ```rust,ignore
//! use graphvis::gpu::GpuBackend;
//! use graphvis::layout::LayoutEngine;
//!
//! let backend = GpuBackend::new()?;
//! let mut engine = LayoutEngine::new(&backend, &config);
//! engine.load(&graph);
//! engine.tick(0);
//! ```

mod backend;
mod shaders;
mod types;

pub use backend::{GpuBackend, GpuError};
pub use shaders::LayoutShaders;
pub use types::{GpuLink, GpuParams, GpuParticle, GpuPartial, WORKGROUP_SIZE};
