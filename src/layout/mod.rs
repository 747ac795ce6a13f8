//! Force-directed layout
//!
//! A [`Graph`](crate::graph::Graph) is flattened into a [`ParticlePool`],
//! then the [`LayoutEngine`] minimizes the layout energy with the kernels of
//! a [`ComputeBackend`] and the step length chosen by a [`StepController`].

pub mod backend;
pub mod engine;
pub mod kernels;
pub mod particle;
pub mod pool;
pub mod step;

pub use backend::{
    BLOCK_SIZE, BackendError, BackendResult, ComputeBackend, ComputeParams, ParallelBackend,
    Reduction, ScalarBackend, create_backend,
};
pub use engine::{LayoutEngine, LayoutStats, Phase, RunState};
pub use particle::{Link, LinkTable, Particle, StateBuffers};
pub use pool::ParticlePool;
pub use step::{Outcome, StepController, Workspace};
