//! Compute backends
//!
//! A [`ComputeBackend`] runs the three layout kernels over whole particle
//! buffers: force/energy evaluation, integration of a trial step and the
//! energy/dot-product reduction. The CPU backends share the per-particle
//! bodies in [`kernels`](crate::layout::kernels) and differ only in how the
//! work is scheduled, so their results agree up to summation order.

use std::iter::Sum;
use std::ops::Add;

use rayon::prelude::*;
use thiserror::Error;

use crate::config::BackendKind;
use crate::layout::kernels;
use crate::layout::particle::{LinkTable, Particle};

/// Particles per reduction block in the parallel backend
pub const BLOCK_SIZE: usize = 256;

/// Scalar inputs shared by all kernels
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ComputeParams {
    pub particle_count: u32,
    /// Trial step length used by `integrate`
    pub step_length: f32,
    pub spring_tension: f32,
    pub link_rest_length_scale: f32,
}

/// Output of [`ComputeBackend::reduce_energy_and_dot`]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Reduction {
    /// Total energy of the second state
    pub energy: f64,
    /// `-sum(F_a . F_b)`: the directional derivative along the first
    /// state's descent vector, evaluated at the second state
    pub dot: f64,
    /// Total mass of the second state
    pub checksum: f64,
}

impl Add for Reduction {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            energy: self.energy + rhs.energy,
            dot: self.dot + rhs.dot,
            checksum: self.checksum + rhs.checksum,
        }
    }
}

impl Sum for Reduction {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

/// Kernel execution unit used by the layout engine.
///
/// A kernel that returns an error may leave its output buffer in any state.
pub trait ComputeBackend {
    /// Write force and energy into every particle of `state`. Positions are
    /// left untouched.
    fn evaluate_forces_and_energy(
        &self,
        state: &mut [Particle],
        links: &LinkTable,
        params: &ComputeParams,
    ) -> BackendResult<()>;

    /// Copy `src` into `dst`, moving every particle by
    /// `params.step_length` times its force.
    fn integrate(
        &self,
        src: &[Particle],
        dst: &mut [Particle],
        params: &ComputeParams,
    ) -> BackendResult<()>;

    /// Reduce energy of `b` and the dot product of the forces of `a` and `b`.
    ///
    /// `partials` is scratch space for per-block sums; its contents on return
    /// are backend specific.
    fn reduce_energy_and_dot(
        &self,
        a: &[Particle],
        b: &[Particle],
        partials: &mut Vec<Reduction>,
        params: &ComputeParams,
    ) -> BackendResult<Reduction>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Sequential loops on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScalarBackend;

impl ComputeBackend for ScalarBackend {
    fn evaluate_forces_and_energy(
        &self,
        state: &mut [Particle],
        links: &LinkTable,
        params: &ComputeParams,
    ) -> BackendResult<()> {
        let sources = kernels::sources(state);
        for (i, particle) in state.iter_mut().enumerate() {
            kernels::evaluate_particle(i, particle, &sources, links, params);
        }
        Ok(())
    }

    fn integrate(
        &self,
        src: &[Particle],
        dst: &mut [Particle],
        params: &ComputeParams,
    ) -> BackendResult<()> {
        for (s, d) in src.iter().zip(dst.iter_mut()) {
            kernels::integrate_particle(s, d, params.step_length);
        }
        Ok(())
    }

    fn reduce_energy_and_dot(
        &self,
        a: &[Particle],
        b: &[Particle],
        partials: &mut Vec<Reduction>,
        _params: &ComputeParams,
    ) -> BackendResult<Reduction> {
        partials.clear();
        Ok(kernels::reduce_block(a, b))
    }

    fn name(&self) -> &'static str {
        "scalar"
    }
}

/// Data-parallel kernels on the rayon thread pool.
///
/// The reduction sums blocks of [`BLOCK_SIZE`] particles in parallel, leaves
/// the block sums in `partials` and adds them up serially.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParallelBackend;

impl ComputeBackend for ParallelBackend {
    fn evaluate_forces_and_energy(
        &self,
        state: &mut [Particle],
        links: &LinkTable,
        params: &ComputeParams,
    ) -> BackendResult<()> {
        let sources = kernels::sources(state);
        state
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, particle)| {
                kernels::evaluate_particle(i, particle, &sources, links, params)
            });
        Ok(())
    }

    fn integrate(
        &self,
        src: &[Particle],
        dst: &mut [Particle],
        params: &ComputeParams,
    ) -> BackendResult<()> {
        let step = params.step_length;
        dst.par_iter_mut()
            .zip(src.par_iter())
            .for_each(|(d, s)| kernels::integrate_particle(s, d, step));
        Ok(())
    }

    fn reduce_energy_and_dot(
        &self,
        a: &[Particle],
        b: &[Particle],
        partials: &mut Vec<Reduction>,
        _params: &ComputeParams,
    ) -> BackendResult<Reduction> {
        a.par_chunks(BLOCK_SIZE)
            .zip(b.par_chunks(BLOCK_SIZE))
            .map(|(block_a, block_b)| kernels::reduce_block(block_a, block_b))
            .collect_into_vec(partials);
        Ok(partials.iter().copied().sum())
    }

    fn name(&self) -> &'static str {
        "parallel"
    }
}

/// Errors raised while choosing a backend or running a kernel
#[derive(Error, Debug)]
pub enum BackendError {
    /// The binary was built without the `gpu` feature
    #[error("GPU backend not compiled in (enable the `gpu` feature)")]
    GpuNotCompiled,

    /// The GPU backend failed to start
    #[error("GPU backend unavailable: {0}")]
    GpuUnavailable(String),

    /// A kernel did not complete; its output must not be used
    #[error("{kernel} kernel failed: {reason}")]
    KernelFailed { kernel: &'static str, reason: String },
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Instantiate the backend selected by `kind`.
pub fn create_backend(kind: BackendKind) -> Result<Box<dyn ComputeBackend>, BackendError> {
    match kind {
        BackendKind::Scalar => Ok(Box::new(ScalarBackend)),
        BackendKind::Parallel => Ok(Box::new(ParallelBackend)),
        #[cfg(feature = "gpu")]
        BackendKind::Gpu => crate::gpu::GpuBackend::new()
            .map(|gpu| Box::new(gpu) as Box<dyn ComputeBackend>)
            .map_err(|e| BackendError::GpuUnavailable(e.to_string())),
        #[cfg(not(feature = "gpu"))]
        BackendKind::Gpu => Err(BackendError::GpuNotCompiled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayoutConfig;
    use crate::graph::Graph;
    use crate::layout::pool::ParticlePool;

    fn relative_eq(a: f64, b: f64, tolerance: f64) -> bool {
        (a - b).abs() <= tolerance * a.abs().max(b.abs()).max(1e-12)
    }

    fn tree_pool(nodes: usize) -> (ParticlePool, ComputeParams) {
        let config = LayoutConfig {
            seed: Some(7),
            ..LayoutConfig::default()
        };
        let pool = ParticlePool::from_graph(&Graph::make_tree(nodes, 3), &config);
        let params = ComputeParams {
            particle_count: nodes as u32,
            step_length: 0.25,
            spring_tension: config.spring_tension,
            link_rest_length_scale: config.link_rest_length_scale,
        };
        (pool, params)
    }

    #[test]
    fn parallel_and_scalar_agree() {
        // More than one reduction block
        let (pool, params) = tree_pool(700);
        let mut scalar_state = pool.particles.clone();
        let mut parallel_state = pool.particles.clone();

        ScalarBackend
            .evaluate_forces_and_energy(&mut scalar_state, &pool.links, &params)
            .unwrap();
        ParallelBackend
            .evaluate_forces_and_energy(&mut parallel_state, &pool.links, &params)
            .unwrap();

        let mut partials = Vec::new();
        let scalar = ScalarBackend.reduce_energy_and_dot(
            &scalar_state,
            &scalar_state,
            &mut partials,
            &params,
        )
        .unwrap();
        let parallel = ParallelBackend.reduce_energy_and_dot(
            &parallel_state,
            &parallel_state,
            &mut partials,
            &params,
        )
        .unwrap();

        assert_eq!(partials.len(), 700usize.div_ceil(BLOCK_SIZE));
        assert!(relative_eq(scalar.energy, parallel.energy, 1e-3));
        assert!(relative_eq(scalar.dot, parallel.dot, 1e-3));
        assert!(relative_eq(scalar.checksum, 700.0, 1e-9));
    }

    #[test]
    fn parallel_integrate_matches_scalar() {
        let (pool, params) = tree_pool(300);
        let mut state = pool.particles.clone();
        ParallelBackend
            .evaluate_forces_and_energy(&mut state, &pool.links, &params)
            .unwrap();

        let mut a = vec![Particle::default(); state.len()];
        let mut b = vec![Particle::default(); state.len()];
        ScalarBackend.integrate(&state, &mut a, &params).unwrap();
        ParallelBackend.integrate(&state, &mut b, &params).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn self_reduction_dot_is_negative_force_norm() {
        let (pool, params) = tree_pool(50);
        let mut state = pool.particles.clone();
        ScalarBackend
            .evaluate_forces_and_energy(&mut state, &pool.links, &params)
            .unwrap();

        let expected: f64 = -state.iter().map(Particle::force_norm_squared).sum::<f64>();
        let r = ParallelBackend
            .reduce_energy_and_dot(&state, &state, &mut Vec::new(), &params)
            .unwrap();
        assert!(relative_eq(r.dot, expected, 1e-9));
        assert!(r.dot < 0.0);
    }

    #[test]
    fn empty_state_reduces_to_zero() {
        let mut partials = vec![Reduction::default(); 4];
        let r = ParallelBackend
            .reduce_energy_and_dot(&[], &[], &mut partials, &ComputeParams::default())
            .unwrap();
        assert_eq!(r, Reduction::default());
        assert!(partials.is_empty());
    }

    #[test]
    fn scalar_and_parallel_are_always_available() {
        assert_eq!(create_backend(BackendKind::Scalar).unwrap().name(), "scalar");
        assert_eq!(create_backend(BackendKind::Parallel).unwrap().name(), "parallel");
    }
}
