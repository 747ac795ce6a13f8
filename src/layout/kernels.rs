//! Per-particle kernel bodies shared by the CPU backends
//!
//! Energy of particle `i`:
//!
//! ```text
//! e_i = sum_{j != i} q_i q_j / r_ij  +  sum_{links at i} k/2 (r - L s)^2
//! ```
//!
//! with the softened distance `r_ij = sqrt(|p_i - p_j|^2 + eps^2)`. Every
//! pair and every link is counted once from each end, so the total energy is
//! half the sum of the per-particle values. Accumulation is done in f64.

use crate::layout::backend::{ComputeParams, Reduction};
use crate::layout::particle::{LinkTable, Particle};

/// Softening length for the repulsion term
pub const SOFTENING: f64 = 1e-3;

/// Position and charge of one particle, captured before forces are written
pub type Source = ([f32; 3], f32);

/// Capture the read-only inputs of the evaluation kernel
pub fn sources(state: &[Particle]) -> Vec<Source> {
    state.iter().map(|p| (p.position, p.charge)).collect()
}

fn delta(a: [f32; 3], b: [f32; 3]) -> [f64; 3] {
    [
        a[0] as f64 - b[0] as f64,
        a[1] as f64 - b[1] as f64,
        a[2] as f64 - b[2] as f64,
    ]
}

fn norm_squared(d: [f64; 3]) -> f64 {
    d[0] * d[0] + d[1] * d[1] + d[2] * d[2]
}

/// Compute force and energy of particle `i` and store them in `particle`.
pub fn evaluate_particle(
    i: usize,
    particle: &mut Particle,
    sources: &[Source],
    links: &LinkTable,
    params: &ComputeParams,
) {
    let (p_i, q_i) = sources[i];
    let q_i = q_i as f64;
    let mut force = [0.0f64; 3];
    let mut energy = 0.0f64;

    for (j, &(p_j, q_j)) in sources.iter().enumerate() {
        if j == i {
            continue;
        }
        let d = delta(p_i, p_j);
        let r2 = norm_squared(d) + SOFTENING * SOFTENING;
        let r = r2.sqrt();
        let qq = q_i * q_j as f64;
        energy += qq / r;
        let scale = qq / (r2 * r);
        for (f, d) in force.iter_mut().zip(d) {
            *f += scale * d;
        }
    }

    let k = params.spring_tension as f64;
    let self_index = i as u32;
    for link in links.incident(particle) {
        let other = link.other(self_index) as usize;
        let d = delta(p_i, sources[other].0);
        let r = norm_squared(d).sqrt();
        let rest = link.rest_length as f64 * params.link_rest_length_scale as f64;
        let stretch = r - rest;
        energy += 0.5 * k * stretch * stretch;
        if r > 0.0 {
            let scale = -k * stretch / r;
            for (f, d) in force.iter_mut().zip(d) {
                *f += scale * d;
            }
        }
    }

    particle.force = force.map(|f| f as f32);
    particle.energy = energy as f32;
}

/// Move one particle along its force by `step`.
pub fn integrate_particle(src: &Particle, dst: &mut Particle, step: f32) {
    *dst = *src;
    for axis in 0..3 {
        let displacement = step * src.force[axis];
        dst.position[axis] += displacement;
        dst.velocity[axis] = displacement;
    }
}

/// Serial reduction over matching slices of the two states.
pub fn reduce_block(a: &[Particle], b: &[Particle]) -> Reduction {
    let mut sum = Reduction::default();
    for (pa, pb) in a.iter().zip(b) {
        sum.energy += pb.energy as f64;
        sum.dot -= pa
            .force
            .iter()
            .zip(&pb.force)
            .map(|(&fa, &fb)| fa as f64 * fb as f64)
            .sum::<f64>();
        sum.checksum += pb.mass as f64;
    }
    sum.energy *= 0.5;
    sum
}
