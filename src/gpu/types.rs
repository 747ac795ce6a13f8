//! GPU buffer types for the layout kernels
//!
//! These mirror the WGSL structs in [`shaders`](super::shaders) byte for
//! byte. They exist only at the backend boundary; the engine works on
//! [`Particle`] and [`Link`].

use bytemuck::{Pod, Zeroable};

use crate::layout::{ComputeParams, Link, Particle};

/// Threads per workgroup for every kernel
pub const WORKGROUP_SIZE: u32 = 256;

/// A particle as laid out in a WGSL storage buffer.
///
/// Each `vec3<f32>` is 16-byte aligned in WGSL, so a scalar is packed into
/// the fourth lane of each one.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuParticle {
    pub position: [f32; 3],
    pub energy: f32,
    pub force: [f32; 3],
    pub mass: f32,
    pub velocity: [f32; 3],
    pub charge: f32,
    pub color: [f32; 4],
    pub size: f32,
    pub link_offset: u32,
    pub link_count: u32,
    /// Padding to the 16-byte struct alignment
    pub _padding: u32,
}

impl From<&Particle> for GpuParticle {
    fn from(p: &Particle) -> Self {
        Self {
            position: p.position,
            energy: p.energy,
            force: p.force,
            mass: p.mass,
            velocity: p.velocity,
            charge: p.charge,
            color: p.color,
            size: p.size,
            link_offset: p.link_offset,
            link_count: p.link_count,
            _padding: 0,
        }
    }
}

impl From<&GpuParticle> for Particle {
    fn from(p: &GpuParticle) -> Self {
        Self {
            position: p.position,
            velocity: p.velocity,
            force: p.force,
            energy: p.energy,
            mass: p.mass,
            charge: p.charge,
            color: p.color,
            size: p.size,
            link_offset: p.link_offset,
            link_count: p.link_count,
        }
    }
}

/// A link as laid out in a WGSL storage buffer
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuLink {
    pub end_a: u32,
    pub end_b: u32,
    pub rest_length: f32,
    pub _padding: f32,
}

impl From<&Link> for GpuLink {
    fn from(l: &Link) -> Self {
        Self {
            end_a: l.end_a,
            end_b: l.end_b,
            rest_length: l.rest_length,
            _padding: 0.0,
        }
    }
}

/// Kernel parameters (uniform buffer)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuParams {
    pub particle_count: u32,
    pub step_length: f32,
    pub spring_tension: f32,
    pub link_rest_length_scale: f32,
}

impl From<&ComputeParams> for GpuParams {
    fn from(p: &ComputeParams) -> Self {
        Self {
            particle_count: p.particle_count,
            step_length: p.step_length,
            spring_tension: p.spring_tension,
            link_rest_length_scale: p.link_rest_length_scale,
        }
    }
}

/// One workgroup's reduction result
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct GpuPartial {
    pub energy: f32,
    pub dot: f32,
    pub checksum: f32,
    pub _padding: f32,
}
