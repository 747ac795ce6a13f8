//! Flat particle and link records
//!
//! These are the numeric twins of graph nodes and edges. Everything here is a
//! plain value type; GPU packing happens in the `gpu` module, never here.

use crate::node::Color;

/// Layout state of one node.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Particle {
    /// Position in 3D space
    pub position: [f32; 3],
    /// Displacement applied by the last accepted step
    pub velocity: [f32; 3],
    /// Force (negative energy gradient) at `position`
    pub force: [f32; 3],
    /// Energy contribution of this particle
    pub energy: f32,
    pub mass: f32,
    /// Repulsion charge
    pub charge: f32,
    pub color: Color,
    pub size: f32,
    /// First entry of this particle's run in [`LinkTable::index`]
    pub link_offset: u32,
    /// Number of entries in that run
    pub link_count: u32,
}

impl Particle {
    /// Squared length of the force vector
    pub fn force_norm_squared(&self) -> f64 {
        self.force.iter().map(|&f| f as f64 * f as f64).sum()
    }
}

/// A spring between two particles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Link {
    pub end_a: u32,
    pub end_b: u32,
    /// Rest length before the rest-length scale is applied
    pub rest_length: f32,
}

impl Link {
    /// The endpoint opposite to `particle`; the particle itself for a self-loop.
    pub fn other(&self, particle: u32) -> u32 {
        if self.end_a == particle {
            self.end_b
        } else {
            self.end_a
        }
    }
}

/// Links plus the CSR index of incident links per particle.
///
/// `index[p.link_offset .. p.link_offset + p.link_count]` lists the links
/// incident to particle `p`. A self-loop is listed twice at its particle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkTable {
    pub links: Vec<Link>,
    pub index: Vec<u32>,
}

impl LinkTable {
    /// Links incident to `particle`, in insertion order
    pub fn incident<'a>(&'a self, particle: &Particle) -> impl Iterator<Item = &'a Link> + 'a {
        let start = particle.link_offset as usize;
        let end = start + particle.link_count as usize;
        self.index[start..end]
            .iter()
            .map(move |&l| &self.links[l as usize])
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

/// The current and next particle buffers.
///
/// Ownership of the accepted state moves by swapping the two vectors; the
/// particle data is never copied between them.
#[derive(Debug, Clone, Default)]
pub struct StateBuffers {
    pub current: Vec<Particle>,
    pub next: Vec<Particle>,
}

impl StateBuffers {
    pub fn new(particles: Vec<Particle>) -> Self {
        let next = particles.clone();
        Self {
            current: particles,
            next,
        }
    }

    /// Make the trial buffer the accepted one
    pub fn swap(&mut self) {
        std::mem::swap(&mut self.current, &mut self.next);
    }

    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_exchanges_buffers_without_copying() {
        let mut buffers = StateBuffers::new(vec![Particle::default(); 3]);
        buffers.next[0].position = [1.0, 2.0, 3.0];
        let next_ptr = buffers.next.as_ptr();

        buffers.swap();
        assert_eq!(buffers.current[0].position, [1.0, 2.0, 3.0]);
        assert_eq!(buffers.current.as_ptr(), next_ptr);
        assert_eq!(buffers.next[0].position, [0.0; 3]);
    }

    #[test]
    fn incident_links_follow_offsets() {
        let table = LinkTable {
            links: vec![
                Link {
                    end_a: 0,
                    end_b: 1,
                    rest_length: 1.0,
                },
                Link {
                    end_a: 1,
                    end_b: 2,
                    rest_length: 2.0,
                },
            ],
            index: vec![0, 0, 1, 1],
        };
        let middle = Particle {
            link_offset: 1,
            link_count: 2,
            ..Particle::default()
        };
        let rest: Vec<f32> = table.incident(&middle).map(|l| l.rest_length).collect();
        assert_eq!(rest, vec![1.0, 2.0]);
        assert_eq!(table.links[1].other(1), 2);
    }
}
