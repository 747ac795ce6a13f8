//! Translation of a [`Graph`] into particle, link and link-index arrays
//!
//! Node `i` becomes particle `i`; edge order is preserved in the link array.
//! The rest-length stretch applied while inserting links depends on that
//! order, so the same graph always produces the same pool.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::LayoutConfig;
use crate::graph::Graph;
use crate::layout::particle::{Link, LinkTable, Particle};

/// Vectors shorter than this are rejected when sampling directions
const MIN_DIRECTION_LENGTH: f32 = 1e-6;

/// The flat arrays the layout engine works on.
#[derive(Debug, Clone, Default)]
pub struct ParticlePool {
    pub particles: Vec<Particle>,
    pub links: LinkTable,
}

impl ParticlePool {
    /// Build the pool for `graph`.
    ///
    /// Nodes without a position are scattered on a sphere of radius
    /// `config.initial_radius`, using `config.seed` when it is set.
    pub fn from_graph(graph: &Graph, config: &LayoutConfig) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut particles: Vec<Particle> = graph
            .nodes()
            .iter()
            .map(|node| Particle {
                position: node.position.unwrap_or_else(|| {
                    let [x, y, z] = random_unit_vector(&mut rng);
                    let r = config.initial_radius;
                    [x * r, y * r, z * r]
                }),
                mass: config.particle_mass,
                charge: config.repulsion_force,
                color: node.color,
                size: node.size,
                ..Particle::default()
            })
            .collect();

        let mut links = Vec::with_capacity(graph.edge_count());
        let mut incident: Vec<Vec<u32>> = vec![Vec::new(); particles.len()];

        for edge in graph.edges() {
            let id = links.len() as u32;
            links.push(Link {
                end_a: edge.end_a as u32,
                end_b: edge.end_b as u32,
                rest_length: edge.rest_length,
            });

            stretch(&mut links, &incident[edge.end_a], config.stretch_factor);
            if edge.end_b != edge.end_a {
                stretch(&mut links, &incident[edge.end_b], config.stretch_factor);
            }
            incident[edge.end_a].push(id);
            incident[edge.end_b].push(id);
        }

        let mut index = Vec::with_capacity(2 * links.len());
        for (particle, list) in particles.iter_mut().zip(&incident) {
            particle.link_offset = index.len() as u32;
            particle.link_count = list.len() as u32;
            index.extend_from_slice(list);
        }

        Self {
            particles,
            links: LinkTable { links, index },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }
}

fn stretch(links: &mut [Link], listed: &[u32], factor: f32) {
    for &l in listed {
        links[l as usize].rest_length *= factor;
    }
}

/// Uniform direction by rejection sampling the unit cube
fn random_unit_vector(rng: &mut impl Rng) -> [f32; 3] {
    loop {
        let v: [f32; 3] = [
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
        ];
        let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
        if len > 1.0 || len < MIN_DIRECTION_LENGTH {
            continue;
        }
        return [v[0] / len, v[1] / len, v[2] / len];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;

    const DEFAULT_FACTOR: f32 = crate::config::DEFAULT_STRETCH_FACTOR;

    fn seeded() -> LayoutConfig {
        LayoutConfig {
            seed: Some(42),
            ..LayoutConfig::default()
        }
    }

    #[test]
    fn positions_are_copied_or_on_the_shell() {
        let mut graph = Graph::new();
        graph.add_node(Node::at(1.0, 2.0, 3.0));
        graph.add_node(Node::new());

        let config = seeded();
        let pool = ParticlePool::from_graph(&graph, &config);
        assert_eq!(pool.particles[0].position, [1.0, 2.0, 3.0]);

        let [x, y, z] = pool.particles[1].position;
        let radius = (x * x + y * y + z * z).sqrt();
        assert!((radius - config.initial_radius).abs() < 1e-2);
        assert_eq!(pool.particles[1].charge, config.repulsion_force);
        assert_eq!(pool.particles[1].mass, config.particle_mass);
    }

    #[test]
    fn seed_makes_placement_reproducible() {
        let graph = Graph::make_ring(8);
        let a = ParticlePool::from_graph(&graph, &seeded());
        let b = ParticlePool::from_graph(&graph, &seeded());
        assert_eq!(a.particles, b.particles);
    }

    #[test]
    fn stretch_applies_once_per_later_insertion() {
        // Hub with three leaves: link 0 is stretched by links 1 and 2,
        // link 1 by link 2, link 2 never.
        let graph = Graph::make_hub(3);
        let pool = ParticlePool::from_graph(&graph, &seeded());
        let rest: Vec<f32> = pool.links.links.iter().map(|l| l.rest_length).collect();

        let f = DEFAULT_FACTOR;
        assert!((rest[0] - f * f).abs() < 1e-6);
        assert!((rest[1] - f).abs() < 1e-6);
        assert!((rest[2] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn stretch_counts_both_endpoints() {
        // 0-1, 1-2, then 0-2 stretches link 0 at both ends and link 1 at node 2
        let mut graph = Graph::make_string(3);
        graph.add_edge(0, 2);
        let pool = ParticlePool::from_graph(&graph, &seeded());
        let rest: Vec<f32> = pool.links.links.iter().map(|l| l.rest_length).collect();

        let f = DEFAULT_FACTOR;
        // link 0 stretched by link 1 (at node 1) and by link 2 (at node 0)
        assert!((rest[0] - f * f).abs() < 1e-6);
        // link 1 stretched by link 2 (at node 2)
        assert!((rest[1] - f).abs() < 1e-6);
        assert!((rest[2] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn csr_table_lists_every_link_twice() {
        let graph = Graph::make_tree(10, 3);
        let pool = ParticlePool::from_graph(&graph, &seeded());

        assert_eq!(pool.links.index.len(), 2 * graph.edge_count());
        let total: u32 = pool.particles.iter().map(|p| p.link_count).sum();
        assert_eq!(total as usize, 2 * graph.edge_count());

        for (i, particle) in pool.particles.iter().enumerate() {
            assert_eq!(particle.link_count as usize, graph.degree(i));
            for link in pool.links.incident(particle) {
                assert!(link.end_a as usize == i || link.end_b as usize == i);
            }
        }
    }

    #[test]
    fn empty_graph_gives_empty_pool() {
        let pool = ParticlePool::from_graph(&Graph::new(), &seeded());
        assert!(pool.is_empty());
        assert!(pool.links.is_empty());
    }
}
