//! Graph model: an append-only node/edge container with adjacency lists
//!
//! Node ids are insertion indices and never change. Edges are kept in
//! insertion order; that order matters downstream because the particle pool
//! replays it when building link rest lengths.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::io::IoResult;
use crate::node::{Edge, Node};

/// Node/edge container with per-node incident edge lists.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    adjacency: Vec<Vec<usize>>,
    orphaned: Vec<bool>,
}

impl Graph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes, including orphaned ones
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// All nodes, indexed by id
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// All edges in insertion order
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Incident edge indices of a node
    pub fn adjacency(&self, node: usize) -> &[usize] {
        &self.adjacency[node]
    }

    /// Number of incident edge slots (a self-loop counts twice)
    pub fn degree(&self, node: usize) -> usize {
        self.adjacency[node].len()
    }

    /// Neighbor ids in incident-edge order (duplicates for parallel edges)
    pub fn neighbors(&self, node: usize) -> impl Iterator<Item = usize> + '_ {
        self.adjacency[node]
            .iter()
            .map(move |&e| self.edges[e].other(node))
    }

    /// Whether the node lost all of its edges to a merge
    pub fn is_orphaned(&self, node: usize) -> bool {
        self.orphaned.get(node).copied().unwrap_or(false)
    }

    /// Append a node and return its id
    pub fn add_node(&mut self, mut node: Node) -> usize {
        let id = self.nodes.len();
        node.id = id;
        self.nodes.push(node);
        self.adjacency.push(Vec::new());
        self.orphaned.push(false);
        id
    }

    /// Append an edge with default rest length and value.
    ///
    /// Returns `false` if either endpoint is out of range.
    pub fn add_edge(&mut self, a: usize, b: usize) -> bool {
        self.push_edge(Edge::new(a, b))
    }

    /// Append an edge with explicit rest length and value.
    pub fn add_edge_with(&mut self, a: usize, b: usize, rest_length: f32, value: f32) -> bool {
        self.push_edge(Edge {
            end_a: a,
            end_b: b,
            rest_length,
            value,
        })
    }

    fn push_edge(&mut self, edge: Edge) -> bool {
        if edge.end_a >= self.nodes.len() || edge.end_b >= self.nodes.len() {
            return false;
        }
        let index = self.edges.len();
        self.edges.push(edge);
        self.adjacency[edge.end_a].push(index);
        self.adjacency[edge.end_b].push(index);
        true
    }

    /// Attach `count` new leaf nodes to `parent`.
    ///
    /// Returns `false` (and changes nothing) if `count` is zero or `parent`
    /// does not exist.
    pub fn add_children(&mut self, count: usize, parent: usize) -> bool {
        if count == 0 || parent >= self.nodes.len() {
            return false;
        }
        for _ in 0..count {
            let child = self.add_node(Node::new());
            self.add_edge(parent, child);
        }
        true
    }

    /// Rest length of the first edge joining `a` and `b`.
    ///
    /// # Panics
    ///
    /// Panics if the nodes are not adjacent. Asking for the distance between
    /// non-adjacent nodes is a caller bug.
    pub fn rest_length(&self, a: usize, b: usize) -> f32 {
        self.adjacency[a]
            .iter()
            .map(|&e| &self.edges[e])
            .find(|edge| edge.other(a) == b)
            .map(|edge| edge.rest_length)
            .unwrap_or_else(|| panic!("nodes {a} and {b} are not adjacent"))
    }

    /// Shortest path distances from `source`, weighted by edge rest length.
    ///
    /// Unreachable nodes get `f64::INFINITY`.
    pub fn shortest_paths(&self, source: usize) -> Vec<f64> {
        let mut distances = vec![f64::INFINITY; self.nodes.len()];
        let mut estimates: HashMap<usize, f64> =
            (0..self.nodes.len()).map(|i| (i, f64::INFINITY)).collect();
        estimates.insert(source, 0.0);

        while !estimates.is_empty() {
            // Linear scan for the cheapest remaining node
            let Some((&cheapest, &estimate)) = estimates
                .iter()
                .min_by(|a, b| a.1.total_cmp(b.1).then(a.0.cmp(b.0)))
            else {
                break;
            };
            estimates.remove(&cheapest);
            if estimate.is_infinite() {
                // Everything left is unreachable
                break;
            }
            distances[cheapest] = estimate;

            for &e in &self.adjacency[cheapest] {
                let edge = &self.edges[e];
                let neighbor = edge.other(cheapest);
                if let Some(current) = estimates.get_mut(&neighbor) {
                    let candidate = estimate + f64::from(edge.rest_length);
                    if *current > candidate {
                        *current = candidate;
                    }
                }
            }
        }
        distances
    }

    /// Closeness centrality: inverse of the summed distances to every
    /// reachable node. Zero when nothing else is reachable.
    pub fn centrality(&self, node: usize) -> f64 {
        let total: f64 = self
            .shortest_paths(node)
            .iter()
            .enumerate()
            .filter(|&(other, d)| other != node && d.is_finite())
            .map(|(_, d)| d)
            .sum();
        if total > 0.0 { 1.0 / total } else { 0.0 }
    }

    /// Move every edge of the higher-indexed node onto the lower one.
    ///
    /// The higher node stays in the node list with an empty adjacency and is
    /// flagged as orphaned. Returns `false` if either id is out of range.
    pub fn merge_nodes(&mut self, a: usize, b: usize) -> bool {
        if a >= self.nodes.len() || b >= self.nodes.len() {
            return false;
        }
        if a == b {
            return true;
        }
        let (survivor, orphan) = if a < b { (a, b) } else { (b, a) };

        let moved = std::mem::take(&mut self.adjacency[orphan]);
        for e in moved {
            let edge = &mut self.edges[e];
            if edge.end_a == orphan {
                edge.end_a = survivor;
            }
            if edge.end_b == orphan {
                edge.end_b = survivor;
            }
            self.adjacency[survivor].push(e);
        }
        self.orphaned[orphan] = true;
        true
    }

    /// Merge the two endpoints of an edge.
    pub fn collapse_edge(&mut self, edge: usize) -> bool {
        match self.edges.get(edge) {
            Some(&Edge { end_a, end_b, .. }) => self.merge_nodes(end_a, end_b),
            None => false,
        }
    }

    /// Write the text dump: one line per node, then one line per edge.
    pub fn write_to<W: Write>(&self, out: &mut W) -> IoResult<()> {
        for node in &self.nodes {
            writeln!(out, "{}", node.info())?;
        }
        for edge in &self.edges {
            writeln!(out, "{}", edge.info())?;
        }
        Ok(())
    }

    /// Write the text dump to a file, replacing it if present.
    pub fn write_to_file(&self, path: &Path) -> IoResult<()> {
        let mut out = BufWriter::new(File::create(path)?);
        self.write_to(&mut out)?;
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn path_graph(n: usize) -> Graph {
        let mut graph = Graph::new();
        for _ in 0..n {
            graph.add_node(Node::new());
        }
        for i in 1..n {
            graph.add_edge(i - 1, i);
        }
        graph
    }

    #[test]
    fn node_ids_match_insertion_index() {
        let mut graph = Graph::new();
        assert_eq!(graph.add_node(Node::new()), 0);
        assert_eq!(graph.add_node(Node::at(1.0, 2.0, 3.0)), 1);
        assert_eq!(graph.nodes()[1].id, 1);
    }

    #[test]
    fn add_edge_rejects_bad_indices() {
        let mut graph = path_graph(2);
        assert!(!graph.add_edge(0, 5));
        assert!(!graph.add_edge(9, 0));
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn parallel_edges_are_kept() {
        let mut graph = path_graph(2);
        assert!(graph.add_edge(0, 1));
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.degree(0), 2);
        assert_eq!(graph.neighbors(0).collect::<Vec<_>>(), vec![1, 1]);
    }

    #[test]
    fn add_children_rejects_bad_arguments() {
        let mut graph = path_graph(1);
        assert!(!graph.add_children(0, 0));
        assert!(!graph.add_children(3, 1));
        assert_eq!(graph.node_count(), 1);

        assert!(graph.add_children(3, 0));
        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.degree(0), 3);
    }

    #[test]
    fn rest_length_of_adjacent_nodes() {
        let mut graph = path_graph(3);
        graph.add_edge_with(0, 2, 4.5, 2.0);
        assert_eq!(graph.rest_length(0, 1), 1.0);
        assert_eq!(graph.rest_length(2, 0), 4.5);
    }

    #[test]
    #[should_panic(expected = "not adjacent")]
    fn rest_length_of_non_adjacent_nodes_panics() {
        let graph = path_graph(3);
        graph.rest_length(0, 2);
    }

    #[test]
    fn shortest_paths_follow_rest_lengths() {
        let mut graph = path_graph(4);
        graph.add_edge_with(0, 3, 10.0, 1.0);
        let d = graph.shortest_paths(0);
        assert_eq!(d, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn centrality_of_path_center_beats_endpoint() {
        let graph = path_graph(5);
        // center: 1+1+2+2 = 6; endpoint: 1+2+3+4 = 10
        assert!((graph.centrality(2) - 1.0 / 6.0).abs() < 1e-12);
        assert!((graph.centrality(0) - 1.0 / 10.0).abs() < 1e-12);
    }

    #[test]
    fn isolated_node_has_zero_centrality() {
        let mut graph = path_graph(3);
        let lonely = graph.add_node(Node::new());
        assert_eq!(graph.centrality(lonely), 0.0);

        let single = path_graph(1);
        assert_eq!(single.centrality(0), 0.0);
    }

    #[test]
    fn merge_moves_edges_to_lower_node() {
        // 0 - 1 - 2, 2 - 3
        let mut graph = path_graph(4);
        assert!(graph.merge_nodes(2, 1));

        assert!(graph.adjacency(2).is_empty());
        assert!(graph.is_orphaned(2));
        assert!(!graph.is_orphaned(1));
        assert_eq!(graph.edge_count(), 3);
        for edge in graph.edges() {
            assert!(!edge.touches(2), "edge {edge:?} still references orphan");
        }
        // 1 keeps 0-1, gains the 1-1 loop (twice) and 1-3
        assert_eq!(graph.degree(1), 4);
        assert_eq!(graph.node_count(), 4);
    }

    #[test]
    fn merge_rejects_out_of_range() {
        let mut graph = path_graph(2);
        assert!(!graph.merge_nodes(0, 2));
        assert!(graph.merge_nodes(1, 1));
        assert!(!graph.is_orphaned(1));
    }

    #[test]
    fn collapse_edge_merges_endpoints() {
        let mut graph = path_graph(3);
        assert!(graph.collapse_edge(1));
        assert!(graph.is_orphaned(2));
        assert!(graph.adjacency(2).is_empty());
        assert!(!graph.collapse_edge(7));
    }

    #[test]
    fn text_dump_lists_nodes_then_edges() {
        let mut graph = Graph::new();
        graph.add_node(Node::at(0.0, 1.0, 2.0));
        graph.add_node(Node::new().with_label("leaf"));
        graph.add_edge_with(0, 1, 2.5, 3.0);

        let mut out = Vec::new();
        graph.write_to(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        insta::assert_snapshot!(text.trim_end(), @r"
        id:0,size:1,color:#FFFFFFFF,x:0,y:1,z:2
        id:1,size:1,color:#FFFFFFFF,text:leaf
        end1:0,end2:1,length:2.5,value:3
        ");
    }

    #[test]
    fn write_to_file_creates_dump() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.txt");
        path_graph(3).write_to_file(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 5);
        assert!(text.lines().nth(3).unwrap().starts_with("end1:0,end2:1"));
    }

    proptest! {
        #[test]
        fn add_children_accumulates_node_count(
            calls in prop::collection::vec((0usize..5, 0usize..20), 0..30),
        ) {
            let mut graph = path_graph(1);
            let mut expected = 1;
            for (count, parent) in calls {
                let ok = graph.add_children(count, parent);
                prop_assert_eq!(ok, count > 0 && parent < expected);
                if ok {
                    expected += count;
                }
            }
            prop_assert_eq!(graph.node_count(), expected);
            for (index, node) in graph.nodes().iter().enumerate() {
                prop_assert_eq!(node.id, index);
            }
        }

        #[test]
        fn merge_never_drops_edges(n in 2usize..12, a in 0usize..12, b in 0usize..12) {
            let mut graph = path_graph(n);
            let before = graph.edge_count();
            let ok = graph.merge_nodes(a, b);
            prop_assert_eq!(ok, a < n && b < n);
            prop_assert_eq!(graph.edge_count(), before);

            let slots: usize = (0..n).map(|i| graph.degree(i)).sum();
            prop_assert_eq!(slots, 2 * graph.edge_count());
            for (index, adjacency) in (0..n).map(|i| (i, graph.adjacency(i))) {
                for &e in adjacency {
                    prop_assert!(graph.edges()[e].touches(index));
                }
            }
        }
    }
}
