//! Synthetic graph generators: chain, ring, breadth-first tree and hub
//!
//! Every generator produces plain nodes (no position, no label) joined by
//! edges with default rest length.

use std::collections::VecDeque;

use crate::graph::Graph;
use crate::node::Node;

impl Graph {
    /// Chain of `n` nodes joined by `n - 1` edges.
    pub fn make_string(n: usize) -> Self {
        let mut graph = Graph::new();
        for i in 0..n {
            graph.add_node(Node::new());
            if i > 0 {
                graph.add_edge(i - 1, i);
            }
        }
        graph
    }

    /// Cycle of `n` nodes joined by `n` edges; every node has degree 2.
    ///
    /// `n == 1` closes with a self-loop and `n == 2` with a parallel edge.
    pub fn make_ring(n: usize) -> Self {
        let mut graph = Self::make_string(n);
        if n > 0 {
            graph.add_edge(n - 1, 0);
        }
        graph
    }

    /// Tree of up to `n` nodes filled breadth-first, at most `arity`
    /// children per node.
    pub fn make_tree(n: usize, arity: usize) -> Self {
        let mut graph = Graph::new();
        if n == 0 {
            return graph;
        }
        let root = graph.add_node(Node::new());
        let mut children = vec![0usize];
        let mut frontier = VecDeque::from([root]);

        while graph.node_count() < n {
            let Some(&parent) = frontier.front() else {
                break;
            };
            if children[parent] >= arity {
                frontier.pop_front();
                continue;
            }
            graph.add_children(1, parent);
            children[parent] += 1;
            children.push(0);
            frontier.push_back(graph.node_count() - 1);
        }
        graph
    }

    /// Star with one hub (node 0) and `k` leaves.
    pub fn make_hub(k: usize) -> Self {
        let mut graph = Graph::new();
        let hub = graph.add_node(Node::new());
        if k > 0 {
            graph.add_children(k, hub);
        }
        graph
    }
}
