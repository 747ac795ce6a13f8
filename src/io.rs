//! Graph sources and export errors
//!
//! A [`GraphSource`] produces a populated [`Graph`] before layout begins; the
//! layout engine never parses anything itself. The built-in source is the
//! set of synthetic generators.

use std::str::FromStr;

use thiserror::Error;

use crate::graph::Graph;

/// Errors that can occur while producing or exporting a graph
#[derive(Error, Debug)]
pub enum IoError {
    /// An I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The generator name or its arguments are not valid
    #[error("invalid generator: {0}")]
    InvalidGenerator(String),
}

/// Result type for graph source and export operations
pub type IoResult<T> = Result<T, IoError>;

/// Something that can produce a graph for layout
pub trait GraphSource {
    /// Build the graph
    fn load(&self) -> IoResult<Graph>;

    /// Short human-readable description (used in logs)
    fn describe(&self) -> String;
}

/// Kind of synthetic graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorKind {
    String,
    Ring,
    Tree,
    Hub,
}

impl FromStr for GeneratorKind {
    type Err = IoError;

    fn from_str(s: &str) -> IoResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "string" | "chain" => Ok(Self::String),
            "ring" => Ok(Self::Ring),
            "tree" => Ok(Self::Tree),
            "hub" | "star" => Ok(Self::Hub),
            other => Err(IoError::InvalidGenerator(other.to_string())),
        }
    }
}

/// Synthetic graph generator usable as a [`GraphSource`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generator {
    /// Chain of `n` nodes
    String(usize),
    /// Cycle of `n` nodes
    Ring(usize),
    /// Breadth-first tree
    Tree { nodes: usize, arity: usize },
    /// Star with `k` leaves
    Hub(usize),
}

impl Generator {
    /// Build a generator from its kind and size arguments.
    ///
    /// For [`GeneratorKind::Hub`], `nodes` is the total node count including
    /// the hub. `arity` is only used by trees and must be positive there.
    pub fn from_kind(kind: GeneratorKind, nodes: usize, arity: usize) -> IoResult<Self> {
        match kind {
            GeneratorKind::String => Ok(Self::String(nodes)),
            GeneratorKind::Ring => Ok(Self::Ring(nodes)),
            GeneratorKind::Tree if arity == 0 => Err(IoError::InvalidGenerator(
                "tree arity must be at least 1".to_string(),
            )),
            GeneratorKind::Tree => Ok(Self::Tree { nodes, arity }),
            GeneratorKind::Hub => Ok(Self::Hub(nodes.saturating_sub(1))),
        }
    }
}

impl GraphSource for Generator {
    fn load(&self) -> IoResult<Graph> {
        Ok(match *self {
            Self::String(n) => Graph::make_string(n),
            Self::Ring(n) => Graph::make_ring(n),
            Self::Tree { nodes, arity } => Graph::make_tree(nodes, arity),
            Self::Hub(k) => Graph::make_hub(k),
        })
    }

    fn describe(&self) -> String {
        match *self {
            Self::String(n) => format!("string({n})"),
            Self::Ring(n) => format!("ring({n})"),
            Self::Tree { nodes, arity } => format!("tree({nodes}, arity {arity})"),
            Self::Hub(k) => format!("hub({k} leaves)"),
        }
    }
}
