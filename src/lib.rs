//! graphvis - force-directed 3D graph layout.
//!
//! Graphs are built with [`graph::Graph`] (by hand or with the synthetic
//! generators), then laid out by [`layout::LayoutEngine`] on a CPU or GPU
//! compute backend. The result can be exported as flat `key:value` text.

pub mod config;
pub mod generators;
pub mod graph;
pub mod io;
pub mod layout;
pub mod node;

#[cfg(feature = "gpu")]
pub mod gpu;
