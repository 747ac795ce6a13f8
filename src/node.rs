//! Graph node and edge records
//!
//! A node carries presentation attributes (size, color) plus two optional
//! attributes: a spatial position and a text label. Which of these are
//! populated decides how the node renders in the text export.

use std::fmt::Write as _;

/// RGBA color as normalized floats
pub type Color = [f32; 4];

/// Default node color: opaque white
pub const DEFAULT_COLOR: Color = [1.0, 1.0, 1.0, 1.0];

/// Default node size
pub const DEFAULT_SIZE: f32 = 1.0;

/// Default rest length of a new edge
pub const DEFAULT_REST_LENGTH: f32 = 1.0;

/// Default edge value (weight)
pub const DEFAULT_EDGE_VALUE: f32 = 1.0;

/// A node in a [`Graph`](crate::graph::Graph).
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Stable index assigned on insertion
    pub id: usize,
    /// Rendering size
    pub size: f32,
    /// RGBA color
    pub color: Color,
    /// Optional position in 3D space
    pub position: Option<[f32; 3]>,
    /// Optional label text
    pub label: Option<String>,
}

impl Node {
    /// Create a plain node with default size and color
    pub fn new() -> Self {
        Self {
            id: 0,
            size: DEFAULT_SIZE,
            color: DEFAULT_COLOR,
            position: None,
            label: None,
        }
    }

    /// Create a node at a fixed position
    pub fn at(x: f32, y: f32, z: f32) -> Self {
        Self::new().with_position([x, y, z])
    }

    /// Set the size
    pub fn with_size(mut self, size: f32) -> Self {
        self.size = size;
        self
    }

    /// Set the color
    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    /// Set the position
    pub fn with_position(mut self, position: [f32; 3]) -> Self {
        self.position = Some(position);
        self
    }

    /// Set the label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Flat `key:value` description used by the text export
    pub fn info(&self) -> String {
        let mut info = format!(
            "id:{},size:{},color:{}",
            self.id,
            self.size,
            color_hex(self.color)
        );
        if let Some([x, y, z]) = self.position {
            let _ = write!(info, ",x:{x},y:{y},z:{z}");
        }
        if let Some(label) = &self.label {
            info.push_str(",text:");
            escape_field(label, &mut info);
        }
        info
    }
}

/// Append `value` with the export separators backslash-escaped so it stays
/// a single field on a single line.
fn escape_field(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '\\' | ',' | ':' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}

/// An undirected edge between two nodes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    /// First endpoint
    pub end_a: usize,
    /// Second endpoint
    pub end_b: usize,
    /// Rest length, also used as the path weight for centrality
    pub rest_length: f32,
    /// Free-form edge value (weight)
    pub value: f32,
}

impl Edge {
    /// Create an edge with default rest length and value
    pub fn new(end_a: usize, end_b: usize) -> Self {
        Self {
            end_a,
            end_b,
            rest_length: DEFAULT_REST_LENGTH,
            value: DEFAULT_EDGE_VALUE,
        }
    }

    /// Returns the endpoint opposite to `node`.
    ///
    /// For a self-loop this is `node` itself.
    pub fn other(&self, node: usize) -> usize {
        if self.end_a == node {
            self.end_b
        } else {
            self.end_a
        }
    }

    /// Whether `node` is one of the endpoints
    pub fn touches(&self, node: usize) -> bool {
        self.end_a == node || self.end_b == node
    }

    /// Flat `key:value` description used by the text export
    pub fn info(&self) -> String {
        format!(
            "end1:{},end2:{},length:{},value:{}",
            self.end_a, self.end_b, self.rest_length, self.value
        )
    }
}

fn color_hex(color: Color) -> String {
    let channel = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
    format!(
        "#{:02X}{:02X}{:02X}{:02X}",
        channel(color[0]),
        channel(color[1]),
        channel(color[2]),
        channel(color[3])
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_node_info_has_no_optional_fields() {
        let node = Node::new();
        assert_eq!(node.info(), "id:0,size:1,color:#FFFFFFFF");
    }

    #[test]
    fn spatial_node_info_includes_coordinates() {
        let node = Node::at(1.5, -2.0, 0.0).with_color([1.0, 0.0, 0.0, 1.0]);
        assert_eq!(node.info(), "id:0,size:1,color:#FF0000FF,x:1.5,y:-2,z:0");
    }

    #[test]
    fn labelled_node_info_appends_text() {
        let node = Node::new().with_label("id=42").with_size(2.5);
        assert_eq!(node.info(), "id:0,size:2.5,color:#FFFFFFFF,text:id=42");
    }

    #[test]
    fn label_separators_are_escaped() {
        let node = Node::new().with_label("a,b:c\\d\nnext");
        let info = node.info();
        assert_eq!(
            info,
            r"id:0,size:1,color:#FFFFFFFF,text:a\,b\:c\\d\nnext"
        );
        assert_eq!(info.lines().count(), 1);
        // id, size, color, text
        assert_eq!(info.matches(",").count() - info.matches(r"\,").count(), 3);
    }

    #[test]
    fn edge_other_endpoint() {
        let edge = Edge::new(3, 7);
        assert_eq!(edge.other(3), 7);
        assert_eq!(edge.other(7), 3);
        assert!(edge.touches(3));
        assert!(!edge.touches(4));

        let self_loop = Edge::new(2, 2);
        assert_eq!(self_loop.other(2), 2);
    }

    #[test]
    fn edge_info_format() {
        let edge = Edge::new(0, 1);
        assert_eq!(edge.info(), "end1:0,end2:1,length:1,value:1");
    }
}
