//! Shaders and shader graphs.
//!
//! A [`Shader`] owns one [`ShaderGraph`]: a list of [`ShaderNode`]s addressed
//! by index plus the links between their sockets. Every graph starts with an
//! output node at ID 0, so a freshly created shader can be wired up without
//! adding one.

mod kind;
mod node;
mod socket;

pub use kind::ShaderNodeKind;
pub use node::{
    Distribution, ImageData, ImagePixels, ImageSettings, MappingAxis, MappingComponent,
    MappingProjection, MappingType, MathOp, MixBlend, NodeSettings, ShaderNode,
    SubsurfaceFalloff, TextureMapping, VectorMathOp,
};
pub use socket::{InputSocket, SocketSpec, SocketType, SocketValue};

use glam::Vec3;

use crate::error::{HostError, HostResult};
use crate::handle::HandleKind;

/// ID of the output node every graph is created with.
pub const OUTPUT_NODE: u32 = 0;

/// A connection from an output socket to an input socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    pub from_node: u32,
    pub from_socket: &'static str,
    pub to_node: u32,
    pub to_socket: &'static str,
}

/// Directed graph of shader nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderGraph {
    nodes: Vec<ShaderNode>,
    links: Vec<Link>,
}

impl Default for ShaderGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ShaderGraph {
    /// A graph holding only the output node.
    pub fn new() -> Self {
        Self {
            nodes: vec![ShaderNode::new(OUTPUT_NODE, ShaderNodeKind::Output)],
            links: Vec::new(),
        }
    }

    /// Adds a node and returns its ID.
    pub fn add(&mut self, kind: ShaderNodeKind) -> u32 {
        let id = self.nodes.len() as u32;
        self.nodes.push(ShaderNode::new(id, kind));
        id
    }

    pub fn node(&self, id: u32) -> HostResult<&ShaderNode> {
        self.nodes
            .get(id as usize)
            .ok_or(HostError::invalid(HandleKind::ShaderNode, u64::from(id)))
    }

    pub fn node_mut(&mut self, id: u32) -> HostResult<&mut ShaderNode> {
        self.nodes
            .get_mut(id as usize)
            .ok_or(HostError::invalid(HandleKind::ShaderNode, u64::from(id)))
    }

    pub fn nodes(&self) -> &[ShaderNode] {
        &self.nodes
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Connects output `from` of node `from_id` to input `to` of node `to_id`.
    ///
    /// An input accepts one link; connecting it again replaces the old link.
    pub fn connect(&mut self, from_id: u32, from: &str, to_id: u32, to: &str) -> HostResult<()> {
        let from_kind = self.node(from_id)?.kind();
        let to_kind = self.node(to_id)?.kind();
        if from_id == to_id {
            return Err(HostError::argument(format!("node {from_id} cannot feed itself")));
        }

        let output = from_kind.output(from).ok_or_else(|| HostError::UnknownAttribute {
            kind: from_kind,
            name: from.to_string(),
            value_type: "output socket",
        })?;
        let input = to_kind.input(to).ok_or_else(|| HostError::UnknownAttribute {
            kind: to_kind,
            name: to.to_string(),
            value_type: "input socket",
        })?;
        if !output.ty.connects_to(input.ty) {
            return Err(HostError::argument(format!(
                "cannot connect {:?} output '{}' to {:?} input '{}'",
                output.ty, output.name, input.ty, input.name
            )));
        }

        self.links
            .retain(|link| !(link.to_node == to_id && link.to_socket == input.name));
        self.links.push(Link {
            from_node: from_id,
            from_socket: output.name,
            to_node: to_id,
            to_socket: input.name,
        });
        Ok(())
    }

    /// The link feeding input `socket` of node `node`, if any.
    pub fn link_into(&self, node: u32, socket: &str) -> Option<&Link> {
        self.links
            .iter()
            .find(|link| link.to_node == node && link.to_socket == socket)
    }
}

/// A material: a named shader graph plus its flags.
#[derive(Debug, Clone, PartialEq)]
pub struct Shader {
    pub name: String,
    pub use_mis: bool,
    pub use_transparent_shadow: bool,
    pub heterogeneous_volume: bool,
    /// Whether the shader is referenced by the scene (tag-used).
    pub used: bool,
    pub(crate) graph: ShaderGraph,
    pub(crate) dirty: bool,
}

impl Default for Shader {
    fn default() -> Self {
        Self {
            name: String::new(),
            use_mis: true,
            use_transparent_shadow: true,
            heterogeneous_volume: true,
            used: false,
            graph: ShaderGraph::new(),
            dirty: true,
        }
    }
}

impl Shader {
    /// An empty shader (output node only).
    pub fn new() -> Self {
        Self::default()
    }

    /// The plain diffuse surface used when nothing else is assigned.
    pub fn default_surface() -> Self {
        let mut shader = Self {
            name: "default_surface".to_string(),
            ..Self::default()
        };
        let diffuse = shader.graph.add(ShaderNodeKind::Diffuse);
        // Sockets are known to exist, so the results can be ignored.
        let _ = shader
            .graph
            .node_mut(diffuse)
            .and_then(|node| node.set_attribute_vec("Color", Vec3::splat(0.8)));
        let _ = shader.graph.connect(diffuse, "BSDF", OUTPUT_NODE, "Surface");
        shader
    }

    /// An emission shader used for lights.
    pub fn default_light() -> Self {
        let mut shader = Self {
            name: "default_light".to_string(),
            ..Self::default()
        };
        let emission = shader.graph.add(ShaderNodeKind::Emission);
        let _ = shader.graph.node_mut(emission).and_then(|node| {
            node.set_attribute_vec("Color", Vec3::ONE)?;
            node.set_attribute_float("Strength", 1.0)
        });
        let _ = shader.graph.connect(emission, "Emission", OUTPUT_NODE, "Surface");
        shader
    }

    pub fn graph(&self) -> &ShaderGraph {
        &self.graph
    }

    /// Mutable graph access. Marks the shader dirty.
    pub fn graph_mut(&mut self) -> &mut ShaderGraph {
        self.dirty = true;
        &mut self.graph
    }

    /// Replaces the graph with a fresh one holding only the output node.
    pub fn new_graph(&mut self) {
        self.graph = ShaderGraph::new();
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn tag_update(&mut self) {
        self.dirty = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_graph_has_output() {
        let graph = ShaderGraph::new();
        assert_eq!(graph.nodes().len(), 1);
        assert_eq!(graph.node(OUTPUT_NODE).unwrap().kind(), ShaderNodeKind::Output);
    }

    #[test]
    fn test_connect_validates_sockets() {
        let mut graph = ShaderGraph::new();
        let diffuse = graph.add(ShaderNodeKind::Diffuse);
        let value = graph.add(ShaderNodeKind::Value);

        assert!(graph.connect(diffuse, "BSDF", OUTPUT_NODE, "Surface").is_ok());
        assert!(matches!(
            graph.connect(diffuse, "Nope", OUTPUT_NODE, "Surface"),
            Err(HostError::UnknownAttribute { .. })
        ));
        assert!(graph.connect(value, "Value", OUTPUT_NODE, "Surface").is_err());
        assert!(graph.connect(value, "Value", diffuse, "Roughness").is_ok());
        assert_eq!(
            graph.connect(diffuse, "BSDF", 42, "Surface"),
            Err(HostError::invalid(HandleKind::ShaderNode, 42))
        );
    }

    #[test]
    fn test_reconnect_replaces_link() {
        let mut graph = ShaderGraph::new();
        let a = graph.add(ShaderNodeKind::Diffuse);
        let b = graph.add(ShaderNodeKind::Glossy);
        graph.connect(a, "BSDF", OUTPUT_NODE, "Surface").unwrap();
        graph.connect(b, "BSDF", OUTPUT_NODE, "Surface").unwrap();

        assert_eq!(graph.links().len(), 1);
        assert_eq!(graph.link_into(OUTPUT_NODE, "Surface").unwrap().from_node, b);
    }

    #[test]
    fn test_default_surface_is_wired() {
        let shader = Shader::default_surface();
        let link = shader.graph().link_into(OUTPUT_NODE, "Surface").unwrap();
        assert_eq!(
            shader.graph().node(link.from_node).unwrap().kind(),
            ShaderNodeKind::Diffuse
        );
    }

    #[test]
    fn test_new_graph_resets_nodes() {
        let mut shader = Shader::default_light();
        shader.dirty = false;
        shader.new_graph();
        assert_eq!(shader.graph().nodes().len(), 1);
        assert!(shader.graph().links().is_empty());
        assert!(shader.is_dirty());
    }
}
