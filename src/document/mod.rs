
//! The layer tree of a document, with decoded pixels.
//!
//! Nodes are stored in one list owned by the document
//! and refer to each other by index.
//! Rectangles are in engine space: the origin is in the center
//! of the document and the y axis points up.

pub mod read;
pub mod write;

use crate::io::FourCc;
use crate::math::{FloatRect, Vec2};
use crate::compression::Compression;
use crate::meta::resource::ResolutionInfo;
use crate::meta::layer_info::{TypeToolInfo, PlacedLayer};
use crate::image::RgbaImage;


/// A document with its layer tree and the flattened image.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub width: usize,
    pub height: usize,
    pub resolution: ResolutionInfo,

    /// How the composite image of the file was stored.
    pub compression: Compression,

    /// The flattened image of the whole document.
    pub base: RgbaImage,

    /// The flattened images of embedded smart objects.
    pub linked_roots: Vec<LinkedRoot>,

    nodes: Vec<Node>,

    /// The top-level nodes, topmost first.
    roots: Vec<NodeId>,
}

/// Refers to a node of a document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// A group or a layer in the tree.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub attributes: Attributes,
    pub parent: Option<NodeId>,
    pub kind: NodeKind,
}

/// The properties that every kind of node has.
#[derive(Clone, Debug, PartialEq)]
pub struct Attributes {

    /// The layer name, usable as a file name.
    pub name: String,

    /// The layer name as stored in the file.
    pub raw_name: String,

    /// The `lyid` of the layer, or zero.
    pub id: i32,

    pub rect: FloatRect,

    /// From zero to one, not including the opacity of the parent groups.
    pub opacity: f32,

    pub visible: bool,
    pub blend_mode: FourCc,
}

/// What a node contains.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    Group {
        /// Topmost first.
        children: Vec<NodeId>,
    },

    Image { image: RgbaImage },

    Text {
        /// The rendered text, as Photoshop stored it.
        image: RgbaImage,

        text: String,

        /// The bounds of the text box, in engine space.
        text_rect: FloatRect,

        type_tool: TypeToolInfo,
    },

    /// A placed smart object.
    Linked {
        image: RgbaImage,

        /// Refers to `LinkedRoot::id`.
        linked_id: String,

        /// Around the z axis, in degrees.
        rotation: f32,

        placed: PlacedLayer,
    },
}

/// The flattened image of an embedded linked document.
#[derive(Clone, Debug, PartialEq)]
pub struct LinkedRoot {
    pub id: String,

    /// The file name without its extension.
    pub name: String,

    pub size: Vec2<usize>,
    pub image: RgbaImage,
}


impl Document {

    /// A document without any layers and a transparent base image.
    pub fn new(size: Vec2<usize>) -> Self {
        Document {
            width: size.width(),
            height: size.height(),
            resolution: ResolutionInfo::default(),
            compression: Compression::Rle,
            base: RgbaImage::new(size),
            linked_roots: Vec::new(),
            nodes: Vec::new(),
            roots: Vec::new(),
        }
    }

    pub fn size(&self) -> Vec2<usize> { Vec2(self.width, self.height) }

    /// The top-level nodes, topmost first.
    pub fn roots(&self) -> &[NodeId] { &self.roots }

    /// All nodes, in the order they were added.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(index, node)| (NodeId(index), node))
    }

    pub fn node(&self, id: NodeId) -> &Node { &self.nodes[id.0] }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node { &mut self.nodes[id.0] }

    /// The children of a group, topmost first. Empty for layers.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match &self.node(id).kind {
            NodeKind::Group { children } => children,
            _ => &[],
        }
    }

    /// Insert a node below all existing siblings.
    /// Returns `None` if the parent is not a group.
    pub fn push_node(&mut self, parent: Option<NodeId>, attributes: Attributes, kind: NodeKind) -> Option<NodeId> {
        let id = NodeId(self.nodes.len());

        match parent {
            None => self.roots.push(id),
            Some(parent) => match &mut self.nodes.get_mut(parent.0)?.kind {
                NodeKind::Group { children } => children.push(id),
                _ => return None,
            },
        }

        self.nodes.push(Node { attributes, parent, kind });
        Some(id)
    }

    /// The opacity of the node, multiplied with the opacity of all its parents.
    pub fn effective_opacity(&self, id: NodeId) -> f32 {
        let node = self.node(id);
        let own = node.attributes.opacity;
        node.parent.map_or(own, |parent| own * self.effective_opacity(parent))
    }

    /// Whether the node and all its parents are visible.
    pub fn is_visible(&self, id: NodeId) -> bool {
        let node = self.node(id);
        node.attributes.visible && node.parent.map_or(true, |parent| self.is_visible(parent))
    }

    /// All nodes in tree order: each group before its children, topmost first.
    pub fn depth_first(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();

        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.children(id).iter().rev());
        }

        order
    }

    /// The linked root with that id.
    pub fn linked_root(&self, id: &str) -> Option<&LinkedRoot> {
        self.linked_roots.iter().find(|root| root.id == id)
    }
}

impl Node {

    /// The decoded pixels, if this is not a group.
    pub fn image(&self) -> Option<&RgbaImage> {
        match &self.kind {
            NodeKind::Group { .. } => None,
            NodeKind::Image { image } | NodeKind::Text { image, .. } | NodeKind::Linked { image, .. } => Some(image),
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self.kind, NodeKind::Group { .. })
    }
}

impl Attributes {

    /// Visible, opaque, and with normal blending.
    pub fn new(name: impl Into<String>, rect: FloatRect) -> Self {
        let raw_name = name.into();

        Attributes {
            name: sanitize_name(&raw_name),
            raw_name, id: 0, rect,
            opacity: 1.0,
            visible: true,
            blend_mode: FourCc(*b"norm"),
        }
    }
}


/// Replace path separators and characters that are invalid in file names with `_`,
/// then trim surrounding whitespace.
pub fn sanitize_name(name: &str) -> String {
    let invalid = |character: char| {
        character.is_control() || matches!(character, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*')
    };

    name.chars()
        .map(|character| if invalid(character) { '_' } else { character })
        .collect::<String>()
        .trim()
        .to_string()
}
