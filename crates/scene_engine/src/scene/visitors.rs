//! Read-only visitors over the node tree
//!
//! All of them run through [`traverse`](crate::traversal::traverse) with a
//! shared reference to the [`NodeTree`].

use std::fmt::Write;

use super::node::{NodeData, NodeId, NodeType};
use super::tree::NodeTree;
use crate::foundation::math::Mat4;
use crate::spatial::Sphere;
use crate::traversal::TreeVisitor;

/// Merged world bounds of all meshes in a subtree
///
/// Keeps its own matrix stack over the transform nodes, so it works on
/// subtrees the transform pass has not reached yet.
#[derive(Debug)]
pub struct BoundsVisitor {
    base: Mat4,
    current: Mat4,
    stack: Vec<Mat4>,
    bounds: Option<Sphere>,
}

impl BoundsVisitor {
    /// Visitor for a subtree whose parent sits at `base`
    pub fn new(base: Mat4) -> Self {
        Self {
            base,
            current: base,
            stack: Vec::new(),
            bounds: None,
        }
    }

    /// Merged sphere, `None` if the subtree holds no mesh
    pub fn bounds(&self) -> Option<Sphere> {
        self.bounds
    }
}

impl<'a> TreeVisitor<&'a NodeTree> for BoundsVisitor {
    fn pre_traverse(&mut self, _tree: &mut &'a NodeTree) {
        self.current = self.base;
        self.stack.clear();
        self.bounds = None;
    }

    fn pre_order_visit(&mut self, tree: &mut &'a NodeTree, id: NodeId) -> bool {
        let Some(node) = tree.get(id) else {
            return false;
        };

        match node.data() {
            NodeData::Transform(local) => {
                self.stack.push(self.current);
                self.current *= local.to_matrix();
            }
            NodeData::Mesh(mesh) => {
                let sphere = mesh.local_sphere.transformed(&self.current);
                self.bounds = Some(match self.bounds {
                    Some(bounds) => bounds.merge(&sphere),
                    None => sphere,
                });
            }
            _ => {}
        }
        true
    }

    fn post_order_visit(&mut self, tree: &mut &'a NodeTree, id: NodeId) {
        if tree.get(id).is_some_and(|node| node.node_type() == NodeType::Transform) {
            if let Some(matrix) = self.stack.pop() {
                self.current = matrix;
            }
        }
    }

    fn post_traverse(&mut self, _tree: &mut &'a NodeTree) {
        if !self.stack.is_empty() {
            log::error!("Bounds visitor finished with {} matrices left on the stack", self.stack.len());
        }
    }
}

/// Collects every node with a given name
#[derive(Debug, Clone)]
pub struct FindByNameVisitor {
    name: String,
    found: Vec<NodeId>,
}

impl FindByNameVisitor {
    /// Search for `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            found: Vec::new(),
        }
    }

    /// Matches in traversal order
    pub fn found(&self) -> &[NodeId] {
        &self.found
    }

    /// Take the matches
    pub fn into_found(self) -> Vec<NodeId> {
        self.found
    }
}

impl<'a> TreeVisitor<&'a NodeTree> for FindByNameVisitor {
    fn pre_traverse(&mut self, _tree: &mut &'a NodeTree) {
        self.found.clear();
    }

    fn pre_order_visit(&mut self, tree: &mut &'a NodeTree, id: NodeId) -> bool {
        if tree.get(id).is_some_and(|node| node.name() == self.name) {
            self.found.push(id);
        }
        true
    }
}

/// Renders a subtree as indented text
///
/// One line per node: type, quoted name, id and whether it is active.
#[derive(Debug, Default)]
pub struct PrintVisitor {
    depth: usize,
    output: String,
}

impl PrintVisitor {
    /// Create a visitor
    pub fn new() -> Self {
        Self::default()
    }

    /// Text produced by the last traversal
    pub fn output(&self) -> &str {
        &self.output
    }
}

impl<'a> TreeVisitor<&'a NodeTree> for PrintVisitor {
    fn pre_traverse(&mut self, _tree: &mut &'a NodeTree) {
        self.depth = 0;
        self.output.clear();
    }

    fn pre_order_visit(&mut self, tree: &mut &'a NodeTree, id: NodeId) -> bool {
        if let Some(node) = tree.get(id) {
            let marker = if node.is_active() { "active" } else { "inactive" };
            let _ = writeln!(
                self.output,
                "{:indent$}{} \"{}\" {} [{}]",
                "",
                node.node_type().name(),
                node.name(),
                id,
                marker,
                indent = self.depth * 2
            );
        }
        self.depth += 1;
        true
    }

    fn post_order_visit(&mut self, _tree: &mut &'a NodeTree, _id: NodeId) {
        self.depth = self.depth.saturating_sub(1);
    }

    fn post_traverse(&mut self, _tree: &mut &'a NodeTree) {
        if self.depth != 0 {
            log::error!("Print visitor finished at depth {}", self.depth);
        }
    }
}

/// Node of a [`NodeBlueprint`]
#[derive(Debug)]
pub struct BlueprintNode {
    /// Node name
    pub name: String,
    /// Payload to create the node with
    pub data: NodeData,
    /// Whether the node starts active
    pub active: bool,
    /// Index of the parent within the blueprint, `None` for the root
    pub parent: Option<usize>,
    /// Node the entry was copied from, used to relink LOD references
    pub source: Option<NodeId>,
}

/// Inert description of a subtree
///
/// Holds no ids of the scene it will end up in, so it can be built on a
/// worker thread and instantiated later on the main thread. Entries are in
/// pre-order, a parent always precedes its children.
#[derive(Debug)]
pub struct NodeBlueprint {
    nodes: Vec<BlueprintNode>,
}

impl NodeBlueprint {
    /// Blueprint with a single root node
    pub fn new(name: impl Into<String>, data: NodeData) -> Self {
        Self {
            nodes: vec![BlueprintNode {
                name: name.into(),
                data,
                active: true,
                parent: None,
                source: None,
            }],
        }
    }

    /// Add a node under the entry at `parent`, returns its index
    pub fn add(&mut self, parent: usize, name: impl Into<String>, data: NodeData, active: bool) -> Option<usize> {
        let name = name.into();
        if parent >= self.nodes.len() {
            log::error!("Blueprint has no entry {parent} to attach {name} to");
            return None;
        }

        self.nodes.push(BlueprintNode {
            name,
            data,
            active,
            parent: Some(parent),
            source: None,
        });
        Some(self.nodes.len() - 1)
    }

    /// Entries in pre-order
    pub fn nodes(&self) -> &[BlueprintNode] {
        &self.nodes
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the blueprint has no entries
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) fn into_nodes(self) -> Vec<BlueprintNode> {
        self.nodes
    }
}

/// Snapshots a subtree into a [`NodeBlueprint`]
///
/// Inactive children are copied as well and stay inactive.
#[derive(Debug, Default)]
pub struct CopyVisitor {
    nodes: Vec<BlueprintNode>,
    parents: Vec<usize>,
}

impl CopyVisitor {
    /// Create a visitor
    pub fn new() -> Self {
        Self::default()
    }

    /// Blueprint of the last traversal, `None` if nothing was copied
    pub fn take_blueprint(&mut self) -> Option<NodeBlueprint> {
        if self.nodes.is_empty() {
            return None;
        }
        Some(NodeBlueprint {
            nodes: std::mem::take(&mut self.nodes),
        })
    }
}

impl<'a> TreeVisitor<&'a NodeTree> for CopyVisitor {
    fn pre_traverse(&mut self, _tree: &mut &'a NodeTree) {
        self.nodes.clear();
        self.parents.clear();
    }

    fn pre_order_visit(&mut self, tree: &mut &'a NodeTree, id: NodeId) -> bool {
        let Some(node) = tree.get(id) else {
            return false;
        };

        self.nodes.push(BlueprintNode {
            name: node.name().to_string(),
            data: node.data().duplicate(),
            active: node.is_active(),
            parent: self.parents.last().copied(),
            source: Some(id),
        });
        self.parents.push(self.nodes.len() - 1);
        true
    }

    fn post_order_visit(&mut self, _tree: &mut &'a NodeTree, _id: NodeId) {
        self.parents.pop();
    }

    fn post_traverse(&mut self, _tree: &mut &'a NodeTree) {
        if !self.parents.is_empty() {
            log::error!("Copy visitor finished with {} open parents", self.parents.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Transform, Vec3};
    use crate::scene::node::MeshData;
    use crate::traversal::{traverse, TraversalMode};
    use approx::assert_relative_eq;

    fn sample() -> (NodeTree, NodeId) {
        let mut tree = NodeTree::new();
        let root = tree.create("root", NodeData::Node);
        let offset = tree.create("offset", NodeData::Transform(Transform::from_position(Vec3::new(10.0, 0.0, 0.0))));
        let mesh_a = tree.create("mesh", NodeData::Mesh(MeshData::new(Sphere::new(Vec3::zeros(), 1.0))));
        let mesh_b = tree.create("mesh", NodeData::Mesh(MeshData::new(Sphere::new(Vec3::new(-10.0, 0.0, 0.0), 1.0))));
        let hidden = tree.create("hidden", NodeData::Node);
        tree.set_active_flag(hidden, false).unwrap();

        tree.attach(root, offset).unwrap();
        tree.attach(offset, mesh_a).unwrap();
        tree.attach(root, mesh_b).unwrap();
        tree.attach(root, hidden).unwrap();
        (tree, root)
    }

    #[test]
    fn test_bounds_visitor() {
        let (tree, root) = sample();
        let mut visitor = BoundsVisitor::new(Mat4::identity());
        traverse(&mut &tree, root, &mut visitor, TraversalMode::ActiveOnly);

        let bounds = visitor.bounds().unwrap();
        assert_relative_eq!(bounds.center, Vec3::zeros(), epsilon = 1e-4);
        assert_relative_eq!(bounds.radius, 11.0, epsilon = 1e-4);
    }

    #[test]
    fn test_find_by_name_returns_duplicates() {
        let (tree, root) = sample();
        let mut visitor = FindByNameVisitor::new("mesh");
        traverse(&mut &tree, root, &mut visitor, TraversalMode::All);
        assert_eq!(visitor.found().len(), 2);

        let mut visitor = FindByNameVisitor::new("hidden");
        traverse(&mut &tree, root, &mut visitor, TraversalMode::ActiveOnly);
        assert!(visitor.found().is_empty());
    }

    #[test]
    fn test_print_visitor() {
        let (tree, root) = sample();
        let mut visitor = PrintVisitor::new();
        traverse(&mut &tree, root, &mut visitor, TraversalMode::All);

        let lines: Vec<&str> = visitor.output().lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("Node \"root\""));
        assert!(lines[1].starts_with("  Transform \"offset\""));
        assert!(lines[2].starts_with("    Mesh \"mesh\""));
        assert!(lines[4].ends_with("[inactive]"));
    }

    #[test]
    fn test_copy_visitor_keeps_structure() {
        let (tree, root) = sample();
        let mut visitor = CopyVisitor::new();
        traverse(&mut &tree, root, &mut visitor, TraversalMode::All);

        let blueprint = visitor.take_blueprint().unwrap();
        let parents: Vec<Option<usize>> = blueprint.nodes().iter().map(|n| n.parent).collect();
        assert_eq!(parents, vec![None, Some(0), Some(1), Some(0), Some(0)]);
        assert!(!blueprint.nodes()[4].active);
        assert_eq!(blueprint.nodes()[0].source, Some(root));
        assert!(visitor.take_blueprint().is_none());
    }

    #[test]
    fn test_blueprint_rejects_unknown_parent() {
        let mut blueprint = NodeBlueprint::new("root", NodeData::Node);
        assert_eq!(blueprint.add(0, "child", NodeData::Switch, true), Some(1));
        assert_eq!(blueprint.add(7, "orphan", NodeData::Node, true), None);
        assert_eq!(blueprint.len(), 2);
    }
}
