//! Node arena
//!
//! Owns every node of one scene, attached or detached. Parent and child links
//! are ids into the arena. This layer only keeps the structure consistent;
//! scene registration lives in [`Scene`](super::Scene).

use std::collections::HashMap;

use super::node::{Node, NodeData, NodeFlags, NodeId, NodeType};
use super::SceneError;
use crate::foundation::id::IdGenerator;
use crate::foundation::math::{translation_of, Mat4};
use crate::traversal::{Hierarchy, TransformHierarchy, TraversalMode};

/// Arena of scene graph nodes
#[derive(Debug)]
pub struct NodeTree {
    nodes: HashMap<NodeId, Node>,
    ids: IdGenerator,
    /// Meshes whose world sphere changed during the last transform pass
    moved_volumes: Vec<NodeId>,
}

impl Default for NodeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeTree {
    /// Create an empty arena
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            ids: IdGenerator::new(),
            moved_volumes: Vec::new(),
        }
    }

    /// Create a detached node
    pub fn create(&mut self, name: impl Into<String>, data: NodeData) -> NodeId {
        let id = NodeId(self.ids.next_id());
        self.nodes.insert(id, Node::new(id, name.into(), data));
        id
    }

    /// Node by id
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub(crate) fn node(&self, id: NodeId) -> Result<&Node, SceneError> {
        self.nodes.get(&id).ok_or(SceneError::UnknownNode(id))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, SceneError> {
        self.nodes.get_mut(&id).ok_or(SceneError::UnknownNode(id))
    }

    /// Number of nodes in the arena
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the arena is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether `ancestor` lies on the parent chain of `id`
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = self.nodes.get(&id).and_then(|node| node.parent);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.nodes.get(&parent).and_then(|node| node.parent);
        }
        false
    }

    /// Link `child` under `parent`, into the active or inactive list
    /// depending on the child's own flag
    pub(crate) fn attach(&mut self, parent: NodeId, child: NodeId) -> Result<(), SceneError> {
        self.node(parent)?;
        let child_node = self.node(child)?;
        if child_node.parent.is_some() {
            return Err(SceneError::AlreadyChild(child));
        }
        if parent == child || self.is_ancestor(child, parent) {
            return Err(SceneError::Cycle { parent, child });
        }

        let active = child_node.is_active();
        self.node_mut(child)?.parent = Some(parent);
        let parent_node = self.node_mut(parent)?;
        if active {
            parent_node.children.push(child);
        } else {
            parent_node.inactive_children.push(child);
        }
        Ok(())
    }

    /// Unlink `child` from its parent
    pub(crate) fn detach(&mut self, child: NodeId) -> Result<NodeId, SceneError> {
        let child_node = self.node_mut(child)?;
        let Some(parent) = child_node.parent.take() else {
            return Err(SceneError::NotAChild(child));
        };

        let parent_node = self.node_mut(parent)?;
        parent_node.children.retain(|id| *id != child);
        parent_node.inactive_children.retain(|id| *id != child);
        Ok(parent)
    }

    /// Flip the active flag, moving the node between its parent's lists
    pub(crate) fn set_active_flag(&mut self, id: NodeId, active: bool) -> Result<(), SceneError> {
        let node = self.node_mut(id)?;
        node.flags.set(NodeFlags::ACTIVE, active);
        let Some(parent) = node.parent else {
            return Ok(());
        };

        let parent_node = self.node_mut(parent)?;
        let (from, to) = if active {
            (&mut parent_node.inactive_children, &mut parent_node.children)
        } else {
            (&mut parent_node.children, &mut parent_node.inactive_children)
        };
        if let Some(position) = from.iter().position(|child| *child == id) {
            from.remove(position);
            to.push(id);
        }
        Ok(())
    }

    /// Drop a node and its whole subtree from the arena
    ///
    /// The node must already be detached.
    pub(crate) fn remove_subtree(&mut self, id: NodeId) -> Vec<NodeId> {
        let mut removed = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(&current) {
                stack.extend(&node.children);
                stack.extend(&node.inactive_children);
                removed.push(current);
            }
        }
        removed
    }

    /// Mark `id` dirty together with every ancestor and every active
    /// descendant
    ///
    /// With ancestors marked as well, a clean node always roots a clean
    /// subtree and the transform pass may prune there.
    pub fn mark_transform_dirty(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get_mut(&id) else {
            log::error!("Cannot mark unknown node {id} dirty");
            return;
        };
        node.flags.insert(NodeFlags::TRANSFORM_DIRTY);

        let mut current = node.parent;
        while let Some(parent) = current {
            let Some(parent_node) = self.nodes.get_mut(&parent) else {
                break;
            };
            if parent_node.is_transform_dirty() {
                break;
            }
            parent_node.flags.insert(NodeFlags::TRANSFORM_DIRTY);
            current = parent_node.parent;
        }

        let mut stack: Vec<NodeId> = self.nodes[&id].children.clone();
        while let Some(child) = stack.pop() {
            if let Some(child_node) = self.nodes.get_mut(&child) {
                child_node.flags.insert(NodeFlags::TRANSFORM_DIRTY);
                stack.extend(&child_node.children);
            }
        }
    }

    /// World matrix of `id` computed by walking its ancestors
    ///
    /// Does not depend on a transform pass having run. Includes the node's
    /// own local transform if it is a transform node.
    pub fn world_matrix(&self, id: NodeId) -> Option<Mat4> {
        let mut matrix = Mat4::identity();
        let mut current = Some(self.nodes.get(&id)?);
        while let Some(node) = current {
            if let NodeData::Transform(local) = &node.data {
                matrix = local.to_matrix() * matrix;
            }
            current = node.parent.and_then(|parent| self.nodes.get(&parent));
        }
        Some(matrix)
    }

    /// First direct child (active or inactive) called `name`
    pub fn find_child_by_name(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        let node = self.nodes.get(&parent)?;
        node.children
            .iter()
            .chain(&node.inactive_children)
            .copied()
            .find(|child| self.nodes.get(child).is_some_and(|c| c.name == name))
    }

    pub(crate) fn take_moved_volumes(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.moved_volumes)
    }
}

impl Hierarchy for NodeTree {
    type Id = NodeId;

    fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    fn collect_children(&self, id: NodeId, mode: TraversalMode, out: &mut Vec<NodeId>) {
        if let Some(node) = self.nodes.get(&id) {
            out.extend(&node.children);
            if mode == TraversalMode::All {
                out.extend(&node.inactive_children);
            }
        }
    }
}

impl TransformHierarchy for NodeTree {
    fn is_transform(&self, id: NodeId) -> bool {
        self.nodes
            .get(&id)
            .is_some_and(|node| node.node_type() == NodeType::Transform)
    }

    fn is_transform_dirty(&self, id: NodeId) -> bool {
        self.nodes.get(&id).is_some_and(Node::is_transform_dirty)
    }

    fn update_transform(&mut self, id: NodeId, parent_world: &Mat4) -> Mat4 {
        let Some(node) = self.nodes.get_mut(&id) else {
            return *parent_world;
        };

        match &mut node.data {
            NodeData::Transform(local) => return parent_world * local.to_matrix(),
            NodeData::Camera(world)
            | NodeData::Emitter(world)
            | NodeData::Physics(world)
            | NodeData::AudioSource(world)
            | NodeData::AudioListener(world)
            | NodeData::Render { world, .. } => *world = *parent_world,
            NodeData::Light(light) => light.world = *parent_world,
            NodeData::Mesh(mesh) => {
                mesh.world = *parent_world;
                let world_sphere = mesh.local_sphere.transformed(parent_world);
                if world_sphere != mesh.world_sphere {
                    mesh.world_sphere = world_sphere;
                    self.moved_volumes.push(id);
                }
            }
            NodeData::LodTrigger(position) => *position = translation_of(parent_world),
            NodeData::LodSwitch(lod) => lod.world_position = translation_of(parent_world),
            NodeData::Node | NodeData::Switch | NodeData::Model(_) => {}
        }

        *parent_world
    }

    fn clear_transform_dirty(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.flags.remove(NodeFlags::TRANSFORM_DIRTY);
        }
    }
}
