//! # Scene
//!
//! Owns the node arena, the octree over mesh bounds and flat registries of
//! cameras, lights, renderables, volumes and LOD nodes.
//!
//! ## Scene membership
//!
//! A node is part of the scene when it hangs below the root through active
//! nodes only. Entering the scene registers it (cameras, lights, meshes into
//! the octree...), leaving unregisters it. Inactive subtrees are never
//! registered.
//!
//! ## Frame
//!
//! [`Scene::handle`] runs once per frame:
//!
//! 1. apply actions queued from other threads
//! 2. switch LOD levels
//! 3. process the data update queue within the configured time budget
//! 4. run the transform pass and push moved bounds into the octree

use std::collections::HashMap;
use std::time::Duration;

use super::actions::{AsyncNodeQueue, NodeAction};
use super::node::{
    model_channel, LodSwitchData, LodThreshold, ModelData, ModelLoader, ModelState, Node, NodeData, NodeFlags, NodeId,
    NodeType,
};
use super::tree::NodeTree;
use super::visitors::{BoundsVisitor, CopyVisitor, FindByNameVisitor, NodeBlueprint, PrintVisitor};
use super::SceneError;
use crate::config::SceneConfig;
use crate::foundation::math::{Mat4, Transform, Vec3};
use crate::foundation::time::Deadline;
use crate::spatial::{Filter, Octree, Sphere, AABB};
use crate::traversal::{traverse, TransformUpdateVisitor, TraversalMode};

fn logged<T>(result: Result<T, SceneError>) -> Result<T, SceneError> {
    if let Err(error) = &result {
        log::error!("{error}");
    }
    result
}

fn register_in(registry: &mut Vec<NodeId>, id: NodeId, what: &str) {
    if registry.contains(&id) {
        log::error!("{what} {id} was already registered");
    } else {
        registry.push(id);
    }
}

fn unregister_from(registry: &mut Vec<NodeId>, id: NodeId, what: &str) {
    if let Some(position) = registry.iter().position(|entry| *entry == id) {
        registry.remove(position);
    } else {
        log::error!("{what} {id} was not registered");
    }
}

/// Scene graph with spatial index
#[derive(Debug)]
pub struct Scene {
    config: SceneConfig,
    tree: NodeTree,
    root: NodeId,
    octree: Octree<NodeId>,

    cameras: Vec<NodeId>,
    lights: Vec<NodeId>,
    renderables: Vec<NodeId>,
    volumes: Vec<NodeId>,
    lod_triggers: Vec<NodeId>,
    lod_switches: Vec<NodeId>,

    data_queue: Vec<NodeId>,
    actions: AsyncNodeQueue,
    transform_visitor: TransformUpdateVisitor<NodeId>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::build(SceneConfig::default())
    }
}

impl Scene {
    /// Create an empty scene
    pub fn new(config: SceneConfig) -> Result<Self, SceneError> {
        config
            .validate()
            .map_err(|e| SceneError::InvalidConfig(e.to_string()))?;
        Ok(Self::build(config))
    }

    fn build(config: SceneConfig) -> Self {
        let world = AABB::cube(Vec3::zeros(), config.world_half_extent);
        let octree = Octree::new(world, config.octree.clone());

        let mut tree = NodeTree::new();
        let root = tree.create("root", NodeData::Node);
        if let Some(node) = tree.get_mut(root) {
            node.flags.insert(NodeFlags::IN_SCENE);
        }

        log::info!("Created scene \"{}\"", config.name);

        Self {
            config,
            tree,
            root,
            octree,
            cameras: Vec::new(),
            lights: Vec::new(),
            renderables: Vec::new(),
            volumes: Vec::new(),
            lod_triggers: Vec::new(),
            lod_switches: Vec::new(),
            data_queue: Vec::new(),
            actions: AsyncNodeQueue::new(),
            transform_visitor: TransformUpdateVisitor::new(),
        }
    }

    /// Scene name
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Rename the scene
    pub fn set_scene_name(&mut self, name: impl Into<String>) {
        self.config.name = name.into();
    }

    /// Active configuration
    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Root node
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Node arena
    pub fn tree(&self) -> &NodeTree {
        &self.tree
    }

    /// Octree over the world bounds of all meshes in the scene
    pub fn octree(&self) -> &Octree<NodeId> {
        &self.octree
    }

    /// Append all meshes touching `filter` to `result`
    pub fn query<F: Filter<AABB>>(&self, filter: &F, result: &mut Vec<NodeId>) {
        self.octree.query(filter, result);
    }

    /// Registered cameras
    pub fn cameras(&self) -> &[NodeId] {
        &self.cameras
    }

    /// Registered lights
    pub fn lights(&self) -> &[NodeId] {
        &self.lights
    }

    /// Registered renderables, meshes included
    pub fn renderables(&self) -> &[NodeId] {
        &self.renderables
    }

    /// Registered meshes
    pub fn volumes(&self) -> &[NodeId] {
        &self.volumes
    }

    /// Registered LOD triggers
    pub fn lod_triggers(&self) -> &[NodeId] {
        &self.lod_triggers
    }

    /// Registered LOD switches
    pub fn lod_switches(&self) -> &[NodeId] {
        &self.lod_switches
    }

    /// Handle for queueing changes from other threads
    pub fn async_queue(&self) -> AsyncNodeQueue {
        self.actions.clone()
    }

    /// Nodes entered by the last transform pass, pruned ones included
    pub fn last_transform_visits(&self) -> usize {
        self.transform_visitor.visited_count()
    }

    // Node creation

    /// Create a detached node of the given type
    pub fn create_node(&mut self, name: impl Into<String>, node_type: NodeType) -> NodeId {
        self.tree.create(name, NodeData::for_type(node_type))
    }

    /// Create a detached node with an explicit payload
    pub fn create_node_with(&mut self, name: impl Into<String>, data: NodeData) -> NodeId {
        self.tree.create(name, data)
    }

    /// Create a detached model node and the loader a worker completes it with
    ///
    /// Once the node is part of the scene the data update queue polls the
    /// load and attaches the delivered subtree under the model node.
    pub fn create_model(&mut self, name: impl Into<String>, source: impl Into<String>) -> (NodeId, ModelLoader) {
        let (loader, ticket) = model_channel();
        let id = self.tree.create(
            name,
            NodeData::Model(ModelData {
                source: source.into(),
                state: ModelState::Pending,
                ticket: Some(ticket),
            }),
        );
        if let Some(node) = self.tree.get_mut(id) {
            node.flags.insert(NodeFlags::DATA_DIRTY);
        }
        (id, loader)
    }

    /// Destroy a node and its whole subtree
    pub fn destroy_node(&mut self, id: NodeId) -> Result<(), SceneError> {
        logged(self.try_destroy_node(id))
    }

    fn try_destroy_node(&mut self, id: NodeId) -> Result<(), SceneError> {
        if id == self.root {
            return Err(SceneError::RootNode);
        }

        let parent = self.tree.node(id)?.parent;
        if let Some(parent) = parent {
            self.try_remove_child(parent, id)?;
        }

        let removed = self.tree.remove_subtree(id);
        log::debug!("Destroyed {} nodes under {id}", removed.len());
        Ok(())
    }

    // Hierarchy

    /// Node by id
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.tree.get(id)
    }

    /// Active children of a node, empty for unknown ids
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match self.tree.get(id) {
            Some(node) => node.children(),
            None => &[],
        }
    }

    /// Whether `ancestor` lies on the parent chain of `id`
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        self.tree.is_ancestor(ancestor, id)
    }

    /// Attach a detached node
    ///
    /// The child goes to the active or inactive list according to its own
    /// flag and is marked dirty. If the parent is part of the scene, an
    /// active child joins the scene with its subtree.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), SceneError> {
        logged(self.try_add_child(parent, child))
    }

    fn try_add_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), SceneError> {
        self.tree.attach(parent, child)?;
        self.tree.mark_transform_dirty(child);

        let parent_in_scene = self.tree.get(parent).is_some_and(Node::is_in_scene);
        let child_active = self.tree.get(child).is_some_and(Node::is_active);
        if parent_in_scene && child_active {
            self.set_in_scene(child, true);
        }
        Ok(())
    }

    /// Detach a child without destroying it
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), SceneError> {
        logged(self.try_remove_child(parent, child))
    }

    fn try_remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), SceneError> {
        self.tree.node(parent)?;
        if self.tree.node(child)?.parent != Some(parent) {
            return Err(SceneError::NotAChild(child));
        }

        self.set_in_scene(child, false);
        self.tree.detach(child)?;
        self.tree.mark_transform_dirty(child);
        Ok(())
    }

    /// Activate or deactivate a node
    ///
    /// Moves the node between its parent's child lists. Activation marks it
    /// dirty and joins the scene if the parent is part of it, deactivation
    /// leaves the scene.
    pub fn set_active(&mut self, id: NodeId, active: bool) -> Result<(), SceneError> {
        logged(self.try_set_active(id, active))
    }

    fn try_set_active(&mut self, id: NodeId, active: bool) -> Result<(), SceneError> {
        if id == self.root {
            return Err(SceneError::RootNode);
        }

        let node = self.tree.node(id)?;
        if node.is_active() == active {
            return Ok(());
        }
        let parent_in_scene = node
            .parent
            .and_then(|parent| self.tree.get(parent))
            .is_some_and(Node::is_in_scene);

        self.tree.set_active_flag(id, active)?;
        if active {
            self.tree.mark_transform_dirty(id);
            if parent_in_scene {
                self.set_in_scene(id, true);
            }
        } else {
            self.set_in_scene(id, false);
        }
        Ok(())
    }

    /// Make `child` the only active child of a switch node
    pub fn set_active_child(&mut self, switch: NodeId, child: NodeId) -> Result<(), SceneError> {
        logged(self.try_set_active_child(switch, child))
    }

    fn try_set_active_child(&mut self, switch: NodeId, child: NodeId) -> Result<(), SceneError> {
        self.expect_type(switch, NodeType::Switch)?;
        if self.tree.node(child)?.parent != Some(switch) {
            return Err(SceneError::NotAChild(child));
        }

        let node = self.tree.node(switch)?;
        let siblings: Vec<NodeId> = node.children.iter().chain(&node.inactive_children).copied().collect();
        for sibling in siblings {
            self.try_set_active(sibling, sibling == child)?;
        }
        Ok(())
    }

    /// Rename a node
    pub fn set_name(&mut self, id: NodeId, name: impl Into<String>) -> Result<(), SceneError> {
        let node = logged(self.tree.node_mut(id))?;
        node.name = name.into();
        Ok(())
    }

    /// First direct child called `name`
    pub fn find_child_by_name(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.tree.find_child_by_name(parent, name)
    }

    /// All nodes below the root called `name`, inactive subtrees included
    pub fn find_by_name(&self, name: &str) -> Vec<NodeId> {
        let mut visitor = FindByNameVisitor::new(name);
        traverse(&mut &self.tree, self.root, &mut visitor, TraversalMode::All);
        visitor.into_found()
    }

    // Transforms

    /// Replace the local transform of a transform node
    pub fn set_transform(&mut self, id: NodeId, transform: Transform) -> Result<(), SceneError> {
        self.modify_transform(id, |local| *local = transform)
    }

    /// Edit the local transform of a transform node in place
    pub fn modify_transform(&mut self, id: NodeId, f: impl FnOnce(&mut Transform)) -> Result<(), SceneError> {
        let node = logged(self.tree.node_mut(id))?;
        let actual = node.node_type();
        let NodeData::Transform(local) = &mut node.data else {
            return logged(Err(SceneError::WrongType {
                id,
                expected: NodeType::Transform,
                actual,
            }));
        };

        f(local);
        self.tree.mark_transform_dirty(id);
        Ok(())
    }

    /// Replace the local bounding sphere of a mesh
    pub fn set_local_sphere(&mut self, id: NodeId, sphere: Sphere) -> Result<(), SceneError> {
        let node = logged(self.tree.node_mut(id))?;
        let actual = node.node_type();
        let NodeData::Mesh(mesh) = &mut node.data else {
            return logged(Err(SceneError::WrongType {
                id,
                expected: NodeType::Mesh,
                actual,
            }));
        };

        mesh.local_sphere = sphere;
        self.tree.mark_transform_dirty(id);
        Ok(())
    }

    /// Request a world state recomputation for a node and its subtree
    pub fn mark_transform_dirty(&mut self, id: NodeId) {
        self.tree.mark_transform_dirty(id);
    }

    /// World matrix of a node computed from its ancestors
    pub fn world_matrix(&self, id: NodeId) -> Option<Mat4> {
        self.tree.world_matrix(id)
    }

    /// Merged world bounds of all active meshes in the subtree under `id`
    pub fn bounds(&self, id: NodeId) -> Option<Sphere> {
        let node = self.tree.get(id)?;
        let base = node
            .parent
            .and_then(|parent| self.tree.world_matrix(parent))
            .unwrap_or_else(Mat4::identity);

        let mut visitor = BoundsVisitor::new(base);
        traverse(&mut &self.tree, id, &mut visitor, TraversalMode::ActiveOnly);
        visitor.bounds()
    }

    /// Indented text dump of the subtree under `id`
    pub fn print_tree(&self, id: NodeId) -> String {
        let mut visitor = PrintVisitor::new();
        traverse(&mut &self.tree, id, &mut visitor, TraversalMode::All);
        visitor.output().to_string()
    }

    // Copying

    /// Snapshot the subtree under `id`
    pub fn copy(&self, id: NodeId) -> Option<NodeBlueprint> {
        let mut visitor = CopyVisitor::new();
        traverse(&mut &self.tree, id, &mut visitor, TraversalMode::All);
        visitor.take_blueprint()
    }

    /// Copy the subtree under `id` and attach the copy under `parent`
    pub fn duplicate(&mut self, id: NodeId, parent: NodeId) -> Result<NodeId, SceneError> {
        let blueprint = logged(self.copy(id).ok_or(SceneError::UnknownNode(id)))?;
        self.instantiate(parent, blueprint)
    }

    /// Build the nodes of `blueprint` with fresh ids and attach them under
    /// `parent`
    ///
    /// LOD references to nodes that were copied along are redirected to the
    /// copies.
    pub fn instantiate(&mut self, parent: NodeId, blueprint: NodeBlueprint) -> Result<NodeId, SceneError> {
        logged(self.try_instantiate(parent, blueprint))
    }

    fn try_instantiate(&mut self, parent: NodeId, blueprint: NodeBlueprint) -> Result<NodeId, SceneError> {
        self.tree.node(parent)?;

        let mut created: Vec<NodeId> = Vec::with_capacity(blueprint.len());
        let mut remap: HashMap<NodeId, NodeId> = HashMap::new();

        for entry in blueprint.into_nodes() {
            let id = self.tree.create(entry.name, entry.data);
            if !entry.active {
                self.tree.set_active_flag(id, false)?;
            }
            if let Some(source) = entry.source {
                remap.insert(source, id);
            }
            if let Some(index) = entry.parent {
                match created.get(index) {
                    Some(entry_parent) => self.tree.attach(*entry_parent, id)?,
                    None => log::warn!("Blueprint entry {} refers to a later parent {index}", created.len()),
                }
            }
            created.push(id);
        }

        let Some(&root) = created.first() else {
            return Err(SceneError::EmptyBlueprint);
        };

        for id in &created {
            let Some(node) = self.tree.get_mut(*id) else {
                continue;
            };
            if let NodeData::Model(model) = &node.data {
                if model.ticket.is_some() {
                    node.flags.insert(NodeFlags::DATA_DIRTY);
                }
            }
            if let NodeData::LodSwitch(lod) = &mut node.data {
                for trigger in &mut lod.triggers {
                    if let Some(copy) = remap.get(&*trigger) {
                        *trigger = *copy;
                    }
                }
                for (child, _) in &mut lod.thresholds {
                    if let Some(copy) = remap.get(&*child) {
                        *child = *copy;
                    }
                }
            }
        }

        self.try_add_child(parent, root)?;
        Ok(root)
    }

    // LOD

    /// Let a LOD switch react to a trigger
    pub fn add_lod_trigger(&mut self, switch: NodeId, trigger: NodeId) -> Result<(), SceneError> {
        logged(self.expect_type(trigger, NodeType::LodTrigger))?;
        let lod = logged(self.lod_switch_mut(switch))?;
        if !lod.triggers.contains(&trigger) {
            lod.triggers.push(trigger);
        }
        Ok(())
    }

    /// Set the distance band in which `child` of a LOD switch is active
    pub fn set_lod_threshold(&mut self, switch: NodeId, child: NodeId, min: f32, max: f32) -> Result<(), SceneError> {
        let lod = logged(self.lod_switch_mut(switch))?;
        let threshold = LodThreshold { min, max };
        match lod.thresholds.iter_mut().find(|(id, _)| *id == child) {
            Some((_, existing)) => *existing = threshold,
            None => lod.thresholds.push((child, threshold)),
        }
        Ok(())
    }

    fn lod_switch_mut(&mut self, id: NodeId) -> Result<&mut LodSwitchData, SceneError> {
        let node = self.tree.node_mut(id)?;
        let actual = node.node_type();
        match &mut node.data {
            NodeData::LodSwitch(lod) => Ok(lod),
            _ => Err(SceneError::WrongType {
                id,
                expected: NodeType::LodSwitch,
                actual,
            }),
        }
    }

    fn update_lod(&mut self) {
        let mut changes = Vec::new();

        for switch in &self.lod_switches {
            let Some(NodeData::LodSwitch(lod)) = self.tree.get(*switch).map(Node::data) else {
                continue;
            };

            let distance = lod
                .triggers
                .iter()
                .filter(|trigger| self.lod_triggers.contains(trigger))
                .filter_map(|trigger| match self.tree.get(*trigger).map(Node::data) {
                    Some(NodeData::LodTrigger(position)) => Some((position - lod.world_position).magnitude()),
                    _ => None,
                })
                .reduce(f32::min);
            let Some(distance) = distance else {
                continue;
            };

            for (child, threshold) in &lod.thresholds {
                let active = threshold.min <= distance && distance < threshold.max;
                changes.push((*switch, *child, active));
            }
        }

        for (switch, child, active) in changes {
            let applies = self
                .tree
                .get(child)
                .is_some_and(|node| node.parent == Some(switch) && node.is_active() != active);
            if applies {
                let _ = self.set_active(child, active);
            }
        }
    }

    // Data updates

    /// Queue a node for a data update on the next frames
    pub fn set_data_dirty(&mut self, id: NodeId) -> Result<(), SceneError> {
        let node = logged(self.tree.node_mut(id))?;
        node.flags.insert(NodeFlags::DATA_DIRTY);
        if node.is_in_scene() && !self.data_queue.contains(&id) {
            self.data_queue.push(id);
        }
        Ok(())
    }

    /// Number of nodes waiting for a data update
    pub fn pending_data_updates(&self) -> usize {
        self.data_queue.len()
    }

    fn update_data(&mut self) {
        let deadline = Deadline::after(Duration::from_millis(self.config.data_update_budget_ms));

        let mut index = 0;
        while index < self.data_queue.len() {
            let id = self.data_queue[index];
            if self.update_node_data(id) {
                self.data_queue.remove(index);
                if let Some(node) = self.tree.get_mut(id) {
                    node.flags.remove(NodeFlags::DATA_DIRTY);
                }
            } else {
                index += 1;
            }

            if deadline.expired() {
                break;
            }
        }
    }

    /// Returns `true` once the node needs no further data updates
    fn update_node_data(&mut self, id: NodeId) -> bool {
        let Some(node) = self.tree.get(id) else {
            // Destroyed while queued
            return true;
        };
        if !node.is_in_scene() {
            return true;
        }

        let NodeData::Model(model) = &node.data else {
            return true;
        };
        let Some(ticket) = &model.ticket else {
            return true;
        };
        let Some(result) = ticket.poll() else {
            return false;
        };

        let state = match result {
            Ok(blueprint) => match self.try_instantiate(id, blueprint) {
                Ok(_) => ModelState::Loaded,
                Err(error) => {
                    log::error!("Attaching model {id} failed: {error}");
                    ModelState::Failed
                }
            },
            Err(reason) => {
                log::error!("Loading model {id} failed: {reason}");
                ModelState::Failed
            }
        };

        if let Some(NodeData::Model(model)) = self.tree.get_mut(id).map(|node| &mut node.data) {
            log::debug!("Model \"{}\" finished as {state:?}", model.source);
            model.state = state;
            model.ticket = None;
        }
        true
    }

    // Frame

    /// Run one frame of scene maintenance
    pub fn handle(&mut self) {
        self.flush_async_actions();
        self.update_lod();
        self.update_data();
        self.update_transforms();
    }

    /// Apply actions queued through [`AsyncNodeQueue`]
    pub fn flush_async_actions(&mut self) {
        for action in self.actions.drain() {
            // Failures are logged by the operations themselves
            let _ = match action {
                NodeAction::Insert { parent, child } => self.add_child(parent, child),
                NodeAction::Remove { parent, child } => self.remove_child(parent, child),
                NodeAction::SetActive { node, active } => self.set_active(node, active),
                NodeAction::Instantiate { parent, blueprint } => self.instantiate(parent, blueprint).map(|_| ()),
                NodeAction::Destroy(node) => self.destroy_node(node),
            };
        }
    }

    /// Run the transform pass over the scene and sync moved meshes into the
    /// octree
    pub fn update_transforms(&mut self) {
        traverse(&mut self.tree, self.root, &mut self.transform_visitor, TraversalMode::ActiveOnly);

        for id in self.tree.take_moved_volumes() {
            let Some(node) = self.tree.get(id) else {
                continue;
            };
            if !node.is_in_scene() {
                continue;
            }
            if let NodeData::Mesh(mesh) = &node.data {
                // Logged by the octree
                let _ = self.octree.update(id, mesh.world_sphere);
            }
        }
    }

    // Membership

    fn set_in_scene(&mut self, id: NodeId, in_scene: bool) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.tree.get(current) else {
                continue;
            };
            if node.is_in_scene() == in_scene {
                continue;
            }
            let children = node.children.clone();

            if in_scene {
                if let Some(node) = self.tree.get_mut(current) {
                    node.flags.insert(NodeFlags::IN_SCENE);
                }
                self.on_enter_scene(current);
            } else {
                self.on_leave_scene(current);
                if let Some(node) = self.tree.get_mut(current) {
                    node.flags.remove(NodeFlags::IN_SCENE);
                }
            }

            stack.extend(children.iter().rev());
        }
    }

    fn on_enter_scene(&mut self, id: NodeId) {
        let Some(node) = self.tree.get(id) else {
            return;
        };

        match &node.data {
            NodeData::Camera(_) => register_in(&mut self.cameras, id, "Camera"),
            NodeData::Light(_) => register_in(&mut self.lights, id, "Light"),
            NodeData::Render { .. } => register_in(&mut self.renderables, id, "Renderable"),
            NodeData::Mesh(mesh) => {
                register_in(&mut self.renderables, id, "Renderable");
                register_in(&mut self.volumes, id, "Volume");
                let _ = self.octree.insert(id, mesh.world_sphere);
            }
            NodeData::LodTrigger(_) => register_in(&mut self.lod_triggers, id, "LOD trigger"),
            NodeData::LodSwitch(_) => register_in(&mut self.lod_switches, id, "LOD switch"),
            _ => {}
        }

        if node.flags.contains(NodeFlags::DATA_DIRTY) && !self.data_queue.contains(&id) {
            self.data_queue.push(id);
        }
        log::trace!("Node {id} entered scene \"{}\"", self.config.name);
    }

    fn on_leave_scene(&mut self, id: NodeId) {
        let Some(node) = self.tree.get(id) else {
            return;
        };

        match &node.data {
            NodeData::Camera(_) => unregister_from(&mut self.cameras, id, "Camera"),
            NodeData::Light(_) => unregister_from(&mut self.lights, id, "Light"),
            NodeData::Render { .. } => unregister_from(&mut self.renderables, id, "Renderable"),
            NodeData::Mesh(_) => {
                unregister_from(&mut self.renderables, id, "Renderable");
                unregister_from(&mut self.volumes, id, "Volume");
                let _ = self.octree.remove(id);
            }
            NodeData::LodTrigger(_) => unregister_from(&mut self.lod_triggers, id, "LOD trigger"),
            NodeData::LodSwitch(_) => unregister_from(&mut self.lod_switches, id, "LOD switch"),
            _ => {}
        }
        log::trace!("Node {id} left scene \"{}\"", self.config.name);
    }

    fn expect_type(&self, id: NodeId, expected: NodeType) -> Result<(), SceneError> {
        let actual = self.tree.node(id)?.node_type();
        if actual == expected {
            Ok(())
        } else {
            Err(SceneError::WrongType { id, expected, actual })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::translation_of;
    use crate::scene::node::MeshData;
    use crate::spatial::VolumeFilter;
    use approx::assert_relative_eq;

    fn mesh(radius: f32) -> NodeData {
        NodeData::Mesh(MeshData::new(Sphere::new(Vec3::zeros(), radius)))
    }

    fn translation(x: f32, y: f32, z: f32) -> NodeData {
        NodeData::Transform(Transform::from_position(Vec3::new(x, y, z)))
    }

    #[test]
    fn test_registration_follows_membership() {
        let mut scene = Scene::default();
        let group = scene.create_node("group", NodeType::Node);
        let camera = scene.create_node("camera", NodeType::Camera);
        let light = scene.create_node("light", NodeType::Light);
        let body = scene.create_node_with("body", mesh(1.0));
        scene.add_child(group, camera).unwrap();
        scene.add_child(group, light).unwrap();
        scene.add_child(group, body).unwrap();

        // Detached subtree registers nothing
        assert!(scene.cameras().is_empty());

        scene.add_child(scene.root(), group).unwrap();
        assert_eq!(scene.cameras(), &[camera]);
        assert_eq!(scene.lights(), &[light]);
        assert_eq!(scene.volumes(), &[body]);
        assert_eq!(scene.renderables(), &[body]);
        assert!(scene.octree().contains(body));

        scene.remove_child(scene.root(), group).unwrap();
        assert!(scene.cameras().is_empty());
        assert!(scene.volumes().is_empty());
        assert_eq!(scene.octree().object_count(), 0);
        assert!(scene.get(group).is_some());
    }

    #[test]
    fn test_inactive_subtrees_are_not_registered() {
        let mut scene = Scene::default();
        let camera = scene.create_node("camera", NodeType::Camera);
        scene.set_active(camera, false).unwrap();
        scene.add_child(scene.root(), camera).unwrap();
        assert!(scene.cameras().is_empty());
        assert_eq!(scene.get(scene.root()).unwrap().inactive_children(), &[camera]);

        scene.set_active(camera, true).unwrap();
        assert_eq!(scene.cameras(), &[camera]);
        // Unchanged flag is a no-op
        scene.set_active(camera, true).unwrap();
        assert_eq!(scene.cameras(), &[camera]);

        scene.set_active(camera, false).unwrap();
        assert!(scene.cameras().is_empty());
    }

    #[test]
    fn test_contract_violations_leave_scene_unchanged() {
        let mut scene = Scene::default();
        let a = scene.create_node("a", NodeType::Node);
        let b = scene.create_node("b", NodeType::Node);
        scene.add_child(scene.root(), a).unwrap();
        scene.add_child(a, b).unwrap();

        assert_eq!(scene.add_child(b, a), Err(SceneError::AlreadyChild(a)));
        assert_eq!(scene.remove_child(b, a), Err(SceneError::NotAChild(a)));
        assert_eq!(scene.destroy_node(scene.root()), Err(SceneError::RootNode));
        assert_eq!(scene.add_child(a, NodeId(999)), Err(SceneError::UnknownNode(NodeId(999))));
        assert!(matches!(scene.set_transform(a, Transform::identity()), Err(SceneError::WrongType { .. })));
        assert_eq!(scene.children(a), &[b]);
    }

    #[test]
    fn test_destroy_unregisters_subtree() {
        let mut scene = Scene::default();
        let group = scene.create_node("group", NodeType::Node);
        let body = scene.create_node_with("body", mesh(1.0));
        scene.add_child(scene.root(), group).unwrap();
        scene.add_child(group, body).unwrap();
        assert_eq!(scene.volumes(), &[body]);

        scene.destroy_node(group).unwrap();
        assert!(scene.get(body).is_none());
        assert!(scene.volumes().is_empty());
        assert_eq!(scene.octree().object_count(), 0);
        assert!(scene.children(scene.root()).is_empty());
    }

    #[test]
    fn test_transform_pass_moves_octree_entries() {
        let mut scene = Scene::default();
        let offset = scene.create_node_with("offset", translation(100.0, 0.0, 0.0));
        let body = scene.create_node_with("body", mesh(2.0));
        scene.add_child(scene.root(), offset).unwrap();
        scene.add_child(offset, body).unwrap();
        scene.handle();

        let sphere = scene.octree().get(body).unwrap();
        assert_relative_eq!(sphere.center, Vec3::new(100.0, 0.0, 0.0));

        let mut result = Vec::new();
        scene.query(&VolumeFilter::Sphere(Sphere::new(Vec3::new(100.0, 0.0, 0.0), 1.0)), &mut result);
        assert_eq!(result, vec![body]);

        scene.modify_transform(offset, |t| t.position.y = 50.0).unwrap();
        scene.handle();
        assert_relative_eq!(scene.octree().get(body).unwrap().center, Vec3::new(100.0, 50.0, 0.0));
    }

    #[test]
    fn test_world_matrix_and_bounds() {
        let mut scene = Scene::default();
        let offset = scene.create_node_with("offset", translation(0.0, 10.0, 0.0));
        let body = scene.create_node_with("body", mesh(3.0));
        scene.add_child(scene.root(), offset).unwrap();
        scene.add_child(offset, body).unwrap();

        let world = scene.world_matrix(body).unwrap();
        assert_relative_eq!(translation_of(&world), Vec3::new(0.0, 10.0, 0.0));
        let bounds = scene.bounds(offset).unwrap();
        assert_relative_eq!(bounds.center, Vec3::new(0.0, 10.0, 0.0));
        assert_relative_eq!(bounds.radius, 3.0);
    }

    #[test]
    fn test_switch_keeps_one_child_active() {
        let mut scene = Scene::default();
        let switch = scene.create_node("switch", NodeType::Switch);
        let a = scene.create_node("a", NodeType::Camera);
        let b = scene.create_node("b", NodeType::Camera);
        scene.add_child(scene.root(), switch).unwrap();
        scene.add_child(switch, a).unwrap();
        scene.add_child(switch, b).unwrap();

        scene.set_active_child(switch, b).unwrap();
        assert_eq!(scene.children(switch), &[b]);
        assert_eq!(scene.cameras(), &[b]);

        scene.set_active_child(switch, a).unwrap();
        assert_eq!(scene.children(switch), &[a]);
        assert_eq!(scene.cameras(), &[a]);
    }

    #[test]
    fn test_lod_switch_by_distance() {
        let mut scene = Scene::default();
        let viewer = scene.create_node_with("viewer", translation(0.0, 0.0, 0.0));
        let trigger = scene.create_node("trigger", NodeType::LodTrigger);
        let lod = scene.create_node("lod", NodeType::LodSwitch);
        let near = scene.create_node("near", NodeType::Node);
        let far = scene.create_node("far", NodeType::Node);
        scene.add_child(scene.root(), viewer).unwrap();
        scene.add_child(viewer, trigger).unwrap();
        scene.add_child(scene.root(), lod).unwrap();
        scene.add_child(lod, near).unwrap();
        scene.add_child(lod, far).unwrap();
        scene.add_lod_trigger(lod, trigger).unwrap();
        scene.set_lod_threshold(lod, near, 0.0, 50.0).unwrap();
        scene.set_lod_threshold(lod, far, 50.0, 1000.0).unwrap();

        scene.handle();
        scene.handle();
        assert_eq!(scene.children(lod), &[near]);

        scene.modify_transform(viewer, |t| t.position.x = 200.0).unwrap();
        scene.handle();
        scene.handle();
        assert_eq!(scene.children(lod), &[far]);
    }

    #[test]
    fn test_duplicate_relinks_lod_references() {
        let mut scene = Scene::default();
        let group = scene.create_node("group", NodeType::Node);
        let trigger = scene.create_node("trigger", NodeType::LodTrigger);
        let lod = scene.create_node("lod", NodeType::LodSwitch);
        let level = scene.create_node("level", NodeType::Node);
        scene.add_child(scene.root(), group).unwrap();
        scene.add_child(group, trigger).unwrap();
        scene.add_child(group, lod).unwrap();
        scene.add_child(lod, level).unwrap();
        scene.add_lod_trigger(lod, trigger).unwrap();
        scene.set_lod_threshold(lod, level, 0.0, 10.0).unwrap();

        let copy = scene.duplicate(group, scene.root()).unwrap();
        assert_ne!(copy, group);
        assert_eq!(scene.find_by_name("lod").len(), 2);

        let copied_lod = scene.find_child_by_name(copy, "lod").unwrap();
        let copied_trigger = scene.find_child_by_name(copy, "trigger").unwrap();
        let copied_level = scene.find_child_by_name(copied_lod, "level").unwrap();
        let Some(NodeData::LodSwitch(data)) = scene.get(copied_lod).map(Node::data) else {
            panic!("copy is not a LOD switch");
        };
        assert_eq!(data.triggers, vec![copied_trigger]);
        assert_eq!(data.thresholds[0].0, copied_level);
        assert_eq!(scene.lod_switches().len(), 2);
    }

    #[test]
    fn test_model_loading_through_data_queue() {
        let mut scene = Scene::default();
        let (model, loader) = scene.create_model("ship", "ship.ompf");
        scene.add_child(scene.root(), model).unwrap();
        assert_eq!(scene.pending_data_updates(), 1);

        scene.handle();
        assert_eq!(scene.pending_data_updates(), 1);

        let worker = std::thread::spawn(move || {
            let mut blueprint = NodeBlueprint::new("hull", NodeData::Node);
            blueprint.add(0, "body", mesh(4.0), true);
            loader.complete(blueprint);
        });
        worker.join().unwrap();

        scene.handle();
        assert_eq!(scene.pending_data_updates(), 0);
        let hull = scene.find_child_by_name(model, "hull").unwrap();
        assert_eq!(scene.children(hull).len(), 1);
        assert_eq!(scene.volumes().len(), 1);
        let Some(NodeData::Model(data)) = scene.get(model).map(Node::data) else {
            panic!("not a model");
        };
        assert_eq!(data.state, ModelState::Loaded);
    }

    #[test]
    fn test_failed_model_load() {
        let mut scene = Scene::default();
        let (model, loader) = scene.create_model("ship", "missing.ompf");
        scene.add_child(scene.root(), model).unwrap();
        drop(loader);

        scene.handle();
        let Some(NodeData::Model(data)) = scene.get(model).map(Node::data) else {
            panic!("not a model");
        };
        assert_eq!(data.state, ModelState::Failed);
        assert!(scene.children(model).is_empty());
    }

    #[test]
    fn test_async_actions_apply_on_handle() {
        let mut scene = Scene::default();
        let camera = scene.create_node("camera", NodeType::Camera);
        let root = scene.root();
        let queue = scene.async_queue();

        std::thread::spawn(move || queue.insert_node(root, camera))
            .join()
            .unwrap();
        assert!(scene.cameras().is_empty());

        scene.handle();
        assert_eq!(scene.cameras(), &[camera]);
    }

    #[test]
    fn test_print_tree() {
        let mut scene = Scene::default();
        let camera = scene.create_node("eye", NodeType::Camera);
        scene.add_child(scene.root(), camera).unwrap();

        let text = scene.print_tree(scene.root());
        assert!(text.contains("Camera \"eye\""));
        assert_eq!(text.lines().count(), 2);
    }
}
