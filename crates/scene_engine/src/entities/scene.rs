//! # Entity Scene
//!
//! Owns the entities, their components, the views over them and the systems
//! run each frame. Optionally owns a quadtree and an octree that 2D bodies
//! and bounding spheres register with while they are active.
//!
//! ## Frame
//!
//! [`EntityScene::update`] first flushes the queues (pending deletions, then
//! components whose load asked for a retry) and then runs the systems stage
//! by stage.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;

use super::component::{Component, ComponentContext, ComponentRegistry, ComponentSet, ComponentState, LoadResult};
use super::components::{Body2DComponent, CameraComponent, SphereComponent, TransformComponent};
use super::copy::{EntityCopyVisitor, EntityPrefab};
use super::entity::{ComponentSlot, Entity, EntityId};
use super::system::{RenderSink, System, SystemStage};
use super::view::{View, ViewId};
use super::EntityError;
use crate::config::EntitySceneConfig;
use crate::foundation::id::IdGenerator;
use crate::foundation::math::{Mat4, Transform};
use crate::foundation::time::SimulationTime;
use crate::spatial::{Octree, Quadtree, Rect, AABB};
use crate::traversal::{traverse, Hierarchy, TransformHierarchy, TraversalMode};

fn logged<T>(result: Result<T, EntityError>) -> Result<T, EntityError> {
    if let Err(error) = &result {
        log::error!("{error}");
    }
    result
}

fn notify_views(views: &mut [View], entity: &Entity) {
    for view in views {
        view.on_entity_changed(entity.id, entity.mask, entity.enabled);
    }
}

/// Entity-component scene
pub struct EntityScene {
    config: EntitySceneConfig,
    ids: IdGenerator,
    entities: HashMap<EntityId, Entity>,
    root: EntityId,
    registry: ComponentRegistry,
    views: Vec<View>,
    camera_view: Option<ViewId>,
    systems: Vec<Box<dyn System>>,
    delete_queue: Vec<EntityId>,
    process_queue: Vec<EntityId>,
    quadtree: Option<Quadtree<EntityId>>,
    octree: Option<Octree<EntityId>>,
    render_sink: Option<Box<dyn RenderSink>>,
}

impl fmt::Debug for EntityScene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let systems: Vec<&str> = self.systems.iter().map(|system| system.name()).collect();
        f.debug_struct("EntityScene")
            .field("name", &self.config.name)
            .field("entities", &self.entities.len())
            .field("views", &self.views.len())
            .field("systems", &systems)
            .field("has_quadtree", &self.quadtree.is_some())
            .field("has_octree", &self.octree.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for EntityScene {
    fn default() -> Self {
        Self::build(EntitySceneConfig::default())
    }
}

impl EntityScene {
    /// Create a scene holding only its root entity
    pub fn new(config: EntitySceneConfig) -> Result<Self, EntityError> {
        config
            .validate()
            .map_err(|e| EntityError::InvalidConfig(e.to_string()))?;
        Ok(Self::build(config))
    }

    fn build(config: EntitySceneConfig) -> Self {
        let ids = IdGenerator::new();
        let root = EntityId(ids.next_id());
        let mut root_entity = Entity::new(root, "root".to_string());
        root_entity.enabled = true;

        let mut scene = Self {
            config,
            ids,
            entities: HashMap::from([(root, root_entity)]),
            root,
            registry: ComponentRegistry::new(),
            views: Vec::new(),
            camera_view: None,
            systems: Vec::new(),
            delete_queue: Vec::new(),
            process_queue: Vec::new(),
            quadtree: None,
            octree: None,
            render_sink: None,
        };
        scene.camera_view = scene.create_view::<(CameraComponent,)>().ok();

        log::info!("Created entity scene \"{}\"", scene.config.name);
        scene
    }

    /// Scene name
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Rename the scene
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.config.name = name.into();
    }

    /// Active configuration
    pub fn config(&self) -> &EntitySceneConfig {
        &self.config
    }

    /// Root entity, parent of every entity created without one
    pub fn root(&self) -> EntityId {
        self.root
    }

    /// Component type registry
    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    // Entities

    /// Create an active entity under the root
    pub fn create_entity(&mut self, name: impl Into<String>) -> EntityId {
        let id = self.create_detached(name.into(), true);
        self.attach(self.root, id);
        self.refresh_enabled(id);
        self.mark_transform_dirty(id);
        id
    }

    fn create_detached(&mut self, name: String, active: bool) -> EntityId {
        let id = EntityId(self.ids.next_id());
        let mut entity = Entity::new(id, name);
        entity.active = active;
        self.entities.insert(id, entity);
        id
    }

    /// Entity by id
    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Number of entities, root included
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    fn entity_ref(&self, id: EntityId) -> Result<&Entity, EntityError> {
        self.entities.get(&id).ok_or(EntityError::UnknownEntity(id))
    }

    /// Queue an entity and its subtree for destruction at the next frame
    pub fn destroy_entity(&mut self, id: EntityId) -> Result<(), EntityError> {
        if id == self.root {
            return logged(Err(EntityError::RootEntity));
        }
        logged(self.entity_ref(id))?;

        if !self.delete_queue.contains(&id) {
            self.delete_queue.push(id);
        }
        Ok(())
    }

    /// Whether the entity waits in the delete queue
    pub fn is_pending_delete(&self, id: EntityId) -> bool {
        self.delete_queue.contains(&id)
    }

    /// Whether `ancestor` lies on the parent chain of `id`
    pub fn is_ancestor(&self, ancestor: EntityId, id: EntityId) -> bool {
        let mut current = self.entities.get(&id).and_then(Entity::parent);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.entities.get(&parent).and_then(Entity::parent);
        }
        false
    }

    /// Move an entity under a new parent
    pub fn set_parent(&mut self, child: EntityId, parent: EntityId) -> Result<(), EntityError> {
        logged(self.try_set_parent(child, parent))
    }

    fn try_set_parent(&mut self, child: EntityId, parent: EntityId) -> Result<(), EntityError> {
        if child == self.root {
            return Err(EntityError::RootEntity);
        }
        self.entity_ref(parent)?;
        let old_parent = self.entity_ref(child)?.parent;
        if parent == child || self.is_ancestor(child, parent) {
            return Err(EntityError::Cycle { parent, child });
        }
        if old_parent == Some(parent) {
            return Ok(());
        }

        self.detach(child);
        self.attach(parent, child);
        self.refresh_enabled(child);
        self.mark_transform_dirty(child);
        Ok(())
    }

    /// Activate or deactivate an entity
    ///
    /// Components of the entity and of every descendant that becomes enabled
    /// or disabled switch between `Active` and `Inactive`.
    pub fn set_active(&mut self, id: EntityId, active: bool) -> Result<(), EntityError> {
        if id == self.root {
            return logged(Err(EntityError::RootEntity));
        }
        let entity = logged(self.entity_ref(id))?;
        if entity.active == active {
            return Ok(());
        }
        let parent = entity.parent;

        if let Some(entity) = self.entities.get_mut(&id) {
            entity.active = active;
        }
        if let Some(parent) = parent.and_then(|parent| self.entities.get_mut(&parent)) {
            let (from, to) = if active {
                (&mut parent.inactive_children, &mut parent.children)
            } else {
                (&mut parent.children, &mut parent.inactive_children)
            };
            if let Some(position) = from.iter().position(|child| *child == id) {
                from.remove(position);
                to.push(id);
            }
        }

        self.refresh_enabled(id);
        if active {
            self.mark_transform_dirty(id);
        }
        Ok(())
    }

    fn attach(&mut self, parent: EntityId, child: EntityId) {
        let active = match self.entities.get_mut(&child) {
            Some(entity) => {
                entity.parent = Some(parent);
                entity.active
            }
            None => return,
        };
        if let Some(parent) = self.entities.get_mut(&parent) {
            if active {
                parent.children.push(child);
            } else {
                parent.inactive_children.push(child);
            }
        }
    }

    fn detach(&mut self, child: EntityId) {
        let Some(parent) = self.entities.get_mut(&child).and_then(|entity| entity.parent.take()) else {
            return;
        };
        if let Some(parent) = self.entities.get_mut(&parent) {
            parent.children.retain(|id| *id != child);
            parent.inactive_children.retain(|id| *id != child);
        }
    }

    /// Recompute the enabled flag below `id` and move component states along
    fn refresh_enabled(&mut self, id: EntityId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(entity) = self.entities.get(&current) else {
                continue;
            };
            let parent_enabled = match entity.parent {
                Some(parent) => self.entities.get(&parent).is_some_and(Entity::is_enabled),
                None => current == self.root,
            };
            let enabled = entity.active && parent_enabled;
            if enabled == entity.enabled {
                continue;
            }

            let world = self.world_matrix(current).unwrap_or_else(Mat4::identity);
            let Some(entity) = self.entities.get_mut(&current) else {
                continue;
            };
            entity.enabled = enabled;

            let mut ctx = ComponentContext {
                entity: current,
                world,
                quadtree: self.quadtree.as_mut(),
                octree: self.octree.as_mut(),
            };
            for slot in entity.components.values_mut() {
                slot.state = match (slot.state, enabled) {
                    (ComponentState::Inactive, true) => {
                        slot.component.on_activate(&mut ctx);
                        ComponentState::Active
                    }
                    (ComponentState::Active, false) => {
                        slot.component.on_deactivate(&mut ctx);
                        ComponentState::Inactive
                    }
                    (ComponentState::UnloadedInactive, true) => ComponentState::Unloaded,
                    (ComponentState::Unloaded, false) => ComponentState::UnloadedInactive,
                    (state, _) => state,
                };
            }
            notify_views(&mut self.views, entity);

            stack.extend(&entity.children);
            stack.extend(&entity.inactive_children);
        }
    }

    // Components

    /// Attach a component and try to load it right away
    ///
    /// A component whose load asks for a retry stays queued and is retried
    /// at the start of every frame.
    pub fn add_component<T: Component>(&mut self, id: EntityId, component: T) -> Result<(), EntityError> {
        logged(self.insert_component(id, Box::new(component)))
    }

    fn insert_component(&mut self, id: EntityId, component: Box<dyn Component>) -> Result<(), EntityError> {
        let type_id = (*component).as_any().type_id();
        let entity = self.entity_ref(id)?;
        if entity.components.contains_key(&type_id) {
            return Err(EntityError::DuplicateComponent {
                entity: id,
                component: component.type_name(),
            });
        }
        let state = if entity.enabled {
            ComponentState::Unloaded
        } else {
            ComponentState::UnloadedInactive
        };

        let mask = self.registry.register_dyn(&*component)?;
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.components.insert(type_id, ComponentSlot { component, state, mask });
        }

        if self.process_entity(id) && !self.process_queue.contains(&id) {
            self.process_queue.push(id);
        }
        if type_id == TypeId::of::<TransformComponent>() {
            self.mark_transform_dirty(id);
        }
        Ok(())
    }

    /// Detach a component, deactivating and unloading it first
    pub fn remove_component<T: Component>(&mut self, id: EntityId) -> Result<(), EntityError> {
        logged(self.try_remove_component::<T>(id))
    }

    fn try_remove_component<T: Component>(&mut self, id: EntityId) -> Result<(), EntityError> {
        let world = self.world_matrix(id).unwrap_or_else(Mat4::identity);
        let entity = self.entities.get_mut(&id).ok_or(EntityError::UnknownEntity(id))?;
        let Some(mut slot) = entity.components.remove(&TypeId::of::<T>()) else {
            let full = std::any::type_name::<T>();
            return Err(EntityError::MissingComponent {
                entity: id,
                component: full.rsplit("::").next().unwrap_or(full),
            });
        };

        let mut ctx = ComponentContext {
            entity: id,
            world,
            quadtree: self.quadtree.as_mut(),
            octree: self.octree.as_mut(),
        };
        if slot.state == ComponentState::Active {
            slot.component.on_deactivate(&mut ctx);
        }
        if slot.state.is_loaded() {
            slot.component.on_unload(&mut ctx);
        }

        entity.refresh_mask();
        notify_views(&mut self.views, entity);
        if TypeId::of::<T>() == TypeId::of::<TransformComponent>() {
            self.mark_transform_dirty(id);
        }
        Ok(())
    }

    /// Component of type `T`
    pub fn component<T: Component>(&self, id: EntityId) -> Option<&T> {
        self.entities.get(&id)?.component()
    }

    /// Mutable component of type `T`
    ///
    /// Edits to a [`TransformComponent`] made through here need a
    /// [`EntityScene::mark_transform_dirty`] to take effect.
    pub fn component_mut<T: Component>(&mut self, id: EntityId) -> Option<&mut T> {
        self.entities.get_mut(&id)?.component_mut()
    }

    /// Lifecycle state of the component of type `T`
    pub fn component_state<T: Component>(&self, id: EntityId) -> Option<ComponentState> {
        self.entities.get(&id)?.component_state::<T>()
    }

    /// Edit the local transform of an entity and mark it dirty
    pub fn modify_transform(&mut self, id: EntityId, f: impl FnOnce(&mut Transform)) -> Result<(), EntityError> {
        let Some(transform) = self.component_mut::<TransformComponent>(id) else {
            let error = if self.entities.contains_key(&id) {
                EntityError::MissingComponent {
                    entity: id,
                    component: "TransformComponent",
                }
            } else {
                EntityError::UnknownEntity(id)
            };
            return logged(Err(error));
        };

        f(&mut transform.local);
        self.mark_transform_dirty(id);
        Ok(())
    }

    /// Try loading the pending components of an entity
    ///
    /// Returns whether some component still waits for a retry.
    fn process_entity(&mut self, id: EntityId) -> bool {
        let world = self.world_matrix(id).unwrap_or_else(Mat4::identity);
        let Some(entity) = self.entities.get_mut(&id) else {
            return false;
        };

        let mut ctx = ComponentContext {
            entity: id,
            world,
            quadtree: self.quadtree.as_mut(),
            octree: self.octree.as_mut(),
        };
        let mut changed = false;
        let mut pending = false;
        for slot in entity.components.values_mut() {
            if !slot.state.is_pending() {
                continue;
            }
            match slot.component.on_load(&mut ctx) {
                LoadResult::Loaded => {
                    changed = true;
                    slot.state = if slot.state == ComponentState::Unloaded {
                        slot.component.on_activate(&mut ctx);
                        ComponentState::Active
                    } else {
                        ComponentState::Inactive
                    };
                }
                LoadResult::Retry => pending = true,
                LoadResult::Failed => {
                    log::warn!("Component {} of {id} failed to load", slot.component.type_name());
                    slot.state = ComponentState::LoadFailed;
                }
            }
        }

        if changed {
            entity.refresh_mask();
            notify_views(&mut self.views, entity);
        }
        pending
    }

    /// Apply pending deletions and retry pending component loads
    pub fn flush_queues(&mut self) {
        for id in std::mem::take(&mut self.delete_queue) {
            self.destroy_now(id);
        }

        let queue = std::mem::take(&mut self.process_queue);
        for id in queue {
            if self.process_entity(id) {
                self.process_queue.push(id);
            }
        }
    }

    fn destroy_now(&mut self, id: EntityId) {
        if !self.entities.contains_key(&id) {
            // Already gone with an ancestor
            return;
        }
        self.detach(id);

        let mut stack = vec![id];
        let mut destroyed = 0;
        while let Some(current) = stack.pop() {
            let world = self.world_matrix(current).unwrap_or_else(Mat4::identity);
            let Some(mut entity) = self.entities.remove(&current) else {
                continue;
            };

            let mut ctx = ComponentContext {
                entity: current,
                world,
                quadtree: self.quadtree.as_mut(),
                octree: self.octree.as_mut(),
            };
            for slot in entity.components.values_mut() {
                if slot.state == ComponentState::Active {
                    slot.component.on_deactivate(&mut ctx);
                }
                if slot.state.is_loaded() {
                    slot.component.on_unload(&mut ctx);
                }
            }
            for view in &mut self.views {
                view.remove(current);
            }
            self.process_queue.retain(|queued| *queued != current);

            stack.extend(&entity.children);
            stack.extend(&entity.inactive_children);
            destroyed += 1;
        }
        log::debug!("Destroyed {destroyed} entities under {id}");
    }

    // Views and systems

    /// View over the entities holding all components of `S`
    ///
    /// Views with equal signatures are shared.
    pub fn create_view<S: ComponentSet>(&mut self) -> Result<ViewId, EntityError> {
        let signature = logged(S::mask(&mut self.registry))?;
        if let Some(index) = self.views.iter().position(|view| view.signature() == signature) {
            return Ok(ViewId(index));
        }

        let mut view = View::new(signature);
        for entity in self.entities.values() {
            view.on_entity_changed(entity.id, entity.mask, entity.enabled);
        }
        self.views.push(view);
        Ok(ViewId(self.views.len() - 1))
    }

    /// View by handle
    pub fn view(&self, id: ViewId) -> Option<&View> {
        self.views.get(id.0)
    }

    /// Add a system, running its `init` right away
    pub fn add_system(&mut self, mut system: Box<dyn System>) {
        system.init(self);
        log::debug!("Added system {} to stage {:?}", system.name(), system.stage());
        self.systems.push(system);
        self.systems.sort_by_key(|system| system.stage());
    }

    /// Remove every system called `name`, returns whether one was found
    pub fn remove_system(&mut self, name: &str) -> bool {
        let before = self.systems.len();
        self.systems.retain(|system| system.name() != name);
        before != self.systems.len()
    }

    /// Number of systems
    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    /// Run one frame: flush the queues, then every stage in order
    pub fn update(&mut self, time: &SimulationTime) {
        self.flush_queues();
        for stage in SystemStage::ALL {
            self.update_stage(time, stage);
        }
    }

    /// Run the systems of a single stage
    pub fn update_stage(&mut self, time: &SimulationTime, stage: SystemStage) {
        let mut systems = std::mem::take(&mut self.systems);
        for system in systems.iter_mut().filter(|system| system.stage() == stage) {
            system.update(self, time);
        }

        // Systems added while running
        systems.append(&mut self.systems);
        systems.sort_by_key(|system| system.stage());
        self.systems = systems;
    }

    // Spatial indices

    /// Create the quadtree 2D bodies register with
    ///
    /// Bodies that are already active get inserted.
    pub fn initialize_quadtree(&mut self, area: Rect) {
        let mut quadtree = Quadtree::new(area, self.config.spatial.clone());
        for entity in self.entities.values() {
            let active = entity.component_state::<Body2DComponent>() == Some(ComponentState::Active);
            if let (true, Some(body)) = (active, entity.component::<Body2DComponent>()) {
                let _ = quadtree.insert(entity.id, body.circle());
            }
        }
        self.quadtree = Some(quadtree);
    }

    /// Create the octree bounding spheres register with
    ///
    /// Spheres that are already active get inserted.
    pub fn initialize_octree(&mut self, volume: AABB) {
        let mut octree = Octree::new(volume, self.config.spatial.clone());
        for entity in self.entities.values() {
            let active = entity.component_state::<SphereComponent>() == Some(ComponentState::Active);
            if let (true, Some(sphere)) = (active, entity.component::<SphereComponent>()) {
                let _ = octree.insert(entity.id, sphere.world_sphere());
            }
        }
        self.octree = Some(octree);
    }

    /// Scene quadtree
    pub fn quadtree(&self) -> Option<&Quadtree<EntityId>> {
        self.quadtree.as_ref()
    }

    pub(crate) fn quadtree_mut(&mut self) -> Option<&mut Quadtree<EntityId>> {
        self.quadtree.as_mut()
    }

    /// Scene octree
    pub fn octree(&self) -> Option<&Octree<EntityId>> {
        self.octree.as_ref()
    }

    pub(crate) fn octree_mut(&mut self) -> Option<&mut Octree<EntityId>> {
        self.octree.as_mut()
    }

    // Rendering

    /// Renderer the render stage reports to
    pub fn set_render_sink(&mut self, sink: Box<dyn RenderSink>) {
        self.render_sink = Some(sink);
    }

    pub(crate) fn render_sink_mut(&mut self) -> Option<&mut (dyn RenderSink + 'static)> {
        self.render_sink.as_deref_mut()
    }

    /// Enabled entities with a loaded camera
    pub fn cameras(&self) -> &[EntityId] {
        match self.camera_view.and_then(|id| self.view(id)) {
            Some(view) => view.active(),
            None => &[],
        }
    }

    /// First enabled camera
    pub fn active_camera(&self) -> Option<EntityId> {
        self.cameras().first().copied()
    }

    // Transforms

    /// World matrix of the nearest entity at or above `id` with a transform
    ///
    /// Reflects the last transform pass.
    pub fn world_matrix(&self, id: EntityId) -> Option<Mat4> {
        let mut current = Some(self.entities.get(&id)?);
        while let Some(entity) = current {
            if let Some(transform) = entity.component::<TransformComponent>() {
                return Some(transform.world);
            }
            current = entity.parent.and_then(|parent| self.entities.get(&parent));
        }
        Some(Mat4::identity())
    }

    /// Mark `id` dirty together with every ancestor and every active
    /// descendant
    pub fn mark_transform_dirty(&mut self, id: EntityId) {
        let Some(entity) = self.entities.get_mut(&id) else {
            log::error!("Cannot mark unknown entity {id} dirty");
            return;
        };
        entity.transform_dirty = true;
        let mut stack = entity.children.clone();

        let mut current = entity.parent;
        while let Some(parent) = current {
            let Some(entity) = self.entities.get_mut(&parent) else {
                break;
            };
            if entity.transform_dirty {
                break;
            }
            entity.transform_dirty = true;
            current = entity.parent;
        }

        while let Some(child) = stack.pop() {
            if let Some(entity) = self.entities.get_mut(&child) {
                entity.transform_dirty = true;
                stack.extend(&entity.children);
            }
        }
    }

    // Copying

    /// Snapshot an entity subtree with unloaded copies of its components
    pub fn copy(&self, id: EntityId) -> Option<EntityPrefab> {
        let mut visitor = EntityCopyVisitor::new();
        traverse(&mut &*self, id, &mut visitor, TraversalMode::All);
        visitor.take_prefab()
    }

    /// Copy an entity subtree next to the original
    pub fn duplicate(&mut self, id: EntityId) -> Result<EntityId, EntityError> {
        if id == self.root {
            return logged(Err(EntityError::RootEntity));
        }
        let parent = logged(self.entity_ref(id))?.parent.unwrap_or(self.root);
        let prefab = logged(self.copy(id).ok_or(EntityError::UnknownEntity(id)))?;
        self.instantiate(&prefab, parent)
    }

    /// Build the entities of a prefab under `parent`, returns the new top
    /// entity
    pub fn instantiate(&mut self, prefab: &EntityPrefab, parent: EntityId) -> Result<EntityId, EntityError> {
        logged(self.try_instantiate(prefab, parent))
    }

    fn try_instantiate(&mut self, prefab: &EntityPrefab, parent: EntityId) -> Result<EntityId, EntityError> {
        self.entity_ref(parent)?;
        if prefab.is_empty() {
            return Err(EntityError::EmptyPrefab);
        }

        // Everything that can reject a component is checked before the
        // first entity exists
        for entry in prefab.entities() {
            let mut seen = Vec::with_capacity(entry.components.len());
            for component in &entry.components {
                let type_id = (**component).as_any().type_id();
                if seen.contains(&type_id) {
                    return Err(EntityError::DuplicateComponent {
                        entity: parent,
                        component: component.type_name(),
                    });
                }
                seen.push(type_id);
                self.registry.register_dyn(&**component)?;
            }
        }

        let mut created: Vec<EntityId> = Vec::with_capacity(prefab.len());
        for entry in prefab.entities() {
            let id = self.create_detached(entry.name.clone(), entry.active);
            let entry_parent = entry.parent.and_then(|index| created.get(index).copied()).unwrap_or(parent);
            self.attach(entry_parent, id);
            created.push(id);
        }

        let top = created[0];
        self.refresh_enabled(top);
        self.mark_transform_dirty(top);

        for (entry, id) in prefab.entities().iter().zip(&created) {
            for component in &entry.components {
                if let Err(error) = self.insert_component(*id, component.duplicate()) {
                    self.destroy_now(top);
                    return Err(error);
                }
            }
        }
        Ok(top)
    }
}

impl Hierarchy for EntityScene {
    type Id = EntityId;

    fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    fn collect_children(&self, id: EntityId, mode: TraversalMode, out: &mut Vec<EntityId>) {
        if let Some(entity) = self.entities.get(&id) {
            out.extend(&entity.children);
            if mode == TraversalMode::All {
                out.extend(&entity.inactive_children);
            }
        }
    }
}

impl TransformHierarchy for EntityScene {
    fn is_transform(&self, id: EntityId) -> bool {
        self.component::<TransformComponent>(id).is_some()
    }

    fn is_transform_dirty(&self, id: EntityId) -> bool {
        self.entities.get(&id).is_some_and(Entity::is_transform_dirty)
    }

    fn update_transform(&mut self, id: EntityId, parent_world: &Mat4) -> Mat4 {
        match self.component_mut::<TransformComponent>(id) {
            Some(transform) => {
                transform.world = parent_world * transform.local.to_matrix();
                transform.world
            }
            None => *parent_world,
        }
    }

    fn clear_transform_dirty(&mut self, id: EntityId) {
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.transform_dirty = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{LightComponent, OctreeSystem, TransformSystem};
    use crate::foundation::math::{Vec2, Vec3};
    use crate::spatial::Sphere;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Slow {
        attempts: Arc<AtomicUsize>,
        needed: usize,
    }

    impl Component for Slow {
        fn on_load(&mut self, _ctx: &mut ComponentContext<'_>) -> LoadResult {
            if self.attempts.fetch_add(1, Ordering::SeqCst) + 1 >= self.needed {
                LoadResult::Loaded
            } else {
                LoadResult::Retry
            }
        }

        fn duplicate(&self) -> Box<dyn Component> {
            Box::new(Slow {
                attempts: Arc::new(AtomicUsize::new(0)),
                needed: self.needed,
            })
        }
    }

    struct Broken;

    impl Component for Broken {
        fn on_load(&mut self, _ctx: &mut ComponentContext<'_>) -> LoadResult {
            LoadResult::Failed
        }

        fn duplicate(&self) -> Box<dyn Component> {
            Box::new(Broken)
        }
    }

    #[test]
    fn test_add_component_updates_views() {
        let mut scene = EntityScene::default();
        let view = scene.create_view::<(TransformComponent, LightComponent)>().unwrap();
        let lamp = scene.create_entity("lamp");

        scene.add_component(lamp, TransformComponent::default()).unwrap();
        assert!(scene.view(view).unwrap().active().is_empty());

        scene
            .add_component(lamp, LightComponent::point(Vec3::new(1.0, 1.0, 1.0), 2.0))
            .unwrap();
        assert_eq!(scene.view(view).unwrap().active(), &[lamp]);

        scene.remove_component::<LightComponent>(lamp).unwrap();
        assert!(!scene.view(view).unwrap().contains(lamp));
    }

    #[test]
    fn test_activation_moves_between_view_lists() {
        let mut scene = EntityScene::default();
        let view = scene.create_view::<(TransformComponent,)>().unwrap();
        let parent = scene.create_entity("parent");
        let child = scene.create_entity("child");
        scene.set_parent(child, parent).unwrap();
        scene.add_component(child, TransformComponent::default()).unwrap();

        scene.set_active(parent, false).unwrap();
        let v = scene.view(view).unwrap();
        assert!(v.active().is_empty());
        assert_eq!(v.inactive(), &[child]);
        assert_eq!(scene.component_state::<TransformComponent>(child), Some(ComponentState::Inactive));
        // The child's own flag is untouched
        assert!(scene.entity(child).unwrap().is_active());

        scene.set_active(parent, true).unwrap();
        assert_eq!(scene.view(view).unwrap().active(), &[child]);
        assert_eq!(scene.component_state::<TransformComponent>(child), Some(ComponentState::Active));
    }

    #[test]
    fn test_component_added_to_disabled_entity_loads_inactive() {
        let mut scene = EntityScene::default();
        let e = scene.create_entity("e");
        scene.set_active(e, false).unwrap();
        scene.add_component(e, TransformComponent::default()).unwrap();
        assert_eq!(scene.component_state::<TransformComponent>(e), Some(ComponentState::Inactive));
    }

    #[test]
    fn test_retry_loads_on_later_frames() {
        let mut scene = EntityScene::default();
        let e = scene.create_entity("e");
        let attempts = Arc::new(AtomicUsize::new(0));
        scene
            .add_component(
                e,
                Slow {
                    attempts: Arc::clone(&attempts),
                    needed: 3,
                },
            )
            .unwrap();
        assert_eq!(scene.component_state::<Slow>(e), Some(ComponentState::Unloaded));

        let time = SimulationTime::default();
        scene.update(&time);
        assert_eq!(scene.component_state::<Slow>(e), Some(ComponentState::Unloaded));
        scene.update(&time);
        assert_eq!(scene.component_state::<Slow>(e), Some(ComponentState::Active));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);

        scene.update(&time);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_failed_load_stays_out_of_views() {
        let mut scene = EntityScene::default();
        let view = scene.create_view::<(Broken,)>().unwrap();
        let e = scene.create_entity("e");
        scene.add_component(e, Broken).unwrap();
        assert_eq!(scene.component_state::<Broken>(e), Some(ComponentState::LoadFailed));
        assert!(!scene.view(view).unwrap().contains(e));
    }

    #[test]
    fn test_contract_violations() {
        let mut scene = EntityScene::default();
        let a = scene.create_entity("a");
        let b = scene.create_entity("b");
        scene.set_parent(b, a).unwrap();

        assert_eq!(scene.set_parent(a, b), Err(EntityError::Cycle { parent: b, child: a }));
        assert_eq!(scene.set_parent(a, a), Err(EntityError::Cycle { parent: a, child: a }));
        assert_eq!(scene.destroy_entity(scene.root()), Err(EntityError::RootEntity));
        assert_eq!(scene.set_active(EntityId(99), false), Err(EntityError::UnknownEntity(EntityId(99))));

        scene.add_component(a, TransformComponent::default()).unwrap();
        assert!(matches!(
            scene.add_component(a, TransformComponent::default()),
            Err(EntityError::DuplicateComponent { .. })
        ));
        assert!(matches!(
            scene.remove_component::<LightComponent>(a),
            Err(EntityError::MissingComponent { .. })
        ));
    }

    #[test]
    fn test_destroy_is_deferred_to_next_frame() {
        let mut scene = EntityScene::default();
        scene.initialize_octree(AABB::cube(Vec3::zeros(), 100.0));
        let parent = scene.create_entity("parent");
        let child = scene.create_entity("child");
        scene.set_parent(child, parent).unwrap();
        scene
            .add_component(child, SphereComponent::new(Sphere::new(Vec3::zeros(), 1.0)))
            .unwrap();
        assert!(scene.octree().unwrap().contains(child));

        scene.destroy_entity(parent).unwrap();
        assert!(scene.entity(child).is_some());
        assert!(scene.is_pending_delete(parent));

        scene.update(&SimulationTime::default());
        assert!(scene.entity(parent).is_none());
        assert!(scene.entity(child).is_none());
        assert!(!scene.octree().unwrap().contains(child));
        assert!(scene.entity(scene.root()).unwrap().children().is_empty());
    }

    #[test]
    fn test_body_registers_with_quadtree_while_enabled() {
        let mut scene = EntityScene::default();
        let e = scene.create_entity("ship");
        scene.add_component(e, Body2DComponent::new(2.0)).unwrap();

        // Active bodies join a quadtree created later
        scene.initialize_quadtree(Rect::new(Vec2::new(-50.0, -50.0), Vec2::new(50.0, 50.0)));
        assert!(scene.quadtree().unwrap().contains(e));

        scene.set_active(e, false).unwrap();
        assert!(!scene.quadtree().unwrap().contains(e));
        scene.set_active(e, true).unwrap();
        assert!(scene.quadtree().unwrap().contains(e));
    }

    #[test]
    fn test_transform_pass_over_entities() {
        let mut scene = EntityScene::default();
        scene.add_system(Box::new(TransformSystem::new()));
        let a = scene.create_entity("a");
        let b = scene.create_entity("b");
        let c = scene.create_entity("c");
        scene.set_parent(b, a).unwrap();
        scene.set_parent(c, b).unwrap();
        for id in [a, b, c] {
            scene
                .add_component(id, TransformComponent::from_position(Vec3::new(1.0, 0.0, 0.0)))
                .unwrap();
        }

        scene.update(&SimulationTime::default());
        let world = scene.component::<TransformComponent>(c).unwrap().world_position();
        assert!((world - Vec3::new(3.0, 0.0, 0.0)).magnitude() < 1e-5);

        scene.modify_transform(a, |t| t.position.y = 2.0).unwrap();
        scene.update(&SimulationTime::default());
        let world = scene.component::<TransformComponent>(c).unwrap().world_position();
        assert!((world - Vec3::new(3.0, 2.0, 0.0)).magnitude() < 1e-5);
    }

    #[test]
    fn test_duplicate_copies_components_and_children() {
        let mut scene = EntityScene::default();
        let view = scene.create_view::<(TransformComponent,)>().unwrap();
        let parent = scene.create_entity("parent");
        let child = scene.create_entity("child");
        scene.set_parent(child, parent).unwrap();
        scene.add_component(child, TransformComponent::default()).unwrap();
        scene.set_active(child, false).unwrap();

        let copy = scene.duplicate(parent).unwrap();
        assert_ne!(copy, parent);
        let copied = scene.entity(copy).unwrap();
        assert_eq!(copied.name(), "parent");
        assert_eq!(copied.inactive_children().len(), 1);

        let copied_child = copied.inactive_children()[0];
        assert_ne!(copied_child, child);
        assert_eq!(
            scene.component_state::<TransformComponent>(copied_child),
            Some(ComponentState::Inactive)
        );
        assert_eq!(scene.view(view).unwrap().inactive().len(), 2);
    }

    #[test]
    fn test_cameras_follow_camera_components() {
        let mut scene = EntityScene::default();
        let eye = scene.create_entity("eye");
        assert_eq!(scene.active_camera(), None);
        scene.add_component(eye, CameraComponent::default()).unwrap();
        assert_eq!(scene.active_camera(), Some(eye));
        scene.set_active(eye, false).unwrap();
        assert!(scene.cameras().is_empty());
    }

    #[test]
    fn test_transform_added_after_first_frame() {
        let mut scene = EntityScene::default();
        scene.add_system(Box::new(TransformSystem::new()));
        let e = scene.create_entity("e");
        let child = scene.create_entity("child");
        scene.set_parent(child, e).unwrap();
        scene.add_component(child, TransformComponent::default()).unwrap();
        scene.update(&SimulationTime::default());

        scene
            .add_component(e, TransformComponent::from_position(Vec3::new(10.0, 0.0, 0.0)))
            .unwrap();
        scene.update(&SimulationTime::default());

        let world = scene.component::<TransformComponent>(e).unwrap().world_position();
        assert!((world - Vec3::new(10.0, 0.0, 0.0)).magnitude() < 1e-5);
        let world = scene.component::<TransformComponent>(child).unwrap().world_position();
        assert!((world - Vec3::new(10.0, 0.0, 0.0)).magnitude() < 1e-5);
    }

    #[test]
    fn test_transform_removed_after_first_frame() {
        let mut scene = EntityScene::default();
        scene.add_system(Box::new(TransformSystem::new()));
        let parent = scene.create_entity("parent");
        let child = scene.create_entity("child");
        scene.set_parent(child, parent).unwrap();
        scene
            .add_component(parent, TransformComponent::from_position(Vec3::new(5.0, 0.0, 0.0)))
            .unwrap();
        scene
            .add_component(child, TransformComponent::from_position(Vec3::new(1.0, 0.0, 0.0)))
            .unwrap();
        scene.update(&SimulationTime::default());
        let world = scene.component::<TransformComponent>(child).unwrap().world_position();
        assert!((world - Vec3::new(6.0, 0.0, 0.0)).magnitude() < 1e-5);

        scene.remove_component::<TransformComponent>(parent).unwrap();
        scene.update(&SimulationTime::default());
        let world = scene.component::<TransformComponent>(child).unwrap().world_position();
        assert!((world - Vec3::new(1.0, 0.0, 0.0)).magnitude() < 1e-5);
    }

    #[test]
    fn test_sphere_follows_transform_added_later() {
        let mut scene = EntityScene::default();
        scene.initialize_octree(AABB::cube(Vec3::zeros(), 100.0));
        scene.add_system(Box::new(TransformSystem::new()));
        scene.add_system(Box::new(OctreeSystem::new()));

        let rock = scene.create_entity("rock");
        scene
            .add_component(rock, SphereComponent::new(Sphere::new(Vec3::zeros(), 1.0)))
            .unwrap();
        scene.update(&SimulationTime::default());
        let center = scene.octree().unwrap().get(rock).unwrap().center;
        assert!(center.magnitude() < 1e-5);

        scene
            .add_component(rock, TransformComponent::from_position(Vec3::new(0.0, 0.0, 40.0)))
            .unwrap();
        scene.update(&SimulationTime::default());
        let center = scene.octree().unwrap().get(rock).unwrap().center;
        assert!((center - Vec3::new(0.0, 0.0, 40.0)).magnitude() < 1e-5);
    }

    #[test]
    fn test_rejected_prefab_creates_nothing() {
        let mut scene = EntityScene::default();
        let mut prefab = EntityPrefab::new("ship");
        prefab.add_component(0, TransformComponent::default());
        let turret = prefab.add_entity(0, "turret", true).unwrap();
        prefab.add_component(turret, LightComponent::point(Vec3::new(1.0, 1.0, 1.0), 1.0));
        prefab.add_component(turret, LightComponent::point(Vec3::new(1.0, 0.0, 0.0), 1.0));

        let count = scene.entity_count();
        let result = scene.instantiate(&prefab, scene.root());
        assert!(matches!(result, Err(EntityError::DuplicateComponent { .. })));
        assert_eq!(scene.entity_count(), count);
        assert!(scene.entity(scene.root()).unwrap().children().is_empty());
    }
}
