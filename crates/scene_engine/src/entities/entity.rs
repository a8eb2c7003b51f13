//! Entity records

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;

use super::component::{Component, ComponentMask, ComponentState};

/// Entity identifier, unique within one entity scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// A component attached to an entity together with its lifecycle state
pub(crate) struct ComponentSlot {
    pub(crate) component: Box<dyn Component>,
    pub(crate) state: ComponentState,
    pub(crate) mask: ComponentMask,
}

impl ComponentSlot {
    pub(crate) fn get<T: Component>(&self) -> Option<&T> {
        let component: &dyn Component = &*self.component;
        component.as_any().downcast_ref()
    }

    pub(crate) fn get_mut<T: Component>(&mut self) -> Option<&mut T> {
        let component: &mut dyn Component = &mut *self.component;
        component.as_any_mut().downcast_mut()
    }
}

/// Entity of an [`EntityScene`](super::EntityScene)
///
/// An entity is enabled when it and all its ancestors are active. Only the
/// components of enabled entities are in the `Active` state.
pub struct Entity {
    pub(crate) id: EntityId,
    pub(crate) name: String,
    pub(crate) active: bool,
    pub(crate) enabled: bool,
    pub(crate) parent: Option<EntityId>,
    pub(crate) children: Vec<EntityId>,
    pub(crate) inactive_children: Vec<EntityId>,
    pub(crate) components: HashMap<TypeId, ComponentSlot>,
    pub(crate) mask: ComponentMask,
    pub(crate) transform_dirty: bool,
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("active", &self.active)
            .field("enabled", &self.enabled)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .field("inactive_children", &self.inactive_children)
            .field("components", &self.component_names())
            .finish_non_exhaustive()
    }
}

impl Entity {
    pub(crate) fn new(id: EntityId, name: String) -> Self {
        Self {
            id,
            name,
            active: true,
            enabled: false,
            parent: None,
            children: Vec::new(),
            inactive_children: Vec::new(),
            components: HashMap::new(),
            mask: ComponentMask::EMPTY,
            transform_dirty: true,
        }
    }

    /// Entity id
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Entity name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The entity's own active flag
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Whether the entity and all its ancestors are active
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Parent entity, `None` for the root
    pub fn parent(&self) -> Option<EntityId> {
        self.parent
    }

    /// Active children
    pub fn children(&self) -> &[EntityId] {
        &self.children
    }

    /// Inactive children
    pub fn inactive_children(&self) -> &[EntityId] {
        &self.inactive_children
    }

    /// Mask of the loaded components
    pub fn mask(&self) -> ComponentMask {
        self.mask
    }

    /// Whether the world transform needs recomputation
    pub fn is_transform_dirty(&self) -> bool {
        self.transform_dirty
    }

    /// Component of type `T`
    pub fn component<T: Component>(&self) -> Option<&T> {
        self.components.get(&TypeId::of::<T>()).and_then(ComponentSlot::get)
    }

    pub(crate) fn component_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.components.get_mut(&TypeId::of::<T>()).and_then(ComponentSlot::get_mut)
    }

    /// Lifecycle state of the component of type `T`
    pub fn component_state<T: Component>(&self) -> Option<ComponentState> {
        self.components.get(&TypeId::of::<T>()).map(|slot| slot.state)
    }

    /// Short type names of all attached components, sorted
    pub fn component_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self
            .components
            .values()
            .map(|slot| slot.component.type_name())
            .collect();
        names.sort_unstable();
        names
    }

    /// Iterate the attached components
    pub fn components(&self) -> impl Iterator<Item = &(dyn Component + 'static)> {
        self.components.values().map(|slot| &*slot.component)
    }

    /// Recompute the mask from the loaded components
    pub(crate) fn refresh_mask(&mut self) {
        self.mask = self
            .components
            .values()
            .filter(|slot| slot.state.is_loaded())
            .fold(ComponentMask::EMPTY, |mask, slot| mask | slot.mask);
    }
}
