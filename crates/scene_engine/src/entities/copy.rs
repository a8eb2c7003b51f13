//! Entity prefabs

use std::fmt;

use super::component::Component;
use super::entity::EntityId;
use super::scene::EntityScene;
use crate::traversal::TreeVisitor;

/// One entity of an [`EntityPrefab`]
pub struct PrefabEntity {
    /// Entity name
    pub name: String,
    /// Whether the entity starts active
    pub active: bool,
    /// Index of the parent within the prefab, `None` for the top entity
    pub parent: Option<usize>,
    /// Unloaded components
    pub components: Vec<Box<dyn Component>>,
}

impl fmt::Debug for PrefabEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let components: Vec<&str> = self.components.iter().map(|c| c.type_name()).collect();
        f.debug_struct("PrefabEntity")
            .field("name", &self.name)
            .field("active", &self.active)
            .field("parent", &self.parent)
            .field("components", &components)
            .finish()
    }
}

/// Detached entity subtree, instantiated with
/// [`EntityScene::instantiate`]
///
/// Entries are in pre-order. Can be instantiated any number of times, into
/// any scene.
#[derive(Debug, Default)]
pub struct EntityPrefab {
    entities: Vec<PrefabEntity>,
}

impl EntityPrefab {
    /// Prefab with a single active top entity
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            entities: vec![PrefabEntity {
                name: name.into(),
                active: true,
                parent: None,
                components: Vec::new(),
            }],
        }
    }

    /// Add an entity under the entry at `parent`, returns its index
    pub fn add_entity(&mut self, parent: usize, name: impl Into<String>, active: bool) -> Option<usize> {
        let name = name.into();
        if parent >= self.entities.len() {
            log::error!("Prefab has no entry {parent} to attach {name} to");
            return None;
        }
        self.entities.push(PrefabEntity {
            name,
            active,
            parent: Some(parent),
            components: Vec::new(),
        });
        Some(self.entities.len() - 1)
    }

    /// Add a component to the entry at `index`
    pub fn add_component<T: Component>(&mut self, index: usize, component: T) -> bool {
        match self.entities.get_mut(index) {
            Some(entry) => {
                entry.components.push(Box::new(component));
                true
            }
            None => false,
        }
    }

    /// Entries in pre-order
    pub fn entities(&self) -> &[PrefabEntity] {
        &self.entities
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the prefab has no entries
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Snapshots an entity subtree into an [`EntityPrefab`]
#[derive(Debug, Default)]
pub struct EntityCopyVisitor {
    entities: Vec<PrefabEntity>,
    parents: Vec<usize>,
}

impl EntityCopyVisitor {
    /// Create a visitor
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefab of the last traversal, `None` if nothing was copied
    pub fn take_prefab(&mut self) -> Option<EntityPrefab> {
        if self.entities.is_empty() {
            return None;
        }
        Some(EntityPrefab {
            entities: std::mem::take(&mut self.entities),
        })
    }
}

impl<'a> TreeVisitor<&'a EntityScene> for EntityCopyVisitor {
    fn pre_traverse(&mut self, _scene: &mut &'a EntityScene) {
        self.entities.clear();
        self.parents.clear();
    }

    fn pre_order_visit(&mut self, scene: &mut &'a EntityScene, id: EntityId) -> bool {
        let Some(entity) = scene.entity(id) else {
            return false;
        };

        self.entities.push(PrefabEntity {
            name: entity.name().to_string(),
            active: entity.is_active(),
            parent: self.parents.last().copied(),
            components: entity.components().map(|component| component.duplicate()).collect(),
        });
        self.parents.push(self.entities.len() - 1);
        true
    }

    fn post_order_visit(&mut self, _scene: &mut &'a EntityScene, _id: EntityId) {
        self.parents.pop();
    }
}
