//! Views
//!
//! A view caches the entities matching its signature, split by whether they
//! are enabled. Membership is updated per entity change, never by rescanning
//! the scene.

use std::collections::HashMap;

use super::component::ComponentMask;
use super::entity::EntityId;

/// Handle of a view within its scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Active(usize),
    Inactive(usize),
}

/// Entities whose loaded components cover a signature
#[derive(Debug)]
pub struct View {
    signature: ComponentMask,
    active: Vec<EntityId>,
    inactive: Vec<EntityId>,
    index: HashMap<EntityId, Slot>,
}

impl View {
    pub(crate) fn new(signature: ComponentMask) -> Self {
        Self {
            signature,
            active: Vec::new(),
            inactive: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Component signature of this view
    pub fn signature(&self) -> ComponentMask {
        self.signature
    }

    /// Matching enabled entities
    pub fn active(&self) -> &[EntityId] {
        &self.active
    }

    /// Matching disabled entities
    pub fn inactive(&self) -> &[EntityId] {
        &self.inactive
    }

    /// Whether the entity is in either list
    pub fn contains(&self, id: EntityId) -> bool {
        self.index.contains_key(&id)
    }

    /// Whether an entity with `mask` belongs in this view
    pub fn matches(&self, mask: ComponentMask) -> bool {
        mask.contains(self.signature)
    }

    /// Place an entity according to its current mask and enabled flag
    pub(crate) fn on_entity_changed(&mut self, id: EntityId, mask: ComponentMask, enabled: bool) {
        let wanted = self.matches(mask).then_some(enabled);
        let current = self.index.get(&id).map(|slot| matches!(slot, Slot::Active(_)));
        if wanted == current {
            return;
        }

        if current.is_some() {
            self.remove(id);
        }
        match wanted {
            Some(true) => {
                self.index.insert(id, Slot::Active(self.active.len()));
                self.active.push(id);
            }
            Some(false) => {
                self.index.insert(id, Slot::Inactive(self.inactive.len()));
                self.inactive.push(id);
            }
            None => {}
        }
    }

    /// Drop an entity from the view
    pub(crate) fn remove(&mut self, id: EntityId) {
        let Some(slot) = self.index.remove(&id) else {
            return;
        };

        let (list, position) = match slot {
            Slot::Active(position) => (&mut self.active, position),
            Slot::Inactive(position) => (&mut self.inactive, position),
        };
        list.swap_remove(position);

        if let Some(moved) = list.get(position).copied() {
            let slot = match slot {
                Slot::Active(_) => Slot::Active(position),
                Slot::Inactive(_) => Slot::Inactive(position),
            };
            self.index.insert(moved, slot);
        }
    }
}
