use super::{Item, ItemValue};
use crate::entities::{EntityId, EntityScene, TransformComponent};
use crate::traversal::{traverse, TraversalMode, TreeVisitor};

/// Projects an entity subtree into an [`Item`] tree
///
/// Every entity becomes an item named after it, carrying its id, active flag,
/// attached component names and, when it has a transform, its local position.
#[derive(Debug, Default)]
pub struct ItemExportVisitor {
    stack: Vec<Item>,
    result: Option<Item>,
}

impl ItemExportVisitor {
    /// Create a visitor
    pub fn new() -> Self {
        Self::default()
    }

    /// Export the subtree under `root`, inactive entities included
    pub fn export(scene: &EntityScene, root: EntityId) -> Option<Item> {
        let mut visitor = Self::new();
        traverse(&mut &*scene, root, &mut visitor, TraversalMode::All);
        visitor.take_item()
    }

    /// Item tree of the last traversal
    pub fn take_item(&mut self) -> Option<Item> {
        self.result.take()
    }
}

/// Ids past `i64::MAX` are kept as text
fn id_value(id: EntityId) -> ItemValue {
    match i64::try_from(id.0) {
        Ok(value) => ItemValue::Int(value),
        Err(_) => {
            log::warn!("Entity id {id} does not fit an integer item value");
            ItemValue::Text(id.0.to_string())
        }
    }
}

impl<'a> TreeVisitor<&'a EntityScene> for ItemExportVisitor {
    fn pre_traverse(&mut self, _scene: &mut &'a EntityScene) {
        self.stack.clear();
        self.result = None;
    }

    fn pre_order_visit(&mut self, scene: &mut &'a EntityScene, id: EntityId) -> bool {
        let Some(entity) = scene.entity(id) else {
            return false;
        };

        let mut item = Item::new(entity.name());
        item.set("id", id_value(id));
        item.set("active", entity.is_active());
        item.set("components", entity.component_names().join(","));
        if let Some(transform) = entity.component::<TransformComponent>() {
            let position = transform.local.position;
            item.set("position", vec![position.x, position.y, position.z]);
        }
        self.stack.push(item);
        true
    }

    fn post_order_visit(&mut self, _scene: &mut &'a EntityScene, _id: EntityId) {
        let Some(item) = self.stack.pop() else {
            return;
        };
        match self.stack.last_mut() {
            Some(parent) => {
                parent.add_child(item);
            }
            None => self.result = Some(item),
        }
    }

    fn post_traverse(&mut self, _scene: &mut &'a EntityScene) {
        if !self.stack.is_empty() {
            log::error!("Item export finished with {} unclosed items", self.stack.len());
            self.stack.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;

    #[test]
    fn test_export_mirrors_hierarchy() {
        let mut scene = EntityScene::default();
        let ship = scene.create_entity("ship");
        scene
            .add_component(ship, TransformComponent::from_position(Vec3::new(1.0, 2.0, 3.0)))
            .unwrap();
        let engine = scene.create_entity("engine");
        scene.set_parent(engine, ship).unwrap();
        scene.set_active(engine, false).unwrap();

        let item = ItemExportVisitor::export(&scene, ship).unwrap();
        assert_eq!(item.name, "ship");
        assert_eq!(item.get("id"), Some(&ItemValue::Int(ship.0 as i64)));
        assert_eq!(item.get("position"), Some(&ItemValue::Vector(vec![1.0, 2.0, 3.0])));
        assert_eq!(item.get("components"), Some(&ItemValue::Text("TransformComponent".into())));

        let engine_item = item.resolve(&"engine".into()).unwrap();
        assert_eq!(engine_item.get("active"), Some(&ItemValue::Bool(false)));
        assert!(engine_item.get("position").is_none());

        let whole = ItemExportVisitor::export(&scene, scene.root()).unwrap();
        assert!(whole.resolve(&"ship/engine".into()).is_some());
    }

    #[test]
    fn test_large_ids_are_not_truncated() {
        assert_eq!(id_value(EntityId(7)), ItemValue::Int(7));
        assert_eq!(id_value(EntityId(u64::MAX)), ItemValue::Text(u64::MAX.to_string()));
    }

    #[test]
    fn test_export_of_unknown_entity() {
        let scene = EntityScene::default();
        assert!(ItemExportVisitor::export(&scene, EntityId(999)).is_none());
    }
}
