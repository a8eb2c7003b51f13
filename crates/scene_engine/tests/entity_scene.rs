//! Integration tests for the entity scene, its views and systems

use approx::assert_relative_eq;
use scene_engine::entities::{
    Body2DComponent, ComponentState, EntityScene, LightComponent, OctreeSystem, SphereComponent, TransformComponent,
    TransformSystem,
};
use scene_engine::foundation::logging;
use scene_engine::foundation::math::{translation_of, Vec2, Vec3};
use scene_engine::foundation::time::SimulationTime;
use scene_engine::item::{ItemExportVisitor, ItemValue};
use scene_engine::spatial::{Rect, Sphere, VolumeFilter, AABB};
use scene_engine::traversal::{traverse, TransformUpdateVisitor, TraversalMode};

#[test]
fn test_view_membership_through_lifecycle() {
    logging::init_for_tests();
    let mut scene = EntityScene::default();
    let view = scene.create_view::<(TransformComponent, LightComponent)>().unwrap();

    let group = scene.create_entity("group");
    let lamp = scene.create_entity("lamp");
    scene.set_parent(lamp, group).unwrap();
    scene.add_component(lamp, TransformComponent::default()).unwrap();
    assert!(!scene.view(view).unwrap().contains(lamp));

    scene
        .add_component(lamp, LightComponent::point(Vec3::new(1.0, 1.0, 1.0), 2.0))
        .unwrap();
    assert_eq!(scene.view(view).unwrap().active(), &[lamp]);

    // Disabling an ancestor moves the entity to the inactive list
    scene.set_active(group, false).unwrap();
    assert!(scene.view(view).unwrap().active().is_empty());
    assert_eq!(scene.view(view).unwrap().inactive(), &[lamp]);
    assert_eq!(scene.component_state::<LightComponent>(lamp), Some(ComponentState::Inactive));

    scene.set_active(group, true).unwrap();
    assert_eq!(scene.view(view).unwrap().active(), &[lamp]);

    scene.remove_component::<LightComponent>(lamp).unwrap();
    assert!(!scene.view(view).unwrap().contains(lamp));

    // A second request for the same signature shares the view
    let same = scene.create_view::<(LightComponent, TransformComponent)>().unwrap();
    assert_eq!(same, view);

    scene.destroy_entity(group).unwrap();
    assert!(scene.entity(lamp).is_some());
    scene.update(&SimulationTime::default());
    assert!(scene.entity(lamp).is_none());
    assert_eq!(scene.entity_count(), 1);
}

#[test]
fn test_transform_stack_stays_balanced() {
    let mut scene = EntityScene::default();
    let mut parent = scene.root();
    let mut chain = Vec::new();
    for i in 0..6 {
        let id = scene.create_entity(format!("link{i}"));
        scene.set_parent(id, parent).unwrap();
        // Every other link is a plain grouping entity without transform
        if i % 2 == 0 {
            scene
                .add_component(id, TransformComponent::from_position(Vec3::new(0.0, 1.0, 0.0)))
                .unwrap();
        }
        chain.push(id);
        parent = id;
    }
    let side = scene.create_entity("side");
    scene.add_component(side, TransformComponent::default()).unwrap();

    let mut visitor = TransformUpdateVisitor::new();
    let root = scene.root();
    traverse(&mut scene, root, &mut visitor, TraversalMode::ActiveOnly);
    assert!(visitor.is_balanced());

    let last = *chain.last().unwrap();
    assert_relative_eq!(translation_of(&scene.world_matrix(last).unwrap()), Vec3::new(0.0, 3.0, 0.0));
    assert_relative_eq!(
        scene.component::<TransformComponent>(side).unwrap().world_position(),
        Vec3::zeros()
    );

    traverse(&mut scene, root, &mut visitor, TraversalMode::ActiveOnly);
    assert_eq!(visitor.updated_count(), 0);
    assert!(visitor.is_balanced());
}

#[test]
fn test_bodies_follow_their_entities() {
    let mut scene = EntityScene::default();
    scene.initialize_quadtree(Rect::new(Vec2::new(-500.0, -500.0), Vec2::new(500.0, 500.0)));
    scene.initialize_octree(AABB::cube(Vec3::zeros(), 500.0));
    scene.add_system(Box::new(TransformSystem::new()));
    scene.add_system(Box::new(OctreeSystem::new()));

    let rock = scene.create_entity("rock");
    scene
        .add_component(rock, TransformComponent::from_position(Vec3::new(50.0, 0.0, 0.0)))
        .unwrap();
    scene.add_component(rock, Body2DComponent::new(2.0)).unwrap();
    scene
        .add_component(rock, SphereComponent::new(Sphere::new(Vec3::zeros(), 2.0)))
        .unwrap();
    scene.update(&SimulationTime::default());

    let mut hits = Vec::new();
    scene
        .octree()
        .unwrap()
        .query(&VolumeFilter::Sphere(Sphere::new(Vec3::new(50.0, 0.0, 0.0), 1.0)), &mut hits);
    assert_eq!(hits, vec![rock]);
    assert!(scene.quadtree().unwrap().contains(rock));

    scene.set_active(rock, false).unwrap();
    assert!(!scene.quadtree().unwrap().contains(rock));
    assert!(!scene.octree().unwrap().contains(rock));
}

#[test]
fn test_exported_items_follow_scene() {
    let mut scene = EntityScene::default();
    let ship = scene.create_entity("ship");
    scene
        .add_component(ship, TransformComponent::from_position(Vec3::new(4.0, 0.0, -1.0)))
        .unwrap();
    let turret = scene.create_entity("turret");
    scene.set_parent(turret, ship).unwrap();

    let copy = scene.duplicate(ship).unwrap();

    let item = ItemExportVisitor::export(&scene, scene.root()).unwrap();
    assert_eq!(item.children.len(), 2);
    assert!(item.resolve(&"ship/turret".into()).is_some());

    // Name lookups find the original first, the copy follows it
    let escort = &item.children[1];
    assert_eq!(escort.get("id"), Some(&ItemValue::Int(copy.0 as i64)));
    assert_eq!(escort.get("position"), Some(&ItemValue::Vector(vec![4.0, 0.0, -1.0])));
    assert!(escort.resolve(&"turret".into()).is_some());
    assert_eq!(item.count(), 5);
}
