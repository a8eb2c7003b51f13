//! Built-in systems

use super::components::{
    BehaviourComponent, Body2DComponent, LightComponent, LightKind, SphereComponent, TransformComponent,
};
use super::entity::EntityId;
use super::scene::EntityScene;
use super::system::{LightParams, System, SystemStage};
use super::view::ViewId;
use crate::foundation::math::{translation_of, Vec2, Vec3};
use crate::foundation::time::SimulationTime;
use crate::spatial::Circle;
use crate::traversal::{traverse, TransformUpdateVisitor, TraversalMode};

fn active_in(scene: &EntityScene, view: Option<ViewId>) -> Vec<EntityId> {
    view.and_then(|view| scene.view(view))
        .map(|view| view.active().to_vec())
        .unwrap_or_default()
}

/// Runs the scripts of every enabled [`BehaviourComponent`]
#[derive(Debug, Default)]
pub struct BehaviourSystem {
    view: Option<ViewId>,
}

impl BehaviourSystem {
    /// Create the system
    pub fn new() -> Self {
        Self::default()
    }
}

impl System for BehaviourSystem {
    fn name(&self) -> &str {
        "BehaviourSystem"
    }

    fn stage(&self) -> SystemStage {
        SystemStage::Update
    }

    fn init(&mut self, scene: &mut EntityScene) {
        self.view = scene.create_view::<(BehaviourComponent,)>().ok();
    }

    fn update(&mut self, scene: &mut EntityScene, time: &SimulationTime) {
        for id in active_in(scene, self.view) {
            let Some(scripts) = scene.component::<BehaviourComponent>(id).map(BehaviourComponent::scripts) else {
                continue;
            };
            for script in scripts {
                script(scene, id, time);
            }
        }
    }
}

/// Propagates dirty transforms down the entity hierarchy
#[derive(Debug, Default)]
pub struct TransformSystem {
    visitor: TransformUpdateVisitor<EntityId>,
}

impl TransformSystem {
    /// Create the system
    pub fn new() -> Self {
        Self::default()
    }

    /// Entities entered by the last pass
    pub fn visited_count(&self) -> usize {
        self.visitor.visited_count()
    }
}

impl System for TransformSystem {
    fn name(&self) -> &str {
        "TransformSystem"
    }

    fn stage(&self) -> SystemStage {
        SystemStage::Update
    }

    fn update(&mut self, scene: &mut EntityScene, _time: &SimulationTime) {
        let root = scene.root();
        traverse(scene, root, &mut self.visitor, TraversalMode::ActiveOnly);
        log::trace!(
            "Transform pass visited {} entities, updated {}",
            self.visitor.visited_count(),
            self.visitor.updated_count()
        );
    }
}

/// Keeps the quadtree circles of 2D bodies at their entity positions
#[derive(Debug, Default)]
pub struct QuadtreeSystem {
    view: Option<ViewId>,
}

impl QuadtreeSystem {
    /// Create the system
    pub fn new() -> Self {
        Self::default()
    }
}

impl System for QuadtreeSystem {
    fn name(&self) -> &str {
        "QuadtreeSystem"
    }

    fn stage(&self) -> SystemStage {
        SystemStage::PreRender
    }

    fn init(&mut self, scene: &mut EntityScene) {
        self.view = scene.create_view::<(TransformComponent, Body2DComponent)>().ok();
    }

    fn update(&mut self, scene: &mut EntityScene, _time: &SimulationTime) {
        if scene.quadtree().is_none() {
            return;
        }

        for id in active_in(scene, self.view) {
            let Some(position) = scene.component::<TransformComponent>(id).map(TransformComponent::world_position) else {
                continue;
            };
            let Some(body) = scene.component_mut::<Body2DComponent>(id) else {
                continue;
            };
            let circle = Circle::new(Vec2::new(position.x, position.y), body.radius);
            if circle == body.circle {
                continue;
            }
            body.circle = circle;

            if let Some(quadtree) = scene.quadtree_mut() {
                let _ = if quadtree.contains(id) {
                    quadtree.update(id, circle)
                } else {
                    quadtree.insert(id, circle)
                };
            }
        }
    }
}

/// Keeps the octree spheres of bounded entities at their world transforms
#[derive(Debug, Default)]
pub struct OctreeSystem {
    view: Option<ViewId>,
}

impl OctreeSystem {
    /// Create the system
    pub fn new() -> Self {
        Self::default()
    }
}

impl System for OctreeSystem {
    fn name(&self) -> &str {
        "OctreeSystem"
    }

    fn stage(&self) -> SystemStage {
        SystemStage::PreRender
    }

    fn init(&mut self, scene: &mut EntityScene) {
        self.view = scene.create_view::<(TransformComponent, SphereComponent)>().ok();
    }

    fn update(&mut self, scene: &mut EntityScene, _time: &SimulationTime) {
        if scene.octree().is_none() {
            return;
        }

        for id in active_in(scene, self.view) {
            let Some(world) = scene.component::<TransformComponent>(id).map(TransformComponent::world_matrix) else {
                continue;
            };
            let Some(component) = scene.component_mut::<SphereComponent>(id) else {
                continue;
            };
            let sphere = component.local.transformed(&world);
            if sphere == component.world {
                continue;
            }
            component.world = sphere;

            if let Some(octree) = scene.octree_mut() {
                let _ = if octree.contains(id) {
                    octree.update(id, sphere)
                } else {
                    octree.insert(id, sphere)
                };
            }
        }
    }
}

/// Hands the first enabled light to the render sink
#[derive(Debug, Default)]
pub struct LightSystem {
    view: Option<ViewId>,
}

impl LightSystem {
    /// Create the system
    pub fn new() -> Self {
        Self::default()
    }
}

impl System for LightSystem {
    fn name(&self) -> &str {
        "LightSystem"
    }

    fn stage(&self) -> SystemStage {
        SystemStage::Render
    }

    fn init(&mut self, scene: &mut EntityScene) {
        self.view = scene.create_view::<(TransformComponent, LightComponent)>().ok();
    }

    fn update(&mut self, scene: &mut EntityScene, _time: &SimulationTime) {
        let light = active_in(scene, self.view).into_iter().find_map(|id| {
            let world = scene.component::<TransformComponent>(id)?.world_matrix();
            let light = scene.component::<LightComponent>(id)?;
            Some(LightParams {
                position: translation_of(&world),
                direction: world.transform_vector(&Vec3::new(0.0, 0.0, -1.0)).normalize(),
                color: light.color,
                intensity: light.intensity,
                directional: light.kind == LightKind::Directional,
            })
        });

        let Some(sink) = scene.render_sink_mut() else {
            return;
        };
        match light {
            Some(light) => sink.set_light(&light),
            None => sink.clear_light(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{RenderSink, Component};
    use crate::spatial::{Rect, Sphere, AABB};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RecordingSink {
        lights: Arc<Mutex<Vec<Option<LightParams>>>>,
    }

    impl RenderSink for RecordingSink {
        fn set_light(&mut self, light: &LightParams) {
            self.lights.lock().unwrap().push(Some(*light));
        }

        fn clear_light(&mut self) {
            self.lights.lock().unwrap().push(None);
        }
    }

    fn frame(scene: &mut EntityScene) {
        scene.update(&SimulationTime::default());
    }

    #[test]
    fn test_behaviours_run_for_enabled_entities() {
        let mut scene = EntityScene::default();
        scene.add_system(Box::new(BehaviourSystem::new()));
        scene.add_system(Box::new(TransformSystem::new()));

        let mover = scene.create_entity("mover");
        scene.add_component(mover, TransformComponent::default()).unwrap();
        scene
            .add_component(
                mover,
                BehaviourComponent::with("drift", |scene, id, _time| {
                    let _ = scene.modify_transform(id, |t| t.position.x += 1.0);
                }),
            )
            .unwrap();

        frame(&mut scene);
        frame(&mut scene);
        let position = scene.component::<TransformComponent>(mover).unwrap().world_position();
        assert!((position.x - 2.0).abs() < 1e-5);

        scene.set_active(mover, false).unwrap();
        frame(&mut scene);
        assert!((scene.component::<TransformComponent>(mover).unwrap().local.position.x - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_quadtree_follows_transforms() {
        let mut scene = EntityScene::default();
        scene.initialize_quadtree(Rect::new(Vec2::new(-100.0, -100.0), Vec2::new(100.0, 100.0)));
        scene.add_system(Box::new(TransformSystem::new()));
        scene.add_system(Box::new(QuadtreeSystem::new()));

        let ship = scene.create_entity("ship");
        scene
            .add_component(ship, TransformComponent::from_position(Vec3::new(10.0, 20.0, 0.0)))
            .unwrap();
        scene.add_component(ship, Body2DComponent::new(1.5)).unwrap();
        frame(&mut scene);

        let circle = scene.quadtree().unwrap().get(ship).unwrap();
        assert!((circle.center - Vec2::new(10.0, 20.0)).magnitude() < 1e-5);
        assert!((circle.radius - 1.5).abs() < 1e-6);

        scene.modify_transform(ship, |t| t.position.x = -30.0).unwrap();
        frame(&mut scene);
        let circle = scene.quadtree().unwrap().get(ship).unwrap();
        assert!((circle.center.x + 30.0).abs() < 1e-5);
    }

    #[test]
    fn test_octree_follows_transforms() {
        let mut scene = EntityScene::default();
        scene.initialize_octree(AABB::cube(Vec3::zeros(), 100.0));
        scene.add_system(Box::new(TransformSystem::new()));
        scene.add_system(Box::new(OctreeSystem::new()));

        let rock = scene.create_entity("rock");
        scene
            .add_component(rock, TransformComponent::from_position(Vec3::new(0.0, 0.0, 40.0)))
            .unwrap();
        scene
            .add_component(rock, SphereComponent::new(Sphere::new(Vec3::zeros(), 3.0)))
            .unwrap();
        frame(&mut scene);

        let sphere = scene.octree().unwrap().get(rock).unwrap();
        assert!((sphere.center - Vec3::new(0.0, 0.0, 40.0)).magnitude() < 1e-5);
    }

    #[test]
    fn test_light_system_reports_first_enabled_light() {
        let mut scene = EntityScene::default();
        let sink = RecordingSink::default();
        scene.set_render_sink(Box::new(sink.clone()));
        scene.add_system(Box::new(LightSystem::new()));
        scene.add_system(Box::new(TransformSystem::new()));

        frame(&mut scene);

        let sun = scene.create_entity("sun");
        scene
            .add_component(sun, TransformComponent::from_position(Vec3::new(0.0, 5.0, 0.0)))
            .unwrap();
        scene
            .add_component(sun, LightComponent::directional(Vec3::new(1.0, 0.9, 0.8), 3.0))
            .unwrap();
        frame(&mut scene);

        let lights = sink.lights.lock().unwrap().clone();
        assert_eq!(lights.len(), 2);
        assert!(lights[0].is_none());
        let light = lights[1].unwrap();
        assert!(light.directional);
        assert!((light.position - Vec3::new(0.0, 5.0, 0.0)).magnitude() < 1e-5);
        assert!((light.direction - Vec3::new(0.0, 0.0, -1.0)).magnitude() < 1e-5);
        assert_eq!(LightComponent::directional(Vec3::zeros(), 1.0).type_name(), "LightComponent");
    }
}
