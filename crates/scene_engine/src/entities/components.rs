//! Built-in components

use std::fmt;
use std::sync::Arc;

use super::component::{Component, ComponentContext, LoadResult};
use super::entity::EntityId;
use super::scene::EntityScene;
use crate::foundation::math::{translation_of, Mat4, Transform, Vec2, Vec3};
use crate::foundation::time::SimulationTime;
use crate::spatial::{Circle, Sphere};

/// Local transform and the world matrix computed from it
///
/// Change the local transform through
/// [`EntityScene::modify_transform`] so the entity gets marked dirty.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformComponent {
    /// Transform relative to the parent entity
    pub local: Transform,
    pub(crate) world: Mat4,
}

impl Default for TransformComponent {
    fn default() -> Self {
        Self::new(Transform::identity())
    }
}

impl TransformComponent {
    /// Create from a local transform
    pub fn new(local: Transform) -> Self {
        Self {
            local,
            world: Mat4::identity(),
        }
    }

    /// Create from a local position
    pub fn from_position(position: Vec3) -> Self {
        Self::new(Transform::from_position(position))
    }

    /// World matrix from the last transform pass
    pub fn world_matrix(&self) -> Mat4 {
        self.world
    }

    /// World position from the last transform pass
    pub fn world_position(&self) -> Vec3 {
        translation_of(&self.world)
    }
}

impl Component for TransformComponent {
    fn duplicate(&self) -> Box<dyn Component> {
        Box::new(self.clone())
    }
}

/// 2D body tracked by the scene quadtree
#[derive(Debug, Clone, PartialEq)]
pub struct Body2DComponent {
    /// Radius of the bounding circle
    pub radius: f32,
    /// Circle currently stored in the quadtree, in world space
    pub(crate) circle: Circle,
}

impl Body2DComponent {
    /// Body with a bounding circle of `radius` around the entity
    pub fn new(radius: f32) -> Self {
        Self {
            radius,
            circle: Circle::new(Vec2::zeros(), radius),
        }
    }

    /// Bounding circle as of the last quadtree sync
    pub fn circle(&self) -> Circle {
        self.circle
    }
}

impl Component for Body2DComponent {
    fn on_activate(&mut self, ctx: &mut ComponentContext<'_>) {
        let position = translation_of(&ctx.world);
        self.circle = Circle::new(Vec2::new(position.x, position.y), self.radius);
        let entity = ctx.entity;
        if let Some(quadtree) = ctx.quadtree() {
            // Logged by the quadtree
            let _ = quadtree.insert(entity, self.circle);
        }
    }

    fn on_deactivate(&mut self, ctx: &mut ComponentContext<'_>) {
        let entity = ctx.entity;
        if let Some(quadtree) = ctx.quadtree() {
            if quadtree.contains(entity) {
                let _ = quadtree.remove(entity);
            }
        }
    }

    fn duplicate(&self) -> Box<dyn Component> {
        Box::new(Self::new(self.radius))
    }
}

/// Bounding sphere tracked by the scene octree
#[derive(Debug, Clone, PartialEq)]
pub struct SphereComponent {
    /// Sphere in entity space
    pub local: Sphere,
    pub(crate) world: Sphere,
}

impl SphereComponent {
    /// Component for a sphere in entity space
    pub fn new(local: Sphere) -> Self {
        Self { local, world: local }
    }

    /// Sphere as of the last octree sync
    pub fn world_sphere(&self) -> Sphere {
        self.world
    }
}

impl Component for SphereComponent {
    fn on_activate(&mut self, ctx: &mut ComponentContext<'_>) {
        self.world = self.local.transformed(&ctx.world);
        let entity = ctx.entity;
        if let Some(octree) = ctx.octree() {
            let _ = octree.insert(entity, self.world);
        }
    }

    fn on_deactivate(&mut self, ctx: &mut ComponentContext<'_>) {
        let entity = ctx.entity;
        if let Some(octree) = ctx.octree() {
            if octree.contains(entity) {
                let _ = octree.remove(entity);
            }
        }
    }

    fn duplicate(&self) -> Box<dyn Component> {
        Box::new(Self::new(self.local))
    }
}

/// Light types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightKind {
    /// Parallel rays along the entity's -Z axis
    Directional,
    /// Radiates from the entity's position
    Point,
}

/// Light source
#[derive(Debug, Clone, PartialEq)]
pub struct LightComponent {
    /// Light type
    pub kind: LightKind,
    /// RGB color in 0..1
    pub color: Vec3,
    /// Intensity multiplier
    pub intensity: f32,
}

impl LightComponent {
    /// Directional light
    pub fn directional(color: Vec3, intensity: f32) -> Self {
        Self {
            kind: LightKind::Directional,
            color,
            intensity,
        }
    }

    /// Point light
    pub fn point(color: Vec3, intensity: f32) -> Self {
        Self {
            kind: LightKind::Point,
            color,
            intensity,
        }
    }
}

impl Component for LightComponent {
    fn duplicate(&self) -> Box<dyn Component> {
        Box::new(self.clone())
    }
}

/// Perspective camera looking down the entity's -Z axis
#[derive(Debug, Clone, PartialEq)]
pub struct CameraComponent {
    /// Vertical field of view in radians
    pub fov: f32,
    /// Near clip distance
    pub near: f32,
    /// Far clip distance
    pub far: f32,
}

impl Default for CameraComponent {
    fn default() -> Self {
        Self {
            fov: std::f32::consts::FRAC_PI_4,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl CameraComponent {
    /// Projection matrix for the given aspect ratio
    pub fn projection(&self, aspect: f32) -> Mat4 {
        Mat4::new_perspective(aspect, self.fov, self.near, self.far)
    }
}

impl Component for CameraComponent {
    fn on_load(&mut self, _ctx: &mut ComponentContext<'_>) -> LoadResult {
        if self.near > 0.0 && self.far > self.near && self.fov > 0.0 {
            LoadResult::Loaded
        } else {
            log::error!("Camera with near {} far {} fov {} is unusable", self.near, self.far, self.fov);
            LoadResult::Failed
        }
    }

    fn duplicate(&self) -> Box<dyn Component> {
        Box::new(self.clone())
    }
}

/// Script run once per frame for its entity
pub type BehaviourFn = Arc<dyn Fn(&mut EntityScene, EntityId, &SimulationTime) + Send + Sync>;

/// Scripted behaviours attached to an entity
#[derive(Clone, Default)]
pub struct BehaviourComponent {
    behaviours: Vec<(String, BehaviourFn)>,
}

impl fmt::Debug for BehaviourComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.behaviours.iter().map(|(name, _)| name))
            .finish()
    }
}

impl BehaviourComponent {
    /// Component without behaviours
    pub fn new() -> Self {
        Self::default()
    }

    /// Component with a single behaviour
    pub fn with(
        name: impl Into<String>,
        behaviour: impl Fn(&mut EntityScene, EntityId, &SimulationTime) + Send + Sync + 'static,
    ) -> Self {
        let mut component = Self::new();
        component.add(name, behaviour);
        component
    }

    /// Add a named behaviour
    pub fn add(
        &mut self,
        name: impl Into<String>,
        behaviour: impl Fn(&mut EntityScene, EntityId, &SimulationTime) + Send + Sync + 'static,
    ) {
        self.behaviours.push((name.into(), Arc::new(behaviour)));
    }

    /// Remove every behaviour called `name`
    pub fn remove(&mut self, name: &str) {
        self.behaviours.retain(|(existing, _)| existing != name);
    }

    /// Number of behaviours
    pub fn len(&self) -> usize {
        self.behaviours.len()
    }

    /// Whether there are no behaviours
    pub fn is_empty(&self) -> bool {
        self.behaviours.is_empty()
    }

    pub(crate) fn scripts(&self) -> Vec<BehaviourFn> {
        self.behaviours.iter().map(|(_, f)| Arc::clone(f)).collect()
    }
}

impl Component for BehaviourComponent {
    fn duplicate(&self) -> Box<dyn Component> {
        Box::new(self.clone())
    }
}
