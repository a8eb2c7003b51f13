//! Systems and the renderer interface

use super::scene::EntityScene;
use crate::foundation::math::Vec3;
use crate::foundation::time::SimulationTime;

/// Frame stage a system runs in, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SystemStage {
    /// Game logic and transform propagation
    Update = 0,
    /// Spatial index maintenance
    PreRender = 1,
    /// Hand data to the renderer
    Render = 2,
}

impl SystemStage {
    /// All stages in execution order
    pub const ALL: [SystemStage; 3] = [Self::Update, Self::PreRender, Self::Render];
}

/// Logic run every frame over the entities of one view
pub trait System: Send {
    /// Name for logging
    fn name(&self) -> &str;

    /// Stage the system runs in
    fn stage(&self) -> SystemStage;

    /// Called once when the system is added, typically to create its view
    fn init(&mut self, _scene: &mut EntityScene) {}

    /// Run one frame
    fn update(&mut self, scene: &mut EntityScene, time: &SimulationTime);
}

/// Light parameters pushed to the renderer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightParams {
    /// World position
    pub position: Vec3,
    /// World direction the light points at
    pub direction: Vec3,
    /// Light color
    pub color: Vec3,
    /// Intensity multiplier
    pub intensity: f32,
    /// Whether the light is directional rather than a point light
    pub directional: bool,
}

/// Narrow interface of the renderer the render stage talks to
pub trait RenderSink: Send {
    /// Set the light used for the next frame
    fn set_light(&mut self, light: &LightParams);

    /// No light is active this frame
    fn clear_light(&mut self) {}
}
