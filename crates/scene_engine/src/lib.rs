//! # Scene Engine
//!
//! Scene management core of a modular game engine.
//!
//! ## Features
//!
//! - **Scene Graph**: Typed nodes with hierarchical transforms, LOD switching and deferred data loading
//! - **Spatial Index**: Generic octree and quadtree with filter driven queries
//! - **Traversal**: One depth-first walker shared by every tree, driven by visitors
//! - **Entity Scene**: Entity-component hierarchy with views and staged systems
//! - **Item Tree**: Key/value mirror of scene state for tools
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scene_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut scene = Scene::new(SceneConfig::new("level"))?;
//!     let ship = scene.create_node("ship", NodeType::Transform);
//!     scene.add_child(scene.root(), ship)?;
//!     scene.set_transform(ship, Transform::from_position(Vec3::new(0.0, 0.0, 5.0)))?;
//!     scene.handle();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod entities;
pub mod foundation;
pub mod item;
pub mod scene;
pub mod spatial;
pub mod traversal;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        config::{Config, ConfigError, EntitySceneConfig, SceneConfig},
        entities::{
            Component, ComponentContext, EntityError, EntityId, EntityScene, LoadResult, System, SystemStage,
            TransformComponent,
        },
        foundation::{
            math::{Mat4, Quat, Transform, Vec2, Vec3},
            time::SimulationTime,
        },
        item::{Item, ItemPath, ItemValue},
        scene::{NodeId, NodeType, Scene, SceneError},
        spatial::{Filter, Octree, Quadtree, Rect, Sphere, AABB},
        traversal::{traverse, Hierarchy, TraversalMode, TreeVisitor},
    };
}
