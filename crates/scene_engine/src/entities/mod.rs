//! Entity-component scene
//!
//! Entities form a hierarchy like scene graph nodes but carry no fixed type.
//! Behaviour comes from the components attached to them and from systems
//! that run over views, cached lists of the entities matching a component
//! signature.

pub mod component;
pub mod components;
pub mod copy;
pub mod entity;
pub mod scene;
pub mod system;
pub mod systems;
pub mod view;

pub use component::{
    Component, ComponentContext, ComponentMask, ComponentRegistry, ComponentSet, ComponentState, LoadResult,
};
pub use components::{
    BehaviourComponent, BehaviourFn, Body2DComponent, CameraComponent, LightComponent, LightKind, SphereComponent,
    TransformComponent,
};
pub use copy::{EntityCopyVisitor, EntityPrefab, PrefabEntity};
pub use entity::{Entity, EntityId};
pub use scene::EntityScene;
pub use system::{LightParams, RenderSink, System, SystemStage};
pub use systems::{BehaviourSystem, LightSystem, OctreeSystem, QuadtreeSystem, TransformSystem};
pub use view::{View, ViewId};

/// Entity scene errors
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EntityError {
    /// No entity with this id exists in the scene
    #[error("entity {0} does not exist")]
    UnknownEntity(EntityId),

    /// The operation is not allowed on the root entity
    #[error("operation not allowed on the root entity")]
    RootEntity,

    /// The entity would become its own ancestor
    #[error("parenting {child} under {parent} would create a cycle")]
    Cycle {
        /// Requested parent
        parent: EntityId,
        /// Requested child
        child: EntityId,
    },

    /// The entity already has a component of this type
    #[error("entity {entity} already has a {component}")]
    DuplicateComponent {
        /// Entity that was passed
        entity: EntityId,
        /// Component type name
        component: &'static str,
    },

    /// The entity has no component of this type
    #[error("entity {entity} has no {component}")]
    MissingComponent {
        /// Entity that was passed
        entity: EntityId,
        /// Component type name
        component: &'static str,
    },

    /// Component masks are 64 bits wide
    #[error("more than {0} component types registered")]
    TooManyComponentTypes(usize),

    /// A prefab without entries
    #[error("prefab is empty")]
    EmptyPrefab,

    /// Rejected configuration
    #[error("invalid entity scene configuration: {0}")]
    InvalidConfig(String),
}
