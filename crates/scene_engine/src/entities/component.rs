//! Component trait, lifecycle and type registry
//!
//! ```text
//!   add (entity enabled)            add (entity disabled)
//!          |                                 |
//!          v                                 v
//!      Unloaded  <------------------>  UnloadedInactive
//!          |     \                  /        |
//!          |      +--> LoadFailed <+         |
//!          v                                 v
//!       Active   <------------------>    Inactive
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::ops::BitOr;

use super::entity::EntityId;
use super::EntityError;
use crate::foundation::math::Mat4;
use crate::spatial::{Octree, Quadtree};

/// Outcome of [`Component::on_load`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadResult {
    /// Ready for use
    Loaded,
    /// Not ready yet, try again next frame
    Retry,
    /// Will never load
    Failed,
}

/// Lifecycle state of an attached component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
    /// Waiting to be loaded on an enabled entity
    Unloaded,
    /// Waiting to be loaded on a disabled entity
    UnloadedInactive,
    /// Loading failed permanently
    LoadFailed,
    /// Loaded on a disabled entity
    Inactive,
    /// Loaded on an enabled entity
    Active,
}

impl ComponentState {
    /// Whether the component finished loading
    pub fn is_loaded(self) -> bool {
        matches!(self, Self::Active | Self::Inactive)
    }

    /// Whether the component still waits for its load
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Unloaded | Self::UnloadedInactive)
    }
}

/// Scene resources a component may touch in its lifecycle callbacks
pub struct ComponentContext<'a> {
    /// Entity the component is attached to
    pub entity: EntityId,
    /// World matrix of the entity from the last transform pass
    pub world: Mat4,
    pub(crate) quadtree: Option<&'a mut Quadtree<EntityId>>,
    pub(crate) octree: Option<&'a mut Octree<EntityId>>,
}

impl ComponentContext<'_> {
    /// Scene quadtree, if initialized
    pub fn quadtree(&mut self) -> Option<&mut Quadtree<EntityId>> {
        self.quadtree.as_deref_mut()
    }

    /// Scene octree, if initialized
    pub fn octree(&mut self) -> Option<&mut Octree<EntityId>> {
        self.octree.as_deref_mut()
    }
}

/// Downcasting support for components, implemented for every `'static` type
pub trait AsAny {
    /// As `&dyn Any`
    fn as_any(&self) -> &dyn Any;
    /// As `&mut dyn Any`
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Data attached to an entity
///
/// All callbacks have empty defaults except [`Component::duplicate`].
pub trait Component: AsAny + Send + Sync + 'static {
    /// Load resources the component needs
    fn on_load(&mut self, _ctx: &mut ComponentContext<'_>) -> LoadResult {
        LoadResult::Loaded
    }

    /// The entity got enabled, or the component finished loading on an
    /// enabled entity
    fn on_activate(&mut self, _ctx: &mut ComponentContext<'_>) {}

    /// The entity got disabled, or an active component is about to be removed
    fn on_deactivate(&mut self, _ctx: &mut ComponentContext<'_>) {}

    /// A loaded component is about to be removed
    fn on_unload(&mut self, _ctx: &mut ComponentContext<'_>) {}

    /// Unloaded copy of this component
    fn duplicate(&self) -> Box<dyn Component>;

    /// Short type name
    fn type_name(&self) -> &'static str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }
}

/// Bit set over registered component types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ComponentMask(u64);

impl ComponentMask {
    /// No components
    pub const EMPTY: Self = Self(0);

    /// Mask with the single bit `bit`
    pub fn bit(bit: usize) -> Self {
        Self(1 << bit)
    }

    /// Whether every bit of `other` is set in `self`
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no bit is set
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Raw bits
    pub fn bits(self) -> u64 {
        self.0
    }
}

impl BitOr for ComponentMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone)]
struct ComponentTypeInfo {
    mask: ComponentMask,
    name: &'static str,
}

/// Assigns each component type its mask bit
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    types: HashMap<TypeId, ComponentTypeInfo>,
}

impl ComponentRegistry {
    /// Maximum number of component types
    pub const MAX_TYPES: usize = 64;

    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Mask bit of `T`, registering the type on first use
    pub fn register<T: Component>(&mut self) -> Result<ComponentMask, EntityError> {
        let full = std::any::type_name::<T>();
        self.register_id(TypeId::of::<T>(), full.rsplit("::").next().unwrap_or(full))
    }

    /// Mask bit of a type-erased component
    pub(crate) fn register_dyn(&mut self, component: &dyn Component) -> Result<ComponentMask, EntityError> {
        self.register_id(component.as_any().type_id(), component.type_name())
    }

    fn register_id(&mut self, type_id: TypeId, name: &'static str) -> Result<ComponentMask, EntityError> {
        if let Some(info) = self.types.get(&type_id) {
            return Ok(info.mask);
        }

        let bit = self.types.len();
        if bit >= Self::MAX_TYPES {
            return Err(EntityError::TooManyComponentTypes(Self::MAX_TYPES));
        }

        let mask = ComponentMask::bit(bit);
        self.types.insert(type_id, ComponentTypeInfo { mask, name });
        log::debug!("Registered component type {name} as bit {bit}");
        Ok(mask)
    }

    /// Mask bit of `T` if it was registered
    pub fn mask_of<T: Component>(&self) -> Option<ComponentMask> {
        self.types.get(&TypeId::of::<T>()).map(|info| info.mask)
    }

    /// Registered name of `T`
    pub fn name_of<T: Component>(&self) -> Option<&'static str> {
        self.types.get(&TypeId::of::<T>()).map(|info| info.name)
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether no type is registered
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Tuple of component types forming a view signature
pub trait ComponentSet {
    /// Combined mask, registering the types on first use
    fn mask(registry: &mut ComponentRegistry) -> Result<ComponentMask, EntityError>;
}

macro_rules! impl_component_set {
    ($($name:ident),+) => {
        impl<$($name: Component),+> ComponentSet for ($($name,)+) {
            fn mask(registry: &mut ComponentRegistry) -> Result<ComponentMask, EntityError> {
                Ok(ComponentMask::EMPTY $(| registry.register::<$name>()?)+)
            }
        }
    };
}

impl_component_set!(A);
impl_component_set!(A, B);
impl_component_set!(A, B, C);
impl_component_set!(A, B, C, D);
