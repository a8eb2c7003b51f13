//! Spatial partitioning
//!
//! Bounded-volume indices over movable objects. The octree tracks bounding
//! spheres in 3D, the quadtree tracks bounding circles in 2D. Both are the
//! same [`SpatialTree`] parametrized by region type.

pub mod bounds;
pub mod filter;
pub mod region;
pub mod tree;

pub use bounds::{Circle, Frustum, Plane, Rect, Sphere, AABB};
pub use filter::{AreaFilter, Filter, SpatialFilter, VolumeFilter};
pub use region::Region;
pub use tree::{SpatialError, SpatialIndexConfig, SpatialTree};

/// 3D index over bounding spheres, splitting into 8 octants
pub type Octree<K> = SpatialTree<AABB, K>;

/// 2D index over bounding circles, splitting into 4 quadrants
pub type Quadtree<K> = SpatialTree<Rect, K>;

/// Reusable query context for octrees
pub type OctreeFilter<K> = SpatialFilter<VolumeFilter, K>;

/// Reusable query context for quadtrees
pub type QuadtreeFilter<K> = SpatialFilter<AreaFilter, K>;
