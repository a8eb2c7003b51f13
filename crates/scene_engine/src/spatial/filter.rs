//! Query filters and the reusable query context

use super::bounds::{Circle, Frustum, Plane, Rect, Sphere, AABB};
use super::region::Region;
use super::tree::SpatialTree;
use crate::foundation::collections::RegionKey;
use std::fmt;
use std::hash::Hash;

/// Shape a spatial tree can be queried with
pub trait Filter<R: Region> {
    /// Whether any part of the region may touch the filter
    fn intersects_region(&self, region: &R) -> bool;

    /// Whether the object volume touches the filter
    fn intersects_volume(&self, volume: &R::Volume) -> bool;
}

/// Filters for the octree
#[derive(Debug, Clone, PartialEq)]
pub enum VolumeFilter {
    /// Objects touching a sphere
    Sphere(Sphere),
    /// Objects touching a box
    Box(AABB),
    /// Objects at least partially in front of a plane
    Plane(Plane),
    /// Objects at least partially inside a view frustum
    Frustum(Frustum),
}

impl Filter<AABB> for VolumeFilter {
    fn intersects_region(&self, region: &AABB) -> bool {
        match self {
            Self::Sphere(sphere) => region.intersects_sphere(sphere),
            Self::Box(aabb) => region.intersects(aabb),
            Self::Plane(plane) => plane.aabb_in_front(region),
            Self::Frustum(frustum) => frustum.intersects_aabb(region),
        }
    }

    fn intersects_volume(&self, volume: &Sphere) -> bool {
        match self {
            Self::Sphere(sphere) => sphere.intersects(volume),
            Self::Box(aabb) => aabb.intersects_sphere(volume),
            Self::Plane(plane) => plane.sphere_in_front(volume),
            Self::Frustum(frustum) => frustum.intersects_sphere(volume),
        }
    }
}

/// Filters for the quadtree
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AreaFilter {
    /// Objects touching a circle
    Circle(Circle),
    /// Objects touching a rectangle
    Rect(Rect),
}

impl Filter<Rect> for AreaFilter {
    fn intersects_region(&self, region: &Rect) -> bool {
        match self {
            Self::Circle(circle) => region.intersects_circle(circle),
            Self::Rect(rect) => region.intersects(rect),
        }
    }

    fn intersects_volume(&self, volume: &Circle) -> bool {
        match self {
            Self::Circle(circle) => circle.intersects(volume),
            Self::Rect(rect) => rect.intersects_circle(volume),
        }
    }
}

/// Reusable query context
///
/// Meant to live as long as the system that queries every frame:
///
/// 1. [`reset_filter`](Self::reset_filter)
/// 2. [`add_filter`](Self::add_filter) one or more times, filters are AND-combined
/// 3. [`filter`](Self::filter) against a tree
/// 4. read [`result`](Self::result)
///
/// The filter list, the result list and the traversal stack keep their
/// capacity between runs.
#[derive(Debug)]
pub struct SpatialFilter<F, K> {
    filters: Vec<F>,
    result: Vec<K>,
    stack: Vec<RegionKey>,
}

impl<F, K> Default for SpatialFilter<F, K> {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            result: Vec::new(),
            stack: Vec::new(),
        }
    }
}

impl<F, K> SpatialFilter<F, K> {
    /// Create an empty query context
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all filters and the last result
    pub fn reset_filter(&mut self) {
        self.filters.clear();
        self.result.clear();
    }

    /// Add a filter, objects must pass every filter added since the last reset
    pub fn add_filter(&mut self, filter: F) {
        self.filters.push(filter);
    }

    /// Objects found by the last [`filter`](Self::filter) run
    pub fn result(&self) -> &[K] {
        &self.result
    }

    /// Run the filters against `tree`, replacing the previous result
    ///
    /// Without any filter every object of the tree is returned.
    pub fn filter<R>(&mut self, tree: &SpatialTree<R, K>) -> &[K]
    where
        R: Region,
        F: Filter<R>,
        K: Copy + Eq + Hash + fmt::Debug,
    {
        self.result.clear();
        tree.query_with(&self.filters, &mut self.stack, &mut self.result);
        &self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Mat4, Vec2, Vec3};
    use crate::spatial::{Octree, Quadtree, SpatialIndexConfig};

    fn populated_octree() -> Octree<u32> {
        let mut tree = Octree::new(AABB::cube(Vec3::zeros(), 100.0), SpatialIndexConfig::default().with_split_threshold(2).with_merge_threshold(1));
        for key in 0..10u8 {
            let x = f32::from(key) * 10.0 - 45.0;
            tree.insert(u32::from(key), Sphere::new(Vec3::new(x, 0.0, 0.0), 1.0)).unwrap();
        }
        tree
    }

    #[test]
    fn test_filters_are_and_combined() {
        let tree = populated_octree();
        let mut filter = SpatialFilter::new();

        filter.reset_filter();
        filter.add_filter(VolumeFilter::Plane(Plane::new(Vec3::new(1.0, 0.0, 0.0), 0.0)));
        filter.add_filter(VolumeFilter::Sphere(Sphere::new(Vec3::new(20.0, 0.0, 0.0), 6.0)));
        let mut result = filter.filter(&tree).to_vec();
        result.sort_unstable();

        // x = 15 and x = 25
        assert_eq!(result, vec![6, 7]);
    }

    #[test]
    fn test_reset_clears_previous_run() {
        let tree = populated_octree();
        let mut filter = SpatialFilter::new();

        filter.add_filter(VolumeFilter::Box(AABB::cube(Vec3::new(-45.0, 0.0, 0.0), 1.0)));
        assert_eq!(filter.filter(&tree), &[0]);

        filter.reset_filter();
        assert!(filter.result().is_empty());
        assert_eq!(filter.filter(&tree).len(), 10);
    }

    #[test]
    fn test_frustum_filter() {
        let tree = populated_octree();
        // Looking down +X from the origin
        let view = Mat4::look_at_rh(
            &Vec3::zeros().into(),
            &Vec3::new(1.0, 0.0, 0.0).into(),
            &Vec3::y(),
        );
        let projection = Mat4::new_perspective(1.0, 0.5, 0.1, 30.0);
        let frustum = Frustum::from_matrix(&(projection * view));

        let mut filter = SpatialFilter::new();
        filter.add_filter(VolumeFilter::Frustum(frustum));
        let mut result = filter.filter(&tree).to_vec();
        result.sort_unstable();

        // x = 5, 15, 25
        assert_eq!(result, vec![5, 6, 7]);
    }

    #[test]
    fn test_area_filters() {
        let mut tree: Quadtree<u32> = Quadtree::new(Rect::from_position_size(-50.0, -50.0, 100.0, 100.0), SpatialIndexConfig::default());
        tree.insert(1, Circle::new(Vec2::new(0.0, 0.0), 1.0)).unwrap();
        tree.insert(2, Circle::new(Vec2::new(10.0, 0.0), 1.0)).unwrap();

        let mut filter = SpatialFilter::new();
        filter.add_filter(AreaFilter::Circle(Circle::new(Vec2::new(5.0, 0.0), 4.0)));
        assert_eq!(filter.filter(&tree), &[1, 2]);

        filter.reset_filter();
        filter.add_filter(AreaFilter::Rect(Rect::from_position_size(8.0, -1.0, 4.0, 2.0)));
        assert_eq!(filter.filter(&tree), &[2]);
    }
}
