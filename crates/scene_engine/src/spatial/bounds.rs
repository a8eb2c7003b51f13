//! Bounding volumes and intersection tests
//!
//! All tests are closed: touching volumes intersect, and a volume lying
//! exactly on a region boundary is contained. Insert, update and query use
//! the very same predicates so an object never ends up in a region the query
//! would not look at.

use crate::foundation::math::{max_scale_of, Mat4, Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Axis-Aligned Bounding Box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AABB {
    /// Minimum corner of the bounding box
    pub min: Vec3,
    /// Maximum corner of the bounding box
    pub max: Vec3,
}

impl AABB {
    /// Create a new AABB from min and max points
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create an AABB centered at a point with given extents
    pub fn from_center_extents(center: Vec3, extents: Vec3) -> Self {
        Self {
            min: center - extents,
            max: center + extents,
        }
    }

    /// Cube centered at `center` with the given half edge length
    pub fn cube(center: Vec3, half_edge: f32) -> Self {
        Self::from_center_extents(center, Vec3::new(half_edge, half_edge, half_edge))
    }

    /// Get the center of the AABB
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the extents (half-size) of the AABB
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Check if this AABB contains a point
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.x >= self.min.x && point.x <= self.max.x &&
        point.y >= self.min.y && point.y <= self.max.y &&
        point.z >= self.min.z && point.z <= self.max.z
    }

    /// Check if the sphere lies completely inside this AABB
    pub fn contains_sphere(&self, sphere: &Sphere) -> bool {
        let r = sphere.radius;
        let c = sphere.center;
        c.x - r >= self.min.x && c.x + r <= self.max.x &&
        c.y - r >= self.min.y && c.y + r <= self.max.y &&
        c.z - r >= self.min.z && c.z + r <= self.max.z
    }

    /// Check if this AABB intersects another AABB
    pub fn intersects(&self, other: &AABB) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x &&
        self.min.y <= other.max.y && self.max.y >= other.min.y &&
        self.min.z <= other.max.z && self.max.z >= other.min.z
    }

    /// Check if the sphere touches this AABB
    pub fn intersects_sphere(&self, sphere: &Sphere) -> bool {
        let closest_point = Vec3::new(
            sphere.center.x.clamp(self.min.x, self.max.x),
            sphere.center.y.clamp(self.min.y, self.max.y),
            sphere.center.z.clamp(self.min.z, self.max.z),
        );

        (closest_point - sphere.center).magnitude_squared() <= sphere.radius * sphere.radius
    }
}

/// Bounding sphere, the object volume of the octree
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sphere {
    /// Center of the sphere
    pub center: Vec3,
    /// Radius of the sphere
    pub radius: f32,
}

impl Sphere {
    /// Create a sphere
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Check if two spheres touch or overlap
    pub fn intersects(&self, other: &Sphere) -> bool {
        let combined = self.radius + other.radius;
        (self.center - other.center).magnitude_squared() <= combined * combined
    }

    /// Check if `other` lies completely inside this sphere
    pub fn contains(&self, other: &Sphere) -> bool {
        (self.center - other.center).magnitude() + other.radius <= self.radius
    }

    /// Smallest sphere enclosing both spheres
    pub fn merge(&self, other: &Sphere) -> Sphere {
        if self.contains(other) {
            return *self;
        }
        if other.contains(self) {
            return *other;
        }

        let offset = other.center - self.center;
        let distance = offset.magnitude();
        let radius = (distance + self.radius + other.radius) * 0.5;
        let center = self.center + offset * ((radius - self.radius) / distance);
        Sphere::new(center, radius)
    }

    /// Sphere moved into the space described by `matrix`
    ///
    /// The radius grows with the largest axis scale so the result still
    /// encloses the transformed volume.
    pub fn transformed(&self, matrix: &Mat4) -> Sphere {
        let center = matrix.transform_point(&self.center.into()).coords;
        Sphere::new(center, self.radius * max_scale_of(matrix))
    }
}

/// Axis aligned rectangle, the region type of the quadtree
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    /// Minimum corner
    pub min: Vec2,
    /// Maximum corner
    pub max: Vec2,
}

impl Rect {
    /// Create a rectangle from its corners
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    /// Create a rectangle from its top left position and size
    pub fn from_position_size(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::new(Vec2::new(x, y), Vec2::new(x + width, y + height))
    }

    /// Center of the rectangle
    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    /// Half size of the rectangle
    pub fn extents(&self) -> Vec2 {
        (self.max - self.min) * 0.5
    }

    /// Check if the point lies inside
    pub fn contains_point(&self, point: Vec2) -> bool {
        point.x >= self.min.x && point.x <= self.max.x &&
        point.y >= self.min.y && point.y <= self.max.y
    }

    /// Check if the circle lies completely inside
    pub fn contains_circle(&self, circle: &Circle) -> bool {
        let r = circle.radius;
        let c = circle.center;
        c.x - r >= self.min.x && c.x + r <= self.max.x &&
        c.y - r >= self.min.y && c.y + r <= self.max.y
    }

    /// Check if two rectangles overlap
    pub fn intersects(&self, other: &Rect) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x &&
        self.min.y <= other.max.y && self.max.y >= other.min.y
    }

    /// Check if the circle touches this rectangle
    pub fn intersects_circle(&self, circle: &Circle) -> bool {
        let closest_point = Vec2::new(
            circle.center.x.clamp(self.min.x, self.max.x),
            circle.center.y.clamp(self.min.y, self.max.y),
        );

        (closest_point - circle.center).magnitude_squared() <= circle.radius * circle.radius
    }
}

/// Bounding circle, the object volume of the quadtree
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    /// Center of the circle
    pub center: Vec2,
    /// Radius of the circle
    pub radius: f32,
}

impl Circle {
    /// Create a circle
    pub fn new(center: Vec2, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Check if two circles touch or overlap
    pub fn intersects(&self, other: &Circle) -> bool {
        let combined = self.radius + other.radius;
        (self.center - other.center).magnitude_squared() <= combined * combined
    }
}

/// Plane defined by normal and distance from origin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Normal vector (should be normalized)
    pub normal: Vec3,
    /// Distance from origin along the normal
    pub distance: f32,
}

impl Plane {
    /// Create a new plane from normal and distance
    pub fn new(normal: Vec3, distance: f32) -> Self {
        Self { normal: normal.normalize(), distance }
    }

    /// Create a plane from `ax + by + cz + d = 0`, normalizing all coefficients
    pub fn from_coefficients(a: f32, b: f32, c: f32, d: f32) -> Self {
        let normal = Vec3::new(a, b, c);
        let length = normal.magnitude();
        if length <= f32::EPSILON {
            return Self { normal: Vec3::zeros(), distance: d };
        }
        Self { normal: normal / length, distance: d / length }
    }

    /// Calculate signed distance from plane to point
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(&point) + self.distance
    }

    /// Check if the sphere is at least partially on the front side
    pub fn sphere_in_front(&self, sphere: &Sphere) -> bool {
        self.distance_to_point(sphere.center) >= -sphere.radius
    }

    /// Check if the box is at least partially on the front side
    pub fn aabb_in_front(&self, aabb: &AABB) -> bool {
        // Corner furthest along the normal
        let mut p = aabb.min;
        if self.normal.x >= 0.0 { p.x = aabb.max.x; }
        if self.normal.y >= 0.0 { p.y = aabb.max.y; }
        if self.normal.z >= 0.0 { p.z = aabb.max.z; }

        self.distance_to_point(p) >= 0.0
    }
}

/// Frustum for visibility culling
#[derive(Debug, Clone, PartialEq)]
pub struct Frustum {
    /// Six planes defining the frustum (left, right, bottom, top, near, far)
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Create a frustum from six planes
    pub fn new(planes: [Plane; 6]) -> Self {
        Self { planes }
    }

    /// Extract frustum planes from a view-projection matrix
    ///
    /// Gribb-Hartmann extraction for column vectors and clip space depth in
    /// `[-1, 1]`. Plane normals point into the frustum.
    pub fn from_matrix(vp_matrix: &Mat4) -> Self {
        let row = |i: usize| vp_matrix.row(i).transpose();
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));

        let plane = |v: nalgebra::Vector4<f32>| Plane::from_coefficients(v.x, v.y, v.z, v.w);

        Self {
            planes: [
                plane(r3 + r0),
                plane(r3 - r0),
                plane(r3 + r1),
                plane(r3 - r1),
                plane(r3 + r2),
                plane(r3 - r2),
            ],
        }
    }

    /// Check if an AABB is inside or intersects the frustum
    pub fn intersects_aabb(&self, aabb: &AABB) -> bool {
        self.planes.iter().all(|plane| plane.aabb_in_front(aabb))
    }

    /// Check if a sphere is inside or intersects the frustum
    pub fn intersects_sphere(&self, sphere: &Sphere) -> bool {
        self.planes.iter().all(|plane| plane.sphere_in_front(sphere))
    }
}
