//! Region types the spatial tree can partition
//!
//! A region knows how to split itself into its fixed fan-out of children and
//! which object volume it stores. Octants are numbered with the bit layout
//! `(z << 2) | (y << 1) | x`, quadrants with `(y << 1) | x`, where a set bit
//! selects the positive half.

use std::fmt;

use super::bounds::{Circle, Rect, Sphere, AABB};
use crate::foundation::math::{Vec2, Vec3};

/// Region of space managed by a node of a [`SpatialTree`](super::SpatialTree)
pub trait Region: Copy + fmt::Debug {
    /// Bounding volume of the objects stored in regions of this type
    type Volume: Copy + fmt::Debug + PartialEq;

    /// Number of children created when a region splits
    const FAN_OUT: usize;

    /// Child region at `index` (`0..FAN_OUT`)
    fn child(&self, index: usize) -> Self;

    /// Child that would hold a volume centered where `volume` is
    fn child_index(&self, volume: &Self::Volume) -> usize;

    /// Whether the volume lies completely inside this region
    fn contains(&self, volume: &Self::Volume) -> bool;

    /// Shortest edge of the region
    fn edge_length(&self) -> f32;
}

impl Region for AABB {
    type Volume = Sphere;

    const FAN_OUT: usize = 8;

    fn child(&self, index: usize) -> Self {
        let center = self.center();
        let quarter_extents = self.extents() * 0.5;

        let x_sign = if index & 1 != 0 { 1.0 } else { -1.0 };
        let y_sign = if index & 2 != 0 { 1.0 } else { -1.0 };
        let z_sign = if index & 4 != 0 { 1.0 } else { -1.0 };

        let child_center = Vec3::new(
            center.x + quarter_extents.x * x_sign,
            center.y + quarter_extents.y * y_sign,
            center.z + quarter_extents.z * z_sign,
        );

        AABB::from_center_extents(child_center, quarter_extents)
    }

    fn child_index(&self, volume: &Sphere) -> usize {
        let center = self.center();
        let x_bit = usize::from(volume.center.x >= center.x);
        let y_bit = usize::from(volume.center.y >= center.y);
        let z_bit = usize::from(volume.center.z >= center.z);

        (z_bit << 2) | (y_bit << 1) | x_bit
    }

    fn contains(&self, volume: &Sphere) -> bool {
        self.contains_sphere(volume)
    }

    fn edge_length(&self) -> f32 {
        let size = self.max - self.min;
        size.x.min(size.y).min(size.z)
    }
}

impl Region for Rect {
    type Volume = Circle;

    const FAN_OUT: usize = 4;

    fn child(&self, index: usize) -> Self {
        let center = self.center();
        let quarter_extents = self.extents() * 0.5;

        let x_sign = if index & 1 != 0 { 1.0 } else { -1.0 };
        let y_sign = if index & 2 != 0 { 1.0 } else { -1.0 };

        let child_center = Vec2::new(
            center.x + quarter_extents.x * x_sign,
            center.y + quarter_extents.y * y_sign,
        );

        Rect::new(child_center - quarter_extents, child_center + quarter_extents)
    }

    fn child_index(&self, volume: &Circle) -> usize {
        let center = self.center();
        let x_bit = usize::from(volume.center.x >= center.x);
        let y_bit = usize::from(volume.center.y >= center.y);

        (y_bit << 1) | x_bit
    }

    fn contains(&self, volume: &Circle) -> bool {
        self.contains_circle(volume)
    }

    fn edge_length(&self) -> f32 {
        let size = self.max - self.min;
        size.x.min(size.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_octants_tile_parent() {
        let parent = AABB::cube(Vec3::zeros(), 8.0);
        for index in 0..AABB::FAN_OUT {
            let child = parent.child(index);
            assert_eq!(child.extents(), Vec3::new(4.0, 4.0, 4.0));
            assert_eq!(parent.child_index(&Sphere::new(child.center(), 0.0)), index);
        }
        assert_eq!(parent.child(7).max, parent.max);
        assert_eq!(parent.child(0).min, parent.min);
    }

    #[test]
    fn test_quadrants_tile_parent() {
        let parent = Rect::from_position_size(0.0, 0.0, 16.0, 16.0);
        for index in 0..Rect::FAN_OUT {
            let child = parent.child(index);
            assert_eq!(child.extents(), Vec2::new(4.0, 4.0));
            assert_eq!(parent.child_index(&Circle::new(child.center(), 0.0)), index);
        }
        assert_eq!(parent.edge_length(), 16.0);
    }
}
