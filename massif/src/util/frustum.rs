//! Frustum planes and bounding spheres.
//!
//! Plane extraction follows <https://www.gamedevs.org/uploads/fast-extraction-viewing-frustum-planes-from-world-view-projection-matrix.pdf>.

use glam::{Mat4, Vec3, Vec3A, Vec4, Vec4Swizzles};

/// Planes with a direction vector shorter than this are left unnormalized.
/// An infinite projection produces a degenerate far plane whose normal is
/// effectively zero; dividing by its length would poison the whole frustum.
const MIN_PLANE_NORMAL_LENGTH: f32 = 1e-6;

/// A point in space and a radius from that point.
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

unsafe impl bytemuck::Pod for BoundingSphere {}
unsafe impl bytemuck::Zeroable for BoundingSphere {}

impl BoundingSphere {
    pub const ZERO: Self = Self {
        center: Vec3::ZERO,
        radius: 0.0,
    };

    /// Centroid (arithmetic mean of the positions) plus the maximum distance
    /// from it to any position. Overestimates for unevenly distributed
    /// vertices, which is acceptable for a conservative visibility test.
    pub fn from_points(points: &[Vec3]) -> Self {
        if points.is_empty() {
            return Self::ZERO;
        }

        let mut sum = Vec3A::ZERO;
        for pos in points {
            sum += Vec3A::from(*pos);
        }
        let center = sum / points.len() as f32;

        let radius = points.iter().fold(0.0_f32, |radius, pos| {
            radius.max((Vec3A::from(*pos) - center).length())
        });

        Self {
            center: Vec3::from(center),
            radius,
        }
    }

    /// Transforms the center and scales the radius by the longest column of
    /// the upper 3x3, a conservative bound under non-uniform scale.
    pub fn apply_transform(self, transform: Mat4) -> Self {
        let max_scale = transform
            .x_axis
            .xyz()
            .length_squared()
            .max(
                transform
                    .y_axis
                    .xyz()
                    .length_squared()
                    .max(transform.z_axis.xyz().length_squared()),
            )
            .sqrt();
        let center = transform * self.center.extend(1.0);

        Self {
            center: center.truncate(),
            radius: max_scale * self.radius,
        }
    }
}

/// A plane equation `dot(n, p) + d`, with `>= 0` meaning inside.
#[repr(C, align(16))]
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Plane {
    pub abc: Vec3,
    pub d: f32,
}

unsafe impl bytemuck::Pod for Plane {}
unsafe impl bytemuck::Zeroable for Plane {}

impl Plane {
    pub fn from_vec4(v: Vec4) -> Self {
        Self {
            abc: v.truncate(),
            d: v.w,
        }
    }

    pub fn normalize(mut self) -> Self {
        let mag = self.abc.length();
        if mag < MIN_PLANE_NORMAL_LENGTH {
            return self;
        }

        self.abc /= mag;
        self.d /= mag;

        self
    }

    pub fn distance(self, point: Vec3) -> f32 {
        self.abc.dot(point) + self.d
    }
}

/// Six world-space frustum planes: left, right, bottom, top, near, far.
#[repr(C, align(16))]
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

unsafe impl bytemuck::Pod for Frustum {}
unsafe impl bytemuck::Zeroable for Frustum {}

impl Frustum {
    /// Extracts the planes of a view-projection matrix. The resulting planes
    /// are in whatever space the matrix maps *from*; pass a full
    /// view-projection to get world-space planes.
    pub fn from_matrix(matrix: Mat4) -> Self {
        let row0 = matrix.row(0);
        let row1 = matrix.row(1);
        let row2 = matrix.row(2);
        let row3 = matrix.row(3);

        let left = Plane::from_vec4(row3 + row0);
        let right = Plane::from_vec4(row3 - row0);
        let bottom = Plane::from_vec4(row3 + row1);
        let top = Plane::from_vec4(row3 - row1);
        // Clip volume is 0 <= z <= w. With a reversed-depth projection the
        // labels swap but the bounded volume is the same.
        let near = Plane::from_vec4(row2);
        let far = Plane::from_vec4(row3 - row2);

        Self {
            planes: [
                left.normalize(),
                right.normalize(),
                bottom.normalize(),
                top.normalize(),
                near.normalize(),
                far.normalize(),
            ],
        }
    }

    /// Whether the sphere is at least partially inside the frustum.
    pub fn contains_sphere(&self, sphere: BoundingSphere) -> bool {
        let neg_radius = -sphere.radius;

        for plane in &self.planes {
            if plane.distance(sphere.center) < neg_radius {
                return false;
            }
        }

        true
    }
}
