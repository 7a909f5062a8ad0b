//! Camera data and the matrices derived from it.
//!
//! The projection and the depth convention live together on purpose: the
//! renderer clears depth to 0.0 and compares with `GreaterEqual`
//! (reversed-Z), which is only correct against the reversed projections
//! produced here. A raw projection handed in through
//! [`CameraProjection::Raw`] must follow the same convention.

use glam::{Mat4, Vec3};
use massif_types::Handedness;

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum CameraProjection {
    /// Reversed-Z perspective with an infinite far plane.
    Perspective { vfov_degrees: f32, near: f32 },
    Raw(Mat4),
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Camera {
    pub projection: CameraProjection,
    pub view: Mat4,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            projection: CameraProjection::Perspective {
                vfov_degrees: 60.0,
                near: 0.1,
            },
            view: Mat4::IDENTITY,
        }
    }
}

/// Caches the matrices derived from a [`Camera`] and an aspect ratio.
#[derive(Debug, Clone)]
pub struct CameraState {
    handedness: Handedness,
    proj: Mat4,
    inv_view: Mat4,
    data: Camera,
    aspect_ratio: f32,
}

impl CameraState {
    pub fn new(data: Camera, handedness: Handedness, aspect_ratio: f32) -> Self {
        let proj = compute_projection_matrix(data, handedness, aspect_ratio);

        Self {
            handedness,
            proj,
            inv_view: data.view.inverse(),
            data,
            aspect_ratio,
        }
    }

    pub fn set_data(&mut self, data: Camera) {
        self.proj = compute_projection_matrix(data, self.handedness, self.aspect_ratio);
        self.inv_view = data.view.inverse();
        self.data = data;
    }

    pub fn set_aspect_ratio(&mut self, aspect_ratio: f32) {
        self.aspect_ratio = aspect_ratio;
        self.proj = compute_projection_matrix(self.data, self.handedness, aspect_ratio);
    }

    pub fn data(&self) -> Camera {
        self.data
    }

    pub fn view(&self) -> Mat4 {
        self.data.view
    }

    pub fn proj(&self) -> Mat4 {
        self.proj
    }

    pub fn view_proj(&self) -> Mat4 {
        self.proj * self.data.view
    }

    /// World-space camera position, recovered from the inverse view.
    pub fn location(&self) -> Vec3 {
        self.inv_view.w_axis.truncate()
    }
}

fn compute_projection_matrix(data: Camera, handedness: Handedness, aspect_ratio: f32) -> Mat4 {
    match data.projection {
        CameraProjection::Perspective { vfov_degrees, near } => {
            if handedness == Handedness::Left {
                Mat4::perspective_infinite_reverse_lh(vfov_degrees.to_radians(), aspect_ratio, near)
            } else {
                Mat4::perspective_infinite_reverse_rh(vfov_degrees.to_radians(), aspect_ratio, near)
            }
        }
        CameraProjection::Raw(proj) => proj,
    }
}
