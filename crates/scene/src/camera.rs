//! Free-flying perspective camera.
//!
//! Conventions used throughout the renderer: right-handed world space with
//! +Y up, the camera looks down its local -Z, clip depth runs from 0 to 1, and
//! projection matrices carry a single Y flip for Vulkan's downward clip-space Y.

use glam::{Mat3, Mat4, Quat, Vec3};

use crate::scene_data::SceneCamera;

/// Lower bound of the field of view, in degrees.
pub const MIN_FOV_DEG: f32 = 1.0;
/// Upper bound of the field of view, in degrees.
pub const MAX_FOV_DEG: f32 = 180.0;

/// A camera for rendering the scene.
#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    /// Camera position in world space
    pub position: Vec3,
    /// Camera orientation; identity looks down -Z
    pub rotation: Quat,
    /// Vertical field of view in degrees
    pub fov_deg: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            fov_deg: 45.0,
            near: 0.01,
            far: 1000.0,
        }
    }
}

impl Camera {
    /// Creates a default camera placed at `from` looking at `to`.
    pub fn looking_at(from: Vec3, to: Vec3) -> Self {
        let mut camera = Self::default();
        camera.look_at(from, to, Vec3::Y);
        camera
    }

    /// Takes position, orientation and clip planes from an asset camera.
    ///
    /// Scale in the node transform is dropped. Missing fov or far plane
    /// (orthographic or infinite cameras) keep the defaults.
    pub fn from_scene_camera(scene_camera: &SceneCamera) -> Self {
        let defaults = Self::default();
        let (_, rotation, position) = scene_camera.transform.to_scale_rotation_translation();
        Self {
            position,
            rotation: rotation.normalize(),
            fov_deg: scene_camera
                .fov_deg
                .map_or(defaults.fov_deg, |fov| fov.clamp(MIN_FOV_DEG, MAX_FOV_DEG)),
            near: scene_camera.near,
            far: scene_camera.far.unwrap_or(defaults.far),
        }
    }

    /// Places the camera at `from` and orients it toward `to`.
    ///
    /// Does nothing to the orientation if `from == to`. When the view
    /// direction is parallel to `up`, +Z is used as the up hint instead.
    pub fn look_at(&mut self, from: Vec3, to: Vec3, up: Vec3) {
        self.position = from;

        let Some(forward) = (to - from).try_normalize() else {
            return;
        };
        let right = forward
            .cross(up)
            .try_normalize()
            .unwrap_or_else(|| forward.cross(Vec3::Z).normalize_or(Vec3::X));
        let up = right.cross(forward);

        self.rotation = Quat::from_mat3(&Mat3::from_cols(right, up, -forward)).normalize();
    }

    /// Turns the camera: `up_deg` pitches around the local X axis, `right_deg`
    /// yaws around world Y. Positive values look down and to the right.
    pub fn rotate(&mut self, up_deg: f32, right_deg: f32) {
        let yaw = Quat::from_axis_angle(Vec3::NEG_Y, right_deg.to_radians());
        let pitch = Quat::from_axis_angle(Vec3::NEG_X, up_deg.to_radians());
        self.rotation = (yaw * self.rotation * pitch).normalize();
    }

    /// Translates the camera in world space.
    pub fn translate(&mut self, offset: Vec3) {
        self.position += offset;
    }

    /// Adds `delta_deg` to the field of view, clamped to `[1, 180]`.
    pub fn zoom(&mut self, delta_deg: f32) {
        self.fov_deg = (self.fov_deg + delta_deg).clamp(MIN_FOV_DEG, MAX_FOV_DEG);
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    /// Camera-to-world transform.
    pub fn world_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position)
    }

    /// World-to-camera transform.
    pub fn view_matrix(&self) -> Mat4 {
        self.world_matrix().inverse()
    }

    /// Perspective projection with Vulkan's Y flip.
    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        // 180° is a degenerate frustum; stay just below it.
        let fov = self.fov_deg.min(MAX_FOV_DEG - 0.01).to_radians();
        flip_y(Mat4::perspective_rh(fov, aspect, self.near, self.far))
    }

    pub fn view_projection_matrix(&self, aspect: f32) -> Mat4 {
        self.projection_matrix(aspect) * self.view_matrix()
    }
}

/// Applies Vulkan's clip-space Y flip to a projection matrix.
#[inline]
pub fn flip_y(mut proj: Mat4) -> Mat4 {
    proj.y_axis.y *= -1.0;
    proj
}
