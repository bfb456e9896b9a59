//! Shadow-casting light.
//!
//! The light is a [`Camera`] the shadow pass renders from. Its projection is
//! either a perspective frustum (spot-like) or an orthographic box
//! (directional-like); both use the same clip conventions as the main
//! camera, so shadow lookups need no per-mode correction.

use glam::{Mat4, Vec3};

use crate::camera::{Camera, flip_y};

/// Light that renders the shadow map.
#[derive(Clone, Debug, PartialEq)]
pub struct ShadowLight {
    pub camera: Camera,
    /// Half-extent of the orthographic box.
    pub radius: f32,
    /// Distance to the point the light aims at. Sets the far plane.
    pub target_distance: f32,
    /// Perspective when true, orthographic otherwise.
    pub perspective: bool,
}

impl Default for ShadowLight {
    fn default() -> Self {
        Self {
            camera: Camera::looking_at(Vec3::new(4.0, 4.0, 4.0), Vec3::ZERO),
            radius: 5.0,
            target_distance: 20.0,
            perspective: true,
        }
    }
}

impl ShadowLight {
    pub fn new(camera: Camera, radius: f32, target_distance: f32, perspective: bool) -> Self {
        Self {
            camera,
            radius,
            target_distance,
            perspective,
        }
    }

    /// World position written to the uniform block.
    #[inline]
    pub fn position(&self) -> Vec3 {
        self.camera.position
    }

    /// Light projection.
    ///
    /// Perspective: light fov, aspect 1, near 1, far `2 * target_distance`.
    /// Orthographic: `[-radius, radius]²`, near 0, far `target_distance`.
    pub fn projection_matrix(&self) -> Mat4 {
        if self.perspective {
            self.camera_with_light_planes().projection_matrix(1.0)
        } else {
            let r = self.radius;
            flip_y(Mat4::orthographic_rh(-r, r, -r, r, 0.0, self.target_distance))
        }
    }

    /// World-to-light-clip transform used by the shadow pass and for shadow
    /// lookups in the forward pass.
    pub fn light_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.camera.view_matrix()
    }

    pub fn toggle_projection(&mut self) {
        self.perspective = !self.perspective;
    }

    fn camera_with_light_planes(&self) -> Camera {
        Camera {
            near: 1.0,
            far: 2.0 * self.target_distance,
            ..self.camera.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(light: &ShadowLight, p: Vec3) -> Vec3 {
        light.light_matrix().project_point3(p)
    }

    #[test]
    fn test_default_light() {
        let light = ShadowLight::default();
        assert_eq!(light.radius, 5.0);
        assert_eq!(light.target_distance, 20.0);
        assert!(light.perspective);
        assert_eq!(light.position(), Vec3::new(4.0, 4.0, 4.0));
    }

    #[test]
    fn test_target_projects_to_center_in_both_modes() {
        let mut light = ShadowLight::default();
        for _ in 0..2 {
            let c = clip(&light, Vec3::ZERO);
            assert!(c.x.abs() < 1e-4 && c.y.abs() < 1e-4, "{c}");
            assert!(c.z > 0.0 && c.z < 1.0, "{c}");
            light.toggle_projection();
        }
    }

    #[test]
    fn test_orthographic_depth_range() {
        let light = ShadowLight::new(
            Camera::looking_at(Vec3::new(0.0, 10.0, 0.0), Vec3::ZERO),
            5.0,
            20.0,
            false,
        );
        // near plane at the light, far plane target_distance away
        assert!(clip(&light, Vec3::new(0.0, 10.0, 0.0)).z.abs() < 1e-4);
        assert!((clip(&light, Vec3::new(0.0, -10.0, 0.0)).z - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_same_y_orientation_in_both_modes() {
        let mut light = ShadowLight::default();
        let p = light.camera.position + light.camera.forward() * 3.0 + light.camera.up() * 0.1;

        let persp = clip(&light, p);
        light.toggle_projection();
        let ortho = clip(&light, p);

        // a point above the light axis lands at negative clip Y in both modes
        assert!(persp.y < 0.0 && ortho.y < 0.0, "{persp} {ortho}");
    }
}
