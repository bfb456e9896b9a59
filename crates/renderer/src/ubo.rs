//! GPU-visible constant blocks.
//!
//! These structures must match the GLSL declarations in `shaders/` exactly.
//! All structures use `#[repr(C)]` for predictable memory layout and implement
//! `Pod` and `Zeroable` for safe byte casting.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// Base color used when nothing else is configured.
pub const DEFAULT_BASE_COLOR: Vec3 = Vec3::new(0.9, 0.92, 1.0);

/// Per-frame uniform block (set 0, binding 0 of the forward pass).
///
/// Matches the std140 `UniformParams` block in `simple.vert` / `simple_shadow.frag`.
///
/// # Memory Layout
///
/// - Offset 0: light matrix (64 bytes)
/// - Offset 64: light position (12 bytes)
/// - Offset 76: time (4 bytes)
/// - Offset 80: base color (12 bytes)
/// - Offset 92: animate-light-color flag as `uint` (4 bytes)
/// - Total size: 96 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct UniformParams {
    /// World to light clip space.
    pub light_matrix: Mat4,
    pub light_pos: Vec3,
    /// Seconds since start.
    pub time: f32,
    pub base_color: Vec3,
    /// GLSL `bool` in a uniform block is 4 bytes; 0 or 1.
    pub animate_light_color: u32,
}

impl Default for UniformParams {
    fn default() -> Self {
        Self {
            light_matrix: Mat4::IDENTITY,
            light_pos: Vec3::ZERO,
            time: 0.0,
            base_color: DEFAULT_BASE_COLOR,
            animate_light_color: 0,
        }
    }
}

impl UniformParams {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn new(light_matrix: Mat4, light_pos: Vec3, time: f32) -> Self {
        Self {
            light_matrix,
            light_pos,
            time,
            ..Self::default()
        }
    }

    pub fn with_animated_light_color(mut self, animate: bool) -> Self {
        self.animate_light_color = u32::from(animate);
        self
    }
}

/// Per-draw push constants shared by the shadow and forward pipelines.
///
/// # Memory Layout
///
/// - Offset 0: projection * view (64 bytes)
/// - Offset 64: model (64 bytes)
/// - Total size: 128 bytes, the guaranteed minimum push constant range
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct DrawPushConstants {
    pub proj_view: Mat4,
    pub model: Mat4,
}

impl DrawPushConstants {
    /// Size of the struct in bytes.
    pub const SIZE: u32 = std::mem::size_of::<Self>() as u32;

    #[inline]
    pub fn new(proj_view: Mat4, model: Mat4) -> Self {
        Self { proj_view, model }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::offset_of;

    #[test]
    fn test_uniform_params_layout() {
        assert_eq!(UniformParams::SIZE, 96);
        assert_eq!(offset_of!(UniformParams, light_matrix), 0);
        assert_eq!(offset_of!(UniformParams, light_pos), 64);
        assert_eq!(offset_of!(UniformParams, time), 76);
        assert_eq!(offset_of!(UniformParams, base_color), 80);
        assert_eq!(offset_of!(UniformParams, animate_light_color), 92);
    }

    #[test]
    fn test_uniform_params_alignment() {
        // Mat4 requires 16-byte alignment
        assert_eq!(std::mem::align_of::<UniformParams>(), 16);
    }

    #[test]
    fn test_uniform_params_defaults() {
        let params = UniformParams::new(Mat4::IDENTITY, Vec3::new(4.0, 4.0, 4.0), 1.5);
        assert_eq!(params.base_color, DEFAULT_BASE_COLOR);
        assert_eq!(params.animate_light_color, 0);
        assert_eq!(params.with_animated_light_color(true).animate_light_color, 1);
    }

    #[test]
    fn test_uniform_params_bytes() {
        let params = UniformParams::new(Mat4::IDENTITY, Vec3::new(1.0, 2.0, 3.0), 0.5);
        let bytes: &[u8] = bytemuck::bytes_of(&params);
        assert_eq!(bytes.len(), 96);
        let time = f32::from_le_bytes(bytes[76..80].try_into().unwrap());
        assert_eq!(time, 0.5);
    }

    #[test]
    fn test_push_constants_size() {
        assert_eq!(DrawPushConstants::SIZE, 128);
        assert_eq!(offset_of!(DrawPushConstants, model), 64);
    }
}
