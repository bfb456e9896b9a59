//! Packed vertex format and input descriptions.
//!
//! [`Vertex`] is 32 bytes: two `vec4`s. Position and texture coordinates stay
//! full precision; the unit normal and tangent are each squeezed into one
//! `u32` (stored as raw `f32` bits) by [`pack_unit_vector`]. Shaders read them
//! back with `floatBitsToUint` and the same decode as [`unpack_unit_vector`].
//!
//! | location | offset | contents |
//! |---|---|---|
//! | 0 | 0  | `position.xyz`, `bits(normal)` |
//! | 1 | 16 | `uv.xy`, `bits(tangent)`, `0` |

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// Scale of the 16-bit signed fixed-point components.
const UNIT_SCALE: f32 = 32767.0;

/// Packs a unit vector into 32 bits.
///
/// `x` and `y` are stored as 16-bit fixed point; bit 0 of the `x` half is
/// reused for the sign of `z`, whose magnitude is recovered from
/// `x² + y² + z² = 1`.
pub fn pack_unit_vector(v: Vec3) -> u32 {
    let x = (v.x * UNIT_SCALE) as i32;
    let y = (v.y * UNIT_SCALE) as i32;
    let sign = u32::from(v.z < 0.0);
    ((x as u32) & 0xfffe) | sign | (((y as u32) & 0xffff) << 16)
}

/// Inverse of [`pack_unit_vector`].
pub fn unpack_unit_vector(packed: u32) -> Vec3 {
    let x = f32::from((packed & 0xfffe) as u16 as i16) / UNIT_SCALE;
    let y = f32::from((packed >> 16) as u16 as i16) / UNIT_SCALE;
    let z = (1.0 - x * x - y * y).max(0.0).sqrt();
    let z = if packed & 1 != 0 { -z } else { z };
    Vec3::new(x, y, z)
}

/// GPU vertex: position + packed normal, uv + packed tangent.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos_norm: [f32; 4],
    pub uv_tangent: [f32; 4],
}

impl Vertex {
    /// Builds a vertex from unpacked attributes.
    ///
    /// `normal` and `tangent` are normalized before packing; a zero vector
    /// packs as `+Z`.
    pub fn from_attributes(position: Vec3, normal: Vec3, uv: Vec2, tangent: Vec3) -> Self {
        let normal = pack_unit_vector(normal.normalize_or(Vec3::Z));
        let tangent = pack_unit_vector(tangent.normalize_or(Vec3::Z));
        Self {
            pos_norm: [position.x, position.y, position.z, f32::from_bits(normal)],
            uv_tangent: [uv.x, uv.y, f32::from_bits(tangent), 0.0],
        }
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        Vec3::new(self.pos_norm[0], self.pos_norm[1], self.pos_norm[2])
    }

    #[inline]
    pub fn normal(&self) -> Vec3 {
        unpack_unit_vector(self.pos_norm[3].to_bits())
    }

    #[inline]
    pub fn uv(&self) -> Vec2 {
        Vec2::new(self.uv_tangent[0], self.uv_tangent[1])
    }

    #[inline]
    pub fn tangent(&self) -> Vec3 {
        unpack_unit_vector(self.uv_tangent[2].to_bits())
    }

    /// Returns the size of the vertex in bytes.
    #[inline]
    pub const fn size() -> usize {
        std::mem::size_of::<Self>()
    }

    /// Binding 0, per-vertex rate.
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: Self::size() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 2] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32A32_SFLOAT,
                offset: 0,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32A32_SFLOAT,
                offset: 16,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// x and y lose the truncated fraction plus the borrowed sign bit.
    const XY_TOLERANCE: f32 = 2.0 / UNIT_SCALE;

    fn sample_directions() -> Vec<Vec3> {
        let mut dirs = vec![
            Vec3::X,
            Vec3::Y,
            Vec3::Z,
            -Vec3::X,
            -Vec3::Y,
            -Vec3::Z,
            Vec3::new(1.0, 1.0, 1.0).normalize(),
            Vec3::new(-0.3, 0.8, -0.5).normalize(),
        ];
        for i in 0..16 {
            let theta = i as f32 * 0.39;
            for j in 1..8 {
                let phi = j as f32 * 0.39;
                dirs.push(Vec3::new(
                    phi.sin() * theta.cos(),
                    phi.sin() * theta.sin(),
                    phi.cos(),
                ));
            }
        }
        dirs
    }

    #[test]
    fn test_vertex_size_and_layout() {
        assert_eq!(Vertex::size(), 32);
        assert_eq!(std::mem::offset_of!(Vertex, uv_tangent), 16);
        let attrs = Vertex::attribute_descriptions();
        assert_eq!(attrs[0].offset, 0);
        assert_eq!(attrs[1].offset, 16);
        assert_eq!(attrs[1].location, 1);
        assert_eq!(Vertex::binding_description().stride, 32);
    }

    #[test]
    fn test_unit_vector_round_trip_xy() {
        for v in sample_directions() {
            let u = unpack_unit_vector(pack_unit_vector(v));
            assert!((u.x - v.x).abs() <= XY_TOLERANCE, "{v} -> {u}");
            assert!((u.y - v.y).abs() <= XY_TOLERANCE, "{v} -> {u}");
            assert!((u.length() - 1.0).abs() < 1e-3, "{v} -> {u}");
        }
    }

    #[test]
    fn test_unit_vector_round_trip_z() {
        for v in sample_directions() {
            let u = unpack_unit_vector(pack_unit_vector(v));
            // z is reconstructed, so precision drops as |z| approaches 0
            assert!((u.z - v.z).abs() < 0.02, "{v} -> {u}");
            if v.z.abs() > 0.1 {
                assert_eq!(u.z.is_sign_negative(), v.z < 0.0);
                assert!((u.z - v.z).abs() < 1e-3, "{v} -> {u}");
            }
        }
    }

    #[test]
    fn test_pack_bit_layout() {
        // +Z: both halves zero, sign bit clear
        assert_eq!(pack_unit_vector(Vec3::Z), 0);
        // -Z: only the sign bit
        assert_eq!(pack_unit_vector(-Vec3::Z), 1);
        // +Y lands in the high half
        assert_eq!(pack_unit_vector(Vec3::Y), 32767 << 16);
    }

    #[test]
    fn test_from_attributes() {
        let v = Vertex::from_attributes(
            Vec3::new(1.0, 2.0, 3.0),
            Vec3::new(0.0, 0.0, -2.0),
            Vec2::new(0.25, 0.75),
            Vec3::X,
        );
        assert_eq!(v.position(), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(v.uv(), Vec2::new(0.25, 0.75));
        assert!((v.normal() - -Vec3::Z).length() < 1e-3);
        assert!((v.tangent() - Vec3::X).length() < 0.02);
        assert_eq!(v.uv_tangent[3], 0.0);
    }

    #[test]
    fn test_zero_normal_defaults_to_z() {
        let v = Vertex::from_attributes(Vec3::ZERO, Vec3::ZERO, Vec2::ZERO, Vec3::ZERO);
        assert_eq!(v.normal(), Vec3::Z);
        assert_eq!(v.tangent(), Vec3::Z);
    }
}
