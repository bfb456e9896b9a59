//! Depth render targets.
//!
//! - [`ShadowMap`]: fixed-resolution light-space depth, sampled by the
//!   forward pass. Lives as long as the renderer.
//! - [`ResolutionTargets`]: everything sized like the swapchain. The whole
//!   group is dropped and rebuilt on resize.
//!
//! Both formats are checked during physical-device selection.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use renderer_rhi::RhiResult;
use renderer_rhi::device::Device;
use renderer_rhi::image::{Image, ImageDesc};

/// Shadow map format.
pub const SHADOW_MAP_FORMAT: vk::Format = vk::Format::D16_UNORM;

/// Main depth buffer format.
pub const MAIN_DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Default shadow map side length.
pub const DEFAULT_SHADOW_MAP_SIZE: u32 = 2048;

/// Light-space depth image.
pub struct ShadowMap {
    image: Image,
}

impl ShadowMap {
    /// Creates a square `size` x `size` shadow map.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero size or if image creation fails.
    pub fn new(device: Arc<Device>, size: u32) -> RhiResult<Self> {
        let desc = ImageDesc::depth(
            "shadow map",
            vk::Extent2D {
                width: size,
                height: size,
            },
            SHADOW_MAP_FORMAT,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
        );
        Ok(Self {
            image: Image::new(device, &desc)?,
        })
    }

    #[inline]
    pub fn image(&self) -> &Image {
        &self.image
    }

    #[inline]
    pub fn image_mut(&mut self) -> &mut Image {
        &mut self.image
    }
}

/// Render targets sized like the swapchain.
pub struct ResolutionTargets {
    depth: Image,
}

impl ResolutionTargets {
    /// Creates every resolution-dependent target for `extent`.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero extent or if image creation fails.
    pub fn new(device: Arc<Device>, extent: vk::Extent2D) -> RhiResult<Self> {
        let depth = Image::new(
            device,
            &ImageDesc::depth(
                "main depth",
                extent,
                MAIN_DEPTH_FORMAT,
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            ),
        )?;

        debug!(
            "Created resolution targets: {}x{}",
            extent.width, extent.height
        );

        Ok(Self { depth })
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.depth.extent()
    }

    #[inline]
    pub fn depth(&self) -> &Image {
        &self.depth
    }

    #[inline]
    pub fn depth_mut(&mut self) -> &mut Image {
        &mut self.depth
    }
}
