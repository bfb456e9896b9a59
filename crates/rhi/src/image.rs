//! Device-local images and explicit layout tracking.
//!
//! # Overview
//!
//! - [`Image`] owns a 2D VkImage, its memory and a full-subresource view
//! - [`ImageState`] is the single authoritative record of an image's current
//!   layout; barriers are derived from it with [`ImageState::barrier_to`] and
//!   the new layout is committed with [`ImageState::commit`]
//!
//! Swapchain images are not owned by [`Image`] but are tracked with a bare
//! [`ImageState`] for the duration of a frame.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use renderer_rhi::device::Device;
//! use renderer_rhi::image::{Image, ImageDesc};
//!
//! # fn example(device: Arc<Device>) -> Result<(), renderer_rhi::RhiError> {
//! let mut shadow_map = Image::new(device, &ImageDesc::depth(
//!     "shadow_map",
//!     vk::Extent2D { width: 2048, height: 2048 },
//!     vk::Format::D16_UNORM,
//!     vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
//! ))?;
//!
//! let barrier = shadow_map.state().barrier_to(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL);
//! // ... record `barrier` ...
//! shadow_map.state_mut().commit(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Creation parameters for an [`Image`].
#[derive(Clone, Debug)]
pub struct ImageDesc<'a> {
    pub label: &'a str,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub aspect: vk::ImageAspectFlags,
}

impl<'a> ImageDesc<'a> {
    /// Describes a depth-only image.
    pub fn depth(
        label: &'a str,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> Self {
        Self {
            label,
            extent,
            format,
            usage,
            aspect: vk::ImageAspectFlags::DEPTH,
        }
    }
}

/// Current layout of one image plus the data needed to build barriers for it.
#[derive(Clone, Copy, Debug)]
pub struct ImageState {
    image: vk::Image,
    aspect: vk::ImageAspectFlags,
    layout: vk::ImageLayout,
}

impl ImageState {
    /// Starts tracking `image` in the `UNDEFINED` layout.
    pub fn new(image: vk::Image, aspect: vk::ImageAspectFlags) -> Self {
        Self {
            image,
            aspect,
            layout: vk::ImageLayout::UNDEFINED,
        }
    }

    /// Returns the image handle.
    #[inline]
    pub fn image(&self) -> vk::Image {
        self.image
    }

    /// Returns the last committed layout.
    #[inline]
    pub fn layout(&self) -> vk::ImageLayout {
        self.layout
    }

    /// Builds the barrier that moves the image from its current layout to `new_layout`.
    ///
    /// Does not change the tracked layout; call [`Self::commit`] once the
    /// barrier has been recorded.
    pub fn barrier_to(&self, new_layout: vk::ImageLayout) -> vk::ImageMemoryBarrier2<'static> {
        let (src_stage, src_access) = source_scope(self.layout, new_layout);
        let (dst_stage, dst_access) = layout_scope(new_layout);

        vk::ImageMemoryBarrier2::default()
            .src_stage_mask(src_stage)
            .src_access_mask(src_access)
            .dst_stage_mask(dst_stage)
            .dst_access_mask(dst_access)
            .old_layout(self.layout)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.image)
            .subresource_range(full_range(self.aspect))
    }

    /// Records that a barrier to `layout` has been emitted.
    #[inline]
    pub fn commit(&mut self, layout: vk::ImageLayout) {
        self.layout = layout;
    }
}

/// Pipeline stages and accesses that use an image while it is in `layout`.
pub fn layout_scope(layout: vk::ImageLayout) -> (vk::PipelineStageFlags2, vk::AccessFlags2) {
    match layout {
        vk::ImageLayout::UNDEFINED => (vk::PipelineStageFlags2::TOP_OF_PIPE, vk::AccessFlags2::NONE),
        vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL
        | vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL => (
            vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS,
            vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ),
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => (
            vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags2::COLOR_ATTACHMENT_READ | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
        ),
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => (
            vk::PipelineStageFlags2::FRAGMENT_SHADER,
            vk::AccessFlags2::SHADER_SAMPLED_READ,
        ),
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => (
            vk::PipelineStageFlags2::ALL_TRANSFER,
            vk::AccessFlags2::TRANSFER_WRITE,
        ),
        vk::ImageLayout::PRESENT_SRC_KHR => (
            vk::PipelineStageFlags2::BOTTOM_OF_PIPE,
            vk::AccessFlags2::NONE,
        ),
        other => {
            warn!("No barrier scope for layout {:?}, using full barrier", other);
            (
                vk::PipelineStageFlags2::ALL_COMMANDS,
                vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE,
            )
        }
    }
}

/// Source scope of a transition out of `old`.
///
/// Leaving `UNDEFINED` still has to wait for earlier writes of the same kind,
/// e.g. the previous frame's depth writes or the presentation engine's read
/// that the acquire semaphore releases at the color-output stage.
fn source_scope(
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> (vk::PipelineStageFlags2, vk::AccessFlags2) {
    if old == vk::ImageLayout::UNDEFINED {
        let (stage, access) = layout_scope(new);
        let writes = access
            & (vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE
                | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags2::TRANSFER_WRITE);
        (stage, writes)
    } else {
        layout_scope(old)
    }
}

fn full_range(aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(aspect)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
}

/// Device-local 2D image with a view and tracked layout.
pub struct Image {
    device: Arc<Device>,
    view: vk::ImageView,
    allocation: Option<Allocation>,
    format: vk::Format,
    extent: vk::Extent2D,
    state: ImageState,
    label: String,
}

impl Image {
    /// Creates an image, allocates device-local memory for it and creates its view.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero extent or if any Vulkan call fails.
    pub fn new(device: Arc<Device>, desc: &ImageDesc<'_>) -> RhiResult<Self> {
        if desc.extent.width == 0 || desc.extent.height == 0 {
            return Err(RhiError::InvalidHandle(format!(
                "Image '{}' extent must be non-zero, got {}x{}",
                desc.label, desc.extent.width, desc.extent.height
            )));
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let handle = device.handle();
        let image = unsafe { handle.create_image(&image_info, None)? };
        let requirements = unsafe { handle.get_image_memory_requirements(image) };

        let allocation = match device.allocator().allocate(&AllocationCreateDesc {
            name: desc.label,
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        }) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { handle.destroy_image(image, None) };
                return Err(e.into());
            }
        };

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(desc.format)
            .subresource_range(full_range(desc.aspect));

        let view = unsafe {
            handle
                .bind_image_memory(image, allocation.memory(), allocation.offset())
                .and_then(|()| handle.create_image_view(&view_info, None))
        };
        let view = match view {
            Ok(view) => view,
            Err(e) => {
                let _ = device.allocator().free(allocation);
                unsafe { handle.destroy_image(image, None) };
                return Err(e.into());
            }
        };

        debug!(
            "Created image '{}': {}x{} ({:?})",
            desc.label, desc.extent.width, desc.extent.height, desc.format
        );

        Ok(Self {
            view,
            allocation: Some(allocation),
            format: desc.format,
            extent: desc.extent,
            state: ImageState::new(image, desc.aspect),
            label: desc.label.to_string(),
            device,
        })
    }

    /// Returns the Vulkan image handle.
    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.state.image
    }

    /// Returns the image view covering the whole image.
    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Returns the tracked layout state.
    #[inline]
    pub fn state(&self) -> &ImageState {
        &self.state
    }

    /// Returns the tracked layout state for recording transitions.
    #[inline]
    pub fn state_mut(&mut self) -> &mut ImageState {
        &mut self.state
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_image_view(self.view, None);
            self.device.handle().destroy_image(self.state.image, None);
        }

        if let Some(allocation) = self.allocation.take()
            && let Err(e) = self.device.allocator().free(allocation)
        {
            error!("Failed to free image '{}' allocation: {:?}", self.label, e);
        }

        debug!("Destroyed image '{}'", self.label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn shadow_state() -> ImageState {
        ImageState::new(vk::Image::from_raw(7), vk::ImageAspectFlags::DEPTH)
    }

    #[test]
    fn test_new_state_is_undefined() {
        assert_eq!(shadow_state().layout(), vk::ImageLayout::UNDEFINED);
    }

    #[test]
    fn test_barrier_reads_tracked_layout_without_mutating() {
        let state = shadow_state();
        let barrier = state.barrier_to(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL);
        assert_eq!(barrier.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(barrier.new_layout, vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL);
        assert_eq!(barrier.image, vk::Image::from_raw(7));
        assert_eq!(
            barrier.subresource_range.aspect_mask,
            vk::ImageAspectFlags::DEPTH
        );
        assert_eq!(state.layout(), vk::ImageLayout::UNDEFINED);
    }

    #[test]
    fn test_commit_feeds_next_barrier() {
        let mut state = shadow_state();
        state.commit(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL);
        let barrier = state.barrier_to(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(barrier.old_layout, vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL);
    }

    #[test]
    fn test_depth_write_ordered_before_fragment_read() {
        let mut state = shadow_state();
        state.commit(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL);
        let barrier = state.barrier_to(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);

        assert!(barrier
            .src_stage_mask
            .contains(vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS));
        assert!(barrier
            .src_access_mask
            .contains(vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE));
        assert!(barrier
            .dst_stage_mask
            .contains(vk::PipelineStageFlags2::FRAGMENT_SHADER));
        assert!(barrier
            .dst_access_mask
            .contains(vk::AccessFlags2::SHADER_SAMPLED_READ));
    }

    #[test]
    fn test_swapchain_acquire_transition_waits_on_color_output() {
        let state = ImageState::new(vk::Image::from_raw(1), vk::ImageAspectFlags::COLOR);
        let barrier = state.barrier_to(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(
            barrier.src_stage_mask,
            vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT
        );
    }

    #[test]
    fn test_present_transition() {
        let mut state = ImageState::new(vk::Image::from_raw(1), vk::ImageAspectFlags::COLOR);
        state.commit(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        let barrier = state.barrier_to(vk::ImageLayout::PRESENT_SRC_KHR);
        assert!(barrier
            .src_access_mask
            .contains(vk::AccessFlags2::COLOR_ATTACHMENT_WRITE));
        assert_eq!(barrier.dst_access_mask, vk::AccessFlags2::NONE);
    }
}
