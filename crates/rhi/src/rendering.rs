//! Dynamic rendering helpers (Vulkan 1.3).
//!
//! Passes are described as plain data ([`RenderingConfig`]) and only turned
//! into `VkRenderingInfo` at record time through [`RenderingInfoBundle`].
//! Keeping the description plain lets command recording be inspected without
//! a device.
//!
//! # Example
//!
//! ```no_run
//! use ash::vk;
//! use renderer_rhi::rendering::{ColorAttachment, DepthAttachment, RenderingConfig};
//! use renderer_rhi::command::CommandBuffer;
//!
//! # fn example(color_view: vk::ImageView, depth_view: vk::ImageView, cmd: &CommandBuffer) {
//! let config = RenderingConfig::new(1280, 720)
//!     .with_color_attachment(ColorAttachment::new(color_view).with_clear_color([0.0, 0.0, 0.0, 1.0]))
//!     .with_depth_attachment(DepthAttachment::new(depth_view));
//!
//! let bundle = config.build();
//! cmd.begin_rendering(&bundle.info());
//! // ... draw commands ...
//! cmd.end_rendering();
//! # }
//! ```

use ash::vk;

/// Color attachment of a rendering pass.
///
/// Defaults: `COLOR_ATTACHMENT_OPTIMAL`, load `CLEAR`, store `STORE`, clear to
/// opaque black.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorAttachment {
    pub image_view: vk::ImageView,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub clear_color: [f32; 4],
}

impl ColorAttachment {
    #[inline]
    pub fn new(image_view: vk::ImageView) -> Self {
        Self {
            image_view,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }

    #[inline]
    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.load_op = vk::AttachmentLoadOp::CLEAR;
        self.clear_color = color;
        self
    }

    /// Keeps the previous contents (used by overlay passes).
    #[inline]
    pub fn load(mut self) -> Self {
        self.load_op = vk::AttachmentLoadOp::LOAD;
        self
    }

    pub fn to_rendering_attachment_info(&self) -> vk::RenderingAttachmentInfo<'static> {
        vk::RenderingAttachmentInfo::default()
            .image_view(self.image_view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(self.load_op)
            .store_op(self.store_op)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_color,
                },
            })
    }
}

/// Depth attachment of a rendering pass.
///
/// Defaults: `DEPTH_ATTACHMENT_OPTIMAL`, load `CLEAR` to 1.0, store
/// `DONT_CARE`. Shadow maps switch to [`store`](Self::store) so the
/// forward pass can sample them.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DepthAttachment {
    pub image_view: vk::ImageView,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub clear_depth: f32,
}

impl DepthAttachment {
    #[inline]
    pub fn new(image_view: vk::ImageView) -> Self {
        Self {
            image_view,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::DONT_CARE,
            clear_depth: 1.0,
        }
    }

    #[inline]
    pub fn store(mut self) -> Self {
        self.store_op = vk::AttachmentStoreOp::STORE;
        self
    }

    pub fn to_rendering_attachment_info(&self) -> vk::RenderingAttachmentInfo<'static> {
        vk::RenderingAttachmentInfo::default()
            .image_view(self.image_view)
            .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
            .load_op(self.load_op)
            .store_op(self.store_op)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: self.clear_depth,
                    stencil: 0,
                },
            })
    }
}

/// Render area and attachments of one dynamic rendering pass.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderingConfig {
    pub render_area: vk::Rect2D,
    pub color_attachments: Vec<ColorAttachment>,
    pub depth_attachment: Option<DepthAttachment>,
}

impl RenderingConfig {
    /// Full-target render area of `width` x `height` at the origin.
    pub fn new(width: u32, height: u32) -> Self {
        Self::from_extent(vk::Extent2D { width, height })
    }

    pub fn from_extent(extent: vk::Extent2D) -> Self {
        Self {
            render_area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            },
            color_attachments: Vec::new(),
            depth_attachment: None,
        }
    }

    pub fn with_color_attachment(mut self, attachment: ColorAttachment) -> Self {
        self.color_attachments.push(attachment);
        self
    }

    pub fn with_depth_attachment(mut self, attachment: DepthAttachment) -> Self {
        self.depth_attachment = Some(attachment);
        self
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.render_area.extent
    }

    /// Viewport covering the render area with depth range `[0, 1]`.
    pub fn viewport(&self) -> vk::Viewport {
        vk::Viewport {
            x: self.render_area.offset.x as f32,
            y: self.render_area.offset.y as f32,
            width: self.render_area.extent.width as f32,
            height: self.render_area.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    /// Creates the backing storage for `VkRenderingInfo`.
    pub fn build(&self) -> RenderingInfoBundle {
        RenderingInfoBundle::new(self)
    }
}

/// Owns the attachment infos a `VkRenderingInfo` points at.
pub struct RenderingInfoBundle {
    color_attachments: Vec<vk::RenderingAttachmentInfo<'static>>,
    depth_attachment: Option<vk::RenderingAttachmentInfo<'static>>,
    render_area: vk::Rect2D,
}

impl RenderingInfoBundle {
    pub fn new(config: &RenderingConfig) -> Self {
        Self {
            color_attachments: config
                .color_attachments
                .iter()
                .map(|a| a.to_rendering_attachment_info())
                .collect(),
            depth_attachment: config
                .depth_attachment
                .as_ref()
                .map(|a| a.to_rendering_attachment_info()),
            render_area: config.render_area,
        }
    }

    /// Returns the `VkRenderingInfo` referencing this bundle's data.
    pub fn info(&self) -> vk::RenderingInfo<'_> {
        let mut info = vk::RenderingInfo::default()
            .render_area(self.render_area)
            .layer_count(1)
            .color_attachments(&self.color_attachments);

        if let Some(ref depth) = self.depth_attachment {
            info = info.depth_attachment(depth);
        }

        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_attachment_default() {
        let attachment = ColorAttachment::new(vk::ImageView::null());
        assert_eq!(attachment.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(attachment.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(attachment.clear_color, [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_color_attachment_load() {
        let attachment = ColorAttachment::new(vk::ImageView::null()).load();
        assert_eq!(attachment.load_op, vk::AttachmentLoadOp::LOAD);
        let info = attachment.to_rendering_attachment_info();
        assert_eq!(info.load_op, vk::AttachmentLoadOp::LOAD);
        assert_eq!(info.image_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    }

    #[test]
    fn test_depth_attachment_default_and_store() {
        let attachment = DepthAttachment::new(vk::ImageView::null());
        assert_eq!(attachment.store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(attachment.clear_depth, 1.0);

        let info = attachment.store().to_rendering_attachment_info();
        assert_eq!(info.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(info.image_layout, vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL);
        let depth = unsafe { info.clear_value.depth_stencil.depth };
        assert_eq!(depth, 1.0);
    }

    #[test]
    fn test_depth_only_bundle() {
        let config = RenderingConfig::new(2048, 2048)
            .with_depth_attachment(DepthAttachment::new(vk::ImageView::null()).store());
        let bundle = config.build();
        let info = bundle.info();
        assert_eq!(info.color_attachment_count, 0);
        assert!(!info.p_depth_attachment.is_null());
        assert_eq!(info.render_area.extent.width, 2048);
        assert_eq!(info.layer_count, 1);
    }

    #[test]
    fn test_viewport_matches_render_area() {
        let config = RenderingConfig::new(512, 512);
        let viewport = config.viewport();
        assert_eq!(viewport.width, 512.0);
        assert_eq!(viewport.height, 512.0);
        assert_eq!(viewport.min_depth, 0.0);
        assert_eq!(viewport.max_depth, 1.0);
    }
}
