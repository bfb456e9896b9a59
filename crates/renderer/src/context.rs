//! Graphics context: instance, surface, physical and logical device.
//!
//! Created once at startup and passed by reference to whatever needs the
//! device. Every GPU resource holds an `Arc<Device>` back-reference, so the
//! context must be the last owner when it is dropped; this is checked in
//! debug builds.

use std::mem::ManuallyDrop;
use std::sync::Arc;

use tracing::{debug, error, info};

use renderer_platform::{Surface, Window};
use renderer_rhi::device::Device;
use renderer_rhi::instance::Instance;
use renderer_rhi::physical_device::select_physical_device;

use crate::error::RendererResult;

/// Owner of the device and everything it was created from.
///
/// # Destruction Order
///
/// 1. Surface
/// 2. Device (with its allocator)
/// 3. Instance
pub struct GraphicsContext {
    instance: ManuallyDrop<Instance>,
    surface: ManuallyDrop<Surface>,
    device: ManuallyDrop<Arc<Device>>,
}

impl GraphicsContext {
    /// Creates the instance with the window's surface extensions, the
    /// surface, and a device that can present to it.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails; nothing is retried.
    pub fn new(window: &Window, enable_validation: bool) -> RendererResult<Self> {
        let extensions = window.surface_extensions()?;
        let instance = Instance::new(enable_validation, &extensions)?;
        let surface = window.create_surface(instance.entry(), instance.handle())?;

        let physical_device =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(&instance, &physical_device)?;

        info!(
            "Graphics context ready on {} (validation: {})",
            device.name(),
            enable_validation
        );

        Ok(Self {
            instance: ManuallyDrop::new(instance),
            surface: ManuallyDrop::new(surface),
            device: ManuallyDrop::new(device),
        })
    }

    #[inline]
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    #[inline]
    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }
}

impl Drop for GraphicsContext {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during context drop: {:?}", e);
        }

        debug_assert_eq!(
            Arc::strong_count(&self.device),
            1,
            "GPU resources outlived the graphics context"
        );

        // SAFETY: each field is dropped exactly once, in dependency order,
        // and never used afterwards.
        unsafe {
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.instance);
        }

        debug!("Graphics context destroyed");
    }
}
