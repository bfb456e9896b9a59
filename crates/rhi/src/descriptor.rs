//! Descriptor set management for shader resource binding.
//!
//! - [`DescriptorSetLayout`] defines the layout of shader bindings
//! - [`DescriptorPool`] allocates descriptor sets; the renderer keeps one per
//!   frame slot and resets it once that slot's fence has signaled
//! - [`DescriptorWrite`] / [`write_descriptor_sets`] bind buffers and sampled
//!   images to allocated sets
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use renderer_rhi::device::Device;
//! use renderer_rhi::descriptor::{binding, DescriptorPool, DescriptorSetLayout};
//!
//! # fn example(device: Arc<Device>) -> Result<(), renderer_rhi::RhiError> {
//! let layout = DescriptorSetLayout::new(
//!     device.clone(),
//!     &[
//!         binding::uniform_buffer(0, vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT),
//!         binding::combined_image_sampler(1, vk::ShaderStageFlags::FRAGMENT),
//!     ],
//! )?;
//!
//! let pool = DescriptorPool::new(device.clone(), 16, &DescriptorPool::default_sizes(16))?;
//! let sets = pool.allocate(&[layout.handle()])?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, trace};

use crate::device::Device;
use crate::error::RhiResult;

/// Descriptor set layout wrapper.
pub struct DescriptorSetLayout {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    /// Creates a new descriptor set layout.
    ///
    /// # Errors
    ///
    /// Returns an error if layout creation fails.
    pub fn new(
        device: Arc<Device>,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);

        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };

        debug!(
            "Created descriptor set layout with {} binding(s)",
            bindings.len()
        );

        Ok(Self { device, layout })
    }

    /// Returns the Vulkan descriptor set layout handle.
    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
        debug!("Destroyed descriptor set layout");
    }
}

/// Descriptor pool for allocating descriptor sets.
///
/// Sets are never freed individually; the whole pool is [`reset`](Self::reset)
/// when the GPU is done with every set allocated from it.
///
/// # Thread Safety
///
/// Descriptor pool operations are not thread-safe. Synchronize access
/// externally when sharing between threads.
pub struct DescriptorPool {
    device: Arc<Device>,
    pool: vk::DescriptorPool,
    max_sets: u32,
}

impl DescriptorPool {
    /// Creates a new descriptor pool.
    ///
    /// # Errors
    ///
    /// Returns an error if pool creation fails.
    pub fn new(
        device: Arc<Device>,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);

        let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };

        debug!(
            "Created descriptor pool: max_sets={}, pool_sizes={}",
            max_sets,
            pool_sizes.len()
        );

        Ok(Self {
            device,
            pool,
            max_sets,
        })
    }

    /// Pool sizes covering `max_sets` sets of one uniform buffer plus one
    /// combined image sampler each.
    pub fn default_sizes(max_sets: u32) -> [vk::DescriptorPoolSize; 2] {
        [
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(max_sets),
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(max_sets),
        ]
    }

    /// Allocates one descriptor set per layout.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails (e.g., pool exhausted).
    pub fn allocate(
        &self,
        layouts: &[vk::DescriptorSetLayout],
    ) -> RhiResult<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        let sets = unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info)? };

        trace!("Allocated {} descriptor set(s)", sets.len());

        Ok(sets)
    }

    /// Returns every allocated set to the pool.
    ///
    /// The caller must ensure no set from this pool is still referenced by
    /// a pending command buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset fails.
    pub fn reset(&self) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .reset_descriptor_pool(self.pool, vk::DescriptorPoolResetFlags::empty())?;
        }

        trace!("Reset descriptor pool");

        Ok(())
    }

    /// Returns the Vulkan descriptor pool handle.
    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    #[inline]
    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_pool(self.pool, None);
        }
        debug!("Destroyed descriptor pool");
    }
}

/// A resource bound to one descriptor binding.
#[derive(Debug, Clone, Copy)]
pub enum DescriptorResource {
    UniformBuffer {
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
    },
    CombinedImageSampler {
        sampler: vk::Sampler,
        view: vk::ImageView,
        layout: vk::ImageLayout,
    },
}

impl DescriptorResource {
    /// Descriptor type this resource is written as.
    pub fn descriptor_type(&self) -> vk::DescriptorType {
        match self {
            DescriptorResource::UniformBuffer { .. } => vk::DescriptorType::UNIFORM_BUFFER,
            DescriptorResource::CombinedImageSampler { .. } => {
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER
            }
        }
    }
}

/// One pending descriptor update.
#[derive(Debug, Clone, Copy)]
pub struct DescriptorWrite {
    pub set: vk::DescriptorSet,
    pub binding: u32,
    pub resource: DescriptorResource,
}

impl DescriptorWrite {
    /// Whole-buffer uniform binding.
    pub fn uniform_buffer(set: vk::DescriptorSet, binding: u32, buffer: vk::Buffer) -> Self {
        Self {
            set,
            binding,
            resource: DescriptorResource::UniformBuffer {
                buffer,
                offset: 0,
                range: vk::WHOLE_SIZE,
            },
        }
    }

    /// Sampled image in `SHADER_READ_ONLY_OPTIMAL`.
    pub fn sampled_image(
        set: vk::DescriptorSet,
        binding: u32,
        view: vk::ImageView,
        sampler: vk::Sampler,
    ) -> Self {
        Self {
            set,
            binding,
            resource: DescriptorResource::CombinedImageSampler {
                sampler,
                view,
                layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            },
        }
    }
}

/// Applies a batch of descriptor writes.
pub fn write_descriptor_sets(device: &Device, writes: &[DescriptorWrite]) {
    if writes.is_empty() {
        return;
    }

    // Info structs must outlive the WriteDescriptorSet borrows.
    let buffer_infos: Vec<vk::DescriptorBufferInfo> = writes
        .iter()
        .map(|w| match w.resource {
            DescriptorResource::UniformBuffer {
                buffer,
                offset,
                range,
            } => vk::DescriptorBufferInfo::default()
                .buffer(buffer)
                .offset(offset)
                .range(range),
            DescriptorResource::CombinedImageSampler { .. } => vk::DescriptorBufferInfo::default(),
        })
        .collect();
    let image_infos: Vec<vk::DescriptorImageInfo> = writes
        .iter()
        .map(|w| match w.resource {
            DescriptorResource::CombinedImageSampler {
                sampler,
                view,
                layout,
            } => vk::DescriptorImageInfo::default()
                .sampler(sampler)
                .image_view(view)
                .image_layout(layout),
            DescriptorResource::UniformBuffer { .. } => vk::DescriptorImageInfo::default(),
        })
        .collect();

    let vk_writes: Vec<vk::WriteDescriptorSet> = writes
        .iter()
        .enumerate()
        .map(|(i, w)| {
            let write = vk::WriteDescriptorSet::default()
                .dst_set(w.set)
                .dst_binding(w.binding)
                .dst_array_element(0)
                .descriptor_type(w.resource.descriptor_type());
            match w.resource {
                DescriptorResource::UniformBuffer { .. } => {
                    write.buffer_info(std::slice::from_ref(&buffer_infos[i]))
                }
                DescriptorResource::CombinedImageSampler { .. } => {
                    write.image_info(std::slice::from_ref(&image_infos[i]))
                }
            }
        })
        .collect();

    unsafe {
        device.handle().update_descriptor_sets(&vk_writes, &[]);
    }

    trace!("Updated {} descriptor binding(s)", vk_writes.len());
}

/// Layout binding constructors.
pub mod binding {
    use ash::vk;

    pub fn uniform_buffer(
        binding: u32,
        stages: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(stages)
    }

    pub fn combined_image_sampler(
        binding: u32,
        stages: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(1)
            .stage_flags(stages)
    }
}
