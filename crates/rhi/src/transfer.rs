//! Blocking host-to-device buffer uploads.
//!
//! Data is written into a host-visible staging buffer, copied into a
//! device-local buffer with a one-shot command buffer on the graphics queue,
//! and the call returns only after a fence confirms the copy finished. The
//! returned buffer can therefore be bound for drawing right away.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::buffer::{Buffer, BufferUsage};
use crate::command::{CommandBuffer, CommandPool};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::sync::{FENCE_TIMEOUT_NS, Fence};

/// Uploads several byte slices into fresh device-local buffers with one submission.
///
/// All-or-nothing: on error no buffer is returned.
///
/// # Errors
///
/// Returns an error if any slice is empty, a usage is host visible, or any
/// allocation, submission or wait fails.
pub fn upload_buffers(
    device: &Arc<Device>,
    uploads: &[(BufferUsage, &[u8], &str)],
) -> RhiResult<Vec<Buffer>> {
    let queue_family = device
        .queue_families()
        .graphics_family
        .ok_or(RhiError::NoSuitableGpu)?;

    let mut staged = Vec::with_capacity(uploads.len());
    for &(usage, data, label) in uploads {
        if usage.is_host_visible() {
            return Err(RhiError::InvalidHandle(format!(
                "Upload target '{label}' must be device local, got {}",
                usage.name()
            )));
        }
        let staging = Buffer::new_with_data(
            device.clone(),
            BufferUsage::Staging,
            data,
            &format!("{label} staging"),
        )?;
        let target = Buffer::new(device.clone(), usage, data.len() as vk::DeviceSize, label)?;
        staged.push((staging, target));
    }

    let pool = CommandPool::new_transient(device.clone(), queue_family)?;
    let cmd = CommandBuffer::new(device.clone(), &pool)?;

    cmd.begin()?;
    for (staging, target) in &staged {
        let region = vk::BufferCopy::default().size(staging.size());
        cmd.copy_buffer(staging.handle(), target.handle(), &[region]);
    }
    cmd.memory_barrier(
        &vk::MemoryBarrier2::default()
            .src_stage_mask(vk::PipelineStageFlags2::ALL_TRANSFER)
            .src_access_mask(vk::AccessFlags2::TRANSFER_WRITE)
            .dst_stage_mask(vk::PipelineStageFlags2::VERTEX_INPUT)
            .dst_access_mask(
                vk::AccessFlags2::VERTEX_ATTRIBUTE_READ | vk::AccessFlags2::INDEX_READ,
            ),
    );
    cmd.end()?;

    let fence = Fence::new(device.clone(), false)?;
    let command_buffers = [vk::CommandBufferSubmitInfo::default().command_buffer(cmd.handle())];
    let submit = vk::SubmitInfo2::default().command_buffer_infos(&command_buffers);
    unsafe { device.submit_graphics(&[submit], fence.handle())? };
    fence.wait(FENCE_TIMEOUT_NS)?;

    let total: usize = uploads.iter().map(|(_, data, _)| data.len()).sum();
    debug!("Uploaded {} buffer(s), {} bytes", staged.len(), total);

    Ok(staged.into_iter().map(|(_, target)| target).collect())
}
