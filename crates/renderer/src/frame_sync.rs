//! Frame synchronization: frames in flight and their GPU wait primitives.
//!
//! The controller owns `frames_in_flight` frame slots. Slot selection and
//! fence handling live in [`FramePacer`], which only needs a [`FrameFence`],
//! so the pacing rules can be exercised without a device.
//!
//! # Synchronization Flow
//!
//! ```text
//! 1. acquire_slot: wait on the slot fence, reset it, reset the slot's descriptor pool
//! 2. acquire swapchain image (signals the slot's image-available semaphore)
//! 3. record into the slot's command buffer
//! 4. submit: wait image-available, signal render-finished[image] and the slot fence
//! 5. present (waits render-finished[image])
//! 6. advance
//! ```
//!
//! If anything between steps 1 and 4 fails, or step 2 yields no image, the
//! slot is handed back with
//! [`discard_acquired`](FrameSyncController::discard_acquired), which re-arms
//! the already reset fence so the next wait on it returns. The next acquire
//! of that slot is fresh again and resets its descriptor pool.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use renderer_rhi::command::{CommandBuffer, CommandPool};
use renderer_rhi::descriptor::DescriptorPool;
use renderer_rhi::device::Device;
use renderer_rhi::sync::{FENCE_TIMEOUT_NS, Fence, Semaphore};
use renderer_rhi::{RhiError, RhiResult};

/// Supported range of frames in flight.
pub const MAX_FRAMES_IN_FLIGHT: usize = 3;

/// CPU-visible completion signal of a frame slot.
pub trait FrameFence {
    /// Blocks until signaled; a timeout is an error.
    fn wait(&self, timeout_ns: u64) -> RhiResult<()>;

    /// Returns the fence to the unsignaled state.
    fn reset(&self) -> RhiResult<()>;

    /// Signals the fence once all previously submitted work is done, without
    /// submitting new work.
    fn rearm(&self) -> RhiResult<()>;
}

/// A [`Fence`] bound to the graphics queue it is submitted on.
pub struct QueueFence {
    device: Arc<Device>,
    fence: Fence,
}

impl QueueFence {
    /// Creates a signaled fence so the first wait on a fresh slot returns.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let fence = Fence::new(device.clone(), true)?;
        Ok(Self { device, fence })
    }

    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence.handle()
    }
}

impl FrameFence for QueueFence {
    fn wait(&self, timeout_ns: u64) -> RhiResult<()> {
        self.fence.wait(timeout_ns)
    }

    fn reset(&self) -> RhiResult<()> {
        self.fence.reset()
    }

    fn rearm(&self) -> RhiResult<()> {
        // An empty submission signals the fence when the queue drains.
        unsafe { self.device.submit_graphics(&[], self.fence.handle()) }
    }
}

/// Result of [`FramePacer::acquire`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotAcquire {
    pub slot: usize,
    /// The slot's fence was waited on and reset by this call; resources the
    /// slot's previous frame used are free for reuse.
    pub fresh: bool,
}

/// Frame counter and per-slot fences.
///
/// Slot `n % frames_in_flight` is handed out for frame `n` only after the
/// fence of frame `n - frames_in_flight` has been observed signaled.
#[derive(Debug)]
pub struct FramePacer<F> {
    fences: Vec<F>,
    frame: u64,
    acquired: Option<usize>,
}

impl<F: FrameFence> FramePacer<F> {
    /// # Errors
    ///
    /// [`RhiError::InvalidHandle`] if `fences` is empty.
    pub fn new(fences: Vec<F>) -> RhiResult<Self> {
        if fences.is_empty() {
            return Err(RhiError::InvalidHandle(
                "Frame pacer needs at least one fence".to_string(),
            ));
        }
        Ok(Self {
            fences,
            frame: 0,
            acquired: None,
        })
    }

    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.fences.len()
    }

    /// Number of frames submitted so far.
    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Slot used by the current frame.
    #[inline]
    pub fn current_slot(&self) -> usize {
        (self.frame % self.fences.len() as u64) as usize
    }

    /// Slot acquired and not yet advanced past or discarded.
    #[inline]
    pub fn acquired(&self) -> Option<usize> {
        self.acquired
    }

    #[inline]
    pub fn fence(&self, slot: usize) -> &F {
        &self.fences[slot]
    }

    /// Waits for the current slot's previous submission and resets its fence.
    ///
    /// Acquiring twice without [`advance`](Self::advance) or
    /// [`discard`](Self::discard) returns the same slot without waiting, and
    /// not `fresh`.
    ///
    /// # Errors
    ///
    /// [`RhiError::FenceTimeout`] or [`RhiError::DeviceLost`] from the wait,
    /// both fatal. The slot is not acquired in that case.
    pub fn acquire(&mut self) -> RhiResult<SlotAcquire> {
        if let Some(slot) = self.acquired {
            return Ok(SlotAcquire { slot, fresh: false });
        }
        let slot = self.current_slot();
        let fence = &self.fences[slot];
        fence.wait(FENCE_TIMEOUT_NS)?;
        fence.reset()?;
        self.acquired = Some(slot);
        Ok(SlotAcquire { slot, fresh: true })
    }

    /// Finishes the acquired frame; the next acquire uses the next slot.
    pub fn advance(&mut self) {
        if self.acquired.take().is_none() {
            warn!("Advancing frame {} without an acquired slot", self.frame);
        }
        self.frame += 1;
    }

    /// Gives back an acquired slot that was never submitted, either because
    /// no image was available or because the frame failed before submission.
    ///
    /// The frame counter does not move, so the next acquire returns the same
    /// slot; its fence is re-armed so that acquire does not block.
    pub fn discard(&mut self) -> RhiResult<()> {
        if let Some(slot) = self.acquired.take() {
            debug!("Discarding frame slot {} (frame {})", slot, self.frame);
            self.fences[slot].rearm()?;
        }
        Ok(())
    }
}

/// GPU resources owned by one frame slot.
pub struct FrameSlot {
    // Field order is drop order: the buffer is freed by its pool.
    command_buffer: CommandBuffer,
    command_pool: CommandPool,
    descriptor_pool: DescriptorPool,
    image_available: Semaphore,
}

impl FrameSlot {
    fn new(device: &Arc<Device>, queue_family: u32, descriptor_sets: u32) -> RhiResult<Self> {
        let command_pool = CommandPool::new(device.clone(), queue_family)?;
        let command_buffer = CommandBuffer::new(device.clone(), &command_pool)?;
        let descriptor_pool = DescriptorPool::new(
            device.clone(),
            descriptor_sets,
            &DescriptorPool::default_sizes(descriptor_sets),
        )?;
        let image_available = Semaphore::new(device.clone())?;
        Ok(Self {
            command_buffer,
            command_pool,
            descriptor_pool,
            image_available,
        })
    }

    #[inline]
    pub fn command_buffer(&self) -> &CommandBuffer {
        &self.command_buffer
    }

    /// Pool for this frame's descriptor sets; reset on every acquire.
    #[inline]
    pub fn descriptor_pool(&self) -> &DescriptorPool {
        &self.descriptor_pool
    }

    /// Semaphore the swapchain signals when the acquired image is available.
    #[inline]
    pub fn image_available(&self) -> vk::Semaphore {
        self.image_available.handle()
    }
}

/// Frame Synchronization Controller.
///
/// Not thread-safe; the render thread owns it.
pub struct FrameSyncController {
    device: Arc<Device>,
    slots: Vec<FrameSlot>,
    pacer: FramePacer<QueueFence>,
    /// One per swapchain image; presentation of image `i` waits on entry `i`.
    render_finished: Vec<Semaphore>,
}

impl FrameSyncController {
    /// Creates `frames_in_flight` slots (clamped to `1..=MAX_FRAMES_IN_FLIGHT`)
    /// and one render-finished semaphore per swapchain image.
    ///
    /// # Errors
    ///
    /// Returns an error if any resource creation fails.
    pub fn new(
        device: Arc<Device>,
        frames_in_flight: usize,
        swapchain_image_count: usize,
        descriptor_sets_per_frame: u32,
    ) -> RhiResult<Self> {
        let count = frames_in_flight.clamp(1, MAX_FRAMES_IN_FLIGHT);
        let queue_family = device
            .queue_families()
            .graphics_family
            .ok_or(RhiError::NoSuitableGpu)?;

        let mut slots = Vec::with_capacity(count);
        let mut fences = Vec::with_capacity(count);
        for i in 0..count {
            slots.push(FrameSlot::new(&device, queue_family, descriptor_sets_per_frame)?);
            fences.push(QueueFence::new(device.clone())?);
            debug!("Created frame slot {}", i);
        }

        let render_finished = Self::create_semaphores(&device, swapchain_image_count)?;

        info!(
            "Frame sync controller created with {} frame(s) in flight, {} swapchain image(s)",
            count, swapchain_image_count
        );

        Ok(Self {
            pacer: FramePacer::new(fences)?,
            device,
            slots,
            render_finished,
        })
    }

    fn create_semaphores(device: &Arc<Device>, count: usize) -> RhiResult<Vec<Semaphore>> {
        (0..count).map(|_| Semaphore::new(device.clone())).collect()
    }

    /// Waits until the current slot is free, then resets its fence and
    /// descriptor pool.
    ///
    /// # Errors
    ///
    /// A fence timeout or device loss; both are fatal.
    pub fn acquire_slot(&mut self) -> RhiResult<usize> {
        let SlotAcquire { slot, fresh } = self.pacer.acquire()?;
        if fresh {
            self.slots[slot].descriptor_pool.reset()?;
        }
        Ok(slot)
    }

    #[inline]
    pub fn slot(&self, slot: usize) -> &FrameSlot {
        &self.slots[slot]
    }

    /// Render-finished semaphore for swapchain image `image_index`.
    #[inline]
    pub fn render_finished(&self, image_index: u32) -> vk::Semaphore {
        self.render_finished[image_index as usize].handle()
    }

    /// Submits `command_buffer`, waiting on `wait_semaphore` at color output
    /// and signaling `signal_semaphore` and the acquired slot's fence.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidHandle`] if no slot is acquired, or the submit error.
    pub fn submit(
        &self,
        command_buffer: vk::CommandBuffer,
        wait_semaphore: vk::Semaphore,
        signal_semaphore: vk::Semaphore,
    ) -> RhiResult<()> {
        let slot = self.pacer.acquired().ok_or_else(|| {
            RhiError::InvalidHandle("Submit without an acquired frame slot".to_string())
        })?;

        let wait = [vk::SemaphoreSubmitInfo::default()
            .semaphore(wait_semaphore)
            .stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)];
        let signal = [vk::SemaphoreSubmitInfo::default()
            .semaphore(signal_semaphore)
            .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)];
        let command_buffers = [vk::CommandBufferSubmitInfo::default().command_buffer(command_buffer)];

        let submit = vk::SubmitInfo2::default()
            .wait_semaphore_infos(&wait)
            .command_buffer_infos(&command_buffers)
            .signal_semaphore_infos(&signal);

        unsafe {
            self.device
                .submit_graphics(&[submit], self.pacer.fence(slot).handle())
        }
    }

    /// Moves on to the next frame slot.
    #[inline]
    pub fn advance(&mut self) {
        self.pacer.advance();
    }

    /// Hands back the acquired slot when the frame ends before submission.
    /// Does nothing if no slot is acquired.
    ///
    /// # Errors
    ///
    /// Returns an error if re-arming the fence fails.
    pub fn discard_acquired(&mut self) -> RhiResult<()> {
        self.pacer.discard()
    }

    /// Replaces every semaphore after the swapchain was recreated.
    ///
    /// An acquire that reported a stale swapchain may still have signaled its
    /// semaphore; fresh semaphores start unsignaled. The device must be idle.
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    pub fn on_swapchain_recreated(&mut self, swapchain_image_count: usize) -> RhiResult<()> {
        self.pacer.discard()?;
        for slot in &mut self.slots {
            slot.image_available = Semaphore::new(self.device.clone())?;
        }
        self.render_finished = Self::create_semaphores(&self.device, swapchain_image_count)?;
        debug!(
            "Recreated frame semaphores for {} swapchain image(s)",
            swapchain_image_count
        );
        Ok(())
    }

    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.pacer.frames_in_flight()
    }

    /// Frames submitted since creation.
    #[inline]
    pub fn frame_count(&self) -> u64 {
        self.pacer.frame()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Op {
        Wait(usize),
        Reset(usize),
        Rearm(usize),
        Signal(usize),
    }

    type Log = Rc<RefCell<Vec<Op>>>;

    /// Fence whose wait fails unless something signaled it.
    struct FakeFence {
        id: usize,
        signaled: Cell<bool>,
        log: Log,
    }

    impl FakeFence {
        fn gpu_complete(&self) {
            self.signaled.set(true);
            self.log.borrow_mut().push(Op::Signal(self.id));
        }
    }

    impl FrameFence for FakeFence {
        fn wait(&self, timeout_ns: u64) -> RhiResult<()> {
            self.log.borrow_mut().push(Op::Wait(self.id));
            if self.signaled.get() {
                Ok(())
            } else {
                Err(RhiError::FenceTimeout { timeout_ns })
            }
        }

        fn reset(&self) -> RhiResult<()> {
            self.signaled.set(false);
            self.log.borrow_mut().push(Op::Reset(self.id));
            Ok(())
        }

        fn rearm(&self) -> RhiResult<()> {
            self.signaled.set(true);
            self.log.borrow_mut().push(Op::Rearm(self.id));
            Ok(())
        }
    }

    fn pacer(count: usize) -> (FramePacer<FakeFence>, Log) {
        let log: Log = Rc::default();
        let fences = (0..count)
            .map(|id| FakeFence {
                id,
                signaled: Cell::new(true),
                log: log.clone(),
            })
            .collect();
        (FramePacer::new(fences).unwrap(), log)
    }

    #[test]
    fn test_empty_pacer_rejected() {
        assert!(FramePacer::<FakeFence>::new(Vec::new()).is_err());
    }

    #[test]
    fn test_slots_rotate() {
        let (mut pacer, log) = pacer(2);
        let mut slots = Vec::new();
        for _ in 0..4 {
            let slot = pacer.acquire().unwrap().slot;
            slots.push(slot);
            pacer.fence(slot).gpu_complete();
            pacer.advance();
        }
        assert_eq!(slots, vec![0, 1, 0, 1]);
        assert_eq!(pacer.frame(), 4);
        assert_eq!(
            &log.borrow()[..3],
            &[Op::Wait(0), Op::Reset(0), Op::Signal(0)]
        );
    }

    #[test]
    fn test_slot_not_reused_before_previous_submission_signals() {
        let frames_in_flight = 3;
        let (mut pacer, log) = pacer(frames_in_flight);
        // The GPU finishes frame n only when frame n + frames_in_flight - 1 is submitted.
        let mut submitted: Vec<usize> = Vec::new();
        for n in 0..12 {
            let slot = pacer.acquire().unwrap().slot;
            assert_eq!(slot, n % frames_in_flight);
            submitted.push(slot);
            if n + 1 >= frames_in_flight {
                pacer.fence(submitted[n + 1 - frames_in_flight]).gpu_complete();
            }
            pacer.advance();
        }

        // Every reset of a slot follows a successful wait, which follows the
        // signal of that slot's previous submission.
        let log = log.borrow();
        for (i, op) in log.iter().enumerate() {
            if let Op::Reset(slot) = *op {
                assert_eq!(log[i - 1], Op::Wait(slot));
                let previous_reset = log[..i - 1].iter().rposition(|o| *o == Op::Reset(slot));
                if let Some(prev) = previous_reset {
                    assert!(
                        log[prev..i].contains(&Op::Signal(slot)),
                        "slot {slot} reset at {i} without completion"
                    );
                }
            }
        }
    }

    #[test]
    fn test_wait_timeout_is_fatal_and_not_acquired() {
        let (mut pacer, _log) = pacer(2);
        pacer.acquire().unwrap();
        pacer.advance();
        pacer.acquire().unwrap();
        pacer.advance();

        // Slot 0 was submitted but never completed.
        let err = pacer.acquire().unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(pacer.acquired(), None);
        assert_eq!(pacer.frame(), 2);
    }

    #[test]
    fn test_discard_does_not_deadlock_next_acquire() {
        let (mut pacer, log) = pacer(2);
        let slot = pacer.acquire().unwrap().slot;
        pacer.discard().unwrap();

        assert_eq!(pacer.frame(), 0);
        assert_eq!(pacer.acquire().unwrap().slot, slot);
        assert_eq!(
            *log.borrow(),
            vec![
                Op::Wait(0),
                Op::Reset(0),
                Op::Rearm(0),
                Op::Wait(0),
                Op::Reset(0)
            ]
        );
    }

    #[test]
    fn test_discard_without_acquire_is_noop() {
        let (mut pacer, log) = pacer(2);
        pacer.discard().unwrap();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_double_acquire_returns_same_slot() {
        let (mut pacer, log) = pacer(2);
        assert_eq!(pacer.acquire().unwrap(), SlotAcquire { slot: 0, fresh: true });
        assert_eq!(pacer.acquire().unwrap(), SlotAcquire { slot: 0, fresh: false });
        assert_eq!(log.borrow().len(), 2);
    }

    #[test]
    fn test_failed_frame_discard_makes_next_acquire_fresh() {
        let (mut pacer, log) = pacer(2);
        let first = pacer.acquire().unwrap();
        assert!(first.fresh);

        // Recording or submission failed; the frame hands its slot back.
        pacer.discard().unwrap();
        assert_eq!(pacer.acquired(), None);

        let retry = pacer.acquire().unwrap();
        assert_eq!(retry, SlotAcquire { slot: first.slot, fresh: true });
        assert_eq!(pacer.frame(), 0);
        assert_eq!(
            &log.borrow()[2..],
            &[Op::Rearm(0), Op::Wait(0), Op::Reset(0)]
        );

        // The retried frame completes normally.
        pacer.fence(retry.slot).gpu_complete();
        pacer.advance();
        assert_eq!(pacer.acquire().unwrap(), SlotAcquire { slot: 1, fresh: true });
    }
}
