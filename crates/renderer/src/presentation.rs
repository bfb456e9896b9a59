//! Presentation surface state.
//!
//! ```text
//! Valid --(resize / stale acquire / stale present)--> Invalid --recreate--> Valid
//! ```
//!
//! A zero-area window can neither render nor recreate, so the renderer skips
//! frames until the size is non-zero again.

use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceState {
    Valid,
    Invalid,
}

/// What the renderer does with the next frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameAction {
    Render,
    /// Minimized: do nothing this frame.
    Skip,
    /// Rebuild the swapchain and resolution targets at this size first.
    Recreate { width: u32, height: u32 },
}

/// Tracks window size against the swapchain.
#[derive(Clone, Copy, Debug)]
pub struct PresentationState {
    state: SurfaceState,
    width: u32,
    height: u32,
}

impl PresentationState {
    /// The swapchain was just created at `width` x `height`.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            state: SurfaceState::Valid,
            width,
            height,
        }
    }

    #[inline]
    pub fn state(&self) -> SurfaceState {
        self.state
    }

    #[inline]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    pub fn is_minimized(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Records a new window size. Any change invalidates the swapchain.
    pub fn resize(&mut self, width: u32, height: u32) {
        if (width, height) != (self.width, self.height) {
            debug!(
                "Surface resized: {}x{} -> {}x{}",
                self.width, self.height, width, height
            );
            self.width = width;
            self.height = height;
            self.state = SurfaceState::Invalid;
        }
    }

    /// Records a resize the caller wants applied right away.
    ///
    /// Returns `true` if the swapchain can be rebuilt now. A minimized
    /// window returns `false` and the surface stays invalid, so the rebuild
    /// happens through [`next_action`](Self::next_action) once the size is
    /// non-zero again.
    pub fn resize_now(&mut self, width: u32, height: u32) -> bool {
        self.resize(width, height);
        !self.is_minimized()
    }

    /// Acquire or present reported an out-of-date or suboptimal swapchain.
    pub fn invalidate(&mut self) {
        self.state = SurfaceState::Invalid;
    }

    pub fn next_action(&self) -> FrameAction {
        if self.is_minimized() {
            return FrameAction::Skip;
        }
        match self.state {
            SurfaceState::Valid => FrameAction::Render,
            SurfaceState::Invalid => FrameAction::Recreate {
                width: self.width,
                height: self.height,
            },
        }
    }

    /// The swapchain was rebuilt at `width` x `height`.
    pub fn recreated(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.state = SurfaceState::Valid;
    }
}
