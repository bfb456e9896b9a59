//! Frame orchestration.
//!
//! [`Renderer`] runs one frame as
//!
//! ```text
//! presentation check -> acquire slot -> acquire image -> write uniforms
//!     -> allocate descriptor sets -> record -> submit -> present
//! ```
//!
//! A failed image acquire or a stale present marks the surface invalid; the
//! swapchain and everything sized like it are rebuilt on the next frame with
//! a non-zero window size.
//!
//! A frame that ends between slot acquisition and submission, with no image
//! or with an error, hands its slot back and invalidates the surface. The
//! rebuild that follows replaces the frame semaphores, including an
//! image-available semaphore the abandoned acquire may have signaled.

use std::path::Path;

use ash::vk;
use tracing::{debug, error, info, warn};

use renderer_core::Config;
use renderer_platform::Window;
use renderer_rhi::buffer::{Buffer, BufferUsage};
use renderer_rhi::descriptor::{DescriptorWrite, write_descriptor_sets};
use renderer_rhi::sampler::Sampler;
use renderer_rhi::swapchain::Swapchain;
use renderer_scene::{Aabb, Camera, SceneCamera, ShadowLight};

use crate::context::GraphicsContext;
use crate::error::{RendererError, RendererResult};
use crate::frame_sync::FrameSyncController;
use crate::pass_graph::{Pass, RendererConfig};
use crate::pipelines::{DEFAULT_SHADER_DIR, PipelineLibrary, PipelineRef};
use crate::presentation::{FrameAction, PresentationState};
use crate::recorder::{CommandRecorder, FrameRecording, Target};
use crate::scene_manager::{GpuUpload, SceneManager};
use crate::targets::{ResolutionTargets, ShadowMap};
use crate::ubo::UniformParams;

/// Forward set plus the debug-quad set.
const DESCRIPTOR_SETS_PER_FRAME: u32 = 2;

/// What the caller wants drawn this frame.
#[derive(Clone, Copy, Debug)]
pub struct FrameView<'a> {
    pub camera: &'a Camera,
    pub light: &'a ShadowLight,
}

/// Owns every GPU object and drives frames.
///
/// # Destruction Order
///
/// Fields drop in declaration order; everything holding an `Arc<Device>`
/// drops before `context`, which is declared last.
pub struct Renderer {
    frame_sync: FrameSyncController,
    /// One uniform block per frame slot.
    uniforms: Vec<Buffer>,
    pipelines: PipelineLibrary,
    sampler: Sampler,
    shadow_map: ShadowMap,
    targets: ResolutionTargets,
    swapchain: Swapchain,
    scene: SceneManager,
    recorder: CommandRecorder,
    presentation: PresentationState,
    show_debug_quad: bool,
    animate_light_color: bool,
    /// Seconds of simulated time, fed to the uniform block.
    time: f32,
    context: GraphicsContext,
}

impl Renderer {
    /// Creates the graphics context and every renderer resource for
    /// `window`, then loads the configured scene.
    ///
    /// A scene that fails to load leaves the built-in triangle in place.
    ///
    /// # Errors
    ///
    /// Any context, swapchain, pipeline or resource creation failure.
    pub fn new(window: &Window, config: &Config, passes: RendererConfig) -> RendererResult<Self> {
        let context = GraphicsContext::new(window, config.renderer.validation)?;
        let device = context.device().clone();

        let swapchain = Swapchain::new(
            context.instance(),
            device.clone(),
            context.surface().handle(),
            window.width(),
            window.height(),
            config.window.vsync,
        )?;

        let frame_sync = FrameSyncController::new(
            device.clone(),
            config.renderer.frames_in_flight,
            swapchain.image_count() as usize,
            DESCRIPTOR_SETS_PER_FRAME,
        )?;

        let uniforms = (0..frame_sync.frames_in_flight())
            .map(|i| {
                Buffer::new(
                    device.clone(),
                    BufferUsage::Uniform,
                    UniformParams::SIZE as vk::DeviceSize,
                    &format!("uniform params {i}"),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let pipelines = PipelineLibrary::new(
            device.clone(),
            Path::new(DEFAULT_SHADER_DIR),
            swapchain.format(),
        )?;
        let sampler = Sampler::linear_clamp(device.clone())?;
        let shadow_map = ShadowMap::new(device.clone(), config.renderer.shadow_map_size)?;
        let targets = ResolutionTargets::new(device.clone(), swapchain.extent())?;

        let mut scene = SceneManager::new(GpuUpload::new(device))?;
        if let Some(path) = &config.scene.path {
            scene.load(path);
        }

        let extent = swapchain.extent();
        info!(
            "Renderer ready: {}x{}, passes {:?}",
            extent.width,
            extent.height,
            passes.passes()
        );

        Ok(Self {
            frame_sync,
            uniforms,
            pipelines,
            sampler,
            shadow_map,
            targets,
            swapchain,
            scene,
            recorder: CommandRecorder::new(passes),
            presentation: PresentationState::new(extent.width, extent.height),
            show_debug_quad: false,
            animate_light_color: false,
            time: 0.0,
            context,
        })
    }

    /// Loads a glTF scene. On failure the current scene stays.
    pub fn load_scene(&mut self, path: impl AsRef<Path>) -> bool {
        self.scene.load(path)
    }

    #[inline]
    pub fn scene_bounds(&self) -> Aabb {
        self.scene.bounds()
    }

    /// Cameras of the loaded scene, in asset order.
    #[inline]
    pub fn scene_cameras(&self) -> &[SceneCamera] {
        self.scene.cameras()
    }

    #[inline]
    pub fn config(&self) -> &RendererConfig {
        self.recorder.config()
    }

    /// Shows or hides the shadow map overlay. Has no effect unless the pass
    /// graph contains [`Pass::DebugQuad`].
    pub fn toggle_debug_quad(&mut self) {
        self.show_debug_quad = !self.show_debug_quad;
        if self.show_debug_quad && !self.config().contains(Pass::DebugQuad) {
            warn!("Debug quad requested but the pass graph has no '{}' pass", Pass::DebugQuad);
        }
        info!("Debug quad: {}", self.show_debug_quad);
    }

    /// Switches the forward pass between the base light color and a color
    /// cycling over time.
    pub fn toggle_light_color_animation(&mut self) {
        self.animate_light_color = !self.animate_light_color;
        info!("Animated light color: {}", self.animate_light_color);
    }

    /// Rebuilds every pipeline from the SPIR-V files on disk. On failure the
    /// previous pipelines remain.
    ///
    /// # Errors
    ///
    /// Device idle failure, or the shader or pipeline error.
    pub fn reload_shaders(&mut self) -> RendererResult<()> {
        self.context.device().wait_idle()?;
        self.pipelines.reload()?;
        info!("Shaders reloaded");
        Ok(())
    }

    /// Records a window resize. The swapchain is rebuilt lazily by the next
    /// frame, and not at all while the window is minimized.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.presentation.resize(width, height);
    }

    /// Rebuilds the swapchain and its dependents for `width` x `height` now.
    ///
    /// A zero-area size only records the resize; the rebuild happens once
    /// the size is non-zero again.
    ///
    /// # Errors
    ///
    /// Any recreation failure.
    pub fn recreate_swapchain(&mut self, width: u32, height: u32) -> RendererResult<()> {
        if !self.presentation.resize_now(width, height) {
            debug!("Not recreating swapchain for a minimized window");
            return Ok(());
        }
        self.rebuild_swapchain(width, height)
    }

    /// Draws and presents one frame.
    ///
    /// Returns `Ok` without drawing when the window is minimized or no image
    /// could be acquired.
    ///
    /// # Errors
    ///
    /// A fence timeout, device loss, surface loss, or a recording or
    /// submission failure; see [`RendererError::is_fatal`]. The frame slot is
    /// handed back before the error is returned.
    pub fn draw_frame(&mut self, view: FrameView<'_>, delta_secs: f32) -> RendererResult<()> {
        match self.presentation.next_action() {
            FrameAction::Skip => return Ok(()),
            FrameAction::Recreate { width, height } => self.rebuild_swapchain(width, height)?,
            FrameAction::Render => {}
        }

        self.time += delta_secs;

        let slot = self.frame_sync.acquire_slot()?;
        let result = self.render_slot(slot, view);
        if result.is_err()
            && let Err(e) = self.abandon_frame()
        {
            warn!("Failed to hand back frame slot {}: {}", slot, e);
        }
        result
    }

    /// Everything between slot acquisition and present for slot `slot`.
    fn render_slot(&mut self, slot: usize, view: FrameView<'_>) -> RendererResult<()> {
        let image_available = self.frame_sync.slot(slot).image_available();

        let Some(image) = self.swapchain.acquire_next(image_available)? else {
            debug!("Swapchain image unavailable, skipping frame");
            return self.abandon_frame();
        };

        let params = UniformParams::new(view.light.light_matrix(), view.light.position(), self.time)
            .with_animated_light_color(self.animate_light_color);
        self.uniforms[slot].write_pod(0, &params)?;

        let (forward_set, debug_quad_set) = self.allocate_descriptor_sets(slot)?;

        let extent = self.swapchain.extent();
        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        let pipelines = self.pipelines.pass_pipelines().ok_or_else(|| {
            RendererError::PassGraph("a pass in the graph has no pipeline".to_string())
        })?;

        let mut color_state = image.state();
        let depth = self.targets.depth_mut();
        let depth_view = depth.view();
        let depth_extent = depth.extent();
        let shadow_image = self.shadow_map.image_mut();
        let shadow_view = shadow_image.view();
        let shadow_extent = shadow_image.extent();

        let frame = FrameRecording {
            color: Target {
                state: &mut color_state,
                view: image.view,
                extent,
            },
            depth: Target {
                state: depth.state_mut(),
                view: depth_view,
                extent: depth_extent,
            },
            shadow_map: Target {
                state: shadow_image.state_mut(),
                view: shadow_view,
                extent: shadow_extent,
            },
            geometry: self.scene.geometry(),
            light_matrix: view.light.light_matrix(),
            camera_matrix: view.camera.view_projection_matrix(aspect),
            forward_set,
            debug_quad_set,
        };

        let command_buffer = self.frame_sync.slot(slot).command_buffer();
        self.recorder.record(command_buffer, &pipelines, frame)?;

        let render_finished = self.frame_sync.render_finished(image.index);
        self.frame_sync
            .submit(command_buffer.handle(), image_available, render_finished)?;
        self.frame_sync.advance();

        let outcome = self.swapchain.present(
            self.context.device().present_queue(),
            image.index,
            render_finished,
        )?;
        if outcome.is_stale() {
            debug!("Swapchain stale after present");
            self.presentation.invalidate();
        }

        Ok(())
    }

    /// Hands back a slot that will not be submitted and forces a swapchain
    /// rebuild before the next frame. A no-op for the slot once submitted.
    fn abandon_frame(&mut self) -> RendererResult<()> {
        self.presentation.invalidate();
        self.frame_sync.discard_acquired()?;
        Ok(())
    }

    fn pipeline(&self, pass: Pass) -> RendererResult<PipelineRef> {
        self.pipelines
            .get(pass.name())
            .ok_or_else(|| RendererError::PassGraph(format!("no pipeline for pass '{pass}'")))
    }

    fn allocate_descriptor_sets(
        &self,
        slot: usize,
    ) -> RendererResult<(vk::DescriptorSet, Option<vk::DescriptorSet>)> {
        let layout = self.pipeline(Pass::Forward)?.descriptor_layout;
        let count = if self.show_debug_quad { 2 } else { 1 };
        let sets = self
            .frame_sync
            .slot(slot)
            .descriptor_pool()
            .allocate(&vec![layout; count])?;

        let uniform = self.uniforms[slot].handle();
        let shadow_view = self.shadow_map.image().view();
        let writes: Vec<DescriptorWrite> = sets
            .iter()
            .flat_map(|&set| {
                [
                    DescriptorWrite::uniform_buffer(set, 0, uniform),
                    DescriptorWrite::sampled_image(set, 1, shadow_view, self.sampler.handle()),
                ]
            })
            .collect();
        write_descriptor_sets(self.context.device(), &writes);

        Ok((sets[0], sets.get(1).copied()))
    }

    /// Destroys and recreates everything sized like the swapchain.
    fn rebuild_swapchain(&mut self, width: u32, height: u32) -> RendererResult<()> {
        let device = self.context.device().clone();
        device.wait_idle()?;

        let old_format = self.swapchain.format();
        self.swapchain.recreate(
            self.context.instance(),
            self.context.surface().handle(),
            width,
            height,
        )?;

        self.targets = ResolutionTargets::new(device, self.swapchain.extent())?;
        if self.swapchain.format() != old_format {
            self.pipelines.set_color_format(self.swapchain.format())?;
        }
        self.frame_sync
            .on_swapchain_recreated(self.swapchain.image_count() as usize)?;

        let extent = self.swapchain.extent();
        self.presentation.recreated(width, height);
        info!(
            "Swapchain rebuilt: {}x{}, {} image(s)",
            extent.width,
            extent.height,
            self.swapchain.image_count()
        );
        Ok(())
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    #[inline]
    pub fn frame_count(&self) -> u64 {
        self.frame_sync.frame_count()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.context.device().wait_idle() {
            error!("Failed to wait for device idle during renderer drop: {:?}", e);
        }
        info!("Renderer destroyed after {} frame(s)", self.frame_count());
    }
}
