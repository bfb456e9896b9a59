//! Command Recorder.
//!
//! Records one frame into a frame slot's command buffer:
//!
//! ```text
//! shadow map  -> DEPTH_ATTACHMENT   shadow pass (clear 1.0, store)
//! shadow map  -> SHADER_READ_ONLY
//! color       -> COLOR_ATTACHMENT
//! main depth  -> DEPTH_ATTACHMENT   forward pass (clear both)
//!                                   debug quad (load color), optional
//! color       -> PRESENT_SRC
//! ```
//!
//! Barrier source layouts are read from each target's [`ImageState`], and
//! the state is committed right after the barrier is recorded.
//!
//! Recording goes through [`CommandSink`] so the protocol can be checked
//! without a device.

use ash::vk;
use glam::Mat4;

use renderer_rhi::RhiResult;
use renderer_rhi::command::CommandBuffer;
use renderer_rhi::image::ImageState;
use renderer_rhi::rendering::{ColorAttachment, DepthAttachment, RenderingConfig};
use renderer_scene::{RenderElement, SceneData};

use crate::pass_graph::{Pass, RendererConfig};
use crate::ubo::DrawPushConstants;

/// Side length of the debug quad in pixels.
pub const DEBUG_QUAD_SIZE: u32 = 512;

/// Forward pass clear color.
pub const CLEAR_COLOR: [f32; 4] = [0.1, 0.1, 0.12, 1.0];

/// Destination of recorded commands.
pub trait CommandSink {
    /// Resets the buffer and begins recording.
    fn begin(&self) -> RhiResult<()>;
    fn end(&self) -> RhiResult<()>;
    fn image_barriers(&self, barriers: &[vk::ImageMemoryBarrier2]);
    fn begin_rendering(&self, config: &RenderingConfig);
    fn end_rendering(&self);
    /// Sets viewport and scissor to the render area of `config`.
    fn set_render_area(&self, config: &RenderingConfig);
    fn bind_pipeline(&self, pipeline: vk::Pipeline);
    fn bind_geometry(&self, vertex_buffer: vk::Buffer, index_buffer: vk::Buffer);
    fn bind_descriptor_set(&self, layout: vk::PipelineLayout, set: vk::DescriptorSet);
    fn push_draw_constants(&self, layout: vk::PipelineLayout, constants: &DrawPushConstants);
    fn draw_indexed(&self, element: &RenderElement);
    fn draw(&self, vertex_count: u32);
}

impl CommandSink for CommandBuffer {
    fn begin(&self) -> RhiResult<()> {
        self.reset()?;
        CommandBuffer::begin(self)
    }

    fn end(&self) -> RhiResult<()> {
        CommandBuffer::end(self)
    }

    fn image_barriers(&self, barriers: &[vk::ImageMemoryBarrier2]) {
        CommandBuffer::image_barriers(self, barriers);
    }

    fn begin_rendering(&self, config: &RenderingConfig) {
        let bundle = config.build();
        CommandBuffer::begin_rendering(self, &bundle.info());
    }

    fn end_rendering(&self) {
        CommandBuffer::end_rendering(self);
    }

    fn set_render_area(&self, config: &RenderingConfig) {
        self.set_viewport(&config.viewport());
        self.set_scissor(&config.render_area);
    }

    fn bind_pipeline(&self, pipeline: vk::Pipeline) {
        self.bind_graphics_pipeline(pipeline);
    }

    fn bind_geometry(&self, vertex_buffer: vk::Buffer, index_buffer: vk::Buffer) {
        self.bind_vertex_buffer(vertex_buffer);
        self.bind_index_buffer(index_buffer, vk::IndexType::UINT32);
    }

    fn bind_descriptor_set(&self, layout: vk::PipelineLayout, set: vk::DescriptorSet) {
        self.bind_descriptor_sets(layout, 0, &[set]);
    }

    fn push_draw_constants(&self, layout: vk::PipelineLayout, constants: &DrawPushConstants) {
        self.push_constants(layout, vk::ShaderStageFlags::VERTEX, 0, constants);
    }

    fn draw_indexed(&self, element: &RenderElement) {
        CommandBuffer::draw_indexed(
            self,
            element.index_count,
            1,
            element.index_offset,
            element.vertex_offset as i32,
            0,
        );
    }

    fn draw(&self, vertex_count: u32) {
        CommandBuffer::draw(self, vertex_count, 1, 0, 0);
    }
}

/// Image a pass renders into or samples from.
pub struct Target<'a> {
    pub state: &'a mut ImageState,
    pub view: vk::ImageView,
    pub extent: vk::Extent2D,
}

/// Pipelines used by the passes. All share one layout.
#[derive(Clone, Copy, Debug)]
pub struct PassPipelines {
    pub layout: vk::PipelineLayout,
    pub shadow: vk::Pipeline,
    pub forward: vk::Pipeline,
    pub debug_quad: vk::Pipeline,
}

/// Unified geometry buffers and the tables describing them.
#[derive(Clone, Copy)]
pub struct SceneGeometry<'a> {
    pub scene: &'a SceneData,
    pub vertex_buffer: vk::Buffer,
    pub index_buffer: vk::Buffer,
}

/// Everything one frame's recording consumes.
pub struct FrameRecording<'a> {
    pub color: Target<'a>,
    pub depth: Target<'a>,
    pub shadow_map: Target<'a>,
    pub geometry: SceneGeometry<'a>,
    /// World to light clip space.
    pub light_matrix: Mat4,
    /// World to camera clip space.
    pub camera_matrix: Mat4,
    /// Uniform block, shadow map and sampler for the forward pass.
    pub forward_set: vk::DescriptorSet,
    /// Set for the debug quad; the quad is skipped without one.
    pub debug_quad_set: Option<vk::DescriptorSet>,
}

/// Records frames according to a [`RendererConfig`].
#[derive(Clone, Debug, Default)]
pub struct CommandRecorder {
    config: RendererConfig,
}

impl CommandRecorder {
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }

    #[inline]
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Records the whole frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the command buffer cannot be reset, begun or
    /// ended. Any such failure is a programming error; callers must not retry.
    pub fn record<S: CommandSink>(
        &self,
        sink: &S,
        pipelines: &PassPipelines,
        frame: FrameRecording<'_>,
    ) -> RhiResult<()> {
        let FrameRecording {
            color,
            depth,
            mut shadow_map,
            geometry,
            light_matrix,
            camera_matrix,
            forward_set,
            debug_quad_set,
        } = frame;

        sink.begin()?;

        let draw_shadows = self.config.contains(Pass::Shadow);
        record_shadow_pass(sink, pipelines, &mut shadow_map, geometry, light_matrix, draw_shadows);

        // Depth writes must complete before the forward pass samples the map.
        transition(
            sink,
            &mut [(&mut *shadow_map.state, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)],
        );

        transition(
            sink,
            &mut [
                (&mut *color.state, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
                (&mut *depth.state, vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL),
            ],
        );

        let forward = RenderingConfig::from_extent(color.extent)
            .with_color_attachment(ColorAttachment::new(color.view).with_clear_color(CLEAR_COLOR))
            .with_depth_attachment(DepthAttachment::new(depth.view));
        sink.begin_rendering(&forward);
        sink.set_render_area(&forward);
        sink.bind_pipeline(pipelines.forward);
        sink.bind_descriptor_set(pipelines.layout, forward_set);
        draw_scene(sink, pipelines.layout, geometry, camera_matrix);
        sink.end_rendering();

        if self.config.contains(Pass::DebugQuad)
            && let Some(set) = debug_quad_set
        {
            let quad = RenderingConfig::new(
                DEBUG_QUAD_SIZE.min(color.extent.width),
                DEBUG_QUAD_SIZE.min(color.extent.height),
            )
            .with_color_attachment(ColorAttachment::new(color.view).load());
            sink.begin_rendering(&quad);
            sink.set_render_area(&quad);
            sink.bind_pipeline(pipelines.debug_quad);
            sink.bind_descriptor_set(pipelines.layout, set);
            // Full-screen triangle generated in the vertex shader.
            sink.draw(3);
            sink.end_rendering();
        }

        transition(sink, &mut [(&mut *color.state, vk::ImageLayout::PRESENT_SRC_KHR)]);

        sink.end()
    }
}

fn record_shadow_pass<S: CommandSink>(
    sink: &S,
    pipelines: &PassPipelines,
    shadow_map: &mut Target<'_>,
    geometry: SceneGeometry<'_>,
    light_matrix: Mat4,
    draw: bool,
) {
    transition(
        sink,
        &mut [(&mut *shadow_map.state, vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)],
    );

    let config = RenderingConfig::from_extent(shadow_map.extent)
        .with_depth_attachment(DepthAttachment::new(shadow_map.view).store());
    sink.begin_rendering(&config);
    // Without a shadow pass the map is only cleared: everything is lit.
    if draw {
        sink.set_render_area(&config);
        sink.bind_pipeline(pipelines.shadow);
        draw_scene(sink, pipelines.layout, geometry, light_matrix);
    }
    sink.end_rendering();
}

/// Instances in order, each with its render elements in order.
fn draw_scene<S: CommandSink>(
    sink: &S,
    layout: vk::PipelineLayout,
    geometry: SceneGeometry<'_>,
    proj_view: Mat4,
) {
    sink.bind_geometry(geometry.vertex_buffer, geometry.index_buffer);
    for (instance, elements) in geometry.scene.draw_batches() {
        if elements.is_empty() {
            continue;
        }
        sink.push_draw_constants(layout, &DrawPushConstants::new(proj_view, instance.transform));
        for element in elements {
            sink.draw_indexed(element);
        }
    }
}

/// Records one barrier per image and commits the new layouts.
fn transition<S: CommandSink>(sink: &S, images: &mut [(&mut ImageState, vk::ImageLayout)]) {
    let barriers: Vec<_> = images
        .iter()
        .map(|(state, layout)| state.barrier_to(*layout))
        .collect();
    sink.image_barriers(&barriers);
    for (state, layout) in images.iter_mut() {
        state.commit(*layout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;
    use glam::Vec3;
    use renderer_rhi::vertex::Vertex;
    use renderer_scene::PrimitiveData;
    use std::cell::RefCell;

    #[derive(Clone, Debug, PartialEq)]
    enum Cmd {
        Begin,
        End,
        Barrier {
            image: vk::Image,
            old: vk::ImageLayout,
            new: vk::ImageLayout,
            dst_stage: vk::PipelineStageFlags2,
        },
        BeginRendering {
            extent: vk::Extent2D,
            color_load: Option<vk::AttachmentLoadOp>,
            depth_view: Option<vk::ImageView>,
        },
        EndRendering,
        RenderArea,
        BindPipeline(vk::Pipeline),
        BindGeometry,
        BindSet(vk::DescriptorSet),
        Push(Mat4),
        DrawIndexed(RenderElement),
        Draw(u32),
    }

    #[derive(Default)]
    struct RecordingSink {
        commands: RefCell<Vec<Cmd>>,
    }

    impl RecordingSink {
        fn push(&self, cmd: Cmd) {
            self.commands.borrow_mut().push(cmd);
        }

        fn commands(&self) -> Vec<Cmd> {
            self.commands.borrow().clone()
        }
    }

    impl CommandSink for RecordingSink {
        fn begin(&self) -> RhiResult<()> {
            self.push(Cmd::Begin);
            Ok(())
        }
        fn end(&self) -> RhiResult<()> {
            self.push(Cmd::End);
            Ok(())
        }
        fn image_barriers(&self, barriers: &[vk::ImageMemoryBarrier2]) {
            for b in barriers {
                self.push(Cmd::Barrier {
                    image: b.image,
                    old: b.old_layout,
                    new: b.new_layout,
                    dst_stage: b.dst_stage_mask,
                });
            }
        }
        fn begin_rendering(&self, config: &RenderingConfig) {
            self.push(Cmd::BeginRendering {
                extent: config.extent(),
                color_load: config.color_attachments.first().map(|c| c.load_op),
                depth_view: config.depth_attachment.map(|d| d.image_view),
            });
        }
        fn end_rendering(&self) {
            self.push(Cmd::EndRendering);
        }
        fn set_render_area(&self, _config: &RenderingConfig) {
            self.push(Cmd::RenderArea);
        }
        fn bind_pipeline(&self, pipeline: vk::Pipeline) {
            self.push(Cmd::BindPipeline(pipeline));
        }
        fn bind_geometry(&self, _vertex_buffer: vk::Buffer, _index_buffer: vk::Buffer) {
            self.push(Cmd::BindGeometry);
        }
        fn bind_descriptor_set(&self, _layout: vk::PipelineLayout, set: vk::DescriptorSet) {
            self.push(Cmd::BindSet(set));
        }
        fn push_draw_constants(&self, _layout: vk::PipelineLayout, constants: &DrawPushConstants) {
            self.push(Cmd::Push(constants.proj_view * constants.model));
        }
        fn draw_indexed(&self, element: &RenderElement) {
            self.push(Cmd::DrawIndexed(*element));
        }
        fn draw(&self, vertex_count: u32) {
            self.push(Cmd::Draw(vertex_count));
        }
    }

    const COLOR: u64 = 1;
    const DEPTH: u64 = 2;
    const SHADOW: u64 = 3;

    struct Images {
        color: ImageState,
        depth: ImageState,
        shadow: ImageState,
    }

    impl Images {
        fn new() -> Self {
            Self {
                color: ImageState::new(vk::Image::from_raw(COLOR), vk::ImageAspectFlags::COLOR),
                depth: ImageState::new(vk::Image::from_raw(DEPTH), vk::ImageAspectFlags::DEPTH),
                shadow: ImageState::new(vk::Image::from_raw(SHADOW), vk::ImageAspectFlags::DEPTH),
            }
        }
    }

    fn pipelines() -> PassPipelines {
        PassPipelines {
            layout: vk::PipelineLayout::from_raw(10),
            shadow: vk::Pipeline::from_raw(11),
            forward: vk::Pipeline::from_raw(12),
            debug_quad: vk::Pipeline::from_raw(13),
        }
    }

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    fn record(
        recorder: &CommandRecorder,
        images: &mut Images,
        scene: &SceneData,
        quad: bool,
        color_extent: vk::Extent2D,
    ) -> Vec<Cmd> {
        let sink = RecordingSink::default();
        let frame = FrameRecording {
            color: Target {
                state: &mut images.color,
                view: vk::ImageView::from_raw(21),
                extent: color_extent,
            },
            depth: Target {
                state: &mut images.depth,
                view: vk::ImageView::from_raw(22),
                extent: color_extent,
            },
            shadow_map: Target {
                state: &mut images.shadow,
                view: vk::ImageView::from_raw(23),
                extent: extent(2048, 2048),
            },
            geometry: SceneGeometry {
                scene,
                vertex_buffer: vk::Buffer::from_raw(30),
                index_buffer: vk::Buffer::from_raw(31),
            },
            light_matrix: Mat4::from_scale(Vec3::splat(2.0)),
            camera_matrix: Mat4::from_scale(Vec3::splat(3.0)),
            forward_set: vk::DescriptorSet::from_raw(40),
            debug_quad_set: quad.then(|| vk::DescriptorSet::from_raw(41)),
        };
        recorder
            .record(&sink, &pipelines(), frame)
            .unwrap();
        sink.commands()
    }

    fn barrier_index(commands: &[Cmd], image: u64, new: vk::ImageLayout) -> usize {
        commands
            .iter()
            .position(|c| {
                matches!(c, Cmd::Barrier { image: i, new: n, .. }
                    if i.as_raw() == image && *n == new)
            })
            .unwrap_or_else(|| panic!("no barrier for image {image} to {new:?}"))
    }

    fn two_instance_scene() -> SceneData {
        let quad = |z: f32| {
            let v = |x: f32, y: f32| {
                Vertex::from_attributes(Vec3::new(x, y, z), Vec3::Z, glam::Vec2::ZERO, Vec3::X)
            };
            PrimitiveData::triangles(
                vec![v(0.0, 0.0), v(1.0, 0.0), v(1.0, 1.0), v(0.0, 1.0)],
                vec![0, 1, 2, 0, 2, 3],
            )
        };
        let mut scene = SceneData::new();
        let a = scene.append_mesh("a", vec![quad(0.0), quad(1.0)]).unwrap();
        let b = scene.append_mesh("b", vec![quad(2.0)]).unwrap();
        scene
            .add_instance(b, Mat4::from_translation(Vec3::X))
            .unwrap();
        scene
            .add_instance(a, Mat4::from_translation(Vec3::Y))
            .unwrap();
        scene
    }

    #[test]
    fn test_shadow_read_barrier_precedes_forward_sampling() {
        let recorder = CommandRecorder::default();
        let mut images = Images::new();
        let scene = SceneData::triangle();
        let commands = record(&recorder, &mut images, &scene, false, extent(800, 600));

        let to_read = barrier_index(&commands, SHADOW, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        let forward_set = commands
            .iter()
            .position(|c| *c == Cmd::BindSet(vk::DescriptorSet::from_raw(40)))
            .unwrap();
        let shadow_end = commands
            .iter()
            .position(|c| *c == Cmd::EndRendering)
            .unwrap();
        assert!(shadow_end < to_read);
        assert!(to_read < forward_set);

        match &commands[to_read] {
            Cmd::Barrier { old, dst_stage, .. } => {
                assert_eq!(*old, vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL);
                assert!(dst_stage.contains(vk::PipelineStageFlags2::FRAGMENT_SHADER));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_protocol_order() {
        let recorder = CommandRecorder::default();
        let mut images = Images::new();
        let scene = SceneData::triangle();
        let commands = record(&recorder, &mut images, &scene, false, extent(800, 600));

        assert_eq!(commands.first(), Some(&Cmd::Begin));
        assert_eq!(commands.last(), Some(&Cmd::End));

        let shadow_write = barrier_index(&commands, SHADOW, vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL);
        let color_write = barrier_index(&commands, COLOR, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        let depth_write = barrier_index(&commands, DEPTH, vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL);
        let present = barrier_index(&commands, COLOR, vk::ImageLayout::PRESENT_SRC_KHR);
        assert!(shadow_write < color_write);
        assert!(color_write < present);
        assert!(depth_write < present);
        assert_eq!(present, commands.len() - 2);

        let pipelines: Vec<_> = commands
            .iter()
            .filter_map(|c| match c {
                Cmd::BindPipeline(p) => Some(p.as_raw()),
                _ => None,
            })
            .collect();
        assert_eq!(pipelines, vec![11, 12]);

        // Shadow pass writes and keeps depth; forward pass clears both.
        let passes: Vec<_> = commands
            .iter()
            .filter(|c| matches!(c, Cmd::BeginRendering { .. }))
            .cloned()
            .collect();
        assert_eq!(
            passes,
            vec![
                Cmd::BeginRendering {
                    extent: extent(2048, 2048),
                    color_load: None,
                    depth_view: Some(vk::ImageView::from_raw(23)),
                },
                Cmd::BeginRendering {
                    extent: extent(800, 600),
                    color_load: Some(vk::AttachmentLoadOp::CLEAR),
                    depth_view: Some(vk::ImageView::from_raw(22)),
                },
            ]
        );
    }

    #[test]
    fn test_layouts_committed() {
        let recorder = CommandRecorder::default();
        let mut images = Images::new();
        let scene = SceneData::triangle();
        record(&recorder, &mut images, &scene, false, extent(800, 600));

        assert_eq!(images.color.layout(), vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(images.depth.layout(), vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL);
        assert_eq!(images.shadow.layout(), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);

        // Next frame the shadow map leaves the layout the previous frame left it in.
        images.color = ImageState::new(vk::Image::from_raw(COLOR), vk::ImageAspectFlags::COLOR);
        let commands = record(&recorder, &mut images, &scene, false, extent(800, 600));
        let idx = barrier_index(&commands, SHADOW, vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL);
        assert!(matches!(
            commands[idx],
            Cmd::Barrier { old: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL, .. }
        ));
    }

    #[test]
    fn test_draw_order_follows_instances_then_elements() {
        let recorder = CommandRecorder::default();
        let mut images = Images::new();
        let scene = two_instance_scene();
        let commands = record(&recorder, &mut images, &scene, false, extent(800, 600));

        let draws: Vec<_> = commands
            .iter()
            .filter_map(|c| match c {
                Cmd::DrawIndexed(e) => Some((e.vertex_offset, e.index_offset)),
                _ => None,
            })
            .collect();
        // Instance 0 draws mesh b, instance 1 draws mesh a's two elements.
        let one_pass = vec![(8, 12), (0, 0), (4, 6)];
        let expected: Vec<_> = one_pass.iter().chain(one_pass.iter()).copied().collect();
        assert_eq!(draws, expected);

        let pushes: Vec<_> = commands
            .iter()
            .filter_map(|c| match c {
                Cmd::Push(m) => Some(*m),
                _ => None,
            })
            .collect();
        let light = Mat4::from_scale(Vec3::splat(2.0));
        let camera = Mat4::from_scale(Vec3::splat(3.0));
        assert_eq!(
            pushes,
            vec![
                light * Mat4::from_translation(Vec3::X),
                light * Mat4::from_translation(Vec3::Y),
                camera * Mat4::from_translation(Vec3::X),
                camera * Mat4::from_translation(Vec3::Y),
            ]
        );
    }

    #[test]
    fn test_debug_quad_only_when_enabled() {
        let recorder = CommandRecorder::default();
        let scene = SceneData::triangle();

        let commands = record(&recorder, &mut Images::new(), &scene, false, extent(800, 600));
        assert!(!commands.contains(&Cmd::Draw(3)));

        let commands = record(&recorder, &mut Images::new(), &scene, true, extent(800, 600));
        let quad = commands.iter().position(|c| *c == Cmd::Draw(3)).unwrap();
        let present = barrier_index(&commands, COLOR, vk::ImageLayout::PRESENT_SRC_KHR);
        assert!(quad < present);
        assert!(commands.contains(&Cmd::BeginRendering {
            extent: extent(512, 512),
            color_load: Some(vk::AttachmentLoadOp::LOAD),
            depth_view: None,
        }));
    }

    #[test]
    fn test_debug_quad_clamped_to_small_target() {
        let recorder = CommandRecorder::default();
        let scene = SceneData::triangle();
        let commands = record(&recorder, &mut Images::new(), &scene, true, extent(300, 200));
        assert!(commands.contains(&Cmd::BeginRendering {
            extent: extent(300, 200),
            color_load: Some(vk::AttachmentLoadOp::LOAD),
            depth_view: None,
        }));
    }

    #[test]
    fn test_forward_only_clears_shadow_map_without_drawing() {
        let recorder = CommandRecorder::new(RendererConfig::forward_only());
        let scene = SceneData::triangle();
        let mut images = Images::new();
        let commands = record(&recorder, &mut images, &scene, true, extent(800, 600));

        assert!(!commands.contains(&Cmd::BindPipeline(vk::Pipeline::from_raw(11))));
        assert!(!commands.contains(&Cmd::Draw(3)));
        let draws = commands
            .iter()
            .filter(|c| matches!(c, Cmd::DrawIndexed(_)))
            .count();
        assert_eq!(draws, 1);
        assert_eq!(images.shadow.layout(), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    }
}
