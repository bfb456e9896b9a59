//! Pipeline provider.
//!
//! Builds the shadow, forward and debug-quad pipelines from precompiled
//! SPIR-V and hands them out by pass name. All three share one descriptor
//! set layout and one pipeline layout:
//!
//! - set 0, binding 0: [`UniformParams`](crate::ubo::UniformParams) (vertex + fragment)
//! - set 0, binding 1: shadow map with its sampler (fragment)
//! - push constants: [`DrawPushConstants`] (vertex)

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use renderer_rhi::RhiResult;
use renderer_rhi::descriptor::{DescriptorSetLayout, binding};
use renderer_rhi::device::Device;
use renderer_rhi::pipeline::{CullMode, FrontFace, GraphicsPipelineBuilder, Pipeline, PipelineLayout};
use renderer_rhi::shader::{Shader, ShaderStage};
use renderer_rhi::vertex::Vertex;

use crate::pass_graph::Pass;
use crate::recorder::PassPipelines;
use crate::targets::{MAIN_DEPTH_FORMAT, SHADOW_MAP_FORMAT};
use crate::ubo::DrawPushConstants;

/// Directory the build script writes SPIR-V into, relative to the working directory.
pub const DEFAULT_SHADER_DIR: &str = "shaders/spirv";

/// Constant depth bias of the shadow pass, in depth-format units.
const SHADOW_DEPTH_BIAS_CONSTANT: f32 = 1.25;
/// Slope-scaled depth bias of the shadow pass.
const SHADOW_DEPTH_BIAS_SLOPE: f32 = 1.75;

/// Handles a pass needs to record with a pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipelineRef {
    pub handle: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub descriptor_layout: vk::DescriptorSetLayout,
}

struct PassPipelineSet {
    shadow: Pipeline,
    forward: Pipeline,
    debug_quad: Pipeline,
}

/// Owns every graphics pipeline of the renderer.
pub struct PipelineLibrary {
    device: Arc<Device>,
    shader_dir: PathBuf,
    color_format: vk::Format,
    // Pipelines before the layouts they were built with.
    pipelines: PassPipelineSet,
    layout: PipelineLayout,
    descriptor_layout: DescriptorSetLayout,
}

impl PipelineLibrary {
    /// Loads the shaders in `shader_dir` and builds every pipeline.
    ///
    /// # Errors
    ///
    /// A missing or invalid shader file, or a pipeline creation failure.
    pub fn new(device: Arc<Device>, shader_dir: &Path, color_format: vk::Format) -> RhiResult<Self> {
        let descriptor_layout = DescriptorSetLayout::new(
            device.clone(),
            &[
                binding::uniform_buffer(
                    0,
                    vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                ),
                binding::combined_image_sampler(1, vk::ShaderStageFlags::FRAGMENT),
            ],
        )?;

        let push_constants = vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .offset(0)
            .size(DrawPushConstants::SIZE);
        let layout = PipelineLayout::new(
            device.clone(),
            &[descriptor_layout.handle()],
            &[push_constants],
        )?;

        let pipelines = build_pipelines(&device, shader_dir, &layout, color_format)?;

        info!("Pipelines created from {:?}", shader_dir);

        Ok(Self {
            device,
            shader_dir: shader_dir.to_path_buf(),
            color_format,
            pipelines,
            layout,
            descriptor_layout,
        })
    }

    /// Rebuilds every pipeline from the shader files on disk.
    ///
    /// On failure the current pipelines stay in place. The caller must make
    /// sure the device is idle.
    ///
    /// # Errors
    ///
    /// A missing or invalid shader file, or a pipeline creation failure.
    pub fn reload(&mut self) -> RhiResult<()> {
        let pipelines = build_pipelines(&self.device, &self.shader_dir, &self.layout, self.color_format)?;
        self.pipelines = pipelines;
        info!("Pipelines reloaded from {:?}", self.shader_dir);
        Ok(())
    }

    /// Rebuilds the pipelines that write `color_format` if it changed.
    ///
    /// The stored format only changes once the new pipelines exist, so a
    /// failed rebuild is retried by the next call.
    ///
    /// # Errors
    ///
    /// See [`reload`](Self::reload).
    pub fn set_color_format(&mut self, color_format: vk::Format) -> RhiResult<()> {
        let rebuilt = switch_format(&mut self.color_format, color_format, |format| {
            build_pipelines(&self.device, &self.shader_dir, &self.layout, format)
        })?;
        if let Some(pipelines) = rebuilt {
            self.pipelines = pipelines;
            info!("Pipelines rebuilt for {:?}", color_format);
        }
        Ok(())
    }

    /// Pipeline of the pass called `name` (see [`Pass::name`]).
    pub fn get(&self, name: &str) -> Option<PipelineRef> {
        let pipeline = match Pass::from_name(name)? {
            Pass::Shadow => &self.pipelines.shadow,
            Pass::Forward => &self.pipelines.forward,
            Pass::DebugQuad => &self.pipelines.debug_quad,
        };
        Some(PipelineRef {
            handle: pipeline.handle(),
            layout: self.layout.handle(),
            descriptor_layout: self.descriptor_layout.handle(),
        })
    }

    /// Pipelines of every pass, looked up by name.
    pub fn pass_pipelines(&self) -> Option<PassPipelines> {
        let forward = self.get(Pass::Forward.name())?;
        Some(PassPipelines {
            layout: forward.layout,
            shadow: self.get(Pass::Shadow.name())?.handle,
            forward: forward.handle,
            debug_quad: self.get(Pass::DebugQuad.name())?.handle,
        })
    }
}

/// Runs `rebuild` when `new` differs from `current` and stores `new` only
/// if it succeeds. Returns `None` when the format is unchanged.
fn switch_format<T>(
    current: &mut vk::Format,
    new: vk::Format,
    rebuild: impl FnOnce(vk::Format) -> RhiResult<T>,
) -> RhiResult<Option<T>> {
    if *current == new {
        return Ok(None);
    }
    debug!("Color format changed {:?} -> {:?}", current, new);
    let built = rebuild(new)?;
    *current = new;
    Ok(Some(built))
}

fn load_shader(device: &Arc<Device>, dir: &Path, name: &str, stage: ShaderStage) -> RhiResult<Shader> {
    Shader::from_spirv_file(device.clone(), &dir.join(format!("{name}.spv")), stage)
}

fn build_pipelines(
    device: &Arc<Device>,
    dir: &Path,
    layout: &PipelineLayout,
    color_format: vk::Format,
) -> RhiResult<PassPipelineSet> {
    let scene_vs = load_shader(device, dir, "simple.vert", ShaderStage::Vertex)?;
    let scene_fs = load_shader(device, dir, "simple_shadow.frag", ShaderStage::Fragment)?;
    let quad_vs = load_shader(device, dir, "quad.vert", ShaderStage::Vertex)?;
    let quad_fs = load_shader(device, dir, "quad.frag", ShaderStage::Fragment)?;

    let attributes = Vertex::attribute_descriptions();

    // Depth only. No culling so thin and open geometry still casts shadows.
    let shadow = GraphicsPipelineBuilder::new()
        .vertex_shader(&scene_vs)
        .vertex_binding(Vertex::binding_description())
        .vertex_attributes(&attributes)
        .cull_mode(CullMode::None)
        .depth_bias(SHADOW_DEPTH_BIAS_CONSTANT, SHADOW_DEPTH_BIAS_SLOPE)
        .depth_attachment_format(SHADOW_MAP_FORMAT)
        .build(device.clone(), layout, Pass::Shadow.name())?;

    let forward = GraphicsPipelineBuilder::new()
        .vertex_shader(&scene_vs)
        .fragment_shader(&scene_fs)
        .vertex_binding(Vertex::binding_description())
        .vertex_attributes(&attributes)
        .cull_mode(CullMode::Back)
        .front_face(FrontFace::CounterClockwise)
        .color_attachment_format(color_format)
        .depth_attachment_format(MAIN_DEPTH_FORMAT)
        .build(device.clone(), layout, Pass::Forward.name())?;

    // Vertices come from gl_VertexIndex.
    let debug_quad = GraphicsPipelineBuilder::new()
        .vertex_shader(&quad_vs)
        .fragment_shader(&quad_fs)
        .cull_mode(CullMode::None)
        .depth_test_enable(false)
        .depth_write_enable(false)
        .color_attachment_format(color_format)
        .build(device.clone(), layout, Pass::DebugQuad.name())?;

    Ok(PassPipelineSet {
        shadow,
        forward,
        debug_quad,
    })
}
