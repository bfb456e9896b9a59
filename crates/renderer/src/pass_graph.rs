//! Pass graph description.
//!
//! A renderer variant is a list of named passes, each declaring the
//! resources it reads and writes. The [`CommandRecorder`](crate::recorder::CommandRecorder)
//! interprets the list; nothing else distinguishes a forward-only renderer
//! from a shadow-mapped one.

use std::fmt;

use crate::error::{RendererError, RendererResult};

/// Frame resources passes exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Resource {
    /// Light-space depth, fixed resolution.
    ShadowMap,
    /// Camera-space depth at swapchain resolution.
    MainDepth,
    /// The acquired presentable image.
    SwapchainImage,
}

/// A render pass the recorder knows how to emit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Pass {
    /// Depth-only render of the scene from the light.
    Shadow,
    /// Lit, shadowed render of the scene from the camera.
    Forward,
    /// Shadow-map visualization in the top-left corner of the image.
    DebugQuad,
}

impl Pass {
    pub const ALL: [Pass; 3] = [Pass::Shadow, Pass::Forward, Pass::DebugQuad];

    /// Inverse of [`name`](Self::name).
    pub fn from_name(name: &str) -> Option<Pass> {
        Self::ALL.into_iter().find(|pass| pass.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Pass::Shadow => "shadow",
            Pass::Forward => "forward",
            Pass::DebugQuad => "debug-quad",
        }
    }

    pub fn inputs(self) -> &'static [Resource] {
        match self {
            Pass::Shadow => &[],
            Pass::Forward => &[Resource::ShadowMap],
            // Draws over the forward pass output.
            Pass::DebugQuad => &[Resource::ShadowMap, Resource::SwapchainImage],
        }
    }

    pub fn outputs(self) -> &'static [Resource] {
        match self {
            Pass::Shadow => &[Resource::ShadowMap],
            Pass::Forward => &[Resource::SwapchainImage, Resource::MainDepth],
            Pass::DebugQuad => &[Resource::SwapchainImage],
        }
    }
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered passes of one renderer variant.
///
/// Without a [`Pass::Shadow`] the shadow map is only cleared each frame, so
/// the forward pass sees everything as lit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RendererConfig {
    passes: Vec<Pass>,
}

impl RendererConfig {
    /// Validates and wraps a pass list.
    ///
    /// # Errors
    ///
    /// [`RendererError::PassGraph`] if the list has no forward pass, repeats
    /// a pass, or has a pass reading a resource that a later pass writes.
    pub fn new(passes: Vec<Pass>) -> RendererResult<Self> {
        validate(&passes)?;
        Ok(Self { passes })
    }

    /// Forward pass only.
    pub fn forward_only() -> Self {
        Self {
            passes: vec![Pass::Forward],
        }
    }

    /// Shadow pass, forward pass and the toggleable debug quad.
    pub fn shadow_mapped() -> Self {
        Self {
            passes: vec![Pass::Shadow, Pass::Forward, Pass::DebugQuad],
        }
    }

    #[inline]
    pub fn passes(&self) -> &[Pass] {
        &self.passes
    }

    #[inline]
    pub fn contains(&self, pass: Pass) -> bool {
        self.passes.contains(&pass)
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self::shadow_mapped()
    }
}

fn validate(passes: &[Pass]) -> RendererResult<()> {
    if !passes.contains(&Pass::Forward) {
        return Err(RendererError::PassGraph(
            "a forward pass is required".to_string(),
        ));
    }

    for (i, pass) in passes.iter().enumerate() {
        if passes[..i].contains(pass) {
            return Err(RendererError::PassGraph(format!("pass '{pass}' appears twice")));
        }
        for input in pass.inputs() {
            if let Some(writer) = passes[i + 1..]
                .iter()
                .find(|later| later.outputs().contains(input))
            {
                return Err(RendererError::PassGraph(format!(
                    "pass '{pass}' reads {input:?} before pass '{writer}' writes it"
                )));
            }
        }
    }

    Ok(())
}
