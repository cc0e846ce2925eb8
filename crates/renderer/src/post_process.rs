//! Full-screen post-process pass into the swapchain image.
//!
//! One framebuffer per swapchain image. The pipeline has no vertex input:
//! the vertex shader derives a covering triangle from the vertex index. The
//! viewport and scissor are set for every draw.

use std::sync::Arc;

use multipass_core::PostProcessMode;
use multipass_rhi::command::CommandBuffer;
use multipass_rhi::descriptor::{DescriptorManager, DescriptorSet};
use multipass_rhi::device::Device;
use multipass_rhi::pipeline::{CullMode, GraphicsPipelineBuilder, Pipeline};
use multipass_rhi::render_pass::{Framebuffer, RenderPass, RenderPassDesc};
use multipass_rhi::shader::ShaderStage;
use multipass_rhi::texture::Texture;
use multipass_rhi::vk;
use multipass_rhi::{RhiError, RhiResult};
use tracing::{debug, info};

use crate::push_constants::{PostProcessPushConstants, PushConstantSchema};
use crate::shaders::ShaderLibrary;
use crate::targets::CLEAR_COLOR;

/// Single-sample input, read with a normal sampler.
pub const RESOLVED_INPUT_BINDING: u32 = 0;
/// Multi-sampled input, read per sample.
pub const MS_INPUT_BINDING: u32 = 1;

/// Vertices of the covering triangle.
const FULL_SCREEN_VERTICES: u32 = 3;

/// Layout the color pass outputs are in while this pass samples them.
pub const INPUT_LAYOUT: vk::ImageLayout = vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL;

/// Effect selection, pushed before every draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PostProcessSettings {
    pub mode: PostProcessMode,
    pub use_msaa_input: bool,
    pub msaa_samples: u32,
}

impl Default for PostProcessSettings {
    fn default() -> Self {
        Self {
            mode: PostProcessMode::default(),
            use_msaa_input: false,
            msaa_samples: 1,
        }
    }
}

impl PostProcessSettings {
    /// Reading the multi-sampled image only happens when there is more than
    /// one sample to read.
    #[inline]
    pub fn reads_msaa_input(&self) -> bool {
        self.use_msaa_input && self.msaa_samples > 1
    }

    pub fn push_constants(&self) -> PostProcessPushConstants {
        PostProcessPushConstants::new(self.mode, self.reads_msaa_input(), self.msaa_samples)
    }
}

pub struct PostProcessPass {
    pipeline: Pipeline,
    framebuffers: Vec<Framebuffer>,
    render_pass: RenderPass,
    descriptor_set: DescriptorSet,
    _descriptors: DescriptorManager,
    settings: PostProcessSettings,
    extent: vk::Extent2D,
    device: Arc<Device>,
}

impl PostProcessPass {
    /// Builds the present render pass, one framebuffer per view in
    /// `swapchain_views` and the full-screen pipeline.
    pub fn new(
        device: Arc<Device>,
        format: vk::Format,
        extent: vk::Extent2D,
        swapchain_views: &[vk::ImageView],
        shaders: &ShaderLibrary,
    ) -> RhiResult<Self> {
        let render_pass = RenderPass::new(
            device.clone(),
            RenderPassDesc::present(format),
            "post-process-pass",
        )?;
        let framebuffers = swapchain_views
            .iter()
            .map(|view| Framebuffer::new(device.clone(), &render_pass, &[*view], extent))
            .collect::<RhiResult<Vec<_>>>()?;

        let mut descriptors = DescriptorManager::new(device.clone());
        for binding in [RESOLVED_INPUT_BINDING, MS_INPUT_BINDING] {
            descriptors.set_descriptor(binding, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 1)?;
        }
        let set_layout = descriptors.create_layout()?;
        descriptors.create_pool()?;
        let descriptor_set = descriptors.create_descriptor_sets(1)?.pop().ok_or_else(|| {
            RhiError::InvalidState("post-process descriptor set not allocated".to_string())
        })?;

        let pipeline = GraphicsPipelineBuilder::new()
            .vertex_shader(shaders.load(&device, "post", ShaderStage::Vertex)?)
            .fragment_shader(shaders.load(&device, "post", ShaderStage::Fragment)?)
            .cull_mode(CullMode::None)
            .depth_test_enable(false)
            .depth_write_enable(false)
            .render_pass(render_pass.handle(), 0)
            .descriptor_set_layout(set_layout)
            .push_constants(PostProcessPushConstants::decl())
            .build(device.clone(), "post-process")?;

        info!(
            "Post-process pass ready: {} framebuffer(s) at {}x{}",
            framebuffers.len(),
            extent.width,
            extent.height
        );

        Ok(Self {
            pipeline,
            framebuffers,
            render_pass,
            descriptor_set,
            _descriptors: descriptors,
            settings: PostProcessSettings::default(),
            extent,
            device,
        })
    }

    /// Stages the single-sample input. Takes effect on [`Self::commit_inputs`].
    pub fn bind_input_image(&mut self, texture: &Texture) {
        self.descriptor_set.set_image(
            RESOLVED_INPUT_BINDING,
            texture.view(),
            texture.sampler(),
            INPUT_LAYOUT,
        );
    }

    /// Stages the multi-sampled input. Takes effect on [`Self::commit_inputs`].
    pub fn bind_ms_input_image(&mut self, texture: &Texture) {
        self.descriptor_set.set_image(
            MS_INPUT_BINDING,
            texture.view(),
            texture.sampler(),
            INPUT_LAYOUT,
        );
    }

    /// Writes the staged inputs to the descriptor set. Must not run while
    /// the set is in use by the GPU.
    pub fn commit_inputs(&mut self) -> usize {
        let written = self.descriptor_set.update(self.device.as_ref());
        debug!("Post-process descriptor set: {} write(s)", written);
        written
    }

    pub fn use_mode(&mut self, mode: PostProcessMode) {
        if self.settings.mode != mode {
            info!("Post-process mode: {}", mode.name());
        }
        self.settings.mode = mode;
    }

    pub fn use_msaa_input(&mut self, enabled: bool) {
        self.settings.use_msaa_input = enabled;
    }

    pub fn use_msaa_samples(&mut self, samples: u32) {
        self.settings.msaa_samples = samples.max(1);
    }

    #[inline]
    pub fn settings(&self) -> PostProcessSettings {
        self.settings
    }

    #[inline]
    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    /// Begins the pass on the framebuffer of swapchain image `image_index`.
    pub fn begin(&self, cmd: &CommandBuffer, image_index: u32) -> RhiResult<()> {
        let framebuffer = self.framebuffers.get(image_index as usize).ok_or_else(|| {
            RhiError::InvalidState(format!(
                "swapchain image {image_index} has no framebuffer ({} exist)",
                self.framebuffers.len()
            ))
        })?;
        let clear = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: CLEAR_COLOR,
            },
        }];
        cmd.begin_render_pass(
            self.render_pass.handle(),
            framebuffer.handle(),
            self.extent,
            &clear,
        );
        Ok(())
    }

    /// Draws the covering triangle with the current settings.
    pub fn draw(&self, cmd: &CommandBuffer) {
        cmd.set_viewport(&vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: self.extent.width as f32,
            height: self.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        });
        cmd.set_scissor(&vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.extent,
        });
        cmd.bind_graphics_pipeline(self.pipeline.handle());
        cmd.bind_descriptor_sets(self.pipeline.layout(), &[self.descriptor_set.handle()]);
        cmd.push_constants(
            self.pipeline.layout(),
            PostProcessPushConstants::STAGES,
            &self.settings.push_constants(),
        );
        cmd.draw(FULL_SCREEN_VERTICES, 1);
    }

    pub fn end(&self, cmd: &CommandBuffer) {
        cmd.end_render_pass();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = PostProcessSettings::default();
        assert_eq!(settings.mode, PostProcessMode::default());
        assert!(!settings.reads_msaa_input());
        assert_eq!(settings.push_constants().msaa_samples, 1);
    }

    #[test]
    fn test_msaa_input_needs_multiple_samples() {
        let mut settings = PostProcessSettings {
            mode: PostProcessMode::Blur,
            use_msaa_input: true,
            msaa_samples: 1,
        };
        assert!(!settings.reads_msaa_input());
        assert_eq!(settings.push_constants().use_msaa_input, 0);

        settings.msaa_samples = 4;
        let block = settings.push_constants();
        assert_eq!(block.use_msaa_input, 1);
        assert_eq!(block.msaa_samples, 4);
        assert_eq!(block.mode, PostProcessMode::Blur.shader_value());
    }

    #[test]
    fn test_present_pass_has_one_color_attachment() {
        let desc = RenderPassDesc::present(vk::Format::B8G8R8A8_SRGB);
        assert_eq!(desc.color_attachment_count(), 1);
        assert!(desc.depth_attachment().is_none());
        assert_eq!(
            desc.attachments()[0].final_layout,
            vk::ImageLayout::PRESENT_SRC_KHR
        );
    }
}
