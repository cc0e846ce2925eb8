//! Depth-only render of the scene from the light.

use std::sync::Arc;

use multipass_rhi::command::CommandBuffer;
use multipass_rhi::device::Device;
use multipass_rhi::pipeline::{CullMode, GraphicsPipelineBuilder, Pipeline};
use multipass_rhi::render_pass::{Framebuffer, RenderPass, RenderPassDesc};
use multipass_rhi::shader::ShaderStage;
use multipass_rhi::texture::{Texture, TextureDesc};
use multipass_rhi::vertex::Vertex;
use multipass_rhi::vk;
use multipass_rhi::RhiResult;
use tracing::info;

use crate::push_constants::{DrawPushConstants, PushConstantSchema};
use crate::shaders::ShaderLibrary;

pub const SHADOW_MAP_FORMAT: vk::Format = vk::Format::D32_SFLOAT_S8_UINT;

/// Layout the map is left in for the lit pass to sample.
pub const SHADOW_MAP_LAYOUT: vk::ImageLayout = vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL;

/// Depth bias (constant, clamp, slope) against shadow acne.
pub const DEPTH_BIAS: (f32, f32, f32) = (1.25, 0.0, 1.75);

/// Pass description of a shadow map.
pub fn shadow_pass_desc() -> RenderPassDesc {
    RenderPassDesc::depth_only(SHADOW_MAP_FORMAT, SHADOW_MAP_LAYOUT)
}

/// A square depth target, its render pass and the pipeline drawing into it.
///
/// The target never depends on the swapchain image, so the map begins and
/// ends its own pass.
pub struct ShadowMap {
    pipeline: Pipeline,
    framebuffer: Framebuffer,
    render_pass: RenderPass,
    depth: Texture,
    size: u32,
}

impl ShadowMap {
    pub fn new(device: Arc<Device>, size: u32, shaders: &ShaderLibrary) -> RhiResult<Self> {
        let depth = Texture::create_2d(
            device.clone(),
            "shadow-map",
            TextureDesc::new(
                SHADOW_MAP_FORMAT,
                size,
                size,
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            ),
        )?;
        let render_pass = RenderPass::new(device.clone(), shadow_pass_desc(), "shadow-pass")?;
        let extent = vk::Extent2D {
            width: size,
            height: size,
        };
        let framebuffer = Framebuffer::new(device.clone(), &render_pass, &[depth.view()], extent)?;

        let (constant, clamp, slope) = DEPTH_BIAS;
        let pipeline = GraphicsPipelineBuilder::new()
            .vertex_shader(shaders.load(&device, "shadow", ShaderStage::Vertex)?)
            .fragment_shader(shaders.load(&device, "shadow", ShaderStage::Fragment)?)
            .vertex_binding(Vertex::binding_description())
            .vertex_attributes(&Vertex::attribute_descriptions())
            .cull_mode(CullMode::None)
            .depth_bias(constant, clamp, slope)
            .color_attachment_count(0)
            .render_pass(render_pass.handle(), 0)
            .push_constants(DrawPushConstants::decl())
            .build(device, "shadow-map")?;

        info!("Shadow map ready: {size}x{size} {:?}", SHADOW_MAP_FORMAT);

        Ok(Self {
            pipeline,
            framebuffer,
            render_pass,
            depth,
            size,
        })
    }

    /// Begins the shadow pass, sets the viewport to the whole map and binds
    /// the depth pipeline.
    pub fn begin_pass(&self, cmd: &CommandBuffer) {
        let extent = self.framebuffer.extent();
        let clear = [vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
        }];
        cmd.begin_render_pass(
            self.render_pass.handle(),
            self.framebuffer.handle(),
            extent,
            &clear,
        );
        cmd.set_viewport(&vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: self.size as f32,
            height: self.size as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        });
        cmd.set_scissor(&vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        });
        cmd.bind_graphics_pipeline(self.pipeline.handle());
    }

    pub fn end_pass(&self, cmd: &CommandBuffer) {
        cmd.end_render_pass();
    }

    #[inline]
    pub fn pipeline_layout(&self) -> vk::PipelineLayout {
        self.pipeline.layout()
    }

    #[inline]
    pub fn size(&self) -> u32 {
        self.size
    }

    #[inline]
    pub fn texture(&self) -> &Texture {
        &self.depth
    }

    #[inline]
    pub fn render_pass(&self) -> &RenderPass {
        &self.render_pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use multipass_rhi::render_pass::AttachmentRole;

    #[test]
    fn test_shadow_pass_is_depth_only() {
        let desc = shadow_pass_desc();
        assert_eq!(desc.attachment_count(), 1);
        assert_eq!(desc.color_attachment_count(), 0);

        let depth = desc.depth_attachment().unwrap();
        assert_eq!(depth.role, AttachmentRole::Depth);
        assert_eq!(depth.format, vk::Format::D32_SFLOAT_S8_UINT);
        assert_eq!(
            depth.final_layout,
            vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
        );
        assert_eq!(depth.store_op, vk::AttachmentStoreOp::STORE);
    }
}
