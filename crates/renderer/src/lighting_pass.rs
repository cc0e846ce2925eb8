//! Lit geometry pipelines of the color pass.
//!
//! Three pipelines share one vertex layout, one descriptor set layout and
//! the color render pass: unlit (textured only, also used for the light
//! marker), flat lighting and shadow-mapped lighting. Picking one is a
//! matter of which handle gets bound.
//!
//! Descriptor bindings:
//!
//! | binding | resource |
//! |---------|----------|
//! | 0 | diffuse texture |
//! | 1 | shadow map, sampled as depth |
//! | 2 | light-space matrix uniform |

use std::sync::Arc;

use glam::Mat4;
use multipass_core::LightingMode;
use multipass_rhi::buffer::{Buffer, BufferUsage};
use multipass_rhi::command::CommandBuffer;
use multipass_rhi::descriptor::{DescriptorManager, DescriptorSet};
use multipass_rhi::device::Device;
use multipass_rhi::pipeline::{ColorBlendAttachment, CullMode, GraphicsPipelineBuilder, Pipeline};
use multipass_rhi::render_pass::RenderPass;
use multipass_rhi::shader::ShaderStage;
use multipass_rhi::texture::Texture;
use multipass_rhi::vertex::Vertex;
use multipass_rhi::vk;
use multipass_rhi::{RhiError, RhiResult};
use tracing::{debug, info};

use crate::push_constants::{DrawPushConstants, PushConstantSchema};
use crate::shaders::ShaderLibrary;
use crate::shadow_map::SHADOW_MAP_LAYOUT;

pub const DIFFUSE_BINDING: u32 = 0;
pub const SHADOW_MAP_BINDING: u32 = 1;
pub const LIGHT_SPACE_BINDING: u32 = 2;

/// Binding table of the lit descriptor set.
pub const LIT_BINDINGS: [(u32, vk::DescriptorType); 3] = [
    (DIFFUSE_BINDING, vk::DescriptorType::COMBINED_IMAGE_SAMPLER),
    (SHADOW_MAP_BINDING, vk::DescriptorType::COMBINED_IMAGE_SAMPLER),
    (LIGHT_SPACE_BINDING, vk::DescriptorType::UNIFORM_BUFFER),
];

const LIGHT_SPACE_SIZE: vk::DeviceSize = std::mem::size_of::<Mat4>() as vk::DeviceSize;

/// Fragment shader used by each lighting mode. All share the `lit` vertex
/// shader.
pub fn fragment_shader_name(mode: LightingMode) -> &'static str {
    match mode {
        LightingMode::Unlit => "unlit",
        LightingMode::Flat => "flat",
        LightingMode::Shadowed => "shadowed",
    }
}

pub struct LightingPass {
    unlit: Pipeline,
    flat: Pipeline,
    shadowed: Pipeline,
    descriptor_set: DescriptorSet,
    // Owns the pool the set came from.
    _descriptors: DescriptorManager,
    light_space: Buffer,
    device: Arc<Device>,
}

impl LightingPass {
    /// Builds the three pipelines against `render_pass`, rasterizing at its
    /// sample count.
    pub fn new(
        device: Arc<Device>,
        render_pass: &RenderPass,
        shaders: &ShaderLibrary,
    ) -> RhiResult<Self> {
        let mut descriptors = DescriptorManager::new(device.clone());
        for (binding, descriptor_type) in LIT_BINDINGS {
            descriptors.set_descriptor(binding, descriptor_type, 1)?;
        }
        let set_layout = descriptors.create_layout()?;
        descriptors.create_pool()?;
        let descriptor_set = descriptors
            .create_descriptor_sets(1)?
            .pop()
            .ok_or_else(|| RhiError::InvalidState("lit descriptor set not allocated".to_string()))?;

        let light_space = Buffer::new(device.clone(), BufferUsage::Uniform, LIGHT_SPACE_SIZE)?;

        let samples = render_pass.desc().samples();
        let build = |mode: LightingMode| -> RhiResult<Pipeline> {
            GraphicsPipelineBuilder::new()
                .vertex_shader(shaders.load(&device, "lit", ShaderStage::Vertex)?)
                .fragment_shader(shaders.load(
                    &device,
                    fragment_shader_name(mode),
                    ShaderStage::Fragment,
                )?)
                .vertex_binding(Vertex::binding_description())
                .vertex_attributes(&Vertex::attribute_descriptions())
                .cull_mode(CullMode::None)
                .rasterization_samples(samples)
                .color_blend(ColorBlendAttachment::alpha_blend())
                .render_pass(render_pass.handle(), 0)
                .descriptor_set_layout(set_layout)
                .push_constants(DrawPushConstants::decl())
                .build(device.clone(), &format!("lighting-{}", mode.name()))
        };
        let unlit = build(LightingMode::Unlit)?;
        let flat = build(LightingMode::Flat)?;
        let shadowed = build(LightingMode::Shadowed)?;

        info!(
            "Lighting pass ready ({} sample(s), {} pipelines)",
            samples.as_raw(),
            LightingMode::ALL.len()
        );

        Ok(Self {
            unlit,
            flat,
            shadowed,
            descriptor_set,
            _descriptors: descriptors,
            light_space,
            device,
        })
    }

    /// Points the descriptor set at the diffuse texture, the shadow map and
    /// the light-space buffer, and commits the writes.
    pub fn bind_inputs(&mut self, diffuse: &Texture, shadow_map: &Texture) -> RhiResult<()> {
        for texture in [diffuse, shadow_map] {
            if !texture.is_complete() {
                return Err(RhiError::InvalidState(format!(
                    "texture '{}' has no view or sampler",
                    texture.name()
                )));
            }
        }

        self.descriptor_set.set_image(
            DIFFUSE_BINDING,
            diffuse.view(),
            diffuse.sampler(),
            diffuse.layout(),
        );
        self.descriptor_set.set_image(
            SHADOW_MAP_BINDING,
            shadow_map.view(),
            shadow_map.sampler(),
            SHADOW_MAP_LAYOUT,
        );
        self.descriptor_set
            .set_buffer(LIGHT_SPACE_BINDING, self.light_space.handle(), LIGHT_SPACE_SIZE);
        let written = self.descriptor_set.update(self.device.as_ref());
        debug!("Lit descriptor set: {} write(s)", written);
        Ok(())
    }

    /// Rewrites the light-space matrix. The buffer must not be in use by
    /// the GPU.
    pub fn update_light_space(&self, light_space: &Mat4) -> RhiResult<()> {
        self.light_space.update(bytemuck::bytes_of(light_space))
    }

    pub fn pipeline(&self, mode: LightingMode) -> &Pipeline {
        match mode {
            LightingMode::Unlit => &self.unlit,
            LightingMode::Flat => &self.flat,
            LightingMode::Shadowed => &self.shadowed,
        }
    }

    /// Layout shared by all three pipelines.
    #[inline]
    pub fn pipeline_layout(&self) -> vk::PipelineLayout {
        self.shadowed.layout()
    }

    pub fn bind_descriptor_set(&self, cmd: &CommandBuffer) {
        cmd.bind_descriptor_sets(self.pipeline_layout(), &[self.descriptor_set.handle()]);
    }
}

#[cfg(test)]
mod tests {
    use multipass_rhi::descriptor::DescriptorLayoutDecl;

    use super::*;

    #[test]
    fn test_lit_bindings_pool_sizes() {
        let mut decl = DescriptorLayoutDecl::new();
        for (binding, descriptor_type) in LIT_BINDINGS {
            decl.set_descriptor(binding, descriptor_type, 1);
        }
        assert_eq!(decl.len(), 3);

        let sizes = decl.pool_sizes(1);
        let count = |ty| {
            sizes
                .iter()
                .find(|size| size.ty == ty)
                .map_or(0, |size| size.descriptor_count)
        };
        assert_eq!(count(vk::DescriptorType::COMBINED_IMAGE_SAMPLER), 2);
        assert_eq!(count(vk::DescriptorType::UNIFORM_BUFFER), 1);
    }

    #[test]
    fn test_every_mode_has_its_own_fragment_shader() {
        let names: Vec<_> = LightingMode::ALL
            .iter()
            .map(|mode| fragment_shader_name(*mode))
            .collect();
        assert_eq!(names, ["unlit", "flat", "shadowed"]);
    }

    #[test]
    fn test_light_space_buffer_holds_one_matrix() {
        assert_eq!(LIGHT_SPACE_SIZE, 64);
    }
}
