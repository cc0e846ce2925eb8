//! Graphics pipeline management.
//!
//! This module handles VkPipeline and VkPipelineLayout creation for
//! render-pass based graphics pipelines.
//!
//! # Overview
//!
//! - [`PipelineLayout`] wraps VkPipelineLayout for descriptor set and push constant configuration
//! - [`Pipeline`] owns a VkPipeline together with its layout
//! - [`GraphicsPipelineBuilder`] configures and builds a pipeline for one render pass and subpass
//!
//! The builder takes its shaders by value. Their modules are destroyed as
//! soon as the pipeline has been created, and the push-constant block each
//! shader declares is checked against the [`PushConstantDecl`] given to the
//! builder before anything is created.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::path::Path;
//! use multipass_rhi::device::Device;
//! use multipass_rhi::shader::{Shader, ShaderStage};
//! use multipass_rhi::pipeline::{GraphicsPipelineBuilder, PushConstantDecl};
//! use multipass_rhi::vertex::Vertex;
//! use ash::vk;
//!
//! # fn example(device: Arc<Device>, render_pass: vk::RenderPass) -> Result<(), multipass_rhi::RhiError> {
//! let vertex = Shader::from_spirv_file(device.clone(), Path::new("lit.vert.spv"), ShaderStage::Vertex)?;
//! let fragment = Shader::from_spirv_file(device.clone(), Path::new("lit.frag.spv"), ShaderStage::Fragment)?;
//!
//! let pipeline = GraphicsPipelineBuilder::new()
//!     .vertex_shader(vertex)
//!     .fragment_shader(fragment)
//!     .vertex_binding(Vertex::binding_description())
//!     .vertex_attributes(&Vertex::attribute_descriptions())
//!     .push_constants(PushConstantDecl::new("draw", 224, vk::ShaderStageFlags::ALL_GRAPHICS))
//!     .render_pass(render_pass, 0)
//!     .color_attachment_count(1)
//!     .build(device, "lit")?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{ResourceKind, RhiError, RhiResult};
use crate::shader::Shader;

/// Push-constant block a pipeline layout provides.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PushConstantDecl {
    /// Schema name, used in mismatch diagnostics.
    pub name: &'static str,
    pub size: u32,
    pub stages: vk::ShaderStageFlags,
}

impl PushConstantDecl {
    pub const fn new(name: &'static str, size: u32, stages: vk::ShaderStageFlags) -> Self {
        Self { name, size, stages }
    }

    pub fn to_vk(self) -> vk::PushConstantRange {
        vk::PushConstantRange {
            stage_flags: self.stages,
            offset: 0,
            size: self.size,
        }
    }
}

/// Checks a shader's reflected push-constant block against the layout's
/// declaration. A shader may read a prefix of the block, never past its end.
pub fn check_push_constants(
    stage: &'static str,
    shader_size: Option<u32>,
    decl: Option<PushConstantDecl>,
) -> RhiResult<()> {
    let Some(shader_size) = shader_size else {
        return Ok(());
    };
    let (schema, schema_size) = decl.map_or(("none", 0), |decl| (decl.name, decl.size));
    if shader_size > schema_size {
        return Err(RhiError::PushConstantMismatch {
            stage,
            schema,
            shader_size,
            schema_size,
        });
    }
    if shader_size < schema_size {
        debug!(
            "{} shader reads {} of {} push constant bytes of '{}'",
            stage, shader_size, schema_size, schema
        );
    }
    Ok(())
}

pub struct PipelineLayout {
    device: Arc<Device>,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    pub fn new(
        device: Arc<Device>,
        descriptor_set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> RhiResult<Self> {
        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(descriptor_set_layouts)
            .push_constant_ranges(push_constant_ranges);

        let layout = unsafe { device.handle().create_pipeline_layout(&create_info, None) }
            .map_err(RhiError::creation(ResourceKind::PipelineLayout))?;

        debug!(
            "Created pipeline layout with {} descriptor set layout(s) and {} push constant range(s)",
            descriptor_set_layouts.len(),
            push_constant_ranges.len()
        );

        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_pipeline_layout(self.layout, None);
        }
        debug!("Pipeline layout destroyed");
    }
}

/// A graphics pipeline and the layout it was built with.
///
/// Only valid inside the render pass and subpass it was built against.
pub struct Pipeline {
    device: Arc<Device>,
    pipeline: vk::Pipeline,
    layout: PipelineLayout,
    name: String,
}

impl Pipeline {
    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    #[inline]
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout.handle()
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_pipeline(self.pipeline, None);
        }
        debug!("Pipeline '{}' destroyed", self.name);
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
}

impl CullMode {
    pub fn to_vk(self) -> vk::CullModeFlags {
        match self {
            CullMode::None => vk::CullModeFlags::NONE,
            CullMode::Front => vk::CullModeFlags::FRONT,
            CullMode::Back => vk::CullModeFlags::BACK,
        }
    }
}

/// Winding of front-facing triangles. The renderer uses counter-clockwise
/// throughout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrontFace {
    #[default]
    CounterClockwise,
    Clockwise,
}

impl FrontFace {
    pub fn to_vk(self) -> vk::FrontFace {
        match self {
            FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
            FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompareOp {
    Never,
    #[default]
    Less,
    LessOrEqual,
    Always,
}

impl CompareOp {
    pub fn to_vk(self) -> vk::CompareOp {
        match self {
            CompareOp::Never => vk::CompareOp::NEVER,
            CompareOp::Less => vk::CompareOp::LESS,
            CompareOp::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
            CompareOp::Always => vk::CompareOp::ALWAYS,
        }
    }
}

/// Per-attachment color blend state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColorBlendAttachment {
    pub blend_enable: bool,
    pub color_write_mask: vk::ColorComponentFlags,
}

impl Default for ColorBlendAttachment {
    fn default() -> Self {
        Self {
            blend_enable: false,
            color_write_mask: vk::ColorComponentFlags::RGBA,
        }
    }
}

impl ColorBlendAttachment {
    /// `src * src_alpha + dst * (1 - src_alpha)`
    pub fn alpha_blend() -> Self {
        Self {
            blend_enable: true,
            color_write_mask: vk::ColorComponentFlags::RGBA,
        }
    }

    pub fn to_vk(&self) -> vk::PipelineColorBlendAttachmentState {
        let state = vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(self.blend_enable)
            .color_write_mask(self.color_write_mask);
        if !self.blend_enable {
            return state;
        }
        state
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct DepthBias {
    constant_factor: f32,
    clamp: f32,
    slope_factor: f32,
}

/// Builder for graphics pipelines.
///
/// Defaults: triangle list, fill, back-face culling, counter-clockwise front
/// face, depth test and write with `Less`, one sample, one opaque color
/// attachment, dynamic viewport and scissor.
pub struct GraphicsPipelineBuilder {
    vertex_shader: Option<Shader>,
    fragment_shader: Option<Shader>,

    vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    vertex_attributes: Vec<vk::VertexInputAttributeDescription>,

    cull_mode: CullMode,
    front_face: FrontFace,
    depth_bias: Option<DepthBias>,

    rasterization_samples: vk::SampleCountFlags,

    depth_test_enable: bool,
    depth_write_enable: bool,
    depth_compare_op: CompareOp,

    color_attachment_count: u32,
    color_blend: ColorBlendAttachment,

    render_pass: vk::RenderPass,
    subpass: u32,

    descriptor_set_layouts: Vec<vk::DescriptorSetLayout>,
    push_constants: Option<PushConstantDecl>,

    dynamic_states: Vec<vk::DynamicState>,
}

impl Default for GraphicsPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsPipelineBuilder {
    pub fn new() -> Self {
        Self {
            vertex_shader: None,
            fragment_shader: None,

            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),

            cull_mode: CullMode::Back,
            front_face: FrontFace::CounterClockwise,
            depth_bias: None,

            rasterization_samples: vk::SampleCountFlags::TYPE_1,

            depth_test_enable: true,
            depth_write_enable: true,
            depth_compare_op: CompareOp::Less,

            color_attachment_count: 1,
            color_blend: ColorBlendAttachment::default(),

            render_pass: vk::RenderPass::null(),
            subpass: 0,

            descriptor_set_layouts: Vec::new(),
            push_constants: None,

            dynamic_states: vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],
        }
    }

    pub fn vertex_shader(mut self, shader: Shader) -> Self {
        self.vertex_shader = Some(shader);
        self
    }

    pub fn fragment_shader(mut self, shader: Shader) -> Self {
        self.fragment_shader = Some(shader);
        self
    }

    pub fn vertex_binding(mut self, binding: vk::VertexInputBindingDescription) -> Self {
        self.vertex_bindings.push(binding);
        self
    }

    pub fn vertex_attributes(mut self, attributes: &[vk::VertexInputAttributeDescription]) -> Self {
        self.vertex_attributes.extend_from_slice(attributes);
        self
    }

    pub fn cull_mode(mut self, mode: CullMode) -> Self {
        self.cull_mode = mode;
        self
    }

    pub fn front_face(mut self, face: FrontFace) -> Self {
        self.front_face = face;
        self
    }

    /// Enables depth bias with the given constant, clamp and slope factors.
    pub fn depth_bias(mut self, constant_factor: f32, clamp: f32, slope_factor: f32) -> Self {
        self.depth_bias = Some(DepthBias {
            constant_factor,
            clamp,
            slope_factor,
        });
        self
    }

    pub fn rasterization_samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.rasterization_samples = samples;
        self
    }

    pub fn depth_test_enable(mut self, enable: bool) -> Self {
        self.depth_test_enable = enable;
        self
    }

    pub fn depth_write_enable(mut self, enable: bool) -> Self {
        self.depth_write_enable = enable;
        self
    }

    pub fn depth_compare_op(mut self, op: CompareOp) -> Self {
        self.depth_compare_op = op;
        self
    }

    /// Number of color attachments in the target subpass. Zero for
    /// depth-only passes.
    pub fn color_attachment_count(mut self, count: u32) -> Self {
        self.color_attachment_count = count;
        self
    }

    pub fn color_blend(mut self, attachment: ColorBlendAttachment) -> Self {
        self.color_blend = attachment;
        self
    }

    pub fn render_pass(mut self, render_pass: vk::RenderPass, subpass: u32) -> Self {
        self.render_pass = render_pass;
        self.subpass = subpass;
        self
    }

    pub fn descriptor_set_layout(mut self, layout: vk::DescriptorSetLayout) -> Self {
        self.descriptor_set_layouts.push(layout);
        self
    }

    pub fn push_constants(mut self, decl: PushConstantDecl) -> Self {
        self.push_constants = Some(decl);
        self
    }

    pub fn dynamic_state(mut self, state: vk::DynamicState) -> Self {
        if !self.dynamic_states.contains(&state) {
            self.dynamic_states.push(state);
        }
        self
    }

    /// Checks everything that can be checked without a device.
    fn validate(&self) -> RhiResult<(&Shader, &Shader)> {
        let vertex_shader = self
            .vertex_shader
            .as_ref()
            .ok_or_else(|| RhiError::InvalidState("vertex shader is required".to_string()))?;
        let fragment_shader = self
            .fragment_shader
            .as_ref()
            .ok_or_else(|| RhiError::InvalidState("fragment shader is required".to_string()))?;
        if self.render_pass == vk::RenderPass::null() {
            return Err(RhiError::InvalidState(
                "a render pass is required".to_string(),
            ));
        }

        for shader in [vertex_shader, fragment_shader] {
            check_push_constants(
                shader.stage().name(),
                shader.push_constant_size(),
                self.push_constants,
            )?;
        }
        Ok((vertex_shader, fragment_shader))
    }

    /// Builds the pipeline and its layout, then destroys the shader modules.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidState`] when a shader or the render pass is
    /// missing, [`RhiError::PushConstantMismatch`] when a shader reads past
    /// the declared push-constant block, [`RhiError::ResourceCreationFailed`]
    /// when Vulkan object creation fails.
    pub fn build(self, device: Arc<Device>, name: &str) -> RhiResult<Pipeline> {
        let (vertex_shader, fragment_shader) = self.validate()?;

        let push_constant_ranges: Vec<vk::PushConstantRange> =
            self.push_constants.iter().map(|decl| decl.to_vk()).collect();
        let layout = PipelineLayout::new(
            device.clone(),
            &self.descriptor_set_layouts,
            &push_constant_ranges,
        )?;

        let shader_stages = [
            vertex_shader.stage_create_info(),
            fragment_shader.stage_create_info(),
        ];

        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&self.vertex_bindings)
            .vertex_attribute_descriptions(&self.vertex_attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Viewport and scissor are dynamic.
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let bias = self.depth_bias.unwrap_or(DepthBias {
            constant_factor: 0.0,
            clamp: 0.0,
            slope_factor: 0.0,
        });
        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(self.cull_mode.to_vk())
            .front_face(self.front_face.to_vk())
            .depth_bias_enable(self.depth_bias.is_some())
            .depth_bias_constant_factor(bias.constant_factor)
            .depth_bias_clamp(bias.clamp)
            .depth_bias_slope_factor(bias.slope_factor);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(self.rasterization_samples)
            .min_sample_shading(1.0);

        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(self.depth_test_enable)
            .depth_write_enable(self.depth_write_enable)
            .depth_compare_op(self.depth_compare_op.to_vk())
            .depth_bounds_test_enable(false)
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0)
            .stencil_test_enable(false);

        let color_blend_attachments: Vec<vk::PipelineColorBlendAttachmentState> = (0..self
            .color_attachment_count)
            .map(|_| self.color_blend.to_vk())
            .collect();

        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments)
            .blend_constants([0.0; 4]);

        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&self.dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(layout.handle())
            .render_pass(self.render_pass)
            .subpass(self.subpass);

        let created = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        };
        let pipeline = match created {
            Ok(pipelines) => pipelines[0],
            Err((pipelines, result)) => {
                for pipeline in pipelines.into_iter().filter(|p| *p != vk::Pipeline::null()) {
                    unsafe { device.handle().destroy_pipeline(pipeline, None) };
                }
                warn!("Pipeline '{}' creation failed: {}", name, result);
                return Err(RhiError::ResourceCreationFailed {
                    kind: ResourceKind::Pipeline,
                    result,
                });
            }
        };

        device.set_debug_name(pipeline, name);
        info!(
            "Graphics pipeline '{}' created ({} color attachment(s), {:?})",
            name, self.color_attachment_count, self.rasterization_samples
        );

        // `self` drops here and takes the shader modules with it.
        Ok(Pipeline {
            device,
            pipeline,
            layout,
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DRAW: PushConstantDecl =
        PushConstantDecl::new("draw", 224, vk::ShaderStageFlags::ALL_GRAPHICS);

    #[test]
    fn test_cull_mode_to_vk() {
        assert_eq!(CullMode::None.to_vk(), vk::CullModeFlags::NONE);
        assert_eq!(CullMode::Front.to_vk(), vk::CullModeFlags::FRONT);
        assert_eq!(CullMode::Back.to_vk(), vk::CullModeFlags::BACK);
    }

    #[test]
    fn test_front_face_to_vk() {
        assert_eq!(
            FrontFace::CounterClockwise.to_vk(),
            vk::FrontFace::COUNTER_CLOCKWISE
        );
        assert_eq!(FrontFace::Clockwise.to_vk(), vk::FrontFace::CLOCKWISE);
        assert_eq!(FrontFace::default(), FrontFace::CounterClockwise);
    }

    #[test]
    fn test_compare_op_to_vk() {
        assert_eq!(CompareOp::Never.to_vk(), vk::CompareOp::NEVER);
        assert_eq!(CompareOp::Less.to_vk(), vk::CompareOp::LESS);
        assert_eq!(CompareOp::LessOrEqual.to_vk(), vk::CompareOp::LESS_OR_EQUAL);
        assert_eq!(CompareOp::Always.to_vk(), vk::CompareOp::ALWAYS);
    }

    #[test]
    fn test_color_blend_attachment_default() {
        let state = ColorBlendAttachment::default().to_vk();
        assert_eq!(state.blend_enable, vk::FALSE);
        assert_eq!(state.color_write_mask, vk::ColorComponentFlags::RGBA);
    }

    #[test]
    fn test_color_blend_attachment_alpha_blend() {
        let state = ColorBlendAttachment::alpha_blend().to_vk();
        assert_eq!(state.blend_enable, vk::TRUE);
        assert_eq!(state.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(
            state.dst_color_blend_factor,
            vk::BlendFactor::ONE_MINUS_SRC_ALPHA
        );
    }

    #[test]
    fn test_push_constant_decl_range() {
        let range = DRAW.to_vk();
        assert_eq!(range.offset, 0);
        assert_eq!(range.size, 224);
        assert_eq!(range.stage_flags, vk::ShaderStageFlags::ALL_GRAPHICS);
    }

    #[test]
    fn test_push_constants_within_schema() {
        assert!(check_push_constants("vertex", Some(224), Some(DRAW)).is_ok());
        // A shader may use a prefix of the block.
        assert!(check_push_constants("vertex", Some(192), Some(DRAW)).is_ok());
        assert!(check_push_constants("fragment", None, Some(DRAW)).is_ok());
        assert!(check_push_constants("fragment", None, None).is_ok());
    }

    #[test]
    fn test_push_constants_past_schema_end() {
        let err = check_push_constants("fragment", Some(240), Some(DRAW)).unwrap_err();
        assert!(matches!(
            err,
            RhiError::PushConstantMismatch {
                stage: "fragment",
                schema: "draw",
                shader_size: 240,
                schema_size: 224,
            }
        ));
    }

    #[test]
    fn test_push_constants_without_schema() {
        let err = check_push_constants("vertex", Some(16), None).unwrap_err();
        assert!(matches!(
            err,
            RhiError::PushConstantMismatch {
                schema: "none",
                schema_size: 0,
                ..
            }
        ));
    }

    #[test]
    fn test_graphics_pipeline_builder_default() {
        let builder = GraphicsPipelineBuilder::new();
        assert!(builder.vertex_shader.is_none());
        assert!(builder.fragment_shader.is_none());
        assert!(builder.vertex_bindings.is_empty());
        assert_eq!(builder.cull_mode, CullMode::Back);
        assert_eq!(builder.front_face, FrontFace::CounterClockwise);
        assert!(builder.depth_test_enable);
        assert!(builder.depth_write_enable);
        assert!(builder.depth_bias.is_none());
        assert_eq!(builder.color_attachment_count, 1);
        assert_eq!(builder.dynamic_states.len(), 2);
    }

    #[test]
    fn test_graphics_pipeline_builder_depth_only() {
        let builder = GraphicsPipelineBuilder::new()
            .color_attachment_count(0)
            .depth_bias(1.25, 0.0, 1.75)
            .cull_mode(CullMode::None);
        assert_eq!(builder.color_attachment_count, 0);
        assert_eq!(
            builder.depth_bias,
            Some(DepthBias {
                constant_factor: 1.25,
                clamp: 0.0,
                slope_factor: 1.75,
            })
        );
    }

    #[test]
    fn test_graphics_pipeline_builder_dynamic_state() {
        let builder = GraphicsPipelineBuilder::new()
            .dynamic_state(vk::DynamicState::DEPTH_BIAS)
            .dynamic_state(vk::DynamicState::DEPTH_BIAS);
        assert!(builder.dynamic_states.contains(&vk::DynamicState::VIEWPORT));
        assert!(builder.dynamic_states.contains(&vk::DynamicState::SCISSOR));
        assert_eq!(
            builder
                .dynamic_states
                .iter()
                .filter(|s| **s == vk::DynamicState::DEPTH_BIAS)
                .count(),
            1
        );
    }

    #[test]
    fn test_build_requires_shaders() {
        assert!(matches!(
            GraphicsPipelineBuilder::new().validate(),
            Err(RhiError::InvalidState(_))
        ));
    }
}
