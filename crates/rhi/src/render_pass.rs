//! Render passes and framebuffers.
//!
//! A [`RenderPassDesc`] is a plain description of a single-subpass render
//! pass: its attachments in framebuffer order (colors, then depth, then
//! resolves) and its external dependencies. The three passes the renderer
//! uses are built by [`RenderPassDesc::depth_only`],
//! [`RenderPassDesc::color_with_resolve`] and [`RenderPassDesc::present`].
//! [`RenderPass`] turns a description into a `VkRenderPass`.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{ResourceKind, RhiError, RhiResult};

/// What an attachment is used for in the subpass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttachmentRole {
    Color,
    Depth,
    Resolve,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttachmentDesc {
    pub role: AttachmentRole,
    pub format: vk::Format,
    pub samples: vk::SampleCountFlags,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub initial_layout: vk::ImageLayout,
    pub final_layout: vk::ImageLayout,
}

impl AttachmentDesc {
    fn to_vk(self) -> vk::AttachmentDescription {
        vk::AttachmentDescription::default()
            .format(self.format)
            .samples(self.samples)
            .load_op(self.load_op)
            .store_op(self.store_op)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(self.initial_layout)
            .final_layout(self.final_layout)
    }

    fn subpass_layout(self) -> vk::ImageLayout {
        match self.role {
            AttachmentRole::Color | AttachmentRole::Resolve => {
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
            }
            AttachmentRole::Depth => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        }
    }
}

/// Description of a single-subpass render pass.
#[derive(Clone, Debug)]
pub struct RenderPassDesc {
    attachments: Vec<AttachmentDesc>,
    dependencies: Vec<vk::SubpassDependency>,
}

impl RenderPassDesc {
    /// Depth-only pass whose output is sampled afterwards, as used for the
    /// shadow map.
    pub fn depth_only(format: vk::Format, final_layout: vk::ImageLayout) -> Self {
        let depth = AttachmentDesc {
            role: AttachmentRole::Depth,
            format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout,
        };

        let dependencies = vec![
            vk::SubpassDependency::default()
                .src_subpass(vk::SUBPASS_EXTERNAL)
                .dst_subpass(0)
                .src_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER)
                .dst_stage_mask(vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS)
                .src_access_mask(vk::AccessFlags::SHADER_READ)
                .dst_access_mask(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
                .dependency_flags(vk::DependencyFlags::BY_REGION),
            vk::SubpassDependency::default()
                .src_subpass(0)
                .dst_subpass(vk::SUBPASS_EXTERNAL)
                .src_stage_mask(vk::PipelineStageFlags::LATE_FRAGMENT_TESTS)
                .dst_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER)
                .src_access_mask(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
                .dst_access_mask(vk::AccessFlags::SHADER_READ)
                .dependency_flags(vk::DependencyFlags::BY_REGION),
        ];

        Self {
            attachments: vec![depth],
            dependencies,
        }
    }

    /// Color + depth pass rendered at `samples`, resolved into a
    /// single-sample color attachment when `samples` is above one.
    ///
    /// The color attachments end in `COLOR_ATTACHMENT_OPTIMAL`; the frame
    /// records an explicit barrier before they are sampled.
    pub fn color_with_resolve(
        color_format: vk::Format,
        depth_format: vk::Format,
        samples: vk::SampleCountFlags,
    ) -> Self {
        let mut attachments = vec![
            AttachmentDesc {
                role: AttachmentRole::Color,
                format: color_format,
                samples,
                load_op: vk::AttachmentLoadOp::CLEAR,
                // The multi-sampled image is an input of the post-process pass.
                store_op: vk::AttachmentStoreOp::STORE,
                initial_layout: vk::ImageLayout::UNDEFINED,
                final_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            },
            AttachmentDesc {
                role: AttachmentRole::Depth,
                format: depth_format,
                samples,
                load_op: vk::AttachmentLoadOp::CLEAR,
                store_op: vk::AttachmentStoreOp::DONT_CARE,
                initial_layout: vk::ImageLayout::UNDEFINED,
                final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            },
        ];
        if samples != vk::SampleCountFlags::TYPE_1 {
            attachments.push(AttachmentDesc {
                role: AttachmentRole::Resolve,
                format: color_format,
                samples: vk::SampleCountFlags::TYPE_1,
                load_op: vk::AttachmentLoadOp::DONT_CARE,
                store_op: vk::AttachmentStoreOp::STORE,
                initial_layout: vk::ImageLayout::UNDEFINED,
                final_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            });
        }

        let dependencies = vec![
            vk::SubpassDependency::default()
                .src_subpass(vk::SUBPASS_EXTERNAL)
                .dst_subpass(0)
                .src_stage_mask(
                    vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                        | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS
                        | vk::PipelineStageFlags::FRAGMENT_SHADER,
                )
                .dst_stage_mask(
                    vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                        | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
                )
                .src_access_mask(vk::AccessFlags::SHADER_READ)
                .dst_access_mask(
                    vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                        | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                ),
        ];

        Self {
            attachments,
            dependencies,
        }
    }

    /// Single color attachment presented to the swapchain.
    pub fn present(format: vk::Format) -> Self {
        let color = AttachmentDesc {
            role: AttachmentRole::Color,
            format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        };

        let dependencies = vec![
            vk::SubpassDependency::default()
                .src_subpass(vk::SUBPASS_EXTERNAL)
                .dst_subpass(0)
                .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
                .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
                .src_access_mask(vk::AccessFlags::empty())
                .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE),
        ];

        Self {
            attachments: vec![color],
            dependencies,
        }
    }

    #[inline]
    pub fn attachments(&self) -> &[AttachmentDesc] {
        &self.attachments
    }

    #[inline]
    pub fn attachment_count(&self) -> usize {
        self.attachments.len()
    }

    pub fn color_attachment_count(&self) -> usize {
        self.count(AttachmentRole::Color)
    }

    pub fn resolve_attachment_count(&self) -> usize {
        self.count(AttachmentRole::Resolve)
    }

    pub fn depth_attachment(&self) -> Option<&AttachmentDesc> {
        self.attachments
            .iter()
            .find(|a| a.role == AttachmentRole::Depth)
    }

    /// Sample count the subpass rasterizes at.
    pub fn samples(&self) -> vk::SampleCountFlags {
        self.attachments
            .iter()
            .find(|a| a.role != AttachmentRole::Resolve)
            .map_or(vk::SampleCountFlags::TYPE_1, |a| a.samples)
    }

    /// Clear values in attachment order.
    pub fn clear_values(&self, color: [f32; 4]) -> Vec<vk::ClearValue> {
        self.attachments
            .iter()
            .map(|a| match a.role {
                AttachmentRole::Depth => vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue {
                        depth: 1.0,
                        stencil: 0,
                    },
                },
                AttachmentRole::Color | AttachmentRole::Resolve => vk::ClearValue {
                    color: vk::ClearColorValue { float32: color },
                },
            })
            .collect()
    }

    fn count(&self, role: AttachmentRole) -> usize {
        self.attachments.iter().filter(|a| a.role == role).count()
    }

    fn references(&self, role: AttachmentRole) -> Vec<vk::AttachmentReference> {
        self.attachments
            .iter()
            .enumerate()
            .filter(|(_, a)| a.role == role)
            .map(|(index, a)| vk::AttachmentReference {
                attachment: index as u32,
                layout: a.subpass_layout(),
            })
            .collect()
    }
}

/// RAII wrapper for `VkRenderPass`.
pub struct RenderPass {
    device: Arc<Device>,
    render_pass: vk::RenderPass,
    desc: RenderPassDesc,
}

impl RenderPass {
    /// Creates the render pass described by `desc` and names it `name`.
    ///
    /// # Errors
    ///
    /// [`RhiError::ResourceCreationFailed`] if `vkCreateRenderPass` fails.
    pub fn new(device: Arc<Device>, desc: RenderPassDesc, name: &str) -> RhiResult<Self> {
        let attachments: Vec<vk::AttachmentDescription> =
            desc.attachments.iter().map(|a| a.to_vk()).collect();
        let color_refs = desc.references(AttachmentRole::Color);
        let resolve_refs = desc.references(AttachmentRole::Resolve);
        let depth_ref = desc.references(AttachmentRole::Depth).first().copied();

        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs);
        if !resolve_refs.is_empty() {
            subpass = subpass.resolve_attachments(&resolve_refs);
        }
        if let Some(depth_ref) = depth_ref.as_ref() {
            subpass = subpass.depth_stencil_attachment(depth_ref);
        }
        let subpasses = [subpass];

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&desc.dependencies);

        let render_pass = unsafe { device.handle().create_render_pass(&create_info, None) }
            .map_err(RhiError::creation(ResourceKind::RenderPass))?;

        device.set_debug_name(render_pass, name);
        debug!(
            "Created render pass '{}' ({} attachment(s))",
            name,
            desc.attachment_count()
        );

        Ok(Self {
            device,
            render_pass,
            desc,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }

    #[inline]
    pub fn desc(&self) -> &RenderPassDesc {
        &self.desc
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_render_pass(self.render_pass, None);
        }
        debug!("Render pass destroyed");
    }
}

/// Checks that a framebuffer supplies one view per attachment.
pub fn check_framebuffer_views(desc: &RenderPassDesc, view_count: usize) -> RhiResult<()> {
    if view_count != desc.attachment_count() {
        return Err(RhiError::InvalidState(format!(
            "framebuffer has {} view(s), render pass expects {}",
            view_count,
            desc.attachment_count()
        )));
    }
    Ok(())
}

/// RAII wrapper for `VkFramebuffer`.
pub struct Framebuffer {
    device: Arc<Device>,
    framebuffer: vk::Framebuffer,
    extent: vk::Extent2D,
}

impl Framebuffer {
    /// `views` must follow the render pass attachment order.
    pub fn new(
        device: Arc<Device>,
        render_pass: &RenderPass,
        views: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> RhiResult<Self> {
        check_framebuffer_views(render_pass.desc(), views.len())?;

        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass.handle())
            .attachments(views)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe { device.handle().create_framebuffer(&create_info, None) }
            .map_err(RhiError::creation(ResourceKind::Framebuffer))?;

        Ok(Self {
            device,
            framebuffer,
            extent,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_framebuffer(self.framebuffer, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_only_pass_has_single_depth_attachment() {
        let desc = RenderPassDesc::depth_only(
            vk::Format::D32_SFLOAT_S8_UINT,
            vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
        );

        assert_eq!(desc.attachment_count(), 1);
        assert_eq!(desc.color_attachment_count(), 0);
        assert_eq!(desc.resolve_attachment_count(), 0);

        let depth = desc.depth_attachment().unwrap();
        assert_eq!(depth.format, vk::Format::D32_SFLOAT_S8_UINT);
        assert_eq!(
            depth.final_layout,
            vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
        );
        assert_eq!(depth.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(desc.samples(), vk::SampleCountFlags::TYPE_1);
    }

    #[test]
    fn test_color_pass_with_msaa_resolves() {
        let desc = RenderPassDesc::color_with_resolve(
            vk::Format::R8G8B8A8_UNORM,
            vk::Format::D32_SFLOAT,
            vk::SampleCountFlags::TYPE_4,
        );

        assert_eq!(desc.attachment_count(), 3);
        assert_eq!(desc.color_attachment_count(), 1);
        assert_eq!(desc.resolve_attachment_count(), 1);
        assert_eq!(desc.samples(), vk::SampleCountFlags::TYPE_4);

        let roles: Vec<AttachmentRole> = desc.attachments().iter().map(|a| a.role).collect();
        assert_eq!(
            roles,
            vec![
                AttachmentRole::Color,
                AttachmentRole::Depth,
                AttachmentRole::Resolve
            ]
        );
        let resolve = desc.attachments()[2];
        assert_eq!(resolve.samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(
            resolve.final_layout,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        );
        // The multi-sampled color is kept for the post-process pass.
        assert_eq!(desc.attachments()[0].store_op, vk::AttachmentStoreOp::STORE);
    }

    #[test]
    fn test_color_pass_without_msaa_has_no_resolve() {
        let desc = RenderPassDesc::color_with_resolve(
            vk::Format::R8G8B8A8_UNORM,
            vk::Format::D32_SFLOAT,
            vk::SampleCountFlags::TYPE_1,
        );
        assert_eq!(desc.attachment_count(), 2);
        assert_eq!(desc.resolve_attachment_count(), 0);
    }

    #[test]
    fn test_present_pass_ends_presentable() {
        let desc = RenderPassDesc::present(vk::Format::B8G8R8A8_SRGB);
        assert_eq!(desc.attachment_count(), 1);
        assert!(desc.depth_attachment().is_none());
        assert_eq!(
            desc.attachments()[0].final_layout,
            vk::ImageLayout::PRESENT_SRC_KHR
        );
    }

    #[test]
    fn test_subpass_references_follow_attachment_order() {
        let desc = RenderPassDesc::color_with_resolve(
            vk::Format::R8G8B8A8_UNORM,
            vk::Format::D32_SFLOAT,
            vk::SampleCountFlags::TYPE_2,
        );
        let color = desc.references(AttachmentRole::Color);
        let depth = desc.references(AttachmentRole::Depth);
        let resolve = desc.references(AttachmentRole::Resolve);
        assert_eq!(color[0].attachment, 0);
        assert_eq!(depth[0].attachment, 1);
        assert_eq!(
            depth[0].layout,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        );
        assert_eq!(resolve[0].attachment, 2);
    }

    #[test]
    fn test_clear_values_match_attachments() {
        let desc = RenderPassDesc::depth_only(
            vk::Format::D32_SFLOAT_S8_UINT,
            vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
        );
        let clears = desc.clear_values([0.0; 4]);
        assert_eq!(clears.len(), 1);
        assert_eq!(unsafe { clears[0].depth_stencil.depth }, 1.0);
    }

    #[test]
    fn test_framebuffer_view_count_checked() {
        let desc = RenderPassDesc::present(vk::Format::B8G8R8A8_SRGB);
        assert!(check_framebuffer_views(&desc, 1).is_ok());
        assert!(check_framebuffer_views(&desc, 2).is_err());
    }
}
