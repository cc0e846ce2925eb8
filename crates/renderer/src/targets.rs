//! Off-screen targets of the color pass.
//!
//! The color pass renders into a multi-sampled color image and depth image
//! and resolves into a single-sample image. The post-process pass samples
//! the resolved image, or the multi-sampled one directly. With a single
//! sample there is no resolve attachment and the color image itself is the
//! resolved output. The post-process binding for multi-sampled input then
//! gets a 1x1 four-sample placeholder, since a `sampler2DMS` needs a
//! multi-sampled view even when the mode that reads it is never selected.

use std::sync::Arc;

use multipass_rhi::command::{CommandPool, image_layout_barrier, submit_one_shot};
use multipass_rhi::device::Device;
use multipass_rhi::render_pass::{Framebuffer, RenderPass, RenderPassDesc};
use multipass_rhi::texture::{Texture, TextureDesc};
use multipass_rhi::vk;
use multipass_rhi::RhiResult;
use tracing::info;

/// Depth format of the color pass.
pub const COLOR_PASS_DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Clear color of the color pass.
pub const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Sample count of the multi-sampled input placeholder. Four samples are
/// guaranteed for sampled color images on every Vulkan device.
pub const MS_PLACEHOLDER_SAMPLES: vk::SampleCountFlags = vk::SampleCountFlags::TYPE_4;

/// Sample count of the placeholder bound as multi-sampled input, if the
/// color image can't serve that binding itself.
pub fn ms_placeholder_samples(samples: vk::SampleCountFlags) -> Option<vk::SampleCountFlags> {
    (samples == vk::SampleCountFlags::TYPE_1).then_some(MS_PLACEHOLDER_SAMPLES)
}

pub struct ColorTarget {
    // Field order is drop order: the framebuffer goes before its views.
    framebuffer: Framebuffer,
    render_pass: RenderPass,
    color: Texture,
    depth: Texture,
    resolve: Option<Texture>,
    ms_placeholder: Option<Texture>,
    clear_values: Vec<vk::ClearValue>,
}

impl ColorTarget {
    pub fn new(
        device: Arc<Device>,
        format: vk::Format,
        extent: vk::Extent2D,
        samples: vk::SampleCountFlags,
    ) -> RhiResult<Self> {
        let desc = RenderPassDesc::color_with_resolve(format, COLOR_PASS_DEPTH_FORMAT, samples);
        let clear_values = desc.clear_values(CLEAR_COLOR);
        let render_pass = RenderPass::new(device.clone(), desc, "color-pass")?;

        let color = Texture::create_2d(
            device.clone(),
            "color-output",
            TextureDesc::new(
                format,
                extent.width,
                extent.height,
                vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            )
            .with_samples(samples),
        )?;
        let depth = Texture::create_2d(
            device.clone(),
            "color-depth",
            TextureDesc::new(
                COLOR_PASS_DEPTH_FORMAT,
                extent.width,
                extent.height,
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            )
            .with_samples(samples),
        )?;
        let resolve = if render_pass.desc().resolve_attachment_count() > 0 {
            Some(Texture::create_2d(
                device.clone(),
                "resolved-output",
                TextureDesc::new(
                    format,
                    extent.width,
                    extent.height,
                    vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
                ),
            )?)
        } else {
            None
        };

        let ms_placeholder = match ms_placeholder_samples(samples) {
            Some(placeholder_samples) => Some(Texture::create_2d(
                device.clone(),
                "ms-input-placeholder",
                TextureDesc::new(
                    format,
                    1,
                    1,
                    vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
                )
                .with_samples(placeholder_samples),
            )?),
            None => None,
        };

        let mut views = vec![color.view(), depth.view()];
        views.extend(resolve.as_ref().map(Texture::view));
        let framebuffer = Framebuffer::new(device, &render_pass, &views, extent)?;

        info!(
            "Color target {}x{} at {} sample(s), resolve {}",
            extent.width,
            extent.height,
            samples.as_raw(),
            resolve.is_some()
        );

        Ok(Self {
            framebuffer,
            render_pass,
            color,
            depth,
            resolve,
            ms_placeholder,
            clear_values,
        })
    }

    /// Moves the multi-sampled input placeholder, if any, into the layout the
    /// post-process pass samples it in. Call once before the first frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the one-shot command buffer fails to record or
    /// submit.
    pub fn prepare_ms_input(&self, device: &Arc<Device>, pool: &CommandPool) -> RhiResult<()> {
        let Some(placeholder) = &self.ms_placeholder else {
            return Ok(());
        };
        let image = placeholder.image();
        submit_one_shot(device, pool, |cmd| {
            cmd.pipeline_barrier(
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                &[image_layout_barrier(
                    image,
                    vk::ImageAspectFlags::COLOR,
                    vk::ImageLayout::UNDEFINED,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    vk::AccessFlags::empty(),
                    vk::AccessFlags::SHADER_READ,
                )],
            );
        })
    }

    #[inline]
    pub fn render_pass(&self) -> &RenderPass {
        &self.render_pass
    }

    #[inline]
    pub fn framebuffer(&self) -> vk::Framebuffer {
        self.framebuffer.handle()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.framebuffer.extent()
    }

    #[inline]
    pub fn samples(&self) -> vk::SampleCountFlags {
        self.color.samples()
    }

    #[inline]
    pub fn clear_values(&self) -> &[vk::ClearValue] {
        &self.clear_values
    }

    /// The multi-sampled color image.
    #[inline]
    pub fn color(&self) -> &Texture {
        &self.color
    }

    /// The single-sample output.
    pub fn resolved(&self) -> &Texture {
        self.resolve.as_ref().unwrap_or(&self.color)
    }

    /// The image bound as multi-sampled post-process input. This is always
    /// multi-sampled.
    pub fn ms_input(&self) -> &Texture {
        self.ms_placeholder.as_ref().unwrap_or(&self.color)
    }

    /// Images the post-process pass reads, without duplicates.
    pub fn sampled_images(&self) -> Vec<vk::Image> {
        let mut images = vec![self.color.image()];
        images.extend(self.resolve.as_ref().map(Texture::image));
        images
    }

    #[inline]
    pub fn depth(&self) -> &Texture {
        &self.depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_sample_needs_ms_placeholder() {
        assert_eq!(
            ms_placeholder_samples(vk::SampleCountFlags::TYPE_1),
            Some(vk::SampleCountFlags::TYPE_4)
        );
    }

    #[test]
    fn test_multi_sample_color_is_ms_input() {
        for samples in [
            vk::SampleCountFlags::TYPE_2,
            vk::SampleCountFlags::TYPE_4,
            vk::SampleCountFlags::TYPE_8,
        ] {
            assert_eq!(ms_placeholder_samples(samples), None);
        }
    }
}
