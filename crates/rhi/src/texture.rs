//! 2D images with their memory, view and sampler.
//!
//! [`Texture::create_2d`] allocates a device-local image. When the usage says
//! the image is sampled, rendered to or read as an attachment, a 2D view and
//! the default sampler (linear filtering, clamp to edge) are created with it;
//! otherwise the texture has no view.
//!
//! A texture is complete (usable through a descriptor) once it has both a
//! view and a sampler and a defined format.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::Allocation;
use tracing::debug;

use crate::buffer::{Buffer, BufferUsage};
use crate::command::{CommandPool, image_layout_barrier, submit_one_shot};
use crate::device::Device;
use crate::error::{ResourceKind, RhiError, RhiResult};
use crate::release::{HandleReleaser, ImageHandles};

/// Usage bits that make a texture get a view and sampler.
const VIEW_USAGE: vk::ImageUsageFlags = vk::ImageUsageFlags::from_raw(
    vk::ImageUsageFlags::SAMPLED.as_raw()
        | vk::ImageUsageFlags::STORAGE.as_raw()
        | vk::ImageUsageFlags::COLOR_ATTACHMENT.as_raw()
        | vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT.as_raw()
        | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT.as_raw()
        | vk::ImageUsageFlags::INPUT_ATTACHMENT.as_raw(),
);

/// Whether an image with `usage` gets a view and sampler.
#[inline]
pub fn needs_view(usage: vk::ImageUsageFlags) -> bool {
    usage.intersects(VIEW_USAGE)
}

/// Aspect used for views of `format`.
///
/// Depth formats are viewed through their depth aspect only, which is what
/// both the depth attachment and the shadow sampler read.
pub fn image_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM
        | vk::Format::D32_SFLOAT
        | vk::Format::X8_D24_UNORM_PACK32
        | vk::Format::D16_UNORM_S8_UINT
        | vk::Format::D24_UNORM_S8_UINT
        | vk::Format::D32_SFLOAT_S8_UINT => vk::ImageAspectFlags::DEPTH,
        _ => vk::ImageAspectFlags::COLOR,
    }
}

/// Description of a 2D image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureDesc {
    pub format: vk::Format,
    pub width: u32,
    pub height: u32,
    pub usage: vk::ImageUsageFlags,
    pub samples: vk::SampleCountFlags,
}

impl TextureDesc {
    pub fn new(format: vk::Format, width: u32, height: u32, usage: vk::ImageUsageFlags) -> Self {
        Self {
            format,
            width,
            height,
            usage,
            samples: vk::SampleCountFlags::TYPE_1,
        }
    }

    pub fn with_samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.samples = samples;
        self
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.width,
            height: self.height,
        }
    }
}

/// A device-local 2D image and the handles that go with it.
pub struct Texture {
    device: Arc<Device>,
    handles: Option<ImageHandles<Allocation>>,
    desc: TextureDesc,
    layout: vk::ImageLayout,
    name: String,
}

impl Texture {
    /// Allocates a 2D image, binds its memory and, when the usage calls for
    /// it, creates the view and the default sampler.
    ///
    /// Partially created handles are released before an error is returned.
    ///
    /// # Errors
    ///
    /// - [`RhiError::InvalidState`] for a zero extent or an undefined format
    /// - [`RhiError::NoCompatibleMemoryType`] when no memory type can back
    ///   the image
    /// - [`RhiError::ResourceCreationFailed`] when an image, view or sampler
    ///   cannot be created
    pub fn create_2d(device: Arc<Device>, name: &str, desc: TextureDesc) -> RhiResult<Self> {
        if desc.width == 0 || desc.height == 0 || desc.format == vk::Format::UNDEFINED {
            return Err(RhiError::InvalidState(format!(
                "texture '{name}' needs a format and a non-zero size"
            )));
        }

        let handle = device.handle();
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(vk::Extent3D {
                width: desc.width,
                height: desc.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(desc.samples)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { handle.create_image(&image_info, None) }
            .map_err(RhiError::creation(ResourceKind::Image))?;

        let requirements = unsafe { handle.get_image_memory_requirements(image) };
        let allocation = match device.allocate(name, requirements, MemoryLocation::GpuOnly, false)
        {
            Ok(allocation) => allocation,
            Err(e) => {
                device.destroy_image(image);
                return Err(e);
            }
        };

        let mut handles = ImageHandles {
            image,
            memory: allocation,
            view: None,
            sampler: None,
        };

        if let Err(result) = unsafe {
            handle.bind_image_memory(image, handles.memory.memory(), handles.memory.offset())
        } {
            handles.release(device.as_ref());
            return Err(RhiError::ResourceCreationFailed {
                kind: ResourceKind::Memory,
                result,
            });
        }

        if needs_view(desc.usage) {
            match create_view(&device, image, desc.format).and_then(|view| {
                handles.view = Some(view);
                create_default_sampler(&device)
            }) {
                Ok(sampler) => handles.sampler = Some(sampler),
                Err(e) => {
                    handles.release(device.as_ref());
                    return Err(e);
                }
            }
        }

        device.set_debug_name(image, name);
        debug!(
            "Created texture '{}': {}x{} {:?}, {:?}, view {}",
            name,
            desc.width,
            desc.height,
            desc.format,
            desc.samples,
            handles.view.is_some()
        );

        Ok(Self {
            device,
            handles: Some(handles),
            desc,
            layout: vk::ImageLayout::UNDEFINED,
            name: name.to_string(),
        })
    }

    /// Creates a sampled RGBA8 texture and fills it from `pixels`.
    pub fn from_rgba8(
        device: Arc<Device>,
        pool: &CommandPool,
        name: &str,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> RhiResult<Self> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(RhiError::InvalidState(format!(
                "texture '{name}' expects {expected} bytes of RGBA8, got {}",
                pixels.len()
            )));
        }

        let staging = Buffer::new_with_data(device.clone(), BufferUsage::Staging, pixels)?;
        let mut texture = Self::create_2d(
            device,
            name,
            TextureDesc::new(
                vk::Format::R8G8B8A8_UNORM,
                width,
                height,
                vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            ),
        )?;
        texture.upload_from_staging(pool, &staging)?;
        Ok(texture)
    }

    /// Copies `staging` into the image.
    ///
    /// The image goes `UNDEFINED` to `TRANSFER_DST_OPTIMAL`, receives the
    /// copy, then moves to `GENERAL`. The call blocks until the device is
    /// idle, so it is only meant for load time.
    pub fn upload_from_staging(&mut self, pool: &CommandPool, staging: &Buffer) -> RhiResult<()> {
        let image = self.image();
        let aspect = image_aspect(self.desc.format);
        let extent = vk::Extent3D {
            width: self.desc.width,
            height: self.desc.height,
            depth: 1,
        };

        submit_one_shot(&self.device, pool, |cmd| {
            cmd.pipeline_barrier(
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
                &[image_layout_barrier(
                    image,
                    aspect,
                    vk::ImageLayout::UNDEFINED,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::AccessFlags::empty(),
                    vk::AccessFlags::TRANSFER_WRITE,
                )],
            );

            let region = vk::BufferImageCopy::default()
                .buffer_offset(0)
                .image_subresource(
                    vk::ImageSubresourceLayers::default()
                        .aspect_mask(aspect)
                        .mip_level(0)
                        .base_array_layer(0)
                        .layer_count(1),
                )
                .image_extent(extent);
            cmd.copy_buffer_to_image(
                staging.handle(),
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );

            cmd.pipeline_barrier(
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                &[image_layout_barrier(
                    image,
                    aspect,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ImageLayout::GENERAL,
                    vk::AccessFlags::TRANSFER_WRITE,
                    vk::AccessFlags::SHADER_READ,
                )],
            );
        })?;

        self.layout = vk::ImageLayout::GENERAL;
        debug!("Uploaded {} bytes into texture '{}'", staging.size(), self.name);
        Ok(())
    }

    /// Whether the texture can be bound as a combined image sampler.
    pub fn is_complete(&self) -> bool {
        self.desc.format != vk::Format::UNDEFINED
            && self
                .handles
                .as_ref()
                .is_some_and(|h| h.view.is_some() && h.sampler.is_some())
    }

    #[inline]
    pub fn image(&self) -> vk::Image {
        self.handles.as_ref().map_or(vk::Image::null(), |h| h.image)
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.handles
            .as_ref()
            .and_then(|h| h.view)
            .unwrap_or(vk::ImageView::null())
    }

    #[inline]
    pub fn sampler(&self) -> vk::Sampler {
        self.handles
            .as_ref()
            .and_then(|h| h.sampler)
            .unwrap_or(vk::Sampler::null())
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.desc.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.desc.extent()
    }

    #[inline]
    pub fn samples(&self) -> vk::SampleCountFlags {
        self.desc.samples
    }

    /// Layout the image was left in by the last upload.
    #[inline]
    pub fn layout(&self) -> vk::ImageLayout {
        self.layout
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        if let Some(handles) = self.handles.take() {
            handles.release(self.device.as_ref());
            debug!("Destroyed texture '{}'", self.name);
        }
    }
}

fn create_view(device: &Device, image: vk::Image, format: vk::Format) -> RhiResult<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping::default())
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(image_aspect(format))
                .base_mip_level(0)
                .level_count(1)
                .base_array_layer(0)
                .layer_count(1),
        );

    unsafe { device.handle().create_image_view(&create_info, None) }
        .map_err(RhiError::creation(ResourceKind::ImageView))
}

/// Sampler settings every texture gets.
pub fn default_sampler_info() -> vk::SamplerCreateInfo<'static> {
    vk::SamplerCreateInfo::default()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .mip_lod_bias(0.0)
        .anisotropy_enable(false)
        .max_anisotropy(1.0)
        .compare_enable(false)
        .min_lod(0.0)
        .max_lod(1.0)
        .border_color(vk::BorderColor::FLOAT_OPAQUE_WHITE)
        .unnormalized_coordinates(false)
}

fn create_default_sampler(device: &Device) -> RhiResult<vk::Sampler> {
    unsafe { device.handle().create_sampler(&default_sampler_info(), None) }
        .map_err(RhiError::creation(ResourceKind::Sampler))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_created_for_render_and_sample_usage() {
        assert!(needs_view(vk::ImageUsageFlags::SAMPLED));
        assert!(needs_view(vk::ImageUsageFlags::COLOR_ATTACHMENT));
        assert!(needs_view(
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC
        ));
        assert!(needs_view(vk::ImageUsageFlags::INPUT_ATTACHMENT));
        assert!(!needs_view(vk::ImageUsageFlags::TRANSFER_DST));
        assert!(!needs_view(vk::ImageUsageFlags::empty()));
    }

    #[test]
    fn test_depth_formats_use_depth_aspect() {
        assert_eq!(
            image_aspect(vk::Format::D32_SFLOAT_S8_UINT),
            vk::ImageAspectFlags::DEPTH
        );
        assert_eq!(image_aspect(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
        assert_eq!(
            image_aspect(vk::Format::B8G8R8A8_SRGB),
            vk::ImageAspectFlags::COLOR
        );
    }

    #[test]
    fn test_default_sampler_is_linear_clamped() {
        let info = default_sampler_info();
        assert_eq!(info.mag_filter, vk::Filter::LINEAR);
        assert_eq!(info.min_filter, vk::Filter::LINEAR);
        assert_eq!(info.mipmap_mode, vk::SamplerMipmapMode::LINEAR);
        assert_eq!(info.address_mode_u, vk::SamplerAddressMode::CLAMP_TO_EDGE);
        assert_eq!(info.address_mode_v, vk::SamplerAddressMode::CLAMP_TO_EDGE);
    }

    #[test]
    fn test_texture_desc_defaults_to_single_sample() {
        let desc = TextureDesc::new(
            vk::Format::R8G8B8A8_UNORM,
            64,
            32,
            vk::ImageUsageFlags::SAMPLED,
        );
        assert_eq!(desc.samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(desc.extent().width, 64);
        assert_eq!(
            desc.with_samples(vk::SampleCountFlags::TYPE_4).samples,
            vk::SampleCountFlags::TYPE_4
        );
    }
}
