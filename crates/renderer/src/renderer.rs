//! The Vulkan frame backend.
//!
//! [`Renderer`] owns every GPU object of the application and implements
//! [`FrameBackend`] for the orchestrator. Per frame it records:
//!
//! 1. the shadow pass, drawing the scene object from the light;
//! 2. the color pass at the configured sample count: scene object and
//!    ground with the selected lighting pipeline, light marker unlit;
//! 3. a barrier moving the color outputs to a shader-readable layout;
//! 4. the post-process pass into the swapchain image;
//! 5. the overlay, if one is installed.
//!
//! # Resource Destruction Order
//!
//! Fields drop in declaration order after [`Drop::drop`] has waited for the
//! device: per-frame objects, passes and meshes first, then the swapchain,
//! the graphics context (the last device reference), the surface and
//! finally the instance.

use std::time::Duration;

use multipass_core::{Config, LightingMode, PostProcessMode};
use multipass_platform::{Surface, Window};
use multipass_resources::{GpuMesh, geometry, load_obj, texture};
use multipass_rhi::command::{CommandBuffer, CommandPool, image_layout_barrier};
use multipass_rhi::context::GraphicsContext;
use multipass_rhi::instance::Instance;
use multipass_rhi::physical_device::{clamp_sample_count, sample_count_value};
use multipass_rhi::swapchain::Swapchain;
use multipass_rhi::sync::FrameSync;
use multipass_rhi::texture::Texture;
use multipass_rhi::vk;
use multipass_rhi::{RhiError, RhiResult};
use tracing::{debug, error, info, warn};

use crate::error::RendererResult;
use crate::lighting_pass::LightingPass;
use crate::orchestrator::{FrameBackend, FrameScene};
use crate::post_process::PostProcessPass;
use crate::push_constants::{DrawPushConstants, PushConstantSchema};
use crate::shaders::ShaderLibrary;
use crate::shadow_map::ShadowMap;
use crate::targets::ColorTarget;

/// Draw commands recorded at the end of the post-process pass, on top of
/// the final image.
pub trait Overlay {
    fn record(&mut self, cmd: &CommandBuffer, extent: vk::Extent2D);
}

/// Bounds of the three blocking points of a frame.
#[derive(Clone, Copy, Debug)]
struct FrameTimeouts {
    acquire: Duration,
    fence: Duration,
    idle: Duration,
}

pub struct Renderer {
    overlay: Option<Box<dyn Overlay>>,

    command_buffers: Vec<CommandBuffer>,
    // Frees the command buffers when dropped.
    _command_pool: CommandPool,
    sync: FrameSync,

    post_process: PostProcessPass,
    lighting: LightingPass,
    color_target: ColorTarget,
    shadow_map: ShadowMap,

    _diffuse: Texture,
    cube: GpuMesh,
    mesh: Option<GpuMesh>,
    ground: GpuMesh,

    swapchain: Swapchain,
    context: GraphicsContext,
    _surface: Surface,
    _instance: Instance,

    lighting_mode: LightingMode,
    timeouts: FrameTimeouts,
}

impl Renderer {
    /// Creates every GPU object for `window` as described by `config`.
    ///
    /// # Errors
    ///
    /// Any setup failure: instance, surface, device, swapchain, pipeline,
    /// render target or asset creation. All of them are fatal.
    pub fn new(window: &Window, config: &Config) -> RendererResult<Self> {
        let width = window.width();
        let height = window.height();
        info!("Initializing Vulkan renderer ({}x{})", width, height);

        let instance = Instance::new(
            c"multipass",
            config.debug.validation,
            &window.required_extensions()?,
        )?;
        let surface = window.create_surface(&instance)?;
        let context = GraphicsContext::new(&instance, surface.handle(), surface.loader())?;
        let device = context.device().clone();

        let swapchain = Swapchain::new(&instance, device.clone(), surface.handle(), width, height)?;
        let extent = swapchain.extent();
        let format = swapchain.format();

        let supported = context.physical().framebuffer_sample_counts();
        let samples = clamp_sample_count(config.render.msaa_samples, supported);
        if sample_count_value(samples) != config.render.msaa_samples {
            warn!(
                "MSAA x{} not supported, using x{}",
                config.render.msaa_samples,
                sample_count_value(samples)
            );
        }

        let shaders = ShaderLibrary::new(&config.render.shader_dir);
        let shadow_map = ShadowMap::new(device.clone(), config.render.shadow_map_size, &shaders)?;
        let color_target = ColorTarget::new(device.clone(), format, extent, samples)?;
        let mut lighting = LightingPass::new(device.clone(), color_target.render_pass(), &shaders)?;
        let mut post_process =
            PostProcessPass::new(device.clone(), format, extent, swapchain.image_views(), &shaders)?;

        let command_pool = CommandPool::new(device.clone(), device.graphics_family())?;
        let command_buffers =
            CommandBuffer::allocate(&device, &command_pool, swapchain.image_count())?;
        let sync = FrameSync::new(device.clone())?;

        let image = texture::diffuse_image(config.render.texture.as_deref());
        let diffuse = texture::upload_image(device.clone(), &command_pool, "diffuse", &image)?;

        let cube = GpuMesh::upload(device.clone(), "cube", &geometry::cube())?;
        let mesh = match &config.render.mesh {
            Some(path) => Some(GpuMesh::upload(device.clone(), "mesh", &load_obj(path)?)?),
            None => None,
        };
        let ground = GpuMesh::upload(
            device.clone(),
            "ground",
            &geometry::grid(
                config.render.grid_size,
                config.render.grid_size,
                config.render.grid_splits,
            )?,
        )?;

        lighting.bind_inputs(&diffuse, shadow_map.texture())?;
        post_process.bind_input_image(color_target.resolved());
        color_target.prepare_ms_input(&device, &command_pool)?;
        post_process.bind_ms_input_image(color_target.ms_input());
        post_process.commit_inputs();
        post_process.use_mode(config.render.post_process);
        post_process.use_msaa_samples(sample_count_value(samples));

        info!(
            "Renderer initialized: {} swapchain images, MSAA x{}, shadow map {}",
            swapchain.image_count(),
            sample_count_value(samples),
            config.render.shadow_map_size
        );

        Ok(Self {
            overlay: None,
            command_buffers,
            _command_pool: command_pool,
            sync,
            post_process,
            lighting,
            color_target,
            shadow_map,
            _diffuse: diffuse,
            cube,
            mesh,
            ground,
            swapchain,
            context,
            _surface: surface,
            _instance: instance,
            lighting_mode: config.render.lighting,
            timeouts: FrameTimeouts {
                acquire: config.sync.acquire_timeout(),
                fence: config.sync.fence_timeout(),
                idle: config.sync.idle_timeout(),
            },
        })
    }

    pub fn set_lighting_mode(&mut self, mode: LightingMode) {
        if self.lighting_mode != mode {
            info!("Lighting mode: {}", mode.name());
        }
        self.lighting_mode = mode;
    }

    #[inline]
    pub fn lighting_mode(&self) -> LightingMode {
        self.lighting_mode
    }

    pub fn set_post_process_mode(&mut self, mode: PostProcessMode) {
        self.post_process.use_mode(mode);
    }

    #[inline]
    pub fn post_process_mode(&self) -> PostProcessMode {
        self.post_process.settings().mode
    }

    /// Samples the multi-sampled color image in the post-process pass
    /// instead of the resolved one. Has no effect at one sample.
    pub fn set_msaa_input(&mut self, enabled: bool) {
        self.post_process.use_msaa_input(enabled);
        debug!(
            "Post-process input: {}",
            if self.post_process.settings().reads_msaa_input() {
                "multi-sampled"
            } else {
                "resolved"
            }
        );
    }

    #[inline]
    pub fn msaa_input(&self) -> bool {
        self.post_process.settings().use_msaa_input
    }

    pub fn set_overlay(&mut self, overlay: Box<dyn Overlay>) {
        self.overlay = Some(overlay);
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    #[inline]
    pub fn msaa_samples(&self) -> u32 {
        sample_count_value(self.color_target.samples())
    }

    /// The scene object: the loaded mesh, or the cube.
    fn object(&self) -> &GpuMesh {
        self.mesh.as_ref().unwrap_or(&self.cube)
    }

    fn command_buffer(&self, image_index: u32) -> RhiResult<&CommandBuffer> {
        self.command_buffers.get(image_index as usize).ok_or_else(|| {
            RhiError::InvalidState(format!(
                "no command buffer for swapchain image {image_index}"
            ))
        })
    }

    fn record_shadow_pass(&self, cmd: &CommandBuffer, scene: &FrameScene) {
        let layout = self.shadow_map.pipeline_layout();
        self.shadow_map.begin_pass(cmd);
        cmd.push_constants(
            layout,
            DrawPushConstants::STAGES,
            &scene.light_constants().with_model(scene.cube_model),
        );
        self.object().draw(cmd);
        self.shadow_map.end_pass(cmd);
    }

    fn record_color_pass(&self, cmd: &CommandBuffer, scene: &FrameScene) {
        let target = &self.color_target;
        let extent = target.extent();
        cmd.begin_render_pass(
            target.render_pass().handle(),
            target.framebuffer(),
            extent,
            target.clear_values(),
        );
        cmd.set_viewport(&vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        });
        cmd.set_scissor(&vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        });

        // All lit pipelines share one layout, so the set survives pipeline
        // switches.
        let layout = self.lighting.pipeline_layout();
        let camera = scene.camera_constants();
        cmd.bind_graphics_pipeline(self.lighting.pipeline(self.lighting_mode).handle());
        self.lighting.bind_descriptor_set(cmd);

        cmd.push_constants(
            layout,
            DrawPushConstants::STAGES,
            &camera.with_model(scene.cube_model),
        );
        self.object().draw(cmd);

        cmd.push_constants(
            layout,
            DrawPushConstants::STAGES,
            &camera.with_model(scene.ground_model),
        );
        self.ground.draw(cmd);

        cmd.bind_graphics_pipeline(self.lighting.pipeline(LightingMode::Unlit).handle());
        cmd.push_constants(
            layout,
            DrawPushConstants::STAGES,
            &camera.with_model(scene.marker_model),
        );
        self.cube.draw(cmd);

        cmd.end_render_pass();
    }

    fn record_commands(
        &self,
        image_index: u32,
        scene: &FrameScene,
        overlay: Option<&mut Box<dyn Overlay>>,
    ) -> RhiResult<()> {
        let cmd = self.command_buffer(image_index)?;
        cmd.reset()?;
        cmd.begin()?;

        self.record_shadow_pass(cmd, scene);
        self.record_color_pass(cmd, scene);
        self.record_color_barrier(cmd);

        self.post_process.begin(cmd, image_index)?;
        self.post_process.draw(cmd);
        if let Some(overlay) = overlay {
            overlay.record(cmd, self.swapchain.extent());
        }
        self.post_process.end(cmd);

        cmd.end()
    }

    /// Makes the color pass writes visible to post-process sampling.
    fn record_color_barrier(&self, cmd: &CommandBuffer) {
        let barriers: Vec<_> = self
            .color_target
            .sampled_images()
            .into_iter()
            .map(|image| {
                image_layout_barrier(
                    image,
                    vk::ImageAspectFlags::COLOR,
                    vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                    vk::AccessFlags::SHADER_READ,
                )
            })
            .collect();
        cmd.pipeline_barrier(
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            &barriers,
        );
    }
}

impl FrameBackend for Renderer {
    fn reset_fence(&mut self) -> RhiResult<()> {
        self.sync.fence().reset()
    }

    fn acquire(&mut self) -> RhiResult<u32> {
        self.swapchain
            .acquire(self.sync.fence().handle(), self.timeouts.acquire)
    }

    fn wait_fence(&mut self) -> RhiResult<()> {
        self.sync.fence().wait(self.timeouts.fence)
    }

    fn update_uniforms(&mut self, scene: &FrameScene) -> RhiResult<()> {
        self.lighting.update_light_space(&scene.light_space())
    }

    fn record(&mut self, image_index: u32, scene: &FrameScene) -> RhiResult<()> {
        let mut overlay = self.overlay.take();
        let recorded = self.record_commands(image_index, scene, overlay.as_mut());
        self.overlay = overlay;
        recorded
    }

    fn submit(&mut self, image_index: u32) -> RhiResult<()> {
        let command_buffers = [self.command_buffer(image_index)?.handle()];
        let signal_semaphores = [self.sync.render_finished().handle()];
        let submit_info = vk::SubmitInfo::default()
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        self.sync.fence().reset()?;
        // SAFETY: the command buffer was just recorded and ended, and every
        // handle it references lives as long as `self`.
        unsafe {
            self.context
                .device()
                .submit_graphics(&[submit_info], self.sync.fence().handle())
        }
    }

    fn present(&mut self, image_index: u32) -> RhiResult<()> {
        self.swapchain.present(
            self.context.device().present_queue(),
            image_index,
            self.sync.render_finished().handle(),
        )
    }

    fn wait_idle(&mut self) -> RhiResult<()> {
        self.sync.fence().wait(self.timeouts.idle)?;
        self.context.device().wait_idle()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.context.device().wait_idle() {
            error!(
                "Failed to wait for device idle during renderer drop: {:?}",
                e
            );
        }
        info!("Renderer destroyed");
    }
}
