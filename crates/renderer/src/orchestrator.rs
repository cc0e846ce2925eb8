//! Per-frame acquire, record, submit, present and idle sequence.
//!
//! [`FrameOrchestrator`] owns the ordering and the error policy; a
//! [`FrameBackend`] owns the GPU objects and performs each step. One frame
//! is in flight at a time: every frame ends with the device idle, so any
//! resource may be touched between frames.
//!
//! Per-frame errors skip the frame. [`RhiError::is_fatal_per_frame`] errors
//! stop the loop, and so does a run of skipped frames longer than the
//! configured limit.

use glam::{Mat4, Vec3};
use multipass_rhi::{RhiError, RhiResult};
use multipass_scene::{Camera, DirectionalLight, EulerRotation, Transform};
use tracing::{debug, error, info_span, warn};

use crate::push_constants::DrawPushConstants;

/// Everything the GPU needs from the scene for one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameScene {
    pub camera_view: Mat4,
    pub camera_projection: Mat4,
    pub camera_position: Vec3,
    pub light_view: Mat4,
    pub light_projection: Mat4,
    pub light_position: Vec3,
    pub cube_model: Mat4,
    pub ground_model: Mat4,
    pub marker_model: Mat4,
}

impl FrameScene {
    pub fn new(camera: &Camera, light: &DirectionalLight, rotation: &EulerRotation) -> Self {
        Self {
            camera_view: camera.view_matrix(),
            camera_projection: camera.projection_matrix(),
            camera_position: camera.position,
            light_view: light.view_matrix(),
            light_projection: light.projection_matrix(),
            light_position: light.position,
            cube_model: rotation.matrix(),
            ground_model: Transform::ground().matrix(),
            marker_model: Transform::light_marker(light.position).matrix(),
        }
    }

    /// Projection × view of the light.
    #[inline]
    pub fn light_space(&self) -> Mat4 {
        self.light_projection * self.light_view
    }

    /// Draw block seen from the camera, identity model.
    pub fn camera_constants(&self) -> DrawPushConstants {
        DrawPushConstants::new(
            self.camera_view,
            self.camera_projection,
            self.camera_position,
            self.light_position,
        )
    }

    /// Draw block seen from the light, identity model.
    pub fn light_constants(&self) -> DrawPushConstants {
        DrawPushConstants::new(
            self.light_view,
            self.light_projection,
            self.camera_position,
            self.light_position,
        )
    }
}

/// The GPU side of a frame, one method per step.
///
/// The orchestrator calls the steps in declaration order and stops at the
/// first error, except that [`Self::wait_idle`] still runs when
/// [`Self::present`] fails after a successful submit.
pub trait FrameBackend {
    /// Unsignals the frame fence.
    fn reset_fence(&mut self) -> RhiResult<()>;

    /// Acquires the next swapchain image; the fence signals when it is
    /// ready.
    fn acquire(&mut self) -> RhiResult<u32>;

    /// Blocks until the acquire fence signals.
    fn wait_fence(&mut self) -> RhiResult<()>;

    /// Writes per-frame buffer data. Nothing reads the buffers at this
    /// point.
    fn update_uniforms(&mut self, scene: &FrameScene) -> RhiResult<()>;

    /// Records every pass into the command buffer of `image_index`.
    fn record(&mut self, image_index: u32, scene: &FrameScene) -> RhiResult<()>;

    /// Submits the command buffer of `image_index`, signaling the fence and
    /// the render-finished semaphore on completion.
    fn submit(&mut self, image_index: u32) -> RhiResult<()>;

    /// Queues `image_index` for presentation after the semaphore.
    fn present(&mut self, image_index: u32) -> RhiResult<()>;

    /// Blocks until the device has no work left.
    fn wait_idle(&mut self) -> RhiResult<()>;
}

/// Result of one frame that did not stop the loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented { image_index: u32 },
    Skipped,
}

/// Drives a [`FrameBackend`] through one frame per call.
#[derive(Debug)]
pub struct FrameOrchestrator {
    frame: u64,
    presented: u64,
    skipped: u64,
    consecutive_skips: u32,
    max_consecutive_skips: u32,
}

impl FrameOrchestrator {
    /// `max_consecutive_skips` skipped frames in a row are tolerated; the
    /// next one is fatal.
    pub fn new(max_consecutive_skips: u32) -> Self {
        Self {
            frame: 0,
            presented: 0,
            skipped: 0,
            consecutive_skips: 0,
            max_consecutive_skips,
        }
    }

    /// Runs one frame.
    ///
    /// # Errors
    ///
    /// Only errors that must stop the loop: [`RhiError::SurfaceLost`], a
    /// lost device, or any error once the skip limit is exceeded. Every
    /// other error is logged and reported as [`FrameOutcome::Skipped`].
    pub fn run_frame<B: FrameBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        scene: &FrameScene,
    ) -> RhiResult<FrameOutcome> {
        self.frame += 1;
        let span = info_span!("frame", number = self.frame);
        let _enter = span.enter();

        match Self::drive(backend, scene) {
            Ok(image_index) => {
                self.presented += 1;
                self.consecutive_skips = 0;
                Ok(FrameOutcome::Presented { image_index })
            }
            Err(err) if err.is_fatal_per_frame() => {
                error!("Fatal frame error: {}", err);
                Err(err)
            }
            Err(err) => {
                self.skipped += 1;
                self.consecutive_skips += 1;
                if self.consecutive_skips > self.max_consecutive_skips {
                    error!(
                        "{} frames skipped in a row, last error: {}",
                        self.consecutive_skips, err
                    );
                    return Err(err);
                }
                warn!("Frame skipped: {}", err);
                Ok(FrameOutcome::Skipped)
            }
        }
    }

    fn drive<B: FrameBackend + ?Sized>(backend: &mut B, scene: &FrameScene) -> RhiResult<u32> {
        backend.reset_fence()?;
        let image_index = match backend.acquire() {
            Err(RhiError::Timeout(what)) => {
                debug!("Acquire timed out waiting for {}, retrying once", what);
                backend.acquire()?
            }
            result => result?,
        };
        backend.wait_fence()?;

        backend.update_uniforms(scene)?;
        backend.record(image_index, scene)?;
        backend.submit(image_index)?;

        // Submitted work must finish before the next frame reuses anything.
        let presented = backend.present(image_index);
        let idle = backend.wait_idle();
        presented?;
        idle?;
        Ok(image_index)
    }

    /// Frames started so far.
    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    #[inline]
    pub fn presented(&self) -> u64 {
        self.presented
    }

    #[inline]
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    #[inline]
    pub fn consecutive_skips(&self) -> u32 {
        self.consecutive_skips
    }
}
