//! Push-constant blocks shared by the CPU and the shaders.
//!
//! Each block is a `#[repr(C)]` struct pushed whole at offset 0. Field
//! offsets are part of the shader interface; [`PushConstantSchema::VERSION`]
//! is bumped whenever a layout changes. Pipelines declare their range from
//! [`PushConstantSchema::decl`], and the pipeline builder rejects shaders
//! whose reflected block is larger than that range.
//!
//! | block | field | offset |
//! |-------|-------|--------|
//! | draw | model | 0 |
//! | draw | view | 64 |
//! | draw | projection | 128 |
//! | draw | camera_position | 192 |
//! | draw | light_position | 208 |
//! | post_process | mode | 0 |
//! | post_process | use_msaa_input | 4 |
//! | post_process | msaa_samples | 8 |

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};
use multipass_core::PostProcessMode;
use multipass_rhi::pipeline::PushConstantDecl;
use multipass_rhi::vk;

/// A push-constant block with a fixed, named layout.
pub trait PushConstantSchema: Pod {
    const NAME: &'static str;
    const VERSION: u32;
    const STAGES: vk::ShaderStageFlags;

    /// Size of the block in bytes.
    const SIZE: u32 = std::mem::size_of::<Self>() as u32;

    /// The range a pipeline layout declares for this block.
    fn decl() -> PushConstantDecl {
        PushConstantDecl::new(Self::NAME, Self::SIZE, Self::STAGES)
    }
}

/// Per-draw matrices and positions for the shadow and color passes.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct DrawPushConstants {
    pub model: Mat4,
    pub view: Mat4,
    pub projection: Mat4,
    /// xyz = camera position, w = 1
    pub camera_position: Vec4,
    /// xyz = light position, w = 1
    pub light_position: Vec4,
}

impl PushConstantSchema for DrawPushConstants {
    const NAME: &'static str = "draw";
    const VERSION: u32 = 1;
    const STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::from_raw(
        vk::ShaderStageFlags::VERTEX.as_raw() | vk::ShaderStageFlags::FRAGMENT.as_raw(),
    );
}

impl DrawPushConstants {
    pub fn new(view: Mat4, projection: Mat4, camera_position: Vec3, light_position: Vec3) -> Self {
        Self {
            model: Mat4::IDENTITY,
            view,
            projection,
            camera_position: camera_position.extend(1.0),
            light_position: light_position.extend(1.0),
        }
    }

    /// The same block with a different model matrix.
    #[inline]
    pub fn with_model(mut self, model: Mat4) -> Self {
        self.model = model;
        self
    }
}

/// Selects the post-process effect and its input.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct PostProcessPushConstants {
    /// [`PostProcessMode`] shader value
    pub mode: u32,
    /// Non-zero: read the multi-sampled image instead of the resolved one
    pub use_msaa_input: u32,
    pub msaa_samples: u32,
    _pad: u32,
}

impl PushConstantSchema for PostProcessPushConstants {
    const NAME: &'static str = "post_process";
    const VERSION: u32 = 1;
    const STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::FRAGMENT;
}

impl PostProcessPushConstants {
    pub fn new(mode: PostProcessMode, use_msaa_input: bool, msaa_samples: u32) -> Self {
        Self {
            mode: mode.shader_value(),
            use_msaa_input: u32::from(use_msaa_input),
            msaa_samples,
            _pad: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::mem::offset_of;

    use super::*;

    #[test]
    fn test_draw_block_offsets() {
        assert_eq!(offset_of!(DrawPushConstants, model), 0);
        assert_eq!(offset_of!(DrawPushConstants, view), 64);
        assert_eq!(offset_of!(DrawPushConstants, projection), 128);
        assert_eq!(offset_of!(DrawPushConstants, camera_position), 192);
        assert_eq!(offset_of!(DrawPushConstants, light_position), 208);
        assert_eq!(DrawPushConstants::SIZE, 224);
    }

    #[test]
    fn test_draw_block_fits_minimum_push_constant_limit() {
        // Vulkan guarantees at least 128 bytes; 256 is the common desktop limit.
        assert!(DrawPushConstants::SIZE <= 256);
        assert_eq!(DrawPushConstants::SIZE % 4, 0);
    }

    #[test]
    fn test_draw_decl() {
        let decl = DrawPushConstants::decl();
        assert_eq!(decl.name, "draw");
        assert_eq!(decl.size, 224);
        assert!(decl.stages.contains(vk::ShaderStageFlags::VERTEX));
        assert!(decl.stages.contains(vk::ShaderStageFlags::FRAGMENT));
    }

    #[test]
    fn test_draw_positions_have_unit_w() {
        let block = DrawPushConstants::new(
            Mat4::IDENTITY,
            Mat4::IDENTITY,
            Vec3::new(0.0, 1.0, 3.0),
            Vec3::new(-2.0, 4.0, -1.0),
        )
        .with_model(Mat4::from_scale(Vec3::splat(2.0)));
        assert_eq!(block.camera_position, Vec4::new(0.0, 1.0, 3.0, 1.0));
        assert_eq!(block.light_position.w, 1.0);
        assert_eq!(block.model.x_axis.x, 2.0);

        let floats: &[f32] = bytemuck::cast_slice(bytemuck::bytes_of(&block));
        assert_eq!(&floats[48..52], &[0.0, 1.0, 3.0, 1.0]);
    }

    #[test]
    fn test_post_process_block() {
        assert_eq!(PostProcessPushConstants::SIZE, 16);
        assert_eq!(offset_of!(PostProcessPushConstants, mode), 0);
        assert_eq!(offset_of!(PostProcessPushConstants, use_msaa_input), 4);
        assert_eq!(offset_of!(PostProcessPushConstants, msaa_samples), 8);

        let block = PostProcessPushConstants::new(PostProcessMode::Sepia, true, 4);
        let words: &[u32] = bytemuck::cast_slice(bytemuck::bytes_of(&block));
        assert_eq!(words, &[3, 1, 4, 0]);
        assert_eq!(
            PostProcessPushConstants::decl().stages,
            vk::ShaderStageFlags::FRAGMENT
        );
    }
}
