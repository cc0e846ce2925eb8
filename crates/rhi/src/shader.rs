//! Shader module management.
//!
//! Shaders arrive as precompiled SPIR-V. Besides wrapping `VkShaderModule`,
//! this module reflects (with `spirq`) the size of the push-constant block a
//! shader declares so pipeline creation can check it against the CPU-side
//! schema.
//!
//! Shader modules are build-time artifacts: pipelines take them by value
//! and destroy them once the pipeline object exists.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::path::Path;
//! use multipass_rhi::device::Device;
//! use multipass_rhi::shader::{Shader, ShaderStage};
//!
//! # fn example(device: Arc<Device>) -> Result<(), multipass_rhi::RhiError> {
//! let vertex_shader = Shader::from_spirv_file(
//!     device,
//!     Path::new("shaders/spirv/lit.vert.spv"),
//!     ShaderStage::Vertex,
//! )?;
//! println!("push constants: {:?}", vertex_shader.push_constant_size());
//! # Ok(())
//! # }
//! ```

use std::ffi::CStr;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{ResourceKind, RhiError, RhiResult};

const ENTRY_POINT: &CStr = c"main";

/// Pipeline stage a shader module runs in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn to_vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        }
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A `VkShaderModule` with its stage and reflected push-constant size.
pub struct Shader {
    device: Arc<Device>,
    module: vk::ShaderModule,
    stage: ShaderStage,
    push_constant_size: Option<u32>,
}

impl Shader {
    /// Loads a SPIR-V binary from disk.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device that owns the module
    /// * `path` - Path to a `.spv` file
    /// * `stage` - Pipeline stage the module is used in
    ///
    /// # Errors
    ///
    /// [`RhiError::Shader`] when the file cannot be read or is not valid
    /// SPIR-V, [`RhiError::ResourceCreationFailed`] when
    /// `vkCreateShaderModule` fails.
    pub fn from_spirv_file(device: Arc<Device>, path: &Path, stage: ShaderStage) -> RhiResult<Self> {
        debug!("Loading {} shader from {:?}", stage, path);

        let bytes = std::fs::read(path).map_err(|e| {
            RhiError::Shader(format!("failed to read shader file {:?}: {}", path, e))
        })?;

        Self::from_spirv_bytes(device, &bytes, stage)
    }

    /// Creates a module from a little-endian SPIR-V byte stream.
    ///
    /// # Errors
    ///
    /// [`RhiError::Shader`] when the length is not a multiple of four or
    /// reflection fails, [`RhiError::ResourceCreationFailed`] when
    /// `vkCreateShaderModule` fails.
    pub fn from_spirv_bytes(device: Arc<Device>, bytes: &[u8], stage: ShaderStage) -> RhiResult<Self> {
        let words = spirv_words(bytes)?;
        Self::from_spirv_words(device, &words, stage)
    }

    /// Creates a module from SPIR-V words.
    ///
    /// # Errors
    ///
    /// [`RhiError::Shader`] when the binary is malformed,
    /// [`RhiError::ResourceCreationFailed`] when `vkCreateShaderModule` fails.
    pub fn from_spirv_words(device: Arc<Device>, words: &[u32], stage: ShaderStage) -> RhiResult<Self> {
        let push_constant_size = push_constant_block_size(words)?;

        let create_info = vk::ShaderModuleCreateInfo::default().code(words);
        let module = unsafe { device.handle().create_shader_module(&create_info, None) }
            .map_err(RhiError::creation(ResourceKind::ShaderModule))?;

        debug!(
            "Created {} shader module ({} words, push constants: {:?})",
            stage,
            words.len(),
            push_constant_size
        );

        Ok(Self {
            device,
            module,
            stage,
            push_constant_size,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Byte size of the push-constant block, if the shader declares one.
    #[inline]
    pub fn push_constant_size(&self) -> Option<u32> {
        self.push_constant_size
    }

    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo<'static> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage.to_vk_stage())
            .module(self.module)
            .name(ENTRY_POINT)
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_shader_module(self.module, None);
        }
        debug!("Destroyed {} shader module", self.stage);
    }
}

/// Converts a byte stream into SPIR-V words.
pub fn spirv_words(bytes: &[u8]) -> RhiResult<Vec<u32>> {
    if !bytes.len().is_multiple_of(4) {
        return Err(RhiError::Shader(format!(
            "SPIR-V code must be 4-byte aligned, got {} bytes",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Reflects the byte size of the push-constant block declared by a SPIR-V
/// module, or `None` when it declares no push constants.
///
/// Every entry point is reflected; when several declare a block the
/// largest one is returned.
///
/// # Errors
///
/// [`RhiError::Shader`] when the module does not reflect, or when a block
/// has no fixed size or does not fit the `u32` range Vulkan accepts.
pub fn push_constant_block_size(words: &[u32]) -> RhiResult<Option<u32>> {
    let entry_points = spirq::ReflectConfig::new()
        .spv(words)
        .ref_all_rscs(true)
        .reflect()
        .map_err(|e| RhiError::Shader(format!("SPIR-V reflection failed: {:?}", e)))?;

    let mut largest: Option<u32> = None;
    for var in entry_points.iter().flat_map(|entry_point| entry_point.vars.iter()) {
        let spirq::var::Variable::PushConstant { name, ty } = var else {
            continue;
        };
        let name = name.as_deref().unwrap_or("<unnamed>");
        let nbyte = ty.nbyte().ok_or_else(|| {
            RhiError::Shader(format!("push-constant block '{name}' has no fixed size"))
        })?;
        let size = u32::try_from(nbyte).map_err(|_| {
            RhiError::Shader(format!(
                "push-constant block '{name}' is {nbyte} bytes, larger than u32::MAX"
            ))
        })?;
        largest = Some(largest.map_or(size, |current| current.max(size)));
    }
    Ok(largest)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    // Opcodes and enumerants used by the hand-assembled modules below.
    const OP_MEMORY_MODEL: u32 = 14;
    const OP_ENTRY_POINT: u32 = 15;
    const OP_EXECUTION_MODE: u32 = 16;
    const OP_CAPABILITY: u32 = 17;
    const OP_TYPE_VOID: u32 = 19;
    const OP_TYPE_INT: u32 = 21;
    const OP_TYPE_FLOAT: u32 = 22;
    const OP_TYPE_VECTOR: u32 = 23;
    const OP_TYPE_MATRIX: u32 = 24;
    const OP_TYPE_ARRAY: u32 = 28;
    const OP_TYPE_STRUCT: u32 = 30;
    const OP_TYPE_POINTER: u32 = 32;
    const OP_TYPE_FUNCTION: u32 = 33;
    const OP_CONSTANT: u32 = 43;
    const OP_FUNCTION: u32 = 54;
    const OP_FUNCTION_END: u32 = 56;
    const OP_VARIABLE: u32 = 59;
    const OP_DECORATE: u32 = 71;
    const OP_MEMBER_DECORATE: u32 = 72;
    const OP_LABEL: u32 = 248;
    const OP_RETURN: u32 = 253;

    const CAPABILITY_SHADER: u32 = 1;
    const ADDRESSING_LOGICAL: u32 = 0;
    const MEMORY_MODEL_GLSL450: u32 = 1;
    const EXECUTION_MODEL_FRAGMENT: u32 = 4;
    const EXECUTION_MODE_ORIGIN_UPPER_LEFT: u32 = 7;
    const STORAGE_CLASS_PUSH_CONSTANT: u32 = 9;
    const DECORATION_BLOCK: u32 = 2;
    const DECORATION_COL_MAJOR: u32 = 5;
    const DECORATION_ARRAY_STRIDE: u32 = 6;
    const DECORATION_MATRIX_STRIDE: u32 = 7;
    const DECORATION_OFFSET: u32 = 35;

    // Ids 1..=4 are reserved for the entry point scaffolding.
    const VOID: u32 = 1;
    const MAIN_FN_TYPE: u32 = 2;
    const MAIN: u32 = 3;
    const LABEL: u32 = 4;
    const BOUND: u32 = 64;

    fn instruction(opcode: u32, operands: &[u32]) -> Vec<u32> {
        let mut words = vec![((operands.len() as u32 + 1) << 16) | opcode];
        words.extend_from_slice(operands);
        words
    }

    /// A fragment shader whose `main` does nothing, with `decorations` and
    /// `types` (types, constants and variables) spliced into their sections.
    fn fragment_module(decorations: &[Vec<u32>], types: &[Vec<u32>]) -> Vec<u32> {
        // "main\0" packed little-endian into two words
        let name = [u32::from_le_bytes(*b"main"), 0];

        let mut words = vec![SPIRV_MAGIC, 0x0001_0000, 0, BOUND, 0];
        let mut push = |inst: Vec<u32>| words.extend_from_slice(&inst);
        push(instruction(OP_CAPABILITY, &[CAPABILITY_SHADER]));
        push(instruction(
            OP_MEMORY_MODEL,
            &[ADDRESSING_LOGICAL, MEMORY_MODEL_GLSL450],
        ));
        push(instruction(
            OP_ENTRY_POINT,
            &[EXECUTION_MODEL_FRAGMENT, MAIN, name[0], name[1]],
        ));
        push(instruction(
            OP_EXECUTION_MODE,
            &[MAIN, EXECUTION_MODE_ORIGIN_UPPER_LEFT],
        ));
        for inst in decorations {
            push(inst.clone());
        }
        push(instruction(OP_TYPE_VOID, &[VOID]));
        push(instruction(OP_TYPE_FUNCTION, &[MAIN_FN_TYPE, VOID]));
        for inst in types {
            push(inst.clone());
        }
        push(instruction(OP_FUNCTION, &[VOID, MAIN, 0, MAIN_FN_TYPE]));
        push(instruction(OP_LABEL, &[LABEL]));
        push(instruction(OP_RETURN, &[]));
        push(instruction(OP_FUNCTION_END, &[]));
        words
    }

    fn push_constant_variable(pointer: u32, block: u32, variable: u32) -> [Vec<u32>; 2] {
        [
            instruction(OP_TYPE_POINTER, &[pointer, STORAGE_CLASS_PUSH_CONSTANT, block]),
            instruction(OP_VARIABLE, &[pointer, variable, STORAGE_CLASS_PUSH_CONSTANT]),
        ]
    }

    #[test]
    fn test_shader_stage_to_vk_stage() {
        assert_eq!(
            ShaderStage::Vertex.to_vk_stage(),
            vk::ShaderStageFlags::VERTEX
        );
        assert_eq!(
            ShaderStage::Fragment.to_vk_stage(),
            vk::ShaderStageFlags::FRAGMENT
        );
    }

    #[test]
    fn test_shader_stage_display() {
        assert_eq!(format!("{}", ShaderStage::Vertex), "vertex");
        assert_eq!(format!("{}", ShaderStage::Fragment), "fragment");
    }

    #[test]
    fn test_spirv_words_rejects_misaligned_bytes() {
        assert!(spirv_words(&[0u8; 7]).is_err());
        assert_eq!(spirv_words(&[0x03, 0x02, 0x23, 0x07]).unwrap(), vec![SPIRV_MAGIC]);
    }

    #[test]
    fn test_reflects_draw_block() {
        // struct { mat4 model; mat4 view; mat4 projection; vec4 camera; vec4 light; }
        let (float, vec4, mat4, block) = (10, 11, 12, 13);
        let mut decorations = vec![instruction(OP_DECORATE, &[block, DECORATION_BLOCK])];
        for (member, offset) in [0, 64, 128, 192, 208].into_iter().enumerate() {
            let member = member as u32;
            decorations.push(instruction(
                OP_MEMBER_DECORATE,
                &[block, member, DECORATION_OFFSET, offset],
            ));
            if member < 3 {
                decorations.push(instruction(
                    OP_MEMBER_DECORATE,
                    &[block, member, DECORATION_COL_MAJOR],
                ));
                decorations.push(instruction(
                    OP_MEMBER_DECORATE,
                    &[block, member, DECORATION_MATRIX_STRIDE, 16],
                ));
            }
        }
        let mut types = vec![
            instruction(OP_TYPE_FLOAT, &[float, 32]),
            instruction(OP_TYPE_VECTOR, &[vec4, float, 4]),
            instruction(OP_TYPE_MATRIX, &[mat4, vec4, 4]),
            instruction(OP_TYPE_STRUCT, &[block, mat4, mat4, mat4, vec4, vec4]),
        ];
        types.extend(push_constant_variable(14, block, 15));

        let words = fragment_module(&decorations, &types);
        assert_eq!(push_constant_block_size(&words).unwrap(), Some(224));
    }

    #[test]
    fn test_reflects_prefix_block() {
        // struct { uint mode; uint use_msaa_input; uint msaa_samples; }
        let (uint, block) = (10, 11);
        let mut decorations = vec![instruction(OP_DECORATE, &[block, DECORATION_BLOCK])];
        for (member, offset) in [0, 4, 8].into_iter().enumerate() {
            decorations.push(instruction(
                OP_MEMBER_DECORATE,
                &[block, member as u32, DECORATION_OFFSET, offset],
            ));
        }
        let mut types = vec![
            instruction(OP_TYPE_INT, &[uint, 32, 0]),
            instruction(OP_TYPE_STRUCT, &[block, uint, uint, uint]),
        ];
        types.extend(push_constant_variable(12, block, 13));

        let words = fragment_module(&decorations, &types);
        assert_eq!(push_constant_block_size(&words).unwrap(), Some(12));
    }

    #[test]
    fn test_module_without_push_constants() {
        let words = fragment_module(&[], &[instruction(OP_TYPE_FLOAT, &[10, 32])]);
        assert_eq!(push_constant_block_size(&words).unwrap(), None);
    }

    #[test]
    fn test_block_beyond_u32_range_is_an_error() {
        // struct { float weights[0x2000_0000]; } with a 16-byte stride: 8 GiB
        let (float, uint, length, array, block) = (10, 11, 12, 13, 14);
        let decorations = [
            instruction(OP_DECORATE, &[block, DECORATION_BLOCK]),
            instruction(OP_DECORATE, &[array, DECORATION_ARRAY_STRIDE, 16]),
            instruction(OP_MEMBER_DECORATE, &[block, 0, DECORATION_OFFSET, 0]),
        ];
        let mut types = vec![
            instruction(OP_TYPE_FLOAT, &[float, 32]),
            instruction(OP_TYPE_INT, &[uint, 32, 0]),
            instruction(OP_CONSTANT, &[uint, length, 0x2000_0000]),
            instruction(OP_TYPE_ARRAY, &[array, float, length]),
            instruction(OP_TYPE_STRUCT, &[block, array]),
        ];
        types.extend(push_constant_variable(15, block, 16));

        let words = fragment_module(&decorations, &types);
        assert!(matches!(
            push_constant_block_size(&words),
            Err(RhiError::Shader(_))
        ));
    }

    #[test]
    fn test_malformed_modules_are_rejected() {
        assert!(matches!(
            push_constant_block_size(&[0xdead_beef, 0, 0, 0, 0]),
            Err(RhiError::Shader(_))
        ));
        assert!(push_constant_block_size(&[SPIRV_MAGIC]).is_err());

        let mut truncated = fragment_module(&[], &[]);
        truncated.push((4 << 16) | OP_TYPE_VECTOR);
        assert!(push_constant_block_size(&truncated).is_err());
    }
}
