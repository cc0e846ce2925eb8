//! Compiled shader lookup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use multipass_rhi::device::Device;
use multipass_rhi::shader::{Shader, ShaderStage};
use multipass_rhi::RhiResult;

/// Finds `<name>.vert.spv` / `<name>.frag.spv` binaries in one directory.
#[derive(Clone, Debug)]
pub struct ShaderLibrary {
    dir: PathBuf,
}

impl ShaderLibrary {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, name: &str, stage: ShaderStage) -> PathBuf {
        let extension = match stage {
            ShaderStage::Vertex => "vert",
            ShaderStage::Fragment => "frag",
        };
        self.dir.join(format!("{name}.{extension}.spv"))
    }

    pub fn load(&self, device: &Arc<Device>, name: &str, stage: ShaderStage) -> RhiResult<Shader> {
        Shader::from_spirv_file(device.clone(), &self.path(name, stage), stage)
    }
}
