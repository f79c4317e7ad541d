use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use ash::vk;
use pyrovis_gfx::pipeline::GfxShaderStage;

use crate::error::{GraphError, GraphResult};

/// 按相对路径提供 SPIR-V
///
/// 节点使用 `{shader_directory}/{node}/node.vert.spv` 这样的相对路径；
/// 预先插入内存的 shader 优先于磁盘上的文件。
#[derive(Debug, Default)]
pub struct ShaderLibrary {
    directory: PathBuf,
    in_memory: HashMap<String, Vec<u8>>,
}

// new & init
impl ShaderLibrary {
    pub fn new(directory: impl AsRef<Path>) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            in_memory: HashMap::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, spirv: Vec<u8>) {
        self.in_memory.insert(name.into(), spirv);
    }
}

// tools
impl ShaderLibrary {
    #[inline]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn load(&self, name: &str, stage: vk::ShaderStageFlags) -> GraphResult<GfxShaderStage> {
        let bytes = self.read_bytes(name)?;
        Ok(GfxShaderStage::from_spirv_bytes(stage, &bytes)?)
    }

    /// 一个节点的 vertex + fragment shader
    pub fn load_node(&self, node_dir: &str) -> GraphResult<Vec<GfxShaderStage>> {
        Ok(vec![
            self.load(&format!("{node_dir}/node.vert.spv"), vk::ShaderStageFlags::VERTEX)?,
            self.load(&format!("{node_dir}/node.frag.spv"), vk::ShaderStageFlags::FRAGMENT)?,
        ])
    }

    fn read_bytes(&self, name: &str) -> GraphResult<Vec<u8>> {
        if let Some(bytes) = self.in_memory.get(name) {
            return Ok(bytes.clone());
        }

        let path = self.directory.join(name);
        if !path.exists() {
            return Err(GraphError::ShaderNotFound(path.display().to_string()));
        }
        std::fs::read(&path).map_err(|source| GraphError::ShaderIo { path, source })
    }
}

/// 只有 magic number 的最小 SPIR-V，用于不需要真实 shader 的场景
pub fn placeholder_spirv() -> Vec<u8> {
    0x0723_0203_u32.to_le_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_shader_is_preferred() {
        let mut library = ShaderLibrary::new("/definitely/not/here");
        library.insert("field/node.vert.spv", placeholder_spirv());
        library.insert("field/node.frag.spv", placeholder_spirv());

        let stages = library.load_node("field").unwrap();
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[0].stage, vk::ShaderStageFlags::VERTEX);
        assert_eq!(stages[1].spirv, vec![0x0723_0203]);
    }

    #[test]
    fn missing_shader_is_reported() {
        let library = ShaderLibrary::new("/definitely/not/here");
        let err = library.load("hdr_to_sdr/node.frag.spv", vk::ShaderStageFlags::FRAGMENT).unwrap_err();
        assert!(matches!(err, GraphError::ShaderNotFound(path) if path.ends_with("node.frag.spv")));
    }
}
