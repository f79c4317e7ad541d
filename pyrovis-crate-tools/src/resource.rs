use std::path::{Path, PathBuf};

/// 统一资源路径管理
///
/// 配置文件中的资源路径都相对于 `engine_directory`，这里负责把它们拼接成绝对路径。
/// 已经是绝对路径的输入保持不变。
///
/// # 使用示例
/// ```ignore
/// let paths = PyrovisPath::new("/opt/pyrovis");
/// let shaders = paths.resolve("shaders"); // /opt/pyrovis/shaders
/// ```
#[derive(Debug, Clone)]
pub struct PyrovisPath {
    engine_directory: PathBuf,
}
// new & init
impl PyrovisPath {
    pub fn new(engine_directory: impl AsRef<Path>) -> Self {
        Self {
            engine_directory: engine_directory.as_ref().to_path_buf(),
        }
    }
}
// tools
impl PyrovisPath {
    /// 将相对于 engine_directory 的路径转换为完整路径
    pub fn resolve(&self, relative: impl AsRef<Path>) -> PathBuf {
        let relative = relative.as_ref();
        if relative.is_absolute() { relative.to_path_buf() } else { self.engine_directory.join(relative) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_relative_and_absolute() {
        let paths = PyrovisPath::new("/opt/pyrovis");
        assert_eq!(paths.resolve("assets/a.obj"), PathBuf::from("/opt/pyrovis/assets/a.obj"));
        assert_eq!(paths.resolve("/tmp/b.obj"), PathBuf::from("/tmp/b.obj"));
    }
}
