use pyrovis_renderer::cross_device::SharedHandles;

use crate::config::PyrovisConfig;

/// 在另一个执行上下文中运行的物理模拟
///
/// 每帧的握手：等待图形侧的 `graphics_done`，写入共享的场数据，再 signal `compute_done`。
pub trait PhysicsBackend {
    fn name(&self) -> &str;

    /// 为 true 时引擎创建跨设备的 semaphore，图形提交从第 1 帧开始等待 `compute_done`
    fn requires_cross_device(&self) -> bool;

    /// `shared` 中是导出的 semaphore 与共享 buffer
    fn init(&mut self, config: &PyrovisConfig, shared: &SharedHandles) -> anyhow::Result<()>;

    /// 推进一个模拟步
    fn step(&mut self) -> anyhow::Result<()>;

    /// 等待已经提交的模拟完成
    fn sync(&mut self) -> anyhow::Result<()>;

    fn cleanup(&mut self);
}

/// 不做任何模拟，场数据保持初始值
#[derive(Debug, Default)]
pub struct NullPhysics {
    steps: u64,
}

impl NullPhysics {
    pub const NAME: &'static str = "none";

    #[inline]
    pub fn steps(&self) -> u64 {
        self.steps
    }
}

impl PhysicsBackend for NullPhysics {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn requires_cross_device(&self) -> bool {
        false
    }

    fn init(&mut self, config: &PyrovisConfig, shared: &SharedHandles) -> anyhow::Result<()> {
        log::info!(
            "physics backend `{}`: {} fields, {} shared buffers, {} steps per frame",
            Self::NAME,
            config.fields.arr.len(),
            shared.buffers.len(),
            config.driver.steps_per_frame
        );
        Ok(())
    }

    fn step(&mut self) -> anyhow::Result<()> {
        self.steps += 1;
        Ok(())
    }

    fn sync(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn cleanup(&mut self) {
        log::info!("physics backend `{}` stopped after {} steps", Self::NAME, self.steps);
    }
}

/// 按配置中的名字创建物理后端
pub fn create_physics_backend(name: &str) -> anyhow::Result<Box<dyn PhysicsBackend>> {
    match name {
        "" | NullPhysics::NAME => Ok(Box::new(NullPhysics::default())),
        other => anyhow::bail!("unknown physics backend `{other}`"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_by_name() {
        let backend = create_physics_backend("none").unwrap();
        assert_eq!(backend.name(), "none");
        assert!(!backend.requires_cross_device());

        let err = create_physics_backend("cuda").err().unwrap();
        assert!(err.to_string().contains("cuda"));
    }

    #[test]
    fn null_backend_counts_steps() {
        let mut backend = NullPhysics::default();
        backend.init(&PyrovisConfig::default(), &SharedHandles::default()).unwrap();
        backend.step().unwrap();
        backend.step().unwrap();
        backend.sync().unwrap();
        assert_eq!(backend.steps(), 2);
        backend.cleanup();
    }
}
