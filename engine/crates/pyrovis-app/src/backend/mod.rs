//! 外部协作方：物理模拟与 UI
//!
//! 两者都通过 trait 接入，具体实现由配置中的名字选择。

pub mod physics;
pub mod ui;
