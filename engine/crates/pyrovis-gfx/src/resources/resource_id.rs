use std::fmt;

/// 资源在创建时获得的全局唯一身份
///
/// - 资源存活期间不会被复用
/// - resize 时重建的 image 会继承原来的身份
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(uuid::Uuid);

impl ResourceId {
    #[inline]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    #[inline]
    pub fn uuid(&self) -> uuid::Uuid {
        self.0
    }
}

impl Default for ResourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
