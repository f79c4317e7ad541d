pub mod buffer;
pub mod format;
pub mod image;
pub mod resource_id;
