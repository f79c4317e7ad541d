pub mod barrier;
pub mod command_buffer;
pub mod fence;
pub mod semaphore;
pub mod submit_info;
