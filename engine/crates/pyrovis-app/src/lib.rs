pub mod backend;
pub mod config;
pub mod platform;
pub mod recorder;
pub mod render_app;
pub mod scene;
