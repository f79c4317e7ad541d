pub mod camera;
pub mod camera_controller;
pub mod input_event;
pub mod input_manager;
