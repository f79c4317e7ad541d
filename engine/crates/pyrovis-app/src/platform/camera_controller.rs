use crate::platform::{camera::Camera, input_event::KeyCode, input_manager::InputState};

/// 右键拖动旋转，WASD 平移，E / Q 升降
pub struct CameraController {
    camera: Camera,
}

impl CameraController {
    /// 每个像素的鼠标位移对应的角度
    const ROTATE_SENSITIVITY: f32 = 0.1;

    pub fn new(camera: Camera) -> Self {
        Self { camera }
    }

    #[inline]
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    #[inline]
    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    /// 根据输入更新相机，返回相机是否发生了变化
    pub fn update(&mut self, input_state: &InputState, delta_time: std::time::Duration) -> bool {
        let mut changed = false;

        if input_state.is_right_button_pressed() {
            let [dx, dy] = input_state.mouse_delta();
            if dx != 0.0 || dy != 0.0 {
                self.camera.rotate_yaw(-dx as f32 * Self::ROTATE_SENSITIVITY);
                self.camera.rotate_pitch(-dy as f32 * Self::ROTATE_SENSITIVITY);
                changed = true;
            }
        }

        let step = delta_time.as_secs_f32() * self.camera.move_speed;
        let moves: [(KeyCode, fn(&mut Camera, f32), f32); 6] = [
            (KeyCode::KeyW, Camera::move_forward, step),
            (KeyCode::KeyS, Camera::move_forward, -step),
            (KeyCode::KeyD, Camera::move_right, step),
            (KeyCode::KeyA, Camera::move_right, -step),
            (KeyCode::KeyE, Camera::move_up, step),
            (KeyCode::KeyQ, Camera::move_up, -step),
        ];
        for (key, apply, length) in moves {
            if input_state.is_key_pressed(key) {
                apply(&mut self.camera, length);
                changed = true;
            }
        }

        changed
    }
}
