use std::collections::{HashMap, HashSet, VecDeque};

use crate::platform::input_event::{ElementState, InputEvent, KeyCode, MouseButton};

/// 一帧结束时的输入状态
#[derive(Debug, Default, Clone)]
pub struct InputState {
    /// 当前帧的鼠标位置 pixel
    pub crt_mouse_pos: [f64; 2],
    /// 上一帧的鼠标位置 pixel
    pub last_mouse_pos: [f64; 2],
    pub right_button_pressed: bool,
    pub key_pressed: HashMap<KeyCode, bool>,
    /// 本帧内从松开变为按下的按键
    pub key_down_this_frame: HashSet<KeyCode>,
    /// 本帧内收到的最后一次窗口尺寸
    pub resized: Option<[u32; 2]>,
}

impl InputState {
    pub fn is_key_pressed(&self, key_code: KeyCode) -> bool {
        self.key_pressed.get(&key_code).copied().unwrap_or(false)
    }

    pub fn is_key_down_this_frame(&self, key_code: KeyCode) -> bool {
        self.key_down_this_frame.contains(&key_code)
    }

    pub fn mouse_delta(&self) -> [f64; 2] {
        [
            self.crt_mouse_pos[0] - self.last_mouse_pos[0],
            self.crt_mouse_pos[1] - self.last_mouse_pos[1],
        ]
    }

    #[inline]
    pub fn is_right_button_pressed(&self) -> bool {
        self.right_button_pressed
    }
}

/// 缓存窗口事件，每帧开始时统一处理
#[derive(Default)]
pub struct InputManager {
    state: InputState,
    events: VecDeque<InputEvent>,
}

// getters
impl InputManager {
    #[inline]
    pub fn state(&self) -> &InputState {
        &self.state
    }
}

impl InputManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_event(&mut self, event: InputEvent) {
        self.events.push_back(event);
    }

    /// 处理队列中的所有事件
    pub fn process_events(&mut self) {
        self.state.last_mouse_pos = self.state.crt_mouse_pos;
        self.state.key_down_this_frame.clear();
        self.state.resized = None;

        while let Some(event) = self.events.pop_front() {
            match event {
                InputEvent::KeyboardInput { key_code, state } => {
                    let pressed = state == ElementState::Pressed;
                    let was_pressed = self.state.key_pressed.insert(key_code, pressed).unwrap_or(false);
                    if pressed && !was_pressed {
                        self.state.key_down_this_frame.insert(key_code);
                    }
                }
                InputEvent::MouseButtonInput { button, state } => {
                    if button == MouseButton::Right {
                        self.state.right_button_pressed = state == ElementState::Pressed;
                    }
                }
                InputEvent::MouseMoved { physical_position } => {
                    self.state.crt_mouse_pos = physical_position;
                }
                InputEvent::Resized {
                    physical_width,
                    physical_height,
                } => {
                    self.state.resized = Some([physical_width, physical_height]);
                }
                InputEvent::MouseWheel { .. } | InputEvent::Other => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(key_code: KeyCode, state: ElementState) -> InputEvent {
        InputEvent::KeyboardInput { key_code, state }
    }

    #[test]
    fn key_down_is_edge_triggered() {
        let mut input = InputManager::new();
        input.push_event(key(KeyCode::KeyR, ElementState::Pressed));
        input.process_events();
        assert!(input.state().is_key_down_this_frame(KeyCode::KeyR));
        assert!(input.state().is_key_pressed(KeyCode::KeyR));

        // 按住不放时系统会重复发送 Pressed
        input.push_event(key(KeyCode::KeyR, ElementState::Pressed));
        input.process_events();
        assert!(!input.state().is_key_down_this_frame(KeyCode::KeyR));

        input.push_event(key(KeyCode::KeyR, ElementState::Released));
        input.process_events();
        assert!(!input.state().is_key_pressed(KeyCode::KeyR));
    }

    #[test]
    fn mouse_delta_and_resize() {
        let mut input = InputManager::new();
        input.push_event(InputEvent::MouseMoved {
            physical_position: [10.0, 20.0],
        });
        input.process_events();
        input.push_event(InputEvent::MouseMoved {
            physical_position: [15.0, 18.0],
        });
        input.push_event(InputEvent::Resized {
            physical_width: 640,
            physical_height: 480,
        });
        input.process_events();
        assert_eq!(input.state().mouse_delta(), [5.0, -2.0]);
        assert_eq!(input.state().resized, Some([640, 480]));

        input.process_events();
        assert_eq!(input.state().mouse_delta(), [0.0, 0.0]);
        assert_eq!(input.state().resized, None);
    }
}
