use pyrovis_app::platform::input_event::{ElementState, InputEvent, KeyCode, MouseButton};
use winit::event::{KeyEvent, WindowEvent};
use winit::keyboard::PhysicalKey;

pub struct WinitEventAdapter {}
impl WinitEventAdapter {
    pub fn from_winit_event(event: &WindowEvent) -> InputEvent {
        match event {
            WindowEvent::CursorMoved { position, .. } => InputEvent::MouseMoved {
                physical_position: [position.x, position.y],
            },
            WindowEvent::MouseWheel { delta, .. } => {
                // 只取垂直方向
                let delta_value = match delta {
                    winit::event::MouseScrollDelta::LineDelta(_, y) => *y as f64,
                    winit::event::MouseScrollDelta::PixelDelta(pos) => pos.y / 100.0,
                };
                InputEvent::MouseWheel { delta: delta_value }
            }
            WindowEvent::MouseInput { state, button, .. } => InputEvent::MouseButtonInput {
                button: Self::button_from_winit(*button),
                state: Self::state_from_winit(*state),
            },
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key_code),
                        state,
                        ..
                    },
                ..
            } => InputEvent::KeyboardInput {
                key_code: Self::key_from_winit(*key_code),
                state: Self::state_from_winit(*state),
            },
            WindowEvent::Resized(physical_size) => InputEvent::Resized {
                physical_width: physical_size.width,
                physical_height: physical_size.height,
            },
            _ => InputEvent::Other,
        }
    }

    fn button_from_winit(button: winit::event::MouseButton) -> MouseButton {
        match button {
            winit::event::MouseButton::Left => MouseButton::Left,
            winit::event::MouseButton::Right => MouseButton::Right,
            winit::event::MouseButton::Middle => MouseButton::Middle,
            winit::event::MouseButton::Back => MouseButton::Back,
            winit::event::MouseButton::Forward => MouseButton::Forward,
            winit::event::MouseButton::Other(code) => MouseButton::Other(code),
        }
    }

    fn key_from_winit(key: winit::keyboard::KeyCode) -> KeyCode {
        match key {
            winit::keyboard::KeyCode::KeyW => KeyCode::KeyW,
            winit::keyboard::KeyCode::KeyA => KeyCode::KeyA,
            winit::keyboard::KeyCode::KeyS => KeyCode::KeyS,
            winit::keyboard::KeyCode::KeyD => KeyCode::KeyD,
            winit::keyboard::KeyCode::KeyE => KeyCode::KeyE,
            winit::keyboard::KeyCode::KeyQ => KeyCode::KeyQ,
            winit::keyboard::KeyCode::KeyR => KeyCode::KeyR,
            _ => KeyCode::Other,
        }
    }

    fn state_from_winit(state: winit::event::ElementState) -> ElementState {
        match state {
            winit::event::ElementState::Pressed => ElementState::Pressed,
            winit::event::ElementState::Released => ElementState::Released,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_resize_and_keys() {
        let event = WindowEvent::Resized(winit::dpi::PhysicalSize::new(640, 480));
        assert_eq!(
            WinitEventAdapter::from_winit_event(&event),
            InputEvent::Resized {
                physical_width: 640,
                physical_height: 480,
            }
        );
        assert_eq!(WinitEventAdapter::from_winit_event(&WindowEvent::CloseRequested), InputEvent::Other);

        assert_eq!(WinitEventAdapter::key_from_winit(winit::keyboard::KeyCode::KeyR), KeyCode::KeyR);
        assert_eq!(WinitEventAdapter::key_from_winit(winit::keyboard::KeyCode::Space), KeyCode::Other);
    }
}
