use crate::config::CameraConfig;

/// 上传到 GPU 的相机数据
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraData {
    pub view: glam::Mat4,
    pub proj: glam::Mat4,
    pub eye_w: glam::Vec3,
    /// 弧度
    pub fov_y: f32,
    pub view_dir: glam::Vec3,
    pub aspect_ratio: f32,
    pub up: glam::Vec3,
    pub focal_distance: f32,
    pub width: f32,
    pub height: f32,
    pub _padding: [f32; 2],
}

/// 第一人称相机，朝向由 yaw / pitch 决定
///
/// yaw = pitch = 0 时看向 -Z
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: glam::Vec3,

    pub euler_yaw_deg: f32,
    pub euler_pitch_deg: f32,

    pub fov_deg: f32,
    pub move_speed: f32,

    width: f32,
    height: f32,
}

impl Camera {
    const CAMERA_UP: glam::Vec3 = glam::Vec3::new(0.0, 1.0, 0.0);

    const K_PITCH: f32 = 89.0;

    pub const Z_NEAR: f32 = 0.1;
    pub const Z_FAR: f32 = 100.0;

    pub fn from_config(config: &CameraConfig, width: u32, height: u32) -> Self {
        let view = glam::Vec3::from(config.view).normalize_or_zero();
        let view = if view == glam::Vec3::ZERO { glam::Vec3::NEG_Z } else { view };

        Self {
            position: glam::Vec3::from(config.position),
            euler_yaw_deg: (-view.x).atan2(-view.z).to_degrees(),
            euler_pitch_deg: view.y.clamp(-1.0, 1.0).asin().to_degrees().clamp(-Self::K_PITCH, Self::K_PITCH),
            fov_deg: config.fov,
            move_speed: config.move_speed,
            width: width as f32,
            height: height as f32,
        }
    }

    pub fn camera_forward(&self) -> glam::Vec3 {
        let (yaw, pitch) = (self.euler_yaw_deg.to_radians(), self.euler_pitch_deg.to_radians());
        glam::Vec3::new(-yaw.sin() * pitch.cos(), pitch.sin(), -yaw.cos() * pitch.cos())
    }

    pub fn camera_right(&self) -> glam::Vec3 {
        self.camera_forward().cross(Self::CAMERA_UP).normalize()
    }

    #[inline]
    pub fn aspect_ratio(&self) -> f32 {
        self.width / self.height
    }

    pub fn set_extent(&mut self, width: u32, height: u32) {
        self.width = width as f32;
        self.height = height as f32;
    }

    pub fn get_view_matrix(&self) -> glam::Mat4 {
        glam::Mat4::look_to_rh(self.position, self.camera_forward(), Self::CAMERA_UP)
    }

    /// Vulkan 的 NDC 中 y 朝下，因此翻转 y
    pub fn get_projection_matrix(&self) -> glam::Mat4 {
        let mut proj =
            glam::Mat4::perspective_rh(self.fov_deg.to_radians(), self.aspect_ratio(), Self::Z_NEAR, Self::Z_FAR);
        proj.y_axis.y *= -1.0;
        proj
    }

    pub fn data(&self) -> CameraData {
        CameraData {
            view: self.get_view_matrix(),
            proj: self.get_projection_matrix(),
            eye_w: self.position,
            fov_y: self.fov_deg.to_radians(),
            view_dir: self.camera_forward(),
            aspect_ratio: self.aspect_ratio(),
            up: Self::CAMERA_UP,
            focal_distance: 1.0,
            width: self.width,
            height: self.height,
            _padding: [0.0; 2],
        }
    }

    pub fn move_forward(&mut self, length: f32) {
        self.position += self.camera_forward() * length;
    }

    pub fn move_right(&mut self, length: f32) {
        self.position += self.camera_right() * length;
    }

    /// 沿世界的 up 移动
    pub fn move_up(&mut self, length: f32) {
        self.position += Self::CAMERA_UP * length;
    }

    pub fn rotate_yaw(&mut self, angle: f32) {
        self.euler_yaw_deg = (self.euler_yaw_deg + angle).rem_euclid(360.0);
    }

    pub fn rotate_pitch(&mut self, angle: f32) {
        self.euler_pitch_deg = (self.euler_pitch_deg + angle).clamp(-Self::K_PITCH, Self::K_PITCH);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera(view: [f32; 3]) -> Camera {
        let config = CameraConfig {
            view,
            ..Default::default()
        };
        Camera::from_config(&config, 800, 600)
    }

    #[test]
    fn view_direction_round_trips_through_euler() {
        for view in [[0.0, 0.0, -1.0], [1.0, 0.0, 0.0], [0.3, -0.4, 0.5]] {
            let expected = glam::Vec3::from(view).normalize();
            let forward = camera(view).camera_forward();
            assert!(forward.abs_diff_eq(expected, 1e-5), "{forward:?} != {expected:?}");
        }
    }

    #[test]
    fn pitch_is_clamped() {
        let mut camera = camera([0.0, 0.0, -1.0]);
        camera.rotate_pitch(120.0);
        assert_eq!(camera.euler_pitch_deg, 89.0);
        camera.rotate_pitch(-500.0);
        assert_eq!(camera.euler_pitch_deg, -89.0);

        camera.rotate_yaw(-30.0);
        assert_eq!(camera.euler_yaw_deg, 330.0);
    }

    #[test]
    fn projection_tracks_extent() {
        let mut camera = camera([0.0, 0.0, -1.0]);
        assert!((camera.data().aspect_ratio - 800.0 / 600.0).abs() < 1e-6);
        assert!(camera.get_projection_matrix().y_axis.y < 0.0);

        camera.set_extent(1920, 1080);
        let data = camera.data();
        assert!((data.aspect_ratio - 1920.0 / 1080.0).abs() < 1e-6);
        assert_eq!((data.width, data.height), (1920.0, 1080.0));
        assert_eq!(size_of::<CameraData>(), 192);
    }
}
