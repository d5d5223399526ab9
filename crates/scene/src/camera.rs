use glam::{Mat4, Vec3};

/// Camera that circles a target at a fixed distance.
///
/// The yaw advances at `orbit_speed` radians per second when the logic step
/// runs; pitch and distance stay where they were set.
#[derive(Debug, Clone)]
pub struct OrbitCamera {
    pub target: Vec3,
    pub distance: f32,
    pub yaw: f32,
    pub pitch: f32,
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub orbit_speed: f32,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            target: Vec3::ZERO,
            distance: 15.0,
            yaw: -90.0_f32.to_radians(),
            pitch: -20.0_f32.to_radians(),
            fov: 60.0_f32.to_radians(),
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
            orbit_speed: 0.0,
        }
    }
}

impl OrbitCamera {
    /// Place the camera so a cube of the given half extent around the origin
    /// fits in view, with the far plane behind its back face.
    pub fn framing(half_extent: f32) -> Self {
        let half_extent = half_extent.max(1.0);
        let distance = half_extent * 3.0;
        Self {
            distance,
            far: distance + half_extent * 4.0,
            ..Self::default()
        }
    }

    pub fn with_orbit_speed(mut self, degrees_per_second: f32) -> Self {
        self.orbit_speed = degrees_per_second.to_radians();
        self
    }

    /// Unit vector from the camera toward the target.
    pub fn forward(&self) -> Vec3 {
        Vec3::new(
            self.yaw.cos() * self.pitch.cos(),
            self.pitch.sin(),
            self.yaw.sin() * self.pitch.cos(),
        )
        .normalize()
    }

    pub fn position(&self) -> Vec3 {
        self.target - self.forward() * self.distance
    }

    /// Advance the orbit by one logic step of `dt` seconds.
    pub fn advance(&mut self, dt: f32) {
        self.yaw = (self.yaw + self.orbit_speed * dt) % std::f32::consts::TAU;
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.aspect = width.max(1) as f32 / height.max(1) as f32;
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position(), self.target, Vec3::Y)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov, self.aspect, self.near, self.far)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Model-view-projection for one instance transform.
    pub fn mvp(&self, model: &Mat4) -> Mat4 {
        self.view_projection() * *model
    }
}
