use glam::{Mat3, Mat4, Quat, Vec3};

/// Rigid placement plus scale. Used to position the camera and to build the
/// world-from-local matrix of scene objects.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub pos: Vec3,
    pub rot: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            pos: Vec3::ZERO,
            rot: Quat::IDENTITY,
            scale: Vec3::splat(1.0),
        }
    }
}

impl Transform {
    pub fn build_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rot, self.pos)
    }

    pub fn from_pos(pos: Vec3) -> Self {
        Self {
            pos,
            ..Default::default()
        }
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn translate(&mut self, offset: Vec3) {
        self.pos += offset;
    }

    pub fn rotate(&mut self, axis: Vec3, angle: f32) {
        self.rot = Quat::from_axis_angle(axis, angle) * self.rot;
    }

    pub fn right(&self) -> Vec3 {
        (self.rot * Vec3::X).normalize()
    }

    pub fn up(&self) -> Vec3 {
        (self.rot * Vec3::Y).normalize()
    }

    pub fn forward(&self) -> Vec3 {
        (self.rot * -Vec3::Z).normalize()
    }

    pub fn look_at(&mut self, target: Vec3) {
        let backward = (self.pos - target).normalize();
        self.look_to(backward);
    }

    /// Orients so that local +Z maps onto `backward` (the camera then looks
    /// down -Z, towards the target). Keeps world up as the reference, or
    /// world X as `right` when looking straight up or down.
    pub fn look_to(&mut self, backward: Vec3) {
        let right = Vec3::Y.cross(backward).try_normalize().unwrap_or(Vec3::X);
        let local_up = backward.cross(right);
        self.rot =
            Quat::from_mat3(&Mat3::from_cols(right, local_up, backward));
    }
}
