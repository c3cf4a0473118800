use glam::{Mat4, Vec3};

use crate::render::bundle::lights::PointLightRecord;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    pub position: Vec3,
    pub color: Vec3,
    pub radius: f32,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            color: Vec3::ONE,
            radius: 1.0,
        }
    }
}

impl PointLight {
    pub fn new(position: Vec3, color: Vec3, radius: f32) -> Self {
        Self {
            position,
            color,
            radius,
        }
    }

    pub fn record(&self) -> PointLightRecord {
        PointLightRecord {
            position: self.position,
            radius: self.radius,
            color: self.color,
            pad: 0.0,
        }
    }

    /// Places the unit light volume: centred on the light, scaled to its
    /// radius.
    pub fn volume_transform(&self) -> Mat4 {
        Mat4::from_translation(self.position)
            * Mat4::from_scale(Vec3::splat(self.radius))
    }
}
