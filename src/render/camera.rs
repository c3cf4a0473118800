use glam::{Mat4, Vec3};

use crate::transform::Transform;

/// Side and near half-spaces of the view volume, as inward-facing normals in
/// view space. All planes pass through the eye, so a sphere of radius `r`
/// centred at `c` is inside a plane when `dot(c, normal) >= -r`.
///
/// There is no far plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    pub top_normal: Vec3,
    pub bottom_normal: Vec3,
    pub left_normal: Vec3,
    pub right_normal: Vec3,
    pub near_normal: Vec3,
}

impl Frustum {
    pub fn normals(&self) -> [Vec3; 5] {
        [
            self.top_normal,
            self.bottom_normal,
            self.left_normal,
            self.right_normal,
            self.near_normal,
        ]
    }
}

#[derive(Debug, Clone)]
pub struct Camera {
    pub aspect_ratio: f32,
    pub fovy: f32,
    pub transform: Transform,
    pub zfar: f32,
    pub znear: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

impl Camera {
    pub fn new() -> Self {
        Self {
            aspect_ratio: 16.0 / 9.0,
            fovy: 60.0,
            transform: Transform::from_pos(Vec3::new(0.0, 0.0, 5.0)),
            znear: 0.1,
            zfar: 1000.0,
        }
    }

    pub fn looking_at(pos: Vec3, target: Vec3) -> Self {
        let mut camera = Self::new();
        camera.transform.pos = pos;
        camera.transform.look_at(target);
        camera
    }

    pub fn set_aspect_ratio(&mut self, width: u32, height: u32) {
        if height > 0 {
            self.aspect_ratio = width as f32 / height as f32;
        }
    }

    pub fn position(&self) -> Vec3 {
        self.transform.pos
    }

    pub fn forward(&self) -> Vec3 {
        self.transform.forward()
    }

    pub fn right(&self) -> Vec3 {
        self.transform.right()
    }

    pub fn up(&self) -> Vec3 {
        self.transform.up()
    }

    /// Reverse-Z projection: depth 1 on the near plane, 0 on the far plane.
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(
            self.fovy.to_radians(),
            self.aspect_ratio,
            self.zfar,
            self.znear,
        )
    }

    pub fn view_matrix(&self) -> Mat4 {
        self.transform.build_matrix().inverse()
    }

    pub fn view_proj_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Derives the half-space normals from the current projection. Must be
    /// rebuilt after any change to the camera.
    pub fn build_frustum(&self) -> Frustum {
        let projection = self.projection_matrix();
        let tan_half_x = 1.0 / projection.x_axis.x;
        let tan_half_y = 1.0 / projection.y_axis.y;

        Frustum {
            top_normal: Vec3::new(0.0, -1.0, -tan_half_y).normalize(),
            bottom_normal: Vec3::new(0.0, 1.0, -tan_half_y).normalize(),
            left_normal: Vec3::new(1.0, 0.0, -tan_half_x).normalize(),
            right_normal: Vec3::new(-1.0, 0.0, -tan_half_x).normalize(),
            near_normal: Vec3::NEG_Z,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inside(frustum: &Frustum, point: Vec3) -> bool {
        frustum.normals().iter().all(|normal| point.dot(*normal) >= 0.0)
    }

    #[test]
    fn test_view_matrix_moves_target_in_front() {
        let camera = Camera::looking_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO);
        let origin = camera.view_matrix().transform_point3(Vec3::ZERO);
        assert!(origin.abs_diff_eq(Vec3::new(0.0, 0.0, -5.0), 1e-5));
    }

    #[test]
    fn test_reverse_depth_range() {
        let camera = Camera::new();
        let projection = camera.projection_matrix();
        let near = projection.project_point3(Vec3::new(0.0, 0.0, -camera.znear));
        let far = projection.project_point3(Vec3::new(0.0, 0.0, -camera.zfar));
        assert!((near.z - 1.0).abs() < 1e-4);
        assert!(far.z.abs() < 1e-4);
    }

    #[test]
    fn test_frustum_normals_point_inward() {
        let camera = Camera::new();
        let frustum = camera.build_frustum();
        assert!(inside(&frustum, Vec3::new(0.0, 0.0, -10.0)));
        assert!(!inside(&frustum, Vec3::new(0.0, 0.0, 10.0)));
        assert!(!inside(&frustum, Vec3::new(0.0, 100.0, -1.0)));
        assert!(!inside(&frustum, Vec3::new(0.0, -100.0, -1.0)));
        assert!(!inside(&frustum, Vec3::new(100.0, 0.0, -1.0)));
        assert!(!inside(&frustum, Vec3::new(-100.0, 0.0, -1.0)));
        for normal in frustum.normals() {
            assert!((normal.length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_frustum_edges_match_field_of_view() {
        let mut camera = Camera::new();
        camera.fovy = 90.0;
        camera.aspect_ratio = 1.0;
        let frustum = camera.build_frustum();
        // A 90 degree field of view puts the top edge on the y = -z diagonal.
        let edge = Vec3::new(0.0, 1.0, -1.0);
        assert!(edge.dot(frustum.top_normal).abs() < 1e-5);
        let edge = Vec3::new(1.0, 0.0, -1.0);
        assert!(edge.dot(frustum.right_normal).abs() < 1e-5);
    }

    #[test]
    fn test_frustum_follows_camera_changes() {
        let mut camera = Camera::new();
        let narrow = camera.build_frustum();
        camera.fovy = 120.0;
        let wide = camera.build_frustum();
        assert_ne!(narrow, wide);
    }
}
