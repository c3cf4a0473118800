//! Frustum culling of bounding spheres.
//!
//! The sphere is moved to world space with the object's transform, its radius
//! is inflated by the largest basis-vector length of that transform (a
//! conservative bound under non-uniform scale), then it is tested in view
//! space against each half-space of the [`Frustum`].

use glam::{Mat4, Vec3};

use super::{camera::Camera, camera::Frustum, mesh::BoundingSphere};

/// Largest length among the first three columns of `transform`. Zero-length
/// columns contribute nothing, so a fully degenerate transform yields 0.
pub fn max_scale(transform: &Mat4) -> f32 {
    transform
        .x_axis
        .truncate()
        .length()
        .max(transform.y_axis.truncate().length())
        .max(transform.z_axis.truncate().length())
}

#[inline]
fn in_bound(view_center: Vec3, normal: Vec3, radius: f32) -> bool {
    view_center.dot(normal) >= -radius
}

/// Returns `true` when the object must be rejected.
pub fn cull(
    sphere: &BoundingSphere,
    world_transform: &Mat4,
    camera: &Camera,
    frustum: &Frustum,
) -> bool {
    cull_in_view(sphere, world_transform, &camera.view_matrix(), frustum)
}

/// [`cull`] against an already inverted camera transform, so a pass over
/// many objects inverts it once.
pub fn cull_in_view(
    sphere: &BoundingSphere,
    world_transform: &Mat4,
    view: &Mat4,
    frustum: &Frustum,
) -> bool {
    let world_center = world_transform.transform_point3(sphere.center);
    let radius = sphere.radius * max_scale(world_transform);
    let view_center = view.transform_point3(world_center);

    frustum
        .normals()
        .iter()
        .any(|normal| !in_bound(view_center, *normal, radius))
}
