//! Small vector/rotation helpers shared by the launch, ramp, flight and ground code.
//!
//! Angles are in **degrees** wherever they are compared against tunables,
//! radians everywhere else.  Every helper is total: degenerate input
//! (zero-length vectors, parallel axes) returns a neutral value instead of NaN.

use bevy::prelude::*;

/// Below this squared length a vector is treated as zero.
const DEGENERATE_SQ: f32 = 1e-12;

/// Remove the component of `v` along `normal`.
pub fn project_on_plane(v: Vec3, normal: Vec3) -> Vec3 {
    let n_sq = normal.length_squared();
    if n_sq < DEGENERATE_SQ {
        return v;
    }
    v - normal * (v.dot(normal) / n_sq)
}

/// Unsigned angle between two vectors in degrees; `0.0` if either is zero-length.
pub fn angle_deg(from: Vec3, to: Vec3) -> f32 {
    let denom = (from.length_squared() * to.length_squared()).sqrt();
    if denom < DEGENERATE_SQ {
        return 0.0;
    }
    (from.dot(to) / denom).clamp(-1.0, 1.0).acos().to_degrees()
}

/// Angle from `from` to `to` in degrees, signed by the right-hand rule about `axis`.
///
/// Positive when rotating `from` by a positive angle about `axis` moves it
/// toward `to`.  A zero cross product counts as positive.
pub fn signed_angle_deg(from: Vec3, to: Vec3, axis: Vec3) -> f32 {
    let angle = angle_deg(from, to);
    if axis.dot(from.cross(to)) < 0.0 {
        -angle
    } else {
        angle
    }
}

/// Shortest rotation taking direction `from` onto direction `to`.
pub fn from_to_rotation(from: Vec3, to: Vec3) -> Quat {
    match (from.try_normalize(), to.try_normalize()) {
        (Some(a), Some(b)) => Quat::from_rotation_arc(a, b),
        _ => Quat::IDENTITY,
    }
}

/// Rotation whose local +Z points along `forward` and whose local +Y is as
/// close to `up` as possible.
///
/// Falls back to the shortest arc from +Z when `up` is parallel to `forward`,
/// and to identity when `forward` is zero.
pub fn look_rotation(forward: Vec3, up: Vec3) -> Quat {
    let Some(z) = forward.try_normalize() else {
        return Quat::IDENTITY;
    };
    let Some(x) = up.cross(z).try_normalize() else {
        return Quat::from_rotation_arc(Vec3::Z, z);
    };
    let y = z.cross(x);
    Quat::from_mat3(&Mat3::from_cols(x, y, z))
}

/// Frame-rate scaled interpolation factor, clamped to `[0, 1]`.
#[inline]
pub fn rate_t(dt: f32, rate: f32) -> f32 {
    (dt * rate).clamp(0.0, 1.0)
}

/// Point on an oriented box nearest to `point`.
pub fn closest_point_on_box(center: Vec3, rotation: Quat, half_extents: Vec3, point: Vec3) -> Vec3 {
    let local = rotation.inverse() * (point - center);
    let clamped = local.clamp(-half_extents, half_extents);
    center + rotation * clamped
}

/// Impulse pushing a body away from an explosion, with linear falloff.
///
/// The explosion centre is shifted down by `upwards_modifier` so the push
/// has an upward bias.  A `radius` of zero applies the full force regardless
/// of distance; bodies farther than `radius` receive nothing.
pub fn explosion_impulse(
    body_center: Vec3,
    explosion: Vec3,
    force: f32,
    radius: f32,
    upwards_modifier: f32,
) -> Vec3 {
    let distance = body_center.distance(explosion);
    let falloff = if radius > 0.0 {
        if distance > radius {
            return Vec3::ZERO;
        }
        1.0 - distance / radius
    } else {
        1.0
    };
    let origin = explosion - Vec3::Y * upwards_modifier;
    let dir = (body_center - origin).try_normalize().unwrap_or(Vec3::Y);
    dir * force * falloff
}
