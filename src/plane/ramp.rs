//! Ramp contact: hold the released plane flush with the ramp, then hand it to
//! the flight model when it leaves.
//!
//! ## Flow
//!
//! 1. [`ramp_contact_system`] turns the first ramp contact after release into
//!    `Aligning` and remembers the rotation the plane arrived with.
//! 2. [`ramp_align_system`] slerps the plane toward the ramp surface (and its
//!    direction of travel) every fixed step.  A plane that stalls on the ramp
//!    for `ramp_stop_threshold_secs` gets its landing marker there.
//! 3. Losing contact with the ramp starts control: rotation locks come off,
//!    the ramp collider is disabled, and the arrival rotation is restored over
//!    `ramp_restore_secs` by [`ramp_restore_system`].

use super::ground::latch_marker;
use super::state::{
    BodyState, ContactPhase, DistanceTracker, FlightPhase, FlightSignal, FlightState,
    GroundState, MarkerRequest, Plane, PlaneCollision, RampContactState, SurfaceKind,
};
use crate::config::FlightConfig;
use crate::math::{from_to_rotation, look_rotation, project_on_plane, rate_t};
use crate::timers::{BoundedTimer, RotationTween};
use bevy::prelude::*;
use bevy_rapier3d::prelude::{
    ColliderDisabled, Damping, GravityScale, LockedAxes, ReadMassProperties, Velocity,
};

/// Projected travel directions shorter than this do not define a heading.
const MIN_PROJECTED_TRAVEL: f32 = 0.1;

// ── Pure steps ────────────────────────────────────────────────────────────────

/// Rotation the plane is easing toward while on the ramp.
///
/// Up is matched to the ramp normal.  When moving fast enough, the nose also
/// follows the velocity projected onto the ramp surface.
pub fn ramp_target_rotation(body: &BodyState, ramp_normal: Vec3, config: &FlightConfig) -> Quat {
    let flush = from_to_rotation(body.up(), ramp_normal) * body.rotation;
    if !config.align_to_velocity || body.speed() <= config.min_velocity_for_ramp_alignment {
        return flush;
    }
    let travel = project_on_plane(body.linvel, ramp_normal).normalize_or_zero();
    if travel.length() > MIN_PROJECTED_TRAVEL {
        look_rotation(travel, ramp_normal)
    } else {
        flush
    }
}

/// One alignment step toward [`ramp_target_rotation`].
pub fn align_step(body: &mut BodyState, ramp_normal: Vec3, dt: f32, config: &FlightConfig) {
    let target = ramp_target_rotation(body, ramp_normal, config);
    body.rotation = body
        .rotation
        .slerp(target, rate_t(dt, config.ramp_alignment_speed))
        .normalize();
}

/// Accumulate the time the plane has been stalled on the ramp.
///
/// Returns `true` on the step the stall reaches `ramp_stop_threshold_secs`
/// and on every step after that until the plane moves again.
pub fn ramp_stall_step(ramp: &mut RampContactState, z: f32, dt: f32, config: &FlightConfig) -> bool {
    if dt <= 0.0 {
        return false;
    }
    let last_z = ramp.last_z.unwrap_or(z);
    ramp.last_z = Some(z);
    let z_speed = ((z - last_z) / dt).abs();
    if z_speed < config.min_z_axis_speed {
        ramp.stop_timer += dt;
        ramp.stop_timer >= config.ramp_stop_threshold_secs
    } else {
        ramp.stop_timer = 0.0;
        false
    }
}

// ── Systems ───────────────────────────────────────────────────────────────────

/// Enter and leave ramp contact.
#[allow(clippy::type_complexity, clippy::too_many_arguments)]
pub fn ramp_contact_system(
    mut commands: Commands,
    mut collisions: MessageReader<PlaneCollision>,
    config: Res<FlightConfig>,
    mut q: Query<
        (
            &mut FlightPhase,
            &mut RampContactState,
            &mut FlightState,
            &mut GroundState,
            &Transform,
            &mut LockedAxes,
            &mut GravityScale,
            &mut Damping,
        ),
        With<Plane>,
    >,
    mut signals: MessageWriter<FlightSignal>,
) {
    let Ok((
        mut phase,
        mut ramp,
        mut flight,
        mut ground,
        transform,
        mut locked,
        mut gravity,
        mut damping,
    )) = q.single_mut()
    else {
        collisions.clear();
        return;
    };

    for collision in collisions.read() {
        if collision.surface != SurfaceKind::Ramp {
            continue;
        }
        match (collision.phase, *phase) {
            (ContactPhase::Started | ContactPhase::Persisting, FlightPhase::Launched) => {
                if ramp.original_rotation.is_none() {
                    ramp.original_rotation = Some(transform.rotation);
                }
                ramp.ramp = Some(collision.other);
                ramp.ramp_normal = Some(collision.surface_up);
                ramp.last_z = Some(transform.translation.z);
                ramp.stop_timer = 0.0;
                *phase = FlightPhase::Aligning;
                info!("[ramp] Contact with ramp {:?}; aligning", collision.other);
            }
            (ContactPhase::Started, FlightPhase::Aligning) => {
                ramp.ramp = Some(collision.other);
                ramp.ramp_normal = Some(collision.surface_up);
            }
            (ContactPhase::Stopped, FlightPhase::Aligning) if ramp.ramp == Some(collision.other) => {
                ramp.ramp = None;
                ramp.ramp_normal = None;
                if let Some(original) = ramp.original_rotation {
                    ramp.restore = Some(RotationTween::new(
                        transform.rotation,
                        original,
                        config.ramp_restore_secs,
                    ));
                }
                locked.remove(LockedAxes::ROTATION_LOCKED);
                commands.entity(collision.other).insert(ColliderDisabled);

                // Start control.
                *phase = FlightPhase::Airborne;
                gravity.0 = 1.0;
                damping.linear_damping = config.glide_drag;
                damping.angular_damping = config.angular_drag_amount;
                ground.exited_ramp = true;
                ground.marker_placed = false;
                ramp.stop_timer = 0.0;
                flight.wing_check = Some(BoundedTimer::new(config.wing_check_delay_secs));
                signals.write(FlightSignal::ControlStarted);
                info!("[ramp] Left ramp {:?}; control started", collision.other);
            }
            _ => {}
        }
    }
}

/// Hold the plane flush with the ramp and detect a stall.
#[allow(clippy::type_complexity)]
pub fn ramp_align_system(
    time: Res<Time>,
    config: Res<FlightConfig>,
    surfaces: Query<(), With<SurfaceKind>>,
    mut q: Query<
        (
            &mut FlightPhase,
            &mut RampContactState,
            &mut GroundState,
            &DistanceTracker,
            &mut Transform,
            &mut Velocity,
            Option<&ReadMassProperties>,
        ),
        With<Plane>,
    >,
    mut markers: MessageWriter<MarkerRequest>,
) {
    let Ok((mut phase, mut ramp, mut ground, tracker, mut transform, mut velocity, mass)) =
        q.single_mut()
    else {
        return;
    };
    if !phase.is_aligning() {
        return;
    }
    let dt = time.delta_secs();

    // A despawned ramp counts as no contact: nothing to align to.
    let normal = ramp
        .ramp
        .filter(|entity| surfaces.contains(*entity))
        .and(ramp.ramp_normal);
    if let Some(normal) = normal {
        let mut body = BodyState::read(&transform, &velocity, mass, config.plane_mass);
        align_step(&mut body, normal, dt, &config);
        body.write(&mut transform, &mut velocity);
    }

    if ground.marker_placed {
        return;
    }
    if ramp_stall_step(&mut ramp, transform.translation.z, dt, &config) {
        if let Some(request) = latch_marker(&mut ground, tracker, transform.translation) {
            markers.write(request);
            *phase = FlightPhase::GroundedStopped;
            info!(
                "[ramp] Stalled on ramp for {:.2}s; marker requested",
                ramp.stop_timer
            );
        }
    }
}

/// Ease the rotation back to the one the plane arrived on the ramp with.
pub fn ramp_restore_system(
    time: Res<Time>,
    mut q: Query<(&mut RampContactState, &mut Transform), With<Plane>>,
) {
    let Ok((mut ramp, mut transform)) = q.single_mut() else {
        return;
    };
    let Some(tween) = ramp.restore.as_mut() else {
        return;
    };
    transform.rotation = tween.tick(time.delta_secs());
    if tween.timer.finished() {
        ramp.restore = None;
        debug!("[ramp] Orientation restored");
    }
}
