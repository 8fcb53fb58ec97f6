//! Ground transition: impacts, sliding to a stop, distance tracking and the
//! landing marker.
//!
//! ## Impact
//!
//! The first ground contact while flying ends control, including one the
//! plane was already touching when it left the ramp.  A hard impact
//! (`relative_speed ≥ min_impact_force_for_damage`) sends a [`PartImpact`] to
//! the part nearest each contact point and leaves the velocity alone; a soft
//! one projects the velocity onto the ground, keeps 70 % of it, halves the
//! spin and locks vertical translation.  Either way the plane starts sliding.
//!
//! ## Sliding
//!
//! Every fixed step while sliding, [`slide_step`] applies `ground_drag_factor`
//! and hugs the terrain under the plane.  Once forward progress stalls the
//! landing marker is requested (once per launch), and once the speed drops
//! below `min_ground_speed` the plane stops for good.
//!
//! ## Marker
//!
//! A [`MarkerRequest`] carries the farthest-progress position.  The bridge
//! casts down from just above it and places the marker with [`marker_pose`].

use super::damage::{nearest_parts, DetachablePart, PartRoster};
use super::state::{
    BodyState, ContactPhase, DistanceTracker, FlightPhase, FlightSignal, GroundProbe,
    GroundState, MarkerRequest, PartImpact, Plane, PlaneCollision, SurfaceHit, SurfaceKind,
};
use crate::config::FlightConfig;
use crate::math::{from_to_rotation, project_on_plane, rate_t};
use bevy::prelude::*;
use bevy_rapier3d::prelude::{LockedAxes, ReadMassProperties, Velocity};

/// Below this speed a landing does not redirect the velocity.
const SOFT_LANDING_MIN_SPEED: f32 = 0.1;

/// Spin kept after a soft landing.
const LANDING_SPIN_KEPT: f32 = 0.5;

/// Downward impulse when the plane slides off an edge.
const EDGE_DROP_IMPULSE: f32 = 2.0;

/// Height above the farthest point the marker ray starts from.
const MARKER_RAY_LIFT: f32 = 1.0;

// ── Pure steps ────────────────────────────────────────────────────────────────

/// Set the once-per-cycle marker latch.
///
/// Returns the request on the first call after a reset and `None` afterwards.
pub fn latch_marker(
    ground: &mut GroundState,
    tracker: &DistanceTracker,
    position: Vec3,
) -> Option<MarkerRequest> {
    if ground.marker_placed {
        return None;
    }
    ground.marker_placed = true;
    Some(MarkerRequest {
        origin: tracker.max_z_position,
        fallback: position,
        distance: tracker.max_z_distance,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Impact {
    /// Hard enough to break parts.
    Damaging,
    Soft,
}

pub fn classify_impact(relative_speed: f32, config: &FlightConfig) -> Impact {
    if relative_speed >= config.min_impact_force_for_damage {
        Impact::Damaging
    } else {
        Impact::Soft
    }
}

/// Redirect the velocity along the ground after a soft landing.
///
/// Returns `false` when the plane was already too slow to redirect.
pub fn soft_landing(body: &mut BodyState, ground_normal: Vec3, config: &FlightConfig) -> bool {
    if body.speed() <= SOFT_LANDING_MIN_SPEED {
        return false;
    }
    body.linvel = project_on_plane(body.linvel, ground_normal) * config.ground_restitution;
    body.angvel *= LANDING_SPIN_KEPT;
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlideOutcome {
    /// Forward progress has stalled after leaving the ramp.
    pub marker_due: bool,
    pub stopped: bool,
}

/// One fixed step of ground sliding.
pub fn slide_step(
    ground: &mut GroundState,
    body: &mut BodyState,
    probe: Option<SurfaceHit>,
    dt: f32,
    config: &FlightConfig,
) -> SlideOutcome {
    let mut outcome = SlideOutcome::default();

    if dt > 0.0 {
        let z = body.translation.z;
        let z_speed = (z - ground.last_z) / dt;
        ground.last_z = z;
        outcome.marker_due =
            z_speed < config.min_z_axis_speed && ground.exited_ramp && !ground.marker_placed;
    }

    body.linvel *= config.ground_drag_factor;
    if body.speed() < config.min_ground_speed {
        body.linvel = Vec3::ZERO;
        body.angvel = Vec3::ZERO;
        outcome.stopped = true;
        return outcome;
    }

    if let Some(hit) = probe.filter(|hit| hit.distance <= config.ground_check_distance) {
        let target = from_to_rotation(body.up(), hit.normal) * body.rotation;
        body.rotation = body
            .rotation
            .slerp(target, rate_t(dt, config.ground_alignment_speed))
            .normalize();
    }
    outcome
}

/// Where the marker ray starts and how far it reaches.
pub fn marker_ray(request: &MarkerRequest, config: &FlightConfig) -> (Vec3, f32) {
    (
        request.origin + Vec3::Y * MARKER_RAY_LIFT,
        config.ground_check_distance * 4.0,
    )
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerPose {
    pub position: Vec3,
    pub rotation: Quat,
    pub normal: Vec3,
}

/// Resolve the marker pose from the downward ray result.
pub fn marker_pose(request: &MarkerRequest, hit: Option<SurfaceHit>, config: &FlightConfig) -> MarkerPose {
    match hit {
        Some(hit) => MarkerPose {
            position: hit.point + hit.normal * config.marker_y_offset,
            rotation: from_to_rotation(Vec3::Y, hit.normal),
            normal: hit.normal,
        },
        None => MarkerPose {
            position: request.fallback + Vec3::Y * config.marker_y_offset,
            rotation: Quat::IDENTITY,
            normal: Vec3::Y,
        },
    }
}

// ── Systems ───────────────────────────────────────────────────────────────────

/// Fold the plane's position into the farthest-progress record.
pub fn distance_tracking_system(mut q: Query<(&Transform, &mut DistanceTracker), With<Plane>>) {
    for (transform, mut tracker) in q.iter_mut() {
        tracker.record(transform.translation);
    }
}

/// Ground contacts: impact while flying, keep sliding flush, drop off edges.
#[allow(clippy::type_complexity, clippy::too_many_arguments)]
pub fn ground_contact_system(
    mut collisions: MessageReader<PlaneCollision>,
    config: Res<FlightConfig>,
    parts: Query<(Entity, &DetachablePart, &GlobalTransform)>,
    mut q: Query<
        (
            &mut FlightPhase,
            &mut GroundState,
            &PartRoster,
            &GroundProbe,
            &Transform,
            &mut Velocity,
            &mut LockedAxes,
            Option<&ReadMassProperties>,
        ),
        With<Plane>,
    >,
    mut impacts: MessageWriter<PartImpact>,
    mut signals: MessageWriter<FlightSignal>,
) {
    let Ok((mut phase, mut ground, roster, probe, transform, mut velocity, mut locked, mass)) =
        q.single_mut()
    else {
        collisions.clear();
        return;
    };

    for collision in collisions.read() {
        if collision.surface != SurfaceKind::Ground {
            continue;
        }
        let normal = collision
            .contacts
            .first()
            .map(|c| c.normal)
            .unwrap_or(Vec3::Y);

        match (collision.phase, *phase) {
            // A ground contact still held when control starts has no fresh
            // Started, so a persisting one lands the plane too.
            (
                ContactPhase::Started | ContactPhase::Persisting,
                FlightPhase::Airborne | FlightPhase::Tumbling,
            ) => {
                signals.write(FlightSignal::ControlStopped {
                    impact_speed: collision.relative_speed,
                });
                match classify_impact(collision.relative_speed, &config) {
                    Impact::Damaging => {
                        let candidates: Vec<_> = roster
                            .members
                            .iter()
                            .filter_map(|entity| parts.get(*entity).ok())
                            .collect();
                        let struck =
                            nearest_parts(collision.contacts.iter().map(|c| c.point), &candidates);
                        for &(part, point) in &struck {
                            impacts.write(PartImpact {
                                part,
                                surface: SurfaceKind::Ground,
                                point,
                                relative_speed: collision.relative_speed,
                            });
                        }
                        info!(
                            "[ground] Hard landing at {:.1} u/s; {} part(s) struck",
                            collision.relative_speed,
                            struck.len()
                        );
                    }
                    Impact::Soft => {
                        let mut body =
                            BodyState::read(transform, &velocity, mass, config.plane_mass);
                        if soft_landing(&mut body, normal, &config) {
                            velocity.linvel = body.linvel;
                            velocity.angvel = body.angvel;
                            locked.insert(LockedAxes::TRANSLATION_LOCKED_Y);
                        }
                        info!("[ground] Landed at {:.1} u/s", collision.relative_speed);
                    }
                }
                ground.last_z = transform.translation.z;
                *phase = FlightPhase::GroundedSliding;
            }
            (ContactPhase::Persisting, FlightPhase::GroundedSliding) => {
                if velocity.linvel.length() > SOFT_LANDING_MIN_SPEED {
                    velocity.linvel = project_on_plane(velocity.linvel, normal);
                    if !locked.contains(LockedAxes::TRANSLATION_LOCKED_Y) {
                        locked.insert(LockedAxes::TRANSLATION_LOCKED_Y);
                    }
                }
            }
            (ContactPhase::Stopped, FlightPhase::GroundedSliding) => {
                if probe.within(config.ground_check_distance * 2.0).is_none() {
                    locked.remove(LockedAxes::TRANSLATION_LOCKED_Y);
                    let mut body = BodyState::read(transform, &velocity, mass, config.plane_mass);
                    body.apply_impulse(Vec3::NEG_Y * EDGE_DROP_IMPULSE);
                    velocity.linvel = body.linvel;
                    debug!("[ground] Slid off an edge");
                }
            }
            _ => {}
        }
    }
}

/// Slide, request the marker when progress stalls, stop when slow enough.
#[allow(clippy::type_complexity)]
pub fn ground_slide_system(
    time: Res<Time>,
    config: Res<FlightConfig>,
    mut q: Query<
        (
            &mut FlightPhase,
            &mut GroundState,
            &DistanceTracker,
            &GroundProbe,
            &mut Transform,
            &mut Velocity,
            &mut LockedAxes,
            Option<&ReadMassProperties>,
        ),
        With<Plane>,
    >,
    mut markers: MessageWriter<MarkerRequest>,
    mut signals: MessageWriter<FlightSignal>,
) {
    let Ok((
        mut phase,
        mut ground,
        tracker,
        probe,
        mut transform,
        mut velocity,
        mut locked,
        mass,
    )) = q.single_mut()
    else {
        return;
    };
    if !phase.is_grounded() {
        return;
    }

    let mut body = BodyState::read(&transform, &velocity, mass, config.plane_mass);
    let outcome = slide_step(&mut ground, &mut body, probe.hit, time.delta_secs(), &config);
    body.write(&mut transform, &mut velocity);

    if outcome.marker_due {
        if let Some(request) = latch_marker(&mut ground, tracker, transform.translation) {
            ground.exited_ramp = false;
            markers.write(request);
            info!("[ground] Progress stalled at {:.2}; marker requested", request.distance);
        }
    }
    if outcome.stopped {
        *locked = LockedAxes::empty();
        *phase = FlightPhase::GroundedStopped;
        signals.write(FlightSignal::Stopped);
        info!("[ground] Plane stopped; farthest {:.2}", tracker.max_z_distance);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plane::damage::PartKind;
    use crate::plane::state::ContactSample;
    use crate::plane::test_support::{collect_messages, Collected};

    fn body(linvel: Vec3) -> BodyState {
        BodyState {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            linvel,
            angvel: Vec3::new(0.0, 2.0, 0.0),
            mass: 1.0,
        }
    }

    // ── pure steps ────────────────────────────────────────────────────────────

    #[test]
    fn marker_latch_fires_once_per_cycle() {
        let mut ground = GroundState::default();
        let mut tracker = DistanceTracker::new(Vec3::ZERO);
        tracker.record(Vec3::new(0.0, 0.0, 42.0));

        let first = latch_marker(&mut ground, &tracker, Vec3::new(0.0, 0.0, 40.0))
            .expect("first request");
        assert_eq!(first.distance, 42.0);
        assert_eq!(first.origin.z, 42.0);
        assert!(latch_marker(&mut ground, &tracker, Vec3::ZERO).is_none());

        ground.marker_placed = false;
        assert!(latch_marker(&mut ground, &tracker, Vec3::ZERO).is_some());
    }

    #[test]
    fn impact_threshold_is_inclusive() {
        let cfg = FlightConfig::default();
        assert_eq!(classify_impact(15.0, &cfg), Impact::Damaging);
        assert_eq!(classify_impact(10.0, &cfg), Impact::Damaging);
        assert_eq!(classify_impact(5.0, &cfg), Impact::Soft);
    }

    #[test]
    fn soft_landing_projects_and_keeps_seventy_percent() {
        let cfg = FlightConfig::default();
        let mut b = body(Vec3::new(0.0, -4.0, 10.0));
        assert!(soft_landing(&mut b, Vec3::Y, &cfg));
        assert!(b.linvel.distance(Vec3::new(0.0, 0.0, 7.0)) < 1e-5);
        assert_eq!(b.angvel, Vec3::new(0.0, 1.0, 0.0));

        let mut slow = body(Vec3::new(0.0, -0.05, 0.0));
        assert!(!soft_landing(&mut slow, Vec3::Y, &cfg));
    }

    #[test]
    fn sliding_stalls_then_requests_marker_once_off_ramp() {
        let cfg = FlightConfig::default();
        let mut ground = GroundState {
            last_z: 10.0,
            exited_ramp: true,
            ..Default::default()
        };
        let mut b = body(Vec3::new(0.0, 0.0, 5.0));
        b.translation.z = 10.0;
        let outcome = slide_step(&mut ground, &mut b, None, 0.02, &cfg);
        assert!(outcome.marker_due);
        assert!(!outcome.stopped);
        assert!((b.linvel.z - 4.9).abs() < 1e-5);

        ground.exited_ramp = false;
        assert!(!slide_step(&mut ground, &mut b, None, 0.02, &cfg).marker_due);
    }

    #[test]
    fn sliding_stops_below_min_speed() {
        let cfg = FlightConfig::default();
        let mut ground = GroundState::default();
        let mut b = body(Vec3::new(0.0, 0.0, 0.1));
        let outcome = slide_step(&mut ground, &mut b, None, 0.02, &cfg);
        assert!(outcome.stopped);
        assert_eq!(b.linvel, Vec3::ZERO);
        assert_eq!(b.angvel, Vec3::ZERO);
    }

    #[test]
    fn sliding_hugs_nearby_terrain_only() {
        let cfg = FlightConfig::default();
        let slope = Quat::from_rotation_x(0.3) * Vec3::Y;
        let near = SurfaceHit {
            point: Vec3::ZERO,
            normal: slope,
            distance: 0.3,
        };
        let mut ground = GroundState::default();
        let mut b = body(Vec3::new(0.0, 0.0, 5.0));
        slide_step(&mut ground, &mut b, Some(near), 0.02, &cfg);
        assert_ne!(b.rotation, Quat::IDENTITY);

        let far = SurfaceHit { distance: 0.9, ..near };
        let mut b = body(Vec3::new(0.0, 0.0, 5.0));
        slide_step(&mut ground, &mut b, Some(far), 0.02, &cfg);
        assert_eq!(b.rotation, Quat::IDENTITY);
    }

    #[test]
    fn marker_pose_sits_above_hit_or_falls_back() {
        let cfg = FlightConfig::default();
        let request = MarkerRequest {
            origin: Vec3::new(0.0, 1.0, 30.0),
            fallback: Vec3::new(0.0, 1.0, 28.0),
            distance: 30.0,
        };
        let hit = SurfaceHit {
            point: Vec3::new(0.0, 0.0, 30.0),
            normal: Vec3::Y,
            distance: 2.0,
        };
        let pose = marker_pose(&request, Some(hit), &cfg);
        assert_eq!(pose.position, Vec3::new(0.0, 0.5, 30.0));
        assert_eq!(pose.rotation, Quat::IDENTITY);

        let pose = marker_pose(&request, None, &cfg);
        assert_eq!(pose.position, Vec3::new(0.0, 1.5, 28.0));

        let (origin, reach) = marker_ray(&request, &cfg);
        assert_eq!(origin, Vec3::new(0.0, 2.0, 30.0));
        assert_eq!(reach, 2.0);
    }

    // ── contact system ────────────────────────────────────────────────────────

    fn build_test_app() -> App {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        app.insert_resource(FlightConfig::default());
        app.add_message::<PlaneCollision>();
        app.add_message::<PartImpact>();
        app.add_message::<FlightSignal>();
        app.init_resource::<Collected<PartImpact>>();
        app.add_systems(
            Update,
            (ground_contact_system, collect_messages::<PartImpact>).chain(),
        );
        app
    }

    /// Airborne plane with a wing out to each side and a tail behind.
    fn spawn_flying_plane(app: &mut App) -> (Entity, [Entity; 3]) {
        let world = app.world_mut();
        let plane = world.spawn_empty().id();
        let mut part = |kind, offset: Vec3| {
            world
                .spawn((
                    DetachablePart::new(kind, Vec3::new(0.75, 0.05, 0.25)),
                    GlobalTransform::from_translation(offset),
                    ChildOf(plane),
                ))
                .id()
        };
        let left = part(PartKind::LeftWing, Vec3::new(1.0, 0.0, 0.0));
        let right = part(PartKind::RightWing, Vec3::new(-1.0, 0.0, 0.0));
        let tail = part(PartKind::Tail, Vec3::new(0.0, 0.0, -1.5));
        world.entity_mut(plane).insert((
            Plane,
            FlightPhase::Airborne,
            GroundState::default(),
            PartRoster::new(vec![left, right, tail]),
            GroundProbe::default(),
            Transform::from_translation(Vec3::new(0.0, 0.3, 20.0)),
            Velocity::linear(Vec3::new(0.0, -6.0, 12.0)),
            LockedAxes::empty(),
        ));
        (plane, [left, right, tail])
    }

    fn ground_hit(app: &mut App, relative_speed: f32, points: &[Vec3]) {
        app.world_mut().write_message(PlaneCollision {
            phase: ContactPhase::Started,
            surface: SurfaceKind::Ground,
            other: Entity::PLACEHOLDER,
            surface_up: Vec3::Y,
            contacts: points
                .iter()
                .map(|p| ContactSample {
                    point: *p,
                    normal: Vec3::Y,
                })
                .collect(),
            relative_speed,
        });
        app.update();
    }

    #[test]
    fn hard_landing_notifies_nearest_parts_and_stops_control() {
        let mut app = build_test_app();
        let (plane, [left, _, tail]) = spawn_flying_plane(&mut app);

        ground_hit(
            &mut app,
            15.0,
            &[Vec3::new(1.4, -0.1, 0.0), Vec3::new(1.2, -0.1, 0.1), Vec3::new(0.1, -0.1, -1.6)],
        );

        let world = app.world();
        assert_eq!(*world.get::<FlightPhase>(plane).unwrap(), FlightPhase::GroundedSliding);
        let struck: Vec<(Entity, Vec3)> = world
            .resource::<Collected<PartImpact>>()
            .0
            .iter()
            .map(|i| (i.part, i.point))
            .collect();
        // Each part carries the contact that struck it.
        assert_eq!(
            struck,
            vec![(left, Vec3::new(1.4, -0.1, 0.0)), (tail, Vec3::new(0.1, -0.1, -1.6))]
        );
        // Velocity is left to the solver on a hard landing.
        assert_eq!(world.get::<Velocity>(plane).unwrap().linvel, Vec3::new(0.0, -6.0, 12.0));
    }

    #[test]
    fn soft_landing_redirects_velocity_without_damage() {
        let mut app = build_test_app();
        let (plane, _) = spawn_flying_plane(&mut app);

        ground_hit(&mut app, 5.0, &[Vec3::new(0.0, 0.0, 20.0)]);

        let world = app.world();
        assert_eq!(*world.get::<FlightPhase>(plane).unwrap(), FlightPhase::GroundedSliding);
        assert!(world.resource::<Collected<PartImpact>>().0.is_empty());
        let v = world.get::<Velocity>(plane).unwrap().linvel;
        assert!(v.distance(Vec3::new(0.0, 0.0, 8.4)) < 1e-4, "got {v:?}");
        assert!(world
            .get::<LockedAxes>(plane)
            .unwrap()
            .contains(LockedAxes::TRANSLATION_LOCKED_Y));
        assert_eq!(world.get::<GroundState>(plane).unwrap().last_z, 20.0);
    }

    #[test]
    fn persisting_ground_contact_lands_a_flying_plane() {
        let mut app = build_test_app();
        let (plane, _) = spawn_flying_plane(&mut app);

        app.world_mut().write_message(PlaneCollision {
            phase: ContactPhase::Persisting,
            surface: SurfaceKind::Ground,
            other: Entity::PLACEHOLDER,
            surface_up: Vec3::Y,
            contacts: vec![ContactSample {
                point: Vec3::new(0.0, 0.0, 20.0),
                normal: Vec3::Y,
            }],
            relative_speed: 3.0,
        });
        app.update();

        assert_eq!(
            *app.world().get::<FlightPhase>(plane).unwrap(),
            FlightPhase::GroundedSliding
        );
    }

    #[test]
    fn ground_contact_before_control_is_ignored() {
        let mut app = build_test_app();
        let (plane, _) = spawn_flying_plane(&mut app);
        app.world_mut().entity_mut(plane).insert(FlightPhase::Aligning);

        ground_hit(&mut app, 15.0, &[Vec3::ZERO]);
        assert_eq!(*app.world().get::<FlightPhase>(plane).unwrap(), FlightPhase::Aligning);
        assert!(app.world().resource::<Collected<PartImpact>>().0.is_empty());
    }
}
