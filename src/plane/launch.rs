//! Drag-to-launch: pull the plane back against the band, release to fire it.
//!
//! ## Pipeline
//!
//! Per frame (`Update`), after the pointer has been sampled and picked:
//! 1. [`drag_begin_system`]: a press on the plane in `Resting` starts a drag.
//! 2. [`drag_track_system`]: moves the pinned plane to the clamped drag point.
//! 3. [`drag_release_system`]: launches, or tweens back to rest for short pulls.
//! 4. [`return_to_rest_system`]: advances the return tween.
//!
//! Per fixed step: [`launch_lift_system`] applies the optional post-release lift.
//!
//! The geometry lives in pure functions ([`constrain_drag`], [`release`],
//! [`launch_yaw`], [`lift_step`]) so it is tested without a window or camera.

use super::state::{
    BodyState, FlightPhase, LaunchFeedback, LaunchState, Plane, PointerIntent,
};
use crate::config::FlightConfig;
use crate::math::{rate_t, signed_angle_deg};
use crate::timers::{BoundedTimer, PositionTween};
use bevy::prelude::*;
use bevy_rapier3d::prelude::{GravityScale, ReadMassProperties, RigidBody, Velocity};

/// Drag vectors shorter than this leave the preview yaw unchanged.
const MIN_YAW_DRAG: f32 = 0.1;

/// Gap kept between the plane's underside and the drag plane.
const GROUND_CLEARANCE: f32 = 0.1;

/// Below this speed the lift tilts along the launch direction instead of the velocity.
const LIFT_MIN_TRAVEL_SPEED: f32 = 0.1;

// ── Pure geometry ─────────────────────────────────────────────────────────────

/// Clamp a raw drag-plane hit to an offset from the resting point.
///
/// The offset is limited to `max_drag_distance`.  With `backward_drag_only`,
/// any pull whose backward component (against `launch_forward`) does not
/// exceed the dead zone collapses to zero.
pub fn constrain_drag(rest: Vec3, hit: Vec3, launch_forward: Vec3, config: &FlightConfig) -> Vec3 {
    let offset = (hit - rest).clamp_length_max(config.max_drag_distance);
    if config.backward_drag_only {
        let backward = -offset.dot(launch_forward);
        if backward <= config.backward_drag_dead_zone {
            return Vec3::ZERO;
        }
    }
    offset
}

/// Apply the minimum-height clamp to a candidate plane position.
pub fn clamp_height(position: Vec3, config: &FlightConfig) -> Vec3 {
    position.with_y(position.y.max(config.plane_half_height + GROUND_CLEARANCE))
}

/// Yaw the plane takes when fired along `direction`.
///
/// The turn is measured from `launch_forward`, scaled by
/// `rotation_sensitivity` and limited to `±max_rotation_angle`.  Returns
/// `None` for drag vectors too short to define a heading.
pub fn launch_yaw(direction: Vec3, launch_forward: Vec3, config: &FlightConfig) -> Option<Quat> {
    let horizontal = direction.with_y(0.0);
    if horizontal.length() < MIN_YAW_DRAG {
        return None;
    }
    let angle = -signed_angle_deg(horizontal, launch_forward, Vec3::Y) * config.rotation_sensitivity;
    let angle = angle.clamp(-config.max_rotation_angle, config.max_rotation_angle);
    Some(Quat::from_rotation_y(angle.to_radians()))
}

/// What happens when the pointer lets go.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReleaseOutcome {
    /// The pull was too short: slide back to the resting point.
    ReturnToRest(PositionTween),
    /// Fire the plane.
    Launch {
        /// Horizontal unit vector from the release point toward rest.
        direction: Vec3,
        impulse: Vec3,
        drag_distance: f32,
        /// Absolute rotation to snap to; `None` keeps the current one.
        rotation: Option<Quat>,
    },
}

/// Decide the release outcome for a plane held at `position`.
pub fn release(
    rest: Vec3,
    position: Vec3,
    launch_forward: Vec3,
    rest_rotation: Quat,
    config: &FlightConfig,
) -> ReleaseOutcome {
    let position = clamp_height(position, config);
    let drag_distance = position.distance(rest);

    if drag_distance < config.min_drag_to_launch {
        return ReleaseOutcome::ReturnToRest(PositionTween::new(
            position,
            rest,
            config.return_to_rest_secs,
        ));
    }

    let direction = (rest - position)
        .with_y(0.0)
        .try_normalize()
        .unwrap_or(launch_forward);
    let rotation = launch_yaw(rest - position, launch_forward, config).map(|yaw| yaw * rest_rotation);

    ReleaseOutcome::Launch {
        direction,
        impulse: direction * drag_distance * config.launch_force_multiplier,
        drag_distance,
        rotation,
    }
}

/// One fixed step of the post-release lift.
///
/// The push starts straight up and tilts toward the direction of travel as
/// the window elapses, fading linearly to zero.  Returns `false` once the
/// window is over.
pub fn lift_step(
    timer: &mut BoundedTimer,
    body: &mut BodyState,
    drag_distance: f32,
    launch_direction: Vec3,
    dt: f32,
    config: &FlightConfig,
) -> bool {
    if timer.finished() {
        return false;
    }
    let k = timer.progress().clamp(0.0, 1.0);
    let travel = if body.speed() > LIFT_MIN_TRAVEL_SPEED {
        body.linvel.normalize_or_zero()
    } else {
        launch_direction
    };
    let lift_dir = (Vec3::Y * (1.0 - k) + travel * k).normalize_or_zero();
    let magnitude = drag_distance * config.vertical_force_multiplier * (1.0 - k);
    body.apply_force(lift_dir * magnitude, dt);
    timer.tick(dt);
    true
}

// ── Systems ───────────────────────────────────────────────────────────────────

/// Start a drag when the press ray hit the resting plane.
///
/// Any running return-to-rest tween is dropped: the drag takes over the
/// transform immediately.
pub fn drag_begin_system(
    pointer: Res<PointerIntent>,
    mut q: Query<(&mut FlightPhase, &mut LaunchState), With<Plane>>,
    mut feedback: MessageWriter<LaunchFeedback>,
) {
    if !(pointer.just_pressed && pointer.picked_plane) {
        return;
    }
    let Ok((mut phase, mut launch)) = q.single_mut() else {
        return;
    };
    if *phase != FlightPhase::Resting {
        return;
    }
    *phase = FlightPhase::Dragging;
    launch.return_to_rest = None;
    feedback.write(LaunchFeedback::Haptic(true));
    debug!("[launch] Drag started");
}

/// Move the pinned plane to the clamped drag point and ease it toward the
/// yaw it would launch with.
pub fn drag_track_system(
    time: Res<Time>,
    pointer: Res<PointerIntent>,
    config: Res<FlightConfig>,
    mut q: Query<(&FlightPhase, &mut LaunchState, &mut Transform), With<Plane>>,
    mut feedback: MessageWriter<LaunchFeedback>,
) {
    let Ok((phase, mut launch, mut transform)) = q.single_mut() else {
        return;
    };
    if !phase.is_dragging() || !pointer.pressed {
        return;
    }
    let Some(ray) = pointer.ray else {
        return;
    };
    let Some(hit_distance) = ray.intersect_plane(launch.resting_point, InfinitePlane3d::new(Vec3::Y))
    else {
        return;
    };

    let hit = ray.get_point(hit_distance);
    let offset = constrain_drag(launch.resting_point, hit, launch.launch_forward, &config);
    launch.drag_offset = offset;
    transform.translation = clamp_height(launch.resting_point + offset, &config);

    let stretch = (offset.length() / config.max_drag_distance).clamp(0.0, 1.0);
    feedback.write(LaunchFeedback::BandStretch(stretch));

    if let Some(yaw) = launch_yaw(-offset, launch.launch_forward, &config) {
        launch.preview_rotation = Some(yaw * launch.rest_rotation);
    }
    if let Some(target) = launch.preview_rotation {
        let t = rate_t(time.delta_secs(), config.drag_rotation_speed);
        transform.rotation = transform.rotation.slerp(target, t);
    }
}

/// Fire the plane, or send it back to rest when the pull was too short.
#[allow(clippy::type_complexity)]
pub fn drag_release_system(
    pointer: Res<PointerIntent>,
    config: Res<FlightConfig>,
    mut q: Query<
        (
            &mut FlightPhase,
            &mut LaunchState,
            &mut Transform,
            &mut Velocity,
            &mut RigidBody,
            &mut GravityScale,
            Option<&ReadMassProperties>,
        ),
        With<Plane>,
    >,
    mut feedback: MessageWriter<LaunchFeedback>,
) {
    let Ok((mut phase, mut launch, mut transform, mut velocity, mut body_type, mut gravity, mass)) =
        q.single_mut()
    else {
        return;
    };
    if !phase.is_dragging() || !(pointer.just_released || !pointer.pressed) {
        return;
    }

    feedback.write(LaunchFeedback::Haptic(false));
    let outcome = release(
        launch.resting_point,
        transform.translation,
        launch.launch_forward,
        launch.rest_rotation,
        &config,
    );

    match outcome {
        ReleaseOutcome::ReturnToRest(tween) => {
            info!(
                "[launch] Pull of {:.2} below {:.2}; returning to rest",
                tween.from.distance(tween.to),
                config.min_drag_to_launch
            );
            *phase = FlightPhase::Resting;
            launch.drag_offset = Vec3::ZERO;
            launch.preview_rotation = None;
            launch.return_to_rest = Some(tween);
        }
        ReleaseOutcome::Launch {
            direction,
            impulse,
            drag_distance,
            rotation,
        } => {
            transform.translation = clamp_height(transform.translation, &config);
            if let Some(rotation) = rotation {
                transform.rotation = rotation;
            }

            *body_type = RigidBody::Dynamic;
            gravity.0 = 1.0;
            let mut body = BodyState::read(&transform, &velocity, mass, config.plane_mass);
            body.apply_impulse(impulse);
            body.write(&mut transform, &mut velocity);

            launch.drag_distance = drag_distance;
            launch.launch_direction = direction;
            launch.released = true;
            launch.preview_rotation = None;
            launch.lift = config
                .lift_enabled
                .then(|| BoundedTimer::new(config.lift_duration));
            *phase = FlightPhase::Launched;

            feedback.write(LaunchFeedback::BandHidden);
            feedback.write(LaunchFeedback::Launched { drag_distance });
            info!(
                "[launch] Launched: drag {:.2}, impulse {:.2}",
                drag_distance,
                impulse.length()
            );
        }
    }
}

/// Advance the return-to-rest tween; the plane ends exactly on the resting point.
pub fn return_to_rest_system(
    time: Res<Time>,
    mut q: Query<(&FlightPhase, &mut LaunchState, &mut Transform), With<Plane>>,
) {
    let Ok((phase, mut launch, mut transform)) = q.single_mut() else {
        return;
    };
    if *phase != FlightPhase::Resting {
        return;
    }
    let Some(tween) = launch.return_to_rest.as_mut() else {
        return;
    };
    transform.translation = tween.tick(time.delta_secs());
    if tween.timer.finished() {
        launch.return_to_rest = None;
        transform.rotation = launch.rest_rotation;
    }
}

/// Apply the post-release lift for `lift_duration` seconds.
pub fn launch_lift_system(
    time: Res<Time>,
    config: Res<FlightConfig>,
    mut q: Query<
        (
            &FlightPhase,
            &mut LaunchState,
            &Transform,
            &mut Velocity,
            Option<&ReadMassProperties>,
        ),
        With<Plane>,
    >,
) {
    let Ok((phase, mut launch, transform, mut velocity, mass)) = q.single_mut() else {
        return;
    };
    if !phase.is_released() {
        return;
    }
    let drag_distance = launch.drag_distance;
    let launch_direction = launch.launch_direction;
    let Some(timer) = launch.lift.as_mut() else {
        return;
    };

    let mut body = BodyState::read(transform, &velocity, mass, config.plane_mass);
    let active = lift_step(
        timer,
        &mut body,
        drag_distance,
        launch_direction,
        time.delta_secs(),
        &config,
    );
    velocity.linvel = body.linvel;
    if !active {
        launch.lift = None;
        debug!("[launch] Lift window over");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plane::test_support::{collect_messages, Collected};

    fn config() -> FlightConfig {
        FlightConfig {
            backward_drag_only: false,
            ..Default::default()
        }
    }

    const REST: Vec3 = Vec3::new(0.0, 0.5, 0.0);

    fn launch_speed(pulled_back: f32) -> f32 {
        match release(REST, REST - Vec3::Z * pulled_back, Vec3::Z, Quat::IDENTITY, &config()) {
            ReleaseOutcome::Launch { impulse, .. } => impulse.length() / config().plane_mass,
            ReleaseOutcome::ReturnToRest(_) => 0.0,
        }
    }

    // ── release ───────────────────────────────────────────────────────────────

    #[test]
    fn short_pull_returns_to_rest_without_impulse() {
        let cfg = FlightConfig {
            min_drag_to_launch: 1.0,
            ..config()
        };
        let outcome = release(REST, REST - Vec3::Z * 0.5, Vec3::Z, Quat::IDENTITY, &cfg);
        let ReleaseOutcome::ReturnToRest(mut tween) = outcome else {
            panic!("expected a return to rest, got {outcome:?}");
        };
        assert_eq!(tween.to, REST);
        assert_eq!(tween.timer.duration(), cfg.return_to_rest_secs);
        assert_eq!(tween.tick(cfg.return_to_rest_secs), REST);
    }

    #[test]
    fn pull_of_three_yields_impulse_thirty() {
        let cfg = FlightConfig {
            launch_force_multiplier: 10.0,
            plane_mass: 1.0,
            ..config()
        };
        let outcome = release(REST, REST - Vec3::Z * 3.0, Vec3::Z, Quat::IDENTITY, &cfg);
        let ReleaseOutcome::Launch {
            impulse,
            direction,
            drag_distance,
            ..
        } = outcome
        else {
            panic!("expected a launch, got {outcome:?}");
        };
        assert!((drag_distance - 3.0).abs() < 1e-5);
        assert!((impulse.length() - 30.0).abs() < 1e-4);
        assert!(direction.distance(Vec3::Z) < 1e-5);

        let mut body = BodyState {
            translation: REST,
            rotation: Quat::IDENTITY,
            linvel: Vec3::ZERO,
            angvel: Vec3::ZERO,
            mass: cfg.plane_mass,
        };
        body.apply_impulse(impulse);
        assert!((body.speed() - 30.0).abs() < 1e-4);
    }

    #[test]
    fn launch_speed_is_monotonic_in_drag_distance() {
        let mut previous = 0.0;
        for step in 0..20 {
            let d = 0.75 + step as f32 * 0.2;
            let speed = launch_speed(d);
            assert!(speed >= previous, "speed fell at d={d}: {speed} < {previous}");
            previous = speed;
        }
    }

    #[test]
    fn launch_direction_points_from_release_toward_rest() {
        let held = REST + Vec3::new(1.0, 0.0, -2.0);
        let ReleaseOutcome::Launch { direction, rotation, .. } =
            release(REST, held, Vec3::Z, Quat::IDENTITY, &config())
        else {
            panic!("expected a launch");
        };
        assert!(direction.x < 0.0 && direction.z > 0.0);
        assert_eq!(direction.y, 0.0);
        // The nose is turned to face the direction of travel.
        let nose = rotation.expect("yaw for a long pull") * Vec3::Z;
        assert!(nose.distance(direction) < 1e-4, "nose {nose:?} vs travel {direction:?}");
    }

    // ── drag constraints ──────────────────────────────────────────────────────

    #[test]
    fn drag_is_clamped_to_max_distance() {
        let offset = constrain_drag(REST, REST - Vec3::Z * 50.0, Vec3::Z, &config());
        assert!((offset.length() - config().max_drag_distance).abs() < 1e-4);
    }

    #[test]
    fn forward_drag_is_suppressed_when_backward_only() {
        let cfg = FlightConfig {
            backward_drag_only: true,
            ..Default::default()
        };
        assert_eq!(constrain_drag(REST, REST + Vec3::Z * 2.0, Vec3::Z, &cfg), Vec3::ZERO);
        assert_eq!(constrain_drag(REST, REST + Vec3::X * 2.0, Vec3::Z, &cfg), Vec3::ZERO);
        assert_ne!(constrain_drag(REST, REST - Vec3::Z * 2.0, Vec3::Z, &cfg), Vec3::ZERO);
    }

    #[test]
    fn height_never_drops_below_clearance() {
        let cfg = config();
        let p = clamp_height(Vec3::new(0.0, -3.0, 0.0), &cfg);
        assert_eq!(p.y, cfg.plane_half_height + GROUND_CLEARANCE);
    }

    #[test]
    fn launch_yaw_is_clamped() {
        let cfg = FlightConfig {
            max_rotation_angle: 30.0,
            ..config()
        };
        let yaw = launch_yaw(Vec3::X, Vec3::Z, &cfg).expect("long drag");
        let (axis, angle) = yaw.to_axis_angle();
        assert!((angle.to_degrees() - 30.0).abs() < 1e-3);
        assert!(axis.y > 0.99);
        assert!(launch_yaw(Vec3::X * 0.05, Vec3::Z, &cfg).is_none());
    }

    // ── lift ──────────────────────────────────────────────────────────────────

    #[test]
    fn lift_fades_and_ends() {
        let cfg = FlightConfig {
            lift_duration: 1.0,
            vertical_force_multiplier: 5.0,
            ..config()
        };
        let mut timer = BoundedTimer::new(cfg.lift_duration);
        let mut body = BodyState {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            linvel: Vec3::ZERO,
            angvel: Vec3::ZERO,
            mass: 1.0,
        };
        // First step at rest: straight up, full strength (d=2 ⇒ F=10, Δv=F·dt).
        assert!(lift_step(&mut timer, &mut body, 2.0, Vec3::Z, 0.25, &cfg));
        assert!((body.linvel.y - 2.5).abs() < 1e-5);
        assert_eq!(body.linvel.z, 0.0);

        for _ in 0..3 {
            lift_step(&mut timer, &mut body, 2.0, Vec3::Z, 0.25, &cfg);
        }
        assert!(!lift_step(&mut timer, &mut body, 2.0, Vec3::Z, 0.25, &cfg));
    }

    // ── systems ───────────────────────────────────────────────────────────────

    fn build_test_app() -> App {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        app.insert_resource(FlightConfig::default());
        app.insert_resource(PointerIntent::default());
        app.add_message::<LaunchFeedback>();
        app
    }

    fn spawn_resting_plane(app: &mut App) -> Entity {
        app.world_mut()
            .spawn((
                Plane,
                FlightPhase::Resting,
                LaunchState::new(REST, Vec3::Z, Quat::IDENTITY),
                Transform::from_translation(REST - Vec3::Z * 3.0),
                Velocity::zero(),
                RigidBody::KinematicPositionBased,
                GravityScale(0.0),
            ))
            .id()
    }

    #[test]
    fn press_without_pick_does_not_start_drag() {
        let mut app = build_test_app();
        let plane = spawn_resting_plane(&mut app);
        app.insert_resource(PointerIntent {
            just_pressed: true,
            pressed: true,
            ..Default::default()
        });
        app.add_systems(Update, drag_begin_system);
        app.update();
        assert_eq!(*app.world().get::<FlightPhase>(plane).unwrap(), FlightPhase::Resting);
    }

    #[test]
    fn release_system_fires_a_dynamic_body() {
        let mut app = build_test_app();
        let plane = spawn_resting_plane(&mut app);
        app.world_mut()
            .entity_mut(plane)
            .insert(FlightPhase::Dragging);
        app.insert_resource(PointerIntent {
            just_released: true,
            ..Default::default()
        });
        app.init_resource::<Collected<LaunchFeedback>>();
        app.add_systems(
            Update,
            (drag_release_system, collect_messages::<LaunchFeedback>).chain(),
        );
        app.update();

        let world = app.world();
        assert_eq!(*world.get::<FlightPhase>(plane).unwrap(), FlightPhase::Launched);
        assert!(world.get::<LaunchState>(plane).unwrap().released);
        assert!(matches!(world.get::<RigidBody>(plane).unwrap(), RigidBody::Dynamic));
        let speed = world.get::<Velocity>(plane).unwrap().linvel.length();
        assert!((speed - 30.0).abs() < 1e-3, "expected 30 u/s, got {speed}");

        let sent = &world.resource::<Collected<LaunchFeedback>>().0;
        assert!(sent.contains(&LaunchFeedback::BandHidden));
        assert!(sent
            .iter()
            .any(|m| matches!(m, LaunchFeedback::Launched { drag_distance } if (*drag_distance - 3.0).abs() < 1e-4)));
    }
}
