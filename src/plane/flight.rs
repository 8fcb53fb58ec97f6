//! Airborne flight model.
//!
//! Runs once per fixed step while the phase is `Airborne`:
//!
//! 1. Two-stage low-pass: the raw [`FlightIntent`] axes are smoothed, the
//!    torque computed from them is smoothed again.
//! 2. Body-frame control torque (pitch on local X, yaw on local Y, roll on
//!    local Z) plus auto-level about the nose when there is no input.
//! 3. The [`TorqueModifier`] hook adjusts the torque for missing parts.
//! 4. Air resistance, with dive/climb momentum: a dive banks speed, pulling
//!    up converts it into a climbing push that decays while climbing.
//! 5. The velocity is pulled toward the nose so the plane flies where it points.
//!
//! All forces are mass independent (acceleration mode).  Linear drag is
//! handed to Rapier as `Damping`.
//!
//! ## Pitch sign
//!
//! Pitch is measured about world X between world forward and the nose, both
//! projected onto the Y-Z plane.  Positive means nose down.

use super::damage::{Intact, TorqueModifier};
use super::state::{
    BodyState, Booster, BoostRequest, BoostState, DamageState, FlightIntent, FlightPhase,
    FlightState, Plane,
};
use crate::config::FlightConfig;
use crate::math::{project_on_plane, rate_t, signed_angle_deg};
use crate::timers::BoundedTimer;
use bevy::prelude::*;
use bevy_rapier3d::prelude::{Damping, ReadMassProperties, Velocity};

/// Below this speed air resistance and the drag switch are skipped.
const MIN_RESISTANCE_SPEED: f32 = 0.1;

/// Smoothed axes within this of zero count as released.
const INPUT_EPSILON: f32 = 1e-6;

/// Share of stored momentum spent per second of climbing, before the pitch term.
const MOMENTUM_DECAY_SCALE: f32 = 0.5;

/// Extra decay per degree of climb angle.
const MOMENTUM_DECAY_PER_DEG: f32 = 0.05;

// ── Pure steps ────────────────────────────────────────────────────────────────

/// Pitch of `forward` in degrees; positive when the nose is below the horizon.
pub fn pitch_angle_deg(forward: Vec3) -> f32 {
    signed_angle_deg(
        project_on_plane(Vec3::Z, Vec3::X),
        project_on_plane(forward, Vec3::X),
        Vec3::X,
    )
}

/// Low-pass the raw axes and return the smoothed pair.
pub fn smooth_input(state: &mut FlightState, intent: FlightIntent, dt: f32, config: &FlightConfig) -> (f32, f32) {
    let t = rate_t(dt, config.input_smoothness);
    state.smoothed_horizontal += (intent.horizontal - state.smoothed_horizontal) * t;
    state.smoothed_vertical += (intent.vertical - state.smoothed_vertical) * t;
    (state.smoothed_horizontal, state.smoothed_vertical)
}

/// Roll correction about the nose that brings the wings level.
pub fn auto_level_torque(rotation: Quat, config: &FlightConfig) -> f32 {
    let forward = rotation * Vec3::Z;
    let up = rotation * Vec3::Y;
    let level_up = project_on_plane(Vec3::Y, forward).normalize_or_zero();
    if level_up == Vec3::ZERO {
        return 0.0;
    }
    signed_angle_deg(up, level_up, forward) * config.auto_level_speed * config.torque_response_multiplier
}

/// Whether auto-level may act this step.
pub fn should_auto_level(
    raw: FlightIntent,
    smoothed: (f32, f32),
    being_dragged: bool,
    config: &FlightConfig,
) -> bool {
    let has_input = [raw.horizontal, raw.vertical, smoothed.0, smoothed.1]
        .iter()
        .any(|axis| axis.abs() > INPUT_EPSILON);
    config.auto_level_when_no_input
        && !has_input
        && !(config.disable_auto_level_when_dragging && being_dragged)
}

/// Body-frame control torque for the smoothed axes, before damage.
pub fn control_torque(horizontal: f32, vertical: f32, pitch_speed_scale: f32, config: &FlightConfig) -> Vec3 {
    Vec3::new(
        vertical * config.pitch_speed * pitch_speed_scale,
        -horizontal * config.turn_speed,
        horizontal * config.bank_angle,
    ) * config.torque_response_multiplier
}

/// Air resistance and dive/climb momentum for one step.
///
/// Returns the base linear drag for the current attitude, or `None` when the
/// plane is too slow for the attitude to matter.
pub fn air_resistance_step(
    state: &mut FlightState,
    body: &mut BodyState,
    dt: f32,
    config: &FlightConfig,
) -> Option<f32> {
    let speed = body.speed();
    if speed < MIN_RESISTANCE_SPEED {
        return None;
    }
    let forward = body.forward();
    let pitch = pitch_angle_deg(forward);

    let base_drag = if pitch > config.dive_pitch_deg {
        state.max_recent_speed = state.max_recent_speed.max(speed);
        state.was_diving = true;
        config.dive_drag
    } else {
        if state.was_diving && pitch < config.pull_up_pitch_deg {
            state.stored_momentum = state.max_recent_speed * config.momentum_conversion_factor;
            state.was_diving = false;
            state.max_recent_speed = 0.0;
            debug!("[flight] Pull-up: stored momentum {:.2}", state.stored_momentum);
        }
        config.glide_drag
    };

    let direction = body.linvel / speed;
    let alignment = forward.dot(direction).clamp(0.0, 1.0);
    let total = config.air_resistance_coefficient
        + speed * speed * config.velocity_resistance_factor
        + (1.0 - alignment) * config.orientation_resistance_factor;
    body.apply_acceleration(-direction * total, dt);

    if state.stored_momentum > 0.0 && pitch < config.climb_pitch_deg {
        let climb_dir = (forward + Vec3::Y).normalize_or_zero();
        body.apply_acceleration(climb_dir * state.stored_momentum * config.climb_force_scale, dt);
        let decay = config.momentum_decay_rate
            * MOMENTUM_DECAY_SCALE
            * dt
            * (1.0 + pitch.abs() * MOMENTUM_DECAY_PER_DEG);
        state.stored_momentum = (state.stored_momentum - decay).max(0.0);
    }

    Some(base_drag)
}

/// Pull the velocity toward the nose, keeping its magnitude as the target.
pub fn align_velocity(body: &mut BodyState, dt: f32, config: &FlightConfig) {
    let speed = body.speed();
    if speed <= config.min_speed_for_alignment {
        return;
    }
    let target = body.forward() * speed;
    body.linvel = body
        .linvel
        .lerp(target, rate_t(dt, config.direction_alignment_strength));
}

/// One complete airborne step.
///
/// Returns the linear damping Rapier should use, or `None` to leave it as is.
pub fn flight_step(
    state: &mut FlightState,
    body: &mut BodyState,
    intent: FlightIntent,
    being_dragged: bool,
    modifier: &dyn TorqueModifier,
    dt: f32,
    config: &FlightConfig,
) -> Option<f32> {
    let smoothed = smooth_input(state, intent, dt, config);
    let (h, v) = smoothed;

    let mut torque = control_torque(h, v, modifier.pitch_speed_scale(config), config);
    if should_auto_level(intent, smoothed, being_dragged, config) {
        torque.z += auto_level_torque(body.rotation, config);
    }
    let torque = modifier.modify_torque(torque, h, v, config);

    let world_torque = body.rotation * torque;
    state.smoothed_torque = state
        .smoothed_torque
        .lerp(world_torque, rate_t(dt, config.torque_smoothness));
    body.apply_angular_acceleration(state.smoothed_torque, dt);

    let damping = air_resistance_step(state, body, dt, config)
        .map(|base| base + modifier.extra_linear_drag(config));
    align_velocity(body, dt, config);
    damping
}

/// Fire the booster if nothing else is boosting.
pub fn start_boost(state: &mut FlightState, body: &mut BodyState, config: &FlightConfig) -> bool {
    if state.boost.is_active() {
        return false;
    }
    let pre_boost = body.linvel;
    body.apply_impulse(body.forward() * config.boost_amount);
    state.boost = BoostState::Holding {
        pre_boost,
        timer: BoundedTimer::new(config.boost_duration),
    };
    true
}

/// Hold the boosted speed, then ease back to the pre-boost velocity.
pub fn boost_step(state: &mut FlightState, body: &mut BodyState, dt: f32, config: &FlightConfig) {
    match &mut state.boost {
        BoostState::Idle => {}
        BoostState::Holding { pre_boost, timer } => {
            timer.tick(dt);
            if timer.finished() {
                let return_secs = 1.0 / config.return_to_normal_speed.max(f32::EPSILON);
                state.boost = BoostState::Returning {
                    from: body.linvel,
                    to: *pre_boost,
                    timer: BoundedTimer::new(return_secs),
                };
            }
        }
        BoostState::Returning { from, to, timer } => {
            let t = timer.tick(dt);
            body.linvel = from.lerp(*to, t);
            if timer.finished() {
                body.linvel = *to;
                state.boost = BoostState::Idle;
            }
        }
    }
}

// ── Systems ───────────────────────────────────────────────────────────────────

/// Integrate one airborne step from the current [`FlightIntent`].
#[allow(clippy::type_complexity)]
pub fn flight_system(
    time: Res<Time>,
    config: Res<FlightConfig>,
    intent: Res<FlightIntent>,
    mut q: Query<
        (
            &FlightPhase,
            &mut FlightState,
            Option<&DamageState>,
            &mut Transform,
            &mut Velocity,
            &mut Damping,
            Option<&ReadMassProperties>,
        ),
        With<Plane>,
    >,
) {
    let Ok((phase, mut state, damage, mut transform, mut velocity, mut damping, mass)) =
        q.single_mut()
    else {
        return;
    };
    if !phase.is_controlling() {
        return;
    }
    // Without wings there is nothing to steer with.
    if damage.is_some_and(DamageState::both_wings_missing) {
        return;
    }

    let modifier: &dyn TorqueModifier = match damage {
        Some(damage) => damage,
        None => &Intact,
    };
    let mut body = BodyState::read(&transform, &velocity, mass, config.plane_mass);
    let drag = flight_step(
        &mut state,
        &mut body,
        *intent,
        phase.is_dragging(),
        modifier,
        time.delta_secs(),
        &config,
    );
    body.write(&mut transform, &mut velocity);

    if let Some(drag) = drag {
        if damping.linear_damping != drag {
            damping.linear_damping = drag;
        }
    }
}

/// Handle boost requests and run the boost timeline.
#[allow(clippy::type_complexity)]
pub fn boost_system(
    time: Res<Time>,
    config: Res<FlightConfig>,
    mut requests: MessageReader<BoostRequest>,
    mut q: Query<
        (
            &FlightPhase,
            &Booster,
            &mut FlightState,
            &Transform,
            &mut Velocity,
            Option<&ReadMassProperties>,
        ),
        With<Plane>,
    >,
) {
    let Ok((phase, booster, mut state, transform, mut velocity, mass)) = q.single_mut() else {
        requests.clear();
        return;
    };
    if !phase.in_flight() {
        requests.clear();
        if state.boost.is_active() {
            state.boost = BoostState::Idle;
        }
        return;
    }

    let mut body = BodyState::read(transform, &velocity, mass, config.plane_mass);
    for _ in requests.read() {
        if !phase.is_controlling() || !booster.unlocked {
            debug!("[flight] Boost ignored");
            continue;
        }
        if start_boost(&mut state, &mut body, &config) {
            info!("[flight] Boost");
        }
    }
    boost_step(&mut state, &mut body, time.delta_secs(), &config);
    if velocity.linvel != body.linvel {
        velocity.linvel = body.linvel;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> FlightConfig {
        FlightConfig::default()
    }

    fn pitched(deg: f32, linvel: Vec3) -> BodyState {
        BodyState {
            translation: Vec3::ZERO,
            rotation: Quat::from_rotation_x(deg.to_radians()),
            linvel,
            angvel: Vec3::ZERO,
            mass: 1.0,
        }
    }

    // ── attitude ──────────────────────────────────────────────────────────────

    #[test]
    fn positive_pitch_is_nose_down() {
        let nose_down = Quat::from_rotation_x(10f32.to_radians()) * Vec3::Z;
        assert!(nose_down.y < 0.0);
        assert!((pitch_angle_deg(nose_down) - 10.0).abs() < 1e-3);
        let nose_up = Quat::from_rotation_x(-3f32.to_radians()) * Vec3::Z;
        assert!((pitch_angle_deg(nose_up) + 3.0).abs() < 1e-3);
    }

    #[test]
    fn control_torque_axes_and_signs() {
        let c = cfg();
        // Right stick: yaw right (negative about +Y), bank right (positive about +Z).
        let t = control_torque(1.0, 0.0, 1.0, &c);
        assert!(t.y < 0.0 && t.z > 0.0 && t.x == 0.0);
        // Push forward: nose down.
        let t = control_torque(0.0, 1.0, 1.0, &c);
        assert_eq!(t, Vec3::new(c.pitch_speed * c.torque_response_multiplier, 0.0, 0.0));
    }

    #[test]
    fn auto_level_rolls_back_toward_level() {
        let banked_right = Quat::from_rotation_z(0.4);
        assert!(auto_level_torque(banked_right, &cfg()) < 0.0);
        let banked_left = Quat::from_rotation_z(-0.4);
        assert!(auto_level_torque(banked_left, &cfg()) > 0.0);
        assert_eq!(auto_level_torque(Quat::IDENTITY, &cfg()), 0.0);
    }

    #[test]
    fn auto_level_is_exactly_zero_with_input_or_while_dragged() {
        let c = cfg();
        let idle = FlightIntent::default();
        assert!(should_auto_level(idle, (0.0, 0.0), false, &c));
        assert!(!should_auto_level(idle, (0.0, 0.0), true, &c));
        let steering = FlightIntent {
            horizontal: 0.5,
            vertical: 0.0,
        };
        assert!(!should_auto_level(steering, (0.0, 0.0), false, &c));
        // Residual smoothed input still blocks it.
        assert!(!should_auto_level(idle, (0.01, 0.0), false, &c));

        // A banked plane being dragged with no input gets no torque at all.
        let mut state = FlightState::default();
        let mut body = BodyState {
            rotation: Quat::from_rotation_z(0.4),
            ..pitched(0.0, Vec3::ZERO)
        };
        flight_step(&mut state, &mut body, idle, true, &Intact, 0.02, &c);
        assert_eq!(state.smoothed_torque, Vec3::ZERO);
        assert_eq!(body.angvel, Vec3::ZERO);
    }

    // ── momentum ──────────────────────────────────────────────────────────────

    #[test]
    fn dive_then_pull_up_stores_sixteen() {
        let c = FlightConfig {
            momentum_conversion_factor: 0.8,
            ..cfg()
        };
        let mut state = FlightState::default();
        // Pitch rises from level to a 10° dive while speed builds to 20.
        for (step, pitch) in [0.0, 2.5, 5.0, 7.5, 10.0, 10.0, 10.0].iter().enumerate() {
            let speed = 14.0 + step as f32;
            let mut body = pitched(*pitch, Vec3::new(0.0, 0.0, speed));
            air_resistance_step(&mut state, &mut body, 0.02, &c);
        }
        let mut body = pitched(10.0, Vec3::new(0.0, 0.0, 20.0));
        assert_eq!(air_resistance_step(&mut state, &mut body, 0.02, &c), Some(c.dive_drag));
        assert!(state.was_diving);
        assert_eq!(state.max_recent_speed, 20.0);

        let mut body = pitched(-3.0, Vec3::new(0.0, 0.0, 18.0));
        assert_eq!(air_resistance_step(&mut state, &mut body, 0.02, &c), Some(c.glide_drag));
        assert!((state.stored_momentum - 16.0).abs() < 1e-4, "stored {}", state.stored_momentum);
        assert!(!state.was_diving);
        assert_eq!(state.max_recent_speed, 0.0);

        // Holding the pull-up does not convert a second time.
        let mut body = pitched(-3.0, Vec3::new(0.0, 0.0, 17.0));
        air_resistance_step(&mut state, &mut body, 0.02, &c);
        assert!((state.stored_momentum - 16.0).abs() < 1e-4);
    }

    #[test]
    fn climbing_spends_momentum_and_never_goes_negative() {
        let c = cfg();
        let mut state = FlightState {
            stored_momentum: 0.01,
            ..Default::default()
        };
        let mut body = pitched(-20.0, Vec3::new(0.0, 0.0, 10.0));
        let before = body.linvel;
        air_resistance_step(&mut state, &mut body, 0.5, &c);
        assert_eq!(state.stored_momentum, 0.0);
        assert!(body.linvel.y > before.y, "climb push lifts the plane");
    }

    #[test]
    fn resistance_only_slows() {
        let c = cfg();
        let mut state = FlightState::default();
        let mut body = pitched(0.0, Vec3::new(0.0, 0.0, 10.0));
        air_resistance_step(&mut state, &mut body, 0.02, &c);
        // 0.05 + 100 × 0.01 + 0 = 1.05 u/s² over 0.02 s.
        assert!((body.linvel.z - (10.0 - 1.05 * 0.02)).abs() < 1e-5);

        let mut still = pitched(0.0, Vec3::new(0.0, 0.0, 0.05));
        assert_eq!(air_resistance_step(&mut state, &mut still, 0.02, &c), None);
        assert_eq!(still.linvel.z, 0.05);
    }

    #[test]
    fn velocity_turns_toward_the_nose() {
        let c = cfg();
        let mut body = BodyState {
            rotation: Quat::from_rotation_y(0.5),
            ..pitched(0.0, Vec3::new(0.0, 0.0, 10.0))
        };
        align_velocity(&mut body, 0.02, &c);
        assert!(body.linvel.x > 0.0);

        let mut slow = BodyState {
            rotation: Quat::from_rotation_y(0.5),
            ..pitched(0.0, Vec3::new(0.0, 0.0, 1.5))
        };
        align_velocity(&mut slow, 0.02, &c);
        assert_eq!(slow.linvel, Vec3::new(0.0, 0.0, 1.5));
    }

    #[test]
    fn missing_parts_add_drag_on_top_of_glide() {
        let c = cfg();
        let damage = DamageState {
            tail_disabled: true,
            ..Default::default()
        };
        let mut state = FlightState::default();
        let mut body = pitched(0.0, Vec3::new(0.0, 0.0, 10.0));
        let drag = flight_step(&mut state, &mut body, FlightIntent::default(), false, &damage, 0.02, &c);
        assert_eq!(drag, Some(c.glide_drag + c.additional_drag_per_missing_part));
    }

    // ── boost ─────────────────────────────────────────────────────────────────

    #[test]
    fn boost_restores_pre_boost_velocity() {
        let c = FlightConfig {
            boost_amount: 10.0,
            boost_duration: 1.5,
            return_to_normal_speed: 2.0,
            ..cfg()
        };
        let mut state = FlightState::default();
        let mut body = pitched(0.0, Vec3::new(0.0, 0.0, 10.0));

        assert!(start_boost(&mut state, &mut body, &c));
        assert_eq!(body.linvel, Vec3::new(0.0, 0.0, 20.0));
        assert!(!start_boost(&mut state, &mut body, &c), "second boost while active");

        for _ in 0..3 {
            boost_step(&mut state, &mut body, 0.5, &c);
        }
        assert!(matches!(state.boost, BoostState::Returning { .. }));
        boost_step(&mut state, &mut body, 0.25, &c);
        assert!((body.linvel.z - 15.0).abs() < 1e-4);
        boost_step(&mut state, &mut body, 0.25, &c);
        assert_eq!(body.linvel, Vec3::new(0.0, 0.0, 10.0));
        assert_eq!(state.boost, BoostState::Idle);
    }

    // ── system wiring ─────────────────────────────────────────────────────────

    fn build_test_app() -> App {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        app.insert_resource(FlightConfig::default());
        app.insert_resource(FlightIntent::default());
        app.add_systems(Update, flight_system);
        app
    }

    fn spawn_plane(app: &mut App, phase: FlightPhase, damage: DamageState) -> Entity {
        app.world_mut()
            .spawn((
                Plane,
                phase,
                FlightState::default(),
                damage,
                Transform::default(),
                Velocity::linear(Vec3::new(0.0, 0.0, 10.0)),
                Damping {
                    linear_damping: 0.0,
                    angular_damping: 0.5,
                },
            ))
            .id()
    }

    #[test]
    fn flight_system_sets_glide_drag_when_controlling() {
        let mut app = build_test_app();
        let plane = spawn_plane(&mut app, FlightPhase::Airborne, DamageState::default());
        app.update();
        assert_eq!(
            app.world().get::<Damping>(plane).unwrap().linear_damping,
            FlightConfig::default().glide_drag
        );
    }

    #[test]
    fn flight_system_is_idle_outside_airborne() {
        let mut app = build_test_app();
        let plane = spawn_plane(&mut app, FlightPhase::Aligning, DamageState::default());
        app.update();
        assert_eq!(app.world().get::<Damping>(plane).unwrap().linear_damping, 0.0);
    }

    #[test]
    fn wingless_plane_flies_ballistic() {
        let mut app = build_test_app();
        let plane = spawn_plane(
            &mut app,
            FlightPhase::Airborne,
            DamageState {
                left_wing_disabled: true,
                right_wing_disabled: true,
                tail_disabled: false,
            },
        );
        app.update();
        let world = app.world();
        assert_eq!(world.get::<Damping>(plane).unwrap().linear_damping, 0.0);
        assert_eq!(*world.get::<FlightPhase>(plane).unwrap(), FlightPhase::Airborne);
    }
}
