//! Runtime flight configuration loaded from `assets/flight.toml`.
//!
//! [`FlightConfig`] is a Bevy [`Resource`] that mirrors every constant in
//! [`crate::constants`].  At startup, [`load_flight_config`] reads
//! `assets/flight.toml` and overwrites the defaults with any values present in
//! the file.  Missing keys fall back to the compile-time defaults, so a minimal
//! TOML can override just the constants you care about.
//!
//! ## Usage in systems
//!
//! Add `config: Res<FlightConfig>` to any system parameter list and read values
//! with `config.glide_drag`, `config.max_drag_distance`, etc.  Pure step
//! functions take `&FlightConfig` directly so they can be tested without an `App`.
//!
//! ## Tuning workflow
//!
//! 1. Edit `assets/flight.toml`.
//! 2. Restart the game; no recompilation required.
//! 3. Run `cargo test` to validate the new values against the behaviour tests.

use crate::constants::*;
use crate::error::{validate_positive, validate_unit_interval, FlightError, FlightResult};
use bevy::prelude::*;
use serde::Deserialize;

pub const CONFIG_PATH: &str = "assets/flight.toml";

/// Runtime-tunable launch, flight, ground and progression configuration.
///
/// All fields default to the corresponding compile-time constant from
/// `src/constants.rs`.  Override any subset by setting the value in
/// `assets/flight.toml`.
#[derive(Resource, Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FlightConfig {
    // ── Launch: Drag ──────────────────────────────────────────────────────────
    pub max_drag_distance: f32,
    pub min_drag_to_launch: f32,
    pub launch_force_multiplier: f32,
    pub return_to_rest_secs: f32,
    pub backward_drag_only: bool,
    pub backward_drag_dead_zone: f32,
    pub plane_half_height: f32,

    // ── Launch: Rotation ──────────────────────────────────────────────────────
    pub max_rotation_angle: f32,
    pub rotation_sensitivity: f32,
    pub drag_rotation_speed: f32,

    // ── Launch: Lift ──────────────────────────────────────────────────────────
    pub lift_enabled: bool,
    pub vertical_force_multiplier: f32,
    pub lift_duration: f32,

    // ── Ramp ──────────────────────────────────────────────────────────────────
    pub ramp_alignment_speed: f32,
    pub min_velocity_for_ramp_alignment: f32,
    pub align_to_velocity: bool,
    pub ramp_restore_secs: f32,
    pub ramp_stop_threshold_secs: f32,

    // ── Flight: Handling ──────────────────────────────────────────────────────
    pub turn_speed: f32,
    pub bank_angle: f32,
    pub pitch_speed: f32,
    pub torque_response_multiplier: f32,
    pub angular_drag_amount: f32,

    // ── Flight: Input ─────────────────────────────────────────────────────────
    pub use_keyboard_input: bool,
    pub use_joystick_input: bool,
    pub horizontal_input_sensitivity: f32,
    pub vertical_input_sensitivity: f32,
    pub invert_joystick_vertical: bool,
    pub joystick_deadzone: f32,
    pub auto_level_when_no_input: bool,
    pub auto_level_speed: f32,
    pub disable_auto_level_when_dragging: bool,
    pub input_smoothness: f32,
    pub torque_smoothness: f32,

    // ── Flight: Alignment ─────────────────────────────────────────────────────
    pub direction_alignment_strength: f32,
    pub min_speed_for_alignment: f32,

    // ── Flight: Drag & Air Resistance ─────────────────────────────────────────
    pub glide_drag: f32,
    pub dive_drag: f32,
    pub air_resistance_coefficient: f32,
    pub velocity_resistance_factor: f32,
    pub orientation_resistance_factor: f32,
    pub dive_pitch_deg: f32,
    pub pull_up_pitch_deg: f32,
    pub climb_pitch_deg: f32,

    // ── Flight: Momentum ──────────────────────────────────────────────────────
    pub momentum_conversion_factor: f32,
    pub momentum_decay_rate: f32,
    pub climb_force_scale: f32,

    // ── Flight: Boost ─────────────────────────────────────────────────────────
    pub boost_amount: f32,
    pub boost_duration: f32,
    pub return_to_normal_speed: f32,

    // ── Ground ────────────────────────────────────────────────────────────────
    pub ground_drag_factor: f32,
    pub min_ground_speed: f32,
    pub min_z_axis_speed: f32,
    pub ground_alignment_speed: f32,
    pub ground_check_distance: f32,
    pub min_impact_force_for_damage: f32,
    pub ground_restitution: f32,
    pub marker_y_offset: f32,

    // ── Damage ────────────────────────────────────────────────────────────────
    pub wing_damage_roll_multiplier: f32,
    pub tail_damage_pitch_multiplier: f32,
    pub additional_drag_per_missing_part: f32,
    pub wing_tilt_strength: f32,
    pub wing_check_delay_secs: f32,
    pub wingless_tumble: bool,
    pub fall_down_force: f32,
    pub tumble_torque: f32,

    // ── Parts ─────────────────────────────────────────────────────────────────
    pub detach_impact_threshold: f32,
    pub detachment_force: f32,
    pub detach_force_radius: f32,

    // ── Body ──────────────────────────────────────────────────────────────────
    pub plane_mass: f32,

    // ── Progression ───────────────────────────────────────────────────────────
    pub coins_per_unit: f32,
    pub upgrade_initial_cost: f32,
    pub upgrade_cost_growth: f32,
    pub upgrade_clicks_per_part: u32,
}

impl Default for FlightConfig {
    fn default() -> Self {
        Self {
            // Launch: Drag
            max_drag_distance: MAX_DRAG_DISTANCE,
            min_drag_to_launch: MIN_DRAG_TO_LAUNCH,
            launch_force_multiplier: LAUNCH_FORCE_MULTIPLIER,
            return_to_rest_secs: RETURN_TO_REST_SECS,
            backward_drag_only: BACKWARD_DRAG_ONLY,
            backward_drag_dead_zone: BACKWARD_DRAG_DEAD_ZONE,
            plane_half_height: PLANE_HALF_HEIGHT,
            // Launch: Rotation
            max_rotation_angle: MAX_ROTATION_ANGLE,
            rotation_sensitivity: ROTATION_SENSITIVITY,
            drag_rotation_speed: DRAG_ROTATION_SPEED,
            // Launch: Lift
            lift_enabled: LIFT_ENABLED,
            vertical_force_multiplier: VERTICAL_FORCE_MULTIPLIER,
            lift_duration: LIFT_DURATION,
            // Ramp
            ramp_alignment_speed: RAMP_ALIGNMENT_SPEED,
            min_velocity_for_ramp_alignment: MIN_VELOCITY_FOR_RAMP_ALIGNMENT,
            align_to_velocity: ALIGN_TO_VELOCITY,
            ramp_restore_secs: RAMP_RESTORE_SECS,
            ramp_stop_threshold_secs: RAMP_STOP_THRESHOLD_SECS,
            // Flight: Handling
            turn_speed: TURN_SPEED,
            bank_angle: BANK_ANGLE,
            pitch_speed: PITCH_SPEED,
            torque_response_multiplier: TORQUE_RESPONSE_MULTIPLIER,
            angular_drag_amount: ANGULAR_DRAG_AMOUNT,
            // Flight: Input
            use_keyboard_input: USE_KEYBOARD_INPUT,
            use_joystick_input: USE_JOYSTICK_INPUT,
            horizontal_input_sensitivity: HORIZONTAL_INPUT_SENSITIVITY,
            vertical_input_sensitivity: VERTICAL_INPUT_SENSITIVITY,
            invert_joystick_vertical: INVERT_JOYSTICK_VERTICAL,
            joystick_deadzone: JOYSTICK_DEADZONE,
            auto_level_when_no_input: AUTO_LEVEL_WHEN_NO_INPUT,
            auto_level_speed: AUTO_LEVEL_SPEED,
            disable_auto_level_when_dragging: DISABLE_AUTO_LEVEL_WHEN_DRAGGING,
            input_smoothness: INPUT_SMOOTHNESS,
            torque_smoothness: TORQUE_SMOOTHNESS,
            // Flight: Alignment
            direction_alignment_strength: DIRECTION_ALIGNMENT_STRENGTH,
            min_speed_for_alignment: MIN_SPEED_FOR_ALIGNMENT,
            // Flight: Drag & Air Resistance
            glide_drag: GLIDE_DRAG,
            dive_drag: DIVE_DRAG,
            air_resistance_coefficient: AIR_RESISTANCE_COEFFICIENT,
            velocity_resistance_factor: VELOCITY_RESISTANCE_FACTOR,
            orientation_resistance_factor: ORIENTATION_RESISTANCE_FACTOR,
            dive_pitch_deg: DIVE_PITCH_DEG,
            pull_up_pitch_deg: PULL_UP_PITCH_DEG,
            climb_pitch_deg: CLIMB_PITCH_DEG,
            // Flight: Momentum
            momentum_conversion_factor: MOMENTUM_CONVERSION_FACTOR,
            momentum_decay_rate: MOMENTUM_DECAY_RATE,
            climb_force_scale: CLIMB_FORCE_SCALE,
            // Flight: Boost
            boost_amount: BOOST_AMOUNT,
            boost_duration: BOOST_DURATION,
            return_to_normal_speed: RETURN_TO_NORMAL_SPEED,
            // Ground
            ground_drag_factor: GROUND_DRAG_FACTOR,
            min_ground_speed: MIN_GROUND_SPEED,
            min_z_axis_speed: MIN_Z_AXIS_SPEED,
            ground_alignment_speed: GROUND_ALIGNMENT_SPEED,
            ground_check_distance: GROUND_CHECK_DISTANCE,
            min_impact_force_for_damage: MIN_IMPACT_FORCE_FOR_DAMAGE,
            ground_restitution: GROUND_RESTITUTION,
            marker_y_offset: MARKER_Y_OFFSET,
            // Damage
            wing_damage_roll_multiplier: WING_DAMAGE_ROLL_MULTIPLIER,
            tail_damage_pitch_multiplier: TAIL_DAMAGE_PITCH_MULTIPLIER,
            additional_drag_per_missing_part: ADDITIONAL_DRAG_PER_MISSING_PART,
            wing_tilt_strength: WING_TILT_STRENGTH,
            wing_check_delay_secs: WING_CHECK_DELAY_SECS,
            wingless_tumble: WINGLESS_TUMBLE,
            fall_down_force: FALL_DOWN_FORCE,
            tumble_torque: TUMBLE_TORQUE,
            // Parts
            detach_impact_threshold: DETACH_IMPACT_THRESHOLD,
            detachment_force: DETACHMENT_FORCE,
            detach_force_radius: DETACH_FORCE_RADIUS,
            // Body
            plane_mass: PLANE_MASS,
            // Progression
            coins_per_unit: COINS_PER_UNIT,
            upgrade_initial_cost: UPGRADE_INITIAL_COST,
            upgrade_cost_growth: UPGRADE_COST_GROWTH,
            upgrade_clicks_per_part: UPGRADE_CLICKS_PER_PART,
        }
    }
}

impl FlightConfig {
    /// Parse a (possibly partial) TOML document on top of the compiled defaults.
    pub fn from_toml_str(path: &str, contents: &str) -> FlightResult<Self> {
        toml::from_str::<FlightConfig>(contents).map_err(|source| FlightError::Parse {
            path: path.to_string(),
            source,
        })
    }

    /// Check the tunables whose out-of-range values destabilise the simulation.
    ///
    /// Returns every problem found rather than stopping at the first one so a
    /// single log pass shows the whole picture.
    pub fn validate(&self) -> Vec<FlightError> {
        [
            validate_positive("max_drag_distance", self.max_drag_distance),
            validate_positive("plane_mass", self.plane_mass),
            validate_positive("ground_check_distance", self.ground_check_distance),
            validate_positive("return_to_normal_speed", self.return_to_normal_speed),
            validate_unit_interval("ground_drag_factor", self.ground_drag_factor),
            validate_unit_interval("ground_restitution", self.ground_restitution),
        ]
        .into_iter()
        .filter_map(Result::err)
        .collect()
    }
}

/// Startup system: attempt to load `assets/flight.toml` and overwrite the
/// `FlightConfig` resource with any values present in the file.
///
/// Missing keys retain their compiled defaults.  Parse errors and unsafe
/// values are logged but do not abort the game; an unsafe file is rejected
/// as a whole.  A missing file is not an error.
pub fn load_flight_config(mut config: ResMut<FlightConfig>) {
    let contents = match std::fs::read_to_string(CONFIG_PATH) {
        Ok(contents) => contents,
        Err(_) => {
            info!("[config] No {CONFIG_PATH} found; using compiled defaults");
            return;
        }
    };

    match FlightConfig::from_toml_str(CONFIG_PATH, &contents) {
        Ok(loaded) => {
            let problems = loaded.validate();
            if problems.is_empty() {
                *config = loaded;
                info!("[config] Loaded flight config from {CONFIG_PATH}");
            } else {
                for problem in &problems {
                    warn!("[config] {problem}");
                }
                warn!("[config] {CONFIG_PATH} rejected; using compiled defaults");
            }
        }
        Err(e) => warn!("[config] {e}; using defaults"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        assert!(FlightConfig::default().validate().is_empty());
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let cfg = FlightConfig::from_toml_str("test", "glide_drag = 1.5\nwingless_tumble = true")
            .expect("partial config should parse");
        assert_eq!(cfg.glide_drag, 1.5);
        assert!(cfg.wingless_tumble);
        assert_eq!(cfg.dive_drag, DIVE_DRAG);
        assert_eq!(cfg.max_drag_distance, MAX_DRAG_DISTANCE);
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = FlightConfig::from_toml_str("bad.toml", "glide_drag = \"fast\"").unwrap_err();
        assert!(matches!(err, FlightError::Parse { .. }));
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn energy_adding_ground_drag_is_flagged() {
        let cfg = FlightConfig {
            ground_drag_factor: 1.1,
            plane_mass: 0.0,
            ..Default::default()
        };
        assert_eq!(cfg.validate().len(), 2);
    }
}
