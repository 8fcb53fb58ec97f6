//! Centralised launch, flight and ground tuning constants.
//!
//! All tuneable values live here so they can be found, reasoned-about, and
//! modified in one place without source-diving across multiple modules.
//!
//! ## Tuning guidance
//!
//! These are the compiled defaults behind [`crate::config::FlightConfig`].
//! Override any of them at runtime from `assets/flight.toml`; keep this file
//! as the authoritative default source.

// ── Launch: Drag ──────────────────────────────────────────────────────────────

/// Maximum distance (u) the plane can be pulled away from the resting point.
pub const MAX_DRAG_DISTANCE: f32 = 5.0;

/// Releases shorter than this (u) snap back to the resting point instead of launching.
pub const MIN_DRAG_TO_LAUNCH: f32 = 0.75;

/// Impulse per unit of drag distance.  With a 1 kg plane a full 5 u pull
/// leaves the ramp at 50 u/s.
pub const LAUNCH_FORCE_MULTIPLIER: f32 = 10.0;

/// Seconds taken by the linear return-to-rest animation after a short pull.
pub const RETURN_TO_REST_SECS: f32 = 0.25;

/// When `true`, pulls that are not backward (away from the launch direction)
/// are treated as zero displacement.
pub const BACKWARD_DRAG_ONLY: bool = true;

/// Minimum backward component (u) for a pull to count when `BACKWARD_DRAG_ONLY` is set.
pub const BACKWARD_DRAG_DEAD_ZONE: f32 = 0.05;

/// Half the plane's height; the dragged plane never dips below `half_height + 0.1`.
pub const PLANE_HALF_HEIGHT: f32 = 0.25;

// ── Launch: Rotation ──────────────────────────────────────────────────────────

/// Largest launch yaw (degrees) either side of straight ahead.
pub const MAX_ROTATION_ANGLE: f32 = 45.0;

/// Multiplier applied to the sideways drag angle before clamping.
pub const ROTATION_SENSITIVITY: f32 = 1.0;

/// Slerp rate (1/s) of the yaw preview while dragging.
pub const DRAG_ROTATION_SPEED: f32 = 10.0;

// ── Launch: Lift ──────────────────────────────────────────────────────────────

/// Enables the arcing post-release lift force.
pub const LIFT_ENABLED: bool = false;

/// Lift force per unit of drag distance at the start of the lift window.
pub const VERTICAL_FORCE_MULTIPLIER: f32 = 5.0;

/// Length (s) of the post-release lift window.
pub const LIFT_DURATION: f32 = 2.0;

// ── Ramp ──────────────────────────────────────────────────────────────────────

/// Slerp rate (1/s) toward the ramp-aligned orientation.
pub const RAMP_ALIGNMENT_SPEED: f32 = 5.0;

/// Speed (u/s) above which the nose follows the travel direction on the ramp.
pub const MIN_VELOCITY_FOR_RAMP_ALIGNMENT: f32 = 1.0;

/// Follow the travel direction (not just the ramp normal) while aligning.
pub const ALIGN_TO_VELOCITY: bool = true;

/// Seconds spent easing back to the pre-ramp orientation after leaving the ramp.
pub const RAMP_RESTORE_SECS: f32 = 2.5;

/// A plane stuck on the ramp this long (s) gets its marker placed there.
pub const RAMP_STOP_THRESHOLD_SECS: f32 = 1.0;

// ── Flight: Handling ──────────────────────────────────────────────────────────

pub const TURN_SPEED: f32 = 3.0;
pub const BANK_ANGLE: f32 = 30.0;
pub const PITCH_SPEED: f32 = 2.0;

/// Shared scale for yaw, roll, pitch and auto-level torque.
pub const TORQUE_RESPONSE_MULTIPLIER: f32 = 0.5;

/// Rapier angular damping on the plane body.
pub const ANGULAR_DRAG_AMOUNT: f32 = 0.5;

// ── Flight: Input ─────────────────────────────────────────────────────────────

pub const USE_KEYBOARD_INPUT: bool = true;
pub const USE_JOYSTICK_INPUT: bool = false;
pub const HORIZONTAL_INPUT_SENSITIVITY: f32 = 1.0;
pub const VERTICAL_INPUT_SENSITIVITY: f32 = 1.0;

/// Invert the on-screen joystick's vertical axis (stick up = nose up).
pub const INVERT_JOYSTICK_VERTICAL: bool = true;

/// Joystick values with magnitude below this are treated as zero.
pub const JOYSTICK_DEADZONE: f32 = 0.05;

pub const AUTO_LEVEL_WHEN_NO_INPUT: bool = true;
pub const AUTO_LEVEL_SPEED: f32 = 1.0;
pub const DISABLE_AUTO_LEVEL_WHEN_DRAGGING: bool = true;

/// First-stage low-pass rate (1/s) on the raw axes.
pub const INPUT_SMOOTHNESS: f32 = 4.0;

/// Second-stage low-pass rate (1/s) on the computed torque.
pub const TORQUE_SMOOTHNESS: f32 = 3.0;

// ── Flight: Alignment ─────────────────────────────────────────────────────────

/// Rate (1/s) at which velocity is pulled onto the nose direction.
pub const DIRECTION_ALIGNMENT_STRENGTH: f32 = 5.0;

/// Speed (u/s) below which velocity alignment is skipped.
pub const MIN_SPEED_FOR_ALIGNMENT: f32 = 2.0;

// ── Flight: Drag & Air Resistance ─────────────────────────────────────────────

/// Linear damping while gliding or climbing.
pub const GLIDE_DRAG: f32 = 0.8;

/// Linear damping while diving; low so the dive builds speed.
pub const DIVE_DRAG: f32 = 0.1;

pub const AIR_RESISTANCE_COEFFICIENT: f32 = 0.05;

/// Quadratic speed term of the air resistance.
pub const VELOCITY_RESISTANCE_FACTOR: f32 = 0.01;

/// Penalty for flying sideways relative to the nose.
pub const ORIENTATION_RESISTANCE_FACTOR: f32 = 0.5;

/// Pitch (degrees, nose down positive) above which the plane counts as diving.
pub const DIVE_PITCH_DEG: f32 = 5.0;

/// Pitch below which a previous dive converts into stored momentum.
pub const PULL_UP_PITCH_DEG: f32 = -2.0;

/// Pitch below which stored momentum pushes the climb.
pub const CLIMB_PITCH_DEG: f32 = -5.0;

// ── Flight: Momentum ──────────────────────────────────────────────────────────

/// Fraction of peak dive speed converted into stored momentum on pull-up.
pub const MOMENTUM_CONVERSION_FACTOR: f32 = 0.8;

/// Stored-momentum loss rate while climbing; scaled up for steeper climbs.
pub const MOMENTUM_DECAY_RATE: f32 = 0.2;

/// Acceleration per unit of stored momentum along the climb direction.
pub const CLIMB_FORCE_SCALE: f32 = 0.8;

// ── Flight: Boost ─────────────────────────────────────────────────────────────

pub const BOOST_AMOUNT: f32 = 10.0;
pub const BOOST_DURATION: f32 = 1.5;

/// Inverse of the seconds taken to ease back to the pre-boost velocity.
pub const RETURN_TO_NORMAL_SPEED: f32 = 2.0;

// ── Ground ────────────────────────────────────────────────────────────────────

/// Per-step velocity multiplier while sliding.
pub const GROUND_DRAG_FACTOR: f32 = 0.98;

/// Below this speed (u/s) the sliding plane is stopped outright.
pub const MIN_GROUND_SPEED: f32 = 0.1;

/// Forward (Z) speed below which the landing marker is placed.
pub const MIN_Z_AXIS_SPEED: f32 = 0.05;

pub const GROUND_ALIGNMENT_SPEED: f32 = 5.0;

/// Length (u) of the downward terrain probe used for hugging the ground.
pub const GROUND_CHECK_DISTANCE: f32 = 0.5;

/// Impacts at or above this relative speed (u/s) break parts off.
pub const MIN_IMPACT_FORCE_FOR_DAMAGE: f32 = 10.0;

/// Fraction of tangential velocity kept after a soft landing.
pub const GROUND_RESTITUTION: f32 = 0.7;

/// Height (u) of the landing marker above the ground hit.
pub const MARKER_Y_OFFSET: f32 = 0.5;

// ── Damage ────────────────────────────────────────────────────────────────────

pub const WING_DAMAGE_ROLL_MULTIPLIER: f32 = 2.0;
pub const TAIL_DAMAGE_PITCH_MULTIPLIER: f32 = 2.0;
pub const ADDITIONAL_DRAG_PER_MISSING_PART: f32 = 0.5;

/// Constant roll bias from a missing wing is 5% of this; roll/pitch from
/// damage are clamped to half of it.
pub const WING_TILT_STRENGTH: f32 = 10.0;

/// Seconds after leaving the ramp before the wingless check fires.
pub const WING_CHECK_DELAY_SECS: f32 = 0.5;

/// Tumble the plane out of control when both wings are missing.
///
/// Off by default: a fresh save has no wings unlocked, and the first flights
/// are meant to be ballistic throws rather than tumbles.
pub const WINGLESS_TUMBLE: bool = false;

pub const FALL_DOWN_FORCE: f32 = 5.0;
pub const TUMBLE_TORQUE: f32 = 5.0;

// ── Parts ─────────────────────────────────────────────────────────────────────

/// Per-part relative speed needed to detach on a routed impact.
pub const DETACH_IMPACT_THRESHOLD: f32 = 5.0;

/// Explosion-style impulse applied to a detaching part.
pub const DETACHMENT_FORCE: f32 = 100.0;
pub const DETACH_FORCE_RADIUS: f32 = 2.0;

// ── Body ──────────────────────────────────────────────────────────────────────

/// Mass (kg) used when Rapier has not yet reported one.
pub const PLANE_MASS: f32 = 1.0;

// ── Progression ───────────────────────────────────────────────────────────────

/// Coins granted per unit of forward distance.
pub const COINS_PER_UNIT: f32 = 1.0;

pub const UPGRADE_INITIAL_COST: f32 = 10.0;
pub const UPGRADE_COST_GROWTH: f32 = 1.5;
pub const UPGRADE_CLICKS_PER_PART: u32 = 6;
