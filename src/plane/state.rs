//! Plane components, resources and messages.
//!
//! All ECS components and Bevy resources that describe launch/flight state
//! live here.  Systems that mutate this state are in the sibling modules:
//! - [`super::launch`]: drag, release, lift
//! - [`super::ramp`]: ramp alignment and ramp exit
//! - [`super::flight`]: airborne force/torque integration and boost
//! - [`super::ground`]: impacts, sliding, stopping, marker requests
//! - [`super::damage`]: damage torque hook, parts, tumble
//! - [`super::bridge`]: Rapier events and ray casts
//!
//! ## Ownership of the rigid body
//!
//! Exactly one component owns the body per tick, selected by [`FlightPhase`].
//! Because the phase is a single enum, "dragging", "aligning", "controlling"
//! and "grounded" can never be true at the same time.

use crate::timers::{BoundedTimer, PositionTween, RotationTween};
use bevy::prelude::*;
use bevy_rapier3d::prelude::{ReadMassProperties, Velocity};

// ── Markers ────────────────────────────────────────────────────────────────────

/// Marker component for the launched plane's root entity.
#[derive(Component)]
pub struct Plane;

/// Classifies static world colliders the plane can touch.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceKind {
    Ramp,
    Ground,
    Tree,
}

/// Persistent landing-point indicator spawned once per launch cycle.
#[derive(Component, Debug, Clone, Copy)]
pub struct LandingMarker {
    pub distance: f32,
}

// ── Phase ──────────────────────────────────────────────────────────────────────

/// Launch-cycle state machine.
///
/// `Resting → Dragging → Launched → Aligning → Airborne → GroundedSliding →
/// GroundedStopped`, with `Dragging → Resting` for short pulls, `Airborne →
/// Tumbling` for a wingless plane, and `Aligning → GroundedStopped` when the
/// plane stalls on the ramp.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlightPhase {
    #[default]
    Resting,
    Dragging,
    Launched,
    Aligning,
    Airborne,
    Tumbling,
    GroundedSliding,
    GroundedStopped,
}

impl FlightPhase {
    #[inline]
    pub fn is_dragging(self) -> bool {
        self == FlightPhase::Dragging
    }

    /// `true` from the release until the next reset.
    #[inline]
    pub fn is_released(self) -> bool {
        !matches!(self, FlightPhase::Resting | FlightPhase::Dragging)
    }

    #[inline]
    pub fn is_aligning(self) -> bool {
        self == FlightPhase::Aligning
    }

    /// The flight model integrates forces only in this phase.
    #[inline]
    pub fn is_controlling(self) -> bool {
        self == FlightPhase::Airborne
    }

    #[inline]
    pub fn is_grounded(self) -> bool {
        self == FlightPhase::GroundedSliding
    }

    /// `true` while the plane is still moving under its own momentum after release.
    #[inline]
    pub fn in_flight(self) -> bool {
        matches!(self, FlightPhase::Airborne | FlightPhase::Tumbling)
    }
}

// ── Launch ─────────────────────────────────────────────────────────────────────

/// Drag-to-launch bookkeeping.
///
/// The resting point and launch direction are fixed at spawn; everything else
/// is reset by [`ResetRun`].
#[derive(Component, Debug, Clone)]
pub struct LaunchState {
    pub resting_point: Vec3,
    /// Horizontal unit vector the ramp launches toward (world +Z by default).
    pub launch_forward: Vec3,
    /// Rotation the plane sits in at rest.
    pub rest_rotation: Quat,
    /// Clamped displacement from the resting point during the pull.
    pub drag_offset: Vec3,
    /// Distance captured at release; drives the impulse and the lift.
    pub drag_distance: f32,
    /// Horizontal unit vector of the last launch impulse.
    pub launch_direction: Vec3,
    pub released: bool,
    pub lift: Option<BoundedTimer>,
    pub return_to_rest: Option<PositionTween>,
    /// Yaw the plane is easing toward while the drag is held.
    pub preview_rotation: Option<Quat>,
}

impl LaunchState {
    pub fn new(resting_point: Vec3, launch_forward: Vec3, rest_rotation: Quat) -> Self {
        let forward = launch_forward
            .with_y(0.0)
            .try_normalize()
            .unwrap_or(Vec3::Z);
        Self {
            resting_point,
            launch_forward: forward,
            rest_rotation,
            drag_offset: Vec3::ZERO,
            drag_distance: 0.0,
            launch_direction: forward,
            released: false,
            lift: None,
            return_to_rest: None,
            preview_rotation: None,
        }
    }

    /// Back to the pinned, unreleased state.
    pub fn reset(&mut self) {
        *self = Self::new(self.resting_point, self.launch_forward, self.rest_rotation);
    }
}

// ── Ramp ───────────────────────────────────────────────────────────────────────

/// Ramp contact bookkeeping for the current launch.
#[derive(Component, Debug, Clone, Default)]
pub struct RampContactState {
    pub ramp: Option<Entity>,
    pub ramp_normal: Option<Vec3>,
    /// Captured on the first ramp contact after release; restored on exit.
    pub original_rotation: Option<Quat>,
    pub restore: Option<RotationTween>,
    /// Seconds the plane has been nearly stationary on the ramp.
    pub stop_timer: f32,
    pub last_z: Option<f32>,
}

// ── Flight ─────────────────────────────────────────────────────────────────────

/// Boost lifecycle: hold the extra speed, then ease back.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum BoostState {
    #[default]
    Idle,
    Holding {
        pre_boost: Vec3,
        timer: BoundedTimer,
    },
    Returning {
        from: Vec3,
        to: Vec3,
        timer: BoundedTimer,
    },
}

impl BoostState {
    pub fn is_active(&self) -> bool {
        !matches!(self, BoostState::Idle)
    }
}

/// Airborne integrator state.
#[derive(Component, Debug, Clone, Default)]
pub struct FlightState {
    pub smoothed_horizontal: f32,
    pub smoothed_vertical: f32,
    /// World-space torque after the second low-pass stage.
    pub smoothed_torque: Vec3,
    /// Energy reservoir filled on a dive→climb transition; never negative.
    pub stored_momentum: f32,
    /// Peak speed seen during the current dive.
    pub max_recent_speed: f32,
    pub was_diving: bool,
    pub wing_check: Option<BoundedTimer>,
    pub boost: BoostState,
}

/// Whether the booster part has been unlocked for this plane.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Booster {
    pub unlocked: bool,
}

// ── Ground ─────────────────────────────────────────────────────────────────────

#[derive(Component, Debug, Clone, Default)]
pub struct GroundState {
    /// Z position at the previous sliding step (finite-difference source).
    pub last_z: f32,
    /// Once-per-cycle latch for the landing marker.
    pub marker_placed: bool,
    /// Set when the plane leaves the ramp; consumed by the landing marker.
    pub exited_ramp: bool,
}

/// Forward progress, measured along world Z from the resting point.
///
/// Updated every fixed step regardless of phase.  `max_z_distance` never
/// decreases and is the sole input to scoring.
#[derive(Component, Debug, Clone)]
pub struct DistanceTracker {
    pub start_position: Vec3,
    pub max_z_distance: f32,
    pub max_z_position: Vec3,
}

impl DistanceTracker {
    pub fn new(start_position: Vec3) -> Self {
        Self {
            start_position,
            max_z_distance: 0.0,
            max_z_position: start_position,
        }
    }

    /// Fold one position sample into the running maximum.
    pub fn record(&mut self, position: Vec3) {
        let distance = position.z - self.start_position.z;
        if distance > self.max_z_distance {
            self.max_z_distance = distance;
            self.max_z_position = position;
        }
    }
}

/// Result of a downward ray cast.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceHit {
    pub point: Vec3,
    pub normal: Vec3,
    pub distance: f32,
}

/// Latest downward probe from the plane, refreshed every fixed step by the bridge.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct GroundProbe {
    pub hit: Option<SurfaceHit>,
}

impl GroundProbe {
    /// Hit within `max_distance`, if any.
    pub fn within(&self, max_distance: f32) -> Option<SurfaceHit> {
        self.hit.filter(|hit| hit.distance <= max_distance)
    }
}

/// Linear velocity at the end of the previous gameplay step, before the
/// physics solver resolved any new contact.  Impact speeds are measured from it.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct PreStepVelocity(pub Vec3);

// ── Damage ─────────────────────────────────────────────────────────────────────

/// Which lift/control surfaces are unavailable.  Derived from the parts each step.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DamageState {
    pub left_wing_disabled: bool,
    pub right_wing_disabled: bool,
    pub tail_disabled: bool,
}

impl DamageState {
    pub fn both_wings_missing(&self) -> bool {
        self.left_wing_disabled && self.right_wing_disabled
    }

    pub fn disabled_count(&self) -> u32 {
        [self.left_wing_disabled, self.right_wing_disabled, self.tail_disabled]
            .into_iter()
            .filter(|d| *d)
            .count() as u32
    }
}

// ── Body view ──────────────────────────────────────────────────────────────────

/// Copy of the rigid-body state that the pure step functions operate on.
///
/// Systems read it from `Transform` + `Velocity`, call into the step logic,
/// and write it back with [`BodyState::write`].  "Acceleration" helpers are
/// mass independent; "force" and "impulse" helpers divide by `mass`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyState {
    pub translation: Vec3,
    pub rotation: Quat,
    pub linvel: Vec3,
    pub angvel: Vec3,
    pub mass: f32,
}

impl BodyState {
    pub fn read(
        transform: &Transform,
        velocity: &Velocity,
        mass: Option<&ReadMassProperties>,
        fallback_mass: f32,
    ) -> Self {
        let mass = mass
            .map(|m| m.get().mass)
            .filter(|m| *m > 0.0)
            .unwrap_or(fallback_mass.max(f32::EPSILON));
        Self {
            translation: transform.translation,
            rotation: transform.rotation,
            linvel: velocity.linvel,
            angvel: velocity.angvel,
            mass,
        }
    }

    /// Write back only what changed so Rapier does not see spurious teleports.
    pub fn write(&self, transform: &mut Transform, velocity: &mut Velocity) {
        if transform.translation != self.translation {
            transform.translation = self.translation;
        }
        if transform.rotation != self.rotation {
            transform.rotation = self.rotation;
        }
        if velocity.linvel != self.linvel || velocity.angvel != self.angvel {
            velocity.linvel = self.linvel;
            velocity.angvel = self.angvel;
        }
    }

    #[inline]
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::Z
    }

    #[inline]
    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    #[inline]
    pub fn speed(&self) -> f32 {
        self.linvel.length()
    }

    pub fn apply_impulse(&mut self, impulse: Vec3) {
        self.linvel += impulse / self.mass;
    }

    pub fn apply_force(&mut self, force: Vec3, dt: f32) {
        self.linvel += force / self.mass * dt;
    }

    pub fn apply_acceleration(&mut self, accel: Vec3, dt: f32) {
        self.linvel += accel * dt;
    }

    pub fn apply_angular_acceleration(&mut self, accel: Vec3, dt: f32) {
        self.angvel += accel * dt;
    }
}

// ── Input Abstraction ──────────────────────────────────────────────────────────

/// Two-axis flight input for the current frame, after deadzone, sensitivity
/// and inversion.
///
/// Input systems (keyboard, gamepad, on-screen joystick) write to this
/// resource each frame after it is cleared; the flight model reads it on the
/// next fixed step.  Tests populate it directly.
#[derive(Resource, Default, Debug, Clone, Copy, PartialEq)]
pub struct FlightIntent {
    /// `+1` banks and turns right.
    pub horizontal: f32,
    /// `+1` pushes the nose down.
    pub vertical: f32,
}

/// Numeric output of the on-screen joystick widget, each axis in `[-1, 1]`.
///
/// The widget itself lives outside this crate; it only writes this value.
#[derive(Resource, Default, Debug, Clone, Copy, PartialEq)]
pub struct TouchJoystick(pub Vec2);

/// Pointer state for the current frame, in world space.
#[derive(Resource, Default, Debug, Clone, Copy, PartialEq)]
pub struct PointerIntent {
    /// Camera ray through the pointer, if a pointer and camera exist.
    pub ray: Option<Ray3d>,
    pub just_pressed: bool,
    pub pressed: bool,
    pub just_released: bool,
    /// Set by the bridge when the press ray hit the plane's collider.
    pub picked_plane: bool,
}

// ── Messages ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactPhase {
    Started,
    Persisting,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactSample {
    pub point: Vec3,
    pub normal: Vec3,
}

/// A collision between the plane (or one of its parts) and a classified surface.
#[derive(Message, Debug, Clone, PartialEq)]
pub struct PlaneCollision {
    pub phase: ContactPhase,
    pub surface: SurfaceKind,
    pub other: Entity,
    /// World-space up of the other body; the ramp's surface normal.
    pub surface_up: Vec3,
    /// Empty for `Stopped`.
    pub contacts: Vec<ContactSample>,
    pub relative_speed: f32,
}

/// Feedback for haptics and the rubber-band visual.
#[derive(Message, Debug, Clone, Copy, PartialEq)]
pub enum LaunchFeedback {
    Haptic(bool),
    /// Band stretch normalised by `max_drag_distance`.
    BandStretch(f32),
    BandHidden,
    Launched { drag_distance: f32 },
}

/// Control hand-offs, for the camera, joystick visibility and HUD.
#[derive(Message, Debug, Clone, Copy, PartialEq)]
pub enum FlightSignal {
    ControlStarted,
    ControlStopped { impact_speed: f32 },
    Tumbling,
    Stopped,
}

/// Ask the bridge to resolve and spawn the landing marker.
#[derive(Message, Debug, Clone, Copy, PartialEq)]
pub struct MarkerRequest {
    /// Farthest-progress position; the ray is cast down from just above it.
    pub origin: Vec3,
    /// Used when nothing is found below `origin`.
    pub fallback: Vec3,
    pub distance: f32,
}

/// The landing marker exists.  Sole trigger for camera hand-off and scoring.
#[derive(Message, Debug, Clone, Copy, PartialEq)]
pub struct MarkerPlaced {
    pub position: Vec3,
    pub normal: Vec3,
    pub distance: f32,
}

/// Collision routed to a single detachable part.
#[derive(Message, Debug, Clone, Copy, PartialEq)]
pub struct PartImpact {
    pub part: Entity,
    pub surface: SurfaceKind,
    pub point: Vec3,
    pub relative_speed: f32,
}

#[derive(Message, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoostRequest;

/// External restart: pin the plane back on the ramp.
#[derive(Message, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResetRun;
