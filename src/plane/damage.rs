//! Damage: detachable parts, the torque hook for missing surfaces, and the
//! wingless tumble.
//!
//! ## Parts
//!
//! Every wing, the tail, the booster and the fuselage is a child entity with
//! a [`DetachablePart`] and its own collider.  The plane root owns a
//! [`PartRoster`] listing them.  Impacts reach a part as a [`PartImpact`]
//! message, routed to the part nearest each contact point.
//!
//! A non-core part hit hard enough (or by a tree) is unparented in place and
//! becomes an independent dynamic body thrown clear by an explosion impulse.
//! The core part (the fuselage) never leaves; it asks the roster to detach
//! everything else, which happens at most once per run.
//!
//! ## Handling
//!
//! [`DamageState`] is re-derived each step from the parts.  The flight model
//! passes its body-frame torque through [`TorqueModifier`]; missing wings
//! pull the plane into a roll, a missing tail pushes the nose down, and every
//! missing part adds linear drag.

use super::state::{
    BodyState, Booster, ContactPhase, DamageState, FlightPhase, FlightSignal, FlightState,
    GroundState, PartImpact, Plane, PlaneCollision, SurfaceKind,
};
use super::{DEBRIS_GROUP, WORLD_GROUP};
use crate::config::FlightConfig;
use crate::math::{closest_point_on_box, explosion_impulse};
use bevy::prelude::*;
use bevy_rapier3d::prelude::{
    Ccd, ColliderMassProperties, CollisionGroups, Damping, ExternalImpulse, ReadMassProperties,
    RigidBody, Velocity,
};
use rand::Rng;

/// Upward bias of the detachment push, in world units below the hit point.
const DETACH_UPWARDS_MODIFIER: f32 = 0.5;

/// Attached parts are massless; the plane root carries the mass.
const DEBRIS_DENSITY: f32 = 1.0;

/// Damping applied while tumbling.
const TUMBLE_LINEAR_DAMPING: f32 = 0.1;
const TUMBLE_ANGULAR_DAMPING: f32 = 0.05;

// ── Parts ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartKind {
    LeftWing,
    RightWing,
    Tail,
    Fuselage,
    Booster,
}

/// A piece of the plane that can break off.
#[derive(Component, Debug, Clone)]
pub struct DetachablePart {
    pub kind: PartKind,
    /// Half extents of the part's box collider, in the part's local frame.
    pub half_extents: Vec3,
    /// Core parts never detach; they detach everything else instead.
    pub is_core: bool,
    pub detached: bool,
    /// Locked parts are hidden, have no collider and count as missing.
    pub unlocked: bool,
}

impl DetachablePart {
    pub fn new(kind: PartKind, half_extents: Vec3) -> Self {
        Self {
            kind,
            half_extents,
            is_core: kind == PartKind::Fuselage,
            detached: false,
            unlocked: true,
        }
    }

    /// Present on the plane and able to take a hit.
    pub fn is_attached(&self) -> bool {
        self.unlocked && !self.detached
    }
}

/// Owner → members list for the plane's parts.
#[derive(Component, Debug, Clone, Default)]
pub struct PartRoster {
    pub members: Vec<Entity>,
    detach_all_requested: bool,
}

impl PartRoster {
    pub fn new(members: Vec<Entity>) -> Self {
        Self {
            members,
            detach_all_requested: false,
        }
    }

    /// Returns `true` only for the first request since the last reset.
    pub fn request_detach_all(&mut self) -> bool {
        !std::mem::replace(&mut self.detach_all_requested, true)
    }

    pub fn detach_all_requested(&self) -> bool {
        self.detach_all_requested
    }

    pub fn reset(&mut self) {
        self.detach_all_requested = false;
    }
}

/// Derive the handling damage from the current parts.
///
/// A wing or tail counts as disabled when it is locked or detached.  A kind
/// with no part at all is treated as present.
pub fn derive_damage<'a>(parts: impl IntoIterator<Item = &'a DetachablePart>) -> DamageState {
    let mut damage = DamageState::default();
    for part in parts {
        let missing = !part.is_attached();
        match part.kind {
            PartKind::LeftWing => damage.left_wing_disabled |= missing,
            PartKind::RightWing => damage.right_wing_disabled |= missing,
            PartKind::Tail => damage.tail_disabled |= missing,
            PartKind::Fuselage | PartKind::Booster => {}
        }
    }
    damage
}

/// Attached part whose box lies closest to `point`.
pub fn nearest_part<'a>(
    point: Vec3,
    candidates: impl IntoIterator<Item = (Entity, &'a DetachablePart, &'a GlobalTransform)>,
) -> Option<Entity> {
    candidates
        .into_iter()
        .filter(|(_, part, _)| part.is_attached())
        .map(|(entity, part, global)| {
            let (_, rotation, center) = global.to_scale_rotation_translation();
            let closest = closest_point_on_box(center, rotation, part.half_extents, point);
            (entity, closest.distance_squared(point))
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(entity, _)| entity)
}

/// Nearest part for each contact point, each part listed once with the first
/// contact point that selected it.
pub fn nearest_parts<'a>(
    points: impl IntoIterator<Item = Vec3>,
    candidates: &[(Entity, &'a DetachablePart, &'a GlobalTransform)],
) -> Vec<(Entity, Vec3)> {
    let mut hit: Vec<(Entity, Vec3)> = Vec::new();
    for point in points {
        if let Some(entity) = nearest_part(point, candidates.iter().copied()) {
            if !hit.iter().any(|(struck, _)| *struck == entity) {
                hit.push((entity, point));
            }
        }
    }
    hit
}

/// Whether an impact breaks `part` off.
pub fn should_detach(
    part: &DetachablePart,
    surface: SurfaceKind,
    relative_speed: f32,
    config: &FlightConfig,
) -> bool {
    part.is_attached()
        && (surface == SurfaceKind::Tree || relative_speed >= config.detach_impact_threshold)
}

// ── Torque hook ───────────────────────────────────────────────────────────────

/// Adjusts the flight model's body-frame torque for the plane's condition.
///
/// Body frame: `x` pitches (positive nose down), `y` yaws, `z` rolls
/// (positive banks right).
pub trait TorqueModifier {
    fn modify_torque(&self, torque: Vec3, horizontal: f32, vertical: f32, config: &FlightConfig) -> Vec3;

    /// Factor applied to `pitch_speed`.
    fn pitch_speed_scale(&self, _config: &FlightConfig) -> f32 {
        1.0
    }

    /// Linear damping added on top of the glide/dive drag.
    fn extra_linear_drag(&self, _config: &FlightConfig) -> f32 {
        0.0
    }
}

/// An intact plane.
pub struct Intact;

impl TorqueModifier for Intact {
    fn modify_torque(&self, torque: Vec3, _: f32, _: f32, _: &FlightConfig) -> Vec3 {
        torque
    }
}

impl TorqueModifier for DamageState {
    fn modify_torque(&self, torque: Vec3, horizontal: f32, vertical: f32, config: &FlightConfig) -> Vec3 {
        let mut torque = torque;
        let cap = config.wing_tilt_strength * 0.5;
        let tilt = config.wing_tilt_strength * 0.05;

        if self.left_wing_disabled {
            torque.z -= tilt;
            if horizontal < 0.0 {
                torque.z = (torque.z * config.wing_damage_roll_multiplier).clamp(-cap, cap);
            }
        }
        if self.right_wing_disabled {
            torque.z += tilt;
            if horizontal > 0.0 {
                torque.z = (torque.z * config.wing_damage_roll_multiplier).clamp(-cap, cap);
            }
        }
        if self.tail_disabled {
            let pitch_speed = config.pitch_speed * self.pitch_speed_scale(config);
            torque.x += 0.5 * vertical.abs() * pitch_speed * config.torque_response_multiplier;
            torque.x = torque.x.clamp(-cap, cap);
        }
        torque
    }

    fn pitch_speed_scale(&self, config: &FlightConfig) -> f32 {
        if self.tail_disabled {
            config.tail_damage_pitch_multiplier
        } else {
            1.0
        }
    }

    fn extra_linear_drag(&self, config: &FlightConfig) -> f32 {
        config.additional_drag_per_missing_part * self.disabled_count() as f32
    }
}

// ── Tumble ────────────────────────────────────────────────────────────────────

/// Throw a wingless plane into a tumble: a downward shove plus a random spin.
pub fn tumble(body: &mut BodyState, rng: &mut impl Rng, config: &FlightConfig) {
    body.apply_impulse(Vec3::NEG_Y * config.fall_down_force);
    let spin = Vec3::new(
        rng.gen_range(-1.0..=1.0),
        rng.gen_range(-1.0..=1.0),
        rng.gen_range(-1.0..=1.0),
    );
    body.angvel += spin * config.tumble_torque;
}

// ── Systems ───────────────────────────────────────────────────────────────────

/// Re-derive [`DamageState`] and [`Booster`] from the roster every step.
pub fn damage_state_system(
    parts: Query<&DetachablePart>,
    mut q: Query<(&PartRoster, &mut DamageState, &mut Booster), With<Plane>>,
) {
    let Ok((roster, mut damage, mut booster)) = q.single_mut() else {
        return;
    };
    let members: Vec<&DetachablePart> = roster
        .members
        .iter()
        .filter_map(|entity| parts.get(*entity).ok())
        .collect();

    let derived = derive_damage(members.iter().copied());
    if *damage != derived {
        info!("[damage] Damage changed: {derived:?}");
        *damage = derived;
    }
    booster.unlocked = members
        .iter()
        .any(|part| part.kind == PartKind::Booster && part.is_attached());
}

/// Route tree strikes to the nearest part.  The plane keeps flying.
pub fn tree_strike_system(
    mut collisions: MessageReader<PlaneCollision>,
    parts: Query<(Entity, &DetachablePart, &GlobalTransform)>,
    q: Query<(&FlightPhase, &PartRoster), With<Plane>>,
    mut impacts: MessageWriter<PartImpact>,
) {
    let Ok((phase, roster)) = q.single() else {
        collisions.clear();
        return;
    };
    for collision in collisions.read() {
        if collision.surface != SurfaceKind::Tree
            || collision.phase != ContactPhase::Started
            || !phase.is_controlling()
        {
            continue;
        }
        let candidates: Vec<_> = roster
            .members
            .iter()
            .filter_map(|entity| parts.get(*entity).ok())
            .collect();
        let point = collision.contacts.first().map(|c| c.point);
        let Some(point) = point else {
            continue;
        };
        if let Some(part) = nearest_part(point, candidates.iter().copied()) {
            debug!("[damage] Tree strike on {part:?}");
            impacts.write(PartImpact {
                part,
                surface: SurfaceKind::Tree,
                point,
                relative_speed: collision.relative_speed,
            });
        }
    }
}

/// Apply [`PartImpact`]s: detach struck parts, or detach everything when the
/// core is struck.
pub fn part_impact_system(
    mut commands: Commands,
    mut impacts: MessageReader<PartImpact>,
    config: Res<FlightConfig>,
    mut parts: Query<(&mut DetachablePart, &GlobalTransform), Without<Plane>>,
    mut q: Query<(&Velocity, &mut PartRoster), With<Plane>>,
) {
    let Ok((plane_velocity, mut roster)) = q.single_mut() else {
        impacts.clear();
        return;
    };

    for impact in impacts.read() {
        let Ok((part, _)) = parts.get(impact.part) else {
            continue;
        };
        if !should_detach(part, impact.surface, impact.relative_speed, &config) {
            continue;
        }

        if part.is_core {
            if roster.request_detach_all() {
                info!(
                    "[damage] Core part struck at {:.1} u/s; detaching all parts",
                    impact.relative_speed
                );
                for &member in &roster.members {
                    let Ok((mut member_part, member_global)) = parts.get_mut(member) else {
                        continue;
                    };
                    if member_part.is_core || !member_part.is_attached() {
                        continue;
                    }
                    let origin = member_global.translation();
                    detach_part(
                        &mut commands,
                        member,
                        &mut member_part,
                        member_global,
                        plane_velocity,
                        origin,
                        &config,
                    );
                }
            }
            continue;
        }

        let Ok((mut part, global)) = parts.get_mut(impact.part) else {
            continue;
        };
        detach_part(
            &mut commands,
            impact.part,
            &mut part,
            global,
            plane_velocity,
            impact.point,
            &config,
        );
        info!(
            "[damage] {:?} detached ({:?} at {:.1} u/s)",
            part.kind, impact.surface, impact.relative_speed
        );
    }
}

/// Turn an attached part into free debris at its current world pose.
fn detach_part(
    commands: &mut Commands,
    entity: Entity,
    part: &mut DetachablePart,
    global: &GlobalTransform,
    plane_velocity: &Velocity,
    hit_point: Vec3,
    config: &FlightConfig,
) {
    part.detached = true;
    let world = global.compute_transform();
    let impulse = explosion_impulse(
        world.translation,
        hit_point,
        config.detachment_force,
        config.detach_force_radius,
        DETACH_UPWARDS_MODIFIER,
    );
    commands
        .entity(entity)
        .remove::<ChildOf>()
        .insert((
            world,
            RigidBody::Dynamic,
            Velocity {
                linvel: plane_velocity.linvel,
                angvel: plane_velocity.angvel,
            },
            ExternalImpulse {
                impulse,
                torque_impulse: Vec3::ZERO,
            },
            CollisionGroups::new(DEBRIS_GROUP, WORLD_GROUP),
            ColliderMassProperties::Density(DEBRIS_DENSITY),
            Ccd::enabled(),
        ));
}

/// Once the post-ramp delay is over, a plane without wings either tumbles
/// (with `wingless_tumble`) or simply flies ballistic.
#[allow(clippy::type_complexity)]
pub fn wing_check_system(
    time: Res<Time>,
    config: Res<FlightConfig>,
    mut q: Query<
        (
            &mut FlightPhase,
            &mut FlightState,
            &mut GroundState,
            &DamageState,
            &Transform,
            &mut Velocity,
            &mut Damping,
            Option<&ReadMassProperties>,
        ),
        With<Plane>,
    >,
    mut signals: MessageWriter<FlightSignal>,
) {
    let Ok((
        mut phase,
        mut flight,
        mut ground,
        damage,
        transform,
        mut velocity,
        mut damping,
        mass,
    )) = q.single_mut()
    else {
        return;
    };
    if !phase.is_controlling() {
        return;
    }
    let delay_over = match flight.wing_check.as_mut() {
        Some(timer) => {
            timer.tick(time.delta_secs());
            timer.finished()
        }
        None => true,
    };
    if !delay_over || !damage.both_wings_missing() || !config.wingless_tumble {
        return;
    }

    let mut body = BodyState::read(transform, &velocity, mass, config.plane_mass);
    tumble(&mut body, &mut rand::thread_rng(), &config);
    velocity.linvel = body.linvel;
    velocity.angvel = body.angvel;
    damping.linear_damping = TUMBLE_LINEAR_DAMPING;
    damping.angular_damping = TUMBLE_ANGULAR_DAMPING;
    ground.exited_ramp = true;
    flight.wing_check = None;
    *phase = FlightPhase::Tumbling;
    signals.write(FlightSignal::Tumbling);
    warn!("[damage] Both wings missing; plane is tumbling");
}
