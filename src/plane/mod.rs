//! Plane module: the launched glider, from drag to landing.
//!
//! ## Sub-module layout
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`state`] | Components (`FlightPhase`, `LaunchState`, `FlightState`, …), input resources, messages |
//! | [`launch`] | Drag-to-launch, return to rest, launch yaw, post-release lift |
//! | [`ramp`] | Ramp alignment, ramp exit, orientation restore, ramp-stop marker |
//! | [`flight`] | Airborne torque, auto-level, air resistance, dive/climb momentum, boost |
//! | [`ground`] | Impacts, sliding, terrain hugging, distance tracking, marker requests |
//! | [`damage`] | Detachable parts, the `TorqueModifier` hook, wingless tumble |
//! | [`input`] | Keyboard / gamepad / on-screen joystick → `FlightIntent`; pointer → `PointerIntent` |
//! | [`bridge`] | Rapier events and ray casts ↔ gameplay messages |
//!
//! ## Collision groups
//!
//! | Group | Members | Collides with |
//! |-------|---------|---------------|
//! | `GROUP_1` ([`WORLD_GROUP`]) | ramp, ground, trees | everything |
//! | `GROUP_2` ([`PLANE_GROUP`]) | attached plane parts | world |
//! | `GROUP_3` ([`DEBRIS_GROUP`]) | detached parts | world |
//!
//! ## Schedule
//!
//! `Update` samples input and runs the drag.  `FixedUpdate` runs every
//! gameplay mutation in one chain, ahead of the Rapier step:
//! bridge → distance → lift → ramp → damage → flight → ground → parts → marker.

pub mod bridge;
pub mod damage;
pub mod flight;
pub mod ground;
pub mod input;
pub mod launch;
pub mod ramp;
pub mod state;

// ── Flat re-exports ───────────────────────────────────────────────────────────

pub use bridge::ContactLedger;
pub use damage::{DetachablePart, Intact, PartKind, PartRoster, TorqueModifier};
pub use input::{FlightInputPlugin, PreferredGamepad};
pub use state::{
    BodyState, BoostRequest, Booster, ContactPhase, ContactSample, DamageState, DistanceTracker,
    FlightIntent, FlightPhase, FlightSignal, FlightState, GroundProbe, GroundState, LandingMarker,
    LaunchFeedback, LaunchState, MarkerPlaced, MarkerRequest, PartImpact, Plane, PlaneCollision,
    PointerIntent, PreStepVelocity, RampContactState, ResetRun, SurfaceHit, SurfaceKind,
    TouchJoystick,
};

use crate::config::FlightConfig;
use crate::progress::UpgradeTrack;
use bevy::prelude::*;
use bevy_rapier3d::prelude::*;

pub const WORLD_GROUP: Group = Group::GROUP_1;
pub const PLANE_GROUP: Group = Group::GROUP_2;
pub const DEBRIS_GROUP: Group = Group::GROUP_3;

/// Share of the plane's mass used as principal inertia on every axis.
const INERTIA_PER_MASS: f32 = 0.5;

// ── Plugin ────────────────────────────────────────────────────────────────────

/// Per-frame ordering: device input is sampled before the drag runs on it.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum FlightSet {
    Input,
    Launch,
}

/// Registers plane resources, messages and systems.
///
/// Rapier itself is added by the binary; without it the bridge systems find
/// no context and do nothing, which is how the headless tests run.  Device
/// input lives in [`input::FlightInputPlugin`] so tests can leave it out.
pub struct FlightPlugin;

impl Plugin for FlightPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<FlightIntent>()
            .init_resource::<TouchJoystick>()
            .init_resource::<PointerIntent>()
            .init_resource::<ContactLedger>()
            .add_message::<CollisionEvent>()
            .add_message::<PlaneCollision>()
            .add_message::<LaunchFeedback>()
            .add_message::<FlightSignal>()
            .add_message::<MarkerRequest>()
            .add_message::<MarkerPlaced>()
            .add_message::<PartImpact>()
            .add_message::<BoostRequest>()
            .add_message::<ResetRun>()
            .configure_sets(Update, (FlightSet::Input, FlightSet::Launch).chain())
            .add_systems(
                Update,
                (
                    reset_run_system,
                    bridge::pointer_pick_system,
                    launch::drag_begin_system,
                    launch::drag_track_system,
                    launch::drag_release_system,
                    launch::return_to_rest_system,
                )
                    .chain()
                    .in_set(FlightSet::Launch),
            )
            .add_systems(
                FixedUpdate,
                (
                    (bridge::collision_bridge_system, bridge::ground_probe_system),
                    ground::distance_tracking_system,
                    launch::launch_lift_system,
                    (
                        ramp::ramp_contact_system,
                        ramp::ramp_align_system,
                        ramp::ramp_restore_system,
                    )
                        .chain(),
                    (
                        damage::damage_state_system,
                        damage::tree_strike_system,
                        damage::wing_check_system,
                    )
                        .chain(),
                    (flight::flight_system, flight::boost_system).chain(),
                    (ground::ground_contact_system, ground::ground_slide_system).chain(),
                    damage::part_impact_system,
                    bridge::marker_resolution_system,
                    bridge::pre_step_velocity_system,
                )
                    .chain(),
            );
    }
}

// ── Spawn ─────────────────────────────────────────────────────────────────────

/// Mount offset and half extents of each part, in the plane's local frame.
///
/// Local +X is the left wing side.
pub fn part_layout() -> [(PartKind, Vec3, Vec3); 5] {
    [
        (PartKind::Fuselage, Vec3::ZERO, Vec3::new(0.2, 0.2, 0.9)),
        (PartKind::LeftWing, Vec3::new(0.95, 0.0, 0.1), Vec3::new(0.75, 0.05, 0.25)),
        (PartKind::RightWing, Vec3::new(-0.95, 0.0, 0.1), Vec3::new(0.75, 0.05, 0.25)),
        (PartKind::Tail, Vec3::new(0.0, 0.15, -0.8), Vec3::new(0.45, 0.05, 0.15)),
        (PartKind::Booster, Vec3::new(0.0, -0.25, -0.4), Vec3::new(0.1, 0.1, 0.3)),
    ]
}

/// Spawn the part children of `plane`.  Locked parts are hidden and have no
/// collider.
pub fn spawn_parts(
    commands: &mut Commands,
    plane: Entity,
    track: &UpgradeTrack,
    config: &FlightConfig,
) -> Vec<Entity> {
    part_layout()
        .into_iter()
        .map(|(kind, offset, half_extents)| {
            let mut part = DetachablePart::new(kind, half_extents);
            part.unlocked = track.is_unlocked(kind, config);
            let unlocked = part.unlocked;

            let mut entity = commands.spawn((
                part,
                Collider::cuboid(half_extents.x, half_extents.y, half_extents.z),
                ColliderMassProperties::Density(0.0),
                CollisionGroups::new(PLANE_GROUP, WORLD_GROUP),
                ActiveEvents::COLLISION_EVENTS,
                Transform::from_translation(offset),
                ChildOf(plane),
            ));
            if unlocked {
                entity.insert(Visibility::Inherited);
            } else {
                entity.insert((Visibility::Hidden, ColliderDisabled));
            }
            entity.id()
        })
        .collect()
}

/// Spawn the plane pinned at `rest`, facing world +Z.
pub fn spawn_plane(
    commands: &mut Commands,
    rest: Vec3,
    track: &UpgradeTrack,
    config: &FlightConfig,
) -> Entity {
    let rotation = Quat::IDENTITY;
    let plane = commands
        .spawn((
            Plane,
            FlightPhase::Resting,
            LaunchState::new(rest, Vec3::Z, rotation),
            RampContactState::default(),
            FlightState::default(),
            GroundState::default(),
            DistanceTracker::new(rest),
            GroundProbe::default(),
            PreStepVelocity::default(),
            DamageState::default(),
            Booster::default(),
            Transform::from_translation(rest).with_rotation(rotation),
            Visibility::default(),
        ))
        .insert((
            RigidBody::KinematicPositionBased,
            Velocity::zero(),
            GravityScale(0.0),
            Damping {
                linear_damping: config.glide_drag,
                angular_damping: config.angular_drag_amount,
            },
            LockedAxes::ROTATION_LOCKED,
            AdditionalMassProperties::MassProperties(MassProperties {
                mass: config.plane_mass,
                principal_inertia: Vec3::splat(config.plane_mass * INERTIA_PER_MASS),
                ..default()
            }),
            ReadMassProperties::default(),
            Ccd::enabled(),
        ))
        .id();

    let members = spawn_parts(commands, plane, track, config);
    commands.entity(plane).insert(PartRoster::new(members));
    info!("[launch] Plane spawned at {rest:?}");
    plane
}

// ── Reset ─────────────────────────────────────────────────────────────────────

/// Put the plane back on the ramp for another launch.
///
/// Parts are rebuilt from the upgrade track, ramps are re-enabled and old
/// landing markers removed.
#[allow(clippy::too_many_arguments, clippy::type_complexity)]
pub fn reset_run_system(
    mut commands: Commands,
    mut resets: MessageReader<ResetRun>,
    config: Res<FlightConfig>,
    track: Option<Res<UpgradeTrack>>,
    mut ledger: ResMut<ContactLedger>,
    surfaces: Query<(Entity, &SurfaceKind), With<ColliderDisabled>>,
    markers: Query<Entity, With<LandingMarker>>,
    mut q: Query<
        (
            Entity,
            &mut FlightPhase,
            &mut LaunchState,
            &mut RampContactState,
            &mut FlightState,
            &mut GroundState,
            &mut DistanceTracker,
            &mut PartRoster,
            &mut Transform,
            &mut Velocity,
            &mut RigidBody,
            &mut GravityScale,
            &mut LockedAxes,
            &mut Damping,
        ),
        With<Plane>,
    >,
) {
    if resets.read().count() == 0 {
        return;
    }
    let Ok((
        plane,
        mut phase,
        mut launch,
        mut ramp,
        mut flight,
        mut ground,
        mut tracker,
        mut roster,
        mut transform,
        mut velocity,
        mut body,
        mut gravity,
        mut locks,
        mut damping,
    )) = q.single_mut()
    else {
        warn!("[launch] ResetRun with no plane");
        return;
    };

    launch.reset();
    *phase = FlightPhase::Resting;
    *ramp = RampContactState::default();
    *flight = FlightState::default();
    *ground = GroundState::default();
    *tracker = DistanceTracker::new(launch.resting_point);
    transform.translation = launch.resting_point;
    transform.rotation = launch.rest_rotation;
    *velocity = Velocity::zero();
    *body = RigidBody::KinematicPositionBased;
    gravity.0 = 0.0;
    *locks = LockedAxes::ROTATION_LOCKED;
    damping.linear_damping = config.glide_drag;
    damping.angular_damping = config.angular_drag_amount;

    for member in roster.members.drain(..) {
        commands.entity(member).despawn();
    }
    let track = track
        .map(|track| track.clone())
        .unwrap_or_else(|| UpgradeTrack::new(&config));
    roster.members = spawn_parts(&mut commands, plane, &track, &config);
    roster.reset();

    for (surface, kind) in surfaces.iter() {
        if *kind == SurfaceKind::Ramp {
            commands.entity(surface).remove::<ColliderDisabled>();
        }
    }
    for marker in markers.iter() {
        commands.entity(marker).despawn();
    }
    ledger.clear();
    info!("[launch] Run reset");
}

#[cfg(test)]
pub(crate) mod test_support {
    use bevy::ecs::message::Message;
    use bevy::prelude::*;

    /// Every message of type `M` seen by [`collect_messages`].
    #[derive(Resource)]
    pub struct Collected<M: Message>(pub Vec<M>);

    impl<M: Message> Default for Collected<M> {
        fn default() -> Self {
            Self(Vec::new())
        }
    }

    pub fn collect_messages<M: Message + Clone>(
        mut reader: MessageReader<M>,
        mut collected: ResMut<Collected<M>>,
    ) {
        collected.0.extend(reader.read().cloned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_test_app() -> App {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        app.insert_resource(FlightConfig::default());
        app.add_plugins(FlightPlugin);
        app
    }

    fn spawn_with_track(app: &mut App, track: UpgradeTrack) -> Entity {
        let config = FlightConfig::default();
        let world = app.world_mut();
        let mut commands = world.commands();
        let plane = spawn_plane(&mut commands, Vec3::new(0.0, 1.0, 0.0), &track, &config);
        world.flush();
        plane
    }

    fn part_of(app: &mut App, kind: PartKind) -> (Entity, DetachablePart) {
        let world = app.world_mut();
        let mut parts = world.query::<(Entity, &DetachablePart)>();
        parts
            .iter(world)
            .find(|(_, part)| part.kind == kind)
            .map(|(e, part)| (e, part.clone()))
            .unwrap()
    }

    #[test]
    fn fresh_plane_has_only_fuselage_unlocked() {
        let mut app = build_test_app();
        let plane = spawn_with_track(&mut app, UpgradeTrack::default());

        let world = app.world();
        assert_eq!(*world.get::<FlightPhase>(plane).unwrap(), FlightPhase::Resting);
        assert_eq!(world.get::<PartRoster>(plane).unwrap().members.len(), 5);
        assert!(world.get::<LockedAxes>(plane).unwrap().contains(LockedAxes::ROTATION_LOCKED));

        let (fuselage, part) = part_of(&mut app, PartKind::Fuselage);
        assert!(part.unlocked && part.is_core);
        assert!(app.world().get::<ColliderDisabled>(fuselage).is_none());
        let (left, part) = part_of(&mut app, PartKind::LeftWing);
        assert!(!part.unlocked);
        assert!(app.world().get::<ColliderDisabled>(left).is_some());
        assert_eq!(*app.world().get::<Visibility>(left).unwrap(), Visibility::Hidden);
    }

    #[test]
    fn bought_parts_spawn_unlocked() {
        let config = FlightConfig::default();
        let mut app = build_test_app();
        spawn_with_track(
            &mut app,
            UpgradeTrack {
                clicks: config.upgrade_clicks_per_part * 3,
                current_cost: 1.0,
            },
        );
        for kind in [PartKind::LeftWing, PartKind::RightWing, PartKind::Tail] {
            assert!(part_of(&mut app, kind).1.unlocked, "{kind:?} should be unlocked");
        }
        assert!(!part_of(&mut app, PartKind::Booster).1.unlocked);
    }

    #[test]
    fn reset_run_pins_plane_and_rebuilds_parts() {
        let mut app = build_test_app();
        let plane = spawn_with_track(&mut app, UpgradeTrack::default());
        let ramp = app
            .world_mut()
            .spawn((SurfaceKind::Ramp, ColliderDisabled, GlobalTransform::default()))
            .id();
        let marker = app.world_mut().spawn(LandingMarker { distance: 12.0 }).id();
        let old_members = app.world().get::<PartRoster>(plane).unwrap().members.clone();

        {
            let mut entity = app.world_mut().entity_mut(plane);
            *entity.get_mut::<FlightPhase>().unwrap() = FlightPhase::GroundedStopped;
            entity.get_mut::<Transform>().unwrap().translation = Vec3::new(3.0, 0.2, 40.0);
            *entity.get_mut::<Velocity>().unwrap() = Velocity::linear(Vec3::new(0.0, 0.0, 4.0));
            entity.get_mut::<GroundState>().unwrap().marker_placed = true;
            entity.get_mut::<DistanceTracker>().unwrap().record(Vec3::new(0.0, 0.0, 40.0));
            entity.get_mut::<PartRoster>().unwrap().request_detach_all();
        }

        app.world_mut().write_message(ResetRun);
        app.update();

        let world = app.world();
        assert_eq!(*world.get::<FlightPhase>(plane).unwrap(), FlightPhase::Resting);
        assert_eq!(world.get::<Transform>(plane).unwrap().translation, Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(world.get::<Velocity>(plane).unwrap().linvel, Vec3::ZERO);
        assert_eq!(*world.get::<RigidBody>(plane).unwrap(), RigidBody::KinematicPositionBased);
        assert!(!world.get::<GroundState>(plane).unwrap().marker_placed);
        assert_eq!(world.get::<DistanceTracker>(plane).unwrap().max_z_distance, 0.0);

        let roster = world.get::<PartRoster>(plane).unwrap();
        assert!(!roster.detach_all_requested());
        assert_eq!(roster.members.len(), 5);
        for old in old_members {
            assert!(world.get_entity(old).is_err(), "old part {old:?} despawned");
        }
        assert!(world.get::<ColliderDisabled>(ramp).is_none(), "ramp re-enabled");
        assert!(world.get_entity(marker).is_err(), "marker removed");
    }
}
