//! Demo world: launch ramp, ground, a few trees, the plane, a follow camera and
//! a one-line HUD.
//!
//! Everything here is presentation.  The gameplay systems only see the
//! `SurfaceKind`-tagged colliders and the plane spawned by
//! [`crate::plane::spawn_plane`].
//!
//! Keys: **R** resets the run, **U** buys one upgrade click.

use crate::config::FlightConfig;
use crate::math::rate_t;
use crate::plane::{
    spawn_plane, DetachablePart, DistanceTracker, LandingMarker, MarkerPlaced, PartKind, Plane,
    ResetRun, SurfaceKind, WORLD_GROUP,
};
use crate::progress::{progress_fraction, speedometer_kmh, CoinBank, UpgradeRequest, UpgradeTrack};
use bevy::prelude::*;
use bevy_rapier3d::prelude::*;

/// Where the plane rests before launch.
pub const RESTING_POINT: Vec3 = Vec3::new(0.0, 1.2, -4.0);

/// Z at which the course (and the progress bar) ends.
pub const COURSE_END_Z: f32 = 250.0;

const CAMERA_OFFSET: Vec3 = Vec3::new(0.0, 4.0, -10.0);
const CAMERA_FOLLOW_RATE: f32 = 4.0;

const TREE_ROWS: [(f32, f32); 5] = [(-6.0, 60.0), (5.0, 85.0), (-3.0, 120.0), (7.0, 160.0), (0.0, 210.0)];

// ── Camera ────────────────────────────────────────────────────────────────────

/// What the camera is looking at.
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub enum FollowCamera {
    Plane,
    /// Parked over the landing marker after touchdown.
    Marker(Vec3),
}

/// Ease the camera toward `target + offset` and aim it at `target`.
pub fn follow_step(camera: Transform, target: Vec3, dt: f32) -> Transform {
    let goal = target + CAMERA_OFFSET;
    let translation = camera.translation.lerp(goal, rate_t(dt, CAMERA_FOLLOW_RATE));
    Transform::from_translation(translation).looking_at(target, Vec3::Y)
}

pub fn camera_follow_system(
    time: Res<Time>,
    q_plane: Query<&Transform, With<Plane>>,
    mut q_camera: Query<(&FollowCamera, &mut Transform), (With<Camera3d>, Without<Plane>)>,
) {
    let Ok((follow, mut camera)) = q_camera.single_mut() else {
        return;
    };
    let target = match follow {
        FollowCamera::Plane => match q_plane.single() {
            Ok(plane) => plane.translation,
            Err(_) => return,
        },
        FollowCamera::Marker(position) => *position,
    };
    *camera = follow_step(*camera, target, time.delta_secs());
}

/// Hand the camera to the landing marker; back to the plane on reset.
pub fn camera_handoff_system(
    mut placed: MessageReader<MarkerPlaced>,
    mut resets: MessageReader<ResetRun>,
    mut q_camera: Query<&mut FollowCamera>,
) {
    let Ok(mut follow) = q_camera.single_mut() else {
        return;
    };
    if let Some(marker) = placed.read().last() {
        *follow = FollowCamera::Marker(marker.position);
    }
    if resets.read().count() > 0 {
        *follow = FollowCamera::Plane;
    }
}

// ── World ─────────────────────────────────────────────────────────────────────

fn surface_bundle(kind: SurfaceKind) -> impl Bundle {
    (
        kind,
        RigidBody::Fixed,
        CollisionGroups::new(WORLD_GROUP, Group::ALL),
    )
}

pub fn setup_world(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    commands.spawn((
        Camera3d::default(),
        FollowCamera::Plane,
        Transform::from_translation(RESTING_POINT + CAMERA_OFFSET).looking_at(RESTING_POINT, Vec3::Y),
    ));
    commands.spawn((
        DirectionalLight {
            illuminance: 15000.0,
            shadows_enabled: true,
            ..Default::default()
        },
        Transform::from_xyz(20.0, 40.0, -10.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));

    // Launch ramp: a ski jump rising toward +Z.
    let ramp_half = Vec3::new(2.0, 0.1, 8.0);
    commands.spawn((
        surface_bundle(SurfaceKind::Ramp),
        Collider::cuboid(ramp_half.x, ramp_half.y, ramp_half.z),
        Mesh3d(meshes.add(Cuboid::from_size(ramp_half * 2.0))),
        MeshMaterial3d(materials.add(Color::srgb(0.55, 0.4, 0.25))),
        Transform::from_xyz(0.0, 2.0, 3.0).with_rotation(Quat::from_rotation_x(-12f32.to_radians())),
    ));

    let ground_half = Vec3::new(60.0, 0.5, 300.0);
    commands.spawn((
        surface_bundle(SurfaceKind::Ground),
        Collider::cuboid(ground_half.x, ground_half.y, ground_half.z),
        Friction::coefficient(0.4),
        Mesh3d(meshes.add(Cuboid::from_size(ground_half * 2.0))),
        MeshMaterial3d(materials.add(Color::srgb(0.3, 0.55, 0.3))),
        Transform::from_xyz(0.0, -0.5, 250.0),
    ));

    let trunk = meshes.add(Cylinder::new(0.6, 8.0));
    let bark = materials.add(Color::srgb(0.25, 0.4, 0.2));
    for (x, z) in TREE_ROWS {
        commands.spawn((
            surface_bundle(SurfaceKind::Tree),
            Collider::cylinder(4.0, 0.6),
            Mesh3d(trunk.clone()),
            MeshMaterial3d(bark.clone()),
            Transform::from_xyz(x, 4.0, z),
        ));
    }
    info!("[scene] World spawned");
}

pub fn spawn_demo_plane(
    mut commands: Commands,
    config: Res<FlightConfig>,
    track: Res<UpgradeTrack>,
) {
    spawn_plane(&mut commands, RESTING_POINT, &track, &config);
}

/// Give new parts a box mesh matching their collider.
pub fn attach_part_meshes_system(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    parts: Query<(Entity, &DetachablePart), Added<DetachablePart>>,
) {
    for (entity, part) in parts.iter() {
        let color = match part.kind {
            PartKind::Fuselage => Color::srgb(0.85, 0.85, 0.9),
            PartKind::LeftWing | PartKind::RightWing => Color::srgb(0.9, 0.3, 0.25),
            PartKind::Tail => Color::srgb(0.25, 0.45, 0.9),
            PartKind::Booster => Color::srgb(0.95, 0.75, 0.2),
        };
        commands.entity(entity).insert((
            Mesh3d(meshes.add(Cuboid::from_size(part.half_extents * 2.0))),
            MeshMaterial3d(materials.add(color)),
        ));
    }
}

pub fn attach_marker_mesh_system(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    markers: Query<Entity, Added<LandingMarker>>,
) {
    for entity in markers.iter() {
        commands.entity(entity).insert((
            Mesh3d(meshes.add(Cylinder::new(0.8, 0.1))),
            MeshMaterial3d(materials.add(Color::srgb(1.0, 0.9, 0.1))),
        ));
    }
}

// ── HUD ───────────────────────────────────────────────────────────────────────

#[derive(Component)]
pub struct HudReadout;

pub fn setup_hud(mut commands: Commands) {
    commands
        .spawn((
            Node {
                position_type: PositionType::Absolute,
                left: Val::Px(10.0),
                top: Val::Px(10.0),
                ..default()
            },
            HudReadout,
        ))
        .with_children(|parent| {
            parent.spawn((
                Text::new("0 km/h"),
                TextFont {
                    font_size: 18.0,
                    ..default()
                },
                TextColor(Color::srgb(0.95, 0.88, 0.45)),
            ));
        });
}

pub fn hud_readout_system(
    q_plane: Query<(&Transform, &Velocity, &DistanceTracker), With<Plane>>,
    bank: Res<CoinBank>,
    parent_query: Query<&Children, With<HudReadout>>,
    mut text_query: Query<&mut Text>,
) {
    let Ok((transform, velocity, tracker)) = q_plane.single() else {
        return;
    };
    let speed = speedometer_kmh(velocity.linvel, transform.rotation * Vec3::Z);
    let progress = progress_fraction(
        transform.translation.z,
        tracker.start_position.z,
        COURSE_END_Z,
    );
    for children in parent_query.iter() {
        for child in children.iter() {
            if let Ok(mut text) = text_query.get_mut(child) {
                *text = Text::new(format!(
                    "{speed:.0} km/h | {:.1} m | {:.0}% | {} coins",
                    tracker.max_z_distance,
                    progress * 100.0,
                    bank.0.get()
                ));
            }
        }
    }
}

/// R resets the run, U buys an upgrade click.
pub fn demo_keys_system(
    keys: Res<ButtonInput<KeyCode>>,
    mut resets: MessageWriter<ResetRun>,
    mut upgrades: MessageWriter<UpgradeRequest>,
) {
    if keys.just_pressed(KeyCode::KeyR) {
        resets.write(ResetRun);
    }
    if keys.just_pressed(KeyCode::KeyU) {
        upgrades.write(UpgradeRequest);
    }
}
