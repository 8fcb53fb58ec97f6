//! Rapier bridge: everything that talks to the physics context.
//!
//! The gameplay modules never touch Rapier queries directly.  This module
//! translates in both directions:
//!
//! - `CollisionEvent` → [`PlaneCollision`] (Started / Persisting / Stopped),
//!   with contact points, surface normals and the pre-impact relative speed.
//! - Downward ray → [`GroundProbe`] on the plane.
//! - Pointer ray → `PointerIntent::picked_plane`.
//! - [`MarkerRequest`] → ground ray → [`LandingMarker`] + [`MarkerPlaced`].
//!
//! ## Aggregation
//!
//! The plane is a compound body; every part has its own collider.  A surface
//! is "touched" while at least one attached part touches it, so Started fires
//! for the first part and Stopped for the last.  Parts that detach are pruned
//! from the ledger, which may end a contact.

use super::state::{
    ContactPhase, ContactSample, GroundProbe, LandingMarker, MarkerPlaced, MarkerRequest, Plane,
    PlaneCollision, PointerIntent, PreStepVelocity, SurfaceHit, SurfaceKind,
};
use super::{PLANE_GROUP, WORLD_GROUP};
use crate::config::FlightConfig;
use bevy::prelude::*;
use bevy_rapier3d::prelude::*;
use std::collections::{HashMap, HashSet};

/// The probe reaches this many `ground_check_distance`s below the plane.
const PROBE_REACH_FACTOR: f32 = 4.0;

/// Pointer rays stop after this distance.
const POINTER_RAY_REACH: f32 = 1000.0;

// ── Contact ledger ────────────────────────────────────────────────────────────

/// Which plane colliders currently touch which surface.
#[derive(Resource, Default, Debug)]
pub struct ContactLedger {
    touching: HashMap<Entity, HashSet<Entity>>,
}

impl ContactLedger {
    /// Record a contact; `true` when it is the surface's first.
    pub fn begin(&mut self, surface: Entity, collider: Entity) -> bool {
        let colliders = self.touching.entry(surface).or_default();
        let first = colliders.is_empty();
        colliders.insert(collider);
        first
    }

    /// Drop a contact; `true` when it was the surface's last.
    pub fn end(&mut self, surface: Entity, collider: Entity) -> bool {
        let Some(colliders) = self.touching.get_mut(&surface) else {
            return false;
        };
        if !colliders.remove(&collider) {
            return false;
        }
        if colliders.is_empty() {
            self.touching.remove(&surface);
            return true;
        }
        false
    }

    pub fn is_surface(&self, entity: Entity) -> bool {
        self.touching.contains_key(&entity)
    }

    /// Remove colliders that no longer belong to the plane.
    ///
    /// Returns the surfaces left with no contact.
    pub fn prune(&mut self, mut still_attached: impl FnMut(Entity) -> bool) -> Vec<Entity> {
        let mut emptied = Vec::new();
        self.touching.retain(|surface, colliders| {
            colliders.retain(|collider| still_attached(*collider));
            if colliders.is_empty() {
                emptied.push(*surface);
                false
            } else {
                true
            }
        });
        emptied
    }

    /// Surfaces in contact, with one collider to sample contact points from.
    pub fn surfaces(&self) -> impl Iterator<Item = (Entity, Entity)> + '_ {
        self.touching
            .iter()
            .filter_map(|(surface, colliders)| colliders.iter().next().map(|c| (*surface, *c)))
    }

    pub fn clear(&mut self) {
        self.touching.clear();
    }
}

/// The plane a collider belongs to: the plane itself, or an attached part's parent.
pub fn owning_plane(
    collider: Entity,
    is_plane: impl Fn(Entity) -> bool,
    parent_of: impl Fn(Entity) -> Option<Entity>,
) -> Option<Entity> {
    if is_plane(collider) {
        return Some(collider);
    }
    parent_of(collider).filter(|parent| is_plane(*parent))
}

/// Contact samples between a plane collider and a surface.
///
/// Normals point from the surface toward the plane.
fn sample_contacts(context: &RapierContext, collider: Entity, surface: Entity) -> Vec<ContactSample> {
    let Some(pair) = context.contact_pair(collider, surface) else {
        return Vec::new();
    };
    let flip = pair.collider1() != Some(surface);
    let mut samples = Vec::new();
    for manifold in pair.manifolds() {
        let normal = if flip { -manifold.normal() } else { manifold.normal() };
        for contact in manifold.solver_contacts() {
            samples.push(ContactSample {
                point: contact.point(),
                normal,
            });
        }
    }
    samples
}

// ── Systems ───────────────────────────────────────────────────────────────────

/// Translate Rapier collision events into [`PlaneCollision`] messages.
#[allow(clippy::too_many_arguments, clippy::type_complexity)]
pub fn collision_bridge_system(
    rapier_context: ReadRapierContext,
    mut collision_events: MessageReader<CollisionEvent>,
    mut ledger: ResMut<ContactLedger>,
    planes: Query<(&PreStepVelocity, &Transform), With<Plane>>,
    parents: Query<&ChildOf>,
    surfaces: Query<(&SurfaceKind, &GlobalTransform, Option<&Velocity>)>,
    mut out: MessageWriter<PlaneCollision>,
) {
    let context = rapier_context.single().ok();
    let owner = |collider: Entity| {
        owning_plane(
            collider,
            |e| planes.contains(e),
            |e| parents.get(e).ok().map(ChildOf::parent),
        )
    };
    let relative_speed = |plane: Option<Entity>, surface_vel: Option<&Velocity>| {
        let plane_vel = plane
            .and_then(|p| planes.get(p).ok())
            .map(|(v, _)| v.0)
            .unwrap_or(Vec3::ZERO);
        let other_vel = surface_vel.map(|v| v.linvel).unwrap_or(Vec3::ZERO);
        (plane_vel - other_vel).length()
    };

    let mut started_now: HashSet<Entity> = HashSet::new();

    for event in collision_events.read() {
        match event {
            CollisionEvent::Started(e1, e2, _) => {
                let (collider, surface) = if surfaces.contains(*e2) && owner(*e1).is_some() {
                    (*e1, *e2)
                } else if surfaces.contains(*e1) && owner(*e2).is_some() {
                    (*e2, *e1)
                } else {
                    continue;
                };
                if !ledger.begin(surface, collider) {
                    continue;
                }
                let Ok((kind, surface_gt, surface_vel)) = surfaces.get(surface) else {
                    continue;
                };
                let contacts = context
                    .as_ref()
                    .map(|ctx| sample_contacts(ctx, collider, surface))
                    .unwrap_or_default();
                started_now.insert(surface);
                out.write(PlaneCollision {
                    phase: ContactPhase::Started,
                    surface: *kind,
                    other: surface,
                    surface_up: *surface_gt.up(),
                    contacts,
                    relative_speed: relative_speed(owner(collider), surface_vel),
                });
            }
            CollisionEvent::Stopped(e1, e2, _) => {
                let (collider, surface) = if ledger.is_surface(*e2) {
                    (*e1, *e2)
                } else if ledger.is_surface(*e1) {
                    (*e2, *e1)
                } else {
                    continue;
                };
                if !ledger.end(surface, collider) {
                    continue;
                }
                if let Some(stopped) = stopped_message(surface, &surfaces) {
                    out.write(stopped);
                }
            }
        }
    }

    for surface in ledger.prune(|collider| owner(collider).is_some()) {
        if let Some(stopped) = stopped_message(surface, &surfaces) {
            out.write(stopped);
        }
    }

    if planes.is_empty() {
        return;
    }
    for (surface, collider) in ledger.surfaces() {
        if started_now.contains(&surface) {
            continue;
        }
        let Ok((kind, surface_gt, surface_vel)) = surfaces.get(surface) else {
            continue;
        };
        let contacts = context
            .as_ref()
            .map(|ctx| sample_contacts(ctx, collider, surface))
            .unwrap_or_default();
        out.write(PlaneCollision {
            phase: ContactPhase::Persisting,
            surface: *kind,
            other: surface,
            surface_up: *surface_gt.up(),
            contacts,
            relative_speed: relative_speed(owner(collider), surface_vel),
        });
    }
}

fn stopped_message(
    surface: Entity,
    surfaces: &Query<(&SurfaceKind, &GlobalTransform, Option<&Velocity>)>,
) -> Option<PlaneCollision> {
    let (kind, surface_gt, _) = surfaces.get(surface).ok()?;
    Some(PlaneCollision {
        phase: ContactPhase::Stopped,
        surface: *kind,
        other: surface,
        surface_up: *surface_gt.up(),
        contacts: Vec::new(),
        relative_speed: 0.0,
    })
}

/// Cast the downward ground probe from the plane's centre.
pub fn ground_probe_system(
    rapier_context: ReadRapierContext,
    config: Res<FlightConfig>,
    surfaces: Query<&SurfaceKind>,
    mut q: Query<(Entity, &Transform, &mut GroundProbe), With<Plane>>,
) {
    let Ok(context) = rapier_context.single() else {
        return;
    };
    let Ok((plane, transform, mut probe)) = q.single_mut() else {
        return;
    };
    let is_ground = |e: Entity| matches!(surfaces.get(e), Ok(SurfaceKind::Ground));
    let filter = QueryFilter::new()
        .exclude_rigid_body(plane)
        .groups(CollisionGroups::new(PLANE_GROUP, WORLD_GROUP))
        .predicate(&is_ground);
    probe.hit = context
        .cast_ray_and_get_normal(
            transform.translation,
            Vec3::NEG_Y,
            config.ground_check_distance * PROBE_REACH_FACTOR,
            true,
            filter,
        )
        .map(|(_, hit)| SurfaceHit {
            point: hit.point,
            normal: hit.normal,
            distance: hit.time_of_impact,
        });
}

/// Mark the pointer as picking the plane when its press ray hits a plane collider.
pub fn pointer_pick_system(
    rapier_context: ReadRapierContext,
    planes: Query<(), With<Plane>>,
    parents: Query<&ChildOf>,
    mut pointer: ResMut<PointerIntent>,
) {
    if !pointer.just_pressed {
        return;
    }
    let Some(ray) = pointer.ray else {
        return;
    };
    let Ok(context) = rapier_context.single() else {
        return;
    };
    let filter = QueryFilter::new().groups(CollisionGroups::new(Group::ALL, PLANE_GROUP));
    let hit = context.cast_ray(ray.origin, *ray.direction, POINTER_RAY_REACH, true, filter);
    pointer.picked_plane = hit
        .and_then(|(entity, _)| {
            owning_plane(
                entity,
                |e| planes.contains(e),
                |e| parents.get(e).ok().map(ChildOf::parent),
            )
        })
        .is_some();
}

/// Remember the velocity the plane carries into the next physics step.
pub fn pre_step_velocity_system(mut q: Query<(&Velocity, &mut PreStepVelocity), With<Plane>>) {
    for (velocity, mut pre) in q.iter_mut() {
        pre.0 = velocity.linvel;
    }
}

/// Resolve marker requests against the ground and spawn the landing marker.
///
/// Without a physics context (or with nothing below) the marker drops to the
/// request's fallback position.
pub fn marker_resolution_system(
    mut commands: Commands,
    rapier_context: ReadRapierContext,
    config: Res<FlightConfig>,
    surfaces: Query<&SurfaceKind>,
    mut requests: MessageReader<MarkerRequest>,
    mut placed: MessageWriter<MarkerPlaced>,
) {
    let context = rapier_context.single().ok();
    let is_ground = |e: Entity| matches!(surfaces.get(e), Ok(SurfaceKind::Ground));

    for request in requests.read() {
        let (origin, reach) = super::ground::marker_ray(request, &config);
        let hit = context.as_ref().and_then(|ctx| {
            let filter = QueryFilter::new()
                .groups(CollisionGroups::new(PLANE_GROUP, WORLD_GROUP))
                .predicate(&is_ground);
            ctx.cast_ray_and_get_normal(origin, Vec3::NEG_Y, reach, true, filter)
                .map(|(_, hit)| SurfaceHit {
                    point: hit.point,
                    normal: hit.normal,
                    distance: hit.time_of_impact,
                })
        });
        let pose = super::ground::marker_pose(request, hit, &config);

        commands.spawn((
            LandingMarker {
                distance: request.distance,
            },
            Transform::from_translation(pose.position).with_rotation(pose.rotation),
            Visibility::default(),
        ));
        placed.write(MarkerPlaced {
            position: pose.position,
            normal: pose.normal,
            distance: request.distance,
        });
        info!(
            "[marker] Landing marker at {:?} ({:.1} units)",
            pose.position, request.distance
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plane::test_support::{collect_messages, Collected};

    fn entities(world: &mut World, n: usize) -> Vec<Entity> {
        (0..n).map(|_| world.spawn_empty().id()).collect()
    }

    // ── ledger ────────────────────────────────────────────────────────────────

    #[test]
    fn ledger_reports_first_and_last_contact() {
        let mut world = World::new();
        let e = entities(&mut world, 3);
        let (surface, wing, tail) = (e[0], e[1], e[2]);
        let mut ledger = ContactLedger::default();

        assert!(ledger.begin(surface, wing));
        assert!(!ledger.begin(surface, tail), "second part is not a new contact");
        assert!(!ledger.end(surface, wing));
        assert!(ledger.end(surface, tail), "last part leaving ends the contact");
        assert!(!ledger.is_surface(surface));
        assert!(!ledger.end(surface, tail), "double stop is ignored");
    }

    #[test]
    fn ledger_prunes_detached_parts() {
        let mut world = World::new();
        let e = entities(&mut world, 4);
        let (ground, ramp, wing, fuselage) = (e[0], e[1], e[2], e[3]);
        let mut ledger = ContactLedger::default();
        ledger.begin(ground, wing);
        ledger.begin(ramp, wing);
        ledger.begin(ramp, fuselage);

        let emptied = ledger.prune(|collider| collider != wing);
        assert_eq!(emptied, vec![ground]);
        assert!(ledger.is_surface(ramp));
        assert_eq!(ledger.surfaces().collect::<Vec<_>>(), vec![(ramp, fuselage)]);
    }

    #[test]
    fn owner_is_plane_or_parent_plane() {
        let mut world = World::new();
        let e = entities(&mut world, 4);
        let (plane, part, debris, tree) = (e[0], e[1], e[2], e[3]);
        let is_plane = |x: Entity| x == plane;
        let parent_of = |x: Entity| (x == part).then_some(plane);

        assert_eq!(owning_plane(plane, is_plane, parent_of), Some(plane));
        assert_eq!(owning_plane(part, is_plane, parent_of), Some(plane));
        assert_eq!(owning_plane(debris, is_plane, parent_of), None);
        assert_eq!(owning_plane(tree, is_plane, parent_of), None);
    }

    // ── systems ───────────────────────────────────────────────────────────────

    #[test]
    fn pre_step_velocity_tracks_plane() {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        app.add_systems(Update, pre_step_velocity_system);
        let plane = app
            .world_mut()
            .spawn((Plane, Velocity::linear(Vec3::new(0.0, -3.0, 9.0)), PreStepVelocity::default()))
            .id();
        app.update();
        assert_eq!(
            app.world().get::<PreStepVelocity>(plane).unwrap().0,
            Vec3::new(0.0, -3.0, 9.0)
        );
    }

    #[test]
    fn marker_falls_back_without_physics() {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        app.insert_resource(FlightConfig::default());
        app.add_message::<MarkerRequest>();
        app.add_message::<MarkerPlaced>();
        app.init_resource::<Collected<MarkerPlaced>>();
        app.add_systems(
            Update,
            (marker_resolution_system, collect_messages::<MarkerPlaced>).chain(),
        );

        app.world_mut().write_message(MarkerRequest {
            origin: Vec3::new(0.0, 1.0, 42.0),
            fallback: Vec3::new(0.0, 1.0, 40.0),
            distance: 40.0,
        });
        app.update();

        let placed = &app.world().resource::<Collected<MarkerPlaced>>().0;
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].position, Vec3::new(0.0, 1.5, 40.0));
        assert_eq!(placed[0].distance, 40.0);

        let world = app.world_mut();
        let mut markers = world.query::<(&LandingMarker, &Transform)>();
        let (marker, transform) = markers.single(world).unwrap();
        assert_eq!(marker.distance, 40.0);
        assert_eq!(transform.translation, Vec3::new(0.0, 1.5, 40.0));
    }
}
