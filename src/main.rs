use bevy::prelude::*;
use bevy::window::WindowResolution;
use bevy_rapier3d::prelude::*;

use skyfling::config::{self, FlightConfig};
use skyfling::plane::{FlightInputPlugin, FlightPlugin};
use skyfling::progress::{self, ProgressPlugin};
use skyfling::scene;

fn main() {
    App::new()
        .add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: "skyfling".into(),
                resolution: WindowResolution::new(1200, 680),
                ..Default::default()
            }),
            ..Default::default()
        }))
        .insert_resource(ClearColor(Color::srgb(0.55, 0.75, 0.95)))
        // Compiled defaults; load_flight_config overwrites them from
        // assets/flight.toml (if present) in the Startup schedule.
        .insert_resource(FlightConfig::default())
        // Rapier steps in FixedPostUpdate, right after the gameplay chain.
        .add_plugins(RapierPhysicsPlugin::<NoUserData>::default().in_fixed_schedule())
        .add_plugins((FlightPlugin, FlightInputPlugin, ProgressPlugin))
        .add_systems(
            Startup,
            (
                // Config first so every other startup system sees the final values.
                config::load_flight_config,
                scene::setup_world.after(config::load_flight_config),
                scene::spawn_demo_plane.after(progress::load_progress_system),
                scene::setup_hud,
            ),
        )
        .add_systems(
            Update,
            (
                scene::demo_keys_system,
                scene::camera_handoff_system,
                scene::camera_follow_system,
                scene::attach_part_meshes_system,
                scene::attach_marker_mesh_system,
                scene::hud_readout_system,
            ),
        )
        .run();
}
