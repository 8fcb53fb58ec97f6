//! Input adapters.
//!
//! ## Pipeline (every `Update` frame)
//!
//! 1. [`intent_clear_system`] resets [`FlightIntent`].
//! 2. [`keyboard_to_intent_system`], [`gamepad_to_intent_system`] and
//!    [`touch_joystick_to_intent_system`] each offer an axis pair; per axis the
//!    strongest source wins.
//! 3. [`pointer_sample_system`] turns the mouse or first touch into a world ray
//!    in [`PointerIntent`]; the physics bridge then marks whether it hit the plane.
//!
//! The flight model only ever reads [`FlightIntent`], so tests skip this module
//! and write the resource directly.

use super::state::{BoostRequest, FlightIntent, PointerIntent, TouchJoystick};
use super::FlightSet;
use crate::config::FlightConfig;
use bevy::input::gamepad::{GamepadAxis, GamepadButton, GamepadConnection, GamepadConnectionEvent};
use bevy::input::touch::Touches;
use bevy::prelude::*;
use bevy::window::PrimaryWindow;

/// Device input for the plane.  Needs Bevy's input plugin (part of
/// `DefaultPlugins`).
pub struct FlightInputPlugin;

impl Plugin for FlightInputPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<PreferredGamepad>().add_systems(
            Update,
            (
                intent_clear_system,
                gamepad_connection_system,
                keyboard_to_intent_system,
                gamepad_to_intent_system,
                touch_joystick_to_intent_system,
                pointer_sample_system,
            )
                .chain()
                .in_set(FlightSet::Input),
        );
    }
}

/// The gamepad whose stick steers the plane; the most recently connected one.
#[derive(Resource, Default, Debug, Clone, Copy)]
pub struct PreferredGamepad(pub Option<Entity>);

// ── Shaping ───────────────────────────────────────────────────────────────────

/// Zero an axis inside the deadzone.
pub fn apply_deadzone(value: f32, deadzone: f32) -> f32 {
    if value.abs() < deadzone {
        0.0
    } else {
        value
    }
}

/// Deadzone, sensitivity and vertical inversion for a stick-style source.
pub fn shape_stick(raw: Vec2, config: &FlightConfig) -> FlightIntent {
    let y = if config.invert_joystick_vertical { -raw.y } else { raw.y };
    FlightIntent {
        horizontal: (apply_deadzone(raw.x, config.joystick_deadzone)
            * config.horizontal_input_sensitivity)
            .clamp(-1.0, 1.0),
        vertical: (apply_deadzone(y, config.joystick_deadzone) * config.vertical_input_sensitivity)
            .clamp(-1.0, 1.0),
    }
}

/// Fold another source into `intent`, keeping the larger magnitude per axis.
pub fn merge_intent(intent: &mut FlightIntent, other: FlightIntent) {
    if other.horizontal.abs() > intent.horizontal.abs() {
        intent.horizontal = other.horizontal;
    }
    if other.vertical.abs() > intent.vertical.abs() {
        intent.vertical = other.vertical;
    }
}

fn key_axis(keys: &ButtonInput<KeyCode>, negative: [KeyCode; 2], positive: [KeyCode; 2]) -> f32 {
    let mut axis = 0.0;
    if keys.any_pressed(negative) {
        axis -= 1.0;
    }
    if keys.any_pressed(positive) {
        axis += 1.0;
    }
    axis
}

// ── Systems ───────────────────────────────────────────────────────────────────

pub fn intent_clear_system(mut intent: ResMut<FlightIntent>) {
    *intent = FlightIntent::default();
}

/// A/D or ←/→ steer; W/↑ pushes the nose down, S/↓ pulls it up.  Space boosts.
pub fn keyboard_to_intent_system(
    keys: Res<ButtonInput<KeyCode>>,
    config: Res<FlightConfig>,
    mut intent: ResMut<FlightIntent>,
    mut boost: MessageWriter<BoostRequest>,
) {
    if keys.just_pressed(KeyCode::Space) {
        boost.write(BoostRequest);
    }
    if !config.use_keyboard_input {
        return;
    }
    let keyboard = FlightIntent {
        horizontal: key_axis(&keys, [KeyCode::KeyA, KeyCode::ArrowLeft], [KeyCode::KeyD, KeyCode::ArrowRight])
            * config.horizontal_input_sensitivity,
        vertical: key_axis(&keys, [KeyCode::KeyS, KeyCode::ArrowDown], [KeyCode::KeyW, KeyCode::ArrowUp])
            * config.vertical_input_sensitivity,
    };
    merge_intent(&mut intent, keyboard);
}

/// Track gamepad connect / disconnect and update [`PreferredGamepad`].
pub fn gamepad_connection_system(
    mut events: MessageReader<GamepadConnectionEvent>,
    mut preferred: ResMut<PreferredGamepad>,
) {
    for event in events.read() {
        match &event.connection {
            GamepadConnection::Connected { .. } => {
                preferred.0 = Some(event.gamepad);
                info!("[gamepad] Gamepad {:?} connected (now preferred)", event.gamepad);
            }
            GamepadConnection::Disconnected => {
                info!("[gamepad] Gamepad {:?} disconnected", event.gamepad);
                if preferred.0 == Some(event.gamepad) {
                    preferred.0 = None;
                }
            }
        }
    }
}

/// Left stick steers; South (A on Xbox) boosts.
pub fn gamepad_to_intent_system(
    preferred: Res<PreferredGamepad>,
    gamepads: Query<&Gamepad>,
    config: Res<FlightConfig>,
    mut intent: ResMut<FlightIntent>,
    mut boost: MessageWriter<BoostRequest>,
) {
    let Some(gamepad) = preferred.0.and_then(|entity| gamepads.get(entity).ok()) else {
        return;
    };
    if gamepad.just_pressed(GamepadButton::South) {
        boost.write(BoostRequest);
    }
    if !config.use_joystick_input {
        return;
    }
    let stick = Vec2::new(
        gamepad.get(GamepadAxis::LeftStickX).unwrap_or(0.0),
        gamepad.get(GamepadAxis::LeftStickY).unwrap_or(0.0),
    );
    merge_intent(&mut intent, shape_stick(stick, &config));
}

/// Read the on-screen joystick value written by the UI layer.
pub fn touch_joystick_to_intent_system(
    joystick: Res<TouchJoystick>,
    config: Res<FlightConfig>,
    mut intent: ResMut<FlightIntent>,
) {
    if !config.use_joystick_input {
        return;
    }
    merge_intent(&mut intent, shape_stick(joystick.0, &config));
}

/// Sample the mouse (or the first touch) into a camera ray.
///
/// `picked_plane` is cleared here and set again by the physics bridge.
pub fn pointer_sample_system(
    buttons: Res<ButtonInput<MouseButton>>,
    touches: Option<Res<Touches>>,
    windows: Query<&Window, With<PrimaryWindow>>,
    cameras: Query<(&Camera, &GlobalTransform)>,
    mut pointer: ResMut<PointerIntent>,
) {
    let touch_position = touches.as_deref().and_then(Touches::first_pressed_position);
    let cursor = windows
        .single()
        .ok()
        .and_then(Window::cursor_position)
        .or(touch_position);

    let touch_down = touch_position.is_some();
    let touch_just_pressed = touches.as_deref().is_some_and(Touches::any_just_pressed);
    let touch_just_released = touches.as_deref().is_some_and(Touches::any_just_released);

    let ray = cursor.and_then(|position| {
        cameras
            .iter()
            .find(|(camera, _)| camera.is_active)
            .and_then(|(camera, transform)| camera.viewport_to_world(transform, position).ok())
    });

    *pointer = PointerIntent {
        ray,
        just_pressed: buttons.just_pressed(MouseButton::Left) || touch_just_pressed,
        pressed: buttons.pressed(MouseButton::Left) || touch_down,
        just_released: buttons.just_released(MouseButton::Left) || touch_just_released,
        picked_plane: false,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadzone_zeroes_small_values() {
        assert_eq!(apply_deadzone(0.04, 0.05), 0.0);
        assert_eq!(apply_deadzone(-0.3, 0.05), -0.3);
    }

    #[test]
    fn stick_vertical_is_inverted_by_default() {
        let config = FlightConfig::default();
        assert!(config.invert_joystick_vertical);
        let intent = shape_stick(Vec2::new(0.5, 1.0), &config);
        assert_eq!(intent.horizontal, 0.5);
        assert_eq!(intent.vertical, -1.0, "stick up pulls the nose up");

        let straight = FlightConfig {
            invert_joystick_vertical: false,
            ..config
        };
        assert_eq!(shape_stick(Vec2::new(0.0, 1.0), &straight).vertical, 1.0);
    }

    #[test]
    fn stick_output_is_clamped_after_sensitivity() {
        let config = FlightConfig {
            horizontal_input_sensitivity: 3.0,
            ..FlightConfig::default()
        };
        assert_eq!(shape_stick(Vec2::new(0.8, 0.0), &config).horizontal, 1.0);
    }

    #[test]
    fn merge_keeps_strongest_axis() {
        let mut intent = FlightIntent {
            horizontal: 0.3,
            vertical: -1.0,
        };
        merge_intent(
            &mut intent,
            FlightIntent {
                horizontal: -0.8,
                vertical: 0.2,
            },
        );
        assert_eq!(intent, FlightIntent { horizontal: -0.8, vertical: -1.0 });
    }

    // ── helpers ───────────────────────────────────────────────────────────────

    fn build_keyboard_app(config: FlightConfig) -> App {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        app.add_message::<BoostRequest>();
        app.insert_resource(config);
        app.insert_resource(FlightIntent::default());
        app.insert_resource(ButtonInput::<KeyCode>::default());
        app.add_systems(Update, (intent_clear_system, keyboard_to_intent_system).chain());
        app
    }

    fn press(app: &mut App, key: KeyCode) {
        app.world_mut().resource_mut::<ButtonInput<KeyCode>>().press(key);
    }

    #[test]
    fn keyboard_maps_to_axes() {
        let mut app = build_keyboard_app(FlightConfig::default());
        press(&mut app, KeyCode::KeyD);
        press(&mut app, KeyCode::ArrowUp);
        app.update();
        let intent = *app.world().resource::<FlightIntent>();
        assert_eq!(intent, FlightIntent { horizontal: 1.0, vertical: 1.0 });
    }

    #[test]
    fn opposite_keys_cancel() {
        let mut app = build_keyboard_app(FlightConfig::default());
        press(&mut app, KeyCode::KeyA);
        press(&mut app, KeyCode::KeyD);
        app.update();
        assert_eq!(app.world().resource::<FlightIntent>().horizontal, 0.0);
    }

    #[test]
    fn keyboard_can_be_disabled() {
        let mut app = build_keyboard_app(FlightConfig {
            use_keyboard_input: false,
            ..FlightConfig::default()
        });
        press(&mut app, KeyCode::KeyD);
        app.update();
        assert_eq!(*app.world().resource::<FlightIntent>(), FlightIntent::default());
    }

    #[test]
    fn intent_is_cleared_each_frame() {
        let mut app = build_keyboard_app(FlightConfig::default());
        press(&mut app, KeyCode::KeyW);
        app.update();
        app.world_mut()
            .resource_mut::<ButtonInput<KeyCode>>()
            .release(KeyCode::KeyW);
        app.update();
        assert_eq!(app.world().resource::<FlightIntent>().vertical, 0.0);
    }
}
