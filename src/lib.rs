//! skyfling: drag-to-launch glider physics on Bevy + Rapier.
//!
//! The player pulls the plane back against a virtual rubber band, lets go,
//! and the plane rides a ramp into a simplified flight model until it lands
//! or crashes.  The distance flown becomes coins that unlock parts.
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`plane`] | Launch, ramp, flight, ground, damage, input and the Rapier bridge |
//! | [`progress`] | Coins, the upgrade track, HUD readouts |
//! | [`config`] | `FlightConfig` resource loaded from `assets/flight.toml` |
//! | [`constants`] | Compiled defaults for every tunable |
//! | [`error`] | `FlightError` and the `FlightResult` alias |
//! | [`timers`] | Bounded timers and tweens advanced on ticks |
//! | [`math`] | Angles, projections and rotations used by the flight model |
//! | [`scene`] | Demo world, follow camera and HUD for the binary |

pub mod config;
pub mod constants;
pub mod error;
pub mod math;
pub mod plane;
pub mod progress;
pub mod scene;
pub mod timers;
