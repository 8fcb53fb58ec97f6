//! Error types for configuration and progression.
//!
//! Gameplay systems never fail a tick: missing references and degenerate
//! geometry are handled in place.  The errors here cover the edges where
//! data comes from outside the simulation (TOML files, save files) and are
//! logged by the caller instead of aborting.

use thiserror::Error;

/// Top-level error enum for skyfling.
#[derive(Debug, Error)]
pub enum FlightError {
    /// A tunable is outside the range the flight model is stable in.
    #[error("tunable '{name}' = {value} is outside safe range {safe_range}")]
    UnsafeTunable {
        name: &'static str,
        value: f32,
        safe_range: &'static str,
    },

    /// A file could not be read or written.
    #[error("failed to access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize progress: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Convenience alias: a `Result` using `FlightError` as the error type.
pub type FlightResult<T> = Result<T, FlightError>;

// ── Validation helpers ────────────────────────────────────────────────────────

/// Rejects values that are not strictly positive.
pub fn validate_positive(name: &'static str, value: f32) -> FlightResult<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(FlightError::UnsafeTunable {
            name,
            value,
            safe_range: "(0.0, ∞)",
        })
    }
}

/// Rejects values outside `[0, 1]`.
///
/// Used for per-step multipliers such as `ground_drag_factor`, where a value
/// above 1 would add energy every physics step.
pub fn validate_unit_interval(name: &'static str, value: f32) -> FlightResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(FlightError::UnsafeTunable {
            name,
            value,
            safe_range: "[0.0, 1.0]",
        })
    }
}
