//! Configuration module for motion-core.
//!
//! Immutable machine description (axes, joints, extruders, timing and planner
//! settings) loaded from TOML (with `std` feature) or built in code, plus the
//! runtime constraints derived from it.

mod joint;
mod limits;
mod machine;
mod mechanical;
pub mod units;
#[cfg(feature = "std")]
mod loader;
mod validation;

pub use joint::{AxisConfig, ExtruderConfig, ExtruderId, JointConfig, JointId};
pub use limits::{LimitPolicy, TravelLimits};
pub use machine::{MachineConfig, PlannerConfig, TimingConfig};
pub use mechanical::{
    ChannelConstraints, HomingBounds, MachineConstraints, HOMING_LATCH_TRAVEL_MAX,
    HOMING_SEARCH_TRAVEL_FACTOR,
};
pub use validation::validate_config;

#[cfg(feature = "std")]
pub use loader::{load_config, parse_config};

// Re-export unit types at config level
pub use units::{StepperId, Steps, Units, UnitsPerSec, UnitsPerSecSquared};
