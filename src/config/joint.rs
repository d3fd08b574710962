//! Axis, joint and extruder configuration from TOML.

use heapless::String;
use serde::Deserialize;

use super::limits::TravelLimits;
use super::units::{StepperId, Units, UnitsPerSec, UnitsPerSecSquared};

/// Handle of a joint in [`crate::config::MachineConfig::joints`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct JointId(pub u8);

impl JointId {
    /// Table index.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle of an extruder in [`crate::config::MachineConfig::extruders`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ExtruderId(pub u8);

impl ExtruderId {
    /// Table index.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A virtual (work space) axis.
#[derive(Debug, Clone, Deserialize)]
pub struct AxisConfig {
    /// Axis letter or name (max 16 chars).
    pub name: String<16>,

    /// Minimum commanded position.
    pub min_limit: Units,

    /// Maximum commanded position.
    pub max_limit: Units,
}

impl AxisConfig {
    /// Travel interval of this axis.
    pub fn limits(&self) -> TravelLimits {
        TravelLimits::new(self.min_limit, self.max_limit)
    }
}

/// A physical stepper-driven joint.
#[derive(Debug, Clone, Deserialize)]
pub struct JointConfig {
    /// Human-readable name (max 16 chars).
    pub name: String<16>,

    /// Step output channel driving this joint.
    pub stepper_id: StepperId,

    /// Endstop input at the minimum end, if fitted.
    #[serde(default)]
    pub min_endstop_id: Option<u8>,

    /// Endstop input at the maximum end, if fitted.
    #[serde(default)]
    pub max_endstop_id: Option<u8>,

    /// Minimum joint position.
    pub min_limit: Units,

    /// Maximum joint position.
    pub max_limit: Units,

    /// Maximum joint speed.
    pub max_velocity: UnitsPerSec,

    /// Maximum joint acceleration.
    pub max_acceleration: UnitsPerSecSquared,

    /// Steps per machine unit. A negative scale flips the direction signal.
    pub scale: f32,

    /// Homing search velocity; its sign selects the endstop searched for.
    #[serde(default)]
    pub home_search_vel: UnitsPerSec,

    /// Homing latch velocity.
    #[serde(default)]
    pub home_latch_vel: UnitsPerSec,

    /// Homing group. Lower groups home first; `None` means never homed.
    #[serde(default)]
    pub home_sequence: Option<u8>,
}

impl JointConfig {
    /// Travel interval of this joint.
    pub fn limits(&self) -> TravelLimits {
        TravelLimits::new(self.min_limit, self.max_limit)
    }

    /// Whether homing searches toward the minimum endstop.
    pub fn homes_to_min(&self) -> bool {
        self.home_search_vel.0 < 0.0
    }

    /// Endstop met at the end of the homing search.
    pub fn search_endstop(&self) -> Option<u8> {
        if self.homes_to_min() {
            self.min_endstop_id
        } else {
            self.max_endstop_id
        }
    }

    /// Position assigned to the joint when its homing switch triggers.
    pub fn home_position(&self) -> f32 {
        if self.homes_to_min() {
            self.min_limit.0
        } else {
            self.max_limit.0
        }
    }

    /// Whether the latch approach moves in the same direction as the search.
    ///
    /// In that case the joint has to back off the switch first.
    pub fn latch_needs_backoff(&self) -> bool {
        (self.home_latch_vel.0 < 0.0) == (self.home_search_vel.0 < 0.0)
    }
}

/// A filament extruder. Moves with the joints but has no kinematics.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtruderConfig {
    /// Human-readable name (max 16 chars).
    pub name: String<16>,

    /// Step output channel driving this extruder.
    pub stepper_id: StepperId,

    /// Maximum extrusion speed.
    pub max_velocity: UnitsPerSec,

    /// Maximum extrusion acceleration.
    pub max_acceleration: UnitsPerSecSquared,

    /// Steps per machine unit of filament.
    pub scale: f32,
}
