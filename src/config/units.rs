//! Unit types for physical quantities.
//!
//! Machine units are whatever the joint scale is expressed against
//! (millimetres for linear joints, degrees for rotary ones). The planner works
//! on raw `f32` internally; these types keep the configuration surface honest.

use core::ops::{Add, Sub};

use serde::Deserialize;

use crate::error::ConfigError;
use crate::MAX_CHANNELS;

/// Position or distance in machine units.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Deserialize)]
#[serde(transparent)]
pub struct Units(pub f32);

impl Units {
    /// Create a new Units value.
    #[inline]
    pub const fn new(value: f32) -> Self {
        Self(value)
    }

    /// Get the raw value.
    #[inline]
    pub const fn value(self) -> f32 {
        self.0
    }
}

impl Add for Units {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Units {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

/// Velocity in machine units per second. Sign carries direction where relevant.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Deserialize)]
#[serde(transparent)]
pub struct UnitsPerSec(pub f32);

impl UnitsPerSec {
    /// Create a new UnitsPerSec value.
    #[inline]
    pub const fn new(value: f32) -> Self {
        Self(value)
    }

    /// Get the raw value.
    #[inline]
    pub const fn value(self) -> f32 {
        self.0
    }
}

/// Acceleration in machine units per second squared.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Deserialize)]
#[serde(transparent)]
pub struct UnitsPerSecSquared(pub f32);

impl UnitsPerSecSquared {
    /// Create a new UnitsPerSecSquared value.
    #[inline]
    pub const fn new(value: f32) -> Self {
        Self(value)
    }

    /// Get the raw value.
    #[inline]
    pub const fn value(self) -> f32 {
        self.0
    }
}

/// Absolute stepper position in steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Steps(pub i32);

impl Steps {
    /// Create a new Steps value.
    #[inline]
    pub const fn new(value: i32) -> Self {
        Self(value)
    }

    /// Get the raw value.
    #[inline]
    pub const fn value(self) -> i32 {
        self.0
    }

    /// Convert to machine units with a signed scale (steps per unit).
    #[inline]
    pub fn to_units(self, scale: f32) -> Units {
        Units(self.0 as f32 / scale)
    }

    /// Nearest step for a position in machine units.
    #[inline]
    pub fn from_units(units: Units, scale: f32) -> Self {
        Self(libm::roundf(units.0 * scale) as i32)
    }
}

impl Add for Steps {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Steps {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

/// Step output channel index, validated against [`MAX_CHANNELS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StepperId(u8);

impl StepperId {
    /// Create a new StepperId with validation.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::StepperOutOfRange` if there is no such channel.
    pub fn new(value: u8) -> Result<Self, ConfigError> {
        if (value as usize) < MAX_CHANNELS {
            Ok(Self(value))
        } else {
            Err(ConfigError::StepperOutOfRange(value))
        }
    }

    /// Channel index.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Raw id.
    #[inline]
    pub const fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for StepperId {
    type Error = ConfigError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl<'de> Deserialize<'de> for StepperId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use core::fmt::Write;
        let value = u8::deserialize(deserializer)?;
        StepperId::new(value).map_err(|e| {
            let mut buf = heapless::String::<128>::new();
            let _ = write!(buf, "{}", e);
            serde::de::Error::custom(buf.as_str())
        })
    }
}
