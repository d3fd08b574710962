//! Travel limit configuration and types.

use serde::Deserialize;

use super::units::Units;

/// Policy for moves whose target lies outside an axis' travel limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LimitPolicy {
    /// Drop moves that would exceed limits.
    #[default]
    Reject,
    /// Clamp target to nearest limit.
    Clamp,
}

/// Closed travel interval `[min, max]` in machine units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TravelLimits {
    /// Minimum allowed position.
    pub min: Units,
    /// Maximum allowed position.
    pub max: Units,
}

impl TravelLimits {
    /// Create new travel limits.
    pub fn new(min: Units, max: Units) -> Self {
        Self { min, max }
    }

    /// Check if limits are valid (min < max).
    pub fn is_valid(&self) -> bool {
        self.min.0 < self.max.0
    }

    /// Length of the travel interval.
    pub fn range(&self) -> f32 {
        self.max.0 - self.min.0
    }

    /// Check if a position is within limits.
    pub fn contains(&self, position: f32) -> bool {
        position >= self.min.0 && position <= self.max.0
    }

    /// Apply a limit policy to a target position.
    ///
    /// Returns `Some(position)` if valid or clamped, `None` if rejected.
    pub fn apply(&self, target: f32, policy: LimitPolicy) -> Option<f32> {
        if self.contains(target) {
            Some(target)
        } else {
            match policy {
                LimitPolicy::Reject => None,
                LimitPolicy::Clamp => Some(target.clamp(self.min.0, self.max.0)),
            }
        }
    }
}
