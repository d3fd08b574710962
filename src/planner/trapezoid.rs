//! Trapezoidal velocity profile of a single move.
//!
//! A move accelerates from its entry speed toward nominal speed, cruises,
//! then decelerates to its exit speed. Moves too short to reach nominal speed
//! get a triangle: acceleration straight into deceleration.

use libm::sqrtf;

use super::block::PositionalBlock;

/// Current phase along a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MotionPhase {
    /// Speeding up toward nominal speed.
    Accelerating,
    /// Moving at nominal speed.
    Cruising,
    /// Slowing down toward exit speed.
    Decelerating,
    /// Move complete.
    Complete,
}

/// Distances of the three trapezoid segments.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trapezoid {
    /// Length of the acceleration ramp.
    pub accel_distance: f32,
    /// Length of the cruise segment.
    pub plateau_distance: f32,
    /// Distance after which deceleration starts.
    pub decelerate_after: f32,
}

impl Trapezoid {
    /// Compute the profile of a move of length `distance`.
    pub fn compute(entry: f32, nominal: f32, exit: f32, distance: f32, acc: f32) -> Self {
        if acc <= 0.0 {
            return Self {
                accel_distance: 0.0,
                plateau_distance: 0.0,
                decelerate_after: 0.0,
            };
        }

        let nominal_sq = nominal * nominal;
        let accel_distance = (nominal_sq - entry * entry) / (2.0 * acc);
        let decel_distance = (nominal_sq - exit * exit) / (2.0 * acc);

        if accel_distance + decel_distance <= distance {
            let plateau_distance = distance - accel_distance - decel_distance;
            Self {
                accel_distance,
                plateau_distance,
                decelerate_after: accel_distance + plateau_distance,
            }
        } else {
            // Never reaches nominal speed: meet the two ramps in the middle
            let accel_distance = ((2.0 * acc * distance - entry * entry + exit * exit)
                / (4.0 * acc))
                .clamp(0.0, distance);
            Self {
                accel_distance,
                plateau_distance: 0.0,
                decelerate_after: accel_distance,
            }
        }
    }

    /// Recompute the profile of `block` for a new entry speed and mark it valid.
    pub fn apply(block: &mut PositionalBlock, entry: f32) {
        let profile = Self::compute(
            entry,
            block.nominal_speed,
            block.exit_speed,
            block.distance,
            block.acc,
        );
        block.entry_speed = entry;
        block.decelerate_after = profile.decelerate_after;
        block.is_profile_valid = true;
    }

    /// Phase after travelling `travelled` along the move at speed `speed`.
    pub fn phase_at(block: &PositionalBlock, travelled: f32, speed: f32) -> MotionPhase {
        if travelled >= block.distance {
            MotionPhase::Complete
        } else if travelled >= block.decelerate_after {
            MotionPhase::Decelerating
        } else if speed < block.nominal_speed {
            MotionPhase::Accelerating
        } else {
            MotionPhase::Cruising
        }
    }
}

/// Highest speed reachable from `v0` with acceleration `acc` over `distance`.
#[inline]
pub fn reachable_speed(v0: f32, acc: f32, distance: f32) -> f32 {
    sqrtf(v0 * v0 + 2.0 * acc * distance)
}
