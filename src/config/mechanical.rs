//! Runtime constraints derived from the machine configuration.

use heapless::Vec;

use super::joint::JointConfig;
use super::machine::MachineConfig;
use super::units::StepperId;
use crate::MAX_CHANNELS;

/// Travel allowed while searching for a homing switch, as a multiple of the
/// joint range.
pub const HOMING_SEARCH_TRAVEL_FACTOR: f32 = 1.5;

/// Upper bound for the travel allowed in the back-off and latch stages.
pub const HOMING_LATCH_TRAVEL_MAX: f32 = 20.0;

/// Per-channel kinematic limits used by the planner and the step generator.
///
/// Channels are ordered joints first, then extruders, the same order as every
/// physical vector in the planner.
#[derive(Debug, Clone, Copy)]
pub struct ChannelConstraints {
    /// Step output driving this channel.
    pub stepper: StepperId,
    /// Signed steps per machine unit.
    pub scale: f32,
    /// Maximum speed in machine units per second.
    pub max_velocity: f32,
    /// Maximum acceleration in machine units per second squared.
    pub max_acceleration: f32,
}

impl ChannelConstraints {
    /// Step length in machine units.
    #[inline]
    pub fn step_length(&self) -> f32 {
        1.0 / libm::fabsf(self.scale)
    }

    /// Direction signal level for a signed velocity or delta.
    #[inline]
    pub fn direction(&self, velocity: f32) -> bool {
        self.scale * velocity >= 0.0
    }
}

/// Derived parameters for the whole machine.
///
/// Computed once at start-up and handed to the planner and step generator.
#[derive(Debug, Clone)]
pub struct MachineConstraints {
    channels: Vec<ChannelConstraints, MAX_CHANNELS>,
    joint_count: usize,
}

impl MachineConstraints {
    /// Compute constraints from a validated configuration.
    pub fn from_config(config: &MachineConfig) -> Self {
        let mut channels = Vec::new();
        for joint in config.joints.iter() {
            let _ = channels.push(ChannelConstraints {
                stepper: joint.stepper_id,
                scale: joint.scale,
                max_velocity: joint.max_velocity.0,
                max_acceleration: joint.max_acceleration.0,
            });
        }
        for extruder in config.extruders.iter() {
            let _ = channels.push(ChannelConstraints {
                stepper: extruder.stepper_id,
                scale: extruder.scale,
                max_velocity: extruder.max_velocity.0,
                max_acceleration: extruder.max_acceleration.0,
            });
        }

        Self {
            channels,
            joint_count: config.joints.len(),
        }
    }

    /// All channels, joints first.
    #[inline]
    pub fn channels(&self) -> &[ChannelConstraints] {
        &self.channels
    }

    /// Channel by planner index.
    #[inline]
    pub fn channel(&self, index: usize) -> Option<&ChannelConstraints> {
        self.channels.get(index)
    }

    /// Number of joints.
    #[inline]
    pub fn joint_count(&self) -> usize {
        self.joint_count
    }

    /// Number of extruders.
    #[inline]
    pub fn extruder_count(&self) -> usize {
        self.channels.len() - self.joint_count
    }

    /// Number of channels.
    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

/// Homing travel bounds of one joint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HomingBounds {
    /// Maximum travel while searching for the switch.
    pub search_travel: f32,
    /// Maximum travel while backing off or latching.
    pub latch_travel: f32,
}

impl HomingBounds {
    /// Compute bounds from the joint's travel range.
    pub fn from_joint(joint: &JointConfig) -> Self {
        let range = joint.limits().range();
        Self {
            search_travel: range * HOMING_SEARCH_TRAVEL_FACTOR,
            latch_travel: (range / 20.0).min(HOMING_LATCH_TRAVEL_MAX),
        }
    }
}
