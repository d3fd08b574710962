//! Machine configuration - root configuration structure.

use heapless::Vec;
use serde::Deserialize;

use super::joint::{AxisConfig, ExtruderConfig, ExtruderId, JointConfig, JointId};
use super::limits::LimitPolicy;
use super::units::UnitsPerSec;
use crate::kinematics::KinematicsKind;
use crate::{MAX_AXES, MAX_EXTRUDERS, MAX_JOINTS};

/// Root configuration structure from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct MachineConfig {
    /// Step timer settings.
    #[serde(default)]
    pub timing: TimingConfig,

    /// Planner settings.
    #[serde(default)]
    pub planner: PlannerConfig,

    /// Virtual axes, in G-code word order.
    pub axes: Vec<AxisConfig, MAX_AXES>,

    /// Physical joints.
    pub joints: Vec<JointConfig, MAX_JOINTS>,

    /// Extruders.
    #[serde(default)]
    pub extruders: Vec<ExtruderConfig, MAX_EXTRUDERS>,
}

/// Step timer configuration.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TimingConfig {
    /// Timer tick frequency in Hz.
    #[serde(default = "default_timer_hz")]
    pub timer_hz: u32,

    /// Full Setup + Execute cycles per second (maximum step rate per channel).
    #[serde(default = "default_step_rate_hz")]
    pub step_rate_hz: u32,

    /// Timer ticks to wait between queue polls while idle.
    #[serde(default = "default_idle_ticks")]
    pub idle_ticks: u32,
}

fn default_timer_hz() -> u32 {
    1_000_000
}

fn default_step_rate_hz() -> u32 {
    40_000
}

fn default_idle_ticks() -> u32 {
    1_000
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            timer_hz: default_timer_hz(),
            step_rate_hz: default_step_rate_hz(),
            idle_ticks: default_idle_ticks(),
        }
    }
}

impl TimingConfig {
    /// Timer ticks per full step cycle.
    pub fn step_interval(&self) -> u32 {
        self.timer_hz / self.step_rate_hz.max(1)
    }

    /// Duration of one full step cycle in seconds.
    pub fn cycle_secs(&self) -> f32 {
        1.0 / self.step_rate_hz.max(1) as f32
    }
}

/// Planner configuration.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PlannerConfig {
    /// Feedrate used until the first `F` word.
    #[serde(default = "default_feedrate")]
    pub default_feedrate: UnitsPerSec,

    /// What to do with targets outside axis limits.
    #[serde(default)]
    pub limit_policy: LimitPolicy,

    /// Mapping from axes to joints.
    #[serde(default)]
    pub kinematics: KinematicsKind,
}

fn default_feedrate() -> UnitsPerSec {
    UnitsPerSec(50.0)
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            default_feedrate: default_feedrate(),
            limit_policy: LimitPolicy::default(),
            kinematics: KinematicsKind::default(),
        }
    }
}

impl MachineConfig {
    /// Get a joint configuration by handle.
    pub fn joint(&self, id: JointId) -> Option<&JointConfig> {
        self.joints.get(id.index())
    }

    /// Get an extruder configuration by handle.
    pub fn extruder(&self, id: ExtruderId) -> Option<&ExtruderConfig> {
        self.extruders.get(id.index())
    }

    /// Find a joint by name.
    pub fn joint_by_name(&self, name: &str) -> Option<JointId> {
        self.joints
            .iter()
            .position(|j| j.name.as_str() == name)
            .map(|i| JointId(i as u8))
    }

    /// Find an axis index by name.
    pub fn axis_by_name(&self, name: &str) -> Option<usize> {
        self.axes.iter().position(|a| a.name.as_str() == name)
    }

    /// Number of planner channels (joints followed by extruders).
    pub fn channel_count(&self) -> usize {
        self.joints.len() + self.extruders.len()
    }

    /// List all joint names.
    pub fn joint_names(&self) -> impl Iterator<Item = &str> {
        self.joints.iter().map(|j| j.name.as_str())
    }

    /// Bitmask with one bit per homed joint.
    pub fn homed_joint_mask(&self) -> u32 {
        self.joints
            .iter()
            .enumerate()
            .filter(|(_, j)| j.home_sequence.is_some())
            .fold(0, |mask, (i, _)| mask | (1 << i))
    }
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            timing: TimingConfig::default(),
            planner: PlannerConfig::default(),
            axes: Vec::new(),
            joints: Vec::new(),
            extruders: Vec::new(),
        }
    }
}
