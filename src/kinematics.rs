//! Virtual axis space ↔ joint space transforms.
//!
//! The planner works on joint positions; G-code works on axis positions.
//! Extruders bypass kinematics entirely.

use serde::Deserialize;

/// Pure transform pair between virtual axis coordinates and joint coordinates.
pub trait Kinematics {
    /// Fill `joints` with the joint positions reaching `axes`.
    fn to_joints(&self, axes: &[f32], joints: &mut [f32]);

    /// Fill `axes` with the axis position of the joint positions `joints`.
    fn to_virtual(&self, joints: &[f32], axes: &mut [f32]);
}

/// Identity mapping: joint `i` drives axis `i`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cartesian;

impl Kinematics for Cartesian {
    fn to_joints(&self, axes: &[f32], joints: &mut [f32]) {
        for (j, a) in joints.iter_mut().zip(axes) {
            *j = *a;
        }
    }

    fn to_virtual(&self, joints: &[f32], axes: &mut [f32]) {
        for (a, j) in axes.iter_mut().zip(joints) {
            *a = *j;
        }
    }
}

/// CoreXY: two belts share the X/Y carriage, Z is direct.
///
/// `a = x + y`, `b = x - y`, `z = z`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoreXy;

impl Kinematics for CoreXy {
    fn to_joints(&self, axes: &[f32], joints: &mut [f32]) {
        joints[0] = axes[0] + axes[1];
        joints[1] = axes[0] - axes[1];
        joints[2] = axes[2];
    }

    fn to_virtual(&self, joints: &[f32], axes: &mut [f32]) {
        axes[0] = 0.5 * (joints[0] + joints[1]);
        axes[1] = 0.5 * (joints[0] - joints[1]);
        axes[2] = joints[2];
    }
}

/// Kinematics selected in the configuration file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KinematicsKind {
    /// See [`Cartesian`].
    #[default]
    Cartesian,
    /// See [`CoreXy`].
    #[serde(rename = "corexy")]
    CoreXy,
}

impl KinematicsKind {
    /// Number of axes (and joints) the kinematics require, `None` for any
    /// matching count.
    pub fn axis_count(&self) -> Option<usize> {
        match self {
            KinematicsKind::Cartesian => None,
            KinematicsKind::CoreXy => Some(3),
        }
    }
}

impl Kinematics for KinematicsKind {
    fn to_joints(&self, axes: &[f32], joints: &mut [f32]) {
        match self {
            KinematicsKind::Cartesian => Cartesian.to_joints(axes, joints),
            KinematicsKind::CoreXy => CoreXy.to_joints(axes, joints),
        }
    }

    fn to_virtual(&self, joints: &[f32], axes: &mut [f32]) {
        match self {
            KinematicsKind::Cartesian => Cartesian.to_virtual(joints, axes),
            KinematicsKind::CoreXy => CoreXy.to_virtual(joints, axes),
        }
    }
}
