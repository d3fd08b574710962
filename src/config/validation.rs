//! Configuration validation.

use libm::fabsf;

use crate::error::{ConfigError, Error, Result};

use super::joint::{ExtruderConfig, JointConfig};
use super::MachineConfig;

/// Validate a machine configuration.
///
/// Checks:
/// - Timer rates are usable
/// - Axis and joint travel limits are valid (min < max)
/// - Velocities, accelerations and scales are usable
/// - No channel needs more steps per second than the step rate
/// - Every channel has its own stepper output
/// - Homed joints have an endstop in their search direction
/// - Axis and joint counts match the kinematics
pub fn validate_config(config: &MachineConfig) -> Result<()> {
    let timing = &config.timing;
    if timing.timer_hz == 0 || timing.step_rate_hz == 0 || timing.step_interval() < 2 {
        return Err(Error::Config(ConfigError::InvalidTiming));
    }

    for axis in config.axes.iter() {
        if !axis.limits().is_valid() {
            return Err(Error::Config(ConfigError::InvalidLimits {
                min: axis.min_limit.0,
                max: axis.max_limit.0,
            }));
        }
    }

    let step_rate = timing.step_rate_hz as f32;
    for joint in config.joints.iter() {
        validate_joint(joint, step_rate)?;
    }

    for extruder in config.extruders.iter() {
        validate_extruder(extruder, step_rate)?;
    }

    // Stepper outputs must be unique across joints and extruders
    let mut used: u32 = 0;
    let ids = config
        .joints
        .iter()
        .map(|j| j.stepper_id)
        .chain(config.extruders.iter().map(|e| e.stepper_id));
    for id in ids {
        let bit = 1u32 << id.index();
        if used & bit != 0 {
            return Err(Error::Config(ConfigError::DuplicateStepper(id.value())));
        }
        used |= bit;
    }

    let kinematics = config.planner.kinematics;
    let needed = kinematics.axis_count().unwrap_or(config.axes.len());
    if config.axes.len() != needed || config.joints.len() != needed {
        return Err(Error::Config(ConfigError::KinematicsMismatch {
            axes: needed,
            configured: config.axes.len().max(config.joints.len()),
        }));
    }

    Ok(())
}

fn validate_joint(joint: &JointConfig, step_rate: f32) -> Result<()> {
    if !joint.limits().is_valid() {
        return Err(Error::Config(ConfigError::InvalidLimits {
            min: joint.min_limit.0,
            max: joint.max_limit.0,
        }));
    }

    validate_channel(
        joint.name.as_str(),
        joint.scale,
        joint.max_velocity.0,
        joint.max_acceleration.0,
    )?;

    let mut fastest = joint.max_velocity.0;
    if joint.home_sequence.is_some() {
        fastest = fastest
            .max(fabsf(joint.home_search_vel.0))
            .max(fabsf(joint.home_latch_vel.0));
    }
    validate_step_rate(joint.name.as_str(), joint.scale, fastest, step_rate)?;

    if joint.home_sequence.is_some() {
        if joint.home_search_vel.0 == 0.0 || joint.home_latch_vel.0 == 0.0 {
            return Err(Error::Config(ConfigError::InvalidHomingVelocity {
                name: joint.name.clone(),
            }));
        }
        if joint.search_endstop().is_none() {
            return Err(Error::Config(ConfigError::MissingEndstop {
                name: joint.name.clone(),
            }));
        }
    }

    Ok(())
}

fn validate_extruder(extruder: &ExtruderConfig, step_rate: f32) -> Result<()> {
    validate_channel(
        extruder.name.as_str(),
        extruder.scale,
        extruder.max_velocity.0,
        extruder.max_acceleration.0,
    )?;
    validate_step_rate(
        extruder.name.as_str(),
        extruder.scale,
        extruder.max_velocity.0,
        step_rate,
    )
}

/// The step generator emits at most one step per channel and cycle.
fn validate_step_rate(name: &str, scale: f32, velocity: f32, step_rate: f32) -> Result<()> {
    let steps_per_sec = fabsf(velocity * scale);
    if steps_per_sec > step_rate {
        return Err(Error::Config(ConfigError::StepRateExceeded {
            name: heapless::String::try_from(name).unwrap_or_default(),
            steps_per_sec,
        }));
    }
    Ok(())
}

fn validate_channel(name: &str, scale: f32, max_velocity: f32, max_acceleration: f32) -> Result<()> {
    if scale == 0.0 || !scale.is_finite() {
        return Err(Error::Config(ConfigError::InvalidScale {
            name: heapless::String::try_from(name).unwrap_or_default(),
        }));
    }

    if max_velocity <= 0.0 {
        return Err(Error::Config(ConfigError::InvalidMaxVelocity(max_velocity)));
    }

    if max_acceleration <= 0.0 {
        return Err(Error::Config(ConfigError::InvalidMaxAcceleration(
            max_acceleration,
        )));
    }

    Ok(())
}
