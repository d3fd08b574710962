//! Unit tests for configuration validation.

use motion_core::config::{validate_config, MachineConfig};
use motion_core::error::{ConfigError, Error};

const BASE: &str = r#"
[[axes]]
name = "X"
min_limit = 0.0
max_limit = 200.0

[[joints]]
name = "x"
stepper_id = 0
min_endstop_id = 0
min_limit = 0.0
max_limit = 200.0
max_velocity = 100.0
max_acceleration = 1000.0
scale = 80.0
home_search_vel = -20.0
home_latch_vel = 2.0
home_sequence = 0
"#;

fn base() -> MachineConfig {
    toml::from_str(BASE).expect("Failed to parse TOML")
}

/// Test validation of a valid configuration.
#[test]
fn test_valid_config_passes_validation() {
    assert!(validate_config(&base()).is_ok());
}

/// Test validation fails for inverted joint limits.
#[test]
fn test_invalid_joint_limits() {
    let mut config = base();
    config.joints[0].min_limit.0 = 300.0;
    assert!(matches!(
        validate_config(&config),
        Err(Error::Config(ConfigError::InvalidLimits { .. }))
    ));
}

/// Test validation fails for a zero scale.
#[test]
fn test_zero_scale() {
    let mut config = base();
    config.joints[0].scale = 0.0;
    assert!(matches!(
        validate_config(&config),
        Err(Error::Config(ConfigError::InvalidScale { .. }))
    ));
}

/// Test validation fails for non-positive speed limits.
#[test]
fn test_invalid_velocity_and_acceleration() {
    let mut config = base();
    config.joints[0].max_velocity.0 = 0.0;
    assert_eq!(
        validate_config(&config),
        Err(Error::Config(ConfigError::InvalidMaxVelocity(0.0)))
    );

    let mut config = base();
    config.joints[0].max_acceleration.0 = -1.0;
    assert_eq!(
        validate_config(&config),
        Err(Error::Config(ConfigError::InvalidMaxAcceleration(-1.0)))
    );
}

/// Test a homed joint needs an endstop where it searches.
#[test]
fn test_homing_toward_missing_endstop() {
    let mut config = base();
    // Searching toward max, but only a min switch is fitted
    config.joints[0].home_search_vel.0 = 20.0;
    assert!(matches!(
        validate_config(&config),
        Err(Error::Config(ConfigError::MissingEndstop { .. }))
    ));

    config.joints[0].home_sequence = None;
    assert!(validate_config(&config).is_ok());
}

/// Test a homed joint needs non-zero homing speeds.
#[test]
fn test_zero_latch_velocity() {
    let mut config = base();
    config.joints[0].home_latch_vel.0 = 0.0;
    assert!(matches!(
        validate_config(&config),
        Err(Error::Config(ConfigError::InvalidHomingVelocity { .. }))
    ));
}

/// Test two channels cannot share a stepper output.
#[test]
fn test_duplicate_stepper() {
    let toml_str = format!(
        "{BASE}{}",
        r#"
[[extruders]]
name = "e0"
stepper_id = 0
max_velocity = 40.0
max_acceleration = 5000.0
scale = 415.0
"#
    );
    let config: MachineConfig = toml::from_str(&toml_str).expect("Failed to parse TOML");
    assert_eq!(
        validate_config(&config),
        Err(Error::Config(ConfigError::DuplicateStepper(0)))
    );
}

/// Test the timer must tick at least twice per step cycle.
#[test]
fn test_step_rate_above_timer_rate() {
    let mut config = base();
    config.timing.timer_hz = 10_000;
    config.timing.step_rate_hz = 10_000;
    assert_eq!(
        validate_config(&config),
        Err(Error::Config(ConfigError::InvalidTiming))
    );
}

/// Test a joint cannot be faster than one step per step cycle allows.
#[test]
fn test_max_velocity_above_step_rate() {
    let mut config = base();
    config.timing.step_rate_hz = 10_000;
    config.joints[0].scale = 400.0;
    assert_eq!(
        validate_config(&config),
        Err(Error::Config(ConfigError::StepRateExceeded {
            name: heapless::String::try_from("x").unwrap(),
            steps_per_sec: 40_000.0,
        }))
    );

    // 25 units/s at 400 steps/unit is exactly the step rate
    config.joints[0].max_velocity.0 = 25.0;
    assert!(validate_config(&config).is_ok());
}

/// Test extruders are held to the step rate too.
#[test]
fn test_extruder_above_step_rate() {
    let toml_str = format!(
        "{BASE}{}",
        r#"
[[extruders]]
name = "e0"
stepper_id = 1
max_velocity = 120.0
max_acceleration = 5000.0
scale = 415.0
"#
    );
    let config: MachineConfig = toml::from_str(&toml_str).expect("Failed to parse TOML");
    assert!(matches!(
        validate_config(&config),
        Err(Error::Config(ConfigError::StepRateExceeded { .. }))
    ));
}

/// Test CoreXY needs exactly three axes and joints.
#[test]
fn test_corexy_axis_mismatch() {
    let toml_str = format!("[planner]\nkinematics = \"corexy\"\n{BASE}");
    let config: MachineConfig = toml::from_str(&toml_str).expect("Failed to parse TOML");
    assert_eq!(
        validate_config(&config),
        Err(Error::Config(ConfigError::KinematicsMismatch {
            axes: 3,
            configured: 1,
        }))
    );
}

/// Test empty configuration is valid.
#[test]
fn test_empty_config_is_valid() {
    let config = MachineConfig::default();
    assert!(validate_config(&config).is_ok());
}
