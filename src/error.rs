//! Error types for motion-core.
//!
//! Configuration, command and hardware problems are returned as [`Error`].
//! Motion faults additionally latch an [`EstopReason`] in the machine state,
//! which every layer polls; operations aborted by one return [`Error::Estop`].

use core::fmt;

/// Result type alias using the library's Error type.
pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for all motion-core operations.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Configuration parsing or validation error
    Config(ConfigError),
    /// Planner or motion command error
    Motion(MotionError),
    /// Stepper driver or input pin error
    Hardware(HardwareError),
    /// Operation aborted because the machine entered emergency stop
    Estop(EstopReason),
}

/// Configuration-related errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Failed to parse TOML configuration
    ParseError(heapless::String<128>),
    /// Joint or extruder scale must be non-zero
    InvalidScale {
        /// Offending joint or extruder
        name: heapless::String<16>,
    },
    /// Invalid max velocity (must be > 0)
    InvalidMaxVelocity(f32),
    /// Invalid max acceleration (must be > 0)
    InvalidMaxAcceleration(f32),
    /// A channel's fastest speed needs more steps per second than the step rate
    StepRateExceeded {
        /// Offending joint or extruder
        name: heapless::String<16>,
        /// Steps per second required at that speed
        steps_per_sec: f32,
    },
    /// Invalid travel limits (min must be < max)
    InvalidLimits {
        /// Minimum limit value
        min: f32,
        /// Maximum limit value
        max: f32,
    },
    /// Two channels drive the same stepper output
    DuplicateStepper(u8),
    /// Stepper id is outside the available channels
    StepperOutOfRange(u8),
    /// A homed joint has no endstop in its search direction
    MissingEndstop {
        /// Offending joint
        name: heapless::String<16>,
    },
    /// A homed joint has a zero search or latch velocity
    InvalidHomingVelocity {
        /// Offending joint
        name: heapless::String<16>,
    },
    /// Kinematics need a different number of axes/joints
    KinematicsMismatch {
        /// Axes required by the kinematics
        axes: usize,
        /// Axes configured
        configured: usize,
    },
    /// Timer settings are unusable (zero or step rate above timer rate)
    InvalidTiming,
    /// File I/O error (std only)
    #[cfg(feature = "std")]
    IoError(heapless::String<128>),
}

/// Planner and motion command errors.
#[derive(Debug, Clone, PartialEq)]
pub enum MotionError {
    /// Machine is in emergency stop; motion commands are dropped
    Estopped,
    /// Target lies outside the configured axis limits
    OutOfLimits {
        /// Axis index
        axis: usize,
        /// Requested position
        target: f32,
    },
    /// Feedrate must be positive
    InvalidFeedrate(f32),
    /// A dwell or move wait has not finished yet
    Busy,
}

/// Hardware-facing errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HardwareError {
    /// Step, direction or enable pin operation failed
    PinError,
    /// Endstop input read failed
    InputError,
    /// A channel was asked for more than one step per step cycle
    StepOverrun,
}

/// Why the machine entered emergency stop.
///
/// Latched in [`crate::MachineState`] until an explicit clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EstopReason {
    /// Operator or host requested the stop (M112)
    Requested,
    /// A joint travelled further than its range allows while homing
    TravelLimit {
        /// Joint index
        joint: u8,
    },
    /// A limit switch changed in an unexpected direction while homing
    IncorrectLimitHit {
        /// Joint index
        joint: u8,
    },
    /// The step generator could not drive its outputs
    StepperFault,
}

impl EstopReason {
    /// Short operator-facing description.
    pub fn as_str(&self) -> &'static str {
        match self {
            EstopReason::Requested => "Emergency stop requested",
            EstopReason::TravelLimit { .. } => "Homing travel limit exceeded",
            EstopReason::IncorrectLimitHit { .. } => "Incorrect limit switch hit",
            EstopReason::StepperFault => "Stepper output fault",
        }
    }

    /// Joint involved in the fault, if any.
    pub fn joint(&self) -> Option<u8> {
        match self {
            EstopReason::TravelLimit { joint } | EstopReason::IncorrectLimitHit { joint } => {
                Some(*joint)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(e) => write!(f, "Configuration error: {}", e),
            Error::Motion(e) => write!(f, "Motion error: {}", e),
            Error::Hardware(e) => write!(f, "Hardware error: {}", e),
            Error::Estop(e) => write!(f, "Emergency stop: {}", e),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            ConfigError::InvalidScale { name } => {
                write!(f, "Invalid scale for '{}': must be non-zero", name)
            }
            ConfigError::InvalidMaxVelocity(v) => write!(f, "Invalid max velocity: {}. Must be > 0", v),
            ConfigError::InvalidMaxAcceleration(v) => {
                write!(f, "Invalid max acceleration: {}. Must be > 0", v)
            }
            ConfigError::StepRateExceeded { name, steps_per_sec } => write!(
                f,
                "'{}' needs {} steps/s, above the configured step rate",
                name, steps_per_sec
            ),
            ConfigError::InvalidLimits { min, max } => {
                write!(f, "Invalid limits: min ({}) must be < max ({})", min, max)
            }
            ConfigError::DuplicateStepper(id) => write!(f, "Stepper {} is assigned twice", id),
            ConfigError::StepperOutOfRange(id) => write!(f, "Stepper {} is out of range", id),
            ConfigError::MissingEndstop { name } => {
                write!(f, "Joint '{}' is homed but has no endstop in its search direction", name)
            }
            ConfigError::InvalidHomingVelocity { name } => {
                write!(f, "Joint '{}' needs non-zero search and latch velocities", name)
            }
            ConfigError::KinematicsMismatch { axes, configured } => {
                write!(f, "Kinematics need {} axes/joints, {} configured", axes, configured)
            }
            ConfigError::InvalidTiming => write!(f, "Invalid step timer settings"),
            #[cfg(feature = "std")]
            ConfigError::IoError(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl fmt::Display for MotionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MotionError::Estopped => write!(f, "Machine is in emergency stop"),
            MotionError::OutOfLimits { axis, target } => {
                write!(f, "Target {} exceeds limits of axis {}", target, axis)
            }
            MotionError::InvalidFeedrate(v) => write!(f, "Invalid feedrate: {}", v),
            MotionError::Busy => write!(f, "Waiting for a previous command"),
        }
    }
}

impl fmt::Display for HardwareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HardwareError::PinError => write!(f, "GPIO pin operation failed"),
            HardwareError::InputError => write!(f, "Endstop input read failed"),
            HardwareError::StepOverrun => write!(f, "Step rate above one step per cycle"),
        }
    }
}

impl fmt::Display for EstopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.joint() {
            Some(joint) => write!(f, "{} (joint {})", self.as_str(), joint),
            None => f.write_str(self.as_str()),
        }
    }
}

// Conversion impls
impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<MotionError> for Error {
    fn from(e: MotionError) -> Self {
        Error::Motion(e)
    }
}

impl From<HardwareError> for Error {
    fn from(e: HardwareError) -> Self {
        Error::Hardware(e)
    }
}

impl From<EstopReason> for Error {
    fn from(e: EstopReason) -> Self {
        Error::Estop(e)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}

#[cfg(feature = "std")]
impl std::error::Error for MotionError {}

#[cfg(feature = "std")]
impl std::error::Error for HardwareError {}
