//! # motion-core
//!
//! Motion control core for 3D-printer class machines, with embedded-hal 1.0
//! support.
//!
//! ## Features
//!
//! - **Look-ahead planner**: bounded block queue with reverse/forward exit
//!   speed smoothing and trapezoidal profiles
//! - **Real-time step generator**: two-phase timer state machine that never
//!   blocks and honours emergency stops mid-move
//! - **Homing**: sequence-grouped search/latch state machine with travel
//!   guards
//! - **Configuration-driven**: axes, joints and extruders described in TOML
//! - **no_std compatible**: core library works without standard library
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use motion_core::{load_config, MachineState, Planner, SharedQueue, StepGenerator};
//!
//! static QUEUE: SharedQueue<16> = SharedQueue::new();
//! static STATE: MachineState = MachineState::new();
//!
//! let config = load_config("printer.toml")?;
//! let mut planner = Planner::new(&config, &QUEUE, &STATE);
//!
//! // Timer interrupt side
//! let mut stepper = StepGenerator::new(&config, &QUEUE, &STATE, pins, timer, endstops);
//! stepper.start();
//!
//! // Producer side
//! planner.add_axis_point(&target, 50.0)?;
//! ```
//!
//! ## Feature Flags
//!
//! - `std` (default): Enables file I/O, TOML parsing and thread-yielding
//!   queue reservation
//! - `defmt`: Enables defmt logging for embedded targets

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]
// Allow large error types - necessary for no_std with heapless strings
#![allow(clippy::result_large_err)]

#[macro_use]
mod fmt;

// Core modules
pub mod command;
pub mod config;
pub mod error;
pub mod homing;
pub mod kinematics;
pub mod machine;
pub mod planner;
pub mod stepper;

/// Maximum number of virtual axes.
pub const MAX_AXES: usize = 6;

/// Maximum number of joints.
pub const MAX_JOINTS: usize = 6;

/// Maximum number of extruders.
pub const MAX_EXTRUDERS: usize = 2;

/// Maximum number of planner channels (joints followed by extruders).
pub const MAX_CHANNELS: usize = MAX_JOINTS + MAX_EXTRUDERS;

// Re-exports for ergonomic API
pub use command::{Command, CommandDispatcher, Wait, Words};
pub use config::{validate_config, MachineConfig, MachineConstraints};
pub use error::{Error, EstopReason, Result};
pub use homing::{HomeStage, Homing};
pub use kinematics::{Cartesian, CoreXy, Kinematics, KinematicsKind};
pub use machine::{JointState, LimitState, MachineState};
pub use planner::{Block, BlockKind, BlockMode, Planner, PlannerQueue, SharedQueue, VirtualPosition};
pub use stepper::{Endstops, Phase, StepGenerator, StepTimer, StepperPins};

// Configuration loading (std only)
#[cfg(feature = "std")]
pub use config::{load_config, parse_config};

// Unit types
pub use config::units::{StepperId, Steps, Units, UnitsPerSec, UnitsPerSecSquared};
