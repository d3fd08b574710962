//! Unit test harness for motion-core.
//!
//! This module organizes unit tests for each component of the library.

mod config_validation;
mod dispatcher;
mod homing_sim;
mod queue_properties;
pub mod sim;
