//! Step generation: hardware seams and the timer state machine.

mod generator;
pub mod hal;

pub use generator::{Phase, StepGenerator, RAMP_DIVIDER, STEP_MAX};
pub use hal::{EndstopBank, Endstops, PinBank, StepTimer, StepperPins};
