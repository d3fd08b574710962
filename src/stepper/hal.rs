//! Hardware seams of the step generator.
//!
//! The generator drives step, direction and enable signals through
//! [`StepperPins`], re-arms its one-shot timer through [`StepTimer`] and reads
//! limit switches through [`Endstops`]. [`PinBank`] and [`EndstopBank`] adapt
//! embedded-hal 1.0 pins to these traits.

use embedded_hal::digital::{InputPin, OutputPin};

use crate::error::HardwareError;

/// Step, direction and enable outputs, indexed by stepper id.
pub trait StepperPins {
    /// Drive the step signal of `stepper`.
    fn set_step(&mut self, stepper: u8, high: bool) -> Result<(), HardwareError>;

    /// Drive the direction signal of `stepper`. `true` is the positive
    /// direction of the motor.
    fn set_dir(&mut self, stepper: u8, positive: bool) -> Result<(), HardwareError>;

    /// Enable or disable every driver.
    fn set_enabled(&mut self, enabled: bool) -> Result<(), HardwareError>;
}

/// One-shot timer calling the step generator back.
pub trait StepTimer {
    /// Fire once after `ticks` timer ticks.
    fn arm(&mut self, ticks: u32);
}

/// Limit switch inputs, indexed by endstop id.
pub trait Endstops {
    /// Whether endstop `id` is triggered. Unknown ids read as not triggered.
    fn is_triggered(&mut self, id: u8) -> Result<bool, HardwareError>;
}

/// `K` step/direction pin pairs plus a shared enable pin.
pub struct PinBank<STEP, DIR, EN, const K: usize>
where
    STEP: OutputPin,
    DIR: OutputPin,
    EN: OutputPin,
{
    step: [STEP; K],
    dir: [DIR; K],
    enable: EN,
    invert_dir: u16,
    enable_active_low: bool,
}

impl<STEP, DIR, EN, const K: usize> PinBank<STEP, DIR, EN, K>
where
    STEP: OutputPin,
    DIR: OutputPin,
    EN: OutputPin,
{
    /// Wrap pins. Stepper `i` uses `step[i]` and `dir[i]`.
    pub fn new(step: [STEP; K], dir: [DIR; K], enable: EN) -> Self {
        Self {
            step,
            dir,
            enable,
            invert_dir: 0,
            enable_active_low: true,
        }
    }

    /// Invert the direction signal of every stepper whose bit is set.
    pub fn with_inverted_dir(mut self, mask: u16) -> Self {
        self.invert_dir = mask;
        self
    }

    /// Drive the enable pin high to enable the drivers.
    pub fn with_enable_active_high(mut self) -> Self {
        self.enable_active_low = false;
        self
    }

    /// Give the pins back.
    pub fn release(self) -> ([STEP; K], [DIR; K], EN) {
        (self.step, self.dir, self.enable)
    }
}

fn drive<P: OutputPin>(pin: &mut P, high: bool) -> Result<(), HardwareError> {
    let result = if high { pin.set_high() } else { pin.set_low() };
    result.map_err(|_| HardwareError::PinError)
}

impl<STEP, DIR, EN, const K: usize> StepperPins for PinBank<STEP, DIR, EN, K>
where
    STEP: OutputPin,
    DIR: OutputPin,
    EN: OutputPin,
{
    fn set_step(&mut self, stepper: u8, high: bool) -> Result<(), HardwareError> {
        match self.step.get_mut(stepper as usize) {
            Some(pin) => drive(pin, high),
            None => Ok(()),
        }
    }

    fn set_dir(&mut self, stepper: u8, positive: bool) -> Result<(), HardwareError> {
        let inverted = stepper < 16 && self.invert_dir & (1 << stepper) != 0;
        match self.dir.get_mut(stepper as usize) {
            Some(pin) => drive(pin, positive != inverted),
            None => Ok(()),
        }
    }

    fn set_enabled(&mut self, enabled: bool) -> Result<(), HardwareError> {
        drive(&mut self.enable, enabled != self.enable_active_low)
    }
}

/// `K` limit switch inputs.
pub struct EndstopBank<IN, const K: usize>
where
    IN: InputPin,
{
    inputs: [IN; K],
    inverted: u16,
}

impl<IN, const K: usize> EndstopBank<IN, K>
where
    IN: InputPin,
{
    /// Wrap inputs; a high level means triggered.
    pub fn new(inputs: [IN; K]) -> Self {
        Self { inputs, inverted: 0 }
    }

    /// Treat a low level as triggered for every input whose bit is set.
    pub fn with_inverted(mut self, mask: u16) -> Self {
        self.inverted = mask;
        self
    }

    /// Give the inputs back.
    pub fn release(self) -> [IN; K] {
        self.inputs
    }
}

impl<IN, const K: usize> Endstops for EndstopBank<IN, K>
where
    IN: InputPin,
{
    fn is_triggered(&mut self, id: u8) -> Result<bool, HardwareError> {
        let inverted = id < 16 && self.inverted & (1 << id) != 0;
        match self.inputs.get_mut(id as usize) {
            Some(pin) => pin
                .is_high()
                .map(|high| high != inverted)
                .map_err(|_| HardwareError::InputError),
            None => Ok(false),
        }
    }
}
