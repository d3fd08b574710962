//! Simulated machine for end-to-end tests.
//!
//! [`SimWorld`] counts steps per stepper output and derives limit switch
//! states from those counts. [`SimDelay`] lets blocking code such as homing
//! sleep by running the step generator for the simulated time instead.

#![allow(dead_code)]

use std::cell::Cell;

use embedded_hal::delay::DelayNs;
use motion_core::error::HardwareError;
use motion_core::{Endstops, JointState, MachineState, StepGenerator, StepTimer, StepperPins};
use motion_core::{MAX_CHANNELS, MAX_JOINTS};

/// Queue depth used by simulated machines.
pub const QUEUE: usize = 16;

/// A limit switch closed while its stepper is at or beyond `at` steps.
#[derive(Debug, Clone, Copy)]
pub struct Switch {
    pub endstop: u8,
    pub stepper: u8,
    pub at: i32,
    /// Closed at or below `at` rather than at or above.
    pub below: bool,
}

impl Switch {
    pub fn min(endstop: u8, stepper: u8, at: i32) -> Self {
        Self { endstop, stepper, at, below: true }
    }

    pub fn max(endstop: u8, stepper: u8, at: i32) -> Self {
        Self { endstop, stepper, at, below: false }
    }
}

#[derive(Default)]
pub struct SimWorld {
    steps: [Cell<i32>; MAX_CHANNELS],
    switches: Vec<Switch>,
}

impl SimWorld {
    pub fn new(switches: Vec<Switch>) -> Self {
        Self {
            steps: Default::default(),
            switches,
        }
    }

    pub fn steps(&self, stepper: u8) -> i32 {
        self.steps[stepper as usize].get()
    }

    fn step(&self, stepper: u8, positive: bool) {
        let cell = &self.steps[stepper as usize];
        cell.set(cell.get() + if positive { 1 } else { -1 });
    }

    fn triggered(&self, endstop: u8) -> bool {
        self.switches.iter().any(|s| {
            if s.endstop != endstop {
                return false;
            }
            let at = self.steps(s.stepper);
            if s.below {
                at <= s.at
            } else {
                at >= s.at
            }
        })
    }
}

pub struct SimPins<'w> {
    world: &'w SimWorld,
    high: [bool; MAX_CHANNELS],
    dir: [bool; MAX_CHANNELS],
    pub enabled: bool,
}

impl<'w> SimPins<'w> {
    pub fn new(world: &'w SimWorld) -> Self {
        Self {
            world,
            high: [false; MAX_CHANNELS],
            dir: [true; MAX_CHANNELS],
            enabled: false,
        }
    }
}

impl StepperPins for SimPins<'_> {
    fn set_step(&mut self, stepper: u8, high: bool) -> Result<(), HardwareError> {
        let i = stepper as usize;
        if high && !self.high[i] {
            self.world.step(stepper, self.dir[i]);
        }
        self.high[i] = high;
        Ok(())
    }

    fn set_dir(&mut self, stepper: u8, positive: bool) -> Result<(), HardwareError> {
        self.dir[stepper as usize] = positive;
        Ok(())
    }

    fn set_enabled(&mut self, enabled: bool) -> Result<(), HardwareError> {
        self.enabled = enabled;
        Ok(())
    }
}

#[derive(Default)]
pub struct SimTimer {
    pub armed: u32,
}

impl StepTimer for SimTimer {
    fn arm(&mut self, ticks: u32) {
        self.armed = ticks;
    }
}

pub struct SimEndstops<'w> {
    world: &'w SimWorld,
}

impl<'w> SimEndstops<'w> {
    pub fn new(world: &'w SimWorld) -> Self {
        Self { world }
    }
}

impl Endstops for SimEndstops<'_> {
    fn is_triggered(&mut self, id: u8) -> Result<bool, HardwareError> {
        Ok(self.world.triggered(id))
    }
}

pub type SimGenerator<'a, 'w> = StepGenerator<'a, SimPins<'w>, SimTimer, SimEndstops<'w>, QUEUE>;

/// Delay that advances simulated time by running the step generator.
///
/// Records the joint table after every delay.
pub struct SimDelay<'g, 'a, 'w> {
    generator: &'g mut SimGenerator<'a, 'w>,
    state: &'a MachineState,
    timer_hz: u64,
    budget: u64,
    pub history: Vec<[JointState; MAX_JOINTS]>,
}

impl<'g, 'a, 'w> SimDelay<'g, 'a, 'w> {
    pub fn new(generator: &'g mut SimGenerator<'a, 'w>, state: &'a MachineState, timer_hz: u32) -> Self {
        generator.start();
        Self {
            generator,
            state,
            timer_hz: u64::from(timer_hz),
            budget: 0,
            history: Vec::new(),
        }
    }

    pub fn generator(&self) -> &SimGenerator<'a, 'w> {
        self.generator
    }
}

impl DelayNs for SimDelay<'_, '_, '_> {
    fn delay_ns(&mut self, ns: u32) {
        self.budget += u64::from(ns) * self.timer_hz / 1_000_000_000;
        loop {
            let armed = u64::from(self.generator.timer().armed.max(1));
            if armed > self.budget {
                break;
            }
            self.budget -= armed;
            self.generator.on_timer();
        }
        self.history.push(self.state.joints());
    }
}

/// Run the generator for `calls` timer expiries.
pub fn run(generator: &mut SimGenerator<'_, '_>, calls: usize) {
    for _ in 0..calls {
        generator.on_timer();
    }
}
