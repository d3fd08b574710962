//! Command dispatch.
//!
//! A [`Command`] is one G-code line after tokenizing: the dispatcher keeps
//! the modal state (positioning modes, feedrate, working position) and turns
//! commands into planner calls.

use embedded_hal::delay::DelayNs;

use crate::error::{Error, EstopReason, MotionError, Result};
use crate::homing::Homing;
use crate::planner::{Planner, VirtualPosition};
use crate::{MAX_AXES, MAX_EXTRUDERS};

/// Axis and extruder words of a command. `None` leaves the coordinate alone.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Words {
    /// Axis words, in configuration order.
    pub axes: [Option<f32>; MAX_AXES],
    /// Extruder words.
    pub extruders: [Option<f32>; MAX_EXTRUDERS],
}

impl Words {
    /// Set axis `index` (builder style).
    pub fn axis(mut self, index: usize, value: f32) -> Self {
        if let Some(word) = self.axes.get_mut(index) {
            *word = Some(value);
        }
        self
    }

    /// Set extruder `index` (builder style).
    pub fn extruder(mut self, index: usize, value: f32) -> Self {
        if let Some(word) = self.extruders.get_mut(index) {
            *word = Some(value);
        }
        self
    }

    fn is_empty(&self) -> bool {
        self.axes.iter().chain(self.extruders.iter()).all(Option::is_none)
    }
}

/// Decoded motion command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// G0/G1: move, with an optional feedrate in units per minute.
    Move {
        /// Target words.
        words: Words,
        /// Feedrate in units per minute; modal.
        feedrate: Option<f32>,
    },
    /// G92: declare the current position without moving.
    SetPosition(Words),
    /// G28: home the joints in the mask, every homed joint when 0.
    Home {
        /// One bit per joint.
        joint_mask: u32,
    },
    /// G90: axis words are absolute.
    AbsolutePositioning,
    /// G91: axis words are relative.
    RelativePositioning,
    /// M82: extruder words are absolute.
    AbsoluteExtrusion,
    /// M83: extruder words are relative.
    RelativeExtrusion,
    /// G4: wait before the next command.
    Dwell {
        /// Milliseconds.
        ms: u32,
    },
    /// M400: wait until every queued move has finished.
    WaitForMoves,
    /// M112: emergency stop.
    Estop,
    /// M999: leave emergency stop.
    EstopClear,
}

/// What the dispatcher is waiting for before accepting another command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Wait {
    /// Nothing.
    Ready,
    /// A dwell with this many milliseconds left.
    Dwell(u32),
    /// The queue to drain and every joint to stop.
    Moves,
}

/// Modal command interpreter on top of a [`Planner`].
pub struct CommandDispatcher<'a, D: DelayNs, const N: usize> {
    planner: Planner<'a, N>,
    homing: Homing,
    delay: D,
    position: VirtualPosition,
    feedrate: f32,
    relative_axes: bool,
    relative_extruders: bool,
    wait: Wait,
}

impl<'a, D: DelayNs, const N: usize> CommandDispatcher<'a, D, N> {
    /// Wrap a planner. `delay` paces homing polls.
    pub fn new(planner: Planner<'a, N>, delay: D) -> Self {
        let feedrate = planner.config().planner.default_feedrate.value();
        let position = planner.current_position();
        Self {
            planner,
            homing: Homing::new(),
            delay,
            position,
            feedrate,
            relative_axes: false,
            relative_extruders: false,
            wait: Wait::Ready,
        }
    }

    /// Replace the homing sequencer.
    pub fn with_homing(mut self, homing: Homing) -> Self {
        self.homing = homing;
        self
    }

    /// Borrow the planner.
    pub fn planner(&self) -> &Planner<'a, N> {
        &self.planner
    }

    /// Mutably borrow the planner.
    pub fn planner_mut(&mut self) -> &mut Planner<'a, N> {
        &mut self.planner
    }

    /// Borrow the homing sequencer.
    pub fn homing(&self) -> &Homing {
        &self.homing
    }

    /// Working position the next relative move starts from.
    pub fn position(&self) -> VirtualPosition {
        self.position
    }

    /// Modal feedrate in units per second.
    pub fn feedrate(&self) -> f32 {
        self.feedrate
    }

    /// Current wait state.
    pub fn wait_state(&self) -> Wait {
        self.wait
    }

    /// Advance the wait state by `elapsed_ms`. Returns `true` once ready.
    pub fn poll(&mut self, elapsed_ms: u32) -> bool {
        self.wait = match self.wait {
            Wait::Ready => Wait::Ready,
            Wait::Dwell(left) if left <= elapsed_ms => Wait::Ready,
            Wait::Dwell(left) => Wait::Dwell(left - elapsed_ms),
            Wait::Moves if self.moves_done() => Wait::Ready,
            Wait::Moves => Wait::Moves,
        };
        self.wait == Wait::Ready
    }

    /// Execute one command.
    ///
    /// Emergency stop commands are always accepted. Anything else is
    /// refused with [`MotionError::Busy`] while a wait is pending.
    pub fn dispatch(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Estop => {
                self.planner.estop(EstopReason::Requested);
                self.wait = Wait::Ready;
                return Ok(());
            }
            Command::EstopClear => {
                self.planner.estop_clear()?;
                self.position = self.planner.current_position();
                self.wait = Wait::Ready;
                return Ok(());
            }
            _ => {}
        }

        if self.wait != Wait::Ready {
            return Err(Error::Motion(MotionError::Busy));
        }

        match command {
            Command::Move { words, feedrate } => self.command_move(&words, feedrate),
            Command::SetPosition(words) => self.command_set_position(&words),
            Command::Home { joint_mask } => self.command_homing(joint_mask),
            Command::AbsolutePositioning => {
                self.relative_axes = false;
                Ok(())
            }
            Command::RelativePositioning => {
                self.relative_axes = true;
                Ok(())
            }
            Command::AbsoluteExtrusion => {
                self.relative_extruders = false;
                Ok(())
            }
            Command::RelativeExtrusion => {
                self.relative_extruders = true;
                Ok(())
            }
            Command::Dwell { ms } => {
                self.wait = Wait::Dwell(ms);
                Ok(())
            }
            Command::WaitForMoves => {
                self.wait = Wait::Moves;
                Ok(())
            }
            Command::Estop | Command::EstopClear => Ok(()),
        }
    }

    fn command_move(&mut self, words: &Words, feedrate: Option<f32>) -> Result<()> {
        if let Some(f) = feedrate {
            if !(f > 0.0) {
                return Err(Error::Motion(MotionError::InvalidFeedrate(f)));
            }
            self.feedrate = f / 60.0;
        }
        if words.is_empty() {
            return Ok(());
        }

        let mut target = self.position;
        apply_words(&mut target.axes, &words.axes, self.relative_axes);
        apply_words(&mut target.extruders, &words.extruders, self.relative_extruders);

        let result = self.planner.add_axis_point(&target, self.feedrate);
        // The planner may clamp or refuse the target
        self.position = self.planner.current_position();
        result
    }

    fn command_set_position(&mut self, words: &Words) -> Result<()> {
        let mut target = self.position;
        apply_words(&mut target.axes, &words.axes, false);
        apply_words(&mut target.extruders, &words.extruders, false);
        self.planner.set_position(&target)?;
        self.position = target;
        Ok(())
    }

    fn command_homing(&mut self, joint_mask: u32) -> Result<()> {
        let mask = if joint_mask == 0 {
            self.planner.config().homed_joint_mask()
        } else {
            joint_mask
        };
        let result = self.homing.run(&mut self.planner, &mut self.delay, mask);
        self.position = self.planner.current_position();
        result
    }

    fn moves_done(&self) -> bool {
        let joint_count = self.planner.config().joints.len();
        self.planner.queue_len() == 0
            && self.planner.machine().joints()[..joint_count]
                .iter()
                .all(|j| j.stopped)
    }
}

fn apply_words<const K: usize>(coords: &mut [f32; K], words: &[Option<f32>; K], relative: bool) {
    for (coord, word) in coords.iter_mut().zip(words.iter()) {
        if let Some(value) = word {
            if relative {
                *coord += value;
            } else {
                *coord = *value;
            }
        }
    }
}
