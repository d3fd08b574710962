//! Runtime machine state shared by the planner, the step generator and homing.
//!
//! Joint states and extruder step counts are written by the step generator
//! and read by everyone else.
//! The emergency stop latch is set by whichever layer detects a fault and
//! stays set until an explicit clear.

use core::cell::RefCell;

use critical_section::Mutex;

use crate::config::{Steps, Units};
use crate::error::EstopReason;
use crate::{MAX_EXTRUDERS, MAX_JOINTS};

/// Which limit switch of a joint is currently triggered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LimitState {
    /// No switch triggered.
    #[default]
    Normal,
    /// Minimum switch triggered.
    MinHit,
    /// Maximum switch triggered.
    MaxHit,
}

/// Snapshot of one joint.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct JointState {
    /// No motion is being generated for the joint.
    pub stopped: bool,
    /// Current limit switch state.
    pub limit_state: LimitState,
    /// The joint completed homing since the last start or clear.
    pub homed: bool,
    /// Step position at the last limit switch change.
    pub limit_step: i32,
    /// Step position.
    pub step_pos: i32,
    /// Position in machine units.
    pub pos: f32,
}

impl JointState {
    const fn new() -> Self {
        Self {
            stopped: true,
            limit_state: LimitState::Normal,
            homed: false,
            limit_step: 0,
            step_pos: 0,
            pos: 0.0,
        }
    }
}

impl Default for JointState {
    fn default() -> Self {
        Self::new()
    }
}

struct Inner {
    joints: [JointState; MAX_JOINTS],
    extruders: [i32; MAX_EXTRUDERS],
    estop: Option<EstopReason>,
}

/// Joint state table and emergency stop latch.
///
/// Every accessor takes a short critical section, so the table can be shared
/// with the step interrupt through a `static` or a reference. Out of range
/// joint indices are ignored by setters and yield `None` from getters.
pub struct MachineState {
    inner: Mutex<RefCell<Inner>>,
}

impl Default for MachineState {
    fn default() -> Self {
        Self::new()
    }
}

impl MachineState {
    /// All joints stopped, unhomed, at step 0; no emergency stop.
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Inner {
                joints: [JointState::new(); MAX_JOINTS],
                extruders: [0; MAX_EXTRUDERS],
                estop: None,
            })),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        critical_section::with(|cs| f(&mut self.inner.borrow_ref_mut(cs)))
    }

    /// Copy of every joint state.
    pub fn joints(&self) -> [JointState; MAX_JOINTS] {
        self.with(|s| s.joints)
    }

    /// Copy of one joint state.
    pub fn joint(&self, joint: usize) -> Option<JointState> {
        self.with(|s| s.joints.get(joint).copied())
    }

    /// Apply `f` to one joint. No-op for an out of range index.
    pub fn update_joint(&self, joint: usize, f: impl FnOnce(&mut JointState)) {
        self.with(|s| {
            if let Some(state) = s.joints.get_mut(joint) {
                f(state);
            }
        })
    }

    /// Apply `f` to every joint in one critical section.
    pub fn update_all(&self, mut f: impl FnMut(usize, &mut JointState)) {
        self.with(|s| {
            for (i, state) in s.joints.iter_mut().enumerate() {
                f(i, state);
            }
        })
    }

    /// Step position of an extruder.
    pub fn extruder_steps(&self, extruder: usize) -> Option<i32> {
        self.with(|s| s.extruders.get(extruder).copied())
    }

    /// Apply `f` to every extruder step count in one critical section.
    pub fn update_extruders(&self, mut f: impl FnMut(usize, &mut i32)) {
        self.with(|s| {
            for (i, steps) in s.extruders.iter_mut().enumerate() {
                f(i, steps);
            }
        })
    }

    /// Rebase `joint` so that the step position recorded at its last limit
    /// change sits at `home_pos`.
    pub fn set_home(&self, joint: usize, home_pos: f32, scale: f32) {
        self.update_joint(joint, |state| {
            let home_step = Steps::from_units(Units(home_pos), scale);
            let step_pos = home_step + (Steps(state.step_pos) - Steps(state.limit_step));
            state.step_pos = step_pos.value();
            state.limit_step = home_step.value();
            state.pos = step_pos.to_units(scale).value();
        });
    }

    /// Latch an emergency stop. The first reason wins until cleared.
    pub fn latch_estop(&self, reason: EstopReason) {
        self.with(|s| {
            if s.estop.is_none() {
                s.estop = Some(reason);
            }
        })
    }

    /// Release the emergency stop latch and forget homing.
    pub fn clear_estop(&self) {
        self.with(|s| {
            s.estop = None;
            for state in s.joints.iter_mut() {
                state.homed = false;
            }
        })
    }

    /// Latched emergency stop reason.
    pub fn estop(&self) -> Option<EstopReason> {
        self.with(|s| s.estop)
    }

    /// Whether an emergency stop is latched.
    pub fn is_estopped(&self) -> bool {
        self.estop().is_some()
    }

    /// Operator message for the latched emergency stop.
    pub fn message(&self) -> Option<&'static str> {
        self.estop().map(|reason| reason.as_str())
    }
}
