//! Motion planner: block queue, look-ahead and the producer front end.
//!
//! [`Planner`] turns axis targets and joint velocities into [`Block`]s, posts
//! them to a [`SharedQueue`] and recalculates the look-ahead window after
//! every post. The step generator consumes the same queue from the timer
//! interrupt.

mod block;
pub mod lookahead;
mod queue;
mod shared;
pub mod trapezoid;

pub use block::{
    Block, BlockKind, BlockMode, ChannelVector, ChannelVelocity, PositionalBlock, VelocityBlock,
};
pub use queue::{PlannerQueue, Reservation};
pub use shared::SharedQueue;
pub use trapezoid::{MotionPhase, Trapezoid};

use libm::{fabsf, sqrtf};

use crate::config::{MachineConfig, MachineConstraints, Steps, Units};
use crate::error::{Error, EstopReason, MotionError, Result};
use crate::kinematics::{Kinematics, KinematicsKind};
use crate::machine::MachineState;
use crate::{MAX_AXES, MAX_CHANNELS, MAX_EXTRUDERS, MAX_JOINTS};

/// Position in work space: axes before kinematics, plus extruders.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VirtualPosition {
    /// Axis coordinates in machine units.
    pub axes: [f32; MAX_AXES],
    /// Extruder coordinates in machine units.
    pub extruders: [f32; MAX_EXTRUDERS],
}

#[cfg(feature = "std")]
fn default_wait() {
    std::thread::yield_now();
}

#[cfg(not(feature = "std"))]
fn default_wait() {
    core::hint::spin_loop();
}

/// Producer side of the motion queue.
///
/// Tracks the last planned position in virtual, physical and step space so
/// every new move is expressed as a delta from the previous one.
pub struct Planner<'a, const N: usize> {
    queue: &'a SharedQueue<N>,
    state: &'a MachineState,
    config: &'a MachineConfig,
    constraints: MachineConstraints,
    kinematics: KinematicsKind,
    wait: fn(),
    position: VirtualPosition,
    physical: ChannelVector,
    steps: [i32; MAX_CHANNELS],
}

impl<'a, const N: usize> Planner<'a, N> {
    /// Create a planner at the origin for a validated configuration.
    pub fn new(config: &'a MachineConfig, queue: &'a SharedQueue<N>, state: &'a MachineState) -> Self {
        Self {
            queue,
            state,
            config,
            constraints: MachineConstraints::from_config(config),
            kinematics: config.planner.kinematics,
            wait: default_wait,
            position: VirtualPosition::default(),
            physical: [0.0; MAX_CHANNELS],
            steps: [0; MAX_CHANNELS],
        }
    }

    /// Replace the hook called while waiting for a free queue slot.
    pub fn with_wait_hook(mut self, wait: fn()) -> Self {
        self.wait = wait;
        self
    }

    /// Machine configuration.
    pub fn config(&self) -> &'a MachineConfig {
        self.config
    }

    /// Shared machine state.
    pub fn machine(&self) -> &'a MachineState {
        self.state
    }

    /// Derived channel constraints.
    pub fn constraints(&self) -> &MachineConstraints {
        &self.constraints
    }

    /// Last planned virtual position.
    pub fn current_position(&self) -> VirtualPosition {
        self.position
    }

    /// Committed blocks waiting for the step generator.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Plan a coordinated move to `target` at `feedrate` units per second.
    ///
    /// The feedrate is lowered so no channel exceeds its maximum velocity or
    /// one step per step cycle; the acceleration is the largest every channel can follow. Moves shorter
    /// than one step on every channel only update the planned position.
    pub fn add_axis_point(&mut self, target: &VirtualPosition, feedrate: f32) -> Result<()> {
        if self.state.is_estopped() {
            return Err(Error::Motion(MotionError::Estopped));
        }
        if !(feedrate > 0.0) {
            return Err(Error::Motion(MotionError::InvalidFeedrate(feedrate)));
        }

        let policy = self.config.planner.limit_policy;
        let mut axes = target.axes;
        for (i, axis) in self.config.axes.iter().enumerate() {
            axes[i] = axis.limits().apply(axes[i], policy).ok_or(Error::Motion(
                MotionError::OutOfLimits {
                    axis: i,
                    target: axes[i],
                },
            ))?;
        }

        let physical = self.to_physical(&axes, &target.extruders);
        let steps = self.to_steps(&physical);

        let mut delta = [0.0; MAX_CHANNELS];
        let mut step_delta = [0; MAX_CHANNELS];
        for ch in 0..self.constraints.channel_count() {
            delta[ch] = physical[ch] - self.physical[ch];
            step_delta[ch] = steps[ch] - self.steps[ch];
        }
        let distance = sqrtf(delta.iter().map(|d| d * d).sum());

        let next = VirtualPosition {
            axes,
            extruders: target.extruders,
        };
        if distance <= 0.0 || step_delta.iter().all(|s| *s == 0) {
            self.position = next;
            return Ok(());
        }

        // At most one step per channel and step cycle
        let step_rate = self.config.timing.step_rate_hz as f32;
        let mut nominal = feedrate;
        let mut acc = f32::MAX;
        for (ch, c) in self.constraints.channels().iter().enumerate() {
            let d = fabsf(delta[ch]);
            if d == 0.0 {
                continue;
            }
            nominal = nominal.min(c.max_velocity * distance / d);
            acc = acc.min(c.max_acceleration * distance / d);
            if step_delta[ch] != 0 {
                nominal = nominal.min(step_rate * distance / step_delta[ch].unsigned_abs() as f32);
            }
        }

        let block = PositionalBlock::new(physical, delta, step_delta, nominal, acc);
        trace!("move: distance {}, speed {}, acc {}", distance, nominal, acc);
        self.post(Block::new(BlockKind::Positional(block)))?;

        self.position = next;
        self.physical = physical;
        self.steps = steps;
        Ok(())
    }

    /// Command joint and extruder velocities directly.
    ///
    /// With `rapid` every channel ramps at its own maximum acceleration;
    /// otherwise the ramps are scaled so every channel reaches its target at
    /// the same time. With `stop_on_limit_changes` the step generator halts a
    /// joint as soon as one of its limit switches changes state. Missing
    /// entries are zero, extra entries are ignored. Velocities are limited to
    /// one step per step cycle.
    pub fn set_joint_velocity(
        &mut self,
        joints: &[f32],
        extruders: &[f32],
        rapid: bool,
        stop_on_limit_changes: bool,
    ) -> Result<()> {
        if self.state.is_estopped() {
            return Err(Error::Motion(MotionError::Estopped));
        }

        let joint_count = self.constraints.joint_count();
        let mut velocity = [0.0; MAX_CHANNELS];
        for (j, v) in joints.iter().take(joint_count).enumerate() {
            velocity[j] = *v;
        }
        for (e, v) in extruders.iter().take(self.constraints.extruder_count()).enumerate() {
            velocity[joint_count + e] = *v;
        }
        let step_rate = self.config.timing.step_rate_hz as f32;
        for (ch, c) in self.constraints.channels().iter().enumerate() {
            let fastest = step_rate * c.step_length();
            velocity[ch] = velocity[ch].clamp(-fastest, fastest);
        }

        // Slowest channel sets the ramp time of a coordinated change
        let mut ramp_time = 0.0f32;
        if !rapid {
            for (ch, c) in self.constraints.channels().iter().enumerate() {
                ramp_time = ramp_time.max(fabsf(velocity[ch]) / c.max_acceleration);
            }
        }

        let mut block = VelocityBlock {
            channels: [ChannelVelocity::default(); MAX_CHANNELS],
            stop_on_limit_changes,
        };
        for (ch, c) in self.constraints.channels().iter().enumerate() {
            block.channels[ch] = ChannelVelocity {
                velocity: velocity[ch],
                acceleration: if rapid || ramp_time <= 0.0 {
                    c.max_acceleration
                } else {
                    fabsf(velocity[ch]) / ramp_time
                },
            };
        }

        debug!("joint velocity block, stop on limit: {}", stop_on_limit_changes);
        self.post(Block::new(BlockKind::Velocity(block)))
    }

    /// Rebase the coordinate system so the machine is at `position`.
    ///
    /// Nothing moves: a reset block carrying the new step positions is
    /// queued behind the pending moves.
    pub fn set_position(&mut self, position: &VirtualPosition) -> Result<()> {
        let physical = self.to_physical(&position.axes, &position.extruders);
        let steps = self.to_steps(&physical);
        self.post(Block::new(BlockKind::Reset(steps)))?;

        self.position = *position;
        self.physical = physical;
        self.steps = steps;
        Ok(())
    }

    /// Enter emergency stop.
    ///
    /// Latches `reason` and replaces everything queued with an estop block
    /// that the step generator honours even in the middle of a move.
    pub fn estop(&mut self, reason: EstopReason) {
        warn!("emergency stop: {}", reason);
        self.state.latch_estop(reason);
        self.queue
            .interrupt_commit(Block::new(BlockKind::Estop(reason)));
    }

    /// Leave emergency stop and resynchronise the planned position with the
    /// joints.
    pub fn estop_clear(&mut self) -> Result<()> {
        info!("emergency stop cleared");
        self.state.clear_estop();
        self.post(Block::new(BlockKind::EstopClear))?;
        self.sync_position();
        Ok(())
    }

    /// Adopt the joint and extruder positions reported by the step generator
    /// as the planned position. Call only while no motion is queued.
    pub fn sync_position(&mut self) {
        let joint_count = self.constraints.joint_count();
        let joints = self.state.joints();
        let mut joint_pos = [0.0; MAX_JOINTS];
        for (j, state) in joints.iter().enumerate().take(joint_count) {
            self.steps[j] = state.step_pos;
            self.physical[j] = state.pos;
            joint_pos[j] = state.pos;
        }

        let mut axes = [0.0; MAX_AXES];
        let axis_count = self.config.axes.len();
        self.kinematics
            .to_virtual(&joint_pos[..joint_count], &mut axes[..axis_count]);
        self.position.axes = axes;

        for e in 0..self.constraints.extruder_count() {
            let ch = joint_count + e;
            let (Some(steps), Some(c)) =
                (self.state.extruder_steps(e), self.constraints.channel(ch))
            else {
                continue;
            };
            let pos = Steps(steps).to_units(c.scale).value();
            self.steps[ch] = steps;
            self.physical[ch] = pos;
            self.position.extruders[e] = pos;
        }
    }

    fn post(&mut self, block: Block) -> Result<()> {
        let reservation = self.queue.reserve_block_with(self.wait);
        if !self.queue.add_block(reservation, block) {
            return Err(Error::Motion(MotionError::Estopped));
        }
        self.queue.recalculate();
        Ok(())
    }

    fn to_physical(
        &self,
        axes: &[f32; MAX_AXES],
        extruders: &[f32; MAX_EXTRUDERS],
    ) -> ChannelVector {
        let joint_count = self.constraints.joint_count();
        let axis_count = self.config.axes.len();
        let mut physical = [0.0; MAX_CHANNELS];
        self.kinematics
            .to_joints(&axes[..axis_count], &mut physical[..joint_count]);
        for e in 0..self.constraints.extruder_count() {
            physical[joint_count + e] = extruders[e];
        }
        physical
    }

    fn to_steps(&self, physical: &ChannelVector) -> [i32; MAX_CHANNELS] {
        let mut steps = [0; MAX_CHANNELS];
        for (ch, c) in self.constraints.channels().iter().enumerate() {
            steps[ch] = Steps::from_units(Units(physical[ch]), c.scale).value();
        }
        steps
    }
}
