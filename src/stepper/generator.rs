//! Timer-driven step generator.
//!
//! Each timer period is split into two halves. `Setup` releases the step
//! signals, reads the limit switches, picks up new blocks and updates the
//! per-channel step rates; `Execute` advances the phase accumulators and
//! raises a step signal on every channel that overflows. Splitting the work
//! keeps every step pulse high for half a period before anything else
//! touches the outputs.

use libm::sqrtf;

use crate::config::{MachineConfig, MachineConstraints};
use crate::error::{EstopReason, HardwareError};
use crate::machine::{LimitState, MachineState};
use crate::planner::{
    Block, BlockKind, BlockMode, MotionPhase, PositionalBlock, SharedQueue, Trapezoid,
    VelocityBlock,
};
use crate::{MAX_CHANNELS, MAX_JOINTS};

use super::hal::{Endstops, StepTimer, StepperPins};

/// Accumulator overflow value: one step.
pub const STEP_MAX: u32 = 65536;

const HALF_STEP: i32 = (STEP_MAX / 2) as i32;

/// Velocity ramps are updated once every this many periods.
pub const RAMP_DIVIDER: u32 = 32;

/// Half of the timer period being executed next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    /// Release steps, sample inputs, update rates.
    Setup,
    /// Accumulate and raise steps.
    Execute,
}

#[derive(Debug, Clone, Copy)]
enum Active {
    Velocity(VelocityBlock),
    Positional(PositionalProgress),
}

#[derive(Debug, Clone, Copy)]
struct PositionalProgress {
    block: PositionalBlock,
    speed: f32,
    start_speed: f32,
    travelled: f32,
    emitted: [u32; MAX_CHANNELS],
}

impl PositionalProgress {
    fn new(block: PositionalBlock) -> Self {
        let max_steps = block.max_steps();
        let start_speed = if max_steps > 0 && block.acc > 0.0 {
            sqrtf(2.0 * block.acc * block.distance / max_steps as f32).min(block.nominal_speed)
        } else {
            block.nominal_speed
        };
        Self {
            block,
            speed: block.entry_speed.max(start_speed),
            start_speed,
            travelled: 0.0,
            emitted: [0; MAX_CHANNELS],
        }
    }

    /// Advance the trapezoid by `dt` seconds.
    fn advance(&mut self, dt: f32) {
        let b = &self.block;
        self.speed = match Trapezoid::phase_at(b, self.travelled, self.speed) {
            MotionPhase::Accelerating => (self.speed + b.acc * dt).min(b.nominal_speed),
            MotionPhase::Cruising => b.nominal_speed,
            // Step counts end the block, so keep slowing past its length
            MotionPhase::Decelerating | MotionPhase::Complete => {
                let floor = b.exit_speed.max(self.start_speed);
                (self.speed - b.acc * dt).max(floor)
            }
        };
        self.travelled += self.speed * dt;
    }

    fn is_done(&self) -> bool {
        self.emitted == self.block.steps
    }
}

/// Two-phase step generator consuming a [`SharedQueue`].
///
/// Call [`on_timer`](Self::on_timer) from the timer interrupt; it re-arms the
/// timer through [`StepTimer`] before returning and never blocks.
pub struct StepGenerator<'a, P, T, E, const N: usize>
where
    P: StepperPins,
    T: StepTimer,
    E: Endstops,
{
    queue: &'a SharedQueue<N>,
    state: &'a MachineState,
    constraints: MachineConstraints,
    endstop_ids: [(Option<u8>, Option<u8>); MAX_JOINTS],
    pins: P,
    timer: T,
    endstops: E,

    phase: Phase,
    active: Option<Active>,
    estopped: bool,
    enabled: bool,
    half_interval: u32,
    idle_ticks: u32,
    cycle_secs: f32,
    step_rate: f32,
    running_counter: u32,

    halted: u16,
    asserted: u16,
    direction: [Option<bool>; MAX_CHANNELS],
    last_velocity: [f32; MAX_CHANNELS],
    step_size: [u32; MAX_CHANNELS],
    accumulator: [i32; MAX_CHANNELS],
    limits: [LimitState; MAX_JOINTS],
}

impl<'a, P, T, E, const N: usize> StepGenerator<'a, P, T, E, N>
where
    P: StepperPins,
    T: StepTimer,
    E: Endstops,
{
    /// Create a generator for a validated configuration.
    pub fn new(
        config: &MachineConfig,
        queue: &'a SharedQueue<N>,
        state: &'a MachineState,
        pins: P,
        timer: T,
        endstops: E,
    ) -> Self {
        let mut endstop_ids = [(None, None); MAX_JOINTS];
        for (ids, joint) in endstop_ids.iter_mut().zip(config.joints.iter()) {
            *ids = (joint.min_endstop_id, joint.max_endstop_id);
        }
        let timing = &config.timing;

        Self {
            queue,
            state,
            constraints: MachineConstraints::from_config(config),
            endstop_ids,
            pins,
            timer,
            endstops,
            phase: Phase::Setup,
            active: None,
            estopped: false,
            enabled: false,
            half_interval: (timing.step_interval() / 2).max(1),
            idle_ticks: timing.idle_ticks,
            cycle_secs: timing.cycle_secs(),
            step_rate: timing.step_rate_hz as f32,
            running_counter: 0,
            halted: 0,
            asserted: 0,
            direction: [None; MAX_CHANNELS],
            last_velocity: [0.0; MAX_CHANNELS],
            step_size: [0; MAX_CHANNELS],
            accumulator: [HALF_STEP; MAX_CHANNELS],
            limits: [LimitState::Normal; MAX_JOINTS],
        }
    }

    /// Arm the first timer period.
    pub fn start(&mut self) {
        self.phase = Phase::Setup;
        self.timer.arm(self.idle_ticks);
    }

    /// Phase that runs on the next timer expiry.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Mode of the block being executed, `Idle` when there is none.
    pub fn current_mode(&self) -> BlockMode {
        match self.active {
            None => BlockMode::Idle,
            Some(Active::Velocity(_)) => BlockMode::Velocity,
            Some(Active::Positional(_)) => BlockMode::Positional,
        }
    }

    /// Whether an emergency stop block has been consumed and not yet cleared.
    pub fn is_estopped(&self) -> bool {
        self.estopped
    }

    /// Current velocity of a channel as ramped by velocity blocks.
    pub fn channel_velocity(&self, channel: usize) -> f32 {
        self.last_velocity.get(channel).copied().unwrap_or(0.0)
    }

    /// Step position of an extruder channel.
    pub fn extruder_steps(&self, extruder: usize) -> Option<i32> {
        if extruder < self.constraints.extruder_count() {
            self.state.extruder_steps(extruder)
        } else {
            None
        }
    }

    /// Borrow the output pins.
    pub fn pins(&self) -> &P {
        &self.pins
    }

    /// Borrow the timer.
    pub fn timer(&self) -> &T {
        &self.timer
    }

    /// Mutably borrow the timer.
    pub fn timer_mut(&mut self) -> &mut T {
        &mut self.timer
    }

    /// Mutably borrow the endstop inputs.
    pub fn endstops_mut(&mut self) -> &mut E {
        &mut self.endstops
    }

    /// Give the hardware back.
    pub fn release(self) -> (P, T, E) {
        (self.pins, self.timer, self.endstops)
    }

    /// Timer expiry handler.
    pub fn on_timer(&mut self) {
        let result = match self.phase {
            Phase::Setup => self.setup(),
            Phase::Execute => self.execute(),
        };
        if let Err(err) = result {
            trace!("stepper fault: {}", err);
            self.fault(EstopReason::StepperFault);
        }
    }

    fn setup(&mut self) -> Result<(), HardwareError> {
        self.release_steps()?;
        self.sample_limits()?;

        if let Some(Active::Positional(progress)) = self.active {
            if progress.is_done() {
                self.finish_positional(&progress.block);
            }
        }

        while let Some(block) = self.fetch() {
            if self.begin(block)? {
                break;
            }
        }

        let Some(active) = self.active else {
            self.timer.arm(self.idle_ticks);
            return Ok(());
        };

        match active {
            Active::Velocity(block) => self.ramp_velocity(&block)?,
            Active::Positional(progress) => self.pace_positional(progress)?,
        }
        self.running_counter = self.running_counter.wrapping_add(1);

        self.release_steps()?;
        self.phase = Phase::Execute;
        self.timer.arm(self.half_interval);
        Ok(())
    }

    fn execute(&mut self) -> Result<(), HardwareError> {
        let channels = self.constraints.channel_count();
        let joints = self.constraints.joint_count();
        let mut stepped = 0u16;
        let mut signs = [0i32; MAX_CHANNELS];

        for ch in 0..channels {
            if self.step_size[ch] == 0 {
                continue;
            }
            if let Some(Active::Positional(progress)) = &self.active {
                if progress.emitted[ch] >= progress.block.steps[ch] {
                    continue;
                }
            }

            // Odd channels overflow one count early so neighbours do not
            // step on the same edge
            self.accumulator[ch] += self.step_size[ch] as i32;
            let threshold = STEP_MAX as i32 - (ch % 2) as i32;
            if self.accumulator[ch] >= threshold {
                self.accumulator[ch] -= STEP_MAX as i32;
                self.set_step(ch, true)?;
                stepped |= 1 << ch;
                signs[ch] = self.step_sign(ch);
                if let Some(Active::Positional(progress)) = &mut self.active {
                    progress.emitted[ch] += 1;
                }
            }
        }

        let joint_mask = (1u16 << joints) - 1;
        if stepped & joint_mask != 0 {
            let constraints = &self.constraints;
            self.state.update_all(|j, s| {
                if j < joints && signs[j] != 0 {
                    if let Some(c) = constraints.channel(j) {
                        s.step_pos += signs[j];
                        s.pos = s.step_pos as f32 / c.scale;
                    }
                }
            });
        }
        if stepped & !joint_mask != 0 {
            self.state.update_extruders(|e, steps| {
                if let Some(sign) = signs.get(joints + e) {
                    *steps += sign;
                }
            });
        }

        self.phase = Phase::Setup;
        self.timer.arm(self.half_interval);
        Ok(())
    }

    fn fetch(&self) -> Option<Block> {
        let mode = self.current_mode();
        self.queue.with(|q| loop {
            let block = q.fetch_block_i(mode)?;
            if block.era >= q.era_floor() {
                return Some(block);
            }
            trace!("discarding stale block, era {}", block.era);
        })
    }

    /// Handle a fetched block. Returns `true` when it became the active block.
    fn begin(&mut self, block: Block) -> Result<bool, HardwareError> {
        match block.kind {
            BlockKind::Idle => Ok(false),
            BlockKind::Reset(steps) => {
                self.adopt_positions(&steps);
                Ok(false)
            }
            BlockKind::Estop(reason) => {
                self.enter_estop(reason)?;
                Ok(false)
            }
            BlockKind::EstopClear => {
                self.estopped = false;
                Ok(false)
            }
            BlockKind::Velocity(_) | BlockKind::Positional(_) if self.estopped => Ok(false),
            BlockKind::Velocity(v) => {
                // A joint halted by its switch stays halted while its command
                // is unchanged
                let mut halted = 0;
                if let (Some(Active::Velocity(prev)), true) = (self.active, v.stop_on_limit_changes) {
                    for j in 0..self.constraints.joint_count() {
                        if prev.channels[j].velocity == v.channels[j].velocity {
                            halted |= self.halted & (1 << j);
                        }
                    }
                }
                self.begin_block()?;
                self.halted = halted;
                self.active = Some(Active::Velocity(v));
                let joints = self.constraints.joint_count();
                self.state.update_all(|j, s| {
                    if j < joints && v.channels[j].velocity != 0.0 {
                        s.stopped = false;
                    }
                });
                Ok(true)
            }
            BlockKind::Positional(p) => {
                self.begin_block()?;
                self.last_velocity = [0.0; MAX_CHANNELS];
                for ch in 0..self.constraints.channel_count() {
                    self.set_direction(ch, !p.is_reverse(ch))?;
                }
                let joints = self.constraints.joint_count();
                self.state.update_all(|j, s| {
                    if j < joints && p.steps[j] > 0 {
                        s.stopped = false;
                    }
                });
                self.active = Some(Active::Positional(PositionalProgress::new(p)));
                Ok(true)
            }
        }
    }

    fn begin_block(&mut self) -> Result<(), HardwareError> {
        self.running_counter = 0;
        if !self.enabled {
            self.pins.set_enabled(true)?;
            self.enabled = true;
        }
        self.accumulator = [HALF_STEP; MAX_CHANNELS];
        Ok(())
    }

    fn ramp_velocity(&mut self, block: &VelocityBlock) -> Result<(), HardwareError> {
        if self.running_counter % RAMP_DIVIDER != 0 {
            return Ok(());
        }

        let channels = self.constraints.channel_count();
        let joints = self.constraints.joint_count();
        let mut all_still = true;
        let mut stopped = 0u16;

        for ch in 0..channels {
            let target = if self.halted & (1 << ch) != 0 {
                0.0
            } else {
                block.channels[ch].velocity
            };
            let increment = block.channels[ch].acceleration * RAMP_DIVIDER as f32 / self.step_rate;
            let current = self.last_velocity[ch];
            let next = if increment <= 0.0 {
                target
            } else if current < target {
                (current + increment).min(target)
            } else {
                (current - increment).max(target)
            };
            self.last_velocity[ch] = next;

            let channel = self.constraints.channels()[ch];
            let rate = libm::fabsf(next * channel.scale) / self.step_rate;
            self.step_size[ch] = Self::step_size(rate)?;
            if next != 0.0 {
                self.set_direction(ch, channel.direction(next))?;
            }

            if next == 0.0 && target == 0.0 {
                if ch < joints {
                    stopped |= 1 << ch;
                }
            } else {
                all_still = false;
            }
        }

        self.state.update_all(|j, s| {
            if j < joints {
                s.stopped = stopped & (1 << j) != 0;
            }
        });

        if all_still {
            trace!("velocity block settled");
            self.active = None;
        }
        Ok(())
    }

    fn pace_positional(&mut self, mut progress: PositionalProgress) -> Result<(), HardwareError> {
        progress.advance(self.cycle_secs);
        let channels = self.constraints.channel_count();
        let distance = progress.block.distance;
        for ch in 0..channels {
            let steps = progress.block.steps[ch];
            self.step_size[ch] = if steps == 0 || distance <= 0.0 {
                0
            } else {
                let per_cycle = steps as f32 / distance * progress.speed * self.cycle_secs;
                Self::step_size(per_cycle)?.max(1)
            };
        }
        self.active = Some(Active::Positional(progress));
        Ok(())
    }

    /// Accumulator increment for `per_cycle` steps per cycle.
    fn step_size(per_cycle: f32) -> Result<u32, HardwareError> {
        let size = (per_cycle * STEP_MAX as f32) as u32;
        if size > STEP_MAX {
            return Err(HardwareError::StepOverrun);
        }
        Ok(size)
    }

    fn finish_positional(&mut self, block: &PositionalBlock) {
        trace!("positional block complete");
        self.active = None;
        self.step_size = [0; MAX_CHANNELS];
        let joints = self.constraints.joint_count();
        self.state.update_all(|j, s| {
            if j < joints && block.steps[j] > 0 {
                s.stopped = true;
            }
        });
    }

    fn enter_estop(&mut self, reason: EstopReason) -> Result<(), HardwareError> {
        trace!("estop block consumed: {}", reason);
        self.estopped = true;
        self.active = None;
        self.halted = 0;
        self.last_velocity = [0.0; MAX_CHANNELS];
        self.step_size = [0; MAX_CHANNELS];
        self.state.update_all(|_, s| s.stopped = true);
        self.enabled = false;
        self.pins.set_enabled(false)
    }

    fn fault(&mut self, reason: EstopReason) {
        self.state.latch_estop(reason);
        self.estopped = true;
        self.active = None;
        self.last_velocity = [0.0; MAX_CHANNELS];
        self.step_size = [0; MAX_CHANNELS];
        self.state.update_all(|_, s| s.stopped = true);
        let _ = self.pins.set_enabled(false);
        self.enabled = false;
        self.phase = Phase::Setup;
        self.timer.arm(self.idle_ticks);
    }

    fn adopt_positions(&mut self, steps: &[i32; MAX_CHANNELS]) {
        let joints = self.constraints.joint_count();
        let constraints = &self.constraints;
        self.state.update_all(|j, s| {
            if let (true, Some(c)) = (j < joints, constraints.channel(j)) {
                s.step_pos = steps[j];
                s.pos = steps[j] as f32 / c.scale;
            }
        });
        let extruders = self.constraints.extruder_count();
        self.state.update_extruders(|e, s| {
            if e < extruders {
                *s = steps[joints + e];
            }
        });
    }

    fn sample_limits(&mut self) -> Result<(), HardwareError> {
        let joints = self.constraints.joint_count();
        let stop_on_change = matches!(
            self.active,
            Some(Active::Velocity(VelocityBlock {
                stop_on_limit_changes: true,
                ..
            }))
        );

        for j in 0..joints {
            let (min_id, max_id) = self.endstop_ids[j];
            let min_hit = match min_id {
                Some(id) => self.endstops.is_triggered(id)?,
                None => false,
            };
            let max_hit = match max_id {
                Some(id) => self.endstops.is_triggered(id)?,
                None => false,
            };
            let limit = if min_hit {
                LimitState::MinHit
            } else if max_hit {
                LimitState::MaxHit
            } else {
                LimitState::Normal
            };
            if limit == self.limits[j] {
                continue;
            }

            self.limits[j] = limit;
            let halt = stop_on_change && self.halted & (1 << j) == 0;
            if halt {
                self.halted |= 1 << j;
                self.last_velocity[j] = 0.0;
                self.step_size[j] = 0;
            }
            self.state.update_joint(j, |s| {
                s.limit_state = limit;
                s.limit_step = s.step_pos;
                if halt {
                    s.stopped = true;
                }
            });
        }
        Ok(())
    }

    fn step_sign(&self, ch: usize) -> i32 {
        match self.direction[ch] {
            Some(false) => -1,
            _ => 1,
        }
    }

    fn stepper(&self, ch: usize) -> u8 {
        self.constraints.channels()[ch].stepper.value()
    }

    fn set_direction(&mut self, ch: usize, positive: bool) -> Result<(), HardwareError> {
        if self.direction[ch] != Some(positive) {
            self.pins.set_dir(self.stepper(ch), positive)?;
            self.direction[ch] = Some(positive);
        }
        Ok(())
    }

    fn set_step(&mut self, ch: usize, high: bool) -> Result<(), HardwareError> {
        self.pins.set_step(self.stepper(ch), high)?;
        if high {
            self.asserted |= 1 << ch;
        } else {
            self.asserted &= !(1 << ch);
        }
        Ok(())
    }

    fn release_steps(&mut self) -> Result<(), HardwareError> {
        while self.asserted != 0 {
            let ch = self.asserted.trailing_zeros() as usize;
            self.set_step(ch, false)?;
        }
        Ok(())
    }
}
