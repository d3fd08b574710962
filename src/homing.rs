//! Homing state machine.
//!
//! Joints home in groups ordered by `home_sequence`. Every joint of a group
//! runs through
//!
//! ```text
//! None -> Search -> SearchBackoff -> LatchHit -> PreFinal -> Final
//!               \-> LatchRelease ------------/
//! ```
//!
//! driven by velocity blocks that halt a joint as soon as its limit switch
//! changes. The state machine polls the joint table at a fixed interval and
//! treats any unexpected switch state or excessive travel as fatal.

use embedded_hal::delay::DelayNs;
use libm::fabsf;

use crate::config::{HomingBounds, JointConfig};
use crate::error::{Error, EstopReason, Result};
use crate::machine::{JointState, LimitState};
use crate::planner::Planner;
use crate::MAX_JOINTS;

/// Interval between two looks at the joint table.
pub const POLL_INTERVAL_MS: u32 = 50;

/// Homing stage of one joint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HomeStage {
    /// Not being homed.
    #[default]
    None,
    /// Moving toward the switch at search velocity.
    Search,
    /// Moving off the switch before a slow approach.
    SearchBackoff,
    /// Moving off the switch at latch velocity; home is where it releases.
    LatchRelease,
    /// Approaching the switch at latch velocity; home is where it triggers.
    LatchHit,
    /// Home recorded, waiting for the group to settle.
    PreFinal,
    /// Homed.
    Final,
}

#[derive(Debug, Clone, Copy, Default)]
struct JointHoming {
    stage: HomeStage,
    last_pos: f32,
    command: f32,
}

/// Multi-joint homing sequencer.
#[derive(Debug, Clone)]
pub struct Homing {
    joints: [JointHoming; MAX_JOINTS],
    poll_ms: u32,
}

impl Default for Homing {
    fn default() -> Self {
        Self::new()
    }
}

impl Homing {
    /// Create a sequencer polling every [`POLL_INTERVAL_MS`].
    pub fn new() -> Self {
        Self {
            joints: [JointHoming::default(); MAX_JOINTS],
            poll_ms: POLL_INTERVAL_MS,
        }
    }

    /// Poll at a different interval.
    pub fn with_poll_interval(mut self, ms: u32) -> Self {
        self.poll_ms = ms;
        self
    }

    /// Stage of `joint` in the current or last run.
    pub fn stage(&self, joint: usize) -> HomeStage {
        self.joints
            .get(joint)
            .map(|j| j.stage)
            .unwrap_or_default()
    }

    /// Home every joint in `joint_mask` that has a homing sequence.
    ///
    /// Blocks until done, sleeping on `delay` between polls. On a fault the
    /// planner enters emergency stop and the reason is returned; homing is
    /// never retried.
    pub fn run<D: DelayNs, const N: usize>(
        &mut self,
        planner: &mut Planner<'_, N>,
        delay: &mut D,
        joint_mask: u32,
    ) -> Result<()> {
        if let Some(reason) = planner.machine().estop() {
            return Err(Error::Estop(reason));
        }
        self.joints = [JointHoming::default(); MAX_JOINTS];

        let config = planner.config();
        let selected = |j: usize, joint: &JointConfig| -> Option<u8> {
            if joint_mask & (1 << j) != 0 {
                joint.home_sequence
            } else {
                None
            }
        };

        let mut floor = 0u16;
        loop {
            let next = config
                .joints
                .iter()
                .enumerate()
                .filter_map(|(j, joint)| selected(j, joint))
                .filter(|seq| u16::from(*seq) >= floor)
                .min();
            let Some(sequence) = next else {
                break;
            };

            let mut group = 0u32;
            for (j, joint) in config.joints.iter().enumerate() {
                if selected(j, joint) == Some(sequence) {
                    group |= 1 << j;
                }
            }
            self.home_group(planner, delay, sequence, group)?;
            floor = u16::from(sequence) + 1;
        }

        // Let the last group settle before adopting its positions
        let joint_count = config.joints.len();
        while planner.queue_len() > 0
            || !planner.machine().joints()[..joint_count]
                .iter()
                .all(|s| s.stopped)
        {
            delay.delay_ms(self.poll_ms);
            if let Some(reason) = planner.machine().estop() {
                return Err(Error::Estop(reason));
            }
        }
        planner.sync_position();
        info!("homing complete");
        Ok(())
    }

    fn home_group<D: DelayNs, const N: usize>(
        &mut self,
        planner: &mut Planner<'_, N>,
        delay: &mut D,
        sequence: u8,
        group: u32,
    ) -> Result<()> {
        let config = planner.config();
        let machine = planner.machine();

        let mut remaining = 0u32;
        for (j, joint) in config.joints.iter().enumerate() {
            if group & (1 << j) == 0 {
                continue;
            }
            let pos = machine.joint(j).map(|s| s.pos).unwrap_or_default();
            self.joints[j] = JointHoming {
                stage: HomeStage::Search,
                last_pos: pos,
                command: joint.home_search_vel.value(),
            };
            remaining += 1;
        }
        debug!("homing group {}: {} joints", sequence, remaining);
        self.issue(planner)?;

        while remaining > 0 {
            delay.delay_ms(self.poll_ms);
            if let Some(reason) = machine.estop() {
                return Err(Error::Estop(reason));
            }

            // Stopped flags only describe the current commands once the
            // step generator picked up the last block
            let settled = planner.queue_len() == 0;
            let mut changed = false;

            for (j, joint) in config.joints.iter().enumerate() {
                if group & (1 << j) == 0 {
                    continue;
                }
                let homing = &mut self.joints[j];
                match homing.stage {
                    HomeStage::Final | HomeStage::None => continue,
                    HomeStage::PreFinal => {
                        homing.stage = HomeStage::Final;
                        machine.update_joint(j, |s| s.homed = true);
                        remaining -= 1;
                        debug!("joint {} homed", j);
                        continue;
                    }
                    _ => {}
                }

                let Some(state) = machine.joint(j) else {
                    continue;
                };
                match Self::advance(homing, joint, &state, settled) {
                    Ok(true) => {
                        if homing.stage == HomeStage::PreFinal {
                            machine.set_home(j, joint.home_position(), joint.scale);
                        }
                        changed = true;
                    }
                    Ok(false) => {}
                    Err(fault) => {
                        let reason = match fault {
                            Fault::Travel => EstopReason::TravelLimit { joint: j as u8 },
                            Fault::Limit => EstopReason::IncorrectLimitHit { joint: j as u8 },
                        };
                        error!("homing aborted on joint {}", j);
                        planner.estop(reason);
                        return Err(Error::Estop(reason));
                    }
                }
            }

            if changed {
                self.issue(planner)?;
            }
        }
        Ok(())
    }

    /// Step one joint's stage. Returns whether its command changed.
    fn advance(
        homing: &mut JointHoming,
        joint: &JointConfig,
        state: &JointState,
        settled: bool,
    ) -> core::result::Result<bool, Fault> {
        let bounds = HomingBounds::from_joint(joint);
        let allowed = if homing.stage == HomeStage::Search {
            bounds.search_travel
        } else {
            bounds.latch_travel
        };
        if fabsf(state.pos - homing.last_pos) > allowed {
            return Err(Fault::Travel);
        }
        if !settled || !state.stopped {
            return Ok(false);
        }

        let expected = if joint.homes_to_min() {
            LimitState::MinHit
        } else {
            LimitState::MaxHit
        };
        let (stage, command) = match (homing.stage, state.limit_state) {
            (HomeStage::Search, hit) if hit == expected => {
                if joint.latch_needs_backoff() {
                    (HomeStage::SearchBackoff, -joint.home_search_vel.value())
                } else {
                    (HomeStage::LatchRelease, joint.home_latch_vel.value())
                }
            }
            (HomeStage::SearchBackoff, LimitState::Normal) => {
                (HomeStage::LatchHit, joint.home_latch_vel.value())
            }
            (HomeStage::LatchRelease, LimitState::Normal) => (HomeStage::PreFinal, 0.0),
            (HomeStage::LatchHit, hit) if hit == expected => (HomeStage::PreFinal, 0.0),
            _ => return Err(Fault::Limit),
        };

        homing.stage = stage;
        homing.command = command;
        homing.last_pos = state.pos;
        Ok(true)
    }

    fn issue<const N: usize>(&self, planner: &mut Planner<'_, N>) -> Result<()> {
        let mut velocity = [0.0; MAX_JOINTS];
        for (v, j) in velocity.iter_mut().zip(self.joints.iter()) {
            *v = j.command;
        }
        planner.set_joint_velocity(&velocity, &[], true, true)
    }
}

enum Fault {
    Travel,
    Limit,
}
