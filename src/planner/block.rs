//! Motion blocks: the unit of planning held in the queue.

use crate::error::EstopReason;
use crate::MAX_CHANNELS;

/// One value per planner channel (joints first, then extruders).
pub type ChannelVector = [f32; MAX_CHANNELS];

/// Discriminant of a [`Block`], used where the payload is irrelevant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BlockMode {
    /// No-op marker.
    Idle,
    /// Position rebase marker.
    Reset,
    /// Direct joint/extruder velocity command.
    Velocity,
    /// Planned move.
    Positional,
    /// Emergency stop.
    Estop,
    /// Leave emergency stop.
    EstopClear,
}

/// Velocity and ramp rate of one channel in a velocity block.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChannelVelocity {
    /// Target velocity in machine units per second (signed).
    pub velocity: f32,
    /// Ramp rate toward the target in machine units per second squared.
    pub acceleration: f32,
}

/// Payload of a velocity block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VelocityBlock {
    /// Per channel velocity targets.
    pub channels: [ChannelVelocity; MAX_CHANNELS],
    /// Halt a joint as soon as its limit switch state changes.
    pub stop_on_limit_changes: bool,
}

/// Payload of a planned move.
///
/// Speeds, accelerations and distances are along the move, in machine units
/// of the Euclidean norm over all channels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionalBlock {
    /// Physical position at the end of the move.
    pub target: ChannelVector,
    /// Physical displacement of the move.
    pub delta: ChannelVector,
    /// Absolute step count per channel.
    pub steps: [u32; MAX_CHANNELS],
    /// Bit `i` set when channel `i` moves toward negative positions.
    pub dir_mask: u16,
    /// Time the move takes at nominal speed.
    pub duration: f32,
    /// Limiting acceleration along the move.
    pub acc: f32,
    /// Length of the move.
    pub distance: f32,
    /// Commanded cruise speed.
    pub nominal_speed: f32,
    /// Planned speed at the start, set with the trapezoid.
    pub entry_speed: f32,
    /// Planned speed at the end.
    pub exit_speed: f32,
    /// Highest exit speed compatible with the following move.
    pub max_exit_speed: f32,
    /// `max_exit_speed` has been computed against the current successor.
    pub is_max_exit_speed_valid: bool,
    /// The move can reach nominal speed from rest and brake back within its length.
    pub is_nominal_length: bool,
    /// The trapezoid matches the current entry and exit speeds.
    pub is_profile_valid: bool,
    /// Distance after which the move decelerates.
    pub decelerate_after: f32,
}

impl PositionalBlock {
    /// Build a move from its displacement. Look-ahead fields start at rest.
    pub fn new(
        target: ChannelVector,
        delta: ChannelVector,
        steps: [i32; MAX_CHANNELS],
        nominal_speed: f32,
        acc: f32,
    ) -> Self {
        let distance = libm::sqrtf(delta.iter().map(|d| d * d).sum());
        let mut abs_steps = [0u32; MAX_CHANNELS];
        let mut dir_mask = 0u16;
        for (i, s) in steps.iter().enumerate() {
            abs_steps[i] = s.unsigned_abs();
            if *s < 0 {
                dir_mask |= 1 << i;
            }
        }
        let duration = if nominal_speed > 0.0 { distance / nominal_speed } else { 0.0 };

        Self {
            target,
            delta,
            steps: abs_steps,
            dir_mask,
            duration,
            acc,
            distance,
            nominal_speed,
            entry_speed: 0.0,
            exit_speed: 0.0,
            max_exit_speed: 0.0,
            is_max_exit_speed_valid: false,
            is_nominal_length: nominal_speed * nominal_speed <= acc * distance,
            is_profile_valid: false,
            decelerate_after: 0.0,
        }
    }

    /// Largest per-channel step count.
    pub fn max_steps(&self) -> u32 {
        self.steps.iter().copied().max().unwrap_or(0)
    }

    /// Whether channel `i` moves toward negative positions.
    #[inline]
    pub fn is_reverse(&self, channel: usize) -> bool {
        self.dir_mask & (1 << channel) != 0
    }
}

/// Block payload keyed by mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BlockKind {
    /// No-op marker.
    Idle,
    /// Adopt these absolute step positions when consumed.
    Reset([i32; MAX_CHANNELS]),
    /// Joint/extruder velocity command.
    Velocity(VelocityBlock),
    /// Planned move.
    Positional(PositionalBlock),
    /// Emergency stop.
    Estop(EstopReason),
    /// Leave emergency stop.
    EstopClear,
}

/// A queue slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Block {
    /// Payload.
    pub kind: BlockKind,
    /// Claimed by the consumer; look-ahead must not touch it.
    pub busy: bool,
    /// Sequence number assigned when the slot was reserved.
    pub era: u32,
}

impl Block {
    /// Wrap a payload. `busy` and `era` are set by the queue.
    pub const fn new(kind: BlockKind) -> Self {
        Self {
            kind,
            busy: false,
            era: 0,
        }
    }

    /// Empty slot.
    pub const fn idle() -> Self {
        Self::new(BlockKind::Idle)
    }

    /// Mode of the payload.
    pub fn mode(&self) -> BlockMode {
        match self.kind {
            BlockKind::Idle => BlockMode::Idle,
            BlockKind::Reset(_) => BlockMode::Reset,
            BlockKind::Velocity(_) => BlockMode::Velocity,
            BlockKind::Positional(_) => BlockMode::Positional,
            BlockKind::Estop(_) => BlockMode::Estop,
            BlockKind::EstopClear => BlockMode::EstopClear,
        }
    }

    /// Positional payload, if any.
    pub fn positional(&self) -> Option<&PositionalBlock> {
        match &self.kind {
            BlockKind::Positional(p) => Some(p),
            _ => None,
        }
    }

    /// Mutable positional payload, if any.
    pub fn positional_mut(&mut self) -> Option<&mut PositionalBlock> {
        match &mut self.kind {
            BlockKind::Positional(p) => Some(p),
            _ => None,
        }
    }

    /// Exit speed the consumer leaves this block at.
    pub fn exit_speed(&self) -> f32 {
        self.positional().map(|p| p.exit_speed).unwrap_or(0.0)
    }
}

impl Default for Block {
    fn default() -> Self {
        Self::idle()
    }
}
