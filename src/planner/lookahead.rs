//! Look-ahead velocity smoothing over a window of queued blocks.
//!
//! The reverse pass raises each exit speed as far as the following move can
//! still brake from; the forward pass lowers it to what the move can reach
//! from its entry speed, and recomputes the trapezoid of every block whose
//! entry or exit speed moved.

use super::block::{Block, PositionalBlock};
use super::trapezoid::{reachable_speed, Trapezoid};
use crate::MAX_CHANNELS;

/// Highest exit speed of `current` that joins `next` without a velocity jump
/// on any channel.
///
/// For every channel moving in `next`, the time `current` would need to
/// cover its own displacement at `next`'s channel velocity bounds how fast
/// `current` may be when it ends. A channel that stops or reverses forces a
/// full stop.
pub fn max_exit_speed(current: &PositionalBlock, next: &PositionalBlock) -> f32 {
    if current.duration <= 0.0 || next.duration <= 0.0 {
        return 0.0;
    }

    let mut slowest = 0.0f32;
    for i in 0..MAX_CHANNELS {
        let cur = current.delta[i];
        let nxt = next.delta[i];
        if nxt == 0.0 {
            if cur != 0.0 {
                return 0.0;
            }
            continue;
        }
        let v = nxt / next.duration;
        let d = cur / v;
        if d < 0.0 {
            return 0.0;
        }
        slowest = slowest.max(d);
    }

    current.nominal_speed * current.duration / slowest.max(current.duration)
}

/// Walk the window tail to head, raising exit speeds.
pub fn reverse_pass(window: &mut [Block]) {
    let mut successor: Option<PositionalBlock> = None;

    for block in window.iter_mut().rev() {
        if block.busy {
            break;
        }
        let Some(p) = block.positional_mut() else {
            successor = None;
            continue;
        };

        let Some(next) = successor else {
            // No look-ahead information: come to rest
            p.is_max_exit_speed_valid = false;
            if p.exit_speed != 0.0 {
                p.exit_speed = 0.0;
                p.is_profile_valid = false;
            }
            successor = Some(*p);
            continue;
        };

        if !p.is_max_exit_speed_valid {
            p.max_exit_speed = max_exit_speed(p, &next);
            p.is_max_exit_speed_valid = true;
        }

        if p.exit_speed == p.max_exit_speed {
            // Already as fast as it can get; nothing earlier changes
            break;
        }

        p.is_profile_valid = false;
        p.exit_speed = if next.is_nominal_length {
            p.max_exit_speed
        } else {
            reachable_speed(next.exit_speed, next.acc, next.distance).min(p.max_exit_speed)
        };
        successor = Some(*p);
    }
}

/// Walk the window head to tail, lowering exit speeds to what is reachable
/// and recomputing invalidated trapezoids.
pub fn forward_pass(window: &mut [Block], last_exit_speed: f32) {
    let mut last = last_exit_speed;

    for block in window.iter_mut() {
        if block.busy {
            last = block.exit_speed();
            continue;
        }
        let Some(p) = block.positional_mut() else {
            last = 0.0;
            continue;
        };

        if !p.is_nominal_length && p.is_max_exit_speed_valid && last < p.exit_speed {
            let reachable = reachable_speed(last, p.acc, p.distance);
            if reachable < p.exit_speed {
                p.exit_speed = reachable;
                p.is_profile_valid = false;
            }
        }

        if p.entry_speed != last {
            p.is_profile_valid = false;
        }
        if !p.is_profile_valid {
            Trapezoid::apply(p, last);
        }

        last = p.exit_speed;
    }
}

/// Run both passes over `window`, whose first block follows a consumed block
/// that exits at `last_exit_speed`.
pub fn recalculate(window: &mut [Block], last_exit_speed: f32) {
    reverse_pass(window);
    forward_pass(window, last_exit_speed);
}
