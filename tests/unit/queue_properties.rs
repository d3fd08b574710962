//! Property tests for the planner queue.

use std::collections::VecDeque;

use motion_core::planner::{Block, BlockKind, BlockMode, PlannerQueue};
use motion_core::{EstopReason, MAX_CHANNELS};
use proptest::prelude::*;

const DEPTH: usize = 8;

fn tagged(id: i32) -> Block {
    Block::new(BlockKind::Reset([id; MAX_CHANNELS]))
}

fn tag(block: &Block) -> Option<i32> {
    match block.kind {
        BlockKind::Reset(steps) => Some(steps[0]),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Reserve,
    Add,
    Commit,
    Fetch,
    Recalculate,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Reserve),
        Just(Op::Add),
        Just(Op::Commit),
        Just(Op::Fetch),
        Just(Op::Recalculate),
    ]
}

proptest! {
    /// Slots are never lost or double counted and blocks leave in the order
    /// they were added.
    #[test]
    fn prop_capacity_and_fifo(ops in prop::collection::vec(op(), 1..300)) {
        let mut queue: PlannerQueue<DEPTH> = PlannerQueue::new();
        let mut held = Vec::new();
        let mut added = VecDeque::new();
        let mut next_id = 0;

        for op in ops {
            match op {
                Op::Reserve => {
                    if let Some(r) = queue.try_reserve() {
                        held.push(r);
                    }
                }
                Op::Add => {
                    if let Some(r) = held.pop() {
                        prop_assert!(queue.add_block(r, tagged(next_id)));
                        added.push_back(next_id);
                        next_id += 1;
                    }
                }
                Op::Commit => queue.commit(),
                Op::Fetch => {
                    if let Some(block) = queue.fetch_block_i(BlockMode::Idle) {
                        prop_assert_eq!(tag(&block), added.pop_front());
                    }
                }
                Op::Recalculate => queue.recalculate(),
            }

            prop_assert_eq!(
                queue.len() + queue.pending() + queue.free_slots() + held.len(),
                DEPTH
            );
            prop_assert!(queue.len() + queue.pending() <= DEPTH);
        }
    }

    /// After an interrupt commit the estop block is the only thing left, and
    /// nothing reserved before it gets in.
    #[test]
    fn prop_interrupt_discards_everything(
        queued in 0usize..DEPTH,
        held_before in 0usize..3,
    ) {
        let mut queue: PlannerQueue<DEPTH> = PlannerQueue::new();
        for id in 0..queued as i32 {
            let r = queue.try_reserve().unwrap();
            prop_assert!(queue.add_block(r, tagged(id)));
        }
        queue.commit();

        let mut stale = Vec::new();
        for _ in 0..held_before.min(DEPTH - queued) {
            stale.push(queue.try_reserve().unwrap());
        }

        queue.interrupt_commit(Block::new(BlockKind::Estop(EstopReason::Requested)));
        for r in stale {
            prop_assert!(!queue.add_block(r, tagged(-1)));
        }
        queue.commit();

        let block = queue.fetch_block_i(BlockMode::Positional).unwrap();
        prop_assert_eq!(block.kind, BlockKind::Estop(EstopReason::Requested));
        prop_assert!(queue.fetch_block_i(BlockMode::Idle).is_none());
        prop_assert_eq!(queue.free_slots(), DEPTH);
    }
}

#[test]
fn test_full_queue_refuses_reservations() {
    let mut queue: PlannerQueue<DEPTH> = PlannerQueue::new();
    for id in 0..DEPTH as i32 {
        let r = queue.try_reserve().unwrap();
        assert!(queue.add_block(r, tagged(id)));
    }
    assert!(queue.try_reserve().is_none());

    queue.commit();
    assert!(queue.try_reserve().is_none());

    queue.fetch_block_i(BlockMode::Idle).unwrap();
    assert!(queue.try_reserve().is_some());
}
