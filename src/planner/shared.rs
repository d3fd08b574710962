//! Planner queue shared between a producer thread and the step interrupt.

use core::cell::RefCell;

use critical_section::Mutex;

use super::block::{Block, BlockMode};
use super::lookahead;
use super::queue::{PlannerQueue, Reservation};

/// [`PlannerQueue`] behind a critical section.
///
/// Cursor and counter updates happen inside `critical_section::with`. The
/// look-ahead itself runs outside the section on a copy of the window, so the
/// step interrupt is never held up by recalculation.
pub struct SharedQueue<const N: usize> {
    inner: Mutex<RefCell<PlannerQueue<N>>>,
}

impl<const N: usize> Default for SharedQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> SharedQueue<N> {
    /// Create an empty queue. Usable in a `static`.
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(PlannerQueue::new())),
        }
    }

    /// Run `f` on the queue inside a critical section.
    pub fn with<R>(&self, f: impl FnOnce(&mut PlannerQueue<N>) -> R) -> R {
        critical_section::with(|cs| f(&mut self.inner.borrow_ref_mut(cs)))
    }

    /// Claim a slot if one is free.
    pub fn try_reserve(&self) -> Option<Reservation> {
        self.with(|q| q.try_reserve())
    }

    /// Claim a slot, calling `wait` between attempts until one is free.
    ///
    /// Never times out: a full queue stalls the producer until the step
    /// generator consumes a block.
    pub fn reserve_block_with(&self, mut wait: impl FnMut()) -> Reservation {
        loop {
            if let Some(reservation) = self.try_reserve() {
                return reservation;
            }
            wait();
        }
    }

    /// Claim a slot, yielding the thread while the queue is full.
    #[cfg(feature = "std")]
    pub fn reserve_block(&self) -> Reservation {
        self.reserve_block_with(std::thread::yield_now)
    }

    /// See [`PlannerQueue::add_block`].
    pub fn add_block(&self, reservation: Reservation, block: Block) -> bool {
        self.with(|q| q.add_block(reservation, block))
    }

    /// See [`PlannerQueue::commit`].
    pub fn commit(&self) {
        self.with(|q| q.commit())
    }

    /// See [`PlannerQueue::fetch_block_i`]. Safe to call from the step interrupt.
    pub fn fetch_block_i(&self, current_mode: BlockMode) -> Option<Block> {
        self.with(|q| q.fetch_block_i(current_mode))
    }

    /// See [`PlannerQueue::interrupt_commit`].
    pub fn interrupt_commit(&self, block: Block) {
        self.with(|q| q.interrupt_commit(block))
    }

    /// Committed block count.
    pub fn len(&self) -> usize {
        self.with(|q| q.len())
    }

    /// Whether no committed block is waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// See [`PlannerQueue::era_floor`].
    pub fn era_floor(&self) -> u32 {
        self.with(|q| q.era_floor())
    }

    /// Recalculate the look-ahead window, then commit.
    ///
    /// The window is copied out in one critical section and written back in
    /// another. If the consumer fetched a block in between, the pass is
    /// repeated on a fresh copy.
    pub fn recalculate(&self) {
        loop {
            let Some(mut window) = self.with(|q| q.snapshot()) else {
                self.commit();
                return;
            };

            lookahead::recalculate(&mut window.blocks, window.last_exit_speed);

            let applied = self.with(|q| {
                let applied = q.apply(&window);
                if applied {
                    q.commit();
                }
                applied
            });
            if applied {
                return;
            }
            trace!("window moved during recalculation, retrying");
        }
    }
}
