//! Fixed-capacity ring buffer of motion blocks.
//!
//! Slots `[rdptr, rdptr + counter)` are committed and visible to the
//! consumer. The `pending` slots after them have been added by the producer
//! and take part in look-ahead but cannot be fetched until the next commit.
//! `free` is the reservation count: with no reservation outstanding,
//! `counter + pending + free == N`.
//!
//! Every method takes `&mut self`; callers sharing the queue between a
//! producer and the step interrupt go through [`super::SharedQueue`], which
//! wraps each call in a critical section.

use heapless::Vec;

use super::block::{Block, BlockKind, BlockMode};
use super::lookahead;

/// Permission to add one block, obtained from [`PlannerQueue::try_reserve`].
///
/// Carries the era the block will be stamped with. A reservation that
/// predates an emergency stop is refused by [`PlannerQueue::add_block`].
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a reservation holds a queue slot until it is added"]
pub struct Reservation {
    era: u32,
}

impl Reservation {
    /// Era the reserved block will carry.
    pub fn era(&self) -> u32 {
        self.era
    }
}

/// Contiguous copy of the look-ahead window.
#[derive(Debug, Clone)]
pub(crate) struct Window<const N: usize> {
    start: usize,
    pub(crate) blocks: Vec<Block, N>,
    pub(crate) last_exit_speed: f32,
}

/// Ring buffer of `N` motion blocks.
#[derive(Debug, Clone)]
pub struct PlannerQueue<const N: usize> {
    buffer: [Block; N],
    rdptr: usize,
    wrptr: usize,
    counter: usize,
    pending: usize,
    free: usize,
    last_exit_speed: f32,
    next_era: u32,
    era_floor: u32,
}

impl<const N: usize> Default for PlannerQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> PlannerQueue<N> {
    /// Create an empty queue.
    pub const fn new() -> Self {
        Self {
            buffer: [Block::idle(); N],
            rdptr: 0,
            wrptr: 0,
            counter: 0,
            pending: 0,
            free: N,
            last_exit_speed: 0.0,
            next_era: 1,
            era_floor: 0,
        }
    }

    /// Reset counters and cursors; every slot becomes free.
    ///
    /// Eras keep increasing so blocks handed out before the reset stay
    /// recognisable as stale.
    pub fn init(&mut self) {
        self.rdptr = 0;
        self.wrptr = 0;
        self.counter = 0;
        self.pending = 0;
        self.free = N;
        self.last_exit_speed = 0.0;
        self.era_floor = self.next_era;
    }

    /// Number of slots.
    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Committed blocks, visible to the consumer.
    #[inline]
    pub fn len(&self) -> usize {
        self.counter
    }

    /// Whether no committed block is waiting.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.counter == 0
    }

    /// Added but not yet committed blocks.
    #[inline]
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Slots still available for reservation.
    #[inline]
    pub fn free_slots(&self) -> usize {
        self.free
    }

    /// Exit speed of the most recently fetched block.
    #[inline]
    pub fn last_exit_speed(&self) -> f32 {
        self.last_exit_speed
    }

    /// Blocks with an era below this value predate the last emergency stop.
    #[inline]
    pub fn era_floor(&self) -> u32 {
        self.era_floor
    }

    /// Claim one slot if available.
    pub fn try_reserve(&mut self) -> Option<Reservation> {
        if self.free == 0 {
            return None;
        }
        self.free -= 1;
        let era = self.next_era;
        self.next_era = self.next_era.wrapping_add(1);
        Some(Reservation { era })
    }

    /// Write `block` into the reserved slot at the write cursor.
    ///
    /// The block joins the look-ahead window but stays invisible to the
    /// consumer until [`commit`](Self::commit). Returns `false`, leaving the
    /// queue untouched, when the reservation predates an emergency stop.
    pub fn add_block(&mut self, reservation: Reservation, mut block: Block) -> bool {
        if reservation.era < self.era_floor {
            debug!("dropping stale block, era {}", reservation.era);
            return false;
        }

        block.busy = false;
        block.era = reservation.era;
        if let Some(p) = block.positional_mut() {
            p.is_profile_valid = false;
        }

        self.buffer[self.wrptr] = block;
        self.pending += 1;
        self.wrptr = (self.wrptr + 1) % N;
        true
    }

    /// Make every added block visible to the consumer.
    pub fn commit(&mut self) {
        self.counter += self.pending;
        self.pending = 0;
    }

    /// Hand the head block to the consumer.
    ///
    /// While the consumer is executing a positional block (`current_mode ==
    /// Positional`) only an `Estop` head is handed out.
    pub fn fetch_block_i(&mut self, current_mode: BlockMode) -> Option<Block> {
        if self.counter == 0 {
            return None;
        }

        let head = &mut self.buffer[self.rdptr];
        if current_mode == BlockMode::Positional && head.mode() != BlockMode::Estop {
            return None;
        }

        head.busy = true;
        let out = *head;
        self.last_exit_speed = out.exit_speed();
        self.counter -= 1;
        self.rdptr = (self.rdptr + 1) % N;
        self.free += 1;
        Some(out)
    }

    /// Replace the whole queue with a single `block` at the read cursor.
    ///
    /// Every committed and pending block is discarded and outstanding
    /// reservations become stale. Used to inject an emergency stop.
    pub fn interrupt_commit(&mut self, mut block: Block) {
        let era = self.next_era;
        self.next_era = self.next_era.wrapping_add(1);
        self.era_floor = era;

        block.busy = false;
        block.era = era;
        self.buffer[self.rdptr] = block;
        self.counter = 1;
        self.pending = 0;
        self.wrptr = (self.rdptr + 1) % N;
        self.free = N - 1;
        self.last_exit_speed = 0.0;
    }

    /// Recalculate exit speeds and trapezoids over committed and pending
    /// blocks, then commit.
    pub fn recalculate(&mut self) {
        if let Some(mut window) = self.snapshot() {
            lookahead::recalculate(&mut window.blocks, window.last_exit_speed);
            let _ = self.apply(&window);
        }
        self.commit();
    }

    /// Block at `offset` from the read cursor, if inside the window.
    pub fn peek(&self, offset: usize) -> Option<&Block> {
        if offset >= self.counter + self.pending {
            return None;
        }
        self.buffer.get((self.rdptr + offset) % N)
    }

    /// Copy the look-ahead window out, or `None` when it is empty.
    pub(crate) fn snapshot(&self) -> Option<Window<N>> {
        let len = self.counter + self.pending;
        if len == 0 {
            return None;
        }

        let mut blocks = Vec::new();
        for i in 0..len {
            let _ = blocks.push(self.buffer[(self.rdptr + i) % N]);
        }
        Some(Window {
            start: self.rdptr,
            blocks,
            last_exit_speed: self.last_exit_speed,
        })
    }

    /// Write recalculated payloads back into slots that still hold the same
    /// block and have not been claimed by the consumer.
    ///
    /// Returns `false` without writing anything when the consumer fetched a
    /// block since the snapshot: the window's entry speed is then out of date.
    pub(crate) fn apply(&mut self, window: &Window<N>) -> bool {
        if window.start != self.rdptr {
            return false;
        }
        for (i, planned) in window.blocks.iter().enumerate() {
            let slot = &mut self.buffer[(window.start + i) % N];
            if slot.era != planned.era || slot.busy {
                continue;
            }
            if let (BlockKind::Positional(dst), BlockKind::Positional(src)) =
                (&mut slot.kind, &planned.kind)
            {
                *dst = *src;
            }
        }
        true
    }
}
