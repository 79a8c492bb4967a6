use crate::invariants::debug_assert_pow2;
use crate::memory::{MemoryResource, RawArray};
use crate::ring_buffer::{permute_index, RingBuffer, INDEX_MASK, INVALID_INDEX, OVERFLOW_INDEX};
use crossbeam_utils::CachePadded;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// =============================================================================
// CELL STATE
// =============================================================================
//
// Each cell is an (index, value) pair of 64-bit atomics. The `index` word
// carries the cell's *node index* - which logical round the cell belongs to -
// in its low bits and an "unsafe" flag in the MSB. The `value` word is either
// INVALID_INDEX (empty), a committed payload, or a thread-unique "bottom"
// sentinel marking a publish in progress.
//
// A producer with ticket t publishes in three steps:
//
//   1. CAS value:  INVALID -> bottom          (claim)
//   2. CAS index:  old     -> t + n           (commit the next round)
//   3. CAS value:  bottom  -> payload         (publish)
//
// A failed step 2 reverts step 1. Consumers that find a stale bottom rewrite
// it to INVALID so an interrupted producer cannot livelock the ring, and
// poison cells they give up on by CAS-ing `UNSAFE | (h + n)` into `index`.
// =============================================================================

const UNSAFE_MASK: u64 = 1 << 63;

const UPDATE_INTERVAL: i32 = 1 << 8;
const MAX_ATTEMPTS: i32 = 4 * 1024;

struct Cell {
    index: AtomicU64,
    value: AtomicU64,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            index: AtomicU64::new(0),
            value: AtomicU64::new(INVALID_INDEX),
        }
    }
}

const DATA_SIZE: usize = mem::size_of::<Cell>();

#[inline]
fn node_index(index: u64) -> u64 {
    index & !UNSAFE_MASK
}

#[inline]
fn is_unsafe(index: u64) -> bool {
    (index & UNSAFE_MASK) == UNSAFE_MASK
}

#[inline]
fn unsafe_flagged(index: u64) -> u64 {
    UNSAFE_MASK | (INDEX_MASK & index)
}

/// A committed payload never has the MSB set, so any non-INVALID value with
/// it set is some thread's in-flight bottom sentinel.
#[inline]
fn is_bottom(value: u64) -> bool {
    value != INVALID_INDEX && is_unsafe(value)
}

/// Per-thread bottom sentinel: a pure function of the thread id, recomputed
/// on demand. The MSB distinguishes it from committed payloads.
fn thread_local_bottom() -> u64 {
    thread_local! {
        static BOTTOM: u64 = {
            let mut hasher = DefaultHasher::new();
            std::thread::current().id().hash(&mut hasher);
            hasher.finish() | UNSAFE_MASK
        };
    }
    BOTTOM.with(|bottom| *bottom)
}

/// Lock-free Portable Ring Queue (LPRQ) index engine.
///
/// `(index, value)` cell pairs with a two-step publish through a
/// thread-local bottom sentinel; one cell per queue slot and no threshold
/// counter.
pub struct PortableRingBuffer {
    head: CachePadded<AtomicU64>,
    tail: CachePadded<AtomicU64>,
    cells: RawArray<Cell>,
    resource: Arc<dyn MemoryResource>,
}

impl PortableRingBuffer {
    #[inline]
    fn permute(&self, index: u64) -> usize {
        permute_index::<DATA_SIZE>(index, self.cells.len() as u64) as usize
    }

    /// Realigns a lagging `tail` onto `head` after consumers overran the
    /// producers.
    fn fix_state(&self) {
        loop {
            let t = self.tail.load(Ordering::Acquire);
            let h = self.head.load(Ordering::Acquire);
            if self.tail.load(Ordering::Acquire) != t {
                continue;
            }
            if t < h {
                if self
                    .tail
                    .compare_exchange(t, h, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    break;
                }
                continue;
            }
            break;
        }
    }

    fn distance_of(tail: &AtomicU64, head: &AtomicU64) -> usize {
        let t = tail.load(Ordering::Acquire);
        let h = head.load(Ordering::Acquire);
        if h < t {
            (t - h) as usize
        } else {
            0
        }
    }
}

impl RingBuffer for PortableRingBuffer {
    const CELLS_PER_SLOT: usize = 1;

    fn new(resource: Arc<dyn MemoryResource>) -> Self {
        Self {
            head: CachePadded::new(AtomicU64::new(0)),
            tail: CachePadded::new(AtomicU64::new(0)),
            cells: RawArray::new(0, resource.clone()),
            resource,
        }
    }

    fn set_size(&mut self, size: usize) {
        debug_assert_pow2!(size);
        debug_assert!(size < Self::size_max());
        self.cells = RawArray::new(size, self.resource.clone());
        self.clear();
    }

    #[inline]
    fn size(&self) -> usize {
        self.cells.len()
    }

    fn clear(&mut self) {
        self.head.store(0, Ordering::Release);
        self.tail.store(0, Ordering::Release);
        let cells = self.cells.as_slice();
        for i in 0..cells.len() as u64 {
            let cell = &cells[self.permute(i)];
            cell.index.store(i, Ordering::Release);
            cell.value.store(INVALID_INDEX, Ordering::Release);
        }
    }

    fn full(&mut self) {
        let n = self.cells.len() as u64;
        self.head.store(0, Ordering::Release);
        self.tail.store(n, Ordering::Release);

        // Every cell starts committed in its first round, holding its own
        // logical position as the payload: the ring hands out all n slot
        // indices before any producer touches it.
        let cells = self.cells.as_slice();
        for i in 0..n {
            let cell = &cells[self.permute(i)];
            cell.index.store(i + n, Ordering::Release);
            cell.value.store(i, Ordering::Release);
        }
    }

    fn distance(&self) -> usize {
        Self::distance_of(&self.tail, &self.head)
    }

    fn enqueue(&self, index: u64, _nonempty: bool) -> bool {
        let bottom = thread_local_bottom();
        let cells = self.cells.as_slice();

        loop {
            let n = self.cells.len() as u64;
            let tail_ticket = self.tail.fetch_add(1, Ordering::AcqRel);
            let cell = &cells[self.permute(tail_ticket % n)];
            let cell_index = cell.index.load(Ordering::Acquire);
            let cell_value = cell.value.load(Ordering::Acquire);
            // The cell is usable if it is empty, belongs to a past round, and
            // is either safe or the consumer side provably passed it.
            if cell_value == INVALID_INDEX
                && node_index(cell_index) <= tail_ticket
                && (!is_unsafe(cell_index)
                    || self.head.load(Ordering::Acquire) <= tail_ticket)
            {
                if cell
                    .value
                    .compare_exchange(cell_value, bottom, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    if cell
                        .index
                        .compare_exchange(
                            cell_index,
                            tail_ticket + n,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        if cell
                            .value
                            .compare_exchange(bottom, index, Ordering::AcqRel, Ordering::Acquire)
                            .is_ok()
                        {
                            break;
                        }
                    } else {
                        // Lost the round: withdraw the claim.
                        let _ = cell.value.compare_exchange(
                            bottom,
                            INVALID_INDEX,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        );
                    }
                }
            }
        }
        true
    }

    fn dequeue(&self, nonempty: bool) -> u64 {
        let cells = self.cells.as_slice();

        let mut flag = true;
        let mut index = INVALID_INDEX;

        // Cautious dequeue: with nonempty asserted an empty observation means
        // the paired queue is out of room.
        if nonempty && self.distance() == 0 {
            flag = false;
            index = OVERFLOW_INDEX;
        }

        while flag {
            let n = self.cells.len() as u64;
            let head_ticket = self.head.fetch_add(1, Ordering::AcqRel);
            let cell = &cells[self.permute(head_ticket % n)];

            let mut attempt = 0i32;
            let mut tt = 0u64;

            loop {
                let cell_index = cell.index.load(Ordering::Acquire);
                index = cell.value.load(Ordering::Acquire);
                let cell_is_unsafe = is_unsafe(cell_index);
                let ni = node_index(cell_index);

                if head_ticket + n < ni {
                    // The cell already belongs to a future round.
                    break;
                }

                if index != INVALID_INDEX && !is_bottom(index) {
                    if head_ticket + n == ni {
                        // Our round's payload: take it.
                        cell.value.store(INVALID_INDEX, Ordering::Release);
                        flag = false;
                        break;
                    }
                    // A producer finished an older round; shut the cell so
                    // that round is skipped.
                    if cell_is_unsafe {
                        if cell.index.load(Ordering::Acquire) == cell_index {
                            break;
                        }
                    } else if cell
                        .index
                        .compare_exchange(
                            cell_index,
                            unsafe_flagged(ni),
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        break;
                    }
                } else {
                    // Empty or mid-publish. Wait for the producer within the
                    // retry budget while the ring looks nonempty, then poison
                    // the cell for this round.
                    if attempt % UPDATE_INTERVAL == 0 {
                        tt = self.tail.load(Ordering::Acquire);
                    }
                    let t = node_index(tt);
                    if cell_is_unsafe || t < head_ticket + 1 || MAX_ATTEMPTS < attempt {
                        if is_bottom(index)
                            && cell
                                .value
                                .compare_exchange(
                                    index,
                                    INVALID_INDEX,
                                    Ordering::AcqRel,
                                    Ordering::Acquire,
                                )
                                .is_err()
                        {
                            continue;
                        }
                        if cell
                            .index
                            .compare_exchange(
                                cell_index,
                                unsafe_flagged(head_ticket + n),
                                Ordering::AcqRel,
                                Ordering::Acquire,
                            )
                            .is_ok()
                        {
                            break;
                        }
                    }
                    attempt += 1;
                }
            }

            if flag && node_index(self.tail.load(Ordering::Acquire)) <= head_ticket + 1 {
                self.fix_state();
                index = INVALID_INDEX;
                flag = false;
            }
        }
        index
    }
}
