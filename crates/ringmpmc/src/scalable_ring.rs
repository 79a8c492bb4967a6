use crate::invariants::debug_assert_pow2;
use crate::memory::{MemoryResource, RawArray};
use crate::ring_buffer::{
    permute_index, wrapping_ge, wrapping_gt, wrapping_le, wrapping_lt, RingBuffer, INVALID_INDEX,
    OVERFLOW_INDEX,
};
use crossbeam_utils::CachePadded;
use std::mem;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

// =============================================================================
// CELL WORD ENCODING
// =============================================================================
//
// Each cell is a single AtomicU64 packing three things for a ring of n cells
// (n is twice the paired queue's capacity):
//
//   [ cycle tag (high bits) | safe bit (the n bit) | payload (low n-1 bits) ]
//
// A cell's cycle is recovered as `entry | (2n - 1)` and compared against the
// ticket cycle `(ticket << 1) | (2n - 1)`; the wrapped-difference comparison
// keeps this valid across u64 wrap. A producer commits by CAS-ing
// `tail_cycle ^ (value ^ (n - 1))`, which leaves the payload in the low bits
// and the n bit set ("safe"). A consumer takes by OR-ing `n - 1` into the
// word, turning it into the fully-set cycle pattern the next producer expects.
// A lagging consumer skips a cell by clearing the n bit ("unsafe"), and a
// producer only reuses an unsafe cell once `head` provably passed it.
//
// The threshold counter gates consumers: negative means empty, and producers
// lift it to 3n/2 - 1 whenever they publish.
// =============================================================================

const ATTEMPT_MASK: i32 = (1 << 8) - 1;
const MAX_ATTEMPTS: i32 = 1 << 12;

const DATA_SIZE: usize = mem::size_of::<AtomicU64>();

/// Scalable Circular Queue (SCQ) index engine.
///
/// Single-word cells with an embedded cycle tag and safe bit, plus a
/// threshold counter that lets consumers bail out of an empty ring without
/// taking tickets. Uses two cells per queue slot.
pub struct ScalableRingBuffer {
    head: CachePadded<AtomicU64>,
    threshold: CachePadded<AtomicI64>,
    tail: CachePadded<AtomicU64>,
    cells: RawArray<AtomicU64>,
    resource: Arc<dyn MemoryResource>,
}

impl ScalableRingBuffer {
    /// Current threshold value. Diagnostic: `-1` at rest means the ring is
    /// empty and consumers return immediately.
    #[must_use]
    pub fn threshold(&self) -> i64 {
        self.threshold.load(Ordering::Acquire)
    }

    #[inline]
    fn permute(&self, index: u64) -> usize {
        permute_index::<DATA_SIZE>(index, self.cells.len() as u64) as usize
    }

    #[inline]
    fn calc_threshold3(half: u64) -> i64 {
        (3 * half).wrapping_sub(1) as i64
    }

    /// Realigns `tail` onto an advanced `head` after consumers outran
    /// producers. Terminates as soon as `tail >= head` is observed.
    fn catch_up(&self, mut tailp: u64, mut headp: u64) {
        while self
            .tail
            .compare_exchange_weak(tailp, headp, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tailp = self.tail.load(Ordering::Acquire);
            headp = self.head.load(Ordering::Acquire);
            if wrapping_ge(tailp, headp) {
                break;
            }
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

impl RingBuffer for ScalableRingBuffer {
    const CELLS_PER_SLOT: usize = 2;

    fn new(resource: Arc<dyn MemoryResource>) -> Self {
        Self {
            head: CachePadded::new(AtomicU64::new(0)),
            threshold: CachePadded::new(AtomicI64::new(-1)),
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
        self.threshold.store(-1, Ordering::Release);
        self.tail.store(0, Ordering::Release);
        for cell in self.cells.as_slice() {
            cell.store(INVALID_INDEX, Ordering::Release);
        }
    }

    fn full(&mut self) {
        let n = self.cells.len() as u64;
        let half = n >> 1;

        self.head.store(0, Ordering::Release);
        self.threshold
            .store(Self::calc_threshold3(half), Ordering::Release);
        self.tail.store(half, Ordering::Release);

        // The lower half of the logical positions is preloaded with the
        // queue's slot indices (permuted over the slot count so consecutive
        // grants hit distinct cache lines of the slot array); the upper half
        // stays empty. The preload values sit in a "second round" position
        // relative to head = 0, which is what lets the first `half` dequeues
        // succeed without any cycle bumping.
        for i in 0..n {
            let index = self.permute(i);
            let v = if i < half {
                permute_index::<DATA_SIZE>(n + i, half)
            } else {
                INVALID_INDEX
            };
            self.cells.as_slice()[index].store(v, Ordering::Release);
        }
    }

    fn distance(&self) -> usize {
        Self::distance_of(&self.tail, &self.head)
    }

    fn enqueue(&self, index: u64, nonempty: bool) -> bool {
        let cells = self.cells.as_slice();

        let mut tailp = 0u64;
        let mut tail_cycle = 0u64;
        let mut tail_index = 0usize;
        let mut entry = 0u64;
        let mut retry = false;
        loop {
            let n = self.cells.len() as u64;
            if !retry {
                tailp = self.tail.fetch_add(1, Ordering::AcqRel);
                tail_cycle = (tailp << 1) | (2 * n - 1);
                tail_index = self.permute(tailp);
                entry = cells[tail_index].load(Ordering::Acquire);
            }
            retry = false;
            let entry_cycle = entry | (2 * n - 1);
            // Commit only into a cell whose cycle is behind ours and which is
            // either consumed in its round or marked unsafe with the consumer
            // provably past it.
            if wrapping_lt(entry_cycle, tail_cycle)
                && ((entry == entry_cycle)
                    || ((entry == (entry_cycle ^ n))
                        && wrapping_le(self.head.load(Ordering::Acquire), tailp)))
            {
                let entry_index = index ^ (n - 1);
                match cells[tail_index].compare_exchange_weak(
                    entry,
                    tail_cycle ^ entry_index,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Err(actual) => {
                        entry = actual;
                        retry = true;
                        continue;
                    }
                    Ok(_) => {
                        let half = n >> 1;
                        let threshold3 = Self::calc_threshold3(half);
                        if !nonempty && self.threshold.load(Ordering::Acquire) != threshold3 {
                            self.threshold.store(threshold3, Ordering::Release);
                        }
                        break;
                    }
                }
            }
        }
        true
    }

    fn dequeue(&self, nonempty: bool) -> u64 {
        let cells = self.cells.as_slice();

        let mut index = INVALID_INDEX;
        let mut headp = 0u64;
        let mut tailp = 0u64;
        let mut head_cycle = 0u64;
        let mut head_index = 0usize;
        let mut attempt = 0i32;
        let mut flag = nonempty || 0 <= self.threshold.load(Ordering::Acquire);
        let mut again = false;

        // Cautious dequeue: with nonempty asserted an empty observation means
        // the paired queue is out of room.
        if nonempty && self.distance() == 0 {
            flag = false;
            index = OVERFLOW_INDEX;
        }

        while flag {
            let n = self.cells.len() as u64;
            if !again {
                headp = self.head.fetch_add(1, Ordering::AcqRel);
                head_cycle = (headp << 1) | (2 * n - 1);
                head_index = self.permute(headp);
                attempt = 0;
            }
            again = false;
            let mut entry = cells[head_index].load(Ordering::Acquire);
            loop {
                let entry_cycle = entry | (2 * n - 1);
                flag = entry_cycle != head_cycle;
                let entry_new;
                if !flag {
                    // Cycle match: take the payload and leave the
                    // fully-consumed pattern behind.
                    cells[head_index].fetch_or(n - 1, Ordering::AcqRel);
                    index = entry & (n - 1);
                    break;
                } else if (entry | n) != entry_cycle {
                    // A value from an older round: mark the cell unsafe so
                    // its producer's round is skipped.
                    entry_new = entry & !n;
                    if entry == entry_new {
                        break;
                    }
                } else {
                    // Empty cell from an older round. Wait for a producer
                    // within the retry budget while the ring is nonempty,
                    // resampling tail every 256 attempts; otherwise close the
                    // cell for this cycle.
                    if (attempt & ATTEMPT_MASK) == 0 {
                        tailp = self.tail.load(Ordering::Acquire);
                    }
                    attempt += 1;
                    again = attempt <= MAX_ATTEMPTS && wrapping_ge(tailp, headp.wrapping_add(1));
                    if again {
                        break;
                    }
                    entry_new = head_cycle ^ ((!entry) & n);
                }
                if !wrapping_lt(entry_cycle, head_cycle) {
                    break;
                }
                match cells[head_index].compare_exchange_weak(
                    entry,
                    entry_new,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => break,
                    Err(actual) => entry = actual,
                }
            }
            if flag && !again {
                if nonempty {
                    // Racing takers can drain the ring mid-call. Once no
                    // published entry remains at or ahead of our ticket,
                    // realign tail and report overflow; retrying would wait
                    // on an index that may never come back.
                    tailp = self.tail.load(Ordering::Acquire);
                    if wrapping_le(tailp, headp.wrapping_add(1)) {
                        self.catch_up(tailp, headp.wrapping_add(1));
                        index = OVERFLOW_INDEX;
                        flag = false;
                    }
                } else {
                    tailp = self.tail.load(Ordering::Acquire);
                    flag = wrapping_gt(tailp, headp.wrapping_add(1));
                    if flag {
                        // Values remain ahead; spend one threshold unit and
                        // take a fresh ticket, unless the threshold ran out.
                        flag = 0 < self.threshold.fetch_sub(1, Ordering::AcqRel);
                        if !flag {
                            index = INVALID_INDEX;
                        }
                    } else {
                        self.catch_up(tailp, headp.wrapping_add(1));
                        self.threshold.fetch_sub(1, Ordering::AcqRel);
                        index = INVALID_INDEX;
                    }
                }
            }
        }
        index
    }
}
