//! RingMPMC - Lock-Free Bounded Multi-Producer Multi-Consumer Queues
//!
//! Two fixed-capacity MPMC queues sharing one façade, differing only in the
//! ring-buffer *index engine* that circulates slot indices between producers
//! and consumers:
//!
//! - [`ScalableCircularQueue`] - backed by the Scalable Circular Queue (SCQ)
//!   engine: two index rings of single-word cells with an embedded cycle tag,
//!   a safe/unsafe bit, and a threshold counter gating consumers.
//!   See <https://arxiv.org/abs/1908.04511>.
//! - [`PortableRingQueue`] - backed by the Lock-free Portable Ring Queue
//!   (LPRQ) engine: `(index, value)` cell pairs with a two-step publish
//!   through a thread-local "bottom" sentinel.
//!
//! Both queues publish data through a two-level protocol: a producer first
//! obtains a free slot index from the `free` ring, constructs the element in
//! place, then hands the index to the `allocated` ring. A consumer reverses
//! the trip. Every index hand-off is an acq-rel CAS, so the element write
//! happens-before any read that observes it.
//!
//! # Key Features
//!
//! - Lock-free `enqueue`/`dequeue` with bounded retry on the slow paths
//! - Overflow returns the rejected value to the caller ([`OverflowError`])
//! - Cache-line-aware index permutation to avoid false sharing
//! - Pluggable untyped allocator ([`MemoryResource`])
//!
//! # Operating assumption
//!
//! Both algorithms assume the number of threads operating on one queue
//! concurrently is at most its capacity. Producers racing for the last free
//! slots resolve cleanly: a producer that observes the free ring empty fails
//! with an overflow carrying its value back, so exactly `capacity()` of the
//! racers succeed.
//!
//! # Example
//!
//! ```
//! use ringmpmc_rs::ScalableCircularQueue;
//!
//! let queue = ScalableCircularQueue::<u64>::new(4);
//! queue.enqueue(10).unwrap();
//! queue.enqueue(20).unwrap();
//! assert_eq!(queue.size(), 2);
//! assert_eq!(queue.dequeue(), Some(10));
//! assert_eq!(queue.dequeue(), Some(20));
//! assert_eq!(queue.dequeue(), None);
//! ```
//!
//! Overflow keeps the value:
//!
//! ```
//! use ringmpmc_rs::PortableRingQueue;
//!
//! let queue = PortableRingQueue::<String>::new(1);
//! queue.enqueue("kept".to_string()).unwrap();
//! let err = queue.enqueue("rejected".to_string()).unwrap_err();
//! assert_eq!(err.into_value(), "rejected");
//! ```

mod error;
mod invariants;
mod memory;
mod mutex_queue;
mod portable_ring;
mod queue;
mod ring_buffer;
mod scalable_ring;
mod storage;

pub use error::{ErrorCode, OverflowError};
pub use memory::{GlobalResource, MemoryResource};
pub use mutex_queue::MutexQueue;
pub use portable_ring::PortableRingBuffer;
pub use queue::{LockFreeQueue, PortableRingQueue, ScalableCircularQueue};
pub use ring_buffer::{
    permute_index, RingBuffer, CACHE_LINE_SIZE, INDEX_MASK, INVALID_INDEX, OVERFLOW_INDEX,
};
pub use scalable_ring::ScalableRingBuffer;
pub use storage::DataStorage;
