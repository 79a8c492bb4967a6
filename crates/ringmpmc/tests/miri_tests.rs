//! Miri-compatible tests for detecting undefined behavior.
//!
//! Run with: `cargo +nightly miri test --test miri_tests`
//!
//! Small capacities and short runs keep the interpreter fast while still
//! driving every unsafe path: raw backing allocation, in-place construction,
//! move-out, wrap-around slot reuse, drop of unconsumed elements, and the
//! index engines' cell CAS protocols.

use ringmpmc_rs::{
    LockFreeQueue, MutexQueue, PortableRingBuffer, PortableRingQueue, RingBuffer,
    ScalableCircularQueue, ScalableRingBuffer,
};
use std::thread;

fn roundtrip<B: RingBuffer>() {
    let queue = LockFreeQueue::<u64, B>::new(4);
    queue.enqueue(100).unwrap();
    queue.enqueue(200).unwrap();
    assert_eq!(queue.dequeue(), Some(100));
    assert_eq!(queue.dequeue(), Some(200));
    assert_eq!(queue.dequeue(), None);
}

fn wrap_around<B: RingBuffer>() {
    let queue = LockFreeQueue::<u32, B>::new(2);
    for round in 0..6 {
        queue.enqueue(round * 10).unwrap();
        queue.enqueue(round * 10 + 1).unwrap();
        assert_eq!(queue.dequeue(), Some(round * 10));
        assert_eq!(queue.dequeue(), Some(round * 10 + 1));
    }
}

fn heap_values_drop<B: RingBuffer>() {
    let queue = LockFreeQueue::<String, B>::new(4);
    queue.enqueue(String::from("hello")).unwrap();
    queue.enqueue(String::from("world")).unwrap();
    assert_eq!(queue.dequeue().as_deref(), Some("hello"));
    // One String left; the queue drop must free it.
}

fn overflow_value_survives<B: RingBuffer>() {
    let queue = LockFreeQueue::<Box<u64>, B>::new(1);
    queue.enqueue(Box::new(1)).unwrap();
    let err = queue.enqueue(Box::new(2)).unwrap_err();
    assert_eq!(**err.get(), 2);
    let rejected = err.into_value();
    assert_eq!(*rejected, 2);
    assert_eq!(queue.dequeue(), Some(Box::new(1)));
}

fn raw_access<B: RingBuffer>() {
    let mut queue = LockFreeQueue::<u64, B>::new(4);
    assert_eq!(queue.data().len(), 4);
    let index = queue.enqueue(7).unwrap();
    // SAFETY: single-threaded, the slot at `index` is live.
    unsafe {
        assert_eq!(*queue.get(index), 7);
        *queue.get_mut(index) += 1;
    }
    assert_eq!(queue.dequeue(), Some(8));
}

fn two_threads<B: RingBuffer + Sync>() {
    const COUNT: u64 = 64;
    let queue = LockFreeQueue::<u64, B>::new(4);
    thread::scope(|scope| {
        let producer = &queue;
        scope.spawn(move || {
            for mut v in 0..COUNT {
                loop {
                    match producer.enqueue(v) {
                        Ok(_) => break,
                        Err(err) => {
                            v = err.into_value();
                            thread::yield_now();
                        }
                    }
                }
            }
        });

        let mut expected = 0u64;
        while expected < COUNT {
            if let Some(v) = queue.dequeue() {
                assert_eq!(v, expected);
                expected += 1;
            } else {
                thread::yield_now();
            }
        }
    });
}

macro_rules! miri_suite {
    ($module:ident, $engine:ty) => {
        mod $module {
            use super::*;

            #[test]
            fn miri_roundtrip() {
                roundtrip::<$engine>();
            }

            #[test]
            fn miri_wrap_around() {
                wrap_around::<$engine>();
            }

            #[test]
            fn miri_heap_values_drop() {
                heap_values_drop::<$engine>();
            }

            #[test]
            fn miri_overflow_value_survives() {
                overflow_value_survives::<$engine>();
            }

            #[test]
            fn miri_raw_access() {
                raw_access::<$engine>();
            }

            #[test]
            fn miri_two_threads() {
                two_threads::<$engine>();
            }
        }
    };
}

miri_suite!(scq, ScalableRingBuffer);
miri_suite!(lprq, PortableRingBuffer);

#[test]
fn miri_set_capacity_reallocates() {
    let mut queue = ScalableCircularQueue::<String>::new(2);
    queue.enqueue(String::from("dropped by growth")).unwrap();
    queue.set_capacity(8);
    assert_eq!(queue.capacity(), 8);
    assert!(queue.is_empty());
    queue.enqueue(String::from("fresh")).unwrap();
    assert_eq!(queue.dequeue().as_deref(), Some("fresh"));
}

#[test]
fn miri_mutex_queue_roundtrip() {
    let queue = MutexQueue::<String>::new(2);
    queue.enqueue(String::from("a")).unwrap();
    queue.enqueue(String::from("b")).unwrap();
    assert!(queue.enqueue(String::from("c")).is_err());
    assert_eq!(queue.dequeue().as_deref(), Some("a"));
    // Remaining element freed by drop.
}

#[test]
fn miri_portable_queue_alias() {
    let queue = PortableRingQueue::<Vec<u8>>::new(2);
    queue.enqueue(vec![1, 2, 3]).unwrap();
    assert_eq!(queue.dequeue(), Some(vec![1, 2, 3]));
}
