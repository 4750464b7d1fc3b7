//! Component A: interrupt→main single-producer/single-consumer ring buffer
//! (ยง3 `RingBuffer`, ยง4.A).
//!
//! Single writer: the PIO ISR, via [`RingBuffer::put`]. Single reader: the
//! foreground task, via [`RingBuffer::get`]. The two index counters are each
//! written by exactly one side; [`core::sync::atomic`] acquire/release pairs
//! stand in for the `dmb` ยง4.A and ยง9 ask for ("prefer atomic load/store with
//! acquire/release ordering over raw volatiles").

use core::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

const CAPACITY: usize = 32;

/// Fixed-capacity SPSC byte queue carrying raw protocol bytes from a PIO ISR
/// to the foreground task (ยง3, ยง4.A).
pub struct RingBuffer {
    buf: [AtomicU8; CAPACITY],
    /// Written only by the producer (ISR).
    head: AtomicUsize,
    /// Written only by the consumer (foreground task).
    tail: AtomicUsize,
    /// Bytes dropped because the queue was full when `put` was called.
    dropped: AtomicUsize,
}

// `AtomicU8` isn't `Copy`/`Default`-constructible in an array literal in
// stable Rust without a helper; this macro keeps the 32-element array
// declaration honest if `CAPACITY` ever changes.
macro_rules! zeros32 {
    () => {
        [
            AtomicU8::new(0),
            AtomicU8::new(0),
            AtomicU8::new(0),
            AtomicU8::new(0),
            AtomicU8::new(0),
            AtomicU8::new(0),
            AtomicU8::new(0),
            AtomicU8::new(0),
            AtomicU8::new(0),
            AtomicU8::new(0),
            AtomicU8::new(0),
            AtomicU8::new(0),
            AtomicU8::new(0),
            AtomicU8::new(0),
            AtomicU8::new(0),
            AtomicU8::new(0),
            AtomicU8::new(0),
            AtomicU8::new(0),
            AtomicU8::new(0),
            AtomicU8::new(0),
            AtomicU8::new(0),
            AtomicU8::new(0),
            AtomicU8::new(0),
            AtomicU8::new(0),
            AtomicU8::new(0),
            AtomicU8::new(0),
            AtomicU8::new(0),
            AtomicU8::new(0),
            AtomicU8::new(0),
            AtomicU8::new(0),
            AtomicU8::new(0),
            AtomicU8::new(0),
        ]
    };
}

impl RingBuffer {
    pub const fn new() -> Self {
        RingBuffer {
            buf: zeros32!(),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            dropped: AtomicUsize::new(0),
        }
    }

    fn used(head: usize, tail: usize) -> usize {
        // `head` and `tail` are free-running counters (never wrapped to
        // `CAPACITY`), so their difference is the live count directly; only
        // the buffer index (`% CAPACITY`) wraps.
        head.wrapping_sub(tail)
    }

    /// Producer side (ISR only). Returns `false` and drops `b` if the queue
    /// is full; the caller is responsible for counting that via
    /// [`RingBuffer::dropped_count`] having already incremented (ยง4.A
    /// "caller MUST drop the byte and record the event" — recorded here so
    /// every receiver gets it for free).
    pub fn put(&self, b: u8) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        if Self::used(head, tail) == CAPACITY {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        self.buf[head % CAPACITY].store(b, Ordering::Relaxed);
        // Release: the stored byte must be visible before `head`'s advance is.
        self.head.store(head.wrapping_add(1), Ordering::Release);
        true
    }

    /// Consumer side (foreground task only).
    pub fn get(&self) -> Option<u8> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        if Self::used(head, tail) == 0 {
            return None;
        }
        let b = self.buf[tail % CAPACITY].load(Ordering::Relaxed);
        self.tail.store(tail.wrapping_add(1), Ordering::Release);
        Some(b)
    }

    pub fn is_empty(&self) -> bool {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        Self::used(head, tail) == 0
    }

    pub fn is_full(&self) -> bool {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Relaxed);
        Self::used(head, tail) == CAPACITY
    }

    /// Count of bytes dropped at `put()` due to overflow (ยง4.A diagnostics).
    pub fn dropped_count(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Reset to empty. Per ยง4.A this is only valid with producer IRQs
    /// masked; `critical_section::with` provides that masking on real
    /// hardware (and a mutex-backed equivalent under the `std`-enabled test
    /// build), matching ยง5's "sole operation requiring global IRQ masking".
    pub fn reset(&self) {
        critical_section::with(|_| {
            let tail = self.tail.load(Ordering::Relaxed);
            self.head.store(tail, Ordering::Release);
        });
    }
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::new()
    }
}
