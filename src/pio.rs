//! Component B: PIO engine contract + IRQ dispatcher (ยง3 `PioEngine`, ยง4.B,
//! ยง6 "PIO contract").
//!
//! The physical PIO assembly programs are out of scope (ยง1); this module is
//! only the digital contract real PIO assembly would satisfy: claim/release
//! of an engine+state-machine pair, a clock divider, and two narrow FIFO
//! operations. Production firmware backs [`PioEngine`] with
//! `rp2040_hal::pio` (see `src/board/rp2040.rs`, `rp2040` feature); tests
//! back it with [`test_support::FakeEngine`].

use crate::error::ProtocolError;

/// One claimed `{PIO instance, state machine, program offset}` bundle (ยง3
/// `PioEngine`), exclusively owned by one protocol receiver for its
/// lifetime. Implementors expose the narrow hardware contract ยง6 names;
/// frame assembly/validation stays in the owning protocol receiver.
pub trait PioEngine {
    /// Set the sample-clock divider so one tick corresponds to
    /// `target_us` microseconds, per the protocol's minimum pulse width.
    fn configure_clock_divider(&mut self, target_us: u32);

    /// Push one word to the engine's TX FIFO. Returns `false` if the FIFO
    /// is full, in which case the command is dropped (logged, not
    /// retried automatically per ยง4.C.4).
    fn push_tx(&mut self, word: u8) -> bool;

    /// Pop one word from the engine's RX FIFO, if any is pending.
    fn pop_rx(&mut self) -> Option<u8>;

    /// Tear down and release the engine/state-machine pair, e.g. on
    /// unrecoverable frame loss requiring a protocol reinit (ยง3
    /// `PioEngine` lifecycle).
    fn restart(&mut self);
}

/// Claims [`PioEngine`] handles from the pool of available PIO
/// instances/state machines. Returns [`ProtocolError::NoResource`] when
/// none are free (ยง4.C "return error (not panic) if no PIO resources are
/// free").
pub trait PioResources {
    type Engine: PioEngine;

    fn claim_engine(&mut self, program: PioProgram) -> Result<Self::Engine, ProtocolError>;
}

/// Identifies which protocol's PIO program an engine should be configured
/// to run. PIO assembly content itself is out of scope (ยง1); this is only
/// the selector a real `claim_engine` implementation would switch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PioProgram {
    AtPs2,
    Xt,
    Amiga,
    M0110,
}

/// Zero-capture callback invoked on every IRQ fire. Protocol state is a
/// module-level singleton created at `setup()` (ยง3, ยง9), so callbacks need
/// no captured environment.
pub type IrqCallback = fn();

const MAX_CALLBACKS: usize = 4;

/// Multiplexes one shared PIO IRQ line to up to 4 registered
/// `(state-machine id, callback)` pairs (ยง4.B). Each callback is
/// responsible for checking whether its own RX FIFO is non-empty before
/// reading; fires from state machines with no registered callback are
/// silently absorbed by never being invoked.
pub struct IrqDispatcher {
    slots: [Option<(u8, IrqCallback)>; MAX_CALLBACKS],
    len: usize,
}

impl IrqDispatcher {
    pub const fn new() -> Self {
        IrqDispatcher {
            slots: [None; MAX_CALLBACKS],
            len: 0,
        }
    }

    /// Register a callback for state machine `sm_id`. Registration failure
    /// (registry full) is fatal for the caller's `setup()` (ยง4.B).
    pub fn register(&mut self, sm_id: u8, cb: IrqCallback) -> Result<(), ProtocolError> {
        if self.len >= MAX_CALLBACKS {
            return Err(ProtocolError::NoResource);
        }
        self.slots[self.len] = Some((sm_id, cb));
        self.len += 1;
        Ok(())
    }

    /// Invoke every registered callback. Called from the shared hardware
    /// ISR on each fire of the PIO IRQ line.
    pub fn dispatch(&self) {
        for slot in self.slots.iter().take(self.len).flatten() {
            (slot.1)();
        }
    }

    pub fn registered_count(&self) -> usize {
        self.len
    }
}

impl Default for IrqDispatcher {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use core::sync::atomic::{AtomicU32, Ordering};

    static HITS_A: AtomicU32 = AtomicU32::new(0);
    static HITS_B: AtomicU32 = AtomicU32::new(0);

    fn bump_a() {
        HITS_A.fetch_add(1, Ordering::Relaxed);
    }
    fn bump_b() {
        HITS_B.fetch_add(1, Ordering::Relaxed);
    }

    #[test]
    fn dispatch_invokes_every_registered_callback_on_every_fire() {
        HITS_A.store(0, Ordering::Relaxed);
        HITS_B.store(0, Ordering::Relaxed);
        let mut d = IrqDispatcher::new();
        d.register(0, bump_a).unwrap();
        d.register(1, bump_b).unwrap();
        d.dispatch();
        d.dispatch();
        assert_eq!(HITS_A.load(Ordering::Relaxed), 2);
        assert_eq!(HITS_B.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn registry_full_is_fatal_for_the_caller() {
        let mut d = IrqDispatcher::new();
        for i in 0..4 {
            d.register(i, bump_a).unwrap();
        }
        assert_eq!(d.register(4, bump_a), Err(ProtocolError::NoResource));
    }
}
