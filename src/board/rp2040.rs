//! [`crate::pio::PioEngine`] backed by one claimed `rp2040_hal::pio` state
//! machine. The PIO assembly program itself is out of scope (ยง1); this
//! adapter only exposes the narrow digital contract ยง6 names over whatever
//! program the caller installed.

use rp2040_hal::pio::{Running, Rx, StateMachine, Tx, ValidStateMachine};

use crate::pio::PioEngine;

/// One running PIO state machine plus its FIFO halves, generic over which
/// `(PIO, SMx)` pair it was claimed from. Construction (program install,
/// pin config, `.start()`) happens in `#[init]`, mirroring the teacher's
/// `init` doing all peripheral setup once and never reconfiguring (ยง4.I).
pub struct RpPioEngine<SM: ValidStateMachine> {
    sm: StateMachine<SM, Running>,
    rx: Rx<SM>,
    tx: Tx<SM>,
}

impl<SM: ValidStateMachine> RpPioEngine<SM> {
    pub fn new(sm: StateMachine<SM, Running>, rx: Rx<SM>, tx: Tx<SM>) -> Self {
        RpPioEngine { sm, rx, tx }
    }
}

/// `now_ms()` (ยง6 "Time source") backed by the RP2040's always-on 1MHz
/// timer, truncated to the 32-bit wrapping counter every module in this
/// crate already assumes.
pub fn now_ms(timer: &rp2040_hal::Timer) -> u32 {
    (timer.get_counter().ticks() / 1_000) as u32
}

impl<SM: ValidStateMachine> PioEngine for RpPioEngine<SM> {
    fn configure_clock_divider(&mut self, _target_us: u32) {
        // The divisor is a property of the installed program's clock and is
        // fixed at `.start()` time in `#[init]`; ยง4.C's minimum-pulse-width
        // derivation lives there, not here, since `ValidStateMachine`'s
        // `StateMachine<SM, Running>` no longer exposes `set_clock_divisor`
        // (that's a `Stopped`-only method).
    }

    fn push_tx(&mut self, word: u8) -> bool {
        self.tx.write(word as u32)
    }

    fn pop_rx(&mut self) -> Option<u8> {
        self.rx.read().map(|w| w as u8)
    }

    fn restart(&mut self) {
        self.sm.restart();
    }
}
