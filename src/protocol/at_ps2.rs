//! AT/PS2 receiver (ยง4.C.1): bidirectional, scan-code-set aware.

use crate::error::ProtocolError;
use crate::pio::PioEngine;
use crate::ring_buffer::RingBuffer;
use crate::time::Deadline;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Uninit,
    AwaitAck,
    AwaitSelfTest,
    ReadId1,
    ReadId2,
    Setup,
    SetLockLeds,
    Initialised,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanSet {
    Set1,
    Set2,
    Set3,
}

const CMD_RESET: u8 = 0xFF;
const CMD_RESEND: u8 = 0xFE;
const CMD_READ_ID: u8 = 0xF2;
const CMD_ALL_MAKE_BREAK: u8 = 0xF8;
const CMD_SET_LEDS: u8 = 0xED;
const ACK: u8 = 0xFA;
const BAT_PASS: u8 = 0xAA;
/// ยง9 open question: preserve this exact condition unmodified.
const CONNECT_ARTIFACT_BYTE: u8 = 0x54;

const STALL_POLL_MS: u32 = 200;

/// ID bytes reporting a Set-3 terminal keyboard (IBM 122-key and similar);
/// every other ID is treated as a Set-2 device, matching the default
/// compiled-in set used when S1's sample trace resolves straight to
/// `Initialised`.
fn scanset_from_id(id_high: u8, _id_low: u8) -> ScanSet {
    if id_high == 0xBF {
        ScanSet::Set3
    } else {
        ScanSet::Set2
    }
}

fn odd_parity_ok(data: u8, parity_bit: bool) -> bool {
    data.count_ones().is_multiple_of(2) == parity_bit
}

/// AT/PS2 protocol receiver, generic over its claimed [`PioEngine`].
pub struct Receiver<E: PioEngine> {
    engine: E,
    ring: RingBuffer,
    state: State,
    id_high: u8,
    id_known: bool,
    scanset: ScanSet,
    /// Z-150 stop-bit polarity, learned on the first frame and tolerated
    /// silently thereafter (ยง4.C.1 rule 2).
    stop_polarity: Option<bool>,
    pending_led_bitmap: u8,
    led_ack_phase: u8,
    stall_counter: u8,
    id_retry_used: bool,
    next_poll: Deadline,
}

impl<E: PioEngine> Receiver<E> {
    /// `setup(data_pin)`: claim already performed by the caller (the PIO
    /// resource pool lives above this type); this constructor is the part
    /// of setup ยง4.C describes as "seed the state machine at Uninit".
    pub fn setup(mut engine: E, now_ms: u32) -> Result<Self, ProtocolError> {
        // AT/PS2 minimum pulse width is ~40us (12.5-16.7kHz clock); sample
        // at a quarter period to resolve edges reliably.
        engine.configure_clock_divider(10);
        Ok(Receiver {
            engine,
            ring: RingBuffer::new(),
            state: State::Uninit,
            id_high: 0,
            id_known: true,
            scanset: ScanSet::Set2,
            stop_polarity: None,
            pending_led_bitmap: 0,
            led_ack_phase: 0,
            stall_counter: 0,
            id_retry_used: false,
            next_poll: Deadline::after(now_ms, STALL_POLL_MS),
        })
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn scanset(&self) -> ScanSet {
        self.scanset
    }

    pub fn ring(&self) -> &RingBuffer {
        &self.ring
    }

    /// Pop one decoded byte for the scancode decoder (ยง2 data flow: main
    /// task polls D). Only bytes accepted while `Initialised` ever reach
    /// the ring buffer.
    pub fn poll_ring(&self) -> Option<u8> {
        self.ring.get()
    }

    /// Request a lock-LED update (ยง4.G AT/PS2 branch: `0xED`-then-bitmap).
    pub fn set_lock_leds(&mut self, caps: bool, num: bool, scroll: bool) {
        self.pending_led_bitmap = ((caps as u8) << 2) | ((num as u8) << 1) | (scroll as u8);
        self.led_ack_phase = 0;
        self.state = State::SetLockLeds;
        let _ = self.engine.push_tx(CMD_SET_LEDS);
    }

    /// ISR path: one complete frame has been sampled off the wire.
    /// `start_bit`/`parity_bit`/`stop_bit` are the raw sampled line levels;
    /// `data` is LSB-first reassembled already (PIO shift direction is a
    /// hardware detail, not a software one).
    pub fn on_frame(&mut self, start_bit: bool, data: u8, parity_bit: bool, stop_bit: bool) {
        if start_bit {
            self.hard_reset();
            return;
        }
        if self.stop_polarity.is_none() {
            self.stop_polarity = Some(stop_bit);
        }
        if !odd_parity_ok(data, parity_bit) {
            if data == CONNECT_ARTIFACT_BYTE && parity_bit {
                self.hard_reset();
            } else {
                let _ = self.engine.push_tx(CMD_RESEND);
            }
            return;
        }
        self.stall_counter = 0;
        self.on_byte(data);
    }

    fn hard_reset(&mut self) {
        self.state = State::Uninit;
        self.engine.restart();
    }

    fn on_byte(&mut self, b: u8) {
        match self.state {
            State::Uninit => {
                if b == BAT_PASS {
                    self.state = State::ReadId1;
                    let _ = self.engine.push_tx(CMD_READ_ID);
                } else {
                    self.state = State::AwaitAck;
                    let _ = self.engine.push_tx(CMD_RESET);
                }
            }
            State::AwaitAck => {
                if b == ACK {
                    self.state = State::AwaitSelfTest;
                } else {
                    let _ = self.engine.push_tx(CMD_RESET);
                }
            }
            State::AwaitSelfTest => {
                if b == BAT_PASS {
                    self.state = State::ReadId1;
                } else {
                    self.state = State::AwaitAck;
                    let _ = self.engine.push_tx(CMD_RESET);
                }
            }
            State::ReadId1 => {
                if b != ACK {
                    self.id_high = b;
                    self.state = State::ReadId2;
                }
            }
            State::ReadId2 => {
                self.scanset = scanset_from_id(self.id_high, b);
                self.id_known = true;
                if self.scanset == ScanSet::Set3 {
                    let _ = self.engine.push_tx(CMD_ALL_MAKE_BREAK);
                    self.state = State::Setup;
                } else {
                    self.state = State::Initialised;
                }
            }
            State::Setup => {
                if b != ACK {
                    self.id_known = false;
                }
                self.state = State::Initialised;
            }
            State::SetLockLeds => {
                if b == ACK {
                    if self.led_ack_phase == 0 {
                        let _ = self.engine.push_tx(self.pending_led_bitmap);
                        self.led_ack_phase = 1;
                    } else {
                        self.state = State::Initialised;
                    }
                }
            }
            State::Initialised => {
                self.ring.put(b);
            }
        }
    }

    /// Foreground timeout supervision (ยง4.C.1 "every 200 ms"). `line_idle`
    /// reflects whether the clock line has been idle-high since the last
    /// poll.
    pub fn task(&mut self, now_ms: u32, line_idle: bool) {
        if !self.next_poll.is_elapsed(now_ms) {
            return;
        }
        self.next_poll = Deadline::after(now_ms, STALL_POLL_MS);
        if self.state == State::Initialised || !line_idle {
            return;
        }
        self.stall_counter = self.stall_counter.saturating_add(1);
        let in_id_or_setup = matches!(
            self.state,
            State::ReadId1 | State::ReadId2 | State::Setup
        );
        if in_id_or_setup && self.stall_counter > 2 {
            if !self.id_retry_used {
                self.id_retry_used = true;
                self.state = State::Uninit;
                let _ = self.engine.push_tx(CMD_READ_ID);
            } else {
                self.id_known = false;
                self.state = State::Initialised;
            }
        } else if self.state == State::Uninit && self.stall_counter > 5 {
            let _ = self.engine.push_tx(CMD_RESET);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pio::test_support::FakeEngine;

    fn feed_ok(r: &mut Receiver<FakeEngine>, data: u8) {
        let parity_bit = data.count_ones().is_multiple_of(2); // makes total ones odd
        r.on_frame(false, data, parity_bit, true);
    }

    /// S1: AT/PS2 'A' press and release, set 2.
    #[test]
    fn s1_bat_and_id_reach_initialised_and_forward_scancodes() {
        let engine = FakeEngine::new();
        let mut r = Receiver::setup(engine, 0).unwrap();

        feed_ok(&mut r, 0xAA);
        assert_eq!(r.state(), State::ReadId1);

        feed_ok(&mut r, 0xFA); // absorbed
        assert_eq!(r.state(), State::ReadId1);

        feed_ok(&mut r, 0xAB);
        assert_eq!(r.state(), State::ReadId2);

        feed_ok(&mut r, 0x83);
        assert_eq!(r.state(), State::Initialised);
        assert_eq!(r.scanset(), ScanSet::Set2);

        feed_ok(&mut r, 0x1C);
        feed_ok(&mut r, 0xF0);
        feed_ok(&mut r, 0x1C);

        assert_eq!(r.poll_ring(), Some(0x1C));
        assert_eq!(r.poll_ring(), Some(0xF0));
        assert_eq!(r.poll_ring(), Some(0x1C));
        assert_eq!(r.poll_ring(), None);
    }

    #[test]
    fn invalid_start_bit_resets_to_uninit_and_restarts_pio() {
        let engine = FakeEngine::new();
        let mut r = Receiver::setup(engine, 0).unwrap();
        feed_ok(&mut r, 0xAA);
        assert_eq!(r.state(), State::ReadId1);

        r.on_frame(true, 0x00, false, true);
        assert_eq!(r.state(), State::Uninit);
        assert_eq!(r.engine.restarts, 1);
    }

    #[test]
    fn parity_failure_issues_resend_and_drops_the_byte() {
        let engine = FakeEngine::new();
        let mut r = Receiver::setup(engine, 0).unwrap();
        feed_ok(&mut r, 0xAA);
        r.engine.tx.clear();

        // 0x83 has 3 ones (odd), so odd-parity requires parity_bit=0;
        // send 1 instead to force a mismatch.
        r.on_frame(false, 0x83, true, true);
        assert_eq!(r.state(), State::ReadId1);
        assert_eq!(r.engine.tx, std::vec![CMD_RESEND]);
    }

    #[test]
    fn connect_artifact_byte_forces_hard_reset_not_resend() {
        let engine = FakeEngine::new();
        let mut r = Receiver::setup(engine, 0).unwrap();
        // data=0x54 has 3 ones (odd), so odd parity bit is 0; send 1 to
        // trigger the mismatch *and* match the 0x54/parity=1 heuristic.
        r.on_frame(false, 0x54, true, true);
        assert_eq!(r.state(), State::Uninit);
        assert_eq!(r.engine.restarts, 1);
    }

    #[test]
    fn stop_bit_polarity_is_learned_then_tolerated() {
        let engine = FakeEngine::new();
        let mut r = Receiver::setup(engine, 0).unwrap();
        r.on_frame(false, 0xAA, true, false); // learns stop=false
        assert_eq!(r.state(), State::ReadId1);
        // 0xAB has 5 ones (odd), so odd-parity requires parity_bit=0.
        // Opposite stop-bit polarity on this otherwise-valid frame is
        // tolerated.
        r.on_frame(false, 0xAB, false, true);
        assert_eq!(r.state(), State::ReadId2);
    }

    #[test]
    fn stall_in_uninit_past_five_reissues_reset() {
        let engine = FakeEngine::new();
        let mut r = Receiver::setup(engine, 0).unwrap();
        let mut now = 0;
        for _ in 0..6 {
            now += STALL_POLL_MS;
            r.task(now, true);
        }
        assert!(r.engine.tx.contains(&CMD_RESET));
    }
}
