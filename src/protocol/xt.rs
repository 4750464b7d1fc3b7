//! XT receiver (ยง4.C.2): unidirectional, genuine-vs-clone auto-detect.

use crate::error::ProtocolError;
use crate::pio::PioEngine;
use crate::ring_buffer::RingBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Uninit,
    Initialised,
}

/// Start-bit shape observed on the wire: genuine IBM keyboards assert
/// `DATA=LOW` shortly after `CLK` falls, giving two effective start bits
/// (RTS/CTS); clones give one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartBits {
    One,
    Two,
}

const BAT_PASS: u8 = 0xAA;

pub struct Receiver<E: PioEngine> {
    engine: E,
    ring: RingBuffer,
    state: State,
    last_start_bits: StartBits,
}

impl<E: PioEngine> Receiver<E> {
    pub fn setup(mut engine: E) -> Result<Self, ProtocolError> {
        // 10us samples, 4 per start-bit window per ยง4.C.2.
        engine.configure_clock_divider(10);
        Ok(Receiver {
            engine,
            ring: RingBuffer::new(),
            state: State::Uninit,
            last_start_bits: StartBits::One,
        })
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn variant(&self) -> StartBits {
        self.last_start_bits
    }

    pub fn poll_ring(&self) -> Option<u8> {
        self.ring.get()
    }

    /// ISR path. `start_bit` must be `1`; `start_bits` reflects whether a
    /// second (genuine-IBM) start bit preceded this byte.
    pub fn on_frame(&mut self, start_bit: bool, data: u8, start_bits: StartBits) {
        if !start_bit {
            self.soft_reset();
            return;
        }
        self.last_start_bits = start_bits;
        match self.state {
            State::Uninit => {
                // The first BAT-pass byte is consumed by this layer, never
                // forwarded to decoding.
                self.state = State::Initialised;
                if data != BAT_PASS {
                    self.ring.put(data);
                }
            }
            State::Initialised => {
                self.ring.put(data);
            }
        }
    }

    /// "Type 2" soft reset: pull CLK low >=20ms, wait for DATA high,
    /// release. Modelled here as the digital side effect; the >=20ms pulse
    /// itself is produced by the PIO program, out of scope (ยง1).
    fn soft_reset(&mut self) {
        self.state = State::Uninit;
        self.engine.restart();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pio::test_support::FakeEngine;

    #[test]
    fn first_bat_pass_byte_is_consumed_not_forwarded() {
        let engine = FakeEngine::new();
        let mut r = Receiver::setup(engine).unwrap();
        r.on_frame(true, BAT_PASS, StartBits::One);
        assert_eq!(r.state(), State::Initialised);
        assert_eq!(r.poll_ring(), None);
    }

    #[test]
    fn bytes_after_bat_pass_through() {
        let engine = FakeEngine::new();
        let mut r = Receiver::setup(engine).unwrap();
        r.on_frame(true, BAT_PASS, StartBits::One);
        r.on_frame(true, 0x1E, StartBits::One);
        assert_eq!(r.poll_ring(), Some(0x1E));
    }

    #[test]
    fn genuine_ibm_two_start_bits_detected_and_recorded() {
        let engine = FakeEngine::new();
        let mut r = Receiver::setup(engine).unwrap();
        r.on_frame(true, BAT_PASS, StartBits::Two);
        assert_eq!(r.variant(), StartBits::Two);
    }

    #[test]
    fn invalid_start_bit_triggers_soft_reset() {
        let engine = FakeEngine::new();
        let mut r = Receiver::setup(engine).unwrap();
        r.on_frame(true, BAT_PASS, StartBits::One);
        r.on_frame(false, 0x00, StartBits::One);
        assert_eq!(r.state(), State::Uninit);
        assert_eq!(r.engine.restarts, 1);
    }
}
