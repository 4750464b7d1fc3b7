//! Amiga receiver (ยง4.C.3): bidirectional with a mandatory host handshake.

use crate::error::ProtocolError;
use crate::pio::PioEngine;
use crate::ring_buffer::RingBuffer;
use crate::time::elapsed_since;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Uninit,
    Initialised,
}

/// Non-scancode bytes, consumed inline by the receiver rather than
/// forwarded to the decoder (ยง4.C.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// First `0x78`: host must handshake normally.
    ResetWarning,
    /// Second `0x78` within 250ms: host should pull DATA low up to 10s.
    ResetWarningConfirmed,
    ResetAborted,
    LostSync,
    BufferOverflow,
    SelfTestFailed,
    /// Caps-lock LED state as unilaterally reported by the keyboard
    /// (ยง4.G owns deciding whether to act on it).
    CapsLed(bool),
}

const RESET_WARNING_WINDOW_MS: u32 = 250;

/// Undo the wire's 6-5-4-3-2-1-0-7 bit rotation.
pub fn de_rotate(rot: u8) -> u8 {
    ((rot & 0x01) << 7) | ((rot & 0xFE) >> 1)
}

pub struct Receiver<E: PioEngine> {
    /// Owned for its lifetime per ยง3 `PioEngine`; the Amiga handshake pulse
    /// is produced entirely by the PIO program, so the receiver never
    /// drives `engine` directly outside of [`Receiver::setup`].
    #[allow(dead_code)]
    engine: E,
    ring: RingBuffer,
    state: State,
    power_up_stream: bool,
    last_reset_warning_ms: Option<u32>,
}

impl<E: PioEngine> Receiver<E> {
    pub fn setup(mut engine: E) -> Result<Self, ProtocolError> {
        // ~60us bit period.
        engine.configure_clock_divider(15);
        Ok(Receiver {
            engine,
            ring: RingBuffer::new(),
            state: State::Uninit,
            power_up_stream: false,
            last_reset_warning_ms: None,
        })
    }

    pub fn poll_ring(&self) -> Option<u8> {
        self.ring.get()
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// ISR path: one rotated byte has arrived. The mandatory ~100us
    /// handshake pulse after each byte is produced by the PIO program and
    /// is out of scope here (ยง4.C.3, ยง5).
    pub fn on_frame(&mut self, rot: u8, now_ms: u32) -> Option<Event> {
        self.state = State::Initialised;
        let b = de_rotate(rot);
        match b {
            0x78 => {
                let confirmed = self
                    .last_reset_warning_ms
                    .map(|last| elapsed_since(last, now_ms) < RESET_WARNING_WINDOW_MS)
                    .unwrap_or(false);
                self.last_reset_warning_ms = Some(now_ms);
                Some(if confirmed {
                    Event::ResetWarningConfirmed
                } else {
                    Event::ResetWarning
                })
            }
            0xF8 => {
                self.last_reset_warning_ms = None;
                Some(Event::ResetAborted)
            }
            0xF9 => {
                // Discard any partial state for the next byte; this
                // receiver is stateless across bytes already.
                Some(Event::LostSync)
            }
            0xFA => Some(Event::BufferOverflow),
            0xFC => Some(Event::SelfTestFailed),
            0xFD => {
                self.power_up_stream = true;
                None
            }
            0xFE => {
                self.power_up_stream = false;
                None
            }
            0x62 => Some(Event::CapsLed(true)),
            0xE2 => Some(Event::CapsLed(false)),
            _ => {
                // Power-up key-stream bytes are codes for keys already
                // held; always emit as a make event.
                let code = if self.power_up_stream { b & 0x7F } else { b };
                self.ring.put(code);
                None
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pio::test_support::FakeEngine;

    /// Inverse of [`de_rotate`], used only here to check the round trip
    /// and to build rotated test fixtures.
    fn rotate(original: u8) -> u8 {
        ((original >> 7) & 0x01) | ((original & 0x7F) << 1)
    }

    #[test]
    fn derotate_rotate_round_trips_for_all_bytes() {
        for b in 0u16..256 {
            let b = b as u8;
            assert_eq!(de_rotate(rotate(b)), b);
        }
    }

    #[test]
    fn normal_scancode_is_forwarded_to_ring() {
        let engine = FakeEngine::new();
        let mut r = Receiver::setup(engine).unwrap();
        // Key id 0x1C, make (bit7=0): rotated form via `rotate`.
        let ev = r.on_frame(rotate(0x1C), 0);
        assert_eq!(ev, None);
        assert_eq!(r.poll_ring(), Some(0x1C));
    }

    /// S3: reboot desync — both sides already off, no HID pulse should be
    /// synthesised. The receiver's job is only to surface the raw event;
    /// ยง4.G's synchroniser makes the "states already match" decision.
    #[test]
    fn s3_caps_led_event_reports_reported_state_only() {
        let engine = FakeEngine::new();
        let mut r = Receiver::setup(engine).unwrap();
        let ev = r.on_frame(rotate(0xE2), 0);
        assert_eq!(ev, Some(Event::CapsLed(false)));
    }

    #[test]
    fn second_reset_warning_within_window_is_confirmed() {
        let engine = FakeEngine::new();
        let mut r = Receiver::setup(engine).unwrap();
        assert_eq!(r.on_frame(rotate(0x78), 0), Some(Event::ResetWarning));
        assert_eq!(
            r.on_frame(rotate(0x78), 100),
            Some(Event::ResetWarningConfirmed)
        );
    }

    #[test]
    fn reset_warning_outside_window_is_not_confirmed() {
        let engine = FakeEngine::new();
        let mut r = Receiver::setup(engine).unwrap();
        r.on_frame(rotate(0x78), 0);
        assert_eq!(r.on_frame(rotate(0x78), 1000), Some(Event::ResetWarning));
    }

    #[test]
    fn power_up_stream_bytes_emit_as_plain_makes() {
        let engine = FakeEngine::new();
        let mut r = Receiver::setup(engine).unwrap();
        r.on_frame(rotate(0xFD), 0);
        // A key held at power-on, with its break bit spuriously set:
        // must still surface as a make (bit 7 cleared).
        r.on_frame(rotate(0x05 | 0x80), 0);
        r.on_frame(rotate(0xFE), 0);
        assert_eq!(r.poll_ring(), Some(0x05));
    }
}
