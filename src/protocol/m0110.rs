//! M0110 receiver (ยง4.C.4): poll-based, host-initiated.

use crate::error::ProtocolError;
use crate::pio::PioEngine;
use crate::ring_buffer::RingBuffer;
use crate::time::Deadline;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Uninit,
    ModelRequest,
    Initialised,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Model {
    Unknown,
    M0110,
    M0110A,
    M0120Keypad,
    M0110AndM0120,
}

fn model_from_byte(b: u8) -> Model {
    match b {
        0x01 => Model::M0110,
        0x02 => Model::M0110A,
        0x04 => Model::M0120Keypad,
        0x06 => Model::M0110AndM0120,
        _ => Model::Unknown,
    }
}

const CMD_MODEL: u8 = 0x16;
const CMD_INQUIRY: u8 = 0x10;
const NULL_KEY: u8 = 0x7B;
const STARTUP_DELAY_MS: u32 = 1000;
const MODEL_RETRY_MS: u32 = 500;
const MODEL_RETRY_LIMIT: u8 = 5;
const RESPONSE_TIMEOUT_MS: u32 = 500;

pub struct Receiver<E: PioEngine> {
    engine: E,
    ring: RingBuffer,
    state: State,
    model: Model,
    model_retries: u8,
    next_deadline: Deadline,
}

impl<E: PioEngine> Receiver<E> {
    pub fn setup(mut engine: E, now_ms: u32) -> Result<Self, ProtocolError> {
        // Host clocks commands at ~2.5kHz.
        engine.configure_clock_divider(400);
        Ok(Receiver {
            engine,
            ring: RingBuffer::new(),
            state: State::Uninit,
            model: Model::Unknown,
            model_retries: 0,
            next_deadline: Deadline::after(now_ms, STARTUP_DELAY_MS),
        })
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn model(&self) -> Model {
        self.model
    }

    pub fn poll_ring(&self) -> Option<u8> {
        self.ring.get()
    }

    /// ISR path: one byte clocked in from the keyboard.
    pub fn on_frame(&mut self, b: u8, now_ms: u32) {
        match self.state {
            State::Uninit => {
                // Startup delay gates transmission, not reception; a stray
                // byte here is ignored.
            }
            State::ModelRequest => {
                self.model = model_from_byte(b);
                self.state = State::Initialised;
                let _ = self.engine.push_tx(CMD_INQUIRY);
                self.next_deadline = Deadline::after(now_ms, RESPONSE_TIMEOUT_MS);
            }
            State::Initialised => {
                self.next_deadline = Deadline::after(now_ms, RESPONSE_TIMEOUT_MS);
                if b != NULL_KEY {
                    self.ring.put(b);
                }
                let _ = self.engine.push_tx(CMD_INQUIRY);
            }
        }
    }

    /// Foreground task: startup delay, model retry, and response timeout
    /// supervision, all anchored to `now_ms` deadlines (ยง4.C.4).
    pub fn task(&mut self, now_ms: u32) {
        match self.state {
            State::Uninit => {
                if self.next_deadline.is_elapsed(now_ms) {
                    let _ = self.engine.push_tx(CMD_MODEL);
                    self.state = State::ModelRequest;
                    self.model_retries = 0;
                    self.next_deadline = Deadline::after(now_ms, MODEL_RETRY_MS);
                }
            }
            State::ModelRequest => {
                if self.next_deadline.is_elapsed(now_ms) {
                    self.model_retries += 1;
                    if self.model_retries >= MODEL_RETRY_LIMIT {
                        self.state = State::Uninit;
                        self.next_deadline = Deadline::after(now_ms, STARTUP_DELAY_MS);
                    } else {
                        let _ = self.engine.push_tx(CMD_MODEL);
                        self.next_deadline = Deadline::after(now_ms, MODEL_RETRY_MS);
                    }
                }
            }
            State::Initialised => {
                if self.next_deadline.is_elapsed(now_ms) {
                    self.ring.reset();
                    self.state = State::Uninit;
                    self.next_deadline = Deadline::after(now_ms, STARTUP_DELAY_MS);
                }
            }
        }
    }
}
