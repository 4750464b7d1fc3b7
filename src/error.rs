//! Error taxonomy (ยง7). Every variant here is recovered locally by its
//! owning component; none of these are meant to propagate to `main` or
//! cause a panic — they are the `Err` arm of a call whose `Ok` path and
//! recovery path are both already specified in ยง4 and ยง7.

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingError {
    /// ยง4.A: caller must drop the byte and count the overflow.
    Full,
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// Start/parity/stop bit violation (ยง7 `FrameError`).
    BadFrame,
    /// Init or response timeout exhausted its retry budget (ยง7 `ProtocolStall`).
    Stalled,
    /// No PIO engine/state machine/IRQ slot available (ยง7 `ResourceExhaustion`).
    NoResource,
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderError {
    /// Unexpected byte mid multi-byte sequence (ยง7 `DecoderDesync`).
    Desync(u8),
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// `(keyboard_id_hash, layers_hash)` mismatch (ยง7 `ConfigMismatch`).
    HashMismatch,
    /// Stored record version isn't the one this firmware understands.
    BadVersion,
}
