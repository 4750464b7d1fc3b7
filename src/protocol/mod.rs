//! Component C: per-wire-protocol receiver state machines (ยง3 `ProtocolState`,
//! ยง4.C).
//!
//! All four receivers share the outward contract ยง4.C describes: `setup`
//! claims a [`crate::pio::PioEngine`] and seeds the state machine at
//! `Uninit`; the ISR callback validates one frame and feeds the protocol
//! event processor; `task` does timeout supervision and issues
//! host→device commands from the foreground loop. Only one of these is
//! compiled into a given firmware image (ยง9 "tagged variant ... selected
//! by the build"); all four live in this library unconditionally so each
//! can be exercised on the host.

pub mod amiga;
pub mod at_ps2;
pub mod m0110;
pub mod xt;

/// The single keyboard identity compiled into a firmware image (ยง6
/// "Compile-time configuration"). Not used to runtime-dispatch between
/// receivers — it documents the selection the `proto-*` Cargo features make
/// at the binary layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    AtPs2,
    Xt,
    Amiga,
    M0110,
}
