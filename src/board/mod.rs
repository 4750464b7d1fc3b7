//! Hardware backing for the external-collaborator traits in ยง6, selected
//! by the `rp2040` feature. Board bring-up (clocks, pins, USB enumeration)
//! is explicitly out of scope per ยง1 ("treated as external collaborators");
//! this module is only the adapter gluing `rp2040-hal` to
//! [`crate::pio::PioEngine`].

#[cfg(feature = "rp2040")]
pub mod rp2040;
