//! Component F: HID report aggregator (ยง3 `HidReport`, ยง4.F).
//!
//! Boot-protocol keyboard report: modifier byte, reserved byte, six
//! concurrent key slots. `packed_struct` lays the wire bytes out exactly
//! as the USB HID boot-keyboard descriptor expects, the same way the
//! lock-LED bitmap and persisted records do elsewhere in this crate.

use packed_struct::prelude::*;

/// Lowest HID usage in the modifier band (`0xE0..=0xE7`: LCtrl..RGUI).
const MODIFIER_BASE: u8 = 0xE0;
const MODIFIER_MAX: u8 = 0xE7;

/// 8-byte boot-protocol keyboard report (ยง3 `HidReport`).
#[derive(PackedStruct, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[packed_struct(endian = "lsb", bit_numbering = "msb0", size_bytes = "8")]
pub struct BootKeyboardReport {
    #[packed_field(bytes = "0")]
    pub modifier: u8,
    #[packed_field(bytes = "1")]
    pub reserved: u8,
    #[packed_field(bytes = "2..8", element_size_bytes = "1")]
    pub keys: [u8; 6],
}

/// Aggregates key press/release usages into a [`BootKeyboardReport`] and
/// decides when to flush a new one to the USB stack.
pub struct HidAggregator {
    current: BootKeyboardReport,
    last_sent: Option<BootKeyboardReport>,
    dropped: usize,
}

impl HidAggregator {
    pub fn new() -> Self {
        HidAggregator {
            current: BootKeyboardReport::default(),
            last_sent: None,
            dropped: 0,
        }
    }

    fn is_modifier(usage: u8) -> bool {
        (MODIFIER_BASE..=MODIFIER_MAX).contains(&usage)
    }

    /// `press(usage)`: set the modifier bit, or insert into the first free
    /// key slot unless already present. Overflow drops newest and counts.
    pub fn press(&mut self, usage: u8) {
        if Self::is_modifier(usage) {
            self.current.modifier |= 1 << (usage - MODIFIER_BASE);
            return;
        }
        if self.current.keys.contains(&usage) {
            return;
        }
        match self.current.keys.iter().position(|&k| k == 0) {
            Some(slot) => self.current.keys[slot] = usage,
            None => self.dropped += 1,
        }
    }

    /// `release(usage)`: inverse of `press`. No compaction of the key
    /// array is required by HID.
    pub fn release(&mut self, usage: u8) {
        if Self::is_modifier(usage) {
            self.current.modifier &= !(1 << (usage - MODIFIER_BASE));
            return;
        }
        if let Some(slot) = self.current.keys.iter().position(|&k| k == usage) {
            self.current.keys[slot] = 0;
        }
    }

    /// Count of key-press events dropped because all 6 slots were full.
    pub fn dropped_count(&self) -> usize {
        self.dropped
    }

    /// `flush()`: send iff the report differs from the last one sent and
    /// the USB stack is ready. Returns the report that was sent, if any.
    pub fn flush(&mut self, ready: bool) -> Option<BootKeyboardReport> {
        if !ready {
            return None;
        }
        if self.last_sent == Some(self.current) {
            return None;
        }
        self.last_sent = Some(self.current);
        Some(self.current)
    }
}

impl Default for HidAggregator {
    fn default() -> Self {
        Self::new()
    }
}

/// 2-byte Consumer Page report (ยง4.E "emit as a 16-bit Consumer Page
/// report on a separate HID instance"): one active usage id, `0` meaning
/// no event, matching `usbd_hid::descriptor::MediaKeyboardReport`'s wire
/// layout.
#[derive(PackedStruct, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[packed_struct(size_bytes = "2", endian = "lsb")]
pub struct ConsumerReport {
    pub usage: u16,
}

/// Aggregates Consumer Page presses/releases onto the second HID
/// instance. Only one consumer usage can be reported active at a time on
/// the wire, so unlike [`HidAggregator`] there is no multi-slot array:
/// the most recently pressed usage wins and a matching release clears it.
pub struct ConsumerAggregator {
    current: ConsumerReport,
    last_sent: Option<ConsumerReport>,
}

impl ConsumerAggregator {
    pub fn new() -> Self {
        ConsumerAggregator {
            current: ConsumerReport::default(),
            last_sent: None,
        }
    }

    pub fn press(&mut self, usage: u16) {
        self.current.usage = usage;
    }

    /// No-op if `usage` isn't the currently-reported one (e.g. a second
    /// key was pressed and released the first one already).
    pub fn release(&mut self, usage: u16) {
        if self.current.usage == usage {
            self.current.usage = 0;
        }
    }

    pub fn flush(&mut self, ready: bool) -> Option<ConsumerReport> {
        if !ready {
            return None;
        }
        if self.last_sent == Some(self.current) {
            return None;
        }
        self.last_sent = Some(self.current);
        Some(self.current)
    }
}

impl Default for ConsumerAggregator {
    fn default() -> Self {
        Self::new()
    }
}

/// The three lock-LED bits as decomposed from `set_report` (ยง4.F reverse
/// channel, ยง6 "bit 0 = Num, bit 1 = Caps, bit 2 = Scroll").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LockLeds {
    pub num: bool,
    pub caps: bool,
    pub scroll: bool,
}

impl LockLeds {
    pub fn from_bits(bits: u8) -> Self {
        LockLeds {
            num: bits & 0x01 != 0,
            caps: bits & 0x02 != 0,
            scroll: bits & 0x04 != 0,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn press_sets_modifier_bit() {
        let mut hid = HidAggregator::new();
        hid.press(0xE1); // LShift
        assert_eq!(hid.flush(true).unwrap().modifier, 0x02);
    }

    #[test]
    fn press_release_press_is_not_idempotent_collapse() {
        let mut hid = HidAggregator::new();
        hid.press(0x04);
        let r1 = hid.flush(true);
        hid.release(0x04);
        let r2 = hid.flush(true);
        hid.press(0x04);
        let r3 = hid.flush(true);
        assert!(r1.unwrap().keys.contains(&0x04));
        assert!(!r2.unwrap().keys.contains(&0x04));
        assert!(r3.unwrap().keys.contains(&0x04));
    }

    /// "`flush()` never sends a report identical to the last one sent."
    #[test]
    fn flush_never_repeats_the_last_report() {
        let mut hid = HidAggregator::new();
        hid.press(0x04);
        assert!(hid.flush(true).is_some());
        assert!(hid.flush(true).is_none());
        assert!(hid.flush(true).is_none());
    }

    #[test]
    fn flush_waits_for_ready() {
        let mut hid = HidAggregator::new();
        hid.press(0x04);
        assert!(hid.flush(false).is_none());
        assert!(hid.flush(true).is_some());
    }

    #[test]
    fn seventh_concurrent_key_is_dropped_and_counted() {
        let mut hid = HidAggregator::new();
        for u in 0x04..0x0A {
            hid.press(u);
        }
        assert_eq!(hid.dropped_count(), 0);
        hid.press(0x0A);
        assert_eq!(hid.dropped_count(), 1);
    }

    #[test]
    fn duplicate_press_is_a_no_op() {
        let mut hid = HidAggregator::new();
        hid.press(0x04);
        hid.press(0x04);
        let report = hid.flush(true).unwrap();
        assert_eq!(report.keys.iter().filter(|&&k| k == 0x04).count(), 1);
    }

    #[test]
    fn consumer_press_then_release_clears_the_usage() {
        let mut c = ConsumerAggregator::new();
        assert_eq!(c.flush(true).unwrap().usage, 0);
        c.press(0xB5); // Scan Next Track
        assert_eq!(c.flush(true).unwrap().usage, 0xB5);
        c.release(0xB5);
        assert_eq!(c.flush(true).unwrap().usage, 0);
    }

    #[test]
    fn consumer_release_of_a_different_usage_is_a_no_op() {
        let mut c = ConsumerAggregator::new();
        c.press(0xB5);
        c.flush(true);
        c.release(0xCD); // Play/Pause, never pressed
        assert_eq!(c.flush(true), None);
    }

    #[test]
    fn lock_led_bit_decomposition() {
        let leds = LockLeds::from_bits(0b101);
        assert!(leds.num);
        assert!(!leds.caps);
        assert!(leds.scroll);
    }

    #[test]
    fn boot_report_packs_to_eight_bytes() {
        let report = BootKeyboardReport {
            modifier: 0x02,
            reserved: 0,
            keys: [0x04, 0, 0, 0, 0, 0],
        };
        let bytes = report.pack().unwrap();
        assert_eq!(bytes.len(), 8);
        assert_eq!(bytes[0], 0x02);
        assert_eq!(bytes[2], 0x04);
    }
}
