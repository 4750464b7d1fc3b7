//! Component G: protocol LED synchroniser (ยง4.G).
//!
//! Maintains `device_led_state == host_lock_state`. The Amiga branch is
//! the delicate one: the keyboard unilaterally reports its own caps-lock
//! LED, and a reboot can leave host and device disagreeing about which
//! state is current (ยง4.C.3, S3) -- the synchroniser must compare before
//! acting, never assume the keyboard's report implies a toggle happened.

use crate::hid::LockLeds;
use crate::time::Deadline;

/// A synthetic key event the synchroniser wants emitted into the HID path
/// (ยง9 "Cyclic references avoided": G -> F is a one-directional message,
/// never a shared-state callback).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntheticKey {
    Press(u8),
    Release(u8),
}

/// AT/PS2-specific outbound LED command (ยง4.G).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtPs2Command {
    SetLeds { caps: bool, num: bool, scroll: bool },
}

const CAPS_LOCK_USAGE: u8 = 0x39;
const AMIGA_PULSE_MS: u32 = 125;

/// Per-protocol LED synchroniser. Construct one per compiled-in protocol;
/// unused branches (XT, M0110: "no-op", ยง4.G) are simply never driven.
pub struct LedSync {
    host: LockLeds,
    device_shadow: LockLeds,
    pending_release: Option<Deadline>,
}

impl LedSync {
    pub fn new() -> Self {
        LedSync {
            host: LockLeds::default(),
            device_shadow: LockLeds::default(),
            pending_release: None,
        }
    }

    pub fn host_state(&self) -> LockLeds {
        self.host
    }

    /// `F -> G`: the host updated lock LEDs via `set_report`.
    pub fn on_host_update(&mut self, leds: LockLeds) -> Option<AtPs2Command> {
        if leds == self.host {
            return None;
        }
        self.host = leds;
        Some(AtPs2Command::SetLeds {
            caps: leds.caps,
            num: leds.num,
            scroll: leds.scroll,
        })
    }

    /// Second ACK of the AT/PS2 `0xED`-then-bitmap sequence: the device
    /// shadow now matches what was sent.
    pub fn ack_at_ps2_leds(&mut self) {
        self.device_shadow = self.host;
    }

    /// Whether the device's last-acknowledged LED state has diverged from
    /// the host's (ยง3 `LockLedState`: "device-echo shadow ... used by G to
    /// compute a diff"). A protocol reinit (ยง4.C.1 hard reset) drops the
    /// keyboard's own LED state without changing `host`, so the caller
    /// should check this after recovering from one and re-issue the
    /// AT/PS2 set-LEDs sequence if it's true.
    pub fn resync_needed(&self) -> bool {
        self.device_shadow != self.host
    }

    /// Amiga keyboard-sourced caps-lock report (`0x62`/`0xE2`, already
    /// decomposed to a bool by the receiver). Returns a synthetic press if
    /// host and device disagree; the matching release is produced later
    /// by [`LedSync::poll`].
    ///
    /// S3: if both sides already agree (including both already off after
    /// a reboot), no press is emitted -- this is the reboot-desync
    /// invariant the quirk exists to protect.
    pub fn on_amiga_caps_report(&mut self, caps_on: bool, now_ms: u32) -> Option<SyntheticKey> {
        if caps_on == self.host.caps {
            return None;
        }
        self.pending_release = Some(Deadline::after(now_ms, AMIGA_PULSE_MS));
        Some(SyntheticKey::Press(CAPS_LOCK_USAGE))
    }

    /// Non-blocking poll for the Amiga 125ms press-then-release pulse
    /// (ยง4.G: "tracked by a non-blocking timer polled from the main task,
    /// not a blocking sleep").
    pub fn poll(&mut self, now_ms: u32) -> Option<SyntheticKey> {
        if let Some(deadline) = self.pending_release {
            if deadline.is_elapsed(now_ms) {
                self.pending_release = None;
                return Some(SyntheticKey::Release(CAPS_LOCK_USAGE));
            }
        }
        None
    }
}

impl Default for LedSync {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// S3: Amiga caps-lock reboot desync -- both sides already off, no
    /// synthetic HID press, one byte consumed, zero HID reports.
    #[test]
    fn s3_matching_states_after_reboot_emit_nothing() {
        let mut sync = LedSync::new();
        // host never turned caps on after reboot: host.caps defaults false.
        let ev = sync.on_amiga_caps_report(false, 0);
        assert_eq!(ev, None);
        assert_eq!(sync.poll(1000), None);
    }

    #[test]
    fn mismatched_amiga_caps_emits_press_then_release_after_125ms() {
        let mut sync = LedSync::new();
        sync.host = LockLeds {
            caps: true,
            num: false,
            scroll: false,
        };
        let ev = sync.on_amiga_caps_report(false, 1_000);
        assert_eq!(ev, Some(SyntheticKey::Press(CAPS_LOCK_USAGE)));
        assert_eq!(sync.poll(1_100), None);
        assert_eq!(
            sync.poll(1_125),
            Some(SyntheticKey::Release(CAPS_LOCK_USAGE))
        );
    }

    /// "`set_lock(x); set_lock(x)` causes at most one outbound command."
    #[test]
    fn repeated_identical_host_update_sends_at_most_one_command() {
        let mut sync = LedSync::new();
        let leds = LockLeds {
            caps: true,
            num: false,
            scroll: false,
        };
        assert!(sync.on_host_update(leds).is_some());
        assert!(sync.on_host_update(leds).is_none());
    }

    #[test]
    fn resync_needed_until_the_second_ack_lands() {
        let mut sync = LedSync::new();
        let leds = LockLeds {
            caps: true,
            num: false,
            scroll: false,
        };
        sync.on_host_update(leds);
        assert!(sync.resync_needed());
        sync.ack_at_ps2_leds();
        assert!(!sync.resync_needed());
    }
}
