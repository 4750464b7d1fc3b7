//! Component D: scancode decoder (ยง3 `ScancodeDecoderState`, ยง4.D).
//!
//! Owns one small state machine per scancode set/protocol. Consumes one
//! byte at a time from a protocol receiver's ring buffer; emits zero or
//! one [`KeyEvent`] per byte.

use crate::error::DecoderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Make,
    Break,
}

/// A physical-key event: a flat key code in `0..=0xFF` (the `0x80+` band is
/// reserved for extended/E0-prefixed keys) plus make/break.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub code: u8,
    pub action: Action,
}

impl KeyEvent {
    pub fn make(code: u8) -> Self {
        KeyEvent {
            code,
            action: Action::Make,
        }
    }
    pub fn break_(code: u8) -> Self {
        KeyEvent {
            code,
            action: Action::Break,
        }
    }
}

/// Synthetic physical-key code for the Set-1/Set-2 Pause key, which has no
/// single-byte representation on the wire.
pub const PAUSE_CODE: u8 = 0xFE;
const SELF_TEST_PASS: u8 = 0xAA;
const EXTENDED_BASE: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State1 {
    Normal,
    ExpectE0,
    /// Counts bytes of the `E1`-prefixed Pause sequence consumed so far,
    /// not including the `E1` byte itself. The sequence is two 3-byte
    /// `E1`-led halves; the Make is synthesized once the first half is
    /// complete (count reaches 2) and the Break once the whole 6-byte
    /// sequence is (count reaches `SET1_PAUSE_TRAILING_LEN`).
    PauseSeq(u8),
}

const SET1_PAUSE_TRAILING_LEN: u8 = 5;
const SET2_PAUSE_TRAILING_LEN: u8 = 7;

/// Set 1 (XT-style) decoder.
pub struct Set1Decoder {
    state: State1,
}

impl Set1Decoder {
    pub const fn new() -> Self {
        Set1Decoder {
            state: State1::Normal,
        }
    }

    pub fn feed(&mut self, b: u8) -> Result<Option<KeyEvent>, DecoderError> {
        match self.state {
            State1::Normal => {
                if b == SELF_TEST_PASS {
                    // Defensive filter; primary filtering is at the
                    // protocol layer (ยง9 open question on Set 1's 0xAA
                    // dual purpose). A legitimate Left-Shift break is
                    // 0xAA with the break bit set over base 0x2A, which
                    // is exactly this byte -- so only absorb it here if
                    // we have no other signal; callers that need the
                    // real Left-Shift break should prefer Set 2/3.
                    return Ok(None);
                }
                if b == 0xE0 {
                    self.state = State1::ExpectE0;
                    return Ok(None);
                }
                if b == 0xE1 {
                    // The concrete trace in ยง8 (S2) is 6 bytes total; 5
                    // remain after this one.
                    self.state = State1::PauseSeq(0);
                    return Ok(None);
                }
                let code = b & 0x7F;
                let action = if b & 0x80 != 0 {
                    Action::Break
                } else {
                    Action::Make
                };
                Ok(Some(KeyEvent { code, action }))
            }
            State1::ExpectE0 => {
                self.state = State1::Normal;
                if b == 0xE0 || b == 0xE1 {
                    return Err(DecoderError::Desync(b));
                }
                let code = EXTENDED_BASE | (b & 0x7F);
                let action = if b & 0x80 != 0 {
                    Action::Break
                } else {
                    Action::Make
                };
                Ok(Some(KeyEvent { code, action }))
            }
            State1::PauseSeq(consumed) => {
                let consumed = consumed + 1;
                if consumed == SET1_PAUSE_TRAILING_LEN {
                    self.state = State1::Normal;
                    Ok(Some(KeyEvent::break_(PAUSE_CODE)))
                } else {
                    self.state = State1::PauseSeq(consumed);
                    if consumed == 2 {
                        Ok(Some(KeyEvent::make(PAUSE_CODE)))
                    } else {
                        Ok(None)
                    }
                }
            }
        }
    }
}

impl Default for Set1Decoder {
    fn default() -> Self {
        Self::new()
    }
}

/// `0xE0`/`0xE1`/`0xF0` are always consumed as prefixes in Set 2 (and
/// `0xF0` in Set 1/Set 3); none of them is ever the data byte a
/// mid-sequence state is waiting for, so seeing one there means the
/// stream desynced (a dropped byte, a glitch) rather than a legitimate
/// key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State2 {
    Normal,
    ExpectF0,
    ExpectE0,
    ExpectE0F0,
    /// Counts bytes of the `E1`-prefixed Pause sequence consumed so far,
    /// not including the `E1` byte itself; same two-half split as
    /// [`State1::PauseSeq`].
    PauseSeq(u8),
}

/// Set 2 (AT/PS2) decoder.
pub struct Set2Decoder {
    state: State2,
}

impl Set2Decoder {
    pub const fn new() -> Self {
        Set2Decoder {
            state: State2::Normal,
        }
    }

    pub fn feed(&mut self, b: u8) -> Result<Option<KeyEvent>, DecoderError> {
        match self.state {
            State2::Normal => match b {
                0xF0 => {
                    self.state = State2::ExpectF0;
                    Ok(None)
                }
                0xE0 => {
                    self.state = State2::ExpectE0;
                    Ok(None)
                }
                0xE1 => {
                    self.state = State2::PauseSeq(0);
                    Ok(None)
                }
                _ => Ok(Some(KeyEvent::make(b))),
            },
            State2::ExpectF0 => {
                self.state = State2::Normal;
                if b == 0xE0 || b == 0xE1 || b == 0xF0 {
                    return Err(DecoderError::Desync(b));
                }
                Ok(Some(KeyEvent::break_(b)))
            }
            State2::ExpectE0 => {
                if b == 0xF0 {
                    self.state = State2::ExpectE0F0;
                    Ok(None)
                } else if b == 0xE0 || b == 0xE1 {
                    self.state = State2::Normal;
                    Err(DecoderError::Desync(b))
                } else {
                    self.state = State2::Normal;
                    Ok(Some(KeyEvent::make(EXTENDED_BASE | b)))
                }
            }
            State2::ExpectE0F0 => {
                self.state = State2::Normal;
                if b == 0xE0 || b == 0xE1 || b == 0xF0 {
                    return Err(DecoderError::Desync(b));
                }
                Ok(Some(KeyEvent::break_(EXTENDED_BASE | b)))
            }
            State2::PauseSeq(consumed) => {
                let consumed = consumed + 1;
                if consumed == SET2_PAUSE_TRAILING_LEN {
                    self.state = State2::Normal;
                    Ok(Some(KeyEvent::break_(PAUSE_CODE)))
                } else {
                    self.state = State2::PauseSeq(consumed);
                    if consumed == 2 {
                        Ok(Some(KeyEvent::make(PAUSE_CODE)))
                    } else {
                        Ok(None)
                    }
                }
            }
        }
    }
}

impl Default for Set2Decoder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State3 {
    Normal,
    ExpectF0,
}

/// Set 3 (terminal) decoder: explicit make and break for every key.
pub struct Set3Decoder {
    state: State3,
}

impl Set3Decoder {
    pub const fn new() -> Self {
        Set3Decoder {
            state: State3::Normal,
        }
    }

    pub fn feed(&mut self, b: u8) -> Result<Option<KeyEvent>, DecoderError> {
        match self.state {
            State3::Normal => {
                if b == 0xF0 {
                    self.state = State3::ExpectF0;
                    Ok(None)
                } else {
                    Ok(Some(KeyEvent::make(b)))
                }
            }
            State3::ExpectF0 => {
                self.state = State3::Normal;
                if b == 0xF0 {
                    return Err(DecoderError::Desync(b));
                }
                Ok(Some(KeyEvent::break_(b)))
            }
        }
    }
}

impl Default for Set3Decoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Amiga decoder: stateless once the receiver has already de-rotated the
/// byte and stripped the special-code band (ยง4.C.3).
pub fn decode_amiga(de_rotated: u8) -> KeyEvent {
    let code = de_rotated & 0x7F;
    if de_rotated & 0x80 != 0 {
        KeyEvent::break_(code)
    } else {
        KeyEvent::make(code)
    }
}

/// M0110 decoder: stateless one-byte make/break, `0x7B` already filtered by
/// the receiver.
pub fn decode_m0110(b: u8) -> KeyEvent {
    let code = b & 0x7F;
    if b & 0x80 != 0 {
        KeyEvent::break_(code)
    } else {
        KeyEvent::make(code)
    }
}

/// Physical-key code to `(row, col)` lookup: a per-keyboard compile-time
/// table, at most 16x16 (ยง4.D).
pub struct PositionTable<const N: usize> {
    table: [(u8, u8); N],
}

impl<const N: usize> PositionTable<N> {
    pub const fn new(table: [(u8, u8); N]) -> Self {
        PositionTable { table }
    }

    /// Looks up `code` as an index; `(0xFF, 0xFF)` marks an unmapped code.
    pub fn lookup(&self, code: u8) -> Option<(u8, u8)> {
        self.table.get(code as usize).filter(|&&(r, c)| r < 16 && c < 16).copied()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn s1_set1_make_break() {
        let mut d = Set1Decoder::new();
        assert_eq!(d.feed(0x1E).unwrap(), Some(KeyEvent::make(0x1E)));
        assert_eq!(d.feed(0x9E).unwrap(), Some(KeyEvent::break_(0x1E)));
    }

    #[test]
    fn set1_extended_key() {
        let mut d = Set1Decoder::new();
        assert_eq!(d.feed(0xE0).unwrap(), None);
        assert_eq!(d.feed(0x1D).unwrap(), Some(KeyEvent::make(EXTENDED_BASE | 0x1D)));
    }

    /// S2: XT Pause on a clone keyboard decodes to one Make/Break pair.
    #[test]
    fn s2_set1_pause_sequence() {
        let mut d = Set1Decoder::new();
        let bytes = [0xE1, 0x1D, 0x45, 0xE1, 0x9D, 0xC5];
        let mut events = std::vec::Vec::new();
        for b in bytes {
            if let Some(ev) = d.feed(b).unwrap() {
                events.push(ev);
            }
        }
        assert_eq!(
            events,
            std::vec![KeyEvent::make(PAUSE_CODE), KeyEvent::break_(PAUSE_CODE)]
        );
    }

    /// S2 (Set 2 half): the AT/PS2 Pause block also decodes to one
    /// Make/Break pair, not a Make that's never released.
    #[test]
    fn s2_set2_pause_sequence() {
        let mut d = Set2Decoder::new();
        let bytes = [0xE1, 0x14, 0x77, 0xE1, 0xF0, 0x14, 0xF0, 0x77];
        let mut events = std::vec::Vec::new();
        for b in bytes {
            if let Some(ev) = d.feed(b).unwrap() {
                events.push(ev);
            }
        }
        assert_eq!(
            events,
            std::vec![KeyEvent::make(PAUSE_CODE), KeyEvent::break_(PAUSE_CODE)]
        );
    }

    #[test]
    fn set1_self_test_pass_is_filtered_in_normal() {
        let mut d = Set1Decoder::new();
        assert_eq!(d.feed(SELF_TEST_PASS).unwrap(), None);
    }

    #[test]
    fn set1_left_shift_break_is_the_same_byte_as_self_test_pass() {
        // Documents the ยง9 open question: Set 1's 0xAA is both BAT-pass
        // and Left Shift's break code; the decoder can't disambiguate and
        // the protocol layer is expected to have already filtered BAT-pass
        // before Initialised.
        const LEFT_SHIFT_BASE: u8 = 0x2A;
        assert_eq!(SELF_TEST_PASS, LEFT_SHIFT_BASE | 0x80);
    }

    /// S1 (decoder half): set-2 'A' press then release.
    #[test]
    fn s1_set2_make_break() {
        let mut d = Set2Decoder::new();
        assert_eq!(d.feed(0x1C).unwrap(), Some(KeyEvent::make(0x1C)));
        assert_eq!(d.feed(0xF0).unwrap(), None);
        assert_eq!(d.feed(0x1C).unwrap(), Some(KeyEvent::break_(0x1C)));
    }

    #[test]
    fn set2_extended_release() {
        let mut d = Set2Decoder::new();
        assert_eq!(d.feed(0xE0).unwrap(), None);
        assert_eq!(d.feed(0xF0).unwrap(), None);
        assert_eq!(d.feed(0x75).unwrap(), Some(KeyEvent::break_(EXTENDED_BASE | 0x75)));
    }

    #[test]
    fn set2_break_prefix_followed_by_break_prefix_is_desync() {
        let mut d = Set2Decoder::new();
        assert_eq!(d.feed(0xF0).unwrap(), None);
        assert_eq!(d.feed(0xF0), Err(DecoderError::Desync(0xF0)));
        // Decoder state is reset, not left mid-sequence.
        assert_eq!(d.feed(0x1C).unwrap(), Some(KeyEvent::make(0x1C)));
    }

    #[test]
    fn set2_extended_prefix_followed_by_extended_prefix_is_desync() {
        let mut d = Set2Decoder::new();
        assert_eq!(d.feed(0xE0).unwrap(), None);
        assert_eq!(d.feed(0xE0), Err(DecoderError::Desync(0xE0)));
    }

    #[test]
    fn set1_extended_prefix_followed_by_extended_prefix_is_desync() {
        let mut d = Set1Decoder::new();
        assert_eq!(d.feed(0xE0).unwrap(), None);
        assert_eq!(d.feed(0xE1), Err(DecoderError::Desync(0xE1)));
    }

    #[test]
    fn set3_explicit_make_and_break() {
        let mut d = Set3Decoder::new();
        assert_eq!(d.feed(0x1C).unwrap(), Some(KeyEvent::make(0x1C)));
        assert_eq!(d.feed(0xF0).unwrap(), None);
        assert_eq!(d.feed(0x1C).unwrap(), Some(KeyEvent::break_(0x1C)));
    }

    #[test]
    fn amiga_make_break() {
        assert_eq!(decode_amiga(0x05), KeyEvent::make(0x05));
        assert_eq!(decode_amiga(0x85), KeyEvent::break_(0x05));
    }

    #[test]
    fn m0110_make_break() {
        assert_eq!(decode_m0110(0x00), KeyEvent::make(0x00));
        assert_eq!(decode_m0110(0x80), KeyEvent::break_(0x00));
    }

    #[test]
    fn position_table_rejects_out_of_range_rows_and_cols() {
        let table: PositionTable<2> = PositionTable::new([(0, 0), (20, 20)]);
        assert_eq!(table.lookup(0), Some((0, 0)));
        assert_eq!(table.lookup(1), None);
    }
}
