//! Panelbus register model and protocol primitives
//!
//! This crate provides the basic data type definitions used by the other
//! panelbus crates: the two 16-bit exchange words, the word-addressed
//! register map the bridge exports, and the fieldbus function/exception
//! codes. Panelbus users should not depend on this crate directly. Use the
//! `panelbus::core` re-export instead.
//!
//! The wire layouts are fixed by the observed appliance and by the deployed
//! fieldbus clients. All packing is explicit; nothing here relies on struct
//! layout or platform bit-field ordering.
#![no_std]

#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InvalidValue;

/// Word address of the status register (read as an input register).
pub const STATUS_REGISTER: u16 = 0;

/// Word address of the command register (read as a holding register,
/// written with write-single-register).
pub const COMMAND_REGISTER: u16 = 0;

/// Number of snapshot pages exported over the fieldbus.
pub const PAGE_COUNT: usize = 5;

/// Registers per snapshot page.
///
/// The fieldbus limits a single read transaction, so the reorganized bulk
/// frame is exported as several fixed-size page reads.
pub const PAGE_WORDS: usize = 107;

/// Address distance between consecutive snapshot pages. Page `n` (1-based)
/// starts at `n * PAGE_STRIDE`.
pub const PAGE_STRIDE: u16 = 1000;

/// Maps a first-register address to a 1-based snapshot page number.
pub const fn page_number(address: u16) -> Option<usize> {
    if address == 0 || address % PAGE_STRIDE != 0 {
        return None;
    }
    let page = (address / PAGE_STRIDE) as usize;
    if page <= PAGE_COUNT { Some(page) } else { None }
}

/// First-register address of a 1-based snapshot page number.
pub const fn page_address(page: usize) -> u16 {
    page as u16 * PAGE_STRIDE
}

/// Input status word exported at [`STATUS_REGISTER`]
///
/// The low byte carries the raw button inputs sampled from the appliance's
/// shift register. Two of its bit positions are not wired to buttons and
/// are repurposed as latched fault indicators:
///
/// | bits | meaning |
/// |------|---------|
/// | 0..=7 | button inputs; bit 4 = manual-press latch, bit 5 = push-failed latch |
/// | 8 | power button held |
/// | 9 | reserved |
/// | 10 | supply present |
/// | 11 | standby active |
/// | 12 | red display lit |
/// | 13 | white display lit |
/// | 14 | stream capture live |
/// | 15 | register capture live |
///
/// The latches are sticky: they survive new capture data and clear only on
/// a successful status read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatusWord {
    /// Button inputs with the latch positions masked out.
    pub buttons: u8,
    /// A button was pressed on the appliance itself, not over the bus.
    pub manual_press: bool,
    /// A commanded press was never observed on the inputs.
    pub push_failed: bool,
    pub power_button: bool,
    pub supply_present: bool,
    pub standby: bool,
    pub red_lit: bool,
    pub white_lit: bool,
    pub stream_live: bool,
    pub register_live: bool,
}

impl StatusWord {
    /// Manual-press latch position within the button byte.
    pub const MANUAL_PRESS: u8 = 1 << 4;
    /// Push-failed latch position within the button byte.
    pub const PUSH_FAILED: u8 = 1 << 5;
    /// Button-input positions of the low byte (latch positions excluded).
    pub const BUTTON_MASK: u8 = !(Self::MANUAL_PRESS | Self::PUSH_FAILED);

    const POWER_BUTTON: u16 = 1 << 8;
    const SUPPLY_PRESENT: u16 = 1 << 10;
    const STANDBY: u16 = 1 << 11;
    const RED_LIT: u16 = 1 << 12;
    const WHITE_LIT: u16 = 1 << 13;
    const STREAM_LIVE: u16 = 1 << 14;
    const REGISTER_LIVE: u16 = 1 << 15;

    /// The low byte as it appears on the wire, latches overlaid.
    pub const fn button_byte(&self) -> u8 {
        let mut byte = self.buttons & Self::BUTTON_MASK;
        if self.manual_press {
            byte |= Self::MANUAL_PRESS;
        }
        if self.push_failed {
            byte |= Self::PUSH_FAILED;
        }
        byte
    }

    /// Replaces the button inputs from a freshly sampled byte.
    ///
    /// The latch positions of `byte` are taken as the new latch values, so
    /// a caller that wants the latches preserved must overlay them first
    /// (see [`StatusWord::button_byte`]).
    pub const fn set_button_byte(&mut self, byte: u8) {
        self.buttons = byte & Self::BUTTON_MASK;
        self.manual_press = byte & Self::MANUAL_PRESS != 0;
        self.push_failed = byte & Self::PUSH_FAILED != 0;
    }

    pub const fn pack(&self) -> u16 {
        let mut word = self.button_byte() as u16;
        if self.power_button {
            word |= Self::POWER_BUTTON;
        }
        if self.supply_present {
            word |= Self::SUPPLY_PRESENT;
        }
        if self.standby {
            word |= Self::STANDBY;
        }
        if self.red_lit {
            word |= Self::RED_LIT;
        }
        if self.white_lit {
            word |= Self::WHITE_LIT;
        }
        if self.stream_live {
            word |= Self::STREAM_LIVE;
        }
        if self.register_live {
            word |= Self::REGISTER_LIVE;
        }
        word
    }

    pub const fn unpack(word: u16) -> Self {
        let byte = word as u8;
        Self {
            buttons: byte & Self::BUTTON_MASK,
            manual_press: byte & Self::MANUAL_PRESS != 0,
            push_failed: byte & Self::PUSH_FAILED != 0,
            power_button: word & Self::POWER_BUTTON != 0,
            supply_present: word & Self::SUPPLY_PRESENT != 0,
            standby: word & Self::STANDBY != 0,
            red_lit: word & Self::RED_LIT != 0,
            white_lit: word & Self::WHITE_LIT != 0,
            stream_live: word & Self::STREAM_LIVE != 0,
            register_live: word & Self::REGISTER_LIVE != 0,
        }
    }
}

impl From<StatusWord> for u16 {
    fn from(value: StatusWord) -> Self {
        value.pack()
    }
}

impl From<u16> for StatusWord {
    fn from(value: u16) -> Self {
        Self::unpack(value)
    }
}

/// Interpreted view of the command register
///
/// The register itself is stored raw: unknown bits are kept and echoed
/// verbatim. This view extracts the bits the acquisition engine acts on.
///
/// | bits | meaning |
/// |------|---------|
/// | 0..=7 | button press requests (bits 4 and 5 unused) |
/// | 8 | power button press request |
/// | 10 | hold: keep the request asserted until overwritten |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CommandWord {
    pub buttons: u8,
    pub power_button: bool,
    pub hold: bool,
}

impl CommandWord {
    /// Power-button request bit within the raw register.
    pub const POWER_BUTTON: u16 = 1 << 8;
    /// Hold bit within the raw register.
    pub const HOLD: u16 = 1 << 10;
    /// Bits cleared when a press request is released.
    pub const RELEASE_MASK: u16 = 0x00ff | Self::POWER_BUTTON;

    pub const fn from_raw(raw: u16) -> Self {
        Self {
            buttons: raw as u8,
            power_button: raw & Self::POWER_BUTTON != 0,
            hold: raw & Self::HOLD != 0,
        }
    }

    pub const fn into_raw(self) -> u16 {
        let mut raw = self.buttons as u16;
        if self.power_button {
            raw |= Self::POWER_BUTTON;
        }
        if self.hold {
            raw |= Self::HOLD;
        }
        raw
    }
}

impl From<u16> for CommandWord {
    fn from(value: u16) -> Self {
        Self::from_raw(value)
    }
}

/// Fieldbus function codes the bridge implements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum FunctionCode {
    ReadHoldingRegisters = 3,
    ReadInputRegisters = 4,
    WriteSingleRegister = 6,
}

impl FunctionCode {
    pub const fn try_from_u8(code: u8) -> Option<Self> {
        match code {
            3 => Some(Self::ReadHoldingRegisters),
            4 => Some(Self::ReadInputRegisters),
            6 => Some(Self::WriteSingleRegister),
            _ => None,
        }
    }

    pub const fn into_u8(self) -> u8 {
        self as u8
    }
}

impl From<FunctionCode> for u8 {
    fn from(value: FunctionCode) -> Self {
        value.into_u8()
    }
}

impl TryFrom<u8> for FunctionCode {
    type Error = InvalidValue;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::try_from_u8(value).ok_or(InvalidValue)
    }
}

/// Fieldbus exception codes the bridge can answer with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ExceptionCode {
    /// Unsupported function code.
    IllegalFunction = 1,
    /// Out-of-range or out-of-sequence register access.
    IllegalDataAddress = 2,
    /// The acquisition side did not acknowledge a command write in time.
    ServerBusy = 6,
}

impl ExceptionCode {
    pub const fn into_u8(self) -> u8 {
        self as u8
    }
}

impl From<ExceptionCode> for u8 {
    fn from(value: ExceptionCode) -> Self {
        value.into_u8()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_word_round_trip() {
        let word = StatusWord {
            buttons: 0b1100_1001,
            manual_press: true,
            push_failed: false,
            power_button: true,
            supply_present: true,
            standby: false,
            red_lit: true,
            white_lit: false,
            stream_live: true,
            register_live: true,
        };

        assert_eq!(StatusWord::unpack(word.pack()), word);
        assert_eq!(word.pack() & 0xff, 0b1101_1001);
        assert_eq!(word.pack() >> 8, 0b1101_0101);
    }

    #[test]
    fn test_status_word_latch_overlay() {
        let mut word = StatusWord::default();
        word.set_button_byte(0b0011_0011);
        assert_eq!(word.buttons, 0b0000_0011);
        assert!(word.manual_press);
        assert!(word.push_failed);
        assert_eq!(word.button_byte(), 0b0011_0011);
    }

    #[test]
    fn test_command_word_view() {
        let cmd = CommandWord::from_raw(0b0000_0101_0000_1001);
        assert_eq!(cmd.buttons, 0b0000_1001);
        assert!(cmd.power_button);
        assert!(cmd.hold);

        // unknown bits are not part of the view
        let raw = 0b1010_0000_0000_0000;
        assert_eq!(CommandWord::from_raw(raw).into_raw(), 0);
    }

    #[test]
    fn test_page_numbers() {
        assert_eq!(page_number(0), None);
        assert_eq!(page_number(999), None);
        assert_eq!(page_number(1000), Some(1));
        assert_eq!(page_number(5000), Some(5));
        assert_eq!(page_number(6000), None);
        assert_eq!(page_address(3), 3000);
    }

    #[test]
    fn test_function_codes() {
        assert_eq!(FunctionCode::try_from_u8(4), Some(FunctionCode::ReadInputRegisters));
        assert!(FunctionCode::try_from_u8(0x11).is_none());
        assert_eq!(u8::from(ExceptionCode::ServerBusy), 6);
    }
}
