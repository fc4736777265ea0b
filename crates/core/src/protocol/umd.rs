use std::fmt;

/// Total size of one UMD message on the wire.
pub const MESSAGE_LEN: usize = 18;

/// Bytes reserved for the display label (`MESSAGE_LEN - 2`).
pub const LABEL_LEN: usize = MESSAGE_LEN - 2;

/// Control byte offset. Bit 7 marks the byte as an address/control byte.
const CONTROL_OFFSET: u8 = 0x80;

/// Base value of the tally byte before any lamp bits are OR'd in.
const TALLY_BASE: u8 = 0x30;

/// One of the four tally lamps a source can have lit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TallySlot {
    Preview = 1,
    Program = 2,
    Tally3 = 3,
    Tally4 = 4,
}

impl TallySlot {
    pub const ALL: [TallySlot; 4] = [
        TallySlot::Preview,
        TallySlot::Program,
        TallySlot::Tally3,
        TallySlot::Tally4,
    ];

    /// Slot number as used in configuration (`tally1`..`tally4`).
    pub fn number(self) -> u8 {
        self as u8
    }

    /// Bit this slot sets in the tally byte.
    pub fn bit(self) -> u8 {
        1 << (self.number() - 1)
    }

    /// The slot after this one, wrapping from 4 back to 1.
    ///
    /// Returns `(next, wrapped)` where `wrapped` is true when the cycle restarts.
    pub fn advance(self) -> (TallySlot, bool) {
        match self {
            TallySlot::Preview => (TallySlot::Program, false),
            TallySlot::Program => (TallySlot::Tally3, false),
            TallySlot::Tally3 => (TallySlot::Tally4, false),
            TallySlot::Tally4 => (TallySlot::Preview, true),
        }
    }
}

impl fmt::Display for TallySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tally{}", self.number())
    }
}

/// Snapshot of the four tally lamps of a source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TallyState {
    pub tally1: bool,
    pub tally2: bool,
    pub tally3: bool,
    pub tally4: bool,
}

impl TallyState {
    /// State with exactly one lamp lit.
    pub fn only(slot: TallySlot) -> Self {
        let mut state = Self::default();
        state.set(slot, true);
        state
    }

    pub fn get(&self, slot: TallySlot) -> bool {
        match slot {
            TallySlot::Preview => self.tally1,
            TallySlot::Program => self.tally2,
            TallySlot::Tally3 => self.tally3,
            TallySlot::Tally4 => self.tally4,
        }
    }

    pub fn set(&mut self, slot: TallySlot, on: bool) {
        match slot {
            TallySlot::Preview => self.tally1 = on,
            TallySlot::Program => self.tally2 = on,
            TallySlot::Tally3 => self.tally3 = on,
            TallySlot::Tally4 => self.tally4 = on,
        }
    }

    /// Number of lamps currently lit.
    pub fn lit(&self) -> usize {
        TallySlot::ALL.iter().filter(|s| self.get(**s)).count()
    }

    /// The tally byte: `0x30` with one bit per lit lamp.
    pub fn to_byte(&self) -> u8 {
        TallySlot::ALL
            .iter()
            .filter(|s| self.get(**s))
            .fold(TALLY_BASE, |byte, s| byte | s.bit())
    }
}

/// One encoded UMD message (TSL UMD v3.1, fixed 18 bytes).
///
/// ```text
///  byte 0          byte 1          bytes 2..17
/// +---------------+---------------+-------------------------------+
/// | 0x80 + addr   | 0x30 | lamps  | label, zero padded (16 bytes) |
/// +---------------+---------------+-------------------------------+
///
/// lamps: bit0 = tally1 (preview)  bit1 = tally2 (program)
///        bit2 = tally3            bit3 = tally4
/// ```
///
/// Addresses are not validated. Anything above 127 overflows the control
/// byte and wraps modulo 256, which is what receivers already see from
/// existing senders. Labels longer than 16 bytes are cut at the last whole
/// UTF-8 character that fits.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Message([u8; MESSAGE_LEN]);

impl Message {
    /// Encode a source's address, label and tally snapshot.
    pub fn encode(address: u16, label: &str, tally: TallyState) -> Self {
        let mut buf = [0u8; MESSAGE_LEN];
        buf[0] = CONTROL_OFFSET.wrapping_add(address as u8);
        buf[1] = tally.to_byte();

        let mut pos = 2;
        for ch in label.chars() {
            let len = ch.len_utf8();
            if pos + len > MESSAGE_LEN {
                break;
            }
            ch.encode_utf8(&mut buf[pos..pos + len]);
            pos += len;
        }

        Self(buf)
    }

    pub fn as_bytes(&self) -> &[u8; MESSAGE_LEN] {
        &self.0
    }

    /// Address as carried on the wire (control offset removed).
    pub fn address(&self) -> u8 {
        self.0[0].wrapping_sub(CONTROL_OFFSET)
    }

    pub fn tally(&self) -> TallyState {
        let byte = self.0[1];
        TallyState {
            tally1: byte & TallySlot::Preview.bit() != 0,
            tally2: byte & TallySlot::Program.bit() != 0,
            tally3: byte & TallySlot::Tally3.bit() != 0,
            tally4: byte & TallySlot::Tally4.bit() != 0,
        }
    }

    /// Label bytes with the zero padding stripped.
    pub fn label_bytes(&self) -> &[u8] {
        let label = &self.0[2..];
        let end = label.iter().position(|b| *b == 0).unwrap_or(LABEL_LEN);
        &label[..end]
    }
}

impl AsRef<[u8]> for Message {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Message(")?;
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{b:02X}")?;
        }
        write!(f, ")")
    }
}
