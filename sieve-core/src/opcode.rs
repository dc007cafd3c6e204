//! Opcode and operand descriptors shared by the generator (C6), the binary
//! container (C7), and the interpreter (C8).
//!
//! Core opcodes occupy the fixed range `[0, CUSTOM_START)`; everything from
//! `CUSTOM_START` up is a two-level extension opcode, `CUSTOM_START +
//! ext_index` followed by a per-extension sub-code byte.

/// First opcode byte reserved for extensions. Core opcodes never use this
/// byte or above.
pub const CUSTOM_START: u8 = 0x20;

/// Sentinel extension opcode marker: `CUSTOM_START | ext_index`, followed by
/// a one-byte sub-code identifying the specific extension opcode.
pub const EXT_OPCODE_MAX: u8 = 0xFF;

macro_rules! core_opcodes {
    ($($name:ident = $code:expr),+ $(,)?) => {
        /// The fixed set of core (non-extension) opcodes. Numeric values are
        /// part of the on-disk format and must never be renumbered.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        #[repr(u8)]
        pub enum CoreOpcode {
            $($name = $code),+
        }

        impl CoreOpcode {
            pub fn from_u8(byte: u8) -> Option<Self> {
                match byte {
                    $($code => Some(Self::$name)),+,
                    _ => None,
                }
            }

            pub fn mnemonic(self) -> &'static str {
                match self {
                    $(Self::$name => stringify!($name)),+
                }
            }
        }
    };
}

core_opcodes! {
    Stop = 0x00,
    Jmp = 0x01,
    JmpIfTrue = 0x02,
    JmpIfFalse = 0x03,
    TestSize = 0x04,
    TestHeader = 0x05,
    TestAddress = 0x06,
    TestExists = 0x07,
    TestTrue = 0x08,
    TestFalse = 0x09,
    TestNotPrefix = 0x0A,
    Keep = 0x0B,
    Discard = 0x0C,
    Redirect = 0x0D,
    Require = 0x0E,
    Nop = 0x0F,
}

/// Groups interchangeable operands so the interpreter can dispatch on a
/// single class-id byte and then read the class-specific body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandClass {
    Number,
    StringRef,
    StringListRef,
    Comparator,
    MatchType,
    AddressPart,
    JumpOffset,
}

impl OperandClass {
    /// The tag byte written immediately before this class's payload, used by
    /// the optional-operand-block sentinel scheme.
    pub fn tag_byte(self) -> u8 {
        match self {
            OperandClass::Number => 0x01,
            OperandClass::StringRef => 0x02,
            OperandClass::StringListRef => 0x03,
            OperandClass::Comparator => 0x04,
            OperandClass::MatchType => 0x05,
            OperandClass::AddressPart => 0x06,
            OperandClass::JumpOffset => 0x07,
        }
    }
}

/// Terminates an optional-operand block: `0x00` after the
/// last `(tag, payload)` pair.
pub const OPTIONAL_BLOCK_END: u8 = 0x00;
/// Marks the start of a present optional-operand region.
pub const OPTIONAL_BLOCK_PRESENT: u8 = 0x00;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operand {
    pub name: &'static str,
    pub class: OperandClass,
    pub is_optional: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_opcodes_round_trip_through_their_byte() {
        assert_eq!(CoreOpcode::from_u8(0x0B), Some(CoreOpcode::Keep));
        assert_eq!(CoreOpcode::Keep.mnemonic(), "Keep");
        assert!(CoreOpcode::from_u8(CUSTOM_START).is_none());
    }
}
