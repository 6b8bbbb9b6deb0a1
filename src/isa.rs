//! Instruction set definitions and the instruction decoder.
//!
//! The [`for_each_opcode!`](crate::for_each_opcode) macro holds the canonical
//! opcode definitions (variant, byte value, mnemonic, base run-limit cost)
//! and invokes a callback macro for code generation. This enables multiple
//! modules to generate opcode-related code without duplicating definitions.
//!
//! This module generates:
//! - The [`Opcode`] enum with byte mappings
//! - `TryFrom<u8>` for decoding opcode bytes
//! - Mnemonic and base-cost lookups
//!
//! See [`assembler`](crate::assembler) for the text form built on top of the
//! same table.
//!
//! # Bytecode Format
//!
//! - `0x00`: push the empty (false) value
//! - `0x01`..`0x4b`: push the following `opcode` bytes literally
//! - `0x4c`/`0x4d`/`0x4e`: push with a 1/2/4-byte little-endian length prefix
//! - `0x4f`: push the integer -1
//! - `0x51`..`0x60`: push the integers 1 through 16
//! - `0x65`, `0x66`: permanently reserved, always illegal
//! - all other assigned bytes: fixed single-byte operations
//! - unassigned bytes: decode error

use crate::errors::VmError;
use crate::types::bytes::Bytes;
use crate::types::value::int64_to_bytes;

/// Largest data length encodable as a direct (length-in-opcode) push.
pub const MAX_DIRECT_PUSH: usize = 0x4b;

/// The two permanently reserved byte values.
const RESERVED: [u8; 2] = [0x65, 0x66];

/// Invokes a callback macro with the complete opcode definition list.
///
/// Entry format: `Variant = byte, "MNEMONIC", base_cost`. The base cost is
/// charged immediately before the handler runs; data-dependent costs are
/// applied inside handlers.
#[macro_export]
macro_rules! for_each_opcode {
    ($callback:ident) => {
        $callback! {
            // =========================
            // Pushes
            // =========================
            /// FALSE ; push the empty (false) value
            False = 0x00, "FALSE", 1,
            /// Direct push: bytes 0x01-0x4b carry their data length in the opcode
            DataPush = 0x01, "PUSHDATA", 1,
            /// Push with a 1-byte length prefix
            Pushdata1 = 0x4c, "PUSHDATA1", 1,
            /// Push with a 2-byte little-endian length prefix
            Pushdata2 = 0x4d, "PUSHDATA2", 1,
            /// Push with a 4-byte little-endian length prefix
            Pushdata4 = 0x4e, "PUSHDATA4", 1,
            /// 1NEGATE ; push the integer -1
            OneNegate = 0x4f, "1NEGATE", 1,
            /// TRUE ; push the integer 1
            True = 0x51, "TRUE", 1,
            Num2 = 0x52, "2", 1,
            Num3 = 0x53, "3", 1,
            Num4 = 0x54, "4", 1,
            Num5 = 0x55, "5", 1,
            Num6 = 0x56, "6", 1,
            Num7 = 0x57, "7", 1,
            Num8 = 0x58, "8", 1,
            Num9 = 0x59, "9", 1,
            Num10 = 0x5a, "10", 1,
            Num11 = 0x5b, "11", 1,
            Num12 = 0x5c, "12", 1,
            Num13 = 0x5d, "13", 1,
            Num14 = 0x5e, "14", 1,
            Num15 = 0x5f, "15", 1,
            Num16 = 0x60, "16", 1,
            // =========================
            // Control flow
            // =========================
            /// WHILE ; peek loop condition, open a loop tuple
            While = 0x61, "WHILE", 1,
            /// ENDWHILE ; close a loop tuple, jump back when its flag is set
            EndWhile = 0x62, "ENDWHILE", 1,
            /// IF ; pop condition, open a branch tuple
            If = 0x63, "IF", 1,
            /// NOTIF ; pop condition, open a branch tuple with negated flag
            NotIf = 0x64, "NOTIF", 1,
            /// ELSE ; invert the innermost branch tuple
            Else = 0x67, "ELSE", 1,
            /// ENDIF ; close a branch tuple
            EndIf = 0x68, "ENDIF", 1,
            /// VERIFY ; pop a boolean, fail when false
            Verify = 0x69, "VERIFY", 1,
            /// FAIL ; unconditionally abort the program
            Fail = 0x6a, "FAIL", 1,
            // =========================
            // Stack
            // =========================
            ToAltStack = 0x6b, "TOALTSTACK", 2,
            FromAltStack = 0x6c, "FROMALTSTACK", 2,
            TwoDup = 0x6e, "2DUP", 2,
            ThreeDup = 0x6f, "3DUP", 3,
            TwoOver = 0x70, "2OVER", 2,
            TwoRot = 0x71, "2ROT", 2,
            TwoSwap = 0x72, "2SWAP", 2,
            /// IFDUP ; duplicate the top value when it is true
            IfDup = 0x73, "IFDUP", 1,
            /// DEPTH ; push the data stack size
            Depth = 0x74, "DEPTH", 1,
            Drop = 0x75, "DROP", 1,
            Dup = 0x76, "DUP", 1,
            Nip = 0x77, "NIP", 1,
            Over = 0x78, "OVER", 1,
            /// PICK ; pop n, copy the nth-from-top value to the top
            Pick = 0x79, "PICK", 2,
            /// ROLL ; pop n, move the nth-from-top value to the top
            Roll = 0x7a, "ROLL", 2,
            Rot = 0x7b, "ROT", 2,
            Swap = 0x7c, "SWAP", 1,
            Tuck = 0x7d, "TUCK", 1,
            // =========================
            // Splice
            // =========================
            /// CAT ; concatenate the top two byte strings
            Cat = 0x7e, "CAT", 4,
            /// SUBSTR ; pop size, offset, string; push the range
            Substr = 0x7f, "SUBSTR", 4,
            Left = 0x80, "LEFT", 4,
            Right = 0x81, "RIGHT", 4,
            /// SIZE ; push the length of the top value without popping it
            Size = 0x82, "SIZE", 1,
            // =========================
            // Bitwise
            // =========================
            /// INVERT ; complement every byte
            Invert = 0x83, "INVERT", 1,
            /// AND ; bitwise and, truncated to the shorter operand
            And = 0x84, "AND", 1,
            /// OR ; bitwise or, zero-extended to the longer operand
            Or = 0x85, "OR", 1,
            /// XOR ; bitwise xor, zero-extended to the longer operand
            Xor = 0x86, "XOR", 1,
            /// EQUAL ; full byte equality, cost charged on the shorter operand
            Equal = 0x87, "EQUAL", 1,
            EqualVerify = 0x88, "EQUALVERIFY", 1,
            /// CATPUSHDATA ; append the top value to the second as an inline push
            CatPushdata = 0x89, "CATPUSHDATA", 4,
            // =========================
            // Numeric
            // =========================
            OneAdd = 0x8b, "1ADD", 2,
            OneSub = 0x8c, "1SUB", 2,
            TwoMul = 0x8d, "2MUL", 2,
            TwoDiv = 0x8e, "2DIV", 2,
            Negate = 0x8f, "NEGATE", 2,
            Abs = 0x90, "ABS", 2,
            Not = 0x91, "NOT", 2,
            ZeroNotEqual = 0x92, "0NOTEQUAL", 2,
            Add = 0x93, "ADD", 2,
            Sub = 0x94, "SUB", 2,
            Mul = 0x95, "MUL", 8,
            /// DIV ; flooring division, divide-by-zero fails
            Div = 0x96, "DIV", 8,
            /// MOD ; remainder taking the divisor's sign
            Mod = 0x97, "MOD", 8,
            /// LSHIFT ; sign-magnitude left shift
            Lshift = 0x98, "LSHIFT", 8,
            /// RSHIFT ; sign-magnitude right shift
            Rshift = 0x99, "RSHIFT", 8,
            BoolAnd = 0x9a, "BOOLAND", 2,
            BoolOr = 0x9b, "BOOLOR", 2,
            NumEqual = 0x9c, "NUMEQUAL", 2,
            NumEqualVerify = 0x9d, "NUMEQUALVERIFY", 2,
            NumNotEqual = 0x9e, "NUMNOTEQUAL", 2,
            LessThan = 0x9f, "LESSTHAN", 2,
            GreaterThan = 0xa0, "GREATERTHAN", 2,
            LessThanOrEqual = 0xa1, "LESSTHANOREQUAL", 2,
            GreaterThanOrEqual = 0xa2, "GREATERTHANOREQUAL", 2,
            Min = 0xa3, "MIN", 2,
            /// WITHIN ; x min max -> min <= x < max. Byte 0xa4 was assigned
            /// twice, to MAX and WITHIN; the WITHIN binding won, and MAX
            /// still assembles to this byte (see [`Opcode::from_mnemonic`]).
            Within = 0xa4, "WITHIN", 4,
            // =========================
            // Crypto
            // =========================
            Ripemd160 = 0xa6, "RIPEMD160", 64,
            Sha1 = 0xa7, "SHA1", 64,
            Sha256 = 0xa8, "SHA256", 64,
            Sha3 = 0xaa, "SHA3", 64,
            /// CHECKSIG ; pop pubkey, 32-byte message, signature; push validity
            CheckSig = 0xac, "CHECKSIG", 1024,
            /// CHECKMULTISIG ; greedy m-of-n signature check
            CheckMultiSig = 0xad, "CHECKMULTISIG", 1024,
            /// TXSIGHASH ; pop hash type, push the current input's sighash
            TxSigHash = 0xae, "TXSIGHASH", 256,
            /// BLOCKSIGHASH ; push the current block header's sighash
            BlockSigHash = 0xaf, "BLOCKSIGHASH", 64,
            // =========================
            // Predicates and introspection
            // =========================
            /// CHECKPREDICATE ; pop limit and program, run a child frame
            CheckPredicate = 0xc0, "CHECKPREDICATE", 256,
            /// FINDOUTPUT ; pop program, index hint, amount, asset id; push
            /// whether a matching transaction output exists
            FindOutput = 0xc1, "FINDOUTPUT", 64,
            Asset = 0xc2, "ASSET", 1,
            Amount = 0xc3, "AMOUNT", 1,
            Program = 0xc4, "PROGRAM", 1,
            MinTime = 0xc5, "MINTIME", 1,
            MaxTime = 0xc6, "MAXTIME", 1,
            RefDataHash = 0xc7, "REFDATAHASH", 1,
            Index = 0xc8, "INDEX", 1,
        }
    };
}

macro_rules! define_opcodes {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $byte:literal, $mnemonic:literal, $cost:expr
        ),* $(,)?
    ) => {
        /// A dispatchable operation.
        ///
        /// The discriminant is the opcode's byte value. Direct pushes
        /// (`0x01`-`0x4b`) all decode to [`Opcode::DataPush`]; the decoder
        /// reads the length out of the byte itself.
        #[derive(Copy, Clone, Debug, Eq, PartialEq)]
        #[repr(u8)]
        pub enum Opcode {
            $(
                $(#[$doc])*
                $name = $byte,
            )*
        }

        impl TryFrom<u8> for Opcode {
            type Error = VmError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( $byte => Ok(Opcode::$name), )*
                    _ => Err(VmError::UnknownOpcode { opcode: value }),
                }
            }
        }

        impl Opcode {
            /// Returns the assembly mnemonic for this opcode.
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( Opcode::$name => $mnemonic, )*
                }
            }

            /// Returns the base run-limit cost charged before the handler runs.
            pub const fn base_cost(&self) -> i64 {
                match self {
                    $( Opcode::$name => $cost, )*
                }
            }

            fn lookup_mnemonic(name: &str) -> Option<Opcode> {
                match name {
                    $( $mnemonic => Some(Opcode::$name), )*
                    _ => None,
                }
            }
        }
    };
}

crate::for_each_opcode!(define_opcodes);

impl Opcode {
    /// Resolves an assembly mnemonic to an opcode.
    ///
    /// `MAX` resolves to [`Opcode::Within`]: byte `0xa4` was registered for
    /// both operations and the later WITHIN entry silently won. Programs
    /// spelled with `MAX` therefore execute WITHIN semantics, and this
    /// mapping is kept for bytecode compatibility.
    pub fn from_mnemonic(name: &str) -> Option<Opcode> {
        if name == "MAX" {
            return Some(Opcode::Within);
        }
        Self::lookup_mnemonic(name)
    }

    /// The six opcodes that run even inside an inactive branch so that
    /// nesting stays consistent.
    pub const fn is_control_flow(&self) -> bool {
        matches!(
            self,
            Opcode::If
                | Opcode::NotIf
                | Opcode::Else
                | Opcode::EndIf
                | Opcode::While
                | Opcode::EndWhile
        )
    }

    /// Push opcodes whose inline data lives in the program stream. These
    /// have no bare mnemonic form; the assembler emits them from literals.
    pub const fn is_raw_push(&self) -> bool {
        matches!(
            self,
            Opcode::DataPush | Opcode::Pushdata1 | Opcode::Pushdata2 | Opcode::Pushdata4
        )
    }
}

/// Decoded view of one program position - opcode, total length (opcode plus
/// inline data) and the inline data itself. Never mutated.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub data: Bytes,
    pub len: usize,
}

/// Parses the instruction at `pc`.
///
/// Small-integer opcodes and FALSE yield their literal value as inline data
/// so that a single push handler serves the whole family. Truncated pushes
/// and out-of-range offsets fail with [`VmError::ShortProgram`]; the two
/// reserved bytes fail with [`VmError::IllegalOpcode`].
pub fn decode_instruction(program: &[u8], pc: usize) -> Result<Instruction, VmError> {
    let byte = *program.get(pc).ok_or(VmError::ShortProgram { pc })?;
    if RESERVED.contains(&byte) {
        return Err(VmError::IllegalOpcode { opcode: byte });
    }
    match byte {
        0x00 => Ok(Instruction {
            opcode: Opcode::False,
            data: Bytes::default(),
            len: 1,
        }),
        0x01..=0x4b => {
            let n = byte as usize;
            Ok(Instruction {
                opcode: Opcode::DataPush,
                data: inline_data(program, pc, pc + 1, n)?,
                len: 1 + n,
            })
        }
        0x4c | 0x4d | 0x4e => {
            let width = match byte {
                0x4c => 1,
                0x4d => 2,
                _ => 4,
            };
            let len_field = program
                .get(pc + 1..pc + 1 + width)
                .ok_or(VmError::ShortProgram { pc })?;
            let n = len_field
                .iter()
                .rev()
                .fold(0usize, |acc, &b| (acc << 8) | b as usize);
            Ok(Instruction {
                opcode: Opcode::try_from(byte)?,
                data: inline_data(program, pc, pc + 1 + width, n)?,
                len: 1 + width + n,
            })
        }
        0x4f => Ok(Instruction {
            opcode: Opcode::OneNegate,
            data: int64_to_bytes(-1),
            len: 1,
        }),
        0x51..=0x60 => Ok(Instruction {
            opcode: Opcode::try_from(byte)?,
            data: Bytes::new([byte - 0x50]),
            len: 1,
        }),
        _ => Ok(Instruction {
            opcode: Opcode::try_from(byte)?,
            data: Bytes::default(),
            len: 1,
        }),
    }
}

fn inline_data(program: &[u8], pc: usize, start: usize, n: usize) -> Result<Bytes, VmError> {
    let end = start.checked_add(n).ok_or(VmError::ShortProgram { pc })?;
    program
        .get(start..end)
        .map(Bytes::from)
        .ok_or(VmError::ShortProgram { pc })
}

/// Appends the canonical (minimal) push encoding of `data` to `out`.
///
/// The empty string becomes FALSE; lengths up to 75 use the direct form;
/// longer data uses the smallest explicit length prefix that fits.
pub fn append_push(out: &mut Vec<u8>, data: &[u8]) {
    let n = data.len();
    if n == 0 {
        out.push(Opcode::False as u8);
        return;
    }
    if n <= MAX_DIRECT_PUSH {
        out.push(n as u8);
    } else if n <= 0xff {
        out.push(Opcode::Pushdata1 as u8);
        out.push(n as u8);
    } else if n <= 0xffff {
        out.push(Opcode::Pushdata2 as u8);
        out.extend_from_slice(&(n as u16).to_le_bytes());
    } else {
        out.push(Opcode::Pushdata4 as u8);
        out.extend_from_slice(&(n as u32).to_le_bytes());
    }
    out.extend_from_slice(data);
}

/// Appends the canonical push of an integer: the one-byte opcodes for -1,
/// 0 and 1 through 16, the minimal data encoding otherwise.
pub fn append_push_int(out: &mut Vec<u8>, n: i64) {
    match n {
        0 => out.push(Opcode::False as u8),
        -1 => out.push(Opcode::OneNegate as u8),
        1..=16 => out.push(0x50 + n as u8),
        _ => append_push(out, &int64_to_bytes(n)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_from_unknown_byte() {
        assert!(matches!(
            Opcode::try_from(0xff),
            Err(VmError::UnknownOpcode { opcode: 0xff })
        ));
    }

    #[test]
    fn decode_empty_program() {
        assert!(matches!(
            decode_instruction(&[], 0),
            Err(VmError::ShortProgram { pc: 0 })
        ));
    }

    #[test]
    fn decode_reserved_bytes() {
        for byte in [0x65u8, 0x66] {
            assert!(matches!(
                decode_instruction(&[byte], 0),
                Err(VmError::IllegalOpcode { opcode }) if opcode == byte
            ));
        }
    }

    #[test]
    fn decode_unknown_byte() {
        assert!(matches!(
            decode_instruction(&[0xfe], 0),
            Err(VmError::UnknownOpcode { opcode: 0xfe })
        ));
    }

    #[test]
    fn decode_small_integers() {
        let instr = decode_instruction(&[0x51], 0).unwrap();
        assert_eq!(instr.opcode, Opcode::True);
        assert_eq!(instr.data, [1]);
        assert_eq!(instr.len, 1);

        let instr = decode_instruction(&[0x60], 0).unwrap();
        assert_eq!(instr.opcode, Opcode::Num16);
        assert_eq!(instr.data, [16]);
    }

    #[test]
    fn decode_false_and_one_negate() {
        let instr = decode_instruction(&[0x00], 0).unwrap();
        assert_eq!(instr.opcode, Opcode::False);
        assert!(instr.data.is_empty());

        let instr = decode_instruction(&[0x4f], 0).unwrap();
        assert_eq!(instr.opcode, Opcode::OneNegate);
        assert_eq!(instr.data, [0xff; 8]);
    }

    #[test]
    fn decode_direct_push() {
        let instr = decode_instruction(&[0x03, 0xaa, 0xbb, 0xcc, 0x75], 0).unwrap();
        assert_eq!(instr.opcode, Opcode::DataPush);
        assert_eq!(instr.data, [0xaa, 0xbb, 0xcc]);
        assert_eq!(instr.len, 4);
    }

    #[test]
    fn decode_direct_push_truncated() {
        assert!(matches!(
            decode_instruction(&[0x03, 0xaa], 0),
            Err(VmError::ShortProgram { pc: 0 })
        ));
    }

    #[test]
    fn decode_pushdata_forms() {
        let instr = decode_instruction(&[0x4c, 0x02, 0x01, 0x02], 0).unwrap();
        assert_eq!(instr.opcode, Opcode::Pushdata1);
        assert_eq!(instr.data, [0x01, 0x02]);
        assert_eq!(instr.len, 4);

        let instr = decode_instruction(&[0x4d, 0x01, 0x00, 0x09], 0).unwrap();
        assert_eq!(instr.opcode, Opcode::Pushdata2);
        assert_eq!(instr.data, [0x09]);
        assert_eq!(instr.len, 4);

        let instr = decode_instruction(&[0x4e, 0x01, 0x00, 0x00, 0x00, 0x09], 0).unwrap();
        assert_eq!(instr.opcode, Opcode::Pushdata4);
        assert_eq!(instr.data, [0x09]);
        assert_eq!(instr.len, 6);
    }

    #[test]
    fn decode_pushdata_truncated_length_field() {
        assert!(matches!(
            decode_instruction(&[0x4d, 0x01], 0),
            Err(VmError::ShortProgram { .. })
        ));
        assert!(matches!(
            decode_instruction(&[0x4c, 0x05, 0x01], 0),
            Err(VmError::ShortProgram { .. })
        ));
    }

    #[test]
    fn decode_at_offset() {
        let prog = [0x51, 0x02, 0x07, 0x08];
        let instr = decode_instruction(&prog, 1).unwrap();
        assert_eq!(instr.opcode, Opcode::DataPush);
        assert_eq!(instr.data, [0x07, 0x08]);
    }

    #[test]
    fn mnemonic_roundtrip() {
        for op in [Opcode::Dup, Opcode::CheckSig, Opcode::While, Opcode::Num7] {
            assert_eq!(Opcode::from_mnemonic(op.mnemonic()), Some(op));
        }
        assert_eq!(Opcode::from_mnemonic("NOSUCHOP"), None);
    }

    #[test]
    fn max_assembles_to_within() {
        assert_eq!(Opcode::from_mnemonic("MAX"), Some(Opcode::Within));
        assert_eq!(Opcode::from_mnemonic("WITHIN"), Some(Opcode::Within));
    }

    #[test]
    fn append_push_picks_minimal_form() {
        let mut out = Vec::new();
        append_push(&mut out, &[]);
        assert_eq!(out, [0x00]);

        let mut out = Vec::new();
        append_push(&mut out, &[0xab; 3]);
        assert_eq!(out[..1], [0x03]);
        assert_eq!(out.len(), 4);

        let mut out = Vec::new();
        append_push(&mut out, &[0xab; 80]);
        assert_eq!(out[..2], [0x4c, 80]);
        assert_eq!(out.len(), 82);

        let mut out = Vec::new();
        append_push(&mut out, &[0xab; 300]);
        assert_eq!(out[..3], [0x4d, 0x2c, 0x01]);
        assert_eq!(out.len(), 303);
    }

    #[test]
    fn append_push_int_uses_one_byte_opcodes() {
        let mut out = Vec::new();
        append_push_int(&mut out, 0);
        append_push_int(&mut out, 1);
        append_push_int(&mut out, 16);
        append_push_int(&mut out, -1);
        assert_eq!(out, [0x00, 0x51, 0x60, 0x4f]);

        let mut out = Vec::new();
        append_push_int(&mut out, 17);
        assert_eq!(out, [0x01, 0x11]);
    }

    #[test]
    fn push_encodings_decode_back() {
        for data in [vec![], vec![7u8], vec![0xee; 75], vec![0xee; 76], vec![0xee; 300]] {
            let mut out = Vec::new();
            append_push(&mut out, &data);
            let instr = decode_instruction(&out, 0).unwrap();
            assert_eq!(instr.data.as_slice(), data.as_slice());
            assert_eq!(instr.len, out.len());
        }
    }
}
