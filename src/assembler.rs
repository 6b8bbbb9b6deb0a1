//! Text form compiler and decompiler for programs.
//!
//! A tooling and debugging aid, not consensus-critical: the binary program
//! is the canonical form and the text form is a rendering of it.
//!
//! # Syntax
//!
//! Whitespace-separated tokens:
//!
//! - a bare opcode mnemonic (e.g. `DUP`, `CHECKSIG`)
//! - a `0x`-prefixed hex literal, pushed as data
//! - a single-quoted byte string with `\`-escaping, pushed as data
//! - a bare decimal integer, pushed via the minimal integer encoding
//!
//! Anything else is a token error. Integer literals and data literals
//! always compile to the canonical (smallest) push form, so compiling a
//! decompiled program reproduces the original bytes.

use crate::errors::VmError;
use crate::isa::{Opcode, append_push, append_push_int, decode_instruction};

enum Token {
    Word(String),
    Quoted(Vec<u8>),
}

fn tokenize(source: &str) -> Result<Vec<Token>, VmError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        if b == b'\'' {
            i += 1;
            let mut data = Vec::new();
            loop {
                match bytes.get(i) {
                    None => return Err(VmError::UnterminatedString),
                    Some(b'\'') => {
                        i += 1;
                        break;
                    }
                    Some(b'\\') => {
                        // An escaped byte stands for itself.
                        i += 1;
                        match bytes.get(i) {
                            None => return Err(VmError::UnterminatedString),
                            Some(&escaped) => {
                                data.push(escaped);
                                i += 1;
                            }
                        }
                    }
                    Some(&other) => {
                        data.push(other);
                        i += 1;
                    }
                }
            }
            tokens.push(Token::Quoted(data));
        } else {
            let start = i;
            while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            tokens.push(Token::Word(source[start..i].to_string()));
        }
    }
    Ok(tokens)
}

/// Compiles text form source into a binary program.
pub fn compile(source: &str) -> Result<Vec<u8>, VmError> {
    let mut out = Vec::new();
    for token in tokenize(source)? {
        match token {
            Token::Quoted(data) => append_push(&mut out, &data),
            Token::Word(word) => compile_word(&mut out, &word)?,
        }
    }
    Ok(out)
}

fn compile_word(out: &mut Vec<u8>, word: &str) -> Result<(), VmError> {
    if let Some(opcode) = Opcode::from_mnemonic(word) {
        // Raw push opcodes carry inline data and have no bare spelling;
        // pushes are written as literals.
        if opcode.is_raw_push() {
            return Err(VmError::InvalidToken(word.to_string()));
        }
        out.push(opcode as u8);
        return Ok(());
    }
    if let Some(hex) = word.strip_prefix("0x") {
        let data = decode_hex(hex).ok_or_else(|| VmError::BadHexLiteral(word.to_string()))?;
        append_push(out, &data);
        return Ok(());
    }
    if let Ok(n) = word.parse::<i64>() {
        append_push_int(out, n);
        return Ok(());
    }
    Err(VmError::InvalidToken(word.to_string()))
}

/// Renders a binary program in text form.
///
/// Data pushes print as hex literals; everything else prints its mnemonic.
/// Decode errors (truncated pushes, unknown or illegal opcodes) propagate.
pub fn decompile(program: &[u8]) -> Result<String, VmError> {
    let mut out = String::new();
    let mut pc = 0;
    while pc < program.len() {
        let instr = decode_instruction(program, pc)?;
        if !out.is_empty() {
            out.push(' ');
        }
        if instr.opcode.is_raw_push() {
            out.push_str("0x");
            out.push_str(&encode_hex(&instr.data));
        } else {
            out.push_str(instr.opcode.mnemonic());
        }
        pc += instr.len;
    }
    Ok(out)
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    let bytes = s.as_bytes();
    if bytes.len() % 2 != 0 {
        return None;
    }
    let mut out = Vec::with_capacity(bytes.len() / 2);
    for pair in bytes.chunks(2) {
        let hi = hex_digit(pair[0])?;
        let lo = hex_digit(pair[1])?;
        out.push(hi << 4 | lo);
    }
    Some(out)
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn encode_hex(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for byte in data {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_mnemonics() {
        assert_eq!(compile("DUP DROP").unwrap(), [0x76, 0x75]);
        assert_eq!(compile("IF ENDIF").unwrap(), [0x63, 0x68]);
        assert_eq!(compile("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn compile_integers_canonically() {
        assert_eq!(compile("0").unwrap(), [0x00]);
        assert_eq!(compile("1").unwrap(), [0x51]);
        assert_eq!(compile("16").unwrap(), [0x60]);
        assert_eq!(compile("-1").unwrap(), [0x4f]);
        assert_eq!(compile("17").unwrap(), [0x01, 0x11]);
        assert_eq!(compile("255").unwrap(), [0x01, 0xff]);
        assert_eq!(compile("256").unwrap(), [0x02, 0x00, 0x01]);
    }

    #[test]
    fn compile_hex_literals() {
        assert_eq!(compile("0xdeadbeef").unwrap(), [0x04, 0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(compile("0x").unwrap(), [0x00]);
    }

    #[test]
    fn compile_quoted_strings() {
        assert_eq!(compile("'abc'").unwrap(), [0x03, b'a', b'b', b'c']);
        assert_eq!(compile("'a b'").unwrap(), [0x03, b'a', b' ', b'b']);
        assert_eq!(compile(r"'a\'b'").unwrap(), [0x03, b'a', b'\'', b'b']);
        assert_eq!(compile(r"'a\\b'").unwrap(), [0x03, b'a', b'\\', b'b']);
        assert_eq!(compile("''").unwrap(), [0x00]);
    }

    #[test]
    fn compile_max_is_within() {
        assert_eq!(compile("MAX").unwrap(), compile("WITHIN").unwrap());
        assert_eq!(compile("MAX").unwrap(), [0xa4]);
    }

    #[test]
    fn compile_rejects_raw_push_mnemonics() {
        for word in ["PUSHDATA", "PUSHDATA1", "PUSHDATA2", "PUSHDATA4"] {
            assert!(matches!(
                compile(word),
                Err(VmError::InvalidToken(w)) if w == word
            ));
        }
    }

    #[test]
    fn compile_rejects_unknown_tokens() {
        assert!(matches!(
            compile("DUP BOGUS"),
            Err(VmError::InvalidToken(w)) if w == "BOGUS"
        ));
    }

    #[test]
    fn compile_rejects_bad_hex() {
        assert!(matches!(compile("0xzz"), Err(VmError::BadHexLiteral(_))));
        assert!(matches!(compile("0xabc"), Err(VmError::BadHexLiteral(_))));
    }

    #[test]
    fn compile_rejects_unterminated_strings() {
        assert!(matches!(compile("'abc"), Err(VmError::UnterminatedString)));
        assert!(matches!(compile(r"'abc\"), Err(VmError::UnterminatedString)));
    }

    #[test]
    fn decompile_prints_mnemonics_and_hex() {
        assert_eq!(decompile(&[0x76, 0x75]).unwrap(), "DUP DROP");
        assert_eq!(decompile(&[0x00, 0x51, 0x60]).unwrap(), "FALSE TRUE 16");
        assert_eq!(decompile(&[0x4f]).unwrap(), "1NEGATE");
        assert_eq!(decompile(&[0x02, 0xab, 0xcd]).unwrap(), "0xabcd");
        assert_eq!(decompile(&[]).unwrap(), "");
    }

    #[test]
    fn decompile_propagates_decode_errors() {
        assert!(matches!(
            decompile(&[0x03, 0x01]),
            Err(VmError::ShortProgram { .. })
        ));
        assert!(matches!(
            decompile(&[0x65]),
            Err(VmError::IllegalOpcode { opcode: 0x65 })
        ));
        assert!(matches!(
            decompile(&[0xfe]),
            Err(VmError::UnknownOpcode { opcode: 0xfe })
        ));
    }

    #[test]
    fn compile_decompile_roundtrip() {
        let sources = [
            "17 FALSE TRUE TRUE TRUE WHILE DROP ENDWHILE 17 NUMEQUAL",
            "0xdeadbeef SHA256 0x00ff EQUAL VERIFY",
            "1 IF 2 ELSE 3 ENDIF 'witness' CAT",
            "-1 5 ADD DEPTH TOALTSTACK FROMALTSTACK",
        ];
        for src in sources {
            let bytecode = compile(src).unwrap();
            let text = decompile(&bytecode).unwrap();
            assert_eq!(compile(&text).unwrap(), bytecode, "source: {src}");
        }
    }
}
