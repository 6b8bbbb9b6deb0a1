use chainvm_derive::Error;

/// Errors that can occur while decoding, executing or assembling a program.
///
/// Decode errors (`ShortProgram`, `IllegalOpcode`, `UnknownOpcode`) reject a
/// program outright with no partial execution. Runtime errors abort the
/// current frame; the caller treats the frame's result as rejection. A
/// predicate child frame's error never propagates - it becomes a false push
/// in the parent (see `CHECKPREDICATE`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    /// Program ended while an opcode or its inline data was being read.
    #[error("program truncated at offset {pc}")]
    ShortProgram { pc: usize },
    /// One of the two permanently reserved opcode bytes.
    #[error("illegal opcode 0x{opcode:02x}")]
    IllegalOpcode { opcode: u8 },
    /// Byte with no dispatch table entry.
    #[error("unknown opcode 0x{opcode:02x}")]
    UnknownOpcode { opcode: u8 },

    /// Pop or pick past the bottom of the data stack.
    #[error("data stack underflow")]
    DataStackUnderflow,
    /// Pop past the bottom of the alt stack.
    #[error("alt stack underflow")]
    AltStackUnderflow,
    /// ELSE/ENDIF/ENDWHILE with no open control tuple.
    #[error("control stack underflow")]
    ControlStackUnderflow,
    /// Program ended inside an unterminated IF/WHILE.
    #[error("control stack not empty at end of program")]
    NonEmptyControlStack,
    /// Control opcode applied to the wrong kind of open tuple.
    #[error("unexpected {mnemonic}")]
    BadControlSyntax { mnemonic: &'static str },

    /// Value has no valid interpretation for the requested operation.
    #[error("bad value")]
    BadValue,
    /// Division or modulo by zero.
    #[error("division by zero")]
    DivZero,
    /// VERIFY popped a false value.
    #[error("VERIFY failed")]
    VerifyFailed,
    /// FAIL executed; the program aborted itself.
    #[error("FAIL executed")]
    Return,
    /// Cumulative cost exceeded the run limit.
    #[error("run limit exceeded")]
    RunLimitExceeded,

    /// Transaction-only or block-only opcode run in the wrong context.
    #[error("operation not allowed in this context")]
    WrongContext,
    /// Input commits to a program version this machine does not implement.
    #[error("unsupported vm version {version}")]
    UnsupportedVM { version: u64 },
    /// Input commitment kind this machine does not recognize.
    #[error("unsupported transaction input")]
    UnsupportedTx,
    /// Signature hash type with no defined hashing rule.
    #[error("unknown signature hash type {hash_type}")]
    UnknownHashType { hash_type: i64 },
    /// Public key bytes that do not decode to a curve point.
    #[error("malformed public key: {reason}")]
    BadPublicKey { reason: String },

    /// Assembly token that is neither a mnemonic, a literal, nor a number.
    #[error("invalid token `{0}`")]
    InvalidToken(String),
    /// Malformed `0x` hex literal in assembly source.
    #[error("bad hex literal `{0}`")]
    BadHexLiteral(String),
    /// Quoted string literal with no closing quote.
    #[error("unterminated string literal")]
    UnterminatedString,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats_fields() {
        assert_eq!(
            VmError::UnknownOpcode { opcode: 0xef }.to_string(),
            "unknown opcode 0xef"
        );
        assert_eq!(
            VmError::ShortProgram { pc: 7 }.to_string(),
            "program truncated at offset 7"
        );
        assert_eq!(
            VmError::InvalidToken("wat".to_string()).to_string(),
            "invalid token `wat`"
        );
        assert_eq!(VmError::DivZero.to_string(), "division by zero");
    }

    #[test]
    fn is_std_error() {
        fn assert_error<E: std::error::Error>() {}
        assert_error::<VmError>();
    }
}
