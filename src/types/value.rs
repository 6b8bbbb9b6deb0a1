//! Boolean and integer views over raw byte-string values.
//!
//! The machine has a single runtime type - the byte string - and every
//! opcode that needs a boolean or a number reinterprets bytes on the fly.
//! The interpretation is never stored back; these are pure conversions.
//!
//! Integer encoding: little-endian two's complement, at most 8 bytes, with
//! trailing zero bytes stripped (the minimal form). The empty string is
//! zero. A value longer than 8 bytes has no integer interpretation.

use crate::errors::VmError;
use crate::types::bytes::Bytes;

/// Number of bytes in a fully expanded integer value.
const INT_WIDTH: usize = 8;

/// Boolean view: true iff any byte is nonzero.
pub fn bytes_to_bool(b: &[u8]) -> bool {
    b.iter().any(|&byte| byte != 0)
}

/// Canonical boolean encoding: `[]` for false, `[1]` for true.
pub fn bool_to_bytes(v: bool) -> Bytes {
    if v { Bytes::new([1u8]) } else { Bytes::default() }
}

/// Integer view of a byte string.
///
/// Zero-extends to 8 bytes and reads little-endian two's complement.
/// Returns [`VmError::BadValue`] for values longer than 8 bytes.
pub fn bytes_to_int64(b: &[u8]) -> Result<i64, VmError> {
    if b.len() > INT_WIDTH {
        return Err(VmError::BadValue);
    }
    let mut buf = [0u8; INT_WIDTH];
    buf[..b.len()].copy_from_slice(b);
    Ok(i64::from_le_bytes(buf))
}

/// Minimal integer encoding: little-endian with trailing zero bytes removed.
///
/// Zero encodes to the empty string. Negative numbers always occupy the
/// full 8 bytes because their high byte is nonzero.
pub fn int64_to_bytes(n: i64) -> Bytes {
    let mut buf = n.to_le_bytes().to_vec();
    while buf.last() == Some(&0) {
        buf.pop();
    }
    Bytes::from_vec(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_of_bytes() {
        assert!(!bytes_to_bool(&[]));
        assert!(!bytes_to_bool(&[0, 0, 0]));
        assert!(bytes_to_bool(&[1]));
        assert!(bytes_to_bool(&[0, 0, 0x80]));
    }

    #[test]
    fn bool_canonical_encoding() {
        assert_eq!(bool_to_bytes(false), []);
        assert_eq!(bool_to_bytes(true), [1]);
    }

    #[test]
    fn int_roundtrip_minimal() {
        for n in [0i64, 1, 2, 127, 128, 255, 256, 1 << 40, i64::MAX] {
            let enc = int64_to_bytes(n);
            assert_eq!(bytes_to_int64(&enc).unwrap(), n, "n = {n}");
            // minimal: no trailing zero byte
            assert_ne!(enc.last(), Some(&0));
        }
    }

    #[test]
    fn zero_is_empty() {
        assert_eq!(int64_to_bytes(0), []);
        assert_eq!(bytes_to_int64(&[]).unwrap(), 0);
    }

    #[test]
    fn negative_numbers_fill_all_eight_bytes() {
        let enc = int64_to_bytes(-1);
        assert_eq!(enc, [0xff; 8]);
        assert_eq!(bytes_to_int64(&enc).unwrap(), -1);
        assert_eq!(bytes_to_int64(&int64_to_bytes(i64::MIN)).unwrap(), i64::MIN);
    }

    #[test]
    fn short_values_zero_extend() {
        // [0xff] is 255, not -1: the value is zero-extended before the
        // two's complement read.
        assert_eq!(bytes_to_int64(&[0xff]).unwrap(), 255);
        assert_eq!(bytes_to_int64(&[0x11]).unwrap(), 17);
    }

    #[test]
    fn over_eight_bytes_is_bad_value() {
        assert!(matches!(
            bytes_to_int64(&[0; 9]),
            Err(VmError::BadValue)
        ));
        assert!(bytes_to_int64(&[0; 8]).is_ok());
    }
}
