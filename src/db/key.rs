//! Order-preserving key codec.
//!
//! Every key type writes itself so that comparing two encoded keys byte by byte
//! gives the same answer as comparing the logical values. Composite keys are the
//! plain concatenation of their components, which makes the encoding of a leading
//! component a byte prefix of every composite key that starts with it. Range and
//! prefix scans over column families rely on both properties.

use crate::core::{EngineError, Result};

const SIGN_FLIP_64: u64 = 1 << 63;
const SIGN_FLIP_32: u32 = 1 << 31;
const STRING_TERMINATOR: u8 = 0x00;
const STRING_ESCAPE: u8 = 0xFF;

pub trait DbKey: Sized {
    /// Appends the encoded key to `buf`.
    fn write_key(&self, buf: &mut Vec<u8>);

    /// Decodes a key from the start of `buf`, returning it with the number of bytes consumed.
    fn read_key(buf: &[u8]) -> Result<(Self, usize)>;

    fn to_key_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16);
        self.write_key(&mut buf);
        buf
    }

    fn from_key_bytes(buf: &[u8]) -> Result<Self> {
        let (key, consumed) = Self::read_key(buf)?;
        if consumed != buf.len() {
            return Err(EngineError::Codec(format!(
                "Expected key to span {} bytes, but {} bytes remain",
                buf.len(),
                buf.len() - consumed
            )));
        }
        Ok(key)
    }
}

fn take<const N: usize>(buf: &[u8]) -> Result<[u8; N]> {
    buf.get(..N)
        .and_then(|bytes| <[u8; N]>::try_from(bytes).ok())
        .ok_or_else(|| {
            EngineError::Codec(format!(
                "Expected at least {} bytes to decode key, got {}",
                N,
                buf.len()
            ))
        })
}

impl DbKey for i64 {
    fn write_key(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&((*self as u64) ^ SIGN_FLIP_64).to_be_bytes());
    }

    fn read_key(buf: &[u8]) -> Result<(Self, usize)> {
        let raw = u64::from_be_bytes(take::<8>(buf)?);
        Ok(((raw ^ SIGN_FLIP_64) as i64, 8))
    }
}

impl DbKey for i32 {
    fn write_key(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&((*self as u32) ^ SIGN_FLIP_32).to_be_bytes());
    }

    fn read_key(buf: &[u8]) -> Result<(Self, usize)> {
        let raw = u32::from_be_bytes(take::<4>(buf)?);
        Ok(((raw ^ SIGN_FLIP_32) as i32, 4))
    }
}

impl DbKey for u8 {
    fn write_key(&self, buf: &mut Vec<u8>) {
        buf.push(*self);
    }

    fn read_key(buf: &[u8]) -> Result<(Self, usize)> {
        Ok((take::<1>(buf)?[0], 1))
    }
}

impl DbKey for String {
    // NUL-terminated; an in-band NUL is written as 0x00 0xFF so ordering survives.
    fn write_key(&self, buf: &mut Vec<u8>) {
        for byte in self.as_bytes() {
            buf.push(*byte);
            if *byte == STRING_TERMINATOR {
                buf.push(STRING_ESCAPE);
            }
        }
        buf.push(STRING_TERMINATOR);
    }

    fn read_key(buf: &[u8]) -> Result<(Self, usize)> {
        let mut bytes = Vec::new();
        let mut index = 0;
        while index < buf.len() {
            let byte = buf[index];
            if byte == STRING_TERMINATOR {
                if buf.get(index + 1) == Some(&STRING_ESCAPE) {
                    bytes.push(STRING_TERMINATOR);
                    index += 2;
                    continue;
                }
                let value = String::from_utf8(bytes)
                    .map_err(|err| EngineError::Codec(format!("Invalid UTF-8 in key: {}", err)))?;
                return Ok((value, index + 1));
            }
            bytes.push(byte);
            index += 1;
        }
        Err(EngineError::Codec(
            "Expected string key to be terminated, but reached end of buffer".to_string(),
        ))
    }
}

impl<A: DbKey, B: DbKey> DbKey for (A, B) {
    fn write_key(&self, buf: &mut Vec<u8>) {
        self.0.write_key(buf);
        self.1.write_key(buf);
    }

    fn read_key(buf: &[u8]) -> Result<(Self, usize)> {
        let (first, first_len) = A::read_key(buf)?;
        let (second, second_len) = B::read_key(&buf[first_len..])?;
        Ok(((first, second), first_len + second_len))
    }
}

impl<A: DbKey, B: DbKey, C: DbKey> DbKey for (A, B, C) {
    fn write_key(&self, buf: &mut Vec<u8>) {
        self.0.write_key(buf);
        self.1.write_key(buf);
        self.2.write_key(buf);
    }

    fn read_key(buf: &[u8]) -> Result<(Self, usize)> {
        let (first, first_len) = A::read_key(buf)?;
        let (second, second_len) = B::read_key(&buf[first_len..])?;
        let (third, third_len) = C::read_key(&buf[first_len + second_len..])?;
        Ok(((first, second, third), first_len + second_len + third_len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_byte_order_matches_numeric_order() {
        let values = [i64::MIN, -100, -1, 0, 1, 255, 256, 1 << 40, i64::MAX];
        for pair in values.windows(2) {
            assert!(pair[0].to_key_bytes() < pair[1].to_key_bytes(), "{:?}", pair);
        }
        for value in values {
            assert_eq!(i64::from_key_bytes(&value.to_key_bytes()).unwrap(), value);
        }
    }

    #[test]
    fn test_int_byte_order_matches_numeric_order() {
        assert!((-5_i32).to_key_bytes() < 3_i32.to_key_bytes());
        assert_eq!(i32::from_key_bytes(&(-5_i32).to_key_bytes()).unwrap(), -5);
    }

    #[test]
    fn test_string_byte_order_is_lexicographic() {
        let values = ["", "a", "a\0", "a\0b", "aa", "b"];
        for pair in values.windows(2) {
            let left = pair[0].to_string().to_key_bytes();
            let right = pair[1].to_string().to_key_bytes();
            assert!(left < right, "{:?}", pair);
        }
        let escaped = "x\0y".to_string();
        assert_eq!(String::from_key_bytes(&escaped.to_key_bytes()).unwrap(), escaped);
    }

    #[test]
    fn test_composite_key_starts_with_its_prefix() {
        let prefix = "signal".to_string().to_key_bytes();
        let composite = ("signal".to_string(), 42_i64).to_key_bytes();
        assert!(composite.starts_with(&prefix));

        let other = ("signalB".to_string(), 1_i64).to_key_bytes();
        assert!(!other.starts_with(&prefix));
    }

    #[test]
    fn test_composite_key_orders_by_first_then_second_component() {
        let a = (10_i64, 99_i64).to_key_bytes();
        let b = (11_i64, 0_i64).to_key_bytes();
        let c = (11_i64, 1_i64).to_key_bytes();
        assert!(a < b && b < c);

        let decoded = <(i64, (i64, i64))>::from_key_bytes(&(5_i64, (6_i64, 7_i64)).to_key_bytes())
            .unwrap();
        assert_eq!(decoded, (5, (6, 7)));
    }

    #[test]
    fn test_truncated_key_is_codec_error() {
        assert!(matches!(i64::from_key_bytes(&[1, 2, 3]), Err(EngineError::Codec(_))));
        assert!(matches!(String::from_key_bytes(b"abc"), Err(EngineError::Codec(_))));
    }
}
