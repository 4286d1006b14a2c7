//! ECMA-335 compressed integer and compressed token encoding (II.23.2).
//!
//! Compressed integers use variable-length encoding to efficiently store small values:
//! - Values 0-127: 1 byte (0xxxxxxx)
//! - Values 128-16383: 2 bytes (10xxxxxx xxxxxxxx)
//! - Values 16384-536870911: 4 bytes (11xxxxxx xxxxxxxx xxxxxxxx xxxxxxxx)
//!
//! Type tokens embedded in signatures are first turned into a `TypeDefOrRefOrSpecEncoded`
//! coded index (`rid << 2 | tag`) and then written as a compressed integer.

use crate::{
    metadata::{tableid::TableId, token::Token},
    Error, Result,
};

/// Largest value representable as a compressed unsigned integer.
pub const MAX_COMPRESSED_UINT: u32 = 0x1FFF_FFFF;

/// Returns the number of bytes `value` occupies in compressed form.
///
/// # Errors
///
/// Returns [`Error::InvalidCompressedValue`] if `value` exceeds [`MAX_COMPRESSED_UINT`].
pub fn compressed_uint_size(value: u32) -> Result<usize> {
    match value {
        0..=0x7F => Ok(1),
        0x80..=0x3FFF => Ok(2),
        0x4000..=MAX_COMPRESSED_UINT => Ok(4),
        _ => Err(Error::InvalidCompressedValue(value)),
    }
}

/// Appends `value` in compressed form to `buffer`.
///
/// The caller is responsible for the range check, see [`compressed_uint_size`]; values
/// above [`MAX_COMPRESSED_UINT`] lose their upper three bits.
pub fn write_compressed_uint(value: u32, buffer: &mut Vec<u8>) {
    if value < 0x80 {
        buffer.push(value as u8);
    } else if value < 0x4000 {
        buffer.push(0x80 | (value >> 8) as u8);
        buffer.push(value as u8);
    } else {
        buffer.push(0xC0 | ((value >> 24) & 0x1F) as u8);
        buffer.push((value >> 16) as u8);
        buffer.push((value >> 8) as u8);
        buffer.push(value as u8);
    }
}

/// Encodes a token as a `TypeDefOrRefOrSpecEncoded` coded index according to ECMA-335 II.23.2.8.
///
/// - TypeDef (0x02): `(rid << 2) | 0`
/// - TypeRef (0x01): `(rid << 2) | 1`
/// - TypeSpec (0x1B): `(rid << 2) | 2`
///
/// # Errors
///
/// Returns [`Error::InvalidToken`] if the token's table is not TypeDef, TypeRef or TypeSpec,
/// or if the token is nil.
pub fn compress_token(token: Token) -> Result<u32> {
    if token.row() == 0 {
        return Err(Error::InvalidToken(token));
    }

    let tag = match token.table_id() {
        Some(TableId::TypeDef) => 0,
        Some(TableId::TypeRef) => 1,
        Some(TableId::TypeSpec) => 2,
        _ => return Err(Error::InvalidToken(token)),
    };

    Ok((token.row() << 2) | tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: u32) -> Vec<u8> {
        let mut buffer = Vec::new();
        write_compressed_uint(value, &mut buffer);
        buffer
    }

    #[test]
    fn test_compressed_uint_examples() {
        // Examples from ECMA-335 II.23.2
        assert_eq!(encode(0x03), vec![0x03]);
        assert_eq!(encode(0x7F), vec![0x7F]);
        assert_eq!(encode(0x80), vec![0x80, 0x80]);
        assert_eq!(encode(0x2E57), vec![0xAE, 0x57]);
        assert_eq!(encode(0x3FFF), vec![0xBF, 0xFF]);
        assert_eq!(encode(0x4000), vec![0xC0, 0x00, 0x40, 0x00]);
        assert_eq!(encode(0x1FFF_FFFF), vec![0xDF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_compressed_uint_size_matches_encoding() {
        for value in [0, 1, 0x7F, 0x80, 0x3FFF, 0x4000, 0x1234_5678, MAX_COMPRESSED_UINT] {
            assert_eq!(compressed_uint_size(value).unwrap(), encode(value).len());
        }
    }

    #[test]
    fn test_compressed_uint_size_rejects_large_values() {
        assert!(matches!(
            compressed_uint_size(0x2000_0000),
            Err(Error::InvalidCompressedValue(0x2000_0000))
        ));
    }

    #[test]
    fn test_compress_token() {
        assert_eq!(compress_token(Token::new(0x0200_0001)).unwrap(), 1 << 2);
        assert_eq!(compress_token(Token::new(0x0100_0005)).unwrap(), (5 << 2) | 1);
        assert_eq!(compress_token(Token::new(0x1B00_0003)).unwrap(), (3 << 2) | 2);
        // ECMA-335 II.23.2.8 example: TypeRef row 0x12 encodes as 0x49
        assert_eq!(compress_token(Token::new(0x0100_0012)).unwrap(), 0x49);
    }

    #[test]
    fn test_compress_token_rejects_other_tables() {
        assert!(compress_token(Token::new(0x0A00_0001)).is_err());
        assert!(compress_token(Token::new(0x2300_0001)).is_err());
        assert!(compress_token(Token::new(0x0100_0000)).is_err());
    }
}
