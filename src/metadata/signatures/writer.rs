//! Exact-size signature writer.
//!
//! [`SignatureWriter`] collects the parts of a signature (single bytes, compressed integers,
//! compressed type tokens and pre-encoded sub-blobs), validates each part as it is appended
//! and computes its encoded length at that point. [`SignatureWriter::finish`] then allocates
//! exactly the summed length once and serializes into it, so the size bookkeeping for every
//! call shape lives in this one primitive.
//!
//! # Examples
//!
//! ```rust
//! use dotinject::metadata::{
//!     signatures::{SignatureWriter, CALLING_CONVENTION, ELEMENT_TYPE},
//!     token::Token,
//! };
//!
//! // static CallTargetState GetDefault()
//! let mut writer = SignatureWriter::new();
//! writer.byte(CALLING_CONVENTION::DEFAULT);
//! writer.compressed(0)?;
//! writer.type_token(ELEMENT_TYPE::VALUETYPE, Token::new(0x0100_0003))?;
//!
//! assert_eq!(writer.len(), 4);
//! let blob = writer.finish();
//! assert_eq!(blob.as_bytes(), &[0x00, 0x00, 0x11, 0x0D]);
//! # Ok::<(), dotinject::Error>(())
//! ```

use crate::{
    metadata::{signatures::SignatureBlob, token::Token},
    utils::{compress_token, compressed_uint_size, write_compressed_uint},
    Result,
};

/// One validated piece of a signature
enum Part<'a> {
    Byte(u8),
    Compressed(u32),
    Blob(&'a [u8]),
}

/// Builder for an exactly sized [`SignatureBlob`].
///
/// Appending never writes bytes; it records the part and its encoded length. This keeps the
/// final allocation exact no matter in which order parts of differing width are added.
#[derive(Default)]
pub struct SignatureWriter<'a> {
    parts: Vec<Part<'a>>,
    len: usize,
}

impl<'a> SignatureWriter<'a> {
    /// Creates an empty writer
    #[must_use]
    pub fn new() -> Self {
        SignatureWriter {
            parts: Vec::new(),
            len: 0,
        }
    }

    /// Appends a single raw byte: a calling convention, an element type opcode or a
    /// small fixed count.
    pub fn byte(&mut self, value: u8) -> &mut Self {
        self.parts.push(Part::Byte(value));
        self.len += 1;
        self
    }

    /// Appends a compressed unsigned integer
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidCompressedValue`] if `value` is out of range.
    pub fn compressed(&mut self, value: u32) -> Result<&mut Self> {
        self.len += compressed_uint_size(value)?;
        self.parts.push(Part::Compressed(value));
        Ok(self)
    }

    /// Appends a compressed type token without a leading element type
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidToken`] if the token is not a TypeDef, TypeRef or TypeSpec.
    pub fn token(&mut self, token: Token) -> Result<&mut Self> {
        let coded = compress_token(token)?;
        self.compressed(coded)
    }

    /// Appends an element type opcode (`CLASS` or `VALUETYPE`) followed by a compressed type token
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidToken`] if the token is not a TypeDef, TypeRef or TypeSpec.
    pub fn type_token(&mut self, element_type: u8, token: Token) -> Result<&mut Self> {
        let coded = compress_token(token)?;
        let size = compressed_uint_size(coded)?;

        self.parts.push(Part::Byte(element_type));
        self.parts.push(Part::Compressed(coded));
        self.len += 1 + size;
        Ok(self)
    }

    /// Appends an already encoded sub-blob verbatim (a type descriptor, a run of locals, ...)
    pub fn blob(&mut self, data: &'a [u8]) -> &mut Self {
        if !data.is_empty() {
            self.parts.push(Part::Blob(data));
            self.len += data.len();
        }
        self
    }

    /// Returns the exact encoded length of everything appended so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if nothing has been appended
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Serializes all parts into a single exactly sized blob
    #[must_use]
    pub fn finish(self) -> SignatureBlob {
        let mut buffer = Vec::with_capacity(self.len);
        for part in self.parts {
            match part {
                Part::Byte(value) => buffer.push(value),
                Part::Compressed(value) => write_compressed_uint(value, &mut buffer),
                Part::Blob(data) => buffer.extend_from_slice(data),
            }
        }

        debug_assert_eq!(buffer.len(), self.len);
        SignatureBlob::new(buffer.into_boxed_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::signatures::{CALLING_CONVENTION, ELEMENT_TYPE},
        Error,
    };

    #[test]
    fn test_writer_empty() {
        let writer = SignatureWriter::new();
        assert!(writer.is_empty());
        assert!(writer.finish().is_empty());
    }

    #[test]
    fn test_writer_mixed_widths() -> Result<()> {
        let sub = [ELEMENT_TYPE::I4, ELEMENT_TYPE::STRING];

        let mut writer = SignatureWriter::new();
        writer.byte(CALLING_CONVENTION::GENERIC);
        writer.compressed(0x90)?; // two bytes
        writer.type_token(ELEMENT_TYPE::CLASS, Token::new(0x0100_1000))?; // 1 + 4 bytes
        writer.token(Token::new(0x1B00_0001))?; // one byte
        writer.blob(&sub);

        assert_eq!(writer.len(), 1 + 2 + 5 + 1 + 2);
        let blob = writer.finish();
        assert_eq!(
            blob.as_bytes(),
            &[0x10, 0x80, 0x90, 0x12, 0xC0, 0x00, 0x40, 0x01, 0x06, 0x08, 0x0E]
        );
        Ok(())
    }

    #[test]
    fn test_writer_rejects_member_ref_token() {
        let mut writer = SignatureWriter::new();
        let result = writer.type_token(ELEMENT_TYPE::CLASS, Token::new(0x0A00_0001));
        assert!(matches!(result, Err(Error::InvalidToken(_))));
        assert!(writer.is_empty());
    }

    #[test]
    fn test_writer_empty_blob_is_ignored() {
        let mut writer = SignatureWriter::new();
        writer.byte(0x07).blob(&[]);
        assert_eq!(writer.len(), 1);
        assert_eq!(writer.finish().as_bytes(), &[0x07]);
    }
}
