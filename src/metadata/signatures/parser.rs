use crate::{
    metadata::{
        signatures::{CALLING_CONVENTION, ELEMENT_TYPE, SIGNATURE_HEADER},
        token::Token,
    },
    Error::RecursionLimit,
    Result,
};

/// Maximum recursion depth for signature parsing
const MAX_RECURSION_DEPTH: usize = 50;

/// The header and descriptors of a `LocalVarSig` (II.23.2.6).
///
/// Every entry of `locals` is the complete byte range of one local, including its custom
/// modifiers and `PINNED`/`BYREF` prefixes, borrowed from the parsed blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVarSignature<'a> {
    /// The declared number of locals
    pub count: u32,
    /// The raw descriptor of each local, in declaration order
    pub locals: Vec<&'a [u8]>,
}

/// A `MethodDefSig`/`MethodRefSig` split into its component descriptors (II.23.2.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignatureParts<'a> {
    /// The calling convention byte, including the `GENERIC`/`HASTHIS` flags
    pub calling_convention: u8,
    /// Number of generic parameters, 0 for non-generic methods
    pub generic_param_count: u32,
    /// The return type descriptor (`VOID` included)
    pub return_type: &'a [u8],
    /// The parameter descriptors
    pub params: Vec<&'a [u8]>,
}

/// Signature parser that walks the type descriptors of ECMA-335 signature blobs.
///
/// The parser never builds a type tree. It only needs to know where one descriptor ends and
/// the next starts, so it hands out byte ranges of the input which can be copied verbatim
/// into new signatures.
///
/// # Example
///
/// ```rust
/// use dotinject::metadata::signatures::SignatureParser;
///
/// // 07 02 I4 SZARRAY STRING
/// let data = &[0x07, 0x02, 0x08, 0x1D, 0x0E];
/// let mut parser = SignatureParser::new(data);
/// let locals = parser.parse_local_var_signature()?;
/// assert_eq!(locals.count, 2);
/// assert_eq!(locals.locals[1], &[0x1D, 0x0E]);
/// # Ok::<(), dotinject::Error>(())
/// ```
pub struct SignatureParser<'a> {
    data: &'a [u8],
    position: usize,
    depth: usize,
}

impl<'a> SignatureParser<'a> {
    /// Create a new `SignatureParser` from a byte slice
    ///
    /// ## Arguments
    /// * 'data' - The byte slice to read from
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        SignatureParser {
            data,
            position: 0,
            depth: 0,
        }
    }

    /// Returns the current read offset
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Returns `true` if there is unread data left
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Returns the unread tail of the blob
    #[must_use]
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.position.min(self.data.len())..]
    }

    /// Returns the next byte without consuming it
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] at the end of the blob.
    pub fn peek_byte(&self) -> Result<u8> {
        self.data
            .get(self.position)
            .copied()
            .ok_or(out_of_bounds_error!())
    }

    /// Reads a single byte
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] at the end of the blob.
    pub fn read_u8(&mut self) -> Result<u8> {
        let value = self.peek_byte()?;
        self.position += 1;
        Ok(value)
    }

    /// Read a compressed unsigned integer as defined in ECMA-335 II.23.2.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if reading would exceed the data length or
    /// [`crate::Error::Malformed`] for invalid encoding.
    pub fn read_compressed_uint(&mut self) -> Result<u32> {
        let first_byte = self.read_u8()?;

        // 1-byte encoding: 0xxxxxxx
        if (first_byte & 0x80) == 0 {
            return Ok(u32::from(first_byte));
        }

        // 2-byte encoding: 10xxxxxx xxxxxxxx
        if (first_byte & 0xC0) == 0x80 {
            let second_byte = self.read_u8()?;
            return Ok(((u32::from(first_byte) & 0x3F) << 8) | u32::from(second_byte));
        }

        // 4-byte encoding: 110xxxxx xxxxxxxx xxxxxxxx xxxxxxxx
        if (first_byte & 0xE0) == 0xC0 {
            let b1 = u32::from(self.read_u8()?);
            let b2 = u32::from(self.read_u8()?);
            let b3 = u32::from(self.read_u8()?);
            return Ok(((u32::from(first_byte) & 0x1F) << 24) | (b1 << 16) | (b2 << 8) | b3);
        }

        Err(malformed_error!("Invalid compressed uint - {}", first_byte))
    }

    /// Read a compressed `TypeDefOrRefOrSpecEncoded` token (II.23.2.8)
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for the reserved tag value 3.
    pub fn read_compressed_token(&mut self) -> Result<Token> {
        let compressed_token = self.read_compressed_uint()?;

        let table: u32 = match compressed_token & 0x3 {
            0x0 => 0x0200_0000, // TypeDef
            0x1 => 0x0100_0000, // TypeRef
            0x2 => 0x1B00_0000, // TypeSpec
            _ => {
                return Err(malformed_error!(
                    "Invalid compressed token - {}",
                    compressed_token
                ))
            }
        };

        Ok(Token::new(table + (compressed_token >> 2)))
    }

    /// Reads one complete type descriptor and returns its bytes
    ///
    /// # Errors
    /// Returns an error if the descriptor is truncated, uses an unknown element type or is
    /// nested deeper than the recursion limit.
    pub fn read_type(&mut self) -> Result<&'a [u8]> {
        let start = self.position;
        self.skip_type()?;
        Ok(&self.data[start..self.position])
    }

    /// Advance past a single type descriptor
    fn skip_type(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth >= MAX_RECURSION_DEPTH {
            return Err(RecursionLimit(MAX_RECURSION_DEPTH));
        }

        let current_byte = self.read_u8()?;
        match current_byte {
            ELEMENT_TYPE::VOID
            | ELEMENT_TYPE::BOOLEAN
            | ELEMENT_TYPE::CHAR
            | ELEMENT_TYPE::I1
            | ELEMENT_TYPE::U1
            | ELEMENT_TYPE::I2
            | ELEMENT_TYPE::U2
            | ELEMENT_TYPE::I4
            | ELEMENT_TYPE::U4
            | ELEMENT_TYPE::I8
            | ELEMENT_TYPE::U8
            | ELEMENT_TYPE::R4
            | ELEMENT_TYPE::R8
            | ELEMENT_TYPE::STRING
            | ELEMENT_TYPE::TYPEDBYREF
            | ELEMENT_TYPE::I
            | ELEMENT_TYPE::U
            | ELEMENT_TYPE::OBJECT => {}
            ELEMENT_TYPE::PTR | ELEMENT_TYPE::SZARRAY => {
                self.skip_custom_mods()?;
                self.skip_type()?;
            }
            ELEMENT_TYPE::BYREF | ELEMENT_TYPE::PINNED => self.skip_type()?,
            ELEMENT_TYPE::VALUETYPE | ELEMENT_TYPE::CLASS => {
                self.read_compressed_token()?;
            }
            ELEMENT_TYPE::VAR | ELEMENT_TYPE::MVAR => {
                self.read_compressed_uint()?;
            }
            ELEMENT_TYPE::CMOD_REQD | ELEMENT_TYPE::CMOD_OPT => {
                self.read_compressed_token()?;
                self.skip_type()?;
            }
            ELEMENT_TYPE::ARRAY => {
                self.skip_type()?;
                let _rank = self.read_compressed_uint()?;

                let num_sizes = self.read_compressed_uint()?;
                for _ in 0..num_sizes {
                    self.read_compressed_uint()?;
                }

                // Lower bounds are signed, but share the width rules of the unsigned form
                let num_lo_bounds = self.read_compressed_uint()?;
                for _ in 0..num_lo_bounds {
                    self.read_compressed_uint()?;
                }
            }
            ELEMENT_TYPE::GENERICINST => {
                let peek_byte = self.peek_byte()?;
                if peek_byte != ELEMENT_TYPE::CLASS && peek_byte != ELEMENT_TYPE::VALUETYPE {
                    return Err(malformed_error!(
                        "GENERICINST - Next byte is not TYPE_CLASS or TYPE_VALUE - {}",
                        peek_byte
                    ));
                }

                self.skip_type()?;
                let arg_count = self.read_compressed_uint()?;
                for _ in 0..arg_count {
                    self.skip_type()?;
                }
            }
            ELEMENT_TYPE::FNPTR => {
                self.parse_method_signature()?;
            }
            _ => {
                return Err(malformed_error!(
                    "Unsupported ELEMENT_TYPE - {}",
                    current_byte
                ))
            }
        }

        self.depth -= 1;
        Ok(())
    }

    /// Skip custom modifiers (`CMOD_OPT` or `CMOD_REQD`)
    fn skip_custom_mods(&mut self) -> Result<()> {
        while self.has_more_data() {
            let next_byte = self.peek_byte()?;
            if next_byte != ELEMENT_TYPE::CMOD_OPT && next_byte != ELEMENT_TYPE::CMOD_REQD {
                break;
            }

            self.position += 1;
            self.read_compressed_token()?;
        }

        Ok(())
    }

    /// Parse a method signature from the blob - `MethodDefSig`, `MethodRefSig`, `StandAloneMethodSig`
    ///
    /// A vararg `SENTINEL` is consumed and the parameters after it are returned in order with
    /// the others.
    ///
    /// # Errors
    /// Returns an error if the signature data is malformed or if reading beyond the buffer bounds.
    pub fn parse_method_signature(&mut self) -> Result<MethodSignatureParts<'a>> {
        let calling_convention = self.read_u8()?;
        let generic_param_count = if calling_convention & CALLING_CONVENTION::GENERIC != 0 {
            self.read_compressed_uint()?
        } else {
            0
        };

        let param_count = self.read_compressed_uint()?;
        let return_type = self.read_type()?;

        let mut params = Vec::with_capacity(param_count.min(64) as usize);
        for _ in 0..param_count {
            if self.peek_byte()? == ELEMENT_TYPE::SENTINEL {
                self.position += 1;
            }
            params.push(self.read_type()?);
        }

        Ok(MethodSignatureParts {
            calling_convention,
            generic_param_count,
            return_type,
            params,
        })
    }

    /// Parse a local variable signature (II.23.2.6)
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the blob does not start with `LOCAL_SIG`, or an
    /// error from walking the local descriptors.
    pub fn parse_local_var_signature(&mut self) -> Result<LocalVarSignature<'a>> {
        let count = self.parse_local_var_header()?;

        let mut locals = Vec::with_capacity(count.min(256) as usize);
        for _ in 0..count {
            locals.push(self.read_type()?);
        }

        Ok(LocalVarSignature { count, locals })
    }

    /// Reads the `LOCAL_SIG` marker and the local count, leaving the parser at the first local
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the blob does not start with `LOCAL_SIG`.
    pub fn parse_local_var_header(&mut self) -> Result<u32> {
        let head_byte = self.read_u8()?;
        if head_byte != SIGNATURE_HEADER::LOCAL_SIG {
            return Err(malformed_error!(
                "SignatureLocalVar - invalid start - {}",
                head_byte
            ));
        }

        self.read_compressed_uint()
    }

    /// Parse a `MethodSpec` instantiation blob (II.23.2.15), returning each type argument
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the blob does not start with `GENERICINST`.
    pub fn parse_method_spec_signature(&mut self) -> Result<Vec<&'a [u8]>> {
        let head_byte = self.read_u8()?;
        if head_byte != SIGNATURE_HEADER::GENERICINST {
            return Err(malformed_error!(
                "SignatureMethodSpec - invalid start - {}",
                head_byte
            ));
        }

        let count = self.read_compressed_uint()?;
        let mut args = Vec::with_capacity(count.min(64) as usize);
        for _ in 0..count {
            args.push(self.read_type()?);
        }

        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_read_compressed_uint() -> Result<()> {
        let data = [0x03, 0xAE, 0x57, 0xC0, 0x00, 0x40, 0x00];
        let mut parser = SignatureParser::new(&data);
        assert_eq!(parser.read_compressed_uint()?, 0x03);
        assert_eq!(parser.read_compressed_uint()?, 0x2E57);
        assert_eq!(parser.read_compressed_uint()?, 0x4000);
        assert!(!parser.has_more_data());
        Ok(())
    }

    #[test]
    fn test_read_compressed_uint_invalid() {
        let mut parser = SignatureParser::new(&[0xE0, 0x00, 0x00, 0x00]);
        assert!(matches!(
            parser.read_compressed_uint(),
            Err(Error::Malformed { .. })
        ));

        let mut parser = SignatureParser::new(&[0x80]);
        assert!(matches!(
            parser.read_compressed_uint(),
            Err(Error::OutOfBounds)
        ));
    }

    #[test]
    fn test_read_compressed_token() -> Result<()> {
        let mut parser = SignatureParser::new(&[0x49, 0x0A, 0x04]);
        assert_eq!(parser.read_compressed_token()?, Token::new(0x0100_0012));
        assert_eq!(parser.read_compressed_token()?, Token::new(0x1B00_0002));
        assert_eq!(parser.read_compressed_token()?, Token::new(0x0200_0001));

        let mut parser = SignatureParser::new(&[0x07]);
        assert!(parser.read_compressed_token().is_err());
        Ok(())
    }

    #[test]
    fn test_read_type_nested() -> Result<()> {
        // GENERICINST CLASS <TypeRef 2> 2 I4 SZARRAY MVAR 0, then a trailing I8
        let data = [0x15, 0x12, 0x09, 0x02, 0x08, 0x1D, 0x1E, 0x00, 0x0A];
        let mut parser = SignatureParser::new(&data);
        assert_eq!(parser.read_type()?, &data[..8]);
        assert_eq!(parser.read_type()?, &[0x0A]);
        Ok(())
    }

    #[test]
    fn test_read_type_array_with_bounds() -> Result<()> {
        // ARRAY I4 rank 2, 2 sizes (3, 4), 1 lo bound (0)
        let data = [0x14, 0x08, 0x02, 0x02, 0x03, 0x04, 0x01, 0x00];
        let mut parser = SignatureParser::new(&data);
        assert_eq!(parser.read_type()?.len(), data.len());
        Ok(())
    }

    #[test]
    fn test_read_type_modifiers_and_fnptr() -> Result<()> {
        // CMOD_OPT <TypeRef 1> BYREF I4
        let data = [0x20, 0x05, 0x10, 0x08];
        assert_eq!(SignatureParser::new(&data).read_type()?.len(), 4);

        // FNPTR DEFAULT 1 VOID I4
        let data = [0x1B, 0x00, 0x01, 0x01, 0x08];
        assert_eq!(SignatureParser::new(&data).read_type()?.len(), 5);
        Ok(())
    }

    #[test]
    fn test_read_type_invalid() {
        let mut parser = SignatureParser::new(&[0x15, 0x08]);
        assert!(matches!(parser.read_type(), Err(Error::Malformed { .. })));

        let mut parser = SignatureParser::new(&[0x99]);
        assert!(matches!(parser.read_type(), Err(Error::Malformed { .. })));

        let mut parser = SignatureParser::new(&[0x12]);
        assert!(matches!(parser.read_type(), Err(Error::OutOfBounds)));
    }

    #[test]
    fn test_recursion_limit() {
        let mut data = vec![ELEMENT_TYPE::SZARRAY; 100];
        data.push(ELEMENT_TYPE::I4);

        let mut parser = SignatureParser::new(&data);
        assert!(matches!(
            parser.read_type(),
            Err(Error::RecursionLimit(MAX_RECURSION_DEPTH))
        ));
    }

    #[test]
    fn test_parse_method_signature() -> Result<()> {
        // HASTHIS GENERIC 1, 2 params, returns MVAR 0, params (I4, CLASS <TypeRef 3>)
        let data = [0x30, 0x01, 0x02, 0x1E, 0x00, 0x08, 0x12, 0x0D];
        let method = SignatureParser::new(&data).parse_method_signature()?;
        assert_eq!(method.calling_convention, 0x30);
        assert_eq!(method.generic_param_count, 1);
        assert_eq!(method.return_type, &[0x1E, 0x00]);
        assert_eq!(method.params, vec![&[0x08][..], &[0x12, 0x0D][..]]);
        Ok(())
    }

    #[test]
    fn test_parse_local_var_signature() -> Result<()> {
        // 3 locals: PINNED BYREF U1, CMOD_REQD <TypeRef 1> I4, TYPEDBYREF
        let data = [0x07, 0x03, 0x45, 0x10, 0x05, 0x1F, 0x05, 0x08, 0x16];
        let locals = SignatureParser::new(&data).parse_local_var_signature()?;
        assert_eq!(locals.count, 3);
        assert_eq!(locals.locals[0], &[0x45, 0x10, 0x05]);
        assert_eq!(locals.locals[1], &[0x1F, 0x05, 0x08]);
        assert_eq!(locals.locals[2], &[0x16]);

        let result = SignatureParser::new(&[0x06, 0x00]).parse_local_var_signature();
        assert!(matches!(result, Err(Error::Malformed { .. })));
        Ok(())
    }

    #[test]
    fn test_parse_method_spec_signature() -> Result<()> {
        let data = [0x0A, 0x02, 0x12, 0x05, 0x11, 0x08];
        let args = SignatureParser::new(&data).parse_method_spec_signature()?;
        assert_eq!(args, vec![&[0x12, 0x05][..], &[0x11, 0x08][..]]);
        Ok(())
    }
}
