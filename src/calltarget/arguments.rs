//! Descriptions of the types flowing through an injected call.
//!
//! The instrumented method's arguments and return value are handed to the emitter as
//! [`ArgumentDescriptor`]s: raw type descriptors which are copied verbatim into instantiation
//! and local signatures, plus a coarse classification ([`TypeFlags`]). The type whose method
//! is instrumented is described by an [`InstanceType`].

use bitflags::bitflags;

use crate::{
    metadata::{
        signatures::{SignatureParser, ELEMENT_TYPE},
        token::Token,
    },
    Result,
};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Coarse classification of a type descriptor
    pub struct TypeFlags: u32 {
        /// The type is `void` (return values only)
        const VOID = 0x0001;
        /// The type is a value type: a primitive, a `VALUETYPE` or an instantiated generic struct
        const VALUE_TYPE = 0x0002;
        /// The descriptor is passed by reference
        const BY_REF = 0x0004;
        /// The type is an unresolved generic parameter (`VAR` or `MVAR`)
        const GENERIC_PARAMETER = 0x0008;
        /// The type is a single or multi dimensional array
        const ARRAY = 0x0010;
    }
}

impl TypeFlags {
    /// Classifies a type descriptor by its leading element type.
    ///
    /// Custom modifiers and the `PINNED` constraint are skipped, `BYREF` sets [`TypeFlags::BY_REF`]
    /// and the classification continues with the referenced type. Descriptors that end before
    /// an element type is reached classify as empty.
    #[must_use]
    pub fn from_signature(signature: &[u8]) -> Self {
        let mut flags = TypeFlags::empty();
        let mut parser = SignatureParser::new(signature);

        loop {
            let Ok(element) = parser.read_u8() else {
                return flags;
            };

            match element {
                ELEMENT_TYPE::CMOD_OPT | ELEMENT_TYPE::CMOD_REQD => {
                    if parser.read_compressed_token().is_err() {
                        return flags;
                    }
                }
                ELEMENT_TYPE::PINNED => {}
                ELEMENT_TYPE::BYREF => flags |= TypeFlags::BY_REF,
                ELEMENT_TYPE::VOID => return flags | TypeFlags::VOID,
                ELEMENT_TYPE::BOOLEAN
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
                | ELEMENT_TYPE::I
                | ELEMENT_TYPE::U
                | ELEMENT_TYPE::TYPEDBYREF
                | ELEMENT_TYPE::VALUETYPE => return flags | TypeFlags::VALUE_TYPE,
                ELEMENT_TYPE::GENERICINST => {
                    return match parser.peek_byte() {
                        Ok(ELEMENT_TYPE::VALUETYPE) => flags | TypeFlags::VALUE_TYPE,
                        _ => flags,
                    };
                }
                ELEMENT_TYPE::VAR | ELEMENT_TYPE::MVAR => {
                    return flags | TypeFlags::GENERIC_PARAMETER
                }
                ELEMENT_TYPE::SZARRAY | ELEMENT_TYPE::ARRAY => return flags | TypeFlags::ARRAY,
                _ => return flags,
            }
        }
    }
}

/// An argument or return value of the instrumented method.
///
/// Only [`ArgumentDescriptor::signature`] is required; the classification is derived from it
/// unless an implementation knows better (for example from resolved type information).
pub trait ArgumentDescriptor {
    /// The complete type descriptor, copied verbatim into generated signatures
    fn signature(&self) -> &[u8];

    /// The classification of [`ArgumentDescriptor::signature`]
    fn type_flags(&self) -> TypeFlags {
        TypeFlags::from_signature(self.signature())
    }

    /// Returns `true` for `void` return values
    fn is_void(&self) -> bool {
        self.type_flags().contains(TypeFlags::VOID)
    }

    /// Returns `true` if the type is a value type
    fn is_value_type(&self) -> bool {
        self.type_flags().contains(TypeFlags::VALUE_TYPE)
    }

    /// Returns `true` if the type is an unresolved generic parameter
    fn is_generic_parameter(&self) -> bool {
        self.type_flags().contains(TypeFlags::GENERIC_PARAMETER)
    }
}

/// Owned [`ArgumentDescriptor`] over one complete type descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodArgument {
    signature: Vec<u8>,
    flags: TypeFlags,
}

impl MethodArgument {
    /// Creates an argument from exactly one type descriptor.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `signature` is not a single complete descriptor.
    pub fn parse(signature: &[u8]) -> Result<Self> {
        let mut parser = SignatureParser::new(signature);
        let descriptor = parser.read_type()?;
        if parser.has_more_data() {
            return Err(malformed_error!(
                "Type descriptor has {} trailing bytes",
                parser.remaining().len()
            ));
        }

        Ok(Self::from_descriptor(descriptor))
    }

    fn from_descriptor(descriptor: &[u8]) -> Self {
        MethodArgument {
            signature: descriptor.to_vec(),
            flags: TypeFlags::from_signature(descriptor),
        }
    }

    /// The `void` return value
    #[must_use]
    pub fn void() -> Self {
        Self::from_descriptor(&[ELEMENT_TYPE::VOID])
    }
}

impl ArgumentDescriptor for MethodArgument {
    fn signature(&self) -> &[u8] {
        &self.signature
    }

    fn type_flags(&self) -> TypeFlags {
        self.flags
    }
}

impl<T: ArgumentDescriptor + ?Sized> ArgumentDescriptor for &T {
    fn signature(&self) -> &[u8] {
        (**self).signature()
    }

    fn type_flags(&self) -> TypeFlags {
        (**self).type_flags()
    }
}

/// The return value and parameters of a method definition signature.
///
/// # Example
///
/// ```rust
/// use dotinject::calltarget::{ArgumentDescriptor, MethodSignature};
///
/// // instance int32 M(string, valuetype <TypeRef 1>)
/// let method = MethodSignature::parse(&[0x20, 0x02, 0x08, 0x0E, 0x11, 0x05])?;
/// assert!(method.return_value.is_value_type());
/// assert_eq!(method.arguments.len(), 2);
/// assert!(!method.arguments[0].is_value_type());
/// # Ok::<(), dotinject::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    /// The calling convention byte
    pub calling_convention: u8,
    /// Number of generic parameters of the method
    pub generic_param_count: u32,
    /// The return value (`void` included)
    pub return_value: MethodArgument,
    /// The declared parameters, `this` excluded
    pub arguments: Vec<MethodArgument>,
}

impl MethodSignature {
    /// Splits a `MethodDefSig` into its return value and parameters
    ///
    /// # Errors
    /// Returns an error if the blob is not a valid method signature.
    pub fn parse(signature: &[u8]) -> Result<Self> {
        let parts = SignatureParser::new(signature).parse_method_signature()?;

        Ok(MethodSignature {
            calling_convention: parts.calling_convention,
            generic_param_count: parts.generic_param_count,
            return_value: MethodArgument::from_descriptor(parts.return_type),
            arguments: parts
                .params
                .into_iter()
                .map(MethodArgument::from_descriptor)
                .collect(),
        })
    }

    /// Returns `true` if the method does not return a value
    #[must_use]
    pub fn is_void(&self) -> bool {
        self.return_value.is_void()
    }
}

/// The type declaring the instrumented method.
///
/// # Resolution
///
/// Injected calls pass the instance type as a generic argument, resolved in this order:
/// 1. a `TypeSpec` token, used as-is with the declared value-type-ness
/// 2. the type's own token, if the type is not generic
/// 3. `System.Object`, encoded as a reference type, for an open generic type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceType {
    /// `TypeDef` or `TypeRef` of the type
    pub token: Token,
    /// `TypeSpec` describing the instantiated type, if available
    pub type_spec: Option<Token>,
    /// The type is a value type
    pub is_value_type: bool,
    /// The type has unresolved generic parameters
    pub is_generic: bool,
}

impl InstanceType {
    /// A non-generic reference type
    #[must_use]
    pub fn new(token: Token) -> Self {
        InstanceType {
            token,
            type_spec: None,
            is_value_type: false,
            is_generic: false,
        }
    }

    /// Marks the type as a value type
    #[must_use]
    pub fn value_type(mut self) -> Self {
        self.is_value_type = true;
        self
    }

    /// Marks the type as generic
    #[must_use]
    pub fn generic(mut self) -> Self {
        self.is_generic = true;
        self
    }

    /// Sets the `TypeSpec` of the instantiated type
    #[must_use]
    pub fn with_type_spec(mut self, type_spec: Token) -> Self {
        self.type_spec = (!type_spec.is_null()).then_some(type_spec);
        self
    }

    /// Returns the token and value-type-ness to encode for this instance, substituting
    /// `object_type` for an open generic type.
    #[must_use]
    pub fn resolve(&self, object_type: Token) -> (Token, bool) {
        match self.type_spec {
            Some(type_spec) => (type_spec, self.is_value_type),
            None if !self.is_generic => (self.token, self.is_value_type),
            None => (object_type, false),
        }
    }
}
