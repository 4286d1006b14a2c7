//! Dedicated signature encoders for the instrumentation call shapes.
//!
//! Every encoder produces one exactly sized [`SignatureBlob`] through [`SignatureWriter`].
//! Type tokens are always embedded in compressed `TypeDefOrRefOrSpecEncoded` form, and raw
//! type descriptors supplied by the caller (argument and return types of the instrumented
//! method) are copied verbatim.
//!
//! # Available Encoders
//!
//! ## Helper members
//! - [`encode_get_type_from_handle`] - `System.Type::GetTypeFromHandle`
//! - [`encode_static_value_getter`] - parameterless static getters returning a value type
//! - [`encode_get_default_value`] - the open `GetDefaultValue<T>` helper
//! - [`encode_return_type_spec`] - the return wrapper instantiated over one return type
//! - [`encode_return_default`] / [`encode_return_get_value`] - members of the return wrapper
//!
//! ## Open generic call members
//! - [`encode_begin_method`] / [`encode_begin_method_with_arguments`]
//! - [`encode_end_method_void`] / [`encode_end_method_return`]
//! - [`encode_log_exception`]
//!
//! ## Instantiations and locals
//! - [`encode_method_instantiation`] / [`encode_call_target_instantiation`]
//! - [`encode_patched_locals`]

use crate::{
    metadata::{
        signatures::{
            SignatureBlob, SignatureWriter, CALLING_CONVENTION, ELEMENT_TYPE, SIGNATURE_HEADER,
        },
        token::Token,
    },
    utils::to_u32,
    Result,
};

/// The type held by the call-return local: the void wrapper or the instantiated return wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallReturnLocal<'a> {
    /// `VALUETYPE <VoidReturn>`
    Void(Token),
    /// A complete `GENERICINST VALUETYPE <Return`1> 1 <T>` descriptor
    Generic(&'a [u8]),
}

/// Encodes `static Type GetTypeFromHandle(RuntimeTypeHandle)`.
///
/// ```text
/// DEFAULT 1 CLASS <System.Type> VALUETYPE <System.RuntimeTypeHandle>
/// ```
///
/// # Errors
/// Returns [`crate::Error::InvalidToken`] if either token is not a type token.
pub fn encode_get_type_from_handle(type_ref: Token, type_handle_ref: Token) -> Result<SignatureBlob> {
    let mut writer = SignatureWriter::new();
    writer.byte(CALLING_CONVENTION::DEFAULT).byte(1);
    writer.type_token(ELEMENT_TYPE::CLASS, type_ref)?;
    writer.type_token(ELEMENT_TYPE::VALUETYPE, type_handle_ref)?;
    Ok(writer.finish())
}

/// Encodes a parameterless static method returning the value type `value_type`, such as
/// `CallTargetState.GetDefault()` or `CallTargetReturn.GetDefault()`.
///
/// ```text
/// DEFAULT 0 VALUETYPE <value_type>
/// ```
///
/// # Errors
/// Returns [`crate::Error::InvalidToken`] if `value_type` is not a type token.
pub fn encode_static_value_getter(value_type: Token) -> Result<SignatureBlob> {
    let mut writer = SignatureWriter::new();
    writer.byte(CALLING_CONVENTION::DEFAULT).byte(0);
    writer.type_token(ELEMENT_TYPE::VALUETYPE, value_type)?;
    Ok(writer.finish())
}

/// Encodes the open `static T GetDefaultValue<T>()` helper.
///
/// ```text
/// GENERIC 1 0 MVAR 0
/// ```
#[must_use]
pub fn encode_get_default_value() -> SignatureBlob {
    let mut writer = SignatureWriter::new();
    writer
        .byte(CALLING_CONVENTION::GENERIC)
        .byte(1)
        .byte(0)
        .byte(ELEMENT_TYPE::MVAR)
        .byte(0);
    writer.finish()
}

/// Encodes the return wrapper instantiated over `return_type`, used as a `TypeSpec` and as
/// a local or return descriptor.
///
/// ```text
/// GENERICINST VALUETYPE <Return`1> 1 <return_type>
/// ```
///
/// # Errors
/// Returns [`crate::Error::InvalidToken`] if `return_wrapper` is not a type token.
pub fn encode_return_type_spec(return_wrapper: Token, return_type: &[u8]) -> Result<SignatureBlob> {
    let mut writer = SignatureWriter::new();
    writer.byte(ELEMENT_TYPE::GENERICINST);
    writer.type_token(ELEMENT_TYPE::VALUETYPE, return_wrapper)?;
    writer.byte(1).blob(return_type);
    Ok(writer.finish())
}

/// Encodes `static CallTargetReturn<T> GetDefault()` as declared on the generic return wrapper.
///
/// ```text
/// DEFAULT 0 GENERICINST VALUETYPE <Return`1> 1 VAR 0
/// ```
///
/// # Errors
/// Returns [`crate::Error::InvalidToken`] if `return_wrapper` is not a type token.
pub fn encode_return_default(return_wrapper: Token) -> Result<SignatureBlob> {
    let mut writer = SignatureWriter::new();
    writer
        .byte(CALLING_CONVENTION::DEFAULT)
        .byte(0)
        .byte(ELEMENT_TYPE::GENERICINST);
    writer.type_token(ELEMENT_TYPE::VALUETYPE, return_wrapper)?;
    writer.byte(1).byte(ELEMENT_TYPE::VAR).byte(0);
    Ok(writer.finish())
}

/// Encodes the instance method `T GetReturnValue()` of the return wrapper.
///
/// ```text
/// HASTHIS 0 VAR 0
/// ```
#[must_use]
pub fn encode_return_get_value() -> SignatureBlob {
    let mut writer = SignatureWriter::new();
    writer
        .byte(CALLING_CONVENTION::HASTHIS)
        .byte(0)
        .byte(ELEMENT_TYPE::VAR)
        .byte(0);
    writer.finish()
}

/// Encodes the open begin member for `arity` typed arguments.
///
/// `MVAR 0` is the integration type and only appears in the instantiation; the instance is
/// passed as `MVAR 1` and argument `n` as `MVAR n + 2`.
///
/// ```text
/// GENERIC (arity + 2) (arity + 1) VALUETYPE <State> MVAR 1 .. MVAR (arity + 1)
/// ```
///
/// # Errors
/// Returns [`crate::Error::InvalidToken`] if `state` is not a type token.
pub fn encode_begin_method(state: Token, arity: usize) -> Result<SignatureBlob> {
    let mut writer = SignatureWriter::new();
    writer.byte(CALLING_CONVENTION::GENERIC);
    writer.compressed(to_u32(arity + 2)?)?;
    writer.compressed(to_u32(arity + 1)?)?;
    writer.type_token(ELEMENT_TYPE::VALUETYPE, state)?;

    for index in 1..=arity + 1 {
        writer.byte(ELEMENT_TYPE::MVAR);
        writer.compressed(to_u32(index)?)?;
    }

    Ok(writer.finish())
}

/// Encodes the open begin member taking all arguments boxed in an `object[]`.
///
/// ```text
/// GENERIC 2 2 VALUETYPE <State> MVAR 1 SZARRAY OBJECT
/// ```
///
/// # Errors
/// Returns [`crate::Error::InvalidToken`] if `state` is not a type token.
pub fn encode_begin_method_with_arguments(state: Token) -> Result<SignatureBlob> {
    let mut writer = SignatureWriter::new();
    writer.byte(CALLING_CONVENTION::GENERIC).byte(2).byte(2);
    writer.type_token(ELEMENT_TYPE::VALUETYPE, state)?;
    writer
        .byte(ELEMENT_TYPE::MVAR)
        .byte(1)
        .byte(ELEMENT_TYPE::SZARRAY)
        .byte(ELEMENT_TYPE::OBJECT);
    Ok(writer.finish())
}

/// Encodes the open end member of methods without a return value.
///
/// ```text
/// GENERIC 2 3 VALUETYPE <VoidReturn> MVAR 1 CLASS <Exception> VALUETYPE <State>
/// ```
///
/// # Errors
/// Returns [`crate::Error::InvalidToken`] if a token is not a type token.
pub fn encode_end_method_void(
    void_return: Token,
    exception: Token,
    state: Token,
) -> Result<SignatureBlob> {
    let mut writer = SignatureWriter::new();
    writer.byte(CALLING_CONVENTION::GENERIC).byte(2).byte(3);
    writer.type_token(ELEMENT_TYPE::VALUETYPE, void_return)?;
    writer.byte(ELEMENT_TYPE::MVAR).byte(1);
    writer.type_token(ELEMENT_TYPE::CLASS, exception)?;
    writer.type_token(ELEMENT_TYPE::VALUETYPE, state)?;
    Ok(writer.finish())
}

/// Encodes the open end member of methods returning a value.
///
/// ```text
/// GENERIC 3 4 GENERICINST VALUETYPE <Return`1> 1 MVAR 2
///     MVAR 1 MVAR 2 CLASS <Exception> VALUETYPE <State>
/// ```
///
/// # Errors
/// Returns [`crate::Error::InvalidToken`] if a token is not a type token.
pub fn encode_end_method_return(
    return_wrapper: Token,
    exception: Token,
    state: Token,
) -> Result<SignatureBlob> {
    let mut writer = SignatureWriter::new();
    writer
        .byte(CALLING_CONVENTION::GENERIC)
        .byte(3)
        .byte(4)
        .byte(ELEMENT_TYPE::GENERICINST);
    writer.type_token(ELEMENT_TYPE::VALUETYPE, return_wrapper)?;
    writer
        .byte(1)
        .byte(ELEMENT_TYPE::MVAR)
        .byte(2)
        .byte(ELEMENT_TYPE::MVAR)
        .byte(1)
        .byte(ELEMENT_TYPE::MVAR)
        .byte(2);
    writer.type_token(ELEMENT_TYPE::CLASS, exception)?;
    writer.type_token(ELEMENT_TYPE::VALUETYPE, state)?;
    Ok(writer.finish())
}

/// Encodes the open `static void LogException<TIntegration, TTarget>(Exception)` member.
///
/// ```text
/// GENERIC 2 1 VOID CLASS <Exception>
/// ```
///
/// # Errors
/// Returns [`crate::Error::InvalidToken`] if `exception` is not a type token.
pub fn encode_log_exception(exception: Token) -> Result<SignatureBlob> {
    let mut writer = SignatureWriter::new();
    writer
        .byte(CALLING_CONVENTION::GENERIC)
        .byte(2)
        .byte(1)
        .byte(ELEMENT_TYPE::VOID);
    writer.type_token(ELEMENT_TYPE::CLASS, exception)?;
    Ok(writer.finish())
}

/// Encodes a generic method instantiation from complete type descriptors.
///
/// ```text
/// GENERICINST count <arg 0> .. <arg count-1>
/// ```
///
/// # Errors
/// Returns an error if the number of arguments can not be compressed.
pub fn encode_method_instantiation(type_args: &[&[u8]]) -> Result<SignatureBlob> {
    let mut writer = SignatureWriter::new();
    writer.byte(SIGNATURE_HEADER::GENERICINST);
    writer.compressed(to_u32(type_args.len())?)?;
    for arg in type_args {
        writer.blob(arg);
    }
    Ok(writer.finish())
}

/// Encodes the instantiation of an open call member for one call site.
///
/// The integration type is always a class; the instance is a value type or a class as
/// selected by `instance_is_value_type`. `type_args` follow verbatim.
///
/// ```text
/// GENERICINST (2 + n) CLASS <integration> (VALUETYPE | CLASS) <instance> <arg 0> .. <arg n-1>
/// ```
///
/// # Errors
/// Returns [`crate::Error::InvalidToken`] if a token is not a type token.
pub fn encode_call_target_instantiation(
    integration: Token,
    instance: Token,
    instance_is_value_type: bool,
    type_args: &[&[u8]],
) -> Result<SignatureBlob> {
    let instance_element = if instance_is_value_type {
        ELEMENT_TYPE::VALUETYPE
    } else {
        ELEMENT_TYPE::CLASS
    };

    let mut writer = SignatureWriter::new();
    writer.byte(SIGNATURE_HEADER::GENERICINST);
    writer.compressed(to_u32(type_args.len() + 2)?)?;
    writer.type_token(ELEMENT_TYPE::CLASS, integration)?;
    writer.type_token(instance_element, instance)?;
    for arg in type_args {
        writer.blob(arg);
    }
    Ok(writer.finish())
}

/// Encodes a local variable signature with the instrumentation locals appended.
///
/// `existing` holds the descriptors of the original locals (everything after the original
/// count) and is copied verbatim. `local_count` is the new total.
///
/// ```text
/// LOCAL_SIG <local_count> <existing..> [<return_type>] CLASS <Exception> <call return> VALUETYPE <State>
/// ```
///
/// # Errors
/// Returns [`crate::Error::InvalidToken`] if a token is not a type token, or
/// [`crate::Error::InvalidCompressedValue`] if `local_count` is out of range.
pub fn encode_patched_locals(
    local_count: u32,
    existing: &[u8],
    return_type: Option<&[u8]>,
    exception: Token,
    call_return: CallReturnLocal<'_>,
    state: Token,
) -> Result<SignatureBlob> {
    let mut writer = SignatureWriter::new();
    writer.byte(SIGNATURE_HEADER::LOCAL_SIG);
    writer.compressed(local_count)?;
    writer.blob(existing);

    if let Some(return_type) = return_type {
        writer.blob(return_type);
    }

    writer.type_token(ELEMENT_TYPE::CLASS, exception)?;
    match call_return {
        CallReturnLocal::Void(void_return) => {
            writer.type_token(ELEMENT_TYPE::VALUETYPE, void_return)?;
        }
        CallReturnLocal::Generic(descriptor) => {
            writer.blob(descriptor);
        }
    }
    writer.type_token(ELEMENT_TYPE::VALUETYPE, state)?;

    Ok(writer.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{metadata::signatures::SignatureParser, Error};

    const TYPE: Token = Token(0x0100_0003);
    const HANDLE: Token = Token(0x0100_0004);
    const EXCEPTION: Token = Token(0x0100_0002);
    const STATE: Token = Token(0x0100_0008);
    const VOID_RETURN: Token = Token(0x0100_0009);
    const RETURN: Token = Token(0x0100_000A);

    #[test]
    fn test_encode_get_type_from_handle() -> Result<()> {
        let blob = encode_get_type_from_handle(TYPE, HANDLE)?;
        assert_eq!(blob.as_bytes(), &[0x00, 0x01, 0x12, 0x0D, 0x11, 0x11]);
        Ok(())
    }

    #[test]
    fn test_encode_static_value_getter() -> Result<()> {
        let blob = encode_static_value_getter(STATE)?;
        assert_eq!(blob.as_bytes(), &[0x00, 0x00, 0x11, 0x21]);
        Ok(())
    }

    #[test]
    fn test_encode_fixed_helpers() {
        assert_eq!(encode_get_default_value().as_bytes(), &[0x10, 0x01, 0x00, 0x1E, 0x00]);
        assert_eq!(encode_return_get_value().as_bytes(), &[0x20, 0x00, 0x13, 0x00]);
    }

    #[test]
    fn test_encode_return_wrapper() -> Result<()> {
        let spec = encode_return_type_spec(RETURN, &[ELEMENT_TYPE::I4])?;
        assert_eq!(spec.as_bytes(), &[0x15, 0x11, 0x29, 0x01, 0x08]);

        let default = encode_return_default(RETURN)?;
        assert_eq!(
            default.as_bytes(),
            &[0x00, 0x00, 0x15, 0x11, 0x29, 0x01, 0x13, 0x00]
        );
        Ok(())
    }

    #[test]
    fn test_encode_begin_method_arity() -> Result<()> {
        for arity in 0..=6 {
            let blob = encode_begin_method(STATE, arity)?;
            let method = SignatureParser::new(&blob).parse_method_signature()?;

            assert_eq!(method.calling_convention, CALLING_CONVENTION::GENERIC);
            assert_eq!(method.generic_param_count as usize, arity + 2);
            assert_eq!(method.params.len(), arity + 1);
            assert_eq!(method.return_type, &[0x11, 0x21]);
            for (index, param) in method.params.iter().enumerate() {
                assert_eq!(*param, &[ELEMENT_TYPE::MVAR, (index + 1) as u8]);
            }
            assert_eq!(blob.len(), 3 + 2 + 2 * (arity + 1));
        }
        Ok(())
    }

    #[test]
    fn test_encode_begin_method_with_arguments() -> Result<()> {
        let blob = encode_begin_method_with_arguments(STATE)?;
        assert_eq!(
            blob.as_bytes(),
            &[0x10, 0x02, 0x02, 0x11, 0x21, 0x1E, 0x01, 0x1D, 0x1C]
        );
        Ok(())
    }

    #[test]
    fn test_encode_end_method() -> Result<()> {
        let void = encode_end_method_void(VOID_RETURN, EXCEPTION, STATE)?;
        assert_eq!(
            void.as_bytes(),
            &[0x10, 0x02, 0x03, 0x11, 0x25, 0x1E, 0x01, 0x12, 0x09, 0x11, 0x21]
        );

        let typed = encode_end_method_return(RETURN, EXCEPTION, STATE)?;
        let method = SignatureParser::new(&typed).parse_method_signature()?;
        assert_eq!(method.generic_param_count, 3);
        assert_eq!(method.return_type, &[0x15, 0x11, 0x29, 0x01, 0x1E, 0x02]);
        assert_eq!(
            method.params,
            vec![&[0x1E, 0x01][..], &[0x1E, 0x02][..], &[0x12, 0x09][..], &[0x11, 0x21][..]]
        );
        Ok(())
    }

    #[test]
    fn test_encode_log_exception() -> Result<()> {
        let blob = encode_log_exception(EXCEPTION)?;
        assert_eq!(blob.as_bytes(), &[0x10, 0x02, 0x01, 0x01, 0x12, 0x09]);
        Ok(())
    }

    #[test]
    fn test_encode_call_target_instantiation() -> Result<()> {
        let integration = Token::new(0x0200_0010);
        let instance = Token::new(0x0200_0011);
        let blob = encode_call_target_instantiation(
            integration,
            instance,
            true,
            &[&[ELEMENT_TYPE::I4], &[ELEMENT_TYPE::SZARRAY, ELEMENT_TYPE::STRING]],
        )?;
        assert_eq!(
            blob.as_bytes(),
            &[0x0A, 0x04, 0x12, 0x40, 0x11, 0x44, 0x08, 0x1D, 0x0E]
        );

        let args = SignatureParser::new(&blob).parse_method_spec_signature()?;
        assert_eq!(args.len(), 4);
        Ok(())
    }

    #[test]
    fn test_encode_method_instantiation() -> Result<()> {
        let blob = encode_method_instantiation(&[&[0x11, 0x21]])?;
        assert_eq!(blob.as_bytes(), &[0x0A, 0x01, 0x11, 0x21]);
        Ok(())
    }

    #[test]
    fn test_encode_patched_locals() -> Result<()> {
        let spec = encode_return_type_spec(RETURN, &[ELEMENT_TYPE::I4])?;
        let blob = encode_patched_locals(
            5,
            &[ELEMENT_TYPE::STRING],
            Some(&[ELEMENT_TYPE::I4]),
            EXCEPTION,
            CallReturnLocal::Generic(&spec),
            STATE,
        )?;

        let locals = SignatureParser::new(&blob).parse_local_var_signature()?;
        assert_eq!(locals.count, 5);
        assert_eq!(
            locals.locals,
            vec![
                &[0x0E][..],
                &[0x08][..],
                &[0x12, 0x09][..],
                spec.as_bytes(),
                &[0x11, 0x21][..]
            ]
        );
        Ok(())
    }

    #[test]
    fn test_encoders_reject_non_type_tokens() {
        let member = Token::new(0x0A00_0001);
        assert!(matches!(
            encode_static_value_getter(member),
            Err(Error::InvalidToken(_))
        ));
        assert!(encode_end_method_void(VOID_RETURN, member, STATE).is_err());
    }
}
