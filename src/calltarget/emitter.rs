//! Emission of the instrumentation calls at one call site.
//!
//! Every `write_*` method follows the same steps: resolve the open generic member of its
//! [`CallShape`], instantiate it for the integration type, the instance type and the call
//! site's argument or return types, and splice a `call` to the resulting `MethodSpec` through
//! the [`InstructionEditor`]. The handle of the inserted instruction is returned.
//!
//! Nothing is emitted unless every definition succeeded, so a failing call site leaves the
//! method body as it was.
//!
//! # Example
//!
//! ```rust
//! use dotinject::calltarget::{CallTargetTokens, InstanceType, InstructionList, MethodArgument};
//! use dotinject::metadata::{emit::MemoryStore, identity::{AssemblyIdentity, AssemblyVersion}, token::Token};
//!
//! let corlib = AssemblyIdentity::new("mscorlib", AssemblyVersion::new(4, 0, 0, 0));
//! let mut tokens = CallTargetTokens::new(MemoryStore::new(), corlib);
//! let mut body = InstructionList::new(Token::NIL);
//!
//! let integration = Token::new(0x0200_0002);
//! let instance = InstanceType::new(Token::new(0x0200_0005));
//! let argument = MethodArgument::parse(&[0x0E])?;
//!
//! let call = tokens.write_begin_method(&mut body, integration, &instance, &[argument])?;
//! assert_eq!(call, 0);
//! # Ok::<(), dotinject::Error>(())
//! ```

use crate::{
    calltarget::{
        arguments::{ArgumentDescriptor, InstanceType},
        cache::{CallShape, FoundationalToken},
        rewriter::InstructionEditor,
        tokens::{warn_on_failure, CallTargetTokens, MAX_BEGIN_ARITY},
    },
    metadata::{emit::MetadataStore, signatures::encode_call_target_instantiation, token::Token},
    Error, Result,
};

impl<S: MetadataStore> CallTargetTokens<S> {
    /// Emits `call BeginMethod<TIntegration, TTarget, TArg1..TArgN>(instance, arg1..argN)`.
    ///
    /// ## Arguments
    /// * 'editor'      - Editor of the instrumented method
    /// * 'integration' - The integration type handling this method
    /// * 'instance'    - The type declaring the instrumented method
    /// * 'arguments'   - The method's parameters, at most six
    ///
    /// # Errors
    /// Returns [`Error::InvalidArity`] for more than six arguments (use
    /// [`CallTargetTokens::write_begin_method_with_arguments_array`]), or the first
    /// definition error.
    pub fn write_begin_method<E, A>(
        &mut self,
        editor: &mut E,
        integration: Token,
        instance: &InstanceType,
        arguments: &[A],
    ) -> Result<E::Handle>
    where
        E: InstructionEditor,
        A: ArgumentDescriptor,
    {
        let arity = arguments.len();
        if arity > MAX_BEGIN_ARITY {
            log::warn!("Begin method with {arity} arguments is not supported");
            return Err(Error::InvalidArity(arity));
        }

        let member = self.call_shape_member_ref(CallShape::Begin { arity })?;
        let type_args: Vec<&[u8]> = arguments
            .iter()
            .map(|argument| argument.signature())
            .collect();
        let method = self.instantiate(member, integration, instance, &type_args, "Begin")?;
        Ok(editor.call(method))
    }

    /// Emits `call BeginMethod<TIntegration, TTarget>(instance, object[])`.
    ///
    /// The caller is expected to have pushed the instance and the boxed arguments.
    ///
    /// # Errors
    /// Returns the first definition error.
    pub fn write_begin_method_with_arguments_array<E: InstructionEditor>(
        &mut self,
        editor: &mut E,
        integration: Token,
        instance: &InstanceType,
    ) -> Result<E::Handle> {
        let member = self.call_shape_member_ref(CallShape::BeginWithArgumentsArray)?;
        let method = self.instantiate(member, integration, instance, &[], "Begin")?;
        Ok(editor.call(method))
    }

    /// Emits `call EndMethod<TIntegration, TTarget>(instance, exception, state)` for a method
    /// without return value.
    ///
    /// # Errors
    /// Returns the first definition error.
    pub fn write_end_void_return<E: InstructionEditor>(
        &mut self,
        editor: &mut E,
        integration: Token,
        instance: &InstanceType,
    ) -> Result<E::Handle> {
        let member = self.call_shape_member_ref(CallShape::EndVoid)?;
        let method = self.instantiate(member, integration, instance, &[], "End")?;
        Ok(editor.call(method))
    }

    /// Emits `call EndMethod<TIntegration, TTarget, TReturn>(instance, value, exception, state)`.
    ///
    /// # Errors
    /// Returns the first definition error.
    pub fn write_end_return<E: InstructionEditor>(
        &mut self,
        editor: &mut E,
        integration: Token,
        instance: &InstanceType,
        return_value: &impl ArgumentDescriptor,
    ) -> Result<E::Handle> {
        let member = self.call_shape_member_ref(CallShape::EndReturn)?;
        let method = self.instantiate(
            member,
            integration,
            instance,
            &[return_value.signature()],
            "End",
        )?;
        Ok(editor.call(method))
    }

    /// Emits `call LogException<TIntegration, TTarget>(exception)`.
    ///
    /// # Errors
    /// Returns the first definition error.
    pub fn write_log_exception<E: InstructionEditor>(
        &mut self,
        editor: &mut E,
        integration: Token,
        instance: &InstanceType,
    ) -> Result<E::Handle> {
        let member = self.call_shape_member_ref(CallShape::LogException)?;
        let method = self.instantiate(member, integration, instance, &[], "LogException")?;
        Ok(editor.call(method))
    }

    /// Emits `call Return<T>::GetReturnValue()` on the instantiated return wrapper `type_spec`.
    ///
    /// The member ref is defined on every call, as it depends on the wrapper instantiation.
    ///
    /// # Errors
    /// Returns the definition error of the member ref.
    pub fn write_call_target_return_get_return_value<E: InstructionEditor>(
        &mut self,
        editor: &mut E,
        type_spec: Token,
    ) -> Result<E::Handle> {
        let member = self.return_value_get_member_ref(type_spec)?;
        Ok(editor.call(member))
    }

    fn instantiate(
        &mut self,
        member: Token,
        integration: Token,
        instance: &InstanceType,
        type_args: &[&[u8]],
        what: &str,
    ) -> Result<Token> {
        let object = self
            .cache
            .require_foundational(FoundationalToken::ObjectType)?;
        let (instance_token, is_value_type) = instance.resolve(object);

        let instantiation =
            encode_call_target_instantiation(integration, instance_token, is_value_type, type_args)?;
        warn_on_failure(
            self.store.define_method_spec(member, &instantiation),
            &format!("{what} method spec"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        calltarget::{
            arguments::MethodArgument,
            rewriter::{Instruction, InstructionList},
        },
        metadata::{
            emit::{MemoryStore, MetadataRow},
            signatures::{SignatureParser, ELEMENT_TYPE},
        },
        test::{corlib_identity, RecordingStore},
    };

    const INTEGRATION: Token = Token(0x0200_0002);
    const TARGET: Token = Token(0x0200_0005);

    fn session() -> CallTargetTokens<MemoryStore> {
        CallTargetTokens::new(MemoryStore::new(), corlib_identity())
    }

    fn instantiation(tokens: &CallTargetTokens<MemoryStore>, spec: Token) -> (Token, Vec<u8>) {
        match tokens.store().row(spec) {
            Some(MetadataRow::MethodSpec {
                parent,
                instantiation,
            }) => (*parent, instantiation.clone()),
            other => panic!("unexpected row {other:?}"),
        }
    }

    fn called(body: &InstructionList, handle: usize) -> Token {
        match body.instructions()[handle] {
            Instruction::Call(token) => token,
            other => panic!("unexpected instruction {other}"),
        }
    }

    #[test]
    fn test_begin_method_arities() -> Result<()> {
        let mut tokens = session();
        let mut body = InstructionList::new(Token::NIL);
        let argument = MethodArgument::parse(&[ELEMENT_TYPE::I4])?;

        for arity in 0..=MAX_BEGIN_ARITY {
            let arguments = vec![argument.clone(); arity];
            let handle = tokens.write_begin_method(
                &mut body,
                INTEGRATION,
                &InstanceType::new(TARGET),
                &arguments,
            )?;

            let (open, blob) = instantiation(&tokens, called(&body, handle));
            assert_eq!(
                tokens.cache().call_shape(CallShape::Begin { arity }),
                Some(open)
            );

            let type_args = SignatureParser::new(&blob).parse_method_spec_signature()?;
            assert_eq!(type_args.len(), arity + 2);
            assert_eq!(type_args[0], &[ELEMENT_TYPE::CLASS, 0x08]);
            assert_eq!(type_args[1], &[ELEMENT_TYPE::CLASS, 0x14]);
        }

        assert_eq!(body.len(), MAX_BEGIN_ARITY + 1);
        Ok(())
    }

    #[test]
    fn test_begin_method_rejects_arity() {
        let mut tokens = session();
        let mut body = InstructionList::new(Token::NIL);
        let arguments = vec![MethodArgument::void(); 7];

        let result = tokens.write_begin_method(
            &mut body,
            INTEGRATION,
            &InstanceType::new(TARGET),
            &arguments,
        );
        assert!(matches!(result, Err(Error::InvalidArity(7))));
        assert!(body.is_empty());
        assert_eq!(tokens.store().define_count(), 0);
    }

    #[test]
    fn test_open_members_are_cached() -> Result<()> {
        let mut tokens = session();
        let mut body = InstructionList::new(Token::NIL);
        let instance = InstanceType::new(TARGET);

        tokens.write_end_void_return(&mut body, INTEGRATION, &instance)?;
        let member_refs = tokens.store().call_count("define_member_ref");
        tokens.write_end_void_return(&mut body, INTEGRATION, &instance)?;
        tokens.write_end_void_return(&mut body, Token::new(0x0200_0003), &instance)?;

        assert_eq!(tokens.store().call_count("define_member_ref"), member_refs);
        assert_eq!(tokens.store().call_count("define_method_spec"), 3);
        Ok(())
    }

    #[test]
    fn test_instance_type_encoding() -> Result<()> {
        let mut tokens = session();
        let mut body = InstructionList::new(Token::NIL);
        tokens.ensure_foundational_tokens()?;
        let object = tokens.object_type_ref().unwrap();
        let cases = [
            (InstanceType::new(TARGET).value_type(), ELEMENT_TYPE::VALUETYPE, TARGET),
            (InstanceType::new(TARGET), ELEMENT_TYPE::CLASS, TARGET),
            (
                InstanceType::new(TARGET).value_type().generic(),
                ELEMENT_TYPE::CLASS,
                object,
            ),
            (
                InstanceType::new(TARGET)
                    .value_type()
                    .generic()
                    .with_type_spec(Token::new(0x1B00_0004)),
                ELEMENT_TYPE::VALUETYPE,
                Token::new(0x1B00_0004),
            ),
        ];

        for (instance, element, token) in cases {
            let handle = tokens.write_log_exception(&mut body, INTEGRATION, &instance)?;
            let (_, blob) = instantiation(&tokens, called(&body, handle));
            let type_args = SignatureParser::new(&blob).parse_method_spec_signature()?;

            let mut parser = SignatureParser::new(type_args[1]);
            assert_eq!(parser.read_u8()?, element);
            assert_eq!(parser.read_compressed_token()?, token);
        }
        Ok(())
    }

    #[test]
    fn test_end_return() -> Result<()> {
        let mut tokens = session();
        let mut body = InstructionList::new(Token::NIL);
        let boolean = MethodArgument::parse(&[ELEMENT_TYPE::BOOLEAN])?;

        let handle =
            tokens.write_end_return(&mut body, INTEGRATION, &InstanceType::new(TARGET), &boolean)?;
        let (open, blob) = instantiation(&tokens, called(&body, handle));

        match tokens.store().row(open) {
            Some(MetadataRow::MemberRef {
                name, signature, ..
            }) => {
                assert_eq!(name, "EndMethod");
                let method = SignatureParser::new(signature).parse_method_signature()?;
                assert_eq!(method.generic_param_count, 3);
                assert_eq!(method.params.len(), 4);
            }
            other => panic!("unexpected row {other:?}"),
        }

        let type_args = SignatureParser::new(&blob).parse_method_spec_signature()?;
        assert_eq!(type_args.len(), 3);
        assert_eq!(type_args[2], &[ELEMENT_TYPE::BOOLEAN]);
        Ok(())
    }

    #[test]
    fn test_begin_with_arguments_array() -> Result<()> {
        let mut tokens = session();
        let mut body = InstructionList::new(Token::NIL);

        let handle = tokens.write_begin_method_with_arguments_array(
            &mut body,
            INTEGRATION,
            &InstanceType::new(TARGET),
        )?;
        let (open, blob) = instantiation(&tokens, called(&body, handle));
        assert_eq!(
            tokens.cache().call_shape(CallShape::BeginWithArgumentsArray),
            Some(open)
        );
        assert_eq!(
            SignatureParser::new(&blob)
                .parse_method_spec_signature()?
                .len(),
            2
        );
        Ok(())
    }

    #[test]
    fn test_get_return_value() -> Result<()> {
        let mut tokens = session();
        let mut body = InstructionList::new(Token::NIL);
        let int32 = MethodArgument::parse(&[ELEMENT_TYPE::I4])?;
        let type_spec = tokens.return_value_type_spec(&int32)?;

        let first = tokens.write_call_target_return_get_return_value(&mut body, type_spec)?;
        let second = tokens.write_call_target_return_get_return_value(&mut body, type_spec)?;
        assert_ne!(called(&body, first), called(&body, second));
        Ok(())
    }

    #[test]
    fn test_failure_emits_nothing() {
        let store = RecordingStore::new().fail_on("define_method_spec", 1);
        let mut tokens = CallTargetTokens::new(store, corlib_identity());
        let mut body = InstructionList::new(Token::NIL);

        let result =
            tokens.write_log_exception(&mut body, INTEGRATION, &InstanceType::new(TARGET));
        assert!(matches!(result, Err(Error::Definition { .. })));
        assert!(body.is_empty());
        assert!(tokens.cache().call_shape(CallShape::LogException).is_some());
    }
}
