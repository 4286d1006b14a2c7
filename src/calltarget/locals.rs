//! Patching of local variable signatures.
//!
//! Every instrumented method needs three or four extra locals to carry the state between the
//! injected calls. They are appended after the method's own locals, in this order:
//!
//! ```text
//! [return value]  the method's own return type, only for non-void methods
//! exception       CLASS <System.Exception>
//! call return     VALUETYPE <VoidReturn> or GENERICINST VALUETYPE <Return`1> 1 <return type>
//! call state      VALUETYPE <State>
//! ```
//!
//! The original locals are kept byte for byte, so existing `ldloc`/`stloc` indices stay valid.
//! A signature whose last local already is the call state is treated as patched and rejected.

use crate::{
    calltarget::{
        arguments::ArgumentDescriptor,
        cache::{FoundationalToken, InstrumentationToken},
        rewriter::InstructionEditor,
        tokens::{warn_on_failure, CallTargetTokens},
    },
    metadata::{
        emit::MetadataStore,
        signatures::{
            encode_patched_locals, CallReturnLocal, SignatureParser, SignatureWriter,
            ELEMENT_TYPE,
        },
        token::Token,
    },
    Error, Result,
};

/// Indices and types of the locals added to an instrumented method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalSlots {
    /// Local receiving the return value, `None` for void methods
    pub return_value: Option<u16>,
    /// Local holding the caught exception
    pub exception: u16,
    /// Local holding the return wrapper
    pub call_return: u16,
    /// Local holding the call state
    pub state: u16,
    /// `System.Exception`
    pub exception_type: Token,
    /// The void return wrapper type or the instantiated return wrapper `TypeSpec`
    pub call_return_type: Token,
    /// The call-state type
    pub state_type: Token,
}

impl LocalSlots {
    fn new(local_count: u32, has_return: bool, types: (Token, Token, Token)) -> Result<Self> {
        let last = local_count
            .checked_sub(1)
            .and_then(|last| u16::try_from(last).ok())
            .ok_or_else(|| malformed_error!("Local count {} is not addressable", local_count))?;

        let (exception_type, call_return_type, state_type) = types;
        Ok(LocalSlots {
            return_value: has_return.then(|| last - 3),
            exception: last - 2,
            call_return: last - 1,
            state: last,
            exception_type,
            call_return_type,
            state_type,
        })
    }

    /// Returns the number of locals added to the method
    #[must_use]
    pub fn added_count(&self) -> u16 {
        if self.return_value.is_some() {
            4
        } else {
            3
        }
    }
}

enum Initializer {
    Value {
        return_index: u16,
        default_value: Token,
        wrapper_default: Token,
    },
    Void(Token),
}

impl<S: MetadataStore> CallTargetTokens<S> {
    /// Appends the instrumentation locals to the method edited by `editor`.
    ///
    /// Registers the new local variable signature with the metadata store and installs it
    /// on the method. Nothing is emitted into the body.
    ///
    /// ## Arguments
    /// * 'editor'        - Editor of the instrumented method
    /// * 'method_return' - The method's return type (`VOID` for void methods)
    ///
    /// # Errors
    /// Returns [`Error::AlreadyModified`] if the locals were patched before, a decoding error
    /// if the existing signature is damaged, or the error of the metadata store. The method
    /// keeps its local signature on failure.
    pub fn modify_local_sig<E: InstructionEditor>(
        &mut self,
        editor: &mut E,
        method_return: &impl ArgumentDescriptor,
    ) -> Result<LocalSlots> {
        let (token, slots) = self.define_patched_locals(editor.local_var_sig(), method_return)?;
        editor.set_local_var_sig(token);
        Ok(slots)
    }

    /// Appends the instrumentation locals and initialises them at the editor's position.
    ///
    /// Emits, for non-void methods:
    ///
    /// ```text
    /// call GetDefaultValue<TReturn>
    /// stloc <return value>
    /// call Return<TReturn>::GetDefault
    /// stloc <call return>
    /// ```
    ///
    /// or for void methods `call VoidReturn::GetDefault; stloc <call return>`, followed in
    /// both cases by `ldnull; stloc <exception>`. The call-state local is assigned by the
    /// begin call and is not initialised here.
    ///
    /// Returns the slots together with the first emitted instruction.
    ///
    /// # Errors
    /// See [`CallTargetTokens::modify_local_sig`]. All members are resolved before anything
    /// is installed or emitted, so a failure leaves the method untouched.
    pub fn modify_local_sig_and_initialize<E: InstructionEditor>(
        &mut self,
        editor: &mut E,
        method_return: &impl ArgumentDescriptor,
    ) -> Result<(LocalSlots, E::Handle)> {
        let (token, slots) = self.define_patched_locals(editor.local_var_sig(), method_return)?;

        let initializer = match slots.return_value {
            Some(return_index) => Initializer::Value {
                return_index,
                default_value: self.default_value_method_spec(method_return)?,
                wrapper_default: self.return_value_default_member_ref(slots.call_return_type)?,
            },
            None => Initializer::Void(self.void_return_default_member_ref()?),
        };

        editor.set_local_var_sig(token);

        let first = match initializer {
            Initializer::Value {
                return_index,
                default_value,
                wrapper_default,
            } => {
                let first = editor.call(default_value);
                editor.store_local(return_index);
                editor.call(wrapper_default);
                first
            }
            Initializer::Void(void_default) => editor.call(void_default),
        };
        editor.store_local(slots.call_return);
        editor.load_null();
        editor.store_local(slots.exception);

        Ok((slots, first))
    }

    fn define_patched_locals(
        &mut self,
        current: Token,
        method_return: &impl ArgumentDescriptor,
    ) -> Result<(Token, LocalSlots)> {
        self.ensure_instrumentation_tokens()?;
        let state = self
            .cache
            .require_instrumentation(InstrumentationToken::StateType)?;
        let exception = self
            .cache
            .require_foundational(FoundationalToken::ExceptionType)?;

        let original = if current.is_null() {
            Vec::new()
        } else {
            self.store.signature_from_token(current)?
        };

        let (original_count, existing, last_local) = if original.is_empty() {
            (0, &original[..], None)
        } else {
            let mut parser = SignatureParser::new(&original);
            let count = parser.parse_local_var_header()?;
            let existing = parser.remaining();
            let mut last_local = None;
            for _ in 0..count {
                last_local = Some(parser.read_type()?);
            }
            (count, existing, last_local)
        };

        let mut state_local = SignatureWriter::new();
        state_local.type_token(ELEMENT_TYPE::VALUETYPE, state)?;
        let state_local = state_local.finish();
        if last_local == Some(state_local.as_bytes()) {
            log::warn!("The local signature {current} has already been modified");
            return Err(Error::AlreadyModified(current));
        }

        let has_return = !method_return.is_void();
        let (call_return_type, wrapper_blob) = if has_return {
            let type_spec = self.return_value_type_spec(method_return)?;
            let blob = self.store.type_spec_from_token(type_spec)?;
            (type_spec, Some(blob))
        } else {
            (self.void_return_type_ref()?, None)
        };
        let call_return = match &wrapper_blob {
            Some(blob) => CallReturnLocal::Generic(blob),
            None => CallReturnLocal::Void(call_return_type),
        };

        let added = if has_return { 4 } else { 3 };
        let local_count = original_count
            .checked_add(added)
            .ok_or_else(|| malformed_error!("Local count {} overflows", original_count))?;
        let slots = LocalSlots::new(
            local_count,
            has_return,
            (exception, call_return_type, state),
        )?;

        let signature = encode_patched_locals(
            local_count,
            existing,
            has_return.then(|| method_return.signature()),
            exception,
            call_return,
            state,
        )
        .inspect_err(|_| log::warn!("Error creating new locals var signature"))?;
        let token = warn_on_failure(
            self.store.token_from_signature(&signature),
            "Local variable signature",
        )?;

        log::debug!("replaced local signature {current} with {token} ({original_count} -> {local_count} locals)");
        Ok((token, slots))
    }
}
