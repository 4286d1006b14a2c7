//! Token resolution for the instrumentation API of one module.
//!
//! [`CallTargetTokens`] owns the metadata store of the module under rewrite together with its
//! [`ModuleTokenCache`]. The `ensure_*` methods define the references every injected call
//! depends on, in dependency order, and are cheap to call repeatedly: an entry that resolved
//! once is never defined again.
//!
//! # Resolution Order
//!
//! 1. Foundational tokens from the core library ([`CallTargetTokens::ensure_foundational_tokens`])
//! 2. Instrumentation tokens from the instrumentation assembly
//!    ([`CallTargetTokens::ensure_instrumentation_tokens`])
//! 3. Lazily, per need: return wrappers, their members and the open call members
//!
//! # Examples
//!
//! ```rust
//! use dotinject::calltarget::CallTargetTokens;
//! use dotinject::metadata::{emit::MemoryStore, identity::{AssemblyIdentity, AssemblyVersion}};
//!
//! let corlib = AssemblyIdentity::new("System.Private.CoreLib", AssemblyVersion::new(8, 0, 0, 0));
//! let mut tokens = CallTargetTokens::new(MemoryStore::new(), corlib);
//! assert_eq!(tokens.object_type_ref(), None);
//!
//! tokens.ensure_instrumentation_tokens()?;
//! assert!(tokens.object_type_ref().is_some());
//! assert!(tokens.state_type_ref().is_some());
//! # Ok::<(), dotinject::Error>(())
//! ```

use crate::{
    calltarget::{
        arguments::ArgumentDescriptor,
        cache::{CallShape, FoundationalToken, InstrumentationToken, ModuleTokenCache},
        config::CallTargetConfig,
    },
    metadata::{
        emit::MetadataStore,
        identity::AssemblyIdentity,
        signatures::{
            encode_begin_method, encode_begin_method_with_arguments, encode_end_method_return,
            encode_end_method_void, encode_get_default_value, encode_get_type_from_handle,
            encode_log_exception, encode_method_instantiation, encode_return_default,
            encode_return_get_value, encode_return_type_spec, encode_static_value_getter,
        },
        token::Token,
    },
    Error, Result,
};

/// Highest number of typed arguments covered by the fixed-arity begin members
pub const MAX_BEGIN_ARITY: usize = 6;

const SYSTEM_OBJECT: &str = "System.Object";
const SYSTEM_EXCEPTION: &str = "System.Exception";
const SYSTEM_TYPE: &str = "System.Type";
const SYSTEM_RUNTIME_TYPE_HANDLE: &str = "System.RuntimeTypeHandle";
const SYSTEM_RUNTIME_METHOD_HANDLE: &str = "System.RuntimeMethodHandle";
const GET_TYPE_FROM_HANDLE: &str = "GetTypeFromHandle";

/// Logs a failed definition before handing the result back.
pub(crate) fn warn_on_failure<T>(result: Result<T>, what: &str) -> Result<T> {
    result.inspect_err(|error| log::warn!("{what} could not be defined: {error}"))
}

/// Token resolver and helper member factory for one module.
///
/// A `CallTargetTokens` lives exactly as long as the rewriting session of its module and is
/// never shared across modules. All operations take `&mut self`; concurrent rewriting of
/// different modules uses one instance each.
pub struct CallTargetTokens<S: MetadataStore> {
    pub(crate) store: S,
    pub(crate) cache: ModuleTokenCache,
    pub(crate) config: CallTargetConfig,
    corlib: AssemblyIdentity,
}

impl<S: MetadataStore> CallTargetTokens<S> {
    /// Creates a resolver binding to the default instrumentation API.
    ///
    /// ## Arguments
    /// * 'store'  - The metadata store of the module under rewrite
    /// * 'corlib' - Identity of the core library the module references
    pub fn new(store: S, corlib: AssemblyIdentity) -> Self {
        Self::with_config(store, corlib, CallTargetConfig::default())
    }

    /// Creates a resolver binding to the instrumentation API described by `config`
    pub fn with_config(store: S, corlib: AssemblyIdentity, config: CallTargetConfig) -> Self {
        CallTargetTokens {
            store,
            cache: ModuleTokenCache::new(),
            config,
            corlib,
        }
    }

    /// Returns the metadata store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the metadata store mutably
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Ends the session, returning the metadata store
    pub fn into_store(self) -> S {
        self.store
    }

    /// Returns the token cache of this module
    pub fn cache(&self) -> &ModuleTokenCache {
        &self.cache
    }

    /// Returns the configuration of the instrumentation API
    pub fn config(&self) -> &CallTargetConfig {
        &self.config
    }

    /// Returns the identity of the core library
    pub fn corlib(&self) -> &AssemblyIdentity {
        &self.corlib
    }

    /// Resolves the core library references.
    ///
    /// Defines, in order and each at most once: the core library `AssemblyRef`, the type refs
    /// `System.Object`, `System.Exception`, `System.Type`, `System.RuntimeTypeHandle`, the
    /// member ref `System.Type::GetTypeFromHandle` and the type ref `System.RuntimeMethodHandle`.
    ///
    /// # Errors
    /// Returns the first error of the metadata store. Entries resolved before the failing
    /// definition stay resolved.
    pub fn ensure_foundational_tokens(&mut self) -> Result<()> {
        let corlib = self
            .cache
            .resolve_foundational(FoundationalToken::CorLibAssemblyRef, || {
                warn_on_failure(
                    self.store.define_assembly_ref(&self.corlib),
                    "Core library assembly ref",
                )
            })?;

        self.corlib_type(FoundationalToken::ObjectType, corlib, SYSTEM_OBJECT)?;
        self.corlib_type(FoundationalToken::ExceptionType, corlib, SYSTEM_EXCEPTION)?;
        let type_ref = self.corlib_type(FoundationalToken::TypeType, corlib, SYSTEM_TYPE)?;
        let type_handle = self.corlib_type(
            FoundationalToken::TypeHandleType,
            corlib,
            SYSTEM_RUNTIME_TYPE_HANDLE,
        )?;

        self.cache
            .resolve_foundational(FoundationalToken::GetTypeFromHandleMember, || {
                let signature = encode_get_type_from_handle(type_ref, type_handle)?;
                warn_on_failure(
                    self.store
                        .define_member_ref(type_ref, GET_TYPE_FROM_HANDLE, &signature),
                    "GetTypeFromHandle member ref",
                )
            })?;

        self.corlib_type(
            FoundationalToken::MethodHandleType,
            corlib,
            SYSTEM_RUNTIME_METHOD_HANDLE,
        )?;
        Ok(())
    }

    /// Resolves the instrumentation assembly references.
    ///
    /// Runs [`CallTargetTokens::ensure_foundational_tokens`] first, then defines the
    /// instrumentation `AssemblyRef`, the invoker and state type refs and the
    /// `State::GetDefault` member ref.
    ///
    /// # Errors
    /// Returns the first error of the metadata store.
    pub fn ensure_instrumentation_tokens(&mut self) -> Result<()> {
        self.ensure_foundational_tokens()?;

        let assembly = self.cache.resolve_instrumentation(
            InstrumentationToken::InstrumentationAssemblyRef,
            || {
                warn_on_failure(
                    self.store
                        .define_assembly_ref(&self.config.instrumentation_assembly),
                    "Instrumentation assembly ref",
                )
            },
        )?;

        self.cache
            .resolve_instrumentation(InstrumentationToken::CallTargetType, || {
                warn_on_failure(
                    self.store
                        .define_type_ref_by_name(assembly, &self.config.invoker_type),
                    "Invoker type ref",
                )
            })?;

        let state = self
            .cache
            .resolve_instrumentation(InstrumentationToken::StateType, || {
                warn_on_failure(
                    self.store
                        .define_type_ref_by_name(assembly, &self.config.state_type),
                    "State type ref",
                )
            })?;

        self.cache
            .resolve_instrumentation(InstrumentationToken::StateGetDefaultMember, || {
                let signature = encode_static_value_getter(state)?;
                warn_on_failure(
                    self.store
                        .define_member_ref(state, &self.config.get_default, &signature),
                    "State GetDefault member ref",
                )
            })?;
        Ok(())
    }

    fn corlib_type(&mut self, key: FoundationalToken, corlib: Token, name: &str) -> Result<Token> {
        self.cache.resolve_foundational(key, || {
            warn_on_failure(
                self.store.define_type_ref_by_name(corlib, name),
                <&'static str>::from(key),
            )
        })
    }

    /// `AssemblyRef` of the core library, if resolved
    pub fn corlib_assembly_ref(&self) -> Option<Token> {
        self.cache.foundational(FoundationalToken::CorLibAssemblyRef)
    }

    /// `System.Object`, if resolved
    pub fn object_type_ref(&self) -> Option<Token> {
        self.cache.foundational(FoundationalToken::ObjectType)
    }

    /// `System.Exception`, if resolved
    pub fn exception_type_ref(&self) -> Option<Token> {
        self.cache.foundational(FoundationalToken::ExceptionType)
    }

    /// `System.Type`, if resolved
    pub fn type_type_ref(&self) -> Option<Token> {
        self.cache.foundational(FoundationalToken::TypeType)
    }

    /// `System.RuntimeTypeHandle`, if resolved
    pub fn runtime_type_handle_ref(&self) -> Option<Token> {
        self.cache.foundational(FoundationalToken::TypeHandleType)
    }

    /// `System.Type::GetTypeFromHandle`, if resolved
    pub fn get_type_from_handle_ref(&self) -> Option<Token> {
        self.cache
            .foundational(FoundationalToken::GetTypeFromHandleMember)
    }

    /// `System.RuntimeMethodHandle`, if resolved
    pub fn runtime_method_handle_ref(&self) -> Option<Token> {
        self.cache.foundational(FoundationalToken::MethodHandleType)
    }

    /// `AssemblyRef` of the instrumentation assembly, if resolved
    pub fn instrumentation_assembly_ref(&self) -> Option<Token> {
        self.cache
            .instrumentation(InstrumentationToken::InstrumentationAssemblyRef)
    }

    /// The invoker type, if resolved
    pub fn call_target_type_ref(&self) -> Option<Token> {
        self.cache
            .instrumentation(InstrumentationToken::CallTargetType)
    }

    /// The call-state type, if resolved
    pub fn state_type_ref(&self) -> Option<Token> {
        self.cache.instrumentation(InstrumentationToken::StateType)
    }

    /// Returns the void return wrapper type, defining it on first use.
    ///
    /// # Errors
    /// Returns an error if the instrumentation tokens or the type ref can not be defined.
    pub fn void_return_type_ref(&mut self) -> Result<Token> {
        self.ensure_instrumentation_tokens()?;
        let assembly = self
            .cache
            .require_instrumentation(InstrumentationToken::InstrumentationAssemblyRef)?;

        self.cache
            .resolve_instrumentation(InstrumentationToken::VoidReturnType, || {
                warn_on_failure(
                    self.store
                        .define_type_ref_by_name(assembly, &self.config.void_return_type),
                    "Void return type ref",
                )
            })
    }

    /// Returns the open generic return wrapper `Return<T>`, defining it on first use.
    ///
    /// # Errors
    /// Returns an error if the instrumentation tokens or the type ref can not be defined.
    pub fn generic_return_type_ref(&mut self) -> Result<Token> {
        self.ensure_instrumentation_tokens()?;
        let assembly = self
            .cache
            .require_instrumentation(InstrumentationToken::InstrumentationAssemblyRef)?;

        self.cache
            .resolve_instrumentation(InstrumentationToken::GenericReturnType, || {
                warn_on_failure(
                    self.store
                        .define_type_ref_by_name(assembly, &self.config.return_type),
                    "Return type ref",
                )
            })
    }

    /// Returns the `State::GetDefault` member ref.
    ///
    /// # Errors
    /// Returns an error if the instrumentation tokens can not be defined.
    pub fn state_default_member_ref(&mut self) -> Result<Token> {
        self.ensure_instrumentation_tokens()?;
        self.cache
            .require_instrumentation(InstrumentationToken::StateGetDefaultMember)
    }

    /// Returns the `VoidReturn::GetDefault` member ref, defining it on first use.
    ///
    /// # Errors
    /// Returns an error if the wrapper type or the member ref can not be defined.
    pub fn void_return_default_member_ref(&mut self) -> Result<Token> {
        let void_return = self.void_return_type_ref()?;

        self.cache.resolve_instrumentation(
            InstrumentationToken::VoidReturnGetDefaultMember,
            || {
                let signature = encode_static_value_getter(void_return)?;
                warn_on_failure(
                    self.store
                        .define_member_ref(void_return, &self.config.get_default, &signature),
                    "Void return GetDefault member ref",
                )
            },
        )
    }

    /// Instantiates the return wrapper over the return type of `return_value`.
    ///
    /// The resulting `TypeSpec` depends on the return type and is not cached here; stores
    /// usually hand out the same token for identical blobs.
    ///
    /// # Errors
    /// Returns an error if the wrapper type or the type spec can not be defined.
    pub fn return_value_type_spec(&mut self, return_value: &impl ArgumentDescriptor) -> Result<Token> {
        let return_type = self.generic_return_type_ref()?;
        let signature = encode_return_type_spec(return_type, return_value.signature())?;
        warn_on_failure(
            self.store.token_from_type_spec(&signature),
            "Return value type spec",
        )
    }

    /// Defines `Return<T>::GetDefault` on an instantiated return wrapper.
    ///
    /// # Errors
    /// Returns [`crate::Error::Unresolved`] if the generic return wrapper was never resolved,
    /// or the error of the metadata store.
    pub fn return_value_default_member_ref(&mut self, type_spec: Token) -> Result<Token> {
        self.ensure_instrumentation_tokens()?;
        let return_type = self
            .cache
            .require_instrumentation(InstrumentationToken::GenericReturnType)
            .inspect_err(|_| {
                log::warn!("Return GetDefault member ref could not be defined, the return type ref is unresolved");
            })?;

        let signature = encode_return_default(return_type)?;
        warn_on_failure(
            self.store
                .define_member_ref(type_spec, &self.config.get_default, &signature),
            "Return GetDefault member ref",
        )
    }

    /// Defines `Return<T>::GetReturnValue` on an instantiated return wrapper.
    ///
    /// # Errors
    /// Returns an error if the instrumentation tokens or the member ref can not be defined.
    pub fn return_value_get_member_ref(&mut self, type_spec: Token) -> Result<Token> {
        self.ensure_instrumentation_tokens()?;
        let signature = encode_return_get_value();
        warn_on_failure(
            self.store
                .define_member_ref(type_spec, &self.config.get_return_value, &signature),
            "Return GetReturnValue member ref",
        )
    }

    /// Instantiates `GetDefaultValue<T>` with the type of `argument`.
    ///
    /// # Errors
    /// Returns an error if the open member or the method spec can not be defined.
    pub fn default_value_method_spec(&mut self, argument: &impl ArgumentDescriptor) -> Result<Token> {
        let member = self.call_shape_member_ref(CallShape::GetDefaultValue)?;
        let instantiation = encode_method_instantiation(&[argument.signature()])?;
        warn_on_failure(
            self.store.define_method_spec(member, &instantiation),
            "GetDefaultValue method spec",
        )
    }

    /// Returns the open generic member of `shape`, defining it on first use.
    ///
    /// Begin, end and log members live on the invoker type. The end members and
    /// `GetDefaultValue` resolve the return wrappers they reference.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidArity`] for a begin arity above
    /// [`MAX_BEGIN_ARITY`], or the error of the metadata store.
    pub fn call_shape_member_ref(&mut self, shape: CallShape) -> Result<Token> {
        if let Some(token) = self.cache.call_shape(shape) {
            return Ok(token);
        }
        if let CallShape::Begin { arity } = shape {
            if arity > MAX_BEGIN_ARITY {
                return Err(Error::InvalidArity(arity));
            }
        }

        self.ensure_instrumentation_tokens()?;
        let invoker = self
            .cache
            .require_instrumentation(InstrumentationToken::CallTargetType)?;
        let state = self
            .cache
            .require_instrumentation(InstrumentationToken::StateType)?;
        let exception = self
            .cache
            .require_foundational(FoundationalToken::ExceptionType)?;

        let (name, signature) = match shape {
            CallShape::Begin { arity } => (
                &self.config.begin_method,
                encode_begin_method(state, arity)?,
            ),
            CallShape::BeginWithArgumentsArray => (
                &self.config.begin_method,
                encode_begin_method_with_arguments(state)?,
            ),
            CallShape::EndVoid => {
                let void_return = self.void_return_type_ref()?;
                (
                    &self.config.end_method,
                    encode_end_method_void(void_return, exception, state)?,
                )
            }
            CallShape::EndReturn => {
                let return_type = self.generic_return_type_ref()?;
                (
                    &self.config.end_method,
                    encode_end_method_return(return_type, exception, state)?,
                )
            }
            CallShape::LogException => (
                &self.config.log_exception,
                encode_log_exception(exception)?,
            ),
            CallShape::GetDefaultValue => {
                (&self.config.get_default_value, encode_get_default_value())
            }
        };

        self.cache.resolve_call_shape(shape, || {
            warn_on_failure(
                self.store.define_member_ref(invoker, name, &signature),
                &format!("{shape:?} member ref"),
            )
        })
    }
}
