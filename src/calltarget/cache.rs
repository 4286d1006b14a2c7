//! Per-module cache of resolved instrumentation tokens.
//!
//! Every entry starts unset and is set at most once; entries are never reset while the
//! cache lives. One [`ModuleTokenCache`] belongs to the rewriting session of one module and
//! is dropped with it.

use std::collections::HashMap;

use strum::{EnumCount, EnumIter, IntoStaticStr};

use crate::{metadata::token::Token, Error, Result};

/// Core library references every injected call may depend on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount, IntoStaticStr)]
pub enum FoundationalToken {
    /// `AssemblyRef` of the core library
    CorLibAssemblyRef,
    /// `System.Object`
    ObjectType,
    /// `System.Exception`
    ExceptionType,
    /// `System.Type`
    TypeType,
    /// `System.RuntimeTypeHandle`
    TypeHandleType,
    /// `System.Type::GetTypeFromHandle`
    GetTypeFromHandleMember,
    /// `System.RuntimeMethodHandle`
    MethodHandleType,
}

/// References into the instrumentation assembly that do not depend on a call site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount, IntoStaticStr)]
pub enum InstrumentationToken {
    /// `AssemblyRef` of the instrumentation assembly
    InstrumentationAssemblyRef,
    /// The invoker type hosting begin/end/log
    CallTargetType,
    /// The call-state value type
    StateType,
    /// `State::GetDefault`
    StateGetDefaultMember,
    /// The return wrapper of void methods
    VoidReturnType,
    /// The generic return wrapper `Return<T>`
    GenericReturnType,
    /// `VoidReturn::GetDefault`
    VoidReturnGetDefaultMember,
}

/// Open generic call members, resolved once per shape and module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallShape {
    /// Begin with `arity` typed arguments (0-6)
    Begin {
        /// Number of typed arguments
        arity: usize,
    },
    /// Begin with all arguments boxed in an `object[]`
    BeginWithArgumentsArray,
    /// End of a method without return value
    EndVoid,
    /// End of a method with return value
    EndReturn,
    /// Exception logging
    LogException,
    /// The `GetDefaultValue<T>` helper
    GetDefaultValue,
}

/// Enum-keyed storage of once-set tokens.
///
/// # Example
///
/// ```rust
/// use dotinject::calltarget::{FoundationalToken, ModuleTokenCache};
/// use dotinject::metadata::token::Token;
///
/// let mut cache = ModuleTokenCache::new();
/// assert_eq!(cache.foundational(FoundationalToken::ObjectType), None);
///
/// let token = cache.resolve_foundational(FoundationalToken::ObjectType, || Ok(Token::new(0x0100_0001)))?;
/// assert_eq!(cache.foundational(FoundationalToken::ObjectType), Some(token));
/// # Ok::<(), dotinject::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct ModuleTokenCache {
    foundational: [Option<Token>; FoundationalToken::COUNT],
    instrumentation: [Option<Token>; InstrumentationToken::COUNT],
    call_shapes: HashMap<CallShape, Token>,
}

impl ModuleTokenCache {
    /// Creates an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the resolved foundational token, never resolving
    #[must_use]
    pub fn foundational(&self, key: FoundationalToken) -> Option<Token> {
        self.foundational[key as usize]
    }

    /// Returns the resolved instrumentation token, never resolving
    #[must_use]
    pub fn instrumentation(&self, key: InstrumentationToken) -> Option<Token> {
        self.instrumentation[key as usize]
    }

    /// Returns the resolved open member of a call shape, never resolving
    #[must_use]
    pub fn call_shape(&self, shape: CallShape) -> Option<Token> {
        self.call_shapes.get(&shape).copied()
    }

    /// Returns the foundational token, or [`Error::Unresolved`] naming the missing entry
    ///
    /// # Errors
    /// Returns [`Error::Unresolved`] if the entry was never resolved.
    pub fn require_foundational(&self, key: FoundationalToken) -> Result<Token> {
        self.foundational(key)
            .ok_or_else(|| Error::Unresolved(key.into()))
    }

    /// Returns the instrumentation token, or [`Error::Unresolved`] naming the missing entry
    ///
    /// # Errors
    /// Returns [`Error::Unresolved`] if the entry was never resolved.
    pub fn require_instrumentation(&self, key: InstrumentationToken) -> Result<Token> {
        self.instrumentation(key)
            .ok_or_else(|| Error::Unresolved(key.into()))
    }

    /// Returns the cached foundational token, or runs `define` once and caches its result.
    ///
    /// A failing `define` leaves the entry unset.
    ///
    /// # Errors
    /// Returns the error of `define`.
    pub fn resolve_foundational<F>(&mut self, key: FoundationalToken, define: F) -> Result<Token>
    where
        F: FnOnce() -> Result<Token>,
    {
        resolve_slot(&mut self.foundational[key as usize], key.into(), define)
    }

    /// Returns the cached instrumentation token, or runs `define` once and caches its result.
    ///
    /// # Errors
    /// Returns the error of `define`.
    pub fn resolve_instrumentation<F>(
        &mut self,
        key: InstrumentationToken,
        define: F,
    ) -> Result<Token>
    where
        F: FnOnce() -> Result<Token>,
    {
        resolve_slot(&mut self.instrumentation[key as usize], key.into(), define)
    }

    /// Returns the cached open member of `shape`, or runs `define` once and caches its result.
    ///
    /// # Errors
    /// Returns the error of `define`.
    pub fn resolve_call_shape<F>(&mut self, shape: CallShape, define: F) -> Result<Token>
    where
        F: FnOnce() -> Result<Token>,
    {
        if let Some(token) = self.call_shapes.get(&shape) {
            return Ok(*token);
        }

        let token = define()?;
        log::debug!("resolved {shape:?} member {token}");
        self.call_shapes.insert(shape, token);
        Ok(token)
    }
}

fn resolve_slot<F>(slot: &mut Option<Token>, name: &'static str, define: F) -> Result<Token>
where
    F: FnOnce() -> Result<Token>,
{
    if let Some(token) = slot {
        return Ok(*token);
    }

    let token = define()?;
    log::debug!("resolved {name} {token}");
    *slot = Some(token);
    Ok(token)
}
