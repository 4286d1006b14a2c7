//! CallTarget instrumentation: token synthesis, local patching and call emission.
//!
//! This module turns a method body into an instrumented one by injecting calls into an
//! external instrumentation API. All references that API needs (types, members, generic
//! instantiations, extra locals) are defined on demand in the module's metadata through a
//! [`crate::metadata::emit::MetadataStore`], and cached per module so that each one is defined
//! exactly once.
//!
//! # Key Components
//!
//! - [`CallTargetTokens`] - Per-module session: token resolution, locals patching, emission
//! - [`ModuleTokenCache`] - Once-set storage of every resolved token
//! - [`CallTargetConfig`] - Names and identity of the instrumentation API
//! - [`ArgumentDescriptor`] / [`MethodArgument`] - Argument and return type descriptors
//! - [`InstanceType`] - The type declaring the instrumented method
//! - [`InstructionEditor`] / [`InstructionList`] - The seam into the method body
//!
//! # Instrumenting a Method
//!
//! ```rust
//! use dotinject::calltarget::{
//!     CallTargetTokens, InstanceType, InstructionEditor, InstructionList, MethodArgument,
//! };
//! use dotinject::metadata::{
//!     emit::MemoryStore,
//!     identity::{AssemblyIdentity, AssemblyVersion},
//!     token::Token,
//! };
//!
//! let corlib = AssemblyIdentity::new("System.Runtime", AssemblyVersion::new(8, 0, 0, 0));
//! let mut tokens = CallTargetTokens::new(MemoryStore::new(), corlib);
//! let mut body = InstructionList::new(Token::NIL);
//!
//! let integration = Token::new(0x0200_0010);
//! let instance = InstanceType::new(Token::new(0x0200_0004));
//!
//! // Locals first, then the begin call storing into the state local
//! let (slots, _) = tokens.modify_local_sig_and_initialize(&mut body, &MethodArgument::void())?;
//! tokens.write_begin_method::<_, MethodArgument>(&mut body, integration, &instance, &[])?;
//! body.store_local(slots.state);
//!
//! assert_eq!(slots.return_value, None);
//! assert_eq!(body.len(), 6);
//! # Ok::<(), dotinject::Error>(())
//! ```
//!
//! # Thread Safety
//!
//! A [`CallTargetTokens`] is owned by the rewriting session of one module and used through
//! `&mut self`. Different modules can be rewritten in parallel with one session each.

mod arguments;
mod cache;
mod config;
mod emitter;
mod locals;
mod rewriter;
mod tokens;

pub use arguments::{ArgumentDescriptor, InstanceType, MethodArgument, MethodSignature, TypeFlags};
pub use cache::{CallShape, FoundationalToken, InstrumentationToken, ModuleTokenCache};
pub use config::CallTargetConfig;
pub use locals::LocalSlots;
pub use rewriter::{Instruction, InstructionEditor, InstructionList};
pub use tokens::{CallTargetTokens, MAX_BEGIN_ARITY};
