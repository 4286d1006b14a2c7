//! # dotinject Prelude
//!
//! The types needed to instrument a method with a single glob import.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all dotinject operations
pub use crate::Error;

/// The result type used throughout dotinject
pub use crate::Result;

// ================================================================================================
// Metadata
// ================================================================================================

/// Metadata token type for referencing table entries
pub use crate::metadata::token::Token;

/// Metadata tables touched while instrumenting
pub use crate::metadata::tableid::TableId;

/// Assembly identities for assembly references
pub use crate::metadata::identity::{
    AssemblyFlags, AssemblyIdentity, AssemblyVersion, StrongName,
};

/// The metadata store seam and its in-memory implementation
pub use crate::metadata::emit::{MemoryStore, MetadataRow, MetadataStore};

// ================================================================================================
// Signatures
// ================================================================================================

/// Signature building blocks
pub use crate::metadata::signatures::{
    SignatureBlob, SignatureParser, SignatureWriter, CALLING_CONVENTION, ELEMENT_TYPE,
    SIGNATURE_HEADER,
};

/// Call shape encoders
pub use crate::metadata::signatures::{
    encode_begin_method, encode_begin_method_with_arguments, encode_call_target_instantiation,
    encode_end_method_return, encode_end_method_void, encode_log_exception,
    encode_patched_locals, CallReturnLocal,
};

// ================================================================================================
// CallTarget
// ================================================================================================

/// The per-module instrumentation session
pub use crate::calltarget::{CallTargetConfig, CallTargetTokens, LocalSlots};

/// Descriptors of the instrumented method
pub use crate::calltarget::{ArgumentDescriptor, InstanceType, MethodArgument, MethodSignature, TypeFlags};

/// The method body seam
pub use crate::calltarget::{Instruction, InstructionEditor, InstructionList};
