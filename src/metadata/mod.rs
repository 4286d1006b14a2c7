//! Metadata building blocks for synthesizing references into a .NET module.
//!
//! This module contains everything below the instrumentation layer: tokens and the tables
//! they point into, assembly identities, the metadata store abstraction that receives new
//! definitions, and the ECMA-335 signature encoders.
//!
//! # Key Components
//!
//! - [`token`] - Metadata table row references used throughout .NET
//! - [`tableid`] - The metadata tables touched while instrumenting
//! - [`identity`] - Assembly identities for `AssemblyRef` definitions
//! - [`emit`] - The [`emit::MetadataStore`] seam and an in-memory implementation
//! - [`signatures`] - Signature writer, parser and call-shape encoders
//!
//! # Examples
//!
//! ```rust
//! use dotinject::metadata::{
//!     emit::{MemoryStore, MetadataStore},
//!     identity::{AssemblyIdentity, AssemblyVersion},
//! };
//!
//! let mut store = MemoryStore::new();
//! let corlib = store.define_assembly_ref(&AssemblyIdentity::new(
//!     "System.Private.CoreLib",
//!     AssemblyVersion::new(8, 0, 0, 0),
//! ))?;
//! let object = store.define_type_ref_by_name(corlib, "System.Object")?;
//! assert_eq!(object.table(), 0x01);
//! # Ok::<(), dotinject::Error>(())
//! ```

/// The metadata store receiving new definitions
pub mod emit;
/// Assembly identities used for assembly references
pub mod identity;
/// Implementation of method and type signatures
pub mod signatures;
/// Identifiers of the metadata tables
pub mod tableid;
/// Commonly used metadata token type
pub mod token;
