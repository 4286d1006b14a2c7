//! Signature encoding and decoding for the instrumentation call shapes.
//!
//! Signatures encode type information, method parameters, generic instantiations and local
//! variables in the compact binary format of ECMA-335 II.23.2. This module covers the parts of
//! that format needed to synthesize calls into an instrumentation API:
//!
//! - [`SignatureWriter`] - builds exactly sized [`SignatureBlob`]s
//! - [`SignatureParser`] - walks existing blobs (locals, method signatures, instantiations)
//! - the `encode_*` functions - one encoder per fixed call shape
//!
//! # Binary Format
//!
//! - Calling conventions and element types are single bytes
//! - Counts use compressed integers (1, 2 or 4 bytes)
//! - Type references are compressed `TypeDefOrRefOrSpecEncoded` tokens
//! - Generic parameters are encoded by position (`VAR n` / `MVAR n`)
//!
//! # Examples
//!
//! ```rust
//! use dotinject::metadata::{signatures::{encode_begin_method, SignatureParser}, token::Token};
//!
//! // BeginMethod<TIntegration, TTarget, TArg1>(TTarget, TArg1)
//! let blob = encode_begin_method(Token::new(0x0100_0008), 1)?;
//! let method = SignatureParser::new(&blob).parse_method_signature()?;
//! assert_eq!(method.generic_param_count, 3);
//! assert_eq!(method.params.len(), 2);
//! # Ok::<(), dotinject::Error>(())
//! ```
//!
//! # References
//! - [ECMA-335 Partition II, Section 23.2](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf) - Blobs and signatures

mod encoders;
mod parser;
mod types;
mod writer;

pub use encoders::*;
pub use parser::*;
pub use types::*;
pub use writer::*;
