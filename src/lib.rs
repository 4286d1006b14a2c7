// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # dotinject
//!
//! Metadata token and signature synthesis for injecting CallTarget instrumentation into
//! .NET method bodies.
//!
//! A CallTarget-instrumented method calls into an external instrumentation API at its entry,
//! at its exit and when it throws. Every such call needs references the module usually does
//! not have: an `AssemblyRef` to the instrumentation assembly, type and member references into
//! it, generic method instantiations per call site and extra locals to carry the call state.
//! `dotinject` defines all of them through a pluggable metadata store, caches them per module
//! and splices the calls through a pluggable instruction editor.
//!
//! ## Features
//!
//! - **Exact signatures** - Every signature blob is sized exactly before it is written
//! - **Once-per-module definitions** - Type and member references are resolved once and cached
//! - **Append-only locals** - Original locals keep their descriptors and indices
//! - **Pluggable seams** - [`metadata::emit::MetadataStore`] and
//!   [`calltarget::InstructionEditor`] connect to a profiler or an assembly writer
//!
//! ## Quick Start
//!
//! ```rust
//! use dotinject::prelude::*;
//!
//! let corlib = AssemblyIdentity::new("System.Private.CoreLib", AssemblyVersion::new(8, 0, 0, 0))
//!     .with_public_key_token([0x7c, 0xec, 0x85, 0xd7, 0xbe, 0xa7, 0x79, 0x8e]);
//! let mut tokens = CallTargetTokens::new(MemoryStore::new(), corlib);
//! let mut body = InstructionList::new(Token::NIL);
//!
//! let int32 = MethodArgument::parse(&[0x08])?;
//! let (slots, _) = tokens.modify_local_sig_and_initialize(&mut body, &int32)?;
//! assert_eq!(slots.return_value, Some(0));
//! assert_eq!(slots.state, 3);
//! # Ok::<(), dotinject::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`metadata`] - Tokens, assembly identities, the metadata store and the signature codec
//! - [`calltarget`] - Token resolution, local patching and call emission
//!
//! ## Logging
//!
//! Failed definitions are reported through the [`log`] facade at `warn` level and first-time
//! resolutions at `debug` level. The library never installs a logger.
//!
//! ## Standards Compliance
//!
//! Signatures follow **ECMA-335 6th Edition**, Partition II, Section 23.2.

#[macro_use]
pub(crate) mod error;
pub(crate) mod utils;

/// Shared functionality which is used in unit- and integration-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use dotinject::prelude::*;
///
/// let blob = encode_log_exception(Token::new(0x0100_0002))?;
/// assert_eq!(blob.as_bytes(), &[0x10, 0x02, 0x01, 0x01, 0x12, 0x09]);
/// # Ok::<(), dotinject::Error>(())
/// ```
pub mod prelude;

/// Metadata tokens, identities, the metadata store and ECMA-335 signatures
pub mod metadata;

/// CallTarget token synthesis, local patching and call emission
pub mod calltarget;

/// `dotinject` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
///
/// # Examples
///
/// ```rust
/// use dotinject::{metadata::signatures::SignatureParser, Result};
///
/// fn local_count(blob: &[u8]) -> Result<u32> {
///     SignatureParser::new(blob).parse_local_var_header()
/// }
///
/// assert_eq!(local_count(&[0x07, 0x02, 0x08, 0x0E]).unwrap(), 2);
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// `dotinject` Error type
///
/// # Examples
///
/// ```rust
/// use dotinject::{metadata::signatures::encode_log_exception, metadata::token::Token, Error};
///
/// match encode_log_exception(Token::new(0x0600_0001)) {
///     Err(Error::InvalidToken(token)) => println!("not a type: {token}"),
///     Err(e) => println!("Error: {e}"),
///     Ok(blob) => println!("{blob:?}"),
/// }
/// ```
pub use error::Error;
