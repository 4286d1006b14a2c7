use thiserror::Error;

use crate::metadata::token::Token;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The variants follow the three failure classes of the instrumentation engine plus the
/// decoding failures that can occur while reading an existing signature blob.
///
/// # Error Categories
///
/// ## Metadata Definition
/// - [`Error::Definition`] - The metadata store rejected a type, member or signature definition
///
/// ## Preconditions
/// - [`Error::Unresolved`] - A cached token was used before its resolution step ran
/// - [`Error::AlreadyModified`] - A method's local signature was already patched
/// - [`Error::InvalidArity`] - More typed begin-call arguments than the fixed helpers cover
/// - [`Error::InvalidToken`] - A token or value that cannot be compressed
///
/// ## Signature Decoding
/// - [`Error::Malformed`] - Corrupted or invalid signature blob
/// - [`Error::OutOfBounds`] - Attempted to read beyond the end of a blob
/// - [`Error::RecursionLimit`] - Nested type descriptor exceeds the parser depth limit
///
/// # Examples
///
/// ```rust
/// use dotinject::{Error, metadata::token::Token};
///
/// fn describe(err: &Error) -> &'static str {
///     match err {
///         Error::AlreadyModified(_) => "method was already instrumented",
///         Error::Definition { .. } => "metadata store rejected a definition",
///         _ => "other failure",
///     }
/// }
///
/// assert_eq!(
///     describe(&Error::AlreadyModified(Token::new(0x1100_0001))),
///     "method was already instrumented"
/// );
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The metadata store rejected a definition.
    ///
    /// Raised by [`crate::metadata::emit::MetadataStore`] implementations when a type
    /// reference, member reference, method instantiation or signature cannot be defined,
    /// for example because of a malformed blob, a conflicting duplicate or resource
    /// exhaustion. It is never retried internally.
    ///
    /// # Fields
    ///
    /// * `operation` - The store operation that failed (e.g. `define_member_ref`)
    /// * `message` - Detailed description supplied by the store
    #[error("Metadata definition failed in {operation}: {message}")]
    Definition {
        /// The store operation which failed
        operation: &'static str,
        /// The message describing the failure
        message: String,
    },

    /// A dependent token was never resolved.
    ///
    /// Occurs when a cached entry is read before the `ensure_*` step that defines it
    /// succeeded. The associated value names the missing entry.
    #[error("Required token has not been resolved - {0}")]
    Unresolved(&'static str),

    /// The local variable signature of this method has already been modified.
    ///
    /// Patching the locals is not idempotent; the associated [`Token`] is the
    /// local signature that is already present and which was left untouched.
    #[error("The local signature {0} has already been modified")]
    AlreadyModified(Token),

    /// The begin-call arity is not covered by the fixed-arity helpers.
    ///
    /// Call sites with more arguments must use the object-array variant.
    #[error("Unsupported begin method arity - {0}")]
    InvalidArity(usize),

    /// The token can not be stored in compressed form.
    ///
    /// Only `TypeDef`, `TypeRef` and `TypeSpec` tokens can be encoded as a
    /// `TypeDefOrRefOrSpecEncoded` coded index.
    #[error("Token can not be compressed - {0}")]
    InvalidToken(Token),

    /// The value exceeds the range of the compressed integer encoding.
    #[error("Value can not be compressed - {0:#x}")]
    InvalidCompressedValue(u32),

    /// The signature blob is damaged and could not be decoded.
    ///
    /// The error includes the source location where the malformation was
    /// detected for debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while decoding a signature.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// Recursion limit reached.
    ///
    /// Nested type descriptors (generic instantiations, arrays, pointers) are walked
    /// recursively; the associated value shows the depth limit that was reached.
    #[error("Reach the maximum recursion level allowed - {0}")]
    RecursionLimit(usize),
}

impl Error {
    /// Creates a [`Error::Definition`] for the given store operation.
    ///
    /// Convenience for [`crate::metadata::emit::MetadataStore`] implementations.
    pub fn definition(operation: &'static str, message: impl Into<String>) -> Self {
        Error::Definition {
            operation,
            message: message.into(),
        }
    }
}
