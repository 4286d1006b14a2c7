//! The metadata store that receives every definition made while instrumenting a module.
//!
//! [`MetadataStore`] is the seam between the token synthesis and whatever owns the module's
//! metadata tables (a profiler's emit interface, an assembly writer, ...). [`MemoryStore`] is a
//! self-contained implementation that keeps all rows in memory, which is enough for offline
//! rewriting, testing and benchmarking.

use std::collections::HashMap;

use crate::{
    metadata::{identity::AssemblyIdentity, tableid::TableId, token::Token},
    utils::to_u32,
    Error, Result,
};

/// Operations the instrumentation engine needs from a module's metadata.
///
/// All signatures are passed as complete, exactly sized blobs. Implementations return
/// [`Error::Definition`] when they reject a definition; the engine never retries.
pub trait MetadataStore {
    /// Defines an `AssemblyRef` row for `identity`
    ///
    /// # Errors
    /// Returns [`Error::Definition`] if the reference can not be defined.
    fn define_assembly_ref(&mut self, identity: &AssemblyIdentity) -> Result<Token>;

    /// Defines a `TypeRef` named `name` (namespace included) resolved through `scope`
    ///
    /// # Errors
    /// Returns [`Error::Definition`] if the reference can not be defined.
    fn define_type_ref_by_name(&mut self, scope: Token, name: &str) -> Result<Token>;

    /// Defines a `MemberRef` on `parent` with the given method signature
    ///
    /// # Errors
    /// Returns [`Error::Definition`] if the reference can not be defined.
    fn define_member_ref(&mut self, parent: Token, name: &str, signature: &[u8]) -> Result<Token>;

    /// Defines a `MethodSpec` instantiating the generic method `parent`
    ///
    /// # Errors
    /// Returns [`Error::Definition`] if the instantiation can not be defined.
    fn define_method_spec(&mut self, parent: Token, instantiation: &[u8]) -> Result<Token>;

    /// Returns the `StandAloneSig` token for `signature`, defining it if needed
    ///
    /// # Errors
    /// Returns [`Error::Definition`] if the signature can not be defined.
    fn token_from_signature(&mut self, signature: &[u8]) -> Result<Token>;

    /// Returns the `TypeSpec` token for `signature`, defining it if needed
    ///
    /// # Errors
    /// Returns [`Error::Definition`] if the type specification can not be defined.
    fn token_from_type_spec(&mut self, signature: &[u8]) -> Result<Token>;

    /// Returns the blob of a `StandAloneSig` token
    ///
    /// # Errors
    /// Returns [`Error::Definition`] if the token does not name a signature.
    fn signature_from_token(&self, token: Token) -> Result<Vec<u8>>;

    /// Returns the blob of a `TypeSpec` token
    ///
    /// # Errors
    /// Returns [`Error::Definition`] if the token does not name a type specification.
    fn type_spec_from_token(&self, token: Token) -> Result<Vec<u8>>;
}

/// A single row created through [`MemoryStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataRow {
    /// An `AssemblyRef` row
    AssemblyRef(AssemblyIdentity),
    /// A `TypeRef` row
    TypeRef {
        /// Resolution scope
        scope: Token,
        /// Fully qualified name
        name: String,
    },
    /// A `MemberRef` row
    MemberRef {
        /// Declaring type
        parent: Token,
        /// Member name
        name: String,
        /// Method signature blob
        signature: Vec<u8>,
    },
    /// A `MethodSpec` row
    MethodSpec {
        /// The open generic method
        parent: Token,
        /// Instantiation blob
        instantiation: Vec<u8>,
    },
    /// A `StandAloneSig` row
    StandAloneSig(Vec<u8>),
    /// A `TypeSpec` row
    TypeSpec(Vec<u8>),
}

impl MetadataRow {
    fn table(&self) -> TableId {
        match self {
            MetadataRow::AssemblyRef(_) => TableId::AssemblyRef,
            MetadataRow::TypeRef { .. } => TableId::TypeRef,
            MetadataRow::MemberRef { .. } => TableId::MemberRef,
            MetadataRow::MethodSpec { .. } => TableId::MethodSpec,
            MetadataRow::StandAloneSig(_) => TableId::StandAloneSig,
            MetadataRow::TypeSpec(_) => TableId::TypeSpec,
        }
    }
}

/// In-memory [`MetadataStore`].
///
/// Rows are allocated sequentially per table starting at 1. Like the runtime's emit API,
/// `StandAloneSig` and `TypeSpec` blobs are deduplicated, while references are always appended.
/// Every call is counted per operation name, see [`MemoryStore::call_count`].
///
/// # Example
///
/// ```rust
/// use dotinject::metadata::{emit::{MemoryStore, MetadataStore}, token::Token};
///
/// let mut store = MemoryStore::new();
/// let sig = store.token_from_signature(&[0x07, 0x01, 0x08])?;
/// assert_eq!(sig, Token::new(0x1100_0001));
/// assert_eq!(store.token_from_signature(&[0x07, 0x01, 0x08])?, sig);
/// assert_eq!(store.signature_from_token(sig)?, vec![0x07, 0x01, 0x08]);
/// # Ok::<(), dotinject::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: HashMap<TableId, Vec<MetadataRow>>,
    calls: HashMap<&'static str, usize>,
}

impl MemoryStore {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the row named by `token`
    #[must_use]
    pub fn row(&self, token: Token) -> Option<&MetadataRow> {
        let rows = self.tables.get(&token.table_id()?)?;
        let index = usize::try_from(token.row()).ok()?.checked_sub(1)?;
        rows.get(index)
    }

    /// Returns all rows of `table` in allocation order
    #[must_use]
    pub fn rows(&self, table: TableId) -> &[MetadataRow] {
        self.tables.get(&table).map(Vec::as_slice).unwrap_or_default()
    }

    /// Returns how many times the store operation `operation` was invoked
    #[must_use]
    pub fn call_count(&self, operation: &str) -> usize {
        self.calls.get(operation).copied().unwrap_or_default()
    }

    /// Returns the total number of define operations (references and instantiations)
    #[must_use]
    pub fn define_count(&self) -> usize {
        [
            "define_assembly_ref",
            "define_type_ref_by_name",
            "define_member_ref",
            "define_method_spec",
        ]
        .iter()
        .map(|op| self.call_count(op))
        .sum()
    }

    fn record(&mut self, operation: &'static str) {
        *self.calls.entry(operation).or_default() += 1;
    }

    fn push(&mut self, operation: &'static str, row: MetadataRow) -> Result<Token> {
        let table = row.table();
        let rows = self.tables.entry(table).or_default();
        let rid = to_u32(rows.len() + 1)?;
        if rid > 0x00FF_FFFF {
            return Err(Error::definition(operation, format!("{table:?} table is full")));
        }

        rows.push(row);
        Ok(Token::from_parts(table, rid))
    }

    fn find(&self, table: TableId, row: &MetadataRow) -> Result<Option<Token>> {
        match self.rows(table).iter().position(|existing| existing == row) {
            Some(index) => Ok(Some(Token::from_parts(table, to_u32(index + 1)?))),
            None => Ok(None),
        }
    }
}

impl MetadataStore for MemoryStore {
    fn define_assembly_ref(&mut self, identity: &AssemblyIdentity) -> Result<Token> {
        self.record("define_assembly_ref");
        if identity.name.is_empty() {
            return Err(Error::definition(
                "define_assembly_ref",
                "assembly name is empty",
            ));
        }

        self.push(
            "define_assembly_ref",
            MetadataRow::AssemblyRef(identity.to_reference()),
        )
    }

    fn define_type_ref_by_name(&mut self, scope: Token, name: &str) -> Result<Token> {
        self.record("define_type_ref_by_name");
        if scope.is_null() || name.is_empty() {
            return Err(Error::definition(
                "define_type_ref_by_name",
                format!("invalid type reference '{name}' in scope {scope}"),
            ));
        }

        self.push(
            "define_type_ref_by_name",
            MetadataRow::TypeRef {
                scope,
                name: name.to_string(),
            },
        )
    }

    fn define_member_ref(&mut self, parent: Token, name: &str, signature: &[u8]) -> Result<Token> {
        self.record("define_member_ref");
        if parent.is_null() || signature.is_empty() {
            return Err(Error::definition(
                "define_member_ref",
                format!("invalid member reference '{name}' on {parent}"),
            ));
        }

        self.push(
            "define_member_ref",
            MetadataRow::MemberRef {
                parent,
                name: name.to_string(),
                signature: signature.to_vec(),
            },
        )
    }

    fn define_method_spec(&mut self, parent: Token, instantiation: &[u8]) -> Result<Token> {
        self.record("define_method_spec");
        if parent.is_null() || instantiation.is_empty() {
            return Err(Error::definition(
                "define_method_spec",
                format!("invalid instantiation of {parent}"),
            ));
        }

        self.push(
            "define_method_spec",
            MetadataRow::MethodSpec {
                parent,
                instantiation: instantiation.to_vec(),
            },
        )
    }

    fn token_from_signature(&mut self, signature: &[u8]) -> Result<Token> {
        self.record("token_from_signature");
        let row = MetadataRow::StandAloneSig(signature.to_vec());
        match self.find(TableId::StandAloneSig, &row)? {
            Some(token) => Ok(token),
            None => self.push("token_from_signature", row),
        }
    }

    fn token_from_type_spec(&mut self, signature: &[u8]) -> Result<Token> {
        self.record("token_from_type_spec");
        let row = MetadataRow::TypeSpec(signature.to_vec());
        match self.find(TableId::TypeSpec, &row)? {
            Some(token) => Ok(token),
            None => self.push("token_from_type_spec", row),
        }
    }

    fn signature_from_token(&self, token: Token) -> Result<Vec<u8>> {
        match self.row(token) {
            Some(MetadataRow::StandAloneSig(blob)) => Ok(blob.clone()),
            _ => Err(Error::definition(
                "signature_from_token",
                format!("{token} is not a signature"),
            )),
        }
    }

    fn type_spec_from_token(&self, token: Token) -> Result<Vec<u8>> {
        match self.row(token) {
            Some(MetadataRow::TypeSpec(blob)) => Ok(blob.clone()),
            _ => Err(Error::definition(
                "type_spec_from_token",
                format!("{token} is not a type specification"),
            )),
        }
    }
}
