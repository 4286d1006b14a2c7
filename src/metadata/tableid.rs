use strum::{EnumCount, EnumIter};

/// Identifiers for the metadata tables whose rows are created or referenced while
/// synthesizing instrumentation calls.
///
/// The numeric values correspond to the table IDs as defined in the CLI specification and
/// form the high byte of every [`crate::metadata::token::Token`].
///
/// ## Reference
/// * [ECMA-335 Partition II, Section 22](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf) - Metadata Tables
#[derive(Clone, Copy, PartialEq, Debug, EnumIter, EnumCount, Eq, Hash)]
pub enum TableId {
    /// `TypeRef` table (0x01) - References to types defined in external assemblies.
    TypeRef = 0x01,

    /// `TypeDef` table (0x02) - Definitions of types within this module.
    TypeDef = 0x02,

    /// `MethodDef` table (0x06) - Method definitions within types.
    MethodDef = 0x06,

    /// `MemberRef` table (0x0A) - References to methods and fields of other types.
    MemberRef = 0x0A,

    /// `StandAloneSig` table (0x11) - Standalone signatures, local variable signatures included.
    StandAloneSig = 0x11,

    /// `TypeSpec` table (0x1B) - Type specifications such as generic instantiations.
    TypeSpec = 0x1B,

    /// `AssemblyRef` table (0x23) - References to external assemblies.
    AssemblyRef = 0x23,

    /// `MethodSpec` table (0x2B) - Instantiations of generic methods.
    MethodSpec = 0x2B,
}

impl TableId {
    /// Returns the table matching the high byte of a token, if it is one of the known tables.
    #[must_use]
    pub fn from_table_byte(table: u8) -> Option<Self> {
        use strum::IntoEnumIterator;
        TableId::iter().find(|id| *id as u8 == table)
    }

    /// Returns the token value prefix (`table << 24`) of this table.
    #[must_use]
    pub fn token_prefix(self) -> u32 {
        (self as u32) << 24
    }
}
