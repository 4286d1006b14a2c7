//! Shared low-level helpers.
//!
//! - [`compression`] - ECMA-335 compressed integer and compressed token encoding
//! - [`math`] - Checked integer conversions for blob sizes and counts

mod compression;
mod math;

pub use compression::*;
pub use math::*;
