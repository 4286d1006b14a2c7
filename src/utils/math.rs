//! Checked integer conversions.

use crate::Result;

/// Converts a `usize` to `u32` for signature serialization, returning an error if the value
/// exceeds `u32::MAX`. Signature counts are bounded well below this limit.
///
/// # Errors
///
/// Returns an error if `value` exceeds `u32::MAX`.
pub fn to_u32(value: usize) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| malformed_error!("Signature value {value} exceeds u32::MAX"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_u32() {
        assert_eq!(to_u32(0).unwrap(), 0);
        assert_eq!(to_u32(7).unwrap(), 7);
        assert_eq!(to_u32(u32::MAX as usize).unwrap(), u32::MAX);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_to_u32_overflow() {
        assert!(to_u32(u32::MAX as usize + 1).is_err());
    }
}
