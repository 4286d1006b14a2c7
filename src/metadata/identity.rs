//! Assembly identities used when defining assembly references.
//!
//! Injected calls reference two external assemblies: the core library of the module being
//! rewritten (`System.Object`, `System.Exception`, ...) and the assembly hosting the
//! instrumentation API. Both are described by an [`AssemblyIdentity`], which carries exactly the
//! information an `AssemblyRef` row needs (II.22.5).
//!
//! # Example
//! ```rust
//! use dotinject::metadata::identity::AssemblyIdentity;
//!
//! let corlib = AssemblyIdentity::parse(
//!     "mscorlib, Version=4.0.0.0, Culture=neutral, PublicKeyToken=b77a5c561934e089",
//! )?;
//! assert!(corlib.is_culture_neutral());
//! assert_eq!(corlib.public_key_or_token(), &[0xb7, 0x7a, 0x5c, 0x56, 0x19, 0x34, 0xe0, 0x89]);
//! # Ok::<(), dotinject::Error>(())
//! ```

use std::{fmt, fmt::Write, str::FromStr};

use sha1::{Digest, Sha1};

use crate::{Error, Result};

#[allow(non_snake_case)]
/// All possible flags for `AssemblyFlags`
pub mod AssemblyFlags {
    /// The assembly reference holds the full (unhashed) public key
    pub const PUBLIC_KEY: u32 = 0x0001;
}

/// The strong name of an assembly: either the full public key or its 8-byte token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrongName {
    /// The full RSA public-key
    PubKey(Vec<u8>),
    /// The public key token, in display order
    Token([u8; 8]),
}

impl StrongName {
    /// Returns the public key token.
    ///
    /// For a full key this is the last 8 bytes of its SHA1 hash in reverse order (II.6.2.1.3).
    #[must_use]
    pub fn to_token(&self) -> [u8; 8] {
        match self {
            StrongName::PubKey(key) => {
                let digest = Sha1::digest(key);
                let mut token = [0u8; 8];
                for (dst, src) in token.iter_mut().zip(digest.iter().rev()) {
                    *dst = *src;
                }
                token
            }
            StrongName::Token(token) => *token,
        }
    }

    /// Returns the bytes stored in the `PublicKeyOrToken` column
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            StrongName::PubKey(key) => key,
            StrongName::Token(token) => token,
        }
    }
}

/// Four-part version numbering for .NET assemblies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AssemblyVersion {
    /// Major version component
    pub major: u16,
    /// Minor version component
    pub minor: u16,
    /// Build version component
    pub build: u16,
    /// Revision version component
    pub revision: u16,
}

impl AssemblyVersion {
    /// Create a new version from its four components
    #[must_use]
    pub const fn new(major: u16, minor: u16, build: u16, revision: u16) -> Self {
        Self {
            major,
            minor,
            build,
            revision,
        }
    }

    /// Parse a version string such as `"4.0.0.0"` or `"2.1"`; missing components are zero.
    ///
    /// # Errors
    /// Returns an error if the version string has an invalid format.
    pub fn parse(version_str: &str) -> Result<Self> {
        let parts: Vec<&str> = version_str.split('.').collect();

        if parts.is_empty() || parts.len() > 4 {
            return Err(malformed_error!("Invalid version format: {}", version_str));
        }

        let mut components = [0u16; 4];
        for (i, part) in parts.iter().enumerate() {
            components[i] = part
                .parse::<u16>()
                .map_err(|_| malformed_error!("Invalid version component: {}", part))?;
        }

        Ok(Self::new(
            components[0],
            components[1],
            components[2],
            components[3],
        ))
    }
}

/// Everything needed to define an `AssemblyRef` to an assembly.
///
/// Culture `None` is the neutral culture. A strong name whose bytes are all zero is treated as
/// absent, and is emitted with length 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyIdentity {
    /// Simple assembly name (e.g., "mscorlib", "System.Private.CoreLib")
    pub name: String,
    /// Four-part version number
    pub version: AssemblyVersion,
    /// Culture of a satellite assembly, `None` for culture-neutral assemblies
    pub culture: Option<String>,
    /// Public key or public key token
    pub strong_name: Option<StrongName>,
    /// The `AssemblyFlags` of the reference
    pub flags: u32,
}

impl AssemblyIdentity {
    /// Creates a culture-neutral identity without a strong name
    #[must_use]
    pub fn new(name: impl Into<String>, version: AssemblyVersion) -> Self {
        AssemblyIdentity {
            name: name.into(),
            version,
            culture: None,
            strong_name: None,
            flags: 0,
        }
    }

    /// Sets the culture. `"neutral"` and `""` both select the neutral culture.
    #[must_use]
    pub fn with_culture(mut self, culture: &str) -> Self {
        self.culture = if culture.is_empty() || culture.eq_ignore_ascii_case("neutral") {
            None
        } else {
            Some(culture.to_string())
        };
        self
    }

    /// Sets the public key token
    #[must_use]
    pub fn with_public_key_token(mut self, token: [u8; 8]) -> Self {
        self.strong_name = Some(StrongName::Token(token));
        self.flags &= !AssemblyFlags::PUBLIC_KEY;
        self
    }

    /// Sets the full public key; the reference is flagged with `PUBLIC_KEY`
    #[must_use]
    pub fn with_public_key(mut self, key: Vec<u8>) -> Self {
        self.strong_name = Some(StrongName::PubKey(key));
        self.flags |= AssemblyFlags::PUBLIC_KEY;
        self
    }

    /// Parse an assembly display name such as
    /// `"Datadog.Trace, Version=1.0.0.0, Culture=neutral, PublicKeyToken=def86d061d0d2eeb"`.
    ///
    /// # Errors
    /// Returns an error if the display name cannot be parsed.
    pub fn parse(display_name: &str) -> Result<Self> {
        let parts: Vec<&str> = display_name.split(',').map(str::trim).collect();

        let name = parts.first().copied().unwrap_or_default();
        if name.is_empty() {
            return Err(malformed_error!("Assembly name cannot be empty"));
        }

        let mut identity = AssemblyIdentity::new(name, AssemblyVersion::default());
        for part in parts.iter().skip(1) {
            if let Some(value) = part.strip_prefix("Version=") {
                identity.version = AssemblyVersion::parse(value)?;
            } else if let Some(value) = part.strip_prefix("Culture=") {
                identity = identity.with_culture(value);
            } else if let Some(value) = part.strip_prefix("PublicKeyToken=") {
                if value != "null" && !value.is_empty() {
                    identity = identity.with_public_key_token(parse_token(value)?);
                }
            }
        }

        Ok(identity)
    }

    /// Returns `true` if this identity has no culture
    #[must_use]
    pub fn is_culture_neutral(&self) -> bool {
        self.culture.is_none()
    }

    /// Returns the culture as stored in the `AssemblyRef` row, empty when neutral
    #[must_use]
    pub fn culture_name(&self) -> &str {
        self.culture.as_deref().unwrap_or_default()
    }

    /// Returns the `PublicKeyOrToken` bytes of the reference, empty without a usable strong name
    #[must_use]
    pub fn public_key_or_token(&self) -> &[u8] {
        match &self.strong_name {
            Some(strong_name) if strong_name.as_bytes().iter().any(|b| *b != 0) => {
                strong_name.as_bytes()
            }
            _ => &[],
        }
    }

    /// Returns the identity as written into an `AssemblyRef` row.
    ///
    /// A full public key is replaced by its token and the `PUBLIC_KEY` flag is cleared, so
    /// references to the same assembly compare equal however its key was supplied.
    #[must_use]
    pub fn to_reference(&self) -> AssemblyIdentity {
        match &self.strong_name {
            Some(key @ StrongName::PubKey(_)) => self.clone().with_public_key_token(key.to_token()),
            _ => self.clone(),
        }
    }

    /// Generate the display name of this identity
    #[must_use]
    pub fn display_name(&self) -> String {
        let mut result = String::with_capacity(self.name.len() + 80);

        result.push_str(&self.name);
        let _ = write!(result, ", Version={}", self.version);
        let _ = write!(
            result,
            ", Culture={}",
            self.culture.as_deref().unwrap_or("neutral")
        );

        result.push_str(", PublicKeyToken=");
        if self.public_key_or_token().is_empty() {
            result.push_str("null");
        } else if let Some(strong_name) = &self.strong_name {
            for byte in strong_name.to_token() {
                let _ = write!(result, "{byte:02x}");
            }
        }

        result
    }
}

fn parse_token(value: &str) -> Result<[u8; 8]> {
    if value.len() != 16 || !value.is_ascii() {
        return Err(malformed_error!(
            "PublicKeyToken must be exactly 8 bytes (16 hex characters), got '{}'",
            value
        ));
    }

    let mut token = [0u8; 8];
    for (i, byte) in token.iter_mut().enumerate() {
        let pair = &value[i * 2..i * 2 + 2];
        *byte = u8::from_str_radix(pair, 16)
            .map_err(|e| malformed_error!("Invalid hex in PublicKeyToken '{}': {}", value, e))?;
    }

    Ok(token)
}

impl fmt::Display for AssemblyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

impl fmt::Display for AssemblyIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for AssemblyVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl FromStr for AssemblyIdentity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parse() -> Result<()> {
        assert_eq!(
            AssemblyVersion::parse("1.2.3.4")?,
            AssemblyVersion::new(1, 2, 3, 4)
        );
        assert_eq!(AssemblyVersion::parse("2.1")?, AssemblyVersion::new(2, 1, 0, 0));
        assert!(AssemblyVersion::parse("1.2.3.4.5").is_err());
        assert!(AssemblyVersion::parse("1.x").is_err());
        Ok(())
    }

    #[test]
    fn test_identity_parse_and_display() -> Result<()> {
        let display = "Datadog.Trace, Version=1.0.0.0, Culture=neutral, PublicKeyToken=def86d061d0d2eeb";
        let identity: AssemblyIdentity = display.parse()?;

        assert_eq!(identity.name, "Datadog.Trace");
        assert_eq!(identity.version, AssemblyVersion::new(1, 0, 0, 0));
        assert!(identity.is_culture_neutral());
        assert_eq!(identity.culture_name(), "");
        assert_eq!(
            identity.public_key_or_token(),
            &[0xde, 0xf8, 0x6d, 0x06, 0x1d, 0x0d, 0x2e, 0xeb]
        );
        assert_eq!(identity.flags & AssemblyFlags::PUBLIC_KEY, 0);
        assert_eq!(identity.to_string(), display);
        Ok(())
    }

    #[test]
    fn test_identity_parse_invalid_token() {
        assert!(AssemblyIdentity::parse("A, PublicKeyToken=abc").is_err());
        assert!(AssemblyIdentity::parse("A, PublicKeyToken=zzf86d061d0d2eeb").is_err());
        assert!(AssemblyIdentity::parse(", Version=1.0.0.0").is_err());
    }

    #[test]
    fn test_identity_culture() {
        let identity = AssemblyIdentity::new("A", AssemblyVersion::default()).with_culture("de-DE");
        assert_eq!(identity.culture_name(), "de-DE");
        assert!(identity.with_culture("neutral").is_culture_neutral());
    }

    #[test]
    fn test_zero_token_is_no_key() {
        let identity = AssemblyIdentity::new("A", AssemblyVersion::default())
            .with_public_key_token([0; 8]);
        assert!(identity.public_key_or_token().is_empty());
        assert!(identity.display_name().ends_with("PublicKeyToken=null"));
    }

    #[test]
    fn test_public_key_token_from_key() {
        // The ECMA standard key hashes to the well known mscorlib token
        let ecma_key = vec![0, 0, 0, 0, 0, 0, 0, 0, 4, 0, 0, 0, 0, 0, 0, 0];
        let identity = AssemblyIdentity::new("mscorlib", AssemblyVersion::new(4, 0, 0, 0))
            .with_public_key(ecma_key.clone());

        assert_eq!(identity.public_key_or_token(), ecma_key.as_slice());
        assert_eq!(identity.flags & AssemblyFlags::PUBLIC_KEY, AssemblyFlags::PUBLIC_KEY);
        assert_eq!(
            identity.display_name(),
            "mscorlib, Version=4.0.0.0, Culture=neutral, PublicKeyToken=b77a5c561934e089"
        );

        let reference = identity.to_reference();
        assert_eq!(
            reference.public_key_or_token(),
            &[0xb7, 0x7a, 0x5c, 0x56, 0x19, 0x34, 0xe0, 0x89]
        );
        assert_eq!(reference.flags & AssemblyFlags::PUBLIC_KEY, 0);
        assert_eq!(reference.display_name(), identity.display_name());
    }

    #[test]
    fn test_reference_keeps_token() -> Result<()> {
        let identity = AssemblyIdentity::parse(
            "Datadog.Trace, Version=1.0.0.0, Culture=neutral, PublicKeyToken=def86d061d0d2eeb",
        )?;
        assert_eq!(identity.to_reference(), identity);
        Ok(())
    }
}
