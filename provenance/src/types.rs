//! Core value types: identities, digests, resource identifiers and change kinds.
//!
//! Identities and digests are fixed-width byte strings. They parse from hex
//! with an optional `0x` prefix (case-insensitive) and always display as
//! lowercase `0x`-prefixed hex, which is also their serialized form.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// Maximum length of a resource identifier in bytes (one 32-byte slot).
pub const MAX_RESOURCE_ID_LEN: usize = 32;

/// Errors produced while parsing identities, digests and identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Input contained non-hex characters
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    /// Decoded byte length did not match the type width
    #[error("expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Resource identifier was empty
    #[error("resource id must not be empty")]
    EmptyResourceId,

    /// Resource identifier exceeded the slot width
    #[error("resource id is {0} bytes, maximum is {max}", max = MAX_RESOURCE_ID_LEN)]
    ResourceIdTooLong(usize),
}

fn decode_fixed<const N: usize>(input: &str) -> Result<[u8; N], ParseError> {
    let digits = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .unwrap_or(input);

    let bytes = hex::decode(digits).map_err(|_| ParseError::InvalidHex(input.to_string()))?;
    let actual = bytes.len();
    bytes
        .try_into()
        .map_err(|_| ParseError::InvalidLength { expected: N, actual })
}

macro_rules! hex_newtype {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name([u8; $len]);

        impl $name {
            /// Width in bytes.
            pub const LEN: usize = $len;

            /// Wrap raw bytes.
            pub const fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            /// Raw bytes.
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl FromStr for $name {
            type Err = ParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                decode_fixed::<{ $len }>(s.trim()).map(Self)
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_newtype!(
    /// A 20-byte account identity.
    Address,
    20
);

hex_newtype!(
    /// A 32-byte content digest recorded in a change log.
    DataHash,
    32
);

hex_newtype!(
    /// A 32-byte commit handle identifying one accepted call.
    TxHash,
    32
);

impl DataHash {
    /// SHA-256 of a payload.
    ///
    /// Callers are free to supply digests from any 32-byte hash function;
    /// this is only a convenience for producing one.
    pub fn digest(payload: impl AsRef<[u8]>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(payload.as_ref());
        Self(hasher.finalize().into())
    }
}

/// Opaque, caller-chosen identifier of a governed resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId(String);

impl ResourceId {
    /// Validate and wrap an identifier.
    pub fn new(id: impl Into<String>) -> Result<Self, ParseError> {
        let id = id.into();
        if id.is_empty() {
            return Err(ParseError::EmptyResourceId);
        }
        if id.len() > MAX_RESOURCE_ID_LEN {
            return Err(ParseError::ResourceIdTooLong(id.len()));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ResourceId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ResourceId {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ResourceId {
    type Error = ParseError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ResourceId> for String {
    fn from(id: ResourceId) -> Self {
        id.0
    }
}

/// Kind of change recorded against a resource.
///
/// Codes 0, 1 and 2 are the well-known kinds; anything above is a
/// domain-specific kind carried through unchanged. `Custom` with a code
/// below 3 is normalized to the matching well-known kind when deserialized
/// or registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", from = "ChangeTypeRepr")]
pub enum ChangeType {
    Create,
    Update,
    Delete,
    Custom(u8),
}

#[derive(Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum ChangeTypeRepr {
    Create,
    Update,
    Delete,
    Custom(u8),
}

impl From<ChangeTypeRepr> for ChangeType {
    fn from(repr: ChangeTypeRepr) -> Self {
        match repr {
            ChangeTypeRepr::Create => Self::Create,
            ChangeTypeRepr::Update => Self::Update,
            ChangeTypeRepr::Delete => Self::Delete,
            ChangeTypeRepr::Custom(code) => Self::from_code(code),
        }
    }
}

impl ChangeType {
    /// Numeric wire code.
    pub fn code(&self) -> u8 {
        match self {
            Self::Create => 0,
            Self::Update => 1,
            Self::Delete => 2,
            Self::Custom(code) => *code,
        }
    }

    /// Inverse of [`ChangeType::code`].
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Create,
            1 => Self::Update,
            2 => Self::Delete,
            other => Self::Custom(other),
        }
    }

    /// Canonical form: `Custom(0..=2)` becomes the well-known kind.
    pub fn normalized(self) -> Self {
        Self::from_code(self.code())
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => f.write_str("CREATE"),
            Self::Update => f.write_str("UPDATE"),
            Self::Delete => f.write_str("DELETE"),
            Self::Custom(code) => write!(f, "CUSTOM({code})"),
        }
    }
}
