//! Shared types for the RelayNet ledger

/// Implements hex parsing, display and string-based serde for a fixed-size
/// byte newtype.
macro_rules! hex_bytes_newtype {
    ($name:ident, $len:expr) => {
        impl $name {
            /// Number of bytes in the identifier
            pub const LEN: usize = $len;

            /// Create from raw bytes
            pub fn new(bytes: [u8; $len]) -> Self {
                $name(bytes)
            }

            /// Create from a slice, checking the length
            pub fn from_slice(slice: &[u8]) -> $crate::error::Result<Self> {
                if slice.len() != $len {
                    return Err($crate::error::CoreError::InvalidLength {
                        kind: stringify!($name),
                        expected: $len,
                        actual: slice.len(),
                    });
                }
                let mut bytes = [0u8; $len];
                bytes.copy_from_slice(slice);
                Ok($name(bytes))
            }

            /// Parse from hex, with or without a `0x` prefix
            pub fn from_hex(s: &str) -> $crate::error::Result<Self> {
                let trimmed = s.strip_prefix("0x").unwrap_or(s);
                let bytes = hex::decode(trimmed)?;
                Self::from_slice(&bytes)
            }

            /// Get the raw bytes
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Convert to a `0x`-prefixed hex string
            pub fn to_hex(&self) -> String {
                format!("0x{}", hex::encode(self.0))
            }

            /// True when every byte is zero
            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::error::CoreError;

            fn from_str(s: &str) -> $crate::error::Result<Self> {
                Self::from_hex(s)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::from_hex(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

pub mod account;
pub mod message;
pub mod token;
pub mod time;

// Re-export commonly used types
pub use account::{AccountId, PublicKey};
pub use message::MessageId;
pub use token::{format_amount, parse_amount, serde_amount, Amount, TokenId, ONE_TOKEN};
pub use time::{day_index, day_start, Timestamp, SECONDS_PER_DAY};
