//! Account identifiers and identity key material

/// Account identifier (20-byte address, rendered as `0x`-prefixed hex)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountId(pub [u8; 20]);

hex_bytes_newtype!(AccountId, 20);

impl AccountId {
    /// Derive a deterministic account id from a label.
    ///
    /// Used for well-known system accounts (custody, governance) in
    /// configuration defaults and in tests.
    pub fn from_label(label: &str) -> Self {
        let hash = blake3::hash(label.as_bytes());
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&hash.as_bytes()[..20]);
        AccountId(bytes)
    }
}

/// Opaque 32-byte public key registered for an identity
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey(pub [u8; 32]);

hex_bytes_newtype!(PublicKey, 32);
