//! Relayed-message identifiers

/// Identifier of a relayed message (32-byte BLAKE3 digest)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub [u8; 32]);

hex_bytes_newtype!(MessageId, 32);

impl MessageId {
    /// Compute the identifier of a message envelope
    pub fn from_data(data: &[u8]) -> Self {
        MessageId(*blake3::hash(data).as_bytes())
    }
}
