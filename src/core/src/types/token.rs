//! Token identifiers and amounts

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// Token amount in base units (18 decimals)
pub type Amount = u128;

/// Number of decimals of the staking token
pub const TOKEN_DECIMALS: u32 = 18;

/// One whole token in base units
pub const ONE_TOKEN: Amount = 1_000_000_000_000_000_000;

/// Identifier of the fungible asset used for stake and rewards
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenId(pub String);

impl TokenId {
    /// Create a new token id
    pub fn new<S: Into<String>>(id: S) -> Self {
        TokenId(id.into())
    }

    /// Get the token id as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TokenId {
    fn default() -> Self {
        TokenId("MCT".to_string())
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TokenId {
    fn from(s: &str) -> Self {
        TokenId(s.to_string())
    }
}

/// Render a base-unit amount as a decimal token string (`1.5`, `0.00002`)
pub fn format_amount(amount: Amount) -> String {
    let whole = amount / ONE_TOKEN;
    let frac = amount % ONE_TOKEN;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{:018}", frac);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

/// Parse a decimal token string (`"100"`, `"0.001"`) into base units
pub fn parse_amount(input: &str) -> Result<Amount, CoreError> {
    let input = input.trim();
    let (whole, frac) = match input.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (input, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(CoreError::invalid(format!("empty amount: {:?}", input)));
    }
    if frac.len() > TOKEN_DECIMALS as usize {
        return Err(CoreError::invalid(format!(
            "amount {} has more than {} decimals",
            input, TOKEN_DECIMALS
        )));
    }
    let digits = |part: &str| -> Result<Amount, CoreError> {
        if part.is_empty() {
            return Ok(0);
        }
        if !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CoreError::invalid(format!("invalid amount: {:?}", input)));
        }
        part.parse::<Amount>()
            .map_err(|e| CoreError::invalid(format!("invalid amount {:?}: {}", input, e)))
    };
    let scale = 10u128.pow(TOKEN_DECIMALS - frac.len() as u32);
    let fraction = digits(frac)? * scale;
    digits(whole)?
        .checked_mul(ONE_TOKEN)
        .and_then(|w| w.checked_add(fraction))
        .ok_or_else(|| CoreError::invalid(format!("amount out of range: {}", input)))
}

/// Serde adapter for amounts.
///
/// Human-readable formats (TOML, JSON-RPC) carry a decimal token string and
/// also accept a bare integer in base units. Binary formats keep the raw
/// `u128`, so stored records are unaffected.
pub mod serde_amount {
    use super::{format_amount, parse_amount, Amount};
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(amount: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&format_amount(*amount))
        } else {
            serializer.serialize_u128(*amount)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
        struct AmountVisitor;

        impl<'de> Visitor<'de> for AmountVisitor {
            type Value = Amount;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a decimal token string or an integer amount in base units")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Amount, E> {
                parse_amount(v).map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Amount, E> {
                Ok(v as Amount)
            }

            fn visit_u128<E: de::Error>(self, v: u128) -> Result<Amount, E> {
                Ok(v)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Amount, E> {
                u128::try_from(v).map_err(|_| E::custom("amount must not be negative"))
            }
        }

        if deserializer.is_human_readable() {
            deserializer.deserialize_any(AmountVisitor)
        } else {
            deserializer.deserialize_u128(AmountVisitor)
        }
    }
}
