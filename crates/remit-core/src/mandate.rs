//! Mandate identity and digest computation.
//!
//! A mandate is the full tuple of recurring-payment terms. The tuple itself
//! is the identity: any change to any field yields a different mandate with
//! an independent checkpoint. The digest is computed over a domain-tagged,
//! fixed-order, fixed-width binary encoding so that no shift of bytes
//! between adjacent fields can produce a colliding encoding.
//!
//! ```text
//! digest = SHA256("remit.mandate.v1" || subscriber || recipient || token
//!                 || be64(amount) || be64(period_seconds)
//!                 || be64(execution_fee_price) || be64(nonce))
//! ```

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Domain tag bound into every mandate digest.
pub const MANDATE_DOMAIN_TAG: &[u8] = b"remit.mandate.v1";

/// Identity parse failure for [`Address`] / [`TokenId`] hex strings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected 64 lowercase hex characters")]
pub struct IdParseError;

fn parse_hex_32(s: &str) -> Result<[u8; 32], IdParseError> {
    if s.len() != 64 {
        return Err(IdParseError);
    }
    let mut out = [0u8; 32];
    hex::decode_to_slice(s, &mut out).map_err(|_| IdParseError)?;
    Ok(out)
}

/// Identity of a payer or payee: a 32-byte public-key-derived address.
///
/// For subscribers the address is the ed25519 verifying key itself, so a
/// claimed address can be checked directly against a mandate signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address([u8; 32]);

impl Address {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex_32(s).map(Self)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Identity of the fungible asset a mandate settles in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenId([u8; 32]);

impl TokenId {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for TokenId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex_32(s).map(Self)
    }
}

impl Serialize for TokenId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Structural mandate validation failures.
///
/// These are rejected before any signature or window work.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MandateError {
    #[error("amount must be positive")]
    ZeroAmount,

    #[error("period_seconds must be positive")]
    NonPositivePeriod,

    #[error("{field} exceeds the signed 64-bit storage range")]
    ValueOutOfRange { field: &'static str },
}

/// The recurring-payment authorization a subscriber signs once, offline.
///
/// The tuple `(subscriber, recipient, token, amount, period_seconds,
/// execution_fee_price, nonce)` is the unique mandate identity. `nonce`
/// distinguishes multiple concurrent mandates between the same parties; it
/// is not a sequence counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mandate {
    /// Payer address; must match the key that signed the digest.
    pub subscriber: Address,
    /// Payee address.
    pub recipient: Address,
    /// Asset the payment settles in.
    pub token: TokenId,
    /// Fixed payment per period.
    pub amount: u64,
    /// Minimum seconds between settlements.
    pub period_seconds: i64,
    /// Per-settlement executor reimbursement the subscriber commits to.
    pub execution_fee_price: u64,
    /// Disambiguates otherwise-identical mandates between the same parties.
    pub nonce: u64,
}

impl Mandate {
    /// Structural validation, applied before any verification work.
    ///
    /// Amounts and the nonce must fit the signed 64-bit checkpoint columns.
    pub fn validate(&self) -> Result<(), MandateError> {
        if self.amount == 0 {
            return Err(MandateError::ZeroAmount);
        }
        if self.period_seconds <= 0 {
            return Err(MandateError::NonPositivePeriod);
        }
        if i64::try_from(self.amount).is_err() {
            return Err(MandateError::ValueOutOfRange { field: "amount" });
        }
        if i64::try_from(self.execution_fee_price).is_err() {
            return Err(MandateError::ValueOutOfRange {
                field: "execution_fee_price",
            });
        }
        if i64::try_from(self.nonce).is_err() {
            return Err(MandateError::ValueOutOfRange { field: "nonce" });
        }
        Ok(())
    }

    /// Compute the digest a subscriber signs and the store keys on.
    ///
    /// Pure and deterministic: the same tuple always yields the same digest.
    pub fn digest(&self) -> MandateDigest {
        let mut hasher = Sha256::new();
        hasher.update(MANDATE_DOMAIN_TAG);
        hasher.update(self.subscriber.as_bytes());
        hasher.update(self.recipient.as_bytes());
        hasher.update(self.token.as_bytes());
        hasher.update(self.amount.to_be_bytes());
        hasher.update(self.period_seconds.to_be_bytes());
        hasher.update(self.execution_fee_price.to_be_bytes());
        hasher.update(self.nonce.to_be_bytes());
        MandateDigest(hasher.finalize().into())
    }
}

/// SHA-256 digest of a mandate tuple; the mandate's persistent identity.
///
/// Displayed as `sha256:<lowercase-hex>` (71 characters), which is also the
/// checkpoint store's primary-key form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MandateDigest([u8; 32]);

impl MandateDigest {
    /// The bytes a subscriber signs.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for MandateDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sha256:{}", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(fill: u8) -> Address {
        Address::from_bytes([fill; 32])
    }

    fn test_mandate() -> Mandate {
        Mandate {
            subscriber: addr(0x11),
            recipient: addr(0x22),
            token: TokenId::from_bytes([0x33; 32]),
            amount: 10,
            period_seconds: 2,
            execution_fee_price: 1,
            nonce: 0,
        }
    }

    // === A) Digest determinism and identity ===

    #[test]
    fn test_digest_is_deterministic() {
        let m = test_mandate();
        assert_eq!(m.digest(), m.digest());
        assert_eq!(m.digest().to_string().len(), 71);
        assert!(m.digest().to_string().starts_with("sha256:"));
    }

    #[test]
    fn test_every_field_changes_the_digest() {
        let base = test_mandate();
        let variants = [
            Mandate {
                subscriber: addr(0x12),
                ..base
            },
            Mandate {
                recipient: addr(0x23),
                ..base
            },
            Mandate {
                token: TokenId::from_bytes([0x34; 32]),
                ..base
            },
            Mandate {
                amount: 11,
                ..base
            },
            Mandate {
                period_seconds: 3,
                ..base
            },
            Mandate {
                execution_fee_price: 2,
                ..base
            },
            Mandate { nonce: 1, ..base },
        ];
        for variant in variants {
            assert_ne!(base.digest(), variant.digest(), "{variant:?}");
        }
    }

    #[test]
    fn test_fixed_width_encoding_prevents_field_shift_collisions() {
        // amount=0x0102 / period=0x01 vs amount=0x01 / period=0x0201: a
        // variable-width join of the numeric fields could collide here.
        let a = Mandate {
            amount: 0x0102,
            period_seconds: 0x01,
            ..test_mandate()
        };
        let b = Mandate {
            amount: 0x01,
            period_seconds: 0x0201,
            ..test_mandate()
        };
        assert_ne!(a.digest(), b.digest());
    }

    // === B) Validation ===

    #[test]
    fn test_validate_accepts_reference_terms() {
        assert!(test_mandate().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_amount() {
        let m = Mandate {
            amount: 0,
            ..test_mandate()
        };
        assert_eq!(m.validate(), Err(MandateError::ZeroAmount));
    }

    #[test]
    fn test_validate_rejects_non_positive_period() {
        for period_seconds in [0, -1] {
            let m = Mandate {
                period_seconds,
                ..test_mandate()
            };
            assert_eq!(m.validate(), Err(MandateError::NonPositivePeriod));
        }
    }

    #[test]
    fn test_validate_rejects_unstorable_values() {
        let m = Mandate {
            amount: u64::MAX,
            ..test_mandate()
        };
        assert_eq!(
            m.validate(),
            Err(MandateError::ValueOutOfRange { field: "amount" })
        );

        let m = Mandate {
            nonce: u64::MAX,
            ..test_mandate()
        };
        assert_eq!(
            m.validate(),
            Err(MandateError::ValueOutOfRange { field: "nonce" })
        );
    }

    // === C) Identity serde ===

    #[test]
    fn test_address_hex_roundtrip() {
        let a = addr(0xab);
        let s = a.to_string();
        assert_eq!(s, "ab".repeat(32));
        assert_eq!(s.parse::<Address>().unwrap(), a);
    }

    #[test]
    fn test_address_rejects_bad_hex() {
        assert!("zz".repeat(32).parse::<Address>().is_err());
        assert!("ab".repeat(31).parse::<Address>().is_err());
        assert!("".parse::<Address>().is_err());
    }

    #[test]
    fn test_mandate_json_roundtrip() {
        let m = test_mandate();
        let json = serde_json::to_string(&m).unwrap();
        let back: Mandate = serde_json::from_str(&json).unwrap();
        assert_eq!(m, back);
        // Addresses serialize as plain hex strings.
        assert!(json.contains(&"11".repeat(32)));
    }
}
