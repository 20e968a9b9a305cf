//! Deferred foreign-key links.

use derive_more::Display;
use std::str::FromStr;

/// What a deferred link points at.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkKind {
    /// The coin's creator address.
    #[display("address")]
    Address,
    /// The coin's creation transaction.
    #[display("trx")]
    Transaction,
}

impl FromStr for LinkKind {
    type Err = CorruptLinkKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "address" => Ok(Self::Address),
            "trx" => Ok(Self::Transaction),
            other => Err(CorruptLinkKey::UnknownKind(other.to_string())),
        }
    }
}

/// A ledger key that cannot be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CorruptLinkKey {
    /// The key is not valid UTF-8.
    #[error("key is not valid utf-8")]
    NotUtf8,
    /// The key does not have exactly three `_` separated parts.
    #[error("expected 3 key parts, found {0}")]
    PartCount(usize),
    /// The kind segment is not a known [`LinkKind`].
    #[error("unknown link kind {0:?}")]
    UnknownKind(String),
}

/// A link from a coin to an entity that may not have been written yet.
///
/// Encodes as the ledger key `<kind>_<coin symbol>_<reference>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeferredLink {
    /// What the reference points at.
    pub kind: LinkKind,
    /// Symbol of the coin to update.
    pub coin_symbol: String,
    /// Normalised address or transaction hash.
    pub reference: String,
}

impl DeferredLink {
    const SEPARATOR: char = '_';

    /// Creator address link for `coin_symbol`.
    pub fn address(coin_symbol: impl Into<String>, address: impl Into<String>) -> Self {
        Self { kind: LinkKind::Address, coin_symbol: coin_symbol.into(), reference: address.into() }
    }

    /// Creation transaction link for `coin_symbol`.
    pub fn transaction(coin_symbol: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            kind: LinkKind::Transaction,
            coin_symbol: coin_symbol.into(),
            reference: hash.into(),
        }
    }

    /// The ledger key for this link.
    pub fn key(&self) -> String {
        format!("{}{sep}{}{sep}{}", self.kind, self.coin_symbol, self.reference, sep = Self::SEPARATOR)
    }

    /// Parses a raw ledger key.
    pub fn from_key(key: &[u8]) -> Result<Self, CorruptLinkKey> {
        let key = std::str::from_utf8(key).map_err(|_| CorruptLinkKey::NotUtf8)?;
        let parts: Vec<&str> = key.split(Self::SEPARATOR).collect();
        let [kind, coin_symbol, reference] = parts.as_slice() else {
            return Err(CorruptLinkKey::PartCount(parts.len()));
        };
        Ok(Self {
            kind: kind.parse()?,
            coin_symbol: (*coin_symbol).to_string(),
            reference: (*reference).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn key_has_three_parts() {
        let link = DeferredLink::address("TEST", "ab12");
        assert_eq!(link.key(), "address_TEST_ab12");
        let link = DeferredLink::transaction("TEST", "ff00");
        assert_eq!(link.key(), "trx_TEST_ff00");
    }

    #[test]
    fn key_parses_back() {
        let link = DeferredLink::transaction("COIN", "beef");
        assert_eq!(DeferredLink::from_key(link.key().as_bytes()), Ok(link));
    }

    #[rstest]
    #[case::too_few(b"address_TEST".as_slice(), CorruptLinkKey::PartCount(2))]
    #[case::too_many(b"address_TE_ST_ab".as_slice(), CorruptLinkKey::PartCount(4))]
    #[case::kind(b"owner_TEST_ab".as_slice(), CorruptLinkKey::UnknownKind("owner".into()))]
    #[case::utf8(&[0xff, 0xfe][..], CorruptLinkKey::NotUtf8)]
    fn corrupt_keys_are_rejected(#[case] key: &[u8], #[case] expected: CorruptLinkKey) {
        assert_eq!(DeferredLink::from_key(key), Err(expected));
    }
}
