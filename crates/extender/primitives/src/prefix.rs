//! Normalisation of node identifiers.
//!
//! The node renders addresses, public keys and hashes with a human readable prefix. The
//! store keys every entity by the bare hex body, so all identifiers are normalised before
//! they reach a writer.

/// Prefix used when an address is sent back to the node.
pub const ADDRESS_PREFIX: &str = "NOAHx";

const ADDRESS_PREFIXES: [&str; 2] = [ADDRESS_PREFIX, "Mx"];

const PUBLIC_KEY_PREFIXES: [&str; 3] = ["Np", "Mp", "0x"];

const HASH_PREFIXES: [&str; 3] = ["Nt", "Mt", "0x"];

fn strip_any<'a>(raw: &'a str, prefixes: &[&str]) -> &'a str {
    prefixes.iter().find_map(|prefix| raw.strip_prefix(prefix)).unwrap_or(raw)
}

/// Strips the address prefix, if any.
pub fn normalize_address(raw: &str) -> &str {
    strip_any(raw, &ADDRESS_PREFIXES)
}

/// Strips the validator public key prefix, if any.
pub fn normalize_public_key(raw: &str) -> &str {
    strip_any(raw, &PUBLIC_KEY_PREFIXES)
}

/// Strips the transaction hash prefix, if any.
pub fn normalize_hash(raw: &str) -> &str {
    strip_any(raw, &HASH_PREFIXES)
}

/// Re-applies the node's address prefix to a normalised address.
pub fn prefixed_address(address: &str) -> String {
    format!("{ADDRESS_PREFIX}{}", normalize_address(address))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::noah("NOAHxab12", "ab12")]
    #[case::minter("Mxab12", "ab12")]
    #[case::bare("ab12", "ab12")]
    fn strips_address_prefix(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(normalize_address(raw), expected);
    }

    #[rstest]
    #[case::noah_key("Np0f", "0f")]
    #[case::hex("0x0f", "0f")]
    #[case::bare("0f", "0f")]
    fn strips_public_key_prefix(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(normalize_public_key(raw), expected);
    }

    #[test]
    fn strips_hash_prefix() {
        assert_eq!(normalize_hash("Nt7a"), "7a");
        assert_eq!(normalize_hash("Mt7a"), "7a");
    }

    #[test]
    fn prefixed_address_is_not_doubled() {
        assert_eq!(prefixed_address("ab"), "NOAHxab");
        assert_eq!(prefixed_address("NOAHxab"), "NOAHxab");
    }
}
