//! Content identifiers for consensus records.

use sha2::{Digest, Sha256};

/// Prefix carried by every Lyra content identifier.
pub const CID_PREFIX: &str = "lyra1";

/// Computes the consensus CID for a set of participant public keys.
///
/// The keys (base64 form) are sorted lexicographically, concatenated, and
/// SHA-256 hashed; the hex digest is prefixed with [`CID_PREFIX`]. The
/// result depends only on the key *set*, not the input order.
pub fn consensus_cid<S: AsRef<str>>(pubkeys: &[S]) -> String {
    let mut sorted: Vec<&str> = pubkeys.iter().map(AsRef::as_ref).collect();
    sorted.sort_unstable();

    let mut hasher = Sha256::new();
    for key in sorted {
        hasher.update(key.as_bytes());
    }
    format!("{CID_PREFIX}{}", hex::encode(hasher.finalize()))
}

/// Computes the CID of an arbitrary JSON value.
///
/// The value is rendered with lexicographically ordered object keys before
/// hashing, so semantically equal values share a CID.
pub fn content_cid(data: &serde_json::Value) -> String {
    // serde_json's default Map keeps keys in sorted order, making the
    // compact rendering canonical.
    let rendered = data.to_string();
    let mut hasher = Sha256::new();
    hasher.update(rendered.as_bytes());
    format!("{CID_PREFIX}{}", hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn cid_is_order_independent() {
        let a = consensus_cid(&["keyB", "keyA", "keyC"]);
        let b = consensus_cid(&["keyA", "keyB", "keyC"]);
        assert_eq!(a, b);
    }

    #[test]
    fn cid_golden_value() {
        // sha256("alphabeta"), prefixed.
        let cid = consensus_cid(&["beta", "alpha"]);
        assert_eq!(
            cid,
            format!(
                "{CID_PREFIX}{}",
                hex::encode(Sha256::digest(b"alphabeta"))
            )
        );
    }

    #[test]
    fn cid_distinguishes_key_sets() {
        assert_ne!(consensus_cid(&["a", "b"]), consensus_cid(&["a", "c"]));
    }

    #[test]
    fn content_cid_is_stable_across_key_order() {
        let a: serde_json::Value = serde_json::from_str(r#"{"x": 1, "y": 2}"#).unwrap();
        let b: serde_json::Value = serde_json::from_str(r#"{"y": 2, "x": 1}"#).unwrap();
        assert_eq!(content_cid(&a), content_cid(&b));
    }

    proptest! {
        #[test]
        fn cid_determinism_under_permutation(mut keys in proptest::collection::vec("[a-zA-Z0-9+/=]{8,44}", 1..8)) {
            let original = consensus_cid(&keys);
            keys.reverse();
            prop_assert_eq!(consensus_cid(&keys), original);
        }
    }
}
