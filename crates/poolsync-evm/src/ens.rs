//! ENS name hashing.

use crate::abi::keccak256;

/// ENS `namehash` of a dot-separated name. Labels are lower-cased before
/// hashing; the empty name hashes to 32 zero bytes.
pub fn namehash(name: &str) -> [u8; 32] {
    let mut node = [0u8; 32];
    if name.is_empty() {
        return node;
    }
    for label in name.rsplit('.') {
        let label_hash = keccak256(label.to_lowercase().as_bytes());
        let mut buf = [0u8; 64];
        buf[..32].copy_from_slice(&node);
        buf[32..].copy_from_slice(&label_hash);
        node = keccak256(&buf);
    }
    node
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex_of(name: &str) -> String {
        hex::encode(namehash(name))
    }

    #[test]
    fn empty_name_is_zero() {
        assert_eq!(namehash(""), [0u8; 32]);
    }

    #[test]
    fn eth_and_subdomain() {
        assert_eq!(
            hex_of("eth"),
            "93cdeb708b7545dc668eb9280176169d1c33cfd8ed6f04690a0bcc88a93fc4ae"
        );
        assert_eq!(
            hex_of("foo.eth"),
            "de9b09fd7c5f901e23a3f19fecc54828e9c848539801e86591bd9801b019f84f"
        );
    }

    #[test]
    fn case_insensitive() {
        assert_eq!(namehash("Foo.ETH"), namehash("foo.eth"));
    }
}
