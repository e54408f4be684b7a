//! Merkle root calculation over transaction ids
//!
//! The tree is built over the hex id strings themselves: each parent hashes
//! the concatenation of its children's hex representations, not their raw
//! bytes. This is format-defining and must match wherever roots are compared.

use super::hash::{double_sha256, reversed_hex, NULL_HASH};

/// Calculate the merkle root of an ordered list of transaction ids.
///
/// An empty list yields the all-zero root; a single id is its own root,
/// unchanged. At every level an odd trailing id is paired with itself.
pub fn calculate_merkle_root(tx_ids: &[String]) -> String {
    if tx_ids.is_empty() {
        return NULL_HASH.to_string();
    }

    let mut current_level = tx_ids.to_vec();

    while current_level.len() > 1 {
        let mut next_level = Vec::with_capacity(current_level.len().div_ceil(2));

        for pair in current_level.chunks(2) {
            let left = &pair[0];
            let right = pair.get(1).unwrap_or(left);

            let combined = format!("{left}{right}");
            next_level.push(reversed_hex(&double_sha256(combined.as_bytes())));
        }

        current_level = next_level;
    }

    current_level.remove(0)
}
