use sha2::{Digest, Sha256};

use crate::mutants::Mutation;

/// Partition slot for a mutation id: a stable hash over the content-addressed
/// id, sign-masked, mod the shard count. Independent of generation order.
pub fn shard_index(id: &str, total: u64) -> u64 {
    let digest = Sha256::digest(id.as_bytes());
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(raw) & i64::MAX as u64) % total
}

/// Keep the mutations belonging to shard `index` of `total`. A non-positive
/// total is an identity pass-through.
pub fn shard(mutations: Vec<Mutation>, index: u64, total: i64) -> Vec<Mutation> {
    if total <= 0 {
        return mutations;
    }
    let total = total as u64;
    mutations
        .into_iter()
        .filter(|m| shard_index(&m.id, total) == index)
        .collect()
}
