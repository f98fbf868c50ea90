//! Shard key derivation.
//!
//! Each rule group hashes to a 32-bit key that decides which replica in the
//! ring owns it. The hash input is `tenant + "/" + namespace + "/" + name`
//! and the function is FNV-1a, so every replica computes the same key for
//! the same group with no coordination.

const FNV_OFFSET: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 16_777_619;

/// 32-bit FNV-1a over the given bytes.
pub fn fnv1a_32(bytes: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET;
    for b in bytes {
        hash ^= u32::from(*b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Shard key for a rule group identity.
pub fn shard_key(tenant: &str, namespace: &str, group: &str) -> u32 {
    fnv1a_32(format!("{tenant}/{namespace}/{group}").as_bytes())
}
