//! Username-to-shard routing.
//!
//! `shard_of(username)` hashes the username with SHA-256, takes the first
//! eight bytes big-endian, and reduces modulo the shard count. The count
//! is fixed for the deployment's lifetime, so the mapping is stable.

use sha2::{Digest, Sha256};

/// Default number of shard tables (`users_0..users_3`).
pub const DEFAULT_SHARD_COUNT: usize = 4;

#[derive(Debug, Clone, Copy)]
pub struct ShardMap {
    count: usize,
}

impl ShardMap {
    /// `count` must be a power of two; validated by config at startup.
    pub fn new(count: usize) -> Self {
        debug_assert!(count.is_power_of_two(), "shard count must be a power of two");
        Self { count }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// The shard index owning `username`.
    pub fn shard_of(&self, username: &str) -> usize {
        let digest = Sha256::digest(username.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        (u64::from_be_bytes(prefix) % self.count as u64) as usize
    }

    /// Table name for a shard index.
    pub fn table(&self, shard: usize) -> String {
        format!("users_{shard}")
    }
}

impl Default for ShardMap {
    fn default() -> Self {
        Self::new(DEFAULT_SHARD_COUNT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_is_stable_and_in_range() {
        let shards = ShardMap::new(4);
        for username in ["alice", "bob", "carol", "用户", "a_b_c_123"] {
            let shard = shards.shard_of(username);
            assert!(shard < 4);
            assert_eq!(shard, shards.shard_of(username));
        }
    }

    #[test]
    fn distinct_usernames_spread_across_shards() {
        let shards = ShardMap::new(4);
        let mut seen = [false; 4];
        for i in 0..64 {
            seen[shards.shard_of(&format!("user_{i}"))] = true;
        }
        assert!(seen.iter().all(|&hit| hit));
    }

    #[test]
    fn table_names_follow_the_shard_index() {
        let shards = ShardMap::new(4);
        assert_eq!(shards.table(0), "users_0");
        assert_eq!(shards.table(3), "users_3");
    }
}
