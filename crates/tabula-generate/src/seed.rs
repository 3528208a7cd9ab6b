//! Seeding discipline for reproducible runs.
//!
//! Every random source used during generation is derived from structural
//! keys (table, row id, column) instead of a shared stream, so a row's values
//! do not depend on how many rows or chunks were generated before it.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};

/// Seeds of a single generation run.
#[derive(Debug, Clone, Copy)]
pub struct Determinism {
    run_seed: u64,
    explicit: bool,
}

impl Determinism {
    /// Without a seed the run picks a random one and output is not reproducible.
    pub fn new(seed: Option<u64>) -> Self {
        match seed {
            Some(run_seed) => Self {
                run_seed,
                explicit: true,
            },
            None => Self {
                run_seed: rand::random(),
                explicit: false,
            },
        }
    }

    pub fn run_seed(&self) -> u64 {
        self.run_seed
    }

    pub fn is_explicit(&self) -> bool {
        self.explicit
    }

    /// Random source shared by every column expression of one row.
    pub fn row_rng(&self, table: &str, row_id: i64) -> ChaCha8Rng {
        let table_seed = hash_seed(self.run_seed, table);
        ChaCha8Rng::seed_from_u64(hash_row_seed(table_seed, row_id))
    }

    /// Random source for choosing the null positions of one column.
    pub fn null_rng(&self, table: &str, column: &str) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(hash_seed(self.run_seed, &column_key(table, column)))
    }

    /// Independent source for one foreign-key pick. The run seed is not part
    /// of the key, so a pick depends only on the row and the call.
    pub fn foreign_key_rng(parts: &[&str]) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(stable_seed(parts))
    }
}

/// Stable seed over `|`-joined parts: first eight bytes of their SHA-256, little endian.
pub fn stable_seed(parts: &[&str]) -> u64 {
    let digest = Sha256::digest(parts.join("|").as_bytes());
    let mut bytes = [0_u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

pub fn hash_seed(seed: u64, key: &str) -> u64 {
    let mut hash = seed ^ 0xcbf29ce484222325;
    for byte in key.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

fn hash_row_seed(table_seed: u64, row_id: i64) -> u64 {
    let mut hash = table_seed ^ (row_id as u64).wrapping_mul(0x9e3779b97f4a7c15);
    hash = hash.wrapping_mul(0x100000001b3);
    hash
}

fn column_key(table: &str, column: &str) -> String {
    format!("{table}.{column}")
}

#[cfg(test)]
mod tests {
    use rand::RngCore;

    use super::*;

    #[test]
    fn stable_seed_is_order_sensitive_and_repeatable() {
        let a = stable_seed(&["7", "customers", "id", "uniform", "None", "None"]);
        let b = stable_seed(&["7", "customers", "id", "uniform", "None", "None"]);
        let c = stable_seed(&["8", "customers", "id", "uniform", "None", "None"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn row_sources_depend_on_row_not_on_call_order() {
        let determinism = Determinism::new(Some(42));
        let mut first = determinism.row_rng("orders", 5);
        let _ = determinism.row_rng("orders", 4).next_u64();
        let mut again = determinism.row_rng("orders", 5);
        assert_eq!(first.next_u64(), again.next_u64());

        let other_seed = Determinism::new(Some(43));
        assert_ne!(
            determinism.row_rng("orders", 5).next_u64(),
            other_seed.row_rng("orders", 5).next_u64()
        );
    }
}
