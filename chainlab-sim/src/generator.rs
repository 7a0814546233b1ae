//! Seeded generator for address, signature and hash shaped strings.
//!
//! `generate(seed, counter, kind)` is a pure function. The session seed plus
//! a per-session counter is the only entropy the simulated ledger ever sees.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};

/// Base58 alphabet (no `0`, `O`, `I`, `l`).
pub const ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
const LCG_MULTIPLIER: u64 = 6_364_136_223_846_793_005;
const LCG_INCREMENT: u64 = 1_442_695_040_888_963_407;

/// Shape of a generated value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Address,
    Signature,
    Hash,
}

impl ValueKind {
    pub fn length(self) -> usize {
        match self {
            ValueKind::Address => 44,
            ValueKind::Signature => 88,
            ValueKind::Hash => 87,
        }
    }
}

fn fnv1a(bytes: &[u8], mut state: u64) -> u64 {
    for byte in bytes {
        state ^= u64::from(*byte);
        state = state.wrapping_mul(FNV_PRIME);
    }
    state
}

/// Produce the value for `(seed, counter, kind)`.
pub fn generate(seed: &str, counter: u64, kind: ValueKind) -> String {
    let mut state = fnv1a(counter.to_string().as_bytes(), fnv1a(seed.as_bytes(), FNV_OFFSET));

    (0..kind.length())
        .map(|_| {
            state = state
                .wrapping_mul(LCG_MULTIPLIER)
                .wrapping_add(LCG_INCREMENT);
            ALPHABET[((state >> 33) % ALPHABET.len() as u64) as usize] as char
        })
        .collect()
}

/// Cursor over the generator for one session.
///
/// Each draw consumes one counter value, so two draws never collide and the
/// sequence resumes exactly where it stopped after a reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entropy {
    seed: String,
    counter: u64,
}

impl Entropy {
    pub fn new(seed: impl Into<String>, counter: u64) -> Self {
        Self {
            seed: seed.into(),
            counter,
        }
    }

    pub fn seed(&self) -> &str {
        &self.seed
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }

    pub fn draw(&mut self, kind: ValueKind) -> String {
        let value = generate(&self.seed, self.counter, kind);
        self.counter += 1;
        value
    }

    pub fn address(&mut self) -> String {
        self.draw(ValueKind::Address)
    }

    pub fn signature(&mut self) -> String {
        self.draw(ValueKind::Signature)
    }
}

/// Bytes of a simulated keypair file, derived from the public key.
pub fn keypair_bytes(pubkey: &str) -> Vec<u8> {
    Sha512::digest(pubkey.as_bytes()).to_vec()
}

/// Whether `value` looks like a base58 account address.
pub fn is_address(value: &str) -> bool {
    (32..=44).contains(&value.len()) && bs58::decode(value).into_vec().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_lengths() {
        assert_eq!(generate("s", 0, ValueKind::Address).len(), 44);
        assert_eq!(generate("s", 0, ValueKind::Signature).len(), 88);
        assert_eq!(generate("s", 0, ValueKind::Hash).len(), 87);
    }

    #[test]
    fn test_deterministic() {
        for n in 0..50 {
            assert_eq!(
                generate("seed-a", n, ValueKind::Signature),
                generate("seed-a", n, ValueKind::Signature)
            );
        }
    }

    #[test]
    fn test_distinct_counters() {
        let values: HashSet<String> = (0..5_000)
            .map(|n| generate("seed-a", n, ValueKind::Address))
            .collect();
        assert_eq!(values.len(), 5_000);
    }

    #[test]
    fn test_distinct_seeds() {
        assert_ne!(
            generate("seed-a", 7, ValueKind::Address),
            generate("seed-b", 7, ValueKind::Address)
        );
    }

    #[test]
    fn test_alphabet_only() {
        let value = generate("x", 3, ValueKind::Hash);
        assert!(value.bytes().all(|b| ALPHABET.contains(&b)));
        assert!(!value.contains('0') && !value.contains('l'));
    }

    #[test]
    fn test_entropy_advances() {
        let mut entropy = Entropy::new("seed", 10);
        let first = entropy.address();
        assert_eq!(entropy.counter(), 11);
        assert_eq!(first, generate("seed", 10, ValueKind::Address));
        assert_ne!(first, entropy.address());
    }

    #[test]
    fn test_generated_addresses_validate() {
        let mut entropy = Entropy::new("seed", 0);
        for _ in 0..20 {
            assert!(is_address(&entropy.address()));
        }
        assert!(!is_address("not-an-address"));
        assert!(!is_address("0OIl0OIl0OIl0OIl0OIl0OIl0OIl0OIl"));
    }

    #[test]
    fn test_keypair_bytes_stable() {
        assert_eq!(keypair_bytes("abc").len(), 64);
        assert_eq!(keypair_bytes("abc"), keypair_bytes("abc"));
    }
}
