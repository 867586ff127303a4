// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::Sha256;
use subtle::{Choice, ConstantTimeEq};

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::registry::Index;
use crate::seed::Seed;

type HmacSha256 = Hmac<Sha256>;

/// Number of tag bytes kept in a pseudonym.
pub const PSEUDONYM_BYTES: usize = 16;

/// A 128 bit identifier for one `(seed, index)` pair, shown as 32 lowercase hex characters.
///
/// Pseudonyms derived from the same seed at different indices are indistinguishable from
/// independent random strings to anyone who does not hold the seed.
#[derive(Clone, Copy)]
pub struct Pseudonym {
    tag: [u8; PSEUDONYM_BYTES],
}

/// Derive the pseudonym for `index` under `seed`.
///
/// This is HMAC-SHA-256 keyed by the seed bytes over the ASCII decimal form of the index, with the
/// tag truncated to its first 16 bytes. Truncation halves the tag, which brings collision
/// resistance down to roughly 2^64 work and preimage resistance down to 2^128. Both are far out of
/// reach for the handful of indices one session allocates.
pub fn derive(seed: &Seed, index: Index) -> Pseudonym {
    let mut mac =
        HmacSha256::new_from_slice(seed.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(index.to_string().as_bytes());
    let full = mac.finalize().into_bytes();

    let mut tag = [0u8; PSEUDONYM_BYTES];
    tag.copy_from_slice(&full[..PSEUDONYM_BYTES]);
    Pseudonym { tag }
}

impl fmt::Display for Pseudonym {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.tag))
    }
}

impl fmt::Debug for Pseudonym {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pseudonym({self})")
    }
}

impl FromStr for Pseudonym {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut tag = [0u8; PSEUDONYM_BYTES];
        hex::decode_to_slice(s, &mut tag)?;
        Ok(Pseudonym { tag })
    }
}

impl ConstantTimeEq for Pseudonym {
    fn ct_eq(&self, other: &Self) -> Choice {
        self.tag[..].ct_eq(&other.tag[..])
    }
}

impl PartialEq for Pseudonym {
    fn eq(&self, other: &Self) -> bool {
        self.ct_eq(other).into()
    }
}

impl Eq for Pseudonym {}

impl Hash for Pseudonym {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tag.hash(state);
    }
}

impl Serialize for Pseudonym {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Pseudonym {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[test]
fn test_golden_vectors() {
    let zero = Seed::from_bytes([0; 16]);
    assert_eq!(derive(&zero, 0).to_string(), "9979e4c3ee19965f9ecc6dca6b3954b1");
    assert_eq!(derive(&zero, 1).to_string(), "41e0a9448f91edba4b05c6c2fc0edb1d");
    assert_eq!(derive(&zero, 2).to_string(), "b18d08c0edce4c685e6350dbc9047470");

    let counting = Seed::from_bytes(core::array::from_fn(|i| i as u8));
    assert_eq!(derive(&counting, 7).to_string(), "a9bd93eb95a41ed9e5e55912c735cde0");
}

#[test]
fn test_determinism() {
    use rand_chacha::ChaCha20Rng;
    use rand_core::SeedableRng;

    let mut rng = ChaCha20Rng::from_seed([1; 32]);
    for _ in 0..10 {
        let seed = Seed::random(&mut rng);
        for index in [0, 1, 9, 10, 4096, Index::MAX] {
            assert_eq!(derive(&seed, index), derive(&seed, index));
        }
    }
}

#[test]
fn test_distinctness() {
    use std::collections::HashSet;

    let seed = Seed::from_bytes([0x5a; 16]);
    let pseudonyms: HashSet<Pseudonym> = (0..2000).map(|i| derive(&seed, i)).collect();
    assert_eq!(pseudonyms.len(), 2000);

    let other = Seed::from_bytes([0xa5; 16]);
    assert!((0..200).all(|i| derive(&seed, i) != derive(&other, i)));
}

#[test]
fn test_rendering() {
    let pseudonym = derive(&Seed::from_bytes([0; 16]), 0);
    let rendered = pseudonym.to_string();
    assert_eq!(rendered.len(), 32);
    assert!(rendered.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
    assert_eq!(rendered.parse::<Pseudonym>().unwrap(), pseudonym);

    let json = serde_json::to_string(&pseudonym).unwrap();
    assert_eq!(json, format!("\"{rendered}\""));
    assert_eq!(serde_json::from_str::<Pseudonym>(&json).unwrap(), pseudonym);
}
