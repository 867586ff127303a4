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

use rand_core::CryptoRngCore;
use subtle::{Choice, ConstantTimeEq};
use zeroize::{Zeroize, Zeroizing};

use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Number of secret bytes in a seed.
pub const SEED_BYTES: usize = 16;

/// Length of the hex rendering of a seed.
pub const SEED_HEX_LEN: usize = SEED_BYTES * 2;

/// The secret the whole session's pseudonyms are keyed by.
///
/// The bytes are wiped when the seed is dropped and are never shown by `Debug`.
#[derive(Clone)]
pub struct Seed {
    bytes: [u8; SEED_BYTES],
}

impl Seed {
    /// Generate a fresh random seed.
    pub fn random(mut rng: impl CryptoRngCore) -> Self {
        let mut bytes = [0u8; SEED_BYTES];
        rng.fill_bytes(&mut bytes);
        Seed { bytes }
    }

    pub fn from_bytes(bytes: [u8; SEED_BYTES]) -> Self {
        Seed { bytes }
    }

    /// The raw key material.
    pub fn as_bytes(&self) -> &[u8; SEED_BYTES] {
        &self.bytes
    }

    /// Render the seed as 32 uppercase hex characters.
    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode_upper(self.bytes))
    }
}

impl FromStr for Seed {
    type Err = Error;

    /// Parses 32 hex characters of either case.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.len() != SEED_HEX_LEN {
            return Err(Error::MalformedSeed(format!(
                "expected {SEED_HEX_LEN} hex characters, found {}",
                s.len()
            )));
        }
        let mut bytes = [0u8; SEED_BYTES];
        hex::decode_to_slice(s, &mut bytes).map_err(|e| Error::MalformedSeed(e.to_string()))?;
        Ok(Seed { bytes })
    }
}

impl ConstantTimeEq for Seed {
    fn ct_eq(&self, other: &Self) -> Choice {
        self.bytes[..].ct_eq(&other.bytes[..])
    }
}

impl PartialEq for Seed {
    fn eq(&self, other: &Self) -> bool {
        self.ct_eq(other).into()
    }
}

impl Eq for Seed {}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Seed(<redacted>)")
    }
}

impl Drop for Seed {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

#[test]
fn test_hex_rendering() {
    let seed = Seed::from_bytes([0xab; SEED_BYTES]);
    assert_eq!(seed.to_hex().as_str(), "ABABABABABABABABABABABABABABABAB");
    assert_eq!(format!("{seed:?}"), "Seed(<redacted>)");

    let parsed: Seed = "abababababababababababababababab".parse().unwrap();
    assert_eq!(parsed, seed);
    let parsed: Seed = " ABABABABABABABABABABABABABABABAB\n".parse().unwrap();
    assert_eq!(parsed, seed);
}

#[test]
fn test_malformed_seed() {
    for bad in ["", "00", "0".repeat(64).as_str(), "ZZ000000000000000000000000000000"] {
        assert!(matches!(bad.parse::<Seed>(), Err(Error::MalformedSeed(_))), "{bad:?}");
    }
}

#[test]
fn test_random_seeds_differ() {
    use rand_chacha::ChaCha20Rng;
    use rand_core::SeedableRng;

    let mut rng = ChaCha20Rng::from_seed([7; 32]);
    let a = Seed::random(&mut rng);
    let b = Seed::random(&mut rng);
    assert_ne!(a, b);
    assert_eq!(a.to_hex().len(), SEED_HEX_LEN);

    let mut again = ChaCha20Rng::from_seed([7; 32]);
    assert_eq!(Seed::random(&mut again), a);
}
