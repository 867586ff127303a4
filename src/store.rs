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
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use std::collections::BTreeSet;

use crate::pseudonym::{derive, Pseudonym};
use crate::registry::{Index, LinkedRegistry, Mode, Persisted, Registry, UnlinkedRegistry};
use crate::seed::Seed;
use crate::storage::Storage;
use crate::{Error, Result};

#[cfg(test)]
use crate::storage::{FileStorage, MemoryStorage};
#[cfg(test)]
use rand_chacha::ChaCha20Rng;
#[cfg(test)]
use rand_core::SeedableRng;

/// Storage key of the session seed, held as 32 uppercase hex characters.
pub const SEED_KEY: &str = "seed";

/// The seed and both registries of one session, mirrored into a [`Storage`] backend.
///
/// Every mutation is made on a copy and written out before it replaces the in-memory state, so
/// an operation that fails at any point leaves both memory and storage as they were.
pub struct SessionStore<S> {
    storage: S,
    seed: Option<Seed>,
    linked: LinkedRegistry,
    unlinked: UnlinkedRegistry,
}

impl<S: Storage> SessionStore<S> {
    /// Load whatever session `storage` already holds. Missing keys are empty state.
    pub fn open(storage: S) -> Result<Self> {
        let seed = match storage.get(SEED_KEY)?.map(Zeroizing::new) {
            Some(hex) => Some(hex.parse::<Seed>()?),
            None => None,
        };
        let linked = load::<LinkedRegistry>(&storage)?;
        let unlinked = load::<UnlinkedRegistry>(&storage)?;
        debug!(
            has_seed = seed.is_some(),
            linked = linked.len(),
            unlinked = unlinked.len(),
            "session opened"
        );
        Ok(SessionStore {
            storage,
            seed,
            linked,
            unlinked,
        })
    }

    /// Replace the session seed with a fresh random one.
    ///
    /// Every pseudonym derived so far changes with it; the registries are kept.
    pub fn generate_seed(&mut self, rng: impl CryptoRngCore) -> Result<&Seed> {
        self.install_seed(Seed::random(rng))
    }

    /// Replace the session seed with one given as 32 hex characters.
    pub fn import_seed(&mut self, hex: &str) -> Result<&Seed> {
        self.install_seed(hex.parse()?)
    }

    fn install_seed(&mut self, seed: Seed) -> Result<&Seed> {
        self.storage.set(SEED_KEY, &seed.to_hex())?;
        info!(replaced = self.seed.is_some(), "session seed installed");
        Ok(&*self.seed.insert(seed))
    }

    pub fn seed(&self) -> Option<&Seed> {
        self.seed.as_ref()
    }

    pub fn linked(&self) -> &LinkedRegistry {
        &self.linked
    }

    pub fn unlinked(&self) -> &UnlinkedRegistry {
        &self.unlinked
    }

    /// The registry backing `mode`.
    pub fn registry(&self, mode: Mode) -> &dyn Registry {
        match mode {
            Mode::Linked => &self.linked,
            Mode::Unlinked => &self.unlinked,
        }
    }

    /// Register `alias` under `domain` in the `mode` registry and persist it.
    pub fn register_alias(&mut self, mode: Mode, domain: &str, alias: &str) -> Result<Index> {
        let registered = match mode {
            Mode::Linked => register(&mut self.storage, &mut self.linked, domain, alias),
            Mode::Unlinked => register(&mut self.storage, &mut self.unlinked, domain, alias),
        };
        match &registered {
            Ok(index) => info!(
                %mode,
                domain = domain.trim(),
                alias = alias.trim(),
                index,
                "alias registered"
            ),
            Err(e) => warn!(%mode, error = %e, "registration rejected"),
        }
        registered
    }

    pub fn resolve_index(&self, mode: Mode, domain: &str, alias: &str) -> Option<Index> {
        self.registry(mode).resolve_index(domain, alias)
    }

    pub fn list_domains(&self, mode: Mode) -> BTreeSet<String> {
        self.registry(mode).list_domains()
    }

    pub fn list_aliases(&self, mode: Mode, domain: &str) -> BTreeSet<String> {
        self.registry(mode).list_aliases(domain)
    }

    /// The pseudonym for a `(mode, domain, alias)` selection.
    ///
    /// In linked mode the domain must still be selected, although only the alias decides the
    /// index.
    pub fn pseudonym(&self, mode: Mode, domain: &str, alias: &str) -> Result<Pseudonym> {
        let seed = self.seed.as_ref().ok_or(Error::MissingSeed)?;
        if domain.trim().is_empty() {
            return Err(Error::MissingSelection("domain"));
        }
        if alias.trim().is_empty() {
            return Err(Error::MissingSelection("alias"));
        }
        let index = self
            .resolve_index(mode, domain, alias)
            .ok_or_else(|| Error::UnresolvedIndex {
                domain: domain.trim().to_owned(),
                alias: alias.trim().to_owned(),
            })?;
        Ok(derive(seed, index))
    }

    /// Forget the seed and both registries, in storage and in memory.
    pub fn reset(&mut self) -> Result<()> {
        self.storage.clear()?;
        self.seed = None;
        self.linked = LinkedRegistry::default();
        self.unlinked = UnlinkedRegistry::default();
        info!("session reset");
        Ok(())
    }
}

fn load<R: Persisted>(storage: &impl Storage) -> Result<R> {
    match storage.get(R::STORAGE_KEY)? {
        Some(json) => {
            let registry = R::from_json(&json)?;
            debug!(key = R::STORAGE_KEY, entries = registry.len(), "registry loaded");
            Ok(registry)
        }
        None => Ok(R::default()),
    }
}

fn register<R: Persisted>(
    storage: &mut impl Storage,
    registry: &mut R,
    domain: &str,
    alias: &str,
) -> Result<Index> {
    let mut next = registry.clone();
    let index = next.register_alias(domain, alias)?;
    storage.set(R::STORAGE_KEY, &next.to_json()?)?;
    *registry = next;
    Ok(index)
}

#[cfg(test)]
const ZERO_SEED: &str = "00000000000000000000000000000000";

/// Storage that refuses every write.
#[cfg(test)]
struct ReadOnly(MemoryStorage);

#[cfg(test)]
impl Storage for ReadOnly {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.0.get(key)
    }

    fn set(&mut self, _key: &str, _value: &str) -> Result<()> {
        Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read only").into())
    }

    fn clear(&mut self) -> Result<()> {
        Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read only").into())
    }
}

#[test]
fn test_end_to_end() {
    let mut store = SessionStore::open(MemoryStorage::new()).unwrap();
    store.import_seed(ZERO_SEED).unwrap();
    let index = store.register_alias(Mode::Linked, "example.com", "shop").unwrap();
    assert_eq!(index, 0);
    assert_eq!(
        store.pseudonym(Mode::Linked, "example.com", "shop").unwrap().to_string(),
        "9979e4c3ee19965f9ecc6dca6b3954b1"
    );
}

#[test]
fn test_failure_reasons() {
    let mut store = SessionStore::open(MemoryStorage::new()).unwrap();
    store.register_alias(Mode::Unlinked, "x.com", "A").unwrap();
    assert!(matches!(
        store.pseudonym(Mode::Unlinked, "x.com", "A"),
        Err(Error::MissingSeed)
    ));

    store.generate_seed(ChaCha20Rng::from_seed([3; 32])).unwrap();
    assert!(matches!(
        store.pseudonym(Mode::Unlinked, " ", "A"),
        Err(Error::MissingSelection("domain"))
    ));
    assert!(matches!(
        store.pseudonym(Mode::Unlinked, "x.com", ""),
        Err(Error::MissingSelection("alias"))
    ));
    assert!(matches!(
        store.pseudonym(Mode::Unlinked, "y.com", "A"),
        Err(Error::UnresolvedIndex { .. })
    ));
    assert!(matches!(
        store.pseudonym(Mode::Linked, "x.com", "A"),
        Err(Error::UnresolvedIndex { .. })
    ));
    assert!(matches!(
        store.register_alias(Mode::Unlinked, "x.com", "A"),
        Err(Error::DuplicateRegistration { .. })
    ));
    assert!(matches!(
        store.register_alias(Mode::Linked, "", "A"),
        Err(Error::Validation { field: "domain", .. })
    ));
    assert!(store.linked().is_empty());
    assert_eq!(store.unlinked().len(), 1);
}

#[test]
fn test_modes_are_independent() {
    let mut store = SessionStore::open(MemoryStorage::new()).unwrap();
    store.import_seed(ZERO_SEED).unwrap();
    store.register_alias(Mode::Unlinked, "x.com", "A").unwrap();
    store.register_alias(Mode::Unlinked, "y.com", "A").unwrap();
    store.register_alias(Mode::Linked, "x.com", "A").unwrap();
    store.register_alias(Mode::Linked, "y.com", "A").unwrap();

    let linked_x = store.pseudonym(Mode::Linked, "x.com", "A").unwrap();
    let linked_y = store.pseudonym(Mode::Linked, "y.com", "A").unwrap();
    let unlinked_x = store.pseudonym(Mode::Unlinked, "x.com", "A").unwrap();
    let unlinked_y = store.pseudonym(Mode::Unlinked, "y.com", "A").unwrap();
    assert_eq!(linked_x, linked_y);
    assert_ne!(unlinked_x, unlinked_y);
    // Both registries start at index zero, so the first entries coincide.
    assert_eq!(linked_x, unlinked_x);

    assert_eq!(store.list_domains(Mode::Linked), store.list_domains(Mode::Unlinked));
    assert_eq!(
        store.list_aliases(Mode::Unlinked, "y.com").into_iter().collect::<Vec<_>>(),
        vec!["A"]
    );
}

#[test]
fn test_session_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");

    let mut store = SessionStore::open(FileStorage::new(&path)).unwrap();
    let seed = store.generate_seed(ChaCha20Rng::from_seed([9; 32])).unwrap().clone();
    store.register_alias(Mode::Linked, "Example.com", "shop").unwrap();
    store.register_alias(Mode::Unlinked, "example.com", "shop").unwrap();
    store.register_alias(Mode::Unlinked, "other.com", "shop").unwrap();
    let before = store.pseudonym(Mode::Unlinked, "other.com", "shop").unwrap();
    drop(store);

    let stored = FileStorage::new(&path);
    let seed_hex = stored.get(SEED_KEY).unwrap().unwrap();
    assert_eq!(seed_hex, seed.to_hex().as_str());
    assert!(seed_hex.chars().all(|c| matches!(c, '0'..='9' | 'A'..='F')));

    let mut store = SessionStore::open(stored).unwrap();
    assert_eq!(store.seed(), Some(&seed));
    assert_eq!(store.resolve_index(Mode::Linked, "example.com", "shop"), Some(0));
    assert_eq!(store.resolve_index(Mode::Unlinked, "other.com", "shop"), Some(1));
    assert_eq!(store.pseudonym(Mode::Unlinked, "other.com", "shop").unwrap(), before);
    assert_eq!(store.register_alias(Mode::Unlinked, "third.com", "shop").unwrap(), 2);
}

#[test]
fn test_reset_clears_everything() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");

    let mut store = SessionStore::open(FileStorage::new(&path)).unwrap();
    store.import_seed(ZERO_SEED).unwrap();
    store.register_alias(Mode::Linked, "x.com", "A").unwrap();
    store.register_alias(Mode::Unlinked, "x.com", "A").unwrap();
    store.reset().unwrap();

    assert!(store.seed().is_none());
    assert!(store.linked().is_empty());
    assert!(store.unlinked().is_empty());
    assert!(!path.exists());

    let store = SessionStore::open(FileStorage::new(&path)).unwrap();
    assert!(store.seed().is_none());
    assert!(store.list_domains(Mode::Linked).is_empty());
    assert!(matches!(
        store.pseudonym(Mode::Linked, "x.com", "A"),
        Err(Error::MissingSeed)
    ));
}

#[test]
fn test_failed_write_changes_nothing() {
    let mut backing = MemoryStorage::new();
    backing.set(SEED_KEY, ZERO_SEED).unwrap();
    let mut store = SessionStore::open(ReadOnly(backing)).unwrap();

    assert!(matches!(
        store.register_alias(Mode::Linked, "x.com", "A"),
        Err(Error::Io(_))
    ));
    assert!(matches!(
        store.register_alias(Mode::Unlinked, "x.com", "A"),
        Err(Error::Io(_))
    ));
    assert!(store.linked().is_empty());
    assert!(store.unlinked().is_empty());
    assert_eq!(store.resolve_index(Mode::Linked, "x.com", "A"), None);

    assert!(store.import_seed("FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF").is_err());
    assert_eq!(store.seed().unwrap().to_hex().as_str(), ZERO_SEED);

    assert!(store.reset().is_err());
    assert!(store.seed().is_some());
}

#[test]
fn test_corrupt_storage_rejected() {
    let mut backing = MemoryStorage::new();
    backing.set(SEED_KEY, "not a seed").unwrap();
    assert!(matches!(
        SessionStore::open(backing),
        Err(Error::MalformedSeed(_))
    ));

    let mut backing = MemoryStorage::new();
    backing
        .set(
            UnlinkedRegistry::STORAGE_KEY,
            r#"{"indexRegistry": {"0": {"domain": "x.com", "alias": "A"}, "1": {"domain": "x.com", "alias": "A"}}}"#,
        )
        .unwrap();
    assert!(matches!(
        SessionStore::open(backing),
        Err(Error::CorruptRegistry { key: "unlinked-registry", .. })
    ));
}

#[test]
fn test_dense_indices_across_many_registrations() {
    let mut store = SessionStore::open(MemoryStorage::new()).unwrap();
    let linked: Vec<Index> = (0..25)
        .map(|i| {
            store
                .register_alias(Mode::Linked, &format!("site{}.com", i % 5), &format!("alias{i}"))
                .unwrap()
        })
        .collect();
    let unlinked: Vec<Index> = (0..25)
        .map(|i| {
            store
                .register_alias(Mode::Unlinked, &format!("site{i}.com"), "same")
                .unwrap()
        })
        .collect();
    assert_eq!(linked, (0..25).collect::<Vec<_>>());
    assert_eq!(unlinked, (0..25).collect::<Vec<_>>());
}

#[test]
fn test_exhausted_index_space_rejected() {
    let mut backing = MemoryStorage::new();
    let blob = format!(
        r#"{{"indexRegistry": {{"{}": {{"domain": "x.com", "alias": "A"}}}}}}"#,
        Index::MAX
    );
    backing.set(UnlinkedRegistry::STORAGE_KEY, &blob).unwrap();
    let mut store = SessionStore::open(backing).unwrap();

    assert!(matches!(
        store.register_alias(Mode::Unlinked, "y.com", "B"),
        Err(Error::IndexExhausted)
    ));
    assert_eq!(store.unlinked().len(), 1);
    assert_eq!(store.resolve_index(Mode::Unlinked, "y.com", "B"), None);
    assert_eq!(store.resolve_index(Mode::Unlinked, "x.com", "A"), Some(Index::MAX));
}
