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

use serde::{Deserialize, Serialize};

use std::collections::{BTreeMap, BTreeSet};

use super::{next_index, normalize_domain, normalize_selection, Index, Persisted, Registry};
use crate::{Error, Result};

/// The selection an unlinked index was allocated for.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entry {
    pub domain: String,
    pub alias: String,
}

/// Aliases scoped to a single domain.
///
/// Every `(domain, alias)` pair is given its own index, even when the alias string is already in
/// use on another domain, so no two domains ever see pseudonyms derived from a shared index.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct UnlinkedRegistry {
    #[serde(rename = "indexRegistry")]
    index_registry: BTreeMap<Index, Entry>,
    // domain -> alias -> index, derived from `index_registry`.
    #[serde(skip)]
    by_domain: BTreeMap<String, BTreeMap<String, Index>>,
}

/// The persisted part of [`UnlinkedRegistry`].
#[derive(Deserialize)]
struct StoredTables {
    #[serde(rename = "indexRegistry", default)]
    index_registry: BTreeMap<Index, Entry>,
}

impl UnlinkedRegistry {
    /// Index to selection.
    pub fn entries(&self) -> &BTreeMap<Index, Entry> {
        &self.index_registry
    }
}

impl Persisted for UnlinkedRegistry {
    const STORAGE_KEY: &'static str = "unlinked-registry";

    /// Rejects tables that register one pair twice.
    fn from_json(json: &str) -> Result<Self> {
        let StoredTables { index_registry } = serde_json::from_str(json)?;
        let mut by_domain: BTreeMap<String, BTreeMap<String, Index>> = BTreeMap::new();
        for (&index, entry) in &index_registry {
            let previous = by_domain
                .entry(entry.domain.clone())
                .or_default()
                .insert(entry.alias.clone(), index);
            if let Some(previous) = previous {
                return Err(Error::CorruptRegistry {
                    key: Self::STORAGE_KEY,
                    reason: format!(
                        "{:?} on {:?} registered at both {previous} and {index}",
                        entry.alias, entry.domain
                    ),
                });
            }
        }
        Ok(UnlinkedRegistry {
            index_registry,
            by_domain,
        })
    }

    fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl Registry for UnlinkedRegistry {
    /// Only an exact `(domain, alias)` match resolves.
    fn resolve_index(&self, domain: &str, alias: &str) -> Option<Index> {
        self.by_domain
            .get(&normalize_domain(domain))?
            .get(alias.trim())
            .copied()
    }

    fn register_alias(&mut self, domain: &str, alias: &str) -> Result<Index> {
        let (domain, alias) = normalize_selection(domain, alias)?;
        if self.resolve_index(&domain, &alias).is_some() {
            return Err(Error::DuplicateRegistration { domain, alias });
        }

        let index = next_index(self.index_registry.keys())?;
        self.by_domain
            .entry(domain.clone())
            .or_default()
            .insert(alias.clone(), index);
        self.index_registry.insert(index, Entry { domain, alias });
        Ok(index)
    }

    fn list_domains(&self) -> BTreeSet<String> {
        self.by_domain.keys().cloned().collect()
    }

    fn list_aliases(&self, domain: &str) -> BTreeSet<String> {
        self.by_domain
            .get(&normalize_domain(domain))
            .map(|aliases| aliases.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn len(&self) -> usize {
        self.index_registry.len()
    }
}

#[test]
fn test_no_cross_domain_aliasing() {
    let mut registry = UnlinkedRegistry::default();
    let on_x = registry.register_alias("x.com", "A").unwrap();
    let on_y = registry.register_alias("y.com", "A").unwrap();
    assert_ne!(on_x, on_y);
    assert_eq!(registry.resolve_index("x.com", "A"), Some(on_x));
    assert_eq!(registry.resolve_index("y.com", "A"), Some(on_y));
    assert_eq!(registry.resolve_index("z.com", "A"), None);
    assert_eq!(registry.resolve_index("x.com", "B"), None);
}

#[test]
fn test_duplicate_rejected() {
    let mut registry = UnlinkedRegistry::default();
    registry.register_alias("x.com", "A").unwrap();
    let before = registry.clone();

    match registry.register_alias(" X.COM ", "A") {
        Err(Error::DuplicateRegistration { domain, alias }) => {
            assert_eq!(domain, "x.com");
            assert_eq!(alias, "A");
        }
        other => panic!("expected a duplicate registration, got {other:?}"),
    }
    assert_eq!(registry, before);
    assert_eq!(registry.len(), 1);

    // Aliases are case sensitive, domains are not.
    assert_eq!(registry.register_alias("x.com", "a").unwrap(), 1);
}

#[test]
fn test_listing() {
    let mut registry = UnlinkedRegistry::default();
    registry.register_alias("b.com", "work").unwrap();
    registry.register_alias("a.com", "shop").unwrap();
    registry.register_alias("b.com", "bank").unwrap();

    assert_eq!(
        registry.list_domains().into_iter().collect::<Vec<_>>(),
        vec!["a.com", "b.com"]
    );
    assert_eq!(
        registry.list_aliases("B.com").into_iter().collect::<Vec<_>>(),
        vec!["bank", "work"]
    );
    assert!(registry.list_aliases("c.com").is_empty());
}

#[test]
fn test_json_layout() {
    let mut registry = UnlinkedRegistry::default();
    registry.register_alias("x.com", "A").unwrap();
    registry.register_alias("y.com", "A").unwrap();

    let json = registry.to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(
        value,
        serde_json::json!({
            "indexRegistry": {
                "0": {"domain": "x.com", "alias": "A"},
                "1": {"domain": "y.com", "alias": "A"},
            }
        })
    );

    let loaded = UnlinkedRegistry::from_json(&json).unwrap();
    assert_eq!(loaded, registry);
    assert_eq!(loaded.resolve_index("y.com", "A"), Some(1));
    assert_eq!(UnlinkedRegistry::from_json("{}").unwrap(), UnlinkedRegistry::default());
}

#[test]
fn test_duplicate_pairs_rejected_on_load() {
    let json = r#"{"indexRegistry": {
        "0": {"domain": "x.com", "alias": "A"},
        "4": {"domain": "x.com", "alias": "A"}
    }}"#;
    assert!(matches!(
        UnlinkedRegistry::from_json(json),
        Err(Error::CorruptRegistry { .. })
    ));
}

#[test]
fn test_allocation_continues_after_gap() {
    let json = r#"{"indexRegistry": {"5": {"domain": "x.com", "alias": "A"}}}"#;
    let mut registry = UnlinkedRegistry::from_json(json).unwrap();
    assert_eq!(registry.register_alias("x.com", "B").unwrap(), 6);
}
