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

/// Aliases shared across domains.
///
/// The alias alone picks the index, so registering `"shop"` under two domains yields the same
/// pseudonym on both. This is the linkable model: it is what a user wants when one persona should
/// be recognizable everywhere it is used. Nothing bounds how many domains one alias may span.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedRegistry {
    #[serde(default)]
    site_registry: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    alias_registry: BTreeMap<String, Index>,
    #[serde(default)]
    index_registry: BTreeMap<Index, String>,
}

impl LinkedRegistry {
    /// Domain to aliases, in registration order per domain.
    pub fn sites(&self) -> &BTreeMap<String, Vec<String>> {
        &self.site_registry
    }

    /// Alias to index.
    pub fn aliases(&self) -> &BTreeMap<String, Index> {
        &self.alias_registry
    }

    /// The alias holding `index`.
    pub fn alias_at(&self, index: Index) -> Option<&str> {
        self.index_registry.get(&index).map(String::as_str)
    }

    fn check(&self) -> Result<()> {
        let corrupt = |reason: String| Error::CorruptRegistry {
            key: Self::STORAGE_KEY,
            reason,
        };
        if self.alias_registry.len() != self.index_registry.len() {
            return Err(corrupt(format!(
                "{} aliases but {} indices",
                self.alias_registry.len(),
                self.index_registry.len()
            )));
        }
        for (alias, index) in &self.alias_registry {
            if self.index_registry.get(index) != Some(alias) {
                return Err(corrupt(format!("index {index} does not map back to {alias:?}")));
            }
        }
        for (domain, aliases) in &self.site_registry {
            let mut seen = BTreeSet::new();
            for alias in aliases {
                if !self.alias_registry.contains_key(alias) {
                    return Err(corrupt(format!("{alias:?} on {domain:?} has no index")));
                }
                if !seen.insert(alias) {
                    return Err(corrupt(format!("{alias:?} listed twice on {domain:?}")));
                }
            }
        }
        Ok(())
    }
}

impl Persisted for LinkedRegistry {
    const STORAGE_KEY: &'static str = "linked-registry";

    fn from_json(json: &str) -> Result<Self> {
        let registry: LinkedRegistry = serde_json::from_str(json)?;
        registry.check()?;
        Ok(registry)
    }

    fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl Registry for LinkedRegistry {
    /// The domain plays no part: an alias resolves to its index from any domain.
    fn resolve_index(&self, _domain: &str, alias: &str) -> Option<Index> {
        self.alias_registry.get(alias.trim()).copied()
    }

    fn register_alias(&mut self, domain: &str, alias: &str) -> Result<Index> {
        let (domain, alias) = normalize_selection(domain, alias)?;

        let index = match self.alias_registry.get(&alias) {
            Some(&index) => index,
            None => {
                let index = next_index(self.alias_registry.values())?;
                self.alias_registry.insert(alias.clone(), index);
                self.index_registry.insert(index, alias.clone());
                index
            }
        };

        let site = self.site_registry.entry(domain).or_default();
        if !site.contains(&alias) {
            site.push(alias);
        }
        Ok(index)
    }

    fn list_domains(&self) -> BTreeSet<String> {
        self.site_registry.keys().cloned().collect()
    }

    fn list_aliases(&self, domain: &str) -> BTreeSet<String> {
        self.site_registry
            .get(&normalize_domain(domain))
            .map(|aliases| aliases.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn len(&self) -> usize {
        self.alias_registry.len()
    }
}

#[test]
fn test_idempotent_registration() {
    let mut registry = LinkedRegistry::default();
    let first = registry.register_alias("example.com", "shop").unwrap();
    let again = registry.register_alias(" EXAMPLE.com", "shop ").unwrap();
    assert_eq!(first, again);
    assert_eq!(registry.sites()["example.com"], vec!["shop".to_owned()]);
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_cross_domain_aliasing() {
    let mut registry = LinkedRegistry::default();
    let on_x = registry.register_alias("x.com", "A").unwrap();
    let on_y = registry.register_alias("y.com", "A").unwrap();
    assert_eq!(on_x, on_y);
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.resolve_index("x.com", "A"), Some(on_x));
    assert_eq!(registry.resolve_index("y.com", "A"), Some(on_x));
    // Resolution ignores the domain entirely.
    assert_eq!(registry.resolve_index("never-registered.org", "A"), Some(on_x));
    assert_eq!(registry.resolve_index("x.com", "B"), None);

    assert_eq!(
        registry.list_domains().into_iter().collect::<Vec<_>>(),
        vec!["x.com", "y.com"]
    );
    assert_eq!(registry.alias_at(on_x), Some("A"));
}

#[test]
fn test_list_aliases_sorted() {
    let mut registry = LinkedRegistry::default();
    for alias in ["work", "bank", "shop"] {
        registry.register_alias("Example.com", alias).unwrap();
    }
    assert_eq!(
        registry.list_aliases("example.COM").into_iter().collect::<Vec<_>>(),
        vec!["bank", "shop", "work"]
    );
    assert_eq!(registry.sites()["example.com"], vec!["work", "bank", "shop"]);
    assert!(registry.list_aliases("other.com").is_empty());
}

#[test]
fn test_json_layout() {
    let mut registry = LinkedRegistry::default();
    registry.register_alias("example.com", "shop").unwrap();
    registry.register_alias("other.com", "shop").unwrap();
    registry.register_alias("other.com", "bank").unwrap();

    let value: serde_json::Value = serde_json::from_str(&registry.to_json().unwrap()).unwrap();
    assert_eq!(
        value,
        serde_json::json!({
            "siteRegistry": {"example.com": ["shop"], "other.com": ["shop", "bank"]},
            "aliasRegistry": {"shop": 0, "bank": 1},
            "indexRegistry": {"0": "shop", "1": "bank"},
        })
    );
    assert_eq!(LinkedRegistry::from_json(&registry.to_json().unwrap()).unwrap(), registry);
    assert_eq!(LinkedRegistry::from_json("{}").unwrap(), LinkedRegistry::default());
}

#[test]
fn test_corrupt_tables_rejected() {
    let cases = [
        r#"{"siteRegistry": {}, "aliasRegistry": {"a": 0}, "indexRegistry": {}}"#,
        r#"{"siteRegistry": {}, "aliasRegistry": {"a": 0}, "indexRegistry": {"0": "b"}}"#,
        r#"{"siteRegistry": {"x.com": ["a"]}, "aliasRegistry": {}, "indexRegistry": {}}"#,
        r#"{"siteRegistry": {"x.com": ["a", "a"]}, "aliasRegistry": {"a": 0}, "indexRegistry": {"0": "a"}}"#,
    ];
    for json in cases {
        assert!(
            matches!(LinkedRegistry::from_json(json), Err(Error::CorruptRegistry { .. })),
            "{json}"
        );
    }
    assert!(matches!(LinkedRegistry::from_json("[1, 2]"), Err(Error::Json(_))));
}

#[test]
fn test_exhausted_index_space() {
    let json = format!(
        r#"{{"siteRegistry": {{"x.com": ["a"]}}, "aliasRegistry": {{"a": {max}}}, "indexRegistry": {{"{max}": "a"}}}}"#,
        max = Index::MAX
    );
    let mut registry = LinkedRegistry::from_json(&json).unwrap();
    let before = registry.clone();
    assert!(matches!(
        registry.register_alias("x.com", "b"),
        Err(Error::IndexExhausted)
    ));
    assert_eq!(registry, before);

    // An alias that already has an index still spreads to new domains.
    assert_eq!(registry.register_alias("y.com", "a").unwrap(), Index::MAX);
    assert_eq!(registry.sites()["y.com"], vec!["a".to_owned()]);
}
