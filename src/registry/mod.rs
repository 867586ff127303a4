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

use std::collections::BTreeSet;
use std::fmt;

use crate::{Error, Result};

mod linked;
mod unlinked;

pub use linked::LinkedRegistry;
pub use unlinked::{Entry, UnlinkedRegistry};

/// The integer a pseudonym is derived at.
pub type Index = u64;

/// Which privacy model a selection is made under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// One alias, one index, on every domain.
    Linked,
    /// One index per `(domain, alias)` pair.
    Unlinked,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Linked => "linked",
            Mode::Unlinked => "unlinked",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A table of `(domain, alias)` selections and the indices they resolve to.
///
/// Registries only grow. Indices are allocated densely from zero and never handed out twice.
pub trait Registry {
    /// The index the selection resolves to, if any.
    fn resolve_index(&self, domain: &str, alias: &str) -> Option<Index>;

    /// Register `alias` under `domain`, returning the index it now resolves to.
    ///
    /// Both fields are trimmed and the domain is lowercased first. On error nothing changes.
    fn register_alias(&mut self, domain: &str, alias: &str) -> Result<Index>;

    /// Every domain with at least one alias, sorted.
    fn list_domains(&self) -> BTreeSet<String>;

    /// Every alias registered under `domain`, sorted.
    fn list_aliases(&self, domain: &str) -> BTreeSet<String>;

    /// Number of indices allocated so far.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A registry that round-trips through a storage blob.
pub trait Persisted: Registry + Clone + Default {
    /// Storage key the registry is persisted under.
    const STORAGE_KEY: &'static str;

    /// Parse a stored blob, rejecting tables that break the registry's invariants.
    fn from_json(json: &str) -> Result<Self>;

    fn to_json(&self) -> Result<String>;
}

/// One past the largest allocated index, or zero for an empty table.
pub(crate) fn next_index<'a>(allocated: impl IntoIterator<Item = &'a Index>) -> Result<Index> {
    match allocated.into_iter().max() {
        None => Ok(0),
        Some(max) => max.checked_add(1).ok_or(Error::IndexExhausted),
    }
}

pub(crate) fn normalize_domain(domain: &str) -> String {
    domain.trim().to_lowercase()
}

/// Normalize a selection for registration, rejecting empty fields.
pub(crate) fn normalize_selection(domain: &str, alias: &str) -> Result<(String, String)> {
    let domain = normalize_domain(domain);
    let alias = alias.trim();
    if domain.is_empty() {
        return Err(Error::Validation {
            field: "domain",
            reason: "must not be empty",
        });
    }
    if alias.is_empty() {
        return Err(Error::Validation {
            field: "alias",
            reason: "must not be empty",
        });
    }
    Ok((domain, alias.to_owned()))
}

#[test]
fn test_next_index() {
    assert_eq!(next_index(&[]).unwrap(), 0);
    assert_eq!(next_index(&[0]).unwrap(), 1);
    assert_eq!(next_index(&[3, 0, 7, 1]).unwrap(), 8);
    assert_eq!(next_index(&[0, Index::MAX - 1]).unwrap(), Index::MAX);
    assert!(matches!(next_index(&[0, Index::MAX]), Err(Error::IndexExhausted)));
}

#[test]
fn test_normalize_selection() {
    assert_eq!(
        normalize_selection("  Example.COM ", " Shop ").unwrap(),
        ("example.com".to_owned(), "Shop".to_owned())
    );
    assert!(matches!(
        normalize_selection("   ", "shop"),
        Err(Error::Validation { field: "domain", .. })
    ));
    assert!(matches!(
        normalize_selection("example.com", "\t"),
        Err(Error::Validation { field: "alias", .. })
    ));
}

/// Registration properties both registries share.
#[cfg(test)]
fn check_monotonic_allocation<R: Registry + Default>() {
    let mut registry = R::default();
    let mut allocated = Vec::new();
    for (i, domain) in ["a.com", "b.com", "c.com", "d.com"].into_iter().enumerate() {
        allocated.push(registry.register_alias(domain, &format!("alias-{i}")).unwrap());
    }
    assert_eq!(allocated, vec![0, 1, 2, 3]);
    assert_eq!(registry.len(), 4);

    assert!(registry.register_alias("", "x").is_err());
    assert!(registry.register_alias("e.com", "  ").is_err());
    assert_eq!(registry.len(), 4);
    assert_eq!(registry.register_alias("e.com", "fresh").unwrap(), 4);
}

#[test]
fn test_monotonic_allocation() {
    check_monotonic_allocation::<LinkedRegistry>();
    check_monotonic_allocation::<UnlinkedRegistry>();
}
