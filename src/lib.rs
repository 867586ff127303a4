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

//! # Seeded Pseudonyms
//!
//! A user holds one secret [`Seed`] for the session and wants a different identifier for every
//! site they visit. Each identifier is an HMAC of a small integer index under the seed, and the
//! index comes from one of two registries:
//!
//! * the [linked](registry::LinkedRegistry) registry keys indices by alias alone, so the same
//!   alias yields the same pseudonym on every domain;
//! * the [unlinked](registry::UnlinkedRegistry) registry gives every `(domain, alias)` pair its
//!   own index, so nothing ties one domain's pseudonym to another's.
//!
//! [`SessionStore`] ties the seed and both registries to a [`storage::Storage`] backend.

mod error;

/// Configuration for the command line front end.
pub mod config;

/// Deterministic derivation of pseudonyms from a seed and an index.
pub mod pseudonym;

/// Registries mapping `(domain, alias)` selections to derivation indices.
pub mod registry;

/// The session's secret key material.
pub mod seed;

/// Key/value blob backends the session is persisted to.
pub mod storage;

/// The session object owning the seed and both registries.
pub mod store;

pub use crate::error::{Error, Result};
pub use crate::pseudonym::{derive, Pseudonym};
pub use crate::registry::{Index, LinkedRegistry, Mode, Persisted, Registry, UnlinkedRegistry};
pub use crate::seed::Seed;
pub use crate::store::SessionStore;
