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

use thiserror::Error;

/// Everything that can go wrong in a single session operation.
///
/// None of these are fatal. An operation that fails leaves the seed, both registries and the
/// backing storage exactly as they were before it was called.
#[derive(Debug, Error)]
pub enum Error {
    #[error("no seed available, generate one first")]
    MissingSeed,

    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: &'static str },

    #[error("no {0} selected")]
    MissingSelection(&'static str),

    #[error("alias {alias:?} is already registered for {domain:?}")]
    DuplicateRegistration { domain: String, alias: String },

    #[error("failed to resolve an index for alias {alias:?} on {domain:?}")]
    UnresolvedIndex { domain: String, alias: String },

    #[error("every index has been allocated")]
    IndexExhausted,

    #[error("malformed seed: {0}")]
    MalformedSeed(String),

    #[error("stored {key} is corrupt: {reason}")]
    CorruptRegistry { key: &'static str, reason: String },

    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
