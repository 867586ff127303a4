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

use std::path::PathBuf;

/// Environment variable naming the session file.
pub const SESSION_ENV: &str = "NYM_SESSION";

/// Environment variable holding a `tracing` filter directive.
pub const LOG_ENV: &str = "RUST_LOG";

const DEFAULT_SESSION_FILE: &str = "nym-session.json";
const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Where the session's blobs live between invocations.
    pub session_file: PathBuf,
    /// Filter directive for the log subscriber.
    pub log_filter: String,
    /// Set when `log_filter` came from the environment instead of the default.
    #[serde(skip)]
    explicit_log_filter: bool,
}

impl Default for Config {
    /// A session file in the temporary directory, so it goes away with the login session.
    fn default() -> Self {
        Config {
            session_file: std::env::temp_dir().join(DEFAULT_SESSION_FILE),
            log_filter: DEFAULT_LOG_FILTER.to_owned(),
            explicit_log_filter: false,
        }
    }
}

impl Config {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for [`SESSION_ENV`] and [`LOG_ENV`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Config::default();
        if let Some(path) = lookup(SESSION_ENV).filter(|p| !p.is_empty()) {
            config.session_file = PathBuf::from(path);
        }
        if let Some(filter) = lookup(LOG_ENV).filter(|f| !f.is_empty()) {
            config.log_filter = filter;
            config.explicit_log_filter = true;
        }
        config
    }

    pub fn with_session_file(mut self, path: Option<PathBuf>) -> Self {
        if let Some(path) = path {
            self.session_file = path;
        }
        self
    }

    /// Raise the log filter to `debug` unless an explicit filter was configured.
    pub fn verbose(mut self, verbose: bool) -> Self {
        if verbose && !self.explicit_log_filter {
            self.log_filter = "debug".to_owned();
        }
        self
    }
}

#[test]
fn test_defaults() {
    let config = Config::from_lookup(|_| None);
    assert_eq!(config, Config::default());
    assert!(config.session_file.ends_with(DEFAULT_SESSION_FILE));
    assert_eq!(config.log_filter, "warn");
    assert_eq!(config.verbose(true).log_filter, "debug");
}

#[test]
fn test_overrides() {
    let config = Config::from_lookup(|key| match key {
        SESSION_ENV => Some("/var/tmp/alice.json".to_owned()),
        LOG_ENV => Some("seeded_pseudonyms=trace".to_owned()),
        _ => None,
    });
    assert_eq!(config.session_file, PathBuf::from("/var/tmp/alice.json"));
    assert_eq!(config.log_filter, "seeded_pseudonyms=trace");
    // An explicit filter wins over --verbose.
    assert_eq!(config.clone().verbose(true).log_filter, "seeded_pseudonyms=trace");

    let config = config.with_session_file(Some(PathBuf::from("flag.json")));
    assert_eq!(config.session_file, PathBuf::from("flag.json"));
    let config = config.with_session_file(None);
    assert_eq!(config.session_file, PathBuf::from("flag.json"));

    let empty = Config::from_lookup(|_| Some(String::new()));
    assert_eq!(empty, Config::default());
}

#[test]
fn test_explicit_default_filter_kept() {
    let config = Config::from_lookup(|key| (key == LOG_ENV).then(|| "warn".to_owned()));
    assert_eq!(config.log_filter, "warn");
    assert_eq!(config.verbose(true).log_filter, "warn");
}
