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

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rand_core::OsRng;
use seeded_pseudonyms::config::Config;
use seeded_pseudonyms::storage::FileStorage;
use seeded_pseudonyms::{Mode, Registry, SessionStore};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "nym", author, version, about = "Per-site pseudonyms from one session seed")]
struct Cli {
    /// Session file to use instead of the configured one.
    #[arg(long, global = true)]
    session: Option<PathBuf>,
    /// Log debug output to stderr.
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    Linked,
    Unlinked,
}

impl From<ModeArg> for Mode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Linked => Mode::Linked,
            ModeArg::Unlinked => Mode::Unlinked,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the session seed.
    Seed {
        #[command(subcommand)]
        action: SeedAction,
    },
    /// Register an alias for a domain.
    Register {
        #[arg(long, value_enum, default_value = "linked")]
        mode: ModeArg,
        domain: String,
        alias: String,
    },
    /// List the domains with registered aliases.
    Domains {
        #[arg(long, value_enum, default_value = "linked")]
        mode: ModeArg,
    },
    /// List the aliases registered for a domain.
    Aliases {
        #[arg(long, value_enum, default_value = "linked")]
        mode: ModeArg,
        domain: String,
    },
    /// Print the pseudonym for a domain and alias.
    Derive {
        #[arg(long, value_enum, default_value = "linked")]
        mode: ModeArg,
        domain: String,
        alias: String,
    },
    /// Print the registry tables.
    Show {
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
    },
    /// Forget the seed and both registries.
    Reset,
    /// Print the effective configuration.
    Config,
}

#[derive(Subcommand)]
enum SeedAction {
    /// Replace the seed with a fresh random one.
    Generate,
    /// Replace the seed with the given 32 hex characters.
    Import { hex: String },
    /// Print the current seed.
    Show,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()
        .with_session_file(cli.session)
        .verbose(cli.verbose);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Seed { action } => {
            let mut store = open_store(&config)?;
            let seed = match action {
                SeedAction::Generate => Some(store.generate_seed(OsRng)?),
                SeedAction::Import { hex } => Some(store.import_seed(&hex)?),
                SeedAction::Show => store.seed(),
            };
            match seed {
                Some(seed) => println!("{}", seed.to_hex().as_str()),
                None => println!("no seed generated"),
            }
        }
        Commands::Register { mode, domain, alias } => {
            let index = open_store(&config)?
                .register_alias(mode.into(), &domain, &alias)
                .context("registration failed")?;
            println!("{index}");
        }
        Commands::Domains { mode } => {
            for domain in open_store(&config)?.list_domains(mode.into()) {
                println!("{domain}");
            }
        }
        Commands::Aliases { mode, domain } => {
            for alias in open_store(&config)?.list_aliases(mode.into(), &domain) {
                println!("{alias}");
            }
        }
        Commands::Derive { mode, domain, alias } => {
            let pseudonym = open_store(&config)?.pseudonym(mode.into(), &domain, &alias)?;
            println!("{pseudonym}");
        }
        Commands::Show { mode } => {
            let store = open_store(&config)?;
            let mode = mode.map(Mode::from);
            if mode != Some(Mode::Unlinked) {
                show_linked(&store);
            }
            if mode != Some(Mode::Linked) {
                show_unlinked(&store);
            }
        }
        Commands::Reset => {
            open_store(&config)?.reset()?;
            println!("session cleared");
        }
    }
    Ok(())
}

fn open_store(config: &Config) -> Result<SessionStore<FileStorage>> {
    let storage = FileStorage::new(&config.session_file);
    debug!(session = %storage.path().display(), "opening session file");
    SessionStore::open(storage)
        .with_context(|| format!("failed to open session {}", config.session_file.display()))
}

fn show_linked(store: &SessionStore<FileStorage>) {
    let linked = store.linked();
    println!("linked registry ({} aliases)", linked.len());
    println!("  {:<32} aliases", "domain");
    for (domain, aliases) in linked.sites() {
        println!("  {:<32} {}", domain, aliases.join(", "));
    }
    println!("  {:<32} index", "alias");
    for (alias, index) in linked.aliases() {
        println!("  {alias:<32} {index}");
    }
}

fn show_unlinked(store: &SessionStore<FileStorage>) {
    let unlinked = store.unlinked();
    println!("unlinked registry ({} entries)", unlinked.len());
    println!("  {:<32} {:>6} alias", "domain", "index");
    for (index, entry) in unlinked.entries() {
        println!("  {:<32} {:>6} {}", entry.domain, index, entry.alias);
    }
}
