// SPDX-FileCopyrightText: 2026 Baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading.
//!
//! Later layers override earlier ones:
//!
//! 1. compiled defaults
//! 2. `/etc/baton/baton.toml`
//! 3. `$XDG_CONFIG_HOME/baton/baton.toml`
//! 4. `./baton.toml`
//! 5. `BATON_<SECTION>_<KEY>` environment variables
//!
//! Missing files are skipped.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;

use crate::model::BatonConfig;

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "BATON_";

/// Top-level sections of [`BatonConfig`], as written in TOML.
pub const SECTIONS: [&str; 4] = ["log", "storage", "bus", "cost"];

/// Config files consulted by [`load_config`], lowest precedence first.
pub fn config_file_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc/baton/baton.toml")];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("baton").join("baton.toml"));
    }
    paths.push(PathBuf::from("baton.toml"));
    paths
}

/// Defaults, then `files` in order, then the environment.
fn layered<P: AsRef<Path>>(files: &[P]) -> Figment {
    let figment = files.iter().fold(
        Figment::from(Serialized::defaults(BatonConfig::default())),
        |figment, path| figment.merge(Toml::file(path.as_ref())),
    );
    figment.merge(env_provider())
}

/// Load from the standard file locations and the environment.
pub fn load_config() -> Result<BatonConfig, figment::Error> {
    layered(config_file_paths().as_slice()).extract()
}

/// Load from one explicit file plus the environment.
pub fn load_config_from_path(path: &Path) -> Result<BatonConfig, figment::Error> {
    layered(&[path]).extract()
}

/// Load from an in-memory TOML document over the defaults. The environment
/// is not consulted.
pub fn load_config_from_str(toml_content: &str) -> Result<BatonConfig, figment::Error> {
    Figment::from(Serialized::defaults(BatonConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Map an environment variable name, prefix already stripped, to a config
/// key path.
///
/// The first underscore-separated word names the section and the rest is
/// the field, so `BUS_MAX_RETRIES` becomes `bus.max_retries`. Names that do
/// not start with a known section are returned lowercased and unchanged,
/// which surfaces them as unknown keys.
pub fn env_key(name: &str) -> String {
    let lower = name.to_ascii_lowercase();
    match lower.split_once('_') {
        Some((section, field)) if SECTIONS.contains(&section) && !field.is_empty() => {
            format!("{section}.{field}")
        }
        _ => lower,
    }
}

fn env_provider() -> Env {
    Env::prefixed(ENV_PREFIX).map(|name| env_key(name.as_str()).into())
}
