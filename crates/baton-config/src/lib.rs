// SPDX-FileCopyrightText: 2026 Baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for the Baton coordination core.
//!
//! [`BatonConfig`] has four sections: `log`, `storage`, `bus` and `cost`.
//! Values come from compiled defaults, up to three `baton.toml` files, and
//! `BATON_<SECTION>_<KEY>` environment variables (see [`loader`]). Unknown
//! keys are rejected, and every semantic problem is reported at once.
//!
//! ```no_run
//! match baton_config::load_and_validate() {
//!     Ok(config) => println!("alerts go to {}", config.bus.alert_topic),
//!     Err(errors) => baton_config::render_errors(&errors),
//! }
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

use std::path::Path;

pub use diagnostic::{render_errors, ConfigError};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::BatonConfig;

/// Load from the standard locations and the environment, then validate.
pub fn load_and_validate() -> Result<BatonConfig, Vec<ConfigError>> {
    checked(loader::load_config(), read_sources(loader::config_file_paths().as_slice()))
}

/// Load one explicit file plus the environment, then validate.
pub fn load_and_validate_path(path: &Path) -> Result<BatonConfig, Vec<ConfigError>> {
    checked(loader::load_config_from_path(path), read_sources(&[path]))
}

/// Parse an in-memory TOML document over the defaults, then validate.
pub fn load_and_validate_str(toml_content: &str) -> Result<BatonConfig, Vec<ConfigError>> {
    let sources = vec![("<inline>".to_string(), toml_content.to_string())];
    checked(loader::load_config_from_str(toml_content), sources)
}

#[allow(clippy::result_large_err)]
fn checked(
    loaded: Result<BatonConfig, figment::Error>,
    sources: Vec<(String, String)>,
) -> Result<BatonConfig, Vec<ConfigError>> {
    let config =
        loaded.map_err(|err| diagnostic::figment_to_config_errors(err, &sources))?;
    validation::validate_config(&config)?;
    Ok(config)
}

/// Contents of the readable files among `paths`, keyed the way figment
/// reports file sources so diagnostics can point into them.
fn read_sources<P: AsRef<Path>>(paths: &[P]) -> Vec<(String, String)> {
    paths
        .iter()
        .filter_map(|path| {
            let path = path.as_ref();
            let content = std::fs::read_to_string(path).ok()?;
            let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
            Some((absolute.display().to_string(), content))
        })
        .collect()
}
