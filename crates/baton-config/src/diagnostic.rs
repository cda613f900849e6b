// SPDX-FileCopyrightText: 2026 Baton Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration errors as miette diagnostics.
//!
//! Unknown keys carry a "did you mean" suggestion and, when the key came
//! from a TOML file, a labelled span into that file. Keys that came from the
//! environment name the variable to fix instead.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use figment::error::Kind;
use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use crate::loader::ENV_PREFIX;

/// Jaro-Winkler score a candidate must beat to be suggested.
const SUGGESTION_THRESHOLD: f64 = 0.75;

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("unknown configuration key `{key}`")]
    #[diagnostic(
        code(baton::config::unknown_key),
        help("{}", unknown_key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        /// Full dotted path, e.g. `bus.max_retires`.
        key: String,
        suggestion: Option<String>,
        /// Comma-separated keys accepted at that position.
        valid_keys: String,
        #[label("not a Baton setting")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("invalid value for `{key}`: found {found}, expected {expected}")]
    #[diagnostic(code(baton::config::invalid_type))]
    InvalidType {
        key: String,
        found: String,
        expected: String,
    },

    #[error("environment variable `{var}` is not a Baton setting")]
    #[diagnostic(
        code(baton::config::unknown_env),
        help("{}", unknown_key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownEnvVar {
        var: String,
        /// Suggested variable name.
        suggestion: Option<String>,
        valid_keys: String,
    },

    #[error("validation error: {message}")]
    #[diagnostic(code(baton::config::validation))]
    Validation { message: String },

    #[error("configuration error: {0}")]
    #[diagnostic(code(baton::config::other))]
    Other(String),
}

fn unknown_key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? Valid keys: {valid_keys}"),
        None => format!("valid keys: {valid_keys}"),
    }
}

/// Convert every error inside a `figment::Error`.
///
/// `toml_sources` pairs file paths with their contents and is used to point
/// at the offending line.
pub fn figment_to_config_errors(
    err: figment::Error,
    toml_sources: &[(String, String)],
) -> Vec<ConfigError> {
    err.into_iter()
        .map(|error| convert(&error, toml_sources))
        .collect()
}

fn convert(error: &figment::Error, toml_sources: &[(String, String)]) -> ConfigError {
    let section: Vec<String> = error.path.clone();
    match &error.kind {
        Kind::UnknownField(field, expected) => {
            let suggestion = suggest_key(field, expected);
            let valid_keys = expected.join(", ");
            if from_environment(error) {
                return ConfigError::UnknownEnvVar {
                    var: env_var_name(&section, field),
                    suggestion: suggestion.map(|s| env_var_name(&section, &s)),
                    valid_keys,
                };
            }
            let (span, src) = locate(error, &section, field, toml_sources);
            ConfigError::UnknownKey {
                key: dotted(&section, field),
                suggestion,
                valid_keys,
                span,
                src,
            }
        }
        Kind::InvalidType(found, expected) | Kind::InvalidValue(found, expected) => {
            ConfigError::InvalidType {
                key: section.join("."),
                found: found.to_string(),
                expected: expected.to_string(),
            }
        }
        _ => ConfigError::Other(error.to_string()),
    }
}

fn dotted(section: &[String], field: &str) -> String {
    section
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(field))
        .collect::<Vec<_>>()
        .join(".")
}

/// `["bus"]` and `max_retires` become `BATON_BUS_MAX_RETIRES`.
fn env_var_name(section: &[String], field: &str) -> String {
    format!("{ENV_PREFIX}{}", dotted(section, field).replace('.', "_")).to_ascii_uppercase()
}

fn from_environment(error: &figment::Error) -> bool {
    error
        .metadata
        .as_ref()
        .is_some_and(|m| m.name.contains("environment"))
}

fn locate(
    error: &figment::Error,
    section: &[String],
    field: &str,
    toml_sources: &[(String, String)],
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    let path = match error.metadata.as_ref().and_then(|m| m.source.as_ref()) {
        Some(figment::Source::File(path)) => path.display().to_string(),
        _ => return (None, None),
    };
    let Some((name, content)) = toml_sources.iter().find(|(p, _)| *p == path) else {
        return (None, None);
    };
    match find_key_offset(content, section, field) {
        Some(offset) => (
            Some(SourceSpan::new(offset.into(), field.len())),
            Some(NamedSource::new(name, content.clone())),
        ),
        None => (None, None),
    }
}

/// Byte offset of `field` as a key inside the `[section]` table of a TOML
/// document. An empty `section` searches the root table, before any header.
///
/// Only the lines of the matching table are searched, so a key of the same
/// name in a later table is not reported.
pub fn find_key_offset(content: &str, section: &[String], field: &str) -> Option<usize> {
    let wanted = section.join(".");
    let mut current = String::new();
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if let Some(header) = trimmed.strip_prefix('[') {
            current = header
                .split(']')
                .next()
                .unwrap_or_default()
                .trim()
                .to_string();
        } else if current == wanted
            && let Some(rest) = trimmed.strip_prefix(field)
            && rest.trim_start().starts_with('=')
        {
            return Some(offset + (line.len() - trimmed.len()));
        }
        offset += line.len();
    }
    None
}

/// Closest accepted key to `unknown`, if any is similar enough.
pub fn suggest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    valid_keys
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key), *key))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// Print every error to stderr with miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = miette::GraphicalReportHandler::new();
    for error in errors {
        let mut out = String::new();
        match handler.render_report(&mut out, error as &dyn Diagnostic) {
            Ok(()) => eprint!("{out}"),
            Err(_) => eprintln!("Error: {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> Vec<String> {
        vec![s.to_string()]
    }

    #[test]
    fn suggests_the_closest_key() {
        let valid = &["visibility_timeout_secs", "max_retries", "min_priority"];
        assert_eq!(suggest_key("max_retires", valid), Some("max_retries".into()));
        assert_eq!(suggest_key("levle", &["level"]), Some("level".into()));
        assert_eq!(suggest_key("zzzzzz", &["database_path", "wal_mode"]), None);
    }

    #[test]
    fn key_offset_is_scoped_to_its_table() {
        let content = "[storage]\nmax_retires = 1\n\n[bus]\nmax_retires = 4\n";
        let o = find_key_offset(content, &path("bus"), "max_retires").unwrap();
        assert_eq!(o, content.rfind("max_retires").unwrap());
    }

    #[test]
    fn key_offset_requires_an_assignment() {
        let content = "[bus]\nmax_retries_note = 1\nmax_retries = 2\n";
        let o = find_key_offset(content, &path("bus"), "max_retries").unwrap();
        assert_eq!(&content[o..], "max_retries = 2\n");
    }

    #[test]
    fn key_offset_in_root_table_and_missing_table() {
        let content = "logging = 1\n[bus]\n";
        assert_eq!(find_key_offset(content, &[], "logging"), Some(0));
        assert_eq!(find_key_offset(content, &path("cost"), "logging"), None);
    }

    #[test]
    fn env_var_names_are_uppercase_with_prefix() {
        assert_eq!(env_var_name(&path("bus"), "max_retires"), "BATON_BUS_MAX_RETIRES");
        assert_eq!(env_var_name(&[], "queue"), "BATON_QUEUE");
    }
}
