//! The `evq` configuration file.
//!
//! ```toml
//! [client]
//! poll_interval_ms = 75
//! query_timeout_ms = 30000
//!
//! [search]
//! max_results = 1000
//! is_regex = false
//!
//! [presets.docs]
//! pattern = "ext:pdf;docx %s"
//! ```
//!
//! Every table and field is optional.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use client::ClientConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Placeholder in a preset pattern that the search terms replace.
pub const TERMS_PLACEHOLDER: &str = "%s";

/// Characters a preset name may not contain.
pub const FORBIDDEN_NAME_CHARS: &str = ":;,/|\\";

const DEFAULT_MAX_RESULTS: u32 = 1000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub client: ClientConfig,
    pub search: SearchDefaults,
    pub presets: BTreeMap<String, Preset>,
}

/// Defaults for `evq search` options not given on the command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchDefaults {
    pub max_results: u32,
    pub is_regex: bool,
}

impl Default for SearchDefaults {
    fn default() -> Self {
        Self {
            max_results: DEFAULT_MAX_RESULTS,
            is_regex: false,
        }
    }
}

/// A named search: a pattern the user's terms are substituted into.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preset {
    pub pattern: String,
    /// Falls back to `[search].is_regex` when absent.
    pub is_regex: Option<bool>,
    pub allow_empty_search: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PresetError {
    #[error("no preset named \"{0}\"")]
    Unknown(String),

    #[error("preset name must not be empty")]
    EmptyName,

    #[error("preset name \"{name}\" contains a forbidden character (any of :;,/|\\)")]
    ForbiddenCharacter { name: String },

    #[error("preset \"{0}\" has no pattern")]
    EmptyPattern(String),

    #[error("pattern of preset \"{0}\" has no %s placeholder")]
    MissingPlaceholder(String),

    #[error("preset \"{0}\" needs search terms")]
    EmptySearch(String),

    #[error("presets \"{0}\" and \"{1}\" differ only by case")]
    Duplicate(String, String),
}

/// A preset resolved against the search defaults, ready to expand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPreset<'a> {
    pub name: &'a str,
    pub preset: &'a Preset,
    pub is_regex: bool,
}

impl ResolvedPreset<'_> {
    /// Substitutes `terms` for every placeholder in the pattern.
    pub fn expand(&self, terms: &str) -> Result<String, PresetError> {
        if terms.is_empty() && !self.preset.allow_empty_search {
            return Err(PresetError::EmptySearch(self.name.to_owned()));
        }
        Ok(self.preset.pattern.replace(TERMS_PLACEHOLDER, terms))
    }
}

impl Config {
    /// Loads `path`, or the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            tracing::debug!("No configuration file given, using defaults");
            return Ok(Self::default());
        };
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::parse(&contents)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        tracing::debug!(path = %path.display(), presets = config.presets.len(), "Loaded configuration");
        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.client.validate()?;
        config.check_preset_names()?;
        Ok(config)
    }

    fn check_preset_names(&self) -> Result<(), PresetError> {
        let mut seen: BTreeMap<String, &str> = BTreeMap::new();
        for name in self.presets.keys() {
            validate_name(name)?;
            if let Some(previous) = seen.insert(name.to_lowercase(), name) {
                return Err(PresetError::Duplicate(previous.to_owned(), name.clone()));
            }
        }
        Ok(())
    }

    /// Finds a preset by case-insensitive name and checks its pattern.
    pub fn preset(&self, name: &str) -> Result<ResolvedPreset<'_>, PresetError> {
        let name = name.trim();
        validate_name(name)?;
        let (name, preset) = self
            .presets
            .iter()
            .find(|(key, _)| key.to_lowercase() == name.to_lowercase())
            .ok_or_else(|| PresetError::Unknown(name.to_owned()))?;

        if preset.pattern.trim().is_empty() {
            return Err(PresetError::EmptyPattern(name.clone()));
        }
        if !preset.pattern.contains(TERMS_PLACEHOLDER) {
            return Err(PresetError::MissingPlaceholder(name.clone()));
        }
        Ok(ResolvedPreset {
            name,
            preset,
            is_regex: preset.is_regex.unwrap_or(self.search.is_regex),
        })
    }
}

fn validate_name(name: &str) -> Result<(), PresetError> {
    if name.trim().is_empty() {
        return Err(PresetError::EmptyName);
    }
    if name.chars().any(|c| FORBIDDEN_NAME_CHARS.contains(c)) {
        return Err(PresetError::ForbiddenCharacter {
            name: name.to_owned(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const SAMPLE: &str = r#"
[client]
query_timeout_ms = 5000

[search]
max_results = 50
is_regex = true

[presets.Docs]
pattern = "ext:pdf;docx %s"
is_regex = false

[presets.recent]
pattern = "dm:today %s"
allow_empty_search = true
"#;

    #[test]
    fn missing_file_means_defaults() {
        let config = Config::load(None).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.search.max_results, 1000);
        assert_eq!(config.client.poll_interval_ms, 75);
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.client.query_timeout_ms, 5000);
        assert_eq!(config.client.poll_interval_ms, 75);
        assert_eq!(config.search.max_results, 50);
        assert_eq!(config.presets.len(), 2);
    }

    #[test]
    fn unreadable_file_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let err = Config::load(Some(&path)).unwrap_err();
        assert!(format!("{err:#}").contains("absent.toml"));
    }

    #[test]
    fn invalid_client_timings_are_rejected() {
        let err = Config::parse("[client]\npoll_interval_ms = 0\n").unwrap_err();
        assert!(format!("{err:#}").contains("poll_interval_ms"));
    }

    #[test]
    fn presets_are_found_case_insensitively_and_expanded() {
        let config = Config::parse(SAMPLE).unwrap();

        let docs = config.preset("DOCS").unwrap();
        assert_eq!(docs.name, "Docs");
        assert!(!docs.is_regex);
        assert_eq!(docs.expand("report").unwrap(), "ext:pdf;docx report");
        assert_eq!(docs.expand(""), Err(PresetError::EmptySearch("Docs".into())));

        let recent = config.preset("recent").unwrap();
        assert!(recent.is_regex, "falls back to [search].is_regex");
        assert_eq!(recent.expand("").unwrap(), "dm:today ");
    }

    #[test]
    fn preset_names_are_validated() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(config.preset("  "), Err(PresetError::EmptyName));
        assert!(matches!(
            config.preset("a/b"),
            Err(PresetError::ForbiddenCharacter { .. })
        ));
        assert_eq!(config.preset("missing"), Err(PresetError::Unknown("missing".into())));

        let err = Config::parse("[presets.\"x;y\"]\npattern = \"%s\"\n").unwrap_err();
        assert!(format!("{err:#}").contains("forbidden"));

        let err = Config::parse("[presets.a]\npattern = \"%s\"\n[presets.A]\npattern = \"%s\"\n")
            .unwrap_err();
        assert!(format!("{err:#}").contains("differ only by case"));
    }

    #[test]
    fn preset_patterns_are_validated_on_use() {
        let config = Config::parse(
            "[presets.blank]\npattern = \"\"\n[presets.fixed]\npattern = \"ext:mp3\"\n",
        )
        .unwrap();
        assert_eq!(config.preset("blank"), Err(PresetError::EmptyPattern("blank".into())));
        assert_eq!(
            config.preset("fixed"),
            Err(PresetError::MissingPlaceholder("fixed".into()))
        );
    }
}
