use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::LocaleSlug;
use crate::error::HarvestError;

pub const DEFAULT_RPS: u32 = 8;
pub const DEFAULT_RETRIES: u32 = 5;
pub const DEFAULT_WORKERS: usize = 10;
pub const DEFAULT_IMAGE_RESOLUTION: u32 = 600;
pub const DEFAULT_FAILURE_THRESHOLD: usize = 10;

pub fn default_subjects() -> Vec<String> {
    ["Physics", "Biology", "Chemistry", "Earth Science", "Math"]
        .map(String::from)
        .to_vec()
}

/// On-disk shape of `harvest.json`. Every field is optional; missing fields
/// take the defaults above.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFile {
    #[serde(default)]
    pub include_languages: Option<Vec<String>>,
    #[serde(default)]
    pub exclude_languages: Option<Vec<String>>,
    #[serde(default)]
    pub without_language_variants: Option<bool>,
    #[serde(default)]
    pub mul_only: Option<bool>,
    #[serde(default)]
    pub create_mul: Option<bool>,
    #[serde(default)]
    pub subjects: Option<Vec<String>>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub rps: Option<u32>,
    #[serde(default)]
    pub retries: Option<u32>,
    #[serde(default)]
    pub image_resolution: Option<u32>,
    #[serde(default)]
    pub failure_threshold: Option<usize>,
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Fully resolved run configuration, immutable once the pipeline starts.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// When present, only these slugs survive discovery. English is always
    /// force-included, since it is the fallback source for every stage.
    pub include_languages: Option<Vec<LocaleSlug>>,
    pub exclude_languages: Vec<LocaleSlug>,
    pub without_language_variants: bool,
    pub mul_only: bool,
    pub create_mul: bool,
    pub subjects: Vec<String>,
    pub output_dir: Utf8PathBuf,
    pub state_dir: Utf8PathBuf,
    pub workers: usize,
    pub rps: u32,
    pub retries: u32,
    pub image_resolution: u32,
    pub failure_threshold: usize,
    pub verbose_errors: bool,
    pub base_url: String,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            include_languages: None,
            exclude_languages: Vec::new(),
            without_language_variants: false,
            mul_only: false,
            create_mul: true,
            subjects: default_subjects(),
            output_dir: Utf8PathBuf::from("dist"),
            state_dir: Utf8PathBuf::from("state"),
            workers: DEFAULT_WORKERS,
            rps: DEFAULT_RPS,
            retries: DEFAULT_RETRIES,
            image_resolution: DEFAULT_IMAGE_RESOLUTION,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            verbose_errors: false,
            base_url: crate::source::DEFAULT_BASE_URL.to_string(),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `harvest.json` (or an explicit path), applies environment
    /// overrides on top. A missing default-path file is not an error; the
    /// pipeline runs fine on defaults alone.
    pub fn resolve(path: Option<&str>) -> Result<HarvestConfig, HarvestError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from("harvest.json"),
        };

        let file = if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .map_err(|_| HarvestError::ConfigRead(config_path.clone()))?;
            serde_json::from_str(&content)
                .map_err(|err| HarvestError::ConfigParse(err.to_string()))?
        } else if path.is_some() {
            return Err(HarvestError::ConfigRead(config_path));
        } else {
            ConfigFile::default()
        };

        let mut config = Self::resolve_file(file)?;
        apply_env_overrides(&mut config);
        Ok(config)
    }

    pub fn resolve_file(file: ConfigFile) -> Result<HarvestConfig, HarvestError> {
        let defaults = HarvestConfig::default();

        let include_languages = match file.include_languages {
            Some(raw) => Some(resolve_include_list(raw)?),
            None => None,
        };
        let exclude_languages = file
            .exclude_languages
            .unwrap_or_default()
            .iter()
            .map(|slug| slug.parse())
            .collect::<Result<Vec<_>, _>>()?;

        Ok(HarvestConfig {
            include_languages,
            exclude_languages,
            without_language_variants: file
                .without_language_variants
                .unwrap_or(defaults.without_language_variants),
            mul_only: file.mul_only.unwrap_or(defaults.mul_only),
            create_mul: file.create_mul.unwrap_or(defaults.create_mul),
            subjects: file.subjects.unwrap_or(defaults.subjects),
            output_dir: file
                .output
                .map(Utf8PathBuf::from)
                .unwrap_or(defaults.output_dir),
            state_dir: defaults.state_dir,
            workers: file.workers.unwrap_or(defaults.workers),
            rps: file.rps.unwrap_or(defaults.rps),
            retries: file.retries.unwrap_or(defaults.retries),
            image_resolution: file.image_resolution.unwrap_or(defaults.image_resolution),
            failure_threshold: file.failure_threshold.unwrap_or(defaults.failure_threshold),
            verbose_errors: defaults.verbose_errors,
            base_url: file
                .base_url
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
        })
    }
}

/// Parses an include list, force-including English: every stage falls back
/// to English data, so harvesting without it would leave nothing to fall
/// back to.
pub fn resolve_include_list(raw: Vec<String>) -> Result<Vec<LocaleSlug>, HarvestError> {
    let mut slugs = raw
        .iter()
        .map(|slug| slug.parse())
        .collect::<Result<Vec<LocaleSlug>, _>>()?;
    if !slugs.iter().any(|slug| slug.as_str() == "en") {
        slugs.insert(0, "en".parse()?);
    }
    Ok(slugs)
}

fn apply_env_overrides(config: &mut HarvestConfig) {
    if let Some(rps) = env_parse::<u32>("PHET_RPS") {
        config.rps = rps;
    }
    if let Some(retries) = env_parse::<u32>("PHET_RETRIES") {
        config.retries = retries;
    }
    if let Some(workers) = env_parse::<usize>("PHET_WORKERS") {
        config.workers = workers;
    }
    if let Ok(value) = std::env::var("PHET_VERBOSE_ERRORS") {
        config.verbose_errors = value == "true";
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|value| value.parse().ok())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn defaults_when_file_is_empty() {
        let config = ConfigLoader::resolve_file(ConfigFile::default()).unwrap();
        assert_eq!(config.rps, DEFAULT_RPS);
        assert_eq!(config.workers, DEFAULT_WORKERS);
        assert_eq!(config.failure_threshold, DEFAULT_FAILURE_THRESHOLD);
        assert!(config.create_mul);
        assert!(!config.mul_only);
        assert_eq!(config.subjects.len(), 5);
        assert!(config.include_languages.is_none());
    }

    #[test]
    fn include_list_force_includes_english() {
        let slugs = resolve_include_list(vec!["fr".to_string(), "de".to_string()]).unwrap();
        assert_eq!(slugs[0].as_str(), "en");
        assert_eq!(slugs.len(), 3);

        let slugs = resolve_include_list(vec!["en".to_string(), "fr".to_string()]).unwrap();
        assert_eq!(slugs.len(), 2);
    }

    #[test]
    fn invalid_slug_in_file_is_rejected() {
        let file = ConfigFile {
            exclude_languages: Some(vec!["not a slug".to_string()]),
            ..ConfigFile::default()
        };
        let err = ConfigLoader::resolve_file(file).unwrap_err();
        assert_matches!(err, HarvestError::InvalidLocale(_));
    }

    #[test]
    fn file_values_override_defaults() {
        let file = ConfigFile {
            rps: Some(2),
            workers: Some(3),
            mul_only: Some(true),
            output: Some("out".to_string()),
            ..ConfigFile::default()
        };
        let config = ConfigLoader::resolve_file(file).unwrap();
        assert_eq!(config.rps, 2);
        assert_eq!(config.workers, 3);
        assert!(config.mul_only);
        assert_eq!(config.output_dir, Utf8PathBuf::from("out"));
    }
}
