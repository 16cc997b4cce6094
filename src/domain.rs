use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::HarvestError;

/// Locale identifier as used by the upstream catalog: a lowercase base
/// language code, optionally followed by an underscore and a country
/// variant (`en`, `pt_BR`, `zh_CN`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocaleSlug(String);

impl LocaleSlug {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Base language code, with any country variant stripped (`pt_BR` -> `pt`).
    pub fn base_code(&self) -> &str {
        self.0.split('_').next().unwrap_or(&self.0)
    }

    pub fn is_variant(&self) -> bool {
        self.0.contains('_')
    }

    /// Lowercase, dash-separated form used in archive file names
    /// (`pt_BR` -> `pt-br`).
    pub fn archive_code(&self) -> String {
        self.0.to_lowercase().replace('_', "-")
    }
}

impl fmt::Display for LocaleSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LocaleSlug {
    type Err = HarvestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let (base, variant) = match trimmed.split_once('_') {
            Some((base, variant)) => (base, Some(variant)),
            None => (trimmed, None),
        };
        let base_ok = (2..=3).contains(&base.len())
            && base.chars().all(|ch| ch.is_ascii_lowercase());
        let variant_ok = variant.is_none_or(|v| {
            (2..=3).contains(&v.len()) && v.chars().all(|ch| ch.is_ascii_alphanumeric())
        });
        if !base_ok || !variant_ok {
            return Err(HarvestError::InvalidLocale(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// One row of the upstream language listing, keyed by `slug` after discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageDescriptor {
    pub slug: LocaleSlug,
    pub lang_code: String,
    pub name: String,
    pub local_name: String,
    pub source_url: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub title: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Simulation {
    pub id: String,
    pub language: LocaleSlug,
    pub title: String,
    pub categories: Vec<Category>,
    pub topics: Vec<String>,
    pub description: String,
}

/// A document or image URL required by one simulation instance. Consumed by
/// the downloader; a failed download marks the owning `(id, language)` pair
/// for catalog eviction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetReference {
    pub id: String,
    pub language: LocaleSlug,
    pub url: String,
}

impl AssetReference {
    /// Local file name for the downloaded asset. Remote image names carry a
    /// resolution suffix (`id-600.png`) that must not appear in the staging
    /// directory, since rewritten documents reference the bare name.
    pub fn local_file_name(&self) -> String {
        let remote = self.url.rsplit('/').next().unwrap_or(&self.url);
        match remote.strip_suffix(".png") {
            Some(stem) => match stem.rsplit_once('-') {
                Some((prefix, suffix)) if suffix.chars().all(|ch| ch.is_ascii_digit()) => {
                    format!("{prefix}.png")
                }
                _ => remote.to_string(),
            },
            None => remote.to_string(),
        }
    }
}

/// One requested archive build: a deterministic output name and the set of
/// locales whose documents it packages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportTarget {
    pub output: String,
    pub date: NaiveDate,
    pub languages: Vec<LocaleSlug>,
}

/// Metadata record sealed into the archive at finalize time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ArchiveMetadata {
    pub name: String,
    pub title: String,
    pub description: String,
    pub creator: String,
    pub publisher: String,
    pub language: String,
    pub date: String,
    pub tags: String,
    pub source: String,
}

/// Splits a packaged file name of the form `<id>_<locale>.<ext>` into its id
/// and locale parts. The id never contains an underscore; the locale may
/// (`pt_BR`), so the split happens at the first underscore and the last dot.
pub fn split_id_and_language(file_name: &str) -> Option<(String, LocaleSlug)> {
    let base = file_name.rsplit('/').next().unwrap_or(file_name);
    let stem = &base[..base.rfind('.')?];
    let (id, lang) = stem.split_once('_')?;
    let slug = lang.parse().ok()?;
    if id.is_empty() {
        return None;
    }
    Some((id.to_string(), slug))
}
