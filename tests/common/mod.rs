use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use bytes::Bytes;
use camino::Utf8PathBuf;

use phet_harvester::config::HarvestConfig;
use phet_harvester::domain::LocaleSlug;
use phet_harvester::error::HarvestError;
use phet_harvester::fetch::{FetchError, Fetcher};
use phet_harvester::source::{
    CategoryListing, DetailPage, LanguageRow, SimulationListing, SimulationSource,
};

pub const BASE_URL: &str = "https://stub.test";

/// In-memory stand-in for the upstream catalog.
#[derive(Default)]
pub struct StubSource {
    pub languages: Vec<LanguageRow>,
    pub listings: Vec<SimulationListing>,
    /// Keyed by `(language, id)`; a missing key behaves like a 404.
    pub details: HashMap<(String, String), DetailPage>,
    /// Keyed by `(language, category slug)`.
    pub categories: HashMap<(String, String), CategoryListing>,
    /// Languages whose category listing requests fail outright.
    pub broken_category_languages: BTreeSet<String>,
}

impl StubSource {
    pub fn add_language(&mut self, slug: &str, count: usize) {
        self.languages.push(LanguageRow {
            slug: slug.parse().unwrap(),
            count,
            url: format!("{BASE_URL}/en/simulations/filter?locale={slug}&type=html"),
        });
    }

    pub fn add_listing(&mut self, language: &str, id: &str, title: &str) {
        self.listings.push(SimulationListing {
            language: language.parse().unwrap(),
            id: id.to_string(),
            title: title.to_string(),
        });
    }

    pub fn add_detail(&mut self, language: &str, id: &str, page: DetailPage) {
        self.details
            .insert((language.to_string(), id.to_string()), page);
    }
}

pub fn detail(real_id: &str, title: &str, description: &str) -> DetailPage {
    DetailPage {
        real_id: real_id.to_string(),
        title: Some(title.to_string()),
        description: description.to_string(),
        topics: Vec::new(),
    }
}

#[async_trait]
impl SimulationSource for StubSource {
    async fn language_rows(&self) -> Result<Vec<LanguageRow>, HarvestError> {
        Ok(self.languages.clone())
    }

    async fn simulation_listings(&self) -> Result<Vec<SimulationListing>, HarvestError> {
        Ok(self.listings.clone())
    }

    async fn category_listing(
        &self,
        language: &LocaleSlug,
        category_slug: &str,
    ) -> Result<CategoryListing, HarvestError> {
        if self.broken_category_languages.contains(language.as_str()) {
            return Err(HarvestError::Fetch(FetchError::Status {
                url: format!("{BASE_URL}/{language}/simulations/filter"),
                status: 500,
            }));
        }
        Ok(self
            .categories
            .get(&(language.to_string(), category_slug.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn detail_page(
        &self,
        language: &LocaleSlug,
        id: &str,
    ) -> Result<DetailPage, HarvestError> {
        self.details
            .get(&(language.to_string(), id.to_string()))
            .cloned()
            .ok_or_else(|| {
                HarvestError::Fetch(FetchError::NotFound {
                    url: format!("{BASE_URL}/{language}/simulation/{id}"),
                })
            })
    }
}

/// In-memory asset server. Unknown URLs 404; listed URLs can be forced to
/// fail with a 500 instead.
#[derive(Default)]
pub struct StubFetcher {
    responses: HashMap<String, Bytes>,
    failing: BTreeSet<String>,
}

impl StubFetcher {
    pub fn serve(&mut self, url: &str, body: &[u8]) {
        self.responses
            .insert(url.to_string(), Bytes::copy_from_slice(body));
    }

    pub fn fail(&mut self, url: &str) {
        self.failing.insert(url.to_string());
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        if self.failing.contains(url) {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: 500,
            });
        }
        self.responses
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::NotFound {
                url: url.to_string(),
            })
    }
}

/// Run configuration pointed at a sandbox directory.
pub fn sandbox_config(root: &std::path::Path) -> HarvestConfig {
    let root = Utf8PathBuf::from_path_buf(root.to_path_buf()).unwrap();
    HarvestConfig {
        state_dir: root.join("state"),
        output_dir: root.join("dist"),
        workers: 4,
        base_url: BASE_URL.to_string(),
        subjects: vec!["Physics".to_string()],
        ..HarvestConfig::default()
    }
}
