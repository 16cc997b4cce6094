use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::domain::{LocaleSlug, split_id_and_language};
use crate::error::HarvestError;
use crate::fetch::Fetcher;

pub const DEFAULT_BASE_URL: &str = "https://phet.colorado.edu";

/// One language advertised by the upstream metadata service, with the
/// number of simulations published in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageRow {
    pub slug: LocaleSlug,
    pub count: usize,
    /// Upstream listing URL for this locale's simulations.
    pub url: String,
}

/// One `(language, simulation, title)` triple from the upstream listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationListing {
    pub language: LocaleSlug,
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubCategory {
    pub title: String,
    pub slug: String,
}

/// Structured view of a filtered category listing page.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CategoryListing {
    pub translated_title: Option<String>,
    pub sim_ids: Vec<String>,
    pub sub_categories: Vec<SubCategory>,
}

/// Structured view of a simulation detail page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailPage {
    /// Simulation id as used in the packaged-download link. Authoritative;
    /// may differ from the id the listing used to reach the page.
    pub real_id: String,
    pub title: Option<String>,
    pub description: String,
    pub topics: Vec<String>,
}

/// Upstream catalog access, reduced to the structured records the pipeline
/// consumes. The HTTP implementation owns all selector logic; stages never
/// see markup.
#[async_trait]
pub trait SimulationSource: Send + Sync {
    async fn language_rows(&self) -> Result<Vec<LanguageRow>, HarvestError>;
    async fn simulation_listings(&self) -> Result<Vec<SimulationListing>, HarvestError>;
    async fn category_listing(
        &self,
        language: &LocaleSlug,
        category_slug: &str,
    ) -> Result<CategoryListing, HarvestError>;
    /// Fails with a 404 `FetchError` when the language has no localized
    /// detail page, so callers can fall back to English.
    async fn detail_page(
        &self,
        language: &LocaleSlug,
        id: &str,
    ) -> Result<DetailPage, HarvestError>;
}

/// Deterministic URL of the packaged simulation document for one locale.
pub fn document_url(base_url: &str, real_id: &str, language: &LocaleSlug) -> String {
    format!("{base_url}/sims/html/{real_id}/latest/{real_id}_{language}.html")
}

/// Deterministic URL of the preview image at the requested resolution.
pub fn image_url(base_url: &str, real_id: &str, resolution: u32) -> String {
    format!("{base_url}/sims/html/{real_id}/latest/{real_id}-{resolution}.png")
}

#[derive(Debug, Deserialize)]
struct MetaDocument {
    projects: Vec<MetaProject>,
}

#[derive(Debug, Deserialize)]
struct MetaProject {
    #[serde(rename = "type")]
    kind: u32,
    #[serde(default)]
    simulations: Vec<MetaSimulation>,
}

#[derive(Debug, Deserialize)]
struct MetaSimulation {
    name: String,
    #[serde(rename = "localizedSimulations", default)]
    localized: BTreeMap<String, MetaLocalized>,
}

#[derive(Debug, Deserialize)]
struct MetaLocalized {
    #[serde(default)]
    title: String,
}

const HTML5_PROJECT_TYPE: u32 = 2;

/// Live source backed by the shared rate-limited fetcher. The metadata
/// summary document feeds both the language rows and the simulation
/// listings, so it is fetched once and kept.
pub struct PhetSource {
    fetcher: Arc<dyn Fetcher>,
    base_url: String,
    meta: Mutex<Option<Arc<MetaDocument>>>,
}

impl PhetSource {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self::with_base_url(fetcher, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(fetcher: Arc<dyn Fetcher>, base_url: &str) -> Self {
        Self {
            fetcher,
            base_url: base_url.trim_end_matches('/').to_string(),
            meta: Mutex::new(None),
        }
    }

    async fn metadata(&self) -> Result<Arc<MetaDocument>, HarvestError> {
        let mut cached = self.meta.lock().await;
        if let Some(meta) = cached.as_ref() {
            return Ok(meta.clone());
        }
        let url = format!(
            "{}/services/metadata/1.3/simulations?format=json&summary",
            self.base_url
        );
        let body = self.fetcher.fetch(&url).await?;
        let meta: MetaDocument =
            serde_json::from_slice(&body).map_err(|err| HarvestError::PageParse {
                url,
                message: err.to_string(),
            })?;
        let meta = Arc::new(meta);
        *cached = Some(meta.clone());
        Ok(meta)
    }
}

#[async_trait]
impl SimulationSource for PhetSource {
    async fn language_rows(&self) -> Result<Vec<LanguageRow>, HarvestError> {
        let meta = self.metadata().await?;
        let mut counts: BTreeMap<LocaleSlug, usize> = BTreeMap::new();
        for project in meta.projects.iter().filter(|p| p.kind == HTML5_PROJECT_TYPE) {
            for sim in &project.simulations {
                for slug in sim.localized.keys() {
                    let Ok(slug) = slug.parse::<LocaleSlug>() else {
                        continue;
                    };
                    *counts.entry(slug).or_default() += 1;
                }
            }
        }
        Ok(counts
            .into_iter()
            .map(|(slug, count)| {
                let url = format!(
                    "{}/en/simulations/filter?locale={}&type=html",
                    self.base_url, slug
                );
                LanguageRow { slug, count, url }
            })
            .collect())
    }

    async fn simulation_listings(&self) -> Result<Vec<SimulationListing>, HarvestError> {
        let meta = self.metadata().await?;
        let mut listings = Vec::new();
        for project in meta.projects.iter().filter(|p| p.kind == HTML5_PROJECT_TYPE) {
            for sim in &project.simulations {
                for (slug, localized) in &sim.localized {
                    let Ok(language) = slug.parse::<LocaleSlug>() else {
                        continue;
                    };
                    listings.push(SimulationListing {
                        language,
                        id: sim.name.clone(),
                        title: localized.title.clone(),
                    });
                }
            }
        }
        Ok(listings)
    }

    async fn category_listing(
        &self,
        language: &LocaleSlug,
        category_slug: &str,
    ) -> Result<CategoryListing, HarvestError> {
        let url = format!(
            "{}/{}/simulations/filter?subjects={}&type=html&sort=alpha&view=list",
            self.base_url, language, category_slug
        );
        let body = self.fetcher.fetch(&url).await?;
        let html = String::from_utf8_lossy(&body);
        Ok(parse_category_listing(&html))
    }

    async fn detail_page(
        &self,
        language: &LocaleSlug,
        id: &str,
    ) -> Result<DetailPage, HarvestError> {
        let url = format!("{}/{}/simulation/{}", self.base_url, language, id);
        let body = self.fetcher.fetch(&url).await?;
        let html = String::from_utf8_lossy(&body);
        parse_detail_page(&html).ok_or_else(|| HarvestError::PageParse {
            url,
            message: "no packaged-download link found".to_string(),
        })
    }
}

/// Selector contract for the filtered listing page: the translated page
/// title, the simulation anchors, and the sub-category checkboxes.
pub(crate) fn parse_category_listing(html: &str) -> CategoryListing {
    let title_re = Regex::new(r#"class="[^"]*regular-page-title[^"]*"[^>]*>([^<]+)<"#).unwrap();
    let translated_title = title_re
        .captures(html)
        .map(|caps| caps[1].split("  ").next().unwrap_or(&caps[1]).trim().to_string())
        .filter(|title| !title.is_empty());

    let sim_re = Regex::new(r#"href="/[^"/]+/simulations?/([a-z0-9-]+)""#).unwrap();
    let mut sim_ids: Vec<String> = Vec::new();
    for caps in sim_re.captures_iter(html) {
        let id = caps[1].to_string();
        if id != "filter" && !sim_ids.contains(&id) {
            sim_ids.push(id);
        }
    }

    let sub_re =
        Regex::new(r#"role="checkbox"[^>]*id="([a-z0-9-]+)-checkbox"[^>]*>\s*<[^>]*>([^<]+)<"#)
            .unwrap();
    let sub_categories = sub_re
        .captures_iter(html)
        .map(|caps| SubCategory {
            slug: caps[1].to_string(),
            title: caps[2].trim().to_string(),
        })
        .collect();

    CategoryListing {
        translated_title,
        sim_ids,
        sub_categories,
    }
}

/// Selector contract for the detail page. Returns `None` when the
/// packaged-download link is missing, since without it there is no
/// authoritative id to harvest under.
pub(crate) fn parse_detail_page(html: &str) -> Option<DetailPage> {
    let download_re = Regex::new(r#"class="[^"]*sim-download[^"]*"[^>]*href="([^"]+)""#).unwrap();
    let href = download_re
        .captures(html)
        .map(|caps| caps[1].to_string())
        .or_else(|| {
            // attribute order flips on some localized pages
            let alt = Regex::new(r#"href="([^"]+)"[^>]*class="[^"]*sim-download[^"]*""#).unwrap();
            alt.captures(html).map(|caps| caps[1].to_string())
        })?;
    let (real_id, _) = split_id_and_language(&href)?;

    let title = meta_content(html, "og:title")
        .or_else(|| {
            let h1 = Regex::new(r#"class="[^"]*simulation-main-title[^"]*"[^>]*>([^<]+)<"#)
                .unwrap();
            h1.captures(html).map(|caps| caps[1].trim().to_string())
        })
        .filter(|title| !title.is_empty());

    let description = meta_content(html, "description").unwrap_or_default();

    Some(DetailPage {
        real_id,
        title,
        description,
        topics: parse_topics(html),
    })
}

fn meta_content(html: &str, name: &str) -> Option<String> {
    let re = Regex::new(&format!(
        r#"<meta\s+name="{}"\s+content="([^"]*)""#,
        regex::escape(name)
    ))
    .unwrap();
    re.captures(html).map(|caps| caps[1].trim().to_string())
}

fn parse_topics(html: &str) -> Vec<String> {
    let block_re =
        Regex::new(r#"(?s)class="[^"]*sim-page-content[^"]*".*?<ul[^>]*>(.*?)</ul>"#).unwrap();
    let Some(caps) = block_re.captures(html) else {
        return Vec::new();
    };
    let item_re = Regex::new(r"(?s)<li[^>]*>(.*?)</li>").unwrap();
    let tag_re = Regex::new(r"<[^>]+>").unwrap();
    item_re
        .captures_iter(&caps[1])
        .map(|caps| tag_re.replace_all(&caps[1], "").trim().to_string())
        .filter(|topic| !topic.is_empty())
        .collect()
}
