use std::collections::{BTreeMap, BTreeSet};

use tracing::{error, info, warn};

use crate::app::{ProgressEvent, ProgressSink};
use crate::config::HarvestConfig;
use crate::domain::{AssetReference, LanguageDescriptor, LocaleSlug, Simulation};
use crate::error::HarvestError;
use crate::fallback::Resolved;
use crate::pool;
use crate::source::{self, DetailPage, SimulationSource};
use crate::store::StateStore;
use crate::taxonomy::TaxonomyTree;

/// One language's accumulating simulation list. The same id never appears
/// twice; persisted order is by title (ordinal), ties keeping insertion
/// order.
#[derive(Debug, Clone)]
pub struct SimulationsList {
    language: LocaleSlug,
    items: Vec<Simulation>,
}

impl SimulationsList {
    pub fn new(language: LocaleSlug) -> Self {
        Self {
            language,
            items: Vec::new(),
        }
    }

    pub fn language(&self) -> &LocaleSlug {
        &self.language
    }

    /// Adds a simulation unless its id is already present.
    pub fn add(&mut self, item: Simulation) {
        if self.items.iter().any(|existing| existing.id == item.id) {
            return;
        }
        self.items.push(item);
    }

    pub fn remove(&mut self, id: &str) {
        self.items.retain(|item| item.id != id);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Items in persisted order. Stable sort, so equal titles keep their
    /// insertion order; sorting an already-sorted list is a no-op.
    pub fn sorted_items(&self) -> Vec<Simulation> {
        let mut items = self.items.clone();
        items.sort_by(|a, b| a.title.cmp(&b.title));
        items
    }

    pub fn persist(&self, store: &StateStore) -> Result<(), HarvestError> {
        store.write_catalog(&self.language, &self.sorted_items())
    }
}

/// Catalog-building output: the per-language lists (already persisted) and
/// the globally URL-deduplicated download queue.
pub struct CatalogBuild {
    pub catalogs: BTreeMap<LocaleSlug, SimulationsList>,
    pub download_queue: Vec<AssetReference>,
}

/// Fetches the localized detail page, falling back to the English page on
/// 404. Only a 404 triggers the fallback; everything else surfaces as-is.
async fn detail_with_fallback(
    src: &dyn SimulationSource,
    language: &LocaleSlug,
    english: &LocaleSlug,
    id: &str,
) -> Result<Resolved<DetailPage>, HarvestError> {
    match src.detail_page(language, id).await {
        Ok(page) => Ok(Resolved {
            value: page,
            used_fallback: false,
        }),
        Err(HarvestError::Fetch(err)) if err.is_not_found() && language != english => {
            let page = src.detail_page(english, id).await?;
            Ok(Resolved {
                value: page,
                used_fallback: true,
            })
        }
        Err(err) => Err(err),
    }
}

struct ItemResult {
    index: usize,
    language: LocaleSlug,
    simulation: Simulation,
    assets: [AssetReference; 2],
}

/// Builds and persists one catalog per language, accumulating every
/// referenced asset URL. Per-item failures are logged and dropped; they
/// never abort the batch.
pub async fn build(
    src: &dyn SimulationSource,
    config: &HarvestConfig,
    languages: &BTreeMap<LocaleSlug, LanguageDescriptor>,
    taxonomy: &TaxonomyTree,
    store: &StateStore,
    sink: &dyn ProgressSink,
) -> Result<CatalogBuild, HarvestError> {
    let english: LocaleSlug = "en".parse()?;
    let listings: Vec<_> = src
        .simulation_listings()
        .await?
        .into_iter()
        .filter(|listing| languages.contains_key(&listing.language))
        .collect();

    info!("gathering sim links...");
    let total = listings.len();
    sink.event(ProgressEvent::stage_start("get", total));

    let outcomes = pool::map_bounded(
        config.workers,
        listings.into_iter().enumerate(),
        |(index, listing)| {
            let english = english.clone();
            async move {
                let resolved =
                    match detail_with_fallback(src, &listing.language, &english, &listing.id)
                        .await
                    {
                        Ok(resolved) => resolved,
                        Err(err) => {
                            if config.verbose_errors {
                                error!(
                                    "failed to get simulation page for {}/{}: {err}",
                                    listing.language, listing.id
                                );
                            } else {
                                warn!(
                                    "unable to get the simulation {} for language {}, skipping it",
                                    listing.id, listing.language
                                );
                            }
                            sink.event(ProgressEvent::tick(format!(
                                "{} / {}",
                                listing.language, listing.id
                            )));
                            return None;
                        }
                    };

                if resolved.used_fallback {
                    info!("+ [{} > en] {}", listing.language, listing.id);
                } else {
                    info!("+ [{}] {}", listing.language, listing.id);
                }
                sink.event(ProgressEvent::tick(format!(
                    "{} / {}",
                    listing.language, listing.id
                )));

                let page = resolved.value;
                let real_id = page.real_id;
                let title = if listing.title.is_empty() {
                    page.title.unwrap_or_else(|| real_id.clone())
                } else {
                    listing.title
                };

                let simulation = Simulation {
                    categories: taxonomy.item_categories(&listing.language, &real_id),
                    id: real_id.clone(),
                    language: listing.language.clone(),
                    title,
                    topics: page.topics,
                    description: page.description,
                };

                let assets = [
                    AssetReference {
                        id: real_id.clone(),
                        language: listing.language.clone(),
                        url: source::document_url(&config.base_url, &real_id, &listing.language),
                    },
                    AssetReference {
                        id: real_id.clone(),
                        language: listing.language.clone(),
                        url: source::image_url(
                            &config.base_url,
                            &real_id,
                            config.image_resolution,
                        ),
                    },
                ];

                Some(ItemResult {
                    index,
                    language: listing.language,
                    simulation,
                    assets,
                })
            }
        },
    )
    .await;

    // Completion order is nondeterministic; restore listing order before
    // accumulating so title ties keep their original relative order.
    let mut results: Vec<ItemResult> = outcomes.into_iter().flatten().collect();
    results.sort_by_key(|result| result.index);

    let mut catalogs: BTreeMap<LocaleSlug, SimulationsList> = BTreeMap::new();
    let mut seen_urls: BTreeSet<String> = BTreeSet::new();
    let mut download_queue: Vec<AssetReference> = Vec::new();

    for result in results {
        let list = catalogs
            .entry(result.language.clone())
            .or_insert_with(|| SimulationsList::new(result.language.clone()));
        list.add(result.simulation);
        for asset in result.assets {
            if seen_urls.insert(asset.url.clone()) {
                download_queue.push(asset);
            }
        }
    }

    for list in catalogs.values() {
        list.persist(store)?;
    }
    info!(
        "catalogued {} simulations across {} languages",
        catalogs.values().map(SimulationsList::len).sum::<usize>(),
        catalogs.len()
    );

    Ok(CatalogBuild {
        catalogs,
        download_queue,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simulation(id: &str, title: &str) -> Simulation {
        Simulation {
            id: id.to_string(),
            language: "en".parse().unwrap(),
            title: title.to_string(),
            categories: Vec::new(),
            topics: Vec::new(),
            description: String::new(),
        }
    }

    #[test]
    fn duplicate_ids_are_dropped() {
        let mut list = SimulationsList::new("en".parse().unwrap());
        list.add(simulation("forces", "Forces"));
        list.add(simulation("forces", "Forces again"));
        assert_eq!(list.len(), 1);
        assert_eq!(list.sorted_items()[0].title, "Forces");
    }

    #[test]
    fn sorted_by_title_ordinal() {
        let mut list = SimulationsList::new("en".parse().unwrap());
        list.add(simulation("b", "beta"));
        list.add(simulation("z", "Zeta"));
        list.add(simulation("a", "Alpha"));
        let titles: Vec<_> = list
            .sorted_items()
            .into_iter()
            .map(|item| item.title)
            .collect();
        // ordinal comparison: uppercase sorts before lowercase
        assert_eq!(titles, vec!["Alpha", "Zeta", "beta"]);
    }

    #[test]
    fn sorting_is_idempotent() {
        let mut list = SimulationsList::new("en".parse().unwrap());
        list.add(simulation("a", "Same"));
        list.add(simulation("b", "Same"));
        list.add(simulation("c", "Apple"));
        let once = list.sorted_items();

        let mut resorted = SimulationsList::new("en".parse().unwrap());
        for item in &once {
            resorted.add(item.clone());
        }
        assert_eq!(resorted.sorted_items(), once);
    }

    #[test]
    fn remove_evicts_by_id() {
        let mut list = SimulationsList::new("en".parse().unwrap());
        list.add(simulation("a", "Alpha"));
        list.add(simulation("b", "Beta"));
        list.remove("a");
        assert_eq!(list.len(), 1);
        assert_eq!(list.sorted_items()[0].id, "b");
    }
}
