use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::config::HarvestConfig;
use crate::domain::{Category, LanguageDescriptor, LocaleSlug};
use crate::error::HarvestError;
use crate::fallback::resolve_with_fallback;
use crate::pool;
use crate::source::SimulationSource;

/// Immutable category/subject tree, complete before any later stage reads
/// it: a per-language mapping of display titles to slugs, plus the reverse
/// mapping of simulation ids to the category titles they appear under.
#[derive(Debug, Default, Clone)]
pub struct TaxonomyTree {
    categories: BTreeMap<LocaleSlug, BTreeMap<String, String>>,
    memberships: BTreeMap<LocaleSlug, BTreeMap<String, Vec<String>>>,
    fallback_languages: BTreeSet<LocaleSlug>,
}

impl TaxonomyTree {
    /// Languages whose taxonomy was replaced wholesale by English's.
    pub fn fallback_languages(&self) -> &BTreeSet<LocaleSlug> {
        &self.fallback_languages
    }

    /// Ordered, slug-deduplicated categories for one simulation, falling
    /// back to the English tree when the language has no entry. An id with
    /// no entry in either tree yields an empty list.
    pub fn item_categories(&self, language: &LocaleSlug, id: &str) -> Vec<Category> {
        let english = english_slug();
        let Some(resolved) = resolve_with_fallback(
            |lang: &LocaleSlug| {
                self.memberships
                    .get(lang)
                    .and_then(|by_id| by_id.get(id))
                    .map(|titles| (lang.clone(), titles.clone()))
            },
            language,
            &english,
        ) else {
            return Vec::new();
        };

        let (source_language, titles) = resolved.value;
        let mut seen = BTreeSet::new();
        let mut categories = Vec::new();
        for title in titles {
            let slug = self
                .category_slug(&source_language, &title)
                .unwrap_or_else(|| slugify(&title));
            if seen.insert(slug.clone()) {
                categories.push(Category { title, slug });
            }
        }
        categories
    }

    fn category_slug(&self, language: &LocaleSlug, title: &str) -> Option<String> {
        self.categories
            .get(language)
            .and_then(|by_title| by_title.get(title))
            .cloned()
    }

    #[cfg(test)]
    fn insert_language(
        &mut self,
        language: LocaleSlug,
        categories: BTreeMap<String, String>,
        memberships: BTreeMap<String, Vec<String>>,
    ) {
        self.categories.insert(language.clone(), categories);
        self.memberships.insert(language, memberships);
    }
}

fn english_slug() -> LocaleSlug {
    "en".parse().expect("\"en\" is a valid locale slug")
}

/// Per-language collection result: either a complete subtree, or a marker
/// that the language must take English's tree instead. Partial per-category
/// fallback is deliberately not a case: it would mix two languages'
/// taxonomies for one simulation.
enum LanguageOutcome {
    Collected {
        language: LocaleSlug,
        categories: BTreeMap<String, String>,
        memberships: BTreeMap<String, Vec<String>>,
    },
    NeedsFallback(LocaleSlug),
}

/// Builds the tree for every discovered language. English is resolved
/// first, on its own, because it is the fallback source for everything
/// else; the remaining languages run under the worker pool.
pub async fn build(
    source: &dyn SimulationSource,
    config: &HarvestConfig,
    languages: &BTreeMap<LocaleSlug, LanguageDescriptor>,
) -> Result<TaxonomyTree, HarvestError> {
    let english = english_slug();
    let mut ordered: Vec<LocaleSlug> = Vec::new();
    if languages.contains_key(&english) {
        ordered.push(english.clone());
    }
    ordered.extend(languages.keys().filter(|slug| **slug != english).cloned());

    let mut tree = TaxonomyTree::default();
    let mut outcomes = Vec::new();

    let mut rest = ordered.into_iter();
    if let Some(first) = rest.next() {
        outcomes.push(collect_language(source, config, first).await);
    }
    outcomes.extend(
        pool::map_bounded(config.workers, rest, |language| {
            collect_language(source, config, language)
        })
        .await,
    );

    for outcome in outcomes {
        match outcome {
            LanguageOutcome::Collected {
                language,
                categories,
                memberships,
            } => {
                tree.categories.insert(language.clone(), categories);
                tree.memberships.insert(language, memberships);
            }
            LanguageOutcome::NeedsFallback(language) => {
                tree.fallback_languages.insert(language);
            }
        }
    }

    // Backfill pass: replace each failed language's subtree with a full
    // copy of English's.
    if !tree.fallback_languages.is_empty() {
        warn!(
            "the following ({}) language(s) will use english metadata: {}",
            tree.fallback_languages.len(),
            tree.fallback_languages
                .iter()
                .map(|slug| slug.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        let categories = tree.categories.get(&english).cloned().unwrap_or_default();
        let memberships = tree.memberships.get(&english).cloned().unwrap_or_default();
        for language in tree.fallback_languages.clone() {
            tree.categories.insert(language.clone(), categories.clone());
            tree.memberships.insert(language, memberships.clone());
        }
    }

    Ok(tree)
}

async fn collect_language(
    source: &dyn SimulationSource,
    config: &HarvestConfig,
    language: LocaleSlug,
) -> LanguageOutcome {
    let mut categories: BTreeMap<String, String> = BTreeMap::new();
    let mut memberships: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for subject in &config.subjects {
        let subject_slug = slugify(subject);
        let listing = match source.category_listing(&language, &subject_slug).await {
            Ok(listing) => listing,
            Err(err) => {
                debug!("failed to get categories for {language}: {err}");
                return LanguageOutcome::NeedsFallback(language);
            }
        };

        let translated = listing
            .translated_title
            .clone()
            .unwrap_or_else(|| subject.clone());
        categories.insert(translated.clone(), subject_slug.clone());
        debug!("+ [{language}] {subject_slug}: {} sims", listing.sim_ids.len());
        for id in &listing.sim_ids {
            record_membership(&mut memberships, id, &translated);
        }

        // one level of sub-categories, slugs relative to their parent
        for sub in &listing.sub_categories {
            let sub_slug = format!("{subject_slug}/{}", sub.slug);
            let sub_title = format!("{translated} / {}", sub.title);
            categories.insert(sub_title.clone(), sub_slug.clone());

            match source.category_listing(&language, &sub_slug).await {
                Ok(sub_listing) => {
                    debug!(
                        " - [{language}] {sub_slug}: {} sims",
                        sub_listing.sim_ids.len()
                    );
                    for id in &sub_listing.sim_ids {
                        record_membership(&mut memberships, id, &sub_title);
                    }
                }
                Err(err) => {
                    warn!(
                        "unable to get simulations under subcategory {sub_slug} for language {language}, skipping it: {err}"
                    );
                }
            }
        }
    }

    LanguageOutcome::Collected {
        language,
        categories,
        memberships,
    }
}

fn record_membership(
    memberships: &mut BTreeMap<String, Vec<String>>,
    id: &str,
    title: &str,
) {
    let titles = memberships.entry(id.to_string()).or_default();
    if !titles.iter().any(|existing| existing == title) {
        titles.push(title.to_string());
    }
}

/// Normalized identifier for a human title: lowercase, runs of
/// non-alphanumerics collapsed to single dashes.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for ch in title.chars() {
        if ch.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(ch.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}
